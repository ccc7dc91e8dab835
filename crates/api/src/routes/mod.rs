//! Route handlers

pub mod classify;
pub mod files;
pub mod health;
pub mod labels;
pub mod logs;
pub mod uploads;
