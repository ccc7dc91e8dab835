mod common;

use api::Settings;
use common::{path_string, spawn_app, spawn_app_with, BrokenScorer, ColorScorer, TestApp};
use futures_util::StreamExt;
use serde_json::Value;
use std::path::PathBuf;
use tokio_tungstenite::{connect_async, tungstenite::Message};

type Socket = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn connect(app: &TestApp) -> Socket {
    let (socket, _) = connect_async(app.ws.as_str()).await.unwrap();
    socket
}

/// Next JSON frame, or `None` once the server closes
async fn next_json(socket: &mut Socket) -> Option<Value> {
    while let Some(frame) = socket.next().await {
        match frame {
            Ok(Message::Text(text)) => return Some(serde_json::from_str(&text).unwrap()),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
    None
}

async fn collect_frames(socket: &mut Socket) -> Vec<Value> {
    let mut frames = Vec::new();
    while let Some(frame) = next_json(socket).await {
        frames.push(frame);
    }
    frames
}

fn add_labels(app: &TestApp, labels: &[&str]) {
    for label in labels {
        app.state.labels.add(label).unwrap();
    }
}

fn upload(app: &TestApp, paths: &[PathBuf]) {
    app.state.uploads.add_all(paths).unwrap();
}

#[tokio::test]
async fn test_rejects_without_labels() {
    let app = spawn_app().await;
    app.install_scorer(ColorScorer);
    let mut socket = connect(&app).await;

    let frame = next_json(&mut socket).await.unwrap();
    assert_eq!(frame["error"], api::NO_LABELS);
    assert!(next_json(&mut socket).await.is_none());
}

#[tokio::test]
async fn test_rejects_without_uploads() {
    let app = spawn_app().await;
    app.install_scorer(ColorScorer);
    add_labels(&app, &["red", "blue"]);
    let mut socket = connect(&app).await;

    let frame = next_json(&mut socket).await.unwrap();
    assert_eq!(frame["error"], api::NO_IMAGES);
}

#[tokio::test]
async fn test_rejects_until_model_loaded() {
    let app = spawn_app().await;
    add_labels(&app, &["red", "blue"]);
    upload(&app, &[app.image("a.png", [255, 0, 0])]);
    let mut socket = connect(&app).await;

    let frame = next_json(&mut socket).await.unwrap();
    assert_eq!(frame["error"], api::MODEL_NOT_LOADED);
    assert_eq!(app.state.labels.len(), 2);
}

#[tokio::test]
async fn test_full_run_reports_progress_and_clears_session() {
    let app = spawn_app().await;
    app.install_scorer(ColorScorer);
    add_labels(&app, &["red", "blue"]);
    let paths: Vec<PathBuf> = (0..20)
        .map(|i| {
            let rgb = if i % 2 == 0 { [250, 0, 0] } else { [0, 0, 250] };
            app.image(&format!("img{:02}.png", i), rgb)
        })
        .collect();
    upload(&app, &paths);

    let mut socket = connect(&app).await;
    let frames = collect_frames(&mut socket).await;

    let progress: Vec<u64> = frames
        .iter()
        .filter_map(|f| f["progress"].as_u64())
        .collect();
    assert_eq!(progress, vec![40, 80, 100]);

    let completed: Vec<&Value> = frames.iter().filter(|f| f.get("message").is_some()).collect();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0]["message"], api::COMPLETED);

    let results = completed[0]["results"].as_array().unwrap();
    assert_eq!(results.len(), 20);
    assert_eq!(results[0]["filename"], "img00.png");
    assert_eq!(results[0]["label"], "red");
    assert_eq!(results[1]["label"], "blue");
    assert!(results[0]["confidence"].as_str().unwrap().starts_with(" (red "));

    app.wait_for_cleared_session().await;
    assert!(paths.iter().all(|p| p.exists()));

    let messages = app.state.events.messages();
    assert!(messages.contains(&"Starting classification for 20 images.".to_string()));
    assert!(messages.contains(&"Using batch size: 8 for 20 images.".to_string()));
    assert!(messages.contains(&"Cleared all labels.".to_string()));
    assert!(messages.contains(&"Cleared all uploaded images.".to_string()));
}

#[tokio::test]
async fn test_unreadable_image_is_skipped() {
    let app = spawn_app().await;
    app.install_scorer(ColorScorer);
    add_labels(&app, &["red", "blue"]);
    let broken = app.dir.join("broken.png");
    std::fs::write(&broken, b"not a png").unwrap();
    upload(&app, &[broken, app.image("ok.png", [0, 0, 255])]);

    let mut socket = connect(&app).await;
    let frames = collect_frames(&mut socket).await;
    let done = frames.iter().find(|f| f.get("results").is_some()).unwrap();

    let results = done["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["filename"], "ok.png");
    assert!(app
        .state
        .events
        .messages()
        .iter()
        .any(|m| m.starts_with("Error loading") && m.contains("broken.png")));
}

#[tokio::test]
async fn test_scorer_failure_keeps_session() {
    let app = spawn_app().await;
    app.install_scorer(BrokenScorer);
    add_labels(&app, &["red", "blue"]);
    upload(&app, &[app.image("a.png", [255, 0, 0])]);

    let mut socket = connect(&app).await;
    let frames = collect_frames(&mut socket).await;

    assert_eq!(frames.len(), 1);
    let error = frames[0]["error"].as_str().unwrap();
    assert!(error.starts_with("Failed to process images: "));
    assert!(error.contains("onnx session crashed"));
    assert_eq!(app.state.labels.len(), 2);
    assert_eq!(app.state.uploads.len(), 1);
}

#[tokio::test]
async fn test_second_run_rejected_while_busy() {
    let app = spawn_app().await;
    app.install_scorer(ColorScorer);
    add_labels(&app, &["red", "blue"]);
    upload(&app, &[app.image("a.png", [255, 0, 0])]);

    let running = app.state.classify_gate.lock().await;
    let mut socket = connect(&app).await;
    let frame = next_json(&mut socket).await.unwrap();
    assert_eq!(frame["error"], api::ALREADY_RUNNING);
    drop(running);

    assert_eq!(app.state.uploads.len(), 1);
}

#[tokio::test]
async fn test_entries_added_during_run_survive_cleanup() {
    let mut settings = Settings::default();
    settings.logging.file = None;
    settings.classify.cleanup_delay_ms = 300;
    let app = spawn_app_with(settings).await;
    app.install_scorer(ColorScorer);
    add_labels(&app, &["red", "blue"]);
    let first = app.image("first.png", [255, 0, 0]);
    upload(&app, &[first.clone()]);

    let mut socket = connect(&app).await;
    loop {
        let frame = next_json(&mut socket).await.unwrap();
        if frame.get("message").is_some() {
            break;
        }
    }

    // Cleanup has not happened yet; these arrive for the next run
    let later = app.image("later.png", [0, 0, 255]);
    let client = reqwest::Client::new();
    let resp = client
        .post(app.url("/uploads/"))
        .json(&vec![path_string(&later)])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let resp = client
        .post(app.url("/labels/"))
        .form(&[("label", "green")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    assert!(next_json(&mut socket).await.is_none());
    assert_eq!(app.state.labels.list(), vec!["green".to_string()]);
    assert_eq!(app.state.uploads.list(), vec![later]);
    assert!(first.exists());
}
