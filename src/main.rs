mod config;
mod history;
mod model_download;
mod pipeline;
mod types;

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::thread;

use anyhow::{Context, Result, bail};
use crossbeam_channel::bounded;

use config::PipelineConfig;
use history::SqliteHistory;
use model_download::{ModelKind, ensure_model_ready_with_progress};
use pipeline::{GestureSession, OrtLandmarkDetector, OrtSignClassifier, start_capture_worker};
use types::SessionEvent;

const HISTORY_DB_FILENAME: &str = "gestures.db";

fn main() -> Result<()> {
    env_logger::init();

    let cfg = PipelineConfig::default();
    cfg.validate().context("invalid pipeline configuration")?;

    for model in ModelKind::ALL {
        ensure_model_ready_with_progress(model, &model.default_path())?;
    }

    let detector = OrtLandmarkDetector::new(
        &ModelKind::PoseLandmarker.default_path(),
        &ModelKind::HandLandmarker.default_path(),
    )?;
    let classifier = OrtSignClassifier::new(&ModelKind::SignClassifier.default_path())?;
    let sink = SqliteHistory::open(&history_db_path())?;

    let (session, events, _worker) =
        GestureSession::spawn(cfg, Box::new(classifier), Box::new(sink));

    let (frame_tx, frame_rx) = bounded(1);
    let _camera = open_camera(frame_tx)?;
    let _capture = start_capture_worker(Box::new(detector), frame_rx, session.clone());

    thread::spawn(move || {
        for event in events {
            print_event(&event);
        }
    });

    run_control_loop(&session)
}

fn history_db_path() -> PathBuf {
    PathBuf::from(HISTORY_DB_FILENAME)
}

#[cfg(feature = "camera-nokhwa")]
fn open_camera(frame_tx: crossbeam_channel::Sender<types::Frame>) -> Result<pipeline::CameraStream> {
    let devices = pipeline::available_cameras().context("failed to enumerate cameras")?;
    let Some(device) = devices.into_iter().next() else {
        bail!("no camera devices found");
    };
    log::info!("using camera: {}", device.label);
    pipeline::start_camera_stream(device.index, frame_tx)
}

#[cfg(not(feature = "camera-nokhwa"))]
fn open_camera(_frame_tx: crossbeam_channel::Sender<types::Frame>) -> Result<()> {
    bail!("built without camera support (enable the camera-nokhwa feature)")
}

fn run_control_loop(session: &GestureSession) -> Result<()> {
    println!("commands: start, stop, status, history, quit");

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("failed to read from stdin")?;
        match line.trim() {
            "" => {}
            "start" => {
                if !session.start() {
                    println!("session already active ({})", session.status().as_str());
                }
            }
            "stop" => session.stop(),
            "status" => {
                println!("status: {}", session.status().as_str());
                if let Some(result) = session.latest_result() {
                    println!(
                        "latest: {} ({:.0}%)",
                        result.label,
                        result.confidence * 100.0
                    );
                }
            }
            "history" => print_history(),
            "quit" | "exit" => break,
            other => println!("unknown command: {other}"),
        }
    }
    Ok(())
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::Started => println!("recording..."),
        SessionEvent::InsufficientData { captured, required } => {
            println!("not enough frames captured ({captured}/{required}), type start to retry")
        }
        SessionEvent::Completed(result) => {
            println!(
                "detected sign: {} ({:.0}%)",
                result.label,
                result.confidence * 100.0
            )
        }
    }
}

fn print_history() {
    match SqliteHistory::open(&history_db_path()).and_then(|history| history.recent(10)) {
        Ok(rows) if rows.is_empty() => println!("no recorded gestures yet"),
        Ok(rows) => {
            for row in rows {
                println!(
                    "#{:<4} {}  {}",
                    row.id,
                    row.recorded_at.format("%Y-%m-%d %H:%M:%S"),
                    row.label
                );
            }
        }
        Err(err) => println!("failed to read history: {err:?}"),
    }
}
