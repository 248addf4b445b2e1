//! Segment generation worker binary.
//!
//! Reads a storyboard JSON file given as the first argument, runs a
//! generation job for it, and prints the final job snapshot.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use adreel_jobs::{JobStore, MemoryJobStore};
use adreel_models::Storyboard;
use adreel_providers::{HttpSpeechSynthesizer, HttpVideoGenerator, HttpVisionClient};
use adreel_storage::ObjectStoreSink;
use adreel_worker::{run_generation_job, FfmpegCompositor, ProcessingContext, WorkerConfig};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("adreel=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting adreel-worker");

    let storyboard_path = match std::env::args().nth(1) {
        Some(path) => path,
        None => {
            error!("Usage: adreel-worker <storyboard.json>");
            std::process::exit(2);
        }
    };

    let storyboard: Storyboard = match std::fs::read_to_string(&storyboard_path)
        .map_err(|e| e.to_string())
        .and_then(|body| serde_json::from_str(&body).map_err(|e| e.to_string()))
    {
        Ok(board) => board,
        Err(e) => {
            error!("Failed to load storyboard {}: {}", storyboard_path, e);
            std::process::exit(1);
        }
    };

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    let storage = match ObjectStoreSink::from_env() {
        Ok(sink) => Arc::new(sink),
        Err(e) => {
            error!("Failed to create storage sink: {}", e);
            std::process::exit(1);
        }
    };
    let video = match HttpVideoGenerator::from_env() {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Failed to create video client: {}", e);
            std::process::exit(1);
        }
    };
    let speech = match HttpSpeechSynthesizer::from_env() {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Failed to create speech client: {}", e);
            std::process::exit(1);
        }
    };
    let vision = match HttpVisionClient::from_env() {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Failed to create vision client: {}", e);
            std::process::exit(1);
        }
    };

    let store = Arc::new(MemoryJobStore::new());
    let ctx = ProcessingContext::new(
        config,
        store.clone(),
        storage,
        video,
        speech,
        vision.clone(),
        vision,
        Arc::new(FfmpegCompositor),
    );

    match run_generation_job(&ctx, &storyboard).await {
        Ok(job_id) => {
            let snapshot = match store.snapshot(&job_id).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    error!("Failed to read job snapshot: {}", e);
                    std::process::exit(1);
                }
            };
            match serde_json::to_string_pretty(&snapshot) {
                Ok(body) => println!("{body}"),
                Err(e) => error!("Failed to serialize snapshot: {}", e),
            }
        }
        Err(e) => {
            error!("Job failed to launch: {}", e);
            std::process::exit(1);
        }
    }
}
