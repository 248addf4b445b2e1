//! Shared processing context.
//!
//! Bundles the external capabilities the worker depends on behind trait
//! objects so orchestration logic can be exercised against in-process
//! fakes in tests.

use std::sync::Arc;

use adreel_jobs::JobStore;
use adreel_providers::{FrameClassifier, FrameJudge, SpeechSynthesizer, VideoGenerator};
use adreel_storage::StorageSink;

use crate::assembly::Compositor;
use crate::config::WorkerConfig;

/// Everything a job needs to run.
#[derive(Clone)]
pub struct ProcessingContext {
    pub config: WorkerConfig,
    pub store: Arc<dyn JobStore>,
    pub storage: Arc<dyn StorageSink>,
    pub video: Arc<dyn VideoGenerator>,
    pub speech: Arc<dyn SpeechSynthesizer>,
    pub classifier: Arc<dyn FrameClassifier>,
    pub judge: Arc<dyn FrameJudge>,
    pub compositor: Arc<dyn Compositor>,
}

impl ProcessingContext {
    pub fn new(
        config: WorkerConfig,
        store: Arc<dyn JobStore>,
        storage: Arc<dyn StorageSink>,
        video: Arc<dyn VideoGenerator>,
        speech: Arc<dyn SpeechSynthesizer>,
        classifier: Arc<dyn FrameClassifier>,
        judge: Arc<dyn FrameJudge>,
        compositor: Arc<dyn Compositor>,
    ) -> Self {
        Self {
            config,
            store,
            storage,
            video,
            speech,
            classifier,
            judge,
            compositor,
        }
    }
}
