//! External model provider contracts and HTTP clients.
//!
//! The engine depends on four abstract capabilities: video generation,
//! speech synthesis, frame content classification, and multimodal frame
//! judging. Each is a trait here with a reqwest-backed implementation;
//! response shapes are parsed strictly and unrecognized shapes fail
//! loudly rather than defaulting.

pub mod error;
pub mod speech;
pub mod video;
pub mod vision;

pub use error::{ProviderError, ProviderResult};
pub use speech::{HttpSpeechSynthesizer, SpeechSynthesizer};
pub use video::{
    is_moderation_error, GenerationRequest, HttpVideoGenerator, PredictionPoll, VideoGenerator,
};
pub use vision::{FrameClassifier, FrameJudge, FrameJudgment, HttpVisionClient};
