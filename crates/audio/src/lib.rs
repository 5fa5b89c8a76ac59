//! Capburn Audio
//!
//! Everything audio-shaped around the export pipeline:
//! - **Graph:** audio context contracts and the node graph platforms share
//! - **Routing:** the persistent routing graph that taps a media element's
//!   audio into both the speakers and a capturable track
//! - **Platforms:** file-backed (ffmpeg host) and synthetic (headless) audio
//! - **Transcription:** the boundary to the external transcription service
//! - **Credentials:** the persisted API key the transcriber needs

pub mod credentials;
pub mod graph;
pub mod platform;
pub mod routing;
pub mod transcription;

pub use credentials::CredentialStore;
pub use graph::{AudioContext, AudioContextState, AudioNodeId, AudioPlatform};
pub use platform::{FileAudioPlatform, SyntheticAudioPlatform};
pub use routing::{AudioRoutingGraph, CapturableAudio};
