//! Capburn Media Host
//!
//! The contracts the compositor and export pipeline use to talk to a media
//! host, and two hosts that implement them:
//! - **Element:** a playable video with a clock, frames, and host events
//! - **Stream:** capturable video/audio tracks and the recorders that
//!   consume them
//! - **Headless:** a scripted, deterministic host for tests and dry runs
//! - **FFmpeg:** a real host that decodes and encodes through ffmpeg
//!
//! Hosts are pumped cooperatively: the owner calls
//! [`MediaElement::advance_to`] with a monotonic timestamp and then drains
//! events with [`MediaElement::poll_events`].

pub mod element;
pub mod ffmpeg;
pub mod headless;
pub mod stream;

pub use element::*;
pub use stream::*;
