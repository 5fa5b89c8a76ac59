//! Capburn Session
//!
//! The top-level controller of one captioning session. It owns the
//! caption store, the global style, the loaded media element, the drawing
//! surface, the persistent audio routing graph, and the export controller,
//! and moves the user through the session status machine:
//!
//! ```text
//! idle -> choosing -> transcribing | pasting | editing
//! editing <-> exporting -> completed -> editing
//! ```
//!
//! [`driver`] runs the cooperative tick loop on a tokio timer.

pub mod controller;
pub mod driver;
pub mod status;

pub use controller::{SessionController, SessionHost, TickReport};
pub use driver::{drive_export, drive_export_until, drive_playback, DriverOptions};
pub use status::AppStatus;
