//! Capburn Render Engine
//!
//! Turns a playing media element plus the caption store into captioned
//! frames, and records those frames (with the routed audio) into a
//! downloadable artifact.
//!
//! Pipeline:
//! 1. Lay out the active caption (word wrap, box geometry)
//! 2. Composite video frame, caption box, and text onto a drawing surface
//! 3. Schedule redraws from the display refresh or, when hidden, from
//!    time-update events
//! 4. Capture the surface at a fixed frame rate into a stream recorder
//! 5. Drive the export state machine to a finished artifact

pub mod capture;
pub mod compositor;
pub mod export;
pub mod layout;
pub mod raster;
pub mod scheduler;
pub mod surface;

pub use capture::CanvasCapture;
pub use compositor::{Compositor, FrameComposition};
pub use export::{
    ExportArtifact, ExportController, ExportOutcome, ExportProgress, ExportSettings, ExportStage,
    ExportState, ExportWarning, ProgressCallback,
};
pub use layout::{layout_caption, CaptionLayout, DrawCommand, LayoutParams};
pub use raster::PixmapSurface;
pub use scheduler::{LoopToken, RenderScheduler, Visibility};
pub use surface::{DrawingSurface, RecordingSurface, SurfaceOp};
