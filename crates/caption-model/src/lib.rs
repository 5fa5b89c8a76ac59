//! Capburn Caption Model
//!
//! Defines the core data contracts for a captioning session:
//! - **Captions:** Timed text segments with opaque, unique ids
//! - **Store:** The ordered caption set and its edit operations
//! - **Style:** The single global caption style applied to every caption
//! - **Import/Export:** Whisper-style log import and SRT/VTT/JSON export
//!
//! Times are seconds from the start of the media. Style positions are
//! percentages of the frame so they survive resolution changes.

pub mod caption;
pub mod log_import;
pub mod style;
pub mod subtitles;

pub use caption::*;
pub use log_import::*;
pub use style::*;
pub use subtitles::*;
