//! Import a timestamped transcription log.

use std::io::Read;
use std::path::PathBuf;

use anyhow::Context;
use capburn_caption_model::{import_whisper_log, render_captions, CaptionStore, SubtitleFormat};

pub fn run(
    path: PathBuf,
    format: Option<SubtitleFormat>,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let text = if path.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read log from stdin")?;
        text
    } else {
        std::fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?
    };

    let store = CaptionStore::from_segments(import_whisper_log(&text)?)?;
    let format = format.unwrap_or_else(|| match &output {
        Some(path) => SubtitleFormat::from_path(path),
        None => SubtitleFormat::Json,
    });
    let rendered = render_captions(&store, format)?;

    match output {
        Some(path) => {
            std::fs::write(&path, rendered)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Imported {} captions into {}", store.len(), path.display());
        }
        None => print!("{rendered}"),
    }
    Ok(())
}
