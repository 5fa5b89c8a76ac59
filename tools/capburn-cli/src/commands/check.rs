//! Check system capabilities.

use capburn_common::config::{config_file_path, credentials_file_path};
use capburn_media::ffmpeg::command_exists;
use capburn_render_engine::raster::load_font;

pub fn run() -> anyhow::Result<()> {
    println!("Capburn System Check");
    println!("{}", "=".repeat(50));

    let mut ready = true;
    for binary in ["ffmpeg", "ffprobe"] {
        if command_exists(binary) {
            println!("[OK] {binary} found");
        } else {
            println!("[FAIL] {binary} not found in PATH");
            ready = false;
        }
    }

    match load_font(None) {
        Ok(Some(_)) => println!("[OK] Caption font available"),
        Ok(None) => println!("[WARN] No system font found; pass --font to export"),
        Err(e) => println!("[WARN] Caption font failed to load: {e}"),
    }

    println!();
    println!("Config:      {}", config_file_path().display());
    println!("Credentials: {}", credentials_file_path().display());

    println!();
    if ready {
        println!("All required tools are available. Capburn is ready.");
    } else {
        println!("Some required tools are missing. Install ffmpeg to export and transcribe.");
    }

    Ok(())
}
