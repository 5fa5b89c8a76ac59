//! Capburn CLI: import captions, preview layout, transcribe, and export.
//!
//! Usage:
//!   capburn parse-log <FILE>        Import a timestamped transcription log
//!   capburn layout --text <TEXT>    Print the caption layout for a frame
//!   capburn simulate --captions F   Run an export on the headless host
//!   capburn export <VIDEO>          Burn captions into a video
//!   capburn transcribe <VIDEO>      Transcribe a video's audio
//!   capburn key set|show|clear      Manage the transcription API key
//!   capburn check                   Check system capabilities

use std::path::PathBuf;

use capburn_caption_model::SubtitleFormat;
use clap::{Parser, Subcommand, ValueEnum};

mod commands;

#[derive(Parser)]
#[command(
    name = "capburn",
    about = "Burn styled captions into video",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Json,
    Srt,
    Vtt,
}

impl From<FormatArg> for SubtitleFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Json => SubtitleFormat::Json,
            FormatArg::Srt => SubtitleFormat::Srt,
            FormatArg::Vtt => SubtitleFormat::Vtt,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Import a Whisper-style timestamped log
    ParseLog {
        /// Log file, or `-` for stdin
        path: PathBuf,

        /// Output format (defaults to the output extension, else JSON)
        #[arg(long, value_enum)]
        format: Option<FormatArg>,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the computed caption layout as JSON
    Layout {
        /// Caption text
        #[arg(long)]
        text: String,

        /// Frame width
        #[arg(long, default_value = "1920")]
        width: u32,

        /// Frame height
        #[arg(long, default_value = "1080")]
        height: u32,

        /// Style file (JSON)
        #[arg(long)]
        style: Option<PathBuf>,
    },

    /// Run a full export on the headless host and report on it
    Simulate {
        /// Caption file (JSON segments or a timestamped log)
        #[arg(long)]
        captions: PathBuf,

        /// Media duration in seconds
        #[arg(long, default_value = "5.0")]
        duration: f64,

        /// Frame width
        #[arg(long, default_value = "640")]
        width: u32,

        /// Frame height
        #[arg(long, default_value = "360")]
        height: u32,

        /// Simulate a hidden view during export
        #[arg(long)]
        hidden: bool,

        /// Style file (JSON)
        #[arg(long)]
        style: Option<PathBuf>,
    },

    /// Burn captions into a video in real time
    Export {
        /// Source video
        video: PathBuf,

        /// Caption file (JSON segments or a timestamped log)
        #[arg(long)]
        captions: PathBuf,

        /// Style file (JSON)
        #[arg(long)]
        style: Option<PathBuf>,

        /// Output file or directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Font file used for caption text
        #[arg(long)]
        font: Option<PathBuf>,

        /// Render from time updates only, as a hidden view would
        #[arg(long)]
        hidden: bool,
    },

    /// Transcribe a video's audio through the configured command
    Transcribe {
        /// Source video
        video: PathBuf,

        /// Output caption file (format from extension)
        #[arg(short, long, default_value = "captions.json")]
        output: PathBuf,

        /// Transcriber command (overrides the config)
        #[arg(long)]
        command: Option<String>,
    },

    /// Manage the stored transcription API key
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },

    /// Check system capabilities
    Check,
}

#[derive(Subcommand)]
enum KeyAction {
    /// Store a new key
    Set { value: String },
    /// Show the stored key, redacted
    Show,
    /// Remove the stored key
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => capburn_common::config::AppConfig::load_from(path),
        None => capburn_common::config::AppConfig::load(),
    };
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    capburn_common::logging::init_logging(&config.logging);

    match cli.command {
        Commands::ParseLog {
            path,
            format,
            output,
        } => commands::parse_log::run(path, format.map(Into::into), output),
        Commands::Layout {
            text,
            width,
            height,
            style,
        } => commands::layout::run(&config, text, width, height, style),
        Commands::Simulate {
            captions,
            duration,
            width,
            height,
            hidden,
            style,
        } => {
            commands::simulate::run(config, captions, duration, width, height, hidden, style).await
        }
        Commands::Export {
            video,
            captions,
            style,
            output,
            font,
            hidden,
        } => commands::export::run(config, video, captions, style, output, font, hidden).await,
        Commands::Transcribe {
            video,
            output,
            command,
        } => commands::transcribe::run(config, video, output, command).await,
        Commands::Key { action } => match action {
            KeyAction::Set { value } => commands::key::set(&config, &value),
            KeyAction::Show => commands::key::show(&config),
            KeyAction::Clear => commands::key::clear(&config),
        },
        Commands::Check => commands::check::run(),
    }
}
