use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "avcfrag")]
#[command(author, version, about = "H.264 Annex-B to fragmented MP4 packager")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build an init segment from a frame carrying SPS and PPS
    Init {
        /// Annex-B input file
        #[arg(required = true)]
        input: PathBuf,

        /// Output file (default: init name from config)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Input is hex text
        #[arg(long)]
        hex: bool,
    },

    /// Build a media segment holding one frame
    Segment {
        /// Annex-B input file
        #[arg(required = true)]
        input: PathBuf,

        /// Decode timestamp in seconds
        #[arg(short, long, default_value = "0")]
        timestamp: u64,

        /// Frame duration in seconds
        #[arg(short, long, default_value = "1")]
        duration: u64,

        /// Fragment sequence number (default: from config)
        #[arg(short, long)]
        sequence: Option<u32>,

        /// Output file (default: segment pattern from config)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Input is hex text
        #[arg(long)]
        hex: bool,
    },

    /// Package frames into an init segment and one segment per frame
    Package {
        /// Annex-B frame files, in presentation order
        #[arg(required = true)]
        frames: Vec<PathBuf>,

        /// Directory to write segments into
        #[arg(long)]
        out_dir: PathBuf,

        /// Duration of each frame in seconds
        #[arg(short, long, default_value = "1")]
        duration: u64,

        /// Inputs are hex text
        #[arg(long)]
        hex: bool,
    },

    /// Display the structure of an init or media segment
    Inspect {
        /// Segment file
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses --config or defaults if not specified)
        #[arg(value_name = "CONFIG")]
        file: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
