mod cli;

use avcfrag::{config, input};
use avcfrag_media::inspect::{self, InitSegmentInfo, MediaSegmentInfo, SegmentInfo};
use avcfrag_media::StreamSession;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::{Path, PathBuf};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "avcfrag=trace,avcfrag_media=debug".to_string()
        } else {
            "avcfrag=info,avcfrag_media=info".to_string()
        }
    });

    // stdout carries command output (e.g. `inspect --json`)
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Init { input, output, hex } => {
            write_init(&input, output.as_deref(), hex, config_path)
        }
        Commands::Segment {
            input,
            timestamp,
            duration,
            sequence,
            output,
            hex,
        } => write_segment(
            &input,
            timestamp,
            duration,
            sequence,
            output.as_deref(),
            hex,
            config_path,
        ),
        Commands::Package {
            frames,
            out_dir,
            duration,
            hex,
        } => package(&frames, &out_dir, duration, hex, config_path),
        Commands::Inspect { file, json } => inspect_file(&file, json),
        Commands::Validate { file } => {
            let path = file.or_else(|| config_path.map(Path::to_path_buf));
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("avcfrag {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(path, bytes).with_context(|| format!("Failed to write {:?}", path))?;
    println!("Wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

fn write_init(
    input: &Path,
    output: Option<&Path>,
    hex: bool,
    config_path: Option<&Path>,
) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let bitstream = input::read_bitstream(input, hex)?;

    tracing::info!("Building init segment from {:?}", input);
    let init = avcfrag_media::create_init(&bitstream, &config.mux_config())
        .with_context(|| format!("Failed to build init segment from {:?}", input))?;

    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(&config.output.init_name));
    write_output(&output, &init)?;

    if let Ok(info) = inspect::parse_init_segment(&init) {
        println!("Codec: {}", info.codec_string());
    }
    Ok(())
}

fn write_segment(
    input: &Path,
    timestamp: u64,
    duration: u64,
    sequence: Option<u32>,
    output: Option<&Path>,
    hex: bool,
    config_path: Option<&Path>,
) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let bitstream = input::read_bitstream(input, hex)?;

    let mut mux = config.mux_config();
    if let Some(sequence) = sequence {
        mux.sequence_number = sequence;
    }

    tracing::info!(
        "Building segment {} from {:?} (timestamp {}s, duration {}s)",
        mux.sequence_number,
        input,
        timestamp,
        duration
    );
    let segment = avcfrag_media::create_segment(&bitstream, timestamp, duration, &mux)
        .with_context(|| format!("Failed to build media segment from {:?}", input))?;

    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(config.output.segment_name(mux.sequence_number)));
    write_output(&output, &segment)
}

fn package(
    frames: &[PathBuf],
    out_dir: &Path,
    duration: u64,
    hex: bool,
    config_path: Option<&Path>,
) -> Result<()> {
    if duration == 0 {
        anyhow::bail!("Frame duration must be at least 1 second when packaging");
    }
    let config = config::load_config_or_default(config_path)?;

    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create output directory: {:?}", out_dir))?;

    let mut session = StreamSession::new(config.mux_config());

    for (index, frame) in frames.iter().enumerate() {
        let bitstream = input::read_bitstream(frame, hex)?;

        if index == 0 {
            let init = session
                .init(&bitstream)
                .with_context(|| format!("Failed to build init segment from {:?}", frame))?;
            write_output(&out_dir.join(&config.output.init_name), &init)?;
        }

        let timestamp = (index as u64)
            .checked_mul(duration)
            .context("Timestamp overflow")?;
        let sequence_number = session.next_sequence_number();
        let segment = session
            .segment(&bitstream, timestamp, duration)
            .with_context(|| format!("Failed to build segment from {:?}", frame))?;
        write_output(
            &out_dir.join(config.output.segment_name(sequence_number)),
            &segment,
        )?;
    }

    tracing::info!(
        "Packaged {} frames into {:?}",
        frames.len(),
        out_dir
    );
    Ok(())
}

fn inspect_file(file: &Path, json: bool) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let info = inspect::inspect_file(file).with_context(|| format!("Failed to parse {:?}", file))?;

    if json {
        let json_str = serde_json::to_string_pretty(&info)?;
        println!("{}", json_str);
        return Ok(());
    }

    println!("File: {}", file.display());
    match info {
        SegmentInfo::Init(init) => print_init(&init),
        SegmentInfo::Media(media) => print_media(&media),
    }
    Ok(())
}

fn print_init(info: &InitSegmentInfo) {
    println!("Type: init segment");
    println!(
        "Brands: {} ({})",
        info.major_brand,
        info.compatible_brands.join(", ")
    );
    println!("Tracks: {}", info.track_count);
    println!("  Track ID: {}", info.track_id);
    println!("  Timescale: {}", info.timescale);
    println!("  Language: {}", info.language);
    println!("  Handler: {} ({})", info.handler_type, info.handler_name);
    println!(
        "  Sample entry: {} {}x{}",
        info.sample_entry, info.width, info.height
    );
    println!("  Codec: {}", info.codec_string());
    println!(
        "  Parameter sets: {} SPS, {} PPS",
        info.avcc.sps.len(),
        info.avcc.pps.len()
    );
}

fn print_media(info: &MediaSegmentInfo) {
    println!("Type: media segment");
    if let Some(ref brand) = info.styp_brand {
        println!("Segment brand: {}", brand);
    }
    println!("Sequence number: {}", info.sequence_number);
    println!("Track ID: {}", info.track_id);
    println!("Base decode time: {}", info.base_decode_time);
    if let Some(offset) = info.data_offset {
        println!("Data offset: {}", offset);
    }
    println!("Samples: {}", info.samples.len());
    for (i, sample) in info.samples.iter().enumerate() {
        print!(
            "  [{}] duration {} size {} flags 0x{:08x}",
            i, sample.duration, sample.size, sample.flags
        );
        if sample.is_sync() {
            print!(" [sync]");
        }
        println!();
    }
    println!("mdat payload: {} bytes", info.mdat_size);
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            config::Config::default()
        }
    };

    println!("  Timescale: {}", config.mux.timescale);
    println!("  Track ID: {}", config.mux.track_id);
    println!("  Language: {}", config.mux.language);
    println!("  Track name: {}", config.mux.track_name);
    println!("  Emit styp: {}", config.mux.emit_styp);
    println!(
        "  Strict parameter sets: {}",
        config.mux.strict_parameter_sets
    );
    println!("  Init name: {}", config.output.init_name);
    println!("  Segment pattern: {}", config.output.segment_pattern);

    Ok(())
}
