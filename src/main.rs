mod cli;
mod commands;
mod config;

use anyhow::Result;
use bufstream_filters::HeaderEncoding;
use clap::Parser;
use cli::{Cli, Commands};
use commands::wav::RawPcm;

fn main() {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "bufstream=trace,bufstream_core=trace,bufstream_filters=trace".to_string()
        } else {
            "bufstream=info,bufstream_core=warn,bufstream_filters=warn".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli) {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Segment {
            input,
            output,
            segment_size,
            duration_secs,
        } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            let mut settings = config.segment.clone();
            if let Some(size) = segment_size {
                settings.bytes_per_segment = size;
            }
            if let Some(secs) = duration_secs {
                settings.segment_duration_secs = secs;
            }
            let report = commands::segment::run(&input, &output, config.channel.chunk_size, &settings)?;
            println!("Segments: {}", report.segments);
            println!("Bytes: {}", report.bytes);
            if let Some(playlist) = report.playlist {
                println!("Playlist: {}", playlist.display());
            }
            Ok(())
        }
        Commands::Wav {
            input,
            output,
            format,
            bits,
            channels,
            rate,
            little_endian,
        } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            let pcm = RawPcm {
                input: format,
                bits,
                channels,
                rate,
                little_endian,
            };
            let format = commands::wav::run(
                &input,
                &output,
                pcm,
                config.wave.pcm_buffer_size,
                config.channel.chunk_size,
            )?;
            println!(
                "Wrote {}: {} ch, {} Hz, {} bit",
                output.display(),
                format.channels,
                format.sample_rate,
                format.bits_per_sample
            );
            Ok(())
        }
        Commands::Unwav {
            input,
            output,
            framing,
            frame_rate_code,
        } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            let report = commands::unwav::run(
                &input,
                &output,
                framing,
                frame_rate_code,
                config.wave.pcm_buffer_size,
                config.channel.chunk_size,
            )?;
            println!(
                "Read {}: {} ch, {} Hz, {} bit",
                input.display(),
                report.format.channels,
                report.format.sample_rate,
                report.format.bits_per_sample
            );
            println!("Bytes: {}", report.bytes);
            println!("First unit: {} bytes", report.first_unit);
            Ok(())
        }
        Commands::Vxml {
            input,
            output,
            xml,
            hex,
        } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            let xml = commands::vxml::xml_path(&output, xml.as_deref());
            let encoding = if hex {
                HeaderEncoding::Hex
            } else {
                HeaderEncoding::Base64
            };
            let pictures = commands::vxml::run(&input, &output, &xml, encoding, config.channel.chunk_size)?;
            println!("Pictures: {}", pictures);
            println!("Index: {}", xml.display());
            Ok(())
        }
        Commands::Copy { input, output } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            commands::copy::run(&input, &output, &config)
        }
        Commands::Codes { json } => commands::codes::run(json),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
    }
}

fn validate_config(path: Option<&std::path::Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            config::validate_config(&config)?;
            config
        }
    };

    println!("  Chunk size: {}", config.channel.chunk_size);
    println!("  Segment size: {}", config.segment.bytes_per_segment);
    println!("  Segment duration: {}s", config.segment.segment_duration_secs);
    println!("  Segment list: {}", config.segment.write_mzl);
    println!("  Playlist: {}", config.segment.write_playlist);
    println!("  PCM buffer: {}", config.wave.pcm_buffer_size);

    Ok(())
}
