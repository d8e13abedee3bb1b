//! trigger6-stream — entry point.
//!
//! ```text
//! trigger6-stream                    Stream the test pattern to the capture file
//! trigger6-stream --config <path>    Load a custom config TOML
//! trigger6-stream --gen-config       Write default config to stdout
//! trigger6-stream --inspect <file>   Decode a capture file
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use trigger6_stream::config::StreamConfig;
use trigger6_stream::inspect::inspect;
use trigger6_stream::service::{BoxError, StreamService};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "trigger6-stream", about = "Stream a test pattern through an emulated trigger6 adapter")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "trigger6-stream.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Write the default configuration to `--config` and exit.
    #[arg(long)]
    init_config: bool,

    /// Decode a capture file instead of streaming.
    #[arg(long, value_name = "FILE")]
    inspect: Option<PathBuf>,

    /// Override the number of frame updates.
    #[arg(long)]
    frames: Option<u32>,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&StreamConfig::default())?;
        println!("{text}");
        return Ok(());
    }
    if cli.init_config {
        StreamConfig::write_default(&cli.config)?;
        println!("Wrote {}", cli.config.display());
        return Ok(());
    }

    // Load config.
    let mut config = StreamConfig::load(&cli.config);
    if let Some(frames) = cli.frames {
        config.output.frames = frames;
    }

    // Init tracing.
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Some(path) = cli.inspect {
        let file = tokio::fs::File::open(&path).await?;
        let mut stdout = std::io::stdout().lock();
        inspect(file, &mut stdout).await?;
        return Ok(());
    }

    info!("trigger6-stream v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "mode: {}x{}@{}",
        config.output.width, config.output.height, config.output.refresh_hz
    );
    info!("protocol: {:?}", config.device.protocol);

    config.device.validate()?;
    let service = StreamService::new(config);
    let stop = service.stop_handle();

    // Ctrl-C handler.
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, stopping after the current update");
        stop.store(false, std::sync::atomic::Ordering::SeqCst);
    });

    let report = service.run().await?;
    info!("{} updates sent: {}", report.updates, report.stats);

    Ok(())
}
