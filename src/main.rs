use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use popbox::{PopboxApp, PopboxConfig};

#[derive(Parser, Debug)]
#[command(name = "popbox")]
#[command(about = "Real-time visual effect client for camera motion analysis")]
#[command(version)]
#[command(long_about = "Streams camera frames to a remote analysis service, renders the \
returned detection regions and guide lines as a time-decaying overlay in one of four visual \
styles, and records the composited output to H.264/MP4 with an MJPEG fallback.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "popbox.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting the client")]
    validate_config: bool,

    /// Print the effective configuration and exit
    #[arg(long, help = "Print the effective configuration in TOML format and exit")]
    print_config: bool,

    /// Record for N seconds, save the artifact, then exit
    #[arg(long, value_name = "SECONDS", help = "Record the composited output for N seconds and exit")]
    record_seconds: Option<u64>,

    /// Override the recording output directory
    #[arg(long, value_name = "DIR", help = "Directory where finished recordings are saved")]
    output_dir: Option<String>,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args)?;

    info!("Starting popbox v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let mut config = match PopboxConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };
    if let Some(dir) = &args.output_dir {
        config.recording.output_dir = dir.clone();
    }

    if args.print_config {
        println!("{}", config.to_toml()?);
        return Ok(());
    }

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }
    config.validate()?;

    let app = PopboxApp::new(config)?;
    app.start().await?;

    match args.record_seconds {
        Some(seconds) => record_and_exit(&app, seconds).await?,
        None => app.run().await?,
    }

    Ok(())
}

/// Timed-recording mode: wait for the camera, record for the requested
/// duration, save, and shut down.
async fn record_and_exit(app: &PopboxApp, seconds: u64) -> Result<()> {
    let ready = tokio::time::timeout(std::time::Duration::from_secs(10), async {
        while !app.source().is_ready() {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
    })
    .await;
    if ready.is_err() {
        error!("Camera produced no frames; nothing to record");
        app.stop().await?;
        std::process::exit(1);
    }

    info!("Recording for {} seconds", seconds);
    app.start_recording()?;
    tokio::time::sleep(std::time::Duration::from_secs(seconds)).await;

    match app.stop_recording().await? {
        Some(path) => println!("Recording saved to {}", path.display()),
        None => eprintln!("No frames were recorded"),
    }

    app.stop().await?;
    Ok(())
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("popbox={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}
