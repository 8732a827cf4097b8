use anyhow::Result;
use clap::Parser;
use multicam::{
    default_backend, CameraRegistry, CaptureBackend, FileConfigProvider, MulticamConfig,
    SyntheticBackend,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "multicam")]
#[command(about = "Multi-camera stream acquisition with supervised capture threads")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "multicam.toml", help = "Path to TOML configuration file")]
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
    #[arg(long, help = "Validate configuration file and exit without starting cameras")]
    validate_config: bool,

    /// Print the effective configuration and exit
    #[arg(long, help = "Print the effective configuration in TOML format and exit")]
    print_config: bool,

    /// Serve generated frames instead of opening real devices
    #[arg(long, help = "Use the synthetic capture backend (device indices and stub:// URLs)")]
    synthetic: bool,

    /// Seconds between status reports (0 disables them)
    #[arg(long, default_value_t = 10, value_name = "SECONDS")]
    status_interval: u64,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args)?;

    info!("Starting multicam v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match MulticamConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            if args.validate_config {
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
            return Err(e.into());
        }
    };

    if args.validate_config {
        println!("✓ Configuration is valid ({} cameras)", config.cameras.len());
        return Ok(());
    }

    if args.print_config {
        println!("{}", config.to_toml()?);
        return Ok(());
    }

    let backend: Arc<dyn CaptureBackend> = if args.synthetic {
        warn!("Using synthetic capture backend; cameras will produce generated frames");
        Arc::new(SyntheticBackend::new())
    } else {
        default_backend()?
    };

    let registry = Arc::new(CameraRegistry::new(
        Arc::new(FileConfigProvider::new(&args.config)),
        backend,
        config.capture.clone(),
    ));

    // Camera I/O and staggered starts block; keep them off the async workers
    let results = {
        let registry = Arc::clone(&registry);
        tokio::task::spawn_blocking(move || registry.start_all()).await?
    };
    for (camera_id, started) in &results {
        if !started {
            warn!(camera_id, "Camera {} failed to start", camera_id);
        }
    }

    run_until_signal(&registry, args.status_interval).await;

    info!("Shutdown requested");
    {
        let registry = Arc::clone(&registry);
        tokio::task::spawn_blocking(move || registry.shutdown()).await?;
    }

    info!("multicam exited cleanly");
    Ok(())
}

async fn run_until_signal(registry: &CameraRegistry, status_interval: u64) {
    if status_interval == 0 {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
        return;
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(status_interval));
    ticker.tick().await;

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!("Failed to listen for shutdown signal: {}", e);
                }
                return;
            }
            _ = ticker.tick() => log_status(registry),
        }
    }
}

fn log_status(registry: &CameraRegistry) {
    for (camera_id, status) in registry.get_all_status() {
        info!(
            camera_id,
            running = status.is_running,
            frames = status.frames_captured,
            fps = status.actual_fps,
            read_failures = status.read_failures,
            last_frame_age = ?status.last_frame_age_seconds,
            "{}",
            status.camera_name
        );
    }

    let lingering = registry.lingering_thread_count();
    if lingering > 0 {
        warn!(lingering, "Capture threads outlived their stop timeout");
    }
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
        .unwrap_or_else(|_| EnvFilter::new(format!("multicam={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_names(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_names(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer().with_target(true).boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}
