use clap::Parser;
use radius_relay::{Config, LoadOutcome, LoggingInterceptor, Mode, RelayEngine};
use std::process;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// RADIUS MITM Relay - forwards and intercepts traffic between NAS devices and a RADIUS server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "radius_relay")]
struct Cli {
    /// Path to configuration file
    #[arg(value_name = "CONFIG", default_value = "relay.json")]
    config_path: String,

    /// Validate configuration and exit (doesn't start the relay)
    #[arg(short, long)]
    validate: bool,
}

fn init_basic_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::new("info"))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load configuration (without logging first)
    let loaded = if cli.validate {
        Config::from_file(&cli.config_path).map(LoadOutcome::Loaded)
    } else {
        Config::load_or_create(&cli.config_path)
    };

    let config = match loaded {
        Ok(LoadOutcome::Loaded(cfg)) => cfg,
        Ok(LoadOutcome::Created) => {
            init_basic_logging();
            info!("No configuration found, created example at: {}", cli.config_path);
            info!("Please edit {} and restart the relay", cli.config_path);
            process::exit(0);
        }
        Err(e) => {
            if cli.validate {
                eprintln!("Configuration validation failed!");
                eprintln!("   Error: {}", e);
                process::exit(1);
            }

            init_basic_logging();
            error!(error = %e, "Could not load config file from: {}", cli.config_path);
            process::exit(1);
        }
    };

    if cli.validate {
        println!("Configuration validated successfully!");
        println!();
        println!("Configuration summary:");
        println!("  Listen: {}", config.listen_address);
        println!("  Host: {}", config.host);
        println!("  Ports: {:?}", config.ports);
        println!("  Mode: {:?}", config.mode);
        match config.idle_timeout {
            Some(secs) => println!("  Idle timeout: {}s", secs),
            None => println!("  Idle timeout: never"),
        }
        println!("  Log level: {}", config.log_level.as_deref().unwrap_or("info"));
        if !config.drop_codes.is_empty() {
            println!("  Dropped codes: {:?}", config.drop_codes);
        }
        process::exit(0);
    }

    let log_level = config.log_level.as_deref().unwrap_or("info");
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("RADIUS Relay v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded configuration from: {}", cli.config_path);

    // Both were checked by validate(), but keep the error path explicit
    let (session, listen_ip) = match (config.session(), config.listen_ip()) {
        (Ok(session), Ok(ip)) => (session, ip),
        (Err(e), _) | (_, Err(e)) => {
            error!("Invalid configuration: {}", e);
            process::exit(1);
        }
    };

    if session.mode() == Mode::Passive {
        info!("Passive mode: packets are forwarded without inspection");
    }

    let engine = RelayEngine::new(session)
        .with_listen_ip(listen_ip)
        .with_idle_timeout(config.idle_timeout());

    let shutdown = engine.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping relay");
            shutdown.shutdown();
        }
    });

    info!("Press Ctrl+C to stop");

    let interceptor = LoggingInterceptor::new(config.drop_codes.iter().copied());
    match engine.run(interceptor).await {
        Ok(stats) => {
            let summary = serde_json::to_string(&stats).unwrap_or_default();
            info!(stats = %summary, "Relay stopped");
        }
        Err(e) => {
            error!("Relay error: {}", e);
            process::exit(1);
        }
    }
}
