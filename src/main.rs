//! Pi Pins - Raspberry Pi GPIO Pin Manager Binary
//!
//! Command-line front end for configuring, driving and monitoring GPIO pins.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use pi_pins::{
    ControllerConfig, Event, GpioService, Level, MockDriver, PinDriver, PinMode, PinOptions,
    PullMode, DEFAULT_INTERVAL_MS,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level as LogLevel};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "pi_pins")]
#[command(about = "🥧 Pi Pins - Raspberry Pi GPIO Pin Manager")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = "Austin Couch")]
#[command(long_about = "Configure, drive and monitor Raspberry Pi GPIO pins")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// JSON controller configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use the in-memory driver even when GPIO hardware is available
    #[arg(long)]
    mock: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List available, configured and reserved pins (default)
    Pins(PinsArgs),

    /// Configure pins as inputs and stream monitoring events as JSON lines
    Monitor(MonitorArgs),

    /// Toggle an output pin
    Blink(BlinkArgs),

    /// Drive a PWM output for a while
    Pwm(PwmArgs),

    /// Show driver and pin layout information
    Info,
}

#[derive(Args)]
struct PinsArgs {
    /// Output format: json or pretty
    #[arg(short, long, default_value = "pretty")]
    format: String,
}

#[derive(Args)]
struct MonitorArgs {
    /// Pins to monitor, comma separated
    #[arg(short, long, value_delimiter = ',', required = true)]
    pins: Vec<u8>,

    /// Polling interval in milliseconds
    #[arg(short, long, default_value_t = DEFAULT_INTERVAL_MS)]
    interval: u64,

    /// Pull resistor: none, up or down
    #[arg(long, default_value = "none")]
    pull: String,
}

#[derive(Args)]
struct BlinkArgs {
    /// Output pin
    #[arg(short, long)]
    pin: u8,

    /// Full on/off period in milliseconds
    #[arg(long, default_value_t = 500)]
    period: u64,

    /// Number of on/off cycles
    #[arg(long, default_value_t = 10)]
    count: u32,
}

#[derive(Args)]
struct PwmArgs {
    /// PWM pin
    #[arg(short, long)]
    pin: u8,

    /// Duty cycle percentage (0-100)
    #[arg(long)]
    duty: f64,

    /// Frequency in Hz
    #[arg(long, default_value_t = 1000)]
    frequency: u32,

    /// How long to drive the output, in seconds
    #[arg(long, default_value_t = 5)]
    seconds: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing/logging
    init_logging(&cli)?;

    let config = match &cli.config {
        Some(path) => ControllerConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => ControllerConfig::default(),
    };
    let service = GpioService::new(config, open_driver(&cli))?;

    let result = match &cli.command {
        Some(Commands::Pins(args)) => pins_command(&service, args).await,
        Some(Commands::Monitor(args)) => monitor_command(&service, args).await,
        Some(Commands::Blink(args)) => blink_command(&service, args).await,
        Some(Commands::Pwm(args)) => pwm_command(&service, args).await,
        Some(Commands::Info) => info_command(&service, &cli).await,
        None => {
            let args = PinsArgs {
                format: "pretty".to_string(),
            };
            pins_command(&service, &args).await
        }
    };

    // Pins are returned to a safe state whatever the command did.
    service.shutdown().await;
    result
}

fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    let level = if cli.debug {
        LogLevel::DEBUG
    } else if cli.verbose {
        LogLevel::INFO
    } else {
        LogLevel::WARN
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

fn open_driver(cli: &Cli) -> Arc<dyn PinDriver> {
    if cli.mock {
        return Arc::new(MockDriver::new());
    }

    #[cfg(feature = "gpio")]
    {
        match pi_pins::RppalDriver::new() {
            Ok(driver) => return Arc::new(driver),
            Err(e) => tracing::warn!("Failed to initialize GPIO support, using mock driver: {}", e),
        }
    }

    #[cfg(not(feature = "gpio"))]
    info!("GPIO support not compiled in, using mock driver");

    Arc::new(MockDriver::new())
}

async fn pins_command(service: &GpioService, args: &PinsArgs) -> anyhow::Result<()> {
    let listing = service.list_pins().await;

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&listing)?),
        "pretty" => {
            println!("🥧 GPIO Pins");
            println!("============");
            println!("  Available: {}", join(&listing.available));
            println!("  Reserved:  {}", join(&listing.reserved));
            println!("  Hardware PWM: {}", join(&listing.hardware_pwm));
            if listing.configured.is_empty() {
                println!("  Configured: none");
            } else {
                println!("  Configured:");
                for pin in &listing.configured {
                    println!("    {:>2}: {} = {}", pin.pin, pin.mode, u8::from(pin.value));
                }
            }
        }
        other => anyhow::bail!("Unsupported format: {}. Use 'json' or 'pretty'", other),
    }

    Ok(())
}

async fn monitor_command(service: &GpioService, args: &MonitorArgs) -> anyhow::Result<()> {
    let pull: PullMode = args.pull.parse()?;
    let mut events = service.subscribe();

    for &pin in &args.pins {
        service
            .configure(pin, PinMode::Input, &PinOptions::new().with_pull(pull))
            .await?;
    }
    service
        .start_monitoring(&args.pins, Some(args.interval))
        .await?;
    info!("Monitoring {:?}, press Ctrl-C to stop", args.pins);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            event = events.recv() => match event {
                Some(event) => println!("{}", serde_json::to_string(&event)?),
                None => break,
            },
        }
    }

    service.stop_monitoring().await;
    service.events().unsubscribe(events);
    Ok(())
}

async fn blink_command(service: &GpioService, args: &BlinkArgs) -> anyhow::Result<()> {
    let half_period = Duration::from_millis((args.period / 2).max(1));
    let mut level = Level::High;

    service
        .configure(args.pin, PinMode::Output, &PinOptions::new())
        .await?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    for _ in 0..args.count.saturating_mul(2) {
        service.write(args.pin, level.into()).await?;
        level = level.toggled();

        tokio::select! {
            _ = &mut ctrl_c => break,
            _ = tokio::time::sleep(half_period) => {}
        }
    }

    Ok(())
}

async fn pwm_command(service: &GpioService, args: &PwmArgs) -> anyhow::Result<()> {
    let options = PinOptions::new()
        .with_pwm_frequency(args.frequency)
        .with_pwm_duty_cycle(args.duty);
    let pin = service.configure(args.pin, PinMode::Pwm, &options).await?;
    info!(
        "Driving pin {} at {:?}% / {:?} Hz",
        pin.pin, pin.pwm_duty_cycle, pin.pwm_frequency
    );

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = tokio::time::sleep(Duration::from_secs(args.seconds)) => {}
    }

    Ok(())
}

async fn info_command(service: &GpioService, cli: &Cli) -> anyhow::Result<()> {
    let config = service.config();

    println!("🥧 Pi Pins Information");
    println!("======================");
    println!();
    println!("Driver: {}", service.registry().driver_name());
    println!("Pin range: {}-{}", config.first_pin, config.last_pin);
    println!("Reserved pins: {}", join(&config.sorted_reserved_pins()));
    println!("Driver timeout: {}ms", config.driver_timeout_ms);
    println!("Subscriber buffer: {} events", config.subscriber_buffer);
    if let Some(path) = &cli.config {
        println!("Config file: {}", path.display());
    }

    println!();
    println!("Features compiled:");
    #[cfg(feature = "gpio")]
    println!("  - GPIO support: ✓");
    #[cfg(not(feature = "gpio"))]
    println!("  - GPIO support: ✗");

    let event = Event::MonitoringStarted {
        pins: vec![17],
        interval_ms: config.default_interval_ms,
    };
    println!();
    println!("Example event: {}", serde_json::to_string(&event)?);

    Ok(())
}

fn join(pins: &[u8]) -> String {
    pins.iter()
        .map(|pin| pin.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
