mod config;

use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{LevelFilter, error, info};
use rusty_pathway::{PathwayClient, Response, WatchField};
use std::path::PathBuf;
use std::time::Duration;

/// Pathway control tool
#[derive(Parser, Debug)]
#[command(name = "pathway-ctl")]
#[command(about = "Command-line control for the Medoc Pathway thermal stimulator", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Device IP address (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Device port (overrides config)
    #[arg(long)]
    port: Option<u16>,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Print the decoded response as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: CtlCommand,
}

#[derive(Subcommand, Debug)]
enum CtlCommand {
    /// Query device status
    Status,
    /// Load a test program by protocol number
    Program {
        #[arg(value_name = "NUMBER")]
        number: u32,
    },
    /// Start the loaded test program
    Start,
    /// Pause the running test
    Pause,
    /// Trigger the stimulation
    Trigger,
    /// Stop the running test
    Stop,
    /// Abort the running test
    Abort,
    /// Answer a device prompt with yes
    Yes,
    /// Answer a device prompt with no
    No,
    /// Poll status until a field reaches a value
    Wait {
        /// Field to watch (pathway_state, test_state, result, command_id)
        #[arg(long, default_value = "test_state")]
        field: WatchField,

        /// Desired value, e.g. RUNNING
        #[arg(value_name = "VALUE")]
        value: String,

        /// Seconds between polls
        #[arg(long, default_value_t = 0.5)]
        interval: f64,

        /// Polling attempt limit; 0 or less polls forever
        #[arg(long, default_value_t = -1)]
        max: i32,

        /// Extra settle seconds applied after the value is reached
        #[arg(long, default_value_t = 1.0)]
        lag: f64,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let cfg = config::load_config_or_default(args.config.as_deref());

    let log_level = args
        .log_level
        .clone()
        .unwrap_or_else(|| cfg.console.verbosity.clone());
    initialize_logging(&log_level)?;

    let host = args.host.clone().unwrap_or_else(|| cfg.device.host_ip.clone());
    let port = args.port.unwrap_or(cfg.device.port);
    info!("Pathway: {host}:{port}");

    let client = PathwayClient::builder()
        .address(&host)
        .port(port)
        .connect_timeout(Duration::from_secs_f64(cfg.device.timeout_secs))
        .read_timeout(Duration::from_secs_f64(cfg.device.timeout_secs))
        .buffer_size(cfg.device.buffer_size)
        .settle_delay(Duration::from_millis(cfg.device.settle_delay_ms))
        .build()?;

    match args.command {
        CtlCommand::Status => report(&client.status()?, args.json)?,
        CtlCommand::Program { number } => report(&client.program(number)?, args.json)?,
        CtlCommand::Start => report(&client.start()?, args.json)?,
        CtlCommand::Pause => report(&client.pause()?, args.json)?,
        CtlCommand::Trigger => report(&client.trigger()?, args.json)?,
        CtlCommand::Stop => report(&client.stop()?, args.json)?,
        CtlCommand::Abort => report(&client.abort()?, args.json)?,
        CtlCommand::Yes => report(&client.yes()?, args.json)?,
        CtlCommand::No => report(&client.no()?, args.json)?,
        CtlCommand::Wait {
            field,
            value,
            interval,
            max,
            lag,
        } => {
            // The library's polling loop blocks with no cancellation
            // primitive; the interrupt handler is the caller-side escape.
            install_interrupt_handler();
            let reached = client.poll_for_change(
                field,
                &value,
                Duration::from_secs_f64(interval),
                max,
                true,
                Duration::from_secs_f64(lag),
            )?;
            if reached {
                info!("{field} reached {value}");
            } else {
                error!("{field} did not reach {value} within {max} polls");
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn report(response: &Response, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(response)?);
    } else {
        println!("command_id: {}", response.command_id);
        println!("pathway_state: {}", response.pathway_state);
        println!("test_state: {}", response.test_state);
        println!("result: {}", response.result);
        println!("test_time: {}", response.test_time);
        println!("time_stamp: {}", response.time_stamp_utc());
        if let Some(message) = &response.error_message {
            println!("error_message: {message}");
        }
    }
    Ok(())
}

/// Setup Ctrl+C handler so an unbounded wait can be abandoned cleanly
fn install_interrupt_handler() {
    ctrlc::set_handler(|| {
        info!("Ctrl+C received - stopping wait");
        std::process::exit(130);
    })
    .expect("Error setting Ctrl+C handler");
}

/// Initialize logging with configurable level
fn initialize_logging(log_level: &str) -> Result<(), Box<dyn std::error::Error>> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        _ => {
            eprintln!("Warning: Invalid log level '{}', using 'info'", log_level);
            LevelFilter::Info
        }
    };

    env_logger::Builder::from_env(Env::default())
        .filter_level(level)
        .format_timestamp_millis()
        .init();

    Ok(())
}
