use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand};
use shmbridge_core::builtin::{self, CoreState, SyncFlag};
use shmbridge_core::memory::ArenaMemory;
use shmbridge_core::platform::FixedAffinity;
use shmbridge_core::registry::Registry;
use shmbridge_core::shm::layout;
use shmbridge_core::types::{Address, ModuleId};
use shmbridge_utils::{info, init_logging_with, AgentSettings, LogConfig, LogLevel};

mod selftest;

/// Inspect and drive a shared-memory command bridge.
#[derive(Parser, Debug)]
#[command(name = "shmbridge")]
#[command(version)]
#[command(about = "Inspect and drive a shared-memory command bridge", long_about = None)]
struct Cli
{
    /// Log level (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Print the segment layout
    Layout
    {
        /// Also print the Core module command table
        #[arg(long, default_value_t = false)]
        commands: bool,
    },
    /// Run an agent and a controller in this process and exercise every Core command
    Selftest
    {
        /// Agent poll interval in microseconds (default: SHMBRIDGE_POLL_INTERVAL_US or 1000)
        #[arg(long)]
        poll_interval_us: Option<u64>,
        /// How many scalar round trips to run
        #[arg(long, default_value_t = 64)]
        rounds: u32,
    },
}

fn main()
{
    let cli = Cli::parse();

    let settings = match AgentSettings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            process::exit(2);
        }
    };

    let mut log_config = LogConfig {
        level: None,
        format: settings.log_format,
        file: settings.log_file.clone(),
    };
    if let Some(level) = cli.log_level {
        log_config = log_config.with_level(level);
    }
    let _guard = match init_logging_with(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = run_command(cli.command, &settings) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run_command(command: Commands, settings: &AgentSettings) -> Result<(), Box<dyn std::error::Error>>
{
    match command {
        Commands::Layout { commands } => {
            print_layout();
            if commands {
                println!();
                print_core_commands()?;
            }
            Ok(())
        }
        Commands::Selftest {
            poll_interval_us,
            rounds,
        } => {
            let poll_interval = poll_interval_us.map_or(settings.poll_interval, Duration::from_micros);
            info!(?poll_interval, rounds, "running self test");
            let report = selftest::run(poll_interval, rounds)?;
            report.print();
            if report.failures() > 0 {
                return Err(format!("{} of {} checks failed", report.failures(), report.len()).into());
            }
            Ok(())
        }
    }
}

fn print_layout()
{
    println!("=== Segment layout ===");
    println!("{:<10} {:>8} {:>9}", "region", "offset", "size");
    println!("{:<10} {:>8} {:>9}", "header", 0, layout::HEADER_SIZE);
    println!("{:<10} {:>8} {:>9}", "sync", layout::SYNC_OFFSET, layout::SYNC_SIZE);
    println!("{:<10} {:>8} {:>9}", "body", layout::BODY_OFFSET, layout::BODY_SIZE);
    println!("{:<10} {:>8} {:>9}", "total", "", layout::SEGMENT_SIZE);
    println!();
    println!("=== Header fields ===");
    println!("{:<10} {:>8} {:>9}", "field", "offset", "size");
    println!("{:<10} {:>8} {:>9}", "command", layout::COMMAND_OFFSET, 4);
    println!("{:<10} {:>8} {:>9}", "value", layout::VALUE_OFFSET, 4);
    println!("{:<10} {:>8} {:>9}", "address", layout::ADDRESS_OFFSET, 8);
    println!("{:<10} {:>8} {:>9}", "length", layout::LENGTH_OFFSET, 4);
    println!("{:<10} {:>8} {:>9}", "error", layout::ERROR_OFFSET, 4);
}

fn print_core_commands() -> Result<(), Box<dyn std::error::Error>>
{
    // The table does not depend on the state, any memory will do
    let state = CoreState::new(
        Box::new(ArenaMemory::new(Address::new(0x1000), 1)),
        Box::new(FixedAffinity(1)),
        SyncFlag::new(),
    );
    let registry = Registry::new(builtin::module(state)?);
    let commands = registry.commands(ModuleId::CORE).unwrap_or_default();

    println!("=== Core module v{} ===", builtin::CORE_VERSION);
    println!("{:>3}  {:<24} {:<13} {:>4}", "id", "name", "kind", "next");
    for (id, command) in commands.iter().enumerate() {
        let next = command.next.map_or_else(|| "-".to_string(), |next| next.to_string());
        println!("{:>3}  {:<24} {:<13} {:>4}", id, command.name, command.kind.to_string(), next);
    }
    Ok(())
}
