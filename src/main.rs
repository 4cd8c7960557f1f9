use clap::Parser;
use sensorlog_ingest::cli::{args::Args, commands};
use std::process;

fn main() {
    let args = Args::parse();

    // If no subcommand was provided, show help and available commands
    if args.command.is_none() {
        show_help_and_commands();
        process::exit(0);
    }

    let runtime = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        eprintln!("Failed to create async runtime: {}", e);
        process::exit(1);
    });

    let result = runtime.block_on(async {
        let shutdown_signal = async {
            if tokio::signal::ctrl_c().await.is_err() {
                // Without a handler, never resolve and let the command finish
                std::future::pending::<()>().await;
            }
        };

        tokio::select! {
            result = commands::run(args) => result,
            _ = shutdown_signal => {
                eprintln!("\nReceived CTRL+C, shutting down...");
                Err(anyhow::anyhow!("Processing interrupted by user"))
            }
        }
    });

    if let Err(error) = result {
        eprintln!("Error: {:#}", error);
        process::exit(1);
    }
}

/// Show help information and available commands when no subcommand is provided
fn show_help_and_commands() {
    println!("sensorlog-ingest - Datalogger Export Ingestion");
    println!("==============================================");
    println!();
    println!("Detect, parse and normalize temperature/humidity exports from");
    println!("datalogger vendor software (Elitech, Novus, Testo, ...).");
    println!();
    println!("USAGE:");
    println!("    sensorlog-ingest <COMMAND> [OPTIONS] <PATH>...");
    println!();
    println!("COMMANDS:");
    println!("    detect      Score format and vendor guesses without parsing");
    println!("    ingest      Parse and normalize files into readings");
    println!("    count       Count lines in files");
    println!("    help        Show this help message or help for specific commands");
    println!();
    println!("EXAMPLES:");
    println!("    # Ingest a folder of exports, tagging rows without a sensor column:");
    println!("    sensorlog-ingest ingest ./exports --sensor-id S-01 -v");
    println!();
    println!("    # Write normalized readings as JSON lines:");
    println!("    sensorlog-ingest ingest ELITECH_log.csv -o readings.jsonl");
    println!();
    println!("    # Check what a file looks like before ingesting:");
    println!("    sensorlog-ingest detect novus_logger.csv --output-format json");
    println!();
    println!("For detailed help on any command, use:");
    println!("    sensorlog-ingest <COMMAND> --help");
}
