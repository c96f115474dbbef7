//! forgerules: convert geosite.dat to JSON and geoip.dat to MMDB.

use clap::{CommandFactory, Parser, Subcommand};
use forgerules::batch::{self, BatchConfig};
use forgerules::converter::{convert_geoip_file, convert_geosite_file, ConvertOptions};
use forgerules::mmdb::{CountryLookup, WriterOptions};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "forgerules")]
#[command(version)]
#[command(about = "Convert geosite.dat to JSON and geoip.dat to MMDB", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert geosite.dat and/or geoip.dat
    Convert {
        /// Input geosite.dat file path
        #[arg(long)]
        geosite_input: Option<PathBuf>,

        /// Output geosite.json file path
        #[arg(long, default_value = "geosite.json")]
        geosite_output: PathBuf,

        /// Input geoip.dat file path
        #[arg(long)]
        geoip_input: Option<PathBuf>,

        /// Output geoip.mmdb file path
        #[arg(long, default_value = "geoip.mmdb")]
        geoip_output: PathBuf,

        /// Fail on CIDRs the database refuses (reserved networks are still skipped)
        #[arg(long)]
        strict: bool,

        /// MMDB record size in bits (24, 28 or 32)
        #[arg(long, default_value_t = 28)]
        record_size: u16,
    },

    /// Run the conversions listed in a YAML batch file
    Batch {
        /// Batch config file
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Look up the country of addresses in a generated MMDB
    Lookup {
        /// MMDB file
        #[arg(short, long, default_value = "geoip.mmdb")]
        db: PathBuf,

        /// Addresses to look up
        #[arg(required = true)]
        ips: Vec<IpAddr>,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let result = match cli.command {
        Commands::Convert {
            geosite_input,
            geosite_output,
            geoip_input,
            geoip_output,
            strict,
            record_size,
        } => {
            if geosite_input.is_none() && geoip_input.is_none() {
                if let Err(e) = Cli::command().print_help() {
                    eprintln!("Error: {}", e);
                }
                eprintln!("\nError: at least one of --geosite-input or --geoip-input is required");
                std::process::exit(1);
            }
            convert(
                geosite_input.map(|input| (input, geosite_output)),
                geoip_input.map(|input| (input, geoip_output)),
                strict,
                record_size,
            )
        }
        Commands::Batch { config } => run_batch(&config),
        Commands::Lookup { db, ips } => lookup(&db, &ips),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn convert(
    geosite: Option<(PathBuf, PathBuf)>,
    geoip: Option<(PathBuf, PathBuf)>,
    strict: bool,
    record_size: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some((input, output)) = geosite {
        println!("Converting {} to {}...", input.display(), output.display());
        convert_geosite_file(&input, &output)
            .map_err(|e| format!("converting geosite: {}", e))?;
        println!("Successfully converted geosite to {}", output.display());
    }

    if let Some((input, output)) = geoip {
        println!("Converting {} to {}...", input.display(), output.display());
        let options = ConvertOptions {
            strict,
            writer: WriterOptions {
                record_size,
                ..Default::default()
            },
        };
        let report = convert_geoip_file(&input, &output, &options)
            .map_err(|e| format!("converting geoip: {}", e))?;
        if report.warnings() > 0 {
            println!(
                "Warning: skipped {} invalid CIDRs, {} insertions failed",
                report.invalid, report.failed
            );
        }
        println!("Successfully converted geoip to {}", output.display());
    }

    println!("\nConversion completed successfully!");
    Ok(())
}

fn run_batch(config: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = BatchConfig::load(config)?;
    let summary = batch::run(&config);

    for result in &summary.results {
        match &result.outcome {
            Ok(report) => {
                println!("  ok    {} ({}): {}", result.label, result.kind, report);
                if let Some(output) = report.output() {
                    println!("        -> {}", output.display());
                }
            }
            Err(e) => println!("  FAIL  {} ({}): {}", result.label, result.kind, e),
        }
    }

    println!(
        "\n{}/{} jobs completed",
        summary.succeeded(),
        summary.results.len()
    );

    if !summary.is_success() {
        return Err("one or more jobs failed".into());
    }
    Ok(())
}

fn lookup(db: &Path, ips: &[IpAddr]) -> Result<(), Box<dyn std::error::Error>> {
    let lookup = CountryLookup::open(db)?;
    for ip in ips {
        match lookup.country(*ip)? {
            Some(code) => println!("{}\t{}", ip, code),
            None => println!("{}\t-", ip),
        }
    }
    Ok(())
}
