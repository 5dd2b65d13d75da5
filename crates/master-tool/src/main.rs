//! # master-tool
//!
//! Inspect and edit the memory of a master controller.
//!
//! # Usage
//!
//! ```bash
//! # Against a simulated core master
//! master-tool -s core models
//! master-tool -s core set OutputConfiguration -i 3 timer_type=ABSOLUTE name=hall
//! master-tool -s core get OutputConfiguration -i 3
//!
//! # Against a real master described by a config file
//! master-tool -c /etc/master/gateway.yaml version
//! master-tool -c /etc/master/gateway.yaml --json dump eeprom 1
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use master_memory::{InvalidateScope, MemoryBank, PageId};
use master_protocol::HardwareFamily;
use master_tool::{Gateway, GatewayConfig, ToolError};
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

/// Master memory tool
#[derive(Parser, Debug)]
#[command(name = "master-tool")]
#[command(version)]
#[command(about = "Read and write typed memory models of a master controller")]
#[command(long_about = None)]
struct Args {
    /// Gateway configuration file
    #[arg(short, long, value_name = "FILE", conflicts_with = "simulate")]
    config: Option<PathBuf>,

    /// Use a simulated master of this family instead of a config file
    #[arg(short = 's', long, value_name = "FAMILY", value_parser = parse_family)]
    simulate: Option<HardwareFamily>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Print results and logs as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the models of the family with their record counts
    Models,
    /// Print every field of a record
    Get {
        /// Model name
        model: String,
        /// Record index
        #[arg(short, long, default_value_t = 0)]
        index: u16,
    },
    /// Set fields of a record and save it
    Set {
        /// Model name
        model: String,
        /// Record index
        #[arg(short, long, default_value_t = 0)]
        index: u16,
        /// Assignments as `field=value` or `composite.member=value`
        #[arg(required = true, value_parser = parse_assignment)]
        values: Vec<(String, String)>,
    },
    /// Hex dump of one page, read from the device
    Dump {
        /// eeprom or fram
        #[arg(value_parser = parse_bank)]
        bank: MemoryBank,
        /// Page number
        page: u16,
    },
    /// Print the firmware version
    Version,
    /// Drop the cache and re-read the pages it held
    Invalidate,
}

fn parse_family(text: &str) -> Result<HardwareFamily, String> {
    match text.to_ascii_lowercase().as_str() {
        "classic" => Ok(HardwareFamily::Classic),
        "core" => Ok(HardwareFamily::Core),
        other => Err(format!("unknown family '{}', expected classic or core", other)),
    }
}

fn parse_bank(text: &str) -> Result<MemoryBank, String> {
    MemoryBank::from_name(text).ok_or_else(|| format!("unknown bank '{}', expected eeprom or fram", text))
}

fn parse_assignment(text: &str) -> Result<(String, String), String> {
    match text.split_once('=') {
        Some((path, value)) if !path.is_empty() => Ok((path.to_string(), value.to_string())),
        _ => Err(format!("expected field=value, got '{}'", text)),
    }
}

fn main() {
    if let Err(e) = run() {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), ToolError> {
    let args = Args::parse();
    setup_tracing(&args);
    master_metrics::describe_metrics();

    let config = match (&args.config, args.simulate) {
        (Some(path), _) => GatewayConfig::load(path)?,
        (None, Some(family)) => GatewayConfig::simulated(family),
        (None, None) => return Err(ToolError::Usage("either --config or --simulate is required".into())),
    };
    info!("master-tool v{} ({})", env!("CARGO_PKG_VERSION"), config.family.as_str());

    let gateway = Gateway::open(&config)?;
    let controller = gateway.controller();

    match args.command {
        Command::Models => {
            let mut rows = Vec::new();
            for model in controller.models() {
                rows.push((model.name, controller.record_count(model.name)?));
            }
            if args.json {
                let rows: Vec<_> = rows
                    .iter()
                    .map(|(name, count)| serde_json::json!({ "model": name, "records": count }))
                    .collect();
                print_json(&rows);
            } else {
                for (name, count) in rows {
                    println!("{:<40} {}", name, count);
                }
            }
        }
        Command::Get { model, index } => {
            let instance = controller.load(&model, index)?;
            print_values(&instance.values()?, args.json);
        }
        Command::Set { model, index, values } => {
            let mut instance = controller.load(&model, index)?;
            for (path, text) in &values {
                instance.set_text(path, text)?;
            }
            instance.save()?;
            info!(model = %model, index, fields = values.len(), "record saved");
            print_values(&instance.values()?, args.json);
        }
        Command::Dump { bank, page } => {
            let data = controller.read_raw(PageId::new(bank, page))?;
            if args.json {
                print_json(&serde_json::json!({ "bank": bank, "page": page, "data": data }));
            } else {
                for (row, chunk) in data.chunks(16).enumerate() {
                    let hex: Vec<String> = chunk.iter().map(|b| format!("{:02x}", b)).collect();
                    println!("{:03x}: {}", row * 16, hex.join(" "));
                }
            }
        }
        Command::Version => {
            let version = gateway.firmware_version()?;
            if args.json {
                print_json(&version);
            } else {
                println!("{} {}", gateway.family().as_str(), version);
            }
        }
        Command::Invalidate => {
            let pages = controller.resync(InvalidateScope::All)?;
            if args.json {
                print_json(&pages);
            } else {
                println!("{} pages re-read", pages.len());
            }
        }
    }
    Ok(())
}

fn print_values(values: &[(String, master_memory::FieldValue)], json: bool) {
    if json {
        let map: serde_json::Map<String, serde_json::Value> = values
            .iter()
            .map(|(path, value)| (path.clone(), serde_json::to_value(value).unwrap_or(serde_json::Value::Null)))
            .collect();
        print_json(&map);
    } else {
        for (path, value) in values {
            println!("{:<32} {}", path, value);
        }
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => error!("cannot encode output: {}", e),
    }
}

fn setup_tracing(args: &Args) {
    let level = if args.verbose { Level::DEBUG } else { Level::WARN };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_arguments() {
        let args = Args::try_parse_from([
            "master-tool",
            "-s",
            "core",
            "set",
            "OutputConfiguration",
            "-i",
            "3",
            "timer_type=ABSOLUTE",
            "dali_output.dali_output_id=7",
        ])
        .expect("parse");
        assert_eq!(args.simulate, Some(HardwareFamily::Core));
        match args.command {
            Command::Set { model, index, values } => {
                assert_eq!(model, "OutputConfiguration");
                assert_eq!(index, 3);
                assert_eq!(values[1], ("dali_output.dali_output_id".to_string(), "7".to_string()));
            }
            other => panic!("unexpected command {:?}", other),
        }

        assert!(Args::try_parse_from(["master-tool", "-s", "gold", "models"]).is_err());
        assert!(Args::try_parse_from(["master-tool", "-s", "core", "set", "X", "novalue"]).is_err());
        assert!(Args::try_parse_from(["master-tool", "-s", "core", "-c", "x.yaml", "models"]).is_err());
    }

    #[test]
    fn test_parse_dump() {
        let args = Args::try_parse_from(["master-tool", "-s", "classic", "dump", "eeprom", "12"]).expect("parse");
        assert!(matches!(
            args.command,
            Command::Dump {
                bank: MemoryBank::Eeprom,
                page: 12
            }
        ));
    }
}
