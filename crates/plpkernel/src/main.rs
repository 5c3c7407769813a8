use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::{debug, error};
use serde_json::Value;

use plpkernel_core::kernel::constants;
use plpkernel_core::{ConfigData, Kernel, KernelError, LogLevel};

/// plpkernel: inspect and drive a service kernel from the command line
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    /// Directory holding kernel.* and per-service config files
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Root the default logs/ and configs/ directories derive from
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List registered services
    Services,
    /// Resolve a service by name
    Resolve { name: String },
    /// Print a merged configuration value
    Config {
        key: String,
        /// JSON value printed when the key is absent
        #[arg(long, default_value = "false")]
        default: String,
    },
    /// Read `<file>.<key>` through the config service
    Lookup { path: String },
    /// Append a line to <log_path>/<service>/<log>.log
    Log {
        service: String,
        log_name: String,
        level: String,
        message: String,
        /// Context entries as key=value
        #[arg(long = "context", value_name = "KEY=VALUE")]
        context: Vec<String>,
    },
    /// Record an error for a service
    ReportError {
        service: String,
        message: String,
        #[arg(long, default_value_t = 0)]
        code: i64,
        /// Log at alert level and exit with failure
        #[arg(long)]
        fatal: bool,
        #[arg(long = "context", value_name = "KEY=VALUE")]
        context: Vec<String>,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = CliArgs::parse();
    debug!("Parsed args: {:?}", args);

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: CliArgs) -> Result<ExitCode, KernelError> {
    let mut builder = Kernel::builder();
    if let Some(dir) = args.config_dir {
        builder = builder.config_dir(dir);
    }
    if let Some(root) = args.root {
        builder = builder.root_path(root);
    }
    let kernel = builder.build()?;

    match args.command {
        Commands::Services => {
            for registration in kernel.registrations() {
                let state = if kernel.is_instantiated(registration.name()) {
                    "instantiated"
                } else {
                    "pending"
                };
                println!(
                    "{}\t{}\t{}\t{}",
                    registration.name(),
                    registration.mode(),
                    registration.source_id(),
                    state
                );
            }
        }
        Commands::Resolve { name } => match kernel.resolve(&name)? {
            Some(_) => println!("resolved: {}", name),
            None => println!("not found: {}", name),
        },
        Commands::Config { key, default } => {
            let default = parse_value(&default);
            println!("{}", kernel.get_config_value(&key, default));
        }
        Commands::Lookup { path } => match kernel.config()?.get_value(&path)? {
            Some(value) => println!("{}", value),
            None => println!("not found: {}", path),
        },
        Commands::Log {
            service,
            log_name,
            level,
            message,
            context,
        } => {
            let level: LogLevel = level.parse()?;
            let context = parse_context(&context)?;
            kernel.log(&service, &log_name, level, &message, &context)?;
            println!(
                "logged to {}",
                kernel.logger()?.log_file_path(&service, &log_name).display()
            );
        }
        Commands::ReportError {
            service,
            message,
            code,
            fatal,
            context,
        } => {
            let context = parse_context(&context)?;
            kernel.report_error(&service, &message, code, &context, fatal)?;
            println!(
                "reported to {}",
                kernel
                    .logger()?
                    .log_file_path(&service, constants::ERROR_LOG_NAME)
                    .display()
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// JSON when it parses, a plain string otherwise
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn parse_context(entries: &[String]) -> Result<ConfigData, KernelError> {
    let mut context = ConfigData::new();
    for entry in entries {
        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| KernelError::Other(format!("Context entry '{}' is not KEY=VALUE", entry)))?;
        context.insert(key, parse_value(value));
    }
    Ok(context)
}
