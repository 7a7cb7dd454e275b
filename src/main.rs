//! bblogger - Broadband Modem Statistics Logger Binary
//!
//! Logs DSL line statistics from a modem's web interface for a fixed period.

use anyhow::Context;
use bblogger::{
    resolve, Defaults, ModemSession, OutputFormat, OutputWriter, Overrides, RunOutcome,
    Scheduler, Settings, ShutdownFlag, SystemClock, TerminalPrompter, TokioSleeper,
    DEFAULT_MODEM_ADDRESS,
};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{debug, info, Level};
use tracing_subscriber::{filter::LevelFilter, EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "bblogger")]
#[command(about = "Broadband modem line statistics logger")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = "Logs in to a DSL modem's web interface at a fixed interval and \
appends its line statistics to a dump or CSV log")]
struct Cli {
    /// Modem address, or the name of a profile in the settings file
    #[arg(default_value = DEFAULT_MODEM_ADDRESS)]
    modem: String,

    /// Account used to log in to the modem
    #[arg(short, long)]
    user: Option<String>,

    /// Password (prompted for when not given here or in the profile)
    #[arg(short, long)]
    password: Option<String>,

    /// Total logging duration in hours
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
    duration: Option<u64>,

    /// Time between checks in minutes
    #[arg(short = 't', long, value_parser = clap::value_parser!(u64).range(1..))]
    interval: Option<u64>,

    /// Output format
    #[arg(short, long, value_enum)]
    output: Option<OutputFormat>,

    /// Write one file per calendar day
    #[arg(short = 'f', long)]
    daily: bool,

    /// Settings file with named modem profiles
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory output files are written to
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Output file name without extension (a date is appended with --daily)
    #[arg(long, value_name = "STEM")]
    output_file: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            modem: Some(self.modem.clone()),
            account: self.user.clone(),
            password: self.password.clone(),
            interval: self.interval,
            duration: self.duration,
            format: self.output,
            daily_split: self.daily.then_some(true),
            output_dir: self.output_dir.clone(),
            output_file: self.output_file.clone(),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing/logging
    init_logging(&cli)?;

    // Print banner
    print_banner();

    let settings = load_settings(cli.config.as_deref())?;
    let profile = settings.profile(&cli.modem);
    match profile {
        Some(_) => info!("Using profile '{}'", cli.modem),
        None => {
            let known: Vec<&str> = settings.profile_names().collect();
            if !known.is_empty() {
                debug!(
                    "'{}' is not a profile ({}); using it as the modem address",
                    cli.modem,
                    known.join(", ")
                );
            }
        }
    }

    let config = resolve(&Defaults::default(), profile, &cli.overrides(), &TerminalPrompter)
        .context("Failed to resolve configuration")?;
    debug!("Effective configuration: {:?}", config);

    let mut modem = ModemSession::with_http(&config)?;
    let mut writer = OutputWriter::new(&config);
    println!(
        "   Modem: {} ({}), every {} min for {} h",
        config.address, config.format, config.interval_minutes, config.duration_hours
    );
    println!("   Output: {}", config.output_dir.display());
    println!();

    let shutdown = ShutdownFlag::new();
    let listener = shutdown.listen_for_ctrl_c();

    let mut scheduler = Scheduler::new(SystemClock, TokioSleeper, shutdown);
    let result = scheduler.run(&config, &mut modem, &mut writer).await;
    listener.abort();

    let summary = result.with_context(|| format!("Logging from {} failed", config.address))?;
    let verb = match summary.outcome {
        RunOutcome::Completed => "Finished",
        RunOutcome::Cancelled => "Interrupted",
    };
    println!(
        "{}: {} records written, {} polls skipped",
        verb, summary.records_written, summary.ticks_skipped
    );

    Ok(())
}

fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    let level = if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else {
        Level::WARN
    };

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let settings = match path {
        Some(path) => Settings::load(path)?,
        None => Settings::load_default()?,
    };
    Ok(settings)
}

fn print_banner() {
    println!("bblogger - Broadband Modem Statistics Logger");
    println!("   Version: {}", env!("CARGO_PKG_VERSION"));
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from([
            "bblogger", "home", "-u", "support", "-d", "48", "-t", "5", "-o", "csv", "-f",
        ])
        .unwrap();
        assert_eq!(cli.modem, "home");
        assert_eq!(cli.user.as_deref(), Some("support"));
        assert_eq!(cli.duration, Some(48));
        assert_eq!(cli.interval, Some(5));
        assert_eq!(cli.output, Some(OutputFormat::Csv));
        assert!(cli.daily);
        assert!(!cli.debug);

        let overrides = cli.overrides();
        assert_eq!(overrides.modem.as_deref(), Some("home"));
        assert_eq!(overrides.daily_split, Some(true));
    }

    #[test]
    fn test_default_values() {
        let cli = Cli::try_parse_from(["bblogger"]).unwrap();
        assert_eq!(cli.modem, DEFAULT_MODEM_ADDRESS);
        assert_eq!(cli.duration, None);
        assert_eq!(cli.interval, None);
        assert_eq!(cli.output, None);
        assert!(!cli.daily);
        assert_eq!(cli.overrides().daily_split, None);
        assert_eq!(cli.overrides().output_file, None);
    }

    #[test]
    fn test_output_file_is_separate_from_format() {
        let cli = Cli::try_parse_from([
            "bblogger", "-o", "csv", "--output-file", "line-check", "--output-dir", "/tmp",
        ])
        .unwrap();
        assert_eq!(cli.output, Some(OutputFormat::Csv));

        let overrides = cli.overrides();
        assert_eq!(overrides.output_file.as_deref(), Some("line-check"));
        assert_eq!(overrides.format, Some(OutputFormat::Csv));
        assert!(Cli::try_parse_from(["bblogger", "-o", "line-check"]).is_err());
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(Cli::try_parse_from(["bblogger", "-t", "0"]).is_err());
        assert!(Cli::try_parse_from(["bblogger", "-d", "0"]).is_err());
        assert!(Cli::try_parse_from(["bblogger", "-o", "xml"]).is_err());
    }

    #[test]
    fn test_debug_is_long_only() {
        let cli = Cli::try_parse_from(["bblogger", "--debug", "-v"]).unwrap();
        assert!(cli.debug);
        assert!(cli.verbose);
    }
}
