//! Command line entry point of the Yosemite Valley Lodge availability checker.

use std::path::PathBuf;

use clap::Parser;
use lodge_scan::{RunMode, ScanError, load_config, parse_cli_date};

mod check_manager;
mod logging;

use check_manager::CheckManager;

/// Watches Yosemite Valley Lodge for open weekend nights and emails new openings
#[derive(Debug, Parser)]
#[command(name = "lodge_checker", version, about)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Run a single check and exit
    #[arg(short, long)]
    single_run: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Send a test email and exit
    #[arg(short, long)]
    test_email: bool,

    /// Check one specific date and exit
    #[arg(long, value_name = "MM-DD-YYYY")]
    date: Option<String>,

    /// Log file, appended to on every run
    #[arg(long, default_value = "yosemite_checker.log")]
    log_file: PathBuf,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    logging::init(cli.debug, &cli.log_file)?;

    if cli.debug {
        log::debug!("Debug logging enabled");
    }

    let config = load_config(&cli.config);
    let manager = CheckManager::new(config);

    if cli.test_email {
        log::info!("Sending test email...");
        if let Err(e) = manager
            .send_test_email(chrono::Local::now().date_naive())
            .await
        {
            log::error!("Failed to send test email: {}", e);
        }
        return Ok(());
    }

    if let Some(raw) = cli.date.as_deref() {
        let date = match parse_cli_date(raw) {
            Ok(date) => date,
            Err(e) => {
                log::error!("{}", e);
                return Ok(());
            }
        };

        match manager.check_date(date).await {
            Ok(true) => log::info!("Date {} is available", raw),
            Ok(false) => log::info!("Date {} is not available", raw),
            Err(e @ ScanError::ConfigError(_)) => return Err(e.into()),
            Err(e) => log::error!("Error checking {}: {}", raw, e),
        }
        return Ok(());
    }

    let mode = if cli.single_run {
        RunMode::SingleRun
    } else {
        RunMode::Continuous
    };
    manager.run(mode).await?;

    log::info!("Checker stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["lodge_checker"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("config.json"));
        assert_eq!(cli.log_file, PathBuf::from("yosemite_checker.log"));
        assert!(!cli.single_run && !cli.debug && !cli.test_email);
        assert!(cli.date.is_none());
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::try_parse_from([
            "lodge_checker",
            "-c",
            "other.json",
            "-s",
            "-d",
            "--date",
            "04-04-2025",
        ])
        .unwrap();

        assert_eq!(cli.config, PathBuf::from("other.json"));
        assert!(cli.single_run);
        assert!(cli.debug);
        assert_eq!(cli.date.as_deref(), Some("04-04-2025"));
    }

    #[test]
    fn test_cli_long_flags() {
        let cli = Cli::try_parse_from(["lodge_checker", "--single-run", "--test-email"]).unwrap();
        assert!(cli.single_run);
        assert!(cli.test_email);
    }
}
