//! VLM-guided Android app explorer.
//!
//! `explorer run` drives one app through labeled-screenshot rounds until the
//! task finishes, the round budget runs out, or Ctrl-C is pressed.
//! `explorer devices` lists attached adb devices.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};

use explorer::core::state::RunStatus;
use explorer::error::SetupError;
use explorer::exit_codes;
use explorer::io::config::{CliOverrides, Provider, resolve_config};
use explorer::io::device::{AdbDevice, list_devices};
use explorer::io::model::HttpModel;
use explorer::logging;
use explorer::start::{RunRequest, run_session, select_device};

#[derive(Parser)]
#[command(
    name = "explorer",
    version,
    about = "Explore an Android app with a vision-language model"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Launch an app and run exploration rounds against it.
    Run(RunArgs),
    /// List serials of attached devices.
    Devices {
        /// Config file (missing file means defaults).
        #[arg(long, default_value = "config.toml")]
        config: PathBuf,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Name used for the app's workspace directory.
    #[arg(long)]
    app_name: String,
    /// Android package to launch, e.g. `com.android.deskclock`.
    #[arg(long)]
    package_name: String,
    /// Task to complete or exploration directive.
    #[arg(long)]
    description: String,
    /// Model provider: openai, qwen or gemini.
    #[arg(long)]
    model: Option<Provider>,
    /// API key for the selected provider.
    #[arg(long)]
    api_key: Option<String>,
    /// Device serial; required when more than one device is attached.
    #[arg(long)]
    device: Option<String>,
    /// Root under which `apps/<app-name>/` is created.
    #[arg(long, default_value = ".")]
    root_dir: PathBuf,
    /// Config file (missing file means defaults).
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            let code = if err.downcast_ref::<SetupError>().is_some() {
                error!(status = ?RunStatus::FinishedError, "setup failed");
                exit_codes::SETUP_FAILURE
            } else {
                exit_codes::FAILURE
            };
            eprintln!("{:#}", err);
            std::process::exit(code);
        }
    }
}

fn run() -> Result<i32> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => cmd_run(args),
        Command::Devices { config } => cmd_devices(config),
    }
}

fn cmd_run(args: RunArgs) -> Result<i32> {
    let overrides = CliOverrides {
        provider: args.model,
        api_key: args.api_key,
        serial: args.device,
    };
    let config = resolve_config(&args.config, |key| std::env::var(key).ok(), &overrides)?;
    let api_key = config.api_key()?;

    let serials = list_devices(&config.device).context("list adb devices")?;
    let serial = select_device(&serials, config.device.serial.as_deref())?;
    info!(serial = %serial, provider = config.model.provider.as_str(), "starting session");

    let device = AdbDevice::new(serial, &config.device);
    let model = HttpModel::new(&config.model, api_key).context("build model client")?;

    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
        .context("failed to set ctrl-c handler")?;

    let request = RunRequest {
        app_name: args.app_name,
        package_name: args.package_name,
        description: args.description,
        root_dir: args.root_dir,
    };
    let report = run_session(&device, &model, &config, &request, &stop)?;
    let outcome = &report.outcome;

    println!(
        "{} session ended: {:?} after {} round(s)",
        report.mode, outcome.status, outcome.rounds_played
    );
    println!("logs: {}", report.session_dir.join("logs").display());
    if let Some(err) = &outcome.error {
        eprintln!("session aborted: {err}");
        return Ok(exit_codes::FAILURE);
    }
    Ok(exit_codes::OK)
}

fn cmd_devices(config_path: PathBuf) -> Result<i32> {
    let config = resolve_config(
        &config_path,
        |key| std::env::var(key).ok(),
        &CliOverrides::default(),
    )?;
    let serials = list_devices(&config.device).context("list adb devices")?;
    if serials.is_empty() {
        eprintln!("no devices attached");
    }
    for serial in serials {
        println!("{serial}");
    }
    Ok(exit_codes::OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_run_with_required_flags() {
        let cli = Cli::parse_from([
            "explorer",
            "run",
            "--app-name",
            "Clock",
            "--package-name",
            "com.android.deskclock",
            "--description",
            "set an alarm for 7am",
        ]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.app_name, "Clock");
        assert_eq!(args.model, None);
        assert_eq!(args.root_dir, PathBuf::from("."));
        assert_eq!(args.config, PathBuf::from("config.toml"));
    }

    #[test]
    fn parse_run_overrides() {
        let cli = Cli::parse_from([
            "explorer",
            "run",
            "--app-name",
            "Clock",
            "--package-name",
            "p",
            "--description",
            "d",
            "--model",
            "Gemini",
            "--device",
            "emulator-5554",
        ]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.model, Some(Provider::Gemini));
        assert_eq!(args.device.as_deref(), Some("emulator-5554"));
    }

    #[test]
    fn run_requires_description() {
        let result = Cli::try_parse_from([
            "explorer",
            "run",
            "--app-name",
            "Clock",
            "--package-name",
            "p",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn parse_devices() {
        let cli = Cli::parse_from(["explorer", "devices"]);
        assert!(matches!(cli.command, Command::Devices { .. }));
    }
}
