use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::path::PathBuf;
use tinynet::{setup_tracing, AppError, AppResult, EchoConfig, EchoService, GLOBAL_CONFIG};
use tokio::runtime;
use tracing::info;

#[derive(Parser)]
#[command(version, about = "Echo server on top of the tinynet socket layer")]
pub struct CommandLine {
    /// path to config file
    #[arg(short, long)]
    pub conf: Option<String>,
    #[command(subcommand)]
    pub command: Option<Command>,
    /// log level (v: info, vv: debug, vvv: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// print the effective configuration and exit
    PrintConfig,
}

fn log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn main() -> AppResult<()> {
    // load .env file
    dotenv().ok();

    //setup config
    let commandline: CommandLine = CommandLine::parse();
    let config_path = commandline.conf.as_ref().map_or_else(
        || {
            let mut path = PathBuf::from("./");
            path.push("conf.toml");
            path
        },
        PathBuf::from,
    );
    let echo_config = EchoConfig::set_up_config(config_path)?;

    if let Some(Command::PrintConfig) = commandline.command {
        println!("{:#?}", echo_config);
        return Ok(());
    }

    let _log_guard = setup_tracing(&echo_config.log, log_level(commandline.verbose))?;
    GLOBAL_CONFIG
        .set(echo_config)
        .map_err(|_| AppError::IllegalStateError("echo config already set".into()))?;

    // startup tokio runtime
    let rt = runtime::Builder::new_multi_thread().enable_all().build()?;

    info!("starting echo service");
    EchoService::new().start(&rt)?;

    Ok(())
}
