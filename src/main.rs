mod app;
mod commands;

use clap::Parser;
use color_eyre::Result;
use datapipe::{config, logging};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "datapipe")]
#[command(about = "Notes client with a cached, typed request pipeline")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/datapipe/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Principal the local cache is scoped to
  #[arg(short, long)]
  principal: Option<String>,

  #[command(subcommand)]
  command: commands::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  // Override principal if specified on command line
  let config = if let Some(principal) = args.principal {
    config::Config {
      principal: Some(principal),
      ..config
    }
  } else {
    config
  };

  let _log_guard = logging::init(&config.log)?;

  // Initialize and run the app
  let mut app = app::App::new(config)?;
  app.run(args.command).await?;

  Ok(())
}
