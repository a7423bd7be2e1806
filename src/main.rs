mod cli;
mod config;
mod report;
mod tools;

use clap::Parser;
use cli::Cli;
use colored::Colorize;

const BANNER: &str = r#"
  ╔══════════════════════════════════════════════╗
  ║            🧰 toolkeep                       ║
  ║   File, Data, Network & System Utilities     ║
  ╚══════════════════════════════════════════════╝
"#;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new(&config.general.log_level))
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    if !config.general.color {
        colored::control::set_override(false);
    }

    if !cli.quiet {
        eprintln!("{}", BANNER.green());
    }

    cli.run(config).await
}
