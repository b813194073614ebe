//! Rally Screener - momentum stock screening CLI.

use anyhow::Result;
use clap::Parser;
use tracing::info;

use rally_common::config::config_dir;
use rally_common::config_loader::present_files;
use rally_common::logging::init_logging;
use rally_common::{Error, SourceKind, Validate};
use rally_screener::cli::{self, Cli, Commands, RunArgs};
use rally_screener::data::{HttpMarketSource, SnapshotSource};
use rally_screener::screener::ReportFormat;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::Config { config } => show_config(config.as_deref()),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(exit_code(&e));
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let mut config = cli::load_config(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate().map_err(Error::from)?;

    init_logging(&config.observability);
    info!("Rally Screener v{}", env!("CARGO_PKG_VERSION"));

    let format: ReportFormat = config.output.format.parse().map_err(Error::InvalidInput)?;
    let as_of = args.as_of();

    let report = match config.source.kind {
        SourceKind::Snapshot => {
            let path = cli::snapshot_path(&config)?;
            let source = SnapshotSource::from_file(&path)?;
            info!(path = %path.display(), tickers = source.len(), "Using snapshot source");
            rally_screener::screen(&config, source, as_of).await?
        }
        SourceKind::Http => {
            let source = HttpMarketSource::from_config(&config.source)
                .ok_or_else(|| Error::Config("HTTP source requires source.base_url".into()))?;
            info!(base_url = source.base_url(), "Using HTTP source");
            rally_screener::screen(&config, source, as_of).await?
        }
    };

    println!("{}", report.generate(format));

    if let Some(dir) = cli::report_dir(&config) {
        let path = report.save_to_dir(&dir, format)?;
        info!(path = %path.display(), "Report saved");
    }

    Ok(())
}

fn show_config(path: Option<&std::path::Path>) -> Result<()> {
    if path.is_none() {
        let dir = config_dir();
        for (file, present) in present_files(Some(dir.clone())) {
            let state = if present { "found" } else { "absent" };
            eprintln!("{}: {}", dir.join(file).display(), state);
        }
    }

    let config = cli::load_config(path)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    config.validate().map_err(Error::from)?;
    eprintln!("Configuration is valid");
    Ok(())
}

/// Exit code from the first typed error in the chain.
fn exit_code(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<Error>())
        .map_or(1, Error::exit_code)
}
