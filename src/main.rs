//! Command-line front end: list sources, inspect capabilities, scan pages.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;
use twain_scan::binding::{native, DsmEntry, SimulatedDsm};
use twain_scan::bridge::{run_pump, IdlePump};
use twain_scan::config::{ScanConfig, DEFAULT_CONFIG_PATH};
use twain_scan::protocol::cap;
use twain_scan::session::CapabilityQuery;
use twain_scan::{BridgeSignal, ImageWriter, ScannerSession};

/// Capabilities shown by `caps`.
const COMMON_CAPS: &[u16] = &[
    cap::XFER_COUNT,
    cap::PIXEL_TYPE,
    cap::BIT_DEPTH,
    cap::X_RESOLUTION,
    cap::Y_RESOLUTION,
    cap::COMPRESSION,
    cap::FEEDER_ENABLED,
    cap::UI_CONTROLLABLE,
    cap::INDICATORS,
    cap::DEVICE_ONLINE,
    cap::AUTHOR,
    cap::CAPTION,
];

#[derive(Parser, Debug)]
#[command(name = "twain_scan", version, about = "Acquire images from TWAIN scanners")]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Use the built-in simulated manager instead of the installed one
    #[arg(long, global = true)]
    simulate: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List available sources
    List,
    /// Show common capabilities of a source
    Caps {
        /// Source name (default source if omitted)
        #[arg(long)]
        source: Option<String>,
    },
    /// Scan pages and save them
    Scan {
        /// Source name (default source if omitted)
        #[arg(long)]
        source: Option<String>,
        /// Base output path; page i is saved as <stem><i>.<ext>
        #[arg(long)]
        output: Option<PathBuf>,
        /// Pages to scan, -1 for all
        #[arg(long, allow_hyphen_values = true)]
        pages: Option<i16>,
    },
    /// Print the effective configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = ScanConfig::load_from(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.application.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Command::List => list(open_session(&config, cli.simulate)?),
        Command::Caps { source } => caps(open_session(&config, cli.simulate)?, source),
        Command::Scan {
            source,
            output,
            pages,
        } => {
            if let Some(pages) = pages {
                config.session.transfer_count = pages;
                config.validate().context("invalid --pages")?;
            }
            let base = output.unwrap_or_else(|| config.output.base_path());
            scan(open_session(&config, cli.simulate)?, &config, source, base)
        }
        Command::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

fn open_session(config: &ScanConfig, simulate: bool) -> Result<ScannerSession> {
    let dsm: Box<dyn DsmEntry> = if simulate {
        info!("using simulated data source manager");
        Box::new(SimulatedDsm::new(["Simulated Flatbed", "Simulated Feeder"]).with_pages(3))
    } else {
        native::open(config.session.prefer_extended).context("loading the data source manager")?
    };
    let mut session = ScannerSession::from_config(dsm, config, 0);
    session
        .open_manager()
        .context("opening the data source manager")?;
    Ok(session)
}

fn select(session: &mut ScannerSession, source: Option<String>) -> Result<()> {
    if let Some(name) = source {
        session
            .select_source(name.as_str())
            .with_context(|| format!("selecting source '{}'", name))?;
    }
    Ok(())
}

fn list(session: ScannerSession) -> Result<()> {
    let current = session.current_index();
    for (i, source) in session.sources().iter().enumerate() {
        let marker = if Some(i) == current { '*' } else { ' ' };
        println!(
            "{} {:2}  {}  ({} / {}, v{}.{})",
            marker,
            i,
            source.product_name,
            source.manufacturer,
            source.product_family,
            source.version.major,
            source.version.minor
        );
    }
    Ok(())
}

fn caps(mut session: ScannerSession, source: Option<String>) -> Result<()> {
    select(&mut session, source)?;
    session.open_selected_source().context("opening source")?;
    if let Some(source) = session.current_source() {
        println!("{}", source);
    }

    for &cap_id in COMMON_CAPS {
        match session.get_capability(cap_id, CapabilityQuery::All) {
            Ok(container) => {
                let current = container
                    .current()
                    .map(ToString::to_string)
                    .unwrap_or_default();
                println!(
                    "  {:<20} {:<14?} {:<8} {}",
                    cap::name(cap_id),
                    container.shape(),
                    container.item_type(),
                    current
                );
            }
            Err(err) => println!("  {:<20} {}", cap::name(cap_id), err),
        }
    }

    session.close_manager()?;
    Ok(())
}

fn scan(
    mut session: ScannerSession,
    config: &ScanConfig,
    source: Option<String>,
    base: PathBuf,
) -> Result<()> {
    select(&mut session, source)?;
    session.scan().context("starting scan")?;

    let mut pump = IdlePump::new(
        0,
        Duration::from_millis(config.session.poll_interval_ms),
        config.session.poll_limit,
    );
    match run_pump(&mut pump, &mut session)? {
        Some(BridgeSignal::ReadyToTransfer) => {
            let pages = session.drain_transfers().context("transferring pages")?;
            info!(pages = pages.len(), "pages received");
            let mut failed = 0;
            for (path, result) in ImageWriter::new().save_all(&pages, &base) {
                match result {
                    Ok(()) => println!("{}", path.display()),
                    Err(err) => {
                        failed += 1;
                        eprintln!("{}: {}", path.display(), err);
                    }
                }
            }
            if failed > 0 {
                bail!("{} of {} pages could not be saved", failed, pages.len());
            }
            Ok(())
        }
        Some(signal) => {
            session.close_manager()?;
            bail!("scan ended without pages ({:?})", signal)
        }
        None => {
            session.close_manager()?;
            bail!(
                "source did not become ready after {} polls",
                config.session.poll_limit
            )
        }
    }
}
