//! REPORTCAST CLI
//!
//! Hosts a single report session: deltas arrive one per line on stdin, a
//! viewer streams them to stdout, and the report can be archived at the end.

#![warn(missing_docs)]
#![warn(clippy::all)]

use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result, WrapErr};
use reportcast_core::{ProxyConfig, SessionId};
use reportcast_log::{Delta, Recv};
use reportcast_session::{ArchiveEntry, ReportSession, SessionDescriptor, SessionRegistry};
use reportcast_watch::NotifyBackend;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "reportcast")]
#[command(about = "REPORTCAST - live, replayable report sessions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a report session fed from stdin
    Run {
        /// Script the report comes from
        #[arg(short, long)]
        source: PathBuf,
        /// Display name (defaults to the script's file name)
        #[arg(short, long)]
        name: Option<String>,
        /// Session id (random when omitted)
        #[arg(long)]
        id: Option<String>,
        /// JSON config file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Write the archive under this directory when the producer ends
        #[arg(long)]
        archive_dir: Option<PathBuf>,
        /// Do not watch the source for changes
        #[arg(long)]
        no_watch: bool,
        /// Command that re-runs the report
        #[arg(last = true)]
        command: Vec<String>,
    },
    /// Print the effective configuration
    Config {
        /// JSON config file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

const VIEWER_POLL: Duration = Duration::from_millis(250);

fn load_config(path: Option<&Path>) -> Result<ProxyConfig> {
    let config = match path {
        Some(path) => ProxyConfig::from_json_file(path)?,
        None => ProxyConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn display_name(source: &Path) -> String {
    source
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| source.display().to_string())
}

fn write_archive(dir: &Path, entries: &[ArchiveEntry]) -> Result<()> {
    for entry in entries {
        let path = dir.join(&entry.path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .wrap_err_with(|| format!("creating {}", parent.display()))?;
        }
        std::fs::write(&path, &entry.content)
            .wrap_err_with(|| format!("writing {}", path.display()))?;
    }
    Ok(())
}

fn run(
    source: PathBuf,
    name: Option<String>,
    id: Option<String>,
    config: ProxyConfig,
    archive_dir: Option<PathBuf>,
    command: Vec<String>,
) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let name = name.unwrap_or_else(|| display_name(&source));
    let id = id.map(SessionId::from).unwrap_or_default();
    let descriptor = SessionDescriptor::new(id, source, cwd, command);

    let registry = SessionRegistry::new();
    let session = registry.register(ReportSession::new(
        descriptor,
        name,
        &config,
        Box::new(NotifyBackend::new()),
    ))?;

    let mut cursor = session.attach_subscriber();
    let subscriber = cursor.id();
    let viewer = thread::spawn(move || -> io::Result<usize> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        loop {
            match cursor.next_timeout(VIEWER_POLL) {
                Recv::Delta(delta) => {
                    out.write_all(delta.as_bytes())?;
                    out.write_all(b"\n")?;
                    out.flush()?;
                }
                Recv::Idle => {}
                Recv::EndOfStream => return Ok(cursor.delivered()),
            }
        }
    });

    for line in io::stdin().lock().lines() {
        session.enqueue(Delta::from(line?.into_bytes()));
    }
    session.mark_producer_gone();

    let delivered = viewer
        .join()
        .map_err(|_| eyre!("viewer thread panicked"))??;
    session.detach_subscriber(subscriber);
    info!(delivered, "viewer finished");

    if let Some(dir) = archive_dir {
        let entries = session.export_archive()?;
        write_archive(&dir, &entries)?;
        info!(dir = %dir.display(), files = entries.len(), "archive written");
    }

    registry.reap(Instant::now());
    registry.shutdown_all();
    Ok(())
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("reportcast=info")),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            source,
            name,
            id,
            config,
            archive_dir,
            no_watch,
            command,
        } => {
            let mut config = load_config(config.as_deref())?;
            if no_watch {
                config = config.without_watching();
            }
            run(source, name, id, config, archive_dir, command)
        }
        Commands::Config { config } => {
            let config = load_config(config.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}
