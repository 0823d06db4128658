use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use report_ingest::config::{APP_PASSWORD_HELP, Config, default_config_path, load_config, write_template};
use report_ingest::daemon::PollingController;
use report_ingest::mail::imap_client::ImapSession;
use report_ingest::mail::parser::MailparseParser;
use report_ingest::pipeline::IngestionPipeline;
use report_ingest::store::fs::ReportStore;

#[derive(Parser)]
#[command(name = "report_ingest")]
#[command(about = "Watch a mailbox and save PDF attachments of report emails", long_about = None)]
struct Cli {
    /// Config file (default: <config dir>/report_ingest/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Poll the mailbox until interrupted (default)
    Run {
        /// Poll interval in milliseconds
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Leave fetched messages unread
        #[arg(long)]
        no_mark_read: bool,

        #[arg(long)]
        reports_folder: Option<PathBuf>,
    },

    /// Run one raw .eml file through the pipeline and print the outcome
    Ingest {
        file: PathBuf,

        #[arg(long)]
        reports_folder: Option<PathBuf>,
    },

    /// Write a config template
    InitConfig,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.cmd.unwrap_or(Command::Run {
        interval_ms: None,
        no_mark_read: false,
        reports_folder: None,
    }) {
        Command::InitConfig => {
            init_logging("info");
            let path = match cli.config {
                Some(p) => p,
                None => default_config_path()?,
            };
            write_template(&path)?;
            println!("Created template config at {}; edit it and run again", path.display());
            Ok(())
        }

        Command::Ingest {
            file,
            reports_folder,
        } => {
            let mut cfg = load_config(cli.config.as_deref())?;
            if let Some(dir) = reports_folder {
                cfg.storage.reports_folder = dir;
            }
            init_logging(&cfg.log_level);

            let raw = std::fs::read(&file)
                .map_err(|e| anyhow!("Cannot read {}: {e}", file.display()))?;
            let store = ReportStore::open(&cfg.storage.reports_folder)?;
            let pipeline = IngestionPipeline::new(MailparseParser, store);
            let outcome = pipeline.process(&raw)?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }

        Command::Run {
            interval_ms,
            no_mark_read,
            reports_folder,
        } => {
            let mut cfg = load_config(cli.config.as_deref())?;
            if let Some(ms) = interval_ms {
                cfg.polling.interval_ms = ms;
            }
            if no_mark_read {
                cfg.polling.mark_as_read = false;
            }
            if let Some(dir) = reports_folder {
                cfg.storage.reports_folder = dir;
            }
            cfg.validate()?;
            init_logging(&cfg.log_level);
            run(cfg)
        }
    }
}

fn init_logging(default_level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
}

fn run(cfg: Config) -> Result<()> {
    info!("Starting report ingestion...");
    println!("\n=== Report Ingest ===");
    println!("Account:        {}", cfg.imap.user);
    println!("Reports folder: {}", cfg.storage.reports_folder.display());
    println!("Matching:       unread emails with \"report\" in subject");
    println!("Interval:       {} seconds", cfg.poll_interval().as_secs_f64());
    println!("Mark as read:   {}", cfg.polling.mark_as_read);

    let credentials = cfg.credentials()?;
    let store = ReportStore::open(&cfg.storage.reports_folder)?;
    let pipeline = IngestionPipeline::new(MailparseParser, store);
    let controller = PollingController::new(ImapSession::new(), pipeline, cfg.poll_config());

    println!("\nConnecting to {}...", cfg.imap.host);
    if let Err(e) = controller.connect(&credentials, &cfg.imap.host, cfg.imap.port, &cfg.transport()) {
        error!("Failed to connect: {e}");
        if e.is_auth() {
            eprintln!("\nTroubleshooting:\nMake sure you are using an App Password, not your regular password.\n{APP_PASSWORD_HELP}");
        }
        return Err(e.into());
    }
    println!("Connected. Press Ctrl+C to stop\n");

    let running = Arc::new(AtomicBool::new(true));
    let r2 = running.clone();
    ctrlc::set_handler(move || {
        r2.store(false, Ordering::SeqCst);
    })?;

    controller.start(cfg.poll_interval())?;

    while running.load(Ordering::SeqCst) {
        if !controller.is_connected() {
            error!("Lost connection to {}; exiting so the supervisor can restart", cfg.imap.host);
            controller.disconnect();
            return Err(anyhow!("mailbox connection lost"));
        }
        thread::sleep(Duration::from_millis(250));
    }

    info!("Received shutdown signal, shutting down gracefully...");
    controller.disconnect();
    info!("Mail session disconnected after handling {} messages", controller.processed_count());
    println!("Disconnected");
    Ok(())
}
