use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;
use tracing::{info, warn};

use certdesk::config::{desk_api_key, webhook_secret};
use certdesk::db::default_database_path;
use certdesk::logging::init_tracing;
use certdesk::queue::read_stats;
use certdesk::{
    load_config, verify_signature, CertdeskError, Config, ConfigError, Database, DeskClient,
    Dispatch, DocumentProcessor, HttpExtractor, IngestError, IntakeMode, JobQueue,
    SqliteCaseStore, WebhookEvent, WebhookIngestor,
};

/// Files medical certificates from support-desk tickets against injury cases.
#[derive(Parser, Debug)]
#[command(name = "certdesk")]
#[command(version, about, long_about = None)]
struct Cli {
    /// JSON config file. Defaults are used when omitted.
    #[arg(short = 'c', long = "config", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the job queue until interrupted.
    Run,
    /// Feed one webhook payload through the ingestor.
    Ingest {
        /// File holding the raw webhook body.
        payload: PathBuf,
        /// Hex HMAC-SHA256 of the body, checked when a webhook secret is configured.
        #[arg(long)]
        signature: Option<String>,
    },
    /// Print job counts by status as JSON.
    Stats,
}

/// Long-lived collaborators shared by `run` and `ingest`.
struct Services {
    db: Database,
    cases: Arc<SqliteCaseStore>,
    desk: Arc<DeskClient>,
    processor: Arc<DocumentProcessor>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("certdesk: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CertdeskError> {
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };
    init_tracing(&config.logging)?;

    match cli.command {
        Command::Run => run_queue(&config).await,
        Command::Ingest { payload, signature } => {
            ingest(&config, &payload, signature.as_deref()).await
        }
        Command::Stats => {
            let stats = read_stats(&open_database(&config)?);
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
    }
}

fn open_database(config: &Config) -> Result<Database, CertdeskError> {
    let path = config
        .database_path
        .as_ref()
        .map(PathBuf::from)
        .or_else(default_database_path)
        .ok_or_else(|| ConfigError::Validation {
            message: "database_path is not set and no home directory was found".to_string(),
        })?;
    Ok(Database::open(&path)?)
}

fn build_services(config: &Config) -> Result<Services, CertdeskError> {
    if config.desk.base_url.is_empty() {
        return Err(missing("desk.base_url"));
    }
    if config.extractor.endpoint.is_empty() {
        return Err(missing("extractor.endpoint"));
    }

    let db = open_database(config)?;
    let cases = Arc::new(SqliteCaseStore::new(db.clone()));
    let desk = Arc::new(DeskClient::new(
        config.desk.base_url.clone(),
        desk_api_key(config)?,
        Duration::from_secs(config.desk.timeout_secs),
    )?);
    let extractor = Arc::new(HttpExtractor::new(
        config.extractor.endpoint.clone(),
        Duration::from_secs(config.extractor.timeout_secs),
    )?);
    let processor = Arc::new(DocumentProcessor::new(
        db.clone(),
        extractor,
        cases.clone(),
        config.storage.resolver(),
    ));

    Ok(Services {
        db,
        cases,
        desk,
        processor,
    })
}

fn missing(field: &str) -> CertdeskError {
    ConfigError::Validation {
        message: format!("{} must be set for this command", field),
    }
    .into()
}

async fn run_queue(config: &Config) -> Result<(), CertdeskError> {
    let services = build_services(config)?;
    let queue = JobQueue::new(
        services.db.clone(),
        services.desk.clone(),
        services.processor.clone(),
        config.queue.settings(),
    );

    info!(version = env!("CARGO_PKG_VERSION"), "certdesk starting");
    queue.start();
    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested, waiting for in-flight jobs");
    queue.shutdown().await;
    Ok(())
}

async fn ingest(
    config: &Config,
    payload: &Path,
    signature: Option<&str>,
) -> Result<(), CertdeskError> {
    let body = tokio::fs::read(payload).await?;

    if let Some(secret) = webhook_secret(config)? {
        let valid = signature
            .map(|sig| verify_signature(secret.expose_secret().as_bytes(), &body, sig))
            .unwrap_or(false);
        if !valid {
            return Err(IngestError::InvalidSignature.into());
        }
    } else if signature.is_some() {
        warn!("Signature supplied but no webhook secret is configured; not verified");
    }

    let event = WebhookEvent::from_json(&body)?;
    let services = build_services(config)?;
    let dispatch = match config.intake.mode {
        IntakeMode::Inline => Dispatch::Inline(services.processor.clone()),
        IntakeMode::Queued => Dispatch::Queued(Arc::new(JobQueue::new(
            services.db.clone(),
            services.desk.clone(),
            services.processor.clone(),
            config.queue.settings(),
        ))),
    };
    let ingestor = WebhookIngestor::new(services.cases.clone(), services.desk.clone(), dispatch)
        .with_cache(
            Duration::from_secs(config.intake.cache_ttl_secs),
            config.intake.cache_capacity,
        );

    let summary = ingestor.process_webhook(&event).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
