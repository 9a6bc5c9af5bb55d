pub mod cache;
pub mod cases;
pub mod config;
pub mod db;
pub mod desk;
pub mod error;
pub mod extractor;
pub mod logging;
pub mod processor;
pub mod queue;
pub mod sanitize;
pub mod secrets;
pub mod storage;
pub mod webhook;

pub use cases::{CaseStore, SqliteCaseStore};
pub use config::{load_config, Config};
pub use db::Database;
pub use desk::{DeskClient, SupportDesk};
pub use error::{
    CaseStoreError, CertdeskError, ConfigError, DeskError, ExtractError, IngestError,
    ProcessError, QueueError, Result, StorageError,
};
pub use extractor::{DocumentExtractor, HttpExtractor};
pub use processor::{DocumentProcessor, ProcessRequest, ProcessingResult};
pub use queue::{JobData, JobPriority, JobQueue, QueueSettings, QueueStats};
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError};
pub use storage::{StorageMode, StorageResolver};
pub use webhook::{verify_signature, Dispatch, IngestSummary, IntakeMode, WebhookEvent, WebhookIngestor};
