use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CertdeskError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Processing error: {0}")]
    Process(#[from] ProcessError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Support desk error: {0}")]
    Desk(#[from] DeskError),

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("Invalid webhook payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Logging could not be initialized: {0}")]
    Logging(String),

    #[error("Secret could not be resolved for '{name}': {source}")]
    Secret {
        name: String,
        #[source]
        source: crate::secrets::SecretError,
    },
}

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractError),

    #[error("Failed to store document: {0}")]
    Storage(#[from] StorageError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Case store error: {0}")]
    CaseStore(#[from] CaseStoreError),

    #[error("Case '{0}' not found")]
    CaseNotFound(String),
}

#[derive(Error, Debug)]
pub enum CaseStoreError {
    #[error("Case database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Case backend error: {0}")]
    Backend(String),
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Extraction service request failed: {0}")]
    Request(String),

    #[error("Extraction service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Extraction response could not be decoded: {0}")]
    Decode(String),

    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Short write to '{path}': wrote {written} of {expected} bytes")]
    ShortWrite {
        path: PathBuf,
        written: u64,
        expected: u64,
    },

    #[error("Invalid storage key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("File already exists: {0}")]
    FileExists(PathBuf),
}

#[derive(Error, Debug)]
pub enum DeskError {
    #[error("Support desk request failed: {0}")]
    Request(String),

    #[error("Support desk returned HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Support desk client could not be built: {0}")]
    Client(String),
}

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Failed to persist job: {0}")]
    Persist(#[from] crate::db::DatabaseError),

    #[error("Job '{0}' not found")]
    JobNotFound(String),

    #[error("Job '{id}' has an invalid record: {reason}")]
    InvalidJob { id: String, reason: String },

    #[error("Download failed: {0}")]
    Download(#[from] DeskError),

    #[error("Processing failed: {0}")]
    Processing(String),
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Webhook signature missing or invalid")]
    InvalidSignature,

    #[error("Case store error: {0}")]
    CaseStore(#[from] CaseStoreError),

    #[error("Failed to enqueue attachment '{filename}': {source}")]
    Enqueue {
        filename: String,
        #[source]
        source: QueueError,
    },

    #[error("Download failed for attachment '{filename}': {source}")]
    Download {
        filename: String,
        #[source]
        source: DeskError,
    },
}

pub type Result<T> = std::result::Result<T, CertdeskError>;
