//! Isolated environment for pipeline tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use certdesk::cases::SqliteCaseStore;
use certdesk::error::{DeskError, ExtractError};
use certdesk::extractor::{DocumentExtractor, Extraction};
use certdesk::processor::{DocumentProcessor, EventSink, ProcessingEvent};
use certdesk::queue::{JobQueue, QueueSettings, RetryPolicy};
use certdesk::storage::StorageResolver;
use certdesk::webhook::{Dispatch, WebhookIngestor};
use certdesk::Database;

use super::builders::{attachment_url, extraction};

/// Serves registered attachment bytes and records notes.
#[derive(Default)]
pub struct StubDesk {
    files: Mutex<HashMap<String, Vec<u8>>>,
    pub downloads: Mutex<Vec<String>>,
    pub notes: Mutex<Vec<(String, String)>>,
}

impl StubDesk {
    pub fn serve(&self, attachment_id: &str, bytes: &[u8]) {
        self.files
            .lock()
            .unwrap()
            .insert(attachment_url(attachment_id), bytes.to_vec());
    }

    pub fn notes(&self) -> Vec<(String, String)> {
        self.notes.lock().unwrap().clone()
    }
}

#[async_trait]
impl certdesk::SupportDesk for StubDesk {
    async fn download_attachment(&self, url: &str) -> Result<Vec<u8>, DeskError> {
        self.downloads.lock().unwrap().push(url.to_string());
        self.files
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| DeskError::Status {
                status: 404,
                url: url.to_string(),
            })
    }

    async fn add_private_note(&self, ticket_id: &str, body: &str) -> Result<(), DeskError> {
        self.notes
            .lock()
            .unwrap()
            .push((ticket_id.to_string(), body.to_string()));
        Ok(())
    }
}

/// Returns whatever extraction is currently scripted.
pub struct ScriptedExtractor {
    next: Mutex<Result<Extraction, String>>,
    calls: AtomicUsize,
}

impl ScriptedExtractor {
    pub fn returning(extraction: Extraction) -> Self {
        Self {
            next: Mutex::new(Ok(extraction)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, extraction: Extraction) {
        *self.next.lock().unwrap() = Ok(extraction);
    }

    pub fn fail_with(&self, message: &str) {
        *self.next.lock().unwrap() = Err(message.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentExtractor for ScriptedExtractor {
    async fn extract(
        &self,
        _bytes: &[u8],
        _content_type: &str,
        _filename: &str,
    ) -> Result<Extraction, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.next
            .lock()
            .unwrap()
            .clone()
            .map_err(ExtractError::Request)
    }
}

/// Keeps every event for later assertions.
#[derive(Default)]
pub struct RecordingEvents {
    events: Mutex<Vec<ProcessingEvent>>,
}

impl RecordingEvents {
    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|e| e.name()).collect()
    }

    /// Storage modes reported by `storage_completed` events, in order.
    pub fn storage_modes(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                ProcessingEvent::StorageCompleted { mode, .. } => Some(mode.clone()),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingEvents {
    fn emit(&self, event: ProcessingEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub struct TestHarness {
    temp_dir: TempDir,
    pub storage_root: PathBuf,
    pub db: Database,
    pub cases: Arc<SqliteCaseStore>,
    pub desk: Arc<StubDesk>,
    pub extractor: Arc<ScriptedExtractor>,
    pub events: Arc<RecordingEvents>,
    pub processor: Arc<DocumentProcessor>,
}

impl TestHarness {
    /// Storage goes to a temp directory used as the persistent root.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let storage_root = temp_dir.path().join("documents");
        std::fs::create_dir_all(&storage_root).expect("Failed to create storage root");
        let resolver = StorageResolver::new(
            Some(storage_root.clone()),
            None,
            temp_dir.path().join("fallback"),
        );
        Self::with_resolver(temp_dir, storage_root, resolver)
    }

    /// The persistent root does not exist, so writes fall back.
    pub fn with_missing_persistent_root() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let fallback = temp_dir.path().join("fallback");
        let resolver = StorageResolver::new(
            Some(temp_dir.path().join("not-mounted")),
            None,
            fallback.clone(),
        );
        Self::with_resolver(temp_dir, fallback, resolver)
    }

    fn with_resolver(temp_dir: TempDir, storage_root: PathBuf, resolver: StorageResolver) -> Self {
        let db = Database::open_in_memory().expect("Failed to open database");
        let cases = Arc::new(SqliteCaseStore::new(db.clone()));
        let desk = Arc::new(StubDesk::default());
        let extractor = Arc::new(ScriptedExtractor::returning(extraction(
            "fit_with_restrictions",
            85.0,
        )));
        let events = Arc::new(RecordingEvents::default());
        let processor = Arc::new(
            DocumentProcessor::new(db.clone(), extractor.clone(), cases.clone(), resolver)
                .with_events(events.clone()),
        );

        Self {
            temp_dir,
            storage_root,
            db,
            cases,
            desk,
            extractor,
            events,
            processor,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// A queue with immediate retries so tests can drive it tick by tick.
    pub fn queue(&self, max_concurrent_jobs: usize) -> Arc<JobQueue> {
        let settings = QueueSettings {
            poll_interval: Duration::from_millis(20),
            max_concurrent_jobs,
            retry: RetryPolicy {
                base: Duration::ZERO,
                ..Default::default()
            },
        };
        Arc::new(JobQueue::new(
            self.db.clone(),
            self.desk.clone(),
            self.processor.clone(),
            settings,
        ))
    }

    pub fn queued_ingestor(&self, queue: Arc<JobQueue>) -> WebhookIngestor {
        WebhookIngestor::new(self.cases.clone(), self.desk.clone(), Dispatch::Queued(queue))
    }

    pub fn inline_ingestor(&self) -> WebhookIngestor {
        WebhookIngestor::new(
            self.cases.clone(),
            self.desk.clone(),
            Dispatch::Inline(self.processor.clone()),
        )
    }
}
