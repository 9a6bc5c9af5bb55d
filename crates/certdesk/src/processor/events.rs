use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;

/// Events emitted while a document moves through the processor.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProcessingEvent {
    DownloadStarted { job_id: String, filename: String },
    OcrStarted { job_id: String },
    OcrCompleted { job_id: String, kind: String, confidence: f64 },
    StorageCompleted { job_id: String, storage_key: String, mode: String },
    ValidationCompleted { job_id: String, requires_review: bool },
    CaseUpdated { job_id: String, case_id: String, next_step: String },
    ReviewRequired { job_id: String, reasons: Vec<String> },
    Error { job_id: String, error: String },
}

impl ProcessingEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::DownloadStarted { .. } => "download_started",
            Self::OcrStarted { .. } => "ocr_started",
            Self::OcrCompleted { .. } => "ocr_completed",
            Self::StorageCompleted { .. } => "storage_completed",
            Self::ValidationCompleted { .. } => "validation_completed",
            Self::CaseUpdated { .. } => "case_updated",
            Self::ReviewRequired { .. } => "review_required",
            Self::Error { .. } => "error",
        }
    }
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: ProcessingEvent);
}

/// Discards events.
pub struct NoopEvents;

impl EventSink for NoopEvents {
    fn emit(&self, _event: ProcessingEvent) {}
}

/// Fans events out on a tokio broadcast channel. Sending never blocks; with
/// no subscribers the event is dropped.
pub struct BroadcastEvents {
    sender: Arc<broadcast::Sender<ProcessingEvent>>,
}

impl BroadcastEvents {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProcessingEvent> {
        self.sender.subscribe()
    }
}

impl EventSink for BroadcastEvents {
    fn emit(&self, event: ProcessingEvent) {
        let _ = self.sender.send(event);
    }
}
