//! Support-desk collaborator: attachment download and ticket notes.

mod client;

use async_trait::async_trait;

pub use crate::error::DeskError;
pub use client::DeskClient;

#[async_trait]
pub trait SupportDesk: Send + Sync {
    /// Fetches an attachment. Any non-2xx response is an error.
    async fn download_attachment(&self, url: &str) -> Result<Vec<u8>, DeskError>;

    /// Adds a private (agent-only) note to a ticket.
    async fn add_private_note(&self, ticket_id: &str, body: &str) -> Result<(), DeskError>;
}

/// Formats the note written back to a ticket after an attachment was filed.
pub fn outcome_note(filename: &str, document_id: &str, requires_review: bool) -> String {
    let review = if requires_review {
        "Manual review required: extraction confidence was low or key fields are missing."
    } else {
        "No review required."
    };
    format!(
        "Medical document '{}' was filed automatically.\nDocument ID: {}\n{}",
        filename, document_id, review
    )
}
