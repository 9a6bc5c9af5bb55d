//! Support-desk webhook intake.

pub mod filter;
mod ingestor;
pub mod payload;
pub mod signature;

pub use filter::is_candidate;
pub use ingestor::{Dispatch, IngestSummary, IntakeMode, WebhookIngestor, NEW_CASE_TYPE};
pub use payload::{Requester, Ticket, TicketAttachment, WebhookEvent};
pub use signature::verify_signature;
