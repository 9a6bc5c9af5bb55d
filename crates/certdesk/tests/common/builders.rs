//! Builders for webhook payloads and extraction results.

#![allow(dead_code)]

use certdesk::extractor::{DocumentKind, ExtractedFields, Extraction};
use certdesk::webhook::{Requester, Ticket, TicketAttachment, WebhookEvent};

pub const DESK_URL: &str = "https://desk.example.com";

pub fn attachment_url(id: &str) -> String {
    format!("{}/attachments/{}", DESK_URL, id)
}

pub fn attachment(id: &str, name: &str, content_type: &str) -> TicketAttachment {
    TicketAttachment {
        id: id.to_string(),
        name: name.to_string(),
        content_type: content_type.to_string(),
        size: 2048,
        attachment_url: attachment_url(id),
    }
}

pub fn pdf(id: &str, name: &str) -> TicketAttachment {
    attachment(id, name, "application/pdf")
}

/// A ticket event from `email` with the given severity (1-4).
pub fn ticket_event(
    ticket_id: &str,
    severity: i64,
    email: &str,
    attachments: Vec<TicketAttachment>,
) -> WebhookEvent {
    WebhookEvent {
        event_type: "ticket_created".to_string(),
        ticket: Ticket {
            id: ticket_id.to_string(),
            subject: Some(format!("Injury report {}", ticket_id)),
            status: Some("2".to_string()),
            priority: Some(severity),
            requester_id: None,
            company_id: Some("acme".to_string()),
            attachments,
        },
        requester: Some(Requester {
            id: None,
            name: Some("Jane Citizen".to_string()),
            email: Some(email.to_string()),
        }),
        time_stamp: Some("2026-03-01T10:00:00Z".to_string()),
    }
}

pub fn extraction(fit_status: &str, confidence: f64) -> Extraction {
    Extraction {
        kind: DocumentKind::MedicalCertificate,
        fields: ExtractedFields {
            patient_name: Some("Jane Citizen".to_string()),
            fit_status: Some(fit_status.to_string()),
            restrictions: Some("No lifting over 10 kg".to_string()),
            ..Default::default()
        },
        field_confidence: Default::default(),
        overall_confidence: confidence,
    }
}
