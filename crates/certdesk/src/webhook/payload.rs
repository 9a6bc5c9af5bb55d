//! Inbound support-desk webhook payload.

use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub ticket: Ticket,
    #[serde(default)]
    pub requester: Option<Requester>,
    #[serde(default)]
    pub time_stamp: Option<String>,
}

impl WebhookEvent {
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub status: Option<String>,
    /// Ticket severity, 1 (low) to 4 (urgent).
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub requester_id: Option<String>,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub company_id: Option<String>,
    #[serde(default)]
    pub attachments: Vec<TicketAttachment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketAttachment {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub name: String,
    pub content_type: String,
    #[serde(default)]
    pub size: u64,
    pub attachment_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requester {
    #[serde(default, deserialize_with = "opt_id_string")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Desk ids arrive as JSON numbers or strings depending on the account.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(i64),
    Text(String),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Number(n) => n.to_string(),
            RawId::Text(s) => s,
        }
    }
}

fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    RawId::deserialize(deserializer).map(String::from)
}

fn opt_id_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<RawId>::deserialize(deserializer)?.map(String::from))
}
