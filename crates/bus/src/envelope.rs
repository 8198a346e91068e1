use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Self-contained bus message: enough for a Build Worker to process a
/// request without consulting any API-process memory (spec §4.7, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub request_id: Uuid,
    pub spec_json: serde_json::Value,
    pub api_key: String,
    pub submitted_at: DateTime<Utc>,
}
