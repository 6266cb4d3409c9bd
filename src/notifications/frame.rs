use chrono::{DateTime, Utc};
use eventsource_stream::Event;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::api::{ApiError, ErrorBody};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
  #[default]
  Unread,
  Read,
  Archived,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
  pub id: String,
  #[serde(default)]
  pub tenant_id: Option<String>,
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub message: String,
  /// info / warning / error / success
  #[serde(default)]
  pub level: Option<String>,
  #[serde(default)]
  pub status: NotificationStatus,
  #[serde(default)]
  pub created_at: Option<DateTime<Utc>>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

/// One message on the notification stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationFrame {
  Notification { payload: Notification },
  /// Connection-level status such as `connected`
  Status { status: String },
  Error { error: ErrorBody },
}

impl NotificationFrame {
  /// Decode the JSON carried by an SSE event.
  pub fn from_event(event: &Event) -> Result<Self, ApiError> {
    Self::decode(&event.event, &event.data)
  }

  /// Decode one event's `data`. A body without `type` takes the event name
  /// instead, unless that is the default `message`.
  pub fn decode(event: &str, data: &str) -> Result<Self, ApiError> {
    let mut value: Value = serde_json::from_str(data)?;
    if let Value::Object(map) = &mut value {
      if !map.contains_key("type") && !event.is_empty() && event != "message" {
        map.insert("type".to_string(), Value::String(event.to_string()));
      }
    }
    Ok(serde_json::from_value(value)?)
  }
}
