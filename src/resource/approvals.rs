use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::api::ApiError;

use super::validation::{self, Validate};
use super::Resource;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
  #[default]
  Pending,
  Approved,
  Rejected,
  Cancelled,
}

/// An approval request moving through its approvers in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Approval {
  pub id: String,
  pub tenant_id: String,
  pub title: String,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub status: ApprovalStatus,
  #[serde(default)]
  pub requester_id: Option<String>,
  /// Approvers in the order they act
  #[serde(default)]
  pub approver_ids: Vec<String>,
  #[serde(default)]
  pub current_step: u32,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateApproval {
  pub title: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  pub approver_ids: Vec<String>,
}

impl Validate for CreateApproval {
  fn validate(&self) -> Result<(), ApiError> {
    validation::required("title", &self.title)?;
    if self.approver_ids.is_empty() {
      return Err(ApiError::validation(
        "APPROVERS_REQUIRED",
        "an approval needs at least one approver",
      ));
    }
    for (position, approver) in self.approver_ids.iter().enumerate() {
      if self.approver_ids[..position].contains(approver) {
        return Err(
          ApiError::validation("DUPLICATE_APPROVER", format!("{} is listed twice", approver))
            .with_details(serde_json::json!({ "approver_id": approver })),
        );
      }
    }
    Ok(())
  }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateApproval {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub status: Option<ApprovalStatus>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub comment: Option<String>,
}

impl Validate for UpdateApproval {
  fn validate(&self) -> Result<(), ApiError> {
    if self.status == Some(ApprovalStatus::Rejected)
      && self.comment.as_deref().map_or(true, |c| c.trim().is_empty())
    {
      return Err(ApiError::validation(
        "COMMENT_REQUIRED",
        "rejecting an approval needs a comment",
      ));
    }
    Ok(())
  }
}

impl Resource for Approval {
  const KIND: &'static str = "approval";
  const PATH: &'static str = "/approvals";

  type Create = CreateApproval;
  type Patch = UpdateApproval;

  fn id(&self) -> &str {
    &self.id
  }
}
