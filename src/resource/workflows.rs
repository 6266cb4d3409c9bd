use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::api::ApiError;

use super::validation::{self, Validate};
use super::Resource;

/// One step of a workflow definition. Execution happens server-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,
  pub name: String,
  pub step_type: String,
  /// 1-based position within the workflow
  pub order: u32,
  #[serde(default)]
  pub config: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
  pub id: String,
  pub tenant_id: String,
  pub name: String,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub is_active: bool,
  #[serde(default)]
  pub steps: Vec<WorkflowStep>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateWorkflow {
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default)]
  pub steps: Vec<WorkflowStep>,
}

impl Validate for CreateWorkflow {
  fn validate(&self) -> Result<(), ApiError> {
    validation::required("name", &self.name)?;
    validate_steps(&self.steps)
  }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateWorkflow {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub is_active: Option<bool>,
  /// Replaces the whole step list
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub steps: Option<Vec<WorkflowStep>>,
}

impl Validate for UpdateWorkflow {
  fn validate(&self) -> Result<(), ApiError> {
    if let Some(name) = &self.name {
      validation::required("name", name)?;
    }
    if let Some(steps) = &self.steps {
      validate_steps(steps)?;
    }
    Ok(())
  }
}

/// Steps need names and must be numbered 1..=n without gaps or repeats.
fn validate_steps(steps: &[WorkflowStep]) -> Result<(), ApiError> {
  for step in steps {
    validation::required("steps.name", &step.name)?;
    validation::required("steps.step_type", &step.step_type)?;
  }

  let orders: BTreeSet<u32> = steps.iter().map(|s| s.order).collect();
  let expected: BTreeSet<u32> = (1..=steps.len() as u32).collect();
  if orders != expected {
    return Err(
      ApiError::validation(
        "INVALID_STEP_ORDER",
        "workflow steps must be numbered 1..n without gaps",
      )
      .with_details(serde_json::json!({ "orders": steps.iter().map(|s| s.order).collect::<Vec<_>>() })),
    );
  }
  Ok(())
}

impl Resource for Workflow {
  const KIND: &'static str = "workflow";
  const PATH: &'static str = "/workflows";

  type Create = CreateWorkflow;
  type Patch = UpdateWorkflow;

  fn id(&self) -> &str {
    &self.id
  }
}
