use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::api::ApiError;

use super::validation::{self, Validate};
use super::Resource;

/// A user account within a tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
  pub id: String,
  pub tenant_id: String,
  pub email: String,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub role: Option<String>,
  #[serde(default)]
  pub status: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  /// Fields this client does not model, kept so nothing is lost in the cache
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
  pub email: String,
  pub name: String,
  pub password: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub role: Option<String>,
}

impl Validate for CreateUser {
  fn validate(&self) -> Result<(), ApiError> {
    validation::email("email", &self.email)?;
    validation::required("name", &self.name)?;
    validation::password("password", &self.password)
  }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateUser {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub email: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub role: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub status: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub password: Option<String>,
}

impl Validate for UpdateUser {
  fn validate(&self) -> Result<(), ApiError> {
    if let Some(email) = &self.email {
      validation::email("email", email)?;
    }
    if let Some(name) = &self.name {
      validation::required("name", name)?;
    }
    if let Some(password) = &self.password {
      validation::password("password", password)?;
    }
    Ok(())
  }
}

impl Resource for User {
  const KIND: &'static str = "user";
  const PATH: &'static str = "/users";

  type Create = CreateUser;
  type Patch = UpdateUser;

  fn id(&self) -> &str {
    &self.id
  }
}
