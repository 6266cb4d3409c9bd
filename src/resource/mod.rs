//! Typed resources and the hook layer that reads and mutates them.

mod approvals;
mod hooks;
mod retry;
mod tasks;
mod theme;
mod users;
pub mod validation;
mod workflows;

use serde::{de::DeserializeOwned, Serialize};

pub use approvals::{Approval, ApprovalStatus, CreateApproval, UpdateApproval};
pub use hooks::{Liveness, ResourceHooks};
pub use retry::RetryPolicy;
pub use tasks::{CreateTask, Task, UpdateTask};
pub use theme::{ThemeClient, ThemeSettings};
pub use users::{CreateUser, UpdateUser, User};
pub use validation::Validate;
pub use workflows::{CreateWorkflow, UpdateWorkflow, Workflow, WorkflowStep};

/// An entity type served by a REST collection.
///
/// The cache only ever looks at [`Resource::KIND`] and [`Resource::id`];
/// every other field is the server's business.
pub trait Resource: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
  /// Kind name used in cache keys (e.g. "user")
  const KIND: &'static str;
  /// Collection path under the versioned API base (e.g. "/users")
  const PATH: &'static str;

  /// Payload accepted by `create`
  type Create: Serialize + Validate + Send + Sync;
  /// Partial payload accepted by `update`, merged into the cached entity
  type Patch: Serialize + Validate + Send + Sync;

  fn id(&self) -> &str;
}
