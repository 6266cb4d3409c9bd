use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;

use opsdesk::api::{HttpClient, ListParams};
use opsdesk::config::Config;
use opsdesk::logging;
use opsdesk::notifications::{NotificationFrame, NotificationStatus};
use opsdesk::resource::{Resource, ResourceHooks, ThemeSettings};
use opsdesk::Session;

#[derive(Parser, Debug)]
#[command(name = "opsdesk")]
#[command(about = "Command-line client for the opsdesk ERP API")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/opsdesk/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Tenant to scope requests to, overriding the config
  #[arg(short, long)]
  tenant: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// User accounts
  #[command(alias = "u")]
  Users {
    #[command(subcommand)]
    op: ResourceOp,
  },
  /// Tasks
  #[command(alias = "t")]
  Tasks {
    #[command(subcommand)]
    op: ResourceOp,
  },
  /// Workflow definitions
  #[command(alias = "w")]
  Workflows {
    #[command(subcommand)]
    op: ResourceOp,
  },
  /// Approval requests
  #[command(alias = "a")]
  Approvals {
    #[command(subcommand)]
    op: ResourceOp,
  },
  /// Live notification stream
  #[command(alias = "n")]
  Notifications {
    #[command(subcommand)]
    op: NotificationsOp,
  },
  /// Tenant theme settings
  Theme {
    #[command(subcommand)]
    op: ThemeOp,
  },
}

#[derive(Subcommand, Debug)]
enum ResourceOp {
  /// List one page
  #[command(alias = "ls")]
  List {
    #[arg(long, default_value_t = 1)]
    page: u32,
    #[arg(long, default_value_t = 20)]
    page_size: u32,
    /// Filter as NAME=VALUE, repeatable
    #[arg(short, long = "filter", value_parser = parse_filter)]
    filters: Vec<(String, String)>,
  },
  /// Fetch one entity by id
  Get { id: String },
  /// Create from a JSON document
  Create {
    #[arg(long)]
    data: String,
  },
  /// Apply a partial JSON update
  Update {
    id: String,
    #[arg(long)]
    data: String,
  },
  /// Delete by id
  #[command(alias = "rm")]
  Delete { id: String },
  /// Run a server-side action over several ids
  Bulk {
    action: String,
    #[arg(required = true)]
    ids: Vec<String>,
  },
}

#[derive(Subcommand, Debug)]
enum NotificationsOp {
  /// Print frames as they arrive, then a summary
  Watch {
    /// Stop after this many frames
    #[arg(long)]
    limit: Option<usize>,
  },
}

#[derive(Subcommand, Debug)]
enum ThemeOp {
  Get,
  Set {
    #[arg(long)]
    primary: String,
    #[arg(long)]
    secondary: String,
    #[arg(long)]
    accent: Option<String>,
    #[arg(long)]
    logo_url: Option<String>,
  },
}

fn parse_filter(raw: &str) -> Result<(String, String), String> {
  raw
    .split_once('=')
    .map(|(name, value)| (name.trim().to_string(), value.to_string()))
    .filter(|(name, _)| !name.is_empty())
    .ok_or_else(|| format!("expected NAME=VALUE, got {:?}", raw))
}

fn parse_json<T: DeserializeOwned>(data: &str) -> Result<T> {
  serde_json::from_str(data).map_err(|e| eyre!("Invalid --data JSON: {}", e))
}

async fn run_resource<R>(hooks: ResourceHooks<R>, op: ResourceOp) -> Result<Value>
where
  R: Resource,
  R::Create: DeserializeOwned,
  R::Patch: DeserializeOwned,
{
  let output = match op {
    ResourceOp::List {
      page,
      page_size,
      filters,
    } => {
      let params = filters
        .into_iter()
        .fold(ListParams::new(page, page_size), |params, (name, value)| {
          params.filter(name, value)
        });
      serde_json::to_value(hooks.list(&params).await?)?
    }
    ResourceOp::Get { id } => match hooks.get(&id).await? {
      Some(entity) => serde_json::to_value(entity)?,
      None => return Err(eyre!("{} {} not found", R::KIND, id)),
    },
    ResourceOp::Create { data } => {
      let payload: R::Create = parse_json(&data)?;
      serde_json::to_value(hooks.create(&payload).await?)?
    }
    ResourceOp::Update { id, data } => {
      let patch: R::Patch = parse_json(&data)?;
      serde_json::to_value(hooks.update(&id, &patch).await?)?
    }
    ResourceOp::Delete { id } => {
      hooks.delete(&id).await?;
      json!({ "deleted": id })
    }
    ResourceOp::Bulk { action, ids } => serde_json::to_value(hooks.bulk_action(&action, &ids).await?)?,
  };
  Ok(output)
}

async fn watch_notifications(session: &Session, limit: Option<usize>) -> Result<Value> {
  let mut inbox = session.inbox();
  let mut frames = session.notifications().open();
  let mut received = 0usize;

  loop {
    if limit.is_some_and(|limit| received >= limit) {
      break;
    }
    let next = tokio::select! {
      next = frames.next() => next,
      _ = tokio::signal::ctrl_c() => break,
    };
    match next {
      Some(Ok(frame)) => {
        println!("{}", serde_json::to_string(&frame)?);
        if let NotificationFrame::Error { error } = &frame {
          tracing::warn!(code = %error.code, "error frame on notification stream");
        }
        inbox.push(frame);
        received += 1;
      }
      Some(Err(err)) => {
        inbox.push_failure(&err);
        tracing::warn!(error = %err, "notification stream ended with error");
        break;
      }
      None => break,
    }
  }

  Ok(json!({
    "received": received,
    "unread": inbox.tally(NotificationStatus::Unread),
    "read": inbox.tally(NotificationStatus::Read),
    "archived": inbox.tally(NotificationStatus::Archived),
    "errors": inbox.errors(),
    "last_status": inbox.last_status(),
    "last_error": inbox.last_error(),
  }))
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(&config.log)?;

  let client = HttpClient::new(&config.api, Config::api_token())?;
  let mut session = Session::from_config(Arc::new(client), &config);

  // Override tenant if specified on command line
  if let Some(tenant) = &args.tenant {
    session.switch_tenant(tenant);
  }

  let output = match args.command {
    Command::Users { op } => run_resource(session.users(), op).await?,
    Command::Tasks { op } => run_resource(session.tasks(), op).await?,
    Command::Workflows { op } => run_resource(session.workflows(), op).await?,
    Command::Approvals { op } => run_resource(session.approvals(), op).await?,
    Command::Notifications {
      op: NotificationsOp::Watch { limit },
    } => watch_notifications(&session, limit).await?,
    Command::Theme { op: ThemeOp::Get } => serde_json::to_value(session.theme().get().await?)?,
    Command::Theme {
      op:
        ThemeOp::Set {
          primary,
          secondary,
          accent,
          logo_url,
        },
    } => {
      let theme = ThemeSettings {
        primary_color: primary,
        secondary_color: secondary,
        accent_color: accent,
        logo_url,
      };
      serde_json::to_value(session.theme().save(&theme).await?)?
    }
  };

  println!("{}", serde_json::to_string_pretty(&output)?);
  Ok(())
}
