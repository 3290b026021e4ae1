use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use linr::attachment::{AttachmentClient, AttachmentFormat};
use linr::config::{Config, EnvTokenProvider};
use linr::linear::LinearClient;
use linr::output::{self, OutputMode, Resolved};
use linr::resolver::{looks_like_uuid, EntityKind, ResolveError, Resolver};

#[derive(Parser, Debug)]
#[command(name = "linr")]
#[command(about = "A token-frugal command line client for Linear")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./linr.yaml, then $XDG_CONFIG_HOME/linr/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Output format
  #[arg(short, long, value_enum, default_value_t = OutputMode::Text, global = true)]
  output: OutputMode,

  /// Also write logs to this file
  #[arg(long, global = true)]
  log_file: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Turn a human-readable identifier into a Linear ID
  Resolve {
    #[command(subcommand)]
    target: ResolveTarget,
  },
  /// Fetch attachment content
  Attachment {
    #[command(subcommand)]
    action: AttachmentAction,
  },
}

#[derive(Subcommand, Debug)]
enum ResolveTarget {
  /// `me`, a UUID, an email or a name
  User { query: String },
  /// Team key, name or UUID
  Team { query: String },
  /// Issue identifier such as ENG-123, or a UUID
  Issue { query: String },
  /// Cycle number, name or UUID
  Cycle {
    query: String,
    /// Team key, name or UUID (default: linear.default_team)
    #[arg(short, long)]
    team: Option<String>,
  },
  /// Project name or UUID
  Project {
    query: String,
    /// Limit the search to one team's projects
    #[arg(short, long)]
    team: Option<String>,
  },
  /// Label name
  Label {
    query: String,
    /// Team key, name or UUID (default: linear.default_team)
    #[arg(short, long)]
    team: Option<String>,
  },
}

#[derive(Subcommand, Debug)]
enum AttachmentAction {
  /// Print an attachment as base64, its URL, or metadata only
  Get {
    url: String,
    #[arg(short, long, value_enum, default_value_t = AttachmentFormat::Base64)]
    format: AttachmentFormat,
  },
  /// Save an attachment to a private temp file and print its path
  Download { url: String },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
  color_eyre::install()?;

  let args = Args::parse();

  let config = Config::load(args.config.as_deref())?;
  // Dropped on return from main, which flushes the file writer
  let _log_guard = linr::logging::init(&config.log, args.log_file.as_deref())?;

  match args.command {
    Command::Resolve { target } => resolve(&config, target, args.output).await,
    Command::Attachment { action } => {
      attachment(&config, action, args.output).await?;
      Ok(ExitCode::SUCCESS)
    }
  }
}

async fn resolve(config: &Config, target: ResolveTarget, mode: OutputMode) -> Result<ExitCode> {
  let client = LinearClient::new(config)?;
  let resolver = Resolver::with_ttl(Arc::new(client), config.cache.resolver_ttl());

  let outcome = run_resolve(&resolver, config, target).await;
  Ok(if report_resolve(mode, outcome)? {
    ExitCode::SUCCESS
  } else {
    ExitCode::FAILURE
  })
}

/// Print a resolve result. Returns whether it succeeded.
fn report_resolve(mode: OutputMode, outcome: Result<Resolved, ResolveError>) -> Result<bool> {
  match outcome {
    Ok(resolved) => {
      println!("{}", output::render_resolved(mode, &resolved)?);
      Ok(true)
    }
    Err(e) => {
      match mode {
        OutputMode::Json => println!("{}", output::render_resolve_error(mode, &e)),
        OutputMode::Text => eprintln!("{}", output::render_resolve_error(mode, &e)),
      }
      Ok(false)
    }
  }
}

async fn run_resolve(
  resolver: &Resolver,
  config: &Config,
  target: ResolveTarget,
) -> Result<Resolved, ResolveError> {
  let resolved = |kind, query: String, id| Resolved {
    kind,
    query,
    id,
    is_application: None,
  };

  Ok(match target {
    ResolveTarget::User { query } => {
      let user = resolver.resolve_user(&query).await?;
      Resolved {
        is_application: Some(user.is_application),
        ..resolved(EntityKind::User, query, user.id)
      }
    }
    ResolveTarget::Team { query } => {
      let id = resolver.resolve_team(&query).await?;
      resolved(EntityKind::Team, query, id)
    }
    ResolveTarget::Issue { query } => {
      // The resolver only takes identifiers; a UUID already is the ID
      let id = if looks_like_uuid(query.trim()) {
        query.trim().to_string()
      } else {
        resolver.resolve_issue(&query).await?
      };
      resolved(EntityKind::Issue, query, id)
    }
    ResolveTarget::Cycle { query, team } => {
      let team_id = required_team(resolver, config, team).await?;
      let id = resolver.resolve_cycle(&query, &team_id).await?;
      resolved(EntityKind::Cycle, query, id)
    }
    ResolveTarget::Project { query, team } => {
      let team_id = match team {
        Some(team) => Some(resolver.resolve_team(&team).await?),
        None => None,
      };
      let id = resolver.resolve_project(&query, team_id.as_deref()).await?;
      resolved(EntityKind::Project, query, id)
    }
    ResolveTarget::Label { query, team } => {
      let team_id = required_team(resolver, config, team).await?;
      let id = resolver.resolve_label(&query, &team_id).await?;
      resolved(EntityKind::Label, query, id)
    }
  })
}

/// `--team`, else the configured default team, resolved to an ID.
async fn required_team(
  resolver: &Resolver,
  config: &Config,
  team: Option<String>,
) -> Result<String, ResolveError> {
  let team = team
    .or_else(|| config.linear.default_team.clone())
    .ok_or_else(|| {
      ResolveError::validation("a team is required: pass --team or set linear.default_team in the config")
    })?;
  resolver.resolve_team(&team).await
}

async fn attachment(config: &Config, action: AttachmentAction, mode: OutputMode) -> Result<()> {
  let client = AttachmentClient::from_config(
    &config.attachments,
    &config.cache,
    Arc::new(EnvTokenProvider),
  );

  match action {
    AttachmentAction::Get { url, format } => {
      let response = client.get_attachment(&url, format).await;
      println!("{}", output::render_attachment(mode, &response)?);
    }
    AttachmentAction::Download { url } => {
      let path = client
        .download_to_temp_file(&url)
        .await
        .map_err(|e| eyre!("Failed to download attachment: {}", e))?;
      println!("{}", output::render_path(mode, &path)?);
    }
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use async_trait::async_trait;
  use linr::linear::{Cycle, IssueRef, Label, LinearApi, Project, Team, User};
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::time::Duration;

  const ISSUE_UUID: &str = "5c3b0e7a-1f2d-4c5e-9a8b-7d6c5b4a3f21";

  /// Workspace with one issue, counting calls.
  #[derive(Default)]
  struct OneIssue {
    calls: AtomicUsize,
  }

  #[async_trait]
  impl LinearApi for OneIssue {
    async fn viewer(&self) -> color_eyre::Result<User> {
      Err(eyre!("unused"))
    }

    async fn users_by_email(&self, _: &str) -> color_eyre::Result<Vec<User>> {
      Ok(Vec::new())
    }

    async fn users_by_display_name(&self, _: &str) -> color_eyre::Result<Vec<User>> {
      Ok(Vec::new())
    }

    async fn teams(&self) -> color_eyre::Result<Vec<Team>> {
      Ok(Vec::new())
    }

    async fn issue(&self, id: &str) -> color_eyre::Result<Option<IssueRef>> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      Ok((id == "ENG-7").then(|| IssueRef {
        id: ISSUE_UUID.into(),
        identifier: "ENG-7".into(),
        title: "Seven".into(),
      }))
    }

    async fn cycles(&self, _: &str, _: usize) -> color_eyre::Result<Vec<Cycle>> {
      Ok(Vec::new())
    }

    async fn projects(&self, _: Option<&str>, _: usize) -> color_eyre::Result<Vec<Project>> {
      Ok(Vec::new())
    }

    async fn labels(&self, _: &str) -> color_eyre::Result<Vec<Label>> {
      Ok(Vec::new())
    }

    fn is_agent_mode(&self) -> bool {
      false
    }
  }

  fn resolver() -> (Arc<OneIssue>, Resolver) {
    let api = Arc::new(OneIssue::default());
    let resolver = Resolver::with_ttl(api.clone(), Duration::from_secs(60));
    (api, resolver)
  }

  #[tokio::test]
  async fn test_issue_uuid_passes_through() {
    let (api, resolver) = resolver();

    let resolved = run_resolve(
      &resolver,
      &Config::default(),
      ResolveTarget::Issue {
        query: ISSUE_UUID.into(),
      },
    )
    .await
    .unwrap();

    assert_eq!(resolved.id, ISSUE_UUID);
    assert_eq!(api.calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_issue_identifier_is_resolved() {
    let (api, resolver) = resolver();

    let resolved = run_resolve(
      &resolver,
      &Config::default(),
      ResolveTarget::Issue {
        query: "ENG-7".into(),
      },
    )
    .await
    .unwrap();

    assert_eq!(resolved.id, ISSUE_UUID);
    assert_eq!(api.calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_label_without_team_is_validation_error() {
    let (_, resolver) = resolver();

    let err = run_resolve(
      &resolver,
      &Config::default(),
      ResolveTarget::Label {
        query: "bug".into(),
        team: None,
      },
    )
    .await
    .unwrap_err();

    assert!(err.is_validation());
  }

  #[test]
  fn test_failed_resolve_reports_failure_without_exiting() {
    let err = ResolveError::validation("issue identifier cannot be empty");
    assert!(!report_resolve(OutputMode::Json, Err(err)).unwrap());

    let ok = Resolved {
      kind: EntityKind::Team,
      query: "ENG".into(),
      id: "t-1".into(),
      is_application: None,
    };
    assert!(report_resolve(OutputMode::Text, Ok(ok)).unwrap());
  }
}
