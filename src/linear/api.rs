//! Collaborator interfaces consumed by the resolver and attachment pipeline.
//!
//! `LinearClient` implements these against the real API; tests substitute
//! in-memory fakes.

use async_trait::async_trait;
use color_eyre::Result;

use super::types::{Cycle, IssueRef, Label, Project, Team, User};

/// Read-only lookups against the Linear workspace.
#[async_trait]
pub trait LinearApi: Send + Sync {
  /// The authenticated actor.
  async fn viewer(&self) -> Result<User>;

  /// Users whose email equals `email` exactly. Expected to hold zero or one entry.
  async fn users_by_email(&self, email: &str) -> Result<Vec<User>>;

  /// Users whose name or display name contains `name`, case-insensitively.
  async fn users_by_display_name(&self, name: &str) -> Result<Vec<User>>;

  async fn teams(&self) -> Result<Vec<Team>>;

  /// Look up an issue by UUID or identifier (`ENG-123`). `None` when it does not exist.
  async fn issue(&self, id_or_identifier: &str) -> Result<Option<IssueRef>>;

  async fn cycles(&self, team_id: &str, limit: usize) -> Result<Vec<Cycle>>;

  /// Projects accessible to `team_id`, or the whole workspace when `None`.
  async fn projects(&self, team_id: Option<&str>, limit: usize) -> Result<Vec<Project>>;

  async fn labels(&self, team_id: &str) -> Result<Vec<Label>>;

  /// Whether the client acts as an OAuth application rather than a human.
  fn is_agent_mode(&self) -> bool;
}

/// Supplies bearer tokens for private upload URLs.
pub trait TokenProvider: Send + Sync {
  fn token(&self) -> Result<String>;
}

/// Token provider over a fixed token.
#[derive(Clone)]
pub struct StaticToken(pub String);

impl TokenProvider for StaticToken {
  fn token(&self) -> Result<String> {
    Ok(self.0.clone())
  }
}

impl std::fmt::Debug for StaticToken {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str("StaticToken(***)")
  }
}
