//! Human-readable identifier resolution.
//!
//! Translates emails, names, team keys, cycle numbers, label names, project
//! names and issue identifiers into Linear UUIDs. Results are cached per
//! namespace in a [`ResolverCache`]; a name that matches several entities is
//! reported as [`ResolveError::Ambiguous`] with every candidate listed so the
//! caller can retry with something more specific.

mod cache;
mod error;
mod matching;

pub use cache::ResolverCache;
pub use error::{EntityKind, ResolveError, Result};
pub use matching::{
  is_application_email, is_email, is_issue_identifier, looks_like_uuid, APPLICATION_EMAIL_SUFFIX,
};

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::linear::{Cycle, LinearApi};
use matching::match_by_name;

/// Most cycles fetched per team when resolving a cycle.
pub const CYCLE_LIMIT: usize = 100;

/// Most projects fetched when resolving a project.
pub const PROJECT_LIMIT: usize = 100;

/// Outcome of resolving a user.
///
/// `is_application` tells the caller whether to set the issue's delegate
/// (application actor) or its assignee (human).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedUser {
  pub id: String,
  pub is_application: bool,
}

/// Resolves human-readable identifiers to Linear IDs.
#[derive(Clone)]
pub struct Resolver {
  api: Arc<dyn LinearApi>,
  cache: Arc<ResolverCache>,
}

impl Resolver {
  pub fn new(api: Arc<dyn LinearApi>, cache: Arc<ResolverCache>) -> Self {
    Self { api, cache }
  }

  /// Resolver with its own cache using the given TTL.
  pub fn with_ttl(api: Arc<dyn LinearApi>, ttl: Duration) -> Self {
    Self::new(api, Arc::new(ResolverCache::new(ttl)))
  }

  pub fn cache(&self) -> &ResolverCache {
    &self.cache
  }

  /// Resolve `me`, a UUID, an email address or a (display) name.
  pub async fn resolve_user(&self, name_or_email: &str) -> Result<ResolvedUser> {
    let input = name_or_email.trim();
    if input.is_empty() {
      return Err(ResolveError::validation("user identifier cannot be empty"));
    }

    if input.eq_ignore_ascii_case("me") {
      let viewer = self
        .api
        .viewer()
        .await
        .map_err(ResolveError::api("failed to get current user"))?;
      return Ok(ResolvedUser {
        id: viewer.id,
        is_application: self.api.is_agent_mode(),
      });
    }

    // Application actors can't be told apart without a lookup
    if looks_like_uuid(input) {
      return Ok(ResolvedUser {
        id: input.to_string(),
        is_application: false,
      });
    }

    if is_email(input) {
      return self.resolve_user_by_email(input).await;
    }

    self.resolve_user_by_name(input).await
  }

  async fn resolve_user_by_email(&self, email: &str) -> Result<ResolvedUser> {
    let key = email.to_lowercase();
    if let Some(user) = self.cache.user_by_email.get(&key) {
      debug!(email, "User cache hit");
      return Ok(user);
    }

    let users = self
      .api
      .users_by_email(email)
      .await
      .map_err(ResolveError::api(format!("failed to find user by email '{}'", email)))?;

    let user = match users.as_slice() {
      [] => {
        return Err(ResolveError::not_found(EntityKind::User, email, Vec::new()));
      }
      [user] => user,
      _ => {
        return Err(ResolveError::Inconsistent {
          kind: EntityKind::User,
          query: email.to_string(),
          detail: format!("{} users share this email address", users.len()),
        });
      }
    };

    let resolved = ResolvedUser {
      id: user.id.clone(),
      is_application: is_application_email(email),
    };
    self.cache.user_by_email.set(key, resolved.clone());
    if !user.name.is_empty() {
      self
        .cache
        .user_by_name
        .set(user.name.to_lowercase(), resolved.clone());
    }

    Ok(resolved)
  }

  async fn resolve_user_by_name(&self, name: &str) -> Result<ResolvedUser> {
    let key = name.to_lowercase();
    if let Some(user) = self.cache.user_by_name.get(&key) {
      debug!(name, "User cache hit");
      return Ok(user);
    }

    let users = self
      .api
      .users_by_display_name(name)
      .await
      .map_err(ResolveError::api(format!("failed to search users for '{}'", name)))?;

    let matches = match_by_name(&users, name);
    match matches.as_slice() {
      [] => Err(ResolveError::not_found(EntityKind::User, name, Vec::new())),
      [user] => {
        let resolved = ResolvedUser {
          id: user.id.clone(),
          is_application: is_application_email(&user.email),
        };
        self.cache.user_by_name.set(key, resolved.clone());
        Ok(resolved)
      }
      _ => Err(ResolveError::ambiguous(
        EntityKind::User,
        name,
        matches
          .iter()
          .map(|u| format!("{} ({})", u.name, u.email))
          .collect(),
        "Retry with the full email address or the full display name.",
      )),
    }
  }

  /// Resolve a team key (`ENG`), team name or team UUID.
  pub async fn resolve_team(&self, key_or_name: &str) -> Result<String> {
    let input = key_or_name.trim();
    if input.is_empty() {
      return Err(ResolveError::validation("team identifier cannot be empty"));
    }

    if looks_like_uuid(input) {
      return Ok(input.to_string());
    }

    if let Some(id) = self.cache.team_by_key.get(&input.to_uppercase()) {
      debug!(team = input, "Team cache hit (key)");
      return Ok(id);
    }
    if let Some(id) = self.cache.team_by_name.get(&input.to_lowercase()) {
      debug!(team = input, "Team cache hit (name)");
      return Ok(id);
    }

    let teams = self
      .api
      .teams()
      .await
      .map_err(ResolveError::api("failed to list teams"))?;

    for team in &teams {
      self.cache.team_by_key.set(team.key.to_uppercase(), team.id.clone());
      self
        .cache
        .team_by_name
        .set(team.name.to_lowercase(), team.id.clone());
    }

    // Keys are unique, so the first structural match wins
    teams
      .iter()
      .find(|t| t.key.eq_ignore_ascii_case(input))
      .or_else(|| teams.iter().find(|t| t.name.eq_ignore_ascii_case(input)))
      .map(|t| t.id.clone())
      .ok_or_else(|| {
        ResolveError::not_found(
          EntityKind::Team,
          input,
          teams
            .iter()
            .map(|t| format!("{} ({})", t.key, t.name))
            .collect(),
        )
      })
  }

  /// Resolve an issue identifier such as `ENG-123`.
  ///
  /// UUIDs and free text are rejected; callers holding a UUID already have the ID.
  pub async fn resolve_issue(&self, identifier: &str) -> Result<String> {
    let input = identifier.trim();
    if input.is_empty() {
      return Err(ResolveError::validation("issue identifier cannot be empty"));
    }
    if !is_issue_identifier(input) {
      return Err(ResolveError::validation(format!(
        "invalid issue identifier '{}': expected TEAM-NUMBER, e.g. ENG-123",
        input
      )));
    }

    if let Some(id) = self.cache.issue_by_identifier.get(input) {
      debug!(issue = input, "Issue cache hit");
      return Ok(id);
    }

    let issue = self
      .api
      .issue(input)
      .await
      .map_err(ResolveError::api(format!("failed to get issue {}", input)))?
      .ok_or_else(|| ResolveError::not_found(EntityKind::Issue, input, Vec::new()))?;

    self.cache.issue_by_identifier.set(input, issue.id.clone());
    Ok(issue.id)
  }

  /// Resolve a cycle number (`62`, `#62`), cycle name or UUID within a team.
  ///
  /// Numbers take precedence over names: a cycle named "62" loses to cycle number 62.
  pub async fn resolve_cycle(&self, number_or_name: &str, team_id: &str) -> Result<String> {
    let input = number_or_name.trim();
    if input.is_empty() {
      return Err(ResolveError::validation("cycle identifier cannot be empty"));
    }
    if team_id.trim().is_empty() {
      return Err(ResolveError::validation(
        "team ID is required to resolve a cycle",
      ));
    }

    if looks_like_uuid(input) {
      return Ok(input.to_string());
    }

    let cycles = self
      .api
      .cycles(team_id, CYCLE_LIMIT)
      .await
      .map_err(ResolveError::api(format!("failed to list cycles for team {}", team_id)))?;

    if let Ok(number) = input.strip_prefix('#').unwrap_or(input).parse::<u32>() {
      if let Some(cycle) = cycles.iter().find(|c| c.number == number) {
        return Ok(cycle.id.clone());
      }
    }

    let matches = match_by_name(&cycles, input);
    match matches.as_slice() {
      [] => Err(ResolveError::not_found(
        EntityKind::Cycle,
        input,
        cycles.iter().map(cycle_label).collect(),
      )),
      [cycle] => Ok(cycle.id.clone()),
      _ => Err(ResolveError::ambiguous(
        EntityKind::Cycle,
        input,
        matches.iter().copied().map(cycle_label).collect(),
        "Retry with the cycle number or the full cycle name.",
      )),
    }
  }

  /// Resolve a project name or UUID, scoped to a team when one is given.
  pub async fn resolve_project(&self, name_or_id: &str, team_id: Option<&str>) -> Result<String> {
    let input = name_or_id.trim();
    if input.is_empty() {
      return Err(ResolveError::validation("project identifier cannot be empty"));
    }

    if looks_like_uuid(input) {
      return Ok(input.to_string());
    }

    let team_id = team_id.map(str::trim).filter(|t| !t.is_empty());
    let key = ResolverCache::project_key(team_id, input);
    if let Some(id) = self.cache.project_by_name.get(&key) {
      debug!(project = input, "Project cache hit");
      return Ok(id);
    }

    let projects = self
      .api
      .projects(team_id, PROJECT_LIMIT)
      .await
      .map_err(ResolveError::api("failed to list projects"))?;

    let wanted = input.to_lowercase();
    let matches: Vec<_> = projects
      .iter()
      .filter(|p| p.name.to_lowercase() == wanted)
      .collect();

    match matches.as_slice() {
      [] => Err(ResolveError::not_found(
        EntityKind::Project,
        input,
        projects.iter().map(|p| p.name.clone()).collect(),
      )),
      [project] => {
        self.cache.project_by_name.set(key, project.id.clone());
        Ok(project.id.clone())
      }
      _ => Err(ResolveError::ambiguous(
        EntityKind::Project,
        input,
        matches
          .iter()
          .map(|p| format!("{} (ID: {})", p.name, p.id))
          .collect(),
        "Retry with the project ID.",
      )),
    }
  }

  /// Resolve a label name within a team.
  pub async fn resolve_label(&self, label_name: &str, team_id: &str) -> Result<String> {
    let input = label_name.trim();
    if input.is_empty() {
      return Err(ResolveError::validation("label name cannot be empty"));
    }
    if team_id.trim().is_empty() {
      return Err(ResolveError::validation(
        "team ID is required to resolve a label",
      ));
    }

    let key = ResolverCache::label_key(team_id, input);
    if let Some(id) = self.cache.label_by_name.get(&key) {
      debug!(label = input, "Label cache hit");
      return Ok(id);
    }

    let labels = self
      .api
      .labels(team_id)
      .await
      .map_err(ResolveError::api(format!("failed to list labels for team {}", team_id)))?;

    let wanted = input.to_lowercase();
    let label = labels
      .iter()
      .find(|l| l.name.to_lowercase() == wanted)
      .ok_or_else(|| {
        ResolveError::not_found(
          EntityKind::Label,
          input,
          labels.iter().map(|l| l.name.clone()).collect(),
        )
      })?;

    self.cache.label_by_name.set(key, label.id.clone());
    Ok(label.id.clone())
  }
}

fn cycle_label(cycle: &Cycle) -> String {
  format!("#{}: {}", cycle.number, cycle.display_name())
}
