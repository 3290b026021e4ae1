//! Serde-deserializable types matching Linear GraphQL responses.
//!
//! These types are separate from domain types to allow clean deserialization
//! while keeping domain types focused on application needs.

use serde::Deserialize;

// ============================================================================
// GraphQL envelope
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct GraphQlResponse<T> {
  pub data: Option<T>,
  #[serde(default)]
  pub errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
pub struct GraphQlError {
  pub message: String,
  #[serde(default)]
  pub extensions: Option<GraphQlErrorExtensions>,
}

#[derive(Debug, Deserialize)]
pub struct GraphQlErrorExtensions {
  pub code: Option<String>,
}

impl GraphQlError {
  /// Linear reports unknown entities as an error rather than a null field.
  pub fn is_not_found(&self) -> bool {
    let code_matches = self
      .extensions
      .as_ref()
      .and_then(|e| e.code.as_deref())
      .is_some_and(|c| c.eq_ignore_ascii_case("NOT_FOUND"));
    code_matches || self.message.to_lowercase().contains("not found")
  }
}

#[derive(Debug, Deserialize)]
pub struct Connection<T> {
  #[serde(default = "Vec::new")]
  pub nodes: Vec<T>,
}

// ============================================================================
// Entities
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiUser {
  pub id: String,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub display_name: String,
  #[serde(default)]
  pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiTeam {
  pub id: String,
  pub key: String,
  pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiIssue {
  pub id: String,
  pub identifier: String,
  #[serde(default)]
  pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiCycle {
  pub id: String,
  // Linear models cycle numbers as Float
  pub number: f64,
  pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiProject {
  pub id: String,
  pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiLabel {
  pub id: String,
  pub name: String,
}

// ============================================================================
// Query payloads
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ViewerData {
  pub viewer: ApiUser,
}

#[derive(Debug, Deserialize)]
pub struct UsersData {
  pub users: Connection<ApiUser>,
}

#[derive(Debug, Deserialize)]
pub struct TeamsData {
  pub teams: Connection<ApiTeam>,
}

#[derive(Debug, Deserialize)]
pub struct IssueData {
  pub issue: Option<ApiIssue>,
}

#[derive(Debug, Deserialize)]
pub struct TeamCyclesData {
  pub team: TeamCycles,
}

#[derive(Debug, Deserialize)]
pub struct TeamCycles {
  pub cycles: Connection<ApiCycle>,
}

#[derive(Debug, Deserialize)]
pub struct ProjectsData {
  pub projects: Connection<ApiProject>,
}

#[derive(Debug, Deserialize)]
pub struct TeamProjectsData {
  pub team: ProjectsData,
}

#[derive(Debug, Deserialize)]
pub struct TeamLabelsData {
  pub team: TeamLabels,
}

#[derive(Debug, Deserialize)]
pub struct TeamLabels {
  pub labels: Connection<ApiLabel>,
}

// ============================================================================
// Conversions to domain types
// ============================================================================

use super::types::{Cycle, IssueRef, Label, Project, Team, User};

impl From<ApiUser> for User {
  fn from(u: ApiUser) -> Self {
    User {
      id: u.id,
      name: u.name,
      display_name: u.display_name,
      email: u.email.unwrap_or_default(),
    }
  }
}

impl From<ApiTeam> for Team {
  fn from(t: ApiTeam) -> Self {
    Team {
      id: t.id,
      key: t.key,
      name: t.name,
    }
  }
}

impl From<ApiIssue> for IssueRef {
  fn from(i: ApiIssue) -> Self {
    IssueRef {
      id: i.id,
      identifier: i.identifier,
      title: i.title,
    }
  }
}

impl From<ApiCycle> for Cycle {
  fn from(c: ApiCycle) -> Self {
    Cycle {
      id: c.id,
      number: c.number.max(0.0) as u32,
      name: c.name,
    }
  }
}

impl From<ApiProject> for Project {
  fn from(p: ApiProject) -> Self {
    Project {
      id: p.id,
      name: p.name,
    }
  }
}

impl From<ApiLabel> for Label {
  fn from(l: ApiLabel) -> Self {
    Label {
      id: l.id,
      name: l.name,
    }
  }
}
