//! Typed resolution failures.
//!
//! Callers include autonomous agents, so the not-found and ambiguity variants
//! carry candidate lists and remediation text rather than bare messages.

use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ResolveError>;

/// Kind of entity being resolved, used in messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
  User,
  Team,
  Issue,
  Cycle,
  Project,
  Label,
}

impl EntityKind {
  fn plural(self) -> &'static str {
    match self {
      EntityKind::User => "users",
      EntityKind::Team => "teams",
      EntityKind::Issue => "issues",
      EntityKind::Cycle => "cycles",
      EntityKind::Project => "projects",
      EntityKind::Label => "labels",
    }
  }
}

impl std::fmt::Display for EntityKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let name = match self {
      EntityKind::User => "user",
      EntityKind::Team => "team",
      EntityKind::Issue => "issue",
      EntityKind::Cycle => "cycle",
      EntityKind::Project => "project",
      EntityKind::Label => "label",
    };
    f.write_str(name)
  }
}

#[derive(Debug, Error)]
pub enum ResolveError {
  /// Malformed or empty input, rejected before any lookup
  #[error("{0}")]
  Validation(String),

  /// Well-formed input that matches nothing. `suggestions` lists what does exist, when known.
  #[error("{}", not_found_message(.kind, .query, .suggestions))]
  NotFound {
    kind: EntityKind,
    query: String,
    suggestions: Vec<String>,
  },

  /// Input that matches more than one entity
  #[error("{}", ambiguous_message(.kind, .query, .suggestions, .hint))]
  Ambiguous {
    kind: EntityKind,
    query: String,
    suggestions: Vec<String>,
    hint: String,
  },

  /// The API returned data that violates a uniqueness assumption
  #[error("inconsistent {kind} data for '{query}': {detail}")]
  Inconsistent {
    kind: EntityKind,
    query: String,
    detail: String,
  },

  /// The Linear API call itself failed
  #[error("{context}: {source}")]
  Api {
    context: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync + 'static>,
  },
}

impl ResolveError {
  pub fn validation(message: impl Into<String>) -> Self {
    ResolveError::Validation(message.into())
  }

  pub fn not_found(kind: EntityKind, query: &str, suggestions: Vec<String>) -> Self {
    ResolveError::NotFound {
      kind,
      query: query.to_string(),
      suggestions,
    }
  }

  pub fn ambiguous(
    kind: EntityKind,
    query: &str,
    suggestions: Vec<String>,
    hint: impl Into<String>,
  ) -> Self {
    ResolveError::Ambiguous {
      kind,
      query: query.to_string(),
      suggestions,
      hint: hint.into(),
    }
  }

  /// Wrap a collaborator failure with the operation that was attempted.
  pub fn api(context: impl Into<String>) -> impl FnOnce(color_eyre::Report) -> Self {
    let context = context.into();
    move |source| ResolveError::Api {
      context,
      source: source.into(),
    }
  }

  pub fn is_validation(&self) -> bool {
    matches!(self, ResolveError::Validation(_))
  }

  pub fn is_not_found(&self) -> bool {
    matches!(self, ResolveError::NotFound { .. })
  }

  pub fn is_ambiguous(&self) -> bool {
    matches!(self, ResolveError::Ambiguous { .. })
  }

  /// Candidates (ambiguous) or alternatives (not found). Empty for other kinds.
  pub fn suggestions(&self) -> &[String] {
    match self {
      ResolveError::NotFound { suggestions, .. } | ResolveError::Ambiguous { suggestions, .. } => {
        suggestions
      }
      _ => &[],
    }
  }
}

fn not_found_message(kind: &EntityKind, query: &str, suggestions: &[String]) -> String {
  let mut message = format!("{} '{}' not found", kind, query);
  if !suggestions.is_empty() {
    message.push_str(&format!(
      ". Available {}: {}",
      kind.plural(),
      suggestions.join(", ")
    ));
  }
  message
}

fn ambiguous_message(kind: &EntityKind, query: &str, suggestions: &[String], hint: &str) -> String {
  let mut message = format!(
    "'{}' matches {} {}:",
    query,
    suggestions.len(),
    kind.plural()
  );
  for candidate in suggestions {
    message.push_str("\n  - ");
    message.push_str(candidate);
  }
  if !hint.is_empty() {
    message.push('\n');
    message.push_str(hint);
  }
  message
}
