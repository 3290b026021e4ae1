//! Rendering of command results for humans (`text`) and programs (`json`).

use clap::ValueEnum;
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use std::path::Path;

use crate::attachment::AttachmentResponse;
use crate::resolver::{EntityKind, ResolveError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputMode {
  #[default]
  Text,
  Json,
}

/// A successfully resolved identifier.
#[derive(Debug, Clone, Serialize)]
pub struct Resolved {
  pub kind: EntityKind,
  pub query: String,
  pub id: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub is_application: Option<bool>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
  error: String,
  #[serde(skip_serializing_if = "<[String]>::is_empty")]
  suggestions: &'a [String],
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
  serde_json::to_string(value).map_err(|e| eyre!("Failed to serialize output: {}", e))
}

pub fn render_resolved(mode: OutputMode, resolved: &Resolved) -> Result<String> {
  match mode {
    OutputMode::Json => to_json(resolved),
    OutputMode::Text => Ok(match resolved.is_application {
      Some(true) => format!("{} (application)", resolved.id),
      _ => resolved.id.clone(),
    }),
  }
}

/// Text mode prints one `key: value` line per populated field, content last.
pub fn render_attachment(mode: OutputMode, response: &AttachmentResponse) -> Result<String> {
  if mode == OutputMode::Json {
    return to_json(response);
  }

  let mut lines = vec![
    format!("format: {}", response.format),
    format!("url: {}", response.url),
  ];
  if let Some(content_type) = &response.content_type {
    lines.push(format!("content_type: {}", content_type));
  }
  if let Some(size) = response.size {
    lines.push(format!("size: {}", size));
  }
  if let (Some(w), Some(h)) = (response.width, response.height) {
    lines.push(format!("dimensions: {}x{}", w, h));
  }
  if response.resized {
    lines.push("resized: true".to_string());
  }
  if let Some(error) = &response.error {
    lines.push(format!("error: {}", error));
  }
  if !response.content.is_empty() {
    lines.push(format!("content: {}", response.content));
  }
  Ok(lines.join("\n"))
}

pub fn render_path(mode: OutputMode, path: &Path) -> Result<String> {
  match mode {
    OutputMode::Json => to_json(&serde_json::json!({ "path": path })),
    OutputMode::Text => Ok(path.display().to_string()),
  }
}

pub fn render_resolve_error(mode: OutputMode, err: &ResolveError) -> String {
  match mode {
    OutputMode::Text => format!("Error: {}", err),
    OutputMode::Json => {
      let body = ErrorBody {
        error: err.to_string(),
        suggestions: err.suggestions(),
      };
      serde_json::to_string(&body).unwrap_or_else(|_| format!("{{\"error\":{:?}}}", err.to_string()))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::attachment::AttachmentFormat;

  fn resolved(is_application: Option<bool>) -> Resolved {
    Resolved {
      kind: EntityKind::User,
      query: "john@acme.io".into(),
      id: "u-1".into(),
      is_application,
    }
  }

  #[test]
  fn test_resolved_text() {
    assert_eq!(render_resolved(OutputMode::Text, &resolved(None)).unwrap(), "u-1");
    assert_eq!(
      render_resolved(OutputMode::Text, &resolved(Some(true))).unwrap(),
      "u-1 (application)"
    );
  }

  #[test]
  fn test_resolved_json() {
    let json = render_resolved(OutputMode::Json, &resolved(Some(false))).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();

    assert_eq!(value["id"], "u-1");
    assert_eq!(value["query"], "john@acme.io");
    assert_eq!(value["is_application"], false);
  }

  #[test]
  fn test_attachment_text_lists_populated_fields() {
    let response = AttachmentResponse {
      format: AttachmentFormat::Url,
      content: "https://uploads.linear.app/a".into(),
      url: "https://uploads.linear.app/a".into(),
      content_type: Some("text/plain".into()),
      size: Some(2_000_000),
      width: None,
      height: None,
      resized: false,
      error: Some("too big".into()),
    };

    let text = render_attachment(OutputMode::Text, &response).unwrap();
    assert_eq!(
      text,
      "format: url\n\
       url: https://uploads.linear.app/a\n\
       content_type: text/plain\n\
       size: 2000000\n\
       error: too big\n\
       content: https://uploads.linear.app/a"
    );
  }

  #[test]
  fn test_error_json_carries_suggestions() {
    let err = ResolveError::ambiguous(
      EntityKind::User,
      "John",
      vec!["John Doe (john@acme.io)".into(), "Johnny (johnny@acme.io)".into()],
      "use an email address",
    );

    let value: serde_json::Value =
      serde_json::from_str(&render_resolve_error(OutputMode::Json, &err)).unwrap();
    assert_eq!(value["suggestions"].as_array().unwrap().len(), 2);
    assert!(value["error"].as_str().unwrap().contains("John"));
  }

  #[test]
  fn test_error_json_omits_empty_suggestions() {
    let err = ResolveError::validation("team ID is required");
    let json = render_resolve_error(OutputMode::Json, &err);
    assert!(!json.contains("suggestions"));
  }
}
