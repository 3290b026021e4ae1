//! Input classification and name matching.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::linear::{Cycle, User};

/// Emails ending with this belong to OAuth application actors.
pub const APPLICATION_EMAIL_SUFFIX: &str = "@oauthapp.linear.app";

static ISSUE_IDENTIFIER_RE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^[A-Z]+-[0-9]+$").expect("valid issue identifier regex"));

static EMAIL_RE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

/// Shape check for Linear IDs: 36 characters with hyphens at 8, 13, 18 and 23.
///
/// Deliberately permissive about the other characters. Every UUID passthrough
/// in the resolver goes through here, so a stricter parse can be swapped in
/// at this one place.
pub fn looks_like_uuid(s: &str) -> bool {
  let bytes = s.as_bytes();
  bytes.len() == 36 && [8, 13, 18, 23].iter().all(|&i| bytes[i] == b'-')
}

/// `ENG-123` style identifiers: uppercase team key, hyphen, number.
pub fn is_issue_identifier(s: &str) -> bool {
  ISSUE_IDENTIFIER_RE.is_match(s)
}

pub fn is_email(s: &str) -> bool {
  EMAIL_RE.is_match(s)
}

pub fn is_application_email(email: &str) -> bool {
  email.to_lowercase().ends_with(APPLICATION_EMAIL_SUFFIX)
}

/// Something that can be picked out of a list by name.
pub trait Candidate {
  fn id(&self) -> &str;

  /// Every name this candidate answers to.
  fn names(&self) -> Vec<String>;
}

impl Candidate for User {
  fn id(&self) -> &str {
    &self.id
  }

  fn names(&self) -> Vec<String> {
    vec![self.name.clone(), self.display_name.clone()]
  }
}

impl Candidate for Cycle {
  fn id(&self) -> &str {
    &self.id
  }

  fn names(&self) -> Vec<String> {
    vec![self.display_name()]
  }
}

/// Two-tier case-insensitive match: exact name equality first, then substring
/// containment. Both tiers are pooled and de-duplicated by ID, exact matches first.
pub fn match_by_name<'a, T: Candidate>(items: &'a [T], query: &str) -> Vec<&'a T> {
  let query = query.to_lowercase();
  let mut seen: HashSet<&str> = HashSet::new();
  let mut matches = Vec::new();

  let exact = items.iter().filter(|item| {
    item
      .names()
      .iter()
      .any(|n| !n.is_empty() && n.to_lowercase() == query)
  });
  let partial = items.iter().filter(|item| {
    item
      .names()
      .iter()
      .any(|n| !n.is_empty() && n.to_lowercase().contains(&query))
  });

  for item in exact.chain(partial) {
    if seen.insert(item.id()) {
      matches.push(item);
    }
  }

  matches
}
