//! Per-entity caches backing the resolver.

use std::time::Duration;

use crate::cache::{sweep_period, Sweeper, TtlCache};

use super::ResolvedUser;

/// Namespaced ID caches sharing one TTL and one sweep task.
///
/// Keys are normalized by the resolver before they reach these maps: emails and
/// names are lowercased, team keys uppercased, labels stored as `teamID:name`.
#[derive(Debug)]
pub struct ResolverCache {
  pub user_by_email: TtlCache<ResolvedUser>,
  pub user_by_name: TtlCache<ResolvedUser>,
  pub team_by_name: TtlCache<String>,
  pub team_by_key: TtlCache<String>,
  pub issue_by_identifier: TtlCache<String>,
  pub label_by_name: TtlCache<String>,
  pub project_by_name: TtlCache<String>,
  sweeper: Sweeper,
}

impl ResolverCache {
  pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

  pub fn new(ttl: Duration) -> Self {
    let user_by_email = TtlCache::new(ttl);
    let user_by_name = TtlCache::new(ttl);
    let team_by_name = TtlCache::new(ttl);
    let team_by_key = TtlCache::new(ttl);
    let issue_by_identifier = TtlCache::new(ttl);
    let label_by_name = TtlCache::new(ttl);
    let project_by_name = TtlCache::new(ttl);

    let sweeper = {
      let user_by_email = user_by_email.clone();
      let user_by_name = user_by_name.clone();
      let team_by_name = team_by_name.clone();
      let team_by_key = team_by_key.clone();
      let issue_by_identifier = issue_by_identifier.clone();
      let label_by_name = label_by_name.clone();
      let project_by_name = project_by_name.clone();
      Sweeper::spawn("resolver", sweep_period(ttl), move || {
        user_by_email.remove_expired()
          + user_by_name.remove_expired()
          + team_by_name.remove_expired()
          + team_by_key.remove_expired()
          + issue_by_identifier.remove_expired()
          + label_by_name.remove_expired()
          + project_by_name.remove_expired()
      })
    };

    Self {
      user_by_email,
      user_by_name,
      team_by_name,
      team_by_key,
      issue_by_identifier,
      label_by_name,
      project_by_name,
      sweeper,
    }
  }

  /// Composite key for team-scoped label lookups.
  pub fn label_key(team_id: &str, label_name: &str) -> String {
    format!("{}:{}", team_id, label_name.to_lowercase())
  }

  /// Project names are only unique per team, so the team scope is part of the key.
  pub fn project_key(team_id: Option<&str>, project_name: &str) -> String {
    format!("{}:{}", team_id.unwrap_or(""), project_name.to_lowercase())
  }

  /// Sweep every namespace once. Returns the number of entries removed.
  pub fn remove_expired(&self) -> usize {
    self.user_by_email.remove_expired()
      + self.user_by_name.remove_expired()
      + self.team_by_name.remove_expired()
      + self.team_by_key.remove_expired()
      + self.issue_by_identifier.remove_expired()
      + self.label_by_name.remove_expired()
      + self.project_by_name.remove_expired()
  }

  pub fn clear(&self) {
    self.user_by_email.clear();
    self.user_by_name.clear();
    self.team_by_name.clear();
    self.team_by_key.clear();
    self.issue_by_identifier.clear();
    self.label_by_name.clear();
    self.project_by_name.clear();
  }

  /// Total entries across namespaces, including expired ones not yet swept.
  pub fn len(&self) -> usize {
    self.user_by_email.len()
      + self.user_by_name.len()
      + self.team_by_name.len()
      + self.team_by_key.len()
      + self.issue_by_identifier.len()
      + self.label_by_name.len()
      + self.project_by_name.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Stop the background sweep. Lookups keep working with lazy expiry.
  pub fn stop(&self) {
    self.sweeper.stop();
  }
}

impl Default for ResolverCache {
  fn default() -> Self {
    Self::new(Self::DEFAULT_TTL)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_keys_are_normalized() {
    assert_eq!(ResolverCache::label_key("team-1", "Bug"), "team-1:bug");
    assert_eq!(ResolverCache::project_key(None, "Apollo"), ":apollo");
    assert_eq!(
      ResolverCache::project_key(Some("team-1"), "Apollo"),
      "team-1:apollo"
    );
  }

  #[tokio::test(start_paused = true)]
  async fn test_sweep_converges_across_namespaces() {
    let cache = ResolverCache::new(Duration::from_secs(60));
    cache.stop();

    cache.team_by_key.set("ENG", "t-1".to_string());
    cache
      .issue_by_identifier
      .set_with_ttl("ENG-1", "i-1".to_string(), Duration::from_secs(10));
    cache
      .label_by_name
      .set_with_ttl("t-1:bug", "l-1".to_string(), Duration::from_secs(10));
    assert_eq!(cache.len(), 3);

    tokio::time::advance(Duration::from_secs(10)).await;

    assert_eq!(cache.remove_expired(), 2);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.team_by_key.get("ENG").as_deref(), Some("t-1"));
  }

  #[tokio::test(start_paused = true)]
  async fn test_background_sweep_runs_at_half_ttl() {
    let cache = ResolverCache::new(Duration::from_secs(60));
    cache.project_by_name.set(":apollo", "p-1".to_string());

    // Expires at 60s, swept by the tick at 60s (ticks every 30s)
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert!(cache.is_empty());
  }

  #[test]
  fn test_clear_empties_all_namespaces() {
    let cache = ResolverCache::default();
    cache.user_by_email.set(
      "a@b.io",
      ResolvedUser {
        id: "u".into(),
        is_application: false,
      },
    );
    cache.team_by_name.set("engineering", "t".to_string());

    cache.clear();
    assert!(cache.is_empty());
  }
}
