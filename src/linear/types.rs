/// A workspace member or OAuth application actor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
  pub id: String,
  pub name: String,
  pub display_name: String,
  pub email: String,
}

/// Team summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Team {
  pub id: String,
  pub key: String, // e.g. "ENG"
  pub name: String,
}

/// Minimal issue reference returned by identifier lookups
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueRef {
  pub id: String,
  pub identifier: String, // e.g. "ENG-123"
  pub title: String,
}

/// Team cycle (sprint)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cycle {
  pub id: String,
  pub number: u32,
  pub name: Option<String>,
}

impl Cycle {
  /// Name shown to humans: the cycle's own name, or "Cycle <n>" when unnamed.
  pub fn display_name(&self) -> String {
    match &self.name {
      Some(name) if !name.is_empty() => name.clone(),
      _ => format!("Cycle {}", self.number),
    }
  }
}

/// Project summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
  pub id: String,
  pub name: String,
}

/// Issue label, scoped to a team
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
  pub id: String,
  pub name: String,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_cycle_display_name() {
    let named = Cycle {
      id: "c1".into(),
      number: 7,
      name: Some("Q3 Hardening".into()),
    };
    let unnamed = Cycle {
      id: "c2".into(),
      number: 8,
      name: None,
    };
    let blank = Cycle {
      id: "c3".into(),
      number: 9,
      name: Some(String::new()),
    };

    assert_eq!(named.display_name(), "Q3 Hardening");
    assert_eq!(unnamed.display_name(), "Cycle 8");
    assert_eq!(blank.display_name(), "Cycle 9");
  }
}
