pub mod api;
pub mod api_types;
pub mod client;
pub mod types;

pub use api::{LinearApi, StaticToken, TokenProvider};
pub use client::LinearClient;
pub use types::{Cycle, IssueRef, Label, Project, Team, User};
