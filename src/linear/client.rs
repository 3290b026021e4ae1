use crate::config::{AuthMode, Config, Credentials};
use crate::linear::api::LinearApi;
use crate::linear::api_types::{
  GraphQlResponse, IssueData, ProjectsData, TeamCyclesData, TeamLabelsData, TeamProjectsData,
  TeamsData, UsersData, ViewerData,
};
use crate::linear::types::{Cycle, IssueRef, Label, Project, Team, User};
use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

const VIEWER_QUERY: &str = "query Viewer { viewer { id name displayName email } }";

const USERS_BY_EMAIL_QUERY: &str = "query UsersByEmail($email: String!) { \
  users(filter: { email: { eq: $email } }) { nodes { id name displayName email } } }";

const USERS_BY_NAME_QUERY: &str = "query UsersByName($name: String!) { \
  users(first: 50, filter: { or: [{ name: { containsIgnoreCase: $name } }, \
  { displayName: { containsIgnoreCase: $name } }] }) { nodes { id name displayName email } } }";

const TEAMS_QUERY: &str = "query Teams { teams(first: 250) { nodes { id key name } } }";

const ISSUE_QUERY: &str =
  "query Issue($id: String!) { issue(id: $id) { id identifier title } }";

const CYCLES_QUERY: &str = "query TeamCycles($teamId: String!, $first: Int!) { \
  team(id: $teamId) { cycles(first: $first) { nodes { id number name } } } }";

const PROJECTS_QUERY: &str =
  "query Projects($first: Int!) { projects(first: $first) { nodes { id name } } }";

const TEAM_PROJECTS_QUERY: &str = "query TeamProjects($teamId: String!, $first: Int!) { \
  team(id: $teamId) { projects(first: $first) { nodes { id name } } } }";

const LABELS_QUERY: &str = "query TeamLabels($teamId: String!) { \
  team(id: $teamId) { labels(first: 250) { nodes { id name } } } }";

/// Linear GraphQL API client
#[derive(Clone)]
pub struct LinearClient {
  http: reqwest::Client,
  api_url: String,
  authorization: String,
  agent_mode: bool,
}

impl LinearClient {
  pub fn new(config: &Config) -> Result<Self> {
    let credentials = Config::get_credentials()?;
    Self::with_credentials(
      &config.linear.api_url,
      &credentials,
      config.linear.auth_mode == AuthMode::Agent,
    )
  }

  pub fn with_credentials(api_url: &str, credentials: &Credentials, agent_mode: bool) -> Result<Self> {
    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(30))
      .user_agent(concat!("linr/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      api_url: api_url.to_string(),
      authorization: credentials.authorization_header(),
      agent_mode,
    })
  }

  /// Post a GraphQL document and return the raw envelope.
  async fn send<T: DeserializeOwned>(
    &self,
    operation: &str,
    query: &str,
    variables: Value,
  ) -> Result<GraphQlResponse<T>> {
    debug!(operation, "Linear GraphQL request");

    let body = json!({
      "operationName": operation,
      "query": query,
      "variables": variables,
    });

    let response = self
      .http
      .post(&self.api_url)
      .header(reqwest::header::AUTHORIZATION, &self.authorization)
      .json(&body)
      .send()
      .await
      .map_err(|e| eyre!("{} request failed: {}", operation, e))?;

    let status = response.status();
    if !status.is_success() && status != reqwest::StatusCode::BAD_REQUEST {
      let text = response.text().await.unwrap_or_default();
      return Err(eyre!(
        "{} failed with HTTP {}: {}",
        operation,
        status.as_u16(),
        text.trim()
      ));
    }

    response
      .json::<GraphQlResponse<T>>()
      .await
      .map_err(|e| eyre!("Failed to parse {} response: {}", operation, e))
  }

  /// Post a GraphQL document and require a clean `data` payload.
  async fn execute<T: DeserializeOwned>(
    &self,
    operation: &str,
    query: &str,
    variables: Value,
  ) -> Result<T> {
    let response = self.send::<T>(operation, query, variables).await?;

    if !response.errors.is_empty() {
      let messages: Vec<&str> = response.errors.iter().map(|e| e.message.as_str()).collect();
      return Err(eyre!("{} failed: {}", operation, messages.join("; ")));
    }

    response
      .data
      .ok_or_else(|| eyre!("{} returned no data", operation))
  }
}

#[async_trait]
impl LinearApi for LinearClient {
  async fn viewer(&self) -> Result<User> {
    let data: ViewerData = self.execute("Viewer", VIEWER_QUERY, json!({})).await?;
    Ok(data.viewer.into())
  }

  async fn users_by_email(&self, email: &str) -> Result<Vec<User>> {
    let data: UsersData = self
      .execute("UsersByEmail", USERS_BY_EMAIL_QUERY, json!({ "email": email }))
      .await?;
    Ok(data.users.nodes.into_iter().map(User::from).collect())
  }

  async fn users_by_display_name(&self, name: &str) -> Result<Vec<User>> {
    let data: UsersData = self
      .execute("UsersByName", USERS_BY_NAME_QUERY, json!({ "name": name }))
      .await?;
    Ok(data.users.nodes.into_iter().map(User::from).collect())
  }

  async fn teams(&self) -> Result<Vec<Team>> {
    let data: TeamsData = self.execute("Teams", TEAMS_QUERY, json!({})).await?;
    Ok(data.teams.nodes.into_iter().map(Team::from).collect())
  }

  async fn issue(&self, id_or_identifier: &str) -> Result<Option<IssueRef>> {
    let response = self
      .send::<IssueData>("Issue", ISSUE_QUERY, json!({ "id": id_or_identifier }))
      .await?;

    if response.errors.iter().any(|e| e.is_not_found()) {
      return Ok(None);
    }
    if !response.errors.is_empty() {
      let messages: Vec<&str> = response.errors.iter().map(|e| e.message.as_str()).collect();
      return Err(eyre!("Issue failed: {}", messages.join("; ")));
    }

    Ok(response.data.and_then(|d| d.issue).map(IssueRef::from))
  }

  async fn cycles(&self, team_id: &str, limit: usize) -> Result<Vec<Cycle>> {
    let data: TeamCyclesData = self
      .execute(
        "TeamCycles",
        CYCLES_QUERY,
        json!({ "teamId": team_id, "first": limit }),
      )
      .await?;
    Ok(data.team.cycles.nodes.into_iter().map(Cycle::from).collect())
  }

  async fn projects(&self, team_id: Option<&str>, limit: usize) -> Result<Vec<Project>> {
    let nodes = match team_id {
      Some(team_id) => {
        let data: TeamProjectsData = self
          .execute(
            "TeamProjects",
            TEAM_PROJECTS_QUERY,
            json!({ "teamId": team_id, "first": limit }),
          )
          .await?;
        data.team.projects.nodes
      }
      None => {
        let data: ProjectsData = self
          .execute("Projects", PROJECTS_QUERY, json!({ "first": limit }))
          .await?;
        data.projects.nodes
      }
    };
    Ok(nodes.into_iter().map(Project::from).collect())
  }

  async fn labels(&self, team_id: &str) -> Result<Vec<Label>> {
    let data: TeamLabelsData = self
      .execute("TeamLabels", LABELS_QUERY, json!({ "teamId": team_id }))
      .await?;
    Ok(data.team.labels.nodes.into_iter().map(Label::from).collect())
  }

  fn is_agent_mode(&self) -> bool {
    self.agent_mode
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use mockito::Matcher;

  fn client(server: &mockito::Server) -> LinearClient {
    LinearClient::with_credentials(
      &format!("{}/graphql", server.url()),
      &Credentials::ApiKey("lin_api_test".into()),
      false,
    )
    .unwrap()
  }

  #[tokio::test]
  async fn test_users_by_email_sends_filter_and_key() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("POST", "/graphql")
      .match_header("authorization", "lin_api_test")
      .match_body(Matcher::PartialJson(json!({
        "operationName": "UsersByEmail",
        "variables": { "email": "jane@acme.io" }
      })))
      .with_status(200)
      .with_header("content-type", "application/json")
      .with_body(
        r#"{"data":{"users":{"nodes":[{"id":"u-1","name":"Jane Roe","displayName":"jane","email":"jane@acme.io"}]}}}"#,
      )
      .create_async()
      .await;

    let users = client(&server).users_by_email("jane@acme.io").await.unwrap();

    mock.assert_async().await;
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].id, "u-1");
    assert_eq!(users[0].name, "Jane Roe");
  }

  #[tokio::test]
  async fn test_issue_not_found_is_none() {
    let mut server = mockito::Server::new_async().await;
    server
      .mock("POST", "/graphql")
      .with_status(200)
      .with_header("content-type", "application/json")
      .with_body(r#"{"data":null,"errors":[{"message":"Entity not found: Issue"}]}"#)
      .create_async()
      .await;

    let issue = client(&server).issue("ENG-999").await.unwrap();
    assert!(issue.is_none());
  }

  #[tokio::test]
  async fn test_issue_found() {
    let mut server = mockito::Server::new_async().await;
    server
      .mock("POST", "/graphql")
      .match_body(Matcher::PartialJson(json!({ "variables": { "id": "ENG-12" } })))
      .with_status(200)
      .with_header("content-type", "application/json")
      .with_body(r#"{"data":{"issue":{"id":"i-12","identifier":"ENG-12","title":"Fix it"}}}"#)
      .create_async()
      .await;

    let issue = client(&server).issue("ENG-12").await.unwrap().unwrap();
    assert_eq!(issue.id, "i-12");
  }

  #[tokio::test]
  async fn test_graphql_errors_surface() {
    let mut server = mockito::Server::new_async().await;
    server
      .mock("POST", "/graphql")
      .with_status(200)
      .with_header("content-type", "application/json")
      .with_body(r#"{"data":null,"errors":[{"message":"Authentication required"}]}"#)
      .create_async()
      .await;

    let err = client(&server).teams().await.unwrap_err();
    assert!(err.to_string().contains("Authentication required"));
  }

  #[tokio::test]
  async fn test_http_error_surfaces() {
    let mut server = mockito::Server::new_async().await;
    server
      .mock("POST", "/graphql")
      .with_status(502)
      .with_body("bad gateway")
      .create_async()
      .await;

    let err = client(&server).viewer().await.unwrap_err();
    assert!(err.to_string().contains("HTTP 502"));
  }

  #[tokio::test]
  async fn test_team_scoped_projects() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("POST", "/graphql")
      .match_body(Matcher::PartialJson(json!({
        "operationName": "TeamProjects",
        "variables": { "teamId": "t-1", "first": 100 }
      })))
      .with_status(200)
      .with_header("content-type", "application/json")
      .with_body(r#"{"data":{"team":{"projects":{"nodes":[{"id":"p-1","name":"Apollo"}]}}}}"#)
      .create_async()
      .await;

    let projects = client(&server).projects(Some("t-1"), 100).await.unwrap();

    mock.assert_async().await;
    assert_eq!(projects[0].name, "Apollo");
  }
}
