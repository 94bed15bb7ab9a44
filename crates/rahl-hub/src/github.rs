//! GitHub client — OAuth code exchange and repository export.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use rahl_core::config::GitHubSettings;
use rahl_core::error::{RahlError, Result};

const USER_AGENT: &str = "rahl-ai";
const GITHUB_JSON: &str = "application/vnd.github.v3+json";
const DEFAULT_DESCRIPTION: &str = "Created by Rahl AI";

/// Reply from GitHub's OAuth token endpoint.
///
/// GitHub answers failed exchanges with HTTP 200 and an `error` field, so
/// both shapes live in one struct.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

/// A freshly created repository.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreatedRepo {
    pub repo_url: String,
    pub clone_url: String,
}

#[derive(Serialize)]
struct OAuthExchange<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    code: &'a str,
}

#[derive(Serialize)]
struct NewRepo<'a> {
    name: &'a str,
    description: &'a str,
    private: bool,
    auto_init: bool,
}

#[derive(Deserialize)]
struct RepoInfo {
    html_url: String,
    clone_url: String,
    owner: RepoOwner,
}

#[derive(Deserialize)]
struct RepoOwner {
    login: String,
}

#[derive(Serialize)]
struct FileUpload {
    message: String,
    content: String,
}

/// GitHub API client.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: Client,
    settings: GitHubSettings,
}

impl GitHubClient {
    pub fn new(settings: GitHubSettings) -> Self {
        Self {
            client: Client::new(),
            settings,
        }
    }

    /// Whether the OAuth app credentials are configured.
    pub fn oauth_enabled(&self) -> bool {
        self.settings.client_id.is_some() && self.settings.client_secret.is_some()
    }

    /// Exchange an OAuth authorization code for an access token.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse> {
        let (Some(client_id), Some(client_secret)) = (
            self.settings.client_id.as_deref(),
            self.settings.client_secret.as_deref(),
        ) else {
            return Err(RahlError::Config("GitHub OAuth is not configured".into()));
        };

        let resp = self
            .client
            .post(&self.settings.oauth_url)
            .header("Accept", "application/json")
            .header("User-Agent", USER_AGENT)
            .json(&OAuthExchange {
                client_id,
                client_secret,
                code,
            })
            .send()
            .await?;

        let resp = check(resp, "OAuth token exchange").await?;
        let token: TokenResponse = resp.json().await?;

        if let Some(error) = &token.error {
            debug!("GitHub OAuth exchange rejected: {}", error);
        }
        Ok(token)
    }

    /// Create a public repository and upload `files` into it, one commit each.
    pub async fn create_repository(
        &self,
        access_token: &str,
        name: &str,
        description: Option<&str>,
        files: &BTreeMap<String, String>,
    ) -> Result<CreatedRepo> {
        let api = self.settings.api_base.trim_end_matches('/');

        let resp = self
            .client
            .post(format!("{}/user/repos", api))
            .header("Authorization", format!("token {}", access_token))
            .header("Accept", GITHUB_JSON)
            .header("User-Agent", USER_AGENT)
            .json(&NewRepo {
                name,
                description: description.unwrap_or(DEFAULT_DESCRIPTION),
                private: false,
                auto_init: true,
            })
            .send()
            .await?;

        let repo: RepoInfo = check(resp, "create repository").await?.json().await?;
        info!("Created GitHub repository {}/{}", repo.owner.login, name);

        for (path, content) in files {
            let url = format!(
                "{}/repos/{}/{}/contents/{}",
                api, repo.owner.login, name, path
            );
            let resp = self
                .client
                .put(url)
                .header("Authorization", format!("token {}", access_token))
                .header("Accept", GITHUB_JSON)
                .header("User-Agent", USER_AGENT)
                .json(&FileUpload {
                    message: format!("Add {}", path),
                    content: STANDARD.encode(content),
                })
                .send()
                .await?;
            check(resp, "upload file").await?;
            debug!("Uploaded {} ({} bytes)", path, content.len());
        }

        Ok(CreatedRepo {
            repo_url: repo.html_url,
            clone_url: repo.clone_url,
        })
    }
}

/// Turn a non-success response into a [`RahlError::GitHub`].
async fn check(resp: Response, action: &str) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(RahlError::GitHub(format!(
        "{} failed ({}): {}",
        action,
        status,
        body.chars().take(200).collect::<String>()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use axum::{
        extract::{Path, State},
        http::{HeaderMap, StatusCode},
        routing::{post, put},
        Json, Router,
    };

    type Uploads = Arc<Mutex<Vec<(String, serde_json::Value)>>>;

    async fn spawn(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn fake_github(uploads: Uploads) -> Router {
        Router::new()
            .route(
                "/user/repos",
                post(|headers: HeaderMap, Json(body): Json<serde_json::Value>| async move {
                    if headers.get("authorization").and_then(|v| v.to_str().ok())
                        != Some("token gho_test")
                    {
                        return Err(StatusCode::UNAUTHORIZED);
                    }
                    let name = body["name"].as_str().unwrap_or_default().to_string();
                    Ok(Json(serde_json::json!({
                        "html_url": format!("https://github.com/octo/{}", name),
                        "clone_url": format!("https://github.com/octo/{}.git", name),
                        "owner": {"login": "octo"},
                        "description": body["description"],
                    })))
                }),
            )
            .route(
                "/repos/{owner}/{repo}/contents/{*path}",
                put(
                    |State(uploads): State<Uploads>,
                     Path((owner, repo, path)): Path<(String, String, String)>,
                     Json(body): Json<serde_json::Value>| async move {
                        uploads
                            .lock()
                            .unwrap()
                            .push((format!("{}/{}/{}", owner, repo, path), body));
                        StatusCode::CREATED
                    },
                ),
            )
            .route(
                "/login/oauth/access_token",
                post(|Json(body): Json<serde_json::Value>| async move {
                    if body["code"] == "good" {
                        Json(serde_json::json!({
                            "access_token": "gho_test",
                            "token_type": "bearer",
                            "scope": "repo"
                        }))
                    } else {
                        Json(serde_json::json!({
                            "error": "bad_verification_code",
                            "error_description": "The code passed is incorrect or expired."
                        }))
                    }
                }),
            )
            .with_state(uploads)
    }

    fn settings(base: &str) -> GitHubSettings {
        GitHubSettings {
            client_id: Some("id".into()),
            client_secret: Some("secret".into()),
            api_base: base.to_string(),
            oauth_url: format!("{}/login/oauth/access_token", base),
        }
    }

    #[tokio::test]
    async fn test_create_repository_uploads_files() {
        let uploads: Uploads = Arc::default();
        let base = spawn(fake_github(uploads.clone())).await;
        let client = GitHubClient::new(settings(&base));

        let files = BTreeMap::from([
            ("index.html".to_string(), "<h1>hi</h1>".to_string()),
            ("src/app.js".to_string(), "console.log(1)".to_string()),
        ]);
        let repo = client
            .create_repository("gho_test", "todo", None, &files)
            .await
            .unwrap();

        assert_eq!(repo.repo_url, "https://github.com/octo/todo");
        assert_eq!(repo.clone_url, "https://github.com/octo/todo.git");

        let uploads = uploads.lock().unwrap();
        assert_eq!(uploads.len(), 2);
        assert_eq!(uploads[0].0, "octo/todo/index.html");
        assert_eq!(uploads[0].1["message"], "Add index.html");
        assert_eq!(uploads[0].1["content"], STANDARD.encode("<h1>hi</h1>"));
        assert_eq!(uploads[1].0, "octo/todo/src/app.js");
    }

    #[tokio::test]
    async fn test_create_repository_rejected() {
        let base = spawn(fake_github(Arc::default())).await;
        let client = GitHubClient::new(settings(&base));

        let err = client
            .create_repository("wrong", "todo", Some("desc"), &BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RahlError::GitHub(_)));
    }

    #[tokio::test]
    async fn test_exchange_code() {
        let base = spawn(fake_github(Arc::default())).await;
        let client = GitHubClient::new(settings(&base));

        let token = client.exchange_code("good").await.unwrap();
        assert_eq!(token.access_token.as_deref(), Some("gho_test"));

        let token = client.exchange_code("stale").await.unwrap();
        assert_eq!(token.error.as_deref(), Some("bad_verification_code"));
        assert!(token.access_token.is_none());
    }

    #[tokio::test]
    async fn test_exchange_code_requires_credentials() {
        let client = GitHubClient::new(GitHubSettings::default());
        assert!(!client.oauth_enabled());
        assert!(matches!(
            client.exchange_code("x").await,
            Err(RahlError::Config(_))
        ));
    }
}
