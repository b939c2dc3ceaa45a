//! Notifier publishing pass outcomes as GitHub commit statuses.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tidegate_application::Notifier;
use tidegate_core::{AppError, AppResult};
use tidegate_domain::NotificationEvent;
use tracing::debug;

const MAX_DESCRIPTION_CHARS: usize = 140;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct CommitStatus {
    state: String,
    context: String,
    #[serde(default)]
    description: Option<String>,
}

/// GitHub commit status notifier.
#[derive(Clone)]
pub struct GitHubCommitStatusNotifier {
    http_client: reqwest::Client,
    api_base_url: String,
    owner: String,
    repository: String,
    token: String,
}

impl GitHubCommitStatusNotifier {
    /// Creates a notifier for `repository`, given as `owner/name` or a git URL.
    pub fn new(
        http_client: reqwest::Client,
        api_base_url: impl Into<String>,
        repository: &str,
        token: impl Into<String>,
    ) -> AppResult<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(AppError::Validation(
                "github token cannot be empty".to_owned(),
            ));
        }

        let (owner, repository) = parse_repository(repository)?;

        Ok(Self {
            http_client,
            api_base_url: api_base_url.into().trim_end_matches('/').to_owned(),
            owner,
            repository,
            token,
        })
    }

    fn statuses_url(&self, path: &str, revision: &str) -> String {
        format!(
            "{}/repos/{}/{}/{path}/{revision}",
            self.api_base_url, self.owner, self.repository
        )
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        self.http_client
            .request(method, url)
            .bearer_auth(self.token.as_str())
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .header(reqwest::header::USER_AGENT, "tidegate")
    }

    async fn list_statuses(&self, revision: &str) -> AppResult<Vec<CommitStatus>> {
        let url = format!(
            "{}/statuses?per_page=50",
            self.statuses_url("commits", revision)
        );
        let response = self
            .request(reqwest::Method::GET, url)
            .send()
            .await
            .map_err(|error| {
                AppError::Remote(format!("could not list commit statuses: {error}"))
            })?;

        if !response.status().is_success() {
            return Err(AppError::Remote(format!(
                "could not list commit statuses: status {}",
                response.status()
            )));
        }

        response.json::<Vec<CommitStatus>>().await.map_err(|error| {
            AppError::Remote(format!("could not decode commit statuses: {error}"))
        })
    }
}

#[async_trait]
impl Notifier for GitHubCommitStatusNotifier {
    async fn send(&self, event: &NotificationEvent) -> AppResult<()> {
        if event.revision.trim().is_empty() {
            return Err(AppError::Validation(
                "cannot create commit status without a revision".to_owned(),
            ));
        }

        let status = CommitStatus {
            state: event.state.as_str().to_owned(),
            context: event.name.clone(),
            description: Some(truncate_description(event.description.as_str())),
        };

        let existing = self.list_statuses(event.revision.as_str()).await?;
        if is_duplicate_status(&existing, &status) {
            debug!(revision = %event.revision, "commit status already up to date");
            return Ok(());
        }

        let response = self
            .request(
                reqwest::Method::POST,
                self.statuses_url("statuses", event.revision.as_str()),
            )
            .json(&status)
            .send()
            .await
            .map_err(|error| {
                AppError::Remote(format!("could not create commit status: {error}"))
            })?;

        if !response.status().is_success() {
            let code = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<response body unavailable>".to_owned());
            return Err(AppError::Remote(format!(
                "could not create commit status: status {code}: {body}"
            )));
        }

        Ok(())
    }
}

fn truncate_description(description: &str) -> String {
    description.chars().take(MAX_DESCRIPTION_CHARS).collect()
}

// Statuses are listed newest first; only the latest one per context counts.
fn is_duplicate_status(existing: &[CommitStatus], status: &CommitStatus) -> bool {
    existing
        .iter()
        .find(|candidate| candidate.context == status.context)
        .is_some_and(|latest| {
            latest.state == status.state && latest.description == status.description
        })
}

fn parse_repository(address: &str) -> AppResult<(String, String)> {
    let trimmed = address.trim();
    let path = if let Some((_, rest)) = trimmed.split_once("://") {
        rest.split_once('/').map_or("", |(_, path)| path)
    } else if let Some((_, path)) = trimmed
        .strip_prefix("git@")
        .and_then(|rest| rest.split_once(':'))
    {
        path
    } else {
        trimmed
    };

    let path = path.trim_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path);

    match path.split('/').collect::<Vec<_>>().as_slice() {
        [owner, repository] if !owner.is_empty() && !repository.is_empty() => {
            Ok(((*owner).to_owned(), (*repository).to_owned()))
        }
        _ => Err(AppError::Validation(format!(
            "invalid repository id \"{address}\""
        ))),
    }
}
