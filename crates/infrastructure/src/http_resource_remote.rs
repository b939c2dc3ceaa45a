//! REST remote for container resources with long-running operation polling.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tidegate_application::ResourceRemote;
use tidegate_core::{AppError, AppResult};
use tidegate_domain::{LiveResource, LiveState, ResourceKind, ResourceSpecification};
use tracing::debug;
use url::Url;

const ASYNC_OPERATION_HEADER: &str = "azure-asyncoperation";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollMode {
    AsyncOperation,
    Location,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum OperationState {
    Running,
    Succeeded,
    Failed(String),
}

/// HTTP implementation of the resource remote port.
///
/// Lists with `GET {base}`, applies with `PUT {base}/{name}` and deletes with
/// `DELETE {base}/{name}`. Accepted operations are polled through their
/// async-operation or location URL until they finish.
#[derive(Clone)]
pub struct HttpResourceRemote {
    http_client: reqwest::Client,
    kind: ResourceKind,
    base_url: Url,
    token: Option<String>,
    poll_interval: Duration,
    max_polls: u32,
}

impl HttpResourceRemote {
    /// Creates a remote for `kind` rooted at `base_url`.
    pub fn new(
        http_client: reqwest::Client,
        kind: ResourceKind,
        base_url: &str,
        token: Option<String>,
    ) -> AppResult<Self> {
        let base_url = Url::parse(base_url).map_err(|error| {
            AppError::Validation(format!("invalid {kind} api base url '{base_url}': {error}"))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::Validation(format!(
                "invalid {kind} api base url '{base_url}'"
            )));
        }

        Ok(Self {
            http_client,
            kind,
            base_url,
            token: token.filter(|token| !token.trim().is_empty()),
            poll_interval: Duration::from_secs(5),
            max_polls: 360,
        })
    }

    /// Overrides the operation polling cadence.
    #[must_use]
    pub fn with_polling(mut self, poll_interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = poll_interval;
        self.max_polls = max_polls.max(1);
        self
    }

    fn resource_url(&self, name: &str) -> AppResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                AppError::Internal(format!("invalid {} api base url", self.kind))
            })?
            .pop_if_empty()
            .push(name);
        Ok(url)
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let builder = self.http_client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
        action: &str,
    ) -> AppResult<reqwest::Response> {
        builder.send().await.map_err(|error| {
            AppError::Remote(format!("{} {action} request failed: {error}", self.kind))
        })
    }

    async fn complete(&self, response: reqwest::Response, action: &str) -> AppResult<()> {
        let status = response.status();
        if !status.is_success() {
            return Err(self.unexpected_status(response, action).await);
        }

        let operation = header_value(&response, ASYNC_OPERATION_HEADER)
            .map(|url| (url, PollMode::AsyncOperation))
            .or_else(|| {
                (status == StatusCode::ACCEPTED)
                    .then(|| header_value(&response, reqwest::header::LOCATION.as_str()))
                    .flatten()
                    .map(|url| (url, PollMode::Location))
            });
        let Some((operation_url, mode)) = operation else {
            return Ok(());
        };

        for attempt in 1..=self.max_polls {
            tokio::time::sleep(self.poll_interval).await;
            debug!(kind = %self.kind, action, attempt, "polling remote operation");

            let response = self
                .send(self.request(reqwest::Method::GET, operation_url.as_str()), action)
                .await?;
            let status = response.status();
            if status == StatusCode::ACCEPTED {
                continue;
            }
            if !status.is_success() {
                return Err(self.unexpected_status(response, action).await);
            }

            let body = response.bytes().await.map_err(|error| {
                AppError::Remote(format!("{} {action} poll failed: {error}", self.kind))
            })?;
            let body: Value = if body.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&body).map_err(|error| {
                    AppError::Remote(format!(
                        "{} {action} poll returned invalid json: {error}",
                        self.kind
                    ))
                })?
            };

            match operation_state(&body, mode) {
                OperationState::Running => continue,
                OperationState::Succeeded => return Ok(()),
                OperationState::Failed(message) => {
                    return Err(AppError::Remote(format!(
                        "{} {action} operation failed: {message}",
                        self.kind
                    )));
                }
            }
        }

        Err(AppError::Remote(format!(
            "{} {action} operation did not complete after {} polls",
            self.kind, self.max_polls
        )))
    }

    async fn unexpected_status(&self, response: reqwest::Response, action: &str) -> AppError {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<response body unavailable>".to_owned());
        AppError::Remote(format!(
            "{} {action} failed with status {status}: {body}",
            self.kind
        ))
    }

    async fn put(&self, name: &str, specification: &ResourceSpecification) -> AppResult<()> {
        let url = self.resource_url(name)?;
        let response = self
            .send(
                self.request(reqwest::Method::PUT, url.as_str())
                    .json(specification.payload()),
                "apply",
            )
            .await?;

        self.complete(response, "apply").await
    }
}

#[async_trait]
impl ResourceRemote for HttpResourceRemote {
    fn kind(&self) -> ResourceKind {
        self.kind
    }

    async fn list(&self) -> AppResult<LiveState> {
        let mut resources = Vec::new();
        let mut next_url = Some(self.base_url.to_string());

        while let Some(url) = next_url.take() {
            let response = self
                .send(self.request(reqwest::Method::GET, url.as_str()), "list")
                .await?;
            if !response.status().is_success() {
                return Err(self.unexpected_status(response, "list").await);
            }

            let page: Value = response.json().await.map_err(|error| {
                AppError::Remote(format!("{} list returned invalid json: {error}", self.kind))
            })?;
            resources.extend(live_resources_from_page(&page)?);
            next_url = page
                .get("nextLink")
                .and_then(Value::as_str)
                .filter(|link| !link.is_empty())
                .map(str::to_owned);
        }

        Ok(resources.into_iter().collect())
    }

    async fn create(&self, name: &str, specification: &ResourceSpecification) -> AppResult<()> {
        self.put(name, specification).await
    }

    async fn update(&self, name: &str, specification: &ResourceSpecification) -> AppResult<()> {
        self.put(name, specification).await
    }

    async fn delete(&self, name: &str) -> AppResult<()> {
        let url = self.resource_url(name)?;
        let response = self
            .send(self.request(reqwest::Method::DELETE, url.as_str()), "delete")
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }

        self.complete(response, "delete").await
    }
}

fn header_value(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

fn live_resources_from_page(page: &Value) -> AppResult<Vec<LiveResource>> {
    let Some(items) = page.get("value").and_then(Value::as_array) else {
        return Err(AppError::Remote(
            "list response is missing the 'value' array".to_owned(),
        ));
    };

    items
        .iter()
        .map(|item| {
            let name = item.get("name").and_then(Value::as_str).ok_or_else(|| {
                AppError::Remote("listed resource is missing 'name'".to_owned())
            })?;
            Ok(LiveResource::from_remote_payload(name, item.clone()))
        })
        .collect()
}

// Location polls answer 200/204 without a status once done; async-operation
// polls always carry one.
fn operation_state(body: &Value, mode: PollMode) -> OperationState {
    let Some(status) = body.get("status").and_then(Value::as_str) else {
        return match mode {
            PollMode::Location => OperationState::Succeeded,
            PollMode::AsyncOperation => OperationState::Running,
        };
    };

    match status.to_ascii_lowercase().as_str() {
        "succeeded" => OperationState::Succeeded,
        "failed" | "canceled" | "cancelled" => OperationState::Failed(
            body.get("error")
                .and_then(|error| error.get("message"))
                .and_then(Value::as_str)
                .unwrap_or(status)
                .to_owned(),
        ),
        _ => OperationState::Running,
    }
}
