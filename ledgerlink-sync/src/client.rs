//! HTTP access to a hledger-web server.

use crate::cancel::CancelToken;
use crate::config::SyncConfig;
use crate::error::{FetchError, FetchResult};
use ledgerlink_types::Profile;
use reqwest::header::{ACCEPT, ACCEPT_CHARSET};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::future::Future;
use tracing::debug;

/// Lines of a rejection body kept for the error message.
const REJECTION_BODY_LINES: usize = 6;

/// Thin wrapper over a shared `reqwest` client.
///
/// Every call takes the profile (base URL and credentials) and a
/// [`CancelToken`] it races against.
#[derive(Debug, Clone)]
pub struct HledgerClient {
    http: Client,
}

impl HledgerClient {
    /// Builds a client with the configured timeout and user agent.
    pub fn new(config: &SyncConfig) -> FetchResult<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| FetchError::Http(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { http })
    }

    /// `GET {profile.url}/{path}` and returns the body as text.
    pub async fn get_text(&self, profile: &Profile, path: &str, cancel: &CancelToken) -> FetchResult<String> {
        cancel.check()?;
        let url = profile.endpoint(path);
        debug!(%url, "GET");

        let request = authorize(self.http.get(&url), profile).header(ACCEPT_CHARSET, "UTF-8");
        race(cancel, async move {
            let response = request.send().await?;
            let response = check_status(response, false).await?;
            Ok::<_, FetchError>(response.text().await?)
        })
        .await
    }

    /// `PUT {profile.url}/{path}` with a JSON body.
    pub async fn put_json(
        &self,
        profile: &Profile,
        path: &str,
        body: &serde_json::Value,
        cancel: &CancelToken,
    ) -> FetchResult<()> {
        cancel.check()?;
        let url = profile.endpoint(path);
        debug!(%url, "PUT");

        let request = authorize(self.http.put(&url), profile)
            .header(ACCEPT, "*/*")
            .json(body);
        race(cancel, async move {
            let response = request.send().await?;
            check_status(response, true).await?;
            Ok::<_, FetchError>(())
        })
        .await
    }
}

fn authorize(request: RequestBuilder, profile: &Profile) -> RequestBuilder {
    match &profile.credentials {
        Some(credentials) if !credentials.user.is_empty() => {
            request.basic_auth(&credentials.user, Some(&credentials.password))
        }
        _ => request,
    }
}

async fn race<T>(cancel: &CancelToken, request: impl Future<Output = FetchResult<T>>) -> FetchResult<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(FetchError::Cancelled),
        result = request => result,
    }
}

async fn check_status(response: Response, is_write: bool) -> FetchResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    match status {
        StatusCode::UNAUTHORIZED => Err(FetchError::Unauthorized),
        StatusCode::NOT_FOUND => Err(FetchError::NotFound),
        StatusCode::BAD_REQUEST | StatusCode::METHOD_NOT_ALLOWED if is_write => {
            let text = response.text().await.unwrap_or_default();
            let body = text
                .lines()
                .take(REJECTION_BODY_LINES)
                .collect::<Vec<_>>()
                .join("\n");
            Err(FetchError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
        _ => Err(FetchError::Status {
            status: status.as_u16(),
        }),
    }
}
