// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The concrete HTTP client.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;

use crate::error::ClientError;
use crate::remote::RemoteApi;
use crate::sse::Subscription;
use crate::types::{Contributor, Invite, Me, Origin, RemoteFile};

/// Typed facade over the remote REST API. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
    token: String,
}

/// Percent-encode each path segment individually, preserving the
/// separating slashes.
pub fn encode_path(path: &str) -> String {
    path.split('/').map(|seg| urlencoding::encode(seg).into_owned()).collect::<Vec<_>>().join("/")
}

impl ApiClient {
    pub fn new(server: &str, token: &str) -> Result<Self, ClientError> {
        let base = Url::parse(server).map_err(|e| ClientError::BadUrl(e.to_string()))?;
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| ClientError::BadUrl(e.to_string()))?;
        headers.insert(AUTHORIZATION, bearer);
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(ClientError::from)?;
        Ok(Self { http, base, token: token.to_string() })
    }

    pub fn server(&self) -> &Url {
        &self.base
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// The underlying HTTP client, Authorization header included. Used
    /// by the daemon's reverse proxy.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    fn url(&self, path: &str) -> Result<Url, ClientError> {
        self.base.join(path).map_err(|e| ClientError::BadUrl(e.to_string()))
    }

    /// The authenticated user.
    pub async fn me(&self) -> Result<Me, ClientError> {
        let resp = self.http.get(self.url("/v1/me")?).send().await?;
        parse_json(resp).await
    }

    /// Register a new contributor, optionally redeeming an invite.
    pub async fn signup(&self, name: &str, invite: Option<&str>) -> Result<Me, ClientError> {
        let mut body = json!({ "username": name });
        if let Some(code) = invite {
            body["invite"] = json!(code);
        }
        let resp = self.http.post(self.url("/v1/signup")?).json(&body).send().await?;
        parse_json(resp).await
    }

    pub async fn list_contributors(&self) -> Result<Vec<Contributor>, ClientError> {
        let resp = self.http.get(self.url("/v1/contributors")?).send().await?;
        parse_json(resp).await
    }

    pub async fn delete_contributor(&self, name: &str) -> Result<(), ClientError> {
        let url = self.url(&format!("/v1/contributors/{}", urlencoding::encode(name)))?;
        let resp = self.http.delete(url).send().await?;
        expect_ok(resp).await
    }

    pub async fn create_invite(&self) -> Result<Invite, ClientError> {
        let resp = self.http.post(self.url("/v1/invites")?).send().await?;
        parse_json(resp).await
    }

    /// Download one file as text.
    pub async fn get_file(&self, username: &str, path: &str) -> Result<String, ClientError> {
        let url = self.url(&format!("/v1/files/{}/{}", urlencoding::encode(username), encode_path(path)))?;
        let resp = self.http.get(url).send().await?;
        let resp = check_status(resp).await?;
        Ok(resp.text().await?)
    }

    /// Subscribe to the remote event stream with automatic reconnect.
    pub fn subscribe(&self) -> Result<Subscription, ClientError> {
        let url = self.url("/v1/events")?;
        Ok(Subscription::spawn(self.http.clone(), url))
    }
}

#[async_trait]
impl RemoteApi for ApiClient {
    async fn health(&self) -> bool {
        match self.url("/health") {
            Ok(url) => match self.http.get(url).send().await {
                Ok(resp) => resp.status().is_success(),
                Err(_) => false,
            },
            Err(_) => false,
        }
    }

    async fn me(&self) -> Result<Me, ClientError> {
        ApiClient::me(self).await
    }

    async fn list_files(&self, prefix: &str) -> Result<Vec<RemoteFile>, ClientError> {
        let mut url = self.url("/v1/files")?;
        url.query_pairs_mut().append_pair("prefix", prefix);
        let resp = self.http.get(url).send().await?;
        parse_json(resp).await
    }

    async fn put_file(
        &self,
        username: &str,
        path: &str,
        content: &[u8],
        origin: &Origin,
    ) -> Result<(), ClientError> {
        let url = self.url(&format!("/v1/files/{}/{}", urlencoding::encode(username), encode_path(path)))?;
        let mut req = self
            .http
            .put(url)
            .header(CONTENT_TYPE, "text/markdown")
            .body(content.to_vec());
        if let Some(ctime) = &origin.ctime {
            req = req.header("X-Origin-Ctime", ctime);
        }
        if let Some(mtime) = &origin.mtime {
            req = req.header("X-Origin-Mtime", mtime);
        }
        let resp = req.send().await?;
        expect_ok(resp).await
    }

    async fn delete_file(&self, username: &str, path: &str) -> Result<(), ClientError> {
        let url = self.url(&format!("/v1/files/{}/{}", urlencoding::encode(username), encode_path(path)))?;
        let resp = self.http.delete(url).send().await?;
        expect_ok(resp).await
    }
}

/// Error body shape the server uses for non-ok responses.
#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Map a non-success response to `ClientError::Api`, preferring the
/// `{error}` body message and falling back to the HTTP status text.
async fn check_status(resp: Response) -> Result<Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = match resp.text().await.ok().and_then(|body| {
        serde_json::from_str::<ErrorBody>(&body).ok()
    }) {
        Some(body) => body.error,
        None => status_text(status),
    };
    Err(ClientError::Api { status: status.as_u16(), message })
}

async fn parse_json<T: serde::de::DeserializeOwned>(resp: Response) -> Result<T, ClientError> {
    let resp = check_status(resp).await?;
    Ok(resp.json().await?)
}

async fn expect_ok(resp: Response) -> Result<(), ClientError> {
    check_status(resp).await.map(|_| ())
}

fn status_text(status: StatusCode) -> String {
    status.canonical_reason().unwrap_or("unknown error").to_string()
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
