use std::time::Duration;
use bytes::Bytes;
use reqwest::{
    Method, RequestBuilder,
    header::{self, HeaderMap},
    multipart::Form,
};
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    config::Config,
    error::{self, AppError, Result},
    middleware_layer::auth::{self as auth_layer, ExpiryCheck, OnExpired},
    services::session::SessionController,
};

/// A binary response body with the metadata needed to save it.
#[derive(Debug, Clone)]
pub struct BinaryResponse {
    pub bytes: Bytes,
    /// The file name from `Content-Disposition`, if the server sent one.
    pub file_name: Option<String>,
    pub content_type: Option<String>,
}

/// The single HTTP client every component talks to the vault through.
///
/// Each request reads the access token fresh from the session, so a token
/// replaced mid-session is picked up by the very next call. Every call is
/// bounded by the configured timeout.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    session: SessionController,
    timeout: Duration,
    expiry: ExpiryCheck,
}

impl ApiClient {
    /// Creates a new `ApiClient`.
    ///
    /// # Arguments
    ///
    /// * `http` - The underlying HTTP client.
    /// * `config` - The client configuration.
    /// * `session` - The session controller that owns the token store.
    pub fn new(http: reqwest::Client, config: &Config, session: SessionController) -> Self {
        Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            session,
            timeout: config.request_timeout,
            expiry: ExpiryCheck {
                enabled: config.expiry_precheck,
                grace_secs: config.expiry_grace_secs,
            },
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &SessionController {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Sends one request and returns the headers and body of a 2xx response.
    async fn execute<F>(
        &self,
        method: Method,
        path: &str,
        on_expired: OnExpired,
        build: F,
    ) -> Result<(HeaderMap, Bytes)>
    where
        F: FnOnce(RequestBuilder) -> RequestBuilder,
    {
        let presented = auth_layer::authorize(&self.session, self.expiry, on_expired)?;
        let presented = presented.as_deref().map(String::as_str);

        tracing::debug!("➡️ {} {}", method, path);

        let builder = auth_layer::attach(self.http.request(method.clone(), self.url(path)), presented);
        let request = build(builder);

        let exchange = async {
            let response = request.send().await?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await?;
            Ok::<_, AppError>((status, headers, body))
        };

        let (status, headers, body) = match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!("⏱️ {} {} timed out after {:?}", method, path, self.timeout);
                return Err(AppError::Timeout);
            }
        };

        tracing::debug!("⬅️ {} {} -> {}", method, path, status);

        auth_layer::inspect(&self.session, status, presented, &body)?;

        if !status.is_success() {
            return Err(error::from_status(status.as_u16(), &body));
        }

        Ok((headers, body))
    }

    /// Sends a request and decodes a JSON response.
    async fn execute_json<T, F>(
        &self,
        method: Method,
        path: &str,
        on_expired: OnExpired,
        build: F,
    ) -> Result<T>
    where
        T: DeserializeOwned,
        F: FnOnce(RequestBuilder) -> RequestBuilder,
    {
        let (_, body) = self.execute(method, path, on_expired, build).await?;
        sonic_rs::from_slice(&body).map_err(|e| {
            tracing::error!("❌ Undecodable response body from {}: {}", path, e);
            AppError::from(e)
        })
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.execute_json(Method::GET, path, OnExpired::Reject, |builder| builder)
            .await
    }

    pub async fn get_json_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        self.execute_json(Method::GET, path, OnExpired::Reject, |builder| builder.query(query))
            .await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        self.post_encoded(path, body, OnExpired::Reject).await
    }

    /// Posts credentials to a login or registration endpoint.
    ///
    /// Unlike [`post_json`](Self::post_json), an expiring stored token does
    /// not stop the request: the old session is ended and the credentials
    /// are sent without a bearer.
    pub async fn post_credentials<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        self.post_encoded(path, body, OnExpired::SendAnonymous).await
    }

    async fn post_encoded<B, T>(&self, path: &str, body: &B, on_expired: OnExpired) -> Result<T>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        let encoded = sonic_rs::to_vec(body)?;
        self.execute_json(Method::POST, path, on_expired, move |builder| {
            builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(encoded)
        })
        .await
    }

    pub async fn post_multipart<T: DeserializeOwned>(&self, path: &str, form: Form) -> Result<T> {
        self.execute_json(Method::POST, path, OnExpired::Reject, move |builder| {
            builder.multipart(form)
        })
            .await
    }

    pub async fn delete_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.execute_json(Method::DELETE, path, OnExpired::Reject, |builder| builder)
            .await
    }

    pub async fn get_binary(&self, path: &str) -> Result<BinaryResponse> {
        let (headers, bytes) = self
            .execute(Method::GET, path, OnExpired::Reject, |builder| builder)
            .await?;
        Ok(binary_response(&headers, bytes))
    }

    pub async fn post_multipart_binary(&self, path: &str, form: Form) -> Result<BinaryResponse> {
        let (headers, bytes) = self
            .execute(Method::POST, path, OnExpired::Reject, move |builder| {
                builder.multipart(form)
            })
            .await?;
        Ok(binary_response(&headers, bytes))
    }
}

fn binary_response(headers: &HeaderMap, bytes: Bytes) -> BinaryResponse {
    let header_str = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };

    BinaryResponse {
        file_name: header_str(header::CONTENT_DISPOSITION)
            .as_deref()
            .and_then(disposition_file_name),
        content_type: header_str(header::CONTENT_TYPE),
        bytes,
    }
}

/// Extracts the file name from a `Content-Disposition` value.
///
/// `filename*=UTF-8''...` wins over a plain `filename=`.
pub(crate) fn disposition_file_name(value: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;

    for param in value.split(';').map(str::trim) {
        let Some((key, raw)) = param.split_once('=') else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                let encoded = raw.trim().trim_matches('"');
                let encoded = encoded
                    .split_once("''")
                    .map(|(_, rest)| rest)
                    .unwrap_or(encoded);
                extended = urlencoding::decode(encoded).ok().map(|name| name.into_owned());
            }
            "filename" => {
                plain = Some(raw.trim().trim_matches('"').to_string());
            }
            _ => {}
        }
    }

    extended.or(plain).filter(|name| !name.trim().is_empty())
}
