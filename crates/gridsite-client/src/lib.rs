//! HTTP access to the query dashboard backend.
//!
//! Every call carries the CSRF token header and the XHR marker the backend
//! expects from its own pages. Non-2xx answers are decoded into
//! [`ApiError::Validation`] when the body has per-field errors.

mod error;

pub use error::ApiError;

use async_trait::async_trait;
use gridsite_core::contracts::{
    paths, ErrorsPayload, QueryIdPayload, SubmitForm, TagsPayload, TemplateForm,
};
use gridsite_core::{HealthSnapshot, QueryId, QuerySnapshot, Template};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, COOKIE};
use reqwest::multipart::Form;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

pub const CSRF_HEADER: &str = "X-CSRFToken";
pub const XHR_HEADER: &str = "X-Requested-With";
pub const XHR_VALUE: &str = "XMLHttpRequest";

/// Backend operations the dashboard consumes.
#[async_trait]
pub trait QueryApi: Send + Sync {
    /// Raw dashboard page, used once at startup for hydration.
    async fn fetch_dashboard(&self) -> Result<String, ApiError>;
    async fn submit(&self, form: &SubmitForm) -> Result<QueryId, ApiError>;
    async fn status(&self, id: &QueryId) -> Result<QuerySnapshot, ApiError>;
    async fn delete(&self, id: &QueryId) -> Result<(), ApiError>;
    async fn rerun(&self, id: &QueryId) -> Result<QueryId, ApiError>;
    /// Returns the canonical tag set the backend stored.
    async fn save_tags(&self, id: &QueryId, tags: &[String]) -> Result<Vec<String>, ApiError>;
    async fn create_template(&self, form: &TemplateForm) -> Result<Template, ApiError>;
    async fn delete_template(&self, template_id: &str) -> Result<(), ApiError>;
    async fn health(&self) -> Result<HealthSnapshot, ApiError>;
    /// Absolute URL of the CSV export; it is opened, never parsed.
    fn export_url(&self, id: &QueryId) -> String;
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub csrf_token: Option<String>,
    pub session_cookie: Option<String>,
    pub health_url: Option<String>,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            csrf_token: None,
            session_cookie: None,
            health_url: None,
            timeout: Duration::from_secs(30),
        }
    }
}

pub struct HttpQueryApi {
    http: Client,
    base_url: String,
    health_url: String,
}

impl HttpQueryApi {
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        let health_url = config
            .health_url
            .filter(|url| !url.trim().is_empty())
            .map(|url| absolute_url(&base_url, &url))
            .unwrap_or_else(|| format!("{base_url}{}", paths::HEALTH));
        let http = Client::builder()
            .user_agent(concat!("gridsite-pulse/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .default_headers(default_headers(
                config.csrf_token.as_deref(),
                config.session_cookie.as_deref(),
            )?)
            .build()?;
        Ok(Self {
            http,
            base_url,
            health_url,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn get(&self, path: &str) -> RequestBuilder {
        debug!(event = "api_request", method = "GET", path);
        self.http.get(self.url(path))
    }

    fn post(&self, path: &str) -> RequestBuilder {
        debug!(event = "api_request", method = "POST", path);
        self.http.post(self.url(path))
    }
}

fn absolute_url(base_url: &str, url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("{base_url}/{}", url.trim_start_matches('/'))
    }
}

fn default_headers(
    csrf_token: Option<&str>,
    session_cookie: Option<&str>,
) -> Result<HeaderMap, ApiError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static("x-requested-with"),
        HeaderValue::from_static(XHR_VALUE),
    );
    let csrf_token = csrf_token.map(str::trim).filter(|token| !token.is_empty());
    if let Some(token) = csrf_token {
        headers.insert(
            HeaderName::from_static("x-csrftoken"),
            header_value(token, CSRF_HEADER)?,
        );
    }
    let mut cookies = Vec::new();
    if let Some(cookie) = session_cookie.map(str::trim).filter(|c| !c.is_empty()) {
        if cookie.contains('=') {
            cookies.push(cookie.to_string());
        } else {
            cookies.push(format!("sessionid={cookie}"));
        }
    }
    if let Some(token) = csrf_token {
        cookies.push(format!("csrftoken={token}"));
    }
    if !cookies.is_empty() {
        headers.insert(COOKIE, header_value(&cookies.join("; "), "Cookie")?);
    }
    Ok(headers)
}

fn header_value(value: &str, name: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(value)
        .map_err(|_| ApiError::Config(format!("{name} contains characters not allowed in a header")))
}

fn multipart(fields: Vec<(&'static str, String)>) -> Form {
    fields
        .into_iter()
        .fold(Form::new(), |form, (name, value)| form.text(name, value))
}

async fn read_body(response: Response) -> Result<String, ApiError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(error_from_body(status.as_u16(), &body));
    }
    Ok(body)
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let body = read_body(response).await?;
    serde_json::from_str(&body).map_err(|err| ApiError::Malformed(err.to_string()))
}

fn error_from_body(status: u16, body: &str) -> ApiError {
    match serde_json::from_str::<ErrorsPayload>(body) {
        Ok(ErrorsPayload {
            errors: Some(errors),
            ..
        }) if !errors.is_empty() => ApiError::Validation(errors),
        Ok(ErrorsPayload {
            error: Some(message),
            ..
        }) => ApiError::Status {
            status,
            message: Some(message),
        },
        _ => ApiError::Status {
            status,
            message: None,
        },
    }
}

#[async_trait]
impl QueryApi for HttpQueryApi {
    async fn fetch_dashboard(&self) -> Result<String, ApiError> {
        let response = self.get(paths::DASHBOARD).send().await?;
        read_body(response).await
    }

    async fn submit(&self, form: &SubmitForm) -> Result<QueryId, ApiError> {
        let response = self
            .post(paths::SUBMIT)
            .multipart(multipart(form.fields()))
            .send()
            .await?;
        let payload: QueryIdPayload = read_json(response).await?;
        Ok(payload.query_id)
    }

    async fn status(&self, id: &QueryId) -> Result<QuerySnapshot, ApiError> {
        let response = self.get(&paths::status(id)).send().await?;
        let snapshot: QuerySnapshot = read_json(response).await?;
        if &snapshot.id != id {
            return Err(ApiError::Malformed(format!(
                "status for {id} answered with id {}",
                snapshot.id
            )));
        }
        Ok(snapshot)
    }

    async fn delete(&self, id: &QueryId) -> Result<(), ApiError> {
        let response = self.post(&paths::delete(id)).send().await?;
        let _: serde_json::Value = read_json(response).await?;
        Ok(())
    }

    async fn rerun(&self, id: &QueryId) -> Result<QueryId, ApiError> {
        let response = self.post(&paths::rerun(id)).send().await?;
        let payload: QueryIdPayload = read_json(response).await?;
        Ok(payload.query_id)
    }

    async fn save_tags(&self, id: &QueryId, tags: &[String]) -> Result<Vec<String>, ApiError> {
        let response = self
            .post(&paths::tags(id))
            .form(&[("tags", tags.join(","))])
            .send()
            .await?;
        let payload: TagsPayload = read_json(response).await?;
        Ok(payload.tags)
    }

    async fn create_template(&self, form: &TemplateForm) -> Result<Template, ApiError> {
        let response = self
            .post(paths::TEMPLATE_CREATE)
            .multipart(multipart(form.fields()))
            .send()
            .await?;
        read_json(response).await
    }

    async fn delete_template(&self, template_id: &str) -> Result<(), ApiError> {
        let response = self
            .post(&paths::template_delete(template_id))
            .send()
            .await?;
        let _: serde_json::Value = read_json(response).await?;
        Ok(())
    }

    async fn health(&self) -> Result<HealthSnapshot, ApiError> {
        debug!(event = "api_request", method = "GET", url = %self.health_url);
        let response = self.http.get(&self.health_url).send().await?;
        read_json(response).await
    }

    fn export_url(&self, id: &QueryId) -> String {
        self.url(&paths::export(id))
    }
}
