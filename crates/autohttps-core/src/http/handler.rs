// Route handlers

use std::collections::BTreeMap;

use http_body_util::Full;
use hyper::{Request, Response, StatusCode, body::Bytes, header};
use log::debug;
use serde::{Deserialize, Serialize};

use super::request_host;
use crate::{error::AutoHttpsError, placeholder::Replacer};

/// The handlers a route can run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "handler", rename_all = "snake_case")]
pub enum Handler {
    /// Responds with a fixed status, headers and body
    StaticResponse(StaticResponse),

    /// Serves files from a directory
    FileServer(FileServer),
}

/// A response assembled from configuration rather than from upstream content.
///
/// Header values and the body may use request placeholders: `{http.request.host}`,
/// `{http.request.uri}`, `{http.request.scheme}` and `{http.request.method}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticResponse {
    /// The status code (default: 200)
    #[serde(default = "StaticResponse::default_status_code")]
    pub status_code: u16,

    /// Response headers
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, Vec<String>>,

    /// Response body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    /// Whether to close the client connection after responding
    #[serde(default)]
    pub close: bool,
}

impl Default for StaticResponse {
    fn default() -> Self {
        Self {
            status_code: Self::default_status_code(),
            headers: BTreeMap::new(),
            body: None,
            close: false,
        }
    }
}

impl StaticResponse {
    pub fn default_status_code() -> u16 {
        StatusCode::OK.as_u16()
    }

    /// Builds a permanent redirect (308) to `location` that closes the connection
    pub fn permanent_redirect(location: impl Into<String>) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert(header::LOCATION.to_string(), vec![location.into()]);
        headers.insert(header::CONNECTION.to_string(), vec!["close".to_string()]);

        Self {
            status_code: StatusCode::PERMANENT_REDIRECT.as_u16(),
            headers,
            body: None,
            close: true,
        }
    }

    /// The first value of a header, compared case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .and_then(|(_, values)| values.first())
            .map(String::as_str)
    }

    /// Renders the response for `req`, expanding request placeholders
    pub fn render<B>(&self, req: &Request<B>) -> Result<Response<Full<Bytes>>, AutoHttpsError> {
        let replacer = request_replacer(req);

        let status = StatusCode::from_u16(self.status_code).map_err(|e| {
            AutoHttpsError::GenericError(format!("Invalid status code {}: {e}", self.status_code))
        })?;

        let mut builder = Response::builder().status(status);
        for (name, values) in &self.headers {
            for value in values {
                builder = builder.header(name.as_str(), replacer.replace_known(value));
            }
        }

        if self.close && self.header(header::CONNECTION.as_str()).is_none() {
            builder = builder.header(header::CONNECTION, "close");
        }

        let body = self
            .body
            .as_deref()
            .map(|body| replacer.replace_known(body))
            .unwrap_or_default();

        debug!("Rendering static response with status {status}");

        builder
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| AutoHttpsError::GenericError(format!("Failed to build response: {e}")))
    }
}

/// Serves static files from a root directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileServer {
    /// The root directory (default: ".")
    #[serde(default = "FileServer::default_root")]
    pub root: String,

    /// File names tried when a directory is requested
    #[serde(default = "FileServer::default_index_names")]
    pub index_names: Vec<String>,
}

impl Default for FileServer {
    fn default() -> Self {
        Self {
            root: Self::default_root(),
            index_names: Self::default_index_names(),
        }
    }
}

impl FileServer {
    pub fn default_root() -> String {
        ".".to_string()
    }

    pub fn default_index_names() -> Vec<String> {
        vec!["index.html".to_string(), "index.txt".to_string()]
    }
}

/// Builds a replacer holding the request placeholders
fn request_replacer<B>(req: &Request<B>) -> Replacer {
    let uri = req.uri();
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

    Replacer::new()
        .with("http.request.host", request_host(req))
        .with("http.request.uri", path_and_query)
        .with("http.request.scheme", uri.scheme_str().unwrap_or("http"))
        .with("http.request.method", req.method().as_str())
}
