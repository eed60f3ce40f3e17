use std::collections::{BTreeMap, HashSet};

use hyper::{Request, header};
use serde::{Deserialize, Serialize};

use super::request_host;
use crate::tls::qualify::match_wildcard;

const PROTOCOLS: [&str; 3] = ["http", "https", "grpc"];

/// A single request matcher. Matchers in a [`MatcherSet`] must all match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Matcher {
    /// Matches the request host against a list of names; a name may contain a single
    /// wildcard label, e.g. `*.example.com`
    Host(Vec<String>),

    /// Matches the request protocol: `http`, `https` or `grpc`
    Protocol(String),

    /// Matches the request path against a list of patterns
    Path(Vec<String>),

    /// Matches request header values
    Header(BTreeMap<String, Vec<String>>),
}

/// A list of matchers that are AND-ed together
pub type MatcherSet = Vec<Matcher>;

impl Matcher {
    /// Creates a host matcher
    pub fn host<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Matcher::Host(hosts.into_iter().map(Into::into).collect())
    }

    /// Creates a protocol matcher
    pub fn protocol(protocol: impl Into<String>) -> Self {
        Matcher::Protocol(protocol.into())
    }

    /// The host names this matcher restricts requests to, if it is a host matcher.
    ///
    /// This is the only view of a matcher automatic HTTPS needs.
    pub fn literal_hosts(&self) -> Option<&[String]> {
        match self {
            Matcher::Host(hosts) => Some(hosts),
            _ => None,
        }
    }

    /// Whether `req` satisfies this matcher; `secure` tells whether it arrived over TLS
    pub fn matches<B>(&self, req: &Request<B>, secure: bool) -> bool {
        match self {
            Matcher::Host(hosts) => {
                let host = request_host(req);
                hosts.iter().any(|pattern| match_wildcard(host, pattern))
            }
            Matcher::Protocol(protocol) => match protocol.to_lowercase().as_str() {
                "http" => !secure,
                "https" => secure,
                "grpc" => req
                    .headers()
                    .get(header::CONTENT_TYPE)
                    .and_then(|value| value.to_str().ok())
                    .is_some_and(|value| value.starts_with("application/grpc")),
                _ => false,
            },
            Matcher::Path(patterns) => {
                let path = req.uri().path();
                patterns.iter().any(|pattern| path_matches(path, pattern))
            }
            Matcher::Header(headers) => headers.iter().all(|(name, values)| {
                req.headers()
                    .get_all(name.as_str())
                    .iter()
                    .filter_map(|value| value.to_str().ok())
                    .any(|value| values.iter().any(|expected| expected == value))
            }),
        }
    }

    /// Checks the matcher is well formed
    pub fn provision(&self) -> Result<(), String> {
        match self {
            Matcher::Host(hosts) => {
                let mut seen = HashSet::with_capacity(hosts.len());
                for (idx, host) in hosts.iter().enumerate() {
                    if host.trim().is_empty() {
                        return Err(format!("host at index {idx} is empty"));
                    }
                    if !seen.insert(host.to_lowercase()) {
                        return Err(format!("host at index {idx} is repeated: {host}"));
                    }
                }
                Ok(())
            }
            Matcher::Protocol(protocol) => {
                if PROTOCOLS.contains(&protocol.to_lowercase().as_str()) {
                    Ok(())
                } else {
                    Err(format!("unknown protocol '{protocol}'"))
                }
            }
            Matcher::Path(paths) => match paths.iter().find(|path| path.is_empty()) {
                Some(_) => Err("path patterns cannot be empty".to_string()),
                None => Ok(()),
            },
            Matcher::Header(headers) => match headers.keys().find(|name| name.trim().is_empty()) {
                Some(_) => Err("header names cannot be empty".to_string()),
                None => Ok(()),
            },
        }
    }
}

/// Matches a path against an exact pattern or one with a leading or trailing `*`
fn path_matches(path: &str, pattern: &str) -> bool {
    if let Some(prefix) = pattern.strip_suffix('*') {
        return path.starts_with(prefix);
    }
    if let Some(suffix) = pattern.strip_prefix('*') {
        return path.ends_with(suffix);
    }
    path == pattern
}
