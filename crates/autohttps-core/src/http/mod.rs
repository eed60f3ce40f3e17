// Routing configuration: routes, matchers and handlers

pub mod handler;
pub mod matcher;

use hyper::{Request, header};
use serde::{Deserialize, Serialize};

pub use handler::{FileServer, Handler, StaticResponse};
pub use matcher::{Matcher, MatcherSet};

/// A route: any one of its matcher sets must match for its handlers to run.
///
/// A route with no matcher sets matches every request.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// The matcher sets, OR-ed together
    #[serde(default, rename = "match", skip_serializing_if = "Vec::is_empty")]
    pub matchers: Vec<MatcherSet>,

    /// The handlers, run in order
    #[serde(default, rename = "handle", skip_serializing_if = "Vec::is_empty")]
    pub handlers: Vec<Handler>,
}

impl Route {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a matcher set
    pub fn with_matcher_set(mut self, set: MatcherSet) -> Self {
        self.matchers.push(set);
        self
    }

    /// Adds a handler
    pub fn with_handler(mut self, handler: Handler) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Whether any matcher set matches `req`; `secure` tells whether it arrived over TLS
    pub fn matches<B>(&self, req: &Request<B>, secure: bool) -> bool {
        self.matchers.is_empty()
            || self
                .matchers
                .iter()
                .any(|set| set.iter().all(|matcher| matcher.matches(req, secure)))
    }

    /// The first static response this route would send, if any
    pub fn static_response(&self) -> Option<&StaticResponse> {
        self.handlers.iter().find_map(|handler| match handler {
            Handler::StaticResponse(response) => Some(response),
            _ => None,
        })
    }

    /// Checks every matcher; errors name the offending matcher set and matcher
    pub fn provision_matchers(&self) -> Result<(), String> {
        for (set_idx, set) in self.matchers.iter().enumerate() {
            for (matcher_idx, matcher) in set.iter().enumerate() {
                matcher
                    .provision()
                    .map_err(|e| format!("matcher set {set_idx}, matcher {matcher_idx}: {e}"))?;
            }
        }
        Ok(())
    }

    /// Iterates over every host matcher's names with their positions:
    /// `(matcher set, matcher, host, name)`
    pub fn host_patterns(&self) -> impl Iterator<Item = (usize, usize, usize, &str)> {
        self.matchers
            .iter()
            .enumerate()
            .flat_map(|(set_idx, set)| {
                set.iter().enumerate().flat_map(move |(matcher_idx, matcher)| {
                    matcher
                        .literal_hosts()
                        .unwrap_or_default()
                        .iter()
                        .enumerate()
                        .map(move |(host_idx, host)| {
                            (set_idx, matcher_idx, host_idx, host.as_str())
                        })
                })
            })
    }
}

/// The request host without its port, from the Host header or the request URI
pub(crate) fn request_host<B>(req: &Request<B>) -> &str {
    req.headers()
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| req.uri().host())
        .map(strip_port)
        .unwrap_or_default()
}

/// Removes the port from a `host[:port]` value, keeping IPv6 brackets intact
fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }

    match host.rsplit_once(':') {
        Some((name, _)) if !name.contains(':') => name,
        _ => host,
    }
}
