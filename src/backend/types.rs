//! Shared types between backend implementations

use http::{HeaderMap, Method};
use url::Url;

/// Everything a backend needs to start a request, minus the body
#[derive(Debug, Clone)]
pub struct RequestHead {
    /// HTTP method for the request
    pub method: Method,
    /// URL for the request
    pub url: Url,
    /// Headers in the order they were applied
    pub headers: HeaderMap,
}

impl RequestHead {
    /// Look up a header value, ignoring case
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}
