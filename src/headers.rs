//! User-controlled request headers

use crate::{Error, Result};
use http::header::{self, HeaderMap, HeaderName, HeaderValue};

/// Names the caller may never set: they are derived from the request itself.
const FIXED_HEADERS: [&str; 4] = ["method", "content-type", "host", "content-length"];

/// Default `User-Agent` for requests built by this crate
pub const DEFAULT_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Case-insensitive header table with a guard against fixed headers.
///
/// Starts out with `Connection: Keep-Alive` and the crate's `User-Agent`.
#[derive(Debug, Clone)]
pub struct HeaderTable {
    headers: HeaderMap,
}

impl HeaderTable {
    /// Create a table holding the default headers
    pub fn new() -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("Keep-Alive"));
        headers.insert(
            header::USER_AGENT,
            HeaderValue::from_static(DEFAULT_USER_AGENT),
        );
        Self { headers }
    }

    /// Whether `name` is one of the fixed headers, ignoring case
    pub fn is_fixed(name: &str) -> bool {
        FIXED_HEADERS
            .iter()
            .any(|fixed| fixed.eq_ignore_ascii_case(name))
    }

    /// Add or replace a header.
    ///
    /// Setting a fixed header is not an error: it is logged and ignored.
    pub fn set(&mut self, name: &str, value: &str) -> Result<()> {
        let header_name = parse_name(name)?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|_| Error::InvalidArgument("header value contains invalid characters"))?;

        if Self::is_fixed(header_name.as_str()) {
            tracing::warn!("Cannot change \"{}\" header", name);
            return Ok(());
        }

        self.headers.insert(header_name, header_value);
        Ok(())
    }

    /// Remove a header; removing an absent header does nothing
    pub fn unset(&mut self, name: &str) -> Result<()> {
        let header_name = parse_name(name)?;
        self.headers.remove(header_name);
        Ok(())
    }

    /// Look up a header value, ignoring case
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Number of headers in the table
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Iterate over `(lower-case name, value)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
        self.headers.iter()
    }

    pub(crate) fn as_map(&self) -> &HeaderMap {
        &self.headers
    }
}

impl Default for HeaderTable {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_name(name: &str) -> Result<HeaderName> {
    if name.is_empty() {
        return Err(Error::InvalidArgument("header name must not be empty"));
    }
    // HeaderName folds to lower case on parse
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| Error::InvalidArgument("header name is not a valid HTTP token"))
}
