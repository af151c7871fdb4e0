//! Multipart boundary tokens

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use time::OffsetDateTime;

const FENCE: &str = "*****";

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Delimiter token shared by every part of one request body.
///
/// Tokens take the form `*****<epoch-millis>-<sequence>*****`. The sequence is
/// process-wide, so two requests built in the same millisecond still differ.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Boundary(String);

impl Boundary {
    /// Generate a fresh boundary
    pub fn generate() -> Self {
        let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
        let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        Self(format!("{FENCE}{millis}-{sequence}{FENCE}"))
    }

    /// The token without the leading dashes
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Line that opens each part: `--<boundary>\r\n`
    pub(crate) fn delimiter(&self) -> String {
        format!("--{}\r\n", self.0)
    }

    /// Line that ends the body: `--<boundary>--\r\n`
    pub(crate) fn close_delimiter(&self) -> String {
        format!("--{}--\r\n", self.0)
    }

    /// Value for the request's `Content-Type` header
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.0)
    }
}

impl fmt::Display for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
