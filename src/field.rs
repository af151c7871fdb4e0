//! Form field types

use crate::{Error, Result};
use bytes::Bytes;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Payload of a file-like field
pub enum Payload {
    /// Whole content held in memory
    Buffered(Bytes),

    /// Content read incrementally while the body is written
    Streaming(Box<dyn Read + Send>),
}

impl Payload {
    /// Whether the payload is read from a stream
    pub fn is_streaming(&self) -> bool {
        matches!(self, Payload::Streaming(_))
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Buffered(content) => f
                .debug_tuple("Buffered")
                .field(&format_args!("{} bytes", content.len()))
                .finish(),
            Payload::Streaming(_) => f.write_str("Streaming(..)"),
        }
    }
}

/// One named part of a multipart form
#[derive(Debug)]
pub enum Field {
    /// A plain form value
    Plain {
        /// Field name
        name: String,
        /// MIME type of the content
        mime_type: String,
        /// Content
        content: Bytes,
    },

    /// A file upload
    File {
        /// Field name
        name: String,
        /// MIME type of the content
        mime_type: String,
        /// Name reported in the `filename` parameter
        file_name: String,
        /// Content, buffered or streamed
        payload: Payload,
    },
}

impl Field {
    /// Create a plain field from bytes
    pub fn bytes(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        content: impl Into<Bytes>,
    ) -> Result<Self> {
        Ok(Self::Plain {
            name: required(name.into(), "field name must not be empty")?,
            mime_type: required(mime_type.into(), "mime type must not be empty")?,
            content: content.into(),
        })
    }

    /// Create a plain field from text, encoded as UTF-8
    pub fn text(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<Self> {
        Self::bytes(name, mime_type, Bytes::from(content.into()))
    }

    /// Create a file field from bytes held in memory
    pub fn file_bytes(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        file_name: impl Into<String>,
        content: impl Into<Bytes>,
    ) -> Result<Self> {
        Self::file(name, mime_type, file_name, Payload::Buffered(content.into()))
    }

    /// Create a file field streamed from a file on disk.
    ///
    /// The file is opened here, not when the request is sent, so a missing
    /// path is reported immediately.
    pub fn file_path(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        file_name: impl Into<String>,
        path: impl AsRef<Path>,
    ) -> Result<Self> {
        let (name, mime_type, file_name) = file_labels(name, mime_type, file_name)?;
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(Error::InvalidArgument("file path must not be empty"));
        }

        let file = File::open(path).map_err(|source| Error::FileNotFound {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(Self::File {
            name,
            mime_type,
            file_name,
            payload: Payload::Streaming(Box::new(file)),
        })
    }

    /// Create a file field streamed from any reader
    pub fn stream(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        file_name: impl Into<String>,
        reader: impl Read + Send + 'static,
    ) -> Result<Self> {
        Self::file(
            name,
            mime_type,
            file_name,
            Payload::Streaming(Box::new(reader)),
        )
    }

    fn file(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        file_name: impl Into<String>,
        payload: Payload,
    ) -> Result<Self> {
        let (name, mime_type, file_name) = file_labels(name, mime_type, file_name)?;
        Ok(Self::File {
            name,
            mime_type,
            file_name,
            payload,
        })
    }

    /// Field name
    pub fn name(&self) -> &str {
        match self {
            Field::Plain { name, .. } | Field::File { name, .. } => name,
        }
    }

    /// MIME type of the content
    pub fn mime_type(&self) -> &str {
        match self {
            Field::Plain { mime_type, .. } | Field::File { mime_type, .. } => mime_type,
        }
    }

    /// File name, for file fields
    pub fn file_name(&self) -> Option<&str> {
        match self {
            Field::Plain { .. } => None,
            Field::File { file_name, .. } => Some(file_name.as_str()),
        }
    }

    /// Whether the content is read from a stream when the body is written
    pub fn is_streaming(&self) -> bool {
        match self {
            Field::Plain { .. } => false,
            Field::File { payload, .. } => payload.is_streaming(),
        }
    }
}

fn file_labels(
    name: impl Into<String>,
    mime_type: impl Into<String>,
    file_name: impl Into<String>,
) -> Result<(String, String, String)> {
    Ok((
        required(name.into(), "field name must not be empty")?,
        required(mime_type.into(), "mime type must not be empty")?,
        required(file_name.into(), "file name must not be empty")?,
    ))
}

fn required(value: String, message: &'static str) -> Result<String> {
    if value.is_empty() {
        Err(Error::InvalidArgument(message))
    } else {
        Ok(value)
    }
}
