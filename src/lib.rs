//! Streaming multipart/form-data POST requests
//!
//! Build a [`MultipartRequest`] from text, byte, file and stream fields, then
//! send it with [`MultipartRequest::execute`] (blocking) or
//! [`MultipartRequest::send`] (async). The body is written straight into the
//! connection; file and stream fields are copied in chunks of at most
//! [`MAX_CHUNK_SIZE`] bytes and never held in memory whole.
//!
//! The transport is pluggable through [`Connector`]. The default backend uses
//! reqwest; [`backend::memory::MemoryConnector`] records the exchange instead.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]

pub use backend::types::RequestHead;
pub use backend::{Connection, Connector};
#[cfg(feature = "backend-reqwest")]
pub use backend::reqwest::ReqwestConnector;
pub use boundary::Boundary;
pub use cancel::CancelHandle;
pub use config::{Config, ConfigBuilder, LineBreaks, SendPolicy};
pub use encode::{MAX_CHUNK_SIZE, MultipartWriter};
pub use error::{Error, Result};
pub use field::{Field, Payload};
pub use headers::{DEFAULT_USER_AGENT, HeaderTable};
pub use request::MultipartRequest;
pub use response::read_text;

pub mod backend;
mod boundary;
mod cancel;
mod config;
mod encode;
mod error;
mod field;
mod headers;
mod request;
mod response;
