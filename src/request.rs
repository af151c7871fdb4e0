//! Multipart request builder and execution

use crate::backend::types::RequestHead;
use crate::backend::{Connection, Connector};
use crate::boundary::Boundary;
use crate::cancel::CancelHandle;
use crate::config::{Config, SendPolicy};
use crate::encode::MultipartWriter;
use crate::error::is_cancelled;
use crate::field::Field;
use crate::headers::HeaderTable;
use crate::{Error, Result, response};
use bytes::Bytes;
use http::header::{CONTENT_TYPE, HOST, HeaderMap, HeaderValue};
use http::Method;
use std::io::{self, Read, Write};
use std::path::Path;
use tokio::runtime::{Handle, RuntimeFlavor};
use url::Url;

/// A multipart/form-data POST request.
///
/// Fields are written in the order they were added, each delimited by a
/// boundary generated when the request is created. A request is sent once:
/// [`MultipartRequest::execute`] consumes it, along with any streams its
/// fields read from.
///
/// # Examples
///
/// ```rust,no_run
/// use formpost::MultipartRequest;
///
/// # fn main() -> formpost::Result<()> {
/// let mut request = MultipartRequest::new();
/// request
///     .add_text("title", "text/plain", "Holiday")?
///     .add_file("photo", "image/jpeg", "beach.jpg", "./beach.jpg")?;
/// request.set_header("Authorization", "Bearer token")?;
///
/// let text = request.execute("https://example.com/upload")?;
/// println!("{}", text);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MultipartRequest {
    boundary: Boundary,
    fields: Vec<Field>,
    headers: HeaderTable,
    config: Config,
    cancel: CancelHandle,
}

impl MultipartRequest {
    /// Create an empty request with the default configuration
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Create an empty request with `config`
    pub fn with_config(config: Config) -> Self {
        Self {
            boundary: Boundary::generate(),
            fields: Vec::new(),
            headers: HeaderTable::new(),
            config,
            cancel: CancelHandle::new(),
        }
    }

    /// Add a plain field holding raw bytes
    pub fn add_bytes(
        &mut self,
        name: impl Into<String>,
        mime_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Result<&mut Self> {
        Ok(self.add_field(Field::bytes(name, mime_type, data)?))
    }

    /// Add a plain field holding text, sent as UTF-8
    pub fn add_text(
        &mut self,
        name: impl Into<String>,
        mime_type: impl Into<String>,
        data: impl Into<String>,
    ) -> Result<&mut Self> {
        Ok(self.add_field(Field::text(name, mime_type, data)?))
    }

    /// Add a file field whose content is already in memory
    pub fn add_file_bytes(
        &mut self,
        name: impl Into<String>,
        mime_type: impl Into<String>,
        file_name: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Result<&mut Self> {
        Ok(self.add_field(Field::file_bytes(name, mime_type, file_name, data)?))
    }

    /// Add a file field streamed from disk.
    ///
    /// The file is opened now; a missing file fails with
    /// [`Error::FileNotFound`].
    pub fn add_file(
        &mut self,
        name: impl Into<String>,
        mime_type: impl Into<String>,
        file_name: impl Into<String>,
        path: impl AsRef<Path>,
    ) -> Result<&mut Self> {
        Ok(self.add_field(Field::file_path(name, mime_type, file_name, path)?))
    }

    /// Add a file field streamed from a reader while the body is sent
    pub fn add_stream(
        &mut self,
        name: impl Into<String>,
        mime_type: impl Into<String>,
        file_name: impl Into<String>,
        reader: impl Read + Send + 'static,
    ) -> Result<&mut Self> {
        Ok(self.add_field(Field::stream(name, mime_type, file_name, reader)?))
    }

    /// Append an already-built field.
    ///
    /// Validation happened when the [`Field`] was built, so this cannot fail.
    pub fn add_field(&mut self, field: Field) -> &mut Self {
        self.fields.push(field);
        self
    }

    /// Add or replace a header.
    ///
    /// `method`, `content-type`, `host` and `content-length` are derived from
    /// the request; attempts to set them are logged and ignored.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<&mut Self> {
        self.headers.set(name, value)?;
        Ok(self)
    }

    /// Remove a header; removing an absent header does nothing
    pub fn unset_header(&mut self, name: &str) -> Result<&mut Self> {
        self.headers.unset(name)?;
        Ok(self)
    }

    /// Boundary shared by every part of this request
    pub fn boundary(&self) -> &Boundary {
        &self.boundary
    }

    /// Value sent as the `Content-Type` header
    pub fn content_type(&self) -> String {
        self.boundary.content_type()
    }

    /// Fields in the order they will be sent
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// User-controlled headers
    pub fn headers(&self) -> &HeaderTable {
        &self.headers
    }

    /// Execution configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Handle that cancels this request from another thread
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Serialize the body into `out` without sending anything
    pub fn write_body<W: Write>(mut self, out: W) -> Result<W> {
        self.write_fields(out).map_err(|e| {
            if is_cancelled(&e) {
                Error::Cancelled
            } else {
                Error::Send(e)
            }
        })
    }

    /// Send the request with reqwest and return the response text.
    ///
    /// Blocks the calling thread until the response has been read. Inside a
    /// tokio runtime the blocking work is moved off the async worker, but
    /// [`MultipartRequest::send`] is the better fit for async code.
    #[cfg(feature = "backend-reqwest")]
    pub fn execute(self, url: &str) -> Result<String> {
        self.execute_with(&crate::backend::reqwest::ReqwestConnector::new(), url)
    }

    /// Send the request through `connector` and return the response text.
    ///
    /// Failures writing or closing the body are logged; with
    /// [`SendPolicy::Continue`] the response is still read and decides the
    /// result, with [`SendPolicy::Abort`] the exchange is torn down and the
    /// send error is returned.
    pub fn execute_with<C>(self, connector: &C, url: &str) -> Result<String>
    where
        C: Connector + Sync,
    {
        off_runtime(move || self.run(connector, url))
    }

    fn run<C: Connector>(mut self, connector: &C, url: &str) -> Result<String> {
        let url = parse_target(url)?;

        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        tracing::debug!(%url, fields = self.fields.len(), "Connecting");
        let mut connection = connector.connect(&url, &self.config).map_err(|e| {
            tracing::error!("Couldn't open connection: {}", e);
            Error::Connection {
                message: e.to_string(),
            }
        })?;

        let head = self.request_head(url)?;
        let output = connection.open_output(head).map_err(|e| {
            tracing::error!("Couldn't send data. Is the URL correct? {}", e);
            Error::Send(e)
        })?;

        tracing::debug!(boundary = %self.boundary, "Sending body");
        match self.write_fields(output) {
            Ok(_) => {}
            Err(e) if is_cancelled(&e) => {
                tracing::debug!("Request cancelled while sending");
                connection.abort();
                return Err(Error::Cancelled);
            }
            Err(e) => {
                tracing::error!("Couldn't write to HTTP stream: {}", e);
                if self.config.send_policy == SendPolicy::Abort {
                    // A closed pipe means the exchange already ended; report why
                    if e.kind() == io::ErrorKind::BrokenPipe {
                        if let Err(cause) = connection.open_input() {
                            tracing::error!("Request failed while sending: {}", cause);
                            return Err(Error::from_receive_io(cause));
                        }
                    }
                    connection.abort();
                    return Err(Error::Send(e));
                }
            }
        }

        if self.cancel.is_cancelled() {
            connection.abort();
            return Err(Error::Cancelled);
        }

        tracing::debug!("Receiving response");
        let input = connection.open_input().map_err(|e| {
            tracing::error!("Couldn't read server response: {}", e);
            Error::from_receive_io(e)
        })?;

        response::read_text(input, self.config.line_breaks).map_err(|e| {
            tracing::error!("Couldn't read server response: {}", e);
            Error::from_receive_io(e)
        })
    }

    /// Send the request with reqwest without blocking the async runtime.
    ///
    /// The blocking execution runs on `tokio::task::spawn_blocking`.
    #[cfg(feature = "backend-reqwest")]
    pub async fn send(self, url: impl Into<String>) -> Result<String> {
        self.send_with(crate::backend::reqwest::ReqwestConnector::new(), url)
            .await
    }

    /// Send the request through `connector` without blocking the async runtime
    pub async fn send_with<C>(self, connector: C, url: impl Into<String>) -> Result<String>
    where
        C: Connector + Send + 'static,
    {
        let url = url.into();
        tokio::task::spawn_blocking(move || self.run(&connector, &url))
            .await
            .map_err(|e| Error::Internal(format!("Request task failed: {}", e)))?
    }

    /// Write every field and the closing delimiter, then close `out`.
    ///
    /// `out` is dropped on every path, which ends the body.
    fn write_fields<W: Write>(&mut self, out: W) -> io::Result<W> {
        let mut writer = MultipartWriter::new(out, &self.boundary).with_cancel(&self.cancel);
        for field in &mut self.fields {
            writer.write_field(field)?;
        }
        writer.finish()
    }

    fn request_head(&self, url: Url) -> Result<RequestHead> {
        let mut headers = HeaderMap::new();

        if let Some(host) = host_header(&url) {
            let host = HeaderValue::from_str(&host)
                .map_err(|_| Error::InvalidUrl(format!("Invalid host: {}", host)))?;
            headers.insert(HOST, host);
        }

        let content_type = HeaderValue::from_str(&self.content_type())
            .map_err(|e| Error::Internal(format!("Invalid boundary: {}", e)))?;
        headers.insert(CONTENT_TYPE, content_type);

        // Applied last, so a table entry wins over the values above
        for (name, value) in self.headers.as_map() {
            headers.insert(name.clone(), value.clone());
        }

        Ok(RequestHead {
            method: Method::POST,
            url,
            headers,
        })
    }
}

impl Default for MultipartRequest {
    fn default() -> Self {
        Self::new()
    }
}

/// Run blocking exchange work where blocking is allowed.
///
/// Outside a runtime `f` runs in place. On a multi-thread runtime the worker
/// hands its tasks off with `block_in_place`. A current-thread runtime cannot
/// give up its only thread, so `f` runs on a scoped thread with no runtime
/// context.
fn off_runtime<R, F>(f: F) -> Result<R>
where
    F: FnOnce() -> Result<R> + Send,
    R: Send,
{
    match Handle::try_current() {
        Err(_) => f(),
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        Ok(_) => std::thread::scope(|scope| {
            scope
                .spawn(f)
                .join()
                .unwrap_or_else(|_| Err(Error::Internal("request thread panicked".into())))
        }),
    }
}

fn parse_target(url: &str) -> Result<Url> {
    if url.is_empty() {
        return Err(Error::InvalidArgument("url must not be empty"));
    }

    let parsed = Url::parse(url).map_err(|e| Error::InvalidUrl(format!("{}: {}", url, e)))?;
    if parsed.host_str().is_none() {
        return Err(Error::InvalidUrl(format!("{}: missing host", url)));
    }
    Ok(parsed)
}

fn host_header(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}
