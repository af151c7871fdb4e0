//! Reqwest backend for cross-platform HTTP support

use crate::backend::types::RequestHead;
use crate::backend::{Connection, Connector};
use crate::config::Config;
use crate::error::StatusError;
use bytes::Bytes;
use futures_util::stream;
use std::io::{self, BufWriter, Cursor, ErrorKind, Read, Write};
use std::sync::OnceLock;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use url::Url;

/// Buffer in front of the body channel, so part headers don't become
/// single-line chunks
const WRITE_BUFFER_SIZE: usize = 64 * 1024;

/// Connector that sends requests with reqwest.
///
/// The body is streamed: each write is passed through a bounded channel into
/// a request that is already in flight. Work runs on the ambient tokio runtime
/// when there is one, otherwise on a shared runtime created on first use.
///
/// Connections block the calling thread. [`crate::MultipartRequest`] moves
/// that work off async worker threads; driving a connection by hand from
/// async code needs `tokio::task::spawn_blocking`.
#[derive(Clone, Debug, Default)]
pub struct ReqwestConnector {
    _private: (),
}

impl ReqwestConnector {
    /// Create a new reqwest connector
    pub fn new() -> Self {
        Self::default()
    }
}

impl Connector for ReqwestConnector {
    type Connection = ReqwestConnection;

    fn connect(&self, url: &Url, config: &Config) -> io::Result<ReqwestConnection> {
        match url.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(io::Error::new(
                    ErrorKind::InvalidInput,
                    format!("Unsupported scheme: {}", scheme),
                ));
            }
        }

        let runtime = runtime_handle()?;
        let _guard = runtime.enter();

        let mut builder = reqwest::Client::builder().redirect(reqwest::redirect::Policy::none());

        if let Some(timeout) = config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }

        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder.build().map_err(|e| {
            io::Error::other(format!("Failed to create reqwest client: {}", e))
        })?;

        Ok(ReqwestConnection {
            client,
            runtime: runtime.clone(),
            capacity: config.channel_capacity.max(1),
            body: None,
            pending: None,
        })
    }
}

type BodySender = mpsc::Sender<io::Result<Bytes>>;

/// A request in flight on a reqwest client.
///
/// The connection holds its own sender on the body channel, so dropping the
/// output stream does not end the body. The body ends cleanly only in
/// [`Connection::open_input`]; [`Connection::abort`] ends it with an error,
/// which makes the transport drop the connection instead of completing the
/// request.
pub struct ReqwestConnection {
    client: reqwest::Client,
    runtime: Handle,
    capacity: usize,
    body: Option<BodySender>,
    pending: Option<JoinHandle<reqwest::Result<reqwest::Response>>>,
}

impl Connection for ReqwestConnection {
    fn open_output(&mut self, head: RequestHead) -> io::Result<Box<dyn Write + Send>> {
        if self.pending.is_some() {
            return Err(io::Error::other("request already started"));
        }

        let (tx, rx) = mpsc::channel::<io::Result<Bytes>>(self.capacity);
        let body = reqwest::Body::wrap_stream(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|chunk| (chunk, rx))
        }));

        let request = self
            .client
            .request(head.method, head.url)
            .headers(head.headers)
            .body(body);

        tracing::debug!("Starting reqwest request");
        self.pending = Some(self.runtime.spawn(request.send()));
        self.body = Some(tx.clone());

        Ok(Box::new(BufWriter::with_capacity(
            WRITE_BUFFER_SIZE,
            ChannelWriter { tx },
        )))
    }

    fn open_input(&mut self) -> io::Result<Box<dyn Read + Send>> {
        let pending = self
            .pending
            .take()
            .ok_or_else(|| io::Error::new(ErrorKind::NotConnected, "request was never started"))?;

        // Last sender gone, the body stream ends
        self.body = None;

        let body = self.runtime.block_on(async move {
            let response = pending
                .await
                .map_err(|e| io::Error::other(format!("Request task failed: {}", e)))?
                .map_err(to_io_error)?;

            let status = response.status();
            if status.is_client_error() || status.is_server_error() {
                return Err(io::Error::other(StatusError(status)));
            }

            response.bytes().await.map_err(to_io_error)
        })?;

        Ok(Box::new(Cursor::new(body)))
    }

    fn abort(&mut self) {
        if let Some(body) = self.body.take() {
            fail_body(&body);
        }

        if let Some(pending) = self.pending.take() {
            tracing::debug!("Aborting reqwest request");
            pending.abort();
        }
    }
}

impl Drop for ReqwestConnection {
    fn drop(&mut self) {
        self.abort();
    }
}

/// Feeds body bytes into the channel read by the in-flight request
struct ChannelWriter {
    tx: mpsc::Sender<io::Result<Bytes>>,
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        self.tx
            .blocking_send(Ok(Bytes::copy_from_slice(buf)))
            .map_err(|_| {
                io::Error::new(
                    ErrorKind::BrokenPipe,
                    "connection closed before the body was sent",
                )
            })?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Queue an error behind any body bytes still in the channel.
///
/// The transport fails the request when it reaches the error, so a partial
/// body is never followed by a clean end of message.
fn fail_body(body: &BodySender) {
    let error = || io::Error::new(ErrorKind::ConnectionAborted, "request body aborted");

    match body.try_send(Err(error())) {
        Ok(()) | Err(mpsc::error::TrySendError::Closed(_)) => {}
        Err(mpsc::error::TrySendError::Full(item)) => {
            // The receiver drains the queue or is dropped; either way this returns
            let _ = body.blocking_send(item);
        }
    }
}

fn to_io_error(error: reqwest::Error) -> io::Error {
    if error.is_timeout() {
        io::Error::new(ErrorKind::TimedOut, error)
    } else if error.is_connect() {
        io::Error::new(ErrorKind::NotConnected, error)
    } else {
        io::Error::other(error)
    }
}

fn runtime_handle() -> io::Result<Handle> {
    if let Ok(handle) = Handle::try_current() {
        return Ok(handle);
    }

    static SHARED: OnceLock<Runtime> = OnceLock::new();

    if let Some(runtime) = SHARED.get() {
        return Ok(runtime.handle().clone());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("formpost-io")
        .enable_all()
        .build()?;

    // Another thread may have won the race; its runtime is kept
    let _ = SHARED.set(runtime);

    SHARED
        .get()
        .map(|runtime| runtime.handle().clone())
        .ok_or_else(|| io::Error::other("shared runtime unavailable"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_unsupported_scheme() {
        let url = Url::parse("ftp://example.com/upload").unwrap();
        let err = ReqwestConnector::new()
            .connect(&url, &Config::default())
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_input_before_output() {
        let url = Url::parse("http://127.0.0.1:9/").unwrap();
        let mut connection = ReqwestConnector::new()
            .connect(&url, &Config::default())
            .unwrap();
        let err = connection.open_input().err().unwrap();
        assert_eq!(err.kind(), ErrorKind::NotConnected);
    }

    #[test]
    fn test_fail_body_queues_error_after_data() {
        let (tx, mut rx) = mpsc::channel::<io::Result<Bytes>>(1);
        tx.try_send(Ok(Bytes::from_static(b"part"))).unwrap();

        let reader = std::thread::spawn(move || {
            let mut items = Vec::new();
            while let Some(item) = rx.blocking_recv() {
                items.push(item);
            }
            items
        });

        fail_body(&tx);
        drop(tx);

        let items = reader.join().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(&items[0].as_ref().unwrap()[..], b"part");
        assert_eq!(
            items[1].as_ref().err().unwrap().kind(),
            ErrorKind::ConnectionAborted
        );
    }
}
