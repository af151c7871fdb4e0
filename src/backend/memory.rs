//! In-memory backend that records requests and replays a canned response
//!
//! Useful for checking exactly what would go over the wire without a server.

use crate::backend::types::RequestHead;
use crate::backend::{Connection, Connector};
use crate::config::Config;
use bytes::Bytes;
use std::io::{self, Cursor, ErrorKind, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use url::Url;

/// Step at which a [`MemoryConnector`] should fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    /// Opening the connection
    Connect,
    /// Opening the body stream
    OpenOutput,
    /// Any write to the body stream
    Write,
    /// Opening the response stream
    OpenInput,
    /// The peer refuses the request after the body stream was opened, so
    /// writes hit a closed pipe and the response reports the refusal
    Refused,
}

#[derive(Debug, Default)]
struct Recorded {
    head: Option<RequestHead>,
    body: Vec<u8>,
    connects: usize,
    aborts: usize,
}

/// Connector whose connections write into a shared buffer.
///
/// Clones share the recording, so keep one clone to inspect the exchange
/// after the request has consumed the other.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    response: Bytes,
    fail_at: Option<FailAt>,
    recorded: Arc<Mutex<Recorded>>,
}

impl MemoryConnector {
    /// Create a connector that answers every request with `response`
    pub fn new(response: impl Into<Bytes>) -> Self {
        Self {
            response: response.into(),
            ..Self::default()
        }
    }

    /// Make the exchange fail at `step`
    pub fn fail_at(mut self, step: FailAt) -> Self {
        self.fail_at = Some(step);
        self
    }

    /// Head of the last request
    pub fn head(&self) -> Option<RequestHead> {
        self.lock().head.clone()
    }

    /// Body bytes written by the last request
    pub fn body(&self) -> Vec<u8> {
        self.lock().body.clone()
    }

    /// Number of connections opened
    pub fn connects(&self) -> usize {
        self.lock().connects
    }

    /// Number of exchanges torn down with [`Connection::abort`]
    pub fn aborts(&self) -> usize {
        self.lock().aborts
    }

    fn lock(&self) -> MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self, step: FailAt) -> io::Result<()> {
        if self.fail_at == Some(step) {
            Err(io::Error::new(
                failure_kind(step),
                format!("simulated failure at {:?}", step),
            ))
        } else {
            Ok(())
        }
    }
}

impl Connector for MemoryConnector {
    type Connection = MemoryConnection;

    fn connect(&self, _url: &Url, _config: &Config) -> io::Result<MemoryConnection> {
        self.check(FailAt::Connect)?;
        self.lock().connects += 1;
        Ok(MemoryConnection {
            connector: self.clone(),
        })
    }
}

/// Connection produced by [`MemoryConnector`]
#[derive(Debug)]
pub struct MemoryConnection {
    connector: MemoryConnector,
}

impl Connection for MemoryConnection {
    fn open_output(&mut self, head: RequestHead) -> io::Result<Box<dyn Write + Send>> {
        self.connector.check(FailAt::OpenOutput)?;

        let mut recorded = self.connector.lock();
        recorded.head = Some(head);
        recorded.body.clear();

        Ok(Box::new(MemoryWriter {
            connector: self.connector.clone(),
        }))
    }

    fn open_input(&mut self) -> io::Result<Box<dyn Read + Send>> {
        self.connector.check(FailAt::OpenInput)?;
        self.connector.check(FailAt::Refused)?;
        Ok(Box::new(Cursor::new(self.connector.response.clone())))
    }

    fn abort(&mut self) {
        self.connector.lock().aborts += 1;
    }
}

struct MemoryWriter {
    connector: MemoryConnector,
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.connector.check(FailAt::Write)?;
        if self.connector.fail_at == Some(FailAt::Refused) {
            return Err(io::Error::new(ErrorKind::BrokenPipe, "connection closed"));
        }
        self.connector.lock().body.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn failure_kind(step: FailAt) -> ErrorKind {
    match step {
        FailAt::Connect => ErrorKind::ConnectionRefused,
        FailAt::OpenOutput | FailAt::Write => ErrorKind::BrokenPipe,
        FailAt::OpenInput => ErrorKind::UnexpectedEof,
        FailAt::Refused => ErrorKind::ConnectionRefused,
    }
}
