//! Transport abstraction for sending a request body and reading the response
//!
//! A [`Connector`] opens a [`Connection`] to a target. The connection hands
//! out a writable stream bound to the request body and, once that stream has
//! been closed, a readable stream over the response body.

pub mod memory;
pub mod types;

#[cfg(feature = "backend-reqwest")]
pub mod reqwest;

use crate::config::Config;
use std::io::{self, Read, Write};
use types::RequestHead;
use url::Url;

/// Opens connections to a target URL
pub trait Connector {
    /// Connection type produced by this connector
    type Connection: Connection;

    /// Open a connection to `url`
    fn connect(&self, url: &Url, config: &Config) -> io::Result<Self::Connection>;
}

/// One request/response exchange over an open connection
pub trait Connection {
    /// Start the request and return a stream for its body.
    ///
    /// The body ends when the returned stream is dropped.
    fn open_output(&mut self, head: RequestHead) -> io::Result<Box<dyn Write + Send>>;

    /// Return a stream over the response body.
    ///
    /// Called after the output stream has been dropped.
    fn open_input(&mut self) -> io::Result<Box<dyn Read + Send>>;

    /// Tear down the exchange without waiting for a response.
    ///
    /// A body that was cut short must not reach the peer as a complete
    /// request.
    fn abort(&mut self) {}
}
