//! Execution configuration

use std::time::Duration;

/// What to do when writing or closing the request body fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendPolicy {
    /// Log the failure and still try to read the server's response
    #[default]
    Continue,

    /// Return [`crate::Error::Send`] immediately
    Abort,
}

/// How the response body is turned into text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineBreaks {
    /// Read line by line and join the lines with nothing in between.
    ///
    /// `\r`, `\n` and `\r\n` all end a line, so every line break is lost.
    #[default]
    Discard,

    /// Keep the body exactly as received
    Preserve,
}

/// Configuration for executing a request
#[derive(Debug, Clone)]
pub struct Config {
    /// Timeout for establishing the connection
    pub connect_timeout: Option<Duration>,
    /// Timeout for the whole exchange
    pub timeout: Option<Duration>,
    /// Behaviour after a failed body write
    pub send_policy: SendPolicy,
    /// Response text decoding
    pub line_breaks: LineBreaks,
    /// Number of body chunks that may queue between the writer and the transport
    pub channel_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connect_timeout: None,
            timeout: None,
            send_policy: SendPolicy::default(),
            line_breaks: LineBreaks::default(),
            channel_capacity: 8,
        }
    }
}

impl Config {
    /// Create a configuration builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// Builder for [`Config`]
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a builder holding the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = Some(timeout);
        self
    }

    /// Set the overall request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    /// Set the policy for body write failures
    pub fn send_policy(mut self, policy: SendPolicy) -> Self {
        self.config.send_policy = policy;
        self
    }

    /// Set how line breaks in the response are handled
    pub fn line_breaks(mut self, line_breaks: LineBreaks) -> Self {
        self.config.line_breaks = line_breaks;
        self
    }

    /// Set the body channel capacity (at least one chunk)
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity.max(1);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Config {
        self.config
    }
}
