use std::time::Duration;

use crate::{auth::TokenSet, error::ConfigError};

pub const DEFAULT_TOKENS: [&str; 3] = ["token1", "token2", "token3"];
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Whether a sender receives its own messages back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum EchoPolicy {
    /// Every active session, including the sender, receives each message.
    #[default]
    All,
    /// The sender's own egress drops messages that originated from it.
    ExceptSender,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub tokens: TokenSet,
    /// Per-session outbound queue bound. A session whose queue is full is disconnected.
    pub queue_capacity: usize,
    /// Bounds every read from a client, including the credentials frame.
    pub idle_timeout: Option<Duration>,
    pub echo: EchoPolicy,
}

impl ServerConfig {
    pub fn new(tokens: TokenSet) -> Self {
        Self {
            tokens,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            idle_timeout: None,
            echo: EchoPolicy::default(),
        }
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_echo(mut self, echo: EchoPolicy) -> Self {
        self.echo = echo;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tokens.is_empty() {
            return Err(ConfigError::NoTokens);
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(TokenSet::new(DEFAULT_TOKENS))
    }
}
