use std::{io, time::Duration};

use thiserror::Error;

/// Why a connection left the `Active` state or never reached it.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("access denied for user '{username}': invalid token")]
    PermissionDenied { username: String },

    #[error("connection closed before credentials were sent")]
    ClosedBeforeAuth,

    #[error("no message received for {0:?}")]
    IdleTimeout(Duration),

    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
}

impl SessionError {
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, SessionError::PermissionDenied { .. })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("at least one access token must be configured")]
    NoTokens,

    #[error("outbound queue capacity must be greater than zero")]
    ZeroQueueCapacity,
}
