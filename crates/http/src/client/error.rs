use crate::protocol::{ParseError, SendError};
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("no free connections available to host")]
    NoFreeConns,

    #[error("timeout while waiting for the response")]
    Timeout,

    #[error("server closed the connection before returning the first response byte")]
    ConnectionClosed,

    #[error("dial {addr} failed: {source}")]
    Dial { addr: String, source: io::Error },

    #[error("host client is closed")]
    Closed,

    #[error("proxy error: {reason}")]
    Proxy { reason: String },

    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("invalid response: {source}")]
    Parse {
        #[from]
        source: ParseError,
    },

    #[error("failed to send request: {source}")]
    Send {
        #[from]
        source: SendError,
    },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ClientError {
    pub fn dial<S: ToString>(addr: S, source: io::Error) -> Self {
        Self::Dial { addr: addr.to_string(), source }
    }

    pub fn proxy<S: ToString>(reason: S) -> Self {
        Self::Proxy { reason: reason.to_string() }
    }

    pub fn invalid_request<S: ToString>(reason: S) -> Self {
        Self::InvalidRequest { reason: reason.to_string() }
    }

    /// Timeouts of any stage, be it the wait for a connection, the write or the read.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Parse { source: ParseError::Timeout } | Self::Send { source: SendError::Timeout }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_are_recognized_through_wrappers() {
        assert!(ClientError::Timeout.is_timeout());
        assert!(ClientError::from(ParseError::Timeout).is_timeout());
        assert!(ClientError::from(SendError::Timeout).is_timeout());
        assert!(!ClientError::NoFreeConns.is_timeout());
    }

    #[test]
    fn dial_error_names_the_address() {
        let e = ClientError::dial("10.0.0.1:80", io::Error::from(io::ErrorKind::ConnectionRefused));
        assert!(e.to_string().starts_with("dial 10.0.0.1:80 failed"));
    }
}
