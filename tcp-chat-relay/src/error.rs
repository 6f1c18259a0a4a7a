use std::io;

use thiserror::Error;

use crate::connection::ConnectionId;

/// Invariant violations reported by [`ConnectionRegistry`](crate::registry::ConnectionRegistry).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    /// A connection with the same identifier is already registered.
    #[error("connection {0} is already registered")]
    DuplicateIdentifier(ConnectionId),
    /// The connection was removed earlier and cannot be registered again.
    #[error("connection {0} is closed")]
    ClosedConnection(ConnectionId),
}

/// A single write to one recipient failed.
///
/// Every variant leads to the same outcome: the recipient is dropped from the
/// registry. The classification only feeds the logs.
#[derive(Error, Debug)]
pub enum DeliveryFailure {
    /// The write did not complete within the configured limit.
    #[error("write timed out")]
    TimedOut,
    /// The peer went away (reset, aborted, broken pipe).
    #[error("connection reset: {0}")]
    Reset(#[source] io::Error),
    /// The connection was already closed when the write was attempted.
    #[error("connection already closed")]
    Closed,
    /// Any other I/O error.
    #[error("io error: {0}")]
    Io(#[source] io::Error),
}

impl From<io::Error> for DeliveryFailure {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof => DeliveryFailure::Reset(err),
            io::ErrorKind::TimedOut => DeliveryFailure::TimedOut,
            _ => DeliveryFailure::Io(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_resets_are_classified_as_reset() {
        for kind in [
            io::ErrorKind::ConnectionReset,
            io::ErrorKind::BrokenPipe,
            io::ErrorKind::ConnectionAborted,
        ] {
            let failure = DeliveryFailure::from(io::Error::from(kind));
            assert!(matches!(failure, DeliveryFailure::Reset(_)), "{kind:?}");
        }
    }

    #[test]
    fn io_timeouts_are_classified_as_timed_out() {
        let failure = DeliveryFailure::from(io::Error::from(io::ErrorKind::TimedOut));
        assert!(matches!(failure, DeliveryFailure::TimedOut));
    }

    #[test]
    fn other_errors_fall_through_to_io() {
        let failure = DeliveryFailure::from(io::Error::other("disk on fire"));
        assert!(matches!(failure, DeliveryFailure::Io(_)));
        assert_eq!(failure.to_string(), "io error: disk on fire");
    }

    #[test]
    fn duplicate_identifier_names_the_connection() {
        let err = RegistryError::DuplicateIdentifier(ConnectionId::new(7));
        assert_eq!(err.to_string(), "connection #7 is already registered");
    }
}
