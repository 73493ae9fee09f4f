use crate::connection::ConnectionError;
use crate::router::RouterError;
use thiserror::Error;

/// Errors that end a session.  None of them abort the listener; the
/// connection task logs and exits.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{0}")]
    Connection(#[from] ConnectionError),

    /// The `connect` command could not be understood, which leaves the
    /// dialogue unable to proceed
    #[error("connect command carried no usable command object or app name")]
    InvalidConnect,

    #[error("{0}")]
    Router(#[from] RouterError),

    /// A subscriber with the same remote address is already attached
    #[error("Subscriber {addr} is already attached to {stream_key}")]
    SubscriberRejected { stream_key: String, addr: String },
}
