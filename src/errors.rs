use crate::protocol;
use std::{error, fmt, io, path::PathBuf};

/// Fatal startup failures.
///
/// Every variant prevents the server from starting; none of them can occur
/// once the listening socket is accepting connections.
#[derive(Debug)]
pub enum StartupError {
    /// Invalid, missing, or contradictory configuration.
    Config(String),

    /// The data file could not be opened or read while preparing the
    /// membership source.
    DataFile { path: PathBuf, source: io::Error },

    /// The listening socket could not be created, bound, or registered.
    Bind { addr: String, source: io::Error },

    /// TLS certificate or key material could not be loaded or was rejected.
    Tls(String),
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(reason) => write!(f, "invalid configuration: {reason}"),
            Self::DataFile { path, source } => {
                write!(f, "cannot read data file {}: {source}", path.display())
            }
            Self::Bind { addr, source } => write!(f, "cannot bind {addr}: {source}"),
            Self::Tls(reason) => write!(f, "invalid TLS material: {reason}"),
        }
    }
}

impl error::Error for StartupError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::DataFile { source, .. } | Self::Bind { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Per-request failures.
///
/// All of these are recovered locally: the connection is terminated and the
/// server keeps running. Only [`RequestError::response`] decides whether the
/// client is owed a final line before the close.
#[derive(Debug, PartialEq)]
pub(crate) enum RequestError {
    /// The client exceeded its per-IP request budget.
    RateLimited,

    /// The query grew past `max_query_bytes` before a newline arrived.
    Oversize,

    /// The read or write deadline expired.
    Timeout,

    /// The peer closed the connection before a full request arrived.
    Closed,

    /// Transient socket or data-file failure.
    Io(IoError),
}

impl RequestError {
    /// Wire response owed to the client, if any.
    ///
    /// Timeouts and peer closes get no response; the socket is simply
    /// closed. Oversize queries get `ERROR` before the close.
    pub(crate) const fn response(&self) -> Option<&'static [u8]> {
        match self {
            Self::RateLimited => Some(protocol::RATE_LIMIT_EXCEEDED),
            Self::Oversize | Self::Io(_) => Some(protocol::ERROR),
            Self::Timeout | Self::Closed => None,
        }
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<io::Error> for RequestError {
    fn from(err: io::Error) -> Self {
        RequestError::Io(IoError(err))
    }
}

#[derive(Debug)]
pub(crate) struct IoError(pub(crate) io::Error);

impl PartialEq for IoError {
    fn eq(&self, other: &Self) -> bool {
        self.0.kind() == other.0.kind()
    }
}
