use std::fmt;
use std::io;


/// The error type shared by every fallible operation in this crate.
///
/// Mutations validate their preconditions before touching the tree, so any
/// error leaves the instance exactly as it was before the call.
#[derive(Debug)]
pub enum Error {
    /// The caller violated a precondition: a name too long for the selected
    /// interchange level, a path into a namespace that was not enabled, a
    /// duplicate name, an attempt to remove a root directory, and so on.
    InvalidInput(String),
    /// A parsed image violates a structural rule this crate cannot
    /// reconcile: a bad standard identifier, a failed tag CRC, a path table
    /// that disagrees with the directory tree it indexes.
    InvalidIso(String),
    /// An invariant that should hold by construction failed. This indicates
    /// a bug in this crate, not in the caller.
    Internal(String),
    /// The backing stream or the sink reported a failure.
    Io(io::Error),
}
impl Error {
    pub(crate) fn invalid_input<S: Into<String>>(description: S) -> Self {
        Self::InvalidInput(description.into())
    }

    pub(crate) fn invalid_iso<S: Into<String>>(description: S) -> Self {
        Self::InvalidIso(description.into())
    }

    pub(crate) fn internal<S: Into<String>>(description: S) -> Self {
        Self::Internal(description.into())
    }
}
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput(description)
                => write!(f, "invalid input: {}", description),
            Self::InvalidIso(description)
                => write!(f, "invalid ISO: {}", description),
            Self::Internal(description)
                => write!(f, "internal inconsistency: {}", description),
            Self::Io(e)
                => write!(f, "I/O error: {}", e),
        }
    }
}
impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidInput(_) => None,
            Self::InvalidIso(_) => None,
            Self::Internal(_) => None,
            Self::Io(e) => Some(e),
        }
    }
}
impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self { Self::Io(value) }
}

pub type Result<T> = std::result::Result<T, Error>;
