use std::fmt;

/// Error types for the atomic executor's own plumbing
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error from SQLx
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// An operation was invoked without a `Querier`
    #[error("nil Querier")]
    NilQuerier,

    /// The `Querier` has no usable connection
    #[error("Invalid Querier")]
    InvalidQuerier,

    /// A `Querier` was built without a connection
    #[error("Need a connection to create Querier")]
    NeedsConnection,

    /// The backend cannot honour the requested transaction options
    #[error("Transaction options are not supported by {0}")]
    UnsupportedTxOptions(&'static str),

    /// The call scope was cancelled before or while a statement ran
    #[error("Operation cancelled")]
    Cancelled,

    /// The call scope's deadline passed before or while a statement ran
    #[error("Deadline exceeded")]
    DeadlineExceeded,

    /// A nested `atomic` call failed
    #[error(transparent)]
    Nested(Box<AtomicError<Error>>),
}

impl From<AtomicError<Error>> for Error {
    fn from(err: AtomicError<Error>) -> Self {
        Error::Nested(Box::new(err))
    }
}

/// Result type alias for querier operations
pub type Result<T> = std::result::Result<T, Error>;

/// Outcome of a failed [`atomic`](crate::atomic) call.
///
/// The two slots are independent: `err` holds whatever the unit of work
/// returned, `atomic` holds a failure of the executor itself (begin, savepoint
/// management, commit or rollback). Both are set when the work failed and the
/// subsequent rollback failed too.
#[derive(Debug)]
pub struct AtomicError<E> {
    /// Error returned by the unit of work
    pub err: Option<E>,
    /// Error raised by the executor while entering or leaving the level
    pub atomic: Option<Error>,
}

impl<E> AtomicError<E> {
    /// Creates an error carrying both slots.
    pub fn new(err: Option<E>, atomic: Option<Error>) -> Self {
        Self { err, atomic }
    }

    /// An error returned by the unit of work, with no executor failure.
    pub fn callback(err: E) -> Self {
        Self::new(Some(err), None)
    }

    /// An executor failure with no unit-of-work error.
    pub fn infra(atomic: Error) -> Self {
        Self::new(None, Some(atomic))
    }

    /// Returns `true` if the unit of work itself failed.
    pub fn is_callback(&self) -> bool {
        self.err.is_some()
    }

    /// Returns `true` if the executor failed.
    pub fn is_atomic(&self) -> bool {
        self.atomic.is_some()
    }

    /// Consumes the error, keeping only the unit-of-work slot.
    pub fn into_callback(self) -> Option<E> {
        self.err
    }
}

impl<E: fmt::Display> fmt::Display for AtomicError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.err {
            Some(err) => write!(f, "Err: {:?}", err.to_string())?,
            None => f.write_str("Err: <nil>")?,
        }
        match &self.atomic {
            Some(atomic) => write!(f, " Atomic: {:?}", atomic.to_string()),
            None => f.write_str(" Atomic: <nil>"),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for AtomicError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.atomic
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}
