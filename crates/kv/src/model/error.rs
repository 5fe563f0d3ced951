/// Error type for transaction creation and backend failures.
#[derive(thiserror::Error, Debug)]
pub enum KvError {
    /// Boxed error. Indicates an issue with the KV backend.
    #[error(transparent)]
    Inner(#[from] Box<dyn std::error::Error + Send + Sync + 'static>),

    /// Indicates that a write transaction is already in progress.
    #[error("a write transaction is already in progress")]
    WriteLocked,
}

impl KvError {
    /// Internal helper to create a `KvError::Inner` from any error.
    pub fn from_err<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        KvError::Inner(Box::new(err))
    }
}

/// Trait to convert backend-specific read errors into [`KvError`].
pub trait KvReadError: std::error::Error + Send + Sync + 'static {
    /// Convert the error into a [`KvError`].
    fn into_kv_error(self) -> KvError;
}

impl KvReadError for KvError {
    fn into_kv_error(self) -> KvError {
        self
    }
}

/// Result type for key-value operations.
pub type KvResult<T> = Result<T, KvError>;
