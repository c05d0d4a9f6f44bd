//! Error types for relationship resolution and persistence.

use std::fmt;

/// The primary error type for all fedorm operations.
#[derive(Debug)]
pub enum Error {
    /// An association definition is missing or contradictory.
    AssociationConfig(AssociationConfigError),
    /// A join-table row references a target row that does not exist.
    JoinIntegrity(JoinIntegrityError),
    /// A backing-store call failed.
    Adapter(AdapterError),
    /// A change tracker was handed a key or payload it cannot accept.
    InvalidChange(InvalidChangeRequestError),
    /// Type conversion errors
    Type(TypeError),
    /// Configuration errors
    Config(ConfigError),
    /// Serialization/deserialization errors
    Serde(String),
    /// Custom error with message
    Custom(String),
}

/// Raised while building descriptors, grouping rows or planning a query.
#[derive(Debug, Clone)]
pub struct AssociationConfigError {
    /// Association property name, when known.
    pub association: Option<String>,
    pub message: String,
}

impl AssociationConfigError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            association: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn for_association(mut self, name: impl Into<String>) -> Self {
        self.association = Some(name.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct JoinIntegrityError {
    pub association: String,
    pub join_resource: String,
    pub target_resource: String,
    /// Stringified target keys present in the join resource but absent from the target.
    pub missing_keys: Vec<String>,
}

#[derive(Debug)]
pub struct AdapterError {
    pub adapter: String,
    pub kind: AdapterErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterErrorKind {
    /// The store could not be reached
    Connection,
    /// The store rejected or failed the operation
    Query,
    /// The operation timed out
    Timeout,
    /// The operation was cancelled by the store or its caller
    Cancelled,
    /// Resource (table, collection, endpoint) not found
    ResourceNotFound,
    /// Constraint violation reported by the store
    Constraint,
    /// An insert reported no generated key where one was required
    MissingGeneratedKey,
    /// No adapter registered under the requested name
    NotRegistered,
    /// Anything else
    Other,
}

#[derive(Debug, Clone)]
pub struct InvalidChangeRequestError {
    pub kind: InvalidChangeKind,
    pub association: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidChangeKind {
    /// attach/detach/remove called without a usable primary key
    MissingKey,
    /// add called with a payload that already has a primary key
    UnexpectedKey,
    /// The tracker shape does not match the association cardinality
    CardinalityMismatch,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Shorthand for an [`AssociationConfigError`] without an association name.
    pub fn association_config(message: impl Into<String>) -> Self {
        Error::AssociationConfig(AssociationConfigError::new(message))
    }

    /// Shorthand for an [`InvalidChangeRequestError`] on `association`.
    pub fn invalid_change(
        kind: InvalidChangeKind,
        association: &str,
        message: impl Into<String>,
    ) -> Self {
        Error::InvalidChange(InvalidChangeRequestError {
            kind,
            association: Some(association.to_string()),
            message: message.into(),
        })
    }

    /// Is this an adapter failure the caller might reasonably retry?
    ///
    /// fedorm itself never retries.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Adapter(a) => matches!(
                a.kind,
                AdapterErrorKind::Timeout | AdapterErrorKind::Connection
            ),
            _ => false,
        }
    }

    /// Did this error originate in a backing store?
    pub fn is_adapter_error(&self) -> bool {
        matches!(self, Error::Adapter(_))
    }

    /// Name of the adapter that failed, if this is an adapter error.
    pub fn adapter(&self) -> Option<&str> {
        match self {
            Error::Adapter(a) => Some(&a.adapter),
            _ => None,
        }
    }
}

impl AdapterError {
    pub fn new(adapter: impl Into<String>, kind: AdapterErrorKind, message: impl Into<String>) -> Self {
        Self {
            adapter: adapter.into(),
            kind,
            message: message.into(),
            source: None,
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::AssociationConfig(e) => write!(f, "Association config error: {}", e),
            Error::JoinIntegrity(e) => write!(f, "Join integrity error: {}", e),
            Error::Adapter(e) => write!(f, "Adapter error: {}", e),
            Error::InvalidChange(e) => write!(f, "Invalid change request: {}", e),
            Error::Type(e) => write!(f, "Type error: {}", e),
            Error::Config(e) => write!(f, "Configuration error: {}", e),
            Error::Serde(msg) => write!(f, "Serialization error: {}", msg),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Adapter(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for AssociationConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.association {
            Some(name) => write!(f, "{} (association '{}')", self.message, name),
            None => write!(f, "{}", self.message),
        }
    }
}

impl fmt::Display for JoinIntegrityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "association '{}': join resource '{}' references {} key(s) missing from '{}': [{}]",
            self.association,
            self.join_resource,
            self.missing_keys.len(),
            self.target_resource,
            self.missing_keys.join(", ")
        )
    }
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.adapter, self.message)
    }
}

impl fmt::Display for InvalidChangeRequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.association {
            Some(name) => write!(f, "{} (association '{}')", self.message, name),
            None => write!(f, "{}", self.message),
        }
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for field '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<AssociationConfigError> for Error {
    fn from(err: AssociationConfigError) -> Self {
        Error::AssociationConfig(err)
    }
}

impl From<JoinIntegrityError> for Error {
    fn from(err: JoinIntegrityError) -> Self {
        Error::JoinIntegrity(err)
    }
}

impl From<AdapterError> for Error {
    fn from(err: AdapterError) -> Self {
        Error::Adapter(err)
    }
}

impl From<InvalidChangeRequestError> for Error {
    fn from(err: InvalidChangeRequestError) -> Self {
        Error::InvalidChange(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err.to_string())
    }
}

/// Result type alias for fedorm operations.
pub type Result<T> = std::result::Result<T, Error>;
