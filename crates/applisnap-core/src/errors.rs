use thiserror::Error;

/// Result type alias using ExError
pub type Result<T> = std::result::Result<T, ExError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Each kind maps to a stable error code (printed to the operator and logged)
/// and to a process exit code category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExErrorKind {
    // Usage/configuration
    Config,

    // Snapshot directory
    Allocation,
    SnapshotNotFound,
    /// Snapshot still carries its `incomplete` marker
    SnapshotIncomplete,
    /// Another run holds the data directory lock
    AlreadyRunning,

    // Remote side
    /// Channel could not be established, or the appliance is unsupported
    Connectivity,
    /// A remote command exited nonzero
    RemoteCommand,
    /// Compaction did not stop within the cooldown bound
    QuiesceTimeout,
    /// A bounded wait (other than quiescing) ran out
    Timeout,

    // Data movement
    Transfer,
    RestoreComponent,
    UnknownStrategy,

    // Run control
    Cancelled,

    // Integration/IO
    Io,
    Serialization,

    // Internal
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::Config => "ERR_CONFIG",
            ExErrorKind::Allocation => "ERR_ALLOCATION",
            ExErrorKind::SnapshotNotFound => "ERR_SNAPSHOT_NOT_FOUND",
            ExErrorKind::SnapshotIncomplete => "ERR_SNAPSHOT_INCOMPLETE",
            ExErrorKind::AlreadyRunning => "ERR_ALREADY_RUNNING",
            ExErrorKind::Connectivity => "ERR_CONNECTIVITY",
            ExErrorKind::RemoteCommand => "ERR_REMOTE_COMMAND",
            ExErrorKind::QuiesceTimeout => "ERR_QUIESCE_TIMEOUT",
            ExErrorKind::Timeout => "ERR_TIMEOUT",
            ExErrorKind::Transfer => "ERR_TRANSFER",
            ExErrorKind::RestoreComponent => "ERR_RESTORE_COMPONENT",
            ExErrorKind::UnknownStrategy => "ERR_UNKNOWN_STRATEGY",
            ExErrorKind::Cancelled => "ERR_CANCELLED",
            ExErrorKind::Io => "ERR_IO",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }
}

/// Exit code for usage and configuration errors
pub const EXIT_USAGE: i32 = 1;
/// Exit code used when no remote status is available to propagate
pub const EXIT_FAILURE: i32 = 2;
/// Exit code for a quiescing timeout
pub const EXIT_QUIESCE_TIMEOUT: i32 = 7;
/// Exit code for an interrupted run
pub const EXIT_CANCELLED: i32 = 130;

/// Canonical structured error type
///
/// Carries classification fields for programmatic handling plus the phase
/// (`op`), dataset and snapshot context the operator needs to decide what to
/// re-run.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    component: Option<String>,
    snapshot_id: Option<String>,
    exit_status: Option<i32>,
    message: String,
    source: Option<Box<ExError>>,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            component: None,
            snapshot_id: None,
            exit_status: None,
            message: String::new(),
            source: None,
        }
    }

    /// Add operation (phase) context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add dataset context (repositories, mysql, ...)
    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    /// Add snapshot context
    pub fn with_snapshot_id(mut self, id: impl Into<String>) -> Self {
        self.snapshot_id = Some(id.into());
        self
    }

    /// Record the exit status of the failed remote or transfer command
    pub fn with_exit_status(mut self, status: i32) -> Self {
        self.exit_status = Some(status);
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add source error
    pub fn with_source(mut self, source: ExError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Get the error kind
    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Get the operation context, if any
    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    /// Get the dataset context, if any
    pub fn component(&self) -> Option<&str> {
        self.component.as_deref()
    }

    /// Get the snapshot context, if any
    pub fn snapshot_id(&self) -> Option<&str> {
        self.snapshot_id.as_deref()
    }

    /// Exit status of the failed command, falling back to the source chain
    pub fn exit_status(&self) -> Option<i32> {
        self.exit_status
            .or_else(|| self.source.as_ref().and_then(|s| s.exit_status()))
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the source error, if any
    pub fn source_error(&self) -> Option<&ExError> {
        self.source.as_deref()
    }

    /// Process exit code for this error
    ///
    /// Configuration errors exit 1 and quiescing timeouts exit 7. Anything
    /// else propagates the failed command's nonzero status, or 2 when there
    /// is none.
    pub fn exit_code(&self) -> i32 {
        match self.kind {
            ExErrorKind::Config => EXIT_USAGE,
            ExErrorKind::QuiesceTimeout => EXIT_QUIESCE_TIMEOUT,
            ExErrorKind::Cancelled => EXIT_CANCELLED,
            _ => match self.exit_status() {
                Some(status) if status != 0 => status,
                _ => EXIT_FAILURE,
            },
        }
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(component) = &self.component {
            write!(f, " (component: {})", component)?;
        }
        if let Some(snapshot_id) = &self.snapshot_id {
            write!(f, " (snapshot: {})", snapshot_id)?;
        }
        if let Some(status) = self.exit_status {
            write!(f, " (exit status: {})", status)?;
        }
        if let Some(source) = &self.source {
            write!(f, "; caused by {}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|s| s as &(dyn std::error::Error + 'static))
    }
}

// ========== End Error Facility ==========

/// Configuration failures, all reported before any remote contact
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("cannot read config file {path}: {reason}")]
    Read { path: String, reason: String },

    /// Config file is not valid TOML or has unknown keys
    #[error("invalid config file {path}: {reason}")]
    Parse { path: String, reason: String },

    /// Neither a HOST argument nor a configured hostname
    #[error("no appliance host given; pass HOST or set `hostname` in the config file")]
    MissingHost,

    /// Host descriptor does not parse as `[user@]host[:port]`
    #[error("invalid host descriptor '{descriptor}': {reason}")]
    InvalidHost { descriptor: String, reason: String },

    /// A setting is out of range
    #[error("invalid setting {key}: {reason}")]
    InvalidSetting { key: &'static str, reason: String },
}

impl From<ConfigError> for ExError {
    fn from(err: ConfigError) -> Self {
        ExError::new(ExErrorKind::Config)
            .with_op("config")
            .with_message(err.to_string())
    }
}

/// Create an IO error for the given operation
pub fn io_error(op: &str, err: std::io::Error) -> ExError {
    ExError::new(ExErrorKind::Io)
        .with_op(op.to_string())
        .with_message(err.to_string())
}

/// Create a cancellation error for the given operation
pub fn cancelled(op: &str) -> ExError {
    ExError::new(ExErrorKind::Cancelled)
        .with_op(op.to_string())
        .with_message("interrupted by operator")
}
