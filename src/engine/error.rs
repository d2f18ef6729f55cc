use ulid::Ulid;

#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Malformed input, rejected before any mutation.
    Validation(String),
    NotFound(Ulid),
    AlreadyExists(Ulid),
    CapacityExceeded {
        person_id: Ulid,
        requested: u8,
        available: i64,
    },
    /// Stored version differs from the one the caller read.
    Conflict {
        id: Ulid,
        expected: u64,
        actual: u64,
    },
    ProjectInUse(Ulid),
    LimitExceeded(&'static str),
    WalError(String),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        EngineError::Validation(msg.into())
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(msg) => write!(f, "validation failed: {msg}"),
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::CapacityExceeded {
                person_id,
                requested,
                available,
            } => write!(
                f,
                "capacity exceeded for {person_id}: available {available}%, requested {requested}%"
            ),
            EngineError::Conflict {
                id,
                expected,
                actual,
            } => write!(
                f,
                "conflicting write on {id}: expected version {expected}, found {actual}"
            ),
            EngineError::ProjectInUse(id) => {
                write!(f, "cannot delete project {id}: engagements still reference it")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
