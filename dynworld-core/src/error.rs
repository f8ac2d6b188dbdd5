use thiserror::Error;

use crate::types::Identifier;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("invalid identifier namespace '{0}'")]
    InvalidNamespace(String),

    #[error("invalid identifier path '{0}'")]
    InvalidPath(String),
}

/// Failures of a single registry mutation. These never leave the registry in a
/// partially updated state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("registry '{registry}' already contains '{identifier}'")]
    DuplicateIdentifier {
        registry: &'static str,
        identifier: Identifier,
    },

    #[error("registry '{registry}': numeric id {numeric_id} is already held by '{holder}'")]
    IdCollision {
        registry: &'static str,
        numeric_id: u32,
        holder: Identifier,
    },

    #[error("registry '{registry}': numeric id {numeric_id} would leave a gap (next id is {next_id})")]
    IdOutOfRange {
        registry: &'static str,
        numeric_id: u32,
        next_id: u32,
    },

    #[error("registry '{registry}' has no entry '{identifier}'")]
    UnknownIdentifier {
        registry: &'static str,
        identifier: Identifier,
    },

    #[error("registry '{registry}': cannot remove default entry '{identifier}'")]
    DefaultEntry {
        registry: &'static str,
        identifier: Identifier,
    },
}

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("invalid value: {0}")]
    Invalid(String),

    #[error("serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("ledger is not a JSON object")]
    NotAnObject,

    #[error("ledger key '{key}' is not an identifier: {source}")]
    BadKey {
        key: String,
        #[source]
        source: IdentifierError,
    },

    #[error("ledger entry '{identifier}' is missing '{field}'")]
    MissingField {
        identifier: Identifier,
        field: &'static str,
    },

    #[error("ledger entry '{identifier}' failed to decode: {source}")]
    Entry {
        identifier: Identifier,
        #[source]
        source: CodecError,
    },

    #[error("ledger bytes are malformed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors returned by the lifecycle entry points. Callers turn these into
/// human readable messages.
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("an instance, type or stem named '{0}' already exists")]
    AlreadyExists(Identifier),

    #[error("'{identifier}' could not be encoded: {source}")]
    EncodingFailed {
        identifier: Identifier,
        #[source]
        source: CodecError,
    },

    #[error("'{0}' is not a dynamic instance that can be removed")]
    NotDeletable(Identifier),

    #[error("filesystem operation on '{identifier}' failed: {source}")]
    FilesystemFailure {
        identifier: Identifier,
        #[source]
        source: std::io::Error,
    },

    #[error("'{identifier}' still has {occupants} occupant(s) and eviction is not allowed")]
    OccupantEvictionRefused {
        identifier: Identifier,
        occupants: usize,
    },

    #[error("dynamic instance creation is disabled")]
    CreationDisabled,

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("malformed configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("could not read configuration: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("level data could not be read: {0}")]
    Io(#[from] std::io::Error),

    #[error("level data is malformed: {0}")]
    LevelData(#[from] serde_json::Error),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("commands are disabled")]
    Disabled,

    #[error("unknown command '{0}'")]
    Unknown(String),

    #[error("permission level {required} required")]
    PermissionDenied { required: u8 },

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("bad argument: {0}")]
    BadArgument(String),

    #[error("cannot create '{0}'")]
    CannotCreate(Identifier),

    #[error("cannot remove '{0}'")]
    CannotDelete(Identifier),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}
