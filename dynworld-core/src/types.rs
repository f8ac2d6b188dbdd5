use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

use crate::error::IdentifierError;

pub type Tick = u64;

/// Namespace used when an identifier is written without one.
pub const DEFAULT_NAMESPACE: &str = "host";

/// Namespace for identifiers minted by `create_with_random_id`.
pub const DYNAMIC_NAMESPACE: &str = "dynamic";

// ============================================================================
// Identifier - Namespaced key shared by instances, types and stems
// ============================================================================

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier {
    namespace: String,
    path: String,
}

impl Identifier {
    pub fn new(namespace: &str, path: &str) -> Result<Self, IdentifierError> {
        if !is_segment(namespace) || !namespace.chars().all(is_namespace_char) {
            return Err(IdentifierError::InvalidNamespace(namespace.to_string()));
        }
        if !path.split('/').all(is_segment) || !path.chars().all(is_path_char) {
            return Err(IdentifierError::InvalidPath(path.to_string()));
        }
        Ok(Self {
            namespace: namespace.to_string(),
            path: path.to_string(),
        })
    }

    /// Parse `namespace:path`, or a bare `path` in the default namespace.
    pub fn parse(s: &str) -> Result<Self, IdentifierError> {
        match s.split_once(':') {
            Some((namespace, path)) => Self::new(namespace, path),
            None => Self::new(DEFAULT_NAMESPACE, s),
        }
    }

    /// Default-namespace identifier from a path literal known to be valid.
    pub(crate) fn host(path: &str) -> Self {
        debug_assert!(path.split('/').all(is_segment) && path.chars().all(is_path_char));
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            path: path.to_string(),
        }
    }

    /// Skips validation, for exercising code that must cope with bad input.
    #[cfg(test)]
    pub(crate) fn unchecked(namespace: &str, path: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            path: path.to_string(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Single path segment safe for directory names (`ns,path` with `/` flattened).
    pub fn flattened(&self) -> String {
        format!("{},{}", self.namespace, self.path.replace('/', "_"))
    }
}

/// Identifiers name directories, so no segment may be empty, `.` or `..`.
fn is_segment(segment: &str) -> bool {
    !matches!(segment, "" | "." | "..")
}

fn is_namespace_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '-' | '.')
}

fn is_path_char(c: char) -> bool {
    is_namespace_char(c) || c == '/'
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.path)
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({self})")
    }
}

impl FromStr for Identifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Identifier {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Identifier> for String {
    fn from(value: Identifier) -> Self {
        value.to_string()
    }
}

// ============================================================================
// Keys - Generational indices into the instance, occupant and observer arenas
// ============================================================================

new_key_type! {
    pub struct InstanceKey;
    pub struct OccupantId;
    pub struct ObserverId;
}

// ============================================================================
// Lifecycle enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifeState {
    /// Constructed and ticketed, not yet in the live set.
    Pending,
    Running,
    /// A removal ticket is queued.
    PendingRemoval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeletionMode {
    /// Instance and persisted data are destroyed, ledger entry erased.
    Delete,
    /// Instance stops; data and ledger entry are kept for a later `load`.
    Unload,
}

impl DeletionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            DeletionMode::Delete => "delete",
            DeletionMode::Unload => "unload",
        }
    }
}

/// Per-entry registry stability; the registry caches the worst of all entries.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Stability {
    #[default]
    Stable,
    Experimental,
    Deprecated,
}

impl Stability {
    pub fn fold(self, other: Stability) -> Stability {
        self.max(other)
    }
}

// ============================================================================
// Spatial values
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_namespaced_and_bare_identifiers() {
        let id = Identifier::parse("zones:north/keep").unwrap();
        assert_eq!(id.namespace(), "zones");
        assert_eq!(id.path(), "north/keep");
        assert_eq!(id.to_string(), "zones:north/keep");

        let bare = Identifier::parse("zone-1").unwrap();
        assert_eq!(bare.namespace(), DEFAULT_NAMESPACE);
        assert_eq!(bare.flattened(), "host,zone-1");
    }

    #[test]
    fn rejects_invalid_characters() {
        assert!(matches!(
            Identifier::parse("Zones:a"),
            Err(IdentifierError::InvalidNamespace(_))
        ));
        assert!(matches!(
            Identifier::parse("zones:"),
            Err(IdentifierError::InvalidPath(_))
        ));
        assert!(Identifier::parse("a:b:c").is_err());
    }

    #[test]
    fn rejects_relative_segments() {
        for bad in ["zones:..", "zones:../..", "zones:a/../b", "zones:./a", "zones:a//b", "zones:a/", "..", "."] {
            assert!(
                matches!(Identifier::parse(bad), Err(IdentifierError::InvalidPath(_))),
                "{bad} accepted"
            );
        }
        for bad in ["..:a", ".:a"] {
            assert!(
                matches!(Identifier::parse(bad), Err(IdentifierError::InvalidNamespace(_))),
                "{bad} accepted"
            );
        }
        assert!(Identifier::parse("zones:v1.2/north..east").is_ok());
        assert!(serde_json::from_str::<Identifier>("\"zones:../x\"").is_err());
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = Identifier::parse("zones:alpha").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"zones:alpha\"");
        let back: Identifier = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<Identifier>("\"Bad Id\"").is_err());
    }

    #[test]
    fn stability_fold_keeps_worst() {
        assert_eq!(
            Stability::Stable.fold(Stability::Experimental),
            Stability::Experimental
        );
        assert_eq!(
            Stability::Deprecated.fold(Stability::Stable),
            Stability::Deprecated
        );
    }
}
