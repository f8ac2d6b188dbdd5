//! The persistent record of dynamically created instances.
//!
//! Each entry keeps the generator and type metadata an instance was created
//! with, so the registries can be rebuilt when the save is loaded again.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::codec::{self, GeneratorConfig, InstanceType};
use crate::error::LedgerError;
use crate::types::Identifier;

/// Key of the ledger sub-tree in the root metadata.
pub const LEDGER_KEY: &str = "DynamicInstances";

const GENERATOR_FIELD: &str = "generator";
const TYPE_FIELD: &str = "instance_type";

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub generator: GeneratorConfig,
    pub instance_type: InstanceType,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ledger {
    entries: BTreeMap<Identifier, LedgerEntry>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, identifier: Identifier, entry: LedgerEntry) {
        tracing::debug!(target: "ledger", action = "record", identifier = %identifier);
        self.entries.insert(identifier, entry);
    }

    pub fn erase(&mut self, identifier: &Identifier) -> Option<LedgerEntry> {
        tracing::debug!(target: "ledger", action = "erase", identifier = %identifier);
        self.entries.remove(identifier)
    }

    pub fn get(&self, identifier: &Identifier) -> Option<&LedgerEntry> {
        self.entries.get(identifier)
    }

    pub fn contains(&self, identifier: &Identifier) -> bool {
        self.entries.contains_key(identifier)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Identifier, &LedgerEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encode as the sub-tree stored under [`LEDGER_KEY`].
    pub fn to_value(&self) -> Result<Value, LedgerError> {
        let mut map = Map::new();
        for (identifier, entry) in &self.entries {
            let encode_err = |source| LedgerError::Entry {
                identifier: identifier.clone(),
                source,
            };
            let mut fields = Map::new();
            fields.insert(
                GENERATOR_FIELD.to_string(),
                codec::encode(&entry.generator).map_err(encode_err)?,
            );
            fields.insert(
                TYPE_FIELD.to_string(),
                codec::encode(&entry.instance_type).map_err(encode_err)?,
            );
            map.insert(identifier.to_string(), Value::Object(fields));
        }
        Ok(Value::Object(map))
    }

    /// Decode the ledger sub-tree. A missing (null) sub-tree is an empty ledger.
    pub fn from_value(value: &Value) -> Result<Self, LedgerError> {
        let map = match value {
            Value::Null => return Ok(Self::new()),
            Value::Object(map) => map,
            _ => return Err(LedgerError::NotAnObject),
        };

        let mut ledger = Self::new();
        for (key, fields) in map {
            let identifier = Identifier::parse(key).map_err(|source| LedgerError::BadKey {
                key: key.clone(),
                source,
            })?;
            let field = |name: &'static str| {
                fields.get(name).cloned().ok_or(LedgerError::MissingField {
                    identifier: identifier.clone(),
                    field: name,
                })
            };
            let decode_err = |source| LedgerError::Entry {
                identifier: identifier.clone(),
                source,
            };
            let generator = codec::decode(field(GENERATOR_FIELD)?).map_err(decode_err)?;
            let instance_type = codec::decode(field(TYPE_FIELD)?).map_err(decode_err)?;
            ledger.entries.insert(
                identifier,
                LedgerEntry {
                    generator,
                    instance_type,
                },
            );
        }
        Ok(ledger)
    }

    pub fn encode(&self) -> Result<Vec<u8>, LedgerError> {
        Ok(serde_json::to_vec(&self.to_value()?)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, LedgerError> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::new());
        }
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_value(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> Identifier {
        Identifier::parse(s).unwrap()
    }

    fn entry(seed: u64) -> LedgerEntry {
        LedgerEntry {
            generator: GeneratorConfig::flat().with_seed(seed),
            instance_type: InstanceType::surface(),
        }
    }

    #[test]
    fn round_trips_through_bytes() {
        let mut ledger = Ledger::new();
        ledger.record(id("zones:a"), entry(1));
        ledger.record(id("zones:b/c"), entry(2));
        let back = Ledger::decode(&ledger.encode().unwrap()).unwrap();
        assert_eq!(back, ledger);
    }

    #[test]
    fn missing_subtree_is_empty() {
        assert!(Ledger::from_value(&Value::Null).unwrap().is_empty());
        assert!(Ledger::decode(b"").unwrap().is_empty());
    }

    #[test]
    fn uses_documented_layout() {
        let mut ledger = Ledger::new();
        ledger.record(id("zones:a"), entry(9));
        let value = ledger.to_value().unwrap();
        assert_eq!(value["zones:a"]["generator"]["seed"], 9);
        assert_eq!(value["zones:a"]["instance_type"]["height"], 384);
    }

    #[test]
    fn rejects_entries_missing_fields() {
        let value = serde_json::json!({ "zones:a": { "generator": { "kind": "flat" } } });
        assert!(matches!(
            Ledger::from_value(&value),
            Err(LedgerError::MissingField { field: "instance_type", .. })
        ));
        let value = serde_json::json!({ "Not Valid": {} });
        assert!(matches!(Ledger::from_value(&value), Err(LedgerError::BadKey { .. })));
    }

    #[test]
    fn erase_removes_entry() {
        let mut ledger = Ledger::new();
        ledger.record(id("zones:a"), entry(1));
        assert!(ledger.erase(&id("zones:a")).is_some());
        assert!(ledger.erase(&id("zones:a")).is_none());
        assert!(!ledger.contains(&id("zones:a")));
    }
}
