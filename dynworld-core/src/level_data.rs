// Root save metadata (level.json) and the ledger it carries

use std::fs;
use std::io;
use std::path::Path;

use serde_json::{Map, Value};

use crate::error::ServerError;
use crate::ledger::{LEDGER_KEY, Ledger};

pub const LEVEL_FILE: &str = "level.json";

const WORLD_GEN_KEY: &str = "world_gen";
const DIMENSIONS_KEY: &str = "dimensions";

/// Output of the parse phase. The ledger is handed to `LevelData::attach`
/// once the owning object exists.
#[derive(Debug, Clone)]
pub struct ParsedLevelData {
    pub root: Map<String, Value>,
    pub ledger: Ledger,
}

#[derive(Debug, Clone, Default)]
pub struct LevelData {
    root: Map<String, Value>,
    ledger: Ledger,
}

impl LevelData {
    pub fn parse(bytes: &[u8]) -> Result<ParsedLevelData, ServerError> {
        let mut root = match serde_json::from_slice::<Value>(bytes)? {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            _ => return Err(ServerError::Ledger(crate::error::LedgerError::NotAnObject)),
        };
        let ledger = match root.remove(LEDGER_KEY) {
            Some(value) => Ledger::from_value(&value)?,
            None => Ledger::new(),
        };
        Ok(ParsedLevelData { root, ledger })
    }

    pub fn read(dir: &Path) -> Result<Option<ParsedLevelData>, ServerError> {
        match fs::read(dir.join(LEVEL_FILE)) {
            Ok(bytes) => Self::parse(&bytes).map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn new(root: Map<String, Value>) -> Self {
        Self {
            root,
            ledger: Ledger::new(),
        }
    }

    pub fn attach(&mut self, ledger: Ledger) {
        self.ledger = ledger;
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub(crate) fn ledger_mut(&mut self) -> &mut Ledger {
        &mut self.ledger
    }

    pub fn root(&self) -> &Map<String, Value> {
        &self.root
    }

    /// Replace the generation settings of every registered stem.
    pub fn set_dimensions(&mut self, dimensions: Map<String, Value>) {
        let world_gen = self
            .root
            .entry(WORLD_GEN_KEY)
            .or_insert_with(|| Value::Object(Map::new()));
        if !world_gen.is_object() {
            *world_gen = Value::Object(Map::new());
        }
        if let Value::Object(world_gen) = world_gen {
            world_gen.insert(DIMENSIONS_KEY.to_string(), Value::Object(dimensions));
        }
    }

    /// Serialize the root metadata. Ledger identifiers are left out of
    /// `world_gen.dimensions`; they are rebuilt from the ledger on load.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ServerError> {
        let mut root = self.root.clone();
        if let Some(Value::Object(world_gen)) = root.get_mut(WORLD_GEN_KEY) {
            if let Some(Value::Object(dimensions)) = world_gen.get_mut(DIMENSIONS_KEY) {
                dimensions.retain(|key, _| {
                    !self
                        .ledger
                        .iter()
                        .any(|(identifier, _)| identifier.to_string() == *key)
                });
            }
        }
        root.insert(LEDGER_KEY.to_string(), self.ledger.to_value()?);
        Ok(serde_json::to_vec_pretty(&Value::Object(root))?)
    }

    pub fn write(&self, dir: &Path) -> Result<(), ServerError> {
        fs::create_dir_all(dir)?;
        fs::write(dir.join(LEVEL_FILE), self.to_bytes()?)?;
        Ok(())
    }
}
