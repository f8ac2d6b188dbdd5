//! The host's structured-data codec.
//!
//! Values that cross the save file or the wire are encoded to JSON values.
//! Each persisted type can reject itself before encoding (the same checks
//! the decoder applies), which is how `EncodingFailed` surfaces.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CodecError;

pub trait Persist: Serialize + DeserializeOwned {
    fn validate(&self) -> Result<(), CodecError> {
        Ok(())
    }
}

pub fn encode<T: Persist>(value: &T) -> Result<Value, CodecError> {
    value.validate()?;
    Ok(serde_json::to_value(value)?)
}

pub fn decode<T: Persist>(value: Value) -> Result<T, CodecError> {
    let decoded: T = serde_json::from_value(value)?;
    decoded.validate()?;
    Ok(decoded)
}

pub fn to_bytes<T: Persist>(value: &T) -> Result<Vec<u8>, CodecError> {
    Ok(serde_json::to_vec(&encode(value)?)?)
}

pub fn from_bytes<T: Persist>(bytes: &[u8]) -> Result<T, CodecError> {
    decode(serde_json::from_slice(bytes)?)
}

// ============================================================================
// InstanceType - Type metadata of a world instance
// ============================================================================

pub const MIN_Y: i32 = -2032;
pub const MAX_Y: i32 = 2032;
pub const MAX_HEIGHT: u32 = 4064;
const SECTION: i32 = 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceType {
    #[serde(default)]
    pub fixed_time: Option<u64>,
    pub has_skylight: bool,
    pub has_ceiling: bool,
    pub natural: bool,
    pub coordinate_scale: f64,
    pub min_y: i32,
    pub height: u32,
    pub logical_height: u32,
    pub ambient_light: f32,
    pub effects: String,
}

impl InstanceType {
    /// Open-sky surface type used when no metadata is supplied.
    pub fn surface() -> Self {
        Self {
            fixed_time: None,
            has_skylight: true,
            has_ceiling: false,
            natural: true,
            coordinate_scale: 1.0,
            min_y: -64,
            height: 384,
            logical_height: 384,
            ambient_light: 0.0,
            effects: "host:surface".to_string(),
        }
    }

    /// Enclosed type of the secondary permanent instance.
    pub fn cavern() -> Self {
        Self {
            fixed_time: Some(18000),
            has_skylight: false,
            has_ceiling: true,
            natural: false,
            coordinate_scale: 8.0,
            min_y: 0,
            height: 256,
            logical_height: 128,
            ambient_light: 0.1,
            effects: "host:cavern".to_string(),
        }
    }

    pub fn max_y(&self) -> i32 {
        self.min_y + self.height as i32 - 1
    }
}

impl Persist for InstanceType {
    fn validate(&self) -> Result<(), CodecError> {
        if self.height < SECTION as u32 || self.height > MAX_HEIGHT {
            return Err(CodecError::Invalid(format!(
                "height {} outside [{SECTION}, {MAX_HEIGHT}]",
                self.height
            )));
        }
        if self.height % SECTION as u32 != 0 {
            return Err(CodecError::Invalid(format!(
                "height {} is not a multiple of {SECTION}",
                self.height
            )));
        }
        if self.min_y % SECTION != 0 {
            return Err(CodecError::Invalid(format!(
                "min_y {} is not a multiple of {SECTION}",
                self.min_y
            )));
        }
        if self.min_y < MIN_Y || self.min_y + self.height as i32 > MAX_Y {
            return Err(CodecError::Invalid(format!(
                "vertical range {}..{} exceeds [{MIN_Y}, {MAX_Y}]",
                self.min_y,
                self.min_y + self.height as i32
            )));
        }
        if self.logical_height > self.height {
            return Err(CodecError::Invalid(format!(
                "logical_height {} exceeds height {}",
                self.logical_height, self.height
            )));
        }
        if !self.coordinate_scale.is_finite() || self.coordinate_scale <= 0.0 {
            return Err(CodecError::Invalid(format!(
                "coordinate_scale {} must be finite and positive",
                self.coordinate_scale
            )));
        }
        if !(0.0..=1.0).contains(&self.ambient_light) {
            return Err(CodecError::Invalid(format!(
                "ambient_light {} outside [0, 1]",
                self.ambient_light
            )));
        }
        Ok(())
    }
}

// ============================================================================
// GeneratorConfig - Opaque generation settings
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    pub kind: String,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub settings: BTreeMap<String, Value>,
}

impl GeneratorConfig {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            seed: 0,
            settings: BTreeMap::new(),
        }
    }

    /// Flat generator used by the command surface when none is given.
    pub fn flat() -> Self {
        let mut config = Self::new("flat");
        config
            .settings
            .insert("layers".to_string(), Value::from("bedrock,2*dirt,grass"));
        config
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }
}

impl Persist for GeneratorConfig {
    fn validate(&self) -> Result<(), CodecError> {
        if self.kind.trim().is_empty() {
            return Err(CodecError::Invalid("generator kind is empty".to_string()));
        }
        Ok(())
    }
}
