// World instances, their occupants and eviction

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::codec::{GeneratorConfig, Persist};
use crate::types::{Identifier, InstanceKey, LifeState, Tick, Vec3};

/// Snapshot file written into each instance's data directory.
pub const SNAPSHOT_FILE: &str = "instance.json";

/// Generator/type pair held by the stem registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceStem {
    pub instance_type: Identifier,
    pub generator: GeneratorConfig,
}

impl Persist for InstanceStem {
    fn validate(&self) -> Result<(), crate::error::CodecError> {
        self.generator.validate()
    }
}

/// Settings every instance copies from the primary instance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SharedSettings {
    pub simulation_distance: u32,
    pub view_distance: u32,
}

impl Default for SharedSettings {
    fn default() -> Self {
        Self {
            simulation_distance: 10,
            view_distance: 12,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldBorder {
    pub center_x: f64,
    pub center_z: f64,
    pub size: f64,
}

impl Default for WorldBorder {
    fn default() -> Self {
        Self {
            center_x: 0.0,
            center_z: 0.0,
            size: 59_999_968.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Snapshot {
    ticks: u64,
    border: WorldBorder,
    spawn: Vec3,
}

// ============================================================================
// WorldInstance
// ============================================================================

#[derive(Debug, Clone)]
pub struct WorldInstance {
    pub identifier: Identifier,
    pub key: InstanceKey,
    /// Key into the type registry; the registry owns the metadata.
    pub type_identifier: Identifier,
    pub generator: GeneratorConfig,
    pub life_state: LifeState,
    pub settings: SharedSettings,
    pub border: WorldBorder,
    /// Instances whose border follows this one. Only the primary has any.
    pub border_listeners: Vec<InstanceKey>,
    pub spawn: Vec3,
    pub ticks: u64,
    pub data_dir: PathBuf,
}

impl WorldInstance {
    pub fn new(
        identifier: Identifier,
        type_identifier: Identifier,
        generator: GeneratorConfig,
        data_dir: PathBuf,
    ) -> Self {
        Self {
            identifier,
            key: InstanceKey::default(),
            type_identifier,
            generator,
            life_state: LifeState::Pending,
            settings: SharedSettings::default(),
            border: WorldBorder::default(),
            border_listeners: Vec::new(),
            spawn: Vec3::ZERO,
            ticks: 0,
            data_dir,
        }
    }

    /// Copy the world-level parameters of `primary`.
    pub fn inherit_from(&mut self, primary: &WorldInstance) {
        self.settings = primary.settings;
        self.border = primary.border;
    }

    pub fn is_running(&self) -> bool {
        self.life_state != LifeState::Pending
    }

    pub fn tick(&mut self, now: Tick) {
        self.ticks += 1;
        tracing::trace!(target: "instance", tick = now, identifier = %self.identifier, ticks = self.ticks);
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(SNAPSHOT_FILE)
    }

    /// Flush instance state to its data directory.
    pub fn save(&self) -> io::Result<()> {
        fs::create_dir_all(&self.data_dir)?;
        let snapshot = Snapshot {
            ticks: self.ticks,
            border: self.border,
            spawn: self.spawn,
        };
        let bytes = serde_json::to_vec_pretty(&snapshot).map_err(io::Error::other)?;
        fs::write(self.snapshot_path(), bytes)
    }

    /// Restore state saved by an earlier run. Returns false when there is none.
    pub fn restore(&mut self) -> io::Result<bool> {
        let path = self.snapshot_path();
        if !path.exists() {
            return Ok(false);
        }
        let bytes = fs::read(path)?;
        let snapshot: Snapshot = serde_json::from_slice(&bytes).map_err(io::Error::other)?;
        self.ticks = snapshot.ticks;
        self.border = snapshot.border;
        self.spawn = snapshot.spawn;
        Ok(true)
    }
}

// ============================================================================
// Storage - On-disk layout of instance data
// ============================================================================

#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn instance_dir(&self, identifier: &Identifier) -> PathBuf {
        self.root
            .join("instances")
            .join(identifier.namespace())
            .join(identifier.path())
    }

    pub fn archive_dir(&self, identifier: &Identifier) -> PathBuf {
        self.root.join("deleted").join(identifier.flattened())
    }

    pub fn has_data(&self, identifier: &Identifier) -> bool {
        self.instance_dir(identifier).exists()
    }

    /// Instance directory of `identifier`, refused unless it lies strictly
    /// below `<root>/instances`.
    fn owned_dir(&self, identifier: &Identifier) -> io::Result<PathBuf> {
        let base = self.root.join("instances");
        let dir = self.instance_dir(identifier);
        let contained = dir.strip_prefix(&base).is_ok_and(|rel| {
            rel.components().next().is_some()
                && rel.components().all(|c| matches!(c, Component::Normal(_)))
        });
        if !contained {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} escapes {}", dir.display(), base.display()),
            ));
        }
        Ok(dir)
    }

    /// Delete the instance directory. Missing data is not an error.
    pub fn purge(&self, identifier: &Identifier) -> io::Result<()> {
        let dir = self.owned_dir(identifier)?;
        match fs::remove_dir_all(&dir) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    /// Move the instance directory under `deleted/`, replacing an older archive.
    pub fn archive(&self, identifier: &Identifier) -> io::Result<()> {
        let dir = self.owned_dir(identifier)?;
        if !dir.exists() {
            return Ok(());
        }
        let target = self.archive_dir(identifier);
        if target.exists() {
            fs::remove_dir_all(&target)?;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(dir, target)
    }
}

// ============================================================================
// Occupants and eviction
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RespawnPoint {
    pub instance: Identifier,
    pub position: Vec3,
}

/// An entity living inside an instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Occupant {
    pub name: String,
    pub instance: InstanceKey,
    pub position: Vec3,
    pub velocity: Vec3,
    pub respawn: Option<RespawnPoint>,
    pub inbox: Vec<String>,
}

impl Occupant {
    pub fn new(name: impl Into<String>, instance: InstanceKey, position: Vec3) -> Self {
        Self {
            name: name.into(),
            instance,
            position,
            velocity: Vec3::ZERO,
            respawn: None,
            inbox: Vec::new(),
        }
    }

    pub fn with_respawn(mut self, instance: Identifier, position: Vec3) -> Self {
        self.respawn = Some(RespawnPoint { instance, position });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("eviction refused: {0}")]
pub struct EvictionRefused(pub String);

/// What an eviction policy may see while moving occupants out.
pub struct EvictionContext<'a> {
    pub removing: &'a Identifier,
    pub removing_key: InstanceKey,
    pub fallback: InstanceKey,
    pub fallback_spawn: Vec3,
    pub(crate) live: &'a BTreeMap<Identifier, InstanceKey>,
}

impl EvictionContext<'_> {
    /// Live instance for `identifier`, excluding the one being removed.
    pub fn resolve(&self, identifier: &Identifier) -> Option<InstanceKey> {
        self.live
            .get(identifier)
            .copied()
            .filter(|key| *key != self.removing_key)
    }
}

/// Moves an occupant out of an instance that is going away.
pub trait EvictionPolicy {
    fn evict(&self, occupant: &mut Occupant, ctx: &EvictionContext<'_>) -> Result<(), EvictionRefused>;
}

impl<F> EvictionPolicy for F
where
    F: Fn(&mut Occupant, &EvictionContext<'_>) -> Result<(), EvictionRefused>,
{
    fn evict(&self, occupant: &mut Occupant, ctx: &EvictionContext<'_>) -> Result<(), EvictionRefused> {
        self(occupant, ctx)
    }
}

/// Respawn point if it is still live, otherwise the primary spawn.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEviction;

impl EvictionPolicy for DefaultEviction {
    fn evict(&self, occupant: &mut Occupant, ctx: &EvictionContext<'_>) -> Result<(), EvictionRefused> {
        let (key, position) = occupant
            .respawn
            .as_ref()
            .and_then(|r| ctx.resolve(&r.instance).map(|key| (key, r.position)))
            .unwrap_or((ctx.fallback, ctx.fallback_spawn));
        occupant.instance = key;
        occupant.position = position;
        occupant.velocity = Vec3::ZERO;
        occupant
            .inbox
            .push(format!("{} is closing, you have been moved", ctx.removing));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;
    use tempfile::TempDir;

    fn id(s: &str) -> Identifier {
        Identifier::parse(s).unwrap()
    }

    #[test]
    fn snapshot_survives_save_and_restore() {
        let dir = TempDir::new().unwrap();
        let mut instance = WorldInstance::new(
            id("zone"),
            id("zone"),
            GeneratorConfig::flat(),
            dir.path().join("zone"),
        );
        instance.ticks = 42;
        instance.spawn = Vec3::new(1.0, 64.0, -3.0);
        instance.save().unwrap();

        let mut fresh = WorldInstance::new(
            id("zone"),
            id("zone"),
            GeneratorConfig::flat(),
            dir.path().join("zone"),
        );
        assert!(fresh.restore().unwrap());
        assert_eq!(fresh.ticks, 42);
        assert_eq!(fresh.spawn, Vec3::new(1.0, 64.0, -3.0));
    }

    #[test]
    fn storage_archive_replaces_previous_archive() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path());
        let zone = id("zones:north/keep");

        for round in 0..2 {
            let data = storage.instance_dir(&zone);
            fs::create_dir_all(&data).unwrap();
            fs::write(data.join("marker"), format!("{round}")).unwrap();
            storage.archive(&zone).unwrap();
            assert!(!storage.has_data(&zone));
        }
        let archived = storage.archive_dir(&zone);
        assert!(archived.ends_with("zones,north_keep"));
        assert_eq!(fs::read_to_string(archived.join("marker")).unwrap(), "1");
    }

    #[test]
    fn purge_and_archive_stay_inside_instances() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path().join("save"));
        let keep = storage.instance_dir(&id("zones:keep"));
        fs::create_dir_all(&keep).unwrap();

        for escaping in [
            Identifier::unchecked("zones", "../.."),
            Identifier::unchecked("..", "x"),
            Identifier::unchecked("zones", ".."),
        ] {
            let err = storage.purge(&escaping).unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
            let err = storage.archive(&escaping).unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        }
        assert!(keep.exists());
        assert!(dir.path().join("save").exists());
    }

    #[test]
    fn purge_of_missing_data_is_ok() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path());
        storage.purge(&id("never-created")).unwrap();
    }

    #[test]
    fn default_eviction_prefers_live_respawn() {
        let mut keys: SlotMap<InstanceKey, ()> = SlotMap::with_key();
        let primary = keys.insert(());
        let home = keys.insert(());
        let doomed = keys.insert(());

        let mut live = BTreeMap::new();
        live.insert(id("primary"), primary);
        live.insert(id("home"), home);
        live.insert(id("doomed"), doomed);

        let removing = id("doomed");
        let ctx = EvictionContext {
            removing: &removing,
            removing_key: doomed,
            fallback: primary,
            fallback_spawn: Vec3::new(0.0, 70.0, 0.0),
            live: &live,
        };

        let mut homed = Occupant::new("a", doomed, Vec3::ZERO)
            .with_respawn(id("home"), Vec3::new(5.0, 5.0, 5.0));
        homed.velocity = Vec3::new(1.0, 0.0, 0.0);
        DefaultEviction.evict(&mut homed, &ctx).unwrap();
        assert_eq!(homed.instance, home);
        assert_eq!(homed.position, Vec3::new(5.0, 5.0, 5.0));
        assert_eq!(homed.velocity, Vec3::ZERO);
        assert_eq!(homed.inbox.len(), 1);

        let mut stuck = Occupant::new("b", doomed, Vec3::ZERO)
            .with_respawn(id("doomed"), Vec3::new(9.0, 9.0, 9.0));
        DefaultEviction.evict(&mut stuck, &ctx).unwrap();
        assert_eq!(stuck.instance, primary);
        assert_eq!(stuck.position, Vec3::new(0.0, 70.0, 0.0));
    }
}
