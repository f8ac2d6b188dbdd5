// Host server state: registries, save data, occupants and observers

use std::path::PathBuf;

use serde_json::{Map, Value};
use slotmap::SlotMap;

use crate::codec::{self, GeneratorConfig, InstanceType};
use crate::config::LifecycleConfig;
use crate::error::ServerError;
use crate::instance::{InstanceStem, Occupant, Storage, WorldInstance};
use crate::ledger::Ledger;
use crate::level_data::LevelData;
use crate::lifecycle::{
    InstanceEvent, InstanceHandle, Lifecycle, LifecycleManager, PRIMARY, SECONDARY,
};
use crate::registry::Registry;
use crate::sync::{Observer, ObserverHub};
use crate::tick::ServerHooks;
use crate::types::{Identifier, InstanceKey, ObserverId, OccupantId, Tick};

/// Everything the host owns that the lifecycle manager reads or mutates.
pub struct HostEnv {
    pub types: Registry<InstanceType>,
    pub stems: Registry<InstanceStem>,
    pub level_data: LevelData,
    pub storage: Storage,
    pub occupants: SlotMap<OccupantId, Occupant>,
    pub observers: ObserverHub,
    pub tick: Tick,
    /// Set while the children phase walks the live set.
    pub ticking_instances: bool,
}

impl HostEnv {
    fn bootstrap(root: PathBuf, level_root: Map<String, Value>) -> Self {
        let primary = Identifier::host(PRIMARY);
        let secondary = Identifier::host(SECONDARY);

        let mut types = Registry::new("instance_type").with_default_key(primary.clone());
        let mut stems = Registry::new("instance_stem").with_default_key(primary.clone());
        types.with_unsealed(|r| {
            for (identifier, ty) in [
                (&primary, InstanceType::surface()),
                (&secondary, InstanceType::cavern()),
            ] {
                if let Err(e) = r.insert(identifier.clone(), ty) {
                    tracing::error!(target: "registry", error = %e, "bootstrap insert failed");
                }
            }
        });
        stems.with_unsealed(|r| {
            for (identifier, kind) in [(&primary, "noise"), (&secondary, "cavern")] {
                let stem = InstanceStem {
                    instance_type: identifier.clone(),
                    generator: GeneratorConfig::new(kind),
                };
                if let Err(e) = r.insert(identifier.clone(), stem) {
                    tracing::error!(target: "registry", error = %e, "bootstrap insert failed");
                }
            }
        });
        types.seal();
        stems.seal();

        Self {
            types,
            stems,
            level_data: LevelData::new(level_root),
            storage: Storage::new(root),
            occupants: SlotMap::with_key(),
            observers: ObserverHub::new(),
            tick: 0,
            ticking_instances: false,
        }
    }

    pub fn occupants_in(&self, key: InstanceKey) -> impl Iterator<Item = (OccupantId, &Occupant)> {
        self.occupants.iter().filter(move |(_, o)| o.instance == key)
    }
}

// ============================================================================
// Server
// ============================================================================

pub struct Server {
    pub(crate) lifecycle: LifecycleManager,
    pub(crate) env: HostEnv,
}

impl Server {
    /// Fresh server with no saved state under `root`.
    pub fn new(config: LifecycleConfig, root: impl Into<PathBuf>) -> Self {
        let mut server = Self::construct(config, root.into(), Map::new());
        server.attach_ledger(Ledger::new());
        server
    }

    /// Load `level.json` from `root` (if present) and replay its ledger.
    pub fn open(config: LifecycleConfig, root: impl Into<PathBuf>) -> Result<Self, ServerError> {
        let root = root.into();
        let (level_root, ledger) = match LevelData::read(&root)? {
            Some(parsed) => (parsed.root, parsed.ledger),
            None => (Map::new(), Ledger::new()),
        };
        let mut server = Self::construct(config, root, level_root);
        server.attach_ledger(ledger);
        Ok(server)
    }

    fn construct(config: LifecycleConfig, root: PathBuf, level_root: Map<String, Value>) -> Self {
        let env = HostEnv::bootstrap(root, level_root);
        let lifecycle = LifecycleManager::new(config, &env);
        Self { lifecycle, env }
    }

    fn attach_ledger(&mut self, ledger: Ledger) {
        self.lifecycle.on_level_data_constructed(&mut self.env, ledger);
    }

    pub fn lifecycle(&mut self) -> Lifecycle<'_> {
        Lifecycle {
            manager: &mut self.lifecycle,
            env: &mut self.env,
        }
    }

    pub fn manager(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    pub fn env(&self) -> &HostEnv {
        &self.env
    }

    pub fn config(&self) -> &LifecycleConfig {
        self.lifecycle.config()
    }

    pub fn tick(&self) -> Tick {
        self.env.tick
    }

    pub fn is_ticking_instances(&self) -> bool {
        self.env.ticking_instances
    }

    pub fn types(&self) -> &Registry<InstanceType> {
        &self.env.types
    }

    pub fn stems(&self) -> &Registry<InstanceStem> {
        &self.env.stems
    }

    pub fn ledger(&self) -> &Ledger {
        self.env.level_data.ledger()
    }

    pub fn level_data(&self) -> &LevelData {
        &self.env.level_data
    }

    pub fn storage(&self) -> &Storage {
        &self.env.storage
    }

    pub fn primary(&self) -> InstanceHandle {
        self.lifecycle.primary()
    }

    pub fn secondary(&self) -> InstanceHandle {
        self.lifecycle.secondary()
    }

    pub fn instance(&self, key: InstanceKey) -> Option<&WorldInstance> {
        self.lifecycle.instance_by_key(key)
    }

    pub fn instance_mut(&mut self, key: InstanceKey) -> Option<&mut WorldInstance> {
        self.lifecycle.instance_by_key_mut(key)
    }

    pub fn on_instance_event(&mut self, listener: impl FnMut(&InstanceEvent) + 'static) {
        self.lifecycle.on_event(listener);
    }

    // === Occupants ===

    pub fn add_occupant(&mut self, occupant: Occupant) -> OccupantId {
        self.env.occupants.insert(occupant)
    }

    pub fn occupant(&self, id: OccupantId) -> Option<&Occupant> {
        self.env.occupants.get(id)
    }

    pub fn occupant_mut(&mut self, id: OccupantId) -> Option<&mut Occupant> {
        self.env.occupants.get_mut(id)
    }

    pub fn remove_occupant(&mut self, id: OccupantId) -> Option<Occupant> {
        self.env.occupants.remove(id)
    }

    // === Observers ===

    pub fn connect_observer(&mut self, observer: impl Observer + 'static) -> ObserverId {
        self.env.observers.connect(observer)
    }

    pub fn disconnect_observer(&mut self, id: ObserverId) -> bool {
        self.env.observers.disconnect(id)
    }

    pub fn observers(&self) -> &ObserverHub {
        &self.env.observers
    }

    // === Persistence ===

    /// Flush every live instance and write `level.json`.
    pub fn save(&mut self) -> Result<(), ServerError> {
        self.lifecycle.save_instances()?;
        let mut dimensions = Map::new();
        for (_, identifier, stem) in self.env.stems.iter() {
            dimensions.insert(identifier.to_string(), codec::encode(stem.as_ref())?);
        }
        self.env.level_data.set_dimensions(dimensions);
        self.env.level_data.write(self.env.storage.root())?;
        tracing::info!(
            target: "ledger",
            tick = self.env.tick,
            entries = self.ledger().len() as u64,
            "level data saved"
        );
        Ok(())
    }
}
