//! Creation, loading and removal of dynamic world instances.
//!
//! Every request checks whether the tick loop is iterating the live set
//! (or draining tickets). If it is, the request is turned into a ticket and
//! applied by [`ServerHooks::on_before_tick`] at the start of the next
//! tick; otherwise it is applied immediately.

use std::collections::{BTreeMap, BTreeSet};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use slotmap::SlotMap;

use crate::codec::{self, GeneratorConfig, InstanceType};
use crate::config::LifecycleConfig;
use crate::error::LifecycleError;
use crate::instance::{
    DefaultEviction, EvictionContext, EvictionPolicy, InstanceStem, Occupant, WorldInstance,
};
use crate::ledger::{Ledger, LedgerEntry};
use crate::registry::{GroupDefinitions, Registry};
use crate::server::HostEnv;
use crate::sync::SyncMessage;
use crate::tick::ServerHooks;
use crate::tickets::{CreateTicket, QueueState, RemovalTicket, TicketQueue};
use crate::types::{
    DYNAMIC_NAMESPACE, DeletionMode, Identifier, InstanceKey, LifeState, OccupantId, Vec3,
};

/// Permanent instance every other instance inherits settings from.
pub const PRIMARY: &str = "primary";
/// Second permanent instance.
pub const SECONDARY: &str = "secondary";

/// Cheap reference to an instance: its identifier and arena key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceHandle {
    pub identifier: Identifier,
    pub key: InstanceKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceEvent {
    Added(InstanceHandle),
    Removed(InstanceHandle),
}

type Listener = Box<dyn FnMut(&InstanceEvent)>;

/// Groups the host derives from type metadata. Rebound after every batch of
/// type inserts.
pub fn derive_groups(types: &Registry<InstanceType>) -> GroupDefinitions {
    let mut groups = GroupDefinitions::new();
    let tags: [(&str, fn(&InstanceType) -> bool); 3] = [
        ("has_skylight", |t| t.has_skylight),
        ("has_ceiling", |t| t.has_ceiling),
        ("natural", |t| t.natural),
    ];
    for (tag, test) in tags {
        let members = types
            .iter()
            .filter(|(_, _, ty)| test(ty))
            .map(|(_, identifier, _)| identifier.clone())
            .collect();
        groups.insert(Identifier::host(tag), members);
    }
    groups
}

/// Instantiate a permanent instance, which the registries in `env` must
/// already hold.
fn add_permanent(
    instances: &mut SlotMap<InstanceKey, WorldInstance>,
    live: &mut BTreeMap<Identifier, InstanceKey>,
    env: &HostEnv,
    identifier: Identifier,
    spawn: Vec3,
) -> InstanceHandle {
    let generator = env
        .stems
        .get(&identifier)
        .map(|stem| stem.generator.clone())
        .unwrap_or_else(|| GeneratorConfig::new("noise"));
    let mut instance = WorldInstance::new(
        identifier.clone(),
        identifier.clone(),
        generator,
        env.storage.instance_dir(&identifier),
    );
    instance.spawn = spawn;
    instance.life_state = LifeState::Running;
    if let Err(e) = instance.restore() {
        tracing::warn!(target: "lifecycle", identifier = %identifier, error = %e, "could not restore permanent instance");
    }
    let key = instances.insert_with_key(|key| WorldInstance { key, ..instance });
    live.insert(identifier.clone(), key);
    InstanceHandle { identifier, key }
}

// ============================================================================
// LifecycleManager
// ============================================================================

pub struct LifecycleManager {
    config: LifecycleConfig,
    instances: SlotMap<InstanceKey, WorldInstance>,
    /// Running instances, by identifier.
    live: BTreeMap<Identifier, InstanceKey>,
    /// Dynamic instances that are live or waiting to be registered.
    dynamic: BTreeSet<Identifier>,
    /// Replayed from the ledger, registered in the registries, not instantiated.
    dormant: BTreeSet<Identifier>,
    primary: InstanceHandle,
    secondary: InstanceHandle,
    tickets: TicketQueue,
    rng: StdRng,
    listeners: Vec<Listener>,
}

impl LifecycleManager {
    /// Instantiate the permanent instances, which the registries in `env`
    /// must already hold.
    pub(crate) fn new(config: LifecycleConfig, env: &HostEnv) -> Self {
        let rng = match config.id_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let mut instances = SlotMap::with_key();
        let mut live = BTreeMap::new();
        let primary = add_permanent(
            &mut instances,
            &mut live,
            env,
            Identifier::host(PRIMARY),
            Vec3::new(0.0, 64.0, 0.0),
        );
        let secondary = add_permanent(
            &mut instances,
            &mut live,
            env,
            Identifier::host(SECONDARY),
            Vec3::new(0.0, 32.0, 0.0),
        );
        Self {
            config,
            instances,
            live,
            dynamic: BTreeSet::new(),
            dormant: BTreeSet::new(),
            primary,
            secondary,
            tickets: TicketQueue::new(),
            rng,
            listeners: Vec::new(),
        }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn primary(&self) -> InstanceHandle {
        self.primary.clone()
    }

    pub fn secondary(&self) -> InstanceHandle {
        self.secondary.clone()
    }

    pub fn tickets(&self) -> &TicketQueue {
        &self.tickets
    }

    pub fn on_event(&mut self, listener: impl FnMut(&InstanceEvent) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    fn emit(&mut self, event: InstanceEvent) {
        for listener in &mut self.listeners {
            listener(&event);
        }
    }

    // === Queries ===

    pub fn exists(&self, identifier: &Identifier) -> bool {
        self.live.contains_key(identifier)
    }

    pub fn is_dynamic(&self, identifier: &Identifier) -> bool {
        self.dynamic.contains(identifier)
    }

    pub fn is_dormant(&self, identifier: &Identifier) -> bool {
        self.dormant.contains(identifier)
    }

    pub fn can_create(&self, env: &HostEnv, identifier: &Identifier) -> bool {
        !self.live.contains_key(identifier)
            && !env.types.contains(identifier)
            && !env.stems.contains(identifier)
            && !self.tickets.is_pending_creation(identifier)
    }

    pub fn can_load(&self, env: &HostEnv, identifier: &Identifier) -> bool {
        self.can_create(env, identifier)
            || (self.is_dormant(identifier) && !self.tickets.is_pending_creation(identifier))
    }

    pub fn can_delete(&self, identifier: &Identifier) -> bool {
        let removable = self.is_dormant(identifier)
            || (self.dynamic.contains(identifier)
                && (self.live.contains_key(identifier)
                    || self.tickets.is_pending_creation(identifier)));
        removable && !self.tickets.is_pending_removal(identifier)
    }

    /// Key of a live or pending instance.
    pub fn key_of(&self, identifier: &Identifier) -> Option<InstanceKey> {
        self.live.get(identifier).copied().or_else(|| {
            self.instances
                .iter()
                .find(|(_, i)| &i.identifier == identifier)
                .map(|(key, _)| key)
        })
    }

    pub fn handle(&self, identifier: &Identifier) -> Option<InstanceHandle> {
        self.key_of(identifier).map(|key| InstanceHandle {
            identifier: identifier.clone(),
            key,
        })
    }

    pub fn instance(&self, identifier: &Identifier) -> Option<&WorldInstance> {
        self.key_of(identifier).and_then(|key| self.instances.get(key))
    }

    pub fn instance_by_key(&self, key: InstanceKey) -> Option<&WorldInstance> {
        self.instances.get(key)
    }

    pub(crate) fn instance_by_key_mut(&mut self, key: InstanceKey) -> Option<&mut WorldInstance> {
        self.instances.get_mut(key)
    }

    pub fn live(&self) -> impl Iterator<Item = (&Identifier, InstanceKey)> {
        self.live.iter().map(|(id, key)| (id, *key))
    }

    pub fn dynamic_instances(&self) -> impl Iterator<Item = &Identifier> {
        self.dynamic.iter()
    }

    pub fn dormant_instances(&self) -> impl Iterator<Item = &Identifier> {
        self.dormant.iter()
    }

    fn defer(&self, env: &HostEnv) -> bool {
        env.ticking_instances || self.tickets.state() == QueueState::Draining
    }

    // === Creation ===

    pub(crate) fn create(
        &mut self,
        env: &mut HostEnv,
        identifier: Identifier,
        generator: GeneratorConfig,
        instance_type: InstanceType,
        delete_existing_data: bool,
    ) -> Result<InstanceHandle, LifecycleError> {
        self.admit(env, identifier, generator, instance_type, Some(delete_existing_data))
    }

    pub(crate) fn load(
        &mut self,
        env: &mut HostEnv,
        identifier: Identifier,
        generator: GeneratorConfig,
        instance_type: InstanceType,
    ) -> Result<InstanceHandle, LifecycleError> {
        self.admit(env, identifier, generator, instance_type, None)
    }

    pub(crate) fn create_with_random_id(
        &mut self,
        env: &mut HostEnv,
        generator: GeneratorConfig,
        instance_type: InstanceType,
    ) -> Result<InstanceHandle, LifecycleError> {
        let identifier = loop {
            let path = format!("{:016x}", self.rng.random::<u64>());
            match Identifier::new(DYNAMIC_NAMESPACE, &path) {
                Ok(candidate) if self.can_create(env, &candidate) => break candidate,
                _ => continue,
            }
        };
        self.create(env, identifier, generator, instance_type, true)
    }

    /// Shared path of `create` (`purge` is `Some`) and `load` (`None`).
    fn admit(
        &mut self,
        env: &mut HostEnv,
        identifier: Identifier,
        generator: GeneratorConfig,
        instance_type: InstanceType,
        purge: Option<bool>,
    ) -> Result<InstanceHandle, LifecycleError> {
        let action = if purge.is_some() { "create" } else { "load" };
        if !self.config.allow_creation {
            return Err(LifecycleError::CreationDisabled);
        }
        let reclaim = purge.is_none()
            && self.is_dormant(&identifier)
            && !self.tickets.is_pending_creation(&identifier);
        if !reclaim && !self.can_create(env, &identifier) {
            return Err(LifecycleError::AlreadyExists(identifier));
        }

        let encoding_failed = |source| LifecycleError::EncodingFailed {
            identifier: identifier.clone(),
            source,
        };
        let encoded_type = codec::to_bytes(&instance_type).map_err(encoding_failed)?;
        codec::encode(&generator).map_err(encoding_failed)?;

        if reclaim {
            self.release_entries(env, &identifier);
            self.dormant.remove(&identifier);
            env.observers.broadcast(&SyncMessage::RemoveInstance {
                identifier: identifier.clone(),
            });
        }

        let type_id = env
            .types
            .unseal()
            .insert(identifier.clone(), instance_type.clone())?;
        let stem = InstanceStem {
            instance_type: identifier.clone(),
            generator: generator.clone(),
        };
        if let Err(e) = env.stems.unseal().insert(identifier.clone(), stem) {
            let _ = env.types.unseal().remove(&identifier);
            return Err(e.into());
        }

        if purge == Some(true) {
            if let Err(source) = env.storage.purge(&identifier) {
                self.release_entries(env, &identifier);
                return Err(LifecycleError::FilesystemFailure { identifier, source });
            }
        }

        let mut instance = WorldInstance::new(
            identifier.clone(),
            identifier.clone(),
            generator.clone(),
            env.storage.instance_dir(&identifier),
        );
        if let Some(primary) = self.instances.get(self.primary.key) {
            instance.inherit_from(primary);
            instance.spawn = primary.spawn;
        }
        match instance.restore() {
            Ok(true) => {
                tracing::debug!(target: "lifecycle", identifier = %identifier, "reusing existing instance data")
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(target: "lifecycle", identifier = %identifier, error = %e, "ignoring unreadable instance data")
            }
        }
        let key = self
            .instances
            .insert_with_key(|key| WorldInstance { key, ..instance });
        if let Some(primary) = self.instances.get_mut(self.primary.key) {
            primary.border_listeners.push(key);
        }
        self.dynamic.insert(identifier.clone());

        let deferred = self.defer(env);
        if deferred {
            self.tickets.enqueue_create(CreateTicket {
                identifier: identifier.clone(),
                instance: key,
                enqueued_at: env.tick,
            });
        } else {
            self.register(env, key);
        }

        env.level_data.ledger_mut().record(
            identifier.clone(),
            LedgerEntry {
                generator,
                instance_type,
            },
        );

        let groups = derive_groups(&env.types);
        env.types.unseal().bind_groups(&groups);
        env.observers.broadcast(&SyncMessage::CreateInstance {
            identifier: identifier.clone(),
            numeric_type_id: type_id as i32,
            encoded_type_metadata: encoded_type,
        });
        env.observers.broadcast(&SyncMessage::GroupsChanged {
            groups: env.types.groups().clone(),
        });

        tracing::info!(
            target: "lifecycle",
            tick = env.tick,
            identifier = identifier.to_string().as_str(),
            action = action,
            deferred = deferred,
        );
        Ok(InstanceHandle { identifier, key })
    }

    /// Bind a constructed instance into the live set and warm it up.
    fn register(&mut self, env: &mut HostEnv, key: InstanceKey) {
        let Some(instance) = self.instances.get_mut(key) else {
            tracing::warn!(target: "lifecycle", "create ticket for a vanished instance");
            return;
        };
        if instance.life_state == LifeState::Pending {
            instance.life_state = LifeState::Running;
        }
        instance.tick(env.tick);
        let identifier = instance.identifier.clone();
        self.live.insert(identifier.clone(), key);
        self.emit(InstanceEvent::Added(InstanceHandle { identifier, key }));
    }

    /// Drop the stem then the type entry of `identifier`.
    fn release_entries(&mut self, env: &mut HostEnv, identifier: &Identifier) {
        let _ = env.stems.unseal().remove(identifier);
        let _ = env.types.unseal().remove(identifier);
    }

    // === Removal ===

    pub(crate) fn remove(
        &mut self,
        env: &mut HostEnv,
        identifier: Identifier,
        mode: DeletionMode,
        eviction: Box<dyn EvictionPolicy>,
    ) -> Result<InstanceHandle, LifecycleError> {
        if !self.can_delete(&identifier) {
            return Err(LifecycleError::NotDeletable(identifier));
        }
        if self.is_dormant(&identifier) {
            return Ok(self.release_dormant(env, identifier, mode));
        }
        let Some(key) = self.key_of(&identifier) else {
            return Err(LifecycleError::NotDeletable(identifier));
        };
        self.check_eviction_allowed(env, &identifier, key)?;

        let prior = self
            .instances
            .get(key)
            .map(|i| i.life_state)
            .unwrap_or(LifeState::Running);
        if let Some(instance) = self.instances.get_mut(key) {
            instance.life_state = LifeState::PendingRemoval;
        }
        let handle = InstanceHandle {
            identifier: identifier.clone(),
            key,
        };
        let ticket = RemovalTicket {
            identifier,
            mode,
            eviction,
            enqueued_at: env.tick,
        };

        // A removal never overtakes the create it follows.
        if self.defer(env) || self.tickets.is_pending_creation(&handle.identifier) {
            self.tickets.enqueue_removal(ticket);
        } else if let Err(e) = self.apply_removal(env, ticket) {
            if let Some(instance) = self.instances.get_mut(key) {
                instance.life_state = prior;
            }
            return Err(e);
        }
        Ok(handle)
    }

    fn apply_removal(&mut self, env: &mut HostEnv, ticket: RemovalTicket) -> Result<(), LifecycleError> {
        let RemovalTicket {
            identifier,
            mode,
            eviction,
            ..
        } = ticket;
        let Some(key) = self.live.get(&identifier).copied() else {
            tracing::warn!(target: "lifecycle", identifier = %identifier, "removal of an instance that is not live");
            return Err(LifecycleError::NotDeletable(identifier));
        };
        // Occupants may have entered since the request was ticketed.
        self.check_eviction_allowed(env, &identifier, key)?;

        let staged = self.stage_eviction(env, &identifier, key, eviction.as_ref())?;
        let evicted = staged.len();
        for (id, moved) in staged {
            if let Some(occupant) = env.occupants.get_mut(id) {
                *occupant = moved;
            }
        }

        self.live.remove(&identifier);
        let handle = InstanceHandle {
            identifier: identifier.clone(),
            key,
        };
        self.emit(InstanceEvent::Removed(handle));

        if let Some(instance) = self.instances.remove(key) {
            if let Err(e) = instance.save() {
                tracing::warn!(target: "lifecycle", identifier = %identifier, error = %e, "failed to flush instance state");
            }
        }
        self.release_entries(env, &identifier);
        if let Some(primary) = self.instances.get_mut(self.primary.key) {
            primary.border_listeners.retain(|k| *k != key);
        }
        self.dynamic.remove(&identifier);
        env.observers.broadcast(&SyncMessage::RemoveInstance {
            identifier: identifier.clone(),
        });

        if mode == DeletionMode::Delete {
            self.release_data(env, &identifier);
        }

        tracing::info!(
            target: "lifecycle",
            tick = env.tick,
            identifier = identifier.to_string().as_str(),
            action = mode.as_str(),
            evicted = evicted as u64,
        );
        Ok(())
    }

    /// Remove a ledger-replayed entry that was never instantiated. With no
    /// instance or occupants involved it applies immediately; the returned
    /// handle carries a null key.
    fn release_dormant(
        &mut self,
        env: &mut HostEnv,
        identifier: Identifier,
        mode: DeletionMode,
    ) -> InstanceHandle {
        self.release_entries(env, &identifier);
        self.dormant.remove(&identifier);
        env.observers.broadcast(&SyncMessage::RemoveInstance {
            identifier: identifier.clone(),
        });
        if mode == DeletionMode::Delete {
            self.release_data(env, &identifier);
        }
        tracing::info!(
            target: "lifecycle",
            tick = env.tick,
            identifier = identifier.to_string().as_str(),
            action = mode.as_str(),
            dormant = true,
        );
        InstanceHandle {
            identifier,
            key: InstanceKey::default(),
        }
    }

    /// Erase the ledger entry and purge or archive on-disk data. Failures are
    /// logged as leaks and never reverted.
    fn release_data(&self, env: &mut HostEnv, identifier: &Identifier) {
        env.level_data.ledger_mut().erase(identifier);
        let released = if self.config.archive_deleted_data {
            env.storage.archive(identifier)
        } else {
            env.storage.purge(identifier)
        };
        if let Err(e) = released {
            tracing::error!(
                target: "lifecycle",
                identifier = %identifier,
                error = %e,
                path = %env.storage.instance_dir(identifier).display(),
                "instance data leaked on disk"
            );
        }
    }

    fn check_eviction_allowed(
        &self,
        env: &HostEnv,
        identifier: &Identifier,
        key: InstanceKey,
    ) -> Result<(), LifecycleError> {
        let occupants = env.occupants_in(key).count();
        if occupants > 0 && !self.config.evict_occupants {
            tracing::warn!(target: "lifecycle", identifier = %identifier, occupants = occupants as u64, "eviction disabled, removal refused");
            return Err(LifecycleError::OccupantEvictionRefused {
                identifier: identifier.clone(),
                occupants,
            });
        }
        Ok(())
    }

    /// Run the policy on copies of every occupant. Nothing is committed if any
    /// occupant is refused or left inside the instance.
    fn stage_eviction(
        &self,
        env: &HostEnv,
        identifier: &Identifier,
        key: InstanceKey,
        eviction: &dyn EvictionPolicy,
    ) -> Result<Vec<(OccupantId, Occupant)>, LifecycleError> {
        let fallback_spawn = self
            .instances
            .get(self.primary.key)
            .map(|p| p.spawn)
            .unwrap_or(Vec3::ZERO);
        let ctx = EvictionContext {
            removing: identifier,
            removing_key: key,
            fallback: self.primary.key,
            fallback_spawn,
            live: &self.live,
        };
        let inside: Vec<(OccupantId, &Occupant)> = env.occupants_in(key).collect();
        let mut staged = Vec::with_capacity(inside.len());
        for (id, occupant) in &inside {
            let mut moved = (*occupant).clone();
            let outcome = eviction.evict(&mut moved, &ctx);
            if outcome.is_err() || moved.instance == key {
                let reason = outcome.err().map(|r| r.0).unwrap_or_else(|| "occupant left in place".into());
                tracing::warn!(
                    target: "lifecycle",
                    identifier = %identifier,
                    occupant = moved.name.as_str(),
                    reason = reason.as_str(),
                    "eviction refused, removal aborted"
                );
                return Err(LifecycleError::OccupantEvictionRefused {
                    identifier: identifier.clone(),
                    occupants: inside.len(),
                });
            }
            tracing::info!(
                target: "lifecycle",
                tick = env.tick,
                identifier = identifier.to_string().as_str(),
                action = "evict",
                occupant = moved.name.as_str(),
            );
            staged.push((*id, moved));
        }
        Ok(staged)
    }

    // === Tick phases ===

    pub(crate) fn tick_live(&mut self, env: &HostEnv) {
        for key in self.live.values() {
            if let Some(instance) = self.instances.get_mut(*key) {
                instance.tick(env.tick);
            }
        }
    }

    pub(crate) fn save_instances(&self) -> std::io::Result<()> {
        for key in self.live.values() {
            if let Some(instance) = self.instances.get(*key) {
                instance.save()?;
            }
        }
        Ok(())
    }

    fn replay(&mut self, env: &mut HostEnv, identifier: &Identifier, entry: &LedgerEntry) {
        if env.types.contains(identifier) || env.stems.contains(identifier) {
            tracing::warn!(target: "ledger", identifier = %identifier, "ledger entry shadows a registered identifier, skipped");
            return;
        }
        let inserted = env
            .types
            .unseal()
            .insert(identifier.clone(), entry.instance_type.clone());
        if inserted.is_err() {
            return;
        }
        let stem = InstanceStem {
            instance_type: identifier.clone(),
            generator: entry.generator.clone(),
        };
        if env.stems.unseal().insert(identifier.clone(), stem).is_err() {
            let _ = env.types.unseal().remove(identifier);
            return;
        }
        self.dormant.insert(identifier.clone());
    }
}

impl ServerHooks for LifecycleManager {
    fn on_before_tick(&mut self, env: &mut HostEnv) {
        let drained = self.tickets.begin_drain();
        for ticket in drained.creates {
            self.register(env, ticket.instance);
        }
        for ticket in drained.removals {
            let identifier = ticket.identifier.clone();
            if let Err(e) = self.apply_removal(env, ticket) {
                if let Some(instance) = self
                    .live
                    .get(&identifier)
                    .and_then(|key| self.instances.get_mut(*key))
                {
                    instance.life_state = LifeState::Running;
                }
                tracing::warn!(target: "lifecycle", identifier = %identifier, error = %e, "queued removal failed");
            }
        }
        self.tickets.finish_drain();
    }

    fn on_after_children_tick(&mut self, env: &mut HostEnv) {
        let pruned = env.observers.prune();
        if pruned > 0 {
            tracing::debug!(target: "sync", pruned = pruned as u64, "pruned disconnected observers");
        }
    }

    fn on_level_data_constructed(&mut self, env: &mut HostEnv, ledger: Ledger) {
        env.level_data.attach(ledger);
        let entries: Vec<(Identifier, LedgerEntry)> = env
            .level_data
            .ledger()
            .iter()
            .map(|(id, entry)| (id.clone(), entry.clone()))
            .collect();
        for (identifier, entry) in &entries {
            self.replay(env, identifier, entry);
        }
        let groups = derive_groups(&env.types);
        env.types.unseal().bind_groups(&groups);
        tracing::info!(target: "ledger", replayed = self.dormant.len() as u64, "ledger attached");
    }
}

// ============================================================================
// Lifecycle - Borrowed view used by request handlers
// ============================================================================

pub struct Lifecycle<'a> {
    pub(crate) manager: &'a mut LifecycleManager,
    pub(crate) env: &'a mut HostEnv,
}

impl Lifecycle<'_> {
    pub fn create(
        &mut self,
        identifier: Identifier,
        generator: GeneratorConfig,
        instance_type: InstanceType,
        delete_existing_data: bool,
    ) -> Result<InstanceHandle, LifecycleError> {
        self.manager
            .create(self.env, identifier, generator, instance_type, delete_existing_data)
    }

    pub fn load(
        &mut self,
        identifier: Identifier,
        generator: GeneratorConfig,
        instance_type: InstanceType,
    ) -> Result<InstanceHandle, LifecycleError> {
        self.manager.load(self.env, identifier, generator, instance_type)
    }

    pub fn create_with_random_id(
        &mut self,
        generator: GeneratorConfig,
        instance_type: InstanceType,
    ) -> Result<InstanceHandle, LifecycleError> {
        self.manager
            .create_with_random_id(self.env, generator, instance_type)
    }

    pub fn unload(
        &mut self,
        identifier: Identifier,
        eviction: impl EvictionPolicy + 'static,
    ) -> Result<InstanceHandle, LifecycleError> {
        self.manager
            .remove(self.env, identifier, DeletionMode::Unload, Box::new(eviction))
    }

    pub fn delete(
        &mut self,
        identifier: Identifier,
        eviction: impl EvictionPolicy + 'static,
    ) -> Result<InstanceHandle, LifecycleError> {
        self.manager
            .remove(self.env, identifier, DeletionMode::Delete, Box::new(eviction))
    }

    pub fn unload_default(&mut self, identifier: Identifier) -> Result<InstanceHandle, LifecycleError> {
        self.unload(identifier, DefaultEviction)
    }

    pub fn delete_default(&mut self, identifier: Identifier) -> Result<InstanceHandle, LifecycleError> {
        self.delete(identifier, DefaultEviction)
    }

    pub fn exists(&self, identifier: &Identifier) -> bool {
        self.manager.exists(identifier)
    }

    pub fn is_dynamic(&self, identifier: &Identifier) -> bool {
        self.manager.is_dynamic(identifier)
    }

    pub fn is_dormant(&self, identifier: &Identifier) -> bool {
        self.manager.is_dormant(identifier)
    }

    pub fn can_create(&self, identifier: &Identifier) -> bool {
        self.manager.can_create(&*self.env, identifier)
    }

    pub fn can_load(&self, identifier: &Identifier) -> bool {
        self.manager.can_load(&*self.env, identifier)
    }

    pub fn can_delete(&self, identifier: &Identifier) -> bool {
        self.manager.can_delete(identifier)
    }

    pub fn handle(&self, identifier: &Identifier) -> Option<InstanceHandle> {
        self.manager.handle(identifier)
    }

    pub fn instance(&self, identifier: &Identifier) -> Option<&WorldInstance> {
        self.manager.instance(identifier)
    }

    pub fn dynamic_instances(&self) -> Vec<Identifier> {
        self.manager.dynamic_instances().cloned().collect()
    }
}
