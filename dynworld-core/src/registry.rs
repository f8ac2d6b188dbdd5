//! Identifier-indexed registries with dense numeric ids.
//!
//! Registries are sealed after bootstrap. Runtime mutation goes through an
//! [`Unsealed`] guard, which restores the previous sealed state when it is
//! dropped. Every mutation either completes fully or leaves the registry
//! untouched.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::error::RegistryError;
use crate::types::{Identifier, Stability};

/// Group (tag) definitions: group name to member identifiers.
pub type GroupDefinitions = BTreeMap<Identifier, Vec<Identifier>>;

#[derive(Debug)]
struct Entry<V> {
    identifier: Identifier,
    value: Arc<V>,
    stability: Stability,
}

#[derive(Debug)]
pub struct Registry<V> {
    name: &'static str,
    /// Position is the numeric id.
    entries: Vec<Entry<V>>,
    by_identifier: HashMap<Identifier, u32>,
    /// Keyed by the address of the owned `Arc` allocation.
    reverse: HashMap<usize, Identifier>,
    groups: GroupDefinitions,
    stability: Stability,
    default_key: Option<Identifier>,
    sealed: bool,
}

fn address<V>(value: &Arc<V>) -> usize {
    Arc::as_ptr(value) as *const () as usize
}

impl<V> Registry<V> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: Vec::new(),
            by_identifier: HashMap::new(),
            reverse: HashMap::new(),
            groups: BTreeMap::new(),
            stability: Stability::Stable,
            default_key: None,
            sealed: false,
        }
    }

    /// Mark `identifier` as the entry that can never be removed.
    pub fn with_default_key(mut self, identifier: Identifier) -> Self {
        self.default_key = Some(identifier);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Open the registry for mutation until the returned guard is dropped.
    pub fn unseal(&mut self) -> Unsealed<'_, V> {
        let was_sealed = self.sealed;
        self.sealed = false;
        Unsealed {
            registry: self,
            was_sealed,
        }
    }

    pub fn with_unsealed<R>(&mut self, body: impl FnOnce(&mut Unsealed<'_, V>) -> R) -> R {
        let mut guard = self.unseal();
        body(&mut guard)
    }

    // === Reads ===

    pub fn get(&self, identifier: &Identifier) -> Option<&Arc<V>> {
        let id = *self.by_identifier.get(identifier)?;
        self.entries.get(id as usize).map(|e| &e.value)
    }

    pub fn get_by_id(&self, numeric_id: u32) -> Option<&Arc<V>> {
        self.entries.get(numeric_id as usize).map(|e| &e.value)
    }

    pub fn identifier_of(&self, numeric_id: u32) -> Option<&Identifier> {
        self.entries.get(numeric_id as usize).map(|e| &e.identifier)
    }

    pub fn id_of(&self, identifier: &Identifier) -> Option<u32> {
        self.by_identifier.get(identifier).copied()
    }

    /// Numeric id of the exact value allocation held by this registry.
    pub fn id_of_value(&self, value: &Arc<V>) -> Option<u32> {
        self.identifier_of_value(value).and_then(|id| self.id_of(id))
    }

    pub fn identifier_of_value(&self, value: &Arc<V>) -> Option<&Identifier> {
        self.reverse.get(&address(value))
    }

    pub fn contains(&self, identifier: &Identifier) -> bool {
        self.by_identifier.contains_key(identifier)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in numeric id order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Identifier, &Arc<V>)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i as u32, &e.identifier, &e.value))
    }

    pub fn group(&self, name: &Identifier) -> &[Identifier] {
        self.groups.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn groups(&self) -> &GroupDefinitions {
        &self.groups
    }

    pub fn stability(&self) -> Stability {
        self.stability
    }

    /// Verify density, the forward/reverse bijection, group membership and the
    /// cached stability. Returns a description of the first violation.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.by_identifier.len() != self.entries.len() {
            return Err(format!(
                "{}: {} identifiers for {} entries",
                self.name,
                self.by_identifier.len(),
                self.entries.len()
            ));
        }
        if self.reverse.len() != self.entries.len() {
            return Err(format!(
                "{}: {} reverse entries for {} entries",
                self.name,
                self.reverse.len(),
                self.entries.len()
            ));
        }
        for (i, entry) in self.entries.iter().enumerate() {
            if self.by_identifier.get(&entry.identifier) != Some(&(i as u32)) {
                return Err(format!("{}: {} is not at id {i}", self.name, entry.identifier));
            }
            if self.reverse.get(&address(&entry.value)) != Some(&entry.identifier) {
                return Err(format!("{}: reverse lookup of {} broken", self.name, entry.identifier));
            }
        }
        for (group, members) in &self.groups {
            if let Some(missing) = members.iter().find(|m| !self.contains(m)) {
                return Err(format!("{}: group {group} references removed {missing}", self.name));
            }
        }
        let folded = self.fold_stability();
        if folded != self.stability {
            return Err(format!(
                "{}: cached stability {:?} != folded {:?}",
                self.name, self.stability, folded
            ));
        }
        Ok(())
    }

    fn fold_stability(&self) -> Stability {
        self.entries
            .iter()
            .fold(Stability::Stable, |acc, e| acc.fold(e.stability))
    }

    fn push(&mut self, identifier: Identifier, value: V, stability: Stability) -> u32 {
        let numeric_id = self.entries.len() as u32;
        let value = Arc::new(value);
        self.reverse.insert(address(&value), identifier.clone());
        self.by_identifier.insert(identifier.clone(), numeric_id);
        self.entries.push(Entry {
            identifier,
            value,
            stability,
        });
        self.stability = self.stability.fold(stability);
        numeric_id
    }
}

// ============================================================================
// Unsealed - RAII mutation guard
// ============================================================================

pub struct Unsealed<'a, V> {
    registry: &'a mut Registry<V>,
    was_sealed: bool,
}

impl<V> Drop for Unsealed<'_, V> {
    fn drop(&mut self) {
        self.registry.sealed = self.was_sealed;
    }
}

impl<V> std::ops::Deref for Unsealed<'_, V> {
    type Target = Registry<V>;

    fn deref(&self) -> &Registry<V> {
        &*self.registry
    }
}

impl<V> Unsealed<'_, V> {
    /// Append `value` under the next free numeric id. Groups are not touched.
    pub fn insert(&mut self, identifier: Identifier, value: V) -> Result<u32, RegistryError> {
        self.insert_with_stability(identifier, value, Stability::Stable)
    }

    pub fn insert_with_stability(
        &mut self,
        identifier: Identifier,
        value: V,
        stability: Stability,
    ) -> Result<u32, RegistryError> {
        let registry = &mut *self.registry;
        if registry.contains(&identifier) {
            tracing::warn!(target: "registry", registry = registry.name, identifier = %identifier, "duplicate insert rejected");
            return Err(RegistryError::DuplicateIdentifier {
                registry: registry.name,
                identifier,
            });
        }
        let label = identifier.to_string();
        let numeric_id = registry.push(identifier, value, stability);
        tracing::info!(
            target: "registry",
            registry = registry.name,
            action = "insert",
            identifier = label.as_str(),
            numeric_id = numeric_id as u64,
        );
        Ok(numeric_id)
    }

    /// Insert at a numeric id chosen elsewhere (a mirror following its source).
    /// Only the next free id keeps the registry dense, so any other id fails.
    pub fn insert_at_exact(
        &mut self,
        numeric_id: u32,
        identifier: Identifier,
        value: V,
    ) -> Result<u32, RegistryError> {
        let registry = &mut *self.registry;
        let next_id = registry.entries.len() as u32;
        if registry.contains(&identifier) {
            tracing::warn!(target: "registry", registry = registry.name, identifier = %identifier, "duplicate insert rejected");
            return Err(RegistryError::DuplicateIdentifier {
                registry: registry.name,
                identifier,
            });
        }
        if numeric_id < next_id {
            let holder = registry.entries[numeric_id as usize].identifier.clone();
            tracing::warn!(target: "registry", registry = registry.name, numeric_id, holder = %holder, "numeric id collision");
            return Err(RegistryError::IdCollision {
                registry: registry.name,
                numeric_id,
                holder,
            });
        }
        if numeric_id > next_id {
            tracing::warn!(target: "registry", registry = registry.name, numeric_id, next_id, "numeric id out of range");
            return Err(RegistryError::IdOutOfRange {
                registry: registry.name,
                numeric_id,
                next_id,
            });
        }
        let label = identifier.to_string();
        registry.push(identifier, value, Stability::Stable);
        tracing::info!(
            target: "registry",
            registry = registry.name,
            action = "insert_exact",
            identifier = label.as_str(),
            numeric_id = numeric_id as u64,
        );
        Ok(numeric_id)
    }

    /// Remove `identifier`, shifting every later entry down by one id.
    /// Returns the removed value.
    pub fn remove(&mut self, identifier: &Identifier) -> Result<Arc<V>, RegistryError> {
        let registry = &mut *self.registry;
        let Some(numeric_id) = registry.id_of(identifier) else {
            tracing::warn!(target: "registry", registry = registry.name, identifier = %identifier, "remove of unknown identifier");
            return Err(RegistryError::UnknownIdentifier {
                registry: registry.name,
                identifier: identifier.clone(),
            });
        };
        if registry.default_key.as_ref() == Some(identifier) {
            tracing::warn!(target: "registry", registry = registry.name, identifier = %identifier, "default entry cannot be removed");
            return Err(RegistryError::DefaultEntry {
                registry: registry.name,
                identifier: identifier.clone(),
            });
        }

        let entry = registry.entries.remove(numeric_id as usize);
        registry.by_identifier.remove(&entry.identifier);
        registry.reverse.remove(&address(&entry.value));
        for (shifted, later) in registry.entries[numeric_id as usize..].iter().enumerate() {
            registry
                .by_identifier
                .insert(later.identifier.clone(), numeric_id + shifted as u32);
        }
        for members in registry.groups.values_mut() {
            members.retain(|m| m != identifier);
        }
        registry.stability = registry.fold_stability();

        tracing::info!(
            target: "registry",
            registry = registry.name,
            action = "remove",
            identifier = identifier.to_string().as_str(),
            numeric_id = numeric_id as u64,
        );
        Ok(entry.value)
    }

    /// Replace the group bindings. Members that are not registered are skipped.
    pub fn bind_groups(&mut self, definitions: &GroupDefinitions) {
        let registry = &mut *self.registry;
        let mut bound = BTreeMap::new();
        for (group, members) in definitions {
            let known: Vec<Identifier> = members
                .iter()
                .filter(|m| {
                    let known = registry.by_identifier.contains_key(*m);
                    if !known {
                        tracing::debug!(target: "registry", registry = registry.name, group = %group, member = %m, "skipping unknown group member");
                    }
                    known
                })
                .cloned()
                .collect();
            bound.insert(group.clone(), known);
        }
        registry.groups = bound;
    }

    pub fn reset_groups(&mut self) {
        self.registry.groups.clear();
    }
}
