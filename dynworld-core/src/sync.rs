//! Create/remove notifications for connected observers.
//!
//! The host side broadcasts [`SyncMessage`]s through an [`ObserverHub`].
//! Observers feed the bytes they receive into a [`RegistryMirror`], which
//! replays the same registry mutations so numeric ids stay identical on
//! both ends. Delivery is fire-and-forget; an observer that misses a
//! message is resynchronized by the host's connect handshake, not here.

use std::collections::BTreeSet;
use std::sync::mpsc::Sender;

use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

use crate::codec::{self, InstanceType};
use crate::error::CodecError;
use crate::registry::{GroupDefinitions, Registry};
use crate::types::{Identifier, ObserverId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncMessage {
    CreateInstance {
        identifier: Identifier,
        numeric_type_id: i32,
        encoded_type_metadata: Vec<u8>,
    },
    RemoveInstance {
        identifier: Identifier,
    },
    GroupsChanged {
        groups: GroupDefinitions,
    },
}

impl SyncMessage {
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn kind(&self) -> &'static str {
        match self {
            SyncMessage::CreateInstance { .. } => "create_instance",
            SyncMessage::RemoveInstance { .. } => "remove_instance",
            SyncMessage::GroupsChanged { .. } => "groups_changed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("observer disconnected")]
pub struct Disconnected;

/// Transport to a single observer.
pub trait Observer {
    fn deliver(&mut self, payload: &[u8]) -> Result<(), Disconnected>;
}

/// Observer backed by an in-process channel. Dropping the receiver disconnects it.
pub struct ChannelObserver(pub Sender<Vec<u8>>);

impl Observer for ChannelObserver {
    fn deliver(&mut self, payload: &[u8]) -> Result<(), Disconnected> {
        self.0.send(payload.to_vec()).map_err(|_| Disconnected)
    }
}

struct Connection {
    observer: Box<dyn Observer>,
    connected: bool,
}

#[derive(Default)]
pub struct ObserverHub {
    connections: SlotMap<ObserverId, Connection>,
}

impl ObserverHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&mut self, observer: impl Observer + 'static) -> ObserverId {
        self.connections.insert(Connection {
            observer: Box::new(observer),
            connected: true,
        })
    }

    pub fn disconnect(&mut self, id: ObserverId) -> bool {
        self.connections.remove(id).is_some()
    }

    pub fn is_connected(&self, id: ObserverId) -> bool {
        self.connections.get(id).is_some_and(|c| c.connected)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Send `message` to every connected observer. Returns the delivery count.
    pub fn broadcast(&mut self, message: &SyncMessage) -> usize {
        let payload = match message.to_bytes() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(target: "sync", kind = message.kind(), error = %e, "failed to encode sync message");
                return 0;
            }
        };
        let mut delivered = 0;
        for (id, connection) in self.connections.iter_mut().filter(|(_, c)| c.connected) {
            match connection.observer.deliver(&payload) {
                Ok(()) => delivered += 1,
                Err(Disconnected) => {
                    tracing::debug!(target: "sync", observer = ?id, "observer dropped during broadcast");
                    connection.connected = false;
                }
            }
        }
        tracing::info!(target: "sync", kind = message.kind(), delivered = delivered as u64);
        delivered
    }

    /// Forget observers that failed a delivery. Returns how many were removed.
    pub fn prune(&mut self) -> usize {
        let before = self.connections.len();
        self.connections.retain(|_, c| c.connected);
        before - self.connections.len()
    }
}

// ============================================================================
// RegistryMirror - Observer-side replica of the type registry
// ============================================================================

pub struct RegistryMirror {
    types: Registry<InstanceType>,
    known: BTreeSet<Identifier>,
}

impl RegistryMirror {
    /// Start from the observer's copy of the host's bootstrap types.
    pub fn new(types: Registry<InstanceType>) -> Self {
        Self {
            types,
            known: BTreeSet::new(),
        }
    }

    pub fn types(&self) -> &Registry<InstanceType> {
        &self.types
    }

    pub fn knows(&self, identifier: &Identifier) -> bool {
        self.known.contains(identifier)
    }

    pub fn known_instances(&self) -> impl Iterator<Item = &Identifier> {
        self.known.iter()
    }

    /// Apply one received payload. Failures are logged and dropped.
    pub fn apply(&mut self, payload: &[u8]) {
        let message = match SyncMessage::from_bytes(payload) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(target: "sync", error = %e, "undecodable sync payload");
                return;
            }
        };
        match message {
            SyncMessage::CreateInstance {
                identifier,
                numeric_type_id,
                encoded_type_metadata,
            } => {
                let Ok(numeric_id) = u32::try_from(numeric_type_id) else {
                    tracing::warn!(target: "sync", identifier = %identifier, numeric_type_id, "negative numeric id");
                    return;
                };
                let metadata = match codec::from_bytes::<InstanceType>(&encoded_type_metadata) {
                    Ok(metadata) => metadata,
                    Err(e) => {
                        tracing::warn!(target: "sync", identifier = %identifier, error = %e, "bad type metadata");
                        return;
                    }
                };
                let inserted =
                    self.types
                        .unseal()
                        .insert_at_exact(numeric_id, identifier.clone(), metadata);
                if inserted.is_ok() {
                    self.known.insert(identifier);
                }
            }
            SyncMessage::RemoveInstance { identifier } => {
                let _ = self.types.unseal().remove(&identifier);
                self.known.remove(&identifier);
            }
            SyncMessage::GroupsChanged { groups } => {
                self.types.unseal().bind_groups(&groups);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn id(s: &str) -> Identifier {
        Identifier::parse(s).unwrap()
    }

    fn create(name: &str, numeric_type_id: i32) -> SyncMessage {
        SyncMessage::CreateInstance {
            identifier: id(name),
            numeric_type_id,
            encoded_type_metadata: codec::to_bytes(&InstanceType::surface()).unwrap(),
        }
    }

    #[test]
    fn broadcast_marks_dropped_observers() {
        let mut hub = ObserverHub::new();
        let (tx_a, rx_a) = mpsc::channel();
        let (tx_b, rx_b) = mpsc::channel();
        let a = hub.connect(ChannelObserver(tx_a));
        let b = hub.connect(ChannelObserver(tx_b));
        drop(rx_b);

        let delivered = hub.broadcast(&SyncMessage::RemoveInstance { identifier: id("x") });
        assert_eq!(delivered, 1);
        assert!(hub.is_connected(a));
        assert!(!hub.is_connected(b));
        assert_eq!(rx_a.try_iter().count(), 1);

        assert_eq!(hub.prune(), 1);
        assert_eq!(hub.len(), 1);
    }

    #[test]
    fn mirror_follows_host_ids() {
        let mut mirror = RegistryMirror::new(Registry::new("types"));
        mirror.apply(&create("zones:a", 0).to_bytes().unwrap());
        mirror.apply(&create("zones:b", 1).to_bytes().unwrap());
        assert_eq!(mirror.types().id_of(&id("zones:b")), Some(1));

        mirror.apply(&SyncMessage::RemoveInstance { identifier: id("zones:a") }.to_bytes().unwrap());
        assert_eq!(mirror.types().id_of(&id("zones:b")), Some(0));
        assert!(!mirror.knows(&id("zones:a")));
        assert!(mirror.knows(&id("zones:b")));
    }

    #[test]
    fn mirror_ignores_bad_payloads() {
        let mut mirror = RegistryMirror::new(Registry::new("types"));
        mirror.apply(b"not json");
        mirror.apply(&create("zones:a", 5).to_bytes().unwrap());
        mirror.apply(&create("zones:b", -1).to_bytes().unwrap());
        assert!(mirror.types().is_empty());
        mirror.types().check_invariants().unwrap();
    }

    #[test]
    fn mirror_binds_groups() {
        let mut mirror = RegistryMirror::new(Registry::new("types"));
        mirror.apply(&create("zones:a", 0).to_bytes().unwrap());
        let mut groups = GroupDefinitions::new();
        groups.insert(id("host:natural"), vec![id("zones:a"), id("zones:gone")]);
        mirror.apply(&SyncMessage::GroupsChanged { groups }.to_bytes().unwrap());
        assert_eq!(mirror.types().group(&id("host:natural")), &[id("zones:a")]);
    }
}
