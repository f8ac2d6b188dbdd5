//! Runtime creation and removal of world instances on a long-running server.
//!
//! Instances are registered into sealed, identifier-indexed registries,
//! scheduled against the tick loop through a ticket queue, recorded in a
//! ledger inside the root save data, and announced to connected observers.

pub mod codec;
pub mod commands;
pub mod config;
pub mod error;
pub mod instance;
pub mod ledger;
pub mod level_data;
pub mod lifecycle;
pub mod registry;
pub mod server;
pub mod sync;
pub mod tick;
pub mod tickets;
pub mod types;

pub use codec::{GeneratorConfig, InstanceType, Persist};
pub use commands::{CommandSource, execute};
pub use config::LifecycleConfig;
pub use error::{
    CodecError, CommandError, ConfigError, IdentifierError, LedgerError, LifecycleError,
    RegistryError, ServerError,
};
pub use instance::{
    DefaultEviction, EvictionContext, EvictionPolicy, EvictionRefused, InstanceStem, Occupant,
    Storage, WorldInstance,
};
pub use ledger::{Ledger, LedgerEntry};
pub use level_data::LevelData;
pub use lifecycle::{InstanceEvent, InstanceHandle, Lifecycle, LifecycleManager};
pub use registry::{GroupDefinitions, Registry, Unsealed};
pub use server::{HostEnv, Server};
pub use sync::{ChannelObserver, Observer, ObserverHub, RegistryMirror, SyncMessage};
pub use tick::ServerHooks;
pub use tickets::{QueueState, TicketQueue};
pub use types::*;

#[cfg(feature = "instrument")]
pub use instrument;
