use std::sync::mpsc;

use dynworld_core::{
    ChannelObserver, GeneratorConfig, Identifier, InstanceType, LifecycleConfig, Registry,
    RegistryMirror, Server, SyncMessage,
};
use tempfile::TempDir;

fn id(s: &str) -> Identifier {
    Identifier::parse(s).unwrap()
}

/// Observer-side copy of the host's bootstrap types.
fn bootstrap_mirror(server: &Server) -> RegistryMirror {
    let mut types = Registry::new("instance_type");
    types.with_unsealed(|r| {
        for (_, identifier, ty) in server.types().iter() {
            r.insert(identifier.clone(), ty.as_ref().clone()).unwrap();
        }
    });
    types.seal();
    RegistryMirror::new(types)
}

fn mirror_ids(registry: &Registry<InstanceType>) -> Vec<(u32, Identifier)> {
    registry.iter().map(|(n, i, _)| (n, i.clone())).collect()
}

#[test]
fn mirror_tracks_host_numeric_ids() {
    let dir = TempDir::new().unwrap();
    let mut server = Server::new(LifecycleConfig::default(), dir.path());
    let mut mirror = bootstrap_mirror(&server);
    let (tx, rx) = mpsc::channel();
    server.connect_observer(ChannelObserver(tx));

    let mut lifecycle = server.lifecycle();
    for name in ["zones:a", "zones:b", "zones:c"] {
        lifecycle
            .create(id(name), GeneratorConfig::flat(), InstanceType::surface(), false)
            .unwrap();
    }
    lifecycle.delete_default(id("zones:b")).unwrap();
    lifecycle
        .create(id("zones:d"), GeneratorConfig::flat(), InstanceType::cavern(), false)
        .unwrap();

    for payload in rx.try_iter() {
        mirror.apply(&payload);
    }

    assert_eq!(mirror_ids(mirror.types()), mirror_ids(server.types()));
    assert_eq!(mirror.types().groups(), server.types().groups());
    assert!(mirror.knows(&id("zones:d")));
    assert!(!mirror.knows(&id("zones:b")));
    mirror.types().check_invariants().unwrap();
}

#[test]
fn create_message_carries_type_id_and_metadata() {
    let dir = TempDir::new().unwrap();
    let mut server = Server::new(LifecycleConfig::default(), dir.path());
    let (tx, rx) = mpsc::channel();
    server.connect_observer(ChannelObserver(tx));

    server
        .lifecycle()
        .create(id("zones:a"), GeneratorConfig::flat(), InstanceType::cavern(), false)
        .unwrap();

    let messages: Vec<SyncMessage> = rx
        .try_iter()
        .map(|bytes| SyncMessage::from_bytes(&bytes).unwrap())
        .collect();
    match &messages[0] {
        SyncMessage::CreateInstance {
            identifier,
            numeric_type_id,
            encoded_type_metadata,
        } => {
            assert_eq!(identifier, &id("zones:a"));
            assert_eq!(*numeric_type_id, 2);
            let decoded: InstanceType =
                dynworld_core::codec::from_bytes(encoded_type_metadata).unwrap();
            assert_eq!(decoded, InstanceType::cavern());
        }
        other => panic!("expected create, got {other:?}"),
    }
    assert!(matches!(messages[1], SyncMessage::GroupsChanged { .. }));
}

#[test]
fn dropped_observer_is_pruned_after_children_tick() {
    let dir = TempDir::new().unwrap();
    let mut server = Server::new(LifecycleConfig::default(), dir.path());
    let (tx, rx) = mpsc::channel();
    let observer = server.connect_observer(ChannelObserver(tx));
    drop(rx);

    server
        .lifecycle()
        .create(id("zones:a"), GeneratorConfig::flat(), InstanceType::surface(), false)
        .unwrap();
    assert!(!server.observers().is_connected(observer));
    assert_eq!(server.observers().len(), 1);

    server.run_tick();
    assert!(server.observers().is_empty());
    assert!(server.lifecycle().exists(&id("zones:a")));
}

#[test]
fn queued_removal_is_announced_when_applied() {
    let dir = TempDir::new().unwrap();
    let mut server = Server::new(LifecycleConfig::default(), dir.path());
    server
        .lifecycle()
        .create(id("zones:a"), GeneratorConfig::flat(), InstanceType::surface(), false)
        .unwrap();
    let (tx, rx) = mpsc::channel();
    server.connect_observer(ChannelObserver(tx));

    server.run_tick_with(|s| {
        s.lifecycle().unload_default(id("zones:a")).unwrap();
    });
    assert_eq!(rx.try_iter().count(), 0);

    server.run_tick();
    let messages: Vec<SyncMessage> = rx
        .try_iter()
        .map(|bytes| SyncMessage::from_bytes(&bytes).unwrap())
        .collect();
    assert_eq!(
        messages,
        vec![SyncMessage::RemoveInstance {
            identifier: id("zones:a")
        }]
    );
}
