use std::collections::BTreeSet;

use dynworld_core::{
    GeneratorConfig, GroupDefinitions, Identifier, InstanceType, LifecycleConfig, Registry,
    RegistryError, Server, Stability,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

fn id(s: &str) -> Identifier {
    Identifier::parse(s).unwrap()
}

fn name(n: u32) -> Identifier {
    Identifier::new("zones", &format!("z{n}")).unwrap()
}

#[test]
fn invariant_random_insert_remove_keeps_ids_dense() {
    for seed in 0..20u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut registry: Registry<u32> = Registry::new("random");
        registry.seal();
        let mut present: BTreeSet<u32> = BTreeSet::new();

        for step in 0..300 {
            let n = rng.random_range(0..40u32);
            let mut guard = registry.unseal();
            if present.contains(&n) {
                guard.remove(&name(n)).unwrap();
                present.remove(&n);
            } else {
                let stability = if rng.random_range(0..10) == 0 {
                    Stability::Experimental
                } else {
                    Stability::Stable
                };
                let numeric = guard.insert_with_stability(name(n), n, stability).unwrap();
                assert_eq!(numeric as usize, present.len(), "seed {seed} step {step}");
                present.insert(n);
            }
            drop(guard);

            assert!(registry.is_sealed());
            assert_eq!(registry.len(), present.len());
            if let Err(violation) = registry.check_invariants() {
                panic!("seed {seed} step {step}: {violation}");
            }
            for (numeric, identifier, value) in registry.iter() {
                assert_eq!(registry.id_of(identifier), Some(numeric));
                assert_eq!(registry.identifier_of_value(value), Some(identifier));
                assert_eq!(registry.get_by_id(numeric), registry.get(identifier));
            }
        }
    }
}

#[test]
fn invariant_failed_mutations_change_nothing() {
    let mut registry: Registry<u32> = Registry::new("failures").with_default_key(id("base"));
    registry.with_unsealed(|r| {
        r.insert(id("base"), 0).unwrap();
        r.insert(id("a"), 1).unwrap();
    });
    let snapshot: Vec<(u32, Identifier)> = registry.iter().map(|(n, i, _)| (n, i.clone())).collect();

    let mut guard = registry.unseal();
    assert!(matches!(guard.insert(id("a"), 9), Err(RegistryError::DuplicateIdentifier { .. })));
    assert!(matches!(guard.insert_at_exact(0, id("x"), 9), Err(RegistryError::IdCollision { .. })));
    assert!(matches!(guard.insert_at_exact(5, id("x"), 9), Err(RegistryError::IdOutOfRange { .. })));
    assert!(matches!(guard.remove(&id("x")), Err(RegistryError::UnknownIdentifier { .. })));
    assert!(matches!(guard.remove(&id("base")), Err(RegistryError::DefaultEntry { .. })));
    drop(guard);

    let after: Vec<(u32, Identifier)> = registry.iter().map(|(n, i, _)| (n, i.clone())).collect();
    assert_eq!(after, snapshot);
    registry.check_invariants().unwrap();
}

#[test]
fn invariant_groups_never_reference_removed_entries() {
    let mut registry: Registry<u32> = Registry::new("groups");
    registry.with_unsealed(|r| {
        for n in 0..6 {
            r.insert(name(n), n).unwrap();
        }
    });
    let mut groups = GroupDefinitions::new();
    groups.insert(id("tags/even"), (0..6).step_by(2).map(name).collect());
    groups.insert(id("tags/odd"), (1..6).step_by(2).map(name).collect());
    registry.unseal().bind_groups(&groups);

    for n in [0, 3, 4] {
        registry.unseal().remove(&name(n)).unwrap();
        registry.check_invariants().unwrap();
    }
    assert_eq!(registry.group(&id("tags/even")), &[name(2)]);
    assert_eq!(registry.group(&id("tags/odd")), &[name(1), name(5)]);
}

#[test]
fn invariant_server_registries_stay_consistent_through_lifecycle() {
    let dir = TempDir::new().unwrap();
    let config = LifecycleConfig {
        id_seed: Some(99),
        ..LifecycleConfig::default()
    };
    let mut server = Server::new(config, dir.path());
    let mut rng = StdRng::seed_from_u64(5);

    for round in 0..60 {
        let n = rng.random_range(0..8u32);
        let identifier = name(n);
        let ticking = rng.random_bool(0.5);
        server.run_tick_with(|s| {
            let mut lifecycle = s.lifecycle();
            if lifecycle.can_delete(&identifier) {
                lifecycle.delete_default(identifier.clone()).unwrap();
            } else if lifecycle.can_create(&identifier) && ticking {
                lifecycle
                    .create(identifier.clone(), GeneratorConfig::flat(), InstanceType::surface(), true)
                    .unwrap();
            }
        });
        if !ticking && server.lifecycle().can_create(&identifier) {
            server
                .lifecycle()
                .create(identifier.clone(), GeneratorConfig::flat(), InstanceType::surface(), true)
                .unwrap();
        }

        server.types().check_invariants().unwrap_or_else(|v| panic!("round {round}: {v}"));
        server.stems().check_invariants().unwrap_or_else(|v| panic!("round {round}: {v}"));
        assert_eq!(server.types().len(), server.stems().len());
        for (_, identifier, stem) in server.stems().iter() {
            assert_eq!(&stem.instance_type, identifier);
            assert!(server.types().contains(identifier));
        }
    }

    server.run_tick();
    let dynamic: Vec<Identifier> = server.lifecycle().dynamic_instances();
    let ledger: Vec<Identifier> = server.ledger().iter().map(|(i, _)| i.clone()).collect();
    assert_eq!(dynamic, ledger);
}
