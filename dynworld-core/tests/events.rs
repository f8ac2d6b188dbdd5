#![cfg(feature = "instrument")]

use dynworld_core::instrument;
use dynworld_core::{GeneratorConfig, Identifier, InstanceType, LifecycleConfig, Server};
use polars::prelude::*;
use tempfile::TempDir;

fn id(s: &str) -> Identifier {
    Identifier::parse(s).unwrap()
}

#[test]
fn lifecycle_actions_are_recorded_per_target() {
    let dir = TempDir::new().unwrap();
    let recorder = instrument::record(|| {
        let mut server = Server::new(LifecycleConfig::default(), dir.path());
        let mut lifecycle = server.lifecycle();
        lifecycle
            .create(id("zones:a"), GeneratorConfig::flat(), InstanceType::surface(), false)
            .unwrap();
        lifecycle
            .create(id("zones:b"), GeneratorConfig::flat(), InstanceType::cavern(), false)
            .unwrap();
        lifecycle.unload_default(id("zones:a")).unwrap();
        server.run_tick_with(|s| {
            s.lifecycle().delete_default(id("zones:b")).unwrap();
        });
        server.run_tick();
    });

    let lifecycle = recorder.table("lifecycle").unwrap();
    assert_eq!(lifecycle.count_eq("action", "create"), 2);
    assert_eq!(lifecycle.count_eq("action", "unload"), 1);
    assert_eq!(lifecycle.count_eq("action", "delete"), 1);
    assert!(recorder.rows("registry") >= 4);
    assert!(recorder.rows("sync") >= 1);
}

#[test]
fn lifecycle_table_converts_to_dataframe() {
    let dir = TempDir::new().unwrap();
    let recorder = instrument::record(|| {
        let mut server = Server::new(LifecycleConfig::default(), dir.path());
        for name in ["zones:a", "zones:b", "zones:c"] {
            server
                .lifecycle()
                .create(id(name), GeneratorConfig::flat(), InstanceType::surface(), false)
                .unwrap();
        }
        server.lifecycle().delete_default(id("zones:b")).unwrap();
    });

    let frames = recorder.to_dataframes();
    let df = frames.get("lifecycle").unwrap();
    let created = df
        .clone()
        .lazy()
        .filter(col("action").eq(lit("create")))
        .collect()
        .unwrap();
    assert_eq!(created.height(), 3);

    let deleted = df
        .clone()
        .lazy()
        .filter(col("action").eq(lit("delete")))
        .select([col("identifier")])
        .collect()
        .unwrap();
    assert_eq!(deleted.height(), 1);
    let identifier = deleted.column("identifier").unwrap().str().unwrap().get(0);
    assert_eq!(identifier, Some("zones:b"));
}

#[test]
fn refused_requests_log_nothing_in_lifecycle() {
    let dir = TempDir::new().unwrap();
    let recorder = instrument::record(|| {
        let mut server = Server::new(LifecycleConfig::default(), dir.path());
        let _ = server.lifecycle().delete_default(id("zones:missing"));
    });
    assert_eq!(recorder.rows("lifecycle"), 0);
}

#[test]
fn leaked_delete_is_logged_as_error() {
    let dir = TempDir::new().unwrap();
    let recorder = instrument::record(|| {
        let mut server = Server::new(LifecycleConfig::default(), dir.path());
        server
            .lifecycle()
            .create(id("zones:a"), GeneratorConfig::flat(), InstanceType::surface(), false)
            .unwrap();
        std::fs::create_dir_all(dir.path().join("instances")).unwrap();
        std::fs::write(dir.path().join("instances/zones"), b"").unwrap();
        server.lifecycle().delete_default(id("zones:a")).unwrap();
    });

    let lifecycle = recorder.table("lifecycle").unwrap();
    assert_eq!(lifecycle.count_eq(instrument::LEVEL_COLUMN, "ERROR"), 1);
    assert_eq!(lifecycle.count_eq("action", "delete"), 1);
}
