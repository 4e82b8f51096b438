use std::sync::Arc;
use std::time::Duration;

use kvload_core::config::{KeyStoreConfig, LoadConfig};
use kvload_core::keystore::{HierarchicalKeyStore, StoredValue, entry_path};
use kvload_core::{Error, KeyStore, LoadDriver, OperationKind};
use kvload_test::service::MockService;
use serde_json::json;

fn config(strategy: serde_json::Value, key_store: KeyStoreConfig) -> LoadConfig {
    let mut config = LoadConfig::default();
    config.run.threads = 3;
    config.sampler.interval = Duration::from_millis(50);
    config.key_store = key_store;
    config.strategy = serde_json::from_value(strategy).unwrap();
    config
}

#[test]
fn replays_keys_from_a_hierarchical_store() {
    kvload_test::tracing::init();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keys");

    let writes = config(
        json!({ "name": "write-only", "options": { "max-operations": 12, "value-size": 8 } }),
        KeyStoreConfig::Hierarchical {
            path: path.clone(),
            overwrite: false,
            store_values: true,
        },
    );
    let writer = Arc::new(MockService::new());
    LoadDriver::new(writes)
        .with_service(writer.clone())
        .run()
        .unwrap();

    let written = writer.keys(OperationKind::Write);
    let store = HierarchicalKeyStore::new(&path);
    assert_eq!(store.keys().unwrap(), written);

    let key = written.first().unwrap();
    assert!(path.join(entry_path(key)).is_file());
    match store.retrieve(key).unwrap() {
        Some(StoredValue::Bytes(value)) => assert_eq!(value.len(), 8),
        other => panic!("unexpected stored value {other:?}"),
    }

    // The second run reads every stored key exactly once.
    let reads = config(
        json!({ "name": "read-only" }),
        KeyStoreConfig::Hierarchical {
            path: path.clone(),
            overwrite: true,
            store_values: false,
        },
    );
    let reader = Arc::new(MockService::new());
    let summary = LoadDriver::new(reads)
        .with_service(reader.clone())
        .run()
        .unwrap();

    assert_eq!(summary.operations()[&OperationKind::Read].successes, 12);
    assert_eq!(reader.keys(OperationKind::Read), written);
}

#[test]
fn existing_directory_requires_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(
        json!({ "name": "write-only", "options": { "max-operations": 1 } }),
        KeyStoreConfig::Hierarchical {
            path: dir.path().to_owned(),
            overwrite: false,
            store_values: false,
        },
    );

    let service = Arc::new(MockService::new());
    let error = LoadDriver::new(config)
        .with_service(service.clone())
        .run()
        .unwrap_err();

    assert!(error.to_string().contains("overwrite"), "{error}");
    assert_eq!(service.calls(), 0);
}

#[test]
fn writes_csv_output() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("samples.csv");

    let mut config = config(
        json!({ "name": "write-only", "options": { "max-operations": 10 } }),
        KeyStoreConfig::None,
    );
    config.sampler.output = Some(output.clone());

    LoadDriver::new(config).run().unwrap();

    let mut reader = csv::Reader::from_path(&output).unwrap();
    let header = reader.headers().unwrap().clone();
    assert_eq!(&header[0], "Timestamp");
    assert_eq!(header.iter().last(), Some("Comment"));
    assert!(header.iter().any(|column| column == "Failed: panic"));

    let rows = reader.records().collect::<Result<Vec<_>, _>>().unwrap();
    assert!(!rows.is_empty());
}

#[test]
fn service_failure_types_get_their_own_column() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("samples.csv");

    let mut config = config(
        json!({ "name": "write-only", "options": { "max-operations": 12 } }),
        KeyStoreConfig::None,
    );
    config.sampler.output = Some(output.clone());
    let service = Arc::new(MockService::new().failing_every(4).failing_as("throttled"));

    let summary = LoadDriver::new(config)
        .with_service(service)
        .run()
        .unwrap();
    assert_eq!(summary.failures()["throttled"], 3);
    assert_eq!(summary.successes(), 9);

    let mut reader = csv::Reader::from_path(&output).unwrap();
    let header = reader.headers().unwrap().clone();
    let column = header
        .iter()
        .position(|name| name == "Failed: throttled")
        .unwrap();
    let other = header.iter().position(|name| name == "Failed: other").unwrap();

    let mut throttled = 0;
    for row in reader.records() {
        let row = row.unwrap();
        throttled += row[column].parse::<u64>().unwrap();
        assert_eq!(&row[other], "0");
    }
    assert_eq!(throttled, 3);
}

#[test]
fn unknown_strategy_is_a_user_error() {
    let config = config(json!({ "name": "read-modify-write" }), KeyStoreConfig::None);
    let error = LoadDriver::new(config).run().unwrap_err();
    assert!(matches!(error, Error::UnknownStrategy(_)));
    assert!(error.is_user_error());
}
