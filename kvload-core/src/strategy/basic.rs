use super::{GenerateContext, Generator, Options};
use crate::error::Result;
use crate::keys::KeySource;
use crate::operation::{Operation, OperationKind};

/// Writes a fresh value under every key of its provider.
#[derive(Debug)]
pub(super) struct WriteOnly;

impl WriteOnly {
    pub const NAME: &'static str = "write-only";
}

impl Generator for WriteOnly {
    fn operation_kinds(&self) -> &'static [OperationKind] {
        &[OperationKind::Write]
    }

    fn configure(&mut self, _options: &mut Options) -> Result<()> {
        Ok(())
    }

    fn generate(&self, cx: &GenerateContext<'_>) -> Result<Option<Operation>> {
        if cx.shutting_down {
            return Ok(None);
        }
        Ok(cx.next_key()?.map(|key| Operation::write(key, cx.value())))
    }
}

/// Reads every key of its provider, by default the keys of the key store.
#[derive(Debug)]
pub(super) struct ReadOnly;

impl ReadOnly {
    pub const NAME: &'static str = "read-only";
}

impl Generator for ReadOnly {
    fn operation_kinds(&self) -> &'static [OperationKind] {
        &[OperationKind::Read]
    }

    fn default_keys(&self) -> Option<KeySource> {
        Some(KeySource::Stored)
    }

    fn configure(&mut self, _options: &mut Options) -> Result<()> {
        Ok(())
    }

    fn generate(&self, cx: &GenerateContext<'_>) -> Result<Option<Operation>> {
        if cx.shutting_down {
            return Ok(None);
        }
        Ok(cx.next_key()?.map(Operation::read))
    }
}

/// Deletes every key of its provider, by default the keys of the key store.
#[derive(Debug)]
pub(super) struct DeleteOnly;

impl DeleteOnly {
    pub const NAME: &'static str = "delete";
}

impl Generator for DeleteOnly {
    fn operation_kinds(&self) -> &'static [OperationKind] {
        &[OperationKind::Delete]
    }

    fn default_keys(&self) -> Option<KeySource> {
        Some(KeySource::Stored)
    }

    fn configure(&mut self, _options: &mut Options) -> Result<()> {
        Ok(())
    }

    fn generate(&self, cx: &GenerateContext<'_>) -> Result<Option<Operation>> {
        if cx.shutting_down {
            return Ok(None);
        }
        Ok(cx.next_key()?.map(Operation::delete))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::keystore::{KeyStore, MemoryKeyStore, StoredValue};
    use crate::lifecycle::Lifecycle;
    use crate::strategy::{StrategyConfig, from_config};

    #[test]
    fn write_only_stops_on_shutdown() {
        let strategy = crate::strategy::tests::strategy("write-only", json!({})).unwrap();

        let op = strategy.next(None, None, false).unwrap().unwrap();
        assert_eq!(op.kind(), OperationKind::Write);
        assert!(strategy.next(Some(&op), None, true).unwrap().is_none());
    }

    #[test]
    fn read_only_replays_stored_keys() {
        let store = Arc::new(MemoryKeyStore::new());
        store.store("a", &StoredValue::NotStored).unwrap();
        store.store("b", &StoredValue::NotStored).unwrap();
        let store: Arc<dyn KeyStore> = store;

        let config = StrategyConfig {
            name: "read-only".into(),
            options: serde_json::from_value(json!({})).unwrap(),
        };
        let strategy = from_config(&config, Some(&store)).unwrap();
        strategy.start().unwrap();

        let mut keys = Vec::new();
        while let Some(op) = strategy.next(None, None, false).unwrap() {
            assert_eq!(op.kind(), OperationKind::Read);
            keys.push(op.key().to_owned());
        }
        assert_eq!(keys, ["a", "b"]);
    }

    #[test]
    fn delete_without_key_store_is_a_config_error() {
        let err = crate::strategy::tests::strategy("delete", json!({})).unwrap_err();
        assert!(err.is_user_error());
    }

    #[test]
    fn delete_with_sequential_keys() {
        let strategy =
            crate::strategy::tests::strategy("delete", json!({ "keys": "sequential", "key-prefix": "d" }))
                .unwrap();
        let op = strategy.next(None, None, false).unwrap().unwrap();
        assert_eq!(op.kind(), OperationKind::Delete);
        assert_eq!(op.key(), "d0");
    }
}
