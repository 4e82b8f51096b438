use super::{GenerateContext, Generator, Options, options};
use crate::error::Result;
use crate::operation::{Operation, OperationKind};

/// Churns keys: every write is followed by a delete of the same key.
///
/// With `cleanup: true`, a thread whose last operation was a successful write
/// deletes that key once after the run duration expired, so the target is left
/// without the keys this strategy created.
#[derive(Debug, Default)]
pub(super) struct WriteDelete {
    cleanup: bool,
}

impl WriteDelete {
    pub const NAME: &'static str = "write-delete";
}

impl Generator for WriteDelete {
    fn operation_kinds(&self) -> &'static [OperationKind] {
        &[OperationKind::Write, OperationKind::Delete]
    }

    fn configure(&mut self, options: &mut Options) -> Result<()> {
        self.cleanup = options::take(options, Self::NAME, "cleanup")?.unwrap_or(false);
        Ok(())
    }

    fn generate(&self, cx: &GenerateContext<'_>) -> Result<Option<Operation>> {
        let pending_delete = cx
            .last
            .filter(|last| last.kind() == OperationKind::Write && last.is_successful())
            .map(|last| Operation::delete(last.key()).with_step(1));

        if cx.shutting_down {
            return Ok(if self.cleanup { pending_delete } else { None });
        }

        match pending_delete {
            Some(delete) => Ok(Some(delete)),
            None => Ok(cx.next_key()?.map(|key| Operation::write(key, cx.value()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::strategy::tests::strategy;

    fn succeeded(mut op: Operation) -> Operation {
        op.mark_successful();
        op
    }

    #[test]
    fn deletes_what_it_wrote() {
        let s = strategy("write-delete", json!({})).unwrap();

        let write = succeeded(s.next(None, None, false).unwrap().unwrap());
        assert_eq!(write.kind(), OperationKind::Write);

        let delete = s.next(Some(&write), Some(write.key()), false).unwrap().unwrap();
        assert_eq!(delete.kind(), OperationKind::Delete);
        assert_eq!(delete.key(), write.key());

        let next = s.next(Some(&succeeded(delete)), None, false).unwrap().unwrap();
        assert_eq!(next.kind(), OperationKind::Write);
        assert_ne!(next.key(), write.key());
    }

    #[test]
    fn failed_write_is_not_deleted() {
        let s = strategy("write-delete", json!({})).unwrap();

        let write = s.next(None, None, false).unwrap().unwrap();
        let next = s.next(Some(&write), None, false).unwrap().unwrap();
        assert_eq!(next.kind(), OperationKind::Write);
    }

    #[test]
    fn cleanup_emits_one_delete_on_shutdown() {
        let s = strategy("write-delete", json!({ "cleanup": true })).unwrap();

        let write = succeeded(s.next(None, None, false).unwrap().unwrap());
        let cleanup = s.next(Some(&write), Some(write.key()), true).unwrap().unwrap();
        assert_eq!(cleanup.kind(), OperationKind::Delete);

        assert!(s.next(Some(&succeeded(cleanup)), None, true).unwrap().is_none());
    }

    #[test]
    fn no_cleanup_by_default() {
        let s = strategy("write-delete", json!({})).unwrap();

        let write = succeeded(s.next(None, None, false).unwrap().unwrap());
        assert!(s.next(Some(&write), Some(write.key()), true).unwrap().is_none());
    }
}
