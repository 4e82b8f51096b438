use super::{GenerateContext, Generator, Options, options};
use crate::error::{Error, Result};
use crate::operation::{Operation, OperationKind};

/// Interleaves writes and reads with a fixed integer ratio.
///
/// With `reads-per-write: n` every thread produces one write followed by `n`
/// reads of the key it last wrote, then repeats. With `writes-per-read: n` it
/// produces `n` reads followed by one write. A ratio of zero produces writes
/// only. Reads that happen before the thread wrote anything use fresh keys.
#[derive(Debug)]
pub(super) struct ReadWrite {
    reads: u32,
    reads_first: bool,
}

impl Default for ReadWrite {
    fn default() -> Self {
        Self {
            reads: 1,
            reads_first: false,
        }
    }
}

impl ReadWrite {
    pub const NAME: &'static str = "read-write";

    fn cycle_len(&self) -> u32 {
        self.reads + 1
    }

    fn kind_at(&self, step: u32) -> OperationKind {
        let is_write = if self.reads_first {
            step == self.reads
        } else {
            step == 0
        };

        if is_write {
            OperationKind::Write
        } else {
            OperationKind::Read
        }
    }
}

impl Generator for ReadWrite {
    fn operation_kinds(&self) -> &'static [OperationKind] {
        &[OperationKind::Read, OperationKind::Write]
    }

    fn configure(&mut self, options: &mut Options) -> Result<()> {
        let reads_per_write: Option<u32> = options::take(options, Self::NAME, "reads-per-write")?;
        let writes_per_read: Option<u32> = options::take(options, Self::NAME, "writes-per-read")?;

        (self.reads, self.reads_first) = match (reads_per_write, writes_per_read) {
            (None, None) => (1, false),
            (Some(reads), None) => (reads, false),
            (None, Some(reads)) => (reads, true),
            (Some(a), Some(b)) if a == b => (a, false),
            (Some(a), Some(b)) => {
                return Err(Error::Config(format!(
                    "strategy `{}` got both `reads-per-write: {a}` and `writes-per-read: {b}`; \
                     configure only one of them",
                    Self::NAME
                )));
            }
        };

        Ok(())
    }

    fn generate(&self, cx: &GenerateContext<'_>) -> Result<Option<Operation>> {
        if cx.shutting_down {
            return Ok(None);
        }

        let step = cx.next_step(self.cycle_len());
        let operation = match self.kind_at(step) {
            OperationKind::Write => cx.next_key()?.map(|key| Operation::write(key, cx.value())),
            _ => match cx.last_written_key {
                Some(key) => Some(Operation::read(key)),
                None => cx.next_key()?.map(Operation::read),
            },
        };

        Ok(operation.map(|op| op.with_step(step)))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::strategy::LoadStrategy;
    use crate::strategy::tests::strategy;

    /// Runs the strategy on one thread, pretending every write succeeds.
    fn sequence(strategy: &LoadStrategy, len: usize) -> String {
        let mut last: Option<Operation> = None;
        let mut last_written: Option<String> = None;
        let mut out = String::new();

        for _ in 0..len {
            let op = strategy
                .next(last.as_ref(), last_written.as_deref(), false)
                .unwrap()
                .unwrap();
            match op.kind() {
                OperationKind::Write => {
                    out.push('W');
                    last_written = Some(op.key().to_owned());
                }
                OperationKind::Read => {
                    out.push('R');
                    if let Some(written) = &last_written {
                        assert_eq!(op.key(), written);
                    }
                }
                other => panic!("unexpected {other}"),
            }
            last = Some(op);
        }
        out
    }

    #[test]
    fn reads_per_write() {
        let s = strategy("read-write", json!({ "reads-per-write": 3 })).unwrap();
        assert_eq!(sequence(&s, 10), "WRRRWRRRWR");
    }

    #[test]
    fn zero_ratio_only_writes() {
        let s = strategy("read-write", json!({ "reads-per-write": 0 })).unwrap();
        assert_eq!(sequence(&s, 5), "WWWWW");

        let s = strategy("read-write", json!({ "writes-per-read": 0 })).unwrap();
        assert_eq!(sequence(&s, 5), "WWWWW");
    }

    #[test]
    fn writes_per_read_starts_with_reads() {
        let s = strategy("read-write", json!({ "writes-per-read": 2 })).unwrap();
        assert_eq!(sequence(&s, 9), "RRWRRWRRW");
    }

    #[test]
    fn defaults_to_alternating() {
        let s = strategy("read-write", json!({})).unwrap();
        assert_eq!(sequence(&s, 6), "WRWRWR");
    }

    #[test]
    fn agreeing_ratios_are_accepted() {
        let s = strategy(
            "read-write",
            json!({ "reads-per-write": 1, "writes-per-read": 1 }),
        )
        .unwrap();
        assert_eq!(sequence(&s, 4), "WRWR");
    }

    #[test]
    fn conflicting_ratios_fail_at_configuration() {
        let err = strategy(
            "read-write",
            json!({ "reads-per-write": 2, "writes-per-read": 3 }),
        )
        .unwrap_err();
        assert!(err.is_user_error());
        assert!(err.to_string().contains("reads-per-write"), "{err}");
    }

    #[test]
    fn stops_on_shutdown() {
        let s = strategy("read-write", json!({})).unwrap();
        assert!(s.next(None, None, true).unwrap().is_none());
    }
}
