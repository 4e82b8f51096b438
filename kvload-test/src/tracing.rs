use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

/// Tracing targets of the workspace. `kvload` is the binary of `kvload-cli`.
const WORKSPACE_CRATES: &[&str] = &["kvload", "kvload_core", "kvload_test"];

/// Installs a subscriber for the current test binary.
///
/// Output goes through the test harness, so it only shows up for failing tests
/// or with `--nocapture`. By default, workspace crates log at `TRACE` and
/// everything else at `ERROR`; `RUST_LOG` replaces this entirely. Thread names
/// are included since most interesting events come from worker threads.
///
/// Calling this more than once is fine.
///
/// ```
/// kvload_test::tracing::init();
/// kvload_test::tracing::init();
/// ```
pub fn init() {
    let filter = match std::env::var("RUST_LOG") {
        Ok(directives) if !directives.is_empty() => EnvFilter::builder().parse_lossy(directives),
        _ => workspace_filter(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .with_test_writer()
        .compact()
        .try_init()
        .ok();
}

fn workspace_filter() -> EnvFilter {
    let directives = WORKSPACE_CRATES
        .iter()
        .map(|name| format!("{name}=trace"))
        .collect::<Vec<_>>()
        .join(",");

    EnvFilter::builder()
        .with_default_directive(LevelFilter::ERROR.into())
        .parse_lossy(directives)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traces_workspace_crates_only() {
        let filter = workspace_filter().to_string();
        for name in WORKSPACE_CRATES {
            assert!(filter.contains(&format!("{name}=trace")), "{filter}");
        }
        assert!(filter.contains("error"), "{filter}");
    }
}
