//! Helpers for consuming the raw option map of a strategy.

use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

/// Raw, not yet consumed strategy options.
pub type Options = serde_json::Map<String, serde_json::Value>;

/// Removes `name` from `options` and deserializes it.
///
/// Returns `Ok(None)` if the option is absent. Every consumed option is removed,
/// so whatever is left afterwards is unknown to the strategy.
pub fn take<T: DeserializeOwned>(
    options: &mut Options,
    strategy: &str,
    name: &str,
) -> Result<Option<T>> {
    let Some(value) = options.remove(name) else {
        return Ok(None);
    };

    serde_json::from_value(value).map(Some).map_err(|err| {
        Error::Config(format!(
            "invalid value for option `{name}` of strategy `{strategy}`: {err}"
        ))
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn removes_consumed_options() {
        let mut options = Options::new();
        options.insert("count".into(), json!(3));
        options.insert("other".into(), json!("x"));

        let count: Option<u32> = take(&mut options, "s", "count").unwrap();
        assert_eq!(count, Some(3));
        assert!(!options.contains_key("count"));
        assert!(options.contains_key("other"));

        let missing: Option<u32> = take(&mut options, "s", "count").unwrap();
        assert_eq!(missing, None);
    }

    #[test]
    fn reports_invalid_values() {
        let mut options = Options::new();
        options.insert("count".into(), json!("many"));

        let err = take::<u32>(&mut options, "s", "count").unwrap_err();
        assert!(err.to_string().contains("`count`"), "{err}");
        assert!(err.is_user_error());
    }
}
