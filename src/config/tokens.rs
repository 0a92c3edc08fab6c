//! `{token}` substitution in default config values.

use super::ConfigValue;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

static TOKEN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"\{([a-zA-Z0-9_-]+)\}").expect("token pattern is valid")
});

/// Replace every `{name}` in `input` with its value from `values`.
/// Unknown tokens become the empty string.
pub fn replace_tokens(input: &str, values: &HashMap<&str, String>) -> String {
    TOKEN_PATTERN
        .replace_all(input, |caps: &regex::Captures<'_>| values.get(&caps[1]).cloned().unwrap_or_default())
        .into_owned()
}

/// Apply [`replace_tokens`] to every string inside `value`.
pub fn replace_value_tokens(value: ConfigValue, values: &HashMap<&str, String>) -> ConfigValue {
    match value {
        ConfigValue::String(s) => ConfigValue::String(replace_tokens(&s, values)),
        ConfigValue::List(items) => {
            ConfigValue::List(items.into_iter().map(|item| replace_value_tokens(item, values)).collect())
        }
        ConfigValue::Map(map) => {
            ConfigValue::Map(map.into_iter().map(|(k, v)| (k, replace_value_tokens(v, values))).collect())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values() -> HashMap<&'static str, String> {
        HashMap::from([("home", "/home/alice".to_string()), ("type", "gulp".to_string())])
    }

    #[test]
    fn test_known_tokens_are_replaced() {
        assert_eq!(replace_tokens("{home}/.{type}", &values()), "/home/alice/.gulp");
        assert_eq!(replace_tokens("{home}{home}", &values()), "/home/alice/home/alice");
    }

    #[test]
    fn test_unknown_tokens_become_empty() {
        assert_eq!(replace_tokens("a{missing}b", &values()), "ab");
        assert_eq!(replace_tokens("{not valid!}", &values()), "{not valid!}");
    }

    #[test]
    fn test_nested_values_are_replaced() {
        let value = ConfigValue::List(vec![ConfigValue::from("{type}"), ConfigValue::Bool(true)]);
        assert_eq!(
            replace_value_tokens(value, &values()),
            ConfigValue::List(vec![ConfigValue::from("gulp"), ConfigValue::Bool(true)])
        );
    }
}
