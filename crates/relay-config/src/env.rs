//! Small helpers for reading typed values from the environment

/// Read a boolean flag, accepting `true`/`1`/`yes` (case-insensitive)
pub(crate) fn env_bool(name: &str, default: bool) -> bool {
    std::env::var(name).map_or(default, |v| {
        matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
    })
}

/// Read an unsigned integer, falling back to the default on absence or
/// parse failure
pub(crate) fn env_u32(name: &str, default: u32) -> u32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Read an unsigned 64-bit integer with a default
pub(crate) fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Read a string with a default
pub(crate) fn env_string(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_owned())
}

/// Read an optional string, treating an empty value as absent
pub(crate) fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_accepts_common_truthy_values() {
        for value in ["true", "1", "yes", "TRUE", "Yes"] {
            temp_env::with_var("RELAY_TEST_BOOL", Some(value), || {
                assert!(env_bool("RELAY_TEST_BOOL", false), "{value} should be true");
            });
        }
        temp_env::with_var("RELAY_TEST_BOOL", Some("false"), || {
            assert!(!env_bool("RELAY_TEST_BOOL", true));
        });
    }

    #[test]
    fn numeric_falls_back_on_garbage() {
        temp_env::with_var("RELAY_TEST_NUM", Some("not-a-number"), || {
            assert_eq!(env_u32("RELAY_TEST_NUM", 42), 42);
        });
        temp_env::with_var("RELAY_TEST_NUM", Some("7"), || {
            assert_eq!(env_u32("RELAY_TEST_NUM", 42), 7);
        });
    }

    #[test]
    fn empty_string_is_absent() {
        temp_env::with_var("RELAY_TEST_OPT", Some(""), || {
            assert!(env_opt("RELAY_TEST_OPT").is_none());
        });
    }
}
