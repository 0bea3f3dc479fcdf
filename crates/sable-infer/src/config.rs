//! Checker configuration.
//!
//! Read once at construction, either explicitly through the builder methods
//! or from `SABLE_*` environment variables.

use std::collections::BTreeSet;

use crate::effects::is_known_effect;

/// How record construction is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordEncoding {
    /// `Record(row)`, row-polymorphic.
    #[default]
    Rows,
    /// Positional `App(Con("Record{a,b}"), [τa, τb])`.
    Legacy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckerConfig {
    /// Register the provider's instances. Classes are always registered.
    pub load_builtin_instances: bool,
    pub record_encoding: RecordEncoding,
    /// Effects whose capability a lambda may not capture by closure.
    pub linear_capabilities: BTreeSet<String>,
    /// Record unification and inference traces.
    pub trace: bool,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            load_builtin_instances: true,
            record_encoding: RecordEncoding::Rows,
            linear_capabilities: ["Async".to_string()].into_iter().collect(),
            trace: false,
        }
    }
}

fn truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}

impl CheckerConfig {
    /// Defaults overridden by `SABLE_NO_BUILTIN_INSTANCES`,
    /// `SABLE_RECORD_ENCODING`, `SABLE_LINEAR_CAPABILITIES`, and `SABLE_TRACE`.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like `from_env`, reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(value) = lookup("SABLE_NO_BUILTIN_INSTANCES") {
            config.load_builtin_instances = !truthy(&value);
        }
        if let Some(value) = lookup("SABLE_RECORD_ENCODING") {
            match value.trim().to_ascii_lowercase().as_str() {
                "rows" => config.record_encoding = RecordEncoding::Rows,
                "legacy" => config.record_encoding = RecordEncoding::Legacy,
                other => log::warn!(
                    "ignoring SABLE_RECORD_ENCODING={other:?}; expected `rows` or `legacy`"
                ),
            }
        }
        if let Some(value) = lookup("SABLE_LINEAR_CAPABILITIES") {
            config.linear_capabilities = value
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .filter(|name| {
                    let known = is_known_effect(name);
                    if !known {
                        log::warn!("ignoring unknown linear capability `{name}`");
                    }
                    known
                })
                .map(str::to_string)
                .collect();
        }
        if let Some(value) = lookup("SABLE_TRACE") {
            config.trace = truthy(&value);
        }
        config
    }

    pub fn with_builtin_instances(mut self, load: bool) -> Self {
        self.load_builtin_instances = load;
        self
    }

    pub fn with_record_encoding(mut self, encoding: RecordEncoding) -> Self {
        self.record_encoding = encoding;
        self
    }

    pub fn with_linear_capabilities<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.linear_capabilities = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn from_vars(vars: &[(&str, &str)]) -> CheckerConfig {
        let vars: BTreeMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        CheckerConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults() {
        let config = CheckerConfig::default();
        assert!(config.load_builtin_instances);
        assert_eq!(config.record_encoding, RecordEncoding::Rows);
        assert!(config.linear_capabilities.contains("Async"));
        assert!(!config.trace);
        assert_eq!(from_vars(&[]), config);
    }

    #[test]
    fn env_overrides() {
        let config = from_vars(&[
            ("SABLE_NO_BUILTIN_INSTANCES", "1"),
            ("SABLE_RECORD_ENCODING", "Legacy"),
            ("SABLE_LINEAR_CAPABILITIES", "Async, DB, Bogus"),
            ("SABLE_TRACE", "yes"),
        ]);
        assert!(!config.load_builtin_instances);
        assert_eq!(config.record_encoding, RecordEncoding::Legacy);
        assert_eq!(
            config.linear_capabilities.iter().collect::<Vec<_>>(),
            ["Async", "DB"]
        );
        assert!(config.trace);
    }

    #[test]
    fn unknown_encoding_keeps_default() {
        let config = from_vars(&[("SABLE_RECORD_ENCODING", "tuples")]);
        assert_eq!(config.record_encoding, RecordEncoding::Rows);
    }

    #[test]
    fn falsy_flags() {
        let config = from_vars(&[("SABLE_NO_BUILTIN_INSTANCES", "0"), ("SABLE_TRACE", "no")]);
        assert!(config.load_builtin_instances);
        assert!(!config.trace);
    }
}
