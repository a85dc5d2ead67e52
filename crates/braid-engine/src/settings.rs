//! Engine settings with file deep-merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`EngineSettings::default()`]
//! 2. If a settings file is given and exists, deep-merge its values over
//!    the defaults
//! 3. Apply `BRAID_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)
//!
//! Env var parsing is strict: invalid values are silently ignored and the
//! file/default value stands.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Tunable engine parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineSettings {
    /// Capacity of the recently-seen event ID window, per session.
    pub seen_capacity: usize,
    /// Debounce window for progress-triggered plan refetches, in ms.
    pub debounce_window_ms: u64,
    /// Maximum buffered events per not-yet-reconciled session ID.
    pub early_event_buffer: usize,
    /// Tool-name prefixes that trigger an immediate targeted plan refetch.
    pub plan_tool_prefixes: Vec<String>,
    /// Tool-name prefixes that trigger a debounced plan refetch.
    pub progress_tool_prefixes: Vec<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            seen_capacity: 1024,
            debounce_window_ms: 300,
            early_event_buffer: 256,
            plan_tool_prefixes: vec!["plan".to_owned()],
            progress_tool_prefixes: vec!["progress".to_owned(), "todo".to_owned()],
        }
    }
}

impl EngineSettings {
    /// Load settings from an optional JSON file with env var overrides.
    ///
    /// A missing file yields defaults; an unreadable or invalid file is an
    /// error.
    pub fn load_from_path(path: &Path) -> anyhow::Result<Self> {
        let defaults = serde_json::to_value(Self::default())?;

        let merged = if path.exists() {
            debug!(?path, "loading engine settings from file");
            let content = std::fs::read_to_string(path)?;
            let user: Value = serde_json::from_str(&content)?;
            deep_merge(defaults, user)
        } else {
            debug!(?path, "settings file not found, using defaults");
            defaults
        };

        let mut settings: Self = serde_json::from_value(merged)?;
        apply_env_overrides(&mut settings);
        Ok(settings)
    }

    /// Whether a tool name selects an immediate targeted plan refetch.
    #[must_use]
    pub fn is_plan_tool(&self, name: &str) -> bool {
        self.plan_tool_prefixes.iter().any(|p| name.starts_with(p.as_str()))
    }

    /// Whether a tool name selects a debounced plan refetch.
    #[must_use]
    pub fn is_progress_tool(&self, name: &str) -> bool {
        self.progress_tool_prefixes.iter().any(|p| name.starts_with(p.as_str()))
    }
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `BRAID_*` environment variable overrides.
pub fn apply_env_overrides(settings: &mut EngineSettings) {
    if let Some(v) = read_env_usize("BRAID_SEEN_CAPACITY", 1, 1_000_000) {
        settings.seen_capacity = v;
    }
    if let Some(v) = read_env_u64("BRAID_DEBOUNCE_WINDOW_MS", 1, 600_000) {
        settings.debounce_window_ms = v;
    }
    if let Some(v) = read_env_usize("BRAID_EARLY_EVENT_BUFFER", 1, 100_000) {
        settings.early_event_buffer = v;
    }
    if let Some(v) = read_env_list("BRAID_PLAN_TOOL_PREFIXES") {
        settings.plan_tool_prefixes = v;
    }
    if let Some(v) = read_env_list("BRAID_PROGRESS_TOOL_PREFIXES") {
        settings.progress_tool_prefixes = v;
    }
}

/// Read a `usize` env var, rejecting values outside `[min, max]`.
fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    parse_bounded_usize(&std::env::var(name).ok()?, min, max)
}

/// Read a `u64` env var, rejecting values outside `[min, max]`.
fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    parse_bounded_u64(&std::env::var(name).ok()?, min, max)
}

/// Read a comma-separated list env var; empty entries are dropped.
fn read_env_list(name: &str) -> Option<Vec<String>> {
    parse_list(&std::env::var(name).ok()?)
}

/// Parse a `usize` within `[min, max]`; anything else is `None`.
fn parse_bounded_usize(raw: &str, min: usize, max: usize) -> Option<usize> {
    let parsed = raw.trim().parse::<usize>().ok()?;
    (min..=max).contains(&parsed).then_some(parsed)
}

/// Parse a `u64` within `[min, max]`; anything else is `None`.
fn parse_bounded_u64(raw: &str, min: u64, max: u64) -> Option<u64> {
    let parsed = raw.trim().parse::<u64>().ok()?;
    (min..=max).contains(&parsed).then_some(parsed)
}

/// Parse a comma-separated list; empty entries are dropped.
fn parse_list(raw: &str) -> Option<Vec<String>> {
    let items: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect();
    (!items.is_empty()).then_some(items)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = EngineSettings::default();
        assert_eq!(s.seen_capacity, 1024);
        assert_eq!(s.debounce_window_ms, 300);
        assert_eq!(s.early_event_buffer, 256);
        assert_eq!(s.plan_tool_prefixes, vec!["plan"]);
        assert_eq!(s.progress_tool_prefixes, vec!["progress", "todo"]);
    }

    #[test]
    fn deep_merge_objects() {
        let a = serde_json::json!({"x": 1, "nested": {"a": 1, "b": 2}});
        let b = serde_json::json!({"nested": {"b": 3}, "y": 4});
        let merged = deep_merge(a, b);
        assert_eq!(merged["x"], 1);
        assert_eq!(merged["y"], 4);
        assert_eq!(merged["nested"]["a"], 1);
        assert_eq!(merged["nested"]["b"], 3);
    }

    #[test]
    fn deep_merge_null_preserves_target() {
        let a = serde_json::json!({"x": 1});
        let b = serde_json::json!({"x": null});
        assert_eq!(deep_merge(a, b)["x"], 1);
    }

    #[test]
    fn deep_merge_arrays_replaced() {
        let a = serde_json::json!({"xs": [1, 2, 3]});
        let b = serde_json::json!({"xs": [9]});
        assert_eq!(deep_merge(a, b)["xs"], serde_json::json!([9]));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let s = EngineSettings::load_from_path(Path::new("/nonexistent/braid.json")).unwrap();
        assert_eq!(s, EngineSettings::default());
    }

    #[test]
    fn file_values_merge_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"debounceWindowMs": 50}"#).unwrap();
        let s = EngineSettings::load_from_path(&path).unwrap();
        assert_eq!(s.debounce_window_ms, 50);
        assert_eq!(s.seen_capacity, 1024, "untouched fields keep defaults");
    }

    #[test]
    fn invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(EngineSettings::load_from_path(&path).is_err());
    }

    #[test]
    fn prefix_matching() {
        let s = EngineSettings::default();
        assert!(s.is_plan_tool("plan_write"));
        assert!(s.is_plan_tool("plan"));
        assert!(!s.is_plan_tool("read_file"));
        assert!(s.is_progress_tool("progress_update"));
        assert!(s.is_progress_tool("todo_write"));
        assert!(!s.is_progress_tool("plan_write"));
    }

    // Env mutation is process-global and racy across parallel tests, so the
    // override parsing is exercised through the pure helpers.

    #[test]
    fn list_parsing() {
        assert_eq!(
            parse_list("alpha, beta ,,gamma").unwrap(),
            vec!["alpha", "beta", "gamma"]
        );
        assert_eq!(parse_list("  ,, "), None);
    }

    #[test]
    fn int_parsing_rejects_out_of_range_and_garbage() {
        assert_eq!(parse_bounded_u64("0", 1, 100), None);
        assert_eq!(parse_bounded_u64("42", 1, 100), Some(42));
        assert_eq!(parse_bounded_u64(" 42 ", 1, 100), Some(42));
        assert_eq!(parse_bounded_u64("101", 1, 100), None);
        assert_eq!(parse_bounded_u64("nope", 1, 100), None);
        assert_eq!(parse_bounded_usize("7", 1, 10), Some(7));
    }
}
