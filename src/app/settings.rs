// FlashBatch - app/settings.rs
//
// Settings persistence: validated load from and save to the settings
// document.
//
// Design principles:
// - Load never fails. A missing, malformed or partially valid document
//   yields whatever could be salvaged; the caller keeps defaults for the rest.
// - Each field is coerced individually, so one bad value does not discard
//   the others.
// - Save errors are returned; the caller logs and discards them.

use crate::core::filter::{is_truthy, normalize_rules};
use crate::core::model::{clamp_concurrency, Settings};
use crate::platform::store::JsonStore;
use crate::util::constants::{DEFAULT_CONCURRENCY, SETTINGS_KEY};
use crate::util::error::StoreError;
use serde_json::Value;

/// Load settings from `store`.
///
/// Returns `None` when nothing usable is stored (absent key, non-object
/// value, unreadable document); callers then keep their defaults.
pub fn load_settings(store: &mut JsonStore) -> Option<Settings> {
    let raw = match store.get(SETTINGS_KEY) {
        Ok(Some(value)) => value,
        Ok(None) => {
            tracing::debug!(path = %store.path().display(), "No stored settings; using defaults");
            return None;
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read settings; using defaults");
            return None;
        }
    };

    let obj = raw.as_object()?;

    let max_concurrency = match obj.get("maxConcurrency") {
        None | Some(Value::Null) => DEFAULT_CONCURRENCY,
        Some(value) => clamp_concurrency(coerce_number(value)),
    };

    let settings = Settings {
        auto_download: obj.get("autoDownload").map(is_truthy).unwrap_or(false),
        max_concurrency,
        is_filter_enabled: obj.get("isFilterEnabled") != Some(&Value::Bool(false)),
        whitelist: obj.get("whitelist").map(normalize_rules).unwrap_or_default(),
        blacklist: obj.get("blacklist").map(normalize_rules).unwrap_or_default(),
    };

    tracing::debug!(
        whitelist = settings.whitelist.len(),
        blacklist = settings.blacklist.len(),
        max_concurrency = settings.max_concurrency,
        "Settings loaded"
    );
    Some(settings)
}

/// Write `settings` to `store` and persist the document.
///
/// `max_concurrency` is clamped on the way out as well.
pub fn save_settings(store: &mut JsonStore, settings: &Settings) -> Result<(), StoreError> {
    let mut out = settings.clone();
    out.max_concurrency = clamp_concurrency(f64::from(out.max_concurrency));
    let value = serde_json::to_value(&out).map_err(|e| StoreError::Json {
        path: store.path().to_path_buf(),
        source: e,
    })?;
    store.set(SETTINGS_KEY, value)?;
    store.save()
}

/// Loose numeric coercion for stored values: numbers as-is, numeric
/// strings parsed, booleans as 1/0. Anything else is NaN, which
/// `clamp_concurrency` maps to the default.
fn coerce_number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) if s.trim().is_empty() => 0.0,
        Value::String(s) => s.trim().parse().unwrap_or(f64::NAN),
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Null | Value::Array(_) | Value::Object(_) => f64::NAN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{FilterField, FilterRule};
    use serde_json::json;
    use tempfile::TempDir;

    fn store_with(dir: &TempDir, doc: Value) -> JsonStore {
        let path = dir.path().join("massProduction.json");
        std::fs::write(&path, doc.to_string()).unwrap();
        JsonStore::new(path)
    }

    #[test]
    fn test_absent_settings_is_none() {
        let dir = TempDir::new().unwrap();
        let mut store = JsonStore::new(dir.path().join("massProduction.json"));
        assert_eq!(load_settings(&mut store), None);
    }

    #[test]
    fn test_wrapped_settings_load() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with(
            &dir,
            json!({"settings": {"value": {
                "autoDownload": true,
                "maxConcurrency": 12,
                "isFilterEnabled": false,
                "whitelist": [{"id": "a", "field": "port_name", "value": "COM", "enabled": true}],
                "blacklist": []
            }}}),
        );
        let settings = load_settings(&mut store).unwrap();
        assert!(settings.auto_download);
        assert_eq!(settings.max_concurrency, 12);
        assert!(!settings.is_filter_enabled);
        assert_eq!(settings.whitelist.len(), 1);
    }

    #[test]
    fn test_field_coercions() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with(
            &dir,
            json!({"settings": {
                "autoDownload": "yes",
                "maxConcurrency": "500",
                "isFilterEnabled": 0
            }}),
        );
        let settings = load_settings(&mut store).unwrap();
        assert!(settings.auto_download);
        assert_eq!(settings.max_concurrency, 32);
        assert!(settings.is_filter_enabled);
        assert!(settings.whitelist.is_empty());
    }

    #[test]
    fn test_missing_or_garbage_concurrency_defaults() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with(&dir, json!({"settings": {"maxConcurrency": "lots"}}));
        assert_eq!(load_settings(&mut store).unwrap().max_concurrency, 8);

        let dir = TempDir::new().unwrap();
        let mut store = store_with(&dir, json!({"settings": {}}));
        assert_eq!(load_settings(&mut store).unwrap().max_concurrency, 8);
    }

    #[test]
    fn test_non_object_settings_is_none() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with(&dir, json!({"settings": {"value": [1, 2]}}));
        assert_eq!(load_settings(&mut store), None);
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("massProduction.json");
        let settings = Settings {
            auto_download: true,
            max_concurrency: 4,
            is_filter_enabled: true,
            whitelist: vec![],
            blacklist: vec![FilterRule {
                id: "1-abcdefg".to_string(),
                field: FilterField::SerialNumber,
                value: "bad".to_string(),
                enabled: true,
            }],
        };
        save_settings(&mut JsonStore::new(&path), &settings).unwrap();

        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["settings"]["value"]["maxConcurrency"], 4);

        assert_eq!(load_settings(&mut JsonStore::new(&path)), Some(settings));
    }
}
