// FlashBatch - core/filter.rs
//
// Port eligibility under whitelist/blacklist rules, and rule list editing.
// Core layer: pure logic, no I/O.
//
// Evaluation order:
// 1. Filtering disabled: every port is allowed.
// 2. Any enabled, non-blank blacklist rule matching: denied. The blacklist
//    wins regardless of the whitelist.
// 3. Enabled whitelist rules present: the port must match one of them.
// 4. Otherwise allowed. The whitelist is opt-in.

use crate::core::model::{FilterField, FilterList, FilterRule, PortInfo, Settings};
use crate::util::constants::RULE_ID_SUFFIX_LEN;
use rand::Rng;

/// A rule before it has been given an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleDraft {
    pub field: FilterField,
    pub value: String,
    pub enabled: bool,
}

/// Partial update applied by `update_rule`. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RulePatch {
    pub field: Option<FilterField>,
    pub value: Option<String>,
    pub enabled: Option<bool>,
}

/// Returns true if `port` may be flashed under `settings`.
pub fn is_allowed(port: &PortInfo, settings: &Settings) -> bool {
    if !settings.is_filter_enabled {
        return true;
    }

    if settings.blacklist.iter().any(|rule| rule_matches(rule, port)) {
        return false;
    }

    let mut active_whitelist = settings.whitelist.iter().filter(|rule| rule.enabled).peekable();
    if active_whitelist.peek().is_none() {
        return true;
    }
    active_whitelist.any(|rule| rule_matches(rule, port))
}

/// Check one rule against one port.
///
/// Disabled rules and rules with a blank value never match.
/// Matching is a case-insensitive substring test.
pub fn rule_matches(rule: &FilterRule, port: &PortInfo) -> bool {
    if !rule.enabled || rule.value.trim().is_empty() {
        return false;
    }
    let needle = rule.value.to_lowercase();
    let contains = |haystack: Option<&str>| {
        haystack
            .map(|h| h.to_lowercase().contains(&needle))
            .unwrap_or(false)
    };

    match rule.field {
        FilterField::VidPid => {
            let vid = port.vid.as_deref().unwrap_or("").to_lowercase();
            let pid = port.pid.as_deref().unwrap_or("").to_lowercase();
            vid.contains(&needle) || pid.contains(&needle) || format!("{vid}:{pid}").contains(&needle)
        }
        FilterField::SerialNumber => contains(port.serial_number.as_deref()),
        FilterField::LocationPath => contains(port.location_path.as_deref()),
        FilterField::PortName => contains(Some(port.name.as_str())),
    }
}

/// Generate a rule id from a timestamp plus a random base36 suffix.
///
/// Unique without a central counter: two rules created in the same
/// millisecond still differ in the suffix.
pub fn generate_rule_id(now_ms: u64) -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..RULE_ID_SUFFIX_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("{now_ms}-{suffix}")
}

/// Append a new rule to `list` and return its id.
pub fn add_rule(settings: &mut Settings, list: FilterList, draft: RuleDraft, now_ms: u64) -> String {
    let rules = settings.rules_mut(list);
    let mut id = generate_rule_id(now_ms);
    while rules.iter().any(|r| r.id == id) {
        id = generate_rule_id(now_ms);
    }
    rules.push(FilterRule {
        id: id.clone(),
        field: draft.field,
        value: draft.value,
        enabled: draft.enabled,
    });
    id
}

/// Remove the rule with `id` from `list`. Returns false if it was absent.
pub fn remove_rule(settings: &mut Settings, list: FilterList, id: &str) -> bool {
    let rules = settings.rules_mut(list);
    let before = rules.len();
    rules.retain(|r| r.id != id);
    rules.len() != before
}

/// Apply `patch` to the rule with `id` in `list`. Returns false if absent.
pub fn update_rule(settings: &mut Settings, list: FilterList, id: &str, patch: RulePatch) -> bool {
    let Some(rule) = settings.rules_mut(list).iter_mut().find(|r| r.id == id) else {
        return false;
    };
    if let Some(field) = patch.field {
        rule.field = field;
    }
    if let Some(value) = patch.value {
        rule.value = value;
    }
    if let Some(enabled) = patch.enabled {
        rule.enabled = enabled;
    }
    true
}

/// Rebuild a rule list from stored JSON, dropping malformed entries.
///
/// An entry survives only if it is an object with a string `id`, a known
/// `field` spelling and a string `value`. `enabled` is read by truthiness,
/// so a missing flag means disabled. A non-array input yields no rules.
pub fn normalize_rules(raw: &serde_json::Value) -> Vec<FilterRule> {
    let Some(items) = raw.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let obj = item.as_object()?;
            let id = obj.get("id")?.as_str()?;
            let field = FilterField::parse(obj.get("field")?.as_str()?)?;
            let value = obj.get("value")?.as_str()?;
            Some(FilterRule {
                id: id.to_string(),
                field,
                value: value.to_string(),
                enabled: obj.get("enabled").map(is_truthy).unwrap_or(false),
            })
        })
        .collect()
}

/// Loose truthiness for stored flags: `true`, non-zero numbers and
/// non-empty strings count as set.
pub fn is_truthy(value: &serde_json::Value) -> bool {
    use serde_json::Value;
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
