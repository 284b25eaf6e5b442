//! Message template substitution.
//!
//! Templates contain `{key}` and `{key[sub]}` placeholders filled from the
//! instance anatomy data. Short legacy tokens (`{task}`, `{asset}`,
//! `{subset}`, `{family}` and their Title/UPPER spellings) expand to the
//! nested field names first. Unresolvable placeholders stay literal in the
//! output and are reported with a single warning; rendering never fails.

use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde_json::{Map, Value};

/// Legacy short tokens and their nested-field equivalents.
const LEGACY_TOKENS: &[(&str, &str)] = &[
    ("{task}", "{task[name]}"),
    ("{Task}", "{Task[name]}"),
    ("{TASK}", "{TASK[NAME]}"),
    ("{asset}", "{folder[name]}"),
    ("{Asset}", "{Folder[name]}"),
    ("{ASSET}", "{FOLDER[NAME]}"),
    ("{subset}", "{product[name]}"),
    ("{Subset}", "{Product[name]}"),
    ("{SUBSET}", "{PRODUCT[NAME]}"),
    ("{family}", "{product[type]}"),
    ("{Family}", "{Product[type]}"),
    ("{FAMILY}", "{PRODUCT[TYPE]}"),
];

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([A-Za-z0-9_]+)(?:\[([A-Za-z0-9_]+)\])?\}").unwrap())
}

/// Fill `template` from `fill` (a JSON object), leaving unknown placeholders
/// literal. Substitution is idempotent on already-rendered output.
pub fn render(template: &str, fill: &Value) -> String {
    let mut message = template.to_string();
    for (from, to) in LEGACY_TOKENS {
        message = message.replace(from, to);
    }

    let expanded = with_case_variants(fill);
    let mut missing: Vec<String> = Vec::new();
    let out = placeholder_re()
        .replace_all(&message, |caps: &Captures| {
            let key = &caps[1];
            let sub = caps.get(2).map(|m| m.as_str());
            match resolve(&expanded, key, sub) {
                Some(text) => text,
                None => {
                    missing.push(caps[0].to_string());
                    caps[0].to_string()
                }
            }
        })
        .into_owned();

    if !missing.is_empty() {
        tracing::warn!(placeholders = ?missing, "unresolved placeholders left in message");
    }
    out
}

fn resolve(fill: &Map<String, Value>, key: &str, sub: Option<&str>) -> Option<String> {
    let value = fill.get(key)?;
    let target = match sub {
        Some(sub) => value.as_object()?.get(sub)?,
        None => value,
    };
    scalar_text(target)
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Augment fill data with Title and UPPER key spellings whose string values
/// are capitalized/uppercased, so `{Task[name]}` and `{TASK[NAME]}` resolve.
fn with_case_variants(fill: &Value) -> Map<String, Value> {
    let mut out = Map::new();
    if let Some(obj) = fill.as_object() {
        for (key, value) in obj {
            out.insert(key.clone(), value.clone());
            out.insert(title_case(key), title_value(value));
            out.insert(key.to_uppercase(), upper_value(value));
        }
    }
    out
}

fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn title_value(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(title_case(s)),
        Value::Object(obj) => Value::Object(
            obj.iter()
                .map(|(k, v)| (k.clone(), title_value(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn upper_value(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.to_uppercase()),
        Value::Object(obj) => Value::Object(
            obj.iter()
                .map(|(k, v)| (k.to_uppercase(), upper_value(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}
