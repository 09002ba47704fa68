//! Parameter file loading and flattening.

use crate::error::MlError;
use serde_yaml::Value;
use std::collections::HashSet;
use std::path::Path;

/// A flattened `"{section}_{key}"` parameter with its original YAML value.
pub type FlatParam = (String, Value);

/// Read a two-level YAML parameter file and flatten it.
pub fn load_params(path: &Path) -> Result<Vec<FlatParam>, MlError> {
    let content = std::fs::read_to_string(path).map_err(|e| MlError::from_read(e, path))?;
    let root: Value = serde_yaml::from_str(&content)
        .map_err(|e| MlError::load(format!("invalid params file {}: {e}", path.display())))?;
    flatten_params(&root)
}

/// Flatten `section -> {key: value}` into `section_key -> value`, keeping
/// file order. An empty document yields no parameters.
pub fn flatten_params(root: &Value) -> Result<Vec<FlatParam>, MlError> {
    let sections = match root {
        Value::Null => return Ok(Vec::new()),
        Value::Mapping(m) => m,
        _ => return Err(MlError::load("params file must be a mapping of sections")),
    };

    let mut seen = HashSet::new();
    let mut flat = Vec::new();
    for (section, entries) in sections {
        let section = key_string(section);
        let entries = entries.as_mapping().ok_or_else(|| {
            MlError::load(format!("params section '{section}' is not a mapping"))
        })?;
        for (key, value) in entries {
            let name = format!("{section}_{}", key_string(key));
            if !seen.insert(name.clone()) {
                return Err(MlError::load(format!("duplicate flattened parameter '{name}'")));
            }
            flat.push((name, value.clone()));
        }
    }
    Ok(flat)
}

/// Render a parameter value the way the Python MLflow client stores it
/// (`str(value)`): `True`, `None`, `1e-05`, `[1, 'a']`.
pub fn param_value_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => python_repr(other),
    }
}

fn python_repr(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() => python_float(f),
            _ => n.to_string(),
        },
        Value::String(s) => python_str_literal(s),
        Value::Sequence(items) => {
            let items: Vec<String> = items.iter().map(python_repr).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Mapping(entries) => {
            let entries: Vec<String> = entries
                .iter()
                .map(|(k, v)| format!("{}: {}", python_repr(k), python_repr(v)))
                .collect();
            format!("{{{}}}", entries.join(", "))
        }
        Value::Tagged(tagged) => python_repr(&tagged.value),
    }
}

/// Shortest round-trip digits, scientific outside `1e-4 <= |f| < 1e16`.
fn python_float(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    let sci = format!("{f:e}");
    let (mantissa, exponent) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    if f != 0.0 && !(-4..16).contains(&exponent) {
        let sign = if exponent < 0 { '-' } else { '+' };
        return format!("{mantissa}e{sign}{:02}", exponent.abs());
    }

    let plain = f.to_string();
    if plain.contains('.') {
        plain
    } else {
        format!("{plain}.0")
    }
}

fn python_str_literal(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

fn key_string(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => param_value_string(other),
    }
}
