//! Plist s-expression helpers shared by IPC dispatch and the settings
//! file.

use lexpr::Value;

pub fn ok_response(id: i64) -> String {
    format!("(:type :response :id {} :status :ok)", id)
}

pub fn error_response(id: i64, reason: &str) -> String {
    format!(
        "(:type :response :id {} :status :error :reason \"{}\")",
        id,
        escape_string(reason)
    )
}

/// Escape a string for s-expression output.
pub fn escape_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Render a bool the way the Emacs side reads it.
pub fn bool_sexp(b: bool) -> &'static str {
    if b {
        "t"
    } else {
        "nil"
    }
}

/// Name of a plist key, accepting both `Value::Keyword("key")` (elisp
/// parser) and `Value::Symbol(":key")` (default parser).
fn key_name(value: &Value) -> Option<&str> {
    match value {
        Value::Keyword(k) => Some(k.as_ref()),
        Value::Symbol(s) => s.strip_prefix(':'),
        _ => None,
    }
}

/// Render a plist value as a bare string: keywords lose their colon,
/// strings lose their quotes.
fn atom_string(val: &Value) -> String {
    match val {
        Value::Keyword(v) => v.to_string(),
        Value::Symbol(v) => {
            let s = v.to_string();
            s.strip_prefix(':').unwrap_or(&s).to_string()
        }
        Value::String(v) => v.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => bool_sexp(*b).to_string(),
        Value::Null | Value::Nil => "nil".to_string(),
        _ => val.to_string(),
    }
}

/// Extract a keyword value from an s-expression plist.
pub fn get_keyword(value: &Value, key: &str) -> Option<String> {
    let mut current = value;
    while let Value::Cons(pair) = current {
        if key_name(pair.car()) == Some(key) {
            return match pair.cdr() {
                Value::Cons(next) => Some(atom_string(next.car())),
                _ => None,
            };
        }
        current = pair.cdr();
    }
    None
}

pub fn get_int(value: &Value, key: &str) -> Option<i64> {
    get_keyword(value, key).and_then(|s| s.parse().ok())
}

pub fn get_string(value: &Value, key: &str) -> Option<String> {
    get_keyword(value, key)
}

pub fn get_float(value: &Value, key: &str) -> Option<f64> {
    get_keyword(value, key).and_then(|s| s.parse().ok())
}

/// Every `(key . value)` pair of a plist, in order. Stops at the first
/// non-keyword in key position.
pub fn plist_pairs(value: &Value) -> Vec<(String, &Value)> {
    let mut pairs = Vec::new();
    let mut current = value;
    while let Value::Cons(pair) = current {
        let Some(key) = key_name(pair.car()) else {
            break;
        };
        let Value::Cons(next) = pair.cdr() else {
            break;
        };
        pairs.push((key.to_string(), next.car()));
        current = next.cdr();
    }
    pairs
}
