use serde_json::{json, Value};

use crate::errors::DomainError;

/// Encodes `value` the way the workspace API expects for a column of
/// `column_type`. Unknown types fall back to plain JSON encoding.
pub fn format_column_value(column_type: &str, value: &Value) -> Result<String, DomainError> {
    let encoded = match column_type.trim().to_ascii_lowercase().as_str() {
        "status" => json!({ "index": status_index(value)? }).to_string(),
        "person" | "people" => json!({ "id": value }).to_string(),
        "date" => json!({ "date": value }).to_string(),
        "dropdown" => json!({ "ids": [value] }).to_string(),
        "numbers" => plain_text(value),
        "text" => plain_text(value),
        "long_text" => json!({ "text": value }).to_string(),
        "checkbox" => {
            let checked = matches!(value, Value::Bool(true))
                || matches!(value, Value::String(text) if text == "true");
            json!({ "checked": if checked { "true" } else { "false" } }).to_string()
        }
        _ => value.to_string(),
    };
    Ok(encoded)
}

fn status_index(value: &Value) -> Result<i64, DomainError> {
    let parsed = match value {
        Value::Number(number) => number.as_i64().or_else(|| number.as_f64().map(|f| f.trunc() as i64)),
        Value::String(text) => leading_integer(text),
        _ => None,
    };

    parsed.ok_or_else(|| DomainError::InvalidColumnValue {
        column_type: "status".to_string(),
        reason: format!("status index must be an integer, got {value}"),
    })
}

/// Integer prefix of `text`, so "2 - Done" reads as index 2.
fn leading_integer(text: &str) -> Option<i64> {
    let trimmed = text.trim();
    let end = trimmed
        .char_indices()
        .find(|(index, ch)| !(ch.is_ascii_digit() || (*index == 0 && matches!(ch, '-' | '+'))))
        .map(|(index, _)| index)
        .unwrap_or(trimmed.len());
    trimmed[..end].parse().ok()
}

fn plain_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::format_column_value;

    #[test]
    fn encodes_structured_column_types() {
        assert_eq!(format_column_value("status", &json!("2")).expect("status"), r#"{"index":2}"#);
        assert_eq!(format_column_value("status", &json!(1)).expect("status"), r#"{"index":1}"#);
        assert_eq!(
            format_column_value("date", &json!("2024-06-01")).expect("date"),
            r#"{"date":"2024-06-01"}"#
        );
        assert_eq!(format_column_value("dropdown", &json!(3)).expect("dropdown"), r#"{"ids":[3]}"#);
        assert_eq!(format_column_value("person", &json!(77)).expect("person"), r#"{"id":77}"#);
        assert_eq!(
            format_column_value("long_text", &json!("notes")).expect("long text"),
            r#"{"text":"notes"}"#
        );
    }

    #[test]
    fn encodes_scalar_column_types() {
        assert_eq!(format_column_value("numbers", &json!(12.5)).expect("numbers"), "12.5");
        assert_eq!(format_column_value("text", &json!("hello")).expect("text"), "hello");
        assert_eq!(format_column_value("link", &json!("x")).expect("fallback"), r#""x""#);
    }

    #[test]
    fn checkbox_accepts_bool_or_string_true() {
        let checked = r#"{"checked":"true"}"#;
        let unchecked = r#"{"checked":"false"}"#;
        assert_eq!(format_column_value("checkbox", &json!(true)).expect("bool"), checked);
        assert_eq!(format_column_value("checkbox", &json!("true")).expect("string"), checked);
        assert_eq!(format_column_value("checkbox", &json!("yes")).expect("other"), unchecked);
    }

    #[test]
    fn status_rejects_non_numeric_index() {
        assert!(format_column_value("status", &json!("done")).is_err());
    }
}
