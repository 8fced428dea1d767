//! Shape and invariant checks for persisted documents.
//!
//! Checks run on `serde_json::Value` so the same rules apply to documents
//! read from disk and to documents about to be written.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate};
use serde_json::{Map, Value};

use super::model::{MAX_DAILY_QUOTA, MIN_DAILY_QUOTA};

/// Overlays stored top-level fields on the defaults. Non-object input is
/// returned unchanged so validation can reject it.
pub fn merge_defaults(defaults: Value, stored: Value) -> Value {
    match (defaults, stored) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                base.insert(key, value);
            }
            Value::Object(base)
        }
        (_, stored) => stored,
    }
}

fn object<'a>(value: &'a Value, what: &str) -> Result<&'a Map<String, Value>, String> {
    value.as_object().ok_or_else(|| format!("{what} must be an object"))
}

fn check_version(doc: &Map<String, Value>) -> Result<(), String> {
    match doc.get("version") {
        None | Some(Value::Null) => Ok(()),
        Some(v) if v.as_u64().is_some() => Ok(()),
        Some(_) => Err("version must be a non-negative integer".to_string()),
    }
}

fn check_timestamp(value: Option<&Value>, field: &str) -> Result<(), String> {
    match value {
        None | Some(Value::Null) => Ok(()),
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .map(|_| ())
            .map_err(|_| format!("{field} is not an RFC 3339 timestamp: {s:?}")),
        Some(_) => Err(format!("{field} must be a timestamp string")),
    }
}

pub fn validate_progress(value: &Value) -> Result<(), String> {
    let doc = object(value, "progress")?;
    check_version(doc)?;
    check_timestamp(doc.get("lastModified"), "lastModified")?;
    check_timestamp(doc.get("restoredFrom"), "restoredFrom")?;

    match doc.get("lastSentDate") {
        None | Some(Value::Null) => {}
        Some(Value::String(s)) => {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map_err(|_| format!("lastSentDate is not a YYYY-MM-DD date: {s:?}"))?;
        }
        Some(_) => return Err("lastSentDate must be a date string or null".to_string()),
    }

    match doc.get("backlogPosition") {
        Some(v) if v.as_u64().is_some() => {}
        Some(v) => return Err(format!("backlogPosition must be a non-negative integer, got {v}")),
        None => return Err("backlogPosition is missing".to_string()),
    }

    let Some(Value::Array(items)) = doc.get("sentItems") else {
        return Err("sentItems must be an array".to_string());
    };
    let Some(Value::Array(queue)) = doc.get("pendingQueue") else {
        return Err("pendingQueue must be an array".to_string());
    };

    let mut outstanding = HashSet::new();
    for (index, item) in items.iter().enumerate() {
        let entry = object(item, &format!("sentItems[{index}]"))?;
        let slug = match entry.get("slug") {
            Some(Value::String(s)) if !s.trim().is_empty() => s.as_str(),
            Some(Value::String(_)) => return Err(format!("sentItems[{index}].slug is empty")),
            _ => return Err(format!("sentItems[{index}] is missing slug")),
        };
        let Some(Value::Bool(solved)) = entry.get("solved") else {
            return Err(format!("sentItems[{index}] ({slug}) is missing solved"));
        };
        if entry.get("sentDate").is_none_or(Value::is_null) {
            return Err(format!("sentItems[{index}] ({slug}) is missing sentDate"));
        }
        check_timestamp(entry.get("sentDate"), &format!("sentItems[{index}].sentDate"))?;
        check_timestamp(
            entry.get("solvedTimestamp"),
            &format!("sentItems[{index}].solvedTimestamp"),
        )?;
        if *solved && entry.get("solvedTimestamp").is_none_or(Value::is_null) {
            return Err(format!("sentItems[{index}] ({slug}) is solved without solvedTimestamp"));
        }
        if !solved && !outstanding.insert(slug) {
            return Err(format!("{slug} is outstanding more than once"));
        }
    }

    let mut queued = HashSet::new();
    for (index, slug) in queue.iter().enumerate() {
        let slug = match slug.as_str() {
            Some(s) if !s.trim().is_empty() => s,
            _ => return Err(format!("pendingQueue[{index}] must be a non-empty slug")),
        };
        if outstanding.contains(slug) {
            return Err(format!("{slug} is both outstanding and pending"));
        }
        if !queued.insert(slug) {
            return Err(format!("{slug} is queued more than once"));
        }
    }

    Ok(())
}

pub fn validate_settings(value: &Value) -> Result<(), String> {
    let doc = object(value, "settings")?;
    check_version(doc)?;
    check_timestamp(doc.get("lastModified"), "lastModified")?;
    check_timestamp(doc.get("restoredFrom"), "restoredFrom")?;

    match doc.get("dailyQuota").and_then(Value::as_u64) {
        Some(q) if (MIN_DAILY_QUOTA as u64..=MAX_DAILY_QUOTA as u64).contains(&q) => {}
        _ => {
            return Err(format!(
                "dailyQuota must be an integer in [{MIN_DAILY_QUOTA}, {MAX_DAILY_QUOTA}]"
            ));
        }
    }

    if !matches!(doc.get("notificationsEnabled"), Some(Value::Bool(_))) {
        return Err("notificationsEnabled must be a boolean".to_string());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn progress(items: Value, queue: Value) -> Value {
        json!({
            "lastSentDate": "2024-05-01",
            "sentItems": items,
            "backlogPosition": 3,
            "pendingQueue": queue,
            "version": 2
        })
    }

    fn item(slug: &str, solved: bool) -> Value {
        let mut item = json!({"slug": slug, "solved": solved, "sentDate": "2024-05-01T07:00:00Z"});
        if solved {
            item["solvedTimestamp"] = json!("2024-05-01T09:30:00Z");
        }
        item
    }

    #[test]
    fn accepts_well_formed_progress() {
        let doc = progress(json!([item("a", true), item("b", false)]), json!(["c"]));
        assert_eq!(validate_progress(&doc), Ok(()));
    }

    #[test]
    fn rejects_non_array_collections() {
        let doc = progress(json!({"a": 1}), json!([]));
        assert!(validate_progress(&doc).unwrap_err().contains("sentItems"));
        let doc = progress(json!([]), json!("c"));
        assert!(validate_progress(&doc).unwrap_err().contains("pendingQueue"));
    }

    #[test]
    fn rejects_negative_position() {
        let mut doc = progress(json!([]), json!([]));
        doc["backlogPosition"] = json!(-1);
        assert!(validate_progress(&doc).unwrap_err().contains("backlogPosition"));
        doc["backlogPosition"] = json!(1.5);
        assert!(validate_progress(&doc).is_err());
    }

    #[test]
    fn rejects_incomplete_sent_items() {
        let doc = progress(json!([{"slug": "a", "solved": false}]), json!([]));
        assert!(validate_progress(&doc).unwrap_err().contains("sentDate"));
        let doc = progress(json!([{"solved": false, "sentDate": "2024-05-01T07:00:00Z"}]), json!([]));
        assert!(validate_progress(&doc).unwrap_err().contains("slug"));
        let doc = progress(json!([item("", false)]), json!([]));
        assert!(validate_progress(&doc).unwrap_err().contains("empty"));
        let doc = progress(
            json!([{"slug": "a", "solved": true, "sentDate": "2024-05-01T07:00:00Z"}]),
            json!([]),
        );
        assert!(validate_progress(&doc).unwrap_err().contains("solvedTimestamp"));
    }

    #[test]
    fn rejects_malformed_dates() {
        let doc = progress(
            json!([{"slug": "a", "solved": false, "sentDate": "yesterday"}]),
            json!([]),
        );
        assert!(validate_progress(&doc).unwrap_err().contains("RFC 3339"));
        let mut doc = progress(json!([]), json!([]));
        doc["lastSentDate"] = json!("05/01/2024");
        assert!(validate_progress(&doc).unwrap_err().contains("lastSentDate"));
    }

    #[test]
    fn rejects_slug_both_outstanding_and_pending() {
        let doc = progress(json!([item("a", false)]), json!(["a"]));
        assert!(validate_progress(&doc).unwrap_err().contains("outstanding and pending"));
        // A solved record does not conflict with a queued slug.
        let doc = progress(json!([item("a", true)]), json!(["a"]));
        assert_eq!(validate_progress(&doc), Ok(()));
    }

    #[test]
    fn settings_quota_bounds() {
        let ok = json!({"dailyQuota": 10, "notificationsEnabled": false});
        assert_eq!(validate_settings(&ok), Ok(()));
        for bad in [json!(0), json!(11), json!(2.5), json!("3")] {
            let doc = json!({"dailyQuota": bad, "notificationsEnabled": true});
            assert!(validate_settings(&doc).is_err(), "{doc}");
        }
    }

    #[test]
    fn merge_fills_missing_fields_only() {
        let merged = merge_defaults(
            json!({"dailyQuota": 1, "notificationsEnabled": true, "version": 0}),
            json!({"dailyQuota": 4}),
        );
        assert_eq!(merged, json!({"dailyQuota": 4, "notificationsEnabled": true, "version": 0}));
        assert_eq!(merge_defaults(json!({}), json!([1])), json!([1]));
    }
}
