use crate::domain::Snapshot;
use crate::error::PipelineError;
use crate::history::{normalize_history, PriorState};
use chrono::DateTime;
use serde_json::Value;

/// Prior state salvaged from a persisted document, plus what was wrong with it.
#[derive(Debug, Default)]
pub struct Recovered {
    pub state: PriorState,
    pub issues: Vec<PipelineError>,
}

/// Lenient counterpart of [`super::codec::deserialize`].
///
/// Never fails: anything unusable degrades to an empty history. Individual history
/// entries that do not decode as snapshots are dropped; the rest are re-ordered
/// newest-first and de-duplicated by date.
pub fn recover_history(bytes: &[u8]) -> Recovered {
    let mut out = Recovered::default();

    let root = match serde_json::from_slice::<Value>(bytes) {
        Ok(v) => v,
        Err(err) => {
            out.issues.push(malformed(format!("document is not valid JSON: {err}")));
            return out;
        }
    };

    let Value::Object(mut root) = root else {
        out.issues.push(malformed("document root is not a JSON object"));
        return out;
    };

    let mut update_time = None;
    match root.get("update_time").and_then(Value::as_str) {
        Some(s) => match DateTime::parse_from_rfc3339(s) {
            Ok(t) => update_time = Some(t),
            Err(err) => out
                .issues
                .push(malformed(format!("update_time {s:?} is not RFC 3339: {err}"))),
        },
        None => out.issues.push(malformed("update_time is missing")),
    }

    let entries = match root.remove("history") {
        Some(Value::Array(entries)) => entries,
        Some(_) => {
            out.issues.push(malformed("history is not an array"));
            return out;
        }
        None => {
            out.issues.push(malformed("history is missing"));
            return out;
        }
    };

    let total = entries.len();
    let mut history = Vec::with_capacity(total);
    for (idx, entry) in entries.into_iter().enumerate() {
        match serde_json::from_value::<Snapshot>(entry) {
            Ok(s) => history.push(s),
            Err(err) => out
                .issues
                .push(malformed(format!("history[{idx}] dropped: {err}"))),
        }
    }

    let decoded = history.len();
    let history = normalize_history(history);
    if history.len() != decoded {
        out.issues.push(malformed(format!(
            "history had {} duplicate date(s)",
            decoded - history.len()
        )));
    }

    tracing::debug!(total, kept = history.len(), "recovered persisted history");
    // A timestamp is only meaningful next to the history it described.
    if !history.is_empty() {
        out.state.update_time = update_time;
    }
    out.state.history = history;
    out
}

fn malformed(detail: impl Into<String>) -> PipelineError {
    PipelineError::MalformedPersistedState(detail.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn garbage_yields_empty_history() {
        for bytes in [&b"{not json"[..], b"", b"[1,2,3]", b"\"text\"", b"\xff\xfe"] {
            let r = recover_history(bytes);
            assert!(r.state.history.is_empty());
            assert!(!r.issues.is_empty());
            assert!(r.issues.iter().all(|i| !i.is_fatal()));
        }
    }

    #[test]
    fn wrong_history_type_yields_empty_history() {
        let v = json!({"date": "20240213", "update_time": "2024-02-13T16:30:00+08:00", "history": {"a": 1}});
        let r = recover_history(v.to_string().as_bytes());
        assert!(r.state.history.is_empty());
        assert!(r.state.update_time.is_none());
    }

    #[test]
    fn update_time_is_kept_only_with_surviving_history() {
        let garbage = json!({"update_time": "2099-01-01T00:00:00+08:00", "history": "garbage"});
        assert!(recover_history(garbage.to_string().as_bytes()).state.update_time.is_none());

        let all_bad = json!({"update_time": "2099-01-01T00:00:00+08:00", "history": ["oops"]});
        assert!(recover_history(all_bad.to_string().as_bytes()).state.update_time.is_none());

        let ok = json!({
            "update_time": "2024-02-13T16:30:00+08:00",
            "history": [{"date": "20240213", "items": {}}]
        });
        assert_eq!(
            recover_history(ok.to_string().as_bytes()).state.update_time,
            Some(DateTime::parse_from_rfc3339("2024-02-13T16:30:00+08:00").unwrap())
        );
    }

    #[test]
    fn drops_only_malformed_entries() {
        let v = json!({
            "update_time": "2024-02-13T16:30:00+08:00",
            "history": [
                {"date": "20240213", "items": {"2330": {"oi": 1}}},
                {"date": "2024-02-12", "items": {}},
                {"date": "20240211"},
                "oops",
                {"date": "20240210", "items": {"2330": {"oi": 2}}}
            ]
        });
        let r = recover_history(v.to_string().as_bytes());

        let dates: Vec<String> = r.state.history.iter().map(|s| s.date.to_string()).collect();
        assert_eq!(dates, vec!["20240213", "20240210"]);
        assert_eq!(r.issues.len(), 3);
    }

    #[test]
    fn reorders_and_dedups_entries() {
        let v = json!({
            "update_time": "2024-02-13T16:30:00+08:00",
            "history": [
                {"date": "20240210", "items": {}},
                {"date": "20240213", "items": {"k": {"v": "first"}}},
                {"date": "20240213", "items": {"k": {"v": "second"}}}
            ]
        });
        let r = recover_history(v.to_string().as_bytes());

        assert_eq!(r.state.history.len(), 2);
        assert_eq!(r.state.history[0].date.to_string(), "20240213");
        assert_eq!(r.state.history[0].items["k"]["v"], json!("first"));
        assert_eq!(r.issues.len(), 1);
    }

    #[test]
    fn well_formed_document_recovers_without_issues() {
        let v = json!({
            "date": "20240213",
            "items": {},
            "update_time": "2024-02-13T16:30:00+08:00",
            "history": [{"date": "20240213", "items": {}}]
        });
        let r = recover_history(v.to_string().as_bytes());
        assert!(r.issues.is_empty());
        assert_eq!(r.state.history.len(), 1);
    }
}
