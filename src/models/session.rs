//! Server-side sessions and the signed-in user.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};

/// A durable conversation the backend can resume.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Session {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Raw creation timestamp. Routes disagree on the format.
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Session {
    /// Parse `created_at`, trying each format the backend is known to emit.
    pub fn created(&self) -> Option<DateTime<Utc>> {
        let raw = self.created_at.as_deref()?.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(|naive| naive.and_utc())
    }

    /// Format the creation time for the session list.
    pub fn created_display(&self) -> String {
        match self.created() {
            Some(dt) => dt.format("%b %-d, %-I:%M %p").to_string(),
            None => "—".to_string(),
        }
    }
}

/// Profile of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct User {
    pub email: String,
    #[serde(default)]
    pub profile_url: Option<String>,
}

/// Accept an identifier encoded as either a JSON string or number.
pub fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

/// Optional variant of [`string_or_number`].
pub fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_session_id() {
        let session: Session =
            serde_json::from_str(r#"{"id": 42, "created_at": "2026-10-01T09:05:00"}"#).unwrap();
        assert_eq!(session.id, "42");
        assert_eq!(session.created_display(), "Oct 1, 9:05 AM");
    }

    #[test]
    fn test_rfc2822_created_at() {
        let session = Session {
            id: "s1".to_string(),
            created_at: Some("Tue, 13 Oct 2026 18:30:00 GMT".to_string()),
        };
        assert_eq!(session.created_display(), "Oct 13, 6:30 PM");
    }

    #[test]
    fn test_missing_created_at() {
        let session: Session = serde_json::from_str(r#"{"id": "abc"}"#).unwrap();
        assert_eq!(session.created_display(), "—");

        let bogus = Session {
            id: "abc".to_string(),
            created_at: Some("yesterday".to_string()),
        };
        assert_eq!(bogus.created_display(), "—");
    }
}
