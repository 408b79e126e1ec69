//! Serde helpers for server timestamps.
//!
//! The vault emits ISO-8601 without an offset (`2024-05-01T10:20:30.123456`);
//! such values are UTC. RFC 3339 values with an offset are accepted as well.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serializer};

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parses a server timestamp.
pub fn parse(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}

pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_rfc3339())
}

/// The same, for optional fields. `null` and unparseable values read as `None`.
pub mod option {
    use super::*;

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(value) => super::serialize(value, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().and_then(parse))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn naive_timestamps_are_utc() {
        let parsed = parse("2024-05-01T10:20:30.123456").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-05-01T10:20:30.123456+00:00");
        assert!(parse("2024-05-01 10:20:30").is_some());
    }

    #[test]
    fn offsets_are_honoured() {
        let parsed = parse("2024-05-01T12:00:00+02:00").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-05-01T10:00:00+00:00");
    }

    #[derive(serde::Deserialize)]
    struct Stamped {
        #[serde(with = "option", default)]
        at: Option<DateTime<Utc>>,
    }

    #[test]
    fn optional_fields_tolerate_null_and_garbage() {
        let read = |body: &str| sonic_rs::from_str::<Stamped>(body).unwrap().at;
        assert_eq!(read(r#"{"at":"2024-05-01T10:00:00"}"#), parse("2024-05-01T10:00:00Z"));
        assert!(read(r#"{"at":null}"#).is_none());
        assert!(read(r#"{"at":"soon"}"#).is_none());
        assert!(read("{}").is_none());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse("yesterday").is_none());
        assert!(parse("").is_none());
    }
}
