//! Wire format of film change events.
//!
//! Two shapes travel on the log. The write API publishes a flat object:
//!
//! ```json
//! {"uuid": "…", "external_id": 7, "title": "Ran", "year": 1985, "last_update": "2024-01-02T03:04:05Z"}
//! ```
//!
//! The legacy store's change feed wraps its row in an envelope and uses its
//! own column names and loose types:
//!
//! ```json
//! {"payload": {"film_id": 7, "uuid": null, "title": "Ran", "release_year": "1985-01-01", "last_update": "1700000000000"}}
//! ```
//!
//! [`decode`] accepts both.

use crate::{SyncError, SyncResult};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use film_store::Film;
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;

const PAYLOAD_FIELD: &str = "payload";

/// A film as carried by one change event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilmEvent {
    #[serde(default, deserialize_with = "nullable_string")]
    pub uuid: String,
    #[serde(default, alias = "film_id", skip_serializing_if = "Option::is_none")]
    pub external_id: Option<i64>,
    #[serde(default, deserialize_with = "nullable_string")]
    pub title: String,
    #[serde(default, alias = "release_year", deserialize_with = "loose_year")]
    pub year: i32,
    #[serde(
        default,
        deserialize_with = "loose_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_update: Option<DateTime<Utc>>,
}

impl FilmEvent {
    pub fn into_film(self) -> Film {
        Film {
            row_id: None,
            uuid: self.uuid,
            external_id: self.external_id,
            title: self.title,
            year: self.year,
            last_update: self.last_update,
        }
    }
}

impl From<&Film> for FilmEvent {
    fn from(film: &Film) -> Self {
        Self {
            uuid: film.uuid.clone(),
            external_id: film.external_id,
            title: film.title.clone(),
            year: film.year,
            last_update: film.last_update,
        }
    }
}

/// Decode either wire shape.
pub fn decode(bytes: &[u8]) -> SyncResult<FilmEvent> {
    let value: Value = serde_json::from_slice(bytes).map_err(malformed)?;

    let body = match value {
        Value::Object(mut map) if map.contains_key(PAYLOAD_FIELD) => {
            match map.remove(PAYLOAD_FIELD) {
                Some(inner @ Value::Object(_)) => inner,
                _ => {
                    return Err(SyncError::Malformed(
                        "payload envelope carries no film".to_string(),
                    ))
                }
            }
        }
        flat @ Value::Object(_) => flat,
        _ => {
            return Err(SyncError::Malformed(
                "expected a JSON object".to_string(),
            ))
        }
    };

    serde_json::from_value(body).map_err(malformed)
}

/// Flat shape, as published by the write API.
pub fn encode(event: &FilmEvent) -> SyncResult<Vec<u8>> {
    serde_json::to_vec(event).map_err(malformed)
}

/// Enveloped shape.
pub fn encode_wrapped(event: &FilmEvent) -> SyncResult<Vec<u8>> {
    serde_json::to_vec(&Envelope { payload: event }).map_err(malformed)
}

#[derive(Serialize)]
struct Envelope<'a> {
    payload: &'a FilmEvent,
}

fn malformed(e: serde_json::Error) -> SyncError {
    SyncError::Malformed(e.to_string())
}

fn nullable_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Integer year, `YYYY-MM-DD` date, bare year string, or empty.
fn loose_year<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(0),
        Value::Number(n) => n
            .as_i64()
            .and_then(|year| i32::try_from(year).ok())
            .ok_or_else(|| de::Error::custom(format!("invalid year {n}"))),
        Value::String(s) => parse_year(&s).map_err(de::Error::custom),
        _ => Err(de::Error::custom("year must be a number or a string")),
    }
}

fn parse_year(value: &str) -> Result<i32, String> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(0);
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date.year());
    }
    if value.len() <= 4 && value.chars().all(|c| c.is_ascii_digit()) {
        return value.parse().map_err(|_| format!("invalid year {value:?}"));
    }
    Err(format!("release year {value:?} is neither a date nor a year"))
}

/// Epoch milliseconds (number or numeric string), RFC 3339, or empty.
fn loose_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("invalid timestamp {n}"))),
        Value::String(s) => parse_timestamp(&s).map_err(de::Error::custom),
        _ => Err(de::Error::custom("timestamp must be a number or a string")),
    }
}

fn parse_timestamp(value: &str) -> Result<Option<DateTime<Utc>>, String> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    if let Ok(millis) = value.parse::<i64>() {
        return DateTime::<Utc>::from_timestamp_millis(millis)
            .map(Some)
            .ok_or_else(|| format!("timestamp {millis} out of range"));
    }
    DateTime::parse_from_rfc3339(value)
        .map(|dt| Some(dt.with_timezone(&Utc)))
        .map_err(|_| format!("timestamp {value:?} is neither epoch millis nor RFC 3339"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_decode_flat_event() {
        let event = decode(br#"{"uuid":"u-1","title":"Blade Runner","year":1982}"#).unwrap();

        assert_eq!(event.uuid, "u-1");
        assert_eq!(event.title, "Blade Runner");
        assert_eq!(event.year, 1982);
        assert_eq!(event.external_id, None);
        assert_eq!(event.last_update, None);
    }

    #[test]
    fn test_decode_wrapped_change_feed_row() {
        let bytes = br#"{"schema":{},"payload":{"film_id":7,"uuid":null,"title":"Ran","release_year":"1985-06-01","last_update":"1700000000000","language_id":1}}"#;

        let event = decode(bytes).unwrap();

        assert_eq!(event.external_id, Some(7));
        assert_eq!(event.uuid, "");
        assert_eq!(event.year, 1985);
        assert_eq!(
            event.last_update,
            Some(Utc.timestamp_millis_opt(1_700_000_000_000).unwrap())
        );
    }

    #[test]
    fn test_empty_date_fields_leave_zero_values() {
        let event =
            decode(br#"{"payload":{"film_id":3,"title":"Heat","release_year":"","last_update":""}}"#)
                .unwrap();

        assert_eq!(event.year, 0);
        assert_eq!(event.last_update, None);
    }

    #[test]
    fn test_timestamp_accepts_rfc3339_and_numbers() {
        let event = decode(br#"{"uuid":"u","last_update":"2024-01-02T03:04:05Z"}"#).unwrap();
        assert_eq!(
            event.last_update,
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap())
        );

        let event = decode(br#"{"uuid":"u","last_update":1700000000000}"#).unwrap();
        assert_eq!(
            event.last_update,
            Some(Utc.timestamp_millis_opt(1_700_000_000_000).unwrap())
        );
    }

    #[test]
    fn test_unparseable_dates_are_malformed() {
        let bad_year = decode(br#"{"uuid":"u","year":"June 1982"}"#);
        assert!(matches!(bad_year, Err(SyncError::Malformed(_))));

        let bad_timestamp = decode(br#"{"uuid":"u","last_update":"yesterday"}"#);
        assert!(matches!(bad_timestamp, Err(SyncError::Malformed(_))));
    }

    #[test]
    fn test_non_object_payloads_are_malformed() {
        for bytes in [
            &b"not json"[..],
            &b""[..],
            &b"[1,2]"[..],
            &br#"{"payload":null}"#[..],
            &br#"{"payload":"x"}"#[..],
        ] {
            assert!(
                matches!(decode(bytes), Err(SyncError::Malformed(_))),
                "{:?} should be malformed",
                String::from_utf8_lossy(bytes)
            );
        }
    }

    #[test]
    fn test_both_shapes_round_trip() {
        let event = FilmEvent {
            uuid: "u-1".to_string(),
            external_id: Some(42),
            title: "Alien".to_string(),
            year: 1979,
            last_update: Some(Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap()),
        };

        assert_eq!(decode(&encode(&event).unwrap()).unwrap(), event);
        assert_eq!(decode(&encode_wrapped(&event).unwrap()).unwrap(), event);
    }

    #[test]
    fn test_flat_encoding_omits_absent_fields() {
        let event = FilmEvent {
            uuid: "u-1".to_string(),
            title: "Alien".to_string(),
            year: 1979,
            ..Default::default()
        };

        let json: Value = serde_json::from_slice(&encode(&event).unwrap()).unwrap();

        assert_eq!(
            json,
            serde_json::json!({"uuid": "u-1", "title": "Alien", "year": 1979})
        );
    }
}
