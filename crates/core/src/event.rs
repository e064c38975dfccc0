//! 디코딩된 EVE 레코드
//!
//! [`EveEvent`]는 삽입 순서를 보존하는 JSON 객체와 파싱된 `timestamp`를 함께 보관합니다.
//! 디코딩이 끝난 레코드는 항상 `"tags"` 배열을 가집니다.
//!
//! # 사용 예시
//! ```
//! use evetail_core::event::EveEvent;
//!
//! let line = r#"{"timestamp":"2024-01-15T12:00:00.000000+0000","event_type":"alert"}"#;
//! let mut event = EveEvent::from_line(line).unwrap();
//! event.add_tag("evetail.seen");
//! assert_eq!(event.event_type(), Some("alert"));
//! ```

use chrono::{DateTime, FixedOffset};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::DecodeError;

/// 센서 고유 형식: 콜론 없는 오프셋 (`2024-01-15T12:00:00.123456+0000`)
const EVE_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f%z";

const TAGS_KEY: &str = "tags";
const TIMESTAMP_KEY: &str = "timestamp";

/// 디코딩된 EVE 레코드
#[derive(Debug, Clone, PartialEq)]
pub struct EveEvent {
    fields: Map<String, Value>,
    timestamp: DateTime<FixedOffset>,
}

impl EveEvent {
    /// 한 줄의 JSON 텍스트를 디코딩합니다.
    pub fn from_line(line: &str) -> Result<Self, DecodeError> {
        let value: Value =
            serde_json::from_str(line).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;
        Self::from_value(value)
    }

    /// 이미 파싱된 JSON 값에서 레코드를 만듭니다.
    pub fn from_value(value: Value) -> Result<Self, DecodeError> {
        let Value::Object(mut fields) = value else {
            return Err(DecodeError::NotAnObject);
        };

        let raw = fields
            .get(TIMESTAMP_KEY)
            .and_then(Value::as_str)
            .ok_or(DecodeError::MissingTimestamp)?;
        let timestamp = parse_timestamp(raw)?;

        if !fields.get(TAGS_KEY).is_some_and(Value::is_array) {
            fields.insert(TAGS_KEY.to_owned(), Value::Array(Vec::new()));
        }

        Ok(Self { fields, timestamp })
    }

    /// 파싱된 레코드 시각
    pub fn timestamp(&self) -> DateTime<FixedOffset> {
        self.timestamp
    }

    /// `event_type` 필드 (alert, flow, dns, ...)
    pub fn event_type(&self) -> Option<&str> {
        self.fields.get("event_type").and_then(Value::as_str)
    }

    /// 최상위 필드를 조회합니다.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// 최상위 필드를 설정하고 이전 값을 반환합니다.
    ///
    /// `timestamp`와 `tags`는 불변식을 지키기 위해 덮어쓰지 않습니다.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        let key = key.into();
        if key == TIMESTAMP_KEY || (key == TAGS_KEY && !value.is_array()) {
            return None;
        }
        self.fields.insert(key, value)
    }

    /// 여러 최상위 필드를 한 번에 덮어씁니다.
    pub fn merge_fields(&mut self, fields: &Map<String, Value>) {
        for (key, value) in fields {
            self.insert(key.clone(), value.clone());
        }
    }

    /// `object` 객체 아래에 `key`를 설정합니다. `object`가 객체가 아니면 새 객체로 바꿉니다.
    pub fn insert_nested(&mut self, object: &str, key: &str, value: Value) {
        if object == TIMESTAMP_KEY || object == TAGS_KEY {
            return;
        }
        let entry = self
            .fields
            .entry(object.to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        if let Value::Object(map) = entry {
            map.insert(key.to_owned(), value);
        }
    }

    /// 태그를 추가합니다. 이미 있으면 무시합니다.
    pub fn add_tag(&mut self, tag: &str) {
        if let Some(Value::Array(tags)) = self.fields.get_mut(TAGS_KEY) {
            if !tags.iter().any(|t| t.as_str() == Some(tag)) {
                tags.push(Value::String(tag.to_owned()));
            }
        }
    }

    /// 문자열 태그 목록
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.fields
            .get(TAGS_KEY)
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
    }

    /// 전체 필드
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// 한 줄짜리 JSON 텍스트로 직렬화합니다 (개행 미포함).
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.fields)
    }

    /// JSON 값으로 변환합니다.
    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

impl Serialize for EveEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

/// RFC 3339를 먼저 시도하고, 실패하면 센서 고유 형식으로 파싱합니다.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<FixedOffset>, DecodeError> {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, EVE_TIMESTAMP_FORMAT))
        .map_err(|_| DecodeError::InvalidTimestamp {
            value: raw.to_owned(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use serde_json::json;

    #[test]
    fn decodes_native_timestamp() {
        let event = EveEvent::from_line(
            r#"{"timestamp":"2024-01-15T12:34:56.789012+0000","event_type":"flow"}"#,
        )
        .unwrap();
        let ts = event.timestamp();
        assert_eq!(ts.year(), 2024);
        assert_eq!(ts.hour(), 12);
        assert_eq!(ts.nanosecond(), 789_012_000);
        assert_eq!(event.event_type(), Some("flow"));
    }

    #[test]
    fn decodes_rfc3339_timestamp() {
        let event = EveEvent::from_line(r#"{"timestamp":"2024-01-15T12:00:00Z"}"#).unwrap();
        assert_eq!(event.timestamp().offset().local_minus_utc(), 0);

        let event = EveEvent::from_line(r#"{"timestamp":"2024-01-15T12:00:00-05:00"}"#).unwrap();
        assert_eq!(event.timestamp().offset().local_minus_utc(), -5 * 3600);
    }

    #[test]
    fn adds_empty_tags_when_absent() {
        let event = EveEvent::from_line(r#"{"timestamp":"2024-01-15T12:00:00Z"}"#).unwrap();
        assert_eq!(event.get("tags"), Some(&json!([])));
    }

    #[test]
    fn keeps_existing_tags() {
        let event =
            EveEvent::from_line(r#"{"timestamp":"2024-01-15T12:00:00Z","tags":["a","b"]}"#)
                .unwrap();
        assert_eq!(event.tags().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn replaces_non_array_tags() {
        let event =
            EveEvent::from_line(r#"{"timestamp":"2024-01-15T12:00:00Z","tags":"x"}"#).unwrap();
        assert_eq!(event.get("tags"), Some(&json!([])));
    }

    #[test]
    fn rejects_invalid_json() {
        let err = EveEvent::from_line("{not json").unwrap_err();
        assert!(matches!(err, DecodeError::InvalidJson(_)));
    }

    #[test]
    fn rejects_non_object() {
        assert_eq!(
            EveEvent::from_line("[1,2,3]").unwrap_err(),
            DecodeError::NotAnObject
        );
    }

    #[test]
    fn rejects_missing_timestamp() {
        assert_eq!(
            EveEvent::from_line(r#"{"event_type":"alert"}"#).unwrap_err(),
            DecodeError::MissingTimestamp
        );
        assert_eq!(
            EveEvent::from_line(r#"{"timestamp":12345}"#).unwrap_err(),
            DecodeError::MissingTimestamp
        );
    }

    #[test]
    fn rejects_bad_timestamp() {
        let err = EveEvent::from_line(r#"{"timestamp":"yesterday"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidTimestamp { .. }));
    }

    #[test]
    fn add_tag_is_idempotent() {
        let mut event = EveEvent::from_line(r#"{"timestamp":"2024-01-15T12:00:00Z"}"#).unwrap();
        event.add_tag("archived");
        event.add_tag("archived");
        assert_eq!(event.tags().count(), 1);
    }

    #[test]
    fn merge_fields_overwrites_but_protects_timestamp() {
        let mut event =
            EveEvent::from_line(r#"{"timestamp":"2024-01-15T12:00:00Z","host":"a"}"#).unwrap();
        let mut custom = Map::new();
        custom.insert("host".to_owned(), json!("sensor-01"));
        custom.insert("timestamp".to_owned(), json!("bogus"));
        event.merge_fields(&custom);
        assert_eq!(event.get("host"), Some(&json!("sensor-01")));
        assert_eq!(event.get("timestamp"), Some(&json!("2024-01-15T12:00:00Z")));
    }

    #[test]
    fn insert_nested_creates_and_replaces_objects() {
        let mut event =
            EveEvent::from_line(r#"{"timestamp":"2024-01-15T12:00:00Z","evetail":"x"}"#).unwrap();
        event.insert_nested("evetail", "filename", json!("/var/log/eve.json"));
        assert_eq!(
            event.get("evetail"),
            Some(&json!({"filename": "/var/log/eve.json"}))
        );
        event.insert_nested("evetail", "sensor", json!("s1"));
        assert_eq!(event.get("evetail").unwrap()["sensor"], json!("s1"));
    }

    #[test]
    fn serialization_preserves_field_order() {
        let line = r#"{"timestamp":"2024-01-15T12:00:00Z","zeta":1,"alpha":2,"tags":[]}"#;
        let event = EveEvent::from_line(line).unwrap();
        assert_eq!(event.to_json_line().unwrap(), line);
    }
}
