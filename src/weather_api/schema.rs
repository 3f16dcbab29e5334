// weather_api - REST backend for storing and querying weather observations
//
// Copyright 2024 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

//! Parsing of JSON request bodies into observation changes.
//!
//! Bodies are parsed field by field rather than with a derived `Deserialize` so that
//! every problem with a payload is reported at once, keyed by the field it belongs to.
//! Fields that aren't client settable (`id`, `observation_time`) and unknown fields
//! are ignored.

use crate::model::{ObservationPatch, ValidationError, MSG_BLANK, MSG_REQUIRED};
use serde_json::{Map, Value};
use std::error;
use std::fmt;

const MSG_NULL: &str = "This field may not be null.";
const MSG_NUMBER: &str = "A valid number is required.";
const MSG_INTEGER: &str = "A valid integer is required.";
const MSG_STRING: &str = "Not a valid string.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadMode {
    /// Every required field must be present (create, PUT)
    Full,
    /// Any subset of fields may be present (PATCH)
    Partial,
}

#[derive(Debug)]
pub enum PayloadError {
    Malformed(String),
    Invalid(ValidationError),
}

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(e) => write!(f, "JSON parse error - {}", e),
            Self::Invalid(e) => write!(f, "{}", e),
        }
    }
}

impl error::Error for PayloadError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Invalid(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ValidationError> for PayloadError {
    fn from(e: ValidationError) -> Self {
        Self::Invalid(e)
    }
}

/// Parse the body of a create or update request.
pub fn observation_payload(body: &[u8], mode: PayloadMode) -> Result<ObservationPatch, PayloadError> {
    let fields = json_object(body)?;
    let mut errors = ValidationError::default();

    let patch = ObservationPatch {
        location: required(&fields, "location", &mut errors, string),
        temperature: required(&fields, "temperature", &mut errors, number),
        humidity: required(&fields, "humidity", &mut errors, number),
        pressure: nullable(&fields, "pressure", &mut errors, number),
        description: required(&fields, "description", &mut errors, string),
        wind_speed: nullable(&fields, "wind_speed", &mut errors, number),
        wind_direction: nullable(&fields, "wind_direction", &mut errors, integer),
        source: required(&fields, "source", &mut errors, string),
    };

    if mode == PayloadMode::Full {
        for field in patch.missing_required() {
            if errors.messages(field).is_empty() {
                errors.add(field, MSG_REQUIRED);
            }
        }
    }

    for (name, value) in [
        ("location", &patch.location),
        ("description", &patch.description),
        ("source", &patch.source),
    ] {
        if value.as_deref() == Some("") {
            errors.add(name, MSG_BLANK);
        }
    }

    errors.into_result()?;
    Ok(patch)
}

/// Body of a request to fetch current conditions from the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchRequest {
    pub city: Option<String>,
}

/// Parse the body of a fetch request. An empty body is the same as `{}`.
pub fn fetch_payload(body: &[u8]) -> Result<FetchRequest, PayloadError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(FetchRequest::default());
    }

    let fields = json_object(body)?;
    let mut errors = ValidationError::default();
    let city = nullable(&fields, "city", &mut errors, string).flatten();
    errors.into_result()?;

    Ok(FetchRequest {
        city: city.filter(|c| !c.is_empty()),
    })
}

fn json_object(body: &[u8]) -> Result<Map<String, Value>, PayloadError> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(other) => {
            let mut errors = ValidationError::default();
            errors.add(
                "non_field_errors",
                format!("Invalid data. Expected a dictionary, but got {}.", type_name(&other)),
            );
            Err(PayloadError::Invalid(errors))
        }
        Err(e) => Err(PayloadError::Malformed(e.to_string())),
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

/// Field that can't be `null` when present.
fn required<T>(
    fields: &Map<String, Value>,
    name: &str,
    errors: &mut ValidationError,
    parse: fn(&Value) -> Result<T, String>,
) -> Option<T> {
    match fields.get(name) {
        None => None,
        Some(Value::Null) => {
            errors.add(name, MSG_NULL);
            None
        }
        Some(v) => parse(v).map_err(|e| errors.add(name, e)).ok(),
    }
}

/// Field where `null` is a meaningful value.
fn nullable<T>(
    fields: &Map<String, Value>,
    name: &str,
    errors: &mut ValidationError,
    parse: fn(&Value) -> Result<T, String>,
) -> Option<Option<T>> {
    match fields.get(name) {
        None => None,
        Some(Value::Null) => Some(None),
        Some(v) => parse(v).map(Some).map_err(|e| errors.add(name, e)).ok(),
    }
}

/// Text with surrounding whitespace removed.
fn string(v: &Value) -> Result<String, String> {
    match v {
        Value::String(s) => Ok(s.trim().to_owned()),
        // Numbers are accepted and kept in their string form
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(MSG_STRING.to_owned()),
    }
}

fn number(v: &Value) -> Result<f64, String> {
    let n = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    n.filter(|f| f.is_finite()).ok_or_else(|| MSG_NUMBER.to_owned())
}

fn integer(v: &Value) -> Result<i32, String> {
    let n = match v {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && f.is_finite()).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
    .ok_or_else(|| MSG_INTEGER.to_owned())?;

    if n > i64::from(i32::MAX) {
        Err(format!("Ensure this value is less than or equal to {}.", i32::MAX))
    } else if n < i64::from(i32::MIN) {
        Err(format!("Ensure this value is greater than or equal to {}.", i32::MIN))
    } else {
        Ok(n as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full(v: Value) -> Result<ObservationPatch, PayloadError> {
        observation_payload(v.to_string().as_bytes(), PayloadMode::Full)
    }

    fn partial(v: Value) -> Result<ObservationPatch, PayloadError> {
        observation_payload(v.to_string().as_bytes(), PayloadMode::Partial)
    }

    fn invalid(res: Result<ObservationPatch, PayloadError>) -> ValidationError {
        match res {
            Err(PayloadError::Invalid(e)) => e,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn full_payload() {
        let patch = full(json!({
            "id": 99,
            "observation_time": "2001-01-01T00:00:00Z",
            "location": "Tokyo",
            "temperature": 28.5,
            "humidity": "71",
            "pressure": null,
            "wind_speed": 2,
            "wind_direction": 180.0,
            "unknown": "ignored",
        }))
        .unwrap();

        assert_eq!(
            ObservationPatch {
                location: Some("Tokyo".to_owned()),
                temperature: Some(28.5),
                humidity: Some(71.0),
                pressure: Some(None),
                description: None,
                wind_speed: Some(Some(2.0)),
                wind_direction: Some(Some(180)),
                source: None,
            },
            patch
        );
    }

    #[test]
    fn full_payload_missing_required() {
        let err = invalid(full(json!({"description": "fog"})));
        assert_eq!(vec!["humidity", "location", "temperature"], err.fields().collect::<Vec<_>>());
        assert_eq!(&["This field is required.".to_owned()], err.messages("location"));
    }

    #[test]
    fn partial_payload_missing_required_is_fine() {
        let patch = partial(json!({"humidity": 55})).unwrap();
        assert_eq!(Some(55.0), patch.humidity);
        assert_eq!(None, patch.location);
    }

    #[test]
    fn type_and_null_errors() {
        let err = invalid(partial(json!({
            "location": null,
            "temperature": "warm",
            "humidity": [1],
            "description": null,
            "wind_direction": 12.5,
            "source": {"a": 1},
        })));

        assert_eq!(&["This field may not be null.".to_owned()], err.messages("location"));
        assert_eq!(&["A valid number is required.".to_owned()], err.messages("temperature"));
        assert_eq!(&["A valid number is required.".to_owned()], err.messages("humidity"));
        assert_eq!(&["This field may not be null.".to_owned()], err.messages("description"));
        assert_eq!(&["A valid integer is required.".to_owned()], err.messages("wind_direction"));
        assert_eq!(&["Not a valid string.".to_owned()], err.messages("source"));
    }

    #[test]
    fn null_required_not_reported_twice() {
        let err = invalid(full(json!({"location": null, "temperature": 1, "humidity": 2})));
        assert_eq!(&["This field may not be null.".to_owned()], err.messages("location"));
    }

    #[test]
    fn blank_location() {
        let err = invalid(partial(json!({"location": "  "})));
        assert_eq!(&["This field may not be blank.".to_owned()], err.messages("location"));
    }

    #[test]
    fn blank_description_and_source() {
        let err = invalid(full(json!({
            "location": "Oslo",
            "temperature": 1,
            "humidity": 2,
            "description": "",
            "source": " \t",
        })));

        assert_eq!(vec!["description", "source"], err.fields().collect::<Vec<_>>());
        assert_eq!(&["This field may not be blank.".to_owned()], err.messages("description"));
        assert_eq!(&["This field may not be blank.".to_owned()], err.messages("source"));
    }

    #[test]
    fn strings_are_trimmed() {
        let patch = partial(json!({"location": "  Oslo ", "description": "\tfog\n", "source": " manual"})).unwrap();
        assert_eq!(Some("Oslo".to_owned()), patch.location);
        assert_eq!(Some("fog".to_owned()), patch.description);
        assert_eq!(Some("manual".to_owned()), patch.source);
    }

    #[test]
    fn integer_range() {
        let err = invalid(partial(json!({"wind_direction": 3_000_000_000i64})));
        assert_eq!(
            &["Ensure this value is less than or equal to 2147483647.".to_owned()],
            err.messages("wind_direction")
        );

        let patch = partial(json!({"wind_direction": "-45"})).unwrap();
        assert_eq!(Some(Some(-45)), patch.wind_direction);
    }

    #[test]
    fn malformed_json() {
        let res = observation_payload(b"{\"location\": ", PayloadMode::Full);
        assert!(matches!(res, Err(PayloadError::Malformed(_))));
    }

    #[test]
    fn not_an_object() {
        let err = invalid(full(json!([1, 2, 3])));
        assert_eq!(
            &["Invalid data. Expected a dictionary, but got list.".to_owned()],
            err.messages("non_field_errors")
        );
    }

    #[test]
    fn fetch_payload_variants() {
        assert_eq!(FetchRequest::default(), fetch_payload(b"").unwrap());
        assert_eq!(FetchRequest::default(), fetch_payload(b"  \n").unwrap());
        assert_eq!(FetchRequest::default(), fetch_payload(b"{}").unwrap());
        assert_eq!(FetchRequest::default(), fetch_payload(br#"{"city": null}"#).unwrap());
        assert_eq!(FetchRequest::default(), fetch_payload(br#"{"city": " "}"#).unwrap());
        assert_eq!(
            FetchRequest {
                city: Some("Paris".to_owned())
            },
            fetch_payload(br#"{"city": "Paris"}"#).unwrap()
        );

        assert!(matches!(fetch_payload(b"city=Paris"), Err(PayloadError::Malformed(_))));
        assert!(matches!(
            fetch_payload(br#"{"city": ["Paris"]}"#),
            Err(PayloadError::Invalid(_))
        ));
    }
}
