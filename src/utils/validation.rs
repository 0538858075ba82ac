//! Utilidades de validación
//!
//! Este módulo contiene funciones helper para validación de datos
//! y conversión tolerante de tipos en la frontera con el backend.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};
use validator::ValidationError;

use crate::models::Coordinate;

/// Validar que un string no esté vacío
pub fn validate_not_empty(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut error = ValidationError::new("not_empty");
        error.add_param("value".into(), &value.to_string());
        return Err(error);
    }
    Ok(())
}

/// Validar latitud en grados
pub fn validate_latitude(value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() || !(-90.0..=90.0).contains(&value) {
        let mut error = ValidationError::new("latitude");
        error.add_param("actual".into(), &value);
        return Err(error);
    }
    Ok(())
}

/// Validar longitud en grados
pub fn validate_longitude(value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() || !(-180.0..=180.0).contains(&value) {
        let mut error = ValidationError::new("longitude");
        error.add_param("actual".into(), &value);
        return Err(error);
    }
    Ok(())
}

/// Validar una coordenada completa
pub fn validate_coordinate(value: &Coordinate) -> Result<(), ValidationError> {
    validate_latitude(value.lat)?;
    validate_longitude(value.lng)
}

/// Convertir string a datetime aceptando RFC3339, fecha sin zona (se asume UTC)
/// o epoch en milisegundos
pub fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    value.parse::<i64>().ok().and_then(epoch_millis)
}

fn epoch_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LooseScalar {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

/// `deserialize_with` para timestamps del backend; un valor ilegible se trata
/// como ausente en lugar de tumbar todo el payload
pub fn lenient_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<LooseScalar> = Option::deserialize(deserializer)?;
    Ok(match raw {
        Some(LooseScalar::Text(s)) => parse_datetime(&s),
        Some(LooseScalar::Int(ms)) => epoch_millis(ms),
        Some(LooseScalar::Float(ms)) => epoch_millis(ms as i64),
        Some(LooseScalar::Bool(_)) | None => None,
    })
}

/// `deserialize_with` para textos que el backend a veces manda como número
pub fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<LooseScalar> = Option::deserialize(deserializer)?;
    Ok(raw.map(|scalar| match scalar {
        LooseScalar::Text(s) => s,
        LooseScalar::Int(n) => n.to_string(),
        LooseScalar::Float(n) => n.to_string(),
        LooseScalar::Bool(b) => b.to_string(),
    }))
}
