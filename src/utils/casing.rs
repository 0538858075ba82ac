//! Canonicalización de claves JSON
//!
//! El backend varía el casing de los campos (`branchId`, `BranchId`,
//! `branch_id`). Todo payload entrante pasa por aquí una sola vez: las claves
//! quedan en minúsculas sin separadores, los alias conocidos se mueven a su
//! clave canónica y las posiciones anidadas se aplanan a `latitude`/`longitude`.

use serde_json::{Map, Value};

use crate::models::field_engineer::canonical_token;

/// Objetos anidados que pueden traer la posición de la entidad
const NESTED_POSITION_KEYS: &[&str] = &["location", "coordinate", "coordinates", "position", "coords"];

/// Canonicaliza las claves de primer nivel de un payload y aplica `aliases`
/// (pares alias -> canónica). Un alias nunca pisa una clave canónica presente.
pub fn canonicalize_payload(value: Value, aliases: &[(&str, &str)]) -> Value {
    let Value::Object(object) = value else {
        return value;
    };

    let mut canonical = Map::with_capacity(object.len());
    for (key, value) in object {
        canonical.insert(canonical_token(&key), value);
    }

    lift_nested_position(&mut canonical);

    for (alias, target) in aliases {
        if let Some(value) = canonical.remove(*alias) {
            if !canonical.contains_key(*target) && !value.is_null() {
                canonical.insert(target.to_string(), value);
            }
        }
    }

    Value::Object(canonical)
}

/// `{"location": {"lat": .., "lng": ..}}` o GeoJSON `[lng, lat]` -> campos planos
fn lift_nested_position(object: &mut Map<String, Value>) {
    if object.contains_key("latitude") || object.contains_key("lat") {
        return;
    }

    for key in NESTED_POSITION_KEYS {
        let Some(nested) = object.get(*key) else {
            continue;
        };

        let lifted = match nested {
            Value::Object(inner) => {
                let inner: Map<String, Value> = inner
                    .iter()
                    .map(|(k, v)| (canonical_token(k), v.clone()))
                    .collect();
                let lat = inner.get("lat").or_else(|| inner.get("latitude")).cloned();
                let lng = inner
                    .get("lng")
                    .or_else(|| inner.get("lon"))
                    .or_else(|| inner.get("longitude"))
                    .cloned();
                lat.zip(lng)
            }
            Value::Array(pair) if pair.len() >= 2 => Some((pair[1].clone(), pair[0].clone())),
            _ => None,
        };

        if let Some((lat, lng)) = lifted {
            object.remove(*key);
            object.insert("latitude".to_string(), lat);
            object.insert("longitude".to_string(), lng);
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mixed_casing_maps_to_one_key() {
        for payload in [
            json!({"branchId": "b-1"}),
            json!({"BranchId": "b-1"}),
            json!({"branch_id": "b-1"}),
        ] {
            let canonical = canonicalize_payload(payload, &[]);
            assert_eq!(canonical["branchid"], "b-1");
        }
    }

    #[test]
    fn test_alias_does_not_override_canonical_key() {
        let payload = json!({"Id": "mongo-id", "feId": "fe-7"});
        let canonical = canonicalize_payload(payload, &[("id", "feid")]);
        assert_eq!(canonical["feid"], "fe-7");
        assert!(canonical.get("id").is_none());
    }

    #[test]
    fn test_nested_location_is_lifted() {
        let canonical = canonicalize_payload(json!({"Location": {"Lat": 14.6, "Lng": 121.0}}), &[]);
        assert_eq!(canonical["latitude"], 14.6);
        assert_eq!(canonical["longitude"], 121.0);

        let geojson = canonicalize_payload(json!({"coordinates": [121.0, 14.6]}), &[]);
        assert_eq!(geojson["latitude"], 14.6);
        assert_eq!(geojson["longitude"], 121.0);
    }

    #[test]
    fn test_non_object_passes_through() {
        assert_eq!(canonicalize_payload(json!("x"), &[]), json!("x"));
    }
}
