//! Distancias sobre la esfera terrestre
//!
//! Haversine para la distancia entre coordenadas y fórmula de punto destino
//! para aproximar el círculo geodésico del radio de búsqueda.

use geo::{Coord, LineString, Polygon};
use serde_json::{json, Value};

use crate::models::Coordinate;

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Vértices por defecto del polígono de radio
pub const DEFAULT_CIRCLE_POINTS: usize = 64;

/// Distancia de gran círculo en kilómetros (simétrica, 0 sólo si a == b)
pub fn distance_km(a: Coordinate, b: Coordinate) -> f64 {
    if a == b {
        return 0.0;
    }

    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlng = (b.lng - a.lng).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c
}

/// Distancia en metros, para umbrales de reposicionamiento
pub fn distance_m(a: Coordinate, b: Coordinate) -> f64 {
    distance_km(a, b) * 1000.0
}

/// Punto a `distance_km` desde `origin` con rumbo `bearing_rad`
fn destination(origin: Coordinate, bearing_rad: f64, distance_km: f64) -> Coordinate {
    let angular = distance_km / EARTH_RADIUS_KM;
    let lat1 = origin.lat.to_radians();
    let lng1 = origin.lng.to_radians();

    let lat2 = (lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * bearing_rad.cos()).asin();
    let lng2 = lng1
        + (bearing_rad.sin() * angular.sin() * lat1.cos())
            .atan2(angular.cos() - lat1.sin() * lat2.sin());

    let lng = (lng2.to_degrees() + 540.0) % 360.0 - 180.0;
    Coordinate::new(lat2.to_degrees(), lng)
}

/// Anillo cerrado de `points + 1` vértices que aproxima el círculo geodésico
/// de `radius_km` alrededor de `center` (x = lng, y = lat)
pub fn circle_polygon(center: Coordinate, radius_km: f64, points: usize) -> Polygon<f64> {
    let points = points.max(3);
    let mut ring: Vec<Coord<f64>> = (0..points)
        .map(|i| {
            let bearing = 2.0 * std::f64::consts::PI * (i as f64) / (points as f64);
            let vertex = destination(center, bearing, radius_km);
            Coord {
                x: vertex.lng,
                y: vertex.lat,
            }
        })
        .collect();
    ring.push(ring[0]);

    Polygon::new(LineString::from(ring), vec![])
}

/// Polígono como geometría GeoJSON para el overlay del mapa
pub fn polygon_to_geojson(polygon: &Polygon<f64>) -> Value {
    let ring: Vec<[f64; 2]> = polygon.exterior().coords().map(|c| [c.x, c.y]).collect();
    json!({
        "type": "Polygon",
        "coordinates": [ring],
    })
}
