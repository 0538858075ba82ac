//! Identificadores de entidades
//!
//! Newtypes para las identidades del roster. El backend a veces envía los ids
//! como número y otras veces como string; ambos se aceptan y se normalizan a
//! string, de modo que `ServiceRequest.branch_id` y `Route.branch_id` viven
//! siempre en el mismo espacio de claves.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Int(i64),
    Uint(u64),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            RawId::Text(s) => s.trim().to_string(),
            RawId::Int(n) => n.to_string(),
            RawId::Uint(n) => n.to_string(),
        }
    }
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Un id vacío no identifica nada: el evento que lo trae se descarta
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                RawId::deserialize(deserializer).map(|raw| Self(raw.into_string()))
            }
        }
    };
}

string_id!(
    /// Identidad canónica de una sucursal
    BranchId
);
string_id!(
    /// Identidad de un field engineer
    EngineerId
);
string_id!(
    /// Identidad de una solicitud de servicio
    RequestId
);

/// Identidad de una ruta activa, asignada localmente al aceptar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RouteId(pub u64);

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for RouteId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RawId::deserialize(deserializer)? {
            RawId::Uint(n) => Ok(RouteId(n)),
            RawId::Int(n) if n >= 0 => Ok(RouteId(n as u64)),
            RawId::Int(n) => Err(serde::de::Error::custom(format!("negative route id {}", n))),
            RawId::Text(s) => s
                .trim()
                .parse::<u64>()
                .map(RouteId)
                .map_err(|_| serde::de::Error::custom(format!("invalid route id '{}'", s))),
        }
    }
}
