//! Configuración de variables de entorno
//!
//! Este módulo maneja la configuración del entorno: endpoints de los
//! colaboradores externos y la política de despacho (radio, tarifa, umbrales).

use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} has an invalid value '{value}'")]
    InvalidValue { key: &'static str, value: String },

    #[error("{0}")]
    Inconsistent(String),
}

/// Política de expansión del radio de búsqueda
#[derive(Debug, Clone)]
pub struct RadiusPolicy {
    pub initial_radius_km: f64,
    pub step_km: f64,
    pub step_interval: Duration,
    pub max_radius_km: f64,
    /// Tiempo tras el cual una solicitud Pending expira
    pub request_ttl: Duration,
}

impl Default for RadiusPolicy {
    fn default() -> Self {
        Self {
            initial_radius_km: 5.0,
            step_km: 5.0,
            step_interval: Duration::from_secs(60),
            max_radius_km: 25.0,
            request_ttl: Duration::from_secs(30 * 60),
        }
    }
}

/// Política de tarifa: `round(base_fare + km * rate_per_km)`
#[derive(Debug, Clone)]
pub struct FarePolicy {
    pub base_fare: Decimal,
    pub rate_per_km: Decimal,
    pub currency_symbol: String,
}

impl Default for FarePolicy {
    fn default() -> Self {
        Self {
            base_fare: Decimal::from(45),
            rate_per_km: Decimal::from(15),
            currency_symbol: "₱".to_string(),
        }
    }
}

/// Configuración del entorno
#[derive(Debug, Clone)]
pub struct EnvironmentConfig {
    pub environment: String,
    pub port: u16,
    pub host: String,
    pub cors_origins: Vec<String>,
    pub backend_base_url: String,
    pub hub_url: String,
    pub hub_signalr_handshake: bool,
    pub directions_base_url: String,
    pub mapbox_token: Option<String>,
    pub directions_timeout: Duration,
    pub roster_poll_interval: Duration,
    pub scheduler_tick: Duration,
    /// Desplazamiento mínimo del engineer que dispara un nuevo enriquecimiento
    pub reposition_threshold_m: f64,
    pub radius: RadiusPolicy,
    pub fare: FarePolicy,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            port: 3000,
            host: "0.0.0.0".to_string(),
            cors_origins: Vec::new(),
            backend_base_url: "http://localhost:5000/api".to_string(),
            hub_url: "ws://localhost:5000/hubs/dispatch".to_string(),
            hub_signalr_handshake: true,
            directions_base_url: "https://api.mapbox.com".to_string(),
            mapbox_token: None,
            directions_timeout: Duration::from_secs(10),
            roster_poll_interval: Duration::from_secs(30),
            scheduler_tick: Duration::from_secs(5),
            reposition_threshold_m: 250.0,
            radius: RadiusPolicy::default(),
            fare: FarePolicy::default(),
        }
    }
}

impl EnvironmentConfig {
    /// Cargar configuración desde el entorno; cada clave ausente usa el default
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            environment: env_or("ENVIRONMENT", defaults.environment),
            port: parse_or("PORT", defaults.port)?,
            host: env_or("HOST", defaults.host),
            cors_origins: env::var("CORS_ORIGINS")
                .map(|origins| {
                    origins
                        .split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.cors_origins),
            backend_base_url: env_or("BACKEND_BASE_URL", defaults.backend_base_url),
            hub_url: env_or("HUB_URL", defaults.hub_url),
            hub_signalr_handshake: parse_or("HUB_SIGNALR_HANDSHAKE", defaults.hub_signalr_handshake)?,
            directions_base_url: env_or("DIRECTIONS_BASE_URL", defaults.directions_base_url),
            mapbox_token: env::var("MAPBOX_TOKEN").ok().filter(|t| !t.trim().is_empty()),
            directions_timeout: Duration::from_secs(parse_or(
                "DIRECTIONS_TIMEOUT_SECS",
                defaults.directions_timeout.as_secs(),
            )?),
            roster_poll_interval: Duration::from_secs(parse_or(
                "ROSTER_POLL_SECS",
                defaults.roster_poll_interval.as_secs(),
            )?),
            scheduler_tick: Duration::from_secs(parse_or(
                "SCHEDULER_TICK_SECS",
                defaults.scheduler_tick.as_secs(),
            )?),
            reposition_threshold_m: parse_or("REPOSITION_THRESHOLD_M", defaults.reposition_threshold_m)?,
            radius: RadiusPolicy {
                initial_radius_km: parse_or("INITIAL_RADIUS_KM", defaults.radius.initial_radius_km)?,
                step_km: parse_or("RADIUS_STEP_KM", defaults.radius.step_km)?,
                step_interval: Duration::from_secs(parse_or(
                    "RADIUS_STEP_SECS",
                    defaults.radius.step_interval.as_secs(),
                )?),
                max_radius_km: parse_or("MAX_RADIUS_KM", defaults.radius.max_radius_km)?,
                request_ttl: Duration::from_secs(parse_or(
                    "REQUEST_TTL_SECS",
                    defaults.radius.request_ttl.as_secs(),
                )?),
            },
            fare: FarePolicy {
                base_fare: parse_or("BASE_FARE", defaults.fare.base_fare)?,
                rate_per_km: parse_or("RATE_PER_KM", defaults.fare.rate_per_km)?,
                currency_symbol: env_or("CURRENCY_SYMBOL", defaults.fare.currency_symbol),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Verificar coherencia de la política de despacho
    pub fn validate(&self) -> Result<(), ConfigError> {
        let radius = &self.radius;
        if radius.initial_radius_km <= 0.0 || radius.step_km < 0.0 {
            return Err(ConfigError::Inconsistent(
                "radius values must be positive".to_string(),
            ));
        }
        if radius.max_radius_km < radius.initial_radius_km {
            return Err(ConfigError::Inconsistent(format!(
                "MAX_RADIUS_KM ({}) is below INITIAL_RADIUS_KM ({})",
                radius.max_radius_km, radius.initial_radius_km
            )));
        }
        if radius.step_interval.is_zero() || self.scheduler_tick.is_zero() {
            return Err(ConfigError::Inconsistent(
                "scheduler intervals must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Verificar si estamos en modo desarrollo
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    /// Obtener la URL del servidor
    pub fn server_url(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_or(key: &'static str, default: String) -> String {
    env::var(key).unwrap_or(default)
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        Err(_) => Ok(default),
    }
}
