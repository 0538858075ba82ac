//! Cliente REST del backend de despacho
//!
//! El backend es el sistema de registro de sucursales, engineers y
//! solicitudes. Sus fallas son transitorias y se devuelven tipadas al llamador.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use crate::dto::backend_dto::{extract_entity, extract_list, AcceptServiceRequestBody, CreateServiceRequestBody};
use crate::models::RequestId;
use crate::utils::errors::{AppError, AppResult};

#[async_trait]
pub trait DispatchBackend: Send + Sync {
    async fn fetch_branches(&self) -> AppResult<Vec<Value>>;
    async fn fetch_engineers(&self) -> AppResult<Vec<Value>>;
    async fn fetch_service_requests(&self) -> AppResult<Vec<Value>>;
    /// Devuelve la solicitud creada tal como la representa el backend
    async fn create_service_request(&self, body: &CreateServiceRequestBody) -> AppResult<Value>;
    async fn accept_service_request(
        &self,
        request_id: &RequestId,
        body: &AcceptServiceRequestBody,
    ) -> AppResult<()>;
}

pub struct HttpDispatchBackend {
    base_url: String,
    client: Client,
}

impl HttpDispatchBackend {
    pub fn new(base_url: String) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_list(&self, path: &str) -> AppResult<Vec<Value>> {
        let url = self.url(path);
        log::debug!("📥 GET {}", url);

        let response = self.client
            .get(&url)
            .header("User-Agent", "FieldDispatch/1.0")
            .header("X-Request-Id", uuid::Uuid::new_v4().to_string())
            .send()
            .await?;

        let body = Self::read_json(path, response).await?;
        Ok(extract_list(body))
    }

    async fn read_json(path: &str, response: reqwest::Response) -> AppResult<Value> {
        let status = response.status();
        let response_text = response.text().await?;

        if !status.is_success() {
            log::error!("❌ Backend {} respondió {}: {}", path, status, response_text);
            return Err(AppError::ExternalApi(format!(
                "{} returned {}: {}",
                path, status, response_text
            )));
        }

        if response_text.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&response_text)
            .map_err(|e| AppError::ExternalApi(format!("{} returned invalid JSON: {}", path, e)))
    }
}

#[async_trait]
impl DispatchBackend for HttpDispatchBackend {
    async fn fetch_branches(&self) -> AppResult<Vec<Value>> {
        self.get_list("/branches").await
    }

    async fn fetch_engineers(&self) -> AppResult<Vec<Value>> {
        self.get_list("/fieldEngineers").await
    }

    async fn fetch_service_requests(&self) -> AppResult<Vec<Value>> {
        self.get_list("/serviceRequests").await
    }

    async fn create_service_request(&self, body: &CreateServiceRequestBody) -> AppResult<Value> {
        let path = "/serviceRequests";
        log::info!("📤 Creando solicitud de servicio para sucursal {}", body.branch_id);

        let response = self.client
            .post(self.url(path))
            .header("User-Agent", "FieldDispatch/1.0")
            .header("X-Request-Id", uuid::Uuid::new_v4().to_string())
            .json(body)
            .send()
            .await?;

        let created = Self::read_json(path, response).await?;
        Ok(extract_entity(created))
    }

    async fn accept_service_request(
        &self,
        request_id: &RequestId,
        body: &AcceptServiceRequestBody,
    ) -> AppResult<()> {
        let path = format!("/serviceRequests/{}/accept", urlencoding::encode(request_id.as_str()));
        log::info!("📤 Aceptando solicitud {} con engineer {}", request_id, body.fe_id);

        let response = self.client
            .post(self.url(&path))
            .header("User-Agent", "FieldDispatch/1.0")
            .header("X-Request-Id", uuid::Uuid::new_v4().to_string())
            .json(body)
            .send()
            .await?;

        Self::read_json(&path, response).await?;
        Ok(())
    }
}
