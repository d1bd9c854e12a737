//! HTTP implementation of the control-plane client.
//!
//! Talks to an Octavia-style `/v2.0/lbaas` REST surface. Responses are JSON
//! envelopes (`{"pool": {...}}`); failures are normalized into
//! [`ClientError`] kinds by status code so nothing downstream depends on
//! this transport.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use crate::client::{ClientError, LoadBalancerApi};
use crate::pool::{
    ListenerSnapshot, LoadBalancerSnapshot, ParentRef, PoolSnapshot, PoolSpec, PoolUpdate,
};

const AUTH_HEADER: &str = "X-Auth-Token";

#[derive(Deserialize)]
struct PoolEnvelope {
    pool: PoolSnapshot,
}

#[derive(Deserialize)]
struct ListenerEnvelope {
    listener: ListenerSnapshot,
}

#[derive(Deserialize)]
struct LoadBalancerEnvelope {
    loadbalancer: LoadBalancerSnapshot,
}

/// Client for the load-balancer control-plane REST API.
pub struct HttpLoadBalancerClient {
    http: reqwest::Client,
    base_url: Url,
    token: String,
}

impl HttpLoadBalancerClient {
    /// Create a client for the given API endpoint and auth token.
    pub fn new(base_url: &str, token: impl Into<String>) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ClientError::Transport(format!("invalid base URL: {e}")))?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            token: token.into(),
        })
    }

    fn url(&self, path: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(path)
            .map_err(|e| ClientError::Transport(format!("invalid request path {path:?}: {e}")))
    }

    async fn check(
        response: Result<reqwest::Response, reqwest::Error>,
        resource: &str,
    ) -> Result<reqwest::Response, ClientError> {
        let response = response.map_err(|e| ClientError::Transport(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let detail = response.text().await.unwrap_or_default();
        Err(error_for_status(status, resource, detail))
    }

    async fn decode<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        response
            .json::<T>()
            .await
            .map_err(|e| ClientError::Transport(format!("malformed response body: {e}")))
    }
}

fn error_for_status(status: StatusCode, resource: &str, detail: String) -> ClientError {
    let message = if detail.is_empty() {
        format!("{resource}: {status}")
    } else {
        format!("{resource}: {status}: {detail}")
    };
    match status {
        StatusCode::NOT_FOUND => ClientError::NotFound(message),
        StatusCode::CONFLICT => ClientError::Conflict(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ClientError::Unauthorized(message),
        s if s.is_client_error() => ClientError::BadRequest(message),
        _ => ClientError::Transport(message),
    }
}

fn create_body(spec: &PoolSpec) -> serde_json::Value {
    let mut pool = serde_json::json!({
        "name": spec.name,
        "description": spec.description,
        "protocol": spec.protocol,
        "lb_algorithm": spec.lb_algorithm,
        "admin_state_up": spec.admin_state_up,
    });
    match &spec.parent {
        ParentRef::Listener(id) => pool["listener_id"] = serde_json::json!(id),
        ParentRef::LoadBalancer(id) => pool["loadbalancer_id"] = serde_json::json!(id),
    }
    if let Some(persistence) = &spec.persistence {
        pool["session_persistence"] = serde_json::json!(persistence);
    }
    serde_json::json!({ "pool": pool })
}

#[async_trait]
impl LoadBalancerApi for HttpLoadBalancerClient {
    #[instrument(skip(self, spec), fields(name = %spec.name))]
    async fn create_pool(&self, spec: &PoolSpec) -> Result<PoolSnapshot, ClientError> {
        let url = self.url("v2.0/lbaas/pools")?;
        let response = self
            .http
            .post(url)
            .header(AUTH_HEADER, &self.token)
            .json(&create_body(spec))
            .send()
            .await;
        let response = Self::check(response, "create pool").await?;
        let envelope: PoolEnvelope = Self::decode(response).await?;
        debug!(pool_id = %envelope.pool.id, "Created pool");
        Ok(envelope.pool)
    }

    #[instrument(skip(self))]
    async fn get_pool(&self, id: &str) -> Result<PoolSnapshot, ClientError> {
        let url = self.url(&format!("v2.0/lbaas/pools/{id}"))?;
        let response = self
            .http
            .get(url)
            .header(AUTH_HEADER, &self.token)
            .send()
            .await;
        let response = Self::check(response, &format!("pool {id}")).await?;
        let envelope: PoolEnvelope = Self::decode(response).await?;
        Ok(envelope.pool)
    }

    #[instrument(skip(self, update))]
    async fn update_pool(
        &self,
        id: &str,
        update: &PoolUpdate,
    ) -> Result<PoolSnapshot, ClientError> {
        let url = self.url(&format!("v2.0/lbaas/pools/{id}"))?;
        let response = self
            .http
            .put(url)
            .header(AUTH_HEADER, &self.token)
            .json(&serde_json::json!({ "pool": update }))
            .send()
            .await;
        let response = Self::check(response, &format!("pool {id}")).await?;
        let envelope: PoolEnvelope = Self::decode(response).await?;
        debug!(pool_id = %id, "Updated pool");
        Ok(envelope.pool)
    }

    #[instrument(skip(self))]
    async fn delete_pool(&self, id: &str) -> Result<(), ClientError> {
        let url = self.url(&format!("v2.0/lbaas/pools/{id}"))?;
        let response = self
            .http
            .delete(url)
            .header(AUTH_HEADER, &self.token)
            .send()
            .await;
        Self::check(response, &format!("pool {id}")).await?;
        debug!(pool_id = %id, "Delete accepted");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_listener(&self, id: &str) -> Result<ListenerSnapshot, ClientError> {
        let url = self.url(&format!("v2.0/lbaas/listeners/{id}"))?;
        let response = self
            .http
            .get(url)
            .header(AUTH_HEADER, &self.token)
            .send()
            .await;
        let response = Self::check(response, &format!("listener {id}")).await?;
        let envelope: ListenerEnvelope = Self::decode(response).await?;
        Ok(envelope.listener)
    }

    #[instrument(skip(self))]
    async fn get_load_balancer(&self, id: &str) -> Result<LoadBalancerSnapshot, ClientError> {
        let url = self.url(&format!("v2.0/lbaas/loadbalancers/{id}"))?;
        let response = self
            .http
            .get(url)
            .header(AUTH_HEADER, &self.token)
            .send()
            .await;
        let response = Self::check(response, &format!("load balancer {id}")).await?;
        let envelope: LoadBalancerEnvelope = Self::decode(response).await?;
        Ok(envelope.loadbalancer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{LbAlgorithm, PersistenceType, Protocol, SessionPersistence};

    fn spec() -> PoolSpec {
        PoolSpec {
            name: "web".to_string(),
            description: "primary".to_string(),
            protocol: Protocol::Https,
            lb_algorithm: LbAlgorithm::SourceIp,
            admin_state_up: false,
            persistence: None,
            parent: ParentRef::Listener("L1".to_string()),
        }
    }

    #[test]
    fn test_error_for_status_mapping() {
        assert!(matches!(
            error_for_status(StatusCode::NOT_FOUND, "pool P1", String::new()),
            ClientError::NotFound(_)
        ));
        assert!(matches!(
            error_for_status(StatusCode::CONFLICT, "pool P1", "immutable".to_string()),
            ClientError::Conflict(_)
        ));
        assert!(matches!(
            error_for_status(StatusCode::UNAUTHORIZED, "pool P1", String::new()),
            ClientError::Unauthorized(_)
        ));
        assert!(matches!(
            error_for_status(StatusCode::FORBIDDEN, "pool P1", String::new()),
            ClientError::Unauthorized(_)
        ));
        assert!(matches!(
            error_for_status(StatusCode::BAD_REQUEST, "pool P1", String::new()),
            ClientError::BadRequest(_)
        ));
        assert!(matches!(
            error_for_status(StatusCode::INTERNAL_SERVER_ERROR, "pool P1", String::new()),
            ClientError::Transport(_)
        ));
    }

    #[test]
    fn test_error_for_status_includes_detail() {
        let err = error_for_status(
            StatusCode::CONFLICT,
            "pool P1",
            "pool is immutable".to_string(),
        );
        assert!(err.to_string().contains("pool is immutable"));
    }

    #[test]
    fn test_create_body_with_listener_parent() {
        let body = create_body(&spec());
        assert_eq!(body["pool"]["name"], "web");
        assert_eq!(body["pool"]["protocol"], "HTTPS");
        assert_eq!(body["pool"]["lb_algorithm"], "SOURCE_IP");
        assert_eq!(body["pool"]["admin_state_up"], false);
        assert_eq!(body["pool"]["listener_id"], "L1");
        assert!(body["pool"].get("loadbalancer_id").is_none());
        assert!(body["pool"].get("session_persistence").is_none());
    }

    #[test]
    fn test_create_body_with_load_balancer_and_persistence() {
        let mut spec = spec();
        spec.parent = ParentRef::LoadBalancer("LB1".to_string());
        spec.persistence = Some(SessionPersistence {
            kind: PersistenceType::AppCookie,
            cookie_name: Some("JSESSIONID".to_string()),
        });

        let body = create_body(&spec);
        assert_eq!(body["pool"]["loadbalancer_id"], "LB1");
        assert!(body["pool"].get("listener_id").is_none());
        assert_eq!(body["pool"]["session_persistence"]["type"], "APP_COOKIE");
        assert_eq!(
            body["pool"]["session_persistence"]["cookie_name"],
            "JSESSIONID"
        );
    }

    #[test]
    fn test_update_envelope_omits_unchanged_fields() {
        let update = PoolUpdate {
            lb_algorithm: Some(LbAlgorithm::RoundRobin),
            ..Default::default()
        };
        let body = serde_json::json!({ "pool": update });
        assert_eq!(body["pool"]["lb_algorithm"], "ROUND_ROBIN");
        assert!(body["pool"].get("name").is_none());
        assert!(body["pool"].get("admin_state_up").is_none());
    }

    #[test]
    fn test_snapshot_deserialization() {
        let envelope: PoolEnvelope = serde_json::from_value(serde_json::json!({
            "pool": {
                "id": "P1",
                "name": "web",
                "protocol": "HTTP",
                "lb_algorithm": "ROUND_ROBIN",
                "admin_state_up": true,
                "provisioning_status": "ACTIVE",
                "listeners": [{"id": "L1"}],
                "loadbalancers": []
            }
        }))
        .unwrap();

        assert_eq!(envelope.pool.id, "P1");
        assert_eq!(envelope.pool.provisioning_status, "ACTIVE");
        assert_eq!(envelope.pool.listeners.len(), 1);
        assert_eq!(envelope.pool.listeners[0].id, "L1");
    }

    #[test]
    fn test_url_join() {
        let client = HttpLoadBalancerClient::new("https://lb.example.net/", "token").unwrap();
        let url = client.url("v2.0/lbaas/pools/P1").unwrap();
        assert_eq!(url.as_str(), "https://lb.example.net/v2.0/lbaas/pools/P1");
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let result = HttpLoadBalancerClient::new("not a url", "token");
        assert!(matches!(result, Err(ClientError::Transport(_))));
    }
}
