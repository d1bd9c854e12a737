//! Typed pool model, validation, and update diffing.
//!
//! The declared spec is fully typed at the boundary: enums for the wire
//! string fields and a `ParentRef` enum that makes the listener/load-balancer
//! exclusivity unrepresentable rather than checked at runtime.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Provisioning statuses reported by the control plane.
pub mod status {
    pub const ACTIVE: &str = "ACTIVE";
    pub const DELETED: &str = "DELETED";
    pub const ERROR: &str = "ERROR";
    pub const PENDING_CREATE: &str = "PENDING_CREATE";
    pub const PENDING_UPDATE: &str = "PENDING_UPDATE";
    pub const PENDING_DELETE: &str = "PENDING_DELETE";

    /// Statuses that indicate an in-progress transition during create/update.
    pub const PENDING: &[&str] = &[PENDING_CREATE, PENDING_UPDATE];

    /// Statuses a pool may pass through while being torn down. ERROR and
    /// ACTIVE are treated as in-progress here because the backend may report
    /// either briefly before the record disappears.
    pub const PENDING_DELETE_SET: &[&str] = &[ERROR, PENDING_UPDATE, PENDING_DELETE, ACTIVE];
}

/// Pool protocol. Immutable after creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Protocol {
    Tcp,
    Udp,
    Http,
    Https,
    Proxy,
    Sctp,
    #[serde(rename = "PROXYV2")]
    ProxyV2,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
            Protocol::Http => "HTTP",
            Protocol::Https => "HTTPS",
            Protocol::Proxy => "PROXY",
            Protocol::Sctp => "SCTP",
            Protocol::ProxyV2 => "PROXYV2",
        }
    }
}

/// Load-balancing algorithm. Mutable after creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LbAlgorithm {
    RoundRobin,
    LeastConnections,
    SourceIp,
    SourceIpPort,
}

impl LbAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            LbAlgorithm::RoundRobin => "ROUND_ROBIN",
            LbAlgorithm::LeastConnections => "LEAST_CONNECTIONS",
            LbAlgorithm::SourceIp => "SOURCE_IP",
            LbAlgorithm::SourceIpPort => "SOURCE_IP_PORT",
        }
    }
}

/// Session persistence type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PersistenceType {
    SourceIp,
    HttpCookie,
    AppCookie,
}

/// Session persistence policy. Immutable after creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPersistence {
    #[serde(rename = "type")]
    pub kind: PersistenceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie_name: Option<String>,
}

/// The parent resource a pool attaches to. Exactly one of the two is set,
/// enforced by the type rather than validated at runtime.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParentRef {
    Listener(String),
    LoadBalancer(String),
}

impl ParentRef {
    pub fn id(&self) -> &str {
        match self {
            ParentRef::Listener(id) | ParentRef::LoadBalancer(id) => id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ParentRef::Listener(_) => "listener",
            ParentRef::LoadBalancer(_) => "loadbalancer",
        }
    }
}

fn default_admin_state_up() -> bool {
    true
}

/// Declared state of a pool, as supplied by the caller.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PoolSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub protocol: Protocol,
    pub lb_algorithm: LbAlgorithm,
    #[serde(default = "default_admin_state_up")]
    pub admin_state_up: bool,
    #[serde(default)]
    pub persistence: Option<SessionPersistence>,
    pub parent: ParentRef,
}

/// Spec validation failures, raised before any remote call.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpecError {
    #[error("persistence cookie_name must be set when using APP_COOKIE persistence")]
    MissingCookieName,
    #[error("persistence cookie_name can only be set when using APP_COOKIE persistence")]
    UnexpectedCookieName,
}

impl PoolSpec {
    /// Check invariants that the control plane would reject anyway, so the
    /// caller fails fast without a remote round trip.
    pub fn validate(&self) -> Result<(), SpecError> {
        if let Some(persistence) = &self.persistence {
            let has_cookie = persistence
                .cookie_name
                .as_deref()
                .is_some_and(|name| !name.is_empty());
            match persistence.kind {
                PersistenceType::AppCookie if !has_cookie => {
                    return Err(SpecError::MissingCookieName)
                }
                PersistenceType::SourceIp | PersistenceType::HttpCookie if has_cookie => {
                    return Err(SpecError::UnexpectedCookieName)
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Back-reference to a related resource, as reported by the control plane.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub id: String,
}

/// A pool as reported by the control plane. `provisioning_status` is only
/// meaningful transiently during convergence waits; the back-reference lists
/// are used for read/import only, never for writes.
#[derive(Clone, Debug, Deserialize)]
pub struct PoolSnapshot {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub protocol: String,
    pub lb_algorithm: String,
    pub admin_state_up: bool,
    #[serde(default)]
    pub session_persistence: Option<SessionPersistence>,
    #[serde(default)]
    pub provisioning_status: String,
    #[serde(default)]
    pub listeners: Vec<ResourceRef>,
    #[serde(default)]
    pub loadbalancers: Vec<ResourceRef>,
}

/// A listener as seen by the reconciler: identity and status only.
#[derive(Clone, Debug, Deserialize)]
pub struct ListenerSnapshot {
    pub id: String,
    #[serde(default)]
    pub provisioning_status: String,
}

/// A load balancer as seen by the reconciler: identity and status only.
#[derive(Clone, Debug, Deserialize)]
pub struct LoadBalancerSnapshot {
    pub id: String,
    #[serde(default)]
    pub provisioning_status: String,
}

/// Access to the remote-reported provisioning status, for the generic poller.
pub trait HasStatus {
    fn provisioning_status(&self) -> &str;
}

impl HasStatus for PoolSnapshot {
    fn provisioning_status(&self) -> &str {
        &self.provisioning_status
    }
}

impl HasStatus for ListenerSnapshot {
    fn provisioning_status(&self) -> &str {
        &self.provisioning_status
    }
}

impl HasStatus for LoadBalancerSnapshot {
    fn provisioning_status(&self) -> &str {
        &self.provisioning_status
    }
}

/// Minimal update payload: only the mutable fields, only when changed.
/// Protocol, parent reference, and persistence are immutable and force
/// recreation at a higher layer.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PoolUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lb_algorithm: Option<LbAlgorithm>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_state_up: Option<bool>,
}

impl PoolUpdate {
    /// Diff the mutable fields of the desired spec against the current
    /// remote snapshot.
    pub fn diff(current: &PoolSnapshot, desired: &PoolSpec) -> Self {
        let mut update = PoolUpdate::default();
        if current.name != desired.name {
            update.name = Some(desired.name.clone());
        }
        if current.description != desired.description {
            update.description = Some(desired.description.clone());
        }
        if current.lb_algorithm != desired.lb_algorithm.as_str() {
            update.lb_algorithm = Some(desired.lb_algorithm);
        }
        if current.admin_state_up != desired.admin_state_up {
            update.admin_state_up = Some(desired.admin_state_up);
        }
        update
    }

    pub fn is_empty(&self) -> bool {
        *self == PoolUpdate::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_spec() -> PoolSpec {
        PoolSpec {
            name: "web".to_string(),
            description: String::new(),
            protocol: Protocol::Http,
            lb_algorithm: LbAlgorithm::RoundRobin,
            admin_state_up: true,
            persistence: None,
            parent: ParentRef::Listener("L1".to_string()),
        }
    }

    fn base_snapshot() -> PoolSnapshot {
        PoolSnapshot {
            id: "P1".to_string(),
            name: "web".to_string(),
            description: String::new(),
            protocol: "HTTP".to_string(),
            lb_algorithm: "ROUND_ROBIN".to_string(),
            admin_state_up: true,
            session_persistence: None,
            provisioning_status: status::ACTIVE.to_string(),
            listeners: vec![],
            loadbalancers: vec![],
        }
    }

    #[test]
    fn test_validate_ok_without_persistence() {
        assert_eq!(base_spec().validate(), Ok(()));
    }

    #[test]
    fn test_validate_app_cookie_requires_cookie_name() {
        let mut spec = base_spec();
        spec.persistence = Some(SessionPersistence {
            kind: PersistenceType::AppCookie,
            cookie_name: None,
        });
        assert_eq!(spec.validate(), Err(SpecError::MissingCookieName));

        spec.persistence = Some(SessionPersistence {
            kind: PersistenceType::AppCookie,
            cookie_name: Some(String::new()),
        });
        assert_eq!(spec.validate(), Err(SpecError::MissingCookieName));

        spec.persistence = Some(SessionPersistence {
            kind: PersistenceType::AppCookie,
            cookie_name: Some("JSESSIONID".to_string()),
        });
        assert_eq!(spec.validate(), Ok(()));
    }

    #[test]
    fn test_validate_cookie_name_rejected_for_other_types() {
        let mut spec = base_spec();
        spec.persistence = Some(SessionPersistence {
            kind: PersistenceType::SourceIp,
            cookie_name: Some("JSESSIONID".to_string()),
        });
        assert_eq!(spec.validate(), Err(SpecError::UnexpectedCookieName));

        spec.persistence = Some(SessionPersistence {
            kind: PersistenceType::HttpCookie,
            cookie_name: Some("JSESSIONID".to_string()),
        });
        assert_eq!(spec.validate(), Err(SpecError::UnexpectedCookieName));

        spec.persistence = Some(SessionPersistence {
            kind: PersistenceType::SourceIp,
            cookie_name: None,
        });
        assert_eq!(spec.validate(), Ok(()));
    }

    #[test]
    fn test_diff_empty_when_unchanged() {
        let update = PoolUpdate::diff(&base_snapshot(), &base_spec());
        assert!(update.is_empty());
    }

    #[test]
    fn test_diff_picks_up_changed_fields_only() {
        let mut desired = base_spec();
        desired.lb_algorithm = LbAlgorithm::LeastConnections;
        desired.description = "primary web pool".to_string();

        let update = PoolUpdate::diff(&base_snapshot(), &desired);

        assert_eq!(update.lb_algorithm, Some(LbAlgorithm::LeastConnections));
        assert_eq!(update.description.as_deref(), Some("primary web pool"));
        assert_eq!(update.name, None);
        assert_eq!(update.admin_state_up, None);
        assert!(!update.is_empty());
    }

    #[test]
    fn test_diff_admin_state() {
        let mut desired = base_spec();
        desired.admin_state_up = false;

        let update = PoolUpdate::diff(&base_snapshot(), &desired);
        assert_eq!(update.admin_state_up, Some(false));
    }

    #[test]
    fn test_wire_strings() {
        assert_eq!(
            serde_json::to_value(Protocol::ProxyV2).unwrap(),
            serde_json::json!("PROXYV2")
        );
        assert_eq!(
            serde_json::to_value(LbAlgorithm::SourceIpPort).unwrap(),
            serde_json::json!("SOURCE_IP_PORT")
        );
        assert_eq!(Protocol::Http.as_str(), "HTTP");
        assert_eq!(LbAlgorithm::RoundRobin.as_str(), "ROUND_ROBIN");
    }

    #[test]
    fn test_persistence_wire_shape() {
        let persistence = SessionPersistence {
            kind: PersistenceType::AppCookie,
            cookie_name: Some("JSESSIONID".to_string()),
        };
        assert_eq!(
            serde_json::to_value(&persistence).unwrap(),
            serde_json::json!({"type": "APP_COOKIE", "cookie_name": "JSESSIONID"})
        );

        let persistence = SessionPersistence {
            kind: PersistenceType::SourceIp,
            cookie_name: None,
        };
        assert_eq!(
            serde_json::to_value(&persistence).unwrap(),
            serde_json::json!({"type": "SOURCE_IP"})
        );
    }

    #[test]
    fn test_parent_ref_accessors() {
        let listener = ParentRef::Listener("L1".to_string());
        assert_eq!(listener.id(), "L1");
        assert_eq!(listener.kind(), "listener");

        let lb = ParentRef::LoadBalancer("LB1".to_string());
        assert_eq!(lb.id(), "LB1");
        assert_eq!(lb.kind(), "loadbalancer");
    }
}
