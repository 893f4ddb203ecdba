//! Session cookie issuing and JVM-route validation.
//!
//! # Session Id Format
//! ```text
//! <uid>.<jvmRoute>     when a route is configured
//! <uid>                otherwise
//! ```
//!
//! # Design Decisions
//! - An id routed to another node is expired, never honored
//! - Rejection is a value (`SessionDecision::Rejected`) carrying both the
//!   expiring and the replacement cookie, so the cycle only appends headers

use std::fmt;
use std::net::IpAddr;

use ipnet::IpNet;
use uuid::Uuid;

use crate::config::SessionConfig;

/// External session-validity check.
pub trait SessionValidator: Send + Sync + 'static {
    fn is_valid(&self, session_id: &str) -> bool;
}

/// Treats every presented session id as live.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllSessions;

impl SessionValidator for AcceptAllSessions {
    fn is_valid(&self, _session_id: &str) -> bool {
        true
    }
}

impl<F> SessionValidator for F
where
    F: Fn(&str) -> bool + Send + Sync + 'static,
{
    fn is_valid(&self, session_id: &str) -> bool {
        self(session_id)
    }
}

/// A `Set-Cookie` value for the session cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub secure: bool,
    /// Rendered with `Max-Age=0`.
    pub expired: bool,
}

impl fmt::Display for SessionCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}; Path=/; HttpOnly", self.name, self.value)?;
        if self.secure {
            f.write_str("; Secure")?;
        }
        if self.expired {
            f.write_str("; Max-Age=0")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The id carries another node's route.
    RouteMismatch { route: String },
    /// The validator does not know the id.
    Invalid,
}

impl RejectReason {
    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            RejectReason::RouteMismatch { .. } => "route_mismatch",
            RejectReason::Invalid => "invalid",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::RouteMismatch { route } => write!(f, "session routed to node {:?}", route),
            RejectReason::Invalid => f.write_str("unknown session"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionDecision {
    Accepted(String),
    Rejected {
        reason: RejectReason,
        expired: SessionCookie,
        new_id: String,
        new_cookie: SessionCookie,
    },
}

/// Issues and checks session ids for this node.
#[derive(Debug, Clone)]
pub struct SessionAffinity {
    jvm_route: Option<String>,
    cookie_name: String,
    force_https: bool,
    local_networks: Vec<IpNet>,
}

impl SessionAffinity {
    pub fn new(
        jvm_route: Option<String>,
        cookie_name: impl Into<String>,
        force_https: bool,
        local_networks: Vec<IpNet>,
    ) -> Self {
        Self {
            jvm_route: jvm_route.filter(|r| !r.is_empty()),
            cookie_name: cookie_name.into(),
            force_https,
            local_networks,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(
            config.jvm_route.clone(),
            config.cookie_name.clone(),
            config.force_https,
            config.local_networks.clone(),
        )
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn jvm_route(&self) -> Option<&str> {
        self.jvm_route.as_deref()
    }

    /// Fresh id, suffixed with this node's route when one is configured.
    pub fn generate_id(&self) -> String {
        let uid = Uuid::new_v4().simple().to_string();
        match &self.jvm_route {
            Some(route) => format!("{}.{}", uid, route),
            None => uid,
        }
    }

    /// Mint a new session and its cookie.
    pub fn issue(&self, secure: bool) -> (String, SessionCookie) {
        let id = self.generate_id();
        let cookie = SessionCookie {
            name: self.cookie_name.clone(),
            value: id.clone(),
            secure,
            expired: false,
        };
        (id, cookie)
    }

    /// Check a presented id against this node's route and the validator.
    pub fn validate(
        &self,
        session_id: &str,
        validator: &dyn SessionValidator,
        request_secure: bool,
        remote: Option<IpAddr>,
    ) -> SessionDecision {
        let rejection = match (session_id.rsplit_once('.'), &self.jvm_route) {
            (Some((_, route)), Some(own)) if route != own.as_str() => Some(RejectReason::RouteMismatch {
                route: route.to_string(),
            }),
            _ if !validator.is_valid(session_id) => Some(RejectReason::Invalid),
            _ => None,
        };

        let Some(reason) = rejection else {
            return SessionDecision::Accepted(session_id.to_string());
        };

        let secure = self.is_secure(request_secure, remote);
        let expired = SessionCookie {
            name: self.cookie_name.clone(),
            value: session_id.to_string(),
            secure,
            expired: true,
        };
        let (new_id, new_cookie) = self.issue(secure);
        SessionDecision::Rejected {
            reason,
            expired,
            new_id,
            new_cookie,
        }
    }

    /// Cookies are `Secure` for secure requests, and for every non-local
    /// client when HTTPS is forced.
    pub fn is_secure(&self, request_secure: bool, remote: Option<IpAddr>) -> bool {
        if request_secure {
            return true;
        }
        self.force_https && !remote.is_some_and(|ip| self.is_local(ip))
    }

    fn is_local(&self, ip: IpAddr) -> bool {
        self.local_networks.iter().any(|net| net.contains(&ip))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn affinity(route: Option<&str>) -> SessionAffinity {
        SessionAffinity::new(
            route.map(str::to_string),
            "JSESSIONID",
            false,
            vec!["10.0.0.0/8".parse().unwrap()],
        )
    }

    #[test]
    fn generated_id_carries_route() {
        let id = affinity(Some("nodeA")).generate_id();
        let (uid, route) = id.split_once('.').unwrap();
        assert_eq!(uid.len(), 32);
        assert_eq!(route, "nodeA");
        assert!(!affinity(None).generate_id().contains('.'));
    }

    #[test]
    fn matching_route_is_accepted() {
        let decision = affinity(Some("nodeA")).validate("abc.nodeA", &AcceptAllSessions, false, None);
        assert_eq!(decision, SessionDecision::Accepted("abc.nodeA".into()));
    }

    #[test]
    fn route_is_the_last_dot_suffix() {
        let nodes = affinity(Some("nodeA"));
        assert_eq!(
            nodes.validate("a.b.nodeA", &AcceptAllSessions, false, None),
            SessionDecision::Accepted("a.b.nodeA".into())
        );
        assert!(matches!(
            nodes.validate("a.nodeA.nodeB", &AcceptAllSessions, false, None),
            SessionDecision::Rejected {
                reason: RejectReason::RouteMismatch { ref route },
                ..
            } if route == "nodeB"
        ));
    }

    #[test]
    fn foreign_route_is_expired_and_replaced() {
        let decision = affinity(Some("nodeA")).validate("abc.nodeB", &AcceptAllSessions, false, None);
        match decision {
            SessionDecision::Rejected {
                reason,
                expired,
                new_id,
                new_cookie,
            } => {
                assert_eq!(reason, RejectReason::RouteMismatch { route: "nodeB".into() });
                assert_eq!(expired.to_string(), "JSESSIONID=abc.nodeB; Path=/; HttpOnly; Max-Age=0");
                assert!(new_id.ends_with(".nodeA"));
                assert_eq!(new_cookie.value, new_id);
                assert!(!new_cookie.expired);
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn without_own_route_any_suffix_is_accepted() {
        let decision = affinity(None).validate("abc.nodeB", &AcceptAllSessions, false, None);
        assert!(matches!(decision, SessionDecision::Accepted(_)));
    }

    #[test]
    fn validator_can_reject() {
        let validator = |id: &str| id != "stale.nodeA";
        let decision = affinity(Some("nodeA")).validate("stale.nodeA", &validator, false, None);
        assert!(matches!(
            decision,
            SessionDecision::Rejected {
                reason: RejectReason::Invalid,
                ..
            }
        ));
    }

    #[test]
    fn secure_flag_rules() {
        let mut forced = affinity(None);
        forced.force_https = true;
        let local: IpAddr = "10.1.2.3".parse().unwrap();
        let remote: IpAddr = "203.0.113.9".parse().unwrap();

        assert!(!forced.is_secure(false, Some(local)));
        assert!(forced.is_secure(false, Some(remote)));
        assert!(forced.is_secure(false, None));
        assert!(affinity(None).is_secure(true, Some(local)));
        assert!(!affinity(None).is_secure(false, Some(remote)));
    }
}
