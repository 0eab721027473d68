//! Per-target proxy sessions
//!
//! A session tracks one in-flight or resolved target per proxy. The
//! state machine:
//!
//! ```text
//!   Waiting --(downstream advert)--> Valid --(ttl expiry)--> removed
//!   Waiting --(timeout)-----------> Invalid --(ttl expiry)--> removed
//! ```
//!
//! `Invalid` is a negative cache: repeat solicitations for a target
//! that never answered are swallowed for 30 s instead of re-probing.

use super::proxy::Output;
use std::net::Ipv6Addr;
use tracing::debug;

/// Lifetime of the negative cache after a probe timed out
pub const NEGATIVE_CACHE_TTL_MS: i64 = 30_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Downstream probe sent, waiting for an advertisement
    Waiting,
    /// Target proved reachable (or a static rule answered)
    Valid,
    /// Probe timed out; negative cache
    Invalid,
}

#[derive(Debug)]
pub struct Session {
    /// Index of the owning proxy
    pub proxy: usize,
    pub saddr: Ipv6Addr,
    pub daddr: Ipv6Addr,
    pub taddr: Ipv6Addr,
    pub status: SessionStatus,
    /// Remaining lifetime; counted down by `SessionStore::update_all`
    pub ttl_ms: i64,
    /// Downstream interfaces probed for this target
    pub ifaces: Vec<String>,
}

impl Session {
    /// Queue a probe for the target on every downstream interface
    pub fn send_solicit(&self, out: &mut Vec<Output>) {
        for iface in &self.ifaces {
            out.push(Output::Solicit {
                iface: iface.clone(),
                taddr: self.taddr,
            });
        }
    }
}

/// Counts reported by one aging pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AgingStats {
    /// Waiting sessions that timed out into the negative cache
    pub invalidated: usize,
    /// Valid or Invalid sessions whose lifetime ran out
    pub expired: usize,
}

/// All live sessions, across proxies
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Vec<Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, session: Session) {
        self.sessions.push(session);
    }

    /// The session for a `(proxy, taddr, saddr)` triple; at most one
    /// exists at any time.
    pub fn find_mut(
        &mut self,
        proxy: usize,
        taddr: Ipv6Addr,
        saddr: Ipv6Addr,
    ) -> Option<&mut Session> {
        self.sessions
            .iter_mut()
            .find(|s| s.proxy == proxy && s.taddr == taddr && s.saddr == saddr)
    }

    /// The waiting session a downstream advertisement resolves
    pub fn find_waiting_mut(&mut self, proxy: usize, taddr: Ipv6Addr) -> Option<&mut Session> {
        self.sessions
            .iter_mut()
            .find(|s| s.proxy == proxy && s.taddr == taddr && s.status == SessionStatus::Waiting)
    }

    /// Whether a waiting session for this target sent its probe out
    /// `iface`. Auto rules carry no downstream name of their own; the
    /// interface the route lookup picked lives only in the session.
    pub fn waiting_probe_on(&self, proxy: usize, taddr: Ipv6Addr, iface: &str) -> bool {
        self.sessions.iter().any(|s| {
            s.proxy == proxy
                && s.taddr == taddr
                && s.status == SessionStatus::Waiting
                && s.ifaces.iter().any(|i| i == iface)
        })
    }

    /// Age every session by `elapsed_ms` and apply expiry transitions
    pub fn update_all(&mut self, elapsed_ms: i64) -> AgingStats {
        let mut stats = AgingStats::default();

        self.sessions.retain_mut(|session| {
            session.ttl_ms -= elapsed_ms;
            if session.ttl_ms >= 0 {
                return true;
            }

            match session.status {
                SessionStatus::Waiting => {
                    debug!(taddr = %session.taddr, "session timed out, caching negative");
                    session.status = SessionStatus::Invalid;
                    session.ttl_ms = NEGATIVE_CACHE_TTL_MS;
                    stats.invalidated += 1;
                    true
                }
                SessionStatus::Valid | SessionStatus::Invalid => {
                    debug!(taddr = %session.taddr, status = ?session.status, "session expired");
                    stats.expired += 1;
                    false
                }
            }
        });

        stats
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.iter()
    }
}
