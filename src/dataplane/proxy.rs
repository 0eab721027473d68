//! Per-upstream proxy policy
//!
//! One `Proxy` per configured upstream interface. It owns the rules
//! and decides, per solicitation, whether to answer directly, probe a
//! downstream interface, or stay silent. Session bookkeeping lives in
//! the shared `SessionStore` so the engine can age everything at once.

use super::rule::{Rule, RuleTarget};
use super::session::{Session, SessionStatus, SessionStore};
use crate::system::RouteTable;
use std::net::Ipv6Addr;
use tracing::{debug, warn};

/// I/O the caller should perform, returned instead of executed so the
/// policy layer stays free of sockets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// Send a Neighbor Solicitation for `taddr` out `iface`
    Solicit { iface: String, taddr: Ipv6Addr },
    /// Send a Neighbor Advertisement for `taddr` to `daddr` out `iface`
    Advert {
        iface: String,
        daddr: Ipv6Addr,
        taddr: Ipv6Addr,
        router: bool,
    },
    /// Point the host route for `taddr` at `iface` (autovia)
    InstallRoute { iface: String, taddr: Ipv6Addr },
}

#[derive(Debug, Clone)]
pub struct Proxy {
    /// Interface solicitations arrive on. A proxy without an upstream
    /// only participates in reverse-path priming.
    pub upstream: Option<String>,
    /// Router flag on emitted advertisements
    pub router: bool,
    /// Lifetime of a resolved session
    pub ttl_ms: i64,
    /// How long to wait for a downstream advertisement
    pub timeout_ms: i64,
    /// First match in declaration order wins; never reordered
    pub rules: Vec<Rule>,
}

impl Proxy {
    pub fn new(upstream: &str) -> Self {
        Self {
            upstream: Some(upstream.to_string()),
            router: true,
            ttl_ms: 30_000,
            timeout_ms: 500,
            rules: Vec::new(),
        }
    }

    /// A solicitation for `taddr` arrived on our upstream
    #[allow(clippy::too_many_arguments)]
    pub fn handle_solicit(
        &self,
        id: usize,
        sessions: &mut SessionStore,
        routes: &RouteTable,
        saddr: Ipv6Addr,
        daddr: Ipv6Addr,
        taddr: Ipv6Addr,
        out: &mut Vec<Output>,
    ) {
        let Some(upstream) = &self.upstream else {
            return;
        };

        if let Some(session) = sessions.find_mut(id, taddr, saddr) {
            match session.status {
                SessionStatus::Valid => {
                    session.ttl_ms = self.ttl_ms;
                    out.push(Output::Advert {
                        iface: upstream.clone(),
                        daddr: saddr,
                        taddr,
                        router: self.router,
                    });
                }
                SessionStatus::Waiting => {
                    // joined the in-flight probe; its advert will answer
                    debug!(%taddr, "solicit joins pending session");
                }
                SessionStatus::Invalid => {
                    debug!(%taddr, "solicit suppressed by negative cache");
                }
            }
            return;
        }

        let Some(rule) = self.rules.iter().find(|r| r.matches(taddr)) else {
            debug!(%taddr, "no rule matches");
            return;
        };

        match &rule.target {
            RuleTarget::Static => {
                sessions.insert(Session {
                    proxy: id,
                    saddr,
                    daddr,
                    taddr,
                    status: SessionStatus::Valid,
                    ttl_ms: self.ttl_ms,
                    ifaces: Vec::new(),
                });
                out.push(Output::Advert {
                    iface: upstream.clone(),
                    daddr: saddr,
                    taddr,
                    router: self.router,
                });
            }
            RuleTarget::Iface(dst) => {
                self.probe(id, sessions, dst.clone(), saddr, daddr, taddr, out);
            }
            RuleTarget::Auto => match routes.resolve(taddr) {
                Some(dst) => {
                    let dst = dst.to_string();
                    self.probe(id, sessions, dst, saddr, daddr, taddr, out);
                }
                None => {
                    warn!(%taddr, "no route for auto rule, dropping solicit");
                }
            },
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn probe(
        &self,
        id: usize,
        sessions: &mut SessionStore,
        dst: String,
        saddr: Ipv6Addr,
        daddr: Ipv6Addr,
        taddr: Ipv6Addr,
        out: &mut Vec<Output>,
    ) {
        let session = Session {
            proxy: id,
            saddr,
            daddr,
            taddr,
            status: SessionStatus::Waiting,
            ttl_ms: self.timeout_ms,
            ifaces: vec![dst],
        };
        session.send_solicit(out);
        sessions.insert(session);
    }

    /// A downstream advertisement for `taddr` arrived on `iface`
    pub fn handle_advert(
        &self,
        id: usize,
        sessions: &mut SessionStore,
        taddr: Ipv6Addr,
        iface: &str,
        autovia: bool,
        out: &mut Vec<Output>,
    ) {
        let Some(upstream) = &self.upstream else {
            return;
        };

        let Some(session) = sessions.find_waiting_mut(id, taddr) else {
            debug!(%taddr, "advert without pending session");
            return;
        };

        session.status = SessionStatus::Valid;
        session.ttl_ms = self.ttl_ms;

        out.push(Output::Advert {
            iface: upstream.clone(),
            daddr: session.saddr,
            taddr,
            router: self.router,
        });

        if autovia {
            out.push(Output::InstallRoute {
                iface: iface.to_string(),
                taddr,
            });
        }
    }

    /// Unsolicited advertisement without session bookkeeping, used to
    /// prime the reverse path. Emitted on the upstream when bound,
    /// otherwise back out the interface the solicit arrived on.
    pub fn handle_stateless_advert(
        &self,
        saddr: Ipv6Addr,
        taddr: Ipv6Addr,
        iface: &str,
        autovia: bool,
        out: &mut Vec<Output>,
    ) {
        let via = self.upstream.clone().unwrap_or_else(|| iface.to_string());

        out.push(Output::Advert {
            iface: via,
            daddr: saddr,
            taddr,
            router: self.router,
        });

        if autovia {
            out.push(Output::InstallRoute {
                iface: iface.to_string(),
                taddr,
            });
        }
    }
}
