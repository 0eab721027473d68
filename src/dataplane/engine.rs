//! Proxy engine
//!
//! The context object that owns every proxy, the shared session store
//! and the host-table snapshots. The daemon decodes frames and feeds
//! them in; the engine returns the frames to send. Keeping the
//! registries here (instead of process globals) lets tests run fully
//! isolated engines.

use super::proxy::{Output, Proxy};
use super::rule::RuleTarget;
use super::session::SessionStore;
use crate::iface::{Advert, Solicit};
use crate::system::{LocalAddressTable, RouteTable};
use crate::telemetry::MetricsRegistry;
use std::collections::HashMap;
use std::net::Ipv6Addr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct Engine {
    proxies: Vec<Proxy>,
    sessions: SessionStore,
    local: LocalAddressTable,
    routes: RouteTable,
    /// name -> index of every open interface
    ifaces: HashMap<String, u32>,
    metrics: Arc<MetricsRegistry>,
}

impl Engine {
    pub fn new(
        local: LocalAddressTable,
        routes: RouteTable,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            proxies: Vec::new(),
            sessions: SessionStore::new(),
            local,
            routes,
            ifaces: HashMap::new(),
            metrics,
        }
    }

    /// Record an open interface so rules can be matched against the
    /// host address table by index
    pub fn register_iface(&mut self, name: &str, index: u32) {
        self.ifaces.insert(name.to_string(), index);
    }

    pub fn add_proxy(&mut self, proxy: Proxy) -> usize {
        self.proxies.push(proxy);
        self.proxies.len() - 1
    }

    pub fn proxies(&self) -> &[Proxy] {
        &self.proxies
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// True if any rule needs the host routing table
    pub fn has_auto_rules(&self) -> bool {
        self.proxies
            .iter()
            .any(|p| p.rules.iter().any(|r| r.target == RuleTarget::Auto))
    }

    /// A solicitation arrived on `iface`'s packet socket
    pub fn handle_solicit(&mut self, iface: &str, solicit: Solicit) -> Vec<Output> {
        let mut out = Vec::new();

        // our own solicits echo back through the capture socket
        if self.local.is_local(solicit.saddr) {
            return out;
        }

        if self.handle_local(iface, &solicit, &mut out) {
            return out;
        }

        self.handle_reverse_advert(iface, solicit.saddr, &mut out);

        let before = self.sessions.len();
        let Self {
            proxies,
            sessions,
            routes,
            ..
        } = self;

        let mut handled = false;
        for (id, proxy) in proxies.iter().enumerate() {
            if proxy.upstream.as_deref() != Some(iface) {
                continue;
            }
            handled = true;
            proxy.handle_solicit(
                id,
                sessions,
                routes,
                solicit.saddr,
                solicit.daddr,
                solicit.taddr,
                &mut out,
            );
        }

        if !handled {
            debug!(iface, taddr = %solicit.taddr, "solicit ignored");
            self.metrics.solicits_ignored.inc();
        }
        self.metrics
            .sessions_created
            .add((self.sessions.len() - before) as u64);

        out
    }

    /// Answer directly when the target is an address this host owns on
    /// an interface some rule of a serving proxy forwards to. Router
    /// flag stays clear: the daemon speaks for the host, not a router.
    fn handle_local(&self, iface: &str, solicit: &Solicit, out: &mut Vec<Output>) -> bool {
        for (addr, index) in self.local.iter() {
            if *addr != solicit.taddr {
                continue;
            }

            for proxy in &self.proxies {
                if proxy.upstream.as_deref() != Some(iface) {
                    continue;
                }

                for rule in &proxy.rules {
                    let bound = rule
                        .iface()
                        .and_then(|name| self.ifaces.get(name))
                        .is_some_and(|i| i == index);
                    if bound {
                        debug!(taddr = %solicit.taddr, "local address shortcut");
                        out.push(Output::Advert {
                            iface: iface.to_string(),
                            daddr: solicit.saddr,
                            taddr: solicit.taddr,
                            router: false,
                        });
                        return true;
                    }
                }
            }
        }

        false
    }

    /// Prime the reverse path: proxies that forward towards this
    /// interface but have no upstream of their own learn about the
    /// soliciting node through a synthetic advertisement.
    fn handle_reverse_advert(&self, iface: &str, saddr: Ipv6Addr, out: &mut Vec<Output>) {
        if saddr.is_multicast() || saddr.is_unspecified() {
            return;
        }

        for proxy in &self.proxies {
            if proxy.upstream.is_some() {
                continue;
            }

            for rule in &proxy.rules {
                if rule.cidr.contains(saddr) && rule.iface() == Some(iface) {
                    debug!(%saddr, iface, "priming reverse path");
                    proxy.handle_stateless_advert(saddr, saddr, iface, rule.autovia, out);
                }
            }
        }
    }

    /// An advertisement arrived on `iface`'s ICMPv6 socket
    pub fn handle_advert(&mut self, iface: &str, advert: Advert) -> Vec<Output> {
        let mut out = Vec::new();

        // our own adverts echo back through the ICMPv6 socket
        if self.local.is_local(advert.saddr) {
            return out;
        }

        let Self {
            proxies, sessions, ..
        } = self;

        let mut handled = false;
        for (id, proxy) in proxies.iter().enumerate() {
            // a proxy with no upstream cannot answer; skip it but keep
            // looking at the remaining parents
            if proxy.upstream.is_none() {
                continue;
            }

            // the rule must bind this interface: by name, or through
            // the downstream an auto probe resolved into its session
            let autovia = proxy.rules.iter().find_map(|r| {
                if !r.cidr.contains(advert.taddr) {
                    return None;
                }
                let bound = match &r.target {
                    RuleTarget::Iface(name) => name == iface,
                    RuleTarget::Auto => sessions.waiting_probe_on(id, advert.taddr, iface),
                    RuleTarget::Static => false,
                };
                bound.then_some(r.autovia)
            });
            let Some(autovia) = autovia else {
                continue;
            };

            handled = true;
            proxy.handle_advert(id, sessions, advert.taddr, iface, autovia, &mut out);
        }

        if !handled {
            debug!(iface, taddr = %advert.taddr, "advert ignored");
        }

        out
    }

    /// Age sessions by the wall-clock time since the previous pass
    pub fn update(&mut self, elapsed_ms: i64) {
        let stats = self.sessions.update_all(elapsed_ms);
        self.metrics
            .sessions_invalidated
            .add(stats.invalidated as u64);
        self.metrics.sessions_expired.add(stats.expired as u64);
    }

    /// Refresh host-table snapshots older than `ttl`
    pub fn refresh_host_tables(&mut self, ttl: Duration) -> crate::Result<()> {
        self.local.refresh_if_older_than(ttl)?;
        if self.has_auto_rules() {
            self.routes.refresh_if_older_than(ttl)?;
        }
        Ok(())
    }
}
