//! Daemon loop
//!
//! Owns the engine and the open interfaces and runs the single-threaded
//! event loop: wait until any socket becomes readable or the aging
//! interval fires, drain to `WouldBlock`, hand decoded events to the
//! engine and perform the I/O it asks for.

use crate::config::{Config, ProxyConfig};
use crate::dataplane::{Engine, Output, Proxy, Rule, RuleTarget};
use crate::iface::{Iface, RECV_BUF_SIZE};
use crate::system::{LocalAddressTable, RouteTable};
use crate::telemetry::MetricsRegistry;
use crate::{Error, Result};
use std::collections::HashMap;
use std::future::poll_fn;
use std::net::Ipv6Addr;
use std::process::Command;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::signal::unix::{signal, SignalKind};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Session timers have millisecond resolution; 50 ms ticks are plenty
/// against a 500 ms probe timeout
const AGING_TICK: Duration = Duration::from_millis(50);

/// Host-table snapshots are re-read at most this often
const HOST_TABLE_TTL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy)]
enum SocketKind {
    Packet,
    Icmp6,
}

pub struct Daemon {
    engine: Engine,
    ifaces: HashMap<String, Iface>,
    metrics: Arc<MetricsRegistry>,
}

impl Daemon {
    /// Open every interface the configuration references and build the
    /// engine. A proxy whose interfaces cannot be opened is skipped;
    /// startup fails only when no proxy survives.
    pub fn from_config(config: &Config) -> Result<Self> {
        let metrics = Arc::new(MetricsRegistry::new());
        let mut engine = Engine::new(
            LocalAddressTable::system(),
            RouteTable::system(),
            metrics.clone(),
        );
        let mut ifaces = HashMap::new();

        for (i, proxy_cfg) in config.proxies.iter().enumerate() {
            match build_proxy(proxy_cfg, &mut ifaces, &metrics) {
                Ok(proxy) => {
                    engine.add_proxy(proxy);
                }
                Err(e) => error!(proxy = i + 1, %e, "skipping proxy"),
            }
        }

        if engine.proxies().is_empty() {
            return Err(Error::Config("no usable proxies".into()));
        }

        for (name, iface) in &ifaces {
            engine.register_iface(name, iface.index());
        }

        // the local table must answer is_local before the first tick
        engine.refresh_host_tables(HOST_TABLE_TTL)?;

        Ok(Self {
            engine,
            ifaces,
            metrics,
        })
    }

    pub async fn run(mut self) -> Result<()> {
        let mut aging = tokio::time::interval(AGING_TICK);
        aging.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut sigint = signal(SignalKind::interrupt()).map_err(Error::Io)?;
        let mut sigterm = signal(SignalKind::terminate()).map_err(Error::Io)?;

        let mut last = Instant::now();
        let mut buf = vec![0u8; RECV_BUF_SIZE];

        info!(
            ifaces = self.ifaces.len(),
            proxies = self.engine.proxies().len(),
            "proxying"
        );

        loop {
            tokio::select! {
                _ = aging.tick() => {
                    let now = Instant::now();
                    let elapsed = now.duration_since(last).as_millis() as i64;
                    last = now;

                    self.engine.update(elapsed);
                    if let Err(e) = self.engine.refresh_host_tables(HOST_TABLE_TTL) {
                        warn!(%e, "host table refresh failed");
                    }
                }
                ready = poll_fn(|cx| self.poll_sockets(cx)) => {
                    let (name, kind) = ready?;
                    self.drain(&name, kind, &mut buf);
                }
                _ = sigint.recv() => {
                    info!("interrupted, shutting down");
                    return Ok(());
                }
                _ = sigterm.recv() => {
                    info!("terminated, shutting down");
                    return Ok(());
                }
            }
        }
    }

    /// Find a readable socket. Every still-pending socket has parked
    /// its waker with `cx`, so missing readiness only delays a wakeup,
    /// never loses it.
    fn poll_sockets(&self, cx: &mut Context<'_>) -> Poll<Result<(String, SocketKind)>> {
        for (name, iface) in &self.ifaces {
            match iface.poll_solicit_ready(cx) {
                Poll::Ready(Ok(())) => return Poll::Ready(Ok((name.clone(), SocketKind::Packet))),
                Poll::Ready(Err(e)) => return Poll::Ready(Err(Error::Io(e))),
                Poll::Pending => {}
            }

            match iface.poll_advert_ready(cx) {
                Poll::Ready(Ok(())) => return Poll::Ready(Ok((name.clone(), SocketKind::Icmp6))),
                Poll::Ready(Err(e)) => return Poll::Ready(Err(Error::Io(e))),
                Poll::Pending => {}
            }
        }

        Poll::Pending
    }

    /// Drain one socket, feeding each event through the engine
    fn drain(&mut self, name: &str, kind: SocketKind, buf: &mut [u8]) {
        loop {
            let Some(iface) = self.ifaces.get(name) else {
                return;
            };
            let stats = self.metrics.interface(name);

            let outputs = match kind {
                SocketKind::Packet => match iface.read_solicit(buf) {
                    Ok(Some(solicit)) => {
                        if let Some(stats) = &stats {
                            stats.solicits_rx.inc();
                        }
                        self.engine.handle_solicit(name, solicit)
                    }
                    Ok(None) => return,
                    Err(e) => {
                        warn!(iface = name, %e, "solicit read failed");
                        return;
                    }
                },
                SocketKind::Icmp6 => match iface.read_advert(buf) {
                    Ok(Some(advert)) => {
                        if let Some(stats) = &stats {
                            stats.adverts_rx.inc();
                        }
                        self.engine.handle_advert(name, advert)
                    }
                    Ok(None) => return,
                    Err(e) => {
                        warn!(iface = name, %e, "advert read failed");
                        return;
                    }
                },
            };

            self.dispatch(outputs);
        }
    }

    /// Perform the writes the engine asked for. Send failures abandon
    /// the exchange; the peer will retransmit its solicitation.
    fn dispatch(&mut self, outputs: Vec<Output>) {
        for output in outputs {
            match output {
                Output::Solicit { iface, taddr } => {
                    match self
                        .get_or_open(&iface)
                        .and_then(|ifc| ifc.write_solicit(taddr))
                    {
                        Ok(()) => self.record_tx(&iface, SocketKind::Packet),
                        Err(e) => self.record_tx_error(&iface, &e),
                    }
                }
                Output::Advert {
                    iface,
                    daddr,
                    taddr,
                    router,
                } => {
                    match self
                        .get_or_open(&iface)
                        .and_then(|ifc| ifc.write_advert(daddr, taddr, router))
                    {
                        Ok(()) => self.record_tx(&iface, SocketKind::Icmp6),
                        Err(e) => self.record_tx_error(&iface, &e),
                    }
                }
                Output::InstallRoute { iface, taddr } => install_route(&iface, taddr),
            }
        }
    }

    /// Interface to send through. Rules name their downstream up
    /// front, so it is already open; an auto probe names whatever the
    /// route lookup picked, which gets opened (and registered) on
    /// first use and then polled like any other interface.
    fn get_or_open(&mut self, name: &str) -> Result<&Iface> {
        if !self.ifaces.contains_key(name) {
            let iface = Iface::open(name)?;
            info!(iface = name, index = iface.index(), hwaddr = %iface.hwaddr(), "interface open");
            self.metrics.register_interface(name);
            self.engine.register_iface(name, iface.index());
            self.ifaces.insert(name.to_string(), iface);
        }
        Ok(&self.ifaces[name])
    }

    fn record_tx(&self, iface: &str, kind: SocketKind) {
        if let Some(stats) = self.metrics.interface(iface) {
            match kind {
                SocketKind::Packet => stats.solicits_tx.inc(),
                SocketKind::Icmp6 => stats.adverts_tx.inc(),
            }
        }
    }

    fn record_tx_error(&self, iface: &str, e: &Error) {
        warn!(iface, %e, "send failed");
        if let Some(stats) = self.metrics.interface(iface) {
            stats.tx_errors.inc();
        }
    }
}

fn build_proxy(
    cfg: &ProxyConfig,
    ifaces: &mut HashMap<String, Iface>,
    metrics: &MetricsRegistry,
) -> Result<Proxy> {
    let mut rules = Vec::new();

    for rule_cfg in &cfg.rules {
        let cidr = rule_cfg.cidr.parse()?;
        let target = match rule_cfg.iface.as_deref() {
            None => RuleTarget::Static,
            Some("auto") => RuleTarget::Auto,
            Some(name) => {
                ensure_iface(ifaces, metrics, name)?;
                RuleTarget::Iface(name.to_string())
            }
        };

        rules.push(Rule {
            cidr,
            target,
            autovia: rule_cfg.autovia,
        });
    }

    if let Some(upstream) = &cfg.iface {
        let iface = ensure_iface(ifaces, metrics, upstream)?;
        iface.ensure_packet_socket(cfg.promisc)?;
    }

    Ok(Proxy {
        upstream: cfg.iface.clone(),
        router: cfg.router,
        ttl_ms: cfg.ttl,
        timeout_ms: cfg.timeout,
        rules,
    })
}

/// One `Iface` per NIC regardless of how many proxies reference it
fn ensure_iface<'a>(
    ifaces: &'a mut HashMap<String, Iface>,
    metrics: &MetricsRegistry,
    name: &str,
) -> Result<&'a mut Iface> {
    if !ifaces.contains_key(name) {
        let iface = Iface::open(name)?;
        info!(iface = name, index = iface.index(), hwaddr = %iface.hwaddr(), "interface open");
        metrics.register_interface(name);
        ifaces.insert(name.to_string(), iface);
    }
    Ok(ifaces.get_mut(name).unwrap())
}

/// Autovia: point the host route for the resolved target at the
/// downstream interface. Best effort; the proxy works without it.
fn install_route(iface: &str, taddr: Ipv6Addr) {
    let status = Command::new("ip")
        .args(["-6", "route", "replace"])
        .arg(format!("{}/128", taddr))
        .args(["dev", iface])
        .status();

    match status {
        Ok(s) if s.success() => debug!(%taddr, iface, "route installed"),
        Ok(s) => warn!(%taddr, iface, code = ?s.code(), "route install failed"),
        Err(e) => warn!(%taddr, iface, %e, "route install failed"),
    }
}
