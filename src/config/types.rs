//! Configuration types

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(rename = "proxy", default)]
    pub proxies: Vec<ProxyConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    /// Upstream interface solicitations arrive on. A proxy without one
    /// only participates in reverse-path priming.
    pub iface: Option<String>,
    /// Router flag on emitted advertisements
    #[serde(default = "default_router")]
    pub router: bool,
    /// Lifetime of a resolved session, milliseconds
    #[serde(default = "default_ttl")]
    pub ttl: i64,
    /// Wait for a downstream advertisement, milliseconds
    #[serde(default = "default_timeout")]
    pub timeout: i64,
    /// Put the upstream interface in promiscuous mode
    #[serde(default)]
    pub promisc: bool,
    #[serde(rename = "rule", default)]
    pub rules: Vec<RuleConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuleConfig {
    /// IPv6 address or prefix the rule covers
    pub cidr: String,
    /// Downstream interface name, `"auto"` for routing-table lookup,
    /// or omitted to answer statically
    pub iface: Option<String>,
    /// Install a host route once the target proves reachable
    #[serde(default)]
    pub autovia: bool,
}

fn default_router() -> bool {
    true
}

fn default_ttl() -> i64 {
    30_000
}

fn default_timeout() -> i64 {
    500
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config: Config = toml::from_str(
            r#"
            [[proxy]]
            iface = "eth0"
            router = false
            ttl = 10000
            timeout = 250
            promisc = true

            [[proxy.rule]]
            cidr = "2001:db8::/64"
            iface = "eth1"
            autovia = true

            [[proxy.rule]]
            cidr = "2001:db8:1::/64"
            "#,
        )
        .unwrap();

        assert_eq!(config.proxies.len(), 1);
        let proxy = &config.proxies[0];
        assert_eq!(proxy.iface.as_deref(), Some("eth0"));
        assert!(!proxy.router);
        assert_eq!(proxy.ttl, 10_000);
        assert_eq!(proxy.timeout, 250);
        assert!(proxy.promisc);

        assert_eq!(proxy.rules.len(), 2);
        assert_eq!(proxy.rules[0].iface.as_deref(), Some("eth1"));
        assert!(proxy.rules[0].autovia);
        assert_eq!(proxy.rules[1].iface, None);
        assert!(!proxy.rules[1].autovia);
    }

    #[test]
    fn test_defaults() {
        let config: Config = toml::from_str(
            r#"
            [[proxy]]
            iface = "eth0"

            [[proxy.rule]]
            cidr = "2001:db8::/64"
            iface = "auto"
            "#,
        )
        .unwrap();

        let proxy = &config.proxies[0];
        assert!(proxy.router);
        assert_eq!(proxy.ttl, 30_000);
        assert_eq!(proxy.timeout, 500);
        assert!(!proxy.promisc);
    }

    #[test]
    fn test_empty_config() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.proxies.is_empty());
    }
}
