//! Configuration validation

use super::{Config, RuleConfig};
use crate::protocol::Ipv6Cidr;
use tracing::{error, warn};

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn log_diagnostics(&self) {
        for msg in &self.warnings {
            warn!("{}", msg);
        }
        for msg in &self.errors {
            error!("{}", msg);
        }
    }
}

/// Check a parsed configuration, collecting warnings and errors
pub fn validate(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::default();

    if config.proxies.is_empty() {
        result.error("configuration has no proxy sections");
    }

    for (i, proxy) in config.proxies.iter().enumerate() {
        let name = proxy
            .iface
            .clone()
            .unwrap_or_else(|| format!("proxy #{}", i + 1));

        match &proxy.iface {
            None => result.warn(format!(
                "{}: no upstream interface, only reverse-path priming will happen",
                name
            )),
            Some(iface) if iface.is_empty() => {
                result.error(format!("proxy #{}: upstream interface name is empty", i + 1))
            }
            Some(_) => {}
        }

        if proxy.rules.is_empty() && proxy.iface.is_some() {
            result.error(format!("{}: proxy has no rules", name));
        }

        if proxy.ttl <= 0 || proxy.timeout <= 0 {
            result.error(format!("{}: ttl and timeout must be positive", name));
        }

        for rule in &proxy.rules {
            validate_rule(&name, rule, &mut result);
        }
    }

    result
}

fn validate_rule(proxy: &str, rule: &RuleConfig, result: &mut ValidationResult) {
    let cidr: Option<Ipv6Cidr> = match rule.cidr.parse() {
        Ok(cidr) => Some(cidr),
        Err(_) => {
            result.error(format!("{}: invalid rule cidr '{}'", proxy, rule.cidr));
            None
        }
    };

    match rule.iface.as_deref() {
        Some("") => result.error(format!(
            "{}: rule {} has an empty interface name",
            proxy, rule.cidr
        )),
        None => {
            // a static answer for a whole prefix is usually a typo
            if let Some(cidr) = cidr {
                if cidr.prefix() <= 120 {
                    result.warn(format!(
                        "{}: static rule prefix /{} <= 120 - is this what you want?",
                        proxy,
                        cidr.prefix()
                    ));
                }
            }
        }
        Some(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> Config {
        toml::from_str(toml).unwrap()
    }

    #[test]
    fn test_valid_config_passes() {
        let config = parse(
            r#"
            [[proxy]]
            iface = "eth0"

            [[proxy.rule]]
            cidr = "2001:db8::/64"
            iface = "eth1"
            "#,
        );

        let result = validate(&config);
        assert!(!result.has_errors());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_empty_config_is_error() {
        let result = validate(&parse(""));
        assert!(result.has_errors());
    }

    #[test]
    fn test_bad_cidr_is_error() {
        let config = parse(
            r#"
            [[proxy]]
            iface = "eth0"

            [[proxy.rule]]
            cidr = "not-an-address"
            iface = "eth1"
            "#,
        );

        assert!(validate(&config).has_errors());
    }

    #[test]
    fn test_wide_static_rule_warns() {
        let config = parse(
            r#"
            [[proxy]]
            iface = "eth0"

            [[proxy.rule]]
            cidr = "2001:db8::/64"
            "#,
        );

        let result = validate(&config);
        assert!(!result.has_errors());
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_narrow_static_rule_is_quiet() {
        let config = parse(
            r#"
            [[proxy]]
            iface = "eth0"

            [[proxy.rule]]
            cidr = "2001:db8::1:0/126"
            "#,
        );

        let result = validate(&config);
        assert!(!result.has_errors());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_proxy_without_rules_is_error() {
        let config = parse(
            r#"
            [[proxy]]
            iface = "eth0"
            "#,
        );

        assert!(validate(&config).has_errors());
    }

    #[test]
    fn test_unbound_proxy_warns() {
        let config = parse(
            r#"
            [[proxy]]

            [[proxy.rule]]
            cidr = "fe80::/10"
            iface = "eth0"
            "#,
        );

        let result = validate(&config);
        assert!(!result.has_errors());
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_nonpositive_timers_are_error() {
        let config = parse(
            r#"
            [[proxy]]
            iface = "eth0"
            ttl = 0

            [[proxy.rule]]
            cidr = "2001:db8::/64"
            iface = "eth1"
            "#,
        );

        assert!(validate(&config).has_errors());
    }
}
