use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::Serialize;

use crate::error::VBoxParseError;

/// key prefix of NAT port forwarding lines, e.g. `Forwarding(0)="ssh,tcp,,2222,,22"`
pub const FORWARDING_PREFIX: &str = "Forwarding(";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PfProto {
    Tcp,
    Udp,
}

impl fmt::Display for PfProto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PfProto::Tcp => f.write_str("tcp"),
            PfProto::Udp => f.write_str("udp"),
        }
    }
}

impl FromStr for PfProto {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(PfProto::Tcp),
            "udp" => Ok(PfProto::Udp),
            other => Err(format!("unknown protocol '{}'", other)),
        }
    }
}

/// A NAT port forwarding rule.
///
/// `host_ip: None` matches any host interface, `guest_ip: None` forwards to the
/// address leased by the built-in DHCP server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortForwardingRule {
    pub proto: PfProto,
    pub host_ip: Option<IpAddr>,
    pub host_port: u16,
    pub guest_ip: Option<IpAddr>,
    pub guest_port: u16,
}

impl PortForwardingRule {
    /// the rule as VBoxManage expects it on the command line, e.g. `ssh,tcp,,2222,,22`
    pub fn format(&self, name: &str) -> String {
        format!(
            "{},{},{},{},{},{}",
            name,
            self.proto,
            ip_field(self.host_ip),
            self.host_port,
            ip_field(self.guest_ip),
            self.guest_port
        )
    }
}

impl fmt::Display for PortForwardingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}:{} --> {}:{}",
            self.proto,
            ip_field(self.host_ip),
            self.host_port,
            ip_field(self.guest_ip),
            self.guest_port
        )
    }
}

fn ip_field(ip: Option<IpAddr>) -> String {
    ip.map(|ip| ip.to_string()).unwrap_or_default()
}

fn parse_ip(s: &str) -> Result<Option<IpAddr>, String> {
    if s.is_empty() {
        return Ok(None);
    }
    IpAddr::from_str(s)
        .map(Some)
        .map_err(|e| format!("bad IP '{}': {}", s, e))
}

// digits only, so a parsed port always formats back to the same text
fn parse_port(s: &str) -> Result<u16, String> {
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("bad port '{}'", s));
    }
    u16::from_str(s).map_err(|e| format!("bad port '{}': {}", s, e))
}

/// Port forwarding rules of one machine, keyed by rule name.
#[derive(Debug, Clone, Default)]
pub struct PortForwardingTable {
    rules: HashMap<String, PortForwardingRule>,
}

impl PortForwardingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes one property. Keys without the `Forwarding(` prefix are ignored.
    ///
    /// A later line for an existing rule name replaces the earlier rule. On error
    /// the table is left untouched.
    pub fn accept(&mut self, key: &str, value: &str) -> Result<(), VBoxParseError> {
        if !key.starts_with(FORWARDING_PREFIX) {
            return Ok(());
        }

        let (name, rule) = Self::parse_value(value)
            .map_err(|reason| VBoxParseError::malformed(key, value, reason))?;
        self.rules.insert(name, rule);
        Ok(())
    }

    fn parse_value(value: &str) -> Result<(String, PortForwardingRule), String> {
        let vals: Vec<&str> = value.split(',').collect();
        if vals.len() != 6 {
            return Err("wrong number of parameters".to_string());
        }
        if vals[0].is_empty() {
            return Err("empty rule name".to_string());
        }

        let rule = PortForwardingRule {
            proto: PfProto::from_str(vals[1])?,
            host_ip: parse_ip(vals[2])?,
            host_port: parse_port(vals[3])?,
            guest_ip: parse_ip(vals[4])?,
            guest_port: parse_port(vals[5])?,
        };
        Ok((vals[0].to_string(), rule))
    }

    /// Finds a rule by name, falling back to the first rule forwarding to `guest_port`.
    ///
    /// An empty name or a zero port disables that half of the lookup. Which rule
    /// wins when several share a guest port is unspecified.
    pub fn lookup(&self, name: &str, guest_port: u16) -> Option<&PortForwardingRule> {
        if !name.is_empty() {
            if let Some(rule) = self.rules.get(name) {
                return Some(rule);
            }
        }
        if guest_port > 0 {
            return self.rules.values().find(|r| r.guest_port == guest_port);
        }
        None
    }

    pub fn get(&self, name: &str) -> Option<&PortForwardingRule> {
        self.rules.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PortForwardingRule)> {
        self.rules.iter().map(|(name, rule)| (name.as_str(), rule))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn into_rules(self) -> HashMap<String, PortForwardingRule> {
        self.rules
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    fn table(lines: &[(&str, &str)]) -> PortForwardingTable {
        let mut table = PortForwardingTable::new();
        for (key, value) in lines {
            table.accept(key, value).unwrap();
        }
        table
    }

    #[test]
    fn accepts_rule_with_absent_addresses() {
        let table = table(&[("Forwarding(0)", "ssh,tcp,,2222,,22")]);
        let rule = table.get("ssh").unwrap();
        assert_eq!(rule.proto, PfProto::Tcp);
        assert_eq!(rule.host_ip, None);
        assert_eq!(rule.host_port, 2222);
        assert_eq!(rule.guest_ip, None);
        assert_eq!(rule.guest_port, 22);
    }

    #[test]
    fn accepts_rule_with_addresses() {
        let table = table(&[("Forwarding(1)", "dns,udp,127.0.0.1,5353,10.0.2.15,53")]);
        let rule = table.get("dns").unwrap();
        assert_eq!(rule.proto, PfProto::Udp);
        assert_eq!(rule.host_ip, Some(IpAddr::V4(Ipv4Addr::LOCALHOST)));
        assert_eq!(rule.guest_ip, Some(IpAddr::V4(Ipv4Addr::new(10, 0, 2, 15))));
    }

    #[test]
    fn format_round_trips_accepted_values() {
        let values = [
            "ssh,tcp,,2222,,22",
            "dns,udp,127.0.0.1,5353,10.0.2.15,53",
            "web,tcp,::1,8080,,80",
            "mixed,tcp,,8443,fe80::1,443",
        ];
        for value in values {
            let table = table(&[("Forwarding(0)", value)]);
            let (name, rule) = table.iter().next().unwrap();
            assert_eq!(rule.format(name), value);
        }
    }

    #[test]
    fn absent_addresses_format_as_empty_fields() {
        let rule = PortForwardingRule {
            proto: PfProto::Tcp,
            host_ip: None,
            host_port: 2222,
            guest_ip: None,
            guest_port: 22,
        };
        let formatted = rule.format("ssh");
        assert_eq!(formatted, "ssh,tcp,,2222,,22");
        assert!(!formatted.contains("None"));
        assert_eq!(rule.to_string(), "tcp://:2222 --> :22");
    }

    #[test]
    fn display_uses_arrow_notation() {
        let table = table(&[("Forwarding(0)", "dns,udp,127.0.0.1,5353,10.0.2.15,53")]);
        assert_eq!(
            table.get("dns").unwrap().to_string(),
            "udp://127.0.0.1:5353 --> 10.0.2.15:53"
        );
    }

    #[test]
    fn ignores_foreign_keys() {
        let mut table = table(&[("Forwarding(0)", "ssh,tcp,,2222,,22")]);
        table.accept("name", "not,a,rule").unwrap();
        table.accept("natnet1", "nat").unwrap();
        table.accept("forwarding(1)", "x,tcp,,1,,2").unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn later_line_replaces_rule() {
        let table = table(&[
            ("Forwarding(0)", "ssh,tcp,,2222,,22"),
            ("Forwarding(1)", "ssh,udp,,3333,,23"),
        ]);
        assert_eq!(table.len(), 1);
        let rule = table.get("ssh").unwrap();
        assert_eq!(rule.proto, PfProto::Udp);
        assert_eq!(rule.host_port, 3333);
    }

    #[test]
    fn rejects_malformed_values_without_inserting() {
        let mut table = table(&[("Forwarding(0)", "ssh,tcp,,2222,,22")]);
        let bad = [
            "rule1,tcp,,abc,,8080",
            "rule1,tcp,,2222,,22,extra",
            "rule1,tcp,,2222",
            "rule1,icmp,,2222,,22",
            "rule1,tcp,300.1.1.1,2222,,22",
            "rule1,tcp,,2222,,70000",
            "rule1,tcp,,-1,,22",
            "rule1,tcp,,+22,,22",
            "rule1,tcp,,22,,+22",
            ",tcp,,2222,,22",
        ];
        for value in bad {
            let err = table.accept("Forwarding(1)", value).unwrap_err();
            let VBoxParseError::MalformedRecord { key, value: v, .. } = err;
            assert_eq!(key, "Forwarding(1)");
            assert_eq!(v, value);
        }
        assert_eq!(table.len(), 1);
        assert!(table.get("rule1").is_none());
    }

    #[test]
    fn lookup_prefers_name_over_port() {
        let table = table(&[
            ("Forwarding(0)", "nat1,tcp,,2222,,0"),
            ("Forwarding(1)", "ssh,tcp,,2200,,22"),
            ("Forwarding(2)", "other,tcp,,2201,,22"),
        ]);
        assert_eq!(table.lookup("nat1", 0).unwrap().host_port, 2222);
        assert_eq!(table.lookup("ssh", 22).unwrap().host_port, 2200);
        assert_eq!(table.lookup("other", 22).unwrap().host_port, 2201);
        assert_eq!(table.lookup("missing", 22).unwrap().guest_port, 22);
        assert!(table.lookup("missing", 23).is_none());
    }

    #[test]
    fn lookup_without_criteria_finds_nothing() {
        let table = table(&[("Forwarding(0)", "nat1,tcp,,2222,,0")]);
        assert!(table.lookup("", 0).is_none());
        assert!(PortForwardingTable::new().lookup("nat1", 22).is_none());
    }
}
