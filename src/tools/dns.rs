//! A/AAAA lookups through the system resolver.

use std::net::IpAddr;
use std::path::Path;

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;

use super::Finding;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum RecordType {
    A,
    Aaaa,
    #[default]
    Any,
}

impl RecordType {
    fn accepts(self, ip: &IpAddr) -> bool {
        match self {
            RecordType::A => ip.is_ipv4(),
            RecordType::Aaaa => ip.is_ipv6(),
            RecordType::Any => true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Lookup {
    pub domain: String,
    pub addresses: Vec<IpAddr>,
    pub error: Option<String>,
}

/// One domain per line; blank lines and `#` comments are skipped
pub fn load_domains(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(parse_domains(&content))
}

pub fn parse_domains(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(String::from)
        .collect()
}

pub async fn lookup(domain: &str, kind: RecordType) -> Lookup {
    let result = tokio::net::lookup_host((domain, 0)).await;
    match result {
        Ok(addrs) => {
            let mut addresses: Vec<IpAddr> = addrs.map(|a| a.ip()).filter(|ip| kind.accepts(ip)).collect();
            addresses.sort();
            addresses.dedup();
            tracing::debug!("{} -> {:?}", domain, addresses);
            Lookup { domain: domain.to_string(), addresses, error: None }
        }
        Err(e) => {
            tracing::warn!("lookup {} failed: {}", domain, e);
            Lookup { domain: domain.to_string(), addresses: Vec::new(), error: Some(e.to_string()) }
        }
    }
}

/// Sequential lookups; a failing domain does not stop the rest
pub async fn lookup_all(domains: &[String], kind: RecordType) -> Vec<Lookup> {
    let mut out = Vec::with_capacity(domains.len());
    for domain in domains {
        out.push(lookup(domain, kind).await);
    }
    out
}

pub fn findings(lookups: &[Lookup]) -> Vec<Finding> {
    lookups
        .iter()
        .map(|l| {
            let finding = match (&l.error, l.addresses.is_empty()) {
                (Some(e), _) => Finding::error(format!("{}: lookup failed", l.domain)).with_detail(e.clone()),
                (None, true) => Finding::warning(format!("{}: no matching records", l.domain)),
                (None, false) => {
                    let list: Vec<String> = l.addresses.iter().map(|a| a.to_string()).collect();
                    Finding::ok(format!("{}: {}", l.domain, list.join(", ")))
                }
            };
            finding.with_tool("dns")
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::Severity;

    #[test]
    fn domain_file_parsing() {
        let parsed = parse_domains("example.com\n\n# internal\n  rust-lang.org  \n#x\n");
        assert_eq!(parsed, vec!["example.com", "rust-lang.org"]);
    }

    #[test]
    fn record_filters() {
        let v4: IpAddr = "127.0.0.1".parse().unwrap();
        let v6: IpAddr = "::1".parse().unwrap();
        assert!(RecordType::A.accepts(&v4) && !RecordType::A.accepts(&v6));
        assert!(RecordType::Aaaa.accepts(&v6) && !RecordType::Aaaa.accepts(&v4));
        assert!(RecordType::Any.accepts(&v4) && RecordType::Any.accepts(&v6));
    }

    #[tokio::test]
    async fn resolves_literal_addresses() {
        let l = lookup("127.0.0.1", RecordType::Any).await;
        assert_eq!(l.addresses, vec!["127.0.0.1".parse::<IpAddr>().unwrap()]);
        let none = lookup("127.0.0.1", RecordType::Aaaa).await;
        assert!(none.addresses.is_empty() && none.error.is_none());
    }

    #[test]
    fn failures_become_error_findings() {
        let lookups = vec![
            Lookup { domain: "ok.test".into(), addresses: vec!["10.0.0.1".parse().unwrap()], error: None },
            Lookup { domain: "bad.test".into(), addresses: vec![], error: Some("no such host".into()) },
            Lookup { domain: "v6only.test".into(), addresses: vec![], error: None },
        ];
        let severities: Vec<Severity> = findings(&lookups).iter().map(|f| f.severity).collect();
        assert_eq!(severities, vec![Severity::Ok, Severity::Error, Severity::Warning]);
    }
}
