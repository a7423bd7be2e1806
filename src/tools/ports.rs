//! Concurrent TCP connect scanner.

use std::collections::BTreeSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::{Finding, ToolError};

pub const COMMON_PORTS: &[(u16, &str)] = &[
    (21, "FTP"),
    (22, "SSH"),
    (23, "Telnet"),
    (25, "SMTP"),
    (53, "DNS"),
    (80, "HTTP"),
    (110, "POP3"),
    (143, "IMAP"),
    (443, "HTTPS"),
    (1521, "Oracle"),
    (3306, "MySQL"),
    (3389, "RDP"),
    (5432, "PostgreSQL"),
    (5900, "VNC"),
    (6379, "Redis"),
    (8000, "HTTP-Dev"),
    (8080, "HTTP-Alt"),
    (27017, "MongoDB"),
];

pub fn service_name(port: u16) -> Option<&'static str> {
    COMMON_PORTS.iter().find(|(p, _)| *p == port).map(|(_, name)| *name)
}

pub fn common_ports() -> Vec<u16> {
    COMMON_PORTS.iter().map(|(p, _)| *p).collect()
}

fn parse_port(raw: &str, spec: &str) -> Result<u16, ToolError> {
    match raw.trim().parse::<u16>() {
        Ok(0) | Err(_) => Err(ToolError::InvalidPortSpec(spec.to_string())),
        Ok(port) => Ok(port),
    }
}

/// `"20-25,80,443"` → sorted, deduplicated ports
pub fn parse_ports(spec: &str) -> Result<Vec<u16>, ToolError> {
    let mut ports = BTreeSet::new();
    for part in spec.split(',') {
        let part = part.trim();
        if part.is_empty() {
            return Err(ToolError::InvalidPortSpec(spec.to_string()));
        }
        match part.split_once('-') {
            Some((lo, hi)) => {
                let (lo, hi) = (parse_port(lo, spec)?, parse_port(hi, spec)?);
                if lo > hi {
                    return Err(ToolError::InvalidPortSpec(spec.to_string()));
                }
                ports.extend(lo..=hi);
            }
            None => {
                ports.insert(parse_port(part, spec)?);
            }
        }
    }
    Ok(ports.into_iter().collect())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortState {
    pub port: u16,
    pub open: bool,
    pub service: Option<&'static str>,
}

pub async fn resolve(host: &str) -> Result<IpAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }
    tokio::net::lookup_host((host, 0))
        .await
        .with_context(|| format!("resolving {}", host))?
        .map(|addr| addr.ip())
        .next()
        .with_context(|| format!("{} has no addresses", host))
}

async fn is_open(addr: SocketAddr, timeout: Duration) -> bool {
    matches!(tokio::time::timeout(timeout, TcpStream::connect(addr)).await, Ok(Ok(_)))
}

/// Connect to each port with at most `concurrency` attempts in flight
pub async fn scan(host: &str, ports: &[u16], timeout: Duration, concurrency: usize) -> Result<Vec<PortState>> {
    let ip = resolve(host).await?;
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for &port in ports {
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            let open = is_open(SocketAddr::new(ip, port), timeout).await;
            tracing::debug!("{}:{} {}", ip, port, if open { "open" } else { "closed" });
            PortState { port, open, service: service_name(port) }
        });
    }

    let mut states = Vec::with_capacity(ports.len());
    while let Some(joined) = tasks.join_next().await {
        states.push(joined?);
    }
    states.sort_by_key(|s| s.port);
    tracing::info!("scanned {} ports on {}", states.len(), host);
    Ok(states)
}

/// Open ports are listed individually; closed ones are only counted
pub fn findings(host: &str, states: &[PortState]) -> Vec<Finding> {
    let mut findings: Vec<Finding> = states
        .iter()
        .filter(|s| s.open)
        .map(|s| {
            let title = match s.service {
                Some(name) => format!("{}/tcp open ({})", s.port, name),
                None => format!("{}/tcp open", s.port),
            };
            Finding::ok(title).with_tool("ports")
        })
        .collect();
    let open = findings.len();
    findings.push(
        Finding::info(format!("{}: {} open, {} closed of {} scanned", host, open, states.len() - open, states.len()))
            .with_tool("ports"),
    );
    findings
}
