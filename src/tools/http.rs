//! One-shot HTTP requests and simple latency runs.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde::Serialize;

use super::{format_size, Finding, ToolError};

/// Response headers worth echoing back
const SHOWN_HEADERS: &[&str] = &["content-type", "server", "location", "cache-control"];

#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseInfo {
    pub status: u16,
    pub elapsed_ms: f64,
    pub content_length: usize,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencyStats {
    pub requests: usize,
    pub succeeded: usize,
    pub min_ms: f64,
    pub avg_ms: f64,
    pub max_ms: f64,
}

pub fn parse_method(raw: &str) -> Result<Method, ToolError> {
    Method::from_bytes(raw.to_ascii_uppercase().as_bytes()).map_err(|_| ToolError::InvalidPattern {
        pattern: raw.to_string(),
        reason: "not an HTTP method".into(),
    })
}

/// `-H "Name: value"` arguments into a header map
pub fn parse_headers(raw: &[String]) -> Result<HeaderMap, ToolError> {
    let mut headers = HeaderMap::new();
    for line in raw {
        let invalid = |reason: &str| ToolError::InvalidPattern { pattern: line.clone(), reason: reason.to_string() };
        let (name, value) = line.split_once(':').ok_or_else(|| invalid("expected 'Name: value'"))?;
        let name = HeaderName::from_bytes(name.trim().as_bytes()).map_err(|_| invalid("bad header name"))?;
        let value = HeaderValue::from_str(value.trim()).map_err(|_| invalid("bad header value"))?;
        headers.append(name, value);
    }
    Ok(headers)
}

/// Inline body, or the contents of a file when prefixed with `@`
pub fn resolve_body(data: Option<&str>) -> Result<Option<String>> {
    match data {
        Some(d) if d.starts_with('@') => {
            let path = &d[1..];
            let body = std::fs::read_to_string(path).with_context(|| format!("reading request body {}", path))?;
            Ok(Some(body))
        }
        Some(d) => Ok(Some(d.to_string())),
        None => Ok(None),
    }
}

pub fn client(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("toolkeep/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

pub async fn send(client: &reqwest::Client, spec: &RequestSpec) -> Result<ResponseInfo> {
    let mut request = client
        .request(spec.method.clone(), &spec.url)
        .headers(spec.headers.clone())
        .timeout(spec.timeout);
    if let Some(body) = &spec.body {
        request = request.body(body.clone());
    }

    let started = Instant::now();
    let response = request.send().await.with_context(|| format!("{} {}", spec.method, spec.url))?;
    let status = response.status().as_u16();
    let headers = SHOWN_HEADERS
        .iter()
        .filter_map(|name| {
            response
                .headers()
                .get(*name)
                .and_then(|v| v.to_str().ok())
                .map(|v| (name.to_string(), v.to_string()))
        })
        .collect();
    let body = response.text().await?;
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    tracing::debug!("{} {} -> {} in {:.1} ms", spec.method, spec.url, status, elapsed_ms);

    Ok(ResponseInfo { status, elapsed_ms, content_length: body.len(), headers, body })
}

/// A status counts as success when it equals `expect_status`, or is below 400 without one
pub fn status_ok(status: u16, expect_status: Option<u16>) -> bool {
    match expect_status {
        Some(want) => status == want,
        None => status < 400,
    }
}

/// Run the same request `count` times in sequence; failures only lower the success count
pub async fn repeat(client: &reqwest::Client, spec: &RequestSpec, count: usize, expect_status: Option<u16>) -> LatencyStats {
    let mut timings = Vec::with_capacity(count);
    for i in 0..count {
        match send(client, spec).await {
            Ok(resp) if status_ok(resp.status, expect_status) => timings.push(resp.elapsed_ms),
            Ok(resp) => tracing::warn!("request {} returned {}", i + 1, resp.status),
            Err(e) => tracing::warn!("request {} failed: {:#}", i + 1, e),
        }
    }
    latency_stats(count, &timings)
}

pub fn latency_stats(requests: usize, timings: &[f64]) -> LatencyStats {
    if timings.is_empty() {
        return LatencyStats { requests, succeeded: 0, min_ms: 0.0, avg_ms: 0.0, max_ms: 0.0 };
    }
    let min_ms = timings.iter().copied().fold(f64::INFINITY, f64::min);
    let max_ms = timings.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let avg_ms = timings.iter().sum::<f64>() / timings.len() as f64;
    LatencyStats { requests, succeeded: timings.len(), min_ms, avg_ms, max_ms }
}

pub fn response_findings(resp: &ResponseInfo, expect_status: Option<u16>) -> Vec<Finding> {
    let status = format!("status {}", resp.status);
    let mut findings = vec![match expect_status {
        Some(want) if want != resp.status => Finding::error(status).with_detail(format!("expected {}", want)),
        Some(_) => Finding::ok(status),
        None if resp.status >= 400 => Finding::warning(status),
        None => Finding::ok(status),
    }];
    findings.push(Finding::info(format!("{:.1} ms", resp.elapsed_ms)));
    findings.push(Finding::info(format!("body {}", format_size(resp.content_length as u64))));
    for (name, value) in &resp.headers {
        findings.push(Finding::info(format!("{}: {}", name, value)));
    }
    findings.into_iter().map(|f| f.with_tool("http")).collect()
}

pub fn stats_findings(stats: &LatencyStats) -> Vec<Finding> {
    let headline = format!("{}/{} requests succeeded", stats.succeeded, stats.requests);
    let first = if stats.succeeded == stats.requests {
        Finding::ok(headline)
    } else if stats.succeeded == 0 {
        Finding::error(headline)
    } else {
        Finding::warning(headline)
    };
    vec![
        first.with_tool("http"),
        Finding::info(format!(
            "latency min {:.1} ms / avg {:.1} ms / max {:.1} ms",
            stats.min_ms, stats.avg_ms, stats.max_ms
        ))
        .with_tool("http"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::Severity;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[test]
    fn header_parsing() {
        let headers = parse_headers(&["Accept: application/json".into(), "X-Trace:  abc ".into()]).unwrap();
        assert_eq!(headers.get("accept").unwrap(), "application/json");
        assert_eq!(headers.get("x-trace").unwrap(), "abc");
        assert!(parse_headers(&["NoColon".into()]).is_err());
        assert!(parse_headers(&["Bad Name: x".into()]).is_err());
    }

    #[test]
    fn method_parsing() {
        assert_eq!(parse_method("post").unwrap(), Method::POST);
        assert!(parse_method("GE T").is_err());
    }

    #[test]
    fn body_inline_or_file() {
        assert_eq!(resolve_body(Some(r#"{"a":1}"#)).unwrap().as_deref(), Some(r#"{"a":1}"#));
        assert_eq!(resolve_body(None).unwrap(), None);

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("body.json");
        std::fs::write(&file, "from file").unwrap();
        let arg = format!("@{}", file.display());
        assert_eq!(resolve_body(Some(arg.as_str())).unwrap().as_deref(), Some("from file"));
        assert!(resolve_body(Some("@/no/such/file")).is_err());
    }

    #[test]
    fn stats_math() {
        let s = latency_stats(4, &[10.0, 30.0, 20.0]);
        assert_eq!(s.succeeded, 3);
        assert_eq!((s.min_ms, s.avg_ms, s.max_ms), (10.0, 20.0, 30.0));
        assert_eq!(latency_stats(2, &[]).succeeded, 0);
        assert_eq!(stats_findings(&s)[0].severity, Severity::Warning);
    }

    #[test]
    fn status_ok_honours_expectation() {
        assert!(status_ok(302, None));
        assert!(!status_ok(500, None));
        assert!(status_ok(404, Some(404)));
        assert!(!status_ok(200, Some(204)));
    }

    #[test]
    fn expected_status_mismatch_is_an_error() {
        let resp = ResponseInfo {
            status: 404,
            elapsed_ms: 3.0,
            content_length: 0,
            headers: vec![],
            body: String::new(),
        };
        assert_eq!(response_findings(&resp, Some(200))[0].severity, Severity::Error);
        assert_eq!(response_findings(&resp, Some(404))[0].severity, Severity::Ok);
        assert_eq!(response_findings(&resp, None)[0].severity, Severity::Warning);
    }

    async fn one_shot_server(reply: &'static str) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    reply.len(),
                    reply
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        format!("http://{}/", addr)
    }

    #[tokio::test]
    async fn sends_and_repeats() {
        let url = one_shot_server("pong").await;
        let spec = RequestSpec {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
            body: None,
            timeout: Duration::from_secs(5),
        };
        let client = client(spec.timeout).unwrap();

        let resp = send(&client, &spec).await.unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, "pong");
        assert!(resp.headers.contains(&("content-type".to_string(), "text/plain".to_string())));

        let stats = repeat(&client, &spec, 3, None).await;
        assert_eq!(stats.succeeded, 3);
        assert!(stats.min_ms <= stats.avg_ms && stats.avg_ms <= stats.max_ms);

        // Server answers 200, so expecting 201 fails every request
        let stats = repeat(&client, &spec, 2, Some(201)).await;
        assert_eq!(stats.succeeded, 0);
        assert_eq!(stats_findings(&stats)[0].severity, Severity::Error);
    }
}
