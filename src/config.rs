//! Configuration module for peakwatch.
//!
//! Loads configuration from environment variables with sensible defaults.

use regex::Regex;
use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

/// Endpoints polled when `PEAKWATCH_ENDPOINTS` is not set.
pub const DEFAULT_ENDPOINTS: &[&str] = &[
    "hellmc.net",
    "minefun.net",
    "spookmc.net",
    "mineboom.org",
    "prismamc.net",
    "dynamicpvp.net",
    "akumamc.com",
];

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Game servers to poll, as `host` or `host:port`
    pub endpoints: Vec<String>,
    /// Address the web server binds to (default: 0.0.0.0)
    pub listen_addr: IpAddr,
    /// HTTP port for the web server (default: 5000)
    pub http_port: u16,
    /// Pause between two poll cycles (default: 5s)
    pub poll_interval: Duration,
    /// Upper bound on a single status query (default: 5s)
    pub query_timeout: Duration,
    /// DNS server for SRV lookups; `None` means the system resolver
    pub dns_server: Option<SocketAddr>,
    /// Directory holding one record file per endpoint (default: "server_data")
    pub data_dir: PathBuf,
    /// Directory holding saved favicons (default: "static/icons")
    pub icons_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            endpoints: DEFAULT_ENDPOINTS.iter().map(|s| s.to_string()).collect(),
            listen_addr: IpAddr::from([0, 0, 0, 0]),
            http_port: 5000,
            poll_interval: Duration::from_secs(5),
            query_timeout: Duration::from_secs(5),
            dns_server: None,
            data_dir: PathBuf::from("server_data"),
            icons_dir: PathBuf::from("static/icons"),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PEAKWATCH_ENDPOINTS`: comma separated `host[:port]` list
    /// - `PEAKWATCH_LISTEN_ADDR`: bind address (default: 0.0.0.0)
    /// - `PEAKWATCH_HTTP_PORT`: HTTP port (default: 5000)
    /// - `PEAKWATCH_POLL_INTERVAL_SECS`: seconds between cycles (default: 5)
    /// - `PEAKWATCH_QUERY_TIMEOUT_SECS`: status query timeout (default: 5)
    /// - `PEAKWATCH_DNS_SERVER`: resolver for SRV lookups, `ip` or `ip:port`
    /// - `PEAKWATCH_DATA_DIR`: record directory (default: "server_data")
    /// - `PEAKWATCH_ICONS_DIR`: favicon directory (default: "static/icons")
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(list) = lookup("PEAKWATCH_ENDPOINTS") {
            let endpoints = parse_endpoints(&list);
            if endpoints.is_empty() {
                tracing::warn!("PEAKWATCH_ENDPOINTS has no valid entries, using defaults");
            } else {
                cfg.endpoints = endpoints;
            }
        }

        if let Some(addr) = lookup("PEAKWATCH_LISTEN_ADDR") {
            if let Ok(addr) = addr.trim().parse() {
                cfg.listen_addr = addr;
            }
        }

        if let Some(port) = lookup("PEAKWATCH_HTTP_PORT") {
            if let Ok(port) = port.trim().parse() {
                cfg.http_port = port;
            }
        }

        if let Some(secs) = lookup("PEAKWATCH_POLL_INTERVAL_SECS") {
            if let Some(interval) = parse_secs(&secs) {
                cfg.poll_interval = interval;
            }
        }

        if let Some(secs) = lookup("PEAKWATCH_QUERY_TIMEOUT_SECS") {
            if let Some(timeout) = parse_secs(&secs) {
                cfg.query_timeout = timeout;
            }
        }

        if let Some(server) = lookup("PEAKWATCH_DNS_SERVER") {
            if let Some(addr) = parse_dns_server(&server) {
                cfg.dns_server = Some(addr);
            }
        }

        if let Some(dir) = lookup("PEAKWATCH_DATA_DIR") {
            cfg.data_dir = PathBuf::from(dir);
        }

        if let Some(dir) = lookup("PEAKWATCH_ICONS_DIR") {
            cfg.icons_dir = PathBuf::from(dir);
        }

        cfg
    }
}

/// Whether `s` looks like `host` or `host:port`.
pub fn is_valid_endpoint(s: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9\-]*[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9\-]*[A-Za-z0-9])?)*(:[0-9]{1,5})?$")
            .expect("endpoint pattern is valid")
    });
    re.is_match(s)
}

/// Split a comma separated endpoint list, dropping invalid entries and duplicates.
fn parse_endpoints(list: &str) -> Vec<String> {
    let mut endpoints: Vec<String> = Vec::new();

    for entry in list.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        if !is_valid_endpoint(entry) {
            tracing::warn!("Ignoring invalid endpoint {:?}", entry);
            continue;
        }
        if !endpoints.iter().any(|e| e == entry) {
            endpoints.push(entry.to_string());
        }
    }

    endpoints
}

/// Accept `ip:port` or a bare `ip` on port 53.
fn parse_dns_server(s: &str) -> Option<SocketAddr> {
    let s = s.trim();
    s.parse::<SocketAddr>()
        .ok()
        .or_else(|| s.parse::<IpAddr>().ok().map(|ip| SocketAddr::new(ip, 53)))
}

fn parse_secs(s: &str) -> Option<Duration> {
    match s.trim().parse::<f64>() {
        Ok(secs) if secs.is_finite() && secs > 0.0 => Some(Duration::from_secs_f64(secs)),
        _ => None,
    }
}
