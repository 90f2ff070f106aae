//! Dev server configuration assembly.
//!
//! [`DevServerConfig`] is the declarative half of the dev server: host and
//! port, host-header policy, static-file mount, live-reload socket
//! addressing, and the SPA history fallback. The CLI's server wiring
//! consumes it; nothing here binds sockets.

use std::path::PathBuf;

use serde::{Serialize, Serializer};

use crate::env::EnvironmentSnapshot;
use crate::https::HttpsConfig;
use crate::paths::ProjectPaths;
use crate::proxy::ProxyTarget;

/// Host-header policy. Checking is a DNS-rebinding protection and only
/// engages when a proxy backend is configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedHosts {
    All,
    Hosts(Vec<String>),
}

impl AllowedHosts {
    /// Check a request's `Host` header value (port tolerated).
    #[must_use]
    pub fn allows(&self, host_header: &str) -> bool {
        match self {
            Self::All => true,
            Self::Hosts(hosts) => {
                let host = strip_port(host_header);
                hosts
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(host))
            }
        }
    }
}

impl Serialize for AllowedHosts {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::All => serializer.serialize_str("all"),
            Self::Hosts(hosts) => hosts.serialize(serializer),
        }
    }
}

fn strip_port(host: &str) -> &str {
    // Bracketed IPv6 keeps its brackets.
    if let Some(end) = host.find(']') {
        return &host[..=end];
    }
    host.split(':').next().unwrap_or(host)
}

#[derive(Debug, Clone, Serialize)]
pub struct StaticServeConfig {
    pub directory: PathBuf,
    /// URL prefix the directory is mounted at. Ends with `/`.
    pub public_path: String,
}

/// Live-reload channel addressing, overridable from the environment for
/// setups where the socket is reached through a different host or port
/// than the page itself.
#[derive(Debug, Clone, Serialize)]
pub struct SocketConfig {
    pub host: Option<String>,
    pub path: String,
    pub port: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryFallback {
    /// Fall back for paths containing dots too, not just extensionless
    /// ones.
    pub disable_dot_rule: bool,
    pub index: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DevServerConfig {
    pub host: String,
    pub port: u16,
    pub protocol: &'static str,
    pub allowed_hosts: AllowedHosts,
    pub compress: bool,
    pub static_serve: StaticServeConfig,
    pub socket: SocketConfig,
    pub history_fallback: HistoryFallback,
    /// Mount point without the trailing slash.
    pub dev_middleware_public_path: String,
    pub proxy: Option<String>,
    /// Key material stays out of serialized output.
    #[serde(skip)]
    pub https: HttpsConfig,
}

impl DevServerConfig {
    #[must_use]
    pub fn create(
        paths: &ProjectPaths,
        snapshot: &EnvironmentSnapshot,
        https: HttpsConfig,
        host: &str,
        port: u16,
        proxy: Option<&ProxyTarget>,
        lan_host: Option<&str>,
    ) -> Self {
        let disable_host_check =
            proxy.is_none() || snapshot.is_true("DANGEROUSLY_DISABLE_HOST_CHECK");
        let allowed_hosts = if disable_host_check {
            AllowedHosts::All
        } else {
            let mut hosts = vec![
                "localhost".to_string(),
                "127.0.0.1".to_string(),
                "[::1]".to_string(),
            ];
            if host != "0.0.0.0" && host != "::" {
                hosts.push(host.to_string());
            }
            hosts.extend(lan_host.map(str::to_string));
            AllowedHosts::Hosts(hosts)
        };

        // Routes and mounts always use the rooted form; the public URL
        // itself may be a full URL outside development.
        let served = paths.served_path();

        Self {
            host: host.to_string(),
            port,
            protocol: https.protocol(),
            allowed_hosts,
            compress: true,
            static_serve: StaticServeConfig {
                directory: paths.app_public.clone(),
                public_path: served.clone(),
            },
            socket: SocketConfig {
                host: snapshot.get("WDS_SOCKET_HOST").map(str::to_string),
                path: normalize_socket_path(snapshot.get("WDS_SOCKET_PATH")),
                port: snapshot.get("WDS_SOCKET_PORT").map(str::to_string),
            },
            history_fallback: HistoryFallback {
                disable_dot_rule: true,
                index: served.clone(),
            },
            dev_middleware_public_path: trim_trailing_slash(&served),
            proxy: proxy.map(|p| p.as_str().to_string()),
            https,
        }
    }
}

fn normalize_socket_path(path: Option<&str>) -> String {
    match path {
        None => "/ws".to_string(),
        Some(p) if p.starts_with('/') => p.to_string(),
        Some(p) => format!("/{p}"),
    }
}

fn trim_trailing_slash(path: &str) -> String {
    path.strip_suffix('/').unwrap_or(path).to_string()
}
