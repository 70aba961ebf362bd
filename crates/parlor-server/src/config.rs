use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub http_addr: SocketAddr,
    pub db_path: PathBuf,
    /// Hex-encoded public key whose signed requests are privileged for
    /// destructive operations. Admin API is disabled when unset.
    pub admin_public_key: Option<String>,
    /// Close connections with no inbound frame for this long. None = never.
    pub idle_timeout: Option<Duration>,
    pub instance_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], 8080).into(),
            db_path: PathBuf::from("./parlor.db"),
            admin_public_key: None,
            idle_timeout: None,
            instance_name: "Parlor Hub".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("PARLOR_HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid PARLOR_HTTP_ADDR, using default");
            }
        }

        if let Ok(path) = std::env::var("PARLOR_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }

        if let Ok(key) = std::env::var("PARLOR_ADMIN_PUBKEY") {
            let key = key.trim().to_lowercase();
            if key.len() == 64 && key.bytes().all(|b| b.is_ascii_hexdigit()) {
                config.admin_public_key = Some(key);
            } else if !key.is_empty() {
                tracing::warn!("Invalid PARLOR_ADMIN_PUBKEY (need 64 hex chars), admin API disabled");
            }
        }

        if let Ok(val) = std::env::var("PARLOR_IDLE_TIMEOUT_SECS") {
            match val.parse::<u64>() {
                Ok(0) => {}
                Ok(secs) => config.idle_timeout = Some(Duration::from_secs(secs)),
                Err(_) => {
                    tracing::warn!(value = %val, "Invalid PARLOR_IDLE_TIMEOUT_SECS, ignoring")
                }
            }
        }

        if let Ok(name) = std::env::var("PARLOR_INSTANCE_NAME") {
            config.instance_name = name;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert!(config.admin_public_key.is_none());
        assert!(config.idle_timeout.is_none());
    }
}
