use log::warn;
use serde_derive::Deserialize;

use crate::consensus::snow::SnowParams;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Network address of the local node, host:port. Used both as the listen
    /// address and as the identity sent to other peers.
    pub addr: String,
    /// Address for the prometheus scrape endpoint. Empty disables it.
    pub metrics_addr: String,
    /// Addresses to join the p2p network through.
    pub bootstrap: Vec<String>,
    /// Soft bound on the peer directory size.
    pub max_peer_num: usize,
    /// Sleep between gossip passes of the discovery task.
    pub discover_interval_ms: u64,
    /// Timeout applied to every outbound call, dialing included.
    pub call_timeout_ms: u64,
    pub snow: SnowParams,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            addr: "127.0.0.1:9774".to_string(),
            metrics_addr: "0.0.0.0:9784".to_string(),
            bootstrap: Vec::new(),
            max_peer_num: 20,
            discover_interval_ms: 5000,
            call_timeout_ms: 5000,
            snow: SnowParams::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_toml(path: &str) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                warn!(
                    "Something went wrong reading the runtime config file, {:?}",
                    e
                );
                return RuntimeConfig::default();
            }
        };
        match toml::from_str(&contents) {
            Ok(c) => c,
            Err(e) => {
                warn!(
                    "Something went wrong reading the runtime config file, {:?}",
                    e
                );
                RuntimeConfig::default()
            }
        }
    }

    pub fn discover_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.discover_interval_ms)
    }

    pub fn call_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.call_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = RuntimeConfig::from_toml("/no/such/config.toml");
        assert_eq!(config.addr, "127.0.0.1:9774");
        assert_eq!(config.max_peer_num, 20);
        assert_eq!(config.snow.k, 3);
    }

    #[test]
    fn test_partial_file_keeps_defaults_for_missing_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "addr = \"127.0.0.1:4100\"\nbootstrap = [\"127.0.0.1:4101\"]\n\n[snow]\nk = 5\na = 4\nb = 20\nmax_step = 50\n"
        )
        .unwrap();

        let config = RuntimeConfig::from_toml(file.path().to_str().unwrap());
        assert_eq!(config.addr, "127.0.0.1:4100");
        assert_eq!(config.bootstrap, vec!["127.0.0.1:4101".to_string()]);
        assert_eq!(config.discover_interval_ms, 5000);
        assert_eq!(config.snow.k, 5);
        assert_eq!(config.snow.max_step, 50);
    }
}
