//! Per-address TLS settings handed to the TLS upgrade hook.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// What a TLS upgrade needs to know about one dialed address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    server_name: String,
    insecure_skip_verify: bool,
}

impl TlsConfig {
    /// Derives the configuration for `addr`: the server name is the host part, and an
    /// address whose host can't be told apart from its port skips verification.
    pub fn for_addr(addr: &str) -> Self {
        match server_name(addr) {
            Some(name) => Self { server_name: name.to_string(), insecure_skip_verify: false },
            None => Self { server_name: String::new(), insecure_skip_verify: true },
        }
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn insecure_skip_verify(&self) -> bool {
        self.insecure_skip_verify
    }
}

fn server_name(addr: &str) -> Option<&str> {
    if !addr.contains(':') {
        return Some(addr);
    }
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, port) = rest.split_once(']')?;
        return port.strip_prefix(':').map(|_| host);
    }
    match addr.rsplit_once(':') {
        Some((host, _)) if !host.contains(':') => Some(host),
        _ => None,
    }
}

/// Computes a [`TlsConfig`] once per address and shares it afterwards.
#[derive(Debug, Default)]
pub(crate) struct TlsConfigCache {
    configs: Mutex<HashMap<String, Arc<TlsConfig>>>,
}

impl TlsConfigCache {
    pub(crate) fn get(&self, addr: &str) -> Arc<TlsConfig> {
        let mut configs = self.configs.lock();
        if let Some(config) = configs.get(addr) {
            return Arc::clone(config);
        }
        let config = Arc::new(TlsConfig::for_addr(addr));
        configs.insert(addr.to_string(), Arc::clone(&config));
        config
    }
}
