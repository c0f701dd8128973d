//! Fixed name-to-port resolution.

use crate::transport::{PortResolver, TransportError, TransportResult};
use async_trait::async_trait;
use std::collections::HashMap;

/// Resolver backed by a fixed table of `name@host` to port.
///
/// Useful when EPMD is not available or nodes run with
/// `-erl_epmd_port` pinned listen ports.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    ports: HashMap<String, u16>,
}

impl StaticResolver {
    /// Create an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the port for `name@host`.
    #[must_use]
    pub fn with_node(mut self, name: &str, host: &str, port: u16) -> Self {
        self.insert(name, host, port);
        self
    }

    /// Register the port for `name@host`.
    pub fn insert(&mut self, name: &str, host: &str, port: u16) {
        self.ports.insert(format!("{name}@{host}"), port);
    }
}

#[async_trait]
impl PortResolver for StaticResolver {
    async fn resolve_port(&self, name: &str, host: &str) -> TransportResult<u16> {
        let key = format!("{name}@{host}");
        self.ports
            .get(&key)
            .copied()
            .ok_or(TransportError::NodeNotRegistered(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_resolution() {
        let resolver = StaticResolver::new().with_node("foo", "localhost", 9100);
        assert_eq!(resolver.resolve_port("foo", "localhost").await.unwrap(), 9100);
        assert!(matches!(
            resolver.resolve_port("bar", "localhost").await,
            Err(TransportError::NodeNotRegistered(_))
        ));
    }
}
