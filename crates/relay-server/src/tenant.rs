//! TenantRegistry: lookup tenant config by name. No write path in the core —
//! entries come only from `relay_config::BootstrapConfig` at startup.

use relay_proto::{TenantConfig, TenantId};
use std::collections::HashMap;
use std::time::Duration;

/// A tenant's resolved policy, plus the request-expiration default that
/// `relay_config::TenantBootstrap` carries but `relay_proto::TenantConfig`
/// does not (expiration is an ingress concern, not something pushed to
/// connectors over `Configure`).
#[derive(Debug, Clone)]
pub struct TenantEntry {
    pub config: TenantConfig,
    pub request_expiration: Option<Duration>,
}

/// Read-only tenant lookup table, seeded once from bootstrap config.
#[derive(Debug, Clone, Default)]
pub struct TenantRegistry {
    tenants: HashMap<TenantId, TenantEntry>,
}

impl TenantRegistry {
    pub fn from_bootstrap(bootstrap: &relay_config::BootstrapConfig) -> Self {
        let tenants = bootstrap
            .tenants
            .iter()
            .map(|(name, t)| {
                let entry = TenantEntry {
                    config: TenantConfig {
                        keep_alive_interval_ms: t.keep_alive_interval_ms,
                        reconnect_minimum_delay_ms: t.reconnect_minimum_delay_ms,
                        reconnect_maximum_delay_ms: t.reconnect_maximum_delay_ms,
                        enable_tracing: t.enable_tracing,
                    },
                    request_expiration: t.request_expiration_ms.map(Duration::from_millis),
                };
                (TenantId::new(name.clone()), entry)
            })
            .collect();
        Self { tenants }
    }

    /// `tenantRegistry.LoadByName` — unknown tenants return `None`, which the
    /// ingress pipeline treats as "not a relay URL, pass through".
    pub fn load_by_name(&self, name: &str) -> Option<(TenantId, TenantEntry)> {
        self.tenants
            .get_key_value(&TenantId::new(name))
            .map(|(id, entry)| (id.clone(), entry.clone()))
    }

    pub fn len(&self) -> usize {
        self.tenants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tenants.keys().map(|id| id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_config::{BootstrapConfig, TenantBootstrap};
    use std::collections::HashMap as Map;

    #[test]
    fn unknown_tenant_is_none() {
        let registry = TenantRegistry::default();
        assert!(registry.load_by_name("nope").is_none());
    }

    #[test]
    fn bootstrap_seeds_lookup() {
        let mut tenants = Map::new();
        tenants.insert(
            "acme".to_string(),
            TenantBootstrap {
                request_expiration_ms: Some(5_000),
                ..TenantBootstrap::default()
            },
        );
        let registry = TenantRegistry::from_bootstrap(&BootstrapConfig { tenants });

        let (id, entry) = registry.load_by_name("acme").expect("seeded tenant");
        assert_eq!(id.as_str(), "acme");
        assert_eq!(entry.request_expiration, Some(Duration::from_millis(5_000)));
    }
}
