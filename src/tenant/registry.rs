//! Registry of known tenants, filled while cluster pools are built at startup.

use indexmap::{IndexMap, IndexSet};

/// All registered tenant ids plus one representative tenant per cluster.
///
/// Written through `&mut` during startup only; afterwards it is shared read-only behind an `Arc`.
#[derive(Clone, Debug, Default)]
pub struct TenantRegistry {
    tenant_ids: IndexSet<String>,
    tenant_per_cluster: IndexMap<String, String>,
}

impl TenantRegistry {
    pub fn new() -> Self {
        TenantRegistry::default()
    }

    /// Record `tenant_id` as served by `cluster_key`. The first tenant registered for a cluster
    /// stays its representative.
    pub fn register_tenant(&mut self, cluster_key: &str, tenant_id: &str) {
        self.tenant_ids.insert(tenant_id.to_string());
        if !self.tenant_per_cluster.contains_key(cluster_key) {
            self.tenant_per_cluster
                .insert(cluster_key.to_string(), tenant_id.to_string());
        }
    }

    /// One tenant per cluster when `one_per_cluster`, otherwise every known tenant.
    /// Both lists keep registration order.
    pub fn list_tenants(&self, one_per_cluster: bool) -> Vec<String> {
        if one_per_cluster {
            self.tenant_per_cluster.values().cloned().collect()
        } else {
            self.tenant_ids.iter().cloned().collect()
        }
    }

    pub fn contains(&self, tenant_id: &str) -> bool {
        self.tenant_ids.contains(tenant_id)
    }

    pub fn len(&self) -> usize {
        self.tenant_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tenant_ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_registration_per_cluster_wins() {
        let mut registry = TenantRegistry::new();
        registry.register_tenant("cluster0", "p1");
        registry.register_tenant("cluster0", "p2");
        assert_eq!(registry.list_tenants(true), vec!["p1"]);
        assert_eq!(registry.list_tenants(false), vec!["p1", "p2"]);
    }

    #[test]
    fn keeps_registration_order_and_collapses_duplicates() {
        let mut registry = TenantRegistry::new();
        registry.register_tenant("c1", "b");
        registry.register_tenant("c2", "a");
        registry.register_tenant("c2", "b");
        registry.register_tenant("c3", "c");
        assert_eq!(registry.list_tenants(false), vec!["b", "a", "c"]);
        assert_eq!(registry.list_tenants(true), vec!["b", "a", "c"]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn representatives_are_known_tenants() {
        let mut registry = TenantRegistry::new();
        registry.register_tenant("c1", "x");
        registry.register_tenant("c2", "y");
        registry.register_tenant("c1", "z");
        for tenant in registry.list_tenants(true) {
            assert!(registry.contains(&tenant));
        }
        assert!(!registry.contains("default"));
    }
}
