//! Tenant scoping.
//!
//! A [`TenantScope`] names the (org, domain) pair a read or write belongs
//! to. Every repository call, vector operation, and cache key carries one;
//! crossing scopes without an explicit admin operation is an integrity
//! violation.

use crate::ids::{DomainId, OrgId};
use serde::{Deserialize, Serialize};

/// The (org, domain) pair every tenant-scoped operation is filtered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantScope {
    /// Owning organisation.
    pub org_id: OrgId,
    /// Knowledge partition, when the operation is domain-scoped.
    pub domain_id: Option<DomainId>,
}

impl TenantScope {
    /// Scope covering a whole organisation.
    #[must_use]
    pub const fn org(org_id: OrgId) -> Self {
        Self {
            org_id,
            domain_id: None,
        }
    }

    /// Scope pinned to one domain.
    #[must_use]
    pub const fn domain(org_id: OrgId, domain_id: DomainId) -> Self {
        Self {
            org_id,
            domain_id: Some(domain_id),
        }
    }

    /// Namespace string used by the vector index and caches.
    #[must_use]
    pub fn namespace(&self) -> String {
        match self.domain_id {
            Some(domain) => format!("org:{}:domain:{domain}", self.org_id),
            None => format!("org:{}", self.org_id),
        }
    }

    /// Whether `other` falls inside this scope. An org scope contains all
    /// of its domain scopes; a domain scope contains only itself.
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        if self.org_id != other.org_id {
            return false;
        }
        match self.domain_id {
            None => true,
            Some(domain) => other.domain_id == Some(domain),
        }
    }
}

impl std::fmt::Display for TenantScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.namespace())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_rendering() {
        let org = OrgId::new();
        let domain = DomainId::new();

        let org_scope = TenantScope::org(org);
        assert_eq!(org_scope.namespace(), format!("org:{org}"));

        let domain_scope = TenantScope::domain(org, domain);
        assert_eq!(
            domain_scope.namespace(),
            format!("org:{org}:domain:{domain}")
        );
    }

    #[test]
    fn test_containment() {
        let org = OrgId::new();
        let d1 = DomainId::new();
        let d2 = DomainId::new();

        let org_scope = TenantScope::org(org);
        let d1_scope = TenantScope::domain(org, d1);
        let d2_scope = TenantScope::domain(org, d2);

        assert!(org_scope.contains(&d1_scope));
        assert!(org_scope.contains(&d2_scope));
        assert!(!d1_scope.contains(&d2_scope));
        assert!(d1_scope.contains(&d1_scope));

        let other_org = TenantScope::org(OrgId::new());
        assert!(!other_org.contains(&d1_scope));
    }
}
