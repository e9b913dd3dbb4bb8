//! Tenant tables: orgs, users, memberships, roles, domains.

use super::MemoryBackend;
use async_trait::async_trait;
use quarry_core::error::{QuarryError, Result};
use quarry_core::ids::{DomainId, OrgId, UserId};
use quarry_core::traits::TenantRepository;
use quarry_core::types::{Domain, OrgMember, Organization, Role, User};

#[async_trait]
impl TenantRepository for MemoryBackend {
    async fn create_org(&self, org: Organization) -> Result<()> {
        let slug_taken = self
            .tables
            .orgs
            .iter()
            .any(|entry| entry.slug == org.slug);
        if slug_taken {
            return Err(QuarryError::Conflict {
                message: format!("organisation slug '{}' already exists", org.slug),
            });
        }
        self.tables.orgs.insert(org.id, org);
        Ok(())
    }

    async fn get_org(&self, id: OrgId) -> Result<Option<Organization>> {
        Ok(self.tables.orgs.get(&id).map(|o| o.clone()))
    }

    async fn get_org_by_slug(&self, slug: &str) -> Result<Option<Organization>> {
        Ok(self
            .tables
            .orgs
            .iter()
            .find(|entry| entry.slug == slug)
            .map(|entry| entry.clone()))
    }

    async fn list_orgs(&self) -> Result<Vec<Organization>> {
        let mut orgs: Vec<Organization> = self.tables.orgs.iter().map(|o| o.clone()).collect();
        orgs.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(orgs)
    }

    async fn delete_org(&self, id: OrgId) -> Result<()> {
        self.tables.orgs.remove(&id);
        self.tables.members.retain(|(org, _), _| *org != id);
        self.tables.roles.retain(|(org, _), _| *org != id);

        let domain_ids: Vec<DomainId> = self
            .tables
            .domains
            .iter()
            .filter(|d| d.org_id == id)
            .map(|d| d.id)
            .collect();
        for domain_id in domain_ids {
            self.delete_domain(domain_id).await?;
        }
        Ok(())
    }

    async fn create_user(&self, user: User) -> Result<()> {
        let email_taken = self
            .tables
            .users
            .iter()
            .any(|entry| entry.email == user.email);
        if email_taken {
            return Err(QuarryError::Conflict {
                message: "email already registered".to_string(),
            });
        }
        self.tables.users.insert(user.id, user);
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.tables.users.get(&id).map(|u| u.clone()))
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .tables
            .users
            .iter()
            .find(|entry| entry.email == email)
            .map(|entry| entry.clone()))
    }

    async fn upsert_member(&self, member: OrgMember) -> Result<()> {
        self.tables
            .members
            .insert((member.org_id, member.user_id), member);
        Ok(())
    }

    async fn get_member(&self, org_id: OrgId, user_id: UserId) -> Result<Option<OrgMember>> {
        Ok(self
            .tables
            .members
            .get(&(org_id, user_id))
            .map(|m| m.clone()))
    }

    async fn list_memberships(&self, user_id: UserId) -> Result<Vec<OrgMember>> {
        Ok(self
            .tables
            .members
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .map(|entry| entry.clone())
            .collect())
    }

    async fn upsert_role(&self, org_id: OrgId, role: Role) -> Result<()> {
        self.tables.roles.insert((org_id, role.name.clone()), role);
        Ok(())
    }

    async fn get_role(&self, org_id: OrgId, name: &str) -> Result<Option<Role>> {
        Ok(self
            .tables
            .roles
            .get(&(org_id, name.to_string()))
            .map(|r| r.clone()))
    }

    async fn create_domain(&self, domain: Domain) -> Result<()> {
        let name_taken = self
            .tables
            .domains
            .iter()
            .any(|d| d.org_id == domain.org_id && d.name == domain.name);
        if name_taken {
            return Err(QuarryError::Conflict {
                message: format!("domain '{}' already exists in this organisation", domain.name),
            });
        }
        self.tables.domains.insert(domain.id, domain);
        Ok(())
    }

    async fn get_domain(&self, id: DomainId) -> Result<Option<Domain>> {
        Ok(self.tables.domains.get(&id).map(|d| d.clone()))
    }

    async fn get_domain_by_name(&self, org_id: OrgId, name: &str) -> Result<Option<Domain>> {
        Ok(self
            .tables
            .domains
            .iter()
            .find(|d| d.org_id == org_id && d.name == name)
            .map(|d| d.clone()))
    }

    async fn list_domains(&self, org_id: OrgId) -> Result<Vec<Domain>> {
        let mut domains: Vec<Domain> = self
            .tables
            .domains
            .iter()
            .filter(|d| d.org_id == org_id)
            .map(|d| d.clone())
            .collect();
        domains.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(domains)
    }

    async fn update_domain(&self, domain: Domain) -> Result<()> {
        if !self.tables.domains.contains_key(&domain.id) {
            return Err(QuarryError::not_found("domain"));
        }
        self.tables.domains.insert(domain.id, domain);
        Ok(())
    }

    async fn delete_domain(&self, id: DomainId) -> Result<()> {
        self.tables.domains.remove(&id);

        // Cascade: documents and their chunks.
        let doc_ids: Vec<_> = self
            .tables
            .documents
            .iter()
            .filter(|d| d.domain_id == id)
            .map(|d| d.id)
            .collect();
        for doc_id in doc_ids {
            self.tables.documents.remove(&doc_id);
            self.tables.chunks.remove(&doc_id);
        }

        // Cascade: chat sessions.
        self.tables
            .sessions
            .retain(|_, slot| slot.lock().session.domain_id != id);

        // Cascade: connectors with their jobs and pages.
        let connector_ids: Vec<_> = self
            .tables
            .connectors
            .iter()
            .filter(|c| c.domain_id == id)
            .map(|c| c.id)
            .collect();
        for connector_id in connector_ids {
            self.tables.connectors.remove(&connector_id);
            self.tables
                .sync_jobs
                .retain(|_, job| job.connector_id != connector_id);
            self.tables
                .crawled_pages
                .retain(|(owner, _), _| *owner != connector_id);
        }
        Ok(())
    }
}
