//! Append-only audit table.

use super::MemoryBackend;
use async_trait::async_trait;
use quarry_core::audit::AuditRecord;
use quarry_core::error::Result;
use quarry_core::ids::OrgId;
use quarry_core::traits::AuditRepository;

#[async_trait]
impl AuditRepository for MemoryBackend {
    async fn append(&self, record: AuditRecord) -> Result<()> {
        self.tables.audit.write().push(record);
        Ok(())
    }

    async fn list_recent(
        &self,
        org_id: Option<OrgId>,
        limit: usize,
    ) -> Result<Vec<AuditRecord>> {
        let guard = self.tables.audit.read();
        Ok(guard
            .iter()
            .rev()
            .filter(|r| org_id.is_none() || r.org_id == org_id)
            .take(limit)
            .cloned()
            .collect())
    }
}
