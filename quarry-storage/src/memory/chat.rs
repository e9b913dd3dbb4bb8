//! Chat sessions, messages, and query audit records.

use super::{MemoryBackend, SessionSlot};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use quarry_core::error::{QuarryError, Result};
use quarry_core::ids::{ChatSessionId, UserId};
use quarry_core::scope::TenantScope;
use quarry_core::traits::ChatRepository;
use quarry_core::types::{ChatMessage, ChatSession, ClassificationRecord, RagExecution};

#[async_trait]
impl ChatRepository for MemoryBackend {
    async fn create_session(&self, session: ChatSession) -> Result<()> {
        self.tables.sessions.insert(
            session.id,
            Mutex::new(SessionSlot {
                session,
                messages: Vec::new(),
            }),
        );
        Ok(())
    }

    async fn get_session(&self, id: ChatSessionId) -> Result<Option<ChatSession>> {
        Ok(self
            .tables
            .sessions
            .get(&id)
            .map(|slot| slot.lock().session.clone()))
    }

    async fn list_sessions(
        &self,
        scope: &TenantScope,
        user_id: UserId,
    ) -> Result<Vec<ChatSession>> {
        let mut sessions: Vec<ChatSession> = self
            .tables
            .sessions
            .iter()
            .map(|slot| slot.lock().session.clone())
            .filter(|s| {
                s.user_id == user_id
                    && s.org_id == scope.org_id
                    && scope.domain_id.is_none_or(|d| s.domain_id == d)
            })
            .collect();
        sessions.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        Ok(sessions)
    }

    async fn append_message(
        &self,
        session_id: ChatSessionId,
        mut message: ChatMessage,
    ) -> Result<ChatMessage> {
        let slot = self
            .tables
            .sessions
            .get(&session_id)
            .ok_or_else(|| QuarryError::not_found("chat session"))?;

        // The slot mutex serialises concurrent appends: sequence number,
        // message_count, and last_activity move together or not at all.
        let mut guard = slot.lock();
        if !guard.session.active {
            return Err(QuarryError::Conflict {
                message: "chat session is closed".to_string(),
            });
        }

        message.session_id = session_id;
        message.sequence = guard.messages.len();
        message.created_at = Utc::now();
        guard.messages.push(message.clone());
        guard.session.message_count = guard.messages.len();
        guard.session.last_activity = message.created_at;
        Ok(message)
    }

    async fn list_messages(&self, session_id: ChatSessionId) -> Result<Vec<ChatMessage>> {
        Ok(self
            .tables
            .sessions
            .get(&session_id)
            .map(|slot| slot.lock().messages.clone())
            .unwrap_or_default())
    }

    async fn close_session(&self, id: ChatSessionId) -> Result<()> {
        let slot = self
            .tables
            .sessions
            .get(&id)
            .ok_or_else(|| QuarryError::not_found("chat session"))?;
        slot.lock().session.active = false;
        Ok(())
    }

    async fn record_classification(&self, record: ClassificationRecord) -> Result<()> {
        self.tables.classifications.write().push(record);
        Ok(())
    }

    async fn record_execution(&self, record: RagExecution) -> Result<()> {
        self.tables.executions.write().push(record);
        Ok(())
    }

    async fn list_executions(&self, scope: &TenantScope) -> Result<Vec<RagExecution>> {
        let mut executions: Vec<RagExecution> = self
            .tables
            .executions
            .read()
            .iter()
            .filter(|e| {
                e.org_id == scope.org_id && scope.domain_id.is_none_or(|d| e.domain_id == d)
            })
            .cloned()
            .collect();
        executions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(executions)
    }
}
