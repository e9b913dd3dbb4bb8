//! The query pipeline.
//!
//! Authorise, classify, probe the cache, retrieve, shape through the
//! intent's workflow, synthesise with citations, and persist the
//! conversation plus an execution record. Degraded paths are explicit:
//! empty retrieval returns a fixed no-context answer, a failed synthesis
//! returns the retrieved sources without prose, and both are recorded.

use crate::answer::QueryAnswer;
use crate::cache::ResponseCache;
use crate::citations;
use crate::intent::IntentClassifier;
use crate::retrieval::{fit_to_budget, group_adjacent, RetrievalEngine, RetrievedChunk};
use crate::workflow::{WorkflowInput, WorkflowRouter};
use chrono::Utc;
use dashmap::DashMap;
use quarry_core::config::QueryConfig;
use quarry_core::error::{QuarryError, Result};
use quarry_core::ids::{ChatSessionId, CorrelationId, DomainId, OrgId, UserId};
use quarry_core::scope::TenantScope;
use quarry_core::traits::{ChatModel, ChatRepository, ChatRequest, ChatTurn, TenantRepository};
use quarry_core::types::{
    ChatMessage, ChatSession, ClassificationRecord, Domain, Intent, MessageRole, Permission,
    RagExecution,
};
use quarry_tenancy::TenantService;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const NO_CONTEXT_ANSWER: &str =
    "I could not find relevant information in this knowledge base to answer that.";

/// Tokens reserved for the prompt scaffolding and the model's reply.
const PROMPT_RESERVE_TOKENS: usize = 1500;
/// Context budget ceiling regardless of model window.
const MAX_CONTEXT_TOKENS: usize = 6000;

const CITATION_INSTRUCTION: &str = "Answer strictly from the numbered sources. Cite every \
    factual claim with its source marker, e.g. [1]. If the sources do not cover the \
    question, say so.";

/// End-to-end query handling.
pub struct QueryService {
    tenancy: Arc<TenantService>,
    tenants: Arc<dyn TenantRepository>,
    chat: Arc<dyn ChatRepository>,
    retrieval: RetrievalEngine,
    llm: Arc<dyn ChatModel>,
    cache: Arc<ResponseCache>,
    classifier: IntentClassifier,
    router: WorkflowRouter,
    session_locks: DashMap<ChatSessionId, Arc<Mutex<()>>>,
    config: QueryConfig,
}

impl std::fmt::Debug for QueryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl QueryService {
    /// Wire the pipeline.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        tenancy: Arc<TenantService>,
        tenants: Arc<dyn TenantRepository>,
        chat: Arc<dyn ChatRepository>,
        retrieval: RetrievalEngine,
        llm: Arc<dyn ChatModel>,
        cache: Arc<ResponseCache>,
        router: WorkflowRouter,
        config: QueryConfig,
    ) -> Self {
        Self {
            tenancy,
            tenants,
            chat,
            retrieval,
            llm,
            cache,
            classifier: IntentClassifier::new(),
            router,
            session_locks: DashMap::new(),
            config,
        }
    }

    /// Answer a user query against one domain.
    ///
    /// # Errors
    ///
    /// Authority errors short-circuit; everything downstream degrades into
    /// an answer rather than an error.
    pub async fn query(
        &self,
        user_id: UserId,
        org_id: OrgId,
        domain_id: DomainId,
        text: &str,
        session_id: Option<ChatSessionId>,
        correlation: CorrelationId,
    ) -> Result<QueryAnswer> {
        let total_started = Instant::now();
        if text.trim().is_empty() {
            return Err(QuarryError::BadRequest {
                message: "query text is empty".to_string(),
            });
        }

        // Authority first; nothing below runs unauthorised.
        self.tenancy
            .require(
                user_id,
                &Permission::from("chat:write"),
                org_id,
                Some(domain_id),
                correlation,
            )
            .await?;
        let scope = self.tenancy.resolve_scope(user_id, org_id, domain_id).await?;
        let domain = self
            .tenants
            .get_domain(domain_id)
            .await?
            .ok_or_else(|| QuarryError::not_found("domain"))?;

        // Classification is recorded even when the answer later degrades.
        let classification = self.classifier.classify(text);
        self.chat
            .record_classification(ClassificationRecord {
                org_id,
                domain_id,
                query: text.to_string(),
                intent: classification.intent.clone(),
                confidence: classification.confidence,
                reasoning: classification.reasoning.clone(),
                created_at: Utc::now(),
            })
            .await?;
        debug!(intent = %classification.intent, confidence = classification.confidence, "classified");

        let session = self
            .ensure_session(user_id, &scope, session_id, text)
            .await?;

        // Cache probe. A hit still updates the conversation and leaves an
        // execution record.
        if let Some(mut answer) = self.cache.get(&scope, &classification.intent, text) {
            answer.cached = true;
            answer.session_id = Some(session.id);
            answer.correlation_id = correlation;
            self.persist_turn(&session, text, &classification.intent, &answer)
                .await?;
            self.record_execution(
                &scope,
                Some(session.id),
                text,
                &answer,
                0,
                0,
                total_started.elapsed().as_millis() as u64,
            )
            .await?;
            info!(session_id = %session.id, "served from cache");
            return Ok(answer);
        }

        // Retrieve.
        let retrieval_started = Instant::now();
        let retrieved = self.retrieval.retrieve(&scope, text).await?;
        let retrieval_ms = retrieval_started.elapsed().as_millis() as u64;

        if retrieved.is_empty() {
            let mut answer = QueryAnswer {
                content: NO_CONTEXT_ANSWER.to_string(),
                intent: classification.intent.clone(),
                confidence: 0.0,
                session_id: Some(session.id),
                correlation_id: correlation,
                ..QueryAnswer::default()
            };
            answer.handoff = true;
            self.persist_turn(&session, text, &classification.intent, &answer)
                .await?;
            self.record_execution(
                &scope,
                Some(session.id),
                text,
                &answer,
                retrieval_ms,
                0,
                total_started.elapsed().as_millis() as u64,
            )
            .await?;
            return Ok(answer);
        }

        // Rerank, group adjacent chunks, and fit the model's window.
        let budget = self
            .llm
            .context_window()
            .saturating_sub(PROMPT_RESERVE_TOKENS)
            .clamp(512, MAX_CONTEXT_TOKENS);
        let context = fit_to_budget(group_adjacent(retrieved), budget);

        // Workflow shaping.
        let workflow = self.router.route(&classification.intent);
        let input = WorkflowInput {
            query: text,
            intent: &classification.intent,
            domain: &domain,
            chunks: &context,
        };
        let preamble = match workflow {
            Some(workflow) => workflow.shape_prompt(&input).await.preamble,
            None => None,
        };

        // Synthesise under the request deadline.
        let synthesis_started = Instant::now();
        let request = self.build_request(&domain, preamble.as_deref(), &session, text, &context)
            .await?;
        let synthesis = tokio::time::timeout(self.config.request_timeout, self.llm.complete(&request))
            .await
            .map_or_else(
                |_| {
                    Err(QuarryError::external(
                        quarry_core::error::ExternalService::Llm,
                        "synthesis deadline elapsed",
                        false,
                    ))
                },
                |inner| inner,
            );
        let synthesis_ms = synthesis_started.elapsed().as_millis() as u64;

        let mut answer = match synthesis {
            Ok(content) => {
                let cited = citations::validate(&content, &context);
                let mut confidence = Self::confidence_from_scores(&context);
                if cited.uncited {
                    // Uncited prose is suspect regardless of retrieval
                    // quality.
                    confidence = confidence.min(0.3);
                }
                QueryAnswer {
                    content: cited.content,
                    intent: classification.intent.clone(),
                    confidence,
                    citations: cited.citations,
                    session_id: Some(session.id),
                    correlation_id: correlation,
                    ..QueryAnswer::default()
                }
            }
            Err(e) => {
                warn!("synthesis failed, returning degraded answer: {e}");
                QueryAnswer {
                    content: Self::degraded_content(&context),
                    intent: classification.intent.clone(),
                    confidence: 0.0,
                    llm_failed: true,
                    session_id: Some(session.id),
                    correlation_id: correlation,
                    ..QueryAnswer::default()
                }
            }
        };

        if let Some(workflow) = workflow {
            workflow.post_process(&input, &mut answer).await;
        }
        if answer.confidence < domain.ai_config.confidence_threshold {
            answer.handoff = true;
        }

        self.persist_turn(&session, text, &classification.intent, &answer)
            .await?;
        self.record_execution(
            &scope,
            Some(session.id),
            text,
            &answer,
            retrieval_ms,
            synthesis_ms,
            total_started.elapsed().as_millis() as u64,
        )
        .await?;

        if !answer.llm_failed {
            self.cache
                .put(&scope, &classification.intent, text, answer.clone());
        }

        Ok(answer)
    }

    /// Sessions a user can continue in a domain.
    ///
    /// # Errors
    ///
    /// Repository failures propagate.
    pub async fn list_sessions(
        &self,
        user_id: UserId,
        scope: &TenantScope,
    ) -> Result<Vec<ChatSession>> {
        self.chat.list_sessions(scope, user_id).await
    }

    async fn ensure_session(
        &self,
        user_id: UserId,
        scope: &TenantScope,
        session_id: Option<ChatSessionId>,
        text: &str,
    ) -> Result<ChatSession> {
        let domain_id = scope.domain_id.ok_or_else(|| QuarryError::BadRequest {
            message: "query requires a domain".to_string(),
        })?;

        if let Some(session_id) = session_id {
            let Some(session) = self.chat.get_session(session_id).await? else {
                return Err(QuarryError::not_found("chat session"));
            };
            // A session outside the caller's scope reads as missing.
            if session.org_id != scope.org_id
                || session.domain_id != domain_id
                || session.user_id != user_id
            {
                return Err(QuarryError::not_found("chat session"));
            }
            return Ok(session);
        }

        let title: String = text.chars().take(60).collect();
        let session = ChatSession {
            id: ChatSessionId::new(),
            org_id: scope.org_id,
            domain_id,
            user_id,
            title,
            active: true,
            message_count: 0,
            last_activity: Utc::now(),
            created_at: Utc::now(),
        };
        self.chat.create_session(session.clone()).await?;
        Ok(session)
    }

    fn session_lock(&self, session_id: ChatSessionId) -> Arc<Mutex<()>> {
        self.session_locks
            .entry(session_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Append the user and assistant messages as one unit: the per-session
    /// lock keeps concurrent requests from interleaving their pairs.
    async fn persist_turn(
        &self,
        session: &ChatSession,
        query: &str,
        intent: &Intent,
        answer: &QueryAnswer,
    ) -> Result<()> {
        let lock = self.session_lock(session.id);
        let _guard = lock.lock().await;

        self.chat
            .append_message(
                session.id,
                ChatMessage {
                    session_id: session.id,
                    sequence: 0,
                    role: MessageRole::User,
                    content: query.to_string(),
                    intent: Some(intent.clone()),
                    confidence: None,
                    citations: Vec::new(),
                    created_at: Utc::now(),
                },
            )
            .await?;
        self.chat
            .append_message(
                session.id,
                ChatMessage {
                    session_id: session.id,
                    sequence: 0,
                    role: MessageRole::Assistant,
                    content: answer.content.clone(),
                    intent: Some(intent.clone()),
                    confidence: Some(answer.confidence),
                    citations: answer.citations.clone(),
                    created_at: Utc::now(),
                },
            )
            .await?;
        Ok(())
    }

    async fn build_request(
        &self,
        domain: &Domain,
        preamble: Option<&str>,
        session: &ChatSession,
        text: &str,
        context: &[RetrievedChunk],
    ) -> Result<ChatRequest> {
        let mut system = domain.ai_config.system_prompt.clone();
        system.push_str("\n\n");
        if let Some(preamble) = preamble {
            system.push_str(preamble);
            system.push_str("\n\n");
        }
        system.push_str(CITATION_INSTRUCTION);
        system.push_str("\n\n");
        system.push_str(&citations::source_block(context));

        // Bounded recent history; the current query is appended last.
        let history = self.chat.list_messages(session.id).await?;
        let mut turns: Vec<ChatTurn> = history
            .iter()
            .rev()
            .take(self.config.history_window)
            .rev()
            .filter(|m| !matches!(m.role, MessageRole::System))
            .map(|m| match m.role {
                MessageRole::Assistant => ChatTurn::assistant(m.content.clone()),
                _ => ChatTurn::user(m.content.clone()),
            })
            .collect();
        turns.push(ChatTurn::user(text));

        Ok(ChatRequest {
            system,
            turns,
            temperature: domain.ai_config.temperature,
            max_tokens: domain.ai_config.max_tokens,
        })
    }

    fn confidence_from_scores(context: &[RetrievedChunk]) -> f32 {
        if context.is_empty() {
            return 0.0;
        }
        let top: Vec<f32> = context.iter().take(3).map(|c| c.score).collect();
        #[allow(clippy::cast_precision_loss)]
        let mean = top.iter().sum::<f32>() / top.len() as f32;
        mean.clamp(0.0, 1.0)
    }

    fn degraded_content(context: &[RetrievedChunk]) -> String {
        let mut content = String::from(
            "The assistant is temporarily unavailable. The most relevant sources found \
             for your question:\n",
        );
        for (i, chunk) in context.iter().take(5).enumerate() {
            let preview: String = chunk.text.chars().take(200).collect();
            content.push_str(&format!("\n[{}] {preview}\n", i + 1));
        }
        content
    }

    #[allow(clippy::too_many_arguments)]
    async fn record_execution(
        &self,
        scope: &TenantScope,
        session_id: Option<ChatSessionId>,
        query: &str,
        answer: &QueryAnswer,
        retrieval_ms: u64,
        synthesis_ms: u64,
        total_ms: u64,
    ) -> Result<()> {
        let domain_id = scope.domain_id.ok_or_else(|| QuarryError::BadRequest {
            message: "execution record requires a domain scope".to_string(),
        })?;
        let mut retrieved_documents: Vec<_> =
            answer.citations.iter().map(|c| c.document_id).collect();
        retrieved_documents.dedup();

        self.chat
            .record_execution(RagExecution {
                org_id: scope.org_id,
                domain_id,
                session_id,
                query: query.to_string(),
                intent: answer.intent.clone(),
                retrieved_documents,
                response: answer.content.clone(),
                confidence: answer.confidence,
                cache_hit: answer.cached,
                llm_failed: answer.llm_failed,
                retrieval_ms,
                synthesis_ms,
                total_ms,
                created_at: Utc::now(),
            })
            .await
    }
}
