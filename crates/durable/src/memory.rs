use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::ExecutionId;
use tokio::sync::RwLock;

use crate::{
    DurableContext, DurableError, ParticipantCall, ParticipantRegistry, ReplyEnvelope, Result,
};

/// Retry policy the substrate applies to transient participant failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay between attempts, doubled after each retry.
    pub backoff: Duration,
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }

    /// Retries up to `max_attempts` total attempts with exponential backoff.
    pub fn attempts(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::attempts(3, Duration::from_millis(10))
    }
}

/// A participant invocation actually performed (not replayed from the journal).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub service: String,
    pub operation: String,
    pub key: Option<String>,
}

#[derive(Debug, Clone)]
enum JournalEntry {
    Reply(ReplyEnvelope),
    Terminal(String),
}

#[derive(Debug, Default)]
struct ExecutionLog {
    storage: HashMap<String, Vec<u8>>,
    journal: HashMap<String, JournalEntry>,
    invocations: Vec<Invocation>,
    replayed: usize,
    persist_count: usize,
}

/// In-memory durable context for one saga execution.
///
/// Participant results are journaled by idempotency key. Clones share the
/// same storage and journal, so a clone handed to a fresh run behaves like
/// the same execution replayed after a crash: journaled calls return their
/// recorded replies without reaching the participant.
#[derive(Clone)]
pub struct InMemoryDurableContext {
    execution_id: ExecutionId,
    participants: Arc<ParticipantRegistry>,
    retry: RetryPolicy,
    log: Arc<RwLock<ExecutionLog>>,
}

impl InMemoryDurableContext {
    /// Creates a context for a new execution.
    pub fn new(participants: Arc<ParticipantRegistry>) -> Self {
        Self {
            execution_id: ExecutionId::new(),
            participants,
            retry: RetryPolicy::default(),
            log: Arc::new(RwLock::new(ExecutionLog::default())),
        }
    }

    /// Overrides the transient-failure retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Returns a handle replaying this execution from its journal.
    pub fn replay(&self) -> Self {
        self.clone()
    }

    /// Returns the participant invocations performed so far, in order.
    pub async fn invocations(&self) -> Vec<Invocation> {
        self.log.read().await.invocations.clone()
    }

    /// Returns the number of calls answered from the journal.
    pub async fn replayed_count(&self) -> usize {
        self.log.read().await.replayed
    }

    /// Returns the number of `persist` calls.
    pub async fn persist_count(&self) -> usize {
        self.log.read().await.persist_count
    }

    /// Returns the raw blob stored under `key`.
    pub async fn stored(&self, key: &str) -> Option<Vec<u8>> {
        self.log.read().await.storage.get(key).cloned()
    }

    async fn invoke_with_retry(&self, call: &ParticipantCall) -> Result<ReplyEnvelope> {
        let participant = self.participants.get(&call.service).ok_or_else(|| {
            DurableError::Terminal(format!("no participant registered for '{}'", call.service))
        })?;

        let mut backoff = self.retry.backoff;
        let mut attempt = 1;
        loop {
            self.log.write().await.invocations.push(Invocation {
                service: call.service.clone(),
                operation: call.operation.clone(),
                key: call.key.clone(),
            });
            metrics::counter!("durable_participant_invocations_total").increment(1);

            match participant.handle(&call.operation, &call.args).await {
                Err(DurableError::Transient(reason)) if attempt < self.retry.max_attempts => {
                    tracing::debug!(
                        service = %call.service,
                        operation = %call.operation,
                        attempt,
                        %reason,
                        "transient participant failure, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                // Anything other than a transient failure is terminal.
                Err(e @ (DurableError::Transient(_) | DurableError::Terminal(_))) => return Err(e),
                Err(e) => return Err(DurableError::Terminal(e.to_string())),
                Ok(reply) => return Ok(reply),
            }
        }
    }
}

impl std::fmt::Debug for InMemoryDurableContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryDurableContext")
            .field("execution_id", &self.execution_id)
            .field("participants", &self.participants)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DurableContext for InMemoryDurableContext {
    fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    async fn call_participant(&self, call: &ParticipantCall) -> Result<ReplyEnvelope> {
        if let Some(key) = &call.key {
            let mut log = self.log.write().await;
            if let Some(entry) = log.journal.get(key).cloned() {
                log.replayed += 1;
                tracing::debug!(execution_id = %self.execution_id, %key, "replaying journaled participant call");
                return match entry {
                    JournalEntry::Reply(reply) => Ok(reply),
                    JournalEntry::Terminal(reason) => Err(DurableError::Terminal(reason)),
                };
            }
        }

        let result = self.invoke_with_retry(call).await;

        // Exhausted transient failures are not journaled; a replay tries again.
        if let Some(key) = &call.key {
            let entry = match &result {
                Ok(reply) => Some(JournalEntry::Reply(reply.clone())),
                Err(DurableError::Terminal(reason)) => Some(JournalEntry::Terminal(reason.clone())),
                Err(_) => None,
            };
            if let Some(entry) = entry {
                self.log.write().await.journal.insert(key.clone(), entry);
            }
        }

        result
    }

    async fn persist(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let mut log = self.log.write().await;
        log.storage.insert(key.to_string(), bytes);
        log.persist_count += 1;
        Ok(())
    }

    async fn restore(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.log.read().await.storage.get(key).cloned())
    }
}
