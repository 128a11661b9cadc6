//! Runtime driver for saga instances.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use durable::{DurableContext, DurableContextExt, ParticipantCall, ReplyEnvelope};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::actions::{SagaActions, SagaStepOutcome};
use crate::config::{CompensationFailurePolicy, SagaConfig};
use crate::definition::SagaDefinition;
use crate::error::{Result, SagaError};
use crate::execution_state::SagaExecutionState;
use crate::instance::SagaInstance;
use crate::state::SagaStatus;

/// A saga: its definition plus lifecycle hooks.
///
/// Hooks run on the final transition, before the terminal state is
/// persisted, and may adjust the data that gets stored.
#[async_trait]
pub trait Saga: Send + Sync {
    type Data: Clone + Serialize + DeserializeOwned + Send + Sync + 'static;

    fn definition(&self) -> &SagaDefinition<Self::Data>;

    /// Called once every step has completed forward.
    async fn on_saga_completed_successfully(&self, _data: &mut Self::Data) {}

    /// Called once compensation has unwound every applicable step.
    async fn on_saga_rolled_back(&self, _data: &mut Self::Data) {}
}

// A bare definition is a saga without hooks.
#[async_trait]
impl<D> Saga for SagaDefinition<D>
where
    D: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    type Data = D;

    fn definition(&self) -> &SagaDefinition<D> {
        self
    }
}

/// Record persisted for an operator when a compensation fails under
/// [`CompensationFailurePolicy::Escalate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationRecord {
    pub saga_type: String,
    pub step: i64,
    pub reason: String,
    /// The last persisted instance, as stored.
    pub instance: serde_json::Value,
    pub escalated_at: DateTime<Utc>,
}

type ReplyObserver = Arc<dyn Fn(&str) + Send + Sync>;

/// Drives saga instances through their definition.
///
/// Each call works on one instance inside one durable context; steps run
/// strictly one after another and the instance is persisted after every
/// transition, before the next side effect.
pub struct SagaManager<S: Saga> {
    saga: S,
    config: SagaConfig,
    reply_observer: Option<ReplyObserver>,
}

impl<S: Saga> SagaManager<S> {
    /// Creates a manager with the default configuration.
    pub fn new(saga: S) -> Self {
        Self::with_config(saga, SagaConfig::default())
    }

    pub fn with_config(saga: S, config: SagaConfig) -> Self {
        Self {
            saga,
            config,
            reply_observer: None,
        }
    }

    /// Installs a hook told the type name of every reply handler invoked.
    pub fn with_reply_observer(mut self, observer: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.reply_observer = Some(Arc::new(observer));
        self
    }

    pub fn saga(&self) -> &S {
        &self.saga
    }

    pub fn config(&self) -> &SagaConfig {
        &self.config
    }

    /// Runs a new instance to completion, rollback or a fatal error.
    #[tracing::instrument(skip_all, fields(saga_type = %self.saga.definition().saga_type()))]
    pub async fn start<C>(&self, ctx: &C, data: S::Data) -> Result<SagaInstance<S::Data>>
    where
        C: DurableContext + ?Sized,
    {
        metrics::counter!("saga_started_total").increment(1);
        let started = std::time::Instant::now();
        tracing::info!("saga started");

        let mut instance = SagaInstance::new(data);
        let actions = self.saga.definition().start(instance.data());
        let result = self.process_actions(ctx, &mut instance, actions).await;
        self.finish(ctx, instance, result, started).await
    }

    /// Continues the instance persisted in `ctx`.
    ///
    /// Instances already at an end state are returned as stored.
    #[tracing::instrument(skip_all, fields(saga_type = %self.saga.definition().saga_type()))]
    pub async fn resume<C>(&self, ctx: &C) -> Result<SagaInstance<S::Data>>
    where
        C: DurableContext + ?Sized,
    {
        let mut instance = self
            .load(ctx)
            .await?
            .ok_or_else(|| SagaError::InstanceNotFound(self.config.state_key.clone()))?;

        if instance.state().is_end_state() {
            tracing::debug!(status = %instance.status(), "saga already finished");
            return Ok(instance);
        }

        let started = std::time::Instant::now();
        tracing::info!(
            step = instance.state().currently_executing(),
            compensating = instance.state().is_compensating(),
            "saga resumed"
        );
        let result = match self
            .saga
            .definition()
            .resume_actions(instance.state(), instance.data())
        {
            Ok(actions) => self.process_actions(ctx, &mut instance, actions).await,
            Err(e) => Err(e),
        };
        self.finish(ctx, instance, result, started).await
    }

    /// Resumes the persisted instance if there is one, otherwise starts `data`.
    ///
    /// This is the entry point for executions the substrate may re-run.
    pub async fn run<C>(&self, ctx: &C, data: S::Data) -> Result<SagaInstance<S::Data>>
    where
        C: DurableContext + ?Sized,
    {
        if ctx.restore(&self.config.state_key).await?.is_some() {
            self.resume(ctx).await
        } else {
            self.start(ctx, data).await
        }
    }

    /// Reads the persisted instance without running anything.
    pub async fn load<C>(&self, ctx: &C) -> Result<Option<SagaInstance<S::Data>>>
    where
        C: DurableContext + ?Sized,
    {
        Ok(ctx.restore_json(&self.config.state_key).await?)
    }

    async fn process_actions<C>(
        &self,
        ctx: &C,
        instance: &mut SagaInstance<S::Data>,
        mut actions: SagaActions<S::Data>,
    ) -> Result<()>
    where
        C: DurableContext + ?Sized,
    {
        let definition = self.saga.definition();

        loop {
            let outcome = actions.step_outcome.take();

            // A failed local handler counts as a failed reply.
            if let Some(SagaStepOutcome::LocalFailure(error)) = outcome {
                let state = actions.updated_state.unwrap_or(*instance.state());
                tracing::warn!(
                    step = state.currently_executing(),
                    compensating = state.is_compensating(),
                    %error,
                    "local step handler failed"
                );
                actions = definition.handle_actions(&state, instance.data(), false, Some(error))?;
                continue;
            }

            if let Some(state) = actions.updated_state.take() {
                instance.set_state(state);
            }
            if let Some(data) = actions.updated_data.take() {
                instance.set_data(data);
            }
            if actions.end_state {
                if actions.compensating {
                    self.saga.on_saga_rolled_back(instance.data_mut()).await;
                } else {
                    self.saga
                        .on_saga_completed_successfully(instance.data_mut())
                        .await;
                }
            }

            ctx.persist_json(&self.config.state_key, &*instance).await?;

            let state = *instance.state();
            match outcome {
                Some(SagaStepOutcome::Participant(call)) => {
                    record_step(&state);
                    let call = self.keyed(ctx, call, &state);
                    let reply = self.invoke(ctx, &call).await?;
                    actions = definition.handle_reply(
                        &state,
                        instance.data_mut(),
                        &call,
                        &reply,
                        self.reply_observer.as_deref(),
                    )?;
                }
                Some(SagaStepOutcome::Local) => {
                    record_step(&state);
                    tracing::info!(
                        step = state.currently_executing(),
                        compensating = state.is_compensating(),
                        "local step completed"
                    );
                    actions = definition.handle_actions(&state, instance.data(), true, None)?;
                }
                Some(SagaStepOutcome::LocalFailure(_)) | None => break,
            }
        }

        Ok(())
    }

    async fn invoke<C>(&self, ctx: &C, call: &ParticipantCall) -> Result<ReplyEnvelope>
    where
        C: DurableContext + ?Sized,
    {
        metrics::counter!("saga_participant_calls_total").increment(1);
        tracing::info!(service = %call.service, operation = %call.operation, "calling participant");

        match ctx.call_participant(call).await {
            Ok(reply) => Ok(reply),
            Err(e) if e.is_terminal() => {
                tracing::warn!(
                    service = %call.service,
                    operation = %call.operation,
                    error = %e,
                    "participant failed terminally"
                );
                Ok(ReplyEnvelope::terminal_failure(e.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Derives the idempotency key from the execution and step position
    /// unless the step set one.
    fn keyed<C>(&self, ctx: &C, call: ParticipantCall, state: &SagaExecutionState) -> ParticipantCall
    where
        C: DurableContext + ?Sized,
    {
        if call.key.is_some() {
            return call;
        }
        let direction = if state.is_compensating() {
            "compensate"
        } else {
            "invoke"
        };
        let key = ctx.execution_id().scoped(format_args!(
            "{}:{}:{}",
            self.saga.definition().saga_type(),
            state.currently_executing(),
            direction
        ));
        call.with_key(key)
    }

    async fn finish<C>(
        &self,
        ctx: &C,
        instance: SagaInstance<S::Data>,
        result: Result<()>,
        started: std::time::Instant,
    ) -> Result<SagaInstance<S::Data>>
    where
        C: DurableContext + ?Sized,
    {
        let duration = started.elapsed().as_secs_f64();
        metrics::histogram!("saga_duration_seconds").record(duration);

        match result {
            Ok(()) => {
                match instance.status() {
                    SagaStatus::Completed => {
                        metrics::counter!("saga_completed_total").increment(1);
                        tracing::info!(duration, "saga completed successfully");
                    }
                    SagaStatus::RolledBack => {
                        metrics::counter!("saga_rolled_back_total").increment(1);
                        tracing::warn!(duration, "saga rolled back");
                    }
                    status => tracing::debug!(%status, "saga suspended"),
                }
                Ok(instance)
            }
            Err(e) => {
                metrics::counter!("saga_failed_total").increment(1);
                tracing::error!(error = %e, retryable = e.is_retryable(), "saga failed");
                if let SagaError::CompensationFailed { step, reason } = &e
                    && self.config.compensation_failure_policy == CompensationFailurePolicy::Escalate
                {
                    self.escalate(ctx, &instance, *step, reason).await;
                }
                Err(e)
            }
        }
    }

    async fn escalate<C>(&self, ctx: &C, instance: &SagaInstance<S::Data>, step: i64, reason: &str)
    where
        C: DurableContext + ?Sized,
    {
        let persisted = match self.escalation_record(ctx, instance, step, reason).await {
            Ok(record) => ctx
                .persist_json(&self.config.escalation_key, &record)
                .await
                .map_err(SagaError::from),
            Err(e) => Err(e),
        };

        match persisted {
            Ok(()) => {
                metrics::counter!("saga_escalations_total").increment(1);
                tracing::error!(step, %reason, key = %self.config.escalation_key, "compensation failure escalated");
            }
            Err(e) => tracing::error!(error = %e, "failed to persist escalation record"),
        }
    }

    /// Snapshots the stored instance; the in-memory one is used only when
    /// nothing was persisted yet.
    async fn escalation_record<C>(
        &self,
        ctx: &C,
        instance: &SagaInstance<S::Data>,
        step: i64,
        reason: &str,
    ) -> Result<EscalationRecord>
    where
        C: DurableContext + ?Sized,
    {
        let instance = match ctx.restore_json(&self.config.state_key).await? {
            Some(stored) => stored,
            None => serde_json::to_value(instance)?,
        };
        Ok(EscalationRecord {
            saga_type: self.saga.definition().saga_type().to_string(),
            step,
            reason: reason.to_string(),
            instance,
            escalated_at: Utc::now(),
        })
    }
}

fn record_step(state: &SagaExecutionState) {
    let direction = if state.is_compensating() {
        "backward"
    } else {
        "forward"
    };
    metrics::counter!("saga_steps_executed_total", "direction" => direction).increment(1);
}
