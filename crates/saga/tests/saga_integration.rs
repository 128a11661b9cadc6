//! Integration tests driving sagas through the in-memory durable context.

use std::sync::{Arc, Mutex};

use durable::{
    DurableContext, DurableContextExt, DurableError, FnParticipant, InMemoryDurableContext,
    ParticipantCall, ParticipantRegistry, ReplyEnvelope, RetryPolicy, TERMINAL_FAILURE_TYPE,
    TerminalFailure,
};
use saga::{
    HandlerResult, SagaDefinition, SagaError, SagaExecutionState, SagaInstance, SagaManager,
    SagaStatus,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Order {
    amount: i64,
    pending: i64,
    reason: Option<String>,
    approved: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct Reserved {
    amount: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct Rejected {
    reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Customer {
    Approve,
    Reject,
    Unavailable,
    Crash,
    Unknown,
}

type Trace = Arc<Mutex<Vec<String>>>;

struct TestHarness {
    trace: Trace,
    customer: Arc<Mutex<Customer>>,
    ctx: InMemoryDurableContext,
}

impl TestHarness {
    fn new() -> Self {
        let trace: Trace = Arc::default();
        let customer = Arc::new(Mutex::new(Customer::Approve));

        let participant_trace = trace.clone();
        let behavior = customer.clone();
        let registry = ParticipantRegistry::new().with(
            "customer",
            FnParticipant::new(move |operation: &str, args: &[u8]| {
                participant_trace
                    .lock()
                    .unwrap()
                    .push(format!("customer.{operation}"));
                let amount: i64 = serde_json::from_slice(args)?;
                match (operation, *behavior.lock().unwrap()) {
                    ("release", _) | (_, Customer::Approve) => {
                        Ok(ReplyEnvelope::success("Reserved", &Reserved { amount })?)
                    }
                    (_, Customer::Reject) => Ok(ReplyEnvelope::failure(
                        "Rejected",
                        &Rejected {
                            reason: "REJECTED".to_string(),
                        },
                    )?),
                    (_, Customer::Unavailable) => {
                        Err(DurableError::Transient("customer service unavailable".into()))
                    }
                    (_, Customer::Crash) => Err(DurableError::Terminal("customer crashed".into())),
                    (_, Customer::Unknown) => Ok(ReplyEnvelope::failure("CreditFrozen", &())?),
                }
            }),
        );

        let ctx = InMemoryDurableContext::new(Arc::new(registry))
            .with_retry_policy(RetryPolicy::no_retry());

        Self {
            trace,
            customer,
            ctx,
        }
    }

    fn set_customer(&self, behavior: Customer) {
        *self.customer.lock().unwrap() = behavior;
    }

    fn trace(&self) -> Vec<String> {
        self.trace.lock().unwrap().clone()
    }

    fn count(&self, entry: &str) -> usize {
        self.trace().iter().filter(|e| *e == entry).count()
    }

    /// Local handler that records `name` and then applies `f`.
    fn local(
        &self,
        name: &'static str,
        f: fn(&mut Order) -> HandlerResult,
    ) -> impl Fn(&mut Order) -> HandlerResult + Send + Sync + 'static {
        let trace = self.trace.clone();
        move |order: &mut Order| -> HandlerResult {
            trace.lock().unwrap().push(name.to_string());
            f(order)
        }
    }

    /// step0: local `inc` / `dec`; step1: `customer.reserve` with a
    /// `Rejected` reply handler; step2: local `approve`.
    fn create_order_saga(&self) -> SagaDefinition<Order> {
        SagaDefinition::builder("CreateOrder")
            .step()
            .invoke_local(self.local("inc", inc))
            .compensate_local(self.local("dec", dec))
            .step()
            .invoke_participant(|order: &Order| {
                Ok(ParticipantCall::new("customer", "reserve", &order.amount)?)
            })
            .on_reply("Rejected", |order: &mut Order, reply: Rejected| {
                order.reason = Some(reply.reason)
            })
            .reply_type("Reserved")
            .step()
            .invoke_local(self.local("approve", approve))
            .build()
            .unwrap()
    }
}

fn inc(order: &mut Order) -> HandlerResult {
    order.pending += 1;
    Ok(())
}

fn dec(order: &mut Order) -> HandlerResult {
    order.pending -= 1;
    Ok(())
}

fn approve(order: &mut Order) -> HandlerResult {
    order.approved = true;
    Ok(())
}

fn noop(_: &mut Order) -> HandlerResult {
    Ok(())
}

fn fail(_: &mut Order) -> HandlerResult {
    Err("refused".into())
}

fn order(amount: i64) -> Order {
    Order {
        amount,
        ..Order::default()
    }
}

#[tokio::test]
async fn test_happy_path_runs_every_step() {
    let h = TestHarness::new();
    let manager = SagaManager::new(h.create_order_saga());

    let instance = manager.start(&h.ctx, order(50)).await.unwrap();

    assert_eq!(instance.status(), SagaStatus::Completed);
    assert!(instance.state().is_end_state());
    assert!(!instance.state().is_compensating());
    assert!(instance.data().approved);
    assert_eq!(instance.data().pending, 1);
    assert_eq!(h.trace(), vec!["inc", "customer.reserve", "approve"]);

    let stored = manager.load(&h.ctx).await.unwrap().unwrap();
    assert_eq!(stored, instance);
}

#[tokio::test]
async fn test_rejected_reply_compensates_and_skips_approve() {
    let h = TestHarness::new();
    h.set_customer(Customer::Reject);
    let handled = Arc::new(Mutex::new(Vec::new()));
    let observed = handled.clone();
    let manager = SagaManager::new(h.create_order_saga())
        .with_reply_observer(move |t: &str| observed.lock().unwrap().push(t.to_string()));

    let instance = manager.start(&h.ctx, order(50)).await.unwrap();

    assert_eq!(h.count("approve"), 0);
    assert_eq!(h.count("dec"), 1);
    assert_eq!(instance.data().reason.as_deref(), Some("REJECTED"));
    assert_eq!(instance.data().pending, 0);
    assert!(!instance.data().approved);
    assert!(instance.state().is_compensating());
    assert!(instance.state().is_end_state());
    assert_eq!(instance.status(), SagaStatus::RolledBack);
    assert_eq!(*handled.lock().unwrap(), vec!["Rejected"]);
}

#[tokio::test]
async fn test_compensations_skip_steps_without_one() {
    let h = TestHarness::new();
    let definition = SagaDefinition::builder("Sparse")
        .step()
        .invoke_local(h.local("a0", noop))
        .compensate_local(h.local("c0", noop))
        .step()
        .invoke_local(h.local("a1", noop))
        .step()
        .invoke_local(h.local("a2", noop))
        .compensate_local(h.local("c2", noop))
        .step()
        .invoke_local(h.local("a3", fail))
        .build()
        .unwrap();

    let instance = SagaManager::new(definition)
        .start(&h.ctx, Order::default())
        .await
        .unwrap();

    assert_eq!(h.trace(), vec!["a0", "a1", "a2", "a3", "c2", "c0"]);
    assert_eq!(instance.status(), SagaStatus::RolledBack);
}

#[tokio::test]
async fn test_forward_failure_compensates_in_reverse() {
    let h = TestHarness::new();
    let mut builder = SagaDefinition::<Order>::builder("Reverse").step();
    let names = [("a0", "c0"), ("a1", "c1"), ("a2", "c2"), ("a3", "c3"), ("a4", "c4")];
    for (index, (action, compensation)) in names.into_iter().enumerate() {
        let handler = if index == 3 { fail } else { noop };
        builder = builder
            .invoke_local(h.local(action, handler))
            .compensate_local(h.local(compensation, noop));
        if index < names.len() - 1 {
            builder = builder.step();
        }
    }
    let definition = builder.build().unwrap();

    SagaManager::new(definition)
        .start(&h.ctx, Order::default())
        .await
        .unwrap();

    assert_eq!(h.trace(), vec!["a0", "a1", "a2", "a3", "c2", "c1", "c0"]);
}

#[tokio::test]
async fn test_compensation_failure_is_fatal() {
    let h = TestHarness::new();
    let definition = SagaDefinition::builder("Fatal")
        .step()
        .invoke_local(h.local("a0", noop))
        .compensate_local(h.local("c0", noop))
        .step()
        .invoke_local(h.local("a1", noop))
        .compensate_local(h.local("c1", fail))
        .step()
        .invoke_local(h.local("a2", fail))
        .build()
        .unwrap();
    let manager = SagaManager::new(definition);

    let err = manager.start(&h.ctx, Order::default()).await.unwrap_err();

    assert!(matches!(err, SagaError::CompensationFailed { step: 1, .. }));
    assert!(!err.is_retryable());
    assert_eq!(h.count("c0"), 0);

    // The last committed transition stays persisted for inspection.
    let stored = manager.load(&h.ctx).await.unwrap().unwrap();
    assert!(!stored.state().is_end_state());
}

#[tokio::test]
async fn test_participant_compensation_failure_is_fatal() {
    let h = TestHarness::new();
    let definition = SagaDefinition::builder("ReleaseFails")
        .step()
        .invoke_participant(|o: &Order| Ok(ParticipantCall::new("customer", "reserve", &o.amount)?))
        .compensate_participant(|o: &Order| {
            Ok(ParticipantCall::new("inventory", "release", &o.amount)?)
        })
        .reply_type("Reserved")
        .step()
        .invoke_local(h.local("a1", fail))
        .build()
        .unwrap();

    let err = SagaManager::new(definition)
        .start(&h.ctx, order(5))
        .await
        .unwrap_err();

    // No participant is registered as "inventory", so the release fails terminally.
    assert!(err.is_compensation_failure());
}

#[tokio::test]
async fn test_terminal_participant_error_rolls_back() {
    let h = TestHarness::new();
    h.set_customer(Customer::Crash);
    let failures = Arc::new(Mutex::new(Vec::new()));
    let seen = failures.clone();
    let definition = SagaDefinition::builder("Crashing")
        .step()
        .invoke_local(h.local("inc", inc))
        .compensate_local(h.local("dec", dec))
        .step()
        .invoke_participant(|o: &Order| Ok(ParticipantCall::new("customer", "reserve", &o.amount)?))
        .on_reply(TERMINAL_FAILURE_TYPE, move |_: &mut Order, f: TerminalFailure| {
            seen.lock().unwrap().push(f.message)
        })
        .build()
        .unwrap();

    let instance = SagaManager::new(definition)
        .start(&h.ctx, order(1))
        .await
        .unwrap();

    assert_eq!(instance.status(), SagaStatus::RolledBack);
    assert_eq!(h.count("dec"), 1);
    let failures = failures.lock().unwrap();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].contains("customer crashed"));
}

#[tokio::test]
async fn test_unregistered_success_reply_is_fatal() {
    let h = TestHarness::new();
    let definition = SagaDefinition::builder("Unregistered")
        .step()
        .invoke_participant(|o: &Order| Ok(ParticipantCall::new("customer", "reserve", &o.amount)?))
        .build()
        .unwrap();

    let err = SagaManager::new(definition)
        .start(&h.ctx, order(1))
        .await
        .unwrap_err();

    assert!(matches!(err, SagaError::MissingReplyType(t) if t == "Reserved"));
}

#[tokio::test]
async fn test_unregistered_failure_reply_falls_back_to_compensation() {
    let h = TestHarness::new();
    h.set_customer(Customer::Unknown);
    let manager = SagaManager::new(h.create_order_saga());

    let instance = manager.start(&h.ctx, order(1)).await.unwrap();

    assert_eq!(instance.status(), SagaStatus::RolledBack);
    assert_eq!(h.count("dec"), 1);
    assert!(instance.data().reason.is_none());
}

#[tokio::test]
async fn test_resume_runs_only_remaining_steps() {
    let h = TestHarness::new();
    let definition = SagaDefinition::builder("Resumable")
        .step()
        .invoke_local(h.local("a0", noop))
        .step()
        .invoke_local(h.local("a1", noop))
        .step()
        .invoke_local(h.local("a2", noop))
        .step()
        .invoke_local(h.local("a3", noop))
        .build()
        .unwrap();
    let manager = SagaManager::new(definition);

    // Steps 0 and 1 committed before the crash.
    let persisted = SagaInstance::with_state(Order::default(), SagaExecutionState::at(1, false));
    h.ctx.persist_json("saga_instance", &persisted).await.unwrap();

    let instance = manager.resume(&h.ctx.replay()).await.unwrap();

    assert_eq!(h.trace(), vec!["a2", "a3"]);
    assert_eq!(instance.status(), SagaStatus::Completed);
}

#[tokio::test]
async fn test_resume_replays_journaled_participant_reply() {
    let h = TestHarness::new();
    let definition = SagaDefinition::builder("Replay")
        .step()
        .invoke_local(h.local("inc", inc))
        .step()
        .invoke_participant(|o: &Order| Ok(ParticipantCall::new("customer", "reserve", &o.amount)?))
        .reply_type("Reserved")
        .step()
        .invoke_participant(|o: &Order| Ok(ParticipantCall::new("customer", "confirm", &o.amount)?))
        .reply_type("Reserved")
        .build()
        .unwrap();
    let manager = SagaManager::new(definition);

    // Reserve succeeds, then the customer service goes away before confirm.
    let first = h.ctx.clone();
    let reserve = ParticipantCall::new("customer", "reserve", &7).unwrap();
    let key = first.execution_id().scoped("Replay:1:invoke");
    first.call_participant(&reserve.with_key(key)).await.unwrap();
    h.set_customer(Customer::Unavailable);

    // Crash after persisting the reserve step, before its reply was handled.
    let persisted = SagaInstance::with_state(
        Order {
            amount: 7,
            pending: 1,
            ..Order::default()
        },
        SagaExecutionState::at(1, false),
    );
    first.persist_json("saga_instance", &persisted).await.unwrap();

    let err = manager.run(&first.replay(), order(7)).await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(h.ctx.replayed_count().await, 1);
    assert_eq!(h.count("customer.reserve"), 1);
    assert_eq!(h.count("inc"), 0);

    h.set_customer(Customer::Approve);
    let instance = manager.run(&first.replay(), order(7)).await.unwrap();

    assert_eq!(instance.status(), SagaStatus::Completed);
    assert_eq!(instance.data().pending, 1);
    assert_eq!(h.count("customer.reserve"), 1);
    assert_eq!(h.count("customer.confirm"), 2);
}

#[tokio::test]
async fn test_resume_while_compensating_runs_only_remaining_compensations() {
    let h = TestHarness::new();
    let definition = SagaDefinition::builder("Unwinding")
        .step()
        .invoke_local(h.local("a0", noop))
        .compensate_local(h.local("c0", noop))
        .step()
        .invoke_local(h.local("a1", noop))
        .compensate_local(h.local("c1", noop))
        .step()
        .invoke_local(h.local("a2", noop))
        .compensate_local(h.local("c2", noop))
        .step()
        .invoke_local(h.local("a3", fail))
        .build()
        .unwrap();
    let manager = SagaManager::new(definition);

    // Step 3 failed and the compensation of step 2 committed before the crash.
    let persisted = SagaInstance::with_state(Order::default(), SagaExecutionState::at(2, true));
    h.ctx.persist_json("saga_instance", &persisted).await.unwrap();

    let instance = manager.resume(&h.ctx.replay()).await.unwrap();

    assert_eq!(h.trace(), vec!["c1", "c0"]);
    assert_eq!(instance.status(), SagaStatus::RolledBack);
    assert!(instance.state().is_compensating());
}

#[tokio::test]
async fn test_resume_while_compensating_replays_journaled_compensation() {
    let h = TestHarness::new();
    let definition = SagaDefinition::builder("Undo")
        .step()
        .invoke_local(h.local("inc", inc))
        .compensate_local(h.local("dec", dec))
        .step()
        .invoke_participant(|o: &Order| Ok(ParticipantCall::new("customer", "reserve", &o.amount)?))
        .compensate_participant(|o: &Order| {
            Ok(ParticipantCall::new("customer", "release", &o.amount)?)
        })
        .reply_type("Reserved")
        .step()
        .invoke_local(h.local("approve", fail))
        .build()
        .unwrap();
    let manager = SagaManager::new(definition);

    // The release went out and was journaled, then the process died before
    // its reply was handled.
    let release = ParticipantCall::new("customer", "release", &5).unwrap();
    let key = h.ctx.execution_id().scoped("Undo:1:compensate");
    h.ctx.call_participant(&release.with_key(key)).await.unwrap();

    let persisted = SagaInstance::with_state(
        Order {
            amount: 5,
            pending: 1,
            ..Order::default()
        },
        SagaExecutionState::at(1, true),
    );
    h.ctx.persist_json("saga_instance", &persisted).await.unwrap();

    let instance = manager.run(&h.ctx.replay(), order(5)).await.unwrap();

    assert_eq!(instance.status(), SagaStatus::RolledBack);
    assert_eq!(instance.data().pending, 0);
    assert_eq!(h.ctx.replayed_count().await, 1);
    assert_eq!(h.count("customer.release"), 1);
    assert_eq!(h.count("customer.reserve"), 0);
    assert_eq!(h.trace(), vec!["customer.release", "dec"]);
}

#[tokio::test]
async fn test_run_on_finished_instance_is_noop() {
    let h = TestHarness::new();
    let manager = SagaManager::new(h.create_order_saga());

    let first = manager.run(&h.ctx, order(3)).await.unwrap();
    let persists = h.ctx.persist_count().await;

    let second = manager.run(&h.ctx.replay(), order(99)).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(h.count("inc"), 1);
    assert_eq!(h.ctx.persist_count().await, persists);
}

#[tokio::test]
async fn test_persisted_before_participant_call() {
    let h = TestHarness::new();
    h.set_customer(Customer::Unavailable);
    let manager = SagaManager::new(h.create_order_saga());

    let err = manager.start(&h.ctx, order(10)).await.unwrap_err();
    assert!(err.is_retryable());

    let stored = manager.load(&h.ctx).await.unwrap().unwrap();
    assert_eq!(stored.state().currently_executing(), 1);
    assert!(!stored.state().is_compensating());
    assert_eq!(stored.data().pending, 1);
}

#[tokio::test]
async fn test_compensation_predicate_skips_step() {
    let h = TestHarness::new();
    let definition = SagaDefinition::builder("Guarded")
        .step()
        .invoke_local(h.local("a0", noop))
        .compensate_local(h.local("c0", noop))
        .step()
        .invoke_local(h.local("a1", noop))
        .compensate_local(h.local("c1", noop))
        .compensation_predicate(|o: &Order| o.amount > 100)
        .step()
        .invoke_local(h.local("a2", fail))
        .build()
        .unwrap();

    SagaManager::new(definition)
        .start(&h.ctx, order(10))
        .await
        .unwrap();

    assert_eq!(h.trace(), vec!["a0", "a1", "a2", "c0"]);
}
