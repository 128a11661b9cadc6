//! The create-order saga.
//!
//! 1. Create the order as pending (compensation: reject it)
//! 2. Reserve credit with the customer service (compensation: release it)
//! 3. Approve the order

use async_trait::async_trait;
use durable::ParticipantCall;
use saga::{HandlerResult, Saga, SagaDefinition};
use serde::{Deserialize, Serialize};

use crate::customer::{self, CreditLimitExceeded, CreditReserved, ReleaseCredit, ReserveCredit};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderState {
    #[default]
    New,
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub total: i64,
    pub state: OrderState,
    pub reservation_id: Option<String>,
    pub rejection_reason: Option<String>,
}

impl Order {
    pub fn new(total: i64) -> Self {
        Self {
            order_id: uuid::Uuid::new_v4().to_string(),
            total,
            state: OrderState::New,
            reservation_id: None,
            rejection_reason: None,
        }
    }
}

fn create_pending(order: &mut Order) -> HandlerResult {
    order.state = OrderState::Pending;
    Ok(())
}

fn reject(order: &mut Order) -> HandlerResult {
    order.state = OrderState::Rejected;
    Ok(())
}

fn approve(order: &mut Order) -> HandlerResult {
    if order.total <= 0 {
        return Err(format!("order total must be positive, got {}", order.total).into());
    }
    order.state = OrderState::Approved;
    Ok(())
}

fn reserve_credit(order: &Order) -> HandlerResult<ParticipantCall> {
    let cmd = ReserveCredit {
        order_id: order.order_id.clone(),
        total: order.total,
    };
    Ok(ParticipantCall::new(customer::SERVICE, "reserve_credit", &cmd)?)
}

fn release_credit(order: &Order) -> HandlerResult<ParticipantCall> {
    let cmd = ReleaseCredit {
        order_id: order.order_id.clone(),
    };
    Ok(ParticipantCall::new(customer::SERVICE, "release_credit", &cmd)?)
}

pub struct CreateOrderSaga {
    definition: SagaDefinition<Order>,
}

impl CreateOrderSaga {
    pub fn new() -> saga::Result<Self> {
        let definition = SagaDefinition::builder("CreateOrder")
            .step()
            .invoke_local(create_pending)
            .compensate_local(reject)
            .step()
            .invoke_participant(reserve_credit)
            .on_reply("CreditReserved", |order: &mut Order, reply: CreditReserved| {
                order.reservation_id = Some(reply.reservation_id);
            })
            .on_reply(
                "CreditLimitExceeded",
                |order: &mut Order, reply: CreditLimitExceeded| {
                    order.rejection_reason = Some(format!(
                        "credit limit exceeded: requested {}, available {}",
                        reply.requested, reply.available
                    ));
                },
            )
            .compensate_participant(release_credit)
            .compensation_predicate(|order: &Order| order.reservation_id.is_some())
            .step()
            .invoke_local(approve)
            .build()?;

        Ok(Self { definition })
    }
}

#[async_trait]
impl Saga for CreateOrderSaga {
    type Data = Order;

    fn definition(&self) -> &SagaDefinition<Order> {
        &self.definition
    }

    async fn on_saga_completed_successfully(&self, order: &mut Order) {
        tracing::info!(order_id = %order.order_id, total = order.total, "order approved");
    }

    async fn on_saga_rolled_back(&self, order: &mut Order) {
        if order.rejection_reason.is_none() {
            order.rejection_reason = Some("order could not be approved".to_string());
        }
        tracing::warn!(
            order_id = %order.order_id,
            reason = order.rejection_reason.as_deref().unwrap_or_default(),
            "order rejected"
        );
    }
}
