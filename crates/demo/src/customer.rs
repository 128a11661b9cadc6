//! Customer service participant holding a credit limit.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use durable::{DurableError, Participant, ReplyEnvelope};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

pub const SERVICE: &str = "customer";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReserveCredit {
    pub order_id: String,
    pub total: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseCredit {
    pub order_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditReserved {
    pub reservation_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditLimitExceeded {
    pub requested: i64,
    pub available: i64,
}

/// Customer whose orders reserve credit against a fixed limit.
#[derive(Debug, Clone)]
pub struct CustomerService {
    credit_limit: i64,
    reservations: Arc<Mutex<HashMap<String, i64>>>,
}

impl CustomerService {
    pub fn new(credit_limit: i64) -> Self {
        Self {
            credit_limit,
            reservations: Arc::default(),
        }
    }

    /// Credit not yet reserved by any order.
    pub async fn available_credit(&self) -> i64 {
        let reserved: i64 = self.reservations.lock().await.values().sum();
        self.credit_limit - reserved
    }

    async fn reserve(&self, cmd: ReserveCredit) -> Result<ReplyEnvelope, DurableError> {
        let mut reservations = self.reservations.lock().await;
        let available = self.credit_limit - reservations.values().sum::<i64>();

        if cmd.total > available {
            tracing::info!(order_id = %cmd.order_id, requested = cmd.total, available, "credit limit exceeded");
            return Ok(ReplyEnvelope::failure(
                "CreditLimitExceeded",
                &CreditLimitExceeded {
                    requested: cmd.total,
                    available,
                },
            )?);
        }

        reservations.insert(cmd.order_id.clone(), cmd.total);
        tracing::info!(order_id = %cmd.order_id, total = cmd.total, "credit reserved");
        Ok(ReplyEnvelope::success(
            "CreditReserved",
            &CreditReserved {
                reservation_id: format!("CR-{}", cmd.order_id),
            },
        )?)
    }

    async fn release(&self, cmd: ReleaseCredit) -> Result<ReplyEnvelope, DurableError> {
        self.reservations.lock().await.remove(&cmd.order_id);
        tracing::info!(order_id = %cmd.order_id, "credit released");
        Ok(ReplyEnvelope::empty_success())
    }
}

#[async_trait]
impl Participant for CustomerService {
    async fn handle(&self, operation: &str, args: &[u8]) -> Result<ReplyEnvelope, DurableError> {
        match operation {
            "reserve_credit" => self.reserve(serde_json::from_slice(args)?).await,
            "release_credit" => self.release(serde_json::from_slice(args)?).await,
            other => Err(DurableError::Terminal(format!(
                "customer service has no operation '{other}'"
            ))),
        }
    }
}
