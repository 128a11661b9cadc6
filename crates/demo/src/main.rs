//! Saga demo entry point.
//!
//! Places a series of orders for one customer. Each order runs the
//! create-order saga in its own durable execution; orders that no longer
//! fit the customer's credit limit are rolled back. The collected metrics
//! are printed in Prometheus text format on exit.

mod config;
mod customer;
mod order_saga;

use std::sync::Arc;

use durable::{DurableContext, InMemoryDurableContext, ParticipantRegistry};
use saga::{SagaConfig, SagaManager};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{DemoConfig, LogFormat};
use crate::customer::CustomerService;
use crate::order_saga::{CreateOrderSaga, Order};

fn init_tracing(config: &DemoConfig) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Configuration and tracing
    let config = DemoConfig::from_env();
    init_tracing(&config);
    let saga_config = SagaConfig::from_env();
    tracing::info!(?config, ?saga_config, "starting saga demo");

    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    // 2. Participants
    let customer_service = CustomerService::new(config.credit_limit);
    let registry = Arc::new(
        ParticipantRegistry::new().with(customer::SERVICE, customer_service.clone()),
    );

    // 3. Saga manager
    let manager = SagaManager::with_config(CreateOrderSaga::new()?, saga_config);

    // 4. One durable execution per order
    for _ in 0..config.order_count {
        let ctx = InMemoryDurableContext::new(registry.clone());
        let order = Order::new(config.order_total);
        let order_id = order.order_id.clone();

        let instance = manager.run(&ctx, order).await?;
        let available_credit = customer_service.available_credit().await;
        tracing::info!(
            execution_id = %ctx.execution_id(),
            %order_id,
            status = %instance.status(),
            state = ?instance.data().state,
            reason = ?instance.data().rejection_reason,
            available_credit,
            "order processed"
        );

        // Replaying a finished execution returns the stored outcome.
        let replayed = manager.run(&ctx.replay(), Order::new(config.order_total)).await?;
        tracing::debug!(
            %order_id,
            consistent = replayed == instance,
            "replayed finished execution"
        );
    }

    let available_credit = customer_service.available_credit().await;
    tracing::info!(available_credit, "saga demo finished");
    println!("{}", metrics_handle.render());
    Ok(())
}
