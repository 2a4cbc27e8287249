//! Order fulfillment route built from nested saga orchestrators.
//!
//! Placing an order starts a saga that confirms the order once every step
//! succeeds. Inventory reservation and payment join that saga and register
//! their compensations, so a declined payment releases the inventory and
//! refunds the charge. The audit entry is written outside any saga.

pub mod config;

use std::sync::{Arc, Mutex, PoisonError};

use saga::{
    EndpointRegistry, Exchange, FnProcessor, Pipeline, Propagation, SagaError, SagaProcessor,
    SagaService, SagaStep,
};
use serde_json::{Value, json};

pub const RELEASE_INVENTORY: &str = "direct:release-inventory";
pub const REFUND_PAYMENT: &str = "direct:refund-payment";
pub const CONFIRM_ORDER: &str = "direct:confirm-order";

const ORDER_ID_HEADER: &str = "orderId";

/// Side effects of the demo services, in the order they happened.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn order_id(exchange: &Exchange) -> String {
    match exchange.header(ORDER_ID_HEADER) {
        Some(Value::String(id)) => id.clone(),
        Some(other) => other.to_string(),
        None => "unknown".to_string(),
    }
}

/// Registers the completion and compensation endpoints of the route.
pub fn endpoints(ledger: &Ledger) -> EndpointRegistry {
    let (release, refund, confirm) = (ledger.clone(), ledger.clone(), ledger.clone());
    EndpointRegistry::new()
        .with(
            RELEASE_INVENTORY,
            FnProcessor::new(move |e: &mut Exchange| {
                release.record(format!("inventory released for {}", order_id(e)));
            }),
        )
        .with(
            REFUND_PAYMENT,
            FnProcessor::new(move |e: &mut Exchange| {
                refund.record(format!("payment refunded for {}", order_id(e)));
            }),
        )
        .with(
            CONFIRM_ORDER,
            FnProcessor::new(move |e: &mut Exchange| {
                confirm.record(format!("order {} confirmed", order_id(e)));
            }),
        )
}

/// Builds the `place order` route.
pub fn order_route(
    service: Arc<dyn SagaService>,
    ledger: &Ledger,
) -> Result<SagaProcessor, SagaError> {
    let reserve_ledger = ledger.clone();
    let reserve = SagaProcessor::builder()
        .propagation(Propagation::Required)
        .step(
            SagaStep::builder()
                .compensation(RELEASE_INVENTORY)
                .option(ORDER_ID_HEADER, ORDER_ID_HEADER)
                .build(),
        )
        .service(Arc::clone(&service))
        .processor(FnProcessor::new(move |e: &mut Exchange| {
            reserve_ledger.record(format!("inventory reserved for {}", order_id(e)));
        }))
        .build()?;

    let charge_ledger = ledger.clone();
    let charge = SagaProcessor::builder()
        .propagation(Propagation::Mandatory)
        .step(
            SagaStep::builder()
                .compensation(REFUND_PAYMENT)
                .option(ORDER_ID_HEADER, ORDER_ID_HEADER)
                .build(),
        )
        .service(Arc::clone(&service))
        .processor(FnProcessor::new(move |e: &mut Exchange| {
            if e.body()["decline_payment"].as_bool().unwrap_or(false) {
                e.set_error(SagaError::processing("payment declined"));
            } else {
                charge_ledger.record(format!("payment charged for {}", order_id(e)));
            }
        }))
        .build()?;

    let audit_ledger = ledger.clone();
    let audit = SagaProcessor::builder()
        .propagation(Propagation::NotSupported)
        .service(Arc::clone(&service))
        .processor(FnProcessor::new(move |e: &mut Exchange| {
            audit_ledger.record(format!("audit written for {}", order_id(e)));
        }))
        .build()?;

    SagaProcessor::builder()
        .propagation(Propagation::Required)
        .step(
            SagaStep::builder()
                .completion(CONFIRM_ORDER)
                .option(ORDER_ID_HEADER, ORDER_ID_HEADER)
                .build(),
        )
        .service(service)
        .processor(Pipeline::new().then(reserve).then(charge).then(audit))
        .build()
}

/// Creates the exchange that places one order.
pub fn order_exchange(order_id: &str, decline_payment: bool) -> Exchange {
    let mut exchange = Exchange::new(json!({
        "order_id": order_id,
        "decline_payment": decline_payment,
    }));
    exchange.set_header(ORDER_ID_HEADER, order_id);
    exchange
}
