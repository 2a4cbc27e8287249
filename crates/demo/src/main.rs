//! Demo entry point: places one confirmed and one declined order.

use std::sync::Arc;

use saga::{InMemorySagaService, Processor};
use saga_demo::config::Config;
use saga_demo::{Ledger, endpoints, order_exchange, order_route};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let metrics_handle =
        metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    // 3. Assemble the saga service and the route
    let ledger = Ledger::new();
    let service = InMemorySagaService::with_config(config.saga, endpoints(&ledger));
    let route = order_route(Arc::new(service), &ledger)?;

    // 4. Place the orders
    for (order_id, decline_payment) in [("o-1001", false), ("o-1002", true)] {
        let mut exchange = order_exchange(order_id, decline_payment);
        route.process(&mut exchange).await;

        let outcome = match exchange.error() {
            None => {
                tracing::info!(order_id, "order placed");
                "placed"
            }
            Some(e) => {
                tracing::warn!(order_id, error = %e, "order rolled back");
                "rolled_back"
            }
        };
        metrics::counter!("demo_orders_total", "outcome" => outcome).increment(1);
    }

    for entry in ledger.entries() {
        println!("{entry}");
    }
    println!("\n{}", metrics_handle.render());
    Ok(())
}
