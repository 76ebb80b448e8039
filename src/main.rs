use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use customer_service::config::{BusBackend, Config, StoreBackend};
use customer_service::messaging::{EventBus, EventPublisher, InMemoryEventBus, RedpandaClient};
use customer_service::metrics::{self, Metrics};
use customer_service::outbox::{outbox_table, OutboxRelay};
use customer_service::store::{CustomerCodec, CustomerGateway, InMemoryStore, KeyValueStore, ScyllaStore};
use customer_service::{CustomerService, DeliveryMode, NewCustomer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG overrides the default filter, e.g. RUST_LOG=debug
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,customer_service=debug")),
        )
        .init();

    tracing::info!("🚀 Starting customer service");

    let config = Config::from_env()?;
    tracing::info!(
        store = ?config.store.backend,
        bus = ?config.bus.backend,
        delivery = ?config.delivery,
        "Configuration loaded"
    );

    // === 1. Metrics registry + HTTP endpoint ===
    let metrics = Arc::new(Metrics::new()?);
    tracing::info!("📊 Metrics registry created with {} metrics", metrics.registry().gather().len());

    let server_metrics = metrics.clone();
    let metrics_port = config.metrics.port;
    std::thread::spawn(move || {
        let system = actix_web::rt::System::new();
        if let Err(e) = system.block_on(metrics::start_metrics_server(server_metrics, metrics_port)) {
            tracing::error!("Metrics server error: {}", e);
        }
    });

    // === 2. Store and bus clients (built once, shared by Arc) ===
    let store = build_store(&config).await?;
    let bus = build_bus(&config, metrics.clone())?;

    // === 3. Gateway, publisher, service ===
    let gateway = Arc::new(CustomerGateway::new(store, &config.store, metrics.clone()));
    let publisher = Arc::new(EventPublisher::new(bus, config.bus.clone(), metrics.clone()));
    let service = CustomerService::new(gateway.clone(), publisher.clone(), config.delivery, metrics.clone());

    // === 4. Outbox relay (outbox mode only) ===
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let relay_handle = match config.delivery {
        DeliveryMode::Outbox => {
            let relay = OutboxRelay::new(
                gateway.clone(),
                publisher.clone(),
                config.outbox.retry.clone(),
                config.outbox.poll_interval,
                metrics.clone(),
            );
            Some(tokio::spawn(async move { relay.run(shutdown_rx).await }))
        }
        DeliveryMode::Direct => None,
    };

    // === 5. Demonstrate the customer lifecycle ===
    tracing::info!("📝 Demonstrating customer lifecycle");

    let created = service.create(NewCustomer::new("Ann", "a@x.com", "AC1")).await?;
    tracing::info!(customer_id = %created.id, "Created {}", serde_json::to_string(&created)?);

    let fetched = service.get(&created.id).await?;
    tracing::info!(customer_id = %fetched.id, name = %fetched.name, "Fetched customer");

    let listed = service.list().await?;
    tracing::info!(count = listed.len(), "Listed customers");

    let deleted = service.delete(&created.id).await?;
    tracing::info!(customer_id = %deleted.id, "Deleted customer");

    match service.get(&created.id).await {
        Err(e) if e.is_not_found() => tracing::info!(customer_id = %created.id, "Customer is gone"),
        Err(e) => return Err(e.into()),
        Ok(_) => anyhow::bail!("customer {} still present after delete", created.id),
    }

    if let Some(handle) = relay_handle {
        tracing::info!("⏳ Waiting for outbox relay to publish events...");
        tokio::time::sleep(config.outbox.poll_interval * 2).await;
        shutdown_tx.send(true)?;
        handle.await?;
    }

    tracing::info!("🎉 Demo complete!");

    Ok(())
}

async fn build_store(config: &Config) -> anyhow::Result<Arc<dyn KeyValueStore>> {
    match config.store.backend {
        StoreBackend::Memory => {
            tracing::info!("Using in-memory store");
            Ok(Arc::new(InMemoryStore::new()))
        }
        StoreBackend::Scylla => {
            tracing::info!(nodes = ?config.scylla.nodes, "Connecting to ScyllaDB...");
            let session: Session = SessionBuilder::new()
                .known_nodes(&config.scylla.nodes)
                .build()
                .await?;

            session
                .query_unpaged(
                    format!(
                        "CREATE KEYSPACE IF NOT EXISTS {} WITH REPLICATION = \
                         {{'class': 'SimpleStrategy', 'replication_factor': 1}}",
                        config.scylla.keyspace
                    ),
                    &[],
                )
                .await?;
            session.use_keyspace(&config.scylla.keyspace, false).await?;

            let store = ScyllaStore::new(Arc::new(session));
            let codec = CustomerCodec::new(config.store.attributes.clone());
            store.ensure_table(&codec.table(&config.store.customer_table)).await?;
            if config.delivery == DeliveryMode::Outbox {
                store.ensure_table(&outbox_table(&config.store.outbox_table)).await?;
            }

            Ok(Arc::new(store))
        }
    }
}

fn build_bus(config: &Config, metrics: Arc<Metrics>) -> anyhow::Result<Arc<dyn EventBus>> {
    match config.bus.backend {
        BusBackend::Memory => {
            tracing::info!("Using in-memory event bus");
            Ok(Arc::new(InMemoryEventBus::new()))
        }
        BusBackend::Redpanda => Ok(Arc::new(RedpandaClient::new(&config.redpanda, metrics)?)),
    }
}
