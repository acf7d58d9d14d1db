//! Full-stack, harness-style tests (spec §8's "concrete end-to-end
//! scenarios") that the per-module unit tests don't reach: the HTTP+SSE
//! surface itself. Mirrors the teacher's `tests/test_api.rs` shape — one
//! `start_test_server`-equivalent helper, then a `#[tokio::test]` per
//! scenario — but drives the router in-process with `tower::ServiceExt`
//! instead of binding a real socket, since nothing here needs TLS or an
//! actual MQTT broker.


use crate::config::{ConfigFile, MqttConfig};
use crate::ingest::{mqtt, Pipeline};
use crate::store::ObjectStore;
use crate::subscriptions::SubscriptionManager;
use crate::web::{self, AppState};
use concread::cowcell::asynch::CowCell;
use std::sync::Arc;
use tokio::sync::watch;

/// Assembles the same handles `main.rs` wires together, minus the MQTT
/// event loop and the listening socket — tests drive the router directly.
async fn test_state(config: ConfigFile) -> AppState {
    let store = ObjectStore::spawn();
    let subscriptions = SubscriptionManager::spawn();
    let pipeline = Arc::new(Pipeline::new(store.clone()));
    let (client, _event_loop) = mqtt::connect(&MqttConfig::default(), "test-host").expect("builds mqtt options");
    let (_state_tx, state_rx) = watch::channel(crate::enums::MqttConnectionState::Disconnected);

    AppState {
        store,
        subscriptions,
        pipeline,
        config: Arc::new(CowCell::new(config)),
        mqtt_state: state_rx,
        mqtt_client: client,
    }
}

async fn test_router(config: ConfigFile) -> axum::Router {
    web::build(test_state(config).await)
}
