//! Binary entry point: parses the CLI, loads configuration, then spawns the
//! store actor, the subscription actor, the MQTT ingest task, and the HTTP
//! server, and runs until either background task ends. Mirrors the
//! teacher's `Servers` builder's "join every task, shut down on the first
//! failure" shape via `tokio::select!` instead of a polling loop, since
//! this bridge only ever has the two tasks to watch.

use clap::Parser;
use concread::cowcell::asynch::CowCell;
use i3x_bridge::cli::{Cli, Commands};
use i3x_bridge::config::ConfigFile;
use i3x_bridge::enums::MqttConnectionState;
use i3x_bridge::ingest::{mqtt, Pipeline};
use i3x_bridge::model::{RelationshipType, BUILTIN_RELATIONSHIP_TYPES};
use i3x_bridge::schema_mapper;
use i3x_bridge::store::ObjectStore;
use i3x_bridge::subscriptions::SubscriptionManager;
use i3x_bridge::web::{self, AppState};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    match cli.command() {
        Commands::ExportConfig => {
            println!("{}", ConfigFile::default().as_json_pretty());
            std::process::ExitCode::SUCCESS
        }
        Commands::ConfigCheck { sopt } => {
            i3x_bridge::logging::init(if sopt.debug { "debug" } else { "info" });
            match ConfigFile::try_from(sopt.config.as_deref()) {
                Ok(config) => match config.check() {
                    Ok(()) => {
                        info!("configuration is valid");
                        std::process::ExitCode::SUCCESS
                    }
                    Err(errors) => {
                        for e in errors {
                            error!("{e}");
                        }
                        std::process::ExitCode::FAILURE
                    }
                },
                Err(e) => {
                    error!("{e}");
                    std::process::ExitCode::FAILURE
                }
            }
        }
        Commands::Serve { sopt } => {
            let config = match ConfigFile::try_from(sopt.config.as_deref()) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("failed to load configuration: {e}");
                    return std::process::ExitCode::FAILURE;
                }
            };
            i3x_bridge::logging::init(if sopt.debug { "debug" } else { &config.log_level });

            if let Err(errors) = config.check() {
                for e in errors {
                    error!("{e}");
                }
                return std::process::ExitCode::FAILURE;
            }

            match serve(config).await {
                Ok(()) => std::process::ExitCode::SUCCESS,
                Err(e) => {
                    error!("{e}");
                    std::process::ExitCode::FAILURE
                }
            }
        }
    }
}

async fn serve(config: ConfigFile) -> Result<(), i3x_bridge::error::BridgeError> {
    let hostname = config.hostname.clone();
    let listen_address = config.api_listener_address()?;
    let mqtt_config = config.mqtt.clone();

    let store = ObjectStore::spawn();
    let subscriptions = SubscriptionManager::spawn();
    let pipeline = Arc::new(Pipeline::new(store.clone()));

    seed_store(&store, &pipeline, &config).await;

    // every upsert fans out to the subscription manager so SSE/sync see it.
    let notify_subscriptions = subscriptions.clone();
    store
        .add_change_listener(Box::new(move |element_id, value, _instance| {
            let subscriptions = notify_subscriptions.clone();
            let element_id = element_id.clone();
            let value = value.clone();
            tokio::spawn(async move {
                let _ = subscriptions.notify(element_id, value).await;
            });
        }))
        .await?;

    let (client, event_loop) = mqtt::connect(&mqtt_config, &hostname)?;
    let (mqtt_state_tx, mqtt_state_rx) = watch::channel(MqttConnectionState::Disconnected);

    let mqtt_task = {
        let pipeline = pipeline.clone();
        let reconnect_period_secs = mqtt_config.reconnect_period_secs;
        tokio::spawn(mqtt::run(client.clone(), event_loop, reconnect_period_secs, pipeline, mqtt_state_tx))
    };

    let state = AppState {
        store,
        subscriptions,
        pipeline,
        config: Arc::new(CowCell::new(config)),
        mqtt_state: mqtt_state_rx,
        mqtt_client: client,
    };
    let router = web::build(state);

    info!(%listen_address, "starting HTTP server");
    let listener = tokio::net::TcpListener::bind(listen_address).await?;
    let http_task = tokio::spawn(async move { axum::serve(listener, router).await });

    tokio::select! {
        result = mqtt_task => {
            if let Err(e) = result {
                error!(error = %e, "mqtt ingest task panicked");
            } else {
                error!("mqtt ingest task ended unexpectedly");
            }
        }
        result = http_task => {
            match result {
                Ok(Ok(())) => info!("http server stopped"),
                Ok(Err(e)) => error!(error = %e, "http server failed"),
                Err(e) => error!(error = %e, "http server task panicked"),
            }
        }
    }

    Ok(())
}

/// Registers the config document's namespaces, object types, and mapping
/// rules, plus the implicit `GenericTag` fallback type and the four
/// built-in relationship types (spec §3) — `RelationshipType::builtins()`
/// handles those already inside `ObjectStoreState::new`, so here we only
/// need to seed what the config file actually names.
async fn seed_store(store: &ObjectStore, pipeline: &Pipeline, config: &ConfigFile) {
    for namespace in &config.namespaces {
        if let Err(e) = store.register_namespace(namespace.clone()).await {
            error!(error = %e, uri = namespace.uri, "failed to register namespace");
        }
    }
    for object_type in &config.object_types {
        if let Err(e) = store.register_object_type(object_type.clone()).await {
            error!(error = %e, id = object_type.element_id, "failed to register object type");
        }
    }
    let default_namespace = config.namespaces.first().map(|n| n.uri.clone()).unwrap_or_else(|| "urn:default".to_string());
    if let Err(e) = store.register_object_type(schema_mapper::generic_tag_type(&default_namespace)).await {
        error!(error = %e, "failed to register GenericTag fallback type");
    }

    for (id, _, _) in BUILTIN_RELATIONSHIP_TYPES {
        if store.get_relationship_type(id).await.ok().flatten().is_none() {
            for relationship_type in RelationshipType::builtins() {
                let _ = store.register_relationship_type(relationship_type).await;
            }
            break;
        }
    }

    for mapping in config.mappings.clone() {
        let id = mapping.id.clone();
        match pipeline.add_rule(mapping) {
            Ok(filter) => info!(mapping = id, filter, "loaded mapping rule"),
            Err(e) => error!(mapping = id, error = %e, "invalid mapping rule in configuration"),
        }
    }
}
