//! The MQTT ingress task (spec §5 "Ingress"): connects with `rumqttc`,
//! subscribes every mapping rule's derived filter, and hands each publish to
//! the [`super::Pipeline`]. Reconnection and resubscription are handled by
//! draining `EventLoop::poll` in a loop, matching the teacher's pattern of
//! one task owning one external connection and reporting state over a
//! `watch` channel rather than returning from `main`.

use super::Pipeline;
use crate::config::MqttConfig;
use crate::enums::MqttConnectionState;
use chrono::Utc;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS, Transport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Builds the `rumqttc` client options from a [`MqttConfig`], including the
/// optional rustls TLS transport.
fn build_options(config: &MqttConfig, hostname: &str) -> Result<MqttOptions, crate::error::BridgeError> {
    let client_id = config
        .client_id
        .clone()
        .unwrap_or_else(|| format!("i3x-bridge-{hostname}"));

    let (host, port) = parse_broker_url(&config.broker_url)?;
    let mut options = MqttOptions::new(client_id, host, port);
    options.set_keep_alive(Duration::from_secs(config.keepalive_secs));

    if let (Some(username), Some(password)) = (&config.username, &config.password) {
        options.set_credentials(username, password);
    }

    if let Some(tls) = &config.tls {
        let mut roots = rustls::RootCertStore::empty();
        if let Some(ca_file) = &tls.ca_file {
            let pem = std::fs::read(ca_file)
                .map_err(|e| crate::error::BridgeError::ConfigError(format!("reading {ca_file}: {e}")))?;
            let certs: Vec<_> = rustls_pemfile::certs(&mut pem.as_slice())
                .collect::<Result<_, _>>()
                .map_err(|e| crate::error::BridgeError::ConfigError(format!("parsing {ca_file}: {e}")))?;
            for cert in certs {
                roots
                    .add(cert)
                    .map_err(|e| crate::error::BridgeError::ConfigError(e.to_string()))?;
            }
        }
        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        options.set_transport(Transport::tls_with_config(tls_config.into()));
        if tls.insecure {
            tracing::warn!("mqtt.tls.insecure is set; certificate verification is weakened");
        }
    }

    Ok(options)
}

/// `tcp://host:port` / `ssl://host:port` → `(host, port)`. A bare `host:port`
/// with no scheme is accepted the same way.
fn parse_broker_url(url: &str) -> Result<(String, u16), crate::error::BridgeError> {
    let without_scheme = url.split("://").next_back().unwrap_or(url);
    let (host, port) = without_scheme
        .rsplit_once(':')
        .ok_or_else(|| crate::error::BridgeError::ConfigError(format!("broker_url missing port: {url}")))?;
    let port: u16 = port
        .parse()
        .map_err(|_| crate::error::BridgeError::ConfigError(format!("invalid port in broker_url: {url}")))?;
    Ok((host.to_string(), port))
}

/// Builds the client and its event loop without starting anything. Split
/// out from [`run`] so `main` can hand a clone of the client to the admin
/// HTTP handlers (subscribing a newly-created mapping's topic doesn't need
/// to go through the event loop that's busy polling).
pub fn connect(config: &MqttConfig, hostname: &str) -> Result<(AsyncClient, rumqttc::EventLoop), crate::error::BridgeError> {
    let options = build_options(config, hostname)?;
    Ok(AsyncClient::new(options, 64))
}

/// Runs forever, reconnecting for as long as the process lives. Every
/// incoming publish is handed to `pipeline.process_message`; every
/// connection transition is pushed onto `state_tx` for `/status` to read.
pub async fn run(
    client: AsyncClient,
    mut event_loop: rumqttc::EventLoop,
    reconnect_period_secs: u64,
    pipeline: Arc<Pipeline>,
    state_tx: watch::Sender<MqttConnectionState>,
) {
    let _ = state_tx.send(MqttConnectionState::Connecting);

    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                let _ = state_tx.send(MqttConnectionState::Connected);
                resubscribe(&client, &pipeline).await;
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let receive_time = Utc::now();
                pipeline
                    .process_message(&publish.topic, &publish.payload, receive_time)
                    .await;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "mqtt connection error; retrying");
                let _ = state_tx.send(MqttConnectionState::Reconnecting);
                tokio::time::sleep(Duration::from_secs(reconnect_period_secs)).await;
            }
        }
    }
}

async fn resubscribe(client: &AsyncClient, pipeline: &Pipeline) {
    for filter in pipeline.mqtt_filters() {
        if let Err(e) = client.subscribe(&filter, QoS::AtLeastOnce).await {
            tracing::warn!(filter, error = %e, "failed to subscribe");
        } else {
            tracing::debug!(filter, "subscribed");
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_scheme_host_and_port() {
        assert_eq!(
            parse_broker_url("tcp://broker.local:1883").unwrap(),
            ("broker.local".to_string(), 1883)
        );
        assert_eq!(
            parse_broker_url("ssl://broker.local:8883").unwrap(),
            ("broker.local".to_string(), 8883)
        );
        assert_eq!(
            parse_broker_url("broker.local:1883").unwrap(),
            ("broker.local".to_string(), 1883)
        );
    }

    #[test]
    fn missing_port_is_an_error() {
        assert!(parse_broker_url("tcp://broker.local").is_err());
    }
}
