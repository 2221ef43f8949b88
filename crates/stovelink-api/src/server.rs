//! Wires the transports around one control loop.

use std::sync::Arc;

use stovelink_core::{BridgeConfig, Engine, EventBroadcaster, MqttSink, StoveDevice};
use tokio::net::{TcpListener, UdpSocket};
use tokio::task::JoinHandle;

use crate::bridge::Bridge;
use crate::error::ApiError;
use crate::{http, mqtt, udp};

/// Run the bridge until Ctrl+C or SIGTERM.
pub async fn run<D: StoveDevice + 'static>(config: BridgeConfig, device: D) -> anyhow::Result<()> {
    let (sink, connection) = if config.mqtt_enabled() {
        let (sink, connection) = mqtt::connect(&config);
        let sink: Arc<dyn MqttSink> = sink;
        (Some(sink), Some(connection))
    } else {
        (None, None)
    };

    let engine = Engine::new(config.clone(), device, EventBroadcaster::new(), sink);
    let (bridge, handle) = Bridge::new(engine);

    let mut tasks: Vec<JoinHandle<()>> = vec![tokio::spawn(bridge.run())];

    if let Some(connection) = connection {
        tracing::info!(
            category = "server",
            broker = %config.home_automation.hostname,
            port = config.home_automation.mqtt.port,
            "Starting MQTT client"
        );
        tasks.push(tokio::spawn(connection.run(handle.clone())));
    }

    if config.udp.enabled {
        let addr = format!("{}:{}", config.http.bind, config.udp.port);
        let socket = UdpSocket::bind(&addr)
            .await
            .map_err(|source| ApiError::Bind { addr: addr.clone(), source })?;
        tracing::info!(category = "server", addr = %addr, "UDP listener ready");

        let udp_handle = handle.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = udp::serve_udp(Arc::new(socket), udp_handle).await {
                tracing::warn!(category = "server", error = %e, "UDP listener stopped");
            }
        }));
    }

    let addr = format!("{}:{}", config.http.bind, config.http.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ApiError::Bind { addr: addr.clone(), source })?;
    tracing::info!(category = "server", addr = %addr, "HTTP server ready");

    axum::serve(listener, http::router(handle))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for task in tasks {
        task.abort();
    }
    tracing::info!(category = "server", "Bridge stopped");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(category = "server", error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(category = "server", error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!(category = "server", "Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            tracing::info!(category = "server", "Received SIGTERM, shutting down");
        }
    }
}
