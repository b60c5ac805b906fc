mod source;
mod status;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use relay_core::{config_path_from_env, load_config, Config, Dispatcher, Notifier, SharedNotifier};
use relay_events::{topics, Bus};
use relay_hauk::HaukClient;
use relay_notify::{build_notifier, LogNotifier};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

const BUS_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    relay_otel::init();

    let path = config_path_from_env();
    let config = match load_config(&path) {
        Ok(config) => config,
        Err(err) => {
            let err = err.context(format!("loading config from {path}"));
            LogNotifier
                .notify_error(&format!("relay-bridge failed to start: {err:#}"))
                .await;
            return Err(err);
        }
    };

    let bus = Bus::new(BUS_CAPACITY);
    let notifier: SharedNotifier = match build_notifier(&config.notification, &bus) {
        Ok(fanout) => Arc::new(fanout),
        Err(err) => {
            LogNotifier
                .notify_error(&format!("relay-bridge failed to set up notifications: {err}"))
                .await;
            return Err(err.into());
        }
    };

    if let Err(err) = run(config, bus, notifier.clone()).await {
        notifier
            .notify_error(&format!("relay-bridge terminated: {err:#}"))
            .await;
        return Err(err);
    }
    Ok(())
}

async fn run(config: Config, bus: Bus, notifier: SharedNotifier) -> anyhow::Result<()> {
    let client = HaukClient::new(config.hauk.clone()).context("building hauk client")?;
    info!(base = %client.base_url(), "hauk client ready");
    let dispatcher = Dispatcher::new(config.sessions, Arc::new(client), notifier);

    let book = status::SessionBook::default();
    let tracker = tokio::spawn(status::track(book.clone(), bus.subscribe()));

    let (page_stop_tx, mut page_stop_rx) = watch::channel(false);
    let status_page = if config.frontend.enabled {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.frontend.port));
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding status page to {addr}"))?;
        info!(%addr, "status page listening");
        let app = status::router(book.clone(), &config.frontend);
        Some(tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = page_stop_rx.wait_for(|stop| *stop).await;
                })
                .await
        }))
    } else {
        None
    };

    let (source_stop_tx, source_stop_rx) = watch::channel(false);
    let source = tokio::spawn(source::run(
        config.mqtt.clone(),
        dispatcher.clone(),
        source_stop_rx,
    ));
    bus.publish(
        topics::TOPIC_BRIDGE_STARTED,
        &json!({"broker": source::broker_url(&config.mqtt), "topic": config.mqtt.topic}),
    );

    shutdown_signal().await;
    bus.publish(topics::TOPIC_BRIDGE_STOPPING, &json!({}));

    let _ = source_stop_tx.send(true);
    if let Err(err) = source.await {
        warn!("mqtt source ended abnormally: {err}");
    }
    dispatcher.shutdown().await;

    let _ = page_stop_tx.send(true);
    if let Some(page) = status_page {
        match page.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => error!("status page exited with error: {err}"),
            Err(err) => warn!("status page task ended abnormally: {err}"),
        }
    }
    tracker.abort();
    info!(sessions = book.len(), "relay-bridge stopped");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!("could not install SIGTERM handler: {err}");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("shutdown signal received");
}
