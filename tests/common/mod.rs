//! Shared utilities for integration and load testing.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use resource_guard::config::{GuardConfig, UpstreamConfig};
use resource_guard::http::HttpServer;
use resource_guard::lifecycle::Shutdown;
use resource_guard::upstream::UpstreamRegistry;

/// Start a simple mock upstream that returns a fixed response.
pub async fn start_mock_backend(response: &'static str) -> SocketAddr {
    start_programmable_backend(move || async move { (200, response.to_string()) }).await
}

/// Start a programmable mock upstream. Each request awaits `f` for its status
/// and body, so `f` may sleep to simulate a slow dependency.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let mut buf = [0u8; 4096];
                        let _ = socket.read(&mut buf).await;
                        let (status, body) = f().await;
                        let response = format!(
                            "HTTP/1.1 {} Mock\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Config with one upstream named `name` at `addr` and retries off.
pub fn config_with_upstream(name: &str, addr: SocketAddr) -> GuardConfig {
    let mut config = GuardConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.retries.enabled = false;
    config.observability.metrics_enabled = false;
    config
        .upstreams
        .push(UpstreamConfig::new(name, format!("http://{}", addr)));
    config
}

/// A gateway running on an ephemeral port.
pub struct Gateway {
    pub addr: SocketAddr,
    pub registry: Arc<UpstreamRegistry>,
    pub shutdown: Shutdown,
    pub updates: mpsc::UnboundedSender<GuardConfig>,
}

impl Gateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub async fn start_gateway(config: GuardConfig) -> Gateway {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let registry = Arc::new(UpstreamRegistry::new(&config));
    let shutdown = Shutdown::new();
    let (updates, config_updates) = mpsc::unbounded_channel();

    let server = HttpServer::with_registry(config, registry.clone());
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, config_updates, server_shutdown).await;
    });

    Gateway {
        addr,
        registry,
        shutdown,
        updates,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
