//! RPC Gateway Binary
//!
//! Starts the gRPC gateway and its health endpoint.
//!
//! # Usage
//!
//! ```bash
//! GATEWAY_ACL='{"admin": ["*"], "biz_user": ["Check"]}' cargo run --bin rpc-gateway
//! ```
//!
//! # Environment Variables
//!
//! ## Required (one of)
//! - `GATEWAY_ACL`: Access table as inline JSON
//! - `GATEWAY_ACL_FILE`: Path to an access table JSON file
//!
//! ## Optional
//! - `GATEWAY_ACL_MATCH`: "segment" | "full" (default: segment)
//! - `GATEWAY_GRPC_PORT`: gRPC server port (default: 8082)
//! - `GATEWAY_HEALTH_PORT`: Health check and metrics HTTP port (default: 8083)
//! - `GATEWAY_SUBSCRIBER_BUFFER`: Events buffered per subscriber (default: 1024)
//! - `GATEWAY_STREAM_BUFFER`: Messages buffered per response stream (default: 256)
//! - `GATEWAY_SHUTDOWN_TIMEOUT_SECS`: Graceful shutdown bound (default: 30)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: Service name (default: rpc-gateway)
//! - `RUST_LOG`: Log level (default: info)

use std::net::SocketAddr;
use std::sync::Arc;

use rpc_gateway::infrastructure::grpc::proto::gateway::v1::{
    admin_server::AdminServer, biz_server::BizServer,
};
use rpc_gateway::infrastructure::health::{HealthServer, HealthServerState};
use rpc_gateway::infrastructure::telemetry;
use rpc_gateway::{
    AdminService, BizService, EventBus, GatewayConfig, build_gateway, call_path_layer, init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init()?;

    tracing::info!("Starting RPC gateway");

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics()?;

    let config = GatewayConfig::from_env()?;
    let policy = config.access_policy()?;
    log_config(&config, policy.consumer_count());

    let shutdown_token = CancellationToken::new();

    let bus = Arc::new(EventBus::new(config.buffers.subscriber_buffer));
    let gateway = build_gateway(policy, &bus);

    // Spawn health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&gateway),
        Arc::clone(&bus),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    // Spawn gRPC server
    let grpc_addr: SocketAddr = format!("0.0.0.0:{}", config.server.grpc_port).parse()?;
    let admin = AdminService::new(
        Arc::clone(&gateway),
        Arc::clone(&bus),
        config.buffers.stream_buffer,
    );
    let biz = BizService::new(Arc::clone(&gateway));
    let grpc_shutdown = shutdown_token.clone();

    let grpc_task = tokio::spawn(async move {
        tracing::info!(addr = %grpc_addr, "gRPC server listening");
        if let Err(e) = Server::builder()
            .layer(call_path_layer())
            .add_service(AdminServer::new(admin))
            .add_service(BizServer::new(biz))
            .serve_with_shutdown(grpc_addr, grpc_shutdown.cancelled_owned())
            .await
        {
            tracing::error!(error = %e, "gRPC server error");
        }
        tracing::info!("gRPC server stopped");
    });

    tracing::info!("RPC gateway ready");

    await_shutdown(shutdown_token).await?;

    // Streams hold their connections open until the gateway ends them.
    let drain = async {
        gateway.shutdown().await;
        let _ = grpc_task.await;
    };
    if tokio::time::timeout(config.shutdown_timeout, drain).await.is_err() {
        tracing::warn!(
            timeout_secs = config.shutdown_timeout.as_secs(),
            in_flight = gateway.in_flight_calls(),
            streams = gateway.active_streams(),
            "Graceful shutdown timed out"
        );
    }

    tracing::info!("RPC gateway stopped");
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &GatewayConfig, consumers: usize) {
    tracing::info!(
        consumers,
        matching = config.matching.as_str(),
        grpc_port = config.server.grpc_port,
        health_port = config.server.health_port,
        subscriber_buffer = config.buffers.subscriber_buffer,
        stream_buffer = config.buffers.stream_buffer,
        "Configuration loaded"
    );
    tracing::debug!(acl = ?config.acl, "Access table source");
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown(shutdown_token: CancellationToken) -> std::io::Result<()> {
    #[cfg(unix)]
    let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    #[cfg(unix)]
    let terminated = async {
        terminate.recv().await;
    };

    #[cfg(not(unix))]
    let terminated = std::future::pending::<()>();

    tokio::select! {
        result = signal::ctrl_c() => {
            result?;
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminated => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!("Graceful shutdown started");
    Ok(())
}
