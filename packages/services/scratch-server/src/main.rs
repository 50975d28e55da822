use std::sync::Arc;

use anyhow::Result;
use scratch_core::embedder::Embedder;
use scratch_core::model::EvictionPolicy;
use scratch_core::Config;
use scratch_store::{Engine, Store, StoreConfig};
use tracing::{info, Level};

mod auth;
mod errors;
mod http;
mod metrics;
mod ops;
mod params;
mod shutdown;
mod sse;
mod tools;

use auth::TenantRegistry;
use ops::Ops;
use tools::ScratchServer;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    info!(storage_dir = %config.storage_dir, "starting scratch-server");

    let engine = Arc::new(Engine::open(&config.storage_dir).await?);

    let embedder: Arc<dyn Embedder> = match &config.embedding_endpoint {
        Some(endpoint) => Arc::new(scratch_search::HttpEmbedder::new(
            endpoint.clone(),
            config.embedding_model.clone(),
            scratch_store::engine::EMBEDDING_DIM,
            false,
            5_000,
        )?),
        None => Arc::new(scratch_search::LocalEmbedder::new(scratch_store::engine::EMBEDDING_DIM)),
    };
    let validator: Arc<dyn scratch_core::validator::Validator> = Arc::new(scratch_validate::ScratchValidator::new());

    let store_cfg = StoreConfig {
        max_scratchpads: config.max_scratchpads,
        max_cells_per_pad: config.max_cells_per_pad,
        max_cell_bytes: config.max_cell_bytes,
        eviction_policy: config.eviction_policy,
        validation_request_timeout: config.validation_request_timeout,
        enable_semantic_search: config.enable_semantic_search,
    };
    let store = Arc::new(Store::new(engine.clone(), embedder, validator, store_cfg));

    if config.enable_auth {
        if let Some(target) = config.first_configured_tenant() {
            if let Some(record) = store
                .run_first_enable_migration(config.implicit_default_tenant(), target)
                .await?
            {
                info!(
                    from = %record.from_tenant,
                    to = %record.to_tenant,
                    pad_count = record.pad_count,
                    "first-enable tenant migration complete"
                );
            }
        }
    }

    let (shutdown_tx, shutdown_rx) = shutdown::channel();

    if matches!(config.eviction_policy, EvictionPolicy::Preempt) {
        let sweeper_engine = engine.clone();
        let preempt_age = config.preempt_age;
        let preempt_interval = config.preempt_interval;
        let sweeper_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            scratch_store::lifecycle::run_sweeper(sweeper_engine, preempt_age, preempt_interval, sweeper_shutdown).await;
        });
    }

    tokio::spawn(shutdown::run_ctrl_c_drain(shutdown_tx, config.shutdown_timeout));

    let ops = Arc::new(Ops::new(store));
    let tenants = Arc::new(TenantRegistry::from_config(&config));

    let mut tasks: Vec<tokio::task::JoinHandle<Result<()>>> = Vec::new();

    if config.enable_stdio {
        let stdio_tenant = if config.enable_auth {
            let token = std::env::var("SCRATCH_BEARER_TOKEN").ok();
            tenants.resolve_bearer(token.as_deref())?
        } else {
            config.implicit_default_tenant().to_string()
        };
        let server = ScratchServer::new(ops.clone(), stdio_tenant, shutdown_rx.clone());
        tasks.push(tokio::spawn(async move { tools::serve_stdio(server).await }));
    }

    if config.enable_http || config.enable_sse {
        let app_state = http::AppState {
            ops: ops.clone(),
            tenants: tenants.clone(),
            shutdown: shutdown_rx.clone(),
        };

        let metrics_path = if config.enable_metrics { Some(config.metrics_path.as_str()) } else { None };
        let mut router = if config.enable_http {
            http::router(app_state.clone(), &config.http_path, metrics_path)
        } else {
            axum::Router::new().route("/health", axum::routing::get(|| async { "ok" }))
        };
        if config.enable_sse {
            router = router.merge(sse::router(app_state, &config.sse_path));
        }

        match config.http_socket_path.clone() {
            Some(socket_path) => {
                tasks.push(tokio::spawn(async move {
                    if std::fs::metadata(&socket_path).is_ok() {
                        std::fs::remove_file(&socket_path)?;
                    }
                    let listener = tokio::net::UnixListener::bind(&socket_path)?;
                    info!(path = %socket_path, "http/sse transport listening on unix socket");
                    axum::serve(listener, router).await?;
                    Ok(())
                }));
            }
            None => {
                let http_host = config.http_host.clone();
                let http_port = config.http_port;
                tasks.push(tokio::spawn(async move {
                    let listener = tokio::net::TcpListener::bind(format!("{http_host}:{http_port}")).await?;
                    info!(addr = %listener.local_addr()?, "http/sse transport listening");
                    axum::serve(listener, router).await?;
                    Ok(())
                }));
            }
        }
    }

    for task in tasks {
        task.await??;
    }

    Ok(())
}
