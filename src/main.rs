use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use pixel_canvas::{
    AppState,
    cache::RateLimiter,
    canvas::Canvas,
    config::Config,
    routes,
    service::CanvasService,
    snapshot::{SnapshotStore, snapshot_now, spawn_snapshotter},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(
        width = config.canvas_width,
        height = config.canvas_height,
        rate_limit_points = config.rate_limit_points,
        rate_limit_window_ms = config.rate_limit_duration_ms,
        snapshots = config.snapshot_enabled,
        "Configuration loaded"
    );

    // 快照目录打不开时只关闭快照功能，不影响服务
    let store = if config.snapshot_enabled {
        match SnapshotStore::open(&config.snapshot_dir, config.snapshot_retain).await {
            Ok(store) => Some(Arc::new(store)),
            Err(e) => {
                tracing::error!("Snapshots disabled, failed to open snapshot store: {}", e);
                None
            }
        }
    } else {
        None
    };

    // 恢复画布
    let restored = match &store {
        Some(store) => {
            store
                .load_latest(config.canvas_width, config.canvas_height)
                .await
        }
        None => None,
    };
    let canvas = Arc::new(match restored {
        Some(grid) => Canvas::from_grid(grid),
        None => {
            tracing::info!("Starting with a blank canvas");
            Canvas::new(config.canvas_width, config.canvas_height)
        }
    });

    // 设置限流器
    let limiter = Arc::new(RateLimiter::new(
        config.rate_limit_points,
        config.rate_limit_window(),
    ));
    let pruner = limiter.spawn_pruner(config.rate_limit_prune_interval());

    let snapshotter = store.as_ref().map(|store| {
        spawn_snapshotter(
            store.clone(),
            canvas.clone(),
            config.snapshot_interval(),
        )
    });

    let state = AppState {
        service: CanvasService::new(canvas.clone(), limiter),
        config: Arc::new(config),
    };
    let app = routes::router(state.clone());

    // 启动服务器
    let addr = state
        .config
        .listen_addr()
        .await
        .context("Invalid server address")?;
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    pruner.abort();
    if let Some(handle) = snapshotter {
        handle.abort();
    }

    // 退出前保存最后一次快照
    if let Some(store) = &store {
        match snapshot_now(store, &canvas).await {
            Ok(id) => tracing::info!("Final snapshot saved: {}", id),
            Err(e) => tracing::error!("Failed to save final snapshot: {}", e),
        }
    }

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
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
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
