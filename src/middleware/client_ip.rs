use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::Response,
};

use crate::AppState;

/// 限流使用的客户端标识（来源 IP，不含端口）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientId(pub String);

pub async fn client_identity(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let client = resolve_client_id(&req, state.config.trust_proxy_headers);
    tracing::debug!(client = %client, "resolved client identity");
    req.extensions_mut().insert(ClientId(client));
    next.run(req).await
}

/// 默认使用连接的对端地址；部署在反向代理后面时可以信任代理头
pub fn resolve_client_id<B>(req: &Request<B>, trust_proxy_headers: bool) -> String {
    let remote_ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string());

    let forwarded = trust_proxy_headers
        .then(|| {
            req.headers()
                .get("x-real-ip")
                .and_then(|h| h.to_str().ok())
                .or_else(|| {
                    req.headers()
                        .get("x-forwarded-for")
                        .and_then(|h| h.to_str().ok())
                        .and_then(|s| s.split(',').find(|ip| !ip.trim().is_empty()))
                })
                .map(|ip| ip.trim().to_string())
                .filter(|ip| !ip.is_empty())
        })
        .flatten();

    forwarded
        .or(remote_ip)
        .unwrap_or_else(|| "unknown".to_string())
}
