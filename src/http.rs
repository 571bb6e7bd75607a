//! 路由组装：CORS、404 兜底与可选的静态资源挂载。

use axum::Router;
use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Extension, State};
use axum::http::{Method, Request, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

use crate::error::ApiError;
use crate::images;
use crate::repository::ImageRepository;

pub const ASSETS_MOUNT: &str = "/assets/upload";

#[derive(Clone, Copy, Debug)]
pub struct RouterOptions {
    pub max_upload_size: usize,
    pub serve_assets: bool,
}

/// 构建对所有来源开放的 CORS Layer；任何 OPTIONS 请求都按预检处理。
pub fn build_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE])
}

/// 基于共享的图片仓库构建 API 路由。
pub fn build_router(repository: Arc<ImageRepository>, options: RouterOptions) -> Router {
    let mut app = Router::new()
        .route("/api/images", get(images::list_images))
        .route(
            "/api/upload",
            post(images::upload_image).layer(DefaultBodyLimit::max(options.max_upload_size)),
        )
        .route(
            "/api/images/",
            patch(images::rename_image).delete(images::delete_image),
        )
        .route(
            "/api/images/{*path}",
            patch(images::rename_image).delete(images::delete_image),
        );

    if options.serve_assets {
        let assets = Router::new()
            .fallback_service(ServeDir::new(repository.root_path()))
            .layer(middleware::from_fn_with_state(
                repository.clone(),
                guard_public_assets,
            ));
        app = app.nest_service(ASSETS_MOUNT, assets);
    }

    app.fallback(not_found)
        .layer(Extension(repository))
        .layer(build_cors_layer())
}

/// 静态资源只暴露列表中可见的文件：隐藏文件与符号链接一律 404。
async fn guard_public_assets(
    State(repository): State<Arc<ImageRepository>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let raw = request.uri().path();
    let decoded = urlencoding::decode_binary(raw.as_bytes());
    let relative = String::from_utf8_lossy(&decoded).into_owned();
    if repository.is_public_asset(&relative).await {
        next.run(request).await
    } else {
        not_found().await.into_response()
    }
}

async fn not_found() -> ApiError {
    ApiError::NotFound("Not found".into())
}
