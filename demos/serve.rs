use std::path::PathBuf;

use axum::extract::Query;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Router};
use serde::{Deserialize, Serialize};

use axum_download::{CacheMode, Disposition, DownloadOptions, DownloadRequest, Downloader, KnownSize};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let router = Router::new()
        .route("/", get(|| async { "Hello, World!" }))
        .route("/file", get(get_file));

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
    tracing::info!(addr = %listener.local_addr().unwrap(), "serving");
    axum::serve(listener, router).await.unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
struct FileRequest {
    path: String,
    /// Bytes per second.
    throttle: Option<u64>,
    inline: Option<bool>,
}

/// `GET /file?path=test/fixture.txt&throttle=16&inline=true`
async fn get_file(method: Method, headers: HeaderMap, Query(q): Query<FileRequest>) -> Response {
    let path = PathBuf::from(&q.path);
    if !path.is_file() {
        return (StatusCode::NOT_FOUND, "File not found").into_response();
    }

    let body = match KnownSize::file(&path).await {
        Ok(body) => body,
        Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", e)).into_response(),
    };

    let options = DownloadOptions {
        disposition: if q.inline.unwrap_or(false) { Disposition::Inline } else { Disposition::Attachment },
        cache_mode: CacheMode::Revalidate,
        max_bytes_per_second: q.throttle.unwrap_or(0),
        file_name: path.file_name().map(|name| name.to_string_lossy().into_owned()),
        ..DownloadOptions::default()
    };

    Downloader::new(options)
        .with_resource(body)
        .respond(DownloadRequest::from_headers(&method, &headers))
        .await
}
