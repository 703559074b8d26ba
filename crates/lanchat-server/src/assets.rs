//! Browser client compiled into the binary.

use axum::http::{header, StatusCode, Uri};
use axum::response::{IntoResponse, Response};

struct Asset {
    path: &'static str,
    content_type: &'static str,
    body: &'static str,
}

const ASSETS: &[Asset] = &[
    Asset {
        path: "/",
        content_type: "text/html; charset=utf-8",
        body: include_str!("../web/index.html"),
    },
    Asset {
        path: "/styles.css",
        content_type: "text/css; charset=utf-8",
        body: include_str!("../web/styles.css"),
    },
    Asset {
        path: "/script.js",
        content_type: "application/javascript; charset=utf-8",
        body: include_str!("../web/script.js"),
    },
];

/// Fallback handler: serve a known asset with caching disabled, else 404.
pub async fn serve(uri: Uri) -> Response {
    let Some(asset) = ASSETS.iter().find(|a| a.path == uri.path()) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    (
        [
            (header::CONTENT_TYPE, asset.content_type),
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
            (header::PRAGMA, "no-cache"),
            (header::EXPIRES, "0"),
        ],
        asset.body,
    )
        .into_response()
}
