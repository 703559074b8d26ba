/// Application name
pub const APP_NAME: &str = "lanchat";

/// Default HTTP port (server)
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Maximum upload size in bytes (50 MiB)
pub const MAX_UPLOAD_SIZE: usize = 50 * 1024 * 1024;

/// Media type reported for downloads whose record carries none
pub const DEFAULT_MEDIA_TYPE: &str = "application/octet-stream";

/// WebSocket endpoint path
pub const WS_PATH: &str = "/ws";
