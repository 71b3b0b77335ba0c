use std::path::Path;

use prometheus::{Encoder, TextEncoder};

use crate::errors::{AppError, Result};

/// Renders the default Prometheus registry in text exposition format.
pub fn render() -> Result<String> {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buf = Vec::new();
    encoder
        .encode(&families, &mut buf)
        .map_err(|err| AppError::Other(err.into()))?;
    String::from_utf8(buf).map_err(|err| AppError::Other(err.into()))
}

/// Writes the rendered registry to `path`, for a node-exporter textfile collector.
pub fn write_textfile(path: &Path) -> Result<()> {
    let body = render()?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| AppError::io(parent, e))?;
    }
    std::fs::write(path, body).map_err(|e| AppError::io(path, e))
}
