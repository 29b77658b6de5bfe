use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;
use uuid::Uuid;

const DEFAULT_EXTENSION: &str = "webm";
const MAX_EXTENSION_LEN: usize = 8;

/// Extension of an uploaded file name, reduced to ASCII alphanumerics.
pub fn sanitize_extension(file_name: Option<&str>) -> String {
    let ext: String = file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(MAX_EXTENSION_LEN)
        .collect::<String>()
        .to_ascii_lowercase();
    if ext.is_empty() {
        DEFAULT_EXTENSION.to_string()
    } else {
        ext
    }
}

/// Writes an answer recording under a fresh name and returns its public link.
pub async fn store_answer_file(
    upload_dir: &str,
    public_url: &str,
    extension: &str,
    contents: &[u8],
) -> Result<String> {
    tokio::fs::create_dir_all(upload_dir)
        .await
        .with_context(|| format!("Failed to create upload directory {upload_dir}"))?;

    let name = format!("{}.{extension}", Uuid::new_v4());
    let path = Path::new(upload_dir).join(&name);
    tokio::fs::write(&path, contents)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    debug!("Stored {} bytes at {}", contents.len(), path.display());

    Ok(format!("{public_url}/files/{name}"))
}
