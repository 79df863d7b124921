use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use shared::protocol::DEFAULT_STATUS_SOCKET_PATH;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

/// Connect to the status socket and read the report until the server closes.
async fn fetch_status(path: &Path) -> Result<Vec<u8>> {
    let mut stream = UnixStream::connect(path)
        .await
        .with_context(|| format!("Failed to connect to status socket {}", path.display()))?;

    let mut report = Vec::new();
    stream
        .read_to_end(&mut report)
        .await
        .context("Failed to read status report")?;

    Ok(report)
}

#[tokio::main]
async fn main() -> Result<()> {
    let socket_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STATUS_SOCKET_PATH));

    let report = fetch_status(&socket_path).await?;

    let mut stdout = tokio::io::stdout();
    stdout.write_all(&report).await?;
    stdout.flush().await?;
    Ok(())
}
