use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use crate::registry::SnapshotSource;
use super::error::StatusError;
use super::render::render_status;

/// Serve one status client: render the current snapshot and write it out.
///
/// Returns the number of bytes written. The caller owns the connection and
/// is expected to log any error; nothing here touches other connections.
pub async fn handle_connection<W>(
    mut stream: W,
    source: &dyn SnapshotSource,
    write_timeout: Duration,
) -> Result<usize, StatusError>
where
    W: AsyncWrite + Unpin,
{
    let report = render_status(&source.snapshot())?;

    tokio::time::timeout(write_timeout, async {
        stream.write_all(report.as_bytes()).await?;
        stream.shutdown().await
    })
    .await
    .map_err(|_| StatusError::WriteTimeout(write_timeout))??;

    Ok(report.len())
}
