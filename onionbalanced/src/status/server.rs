use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UnixListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use crate::config::StatusConfig;
use crate::registry::SnapshotSource;
use super::error::StatusError;
use super::handler::handle_connection;

/// Pause after a failed accept so a persistent error (e.g. EMFILE) does not spin
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Unix domain socket that emits the status report to every client.
///
/// The accept loop runs on its own task so starting the socket never blocks
/// the caller. Each connection is served on a separate task.
pub struct StatusSocket {
    socket_path: PathBuf,
    cancel: CancellationToken,
    /// `None` when binding failed or after `close`
    accept_task: Option<JoinHandle<()>>,
}

impl StatusSocket {
    /// Replace any stale socket file and start serving.
    ///
    /// Only a failure to remove the stale file is returned. A bind failure
    /// is logged and leaves the socket in a non-serving state.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        config: &StatusConfig,
        source: Arc<dyn SnapshotSource>,
    ) -> Result<Self, StatusError> {
        let socket_path = config.socket_path.clone();
        remove_socket_file(&socket_path).map_err(|source| StatusError::StaleSocket {
            path: socket_path.clone(),
            source,
        })?;

        let mut status_socket = Self {
            socket_path,
            cancel: CancellationToken::new(),
            accept_task: None,
        };

        tracing::debug!(path = %status_socket.socket_path.display(), "Creating status socket");

        let listener = match bind(&status_socket.socket_path) {
            Ok(listener) => listener,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    "Could not start status socket. Does the path exist? Do you have permission?"
                );
                return Ok(status_socket);
            }
        };

        if let Some(mode) = config.socket_mode {
            status_socket.set_permissions(mode);
        }

        status_socket.accept_task = Some(tokio::spawn(accept_loop(
            listener,
            source,
            config.write_timeout(),
            status_socket.cancel.clone(),
        )));

        tracing::info!(path = %status_socket.socket_path.display(), "Status socket listening");
        Ok(status_socket)
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn is_serving(&self) -> bool {
        self.accept_task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Stop accepting, close the listener and remove the socket file.
    ///
    /// In-flight connections finish on their own. Safe to call repeatedly
    /// and on a socket that never started serving.
    pub async fn close(&mut self) {
        let Some(task) = self.accept_task.take() else {
            return;
        };

        self.cancel.cancel();
        if let Err(e) = task.await {
            tracing::error!(error = %e, "Status socket accept loop failed");
        }

        match remove_socket_file(&self.socket_path) {
            Ok(()) => tracing::info!(path = %self.socket_path.display(), "Status socket closed"),
            Err(e) => tracing::error!(
                path = %self.socket_path.display(),
                error = %e,
                "Error when removing the status socket"
            ),
        }
    }

    fn set_permissions(&self, mode: u32) {
        let perms = std::fs::Permissions::from_mode(mode);
        if let Err(e) = std::fs::set_permissions(&self.socket_path, perms) {
            tracing::warn!(
                path = %self.socket_path.display(),
                mode = %format!("{:o}", mode),
                error = %e,
                "Failed to set status socket permissions"
            );
        }
    }
}

impl Drop for StatusSocket {
    fn drop(&mut self) {
        // Dropped without close: stop the loop and clean up best-effort
        if self.accept_task.take().is_some() {
            self.cancel.cancel();
            let _ = remove_socket_file(&self.socket_path);
        }
    }
}

fn bind(path: &Path) -> Result<UnixListener, StatusError> {
    UnixListener::bind(path).map_err(|source| StatusError::Bind {
        path: path.to_path_buf(),
        source,
    })
}

/// Remove the socket file; a missing file counts as success.
fn remove_socket_file(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

async fn accept_loop(
    listener: UnixListener,
    source: Arc<dyn SnapshotSource>,
    write_timeout: Duration,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _addr)) => {
                        let source = Arc::clone(&source);
                        tokio::spawn(async move {
                            match handle_connection(stream, source.as_ref(), write_timeout).await {
                                Ok(bytes) => tracing::debug!(bytes, "Status report sent"),
                                Err(e) => tracing::warn!(error = %e, "Error returning status"),
                            }
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to accept status connection");
                        if !backoff(&cancel).await {
                            break;
                        }
                    }
                }
            }
            _ = cancel.cancelled() => {
                tracing::debug!("Status socket accept loop shutting down");
                break;
            }
        }
    }
}

/// Wait out `ACCEPT_ERROR_BACKOFF`. Returns false if cancelled meanwhile.
async fn backoff(cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(ACCEPT_ERROR_BACKOFF) => true,
        _ = cancel.cancelled() => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Instant;
    use chrono::Utc;
    use shared::types::{HealthStatus, Instance, Service};
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;
    use tokio::net::UnixStream;
    use crate::registry::ServiceRegistry;
    use crate::status::render::render_status;

    fn status_config(socket_path: PathBuf) -> StatusConfig {
        StatusConfig {
            socket_path,
            write_timeout_secs: 1,
            socket_mode: None,
        }
    }

    fn test_services() -> Vec<Service> {
        let mut service = Service::new("uweyln7jhkyaokka");
        service.uploaded = Some(Utc::now());
        service.health_check_conf.kind = Some("tcp".to_string());

        let mut online = Instance::new("v2q7ujuleky7odph");
        online.timestamp = Some(Utc::now());
        online.introduction_points = 3;
        online.health = HealthStatus::Healthy;
        online.last_check_time = Utc::now().timestamp();

        service.instances.push(Instance::new("r523s7jx65ckitf4"));
        service.instances.push(online);
        vec![service]
    }

    fn start_serving(socket_path: &Path, source: Arc<dyn SnapshotSource>) -> StatusSocket {
        StatusSocket::start(&status_config(socket_path.to_path_buf()), source).unwrap()
    }

    async fn fetch_report(path: &Path) -> String {
        let mut stream = UnixStream::connect(path).await.unwrap();
        let mut report = String::new();
        stream.read_to_string(&mut report).await.unwrap();
        report
    }

    #[tokio::test]
    async fn test_serves_report_and_replaces_stale_file() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("control");
        std::fs::write(&socket_path, b"stale").unwrap();

        let services = test_services();
        let expected = render_status(&services).unwrap();
        let mut status_socket = start_serving(&socket_path, Arc::new(services));

        assert!(status_socket.is_serving());
        assert_eq!(status_socket.socket_path(), socket_path.as_path());
        assert_eq!(fetch_report(&socket_path).await, expected);

        status_socket.close().await;
    }

    #[tokio::test]
    async fn test_missing_directory_leaves_socket_non_serving() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("missing").join("control");

        let mut status_socket = start_serving(&socket_path, Arc::new(test_services()));

        assert!(!status_socket.is_serving());
        assert!(UnixStream::connect(&socket_path).await.is_err());

        status_socket.close().await;
        status_socket.close().await;
    }

    #[tokio::test]
    async fn test_unremovable_stale_path_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("control");
        std::fs::create_dir(&socket_path).unwrap();

        let result = StatusSocket::start(&status_config(socket_path), Arc::new(test_services()));

        assert!(matches!(result, Err(StatusError::StaleSocket { .. })));
    }

    #[tokio::test]
    async fn test_close_twice_removes_socket_and_refuses_clients() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("control");

        let mut status_socket = start_serving(&socket_path, Arc::new(test_services()));
        assert!(socket_path.exists());

        status_socket.close().await;
        status_socket.close().await;

        assert!(!status_socket.is_serving());
        assert!(!socket_path.exists());
        assert!(UnixStream::connect(&socket_path).await.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_clients_get_identical_reports() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("control");

        let services = test_services();
        let expected = render_status(&services).unwrap();
        let mut status_socket = start_serving(&socket_path, Arc::new(services));

        let clients = (0..32).map(|_| fetch_report(&socket_path));
        let reports = futures::future::join_all(clients).await;

        assert_eq!(reports.len(), 32);
        assert!(reports.iter().all(|report| *report == expected));

        status_socket.close().await;
    }

    #[tokio::test]
    async fn test_reports_follow_registry_updates() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("control");

        let registry = ServiceRegistry::new(vec![Service::new("abc")]);
        let mut status_socket = start_serving(&socket_path, Arc::new(registry.clone()));

        assert_eq!(fetch_report(&socket_path).await, "abc.onion [not uploaded]\n");

        registry.record_upload("abc", Utc::now());
        let report = fetch_report(&socket_path).await;
        assert!(!report.contains("[not uploaded]"));
        assert!(report.starts_with("abc.onion "));

        status_socket.close().await;
    }

    #[tokio::test]
    async fn test_client_disconnect_does_not_stop_server() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("control");

        let services = test_services();
        let expected = render_status(&services).unwrap();
        let mut status_socket = start_serving(&socket_path, Arc::new(services));

        drop(UnixStream::connect(&socket_path).await.unwrap());

        assert_eq!(fetch_report(&socket_path).await, expected);
        assert!(status_socket.is_serving());

        status_socket.close().await;
    }

    #[tokio::test]
    async fn test_socket_mode_applied() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("control");
        let mut config = status_config(socket_path.clone());
        config.socket_mode = Some(0o600);

        let mut status_socket = StatusSocket::start(&config, Arc::new(test_services())).unwrap();

        let mode = std::fs::metadata(&socket_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        status_socket.close().await;
    }

    #[tokio::test]
    async fn test_close_survives_cleanup_failure() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("control");

        let mut status_socket = start_serving(&socket_path, Arc::new(test_services()));
        assert!(status_socket.is_serving());

        // A non-empty directory cannot be unlinked as a file
        std::fs::remove_file(&socket_path).unwrap();
        std::fs::create_dir(&socket_path).unwrap();
        std::fs::write(socket_path.join("keep"), b"x").unwrap();

        status_socket.close().await;
        status_socket.close().await;

        assert!(!status_socket.is_serving());
        assert!(socket_path.is_dir());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_reports_stay_well_formed_during_writes() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("control");

        let mut service = Service::new("abc");
        service.health_check_conf.kind = Some("tcp".to_string());
        let mut instance = Instance::new("def");
        instance.health = HealthStatus::Healthy;
        service.instances.push(instance);
        let registry = ServiceRegistry::new(vec![service]);
        let mut status_socket = start_serving(&socket_path, Arc::new(registry.clone()));

        let stop = Arc::new(AtomicBool::new(false));
        let writer = {
            let registry = registry.clone();
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                let mut round = 0usize;
                while !stop.load(Ordering::Relaxed) {
                    let now = Utc::now();
                    registry.record_upload("abc", now);
                    registry.record_descriptor("abc", "def", now, round % 10 + 1);
                    registry.record_health("abc", "def", HealthStatus::Healthy, now.timestamp());
                    if round % 3 == 0 {
                        registry.mark_offline("abc", "def");
                    }
                    round += 1;
                }
            })
        };

        for _ in 0..10 {
            let clients = (0..8).map(|_| fetch_report(&socket_path));
            for report in futures::future::join_all(clients).await {
                let lines: Vec<&str> = report.split('\n').collect();
                assert_eq!(lines.len(), 3, "unexpected report: {report:?}");
                assert!(lines[0].starts_with("abc.onion "));
                assert!(
                    lines[1] == "  def.onion [offline]"
                        || (lines[1].starts_with("  def.onion ")
                            && lines[1].contains(" IPs [up at ")),
                    "unexpected instance line: {:?}",
                    lines[1]
                );
                assert_eq!(lines[2], "");
            }
        }

        stop.store(true, Ordering::Relaxed);
        writer.join().unwrap();
        status_socket.close().await;
    }

    #[tokio::test]
    async fn test_backoff_waits_unless_cancelled() {
        let cancel = CancellationToken::new();

        let started = Instant::now();
        assert!(backoff(&cancel).await);
        assert!(started.elapsed() >= ACCEPT_ERROR_BACKOFF);

        cancel.cancel();
        let started = Instant::now();
        assert!(!backoff(&cancel).await);
        assert!(started.elapsed() < ACCEPT_ERROR_BACKOFF);
    }
}
