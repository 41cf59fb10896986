use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tokio::time::{sleep, timeout};

use crate::models::DownloadId;

/// Errors raised while driving a print workflow
#[derive(Error, Debug)]
pub enum PrintError {
    #[error("Failed to open {path}: {reason}")]
    Open { path: Utf8PathBuf, reason: String },

    #[error("Surface {0} never became ready: {1}")]
    NotReady(u64, String),

    /// The print action itself could not be invoked
    #[error("Print trigger failed: {0}")]
    Trigger(String),

    #[error("Failed to dispose surface {0}: {1}")]
    Dispose(u64, String),

    #[error("Download {0} not found")]
    DownloadNotFound(DownloadId),

    #[error("Download {0} has no file path")]
    MissingPath(DownloadId),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Process error: {0}")]
    Process(#[from] std::io::Error),
}

impl PrintError {
    /// Whether this failure should fall back to manual printing instead of
    /// ending the attempt as an error.
    pub fn is_trigger_failure(&self) -> bool {
        matches!(self, PrintError::Trigger(_))
    }
}

/// A renderable resource opened for one download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Surface {
    pub id: u64,
    pub path: Utf8PathBuf,
}

/// How the wait for a surface ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The surface signalled load-complete.
    Ready,
    /// The ready signal never arrived; the workflow continues anyway.
    TimedOut,
}

/// Capability that turns a file path into a printed page.
///
/// Implementations own the surfaces they hand out. Every surface ends in
/// exactly one of `dispose` (close it) or `release` (stop tracking it and
/// leave the file in front of the user). `dispose` may be called after the
/// surface was already closed and should report that as an error, which
/// callers discard.
#[async_trait]
pub trait PrintCapability: Send + Sync {
    async fn open(&self, path: &Utf8Path) -> Result<Surface, PrintError>;

    /// Resolve once the surface has finished loading.
    async fn wait_ready(&self, surface: &Surface) -> Result<(), PrintError>;

    async fn trigger_print(&self, surface: &Surface) -> Result<(), PrintError>;

    async fn dispose(&self, surface: Surface) -> Result<(), PrintError>;

    /// Hand the surface over to the user for manual printing.
    async fn release(&self, surface: Surface) -> Result<(), PrintError>;
}

/// Race the surface's ready signal against a timer.
pub async fn await_ready(
    printer: &dyn PrintCapability,
    surface: &Surface,
    ready_timeout: Duration,
) -> Result<Readiness, PrintError> {
    tokio::select! {
        result = printer.wait_ready(surface) => result.map(|()| Readiness::Ready),
        _ = sleep(ready_timeout) => Ok(Readiness::TimedOut),
    }
}

/// Print capability backed by a shell command such as `lp {path}`.
///
/// Opening a surface checks that the file exists; readiness means the file
/// size stayed the same across two polls, so a file still being flushed by
/// the downloader is not printed half-written. Releasing a surface runs the
/// optional viewer command (e.g. `xdg-open {path}`) so the file shows up on
/// screen for manual printing.
pub struct CommandPrinter {
    command_template: String,
    viewer_template: Option<String>,
    print_timeout: Duration,
    poll_interval: Duration,
    next_surface: AtomicU64,
    surfaces: Mutex<HashMap<u64, Utf8PathBuf>>,
}

impl CommandPrinter {
    pub fn new(command_template: impl Into<String>, print_timeout: Duration) -> Self {
        Self {
            command_template: command_template.into(),
            viewer_template: None,
            print_timeout,
            poll_interval: Duration::from_millis(100),
            next_surface: AtomicU64::new(1),
            surfaces: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_viewer(mut self, viewer_template: impl Into<String>) -> Self {
        self.viewer_template = Some(viewer_template.into());
        self
    }

    /// Number of surfaces opened and not yet disposed or released.
    pub fn open_surfaces(&self) -> usize {
        self.surfaces.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn is_open(&self, id: u64) -> bool {
        self.surfaces
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&id)
    }

    /// Substitute the quoted path into the command template.
    ///
    /// A template without `{path}` gets the path appended.
    pub fn build_print_command(&self, path: &Utf8Path) -> String {
        substitute_path(&self.command_template, path)
    }

    fn untrack(&self, id: u64) -> Option<Utf8PathBuf> {
        self.surfaces
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id)
    }

    /// Launch the viewer without waiting for it; viewers usually stay open.
    fn launch_viewer(&self, template: &str, path: &Utf8Path) -> Result<(), PrintError> {
        let command = substitute_path(template, path);
        tracing::info!("Opening for manual printing: {}", command);

        shell_command(&command)
            .kill_on_drop(false)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map(|_| ())
            .map_err(|e| PrintError::Open {
                path: path.to_path_buf(),
                reason: format!("failed to launch viewer: {}", e),
            })
    }

    /// Run the print command and return its exit code.
    async fn execute_print_command(&self, command: &str) -> Result<i32, PrintError> {
        tracing::info!("Executing: {}", command);

        let start = Instant::now();

        let child = shell_command(command)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PrintError::Trigger(format!("failed to spawn print command: {}", e)))?;

        let output = timeout(self.print_timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                tracing::warn!("Print command timed out after {:?}", self.print_timeout);
                PrintError::Timeout(self.print_timeout)
            })??;

        let exit_code = output.status.code().unwrap_or(-1);

        tracing::info!(
            "Print command completed in {:.2}s with exit code {}",
            start.elapsed().as_secs_f32(),
            exit_code
        );

        Ok(exit_code)
    }
}

#[async_trait]
impl PrintCapability for CommandPrinter {
    async fn open(&self, path: &Utf8Path) -> Result<Surface, PrintError> {
        let metadata = tokio::fs::metadata(path).await.map_err(|e| PrintError::Open {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        if !metadata.is_file() {
            return Err(PrintError::Open {
                path: path.to_path_buf(),
                reason: "not a regular file".to_string(),
            });
        }

        let id = self.next_surface.fetch_add(1, Ordering::Relaxed);
        self.surfaces
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, path.to_path_buf());

        tracing::debug!("Opened surface {} for {}", id, path);
        Ok(Surface {
            id,
            path: path.to_path_buf(),
        })
    }

    async fn wait_ready(&self, surface: &Surface) -> Result<(), PrintError> {
        let mut last_len = None;
        loop {
            if !self.is_open(surface.id) {
                return Err(PrintError::NotReady(surface.id, "surface closed".to_string()));
            }

            let len = tokio::fs::metadata(&surface.path)
                .await
                .map_err(|e| PrintError::NotReady(surface.id, e.to_string()))?
                .len();

            if last_len == Some(len) {
                return Ok(());
            }
            last_len = Some(len);
            sleep(self.poll_interval).await;
        }
    }

    async fn trigger_print(&self, surface: &Surface) -> Result<(), PrintError> {
        let command = self.build_print_command(&surface.path);
        let exit_code = self.execute_print_command(&command).await?;

        if exit_code != 0 {
            return Err(PrintError::Trigger(format!(
                "print command exited with code {}",
                exit_code
            )));
        }

        Ok(())
    }

    async fn dispose(&self, surface: Surface) -> Result<(), PrintError> {
        match self.untrack(surface.id) {
            Some(_) => Ok(()),
            None => Err(PrintError::Dispose(surface.id, "already closed".to_string())),
        }
    }

    async fn release(&self, surface: Surface) -> Result<(), PrintError> {
        if self.untrack(surface.id).is_none() {
            return Err(PrintError::Dispose(surface.id, "already closed".to_string()));
        }

        match &self.viewer_template {
            Some(template) => self.launch_viewer(template, &surface.path),
            None => {
                tracing::debug!("No viewer configured, {} stays on disk", surface.path);
                Ok(())
            }
        }
    }
}

fn shell_command(command: &str) -> Command {
    if cfg!(target_os = "windows") {
        let mut c = Command::new("cmd");
        c.args(["/C", command]);
        c
    } else {
        let mut c = Command::new("sh");
        c.args(["-c", command]);
        c
    }
}

/// Substitute the quoted path for `{path}`, or append it.
fn substitute_path(template: &str, path: &Utf8Path) -> String {
    let quoted = quote_path(path);
    if template.contains("{path}") {
        template.replace("{path}", &quoted)
    } else {
        format!("{} {}", template, quoted)
    }
}

fn quote_path(path: &Utf8Path) -> String {
    if cfg!(target_os = "windows") {
        format!("\"{}\"", path)
    } else {
        format!("'{}'", path.as_str().replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn temp_path(file: &NamedTempFile) -> Utf8PathBuf {
        Utf8PathBuf::try_from(file.path().to_path_buf()).unwrap()
    }

    #[test]
    fn test_build_print_command_substitutes_path() {
        let printer = CommandPrinter::new("lp -d office {path}", Duration::from_secs(5));
        let cmd = printer.build_print_command(Utf8Path::new("/tmp/invoice.pdf"));
        assert!(cmd.starts_with("lp -d office "));
        assert!(cmd.contains("/tmp/invoice.pdf"));
    }

    #[test]
    fn test_build_print_command_appends_path() {
        let printer = CommandPrinter::new("lpr", Duration::from_secs(5));
        let cmd = printer.build_print_command(Utf8Path::new("/tmp/a.pdf"));
        assert!(cmd.starts_with("lpr "));
        assert!(cmd.ends_with("/tmp/a.pdf'") || cmd.ends_with("/tmp/a.pdf\""));
    }

    #[cfg(unix)]
    #[test]
    fn test_quote_path_escapes_single_quotes() {
        assert_eq!(quote_path(Utf8Path::new("/tmp/it's.pdf")), r"'/tmp/it'\''s.pdf'");
    }

    #[tokio::test]
    async fn test_open_missing_file_fails() {
        let printer = CommandPrinter::new("true", Duration::from_secs(5));
        let result = printer.open(Utf8Path::new("/definitely/not/here.pdf")).await;
        assert!(matches!(result, Err(PrintError::Open { .. })));
        assert_eq!(printer.open_surfaces(), 0);
    }

    #[tokio::test]
    async fn test_open_wait_dispose_lifecycle() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "%PDF-1.4").unwrap();
        file.flush().unwrap();

        let printer = CommandPrinter::new("true", Duration::from_secs(5))
            .with_poll_interval(Duration::from_millis(5));
        let surface = printer.open(&temp_path(&file)).await.unwrap();
        assert_eq!(printer.open_surfaces(), 1);

        let readiness = await_ready(&printer, &surface, Duration::from_secs(2)).await.unwrap();
        assert_eq!(readiness, Readiness::Ready);

        printer.dispose(surface.clone()).await.unwrap();
        assert_eq!(printer.open_surfaces(), 0);

        let second = printer.dispose(surface).await;
        assert!(matches!(second, Err(PrintError::Dispose(..))));
    }

    #[tokio::test]
    async fn test_release_untracks_surface() {
        let file = NamedTempFile::new().unwrap();
        let printer = CommandPrinter::new("true", Duration::from_secs(5));
        let surface = printer.open(&temp_path(&file)).await.unwrap();

        printer.release(surface.clone()).await.unwrap();
        assert_eq!(printer.open_surfaces(), 0);
        assert!(file.path().exists());

        let again = printer.dispose(surface).await;
        assert!(matches!(again, Err(PrintError::Dispose(..))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_release_launches_viewer() {
        let file = NamedTempFile::new().unwrap();
        let printer =
            CommandPrinter::new("false", Duration::from_secs(5)).with_viewer("test -f {path}");
        let surface = printer.open(&temp_path(&file)).await.unwrap();

        assert!(printer.release(surface).await.is_ok());
        assert_eq!(printer.open_surfaces(), 0);
    }

    #[test]
    fn test_substitute_path() {
        let with_placeholder = substitute_path("xdg-open {path}", Utf8Path::new("/tmp/a.pdf"));
        assert!(with_placeholder.starts_with("xdg-open "));
        assert!(!with_placeholder.contains("{path}"));

        let appended = substitute_path("open", Utf8Path::new("/tmp/a.pdf"));
        assert!(appended.starts_with("open "));
        assert!(appended.contains("/tmp/a.pdf"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_trigger_print_nonzero_exit_is_trigger_failure() {
        let file = NamedTempFile::new().unwrap();
        let printer = CommandPrinter::new("false", Duration::from_secs(5));
        let surface = printer.open(&temp_path(&file)).await.unwrap();

        let err = printer.trigger_print(&surface).await.unwrap_err();
        assert!(err.is_trigger_failure());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_trigger_print_success() {
        let file = NamedTempFile::new().unwrap();
        let printer = CommandPrinter::new("test -f {path}", Duration::from_secs(5));
        let surface = printer.open(&temp_path(&file)).await.unwrap();

        assert!(printer.trigger_print(&surface).await.is_ok());
    }
}
