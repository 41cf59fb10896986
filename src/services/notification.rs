use std::path::Path;
use std::sync::Mutex;

/// Severity of a user-visible alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Success,
    Info,
    Error,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Success => "success",
            NotificationKind::Info => "info",
            NotificationKind::Error => "error",
        }
    }
}

/// Best-effort user-visible alert. Implementations must not fail the caller.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, message: &str, kind: NotificationKind);
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, title: &str, message: &str, kind: NotificationKind) {
        match kind {
            NotificationKind::Error => tracing::error!(target: "autoprint::notify", "{}: {}", title, message),
            _ => tracing::info!(target: "autoprint::notify", "{}: {}", title, message),
        }
    }
}

/// Spawns an external program for each alert.
///
/// `notify-send` gets `--urgency` derived from the kind (error is critical,
/// success and info are normal). Any other program is invoked as
/// `<program> <title> <message> <kind>`, with kind one of `success`, `info`
/// or `error`. Spawn failures are logged and otherwise ignored.
#[derive(Debug, Clone)]
pub struct CommandNotifier {
    program: String,
}

impl CommandNotifier {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Arguments passed to the program for one alert.
    pub fn args(&self, title: &str, message: &str, kind: NotificationKind) -> Vec<String> {
        let is_notify_send = Path::new(&self.program)
            .file_stem()
            .is_some_and(|stem| stem == "notify-send");

        if is_notify_send {
            let urgency = match kind {
                NotificationKind::Error => "critical",
                NotificationKind::Success | NotificationKind::Info => "normal",
            };
            vec![
                "--urgency".to_string(),
                urgency.to_string(),
                "--app-name".to_string(),
                title.to_string(),
                title.to_string(),
                message.to_string(),
            ]
        } else {
            vec![
                title.to_string(),
                message.to_string(),
                kind.as_str().to_string(),
            ]
        }
    }
}

impl Notifier for CommandNotifier {
    fn notify(&self, title: &str, message: &str, kind: NotificationKind) {
        TracingNotifier.notify(title, message, kind);

        let spawned = std::process::Command::new(&self.program)
            .args(self.args(title, message, kind))
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn();

        match spawned {
            // Reap the child off the caller's thread
            Ok(mut child) => {
                std::thread::spawn(move || {
                    let _ = child.wait();
                });
            }
            Err(e) => {
                tracing::warn!("Notification command {} failed to start: {}", self.program, e);
            }
        }
    }
}

/// Notification captured by [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
}

/// Keeps every notification in memory; useful for embedding and tests.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, title: &str, message: &str, kind: NotificationKind) {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Notification {
                title: title.to_string(),
                message: message.to_string(),
                kind,
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_notifier_keeps_order() {
        let notifier = RecordingNotifier::new();
        notifier.notify("a", "first", NotificationKind::Info);
        notifier.notify("b", "second", NotificationKind::Error);

        let sent = notifier.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].message, "first");
        assert_eq!(sent[1].kind, NotificationKind::Error);
    }

    #[test]
    fn test_notify_send_gets_urgency_from_kind() {
        let notifier = CommandNotifier::new("/usr/bin/notify-send");

        let error = notifier.args("AutoPrint", "Failed to print a.pdf", NotificationKind::Error);
        assert_eq!(&error[..2], ["--urgency", "critical"]);
        assert_eq!(error.last().map(String::as_str), Some("Failed to print a.pdf"));

        let success = notifier.args("AutoPrint", "Printing a.pdf", NotificationKind::Success);
        assert_eq!(&success[..2], ["--urgency", "normal"]);
    }

    #[test]
    fn test_other_programs_get_kind_as_last_argument() {
        let notifier = CommandNotifier::new("my-alert");
        let args = notifier.args("AutoPrint", "a.pdf is open", NotificationKind::Info);
        assert_eq!(args, vec!["AutoPrint", "a.pdf is open", "info"]);
    }

    #[test]
    fn test_command_notifier_missing_program_does_not_panic() {
        let notifier = CommandNotifier::new("autoprint-no-such-notifier-binary");
        notifier.notify("title", "message", NotificationKind::Success);
    }
}
