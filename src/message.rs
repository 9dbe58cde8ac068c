use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Severity of a diagnostic message attached to a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A diagnostic message attached to a resource, persisted across builds.
///
/// Messages survive as long as the resource they describe is carried over;
/// processing or deleting the resource clears them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub line: u32,
    pub column: u32,
    pub text: String,
    pub severity: Severity,
    /// Rendered source of the underlying failure, if any. Error chains do
    /// not round-trip through the state file, their text does.
    pub cause: Option<String>,
}

/// Messages keyed by the resource they were reported against.
pub type MessageMap = BTreeMap<Utf8PathBuf, Vec<Message>>;

/// Adapter that forwards diagnostics to the host at commit.
pub trait MessageSink {
    /// Drop everything previously recorded against `resource`.
    fn clear(&mut self, resource: &Utf8Path);

    /// Receive the full message map and the subset reported by this build.
    fn record(&mut self, all: &MessageMap, new: &MessageMap);
}

/// `path:[line:col] text`, the rendering shared by logs and failure summaries.
pub(crate) fn render(resource: &Utf8Path, message: &Message) -> String {
    format!(
        "{}:[{}:{}] {}",
        resource, message.line, message.column, message.text
    )
}

pub(crate) fn log_message(resource: &Utf8Path, message: &Message) {
    let rendered = match &message.cause {
        Some(cause) => format!("{}: caused by {cause}", render(resource, message)),
        None => render(resource, message),
    };
    match message.severity {
        Severity::Error => error!("{rendered}"),
        Severity::Warning => warn!("{rendered}"),
        Severity::Info => info!("{rendered}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render() {
        let message = Message {
            line: 3,
            column: 7,
            text: "unexpected token".to_string(),
            severity: Severity::Error,
            cause: None,
        };

        assert_eq!(
            render(Utf8Path::new("/p/src/a.txt"), &message),
            "/p/src/a.txt:[3:7] unexpected token"
        );
    }

    #[test]
    fn test_message_round_trip() {
        let message = Message {
            line: 1,
            column: 0,
            text: "shadowed import".to_string(),
            severity: Severity::Warning,
            cause: Some("io error".to_string()),
        };

        let json = serde_json::to_string(&message).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back, message);
    }
}
