use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    #[default]
    Default,
    Destructive,
}

/// A user-visible toast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub severity: Severity,
}

impl Notification {
    pub fn generation_failed(description: impl Into<String>) -> Self {
        Self {
            title: "Generation failed".to_string(),
            description: description.into(),
            severity: Severity::Destructive,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    #[error("Notification surface closed")]
    Closed,

    #[error("Notification failed: {0}")]
    Failed(String),
}

pub trait Notifier: Send + Sync + 'static {
    fn notify(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// Receives the URL of every generated image.
pub trait ImageObserver: Send + Sync + 'static {
    fn image_generated(&self, url: &str);
}

impl<F> ImageObserver for F
where
    F: Fn(&str) + Send + Sync + 'static,
{
    fn image_generated(&self, url: &str) {
        self(url);
    }
}

/// Logs notifications. Used when no surface is attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        match notification.severity {
            Severity::Destructive => tracing::warn!(
                target: "pictor::notify",
                title = %notification.title,
                "{}",
                notification.description
            ),
            Severity::Default => tracing::info!(
                target: "pictor::notify",
                title = %notification.title,
                "{}",
                notification.description
            ),
        }
        Ok(())
    }
}

/// Forwards notifications to a receiver owned by the rendering layer.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        self.tx.send(notification).map_err(|_| NotifyError::Closed)
    }
}
