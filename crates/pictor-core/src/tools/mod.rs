pub mod bridge;
pub mod image;
pub mod notify;

pub use bridge::{DispatchOutcome, ToolExecutorBridge, ToolInvocation};
pub use image::{HttpImageGenerator, ImageGenerationError, ImageGenerationRequest, ImageGenerator};
pub use notify::{
    ChannelNotifier, ImageObserver, Notification, Notifier, NotifyError, Severity,
    TracingNotifier,
};
