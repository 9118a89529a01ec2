//! Test doubles for the conversation's external collaborators.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::api::error::ApiError;
use crate::api::provider::{ChatRequest, EventStream, ModelService};
use crate::app::domain::stream::StreamEvent;
use crate::tools::image::{ImageGenerationError, ImageGenerationRequest, ImageGenerator};
use crate::tools::notify::{Notification, Notifier, NotifyError};
use pictor_tools::tools::GeneratedImage;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Events returned for one model invocation.
#[derive(Debug, Clone, Default)]
pub struct ModelScript {
    pub events: Vec<StreamEvent>,
    /// Keep the stream open after the events until it is cancelled.
    pub hold_open: bool,
}

impl ModelScript {
    pub fn new(events: Vec<StreamEvent>) -> Self {
        Self {
            events,
            hold_open: false,
        }
    }

    pub fn held_open(events: Vec<StreamEvent>) -> Self {
        Self {
            events,
            hold_open: true,
        }
    }
}

/// Replays one script per invocation, in order. Invocations past the end of
/// the script list get an empty stream.
#[derive(Default)]
pub struct ScriptedModelService {
    scripts: Mutex<VecDeque<ModelScript>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedModelService {
    pub fn new(scripts: Vec<ModelScript>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        lock(&self.requests).clone()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }
}

#[async_trait]
impl ModelService for ScriptedModelService {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn stream_chat(
        &self,
        request: ChatRequest,
        _token: CancellationToken,
    ) -> Result<EventStream, ApiError> {
        lock(&self.requests).push(request);
        let script = lock(&self.scripts).pop_front().unwrap_or_default();

        let events = stream::iter(script.events);
        if script.hold_open {
            Ok(Box::pin(events.chain(stream::pending())))
        } else {
            Ok(Box::pin(events))
        }
    }
}

/// Image generator that counts invocations and returns a fixed result.
pub struct CountingImageGenerator {
    response: Result<GeneratedImage, String>,
    calls: AtomicUsize,
    requests: Mutex<Vec<ImageGenerationRequest>>,
    gate: Option<Arc<Notify>>,
}

impl CountingImageGenerator {
    pub fn succeeding(image: GeneratedImage) -> Self {
        Self::with_response(Ok(image))
    }

    /// Fails every request with `message` as the service's reason.
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_response(Err(message.into()))
    }

    fn with_response(response: Result<GeneratedImage, String>) -> Self {
        Self {
            response,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// Holds each generation until `gate` is notified.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<ImageGenerationRequest> {
        lock(&self.requests).last().cloned()
    }
}

#[async_trait]
impl ImageGenerator for CountingImageGenerator {
    async fn generate(
        &self,
        request: ImageGenerationRequest,
    ) -> Result<GeneratedImage, ImageGenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.requests).push(request);

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        self.response
            .clone()
            .map_err(ImageGenerationError::Rejected)
    }
}

/// Records every notification and optionally reports a failure.
#[derive(Default)]
pub struct RecordingNotifier {
    notifications: Mutex<Vec<Notification>>,
    failure: Option<NotifyError>,
}

impl RecordingNotifier {
    pub fn failing_with(error: NotifyError) -> Self {
        Self {
            notifications: Mutex::new(Vec::new()),
            failure: Some(error),
        }
    }

    pub fn notifications(&self) -> Vec<Notification> {
        lock(&self.notifications).clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        lock(&self.notifications).push(notification);
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}
