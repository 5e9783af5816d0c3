use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use talent_pipeline::workflows::hiring::{
    InMemoryPipelineStore, NotificationDispatcher, NotificationError, PipelineNotification,
    PipelineService,
};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::info;

pub(crate) type ApiPipelineService =
    PipelineService<InMemoryPipelineStore, ChannelNotifier, InMemoryPipelineStore>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Hands committed notifications to a background task so request handlers never wait on delivery.
#[derive(Clone)]
pub(crate) struct ChannelNotifier {
    sender: UnboundedSender<PipelineNotification>,
}

impl ChannelNotifier {
    pub(crate) fn new() -> (Self, UnboundedReceiver<PipelineNotification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl NotificationDispatcher for ChannelNotifier {
    fn dispatch(&self, notification: PipelineNotification) -> Result<(), NotificationError> {
        self.sender
            .send(notification)
            .map_err(|_| NotificationError::Transport("notification outbox closed".to_string()))
    }
}

pub(crate) fn spawn_notification_worker(mut outbox: UnboundedReceiver<PipelineNotification>) {
    tokio::spawn(async move {
        while let Some(notification) = outbox.recv().await {
            info!(
                template = notification.kind.template(),
                job = %notification.job_id,
                candidate = %notification.candidate_id,
                details = ?notification.details,
                "pipeline notification delivered"
            );
        }
    });
}

pub(crate) fn drain(outbox: &mut UnboundedReceiver<PipelineNotification>) -> Vec<PipelineNotification> {
    let mut delivered = Vec::new();
    while let Ok(notification) = outbox.try_recv() {
        delivered.push(notification);
    }
    delivered
}
