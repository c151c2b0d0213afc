use std::sync::Arc;

use daflow_automation::api::EngineApi;
use daflow_automation::storage::ObjectStore;

use crate::callback::CallbackReceiver;
use crate::completion::CompletionRelay;
use crate::config::PipelineConfig;
use crate::notify::{self, DeliveryTask, NotificationSink};
use crate::orchestrator::JobOrchestrator;
use crate::poller::StatusPoller;
use crate::registry::BundleRegistry;
use crate::stager::ArtifactStager;
use crate::submitter::JobSubmitter;

/// Every pipeline component, wired to one engine, store and sink.
///
/// The returned [`DeliveryTask`] must be spawned by the caller; nothing
/// reaches the sink until it runs.
pub struct AutomationServices {
    pub registry: Arc<BundleRegistry>,
    pub orchestrator: Arc<JobOrchestrator>,
    pub callbacks: Arc<CallbackReceiver>,
    pub stager: Arc<ArtifactStager>,
}

impl AutomationServices {
    pub fn build(
        engine: Arc<dyn EngineApi>,
        store: Arc<dyn ObjectStore>,
        sink: Arc<dyn NotificationSink>,
        config: PipelineConfig,
    ) -> (Self, DeliveryTask) {
        let (notifier, delivery) = notify::channel(sink, config.notify_capacity);

        let stager = Arc::new(ArtifactStager::new(
            store,
            config.bucket_key(),
            config.download_url_minutes,
            config.download_use_cdn,
        ));
        let completion = Arc::new(CompletionRelay::new(
            Arc::clone(&engine),
            Arc::clone(&stager),
        ));
        let poller = Arc::new(StatusPoller::new(
            Arc::clone(&engine),
            Arc::clone(&completion),
            config.poll,
        ));
        let submitter = JobSubmitter::new(Arc::clone(&engine), config.callback_url.clone());

        let orchestrator = Arc::new(JobOrchestrator::new(
            config.clone(),
            Arc::clone(&stager),
            submitter,
            poller,
            notifier.clone(),
        ));
        let callbacks = Arc::new(CallbackReceiver::new(
            notifier,
            Arc::clone(&stager),
            completion,
        ));
        let registry = Arc::new(BundleRegistry::new(engine, config));

        (
            Self {
                registry,
                orchestrator,
                callbacks,
                stager,
            },
            delivery,
        )
    }
}
