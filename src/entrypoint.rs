use std::sync::{Mutex, OnceLock};

use crate::error::Result;
use crate::models::{HandlerContext, PayloadItem, Prediction};
use crate::service::{ClassificationService, InferencePipeline};

/// Process-wide service for the pretrained ResNet model.
pub static PRETRAINED_RESNET: LazyHandler = LazyHandler::new(ClassificationService::pretrained_resnet);

/// Builds and initializes its service on the first request, then serves
/// every later request from the same instance.
pub struct LazyHandler {
    service: OnceLock<ClassificationService>,
    init_lock: Mutex<()>,
    factory: fn() -> ClassificationService,
}

impl LazyHandler {
    pub const fn new(factory: fn() -> ClassificationService) -> Self {
        LazyHandler {
            service: OnceLock::new(),
            init_lock: Mutex::new(()),
            factory,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.service.get().map_or(false, ClassificationService::is_initialized)
    }

    /// Concurrent first callers wait on one initialization. A failed
    /// attempt leaves the handler uninitialized so the next call retries.
    fn service(&self, ctx: &HandlerContext) -> Result<&ClassificationService> {
        if let Some(service) = self.service.get() {
            return Ok(service);
        }

        let _guard = self.init_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(service) = self.service.get() {
            return Ok(service);
        }

        tracing::info!(model = ctx.model_name(), "initializing service on first request");
        let mut service = (self.factory)();
        service.initialize(ctx)?;

        let input_shape = service
            .signature()
            .and_then(|sig| sig.primary_input().ok())
            .map(|input| input.data_shape.clone())
            .unwrap_or_default();
        tracing::info!(
            model = service.model_name().unwrap_or_default(),
            device = %service.device(),
            labels = service.labels().map_or(0, <[String]>::len),
            ?input_shape,
            "service ready"
        );
        Ok(self.service.get_or_init(|| service))
    }

    /// Host entry point: `None` data yields `None` once the service is up.
    pub fn handle(&self, data: Option<&[PayloadItem]>, ctx: &HandlerContext) -> Result<Option<Prediction>> {
        let service = self.service(ctx)?;
        data.map(|data| service.predict(data)).transpose()
    }
}
