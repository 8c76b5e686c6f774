//! Build-progress reporting.
//!
//! The orchestrator and sampler emit events through a caller-supplied
//! callback; the engine never blocks on it.

use serde::Serialize;
use std::sync::Arc;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStage {
    SamplingStarted,
    SamplingProgress,
    SamplingComplete,
    InferenceStarted,
    InferenceComplete,
    SdlGenerationStarted,
    SdlGenerationComplete,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub stage: BuildStage,
    /// Container the event concerns; absent for schema-wide stages.
    pub container: Option<String>,
    /// Completion share in `[0, 1]`, when meaningful.
    pub progress: Option<f64>,
    pub message: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl ProgressEvent {
    pub fn stage(stage: BuildStage) -> Self {
        Self { stage, container: None, progress: None, message: None, metadata: None }
    }

    pub fn for_container(stage: BuildStage, container: impl Into<String>) -> Self {
        Self {
            stage,
            container: Some(container.into()),
            progress: None,
            message: None,
            metadata: None,
        }
    }

    pub fn with_progress(mut self, progress: f64) -> Self {
        self.progress = Some(progress.clamp(0.0, 1.0));
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Emit an event if a callback is installed.
pub fn emit(callback: &Option<ProgressCallback>, event: ProgressEvent) {
    if let Some(callback) = callback {
        callback(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_events_flow_through_callback() {
        let seen: Arc<Mutex<Vec<BuildStage>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: ProgressCallback = Arc::new(move |event| {
            sink.lock().unwrap().push(event.stage);
        });
        let callback = Some(callback);

        emit(&callback, ProgressEvent::stage(BuildStage::SamplingStarted));
        emit(
            &callback,
            ProgressEvent::for_container(BuildStage::SamplingProgress, "users")
                .with_progress(0.5),
        );
        emit(&None, ProgressEvent::stage(BuildStage::SamplingComplete));

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec![BuildStage::SamplingStarted, BuildStage::SamplingProgress]);
    }

    #[test]
    fn test_progress_is_clamped() {
        let event = ProgressEvent::stage(BuildStage::SamplingProgress).with_progress(3.5);
        assert_eq!(event.progress, Some(1.0));
    }
}
