//! Pipeline phases and their share of a job's progress.

use std::sync::Arc;

use async_trait::async_trait;
use ddlsynth_ai::{ProgressEvent, ProgressSink};

use crate::manager::JobManager;
use crate::model::{JobEvent, JobId};

pub(crate) const PARSE_SHARE: f64 = 0.1;
pub(crate) const GENERATE_SHARE: f64 = 0.7;

/// Progress after the generation phase has reached `ratio`.
pub(crate) fn generation_progress(ratio: f64) -> f64 {
    PARSE_SHARE + GENERATE_SHARE * ratio.clamp(0.0, 1.0)
}

/// Forwards orchestrator events to a job's subscribers and folds table
/// ratios into the job's progress.
pub(crate) struct JobSink {
    pub(crate) manager: Arc<JobManager>,
    pub(crate) id: JobId,
}

#[async_trait]
impl ProgressSink for JobSink {
    async fn emit(&self, event: ProgressEvent) {
        if let ProgressEvent::Progress { ratio } = event {
            self.manager
                .advance(self.id, generation_progress(ratio))
                .await;
        }
        self.manager
            .publish(self.id, JobEvent::Pipeline { event })
            .await;
    }
}
