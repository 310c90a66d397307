//! Test doubles for capabilities.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::capability::{
    AssetStore, AsyncJobCapability, GenerationCapability, InMemoryAssetStore, JobSubmission,
    PollResponse,
};
use crate::context::StageInputs;
use crate::core::{AssetHandle, JobHandle, JobResultItem, Ordinal};
use crate::errors::CapabilityError;

/// Shared, ordered log of completed calls.
pub type CallLog = Arc<Mutex<Vec<String>>>;

/// Creates an empty call log.
#[must_use]
pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// A capability that returns a fixed value and records every call.
#[derive(Debug)]
pub struct StaticCapability {
    value: serde_json::Value,
    calls: Mutex<Vec<serde_json::Value>>,
}

impl StaticCapability {
    /// Creates a capability returning `value`.
    #[must_use]
    pub fn new(value: serde_json::Value) -> Self {
        Self {
            value,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Returns the number of calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Returns the inputs seen by each call, as JSON.
    #[must_use]
    pub fn recorded_inputs(&self) -> Vec<serde_json::Value> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl GenerationCapability for StaticCapability {
    async fn invoke(&self, inputs: &StageInputs) -> Result<serde_json::Value, CapabilityError> {
        self.calls.lock().push(inputs.to_json());
        Ok(self.value.clone())
    }
}

/// A capability that always fails.
#[derive(Debug, Clone)]
pub struct FailingCapability {
    message: String,
    transient: bool,
}

impl FailingCapability {
    /// Fails with `CapabilityError::Rejected`.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: false,
        }
    }

    /// Fails with `CapabilityError::Unavailable`.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: true,
        }
    }
}

#[async_trait]
impl GenerationCapability for FailingCapability {
    async fn invoke(&self, _inputs: &StageInputs) -> Result<serde_json::Value, CapabilityError> {
        if self.transient {
            Err(CapabilityError::Unavailable(self.message.clone()))
        } else {
            Err(CapabilityError::Rejected(self.message.clone()))
        }
    }
}

/// A capability that answers after a delay.
#[derive(Debug)]
pub struct SlowCapability {
    delay: Duration,
    value: serde_json::Value,
    log: Option<(CallLog, String)>,
}

impl SlowCapability {
    /// Creates a capability returning `value` after `delay`.
    #[must_use]
    pub fn new(delay: Duration, value: serde_json::Value) -> Self {
        Self {
            delay,
            value,
            log: None,
        }
    }

    /// Appends `label` to `log` when a call completes.
    #[must_use]
    pub fn with_log(mut self, log: CallLog, label: impl Into<String>) -> Self {
        self.log = Some((log, label.into()));
        self
    }
}

#[async_trait]
impl GenerationCapability for SlowCapability {
    async fn invoke(&self, _inputs: &StageInputs) -> Result<serde_json::Value, CapabilityError> {
        tokio::time::sleep(self.delay).await;
        if let Some((log, label)) = &self.log {
            log.lock().push(label.clone());
        }
        Ok(self.value.clone())
    }
}

/// One scripted answer of a [`ScriptedJobCapability`].
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Report `pending`.
    Pending,
    /// Report `running`.
    Running,
    /// Report an arbitrary status string.
    Status(String),
    /// Succeed with one item per expected ordinal.
    SucceedAll,
    /// Return this exact response.
    Respond(PollResponse),
    /// Fail the poll call itself.
    TransportError(String),
    /// Never answer.
    Stall,
}

/// A job service driven by per-job scripts.
///
/// Jobs are identified by the lowest ordinal they carry. Each poll consumes
/// the next step of that job's script; the last step repeats forever. Jobs
/// without a script succeed on their first poll.
#[derive(Default)]
pub struct ScriptedJobCapability {
    scripts: Mutex<HashMap<Ordinal, VecDeque<ScriptStep>>>,
    submit_failures: HashMap<Ordinal, String>,
    jobs: Mutex<HashMap<JobHandle, JobSubmission>>,
    submissions: Mutex<Vec<JobSubmission>>,
    polls: Mutex<HashMap<Ordinal, usize>>,
    next_id: AtomicUsize,
    assets: Option<Arc<InMemoryAssetStore>>,
}

impl ScriptedJobCapability {
    /// Creates a service where every job succeeds immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the job whose lowest ordinal is `ordinal`.
    #[must_use]
    pub fn with_script(self, ordinal: Ordinal, steps: Vec<ScriptStep>) -> Self {
        self.scripts.lock().insert(ordinal, steps.into());
        self
    }

    /// Rejects submission of the job whose lowest ordinal is `ordinal`.
    #[must_use]
    pub fn fail_submit(mut self, ordinal: Ordinal, message: impl Into<String>) -> Self {
        self.submit_failures.insert(ordinal, message.into());
        self
    }

    /// Stores produced assets in `store` so their handles resolve.
    #[must_use]
    pub fn with_asset_store(mut self, store: Arc<InMemoryAssetStore>) -> Self {
        self.assets = Some(store);
        self
    }

    /// Returns every submission received, in order.
    #[must_use]
    pub fn submissions(&self) -> Vec<JobSubmission> {
        self.submissions.lock().clone()
    }

    /// Returns how often the job keyed by `ordinal` was polled.
    #[must_use]
    pub fn poll_count(&self, ordinal: Ordinal) -> usize {
        self.polls.lock().get(&ordinal).copied().unwrap_or(0)
    }

    fn next_step(&self, key: Ordinal) -> ScriptStep {
        let mut scripts = self.scripts.lock();
        let step = match scripts.get_mut(&key) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        step.unwrap_or(ScriptStep::SucceedAll)
    }

    async fn produce(&self, ordinal: Ordinal) -> Result<JobResultItem, CapabilityError> {
        let asset = match &self.assets {
            Some(store) => {
                store
                    .put(format!("image #{ordinal}").into_bytes(), "image/png")
                    .await?
            }
            None => AssetHandle::new(format!("asset-{ordinal}")),
        };
        Ok(JobResultItem::new(ordinal, asset).with_mime_type("image/png"))
    }
}

impl std::fmt::Debug for ScriptedJobCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedJobCapability")
            .field("submissions", &self.submissions.lock().len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AsyncJobCapability for ScriptedJobCapability {
    async fn submit(&self, submission: &JobSubmission) -> Result<JobHandle, CapabilityError> {
        self.submissions.lock().push(submission.clone());
        let key = submission.first_ordinal().unwrap_or_default();
        if let Some(message) = self.submit_failures.get(&key) {
            return Err(CapabilityError::Rejected(message.clone()));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let handle = JobHandle::new(format!("job-{key}-{id}"));
        self.jobs.lock().insert(handle.clone(), submission.clone());
        Ok(handle)
    }

    async fn poll(&self, handle: &JobHandle) -> Result<PollResponse, CapabilityError> {
        let submission = self
            .jobs
            .lock()
            .get(handle)
            .cloned()
            .ok_or_else(|| CapabilityError::InvalidResponse(format!("unknown job {handle}")))?;
        let key = submission.first_ordinal().unwrap_or_default();
        *self.polls.lock().entry(key).or_default() += 1;

        match self.next_step(key) {
            ScriptStep::Pending => Ok(PollResponse::pending()),
            ScriptStep::Running => Ok(PollResponse::running()),
            ScriptStep::Status(status) => Ok(PollResponse::with_status(status)),
            ScriptStep::Respond(response) => Ok(response),
            ScriptStep::TransportError(message) => Err(CapabilityError::Unavailable(message)),
            ScriptStep::Stall => std::future::pending().await,
            ScriptStep::SucceedAll => {
                let mut items = Vec::with_capacity(submission.requests.len());
                for ordinal in submission.ordinals() {
                    items.push(self.produce(ordinal).await?);
                }
                Ok(PollResponse::succeeded(items))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poller::SubRequest;
    use serde_json::json;

    #[tokio::test]
    async fn test_static_capability_records_inputs() {
        let capability = StaticCapability::new(json!("ok"));
        let inputs = StageInputs::from_pairs("S", [("topic", json!("rain"))]);

        assert_eq!(capability.invoke(&inputs).await.unwrap(), json!("ok"));
        assert_eq!(capability.call_count(), 1);
        assert_eq!(capability.recorded_inputs()[0]["topic"], "rain");
    }

    #[tokio::test]
    async fn test_failing_capability() {
        let inputs = StageInputs::default();
        assert!(matches!(
            FailingCapability::rejected("no").invoke(&inputs).await,
            Err(CapabilityError::Rejected(_))
        ));
        let err = FailingCapability::unavailable("down").invoke(&inputs).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_script_last_step_repeats() {
        let capability = ScriptedJobCapability::new()
            .with_script(0, vec![ScriptStep::Pending, ScriptStep::Running]);
        let handle = capability
            .submit(&JobSubmission::new(vec![SubRequest::new(0, json!("p"))]))
            .await
            .unwrap();

        assert_eq!(capability.poll(&handle).await.unwrap().status, "pending");
        assert_eq!(capability.poll(&handle).await.unwrap().status, "running");
        assert_eq!(capability.poll(&handle).await.unwrap().status, "running");
        assert_eq!(capability.poll_count(0), 3);
    }

    #[tokio::test]
    async fn test_succeed_all_stores_assets() {
        let store = Arc::new(InMemoryAssetStore::new());
        let capability = ScriptedJobCapability::new().with_asset_store(store.clone());
        let handle = capability
            .submit(&JobSubmission::new(vec![
                SubRequest::new(0, json!("a")),
                SubRequest::new(1, json!("b")),
            ]))
            .await
            .unwrap();

        let response = capability.poll(&handle).await.unwrap();
        assert_eq!(response.items.len(), 2);
        assert!(store.contains(&response.items[1].asset).await);
    }
}
