use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tracing::{debug, info, warn};

use super::probe::DiagnosticTest;
use super::{TestCategory, TestSnapshot, TestStatus};
use crate::config::{ABANDONED_REASON, TIMEOUT_REASON, UNSUPPORTED_REASON};
use crate::error::DiagnosticsError;
use crate::events::{EngineEvent, EngineEventKind, EventLog};
use crate::report::{DeviceInfoProvider, DiagnosticReport, HostDeviceInfo};

pub type SharedEngine = Arc<DiagnosticEngine>;

/// Everything the engine mutates, behind one lock.
pub struct EngineState {
    pub tests: Vec<Box<dyn DiagnosticTest>>,
    pub current_test: Option<String>,
    pub running: bool,
    /// Set by `cancel_run`; no further test starts until the next run.
    pub cancel_requested: bool,
}

impl EngineState {
    fn new() -> Self {
        Self {
            tests: Vec::new(),
            current_test: None,
            running: false,
            cancel_requested: false,
        }
    }

    fn find(&self, test_id: &str) -> Result<&dyn DiagnosticTest, DiagnosticsError> {
        self.tests
            .iter()
            .find(|t| t.id() == test_id)
            .map(|t| &**t)
            .ok_or_else(|| DiagnosticsError::UnknownTest(test_id.to_string()))
    }

    fn find_mut(&mut self, test_id: &str) -> Result<&mut Box<dyn DiagnosticTest>, DiagnosticsError> {
        self.tests
            .iter_mut()
            .find(|t| t.id() == test_id)
            .ok_or_else(|| DiagnosticsError::UnknownTest(test_id.to_string()))
    }

    fn completed_count(&self) -> usize {
        self.tests.iter().filter(|t| t.status().is_terminal()).count()
    }
}

/// Owns the test catalogue, drives runs and builds reports.
///
/// All mutations go through one `RwLock`. Runs additionally take `run_lock`
/// so only one `run_test`/`run_all_tests` is ever in flight; terminal marks
/// from the outside only need the state lock, which lets a waiting run be
/// completed by whoever confirms the test.
pub struct DiagnosticEngine {
    state: RwLock<EngineState>,
    run_lock: Mutex<()>,
    events: EventLog,
    revision: watch::Sender<u64>,
    device: Box<dyn DeviceInfoProvider>,
    confirm_timeout: Option<Duration>,
}

impl Default for DiagnosticEngine {
    fn default() -> Self {
        Self::new(HostDeviceInfo)
    }
}

impl DiagnosticEngine {
    pub fn new(device: impl DeviceInfoProvider + 'static) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            state: RwLock::new(EngineState::new()),
            run_lock: Mutex::new(()),
            events: EventLog::new(),
            revision,
            device: Box::new(device),
            confirm_timeout: None,
        }
    }

    /// Skip tests left unconfirmed for longer than `timeout`.
    pub fn with_confirm_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.confirm_timeout = timeout;
        self
    }

    // ------------------------------------------------------------------------
    // Registration and read access
    // ------------------------------------------------------------------------

    pub async fn add_test(&self, test: Box<dyn DiagnosticTest>) -> Result<(), DiagnosticsError> {
        let test_id = test.id().to_string();
        {
            let mut state = self.state.write().await;
            if state.tests.iter().any(|t| t.id() == test_id) {
                return Err(DiagnosticsError::DuplicateTest(test_id));
            }
            state.tests.push(test);
        }
        debug!("Registered test {}", test_id);
        self.publish(EngineEventKind::TestRegistered { test_id }).await;
        Ok(())
    }

    pub async fn tests(&self) -> Vec<TestSnapshot> {
        let state = self.state.read().await;
        state.tests.iter().map(|t| t.snapshot()).collect()
    }

    pub async fn test(&self, test_id: &str) -> Result<TestSnapshot, DiagnosticsError> {
        let state = self.state.read().await;
        state.find(test_id).map(|t| t.snapshot())
    }

    pub async fn current_test(&self) -> Option<TestSnapshot> {
        let state = self.state.read().await;
        let id = state.current_test.as_deref()?;
        state.find(id).ok().map(|t| t.snapshot())
    }

    pub async fn is_running(&self) -> bool {
        self.state.read().await.running
    }

    /// Tests in a terminal state. For progress display only.
    pub async fn completed_count(&self) -> usize {
        self.state.read().await.completed_count()
    }

    /// Tests of one category, in registration order.
    pub async fn tests_by_category(&self, category: TestCategory) -> Vec<TestSnapshot> {
        let state = self.state.read().await;
        state
            .tests
            .iter()
            .filter(|t| t.descriptor().category == category)
            .map(|t| t.snapshot())
            .collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    // ------------------------------------------------------------------------
    // Running
    // ------------------------------------------------------------------------

    /// Run one test and wait until it settles. Returns the status it settled
    /// in (terminal, or NotStarted if it was reset while waiting).
    pub async fn run_test(&self, test_id: &str) -> Result<TestStatus, DiagnosticsError> {
        let _guard = self
            .run_lock
            .try_lock()
            .map_err(|_| DiagnosticsError::RunInProgress)?;
        self.state.write().await.cancel_requested = false;
        self.run_test_inner(test_id).await
    }

    /// Reset everything, then run every registered test in order, one at a
    /// time. Individual failures never stop the batch.
    pub async fn run_all_tests(&self) -> Result<(), DiagnosticsError> {
        let _guard = self
            .run_lock
            .try_lock()
            .map_err(|_| DiagnosticsError::RunInProgress)?;

        let ids: Vec<String> = {
            let mut state = self.state.write().await;
            state.running = true;
            state.cancel_requested = false;
            state.tests.iter().map(|t| t.id().to_string()).collect()
        };
        let total = ids.len();
        info!("Diagnostic run started: {} tests", total);
        self.publish(EngineEventKind::RunStarted { total }).await;

        self.reset_all_tests().await;

        for (i, test_id) in ids.iter().enumerate() {
            if self.state.read().await.cancel_requested {
                info!("Diagnostic run cancelled before {}", test_id);
                break;
            }
            info!("Running test {}/{}: {}", i + 1, total, test_id);
            match self.run_test_inner(test_id).await {
                Ok(status) => info!("  {}: {}", test_id, status),
                Err(e) => warn!("  {}: {}", test_id, e),
            }
        }

        let completed = {
            let mut state = self.state.write().await;
            state.running = false;
            state.current_test = None;
            state.completed_count()
        };
        info!("Diagnostic run completed: {}/{} tests settled", completed, total);
        self.publish(EngineEventKind::RunCompleted { completed, total })
            .await;
        Ok(())
    }

    async fn run_test_inner(&self, test_id: &str) -> Result<TestStatus, DiagnosticsError> {
        // Subscribe before starting so no transition can slip past the wait.
        let mut changes = self.revision.subscribe();

        let status = {
            let mut state = self.state.write().await;

            // A cancel may land between the batch loop's check and here.
            if state.cancel_requested {
                return Ok(state.find(test_id)?.status());
            }

            if !state.find(test_id)?.is_supported() {
                state.find_mut(test_id)?.mark_skipped(UNSUPPORTED_REASON);
                drop(state);
                info!("Skipping {}: {}", test_id, UNSUPPORTED_REASON);
                self.publish_completed(test_id, TestStatus::Skipped).await;
                return Ok(TestStatus::Skipped);
            }

            state.current_test = Some(test_id.to_string());
            let test = state.find_mut(test_id)?;
            test.state_mut().begin();
            if let Err(e) = test.run() {
                warn!("Test {} failed to run: {}", test_id, e);
                test.mark_failed(&e.to_string(), BTreeMap::new());
            }
            test.status()
        };

        self.publish(EngineEventKind::TestStarted {
            test_id: test_id.to_string(),
        })
        .await;

        if status != TestStatus::Running {
            self.publish_completed(test_id, status).await;
            return Ok(status);
        }

        debug!("Test {} awaiting confirmation", test_id);
        self.publish(EngineEventKind::AwaitingConfirmation {
            test_id: test_id.to_string(),
        })
        .await;

        let wait = async {
            loop {
                if let Some(status) = self.settled_status(test_id).await {
                    return status;
                }
                if changes.changed().await.is_err() {
                    return TestStatus::Running;
                }
            }
        };

        match self.confirm_timeout {
            Some(limit) => match tokio::time::timeout(limit, wait).await {
                Ok(status) => Ok(status),
                Err(_) => {
                    warn!("Test {} not confirmed within {:?}", test_id, limit);
                    self.skip_if_running(test_id, TIMEOUT_REASON).await
                }
            },
            None => Ok(wait.await),
        }
    }

    async fn settled_status(&self, test_id: &str) -> Option<TestStatus> {
        let state = self.state.read().await;
        match state.find(test_id).map(|t| t.status()) {
            Ok(TestStatus::Running) => None,
            Ok(status) => Some(status),
            // Unregistration is not possible, treat as settled.
            Err(_) => Some(TestStatus::NotStarted),
        }
    }

    // ------------------------------------------------------------------------
    // Terminal transitions from collaborators
    // ------------------------------------------------------------------------

    pub async fn mark_passed(
        &self,
        test_id: &str,
        metadata: BTreeMap<String, String>,
    ) -> Result<(), DiagnosticsError> {
        self.state
            .write()
            .await
            .find_mut(test_id)?
            .mark_passed(metadata);
        info!("Test {} passed", test_id);
        self.publish_completed(test_id, TestStatus::Passed).await;
        Ok(())
    }

    pub async fn mark_failed(
        &self,
        test_id: &str,
        reason: &str,
        metadata: BTreeMap<String, String>,
    ) -> Result<(), DiagnosticsError> {
        self.state
            .write()
            .await
            .find_mut(test_id)?
            .mark_failed(reason, metadata);
        info!("Test {} failed: {}", test_id, reason);
        self.publish_completed(test_id, TestStatus::Failed).await;
        Ok(())
    }

    pub async fn mark_skipped(&self, test_id: &str, reason: &str) -> Result<(), DiagnosticsError> {
        self.state
            .write()
            .await
            .find_mut(test_id)?
            .mark_skipped(reason);
        info!("Test {} skipped: {}", test_id, reason);
        self.publish_completed(test_id, TestStatus::Skipped).await;
        Ok(())
    }

    /// Skip the current test if it is still waiting for confirmation.
    /// Returns the id of the abandoned test, if any.
    pub async fn abandon_current_test(&self) -> Option<String> {
        let test_id = self.state.read().await.current_test.clone()?;
        let was_running = self.settled_status(&test_id).await.is_none();
        match self.skip_if_running(&test_id, ABANDONED_REASON).await {
            Ok(TestStatus::Skipped) if was_running => Some(test_id),
            _ => None,
        }
    }

    /// Stop the run in flight: abandon the test being awaited and start no
    /// further tests. Returns once the run has finished, with the id of the
    /// abandoned test, if any.
    pub async fn cancel_run(&self) -> Option<String> {
        self.state.write().await.cancel_requested = true;
        info!("Cancelling diagnostic run");
        let abandoned = self.abandon_current_test().await;
        let _idle = self.run_lock.lock().await;
        abandoned
    }

    /// Skip a test still waiting for confirmation. Returns the status the
    /// test is left in; anything already settled is left untouched.
    async fn skip_if_running(
        &self,
        test_id: &str,
        reason: &str,
    ) -> Result<TestStatus, DiagnosticsError> {
        {
            let mut state = self.state.write().await;
            let test = state.find_mut(test_id)?;
            if test.status() != TestStatus::Running {
                return Ok(test.status());
            }
            test.mark_skipped(reason);
        }
        info!("Test {} skipped: {}", test_id, reason);
        self.publish_completed(test_id, TestStatus::Skipped).await;
        Ok(TestStatus::Skipped)
    }

    // ------------------------------------------------------------------------
    // Reset
    // ------------------------------------------------------------------------

    pub async fn reset_test(&self, test_id: &str) -> Result<(), DiagnosticsError> {
        {
            let mut state = self.state.write().await;
            state.find_mut(test_id)?.reset();
            if state.current_test.as_deref() == Some(test_id) {
                state.current_test = None;
            }
        }
        self.publish(EngineEventKind::TestReset {
            test_id: test_id.to_string(),
        })
        .await;
        Ok(())
    }

    pub async fn reset_all_tests(&self) {
        {
            let mut state = self.state.write().await;
            for test in state.tests.iter_mut() {
                test.reset();
            }
            state.current_test = None;
        }
        debug!("All tests reset");
        self.publish(EngineEventKind::AllTestsReset).await;
    }

    // ------------------------------------------------------------------------
    // Reports
    // ------------------------------------------------------------------------

    /// Snapshot the latest result of every test. Tests without a result are
    /// left out.
    pub async fn generate_report(&self) -> DiagnosticReport {
        let (results, capabilities) = {
            let state = self.state.read().await;
            let results: Vec<_> = state.tests.iter().filter_map(|t| t.result().cloned()).collect();
            let capabilities: BTreeMap<String, bool> = state
                .tests
                .iter()
                .map(|t| (t.id().to_string(), t.is_supported()))
                .collect();
            (results, capabilities)
        };

        let mut device_info = self.device.device_info();
        device_info.capabilities = capabilities;

        let report = DiagnosticReport::new(device_info, results);
        info!(
            "Generated report {} with {} results",
            report.id,
            report.results.len()
        );
        self.events
            .emit(EngineEventKind::ReportGenerated {
                report_id: report.id,
                results: report.results.len(),
            })
            .await;
        report
    }

    // ------------------------------------------------------------------------
    // Notification
    // ------------------------------------------------------------------------

    async fn publish(&self, kind: EngineEventKind) {
        self.events.emit(kind).await;
        self.revision.send_modify(|rev| *rev = rev.wrapping_add(1));
    }

    async fn publish_completed(&self, test_id: &str, status: TestStatus) {
        self.publish(EngineEventKind::TestCompleted {
            test_id: test_id.to_string(),
            status,
        })
        .await;
    }
}
