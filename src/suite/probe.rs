use std::collections::BTreeMap;

use super::{TestCategory, TestResult, TestSnapshot, TestStatus};

/// Static identity of a test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestDescriptor {
    /// Stable identifier, also the join key into results.
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: TestCategory,
}

impl TestDescriptor {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        category: TestCategory,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            category,
        }
    }
}

/// Mutable lifecycle half of a test: status plus the latest result.
#[derive(Debug, Clone, PartialEq)]
pub struct TestState {
    pub status: TestStatus,
    pub result: Option<TestResult>,
}

impl Default for TestState {
    fn default() -> Self {
        Self::new()
    }
}

impl TestState {
    pub fn new() -> Self {
        Self {
            status: TestStatus::NotStarted,
            result: None,
        }
    }

    pub fn reset(&mut self) {
        self.status = TestStatus::NotStarted;
        self.result = None;
    }

    pub fn begin(&mut self) {
        self.status = TestStatus::Running;
    }

    fn finish(
        &mut self,
        test_id: &str,
        status: TestStatus,
        reason: Option<String>,
        metadata: BTreeMap<String, String>,
    ) {
        self.status = status;
        self.result = Some(TestResult::new(test_id, status, reason, metadata));
    }
}

/// Contract every hardware check satisfies.
///
/// Implementors provide identity, the support gate and `run`; the terminal
/// transitions are provided on top of [`TestState`]. A `run` that opens a
/// session and returns `Ok(())` without marking leaves the test Running until
/// someone calls one of the `mark_*` methods.
pub trait DiagnosticTest: Send + Sync {
    fn descriptor(&self) -> &TestDescriptor;

    /// Whether the device has the hardware this test needs.
    fn is_supported(&self) -> bool;

    fn state(&self) -> &TestState;

    fn state_mut(&mut self) -> &mut TestState;

    /// Test-specific start. Errors are recorded as a failure by the engine.
    fn run(&mut self) -> anyhow::Result<()>;

    /// Release any live hardware session held by the test. Called on every
    /// terminal mark and on reset, so it must be idempotent.
    fn release_resources(&mut self) {}

    /// Fixed facts recorded with a terminal status, e.g. the tone a speaker
    /// check plays. Metadata passed to a mark call takes precedence.
    fn confirmation_metadata(&self, _status: TestStatus) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    /// Metadata key for a value the person confirming can read off the
    /// hardware.
    fn reading_key(&self) -> Option<&str> {
        None
    }

    fn id(&self) -> &str {
        &self.descriptor().id
    }

    fn status(&self) -> TestStatus {
        self.state().status
    }

    fn result(&self) -> Option<&TestResult> {
        self.state().result.as_ref()
    }

    fn reset(&mut self) {
        self.release_resources();
        self.state_mut().reset();
    }

    fn mark_passed(&mut self, metadata: BTreeMap<String, String>) {
        self.settle(TestStatus::Passed, None, metadata);
    }

    fn mark_failed(&mut self, reason: &str, metadata: BTreeMap<String, String>) {
        self.settle(TestStatus::Failed, Some(reason.to_string()), metadata);
    }

    fn mark_skipped(&mut self, reason: &str) {
        self.settle(TestStatus::Skipped, Some(reason.to_string()), BTreeMap::new());
    }

    /// Shared terminal transition: the session is released before the result
    /// is recorded.
    fn settle(
        &mut self,
        status: TestStatus,
        reason: Option<String>,
        metadata: BTreeMap<String, String>,
    ) {
        self.release_resources();
        let mut recorded = self.confirmation_metadata(status);
        recorded.extend(metadata);
        let id = self.descriptor().id.clone();
        self.state_mut().finish(&id, status, reason, recorded);
    }

    fn snapshot(&self) -> TestSnapshot {
        let descriptor = self.descriptor();
        TestSnapshot {
            id: descriptor.id.clone(),
            title: descriptor.title.clone(),
            description: descriptor.description.clone(),
            category: descriptor.category,
            is_supported: self.is_supported(),
            status: self.status(),
            result: self.result().cloned(),
            reading_key: self.reading_key().map(str::to_string),
        }
    }
}
