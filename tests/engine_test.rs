use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;

use pulse_diagnostics::config::{ABANDONED_REASON, TIMEOUT_REASON, UNSUPPORTED_REASON};
use pulse_diagnostics::error::DiagnosticsError;
use pulse_diagnostics::events::{EngineEvent, EngineEventKind};
use pulse_diagnostics::report::DeviceInfo;
use pulse_diagnostics::suite::catalogue::ManualCheck;
use pulse_diagnostics::suite::engine::{DiagnosticEngine, SharedEngine};
use pulse_diagnostics::suite::probe::{DiagnosticTest, TestDescriptor, TestState};
use pulse_diagnostics::suite::{TestCategory, TestStatus};

// ============================================================================
// Helpers
// ============================================================================

#[derive(Clone, Copy)]
enum Behavior {
    Pass,
    Throw(&'static str),
}

struct ScriptedTest {
    descriptor: TestDescriptor,
    supported: bool,
    state: TestState,
    behavior: Behavior,
    runs: Arc<Mutex<Vec<String>>>,
}

impl ScriptedTest {
    fn boxed(
        id: &str,
        category: TestCategory,
        supported: bool,
        behavior: Behavior,
        runs: &Arc<Mutex<Vec<String>>>,
    ) -> Box<dyn DiagnosticTest> {
        Box::new(Self {
            descriptor: TestDescriptor::new(id, id.to_uppercase(), "scripted", category),
            supported,
            state: TestState::new(),
            behavior,
            runs: runs.clone(),
        })
    }
}

impl DiagnosticTest for ScriptedTest {
    fn descriptor(&self) -> &TestDescriptor {
        &self.descriptor
    }

    fn is_supported(&self) -> bool {
        self.supported
    }

    fn state(&self) -> &TestState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut TestState {
        &mut self.state
    }

    fn run(&mut self) -> anyhow::Result<()> {
        self.runs.lock().unwrap().push(self.descriptor.id.clone());
        match self.behavior {
            Behavior::Pass => {
                let mut meta = BTreeMap::new();
                meta.insert("reading".to_string(), "1.00".to_string());
                self.mark_passed(meta);
                Ok(())
            }
            Behavior::Throw(msg) => Err(anyhow::anyhow!(msg)),
        }
    }
}

fn manual(id: &str, category: TestCategory) -> Box<dyn DiagnosticTest> {
    Box::new(ManualCheck::new(
        TestDescriptor::new(id, id, "confirm by hand", category),
        true,
    ))
}

fn fixed_device() -> DeviceInfo {
    DeviceInfo {
        model: "iPhone".into(),
        system_name: "iOS".into(),
        system_version: "18.0".into(),
        device_name: "Test Phone".into(),
        battery_level: 0.5,
        battery_state: "Unplugged".into(),
        capabilities: BTreeMap::new(),
    }
}

fn engine() -> SharedEngine {
    Arc::new(DiagnosticEngine::new(fixed_device))
}

fn run_log() -> Arc<Mutex<Vec<String>>> {
    Arc::new(Mutex::new(Vec::new()))
}

async fn wait_for<F>(rx: &mut broadcast::Receiver<EngineEvent>, pred: F) -> EngineEventKind
where
    F: Fn(&EngineEventKind) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = rx.recv().await.unwrap();
            if pred(&event.kind) {
                return event.kind;
            }
        }
    })
    .await
    .expect("timed out waiting for engine event")
}

fn awaiting(id: &'static str) -> impl Fn(&EngineEventKind) -> bool {
    move |kind| matches!(kind, EngineEventKind::AwaitingConfirmation { test_id } if test_id == id)
}

// ============================================================================
// Batch runs
// ============================================================================

#[tokio::test]
async fn test_pass_unsupported_and_throwing_scenario() {
    let engine = engine();
    let runs = run_log();
    engine
        .add_test(ScriptedTest::boxed("t1", TestCategory::Sensors, true, Behavior::Pass, &runs))
        .await
        .unwrap();
    engine
        .add_test(ScriptedTest::boxed("t2", TestCategory::Sensors, false, Behavior::Pass, &runs))
        .await
        .unwrap();
    engine
        .add_test(ScriptedTest::boxed(
            "t3",
            TestCategory::Sensors,
            true,
            Behavior::Throw("boom"),
            &runs,
        ))
        .await
        .unwrap();

    engine.run_all_tests().await.unwrap();

    let t1 = engine.test("t1").await.unwrap();
    assert_eq!(t1.status, TestStatus::Passed);

    let t2 = engine.test("t2").await.unwrap();
    assert_eq!(t2.status, TestStatus::Skipped);
    assert_eq!(
        t2.result.unwrap().failure_reason.as_deref(),
        Some(UNSUPPORTED_REASON)
    );

    let t3 = engine.test("t3").await.unwrap();
    assert_eq!(t3.status, TestStatus::Failed);
    assert!(t3.result.unwrap().failure_reason.unwrap().contains("boom"));

    // The unsupported test is never executed.
    assert_eq!(*runs.lock().unwrap(), vec!["t1", "t3"]);

    let report = engine.generate_report().await;
    assert_eq!(report.results.len(), 3);
    let summary = report.summary();
    assert_eq!((summary.passed, summary.failed, summary.skipped), (1, 1, 1));
    assert_eq!(engine.completed_count().await, 3);
    assert!(!engine.is_running().await);
    assert!(engine.current_test().await.is_none());
}

#[tokio::test]
async fn test_run_all_runs_each_once_in_order_after_reset() {
    let engine = engine();
    let runs = run_log();
    for id in ["a", "b", "c", "d"] {
        engine
            .add_test(ScriptedTest::boxed(id, TestCategory::Display, true, Behavior::Pass, &runs))
            .await
            .unwrap();
    }
    // Stale result from an earlier attempt.
    engine.mark_failed("c", "old", BTreeMap::new()).await.unwrap();

    let mut rx = engine.subscribe();
    engine.run_all_tests().await.unwrap();

    assert_eq!(*runs.lock().unwrap(), vec!["a", "b", "c", "d"]);
    assert_eq!(engine.test("c").await.unwrap().status, TestStatus::Passed);

    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        kinds.push(event.kind);
    }
    let reset_at = kinds
        .iter()
        .position(|k| *k == EngineEventKind::AllTestsReset)
        .unwrap();
    let first_start = kinds
        .iter()
        .position(|k| matches!(k, EngineEventKind::TestStarted { .. }))
        .unwrap();
    assert_eq!(kinds[0], EngineEventKind::RunStarted { total: 4 });
    assert!(reset_at < first_start);
    assert_eq!(
        kinds.last(),
        Some(&EngineEventKind::RunCompleted {
            completed: 4,
            total: 4
        })
    );
}

#[tokio::test]
async fn test_run_all_is_sequential_and_flags_running() {
    let engine = engine();
    engine.add_test(manual("first", TestCategory::CameraMedia)).await.unwrap();
    engine.add_test(manual("second", TestCategory::CameraMedia)).await.unwrap();

    let mut rx = engine.subscribe();
    let runner = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.run_all_tests().await })
    };

    wait_for(&mut rx, awaiting("first")).await;
    assert!(engine.is_running().await);
    assert_eq!(engine.current_test().await.unwrap().id, "first");
    // The second test has not started while the first is unconfirmed.
    assert_eq!(
        engine.test("second").await.unwrap().status,
        TestStatus::NotStarted
    );

    engine.mark_passed("first", BTreeMap::new()).await.unwrap();

    wait_for(&mut rx, awaiting("second")).await;
    assert!(engine.is_running().await);
    assert_eq!(engine.completed_count().await, 1);

    engine
        .mark_failed("second", "no sound", BTreeMap::new())
        .await
        .unwrap();

    runner.await.unwrap().unwrap();
    assert!(!engine.is_running().await);
    assert!(engine.current_test().await.is_none());
    assert_eq!(engine.completed_count().await, 2);
}

#[tokio::test]
async fn test_concurrent_runs_are_rejected() {
    let engine = engine();
    engine.add_test(manual("camera", TestCategory::CameraMedia)).await.unwrap();

    let mut rx = engine.subscribe();
    let runner = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.run_test("camera").await })
    };
    wait_for(&mut rx, awaiting("camera")).await;

    assert!(matches!(
        engine.run_all_tests().await,
        Err(DiagnosticsError::RunInProgress)
    ));
    assert!(matches!(
        engine.run_test("camera").await,
        Err(DiagnosticsError::RunInProgress)
    ));

    engine.mark_passed("camera", BTreeMap::new()).await.unwrap();
    assert_eq!(runner.await.unwrap().unwrap(), TestStatus::Passed);
}

// ============================================================================
// Single runs and abandonment
// ============================================================================

#[tokio::test]
async fn test_run_test_waits_for_confirmation() {
    let engine = engine();
    engine.add_test(manual("speaker", TestCategory::CameraMedia)).await.unwrap();

    let mut rx = engine.subscribe();
    let runner = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.run_test("speaker").await })
    };

    wait_for(&mut rx, awaiting("speaker")).await;
    assert_eq!(engine.test("speaker").await.unwrap().status, TestStatus::Running);

    let mut meta = BTreeMap::new();
    meta.insert("volume".to_string(), "0.8".to_string());
    engine.mark_passed("speaker", meta).await.unwrap();

    assert_eq!(runner.await.unwrap().unwrap(), TestStatus::Passed);
    let result = engine.test("speaker").await.unwrap().result.unwrap();
    assert_eq!(result.metadata.get("volume").map(String::as_str), Some("0.8"));
    assert!(result.failure_reason.is_none());
}

#[tokio::test]
async fn test_confirmation_timeout_skips() {
    let engine: SharedEngine = Arc::new(
        DiagnosticEngine::new(fixed_device).with_confirm_timeout(Some(Duration::from_millis(50))),
    );
    engine.add_test(manual("haptics", TestCategory::InputInteraction)).await.unwrap();

    let status = engine.run_test("haptics").await.unwrap();
    assert_eq!(status, TestStatus::Skipped);
    let result = engine.test("haptics").await.unwrap().result.unwrap();
    assert_eq!(result.failure_reason.as_deref(), Some(TIMEOUT_REASON));
}

#[tokio::test]
async fn test_abandon_current_test() {
    let engine = engine();
    engine.add_test(manual("gps", TestCategory::SystemConnectivity)).await.unwrap();

    let mut rx = engine.subscribe();
    let runner = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.run_test("gps").await })
    };
    wait_for(&mut rx, awaiting("gps")).await;

    assert_eq!(engine.abandon_current_test().await.as_deref(), Some("gps"));
    assert_eq!(runner.await.unwrap().unwrap(), TestStatus::Skipped);
    let result = engine.test("gps").await.unwrap().result.unwrap();
    assert_eq!(result.failure_reason.as_deref(), Some(ABANDONED_REASON));

    // Nothing left to abandon once settled.
    assert!(engine.abandon_current_test().await.is_none());
}

#[tokio::test]
async fn test_cancel_run_stops_the_batch() {
    let engine = engine();
    for id in ["microphone", "speaker", "camera"] {
        engine.add_test(manual(id, TestCategory::CameraMedia)).await.unwrap();
    }

    let mut rx = engine.subscribe();
    let runner = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.run_all_tests().await })
    };
    wait_for(&mut rx, awaiting("microphone")).await;

    assert_eq!(engine.cancel_run().await.as_deref(), Some("microphone"));
    // The run has finished by the time cancel_run returns.
    assert!(!engine.is_running().await);
    assert!(engine.current_test().await.is_none());
    runner.await.unwrap().unwrap();

    let microphone = engine.test("microphone").await.unwrap();
    assert_eq!(microphone.status, TestStatus::Skipped);
    assert_eq!(
        microphone.result.unwrap().failure_reason.as_deref(),
        Some(ABANDONED_REASON)
    );
    for id in ["speaker", "camera"] {
        assert_eq!(engine.test(id).await.unwrap().status, TestStatus::NotStarted);
    }
    assert_eq!(engine.generate_report().await.results.len(), 1);

    // A later run starts from scratch.
    let runner = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.run_all_tests().await })
    };
    wait_for(&mut rx, awaiting("microphone")).await;
    engine.cancel_run().await;
    runner.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_cancel_without_run_is_harmless() {
    let engine = engine();
    engine.add_test(manual("speaker", TestCategory::CameraMedia)).await.unwrap();
    assert!(engine.cancel_run().await.is_none());
    assert_eq!(
        engine.test("speaker").await.unwrap().status,
        TestStatus::NotStarted
    );
}

#[tokio::test]
async fn test_reset_while_waiting_ends_the_wait() {
    let engine = engine();
    engine.add_test(manual("proximity", TestCategory::Sensors)).await.unwrap();

    let mut rx = engine.subscribe();
    let runner = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.run_test("proximity").await })
    };
    wait_for(&mut rx, awaiting("proximity")).await;

    engine.reset_test("proximity").await.unwrap();
    assert_eq!(runner.await.unwrap().unwrap(), TestStatus::NotStarted);

    let snapshot = engine.test("proximity").await.unwrap();
    assert_eq!(snapshot.status, TestStatus::NotStarted);
    assert!(snapshot.result.is_none());
    assert!(engine.current_test().await.is_none());
}

// ============================================================================
// Registration, queries and reports
// ============================================================================

#[tokio::test]
async fn test_duplicate_and_unknown_ids() {
    let engine = engine();
    engine.add_test(manual("camera", TestCategory::CameraMedia)).await.unwrap();

    assert!(matches!(
        engine.add_test(manual("camera", TestCategory::CameraMedia)).await,
        Err(DiagnosticsError::DuplicateTest(id)) if id == "camera"
    ));
    assert!(matches!(
        engine.run_test("nfc").await,
        Err(DiagnosticsError::UnknownTest(id)) if id == "nfc"
    ));
    assert!(engine.mark_passed("nfc", BTreeMap::new()).await.is_err());
    assert_eq!(engine.tests().await.len(), 1);
}

#[tokio::test]
async fn test_tests_by_category_keeps_registration_order() {
    let engine = engine();
    engine.add_test(manual("accelerometer", TestCategory::Sensors)).await.unwrap();
    engine.add_test(manual("camera", TestCategory::CameraMedia)).await.unwrap();
    engine.add_test(manual("gyroscope", TestCategory::Sensors)).await.unwrap();
    engine.add_test(manual("compass", TestCategory::Sensors)).await.unwrap();

    let ids: Vec<String> = engine
        .tests_by_category(TestCategory::Sensors)
        .await
        .into_iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(ids, vec!["accelerometer", "gyroscope", "compass"]);
    assert!(engine.tests_by_category(TestCategory::Biometrics).await.is_empty());
}

#[tokio::test]
async fn test_report_is_a_snapshot_of_current_results() {
    let engine = engine();
    let runs = run_log();
    engine
        .add_test(ScriptedTest::boxed("battery", TestCategory::SystemConnectivity, true, Behavior::Pass, &runs))
        .await
        .unwrap();
    engine
        .add_test(ScriptedTest::boxed("thermal", TestCategory::SystemConnectivity, false, Behavior::Pass, &runs))
        .await
        .unwrap();
    engine.add_test(manual("network", TestCategory::SystemConnectivity)).await.unwrap();

    engine.run_test("battery").await.unwrap();
    engine.run_test("thermal").await.unwrap();

    let first = engine.generate_report().await;
    let second = engine.generate_report().await;

    // "network" has no result yet and is left out.
    assert_eq!(first.results.len(), 2);
    assert_eq!(first.results, second.results);
    assert_eq!(first.summary(), second.summary());
    assert_ne!(first.id, second.id);

    assert_eq!(first.device_info.model, "iPhone");
    assert_eq!(first.device_info.capabilities.get("battery"), Some(&true));
    assert_eq!(first.device_info.capabilities.get("thermal"), Some(&false));
    assert_eq!(first.device_info.capabilities.len(), 3);

    // Later mutations do not touch an existing report.
    engine.reset_all_tests().await;
    assert_eq!(first.results.len(), 2);
    assert!(engine.generate_report().await.results.is_empty());
}

#[tokio::test]
async fn test_reset_all_is_idempotent() {
    let engine = engine();
    engine.add_test(manual("touchscreen", TestCategory::InputInteraction)).await.unwrap();
    engine
        .mark_skipped("touchscreen", "later")
        .await
        .unwrap();

    engine.reset_all_tests().await;
    engine.reset_all_tests().await;

    let snapshot = engine.test("touchscreen").await.unwrap();
    assert_eq!(snapshot.status, TestStatus::NotStarted);
    assert!(snapshot.result.is_none());
    assert_eq!(engine.completed_count().await, 0);
}
