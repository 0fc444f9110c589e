pub mod catalogue;
pub mod engine;
pub mod probe;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Data model
// ============================================================================

/// Lifecycle status of a single test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TestStatus {
    #[serde(rename = "Not Started")]
    NotStarted,
    #[serde(rename = "Running")]
    Running,
    #[serde(rename = "PASS")]
    Passed,
    #[serde(rename = "FAIL")]
    Failed,
    #[serde(rename = "SKIPPED")]
    Skipped,
}

impl TestStatus {
    /// Passed, Failed and Skipped are terminal. Only a reset leaves them.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TestStatus::Passed | TestStatus::Failed | TestStatus::Skipped
        )
    }

    /// Tag used in exported documents, e.g. `PASS`.
    pub fn label(self) -> &'static str {
        match self {
            TestStatus::NotStarted => "Not Started",
            TestStatus::Running => "Running",
            TestStatus::Passed => "PASS",
            TestStatus::Failed => "FAIL",
            TestStatus::Skipped => "SKIPPED",
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The six fixed groupings of the catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TestCategory {
    #[serde(rename = "Input & Interaction")]
    InputInteraction,
    #[serde(rename = "Display")]
    Display,
    #[serde(rename = "Camera & Media")]
    CameraMedia,
    #[serde(rename = "Sensors")]
    Sensors,
    #[serde(rename = "Biometrics")]
    Biometrics,
    #[serde(rename = "System & Connectivity")]
    SystemConnectivity,
}

impl TestCategory {
    pub const ALL: [TestCategory; 6] = [
        TestCategory::InputInteraction,
        TestCategory::Display,
        TestCategory::CameraMedia,
        TestCategory::Sensors,
        TestCategory::Biometrics,
        TestCategory::SystemConnectivity,
    ];

    pub fn display_name(self) -> &'static str {
        match self {
            TestCategory::InputInteraction => "Input & Interaction",
            TestCategory::Display => "Display",
            TestCategory::CameraMedia => "Camera & Media",
            TestCategory::Sensors => "Sensors",
            TestCategory::Biometrics => "Biometrics",
            TestCategory::SystemConnectivity => "System & Connectivity",
        }
    }

    /// Short command-line name, e.g. `camera`.
    pub fn slug(self) -> &'static str {
        match self {
            TestCategory::InputInteraction => "input",
            TestCategory::Display => "display",
            TestCategory::CameraMedia => "camera",
            TestCategory::Sensors => "sensors",
            TestCategory::Biometrics => "biometrics",
            TestCategory::SystemConnectivity => "system",
        }
    }
}

impl fmt::Display for TestCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for TestCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_lowercase();
        TestCategory::ALL
            .into_iter()
            .find(|c| c.slug() == needle || c.display_name().to_lowercase() == needle)
            .ok_or_else(|| {
                let known: Vec<&str> = TestCategory::ALL.iter().map(|c| c.slug()).collect();
                format!("unknown category '{}' (expected one of: {})", s, known.join(", "))
            })
    }
}

/// Outcome recorded when a test reaches a terminal status. Never mutated
/// after creation; a new attempt produces a new result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub id: Uuid,
    pub test_id: String,
    pub status: TestStatus,
    #[serde(with = "crate::report::iso8601")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl TestResult {
    pub fn new(
        test_id: impl Into<String>,
        status: TestStatus,
        failure_reason: Option<String>,
        metadata: BTreeMap<String, String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            test_id: test_id.into(),
            status,
            timestamp: Utc::now(),
            failure_reason,
            metadata,
        }
    }
}

/// Read-only view of a registered test, handed to presentation code.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSnapshot {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: TestCategory,
    pub is_supported: bool,
    pub status: TestStatus,
    pub result: Option<TestResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reading_key: Option<String>,
}
