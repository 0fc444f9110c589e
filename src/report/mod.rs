pub mod device;
pub mod export;
pub mod json;
pub mod pdf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::suite::{TestResult, TestStatus};

pub use device::{DeviceInfo, DeviceInfoProvider, HostDeviceInfo};

// ============================================================================
// Report model
// ============================================================================

/// Immutable snapshot of device metadata and the results live at generation
/// time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticReport {
    pub id: Uuid,
    #[serde(with = "iso8601")]
    pub timestamp: DateTime<Utc>,
    pub device_info: DeviceInfo,
    pub results: Vec<TestResult>,
}

/// Pass/fail/skip counts derived from a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ReportSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl DiagnosticReport {
    pub fn new(device_info: DeviceInfo, results: Vec<TestResult>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            device_info,
            results,
        }
    }

    pub fn passed_tests(&self) -> Vec<&TestResult> {
        self.with_status(TestStatus::Passed)
    }

    pub fn failed_tests(&self) -> Vec<&TestResult> {
        self.with_status(TestStatus::Failed)
    }

    pub fn skipped_tests(&self) -> Vec<&TestResult> {
        self.with_status(TestStatus::Skipped)
    }

    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            total: self.results.len(),
            passed: self.passed_tests().len(),
            failed: self.failed_tests().len(),
            skipped: self.skipped_tests().len(),
        }
    }

    fn with_status(&self, status: TestStatus) -> Vec<&TestResult> {
        self.results.iter().filter(|r| r.status == status).collect()
    }
}

/// Serde adapter writing timestamps as ISO-8601 with whole seconds, e.g.
/// `2026-10-19T14:03:07Z`.
pub mod iso8601 {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn format(ts: &DateTime<Utc>) -> String {
        ts.to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    pub fn serialize<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format(ts))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
