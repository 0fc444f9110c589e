use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use super::probe::{DiagnosticTest, TestDescriptor, TestState};
use super::{TestCategory, TestStatus};

/// Definition of a single standard check.
pub struct CheckDefinition {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub category: TestCategory,
    /// Recorded with a pass.
    pub passed_metadata: &'static [(&'static str, &'static str)],
    /// Recorded with a failure.
    pub failed_metadata: &'static [(&'static str, &'static str)],
    /// Metadata key for a value the person can read off while confirming.
    pub reading: Option<&'static str>,
}

/// The standard checks, in registration order.
pub static STANDARD_CHECKS: &[CheckDefinition] = &[
    // Input
    CheckDefinition {
        id: "touchscreen",
        title: "Touchscreen",
        description: "Tap all grid cells to verify touch registration",
        category: TestCategory::InputInteraction,
        passed_metadata: &[],
        failed_metadata: &[],
        reading: None,
    },
    CheckDefinition {
        id: "multitouch",
        title: "Multi-Touch",
        description: "Touch with 2+ fingers simultaneously",
        category: TestCategory::InputInteraction,
        passed_metadata: &[],
        failed_metadata: &[],
        reading: Some("max_simultaneous"),
    },
    CheckDefinition {
        id: "haptics",
        title: "Haptics",
        description: "Feel vibration patterns",
        category: TestCategory::InputInteraction,
        passed_metadata: &[("patterns_played", "1")],
        failed_metadata: &[],
        reading: None,
    },
    CheckDefinition {
        id: "volume-buttons",
        title: "Volume Buttons",
        description: "Test volume up and down buttons",
        category: TestCategory::InputInteraction,
        passed_metadata: &[("volumeDownPressed", "true"), ("volumeUpPressed", "true")],
        failed_metadata: &[],
        reading: None,
    },
    CheckDefinition {
        id: "power-button",
        title: "Power Button",
        description: "Test power button functionality",
        category: TestCategory::InputInteraction,
        passed_metadata: &[],
        failed_metadata: &[],
        reading: None,
    },
    // Display
    CheckDefinition {
        id: "dead-pixel",
        title: "Dead Pixel Test",
        description: "Check for dead or stuck pixels",
        category: TestCategory::Display,
        passed_metadata: &[("deadPixelsFound", "false")],
        failed_metadata: &[("deadPixelsFound", "true")],
        reading: None,
    },
    // Camera & media
    CheckDefinition {
        id: "camera",
        title: "Camera",
        description: "Test front and rear cameras with flash",
        category: TestCategory::CameraMedia,
        passed_metadata: &[],
        failed_metadata: &[],
        reading: Some("cameras_tested"),
    },
    CheckDefinition {
        id: "microphone",
        title: "Microphone",
        description: "Speak to see audio waveform",
        category: TestCategory::CameraMedia,
        passed_metadata: &[],
        failed_metadata: &[],
        reading: Some("max_level"),
    },
    CheckDefinition {
        id: "speaker",
        title: "Speaker",
        description: "Play test tone",
        category: TestCategory::CameraMedia,
        passed_metadata: &[("tone", "440Hz")],
        failed_metadata: &[],
        reading: None,
    },
    // Sensors
    CheckDefinition {
        id: "accelerometer",
        title: "Accelerometer",
        description: "Move device to see XYZ changes",
        category: TestCategory::Sensors,
        passed_metadata: &[],
        failed_metadata: &[],
        reading: None,
    },
    CheckDefinition {
        id: "gyroscope",
        title: "Gyroscope",
        description: "Rotate device to track orientation",
        category: TestCategory::Sensors,
        passed_metadata: &[],
        failed_metadata: &[],
        reading: None,
    },
    CheckDefinition {
        id: "magnetometer",
        title: "Compass",
        description: "Rotate to track heading changes",
        category: TestCategory::Sensors,
        passed_metadata: &[],
        failed_metadata: &[],
        reading: None,
    },
    CheckDefinition {
        id: "proximity",
        title: "Proximity Sensor",
        description: "Cover sensor near camera",
        category: TestCategory::Sensors,
        passed_metadata: &[],
        failed_metadata: &[],
        reading: Some("state"),
    },
    CheckDefinition {
        id: "ambient_light",
        title: "Ambient Light",
        description: "Cover/uncover device to see brightness change",
        category: TestCategory::Sensors,
        passed_metadata: &[],
        failed_metadata: &[],
        reading: Some("brightness"),
    },
    // Biometrics
    CheckDefinition {
        id: "biometrics",
        title: "Biometrics",
        description: "Test Face ID or Touch ID",
        category: TestCategory::Biometrics,
        passed_metadata: &[],
        failed_metadata: &[],
        reading: Some("type"),
    },
    // System
    CheckDefinition {
        id: "battery",
        title: "Battery",
        description: "Check battery level and state",
        category: TestCategory::SystemConnectivity,
        passed_metadata: &[],
        failed_metadata: &[],
        reading: Some("level"),
    },
    CheckDefinition {
        id: "network",
        title: "Network",
        description: "Check Wi-Fi/Cellular connectivity",
        category: TestCategory::SystemConnectivity,
        passed_metadata: &[],
        failed_metadata: &[],
        reading: Some("type"),
    },
    CheckDefinition {
        id: "thermal",
        title: "Thermal State",
        description: "Check device temperature state",
        category: TestCategory::SystemConnectivity,
        passed_metadata: &[],
        failed_metadata: &[],
        reading: Some("state"),
    },
    CheckDefinition {
        id: "gps",
        title: "GPS Test",
        description: "Test location services and GPS accuracy",
        category: TestCategory::SystemConnectivity,
        passed_metadata: &[],
        failed_metadata: &[],
        reading: Some("accuracy"),
    },
    CheckDefinition {
        id: "bluetooth",
        title: "Bluetooth Test",
        description: "Test Bluetooth hardware and device scanning",
        category: TestCategory::SystemConnectivity,
        passed_metadata: &[],
        failed_metadata: &[],
        reading: Some("devicesFound"),
    },
];

/// Which hardware the current device lacks. Everything not listed is assumed
/// present.
#[derive(Debug, Clone, Default)]
pub struct HardwareProfile {
    unavailable: BTreeSet<String>,
}

impl HardwareProfile {
    pub fn new<I, S>(unavailable: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            unavailable: unavailable.into_iter().map(Into::into).collect(),
        }
    }

    pub fn supports(&self, check_id: &str) -> bool {
        !self.unavailable.contains(check_id)
    }
}

/// A check the user confirms by hand. `run` opens the session and the test
/// stays Running until a terminal mark arrives, which closes it again.
/// Unsupported checks are skipped by the engine and never run.
pub struct ManualCheck {
    descriptor: TestDescriptor,
    supported: bool,
    state: TestState,
    session_open: bool,
    passed_metadata: &'static [(&'static str, &'static str)],
    failed_metadata: &'static [(&'static str, &'static str)],
    reading: Option<&'static str>,
}

impl ManualCheck {
    pub fn new(descriptor: TestDescriptor, supported: bool) -> Self {
        Self {
            descriptor,
            supported,
            state: TestState::new(),
            session_open: false,
            passed_metadata: &[],
            failed_metadata: &[],
            reading: None,
        }
    }

    pub fn from_definition(def: &CheckDefinition, profile: &HardwareProfile) -> Self {
        Self {
            passed_metadata: def.passed_metadata,
            failed_metadata: def.failed_metadata,
            reading: def.reading,
            ..Self::new(
                TestDescriptor::new(def.id, def.title, def.description, def.category),
                profile.supports(def.id),
            )
        }
    }

    pub fn session_open(&self) -> bool {
        self.session_open
    }
}

impl DiagnosticTest for ManualCheck {
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
        debug!("Opening session for {}", self.descriptor.id);
        self.session_open = true;
        Ok(())
    }

    fn release_resources(&mut self) {
        if self.session_open {
            debug!("Releasing session for {}", self.descriptor.id);
            self.session_open = false;
        }
    }

    fn confirmation_metadata(&self, status: TestStatus) -> BTreeMap<String, String> {
        let pairs: &[(&str, &str)] = match status {
            TestStatus::Passed => self.passed_metadata,
            TestStatus::Failed => self.failed_metadata,
            _ => &[],
        };
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn reading_key(&self) -> Option<&str> {
        self.reading
    }
}

/// Build the standard suite, optionally restricted to one category.
pub fn standard_suite(
    profile: &HardwareProfile,
    category: Option<TestCategory>,
) -> Vec<Box<dyn DiagnosticTest>> {
    STANDARD_CHECKS
        .iter()
        .filter(|def| category.map_or(true, |c| def.category == c))
        .map(|def| Box::new(ManualCheck::from_definition(def, profile)) as Box<dyn DiagnosticTest>)
        .collect()
}
