//! Tests and step bundles

use std::fmt;
use std::sync::Arc;

use crate::param::TestStepParameters;
use crate::step::TestStep;

/// A step instance paired with its pipeline label and parameters
///
/// The label is the stable name used in logs, events and accounting; it
/// must be unique within a pipeline. An empty label defaults to the step
/// implementation's name.
#[derive(Clone)]
pub struct TestStepBundle {
    /// The step implementation
    pub test_step: Arc<dyn TestStep>,

    /// Label of the step within the pipeline
    pub test_step_label: String,

    /// Step parameters
    pub parameters: TestStepParameters,
}

impl TestStepBundle {
    /// Bundle a step with a label and parameters
    ///
    /// An empty `label` falls back to the step's `name()`.
    pub fn new(
        test_step: Arc<dyn TestStep>,
        label: impl Into<String>,
        parameters: TestStepParameters,
    ) -> Self {
        let mut test_step_label = label.into();
        if test_step_label.is_empty() {
            test_step_label = test_step.name().to_string();
        }
        Self {
            test_step,
            test_step_label,
            parameters,
        }
    }
}

impl fmt::Debug for TestStepBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestStepBundle")
            .field("step", &self.test_step.name())
            .field("label", &self.test_step_label)
            .finish()
    }
}

/// An ordered list of step bundles forming one test
#[derive(Debug, Clone, Default)]
pub struct Test {
    /// Name of the test
    pub name: String,

    /// The step bundles, in pipeline order
    pub test_steps_bundles: Vec<TestStepBundle>,
}

impl Test {
    /// Create a test from its name and step bundles
    pub fn new(name: impl Into<String>, test_steps_bundles: Vec<TestStepBundle>) -> Self {
        Self {
            name: name.into(),
            test_steps_bundles,
        }
    }
}
