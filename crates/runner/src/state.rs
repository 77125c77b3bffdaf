//! Run accounting
//!
//! Tracks per-step, per-routing and per-target completion for diagnostics.
//! Not synchronized: only the pipeline supervisor mutates it, after the
//! workers involved have reported.

use std::collections::HashMap;

use rig_test::TestStepBundle;

use crate::error::RunnerError;

/// Completion record of one pipeline run
///
/// Each map associates a step label (or target id) with the error it
/// finished with; `None` means it completed successfully. An absent key
/// means no result was ever recorded.
#[derive(Debug, Default)]
pub struct State {
    completed_steps: HashMap<String, Option<RunnerError>>,
    completed_routing: HashMap<String, Option<RunnerError>>,
    completed_targets: HashMap<String, Option<String>>,
}

impl State {
    /// Create an empty accounting record
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the result of a step
    pub fn set_step(&mut self, label: &str, err: Option<RunnerError>) {
        self.completed_steps.insert(label.to_string(), err);
    }

    /// Record the result of a routing block
    pub fn set_routing(&mut self, label: &str, err: Option<RunnerError>) {
        self.completed_routing.insert(label.to_string(), err);
    }

    /// Record the completion of a target, with its error if it failed
    pub fn set_target(&mut self, target_id: &str, err: Option<String>) {
        self.completed_targets.insert(target_id.to_string(), err);
    }

    /// Results recorded per step label
    pub fn completed_steps(&self) -> &HashMap<String, Option<RunnerError>> {
        &self.completed_steps
    }

    /// Results recorded per routing block label
    pub fn completed_routing(&self) -> &HashMap<String, Option<RunnerError>> {
        &self.completed_routing
    }

    /// Results recorded per target id
    pub fn completed_targets(&self) -> &HashMap<String, Option<String>> {
        &self.completed_targets
    }

    /// Labels of the bundles that have no step result yet, in pipeline order
    pub fn incomplete_steps(&self, bundles: &[TestStepBundle]) -> Vec<String> {
        bundles
            .iter()
            .filter(|b| !self.completed_steps.contains_key(&b.test_step_label))
            .map(|b| b.test_step_label.clone())
            .collect()
    }

    /// Labels of the bundles that have no routing result yet, in pipeline order
    pub fn incomplete_routing(&self, bundles: &[TestStepBundle]) -> Vec<String> {
        bundles
            .iter()
            .filter(|b| !self.completed_routing.contains_key(&b.test_step_label))
            .map(|b| b.test_step_label.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use rig_test::{StepChannels, StepContext, TestStep, TestStepParameters};

    use super::*;

    struct NopStep;

    #[async_trait]
    impl TestStep for NopStep {
        fn name(&self) -> &'static str {
            "Nop"
        }

        async fn run(
            &self,
            _ctx: StepContext,
            _channels: StepChannels,
            _params: &TestStepParameters,
        ) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn bundles(labels: &[&str]) -> Vec<TestStepBundle> {
        labels
            .iter()
            .map(|l| TestStepBundle::new(Arc::new(NopStep), *l, TestStepParameters::new()))
            .collect()
    }

    #[test]
    fn test_incomplete_steps_in_pipeline_order() {
        let bundles = bundles(&["First", "Second", "Third"]);
        let mut state = State::new();
        state.set_step("Second", None);

        assert_eq!(state.incomplete_steps(&bundles), vec!["First", "Third"]);
        assert_eq!(
            state.incomplete_routing(&bundles),
            vec!["First", "Second", "Third"]
        );
    }

    #[test]
    fn test_target_accounting() {
        let mut state = State::new();
        state.set_target("001", None);
        state.set_target("002", Some("power cycle failed".to_string()));

        assert_eq!(state.completed_targets().len(), 2);
        assert_eq!(state.completed_targets()["001"], None);
        assert_eq!(
            state.completed_targets()["002"].as_deref(),
            Some("power cycle failed")
        );
    }
}
