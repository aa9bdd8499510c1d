use serde::{Deserialize, Serialize};
use tracing::warn;

use super::aggregator::CellMismatch;
use super::error::ScenarioError;

/// Node of the test description tree: a suite with one child per scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Description {
    display_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<Description>,
    suite: bool,
}

impl Description {
    pub fn suite(display_name: &str) -> Self {
        Self {
            display_name: display_name.to_string(),
            children: Vec::new(),
            suite: true,
        }
    }

    pub fn test(display_name: &str) -> Self {
        Self {
            display_name: display_name.to_string(),
            children: Vec::new(),
            suite: false,
        }
    }

    pub fn add_child(&mut self, child: Description) {
        self.children.push(child);
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn children(&self) -> &[Description] {
        &self.children
    }

    pub fn is_suite(&self) -> bool {
        self.suite
    }

    /// Number of leaf tests below this node.
    pub fn test_count(&self) -> usize {
        if self.suite {
            self.children.iter().map(Description::test_count).sum()
        } else {
            1
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Assertion,
    Extraction,
    Execution,
    Unexpected,
}

/// A reported scenario failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub description: String,
    pub kind: FailureKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mismatches: Vec<CellMismatch>,
}

impl Failure {
    pub fn from_error(description: &Description, error: &ScenarioError) -> Self {
        let (kind, mismatches) = match error {
            ScenarioError::Assertion(failure) => {
                (FailureKind::Assertion, failure.mismatches.clone())
            }
            ScenarioError::Extraction(_) => (FailureKind::Extraction, Vec::new()),
            ScenarioError::Execution(_) => (FailureKind::Execution, Vec::new()),
            ScenarioError::UnexpectedInternal { .. } => (FailureKind::Unexpected, Vec::new()),
        };
        Self {
            description: description.display_name().to_string(),
            kind,
            message: error.to_string(),
            mismatches,
        }
    }
}

/// Consumer of the test execution protocol.
#[mockall::automock]
pub trait RunNotifier: Send {
    fn test_started(&mut self, description: &Description);
    fn add_failure(&mut self, failure: Failure);
    fn test_finished(&mut self, description: &Description);
}

/// Notifier scoped to one scenario: one start, at most one failure, one
/// finish.
pub struct EachTestNotifier<'a> {
    notifier: &'a mut dyn RunNotifier,
    description: Description,
    failure: Option<Failure>,
}

impl<'a> EachTestNotifier<'a> {
    pub fn new(notifier: &'a mut dyn RunNotifier, description: Description) -> Self {
        Self {
            notifier,
            description,
            failure: None,
        }
    }

    pub fn description(&self) -> &Description {
        &self.description
    }

    pub fn fire_test_started(&mut self) {
        self.notifier.test_started(&self.description);
    }

    /// Reports `error` unless this scenario already failed.
    pub fn add_failure(&mut self, error: &ScenarioError) {
        if let Some(previous) = &self.failure {
            warn!(
                "ignoring second failure for '{}' (already reported: {})",
                self.description.display_name(),
                previous.kind
            );
            return;
        }
        let failure = Failure::from_error(&self.description, error);
        self.notifier.add_failure(failure.clone());
        self.failure = Some(failure);
    }

    pub fn has_failed(&self) -> bool {
        self.failure.is_some()
    }

    /// Sends the finish event and returns the failure reported, if any.
    pub fn fire_test_finished(self) -> Option<Failure> {
        self.notifier.test_finished(&self.description);
        self.failure
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NotificationEvent {
    Started(String),
    Failure(Failure),
    Finished(String),
}

/// Keeps every notification in order.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Vec<NotificationEvent>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[NotificationEvent] {
        &self.events
    }

    pub fn failures(&self) -> Vec<&Failure> {
        self.events
            .iter()
            .filter_map(|event| match event {
                NotificationEvent::Failure(failure) => Some(failure),
                _ => None,
            })
            .collect()
    }

    pub fn started_count(&self) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event, NotificationEvent::Started(_)))
            .count()
    }

    pub fn finished_count(&self) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event, NotificationEvent::Finished(_)))
            .count()
    }

    pub fn into_failures(self) -> Vec<Failure> {
        self.events
            .into_iter()
            .filter_map(|event| match event {
                NotificationEvent::Failure(failure) => Some(failure),
                _ => None,
            })
            .collect()
    }
}

impl RunNotifier for RecordingNotifier {
    fn test_started(&mut self, description: &Description) {
        self.events
            .push(NotificationEvent::Started(description.display_name().to_string()));
    }

    fn add_failure(&mut self, failure: Failure) {
        self.events.push(NotificationEvent::Failure(failure));
    }

    fn test_finished(&mut self, description: &Description) {
        self.events
            .push(NotificationEvent::Finished(description.display_name().to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_description_tree() {
        let mut suite = Description::suite("suite");
        suite.add_child(Description::test("first"));
        suite.add_child(Description::test("second"));
        assert_eq!(suite.test_count(), 2);
        assert_eq!(suite.children()[1].display_name(), "second");
        assert!(!suite.children()[0].is_suite());
    }

    #[test]
    fn test_each_test_notifier_reports_single_failure() {
        let mut recorder = RecordingNotifier::new();
        let mut each = EachTestNotifier::new(&mut recorder, Description::test("s1"));
        each.fire_test_started();
        each.add_failure(&ScenarioError::unexpected("s1", "boom"));
        each.add_failure(&ScenarioError::unexpected("s1", "again"));
        let failure = each.fire_test_finished();

        assert_eq!(failure.map(|f| f.kind), Some(FailureKind::Unexpected));
        assert_eq!(recorder.events().len(), 3);
        assert_eq!(recorder.failures().len(), 1);
        assert!(recorder.failures()[0].message.contains("boom"));
        assert_eq!(recorder.events()[2], NotificationEvent::Finished("s1".to_string()));
    }
}
