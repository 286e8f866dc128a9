//! Threshold state tracking for a single (entity, metric) series

use super::rules::ThresholdRule;
use crate::models::LogLevel;
use std::fmt;

/// Health state of one metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetricState {
    #[default]
    Normal,
    Warning,
    Error,
    Recovery,
}

impl MetricState {
    /// Log level used when entering this state
    pub fn level(&self) -> LogLevel {
        match self {
            MetricState::Error => LogLevel::Error,
            MetricState::Warning => LogLevel::Warning,
            MetricState::Recovery | MetricState::Normal => LogLevel::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricState::Normal => "normal",
            MetricState::Warning => "warning",
            MetricState::Error => "error",
            MetricState::Recovery => "recovery",
        }
    }

    fn is_degraded(&self) -> bool {
        matches!(self, MetricState::Warning | MetricState::Error)
    }
}

impl fmt::Display for MetricState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A change of state caused by one observed value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub from: MetricState,
    pub to: MetricState,
    pub value: f64,
}

/// Tracks the threshold state of one series, starting at `Normal`
#[derive(Debug, Clone)]
pub struct LogStateMachine {
    rule: ThresholdRule,
    state: MetricState,
}

impl LogStateMachine {
    pub fn new(rule: ThresholdRule) -> Self {
        Self {
            rule,
            state: MetricState::Normal,
        }
    }

    pub fn rule(&self) -> &ThresholdRule {
        &self.rule
    }

    pub fn state(&self) -> MetricState {
        self.state
    }

    /// Feed one value, returning the transition if the state changed
    pub fn observe(&mut self, value: f64) -> Option<Transition> {
        let next = self.next_state(value);
        if next == self.state {
            return None;
        }

        let transition = Transition {
            from: self.state,
            to: next,
            value,
        };
        self.state = next;
        Some(transition)
    }

    fn next_state(&self, value: f64) -> MetricState {
        let rule = &self.rule;

        let (at_error, at_warning, recovered) = if rule.inverse {
            (
                value <= rule.error,
                value <= rule.warning,
                value >= rule.recovery,
            )
        } else {
            (
                value >= rule.error,
                value >= rule.warning,
                value <= rule.recovery,
            )
        };

        if at_error {
            MetricState::Error
        } else if at_warning {
            MetricState::Warning
        } else if self.state.is_degraded() && recovered {
            MetricState::Recovery
        } else {
            self.state
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cpu_rule() -> ThresholdRule {
        ThresholdRule::new("cpu_usage", 80.0, 95.0, 70.0)
    }

    fn run(machine: &mut LogStateMachine, values: &[f64]) -> Vec<Transition> {
        values.iter().filter_map(|v| machine.observe(*v)).collect()
    }

    #[test]
    fn test_direct_jump_to_error() {
        let mut machine = LogStateMachine::new(cpu_rule());
        let transitions = run(&mut machine, &[50.0, 96.0]);

        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].from, MetricState::Normal);
        assert_eq!(transitions[0].to, MetricState::Error);
        assert_eq!(transitions[0].value, 96.0);
    }

    #[test]
    fn test_constant_below_warning_never_transitions() {
        let mut machine = LogStateMachine::new(cpu_rule());
        let transitions = run(&mut machine, &[79.9; 200]);

        assert!(transitions.is_empty());
        assert_eq!(machine.state(), MetricState::Normal);
    }

    #[test]
    fn test_full_cycle() {
        let mut machine = LogStateMachine::new(cpu_rule());
        let values = [60.0, 85.0, 97.0, 90.0, 75.0, 65.0, 50.0];
        let states: Vec<MetricState> = run(&mut machine, &values)
            .into_iter()
            .map(|t| t.to)
            .collect();

        assert_eq!(
            states,
            vec![
                MetricState::Warning,
                MetricState::Error,
                MetricState::Warning,
                MetricState::Recovery,
            ]
        );
        // Recovery persists until thresholds are crossed again
        assert_eq!(machine.state(), MetricState::Recovery);
    }

    #[test]
    fn test_between_recovery_and_warning_holds_state() {
        let mut machine = LogStateMachine::new(cpu_rule());
        run(&mut machine, &[85.0]);
        assert!(machine.observe(75.0).is_none());
        assert_eq!(machine.state(), MetricState::Warning);
    }

    #[test]
    fn test_inverse_metric() {
        let rule = ThresholdRule::new("success_rate", 50.0, 30.0, 70.0).inverse();
        let mut machine = LogStateMachine::new(rule);

        let transitions = run(&mut machine, &[90.0, 40.0, 20.0, 75.0]);
        let path: Vec<(MetricState, MetricState)> =
            transitions.iter().map(|t| (t.from, t.to)).collect();

        assert_eq!(
            path,
            vec![
                (MetricState::Normal, MetricState::Warning),
                (MetricState::Warning, MetricState::Error),
                (MetricState::Error, MetricState::Recovery),
            ]
        );
    }

    #[test]
    fn test_recovery_requires_prior_degradation() {
        let mut machine = LogStateMachine::new(cpu_rule());
        assert!(machine.observe(10.0).is_none());
        assert_eq!(machine.state(), MetricState::Normal);
    }

    #[test]
    fn test_levels() {
        assert_eq!(MetricState::Error.level(), LogLevel::Error);
        assert_eq!(MetricState::Warning.level(), LogLevel::Warning);
        assert_eq!(MetricState::Recovery.level(), LogLevel::Info);
        assert_eq!(MetricState::Normal.level(), LogLevel::Info);
    }
}
