use std::fmt;

/// Lifecycle of one fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    Idle,
    Attempting(u32),
    Success,
    ExhaustedRetries,
    FatalAborted,
    Cancelled,
}

/// What happened to the attempt in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Succeeded,
    FailedTransient,
    FailedFatal,
    Cancelled,
}

impl FetchState {
    pub fn begin(self) -> Self {
        match self {
            FetchState::Idle => FetchState::Attempting(1),
            other => other,
        }
    }

    pub fn advance(self, step: Step, max_attempts: u32) -> Self {
        let FetchState::Attempting(n) = self else {
            return self;
        };

        match step {
            Step::Succeeded => FetchState::Success,
            Step::FailedFatal => FetchState::FatalAborted,
            Step::Cancelled => FetchState::Cancelled,
            Step::FailedTransient if n < max_attempts => FetchState::Attempting(n + 1),
            Step::FailedTransient => FetchState::ExhaustedRetries,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, FetchState::Idle | FetchState::Attempting(_))
    }
}

impl fmt::Display for FetchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchState::Idle => f.write_str("idle"),
            FetchState::Attempting(n) => write!(f, "attempting({n})"),
            FetchState::Success => f.write_str("success"),
            FetchState::ExhaustedRetries => f.write_str("exhausted_retries"),
            FetchState::FatalAborted => f.write_str("fatal_aborted"),
            FetchState::Cancelled => f.write_str("cancelled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_starts_first_attempt() {
        assert_eq!(FetchState::Idle.begin(), FetchState::Attempting(1));
        assert_eq!(FetchState::Success.begin(), FetchState::Success);
    }

    #[test]
    fn test_transient_advances_until_ceiling() {
        let mut state = FetchState::Idle.begin();
        state = state.advance(Step::FailedTransient, 3);
        assert_eq!(state, FetchState::Attempting(2));
        state = state.advance(Step::FailedTransient, 3);
        assert_eq!(state, FetchState::Attempting(3));
        state = state.advance(Step::FailedTransient, 3);
        assert_eq!(state, FetchState::ExhaustedRetries);
        assert!(state.is_terminal());
    }

    #[test]
    fn test_single_attempt_ceiling_exhausts_immediately() {
        let state = FetchState::Attempting(1).advance(Step::FailedTransient, 1);
        assert_eq!(state, FetchState::ExhaustedRetries);
    }

    #[test]
    fn test_fatal_and_success_at_any_attempt() {
        for n in 1..=4 {
            assert_eq!(
                FetchState::Attempting(n).advance(Step::FailedFatal, 4),
                FetchState::FatalAborted
            );
            assert_eq!(
                FetchState::Attempting(n).advance(Step::Succeeded, 4),
                FetchState::Success
            );
        }
    }

    #[test]
    fn test_terminal_states_absorb_steps() {
        let terminals = [
            FetchState::Success,
            FetchState::ExhaustedRetries,
            FetchState::FatalAborted,
            FetchState::Cancelled,
        ];
        for state in terminals {
            for step in [
                Step::Succeeded,
                Step::FailedTransient,
                Step::FailedFatal,
                Step::Cancelled,
            ] {
                assert_eq!(state.advance(step, 5), state);
            }
        }
    }

    #[test]
    fn test_idle_ignores_steps() {
        assert_eq!(FetchState::Idle.advance(Step::Succeeded, 3), FetchState::Idle);
        assert!(!FetchState::Idle.is_terminal());
    }

    #[test]
    fn test_display() {
        assert_eq!(FetchState::Attempting(2).to_string(), "attempting(2)");
        assert_eq!(FetchState::ExhaustedRetries.to_string(), "exhausted_retries");
    }
}
