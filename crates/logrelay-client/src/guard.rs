//! Consecutive-error guard around the send path.

use std::fmt;

/// Why a producer stopped sending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisableReason {
    /// Turned off by the application.
    Manual,
    /// Too many sends failed in a row.
    TooManyErrors { count: u32 },
}

impl fmt::Display for DisableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => f.write_str("disabled manually"),
            Self::TooManyErrors { count } => {
                write!(f, "disabled after {count} consecutive errors")
            }
        }
    }
}

/// Whether a producer is sending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerState {
    Enabled,
    Disabled(DisableReason),
}

/// Counts consecutive send failures and trips to `Disabled` at a threshold.
///
/// A threshold of zero never trips.
#[derive(Debug, Clone)]
pub struct ErrorGuard {
    state: ProducerState,
    consecutive_errors: u32,
    threshold: u32,
}

impl ErrorGuard {
    #[must_use]
    pub const fn new(threshold: u32) -> Self {
        Self {
            state: ProducerState::Enabled,
            consecutive_errors: 0,
            threshold,
        }
    }

    #[must_use]
    pub const fn state(&self) -> ProducerState {
        self.state
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        matches!(self.state, ProducerState::Enabled)
    }

    #[must_use]
    pub const fn error_count(&self) -> u32 {
        self.consecutive_errors
    }

    pub const fn set_threshold(&mut self, threshold: u32) {
        self.threshold = threshold;
    }

    pub const fn enable(&mut self) {
        self.state = ProducerState::Enabled;
    }

    pub const fn disable(&mut self) {
        self.state = ProducerState::Disabled(DisableReason::Manual);
    }

    pub const fn clear_error_count(&mut self) {
        self.consecutive_errors = 0;
    }

    pub const fn record_success(&mut self) {
        self.consecutive_errors = 0;
    }

    /// Count a failure. Returns the new state if this failure tripped it.
    pub const fn record_failure(&mut self) -> Option<ProducerState> {
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);
        if self.threshold > 0
            && self.consecutive_errors >= self.threshold
            && matches!(self.state, ProducerState::Enabled)
        {
            self.state = ProducerState::Disabled(DisableReason::TooManyErrors {
                count: self.consecutive_errors,
            });
            return Some(self.state);
        }
        None
    }
}
