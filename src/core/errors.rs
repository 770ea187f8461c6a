use crate::core::types::Platform;

/// Failure taxonomy for the automation engine.
///
/// `CircuitOpen` is deliberately its own variant: callers must be able to
/// tell "the operation failed" apart from "the breaker refused to try",
/// because the first is a per-item error and the second aborts the batch.
#[derive(Debug, thiserror::Error)]
pub enum AutomationError {
    /// The site wants a login that never completed. Ends the affected run
    /// segment; never crashes the process.
    #[error("not authenticated on {platform}: {reason}")]
    Authentication { platform: Platform, reason: String },

    /// An adapter was requested for a site the engine does not support.
    /// Programming error — fail fast.
    #[error("unsupported platform '{0}'")]
    UnsupportedPlatform(String),

    /// The circuit breaker is open and refused to attempt the operation.
    #[error("circuit open after {failures} consecutive failures; retry in {remaining_secs}s")]
    CircuitOpen { failures: u32, remaining_secs: u64 },

    #[error("search profile not found: {0}")]
    ProfileNotFound(String),

    /// Everything else: per-listing / per-job extraction and apply failures.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AutomationError {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circuit_open_is_distinguishable() {
        let open = AutomationError::CircuitOpen {
            failures: 3,
            remaining_secs: 42,
        };
        assert!(open.is_circuit_open());

        let other: AutomationError = anyhow::anyhow!("selector miss").into();
        assert!(!other.is_circuit_open());
    }

    #[test]
    fn messages_are_human_readable() {
        let err = AutomationError::Authentication {
            platform: Platform::Linkedin,
            reason: "login wait timed out after 300s".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("linkedin"));
        assert!(msg.contains("timed out"));
    }
}
