//! Observability subsystem
//!
//! Structured logging and typed engine events.
//!
//! # Principles
//!
//! 1. Observability is read-only: no side effects on engine outcomes
//! 2. Synchronous, no background threads
//! 3. Deterministic output for a given call
//! 4. Events are emitted only for committed work

mod events;
mod logger;

pub use events::EngineEvent;
pub use logger::{Logger, Severity};

/// Log an engine event with fields
pub fn log_event(event: EngineEvent, fields: &[(&str, &str)]) {
    let severity = if event.is_failure() {
        Severity::Error
    } else {
        Severity::Info
    };
    Logger::log(severity, event.as_str(), fields);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event_does_not_panic() {
        log_event(EngineEvent::SaveApplied, &[("model", "tree")]);
        log_event(EngineEvent::JournalAppendFailed, &[("error", "disk full")]);
    }
}
