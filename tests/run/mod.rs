//! Run module tests: state folding and end-to-end coordination.

mod state_test;

/// Verify the public run types are exported from the library.
#[test]
fn test_all_run_types_exported() {
    use agent_delegate::run::{
        Notify, ProgressEmitter, RunError, RunLimits, RunSettings, RunState, RunStatus, Throttle,
        DEFAULT_KILL_GRACE, DEFAULT_PIPE_DRAIN, DEFAULT_THROTTLE_INTERVAL,
    };

    let _ = RunState::new("codex", RunLimits::default());
    let _ = Throttle::new(DEFAULT_THROTTLE_INTERVAL);
    let _ = ProgressEmitter::new(DEFAULT_THROTTLE_INTERVAL, None);
    let _ = RunSettings::default();
    let _: fn() -> RunError = || RunError::NoStdout;
    let _ = Notify::Coalesced;
    let _ = RunStatus::Aborted;
    assert!(DEFAULT_KILL_GRACE >= std::time::Duration::from_secs(1));
    assert!(DEFAULT_PIPE_DRAIN >= std::time::Duration::from_secs(1));
}
