//! Tests for command building and agent process control.

use std::path::PathBuf;

use agent_delegate::agents::{Agent, AgentKind, ClaudeAgent, CodexAgent, GeminiAgent, TaskRequest};
use agent_delegate::cli::{exit_details, AgentProcess, CommandSpec, SpawnError};
use agent_delegate::config::{AgentsConfig, ConfigError};

fn request() -> TaskRequest {
    TaskRequest {
        working_dir: Some(PathBuf::from("/work")),
        model: Some("m-1".to_string()),
        resume: Some("sess-9".to_string()),
        extra_args: vec!["--verbose-extra".to_string()],
        ..TaskRequest::new("Fix the bug")
    }
}

#[test]
fn codex_command_ignores_resume() {
    let spec = CodexAgent::new().command(&request());
    assert_eq!(spec.program(), "codex");
    assert_eq!(
        spec.get_args(),
        ["exec", "--json", "Fix the bug", "--model", "m-1", "--verbose-extra"]
    );
    assert_eq!(spec.get_working_dir(), Some(&PathBuf::from("/work")));
}

#[test]
fn claude_command_resumes_session() {
    let spec = ClaudeAgent::new().command(&request());
    assert_eq!(spec.program(), "claude");
    assert_eq!(
        spec.get_args(),
        [
            "-p",
            "--output-format",
            "stream-json",
            "--verbose",
            "Fix the bug",
            "--resume",
            "sess-9",
            "--model",
            "m-1",
            "--verbose-extra"
        ]
    );
}

#[test]
fn gemini_command_resumes_session() {
    let spec = GeminiAgent::new().command(&request());
    assert_eq!(spec.program(), "gemini");
    assert_eq!(
        spec.get_args(),
        [
            "--output-format",
            "stream-json",
            "--prompt",
            "Fix the bug",
            "--resume",
            "sess-9",
            "--model",
            "m-1",
            "--verbose-extra"
        ]
    );
}

#[test]
fn configured_binary_and_args_are_applied() {
    let mut config = AgentsConfig::default();
    config.claude.binary = Some("/opt/claude".to_string());
    config.claude.extra_args = vec!["--max-turns".to_string(), "3".to_string()];

    let agent = AgentKind::Claude.build(&config).unwrap();
    let spec = agent.command(&TaskRequest::new("t"));
    assert_eq!(agent.name(), "claude");
    assert_eq!(spec.program(), "/opt/claude");
    assert!(spec.get_args().ends_with(&["--max-turns".to_string(), "3".to_string()]));
}

#[test]
fn invalid_stderr_pattern_is_a_config_error() {
    let mut config = AgentsConfig::default();
    config.gemini.stderr_ignore = vec!["(unclosed".to_string()];

    let err = AgentKind::Gemini.build(&config).err().unwrap();
    match err {
        ConfigError::InvalidPattern { pattern, .. } => assert_eq!(pattern, "(unclosed"),
        other => panic!("Expected InvalidPattern, got {other:?}"),
    }
}

#[test]
fn configured_patterns_extend_builtin_noise() {
    let mut config = AgentsConfig::default();
    config.gemini.stderr_ignore = vec!["^\\[DEBUG\\]".to_string()];

    let filter = AgentKind::Gemini.build(&config).unwrap().stderr_filter();
    assert!(filter.is_noise("[DEBUG] loading"));
    assert!(filter.is_noise("Loaded cached credentials."));
    assert!(!filter.is_noise("real problem"));
}

#[test]
fn command_display_quotes_arguments() {
    let spec = CommandSpec::new("codex").args(["exec", "fix it; now"]);
    assert_eq!(spec.display(), "codex exec 'fix it; now'");
}

#[test]
fn spawn_missing_binary_reports_not_found() {
    let err = AgentProcess::spawn(&CommandSpec::new("agent-delegate-no-such-binary")).err();
    match err {
        Some(SpawnError::NotFound(program)) => {
            assert_eq!(program, "agent-delegate-no-such-binary");
        }
        other => panic!("Expected NotFound, got {other:?}"),
    }
}

#[cfg(unix)]
#[tokio::test]
async fn terminate_reports_signal_in_exit_details() {
    let mut process = AgentProcess::spawn(&CommandSpec::new("sleep").arg("30")).unwrap();
    process.terminate().unwrap();
    let status = process.wait().await.unwrap();
    assert_eq!(exit_details(status), (None, Some(15)));
}

#[cfg(unix)]
#[tokio::test]
async fn exit_code_reported_in_exit_details() {
    let mut process =
        AgentProcess::spawn(&CommandSpec::new("sh").args(["-c", "exit 3"])).unwrap();
    let status = process.wait().await.unwrap();
    assert_eq!(exit_details(status), (Some(3), None));
}
