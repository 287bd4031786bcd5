mod support;

use am_agents::pipeline::PipelineError;
use am_core::types::{AgentExecutePayload, AgentRole, CliTool, DevStage, TaskStatus};
use support::Harness;

fn request(guid: &str, message: &str, tool: Option<CliTool>) -> AgentExecutePayload {
    AgentExecutePayload {
        project_guid: guid.into(),
        agent_role: AgentRole::Dev,
        message: message.into(),
        dev_stage: DevStage::DevelopStory,
        cli_tool: tool,
    }
}

const ENVELOPE_1: &str = r#"{"type":"result","subtype":"success","duration_ms":1200,"duration_api_ms":900,"is_error":false,"result":"implemented story 1.1","session_id":"sid-1"}"#;
const ENVELOPE_2: &str = r#"{"type":"result","subtype":"success","duration_ms":800,"is_error":false,"result":"added tests","session_id":"sid-2"}"#;

#[tokio::test]
async fn second_turn_resumes_conversation() {
    let h = Harness::new();
    h.executor
        .once("claude", 0, ENVELOPE_1, "")
        .once("claude", 0, ENVELOPE_2, "")
        .on("git diff --cached --quiet", 1, "", "");

    let reporter = h.reporter("g-001", Some(AgentRole::Dev), DevStage::DevelopStory);
    let env = h
        .pipeline
        .execute(&request("g-001", "implement 1.1", None), &reporter)
        .await
        .unwrap();
    assert_eq!(env.result, "implemented story 1.1");
    assert_eq!(h.sessions.get("g-001", AgentRole::Dev).await, "sid-1");

    let reporter = h.reporter("g-001", Some(AgentRole::Dev), DevStage::DevelopStory);
    h.pipeline
        .execute(&request("g-001", "add tests", None), &reporter)
        .await
        .unwrap();

    let turns: Vec<String> = h
        .executor
        .lines()
        .into_iter()
        .filter(|l| l.starts_with("claude"))
        .collect();
    assert_eq!(turns.len(), 2);
    assert!(!turns[0].contains("--resume"));
    assert!(turns[1].contains("--resume sid-1"));
    assert_eq!(h.sessions.get("g-001", AgentRole::Dev).await, "sid-2");
}

#[tokio::test]
async fn successful_turn_commits_and_reports_done() {
    let h = Harness::new();
    h.executor
        .on("claude", 0, ENVELOPE_1, "")
        .on("git diff --cached --quiet", 1, "", "");

    let reporter = h.reporter("g-001", Some(AgentRole::Dev), DevStage::DevelopStory);
    h.pipeline
        .execute(&request("g-001", "implement 1.1", None), &reporter)
        .await
        .unwrap();

    let lines = h.executor.lines();
    let git: Vec<&str> = lines
        .iter()
        .map(String::as_str)
        .filter(|l| l.starts_with("git"))
        .collect();
    assert_eq!(
        git,
        vec![
            "git add .",
            "git diff --cached --quiet",
            "git commit -m implemented story 1.1",
            "git push -u origin master",
        ]
    );

    let events = h.drain();
    assert_eq!(events.first().unwrap().status, TaskStatus::InProgress);
    let last = events.last().unwrap();
    assert_eq!(last.status, TaskStatus::Done);
    assert_eq!(last.progress, 100);
    assert_eq!(last.message, "implemented story 1.1");
    assert_eq!(
        events.iter().filter(|e| e.status.is_terminal()).count(),
        1
    );
}

#[tokio::test]
async fn assistant_error_fails_without_commit() {
    let h = Harness::new();
    h.executor.on(
        "claude",
        0,
        r#"{"type":"result","subtype":"error_during_execution","is_error":true,"result":"rate limited","session_id":"sid-9"}"#,
        "",
    );

    let reporter = h.reporter("g-001", Some(AgentRole::Dev), DevStage::DevelopStory);
    let err = h
        .pipeline
        .execute(&request("g-001", "implement", None), &reporter)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Assistant(ref m) if m == "rate limited"));
    assert_eq!(h.executor.count("git"), 0);
    assert_eq!(h.sessions.get("g-001", AgentRole::Dev).await, "");

    let last = h.drain().pop().unwrap();
    assert_eq!(last.status, TaskStatus::Failed);
    assert_eq!(last.message, "rate limited");
}

#[tokio::test]
async fn process_failure_reports_stderr() {
    let h = Harness::new();
    h.executor.on("claude", 1, "", "invalid api key");

    let reporter = h.reporter("g-001", Some(AgentRole::Dev), DevStage::DevelopStory);
    let err = h
        .pipeline
        .execute(&request("g-001", "hello", None), &reporter)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "invalid api key");
    assert_eq!(h.drain().pop().unwrap().status, TaskStatus::Failed);
}

#[tokio::test]
async fn unparseable_output_becomes_plain_result() {
    let h = Harness::new();
    h.executor.on("claude", 0, "Done. Created 3 files.\n", "");

    let env = h
        .pipeline
        .turn(&request("g-001", "hello", None))
        .await
        .unwrap();
    assert!(!env.is_error);
    assert_eq!(env.result, "Done. Created 3 files.");
    assert_eq!(env.session_id, "");
}

#[tokio::test]
async fn explicit_tool_beats_marker_directory() {
    let h = Harness::new();
    h.mkdir("g-001", ".qwen");

    h.pipeline
        .turn(&request("g-001", "hello", None))
        .await
        .unwrap();
    h.pipeline
        .turn(&request("g-001", "hello", Some(CliTool::Gemini)))
        .await
        .unwrap();

    let calls = h.executor.calls();
    assert_eq!(calls[0].line, "qwen -y -p hello");
    assert_eq!(calls[0].dir, "g-001");
    assert!(!calls[0].shell);
    assert!(calls[1].line.starts_with("gemini"));
}

#[tokio::test]
async fn clean_tree_skips_commit() {
    let h = Harness::new();
    h.executor.on("claude", 0, ENVELOPE_1, "");

    let reporter = h.reporter("g-001", Some(AgentRole::Dev), DevStage::DevelopStory);
    h.pipeline
        .execute(&request("g-001", "explain", None), &reporter)
        .await
        .unwrap();
    assert_eq!(h.executor.count("git commit"), 0);
    assert_eq!(h.executor.count("git push"), 0);
    assert_eq!(h.drain().pop().unwrap().status, TaskStatus::Done);
}

#[tokio::test]
async fn push_falls_back_to_main() {
    let h = Harness::new();
    h.executor
        .on("claude", 0, ENVELOPE_1, "")
        .on("git diff --cached --quiet", 1, "", "")
        .on("git push -u origin master", 1, "", "error: src refspec master does not match any");

    let reporter = h.reporter("g-001", Some(AgentRole::Dev), DevStage::DevelopStory);
    h.pipeline
        .execute(&request("g-001", "implement", None), &reporter)
        .await
        .unwrap();
    assert_eq!(h.executor.count("git push -u origin main"), 1);
}

#[tokio::test]
async fn push_failing_on_both_branches_fails_task() {
    let h = Harness::new();
    h.executor
        .on("claude", 0, ENVELOPE_1, "")
        .on("git diff --cached --quiet", 1, "", "")
        .on("git push", 1, "", "remote rejected");

    let reporter = h.reporter("g-001", Some(AgentRole::Dev), DevStage::DevelopStory);
    let err = h
        .pipeline
        .execute(&request("g-001", "implement", None), &reporter)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Vcs(_)));
    assert_eq!(h.executor.count("git push"), 2);
    assert_eq!(h.drain().pop().unwrap().status, TaskStatus::Failed);
}
