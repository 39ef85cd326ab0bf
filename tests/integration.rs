use std::sync::Arc;
use std::time::Duration;

use roost_core::agent::Agent;
use roost_core::channel::ChannelMessage;
use roost_core::confirm::ConfirmationGate;
use roost_core::context::{ConversationStore, InMemoryConversationStore};
use roost_core::mock::{ApprovalBehavior, ChannelEvent, MockChannel, MockExecutor};
use roost_core::prompt::Mode;
use roost_llm::mock::MockProvider;
use roost_llm::{Role, StreamChunk, ToolUseRequest};
use roost_tools::{AuditAction, AuditLogger, Tier, extractor};
use serde_json::json;

fn user(text: &str) -> ChannelMessage {
    ChannelMessage::new("alice", text)
}

fn call(command: &str) -> ToolUseRequest {
    ToolUseRequest {
        name: "execute_command".into(),
        arguments: json!({"command": command, "reason": "requested"}),
    }
}

#[tokio::test]
async fn chained_destructive_command_never_runs() {
    let provider = MockProvider::with_scripts(vec![vec![StreamChunk::tools(vec![call(
        "rm -rf important; ls",
    )])]]);
    let channel = MockChannel::default();
    let executor = MockExecutor::new("should not run");
    let audit = Arc::new(AuditLogger::in_memory());

    let mut agent = Agent::new(provider.clone(), channel.clone(), executor.clone())
        .with_audit(audit.clone());
    agent.process_message(user("delete everything")).await.unwrap();

    assert!(executor.executed().is_empty());
    assert_eq!(provider.call_count(), 1, "no summary call after a block");

    let notices: Vec<_> = channel
        .visible()
        .into_iter()
        .filter(|t| t.starts_with("🚫 Blocked"))
        .collect();
    assert_eq!(notices.len(), 1);
    assert!(notices[0].contains("rm -rf important; ls"));

    let entries = audit.entries();
    let blocked: Vec<_> = entries
        .iter()
        .filter(|e| e.action == AuditAction::CommandBlocked)
        .collect();
    assert_eq!(blocked.len(), 1);
    assert_eq!(blocked[0].user_id, "alice");
    assert!(entries.iter().all(|e| e.action != AuditAction::CommandExec));
}

#[tokio::test]
async fn approved_mkdir_records_one_tool_pair_and_one_summary() {
    let provider = MockProvider::with_scripts(vec![
        vec![StreamChunk::tools(vec![call("mkdir foo")])],
        vec![StreamChunk::text("Created the folder foo.")],
    ]);
    let channel = MockChannel::default().with_approvals(vec![ApprovalBehavior::Approve]);
    let executor = MockExecutor::new("");
    let store = Arc::new(InMemoryConversationStore::default());

    let mut agent = Agent::new(provider.clone(), channel.clone(), executor.clone())
        .with_store(store.clone());
    agent.process_message(user("make a folder foo")).await.unwrap();

    let ran = executor.executed();
    assert_eq!(ran.len(), 1);
    assert_eq!(ran[0].command, "mkdir foo");
    assert!(ran[0].confirmed);

    let history = store.messages("alice");
    let tool_calls = history.iter().filter(|m| !m.tool_calls.is_empty()).count();
    let tool_results = history.iter().filter(|m| m.role == Role::Tool).count();
    assert_eq!((tool_calls, tool_results), (1, 1));
    assert_eq!(history.last().unwrap().content, "Created the folder foo.");

    assert_eq!(provider.call_count(), 2);
    assert_eq!(channel.visible(), vec!["Created the folder foo."]);
}

#[tokio::test(start_paused = true)]
async fn unanswered_confirmation_times_out_and_is_audited() {
    let provider = MockProvider::with_scripts(vec![vec![StreamChunk::tools(vec![call(
        "pip install requests",
    )])]]);
    let channel = MockChannel::default().with_approvals(vec![ApprovalBehavior::Ignore]);
    let executor = MockExecutor::new("");
    let audit = Arc::new(AuditLogger::in_memory());

    let mut agent = Agent::new(provider.clone(), channel.clone(), executor.clone())
        .with_audit(audit.clone())
        .with_gate(ConfirmationGate::new(
            Duration::from_secs(30),
            Duration::from_secs(35),
        ));

    let start = tokio::time::Instant::now();
    agent.process_message(user("install requests")).await.unwrap();
    assert!(start.elapsed() >= Duration::from_secs(35));

    assert!(executor.executed().is_empty());
    let denied: Vec<_> = audit
        .entries()
        .into_iter()
        .filter(|e| e.action == AuditAction::CommandDenied)
        .collect();
    assert_eq!(denied.len(), 1);
    assert_eq!(denied[0].result, "timeout");
    assert_eq!(denied[0].tier, Some(Tier::Confirm));
    assert_eq!(provider.call_count(), 1);
}

#[test]
fn extracted_calls_keep_text_order() {
    let text = r#"First {"command": "ls"} then
```json
{"execute_command": {"command": "echo done", "reason": "report"}}
```
and finally "execute_command: cat notes.txt" is not JSON."#;
    let calls = extractor::parse_all(text);
    let commands: Vec<&str> = calls.iter().map(|c| c.command()).collect();
    assert_eq!(commands, vec!["ls", "echo done"]);
    assert_eq!(calls[1].reason(), "report");
}

#[tokio::test]
async fn fast_mode_streams_live_without_placeholder() {
    let provider = MockProvider::with_text_responses(&["Paris is the capital of France."]);
    let channel = MockChannel::default();
    let mut agent = Agent::new(provider.clone(), channel.clone(), MockExecutor::default())
        .with_mode(Mode::Fast);
    agent.process_message(user("capital of France?")).await.unwrap();

    let events = channel.events();
    match &events[0] {
        ChannelEvent::Sent { text, .. } => assert_eq!(text, "P"),
        other => panic!("expected first token to be sent, got {other:?}"),
    }
    assert_eq!(channel.visible(), vec!["Paris is the capital of France."]);
    assert!(!provider.requests()[0].tools_offered);
}

#[tokio::test]
async fn mixed_safe_and_blocked_calls_run_only_the_safe_one() {
    let provider = MockProvider::with_scripts(vec![
        vec![StreamChunk::text(
            r#"{"command": "ls"} {"command": "shutdown /s"}"#,
        )],
        vec![StreamChunk::text("Listed files; refused the shutdown.")],
    ]);
    let channel = MockChannel::default();
    let executor = MockExecutor::new("a.txt");

    let mut agent = Agent::new(provider.clone(), channel.clone(), executor.clone());
    agent.process_message(user("list and shut down")).await.unwrap();

    let ran: Vec<String> = executor.executed().into_iter().map(|c| c.command).collect();
    assert_eq!(ran, vec!["ls"]);
    let visible = channel.visible();
    assert_eq!(visible.len(), 2);
    // The placeholder was sent first and now holds the summary.
    assert_eq!(visible[0], "Listed files; refused the shutdown.");
    assert!(visible[1].starts_with("🚫 Blocked"));
}

#[tokio::test]
async fn backslash_escaped_rm_is_blocked() {
    let provider = MockProvider::with_scripts(vec![vec![StreamChunk::tools(vec![call(
        r"r\m -rf important",
    )])]]);
    let channel = MockChannel::default();
    let executor = MockExecutor::new("should not run");

    let mut agent = Agent::new(provider.clone(), channel.clone(), executor.clone());
    agent.process_message(user("clean up")).await.unwrap();

    assert!(executor.executed().is_empty());
    assert!(channel.approval_requests().is_empty());
    assert_eq!(provider.call_count(), 1);
    let visible = channel.visible();
    assert_eq!(visible.len(), 1);
    assert!(visible[0].starts_with("🚫 Blocked"));
    assert!(visible[0].contains("'rm'"));
}
