//! End-to-end sessions driven by scripted models

use rlm_engine::prompt::NO_ANSWER;
use rlm_engine::{
    CancellationToken, Engine, EngineConfig, ErrorKind, Role, RetryConfig, ScriptedClient,
    Termination,
};
use rlm_error::Error;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn nested_config(depth: usize) -> EngineConfig {
    EngineConfig::new()
        .with_root_model("root")
        .with_recursive_model("leaf")
        .with_max_recursion_depth(depth)
}

fn log_records() -> serde_json::Value {
    json!([
        "INFO boot",
        "ERROR disk full",
        "INFO retry",
        "WARN slow io",
        "ERROR fan stuck",
        "INFO ok",
        "INFO ok",
        "ERROR checksum",
        "WARN high temp",
        "INFO shutdown"
    ])
}

fn tool_turns(transcript: &[rlm_engine::ChatMessage]) -> Vec<&str> {
    transcript
        .iter()
        .filter(|m| m.role == Role::Tool)
        .map(|m| m.content.as_str())
        .collect()
}

#[tokio::test]
async fn count_errors_in_records() {
    let client = ScriptedClient::new([
        "Let me count.\n```rhai\nlet errors = context.filter(|r| r.starts_with(\"ERROR\"));\nprint(errors.len());\n```",
        "FINAL(3)",
    ]);
    let engine = Engine::new(client, EngineConfig::default()).unwrap();

    let completion = engine.complete("How many ERROR records?", log_records()).await.unwrap();

    assert_eq!(completion.answer, "3");
    assert_eq!(completion.iterations, 2);
    assert_eq!(completion.total_calls, 1);
    assert_eq!(completion.usage.requests, 2);
    assert_eq!(completion.trace.len(), 1);
    assert_eq!(completion.trace[0].output, "3");
    assert!(completion.trace[0].error.is_none());

    let system = &completion.transcript[0].content;
    assert!(system.contains("Type: list"));
    assert!(system.contains("Size: 10 elements"));
    assert!(!system.contains("INFO shutdown"));
    assert_eq!(completion.transcript[1].content, "How many ERROR records?");
}

#[tokio::test]
async fn nested_call_past_max_depth_is_caught() {
    let client = ScriptedClient::new(Vec::<String>::new())
        .with_model_responses(
            "root",
            [
                "```rhai\nlet summary = recursive_lm(\"summarize the errors\", context.extract(0, 5));\nprint(summary);\n```",
                "FINAL_VAR(summary)",
            ],
        )
        .with_model_responses(
            "leaf",
            [
                "```rhai\ntry {\n    recursive_lm(\"go deeper\");\n} catch (err) {\n    if err.kind == \"RecursionDepthExceeded\" {\n        print(\"refused: \" + err.message);\n    }\n}\n```",
                "FINAL(two errors)",
            ],
        );
    let engine = Engine::new(client, nested_config(1)).unwrap();

    let completion = engine.complete("Summarize", log_records()).await.unwrap();

    assert_eq!(completion.answer, "two errors");
    assert_eq!(completion.termination, Termination::Variable { name: "summary".into() });
    assert_eq!(completion.total_calls, 2);
    assert_eq!(completion.usage.requests, 4);

    let calls = engine.client().calls();
    let models: Vec<&str> = calls.iter().map(|c| c.model.as_str()).collect();
    assert_eq!(models, ["root", "leaf", "leaf", "root"]);

    let leaf_second = &calls[2].transcript;
    let leaf_output = leaf_second.last().unwrap();
    assert_eq!(leaf_output.role, Role::Tool);
    assert!(leaf_output.content.starts_with("refused: recursive call at depth 2"));
    assert!(leaf_second[0].content.contains("Size: 5 elements"));
    assert!(leaf_second[0].content.contains("recursive_lm is not available"));
}

#[tokio::test]
async fn uncaught_depth_error_is_reported_and_session_continues() {
    let client = ScriptedClient::new([
        "```rhai\nlet answer = recursive_lm(\"anything\");\n```",
        "FINAL(gave up on recursion)",
    ]);
    let engine = Engine::new(client, EngineConfig::new().with_max_recursion_depth(0)).unwrap();

    let completion = engine.complete("q", "text").await.unwrap();

    assert_eq!(completion.answer, "gave up on recursion");
    assert_eq!(completion.total_calls, 1);
    let error = completion.trace[0].error.as_deref().unwrap();
    assert!(error.starts_with("Error: RecursionDepthExceeded:"), "{error}");
    assert!(error.ends_with("(line 1)"), "{error}");
}

#[tokio::test]
async fn open_is_denied() {
    let client = ScriptedClient::new([
        "```rhai\nprint(\"before\");\nlet f = open(\"/etc/passwd\");\n```",
        "FINAL(cannot read files)",
    ]);
    let engine = Engine::new(client, EngineConfig::default()).unwrap();

    let completion = engine.complete("Read the password file", "ctx").await.unwrap();

    assert_eq!(completion.answer, "cannot read files");
    assert_eq!(
        tool_turns(&completion.transcript),
        ["before\nError: CapabilityDenied: 'open' is not available in the sandbox (line 2)"]
    );
    assert!(completion.trace[0].error.as_deref().unwrap().contains("CapabilityDenied"));
}

#[tokio::test]
async fn iteration_limit_is_not_an_error() {
    let client = ScriptedClient::new([
        "```rhai\nprint(\"step one\");\n```",
        "```rhai\nprint(\"step two\");\n```",
        "```rhai\nlet x = 1;\n```",
    ]);
    let engine = Engine::new(client, EngineConfig::new().with_max_iterations(3)).unwrap();

    let completion = engine.complete("q", "ctx").await.unwrap();

    assert_eq!(completion.answer, NO_ANSWER);
    assert_eq!(completion.iterations, 3);
    assert!(!completion.is_answered());
    assert_eq!(
        completion.termination,
        Termination::IterationLimit { last_output: Some("step two".into()) }
    );
    assert_eq!(completion.trace.len(), 3);
    assert_eq!(engine.client().call_count(), 3);
}

#[tokio::test]
async fn unresolved_final_var_falls_through_to_code() {
    let client = ScriptedClient::new([
        "FINAL_VAR(answer)\n```rhai\nlet answer = \"found it\";\n```",
        "FINAL_VAR(answer)",
    ]);
    let engine = Engine::new(client, EngineConfig::default()).unwrap();

    let completion = engine.complete("q", "ctx").await.unwrap();

    assert_eq!(completion.answer, "found it");
    assert_eq!(completion.iterations, 2);
    let turns = tool_turns(&completion.transcript);
    assert_eq!(
        turns,
        ["(no output)\nError: UnresolvedFinalVariable: variable 'answer' is not defined"]
    );
}

#[tokio::test]
async fn final_var_renders_non_strings() {
    let client = ScriptedClient::new([
        "```rhai\nlet counts = #{ERROR: 3, WARN: 2};\n```",
        "FINAL_VAR(counts)",
    ]);
    let engine = Engine::new(client, EngineConfig::default()).unwrap();
    let completion = engine.complete("q", log_records()).await.unwrap();
    assert_eq!(completion.answer, r#"{"ERROR":3,"WARN":2}"#);
}

#[tokio::test]
async fn total_calls_are_transitive() {
    let client = ScriptedClient::new(Vec::<String>::new())
        .with_model_responses(
            "root",
            [
                "```rhai\nlet a = recursive_lm(\"first\");\nlet b = recursive_lm(\"second\");\nprint(a + \" \" + b);\n```",
                "FINAL(done)",
            ],
        )
        .with_model_responses(
            "leaf",
            [
                "```rhai\nprint(recursive_lm(\"grand\"));\n```",
                "FINAL(g)",
                "FINAL(a)",
                "FINAL(b)",
            ],
        );
    let engine = Engine::new(client, nested_config(2)).unwrap();

    let completion = engine.complete("q", "some text").await.unwrap();

    assert_eq!(completion.answer, "done");
    assert_eq!(completion.total_calls, 4);
    assert_eq!(completion.usage.requests, 6);
    assert!(completion.usage.by_model["leaf"].total_tokens > 0);
    assert_eq!(tool_turns(&completion.transcript), ["a b"]);

    let queries: Vec<String> = engine
        .client()
        .calls()
        .iter()
        .filter(|c| c.model == "leaf")
        .map(|c| c.transcript[1].content.clone())
        .collect();
    assert_eq!(queries, ["first", "grand", "first", "second"]);
}

#[tokio::test]
async fn recursion_inside_map_returns_in_order() {
    let client = ScriptedClient::new(Vec::<String>::new())
        .with_model_responses(
            "root",
            [
                "```rhai\nlet sizes = [\"x\", \"yy\"].map(|c| recursive_lm(\"size?\", c));\nsizes\n```",
                "FINAL(ok)",
            ],
        )
        .with_model_responses("leaf", ["FINAL(1)", "FINAL(2)"]);
    let engine = Engine::new(client, nested_config(1)).unwrap();

    let completion = engine.complete("q", "ignored").await.unwrap();

    assert_eq!(tool_turns(&completion.transcript), [r#"["1","2"]"#]);
    let calls = engine.client().calls();
    assert!(calls[1].transcript[0].content.contains("Preview: x"));
    assert!(calls[2].transcript[0].content.contains("Preview: yy"));
}

#[tokio::test]
async fn rebinding_context_does_not_change_child_default() {
    let client = ScriptedClient::new(Vec::<String>::new())
        .with_model_responses(
            "root",
            [
                "```rhai\ncontext = \"rebound\";\nprint(recursive_lm(\"what is it?\"));\n```",
                "FINAL(ok)",
            ],
        )
        .with_model_responses("leaf", ["FINAL(records)"]);
    let engine = Engine::new(client, nested_config(1)).unwrap();

    engine.complete("q", log_records()).await.unwrap();

    let calls = engine.client().calls();
    assert!(calls[1].transcript[0].content.contains("Type: list"));
    assert!(calls[1].transcript[0].content.contains("Size: 10 elements"));
}

#[tokio::test]
async fn fragment_timeout_is_recovered() {
    let client = ScriptedClient::new([
        "```rhai\nlet n = 0;\nloop { n += 1; }\n```",
        "```rhai\nprint(n > 0);\n```",
        "FINAL(timed out)",
    ]);
    let config = EngineConfig::new().with_fragment_timeout(Duration::from_millis(50));
    let engine = Engine::new(client, config).unwrap();

    let completion = engine.complete("q", "ctx").await.unwrap();

    assert_eq!(completion.answer, "timed out");
    assert!(completion.trace[0].error.as_deref().unwrap().starts_with("Error: ExecutionTimeout"));
    assert_eq!(completion.trace[1].output, "true");
}

#[tokio::test]
async fn model_errors_in_children_propagate() {
    let client = ScriptedClient::new(Vec::<String>::new()).with_model_responses(
        "root",
        ["```rhai\ntry {\n    recursive_lm(\"child\");\n} catch (err) {\n}\n```"],
    );
    let engine = Engine::new(client, nested_config(1)).unwrap();

    let err = engine.complete("q", "ctx").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ModelUnavailable);
    assert_eq!(err.operation(), "engine::complete");
}

#[tokio::test]
async fn cancelled_before_start() {
    let token = CancellationToken::new();
    token.cancel();
    let engine = Engine::new(ScriptedClient::new(["FINAL(x)"]), EngineConfig::default())
        .unwrap()
        .with_cancellation(token);

    let err = engine.complete("q", "ctx").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(engine.client().call_count(), 0);
}

#[tokio::test]
async fn cancelled_between_iterations() {
    let token = CancellationToken::new();
    let trigger = token.clone();
    let client = ScriptedClient::from_fn(move |_, _| {
        trigger.cancel();
        Ok("```rhai\nlet x = 1;\n```".to_string())
    });
    let engine = Engine::new(client, EngineConfig::default())
        .unwrap()
        .with_cancellation(token);

    let err = engine.complete("q", "ctx").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(engine.client().call_count(), 1);
}

#[tokio::test]
async fn rate_limits_are_retried_when_configured() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&attempts);
    let client = ScriptedClient::from_fn(move |_, _| {
        if seen.fetch_add(1, Ordering::SeqCst) < 2 {
            Err(Error::rate_limited("HTTP 429"))
        } else {
            Ok("FINAL(eventually)".to_string())
        }
    });
    let retry = RetryConfig::with_retries(3).with_initial_delay(Duration::from_millis(1));
    let engine = Engine::new(client, EngineConfig::new().with_retry(retry)).unwrap();

    let completion = engine.complete("q", "ctx").await.unwrap();

    assert_eq!(completion.answer, "eventually");
    assert_eq!(completion.usage.requests, 1);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn rate_limits_surface_without_retry_policy() {
    let client = ScriptedClient::from_fn(|_, _| Err(Error::rate_limited("HTTP 429")));
    let engine = Engine::new(client, EngineConfig::default()).unwrap();

    let err = engine.complete("q", "ctx").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RateLimited);
    assert_eq!(engine.client().call_count(), 1);
}
