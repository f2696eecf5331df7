//! Integration tests for swarm rounds against a mocked Ollama server
//!
//! Workers talk to wiremock over real HTTP; the hive persists to a temp dir.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::{
    matchers::{body_string_contains, method, path},
    Mock, MockServer, ResponseTemplate,
};

use brain_engine::llm::OllamaProvider;
use brain_engine::swarm::{AgentStatus, Hive, SwarmCommander, SwarmSettings, Worker};

fn chat_reply(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "model": "qwen2.5:0.5b",
        "created_at": "2024-01-01T00:00:00Z",
        "message": { "role": "assistant", "content": content },
        "done": true
    }))
}

fn worker_json(discovery: &str, solution: &str) -> String {
    json!({ "discovery": discovery, "solution": solution, "error": "" }).to_string()
}

fn commander(uri: &str, hive: Arc<Hive>, agent_timeout: Duration) -> SwarmCommander {
    let provider = OllamaProvider::new(uri, "qwen2.5:0.5b").with_timeout(Duration::from_secs(5));
    let worker = Worker::new(Arc::new(provider), Duration::from_secs(5));
    SwarmCommander::new(
        hive,
        Arc::new(worker),
        SwarmSettings {
            max_concurrency: 4,
            agent_timeout,
            round_timeout: Duration::from_secs(10),
            round_pause: Duration::from_millis(10),
        },
    )
}

#[tokio::test]
async fn test_find_the_bug_majority_consensus() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let hive_path = dir.path().join("hive_memory.json");

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_string_contains("You are agent_3 in"))
        .respond_with(chat_reply(&worker_json("pointer may be unset", "null pointer")))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(chat_reply(&worker_json(
            "loop bound uses <=",
            "off-by-one in loop",
        )))
        .mount(&server)
        .await;

    let hive = Arc::new(Hive::open(&hive_path));
    let report = commander(&server.uri(), hive, Duration::from_secs(5))
        .run_swarm("find the bug", 4, 1)
        .await;

    assert_eq!(report.status, "success");
    assert_eq!(report.consensus.as_deref(), Some("off-by-one in loop"));
    assert_eq!(report.agents_deployed, 4);
    assert_eq!(report.successful, 4);
    assert_eq!(report.failed, 0);
    assert_eq!(report.solutions, 4);
    assert_eq!(report.discoveries, 4);

    let off_by_one = report
        .votes
        .iter()
        .find(|v| v.proposal == "off-by-one in loop")
        .unwrap();
    assert_eq!(off_by_one.votes, 3);

    // the blackboard survived on disk
    let reopened = Hive::open(&hive_path);
    assert_eq!(reopened.read_all().task, "find the bug");
    assert_eq!(
        reopened.get_consensus().as_deref(),
        Some("off-by-one in loop")
    );
    assert_eq!(reopened.agent_status("agent_3"), Some(AgentStatus::Active));
}

#[tokio::test]
async fn test_round_of_timeouts_still_proceeds() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    // the first two requests (all of round 1) hang past the agent timeout
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(
            chat_reply(&worker_json("late", "too late")).set_delay(Duration::from_secs(3)),
        )
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(chat_reply(&worker_json("found it", "fix the index")))
        .mount(&server)
        .await;

    let hive = Arc::new(Hive::open(dir.path().join("hive.json")));
    let report = commander(&server.uri(), hive, Duration::from_millis(300))
        .run_swarm("slow task", 2, 2)
        .await;

    assert_eq!(report.rounds.len(), 2);
    assert_eq!(report.rounds[0].successful, 0);
    assert_eq!(report.rounds[0].failed, 2);
    assert_eq!(report.rounds[1].successful, 2);
    assert_eq!(report.agents_deployed, 4);
    assert_eq!(report.consensus.as_deref(), Some("fix the index"));
}

#[tokio::test]
async fn test_unparsed_replies_become_discoveries() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(chat_reply("The loop probably stops one element early."))
        .mount(&server)
        .await;

    let hive = Arc::new(Hive::in_memory());
    let report = commander(&server.uri(), Arc::clone(&hive), Duration::from_secs(5))
        .run_swarm("find the bug", 3, 1)
        .await;

    assert_eq!(report.successful, 3);
    assert_eq!(report.discoveries, 3);
    assert_eq!(report.solutions, 0);
    assert!(report.votes.is_empty());
    assert_eq!(report.consensus, None);
    assert!(report.top_discoveries[0].starts_with("The loop probably"));
}

#[tokio::test]
async fn test_backend_errors_count_as_failures() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model crashed"))
        .mount(&server)
        .await;

    let hive = Arc::new(Hive::in_memory());
    let report = commander(&server.uri(), Arc::clone(&hive), Duration::from_secs(5))
        .run_swarm("doomed", 3, 1)
        .await;

    assert_eq!(report.status, "success");
    assert_eq!(report.successful, 0);
    assert_eq!(report.failed, 3);
    assert_eq!(report.consensus, None);
    for i in 0..3 {
        assert_eq!(
            hive.agent_status(&format!("agent_{i}")),
            Some(AgentStatus::Failed)
        );
    }
}
