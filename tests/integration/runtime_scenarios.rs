//! End-to-end tick scenarios.

use super::common::{memory_runtime, percept_text, reply_with_action, AppendDot, Scripted, Stalled};
use mindgraph::message::ProjectionOrigin;
use mindgraph::mind::prompt;
use mindgraph::store::FileStateStore;
use mindgraph::tools::{FunctionTool, ToolRegistry};
use mindgraph::{
    AgentId, AgentIdentity, GraphRuntime, Lens, MindConfig, MindMode, ModelError, StateUpdate,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

fn id(s: &str) -> AgentId {
    AgentId::new(s)
}

async fn signal_scenario(listener_lens: Lens) -> GraphRuntime {
    let speaker = Scripted::new(|_prompt: &str, call: usize| {
        if call == 0 {
            Ok(reply_with_action(
                "spoke",
                json!({"signals": [{"topics": ["x"], "payload": {"note": "hello"}}]}),
            ))
        } else {
            Ok("quiet".to_string())
        }
    });
    let mut runtime = memory_runtime(Arc::new(AppendDot::default()));
    runtime
        .register_agent_with_model(
            AgentIdentity::new("a", "speaker"),
            Lens::attend_all(),
            MindConfig::default(),
            speaker,
        )
        .unwrap();
    runtime
        .register_agent(
            AgentIdentity::new("b", "listener").subscribe_to("a"),
            listener_lens,
        )
        .unwrap();
    runtime
}

#[tokio::test]
async fn signal_is_visible_to_attending_receiver_only_from_next_tick() {
    let mut runtime = signal_scenario(Lens::topics(["x"])).await;

    runtime.tick(0).await.unwrap();
    assert!(runtime.last_percept(&id("b")).unwrap().signals.is_empty());

    let report = runtime.tick(1).await.unwrap();
    assert_eq!(report.signals_published, 1);
    let percept = runtime.last_percept(&id("b")).unwrap();
    assert_eq!(percept.tick, 1);
    assert_eq!(percept.signals.len(), 1);
    assert_eq!(percept.signals[0].sender, id("a"));
    assert_eq!(percept.signals[0].tick, 0);
    assert!(percept.signals[0].has_topic("x"));
    assert!(runtime.last_percept(&id("a")).unwrap().signals.is_empty());

    // Signals live for one tick.
    runtime.tick(2).await.unwrap();
    assert!(runtime.last_percept(&id("b")).unwrap().signals.is_empty());
}

#[tokio::test]
async fn signal_is_withheld_from_receiver_whose_lens_rejects_it() {
    let mut runtime = signal_scenario(Lens::topics(["y"])).await;
    runtime.tick(0).await.unwrap();
    let report = runtime.tick(1).await.unwrap();
    assert_eq!(report.signals_published, 1);
    assert!(runtime.last_percept(&id("b")).unwrap().signals.is_empty());
}

#[tokio::test]
async fn three_full_ticks_produce_growing_versions_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStateStore::open(dir.path()).unwrap());
    let mut runtime = GraphRuntime::new(store, Arc::new(AppendDot::default()));
    runtime
        .register_agent(AgentIdentity::new("a", "speaker"), Lens::attend_all())
        .unwrap();
    runtime
        .register_agent(
            AgentIdentity::new("b", "listener").subscribe_to("a"),
            Lens::topics(["x"]),
        )
        .unwrap();

    for tick in 0..3 {
        let report = runtime.tick(tick).await.unwrap();
        for agent in &report.agents {
            assert_eq!(
                agent.update,
                StateUpdate::Committed {
                    version: tick + 1
                }
            );
        }
    }

    for agent in [id("a"), id("b")] {
        assert_eq!(runtime.list_versions(&agent).unwrap(), vec![1, 2, 3]);
        for version in 1..=3u64 {
            let envelope = runtime.load_version(&agent, version).unwrap().unwrap();
            assert_eq!(envelope.content.as_str(), ".".repeat(version as usize));
            assert_eq!(envelope.agent_id, agent);
        }
        let latest = runtime.load_latest(&agent).unwrap().unwrap();
        assert_eq!(latest.version, 3);
        assert!(dir
            .path()
            .join(agent.sanitized())
            .join("v3.json")
            .exists());
    }
}

#[tokio::test]
async fn private_state_never_reaches_other_agents() {
    let leaker = Scripted::new(|_prompt: &str, _call: usize| {
        Ok(reply_with_action(
            "SECRET-ALPHA",
            json!({
                "signals": [
                    {"topics": ["x"], "payload": {"text": "SECRET-ALPHA"}},
                    {"topics": ["SECRET-ALPHA"], "payload": {}},
                    {"topics": ["x"], "payload": {"text": "harmless"}}
                ],
                "expose": {"summary": "it says SECRET-ALPHA inside"},
                "env_updates": {"gossip": ["SECRET-ALPHA"]}
            }),
        ))
    });
    let mut runtime = memory_runtime(Arc::new(AppendDot::default()));
    runtime
        .register_agent_with_model(
            AgentIdentity::new("a", "leaker"),
            Lens::attend_all(),
            MindConfig::default(),
            leaker,
        )
        .unwrap();
    runtime
        .register_agent(
            AgentIdentity::new("b", "observer").subscribe_to("a"),
            Lens::attend_all(),
        )
        .unwrap();

    for tick in 0..4 {
        let report = runtime.tick(tick).await.unwrap();
        assert_eq!(report.agent(&id("a")).unwrap().leaks_blocked, 4);
        let seen = percept_text(runtime.last_percept(&id("b")).unwrap());
        assert!(!seen.contains("SECRET-ALPHA"), "tick {}: {}", tick, seen);
        assert!(runtime.environment().get("gossip").is_none());
        if tick > 0 {
            assert_eq!(runtime.last_percept(&id("b")).unwrap().signals.len(), 1);
        }
    }
    assert!(runtime.router().exposed_view(&id("a")).is_none());
    let latest = runtime.load_latest(&id("a")).unwrap().unwrap();
    assert_eq!(latest.content.as_str(), "SECRET-ALPHA");
}

#[tokio::test]
async fn receivers_with_different_lenses_see_different_projections() {
    let publisher = Scripted::new(|_prompt: &str, _call: usize| {
        Ok(reply_with_action(
            "thinking",
            json!({"expose": {"mood": "calm", "plan": "public"}}),
        ))
    });
    let mut runtime = memory_runtime(Arc::new(AppendDot::default()));
    runtime
        .register_agent_with_model(
            AgentIdentity::new("a", "publisher"),
            Lens::attend_all(),
            MindConfig::default(),
            publisher,
        )
        .unwrap();
    runtime
        .register_agent(
            AgentIdentity::new("b", "narrow").subscribe_to("a"),
            Lens::attend_all().with_fields(["mood"]),
        )
        .unwrap();
    runtime
        .register_agent(
            AgentIdentity::new("c", "wide").subscribe_to("a"),
            Lens::attend_all(),
        )
        .unwrap();

    runtime.tick(0).await.unwrap();
    let report = runtime.tick(1).await.unwrap();
    assert_eq!(report.projections_routed, 2);

    let narrow = &runtime.last_percept(&id("b")).unwrap().projections[0];
    let wide = &runtime.last_percept(&id("c")).unwrap().projections[0];
    assert_eq!(narrow.sender, id("a"));
    assert_eq!(narrow.tick, 1);
    assert_eq!(narrow.origin, ProjectionOrigin::Subscription);
    assert_eq!(narrow.payload.len(), 1);
    assert_eq!(narrow.payload["mood"], json!("calm"));
    assert_eq!(wide.payload.len(), 2);
    assert_ne!(narrow.payload, wide.payload);
}

#[tokio::test]
async fn failed_model_call_copies_prior_state_forward() {
    let flaky = Scripted::new(|prompt: &str, call: usize| {
        if call == 0 {
            Ok(format!(
                "{}.",
                prompt::extract_private_state(prompt).unwrap_or("")
            ))
        } else {
            Err(ModelError::Unavailable("connection refused".to_string()))
        }
    });
    let mut runtime = memory_runtime(Arc::new(AppendDot::default()));
    runtime
        .register_agent(AgentIdentity::new("a", "steady"), Lens::attend_all())
        .unwrap();
    runtime
        .register_agent_with_model(
            AgentIdentity::new("b", "flaky"),
            Lens::attend_all(),
            MindConfig::default(),
            flaky,
        )
        .unwrap();

    runtime.tick(0).await.unwrap();
    let report = runtime.tick(1).await.unwrap();
    match &report.agent(&id("b")).unwrap().update {
        StateUpdate::CopiedForward { version, reason } => {
            assert_eq!(*version, 2);
            assert!(reason.contains("connection refused"));
        }
        other => panic!("expected copy-forward, got {:?}", other),
    }
    runtime.tick(2).await.unwrap();

    assert_eq!(runtime.list_versions(&id("b")).unwrap(), vec![1, 2, 3]);
    for version in 1..=3 {
        let envelope = runtime.load_version(&id("b"), version).unwrap().unwrap();
        assert_eq!(envelope.content.as_str(), ".");
    }
    let steady = runtime.load_latest(&id("a")).unwrap().unwrap();
    assert_eq!(steady.content.as_str(), "...");
}

#[tokio::test]
async fn malformed_action_block_falls_back() {
    let broken = Scripted::new(|_prompt: &str, _call: usize| {
        Ok("notes\n```json\n{\"signals\": [oops\n```".to_string())
    });
    let mut runtime = memory_runtime(broken);
    runtime
        .register_agent(AgentIdentity::new("a", "garbled"), Lens::attend_all())
        .unwrap();
    let report = runtime.tick(0).await.unwrap();
    assert!(matches!(
        report.agents[0].update,
        StateUpdate::CopiedForward { version: 1, .. }
    ));
    let latest = runtime.load_latest(&id("a")).unwrap().unwrap();
    assert!(latest.content.is_empty());
}

#[tokio::test]
async fn timed_out_model_call_falls_back() {
    let mut runtime = memory_runtime(Arc::new(AppendDot::default()));
    runtime
        .register_agent_with_model(
            AgentIdentity::new("a", "slow"),
            Lens::attend_all(),
            MindConfig {
                timeout: Duration::from_millis(50),
                ..Default::default()
            },
            Arc::new(Stalled),
        )
        .unwrap();
    runtime
        .register_agent(AgentIdentity::new("b", "quick"), Lens::attend_all())
        .unwrap();

    let report = runtime.tick(0).await.unwrap();
    match &report.agent(&id("a")).unwrap().update {
        StateUpdate::CopiedForward { version, reason } => {
            assert_eq!(*version, 1);
            assert!(reason.contains("timed out"));
        }
        other => panic!("expected copy-forward, got {:?}", other),
    }
    assert_eq!(
        report.agent(&id("b")).unwrap().update,
        StateUpdate::Committed { version: 1 }
    );
}

#[tokio::test]
async fn conflicting_environment_writes_resolve_by_registration_order() {
    let writer = |value: &'static str| {
        Scripted::new(move |_prompt: &str, call: usize| {
            if call == 0 {
                Ok(reply_with_action(
                    "wrote",
                    json!({"env_updates": {"weather": value, value: true}}),
                ))
            } else {
                Ok("idle".to_string())
            }
        })
    };
    let mut runtime = memory_runtime(Arc::new(AppendDot::default()));
    for (name, value) in [("a", "sunny"), ("b", "rain")] {
        runtime
            .register_agent_with_model(
                AgentIdentity::new(name, "writer"),
                Lens::attend_all(),
                MindConfig::default(),
                writer(value),
            )
            .unwrap();
    }

    runtime.tick(0).await.unwrap();
    assert!(runtime.environment().is_empty());

    let report = runtime.tick(1).await.unwrap();
    assert_eq!(report.write_conflicts.len(), 1);
    let conflict = &report.write_conflicts[0];
    assert_eq!(conflict.key, "weather");
    assert_eq!(conflict.writers, vec![id("a"), id("b")]);
    assert_eq!(conflict.winner, id("b"));
    assert_eq!(runtime.environment().get("weather"), Some(&json!("rain")));
    assert_eq!(runtime.environment().get("sunny"), Some(&json!(true)));

    let percept = runtime.last_percept(&id("a")).unwrap();
    assert_eq!(percept.environment["weather"], json!("rain"));
}

#[tokio::test]
async fn requests_are_answered_and_unknown_targets_dropped() {
    let target = Scripted::new(|_prompt: &str, _call: usize| {
        Ok(reply_with_action("ready", json!({"expose": {"status": "up"}})))
    });
    let requester = Scripted::new(|_prompt: &str, call: usize| {
        if call == 0 {
            Ok(reply_with_action("asking", json!({"requests": ["a", "ghost"]})))
        } else {
            Ok("waiting".to_string())
        }
    });
    let mut runtime = memory_runtime(Arc::new(AppendDot::default()));
    runtime
        .register_agent_with_model(
            AgentIdentity::new("a", "target"),
            Lens::attend_all(),
            MindConfig::default(),
            target,
        )
        .unwrap();
    runtime
        .register_agent_with_model(
            AgentIdentity::new("b", "requester"),
            Lens::attend_all(),
            MindConfig::default(),
            requester,
        )
        .unwrap();

    runtime.tick(0).await.unwrap();
    let report = runtime.tick(1).await.unwrap();
    assert_eq!(report.requests_answered, 1);
    assert_eq!(report.dropped_messages, 1);

    let percept = runtime.last_percept(&id("b")).unwrap();
    assert_eq!(percept.projections.len(), 1);
    assert_eq!(percept.projections[0].origin, ProjectionOrigin::Request);
    assert_eq!(percept.projections[0].payload["status"], json!("up"));

    // Answers are delivered once.
    runtime.tick(2).await.unwrap();
    assert!(runtime.last_percept(&id("b")).unwrap().projections.is_empty());
}

#[tokio::test]
async fn tool_results_arrive_in_next_percept() {
    let mut tools = ToolRegistry::new();
    tools
        .register(FunctionTool::new("add", "Add a and b", |args: &Value| {
            let a = args["a"].as_f64().ok_or("missing a")?;
            let b = args["b"].as_f64().ok_or("missing b")?;
            Ok(json!(a + b))
        }))
        .unwrap();

    let caller = Scripted::new(|prompt: &str, call: usize| {
        assert!(prompt.contains("- add: Add a and b"));
        if call == 0 {
            Ok(reply_with_action(
                "calculating",
                json!({"tool_calls": [
                    {"tool": "add", "args": {"a": 2, "b": 3}},
                    {"tool": "shell", "args": {"cmd": "ls"}}
                ]}),
            ))
        } else {
            Ok("done".to_string())
        }
    });
    let mut runtime = memory_runtime(Arc::new(AppendDot::default())).with_tools(tools);
    runtime
        .register_agent_with_model(
            AgentIdentity::new("a", "calculator").with_tool("add"),
            Lens::attend_all(),
            MindConfig::default(),
            caller,
        )
        .unwrap();

    runtime.tick(0).await.unwrap();
    let report = runtime.tick(1).await.unwrap();
    assert_eq!(report.tool_calls_run, 1);
    assert_eq!(report.dropped_messages, 1);

    let percept = runtime.last_percept(&id("a")).unwrap();
    assert_eq!(percept.tool_results.len(), 1);
    assert_eq!(percept.tool_results[0].tool, "add");
    assert_eq!(percept.tool_results[0].output, json!(5.0));

    runtime.tick(2).await.unwrap();
    assert!(runtime.last_percept(&id("a")).unwrap().tool_results.is_empty());
}

#[tokio::test]
async fn stateless_and_graph_only_agents_persist_nothing() {
    let graph_model = Scripted::new(|_prompt: &str, _call: usize| Ok("never".to_string()));
    let mut runtime = memory_runtime(Arc::new(AppendDot::default()));
    runtime
        .register_agent_with(
            AgentIdentity::new("s", "stateless"),
            Lens::attend_all(),
            MindConfig {
                mode: MindMode::Stateless,
                ..Default::default()
            },
        )
        .unwrap();
    runtime
        .register_agent_with_model(
            AgentIdentity::new("g", "observer").subscribe_to("s"),
            Lens::attend_all(),
            MindConfig {
                mode: MindMode::GraphOnly,
                ..Default::default()
            },
            graph_model.clone(),
        )
        .unwrap();

    for tick in 0..2 {
        let report = runtime.tick(tick).await.unwrap();
        assert_eq!(
            report.agent(&id("s")).unwrap().update,
            StateUpdate::NotPersisted
        );
        assert_eq!(report.agent(&id("g")).unwrap().update, StateUpdate::Skipped);
        assert_eq!(report.agent(&id("g")).unwrap().projections_seen, 1);
    }
    assert!(runtime.list_versions(&id("s")).unwrap().is_empty());
    assert!(runtime.list_versions(&id("g")).unwrap().is_empty());
    assert_eq!(graph_model.calls(), 0);
}

#[tokio::test]
async fn branching_runs_one_call_per_style_plus_reconcile() {
    let model = Scripted::new(|prompt: &str, _call: usize| {
        if prompt.starts_with(prompt::RECONCILE_HEADER) {
            Ok("reconciled".to_string())
        } else {
            Ok("a thought".to_string())
        }
    });
    let mut runtime = memory_runtime(model.clone()).with_defaults(MindConfig {
        branch_styles: vec![
            "generative".to_string(),
            "critical".to_string(),
            "pattern-seeking".to_string(),
        ],
        ..Default::default()
    });
    runtime
        .register_agent(AgentIdentity::new("a", "thinker"), Lens::attend_all())
        .unwrap();

    runtime.tick(0).await.unwrap();
    assert_eq!(model.calls(), 4);
    runtime.tick(1).await.unwrap();
    assert_eq!(model.calls(), 8);

    let latest = runtime.load_latest(&id("a")).unwrap().unwrap();
    assert_eq!(latest.version, 2);
    assert_eq!(latest.content.as_str(), "reconciled");
}

#[tokio::test]
async fn shutdown_keeps_committed_state() {
    let mut runtime = memory_runtime(Arc::new(AppendDot::default()));
    runtime
        .register_agent(AgentIdentity::new("a", "solo"), Lens::attend_all())
        .unwrap();
    runtime.tick(0).await.unwrap();
    runtime.tick(1).await.unwrap();
    runtime.shutdown();

    assert!(runtime.tick(2).await.is_err());
    assert_eq!(runtime.list_versions(&id("a")).unwrap(), vec![1, 2]);
}

#[tokio::test]
async fn earlier_exposed_view_is_withdrawn_once_it_carries_private_state() {
    let reader = Scripted::new(|_prompt: &str, call: usize| {
        if call == 0 {
            Ok(reply_with_action(
                "thinking",
                json!({"expose": {"status": "reading about cats"}}),
            ))
        } else {
            Ok("cats".to_string())
        }
    });
    let mut runtime = memory_runtime(Arc::new(AppendDot::default()));
    runtime
        .register_agent_with_model(
            AgentIdentity::new("a", "reader"),
            Lens::attend_all(),
            MindConfig::default(),
            reader,
        )
        .unwrap();
    runtime
        .register_agent(
            AgentIdentity::new("b", "observer").subscribe_to("a"),
            Lens::attend_all(),
        )
        .unwrap();

    runtime.tick(0).await.unwrap();
    let report = runtime.tick(1).await.unwrap();
    // Published while the private state was still "thinking".
    let projection = &runtime.last_percept(&id("b")).unwrap().projections[0];
    assert_eq!(projection.payload["status"], json!("reading about cats"));
    assert_eq!(report.agent(&id("a")).unwrap().leaks_blocked, 1);

    for tick in 2..5 {
        runtime.tick(tick).await.unwrap();
        let seen = percept_text(runtime.last_percept(&id("b")).unwrap());
        assert!(!seen.contains("cats"), "tick {}: {}", tick, seen);
    }
    assert_eq!(runtime.load_latest(&id("a")).unwrap().unwrap().version, 5);
    assert!(runtime.router().exposed_view(&id("a")).unwrap().is_empty());
}

#[tokio::test]
async fn failed_reconcile_copies_prior_state_and_discards_actions() {
    let model = Scripted::new(|prompt: &str, call: usize| {
        if prompt.starts_with(prompt::RECONCILE_HEADER) {
            if call < 3 {
                Ok("settled".to_string())
            } else {
                Err(ModelError::Unavailable("reconcile down".to_string()))
            }
        } else {
            Ok(reply_with_action(
                "a thought",
                json!({"env_updates": {"mood": format!("bold-{}", call)}}),
            ))
        }
    });
    let mut runtime = memory_runtime(model.clone()).with_defaults(MindConfig {
        branch_styles: vec!["generative".to_string(), "critical".to_string()],
        ..Default::default()
    });
    runtime
        .register_agent(AgentIdentity::new("a", "thinker"), Lens::attend_all())
        .unwrap();

    runtime.tick(0).await.unwrap();
    let report = runtime.tick(1).await.unwrap();
    assert_eq!(model.calls(), 6);
    assert!(matches!(
        report.agent(&id("a")).unwrap().update,
        StateUpdate::CopiedForward { version: 2, .. }
    ));
    let latest = runtime.load_latest(&id("a")).unwrap().unwrap();
    assert_eq!(latest.version, 2);
    assert_eq!(latest.content.as_str(), "settled");

    // Only tick 0's branch proposals ever reach the environment.
    runtime.tick(2).await.unwrap();
    let mood = runtime.environment().get("mood").cloned();
    assert!(
        mood == Some(json!("bold-0")) || mood == Some(json!("bold-1")),
        "{:?}",
        mood
    );
}
