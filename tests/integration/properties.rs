//! Property tests for routing, filtering and versioning.

use super::common::{memory_runtime, AppendDot};
use mindgraph::mind::parse_reply;
use mindgraph::router::MessageRouter;
use mindgraph::{AgentId, AgentIdentity, Lens, PerceptionFilter, Signal};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;

fn topic() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["x", "y", "z", "weather", "trade"]).prop_map(str::to_string)
}

proptest! {
    #[test]
    fn topic_lens_attends_exactly_on_overlap(
        wanted in prop::collection::btree_set(topic(), 0..4),
        carried in prop::collection::btree_set(topic(), 0..4),
    ) {
        let lens = Lens::topics(wanted.iter().cloned());
        let mut signal = Signal::new(AgentId::new("a"), 0);
        for t in &carried {
            signal = signal.with_topic(t.clone());
        }
        let overlap = wanted.intersection(&carried).next().is_some();
        prop_assert_eq!(lens.should_attend(&signal).unwrap(), overlap);
    }

    #[test]
    fn published_signals_never_visible_in_same_tick(
        batches in prop::collection::vec(prop::collection::vec(topic(), 0..4), 1..6),
    ) {
        let mut router = MessageRouter::new();
        router.register(AgentId::new("a"), Lens::attend_all());
        router.register(AgentId::new("b"), Lens::attend_all());

        for (tick, batch) in batches.iter().enumerate() {
            let tick = tick as u64;
            router.advance(tick);
            for t in batch {
                router.publish(Signal::new(AgentId::new("a"), tick).with_topic(t.clone()));
            }
            let seen = router.attended_signals(&AgentId::new("b")).signals;
            prop_assert!(seen.iter().all(|s| s.tick + 1 == tick));
            let expected = if tick == 0 { 0 } else { batches[tick as usize - 1].len() };
            prop_assert_eq!(seen.len(), expected);
        }
    }

    #[test]
    fn sanitized_ids_are_filesystem_safe(raw in ".{1,24}") {
        let sanitized = AgentId::new(raw.as_str()).sanitized();
        prop_assert!(sanitized
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        prop_assert_eq!(sanitized.chars().count(), raw.chars().count());
    }

    #[test]
    fn replies_without_action_block_are_kept_verbatim(text in "[^`]{0,80}") {
        let reply = parse_reply(&text).unwrap();
        prop_assert_eq!(reply.notes, text);
        prop_assert!(reply.action.is_empty());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn versions_are_gapless_after_n_full_ticks(n in 1u64..6, agents in 1usize..4) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let ids: Vec<AgentId> = (0..agents).map(|i| AgentId::new(format!("agent-{}", i))).collect();

        let versions = rt.block_on(async {
            let mut runtime = memory_runtime(Arc::new(AppendDot::default()));
            for id in &ids {
                runtime
                    .register_agent(AgentIdentity::new(id.clone(), "worker"), Lens::attend_all())
                    .unwrap();
            }
            for tick in 0..n {
                runtime.tick(tick).await.unwrap();
            }
            ids.iter()
                .map(|id| {
                    let latest = runtime.load_latest(id).unwrap().map(|e| e.version);
                    (runtime.list_versions(id).unwrap(), latest)
                })
                .collect::<Vec<_>>()
        });

        let expected: Vec<u64> = (1..=n).collect();
        for (listed, latest) in versions {
            prop_assert_eq!(listed, expected.clone());
            prop_assert_eq!(latest, Some(n));
        }
    }
}

#[test]
fn distinct_lenses_shape_same_view_differently() {
    let raw = serde_json::json!({"mood": "calm", "plan": "public", "load": 3})
        .as_object()
        .cloned()
        .unwrap();
    let sender = AgentId::new("a");
    let narrow: BTreeSet<String> = Lens::attend_all()
        .with_fields(["mood"])
        .shape(&sender, &raw)
        .unwrap()
        .keys()
        .cloned()
        .collect();
    let wide = Lens::attend_all().shape(&sender, &raw).unwrap();
    assert_eq!(narrow.len(), 1);
    assert_eq!(wide.len(), 3);
}
