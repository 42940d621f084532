//! Recovery from corrupt or unreadable version files.

use super::common::AppendDot;
use mindgraph::store::{AgentStateHandle, FileStateStore, PrivateStateStore};
use mindgraph::{AgentId, AgentIdentity, GraphRuntime, Lens, PrivateContent, StateUpdate, StorageError};
use std::sync::Arc;

fn seeded_store(dir: &std::path::Path, versions: u64) -> (Arc<FileStateStore>, AgentId) {
    let store = Arc::new(FileStateStore::open(dir).unwrap());
    let agent = AgentId::new("a");
    let handle = AgentStateHandle::new(agent.clone(), store.clone());
    for version in 1..=versions {
        handle
            .commit(version - 1, PrivateContent::new(format!("state {}", version)))
            .unwrap();
    }
    (store, agent)
}

#[test]
fn corrupt_middle_version_does_not_hide_latest() {
    let dir = tempfile::tempdir().unwrap();
    let (store, agent) = seeded_store(dir.path(), 3);
    let v2 = store.agent_dir(&agent).join("v2.json");
    std::fs::write(&v2, b"{\"agent_id\": \"a\", \"vers").unwrap();

    let latest = store.load_latest(&agent).unwrap().unwrap();
    assert_eq!(latest.version, 3);
    assert_eq!(latest.content.as_str(), "state 3");

    assert!(matches!(
        store.load_version(&agent, 2),
        Err(StorageError::Corrupt { .. })
    ));
    assert_eq!(store.list_versions(&agent).unwrap(), vec![1, 2, 3]);
}

#[test]
fn corrupt_latest_falls_back_to_next_readable() {
    let dir = tempfile::tempdir().unwrap();
    let (store, agent) = seeded_store(dir.path(), 3);
    std::fs::write(store.agent_dir(&agent).join("v3.json"), b"").unwrap();
    std::fs::write(store.agent_dir(&agent).join("v2.json"), b"not json").unwrap();

    let latest = store.load_latest(&agent).unwrap().unwrap();
    assert_eq!(latest.version, 1);
}

#[test]
fn all_versions_unreadable_yields_none() {
    let dir = tempfile::tempdir().unwrap();
    let (store, agent) = seeded_store(dir.path(), 2);
    for version in 1..=2 {
        std::fs::write(
            store.agent_dir(&agent).join(format!("v{}.json", version)),
            b"\x00\x01",
        )
        .unwrap();
    }
    assert!(store.load_latest(&agent).unwrap().is_none());
}

#[tokio::test]
async fn runtime_commits_past_corrupt_latest() {
    let dir = tempfile::tempdir().unwrap();
    let (store, agent) = seeded_store(dir.path(), 2);
    std::fs::write(store.agent_dir(&agent).join("v2.json"), b"{").unwrap();

    let mut runtime = GraphRuntime::new(store.clone(), Arc::new(AppendDot::default()));
    runtime
        .register_agent(AgentIdentity::new("a", "survivor"), Lens::attend_all())
        .unwrap();
    let report = runtime.tick(0).await.unwrap();
    assert_eq!(
        report.agents[0].update,
        StateUpdate::Committed { version: 3 }
    );

    // Reasoned from v1, the newest readable version.
    let latest = runtime.load_latest(&agent).unwrap().unwrap();
    assert_eq!(latest.version, 3);
    assert_eq!(latest.content.as_str(), "state 1.");
}

#[test]
fn unwritable_root_fails_at_open() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("occupied");
    std::fs::write(&blocker, b"a file, not a directory").unwrap();

    assert!(matches!(
        FileStateStore::open(blocker.join("state")),
        Err(StorageError::NotWritable(_))
    ));
}
