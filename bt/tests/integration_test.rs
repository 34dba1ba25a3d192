//! Integration tests for buildtree
//!
//! These exercise sessions end to end: producers on several threads, live
//! subscribers, cancellation and the tree-shape properties.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use buildtree::config::Config;
use buildtree::store::MessageEntry;
use buildtree::{
    BuildResult, Delivery, Event, EventId, IngestError, NodeDelta, NodeState, SessionRegistry, Severity,
};
use proptest::prelude::*;

// =============================================================================
// Build scenario
// =============================================================================

#[test]
fn test_build_scenario_through_session() {
    let registry = SessionRegistry::default();
    let session = registry.new_session("Build");
    let emitter = session.emitter();

    emitter.start_build("1", "Build", "").unwrap();
    emitter.start("2", "1", "Compile").unwrap();
    emitter.error("m1", "2", "syntax error").unwrap();
    emitter.finish("2", BuildResult::failure()).unwrap();
    emitter.finish("1", BuildResult::failure()).unwrap();

    let root = session.snapshot().expect("root");
    assert_eq!(root.state, NodeState::Finished);
    assert_eq!(root.child_ids(), vec![&EventId::from("2")]);

    let compile = &root.children[0];
    assert_eq!(compile.result, Some(BuildResult::failure()));
    assert_eq!(compile.messages.len(), 1);
    assert_eq!(compile.messages[0].severity, Severity::Error);
    assert!(!compile.messages[0].late);

    assert_eq!(
        emitter.finish("2", BuildResult::success()).unwrap_err(),
        IngestError::DuplicateFinish(EventId::from("2"))
    );
    assert_eq!(session.snapshot().unwrap(), root);
}

#[test]
fn test_rejections_leave_tree_unchanged() {
    let registry = SessionRegistry::default();
    let session = registry.new_session("Build");
    session.ingest(Event::start_build("1", "Build")).unwrap();
    let before = session.tree_snapshot();

    let rejected = [
        Event::start("2", "nope", "Orphan"),
        Event::start("1", "1", "Self"),
        Event::start_build("9", "Second root"),
        Event::progress_count("1", 5, 2),
        Event::progress_fraction("1", 1.5),
        Event::output("ghost", "text", false),
        Event::message("m1", "ghost", Severity::Info, "hello"),
        Event::finish("ghost", BuildResult::success()),
    ];
    for event in rejected {
        assert!(session.ingest(event).is_err());
    }

    assert_eq!(session.tree_snapshot(), before);
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn test_concurrent_sibling_starts() {
    const WORKERS: usize = 8;
    const TASKS: usize = 50;

    let mut config = Config::default();
    config.notifier.channel_capacity = 4096;
    let registry = SessionRegistry::new(config);
    let session = registry.new_session("Build");
    session.ingest(Event::start_build("root", "Build")).unwrap();
    let (snapshot, mut subscription) = session.subscribe().unwrap();
    assert_eq!(snapshot.seq, 1);

    // Every worker starts its own nodes and writes output and messages into them
    let producers: Vec<_> = (0..WORKERS)
        .map(|worker| {
            let emitter = session.emitter();
            thread::spawn(move || {
                for i in 0..TASKS {
                    let id = format!("w{}-{}", worker, i);
                    emitter.start(id.as_str(), "root", &format!("task {}", i)).unwrap();
                    emitter.output(id.as_str(), &format!("{} output\n", id), false).unwrap();
                    emitter
                        .info(format!("{}-m", id), id.as_str(), &format!("{} done", id))
                        .unwrap();
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    let root = session.snapshot().unwrap();
    assert_eq!(root.children.len(), WORKERS * TASKS);

    for child in &root.children {
        let (_, i) = child.id.as_str().split_once('-').unwrap();
        assert_eq!(child.title, format!("task {}", i));
        assert_eq!(child.parent_id, Some(EventId::from("root")));
        assert_eq!(child.depth, 1);
        assert_eq!(child.state, NodeState::Running);
        assert!(child.children.is_empty());

        assert_eq!(child.output.len(), 1);
        assert_eq!(child.output[0].text, format!("{} output\n", child.id));
        assert_eq!(child.messages.len(), 1);
        assert_eq!(child.messages[0].id, EventId::from(format!("{}-m", child.id)));
        assert_eq!(child.messages[0].message, format!("{} done", child.id));
    }

    // Deltas arrive in acceptance order and positions match the final tree
    let deliveries = subscription.drain();
    assert_eq!(deliveries.len(), WORKERS * TASKS * 3);
    let mut added = 0;
    for (idx, delivery) in deliveries.iter().enumerate() {
        let Delivery::Delta(delta) = delivery else {
            panic!("unexpected lag");
        };
        assert_eq!(delta.seq, idx as u64 + 2);
        match &delta.delta {
            NodeDelta::NodeAdded { node, position, .. } => {
                assert_eq!(*position, added);
                assert_eq!(root.children[added].id, node.id);
                added += 1;
            }
            NodeDelta::OutputAppended { id, chunk } => {
                assert_eq!(chunk.text, format!("{} output\n", id));
            }
            NodeDelta::MessageAppended {
                parent_id,
                position,
                entry,
            } => {
                assert_eq!(*position, 0);
                assert_eq!(entry.message, format!("{} done", parent_id));
            }
            other => panic!("unexpected delta: {:?}", other),
        }
    }
    assert_eq!(added, WORKERS * TASKS);

    // Each worker's own starts keep their relative order
    let mut last_seen: HashMap<&str, usize> = HashMap::new();
    for child in &root.children {
        let (worker, i) = child.id.as_str().split_once('-').unwrap();
        let i: usize = i.parse().unwrap();
        if let Some(prev) = last_seen.insert(worker, i) {
            assert!(prev < i);
        }
    }
}

#[test]
fn test_deep_chain_stops_at_max_depth() {
    const CHAIN: u64 = 100_000;
    let registry = SessionRegistry::default();
    let session = registry.new_session("Build");
    session.ingest(Event::start_build(0u64, "Build")).unwrap();

    let max_depth = Config::default().store.max_depth as u64;
    for id in 1..=CHAIN {
        let result = session.ingest(Event::start(id, id - 1, format!("step {}", id)));
        if id <= max_depth {
            assert!(result.is_ok(), "start {} rejected", id);
        } else if id == max_depth + 1 {
            assert_eq!(result.unwrap_err().kind(), "MalformedEvent");
        } else {
            assert_eq!(
                result.unwrap_err(),
                IngestError::UnknownParent {
                    id: EventId::from(id),
                    parent_id: EventId::from(id - 1),
                }
            );
        }
    }

    let root = session.snapshot().unwrap();
    assert_eq!(root.node_count(), max_depth as usize + 1);
    let deepest = root.find(&EventId::from(max_depth)).expect("deepest node");
    assert_eq!(deepest.depth, max_depth as usize);

    let (tree, _subscription) = session.subscribe().unwrap();
    assert_eq!(tree.root.as_ref(), Some(&root));
    assert_eq!(session.tree_snapshot().seq, max_depth + 1);
    registry.close_session(&session);
}

#[tokio::test]
async fn test_async_subscriber_follows_producer() {
    let registry = SessionRegistry::default();
    let session = registry.new_session("Build");
    let (snapshot, mut subscription) = session.subscribe().unwrap();
    assert!(snapshot.root.is_none());

    let consumer = tokio::spawn(async move {
        let mut seqs = Vec::new();
        let mut messages: Vec<MessageEntry> = Vec::new();
        while let Some(delivery) = subscription.recv().await {
            if let Delivery::Delta(delta) = delivery {
                seqs.push(delta.seq);
                if let NodeDelta::MessageAppended { entry, .. } = delta.delta {
                    messages.push(entry);
                }
            }
        }
        (seqs, messages)
    });

    let emitter = session.emitter();
    tokio::task::spawn_blocking(move || {
        emitter.start_build("1", "Build", "").unwrap();
        emitter.start("2", "1", "Test").unwrap();
        emitter.progress("2", 1, 3, Some("suites")).unwrap();
        emitter.warning("m1", "2", "slow test").unwrap();
        emitter.finish("2", BuildResult::success()).unwrap();
        emitter.finish("1", BuildResult::success()).unwrap();
    })
    .await
    .unwrap();

    registry.close_session(&session);
    let (seqs, messages) = tokio::time::timeout(Duration::from_secs(5), consumer)
        .await
        .expect("consumer should finish once the session closes")
        .unwrap();

    assert_eq!(seqs, vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].message, "slow test");
}

#[test]
fn test_slow_subscriber_is_told_it_lagged() {
    let mut config = Config::default();
    config.notifier.channel_capacity = 4;
    let registry = SessionRegistry::new(config);
    let session = registry.new_session("Build");

    let (_, mut slow) = session.subscribe().unwrap();
    let emitter = session.emitter();
    emitter.start_build("1", "Build", "").unwrap();
    for i in 0..10 {
        emitter.output("1", &format!("line {}\n", i), false).unwrap();
    }

    // Producers never block on a slow subscriber
    assert_eq!(session.tree_snapshot().seq, 11);

    let deliveries = slow.drain();
    assert_eq!(deliveries[0], Delivery::Lagged { missed: 7 });
    let seqs: Vec<u64> = deliveries[1..]
        .iter()
        .map(|d| match d {
            Delivery::Delta(delta) => delta.seq,
            Delivery::Lagged { .. } => panic!("lagged twice"),
        })
        .collect();
    assert_eq!(seqs, vec![8, 9, 10, 11]);
}

// =============================================================================
// Cancellation
// =============================================================================

#[test]
fn test_cancel_finishes_running_nodes_deepest_first() {
    let registry = SessionRegistry::default();
    let session = registry.new_session("Build");
    let emitter = session.emitter();
    emitter.start_build("root", "Build", "").unwrap();
    emitter.start("a", "root", "Compile").unwrap();
    emitter.start("a1", "a", "Compile module").unwrap();
    emitter.start("b", "root", "Lint").unwrap();
    emitter.finish("b", BuildResult::success()).unwrap();

    let deltas = session.cancel("Build cancelled").unwrap();
    let order: Vec<&str> = deltas.iter().map(|d| d.node_id().as_str()).collect();
    assert_eq!(order, vec!["a1", "a", "root"]);
    for delta in &deltas {
        match delta {
            NodeDelta::NodeFinished { result, message, .. } => {
                assert_eq!(*result, BuildResult::Cancelled);
                assert_eq!(message, "Build cancelled");
            }
            other => panic!("unexpected delta: {:?}", other),
        }
    }

    let root = session.snapshot().unwrap();
    assert_eq!(root.find(&EventId::from("b")).unwrap().result, Some(BuildResult::success()));
    assert_eq!(root.result, Some(BuildResult::Cancelled));

    // Nothing left to cancel
    assert!(session.cancel("again").unwrap().is_empty());
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    /// Any sequence of starts under already-started parents is accepted, and
    /// every parent lists its children in arrival order
    #[test]
    fn prop_well_formed_starts_build_ordered_tree(parents in prop::collection::vec(any::<prop::sample::Index>(), 1..60)) {
        let registry = SessionRegistry::default();
        let session = registry.new_session("Build");
        session.ingest(Event::start_build("0", "Build")).unwrap();

        let mut expected: HashMap<EventId, Vec<EventId>> = HashMap::new();
        for (i, pick) in parents.iter().enumerate() {
            let id = EventId::from((i + 1) as u64);
            let parent = EventId::from(pick.index(i + 1) as u64);
            prop_assert!(session.ingest(Event::start(id.clone(), parent.clone(), "task")).is_ok());
            expected.entry(parent).or_default().push(id);
        }

        let root = session.snapshot().unwrap();
        prop_assert_eq!(root.node_count(), parents.len() + 1);
        for (parent, children) in &expected {
            let node = root.find(parent).unwrap();
            let actual: Vec<EventId> = node.child_ids().into_iter().cloned().collect();
            prop_assert_eq!(&actual, children);
            for child in &node.children {
                prop_assert_eq!(child.depth, node.depth + 1);
                prop_assert_eq!(child.parent_id.as_ref(), Some(parent));
            }
        }
    }

    /// Finishing nodes in any order finishes each exactly once
    #[test]
    fn prop_finish_is_at_most_once(order in Just((1..=8u64).collect::<Vec<_>>()).prop_shuffle()) {
        let registry = SessionRegistry::default();
        let session = registry.new_session("Build");
        session.ingest(Event::start_build("0", "Build")).unwrap();
        for id in 1..=8u64 {
            session.ingest(Event::start(id, 0u64, "task")).unwrap();
        }

        for id in &order {
            prop_assert!(session.ingest(Event::finish(*id, BuildResult::success())).is_ok());
            prop_assert_eq!(
                session.ingest(Event::finish(*id, BuildResult::failure())).unwrap_err(),
                IngestError::DuplicateFinish(EventId::from(*id))
            );
        }

        let root = session.snapshot().unwrap();
        prop_assert!(root.children.iter().all(|c| c.result == Some(BuildResult::success())));
        prop_assert!(root.children.iter().all(|c| c.end_time.unwrap() >= c.start_time));
    }
}

#[test]
fn test_sessions_share_nothing() {
    let registry = Arc::new(SessionRegistry::default());
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                let session = registry.new_session(&format!("build {}", i));
                session.ingest(Event::start_build("1", "")).unwrap();
                session
            })
        })
        .collect();
    let sessions: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(registry.len(), 4);
    for (i, session) in sessions.iter().enumerate() {
        assert_eq!(session.snapshot().unwrap().title, format!("build {}", i));
    }
}
