//! Registry-driven out-of-band control of live connections.

mod common;

use common::{ProcessorScript, SinkEvent, begin, hello, run, test_context};
use graphwire::{ConnectionId, ConnectionWorker, MessageSink, SessionRegistry};

#[tokio::test]
async fn interrupt_through_the_registry_reaches_the_worker() {
    let (ctx, sink, calls) = test_context(ProcessorScript::default());
    let (worker, mut queue, handle) = ConnectionWorker::new(ctx);
    let registry = SessionRegistry::default();
    let id = ConnectionId::new(1);
    registry.insert(id, &handle);

    queue.on_message(run()).expect("queue run");
    assert!(registry.interrupt(&id));
    drop(queue);
    drop(handle);
    worker.run().await;

    // The interrupt outran the earlier-queued run, which was then ignored.
    assert!(calls.lock().expect("calls").is_empty());
    assert_eq!(sink.events(), vec![SinkEvent::Ignored]);
}

#[tokio::test]
async fn close_through_the_registry_stops_the_worker() {
    let (ctx, _sink, calls) = test_context(ProcessorScript::default());
    let (worker, mut queue, handle) = ConnectionWorker::new(ctx);
    let registry = SessionRegistry::default();
    let id = ConnectionId::new(2);
    registry.insert(id, &handle);
    queue.on_message(hello()).expect("queue hello");
    queue.on_message(begin()).expect("queue begin");

    let join = tokio::spawn(worker.run());
    while !calls.lock().expect("calls").contains(&"begin") {
        tokio::task::yield_now().await;
    }
    registry.close(&id);
    join.await.expect("worker join");

    assert!(handle.is_closed());
    assert_eq!(calls.lock().expect("calls").as_slice(), ["begin", "rollback"]);
}

#[test]
fn stale_entries_are_lazily_removed_on_lookup() {
    let registry = SessionRegistry::default();
    let id = ConnectionId::new(3);
    {
        let (ctx, _sink, _calls) = test_context(ProcessorScript::default());
        let (_worker, _queue, handle) = ConnectionWorker::new(ctx);
        registry.insert(id, &handle);
        assert!(registry.get(&id).is_some());
    }

    // Every handle is gone; lookup fails and evicts the dead entry.
    assert!(registry.get(&id).is_none());
    assert!(!registry.interrupt(&id));
    assert!(registry.active_ids().is_empty());
}

#[test]
fn prune_retains_only_live_connections() {
    let registry = SessionRegistry::default();
    let (ctx, _sink, _calls) = test_context(ProcessorScript::default());
    let (_worker, _queue, handle) = ConnectionWorker::new(ctx);
    let live = ConnectionId::new(4);
    registry.insert(live, &handle);

    let stale = ConnectionId::new(5);
    {
        let (ctx, _sink, _calls) = test_context(ProcessorScript::default());
        let (_worker, _queue, handle) = ConnectionWorker::new(ctx);
        registry.insert(stale, &handle);
    }

    registry.prune();
    assert_eq!(registry.active_ids(), vec![live]);
    assert!(registry.get(&stale).is_none());
    assert!(registry.get(&live).is_some());
}

#[test]
fn removed_connections_are_no_longer_reachable() {
    let registry = SessionRegistry::default();
    let (ctx, _sink, _calls) = test_context(ProcessorScript::default());
    let (_worker, _queue, handle) = ConnectionWorker::new(ctx);
    let id = ConnectionId::new(6);
    registry.insert(id, &handle);

    registry.remove(&id);
    assert!(registry.get(&id).is_none());
    assert!(!registry.interrupt(&id));
    // The handle itself still works; only the registry entry is gone.
    assert!(handle.interrupt());
}
