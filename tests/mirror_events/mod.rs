//! Event ordering as seen by listeners of a single engine.

use znode_mirror::CoordinationClient;
use znode_mirror::CreateMode;
use znode_mirror::Event;
use znode_mirror::MemoryNamespace;
use znode_mirror::Result;

use crate::common::adds;
use crate::common::deletes;
use crate::common::TestMirror;

const CHAIN: &str = "/test/all/parent/events/received";

#[tokio::test]
async fn test_initial_load_announces_reserved_nodes() -> Result<()> {
    let namespace = MemoryNamespace::new();
    let mut mirror = TestMirror::start(&namespace).await?;

    assert_eq!(mirror.expect(3).await, adds(&["/", "/zookeeper", "/zookeeper/quota"]));
    mirror.expect_quiet().await;

    let nodes: Vec<String> = mirror.engine.get_nodes().into_iter().collect();
    assert_eq!(nodes, vec!["/", "/zookeeper", "/zookeeper/quota"]);
    Ok(())
}

#[tokio::test]
async fn test_nested_create_adds_parents_first() -> Result<()> {
    let namespace = MemoryNamespace::new();
    let mut mirror = TestMirror::started(&namespace).await?;

    assert!(mirror.engine.create_persistent(CHAIN).await?);

    assert_eq!(
        mirror.expect(5).await,
        adds(&[
            "/test",
            "/test/all",
            "/test/all/parent",
            "/test/all/parent/events",
            CHAIN,
        ])
    );
    mirror.expect_quiet().await;
    assert_eq!(mirror.engine.get_nodes().len(), 8);
    Ok(())
}

/// Each write is issued only after the previous update was observed; rapid
/// back-to-back writes may be coalesced into a single update.
#[tokio::test]
async fn test_conditional_writes_yield_updates_in_order() -> Result<()> {
    let namespace = MemoryNamespace::new();
    let mut mirror = TestMirror::started(&namespace).await?;
    mirror.engine.create_persistent("/versioned").await?;
    mirror.expect(1).await;

    mirror.engine.set_data("/versioned", 0, "first").await?;
    assert_eq!(mirror.expect(1).await, vec![Event::update("/versioned")]);
    assert_eq!(mirror.engine.get_data("/versioned")?, "first");

    mirror.engine.set_data("/versioned", 1, "second").await?;
    assert_eq!(mirror.expect(1).await, vec![Event::update("/versioned")]);
    assert_eq!(mirror.engine.get_data("/versioned")?, "second");
    assert_eq!(mirror.engine.get_stat("/versioned")?.version, 2);

    mirror.expect_quiet().await;
    Ok(())
}

#[tokio::test]
async fn test_recursive_delete_removes_deepest_first() -> Result<()> {
    let namespace = MemoryNamespace::new();
    let mut mirror = TestMirror::started(&namespace).await?;
    mirror.engine.create_persistent(CHAIN).await?;
    mirror.expect(5).await;

    mirror.engine.delete("/test").await?;

    assert_eq!(
        mirror.expect(5).await,
        deletes(&[
            CHAIN,
            "/test/all/parent/events",
            "/test/all/parent",
            "/test/all",
            "/test",
        ])
    );
    mirror.expect_quiet().await;
    assert_eq!(mirror.engine.get_nodes().len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_changes_by_other_sessions_are_mirrored() -> Result<()> {
    let namespace = MemoryNamespace::new();
    let mut mirror = TestMirror::started(&namespace).await?;
    let (writer, _) = namespace.connect();

    writer.create("/shared", b"v0", CreateMode::Persistent).await?;
    assert_eq!(mirror.expect(1).await, adds(&["/shared"]));

    writer.set_data("/shared", b"v1", -1).await?;
    assert_eq!(mirror.expect(1).await, vec![Event::update("/shared")]);
    assert_eq!(mirror.engine.get_data("/shared")?, "v1");

    writer.delete("/shared", None).await?;
    assert_eq!(mirror.expect(1).await, deletes(&["/shared"]));
    assert!(!mirror.engine.contains("/shared"));
    Ok(())
}

#[tokio::test]
async fn test_watches_are_rearmed_after_each_notification() -> Result<()> {
    let namespace = MemoryNamespace::new();
    let mut mirror = TestMirror::started(&namespace).await?;
    let session_id = mirror.session_id();

    mirror.engine.create_persistent("/rearm").await?;
    mirror.expect(1).await;
    assert!(namespace.has_data_watch(session_id, "/rearm"));
    assert!(namespace.has_child_watch(session_id, "/"));

    mirror.engine.set_data("/rearm", -1, "x").await?;
    mirror.expect(1).await;
    assert!(namespace.has_data_watch(session_id, "/rearm"));
    Ok(())
}

#[tokio::test]
async fn test_listeners_share_one_delivery_order() -> Result<()> {
    let namespace = MemoryNamespace::new();
    let mut mirror = TestMirror::started(&namespace).await?;

    let (tx, mut second) = tokio::sync::mpsc::unbounded_channel();
    mirror
        .engine
        .add_listener(std::sync::Arc::new(move |e: &Event| {
            let _ = tx.send(e.clone());
        }));

    mirror.engine.create_persistent("/order/a").await?;
    mirror.engine.create_persistent("/order/b").await?;
    let first = mirror.expect(3).await;

    let mut seen = Vec::new();
    for _ in 0..3 {
        seen.push(second.recv().await.expect("second listener closed"));
    }
    assert_eq!(first, seen);
    assert_eq!(first[0], Event::add("/order"));
    Ok(())
}
