//! Remote mutations issued through the engine and their mirrored outcome.

use znode_mirror::CoordinationClient;
use znode_mirror::CreateMode;
use znode_mirror::Error;
use znode_mirror::MemoryNamespace;
use znode_mirror::Result;

use crate::common::adds;
use crate::common::TestMirror;

#[tokio::test]
async fn test_prune_returns_nearest_ancestor_with_children() -> Result<()> {
    let namespace = MemoryNamespace::new();
    let mut mirror = TestMirror::started(&namespace).await?;
    mirror.engine.create_persistent("/base/test/1/2/3").await?;
    mirror.engine.create_persistent("/base/1").await?;
    mirror.expect(6).await;

    assert_eq!(mirror.engine.prune("/base/test/1/2/3").await?, "/base");

    mirror.expect(4).await;
    let remaining: Vec<String> = namespace
        .paths()
        .into_iter()
        .filter(|p| p.starts_with("/base"))
        .collect();
    assert_eq!(remaining, vec!["/base", "/base/1"]);
    assert!(!mirror.engine.contains("/base/test"));
    Ok(())
}

#[tokio::test]
async fn test_trim_removes_children_only() -> Result<()> {
    let namespace = MemoryNamespace::new();
    let mut mirror = TestMirror::started(&namespace).await?;
    for path in ["/trim/a", "/trim/b/deep", "/trim/c"] {
        mirror.engine.create_persistent(path).await?;
    }
    mirror.expect(5).await;

    mirror.engine.trim("/trim").await?;
    mirror.expect(4).await;

    assert!(mirror.engine.contains("/trim"));
    assert!(mirror.engine.get_children("/trim")?.is_empty());

    let (reader, _) = namespace.connect();
    let stat = reader.exists("/trim", false).await?.expect("trimmed node must stay");
    assert_eq!(stat.num_children, 0);
    Ok(())
}

#[tokio::test]
async fn test_sequential_creates_get_increasing_suffixes() -> Result<()> {
    let namespace = MemoryNamespace::new();
    let mut mirror = TestMirror::started(&namespace).await?;

    let first = mirror
        .engine
        .create_with_data("/queue/item-", b"", CreateMode::PersistentSequential)
        .await?;
    let second = mirror
        .engine
        .create_with_data("/queue/item-", b"", CreateMode::PersistentSequential)
        .await?;
    assert_eq!(first.as_deref(), Some("/queue/item-0000000000"));
    assert_eq!(second.as_deref(), Some("/queue/item-0000000001"));

    mirror.expect(3).await;
    assert_eq!(
        mirror.engine.get_children("/queue")?,
        vec!["item-0000000000", "item-0000000001"]
    );
    assert!(!namespace.paths().contains("/queue/item-"));
    Ok(())
}

#[tokio::test]
async fn test_ephemeral_sequential_nodes_are_numbered_and_owned() -> Result<()> {
    let namespace = MemoryNamespace::new();
    let mut mirror = TestMirror::started(&namespace).await?;

    let first = mirror
        .engine
        .create_with_data("/workers/pool/member-", b"a", CreateMode::EphemeralSequential)
        .await?;
    let second = mirror
        .engine
        .create_with_data("/workers/pool/member-", b"b", CreateMode::EphemeralSequential)
        .await?;
    assert_eq!(first.as_deref(), Some("/workers/pool/member-0000000000"));
    assert_eq!(second.as_deref(), Some("/workers/pool/member-0000000001"));

    // Two persistent ancestors, then both members
    mirror.expect(4).await;
    assert!(!namespace.paths().contains("/workers/pool/member-"));

    let owner = mirror.session_id();
    assert_ne!(owner, 0);
    for member in ["/workers/pool/member-0000000000", "/workers/pool/member-0000000001"] {
        assert_eq!(mirror.engine.get_stat(member)?.ephemeral_owner, owner);
    }
    assert_eq!(mirror.engine.get_data("/workers/pool/member-0000000001")?, "b");
    assert_eq!(mirror.engine.get_stat("/workers")?.ephemeral_owner, 0);
    assert_eq!(mirror.engine.get_stat("/workers/pool")?.ephemeral_owner, 0);
    Ok(())
}

#[tokio::test]
async fn test_ephemeral_nodes_carry_their_owner() -> Result<()> {
    let namespace = MemoryNamespace::new();
    let mut mirror = TestMirror::started(&namespace).await?;

    mirror.engine.create("/owned/ephemeral", CreateMode::Ephemeral).await?;
    mirror.engine.create("/owned/persistent", CreateMode::Persistent).await?;
    assert_eq!(
        mirror.expect(3).await,
        adds(&["/owned", "/owned/ephemeral", "/owned/persistent"])
    );

    let ephemeral = mirror.engine.get_stat("/owned/ephemeral")?;
    assert_ne!(ephemeral.ephemeral_owner, 0);
    assert_eq!(ephemeral.ephemeral_owner, mirror.session_id());
    assert_eq!(mirror.engine.get_stat("/owned/persistent")?.ephemeral_owner, 0);
    assert_eq!(mirror.engine.get_stat("/owned")?.ephemeral_owner, 0);
    Ok(())
}

#[tokio::test]
async fn test_duplicate_create_is_a_no_op() -> Result<()> {
    let namespace = MemoryNamespace::new();
    let mut mirror = TestMirror::started(&namespace).await?;

    assert!(mirror.engine.create_persistent("/once").await?);
    assert!(!mirror.engine.create_persistent("/once").await?);
    assert!(!mirror.engine.create("/once", CreateMode::Ephemeral).await?);

    assert_eq!(mirror.expect(1).await, adds(&["/once"]));
    mirror.expect_quiet().await;
    Ok(())
}

#[tokio::test]
async fn test_stale_version_is_rejected() -> Result<()> {
    let namespace = MemoryNamespace::new();
    let mut mirror = TestMirror::started(&namespace).await?;
    mirror.engine.create_persistent("/cas").await?;
    mirror.expect(1).await;
    mirror.engine.set_data("/cas", 0, "a").await?;

    let result = mirror.engine.set_data("/cas", 0, "b").await;
    assert!(
        matches!(result, Err(Error::VersionConflict { expected: 0, actual: 1, .. })),
        "{result:?}"
    );

    mirror.expect(1).await;
    assert_eq!(mirror.engine.get_data("/cas")?, "a");
    Ok(())
}

#[tokio::test]
async fn test_unknown_paths_are_not_found() -> Result<()> {
    let namespace = MemoryNamespace::new();
    let mirror = TestMirror::started(&namespace).await?;

    assert!(matches!(mirror.engine.get_data("/nowhere"), Err(Error::NotFound(_))));
    assert!(matches!(mirror.engine.get_stat("/nowhere"), Err(Error::NotFound(_))));
    assert!(matches!(mirror.engine.get_children("/nowhere"), Err(Error::NotFound(_))));
    assert!(matches!(
        mirror.engine.set_data("/nowhere", -1, "x").await,
        Err(Error::NotFound(_))
    ));
    assert!(matches!(mirror.engine.delete("/nowhere").await, Err(Error::NotFound(_))));
    Ok(())
}

#[tokio::test]
async fn test_ephemeral_parent_cannot_have_children() -> Result<()> {
    let namespace = MemoryNamespace::new();
    let mirror = TestMirror::started(&namespace).await?;
    mirror.engine.create("/lease", CreateMode::Ephemeral).await?;

    let result = mirror.engine.create_persistent("/lease/child").await;
    assert!(matches!(result, Err(Error::Remote(_))), "{result:?}");
    Ok(())
}
