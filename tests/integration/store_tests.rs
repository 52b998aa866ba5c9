//! Store-level tests: dedup, reclamation, lifecycle and namespaces.

use tempfile::TempDir;

use tilestash::{
    ContentHash, HandleRegistry, LifecycleState, StoreError, StoreOptions, TileCoord, TileHeaders,
    TileInfo,
};

use super::test_utils::{archive_path, open_store, open_store_with, FOO_MD5};

// =============================================================================
// Round-trip
// =============================================================================

#[tokio::test]
async fn test_foo_roundtrip() {
    let dir = TempDir::new().unwrap();
    let (_registry, store) = open_store(&dir).await;

    store
        .put_tile(TileCoord::new(0, 0, 0), &b"foo"[..], TileHeaders::new())
        .await
        .unwrap();

    let tile = store.get_tile(TileCoord::new(0, 0, 0)).await.unwrap();
    assert_eq!(&tile.data[..], b"foo");
    assert_eq!(tile.headers.content_md5(), Some(FOO_MD5));
    assert_eq!(tile.headers.len(), 1);
}

#[tokio::test]
async fn test_headers_are_kept_per_coordinate() {
    let dir = TempDir::new().unwrap();
    let (_registry, store) = open_store(&dir).await;

    let png: TileHeaders = [("Content-Type", "image/png")].into_iter().collect();
    let cached: TileHeaders = [("Cache-Control", "max-age=60")].into_iter().collect();
    store.put_tile(TileCoord::new(1, 0, 0), &b"foo"[..], png).await.unwrap();
    store.put_tile(TileCoord::new(1, 1, 0), &b"foo"[..], cached).await.unwrap();

    let a = store.get_tile(TileCoord::new(1, 0, 0)).await.unwrap();
    let b = store.get_tile(TileCoord::new(1, 1, 0)).await.unwrap();
    assert_eq!(a.data, b.data);
    assert_eq!(a.headers.get("content-type"), Some("image/png"));
    assert_eq!(a.headers.get("cache-control"), None);
    assert_eq!(b.headers.get("cache-control"), Some("max-age=60"));
    assert_eq!(b.headers.content_md5(), Some(FOO_MD5));
}

// =============================================================================
// Dedup and reclamation
// =============================================================================

#[tokio::test]
async fn test_identical_bodies_are_stored_once() {
    let dir = TempDir::new().unwrap();
    let (_registry, store) = open_store(&dir).await;
    let hash = ContentHash::of(b"ocean");

    store.put_tile(TileCoord::new(2, 0, 0), &b"ocean"[..], TileHeaders::new()).await.unwrap();
    store.put_tile(TileCoord::new(2, 3, 3), &b"ocean"[..], TileHeaders::new()).await.unwrap();

    assert_eq!(store.refcount(&hash).await.unwrap(), Some(2));
}

#[tokio::test]
async fn test_dropping_references_reclaims_body() {
    let dir = TempDir::new().unwrap();
    let (_registry, store) = open_store(&dir).await;
    let hash = ContentHash::of(b"ocean");
    let a = TileCoord::new(2, 0, 0);
    let b = TileCoord::new(2, 1, 0);

    store.put_tile(a, &b"ocean"[..], TileHeaders::new()).await.unwrap();
    store.put_tile(b, &b"ocean"[..], TileHeaders::new()).await.unwrap();

    store.drop_tile(a).await.unwrap();
    assert_eq!(store.refcount(&hash).await.unwrap(), Some(1));
    assert!(matches!(
        store.get_tile(a).await,
        Err(StoreError::TileNotFound { .. })
    ));
    assert_eq!(&store.get_tile(b).await.unwrap().data[..], b"ocean");

    store.drop_tile(b).await.unwrap();
    assert_eq!(store.refcount(&hash).await.unwrap(), None);
}

#[tokio::test]
async fn test_overwrite_releases_previous_body() {
    let dir = TempDir::new().unwrap();
    let (_registry, store) = open_store(&dir).await;
    let coord = TileCoord::new(0, 0, 0);

    store.put_tile(coord, &b"old"[..], TileHeaders::new()).await.unwrap();
    store.put_tile(coord, &b"new"[..], TileHeaders::new()).await.unwrap();

    assert_eq!(store.refcount(&ContentHash::of(b"old")).await.unwrap(), None);
    assert_eq!(store.refcount(&ContentHash::of(b"new")).await.unwrap(), Some(1));
    assert_eq!(&store.get_tile(coord).await.unwrap().data[..], b"new");
}

#[tokio::test]
async fn test_rewriting_same_body_keeps_one_reference() {
    let dir = TempDir::new().unwrap();
    let (_registry, store) = open_store(&dir).await;
    let coord = TileCoord::new(0, 0, 0);

    store.put_tile(coord, &b"foo"[..], TileHeaders::new()).await.unwrap();
    store.put_tile(coord, &b"foo"[..], TileHeaders::new()).await.unwrap();

    assert_eq!(store.refcount(&ContentHash::of(b"foo")).await.unwrap(), Some(1));
}

#[tokio::test]
async fn test_drop_absent_tile_is_not_found() {
    let dir = TempDir::new().unwrap();
    let (_registry, store) = open_store(&dir).await;
    store.put_tile(TileCoord::new(0, 0, 0), &b"foo"[..], TileHeaders::new()).await.unwrap();

    let err = store.drop_tile(TileCoord::new(3, 1, 1)).await.unwrap_err();
    assert!(matches!(err, StoreError::TileNotFound { .. }));
    assert!(err.is_not_found());
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_get_on_missing_archive() {
    let dir = TempDir::new().unwrap();
    let (_registry, store) = open_store(&dir).await;

    assert_eq!(store.state().await, LifecycleState::Missing);
    assert!(matches!(
        store.get_tile(TileCoord::new(5, 5, 5)).await,
        Err(StoreError::ArchiveMissing { .. })
    ));
    assert!(matches!(
        store.get_info().await,
        Err(StoreError::ArchiveMissing { .. })
    ));
}

#[tokio::test]
async fn test_get_on_empty_archive_is_not_found() {
    let dir = TempDir::new().unwrap();
    let (_registry, store) = open_store(&dir).await;
    store.open_for_write().await.unwrap();

    assert!(matches!(
        store.get_tile(TileCoord::new(5, 5, 5)).await,
        Err(StoreError::TileNotFound { .. })
    ));
}

#[tokio::test]
async fn test_info_roundtrip() {
    let dir = TempDir::new().unwrap();
    let (_registry, store) = open_store(&dir).await;

    let mut info = TileInfo::new("xyz", 0, 5);
    info.extra
        .insert("attribution".to_string(), serde_json::json!("© contributors"));
    store.put_info(&info).await.unwrap();

    assert_eq!(store.get_info().await.unwrap(), info);
}

#[tokio::test]
async fn test_close_twice_compacts_once() {
    let dir = TempDir::new().unwrap();
    let (_registry, store) = open_store(&dir).await;

    store.put_tile(TileCoord::new(0, 0, 0), &b"foo"[..], TileHeaders::new()).await.unwrap();
    store.close().await.unwrap();
    store.close().await.unwrap();

    assert_eq!(store.compactions(), 1);
    assert_eq!(store.state().await, LifecycleState::Closed);
}

#[tokio::test]
async fn test_compaction_can_be_disabled() {
    let dir = TempDir::new().unwrap();
    let options = StoreOptions::default().with_compact_on_close(false);
    let (_registry, store) = open_store_with(&dir, options).await;

    store.put_tile(TileCoord::new(0, 0, 0), &b"foo"[..], TileHeaders::new()).await.unwrap();
    store.close().await.unwrap();
    assert_eq!(store.compactions(), 0);
}

#[tokio::test]
async fn test_closed_store_rejects_writes() {
    let dir = TempDir::new().unwrap();
    let (_registry, store) = open_store(&dir).await;
    store.close().await.unwrap();

    assert!(matches!(
        store.put_tile(TileCoord::new(0, 0, 0), &b"foo"[..], TileHeaders::new()).await,
        Err(StoreError::Closed)
    ));
}

#[tokio::test]
async fn test_tiles_survive_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let (registry, store) = open_store(&dir).await;
        store.put_tile(TileCoord::new(0, 0, 0), &b"foo"[..], TileHeaders::new()).await.unwrap();
        store.put_info(&TileInfo::new("xyz", 0, 0)).await.unwrap();
        store.close().await.unwrap();
        drop(store);
        drop(registry);
    }

    let registry = HandleRegistry::new();
    let store = registry
        .open(archive_path(&dir), StoreOptions::default())
        .await
        .unwrap();
    assert_eq!(store.state().await, LifecycleState::ReadOnly);
    assert_eq!(
        store.get_tile(TileCoord::new(0, 0, 0)).await.unwrap().headers.content_md5(),
        Some(FOO_MD5)
    );
    assert_eq!(store.get_info().await.unwrap().scheme.as_deref(), Some("xyz"));
}

#[tokio::test]
async fn test_second_registry_on_open_archive_conflicts() {
    let dir = TempDir::new().unwrap();
    let (_registry, store) = open_store(&dir).await;
    store.put_tile(TileCoord::new(0, 0, 0), &b"foo"[..], TileHeaders::new()).await.unwrap();

    let other = HandleRegistry::new();
    let result = other.open(archive_path(&dir), StoreOptions::default()).await;
    assert!(matches!(
        result,
        Err(StoreError::ConcurrentOpenConflict { .. })
    ));
}

// =============================================================================
// Namespaces
// =============================================================================

#[tokio::test]
async fn test_namespaces_are_isolated() {
    let dir = TempDir::new().unwrap();
    let registry = HandleRegistry::new();
    let path = archive_path(&dir);

    let png = registry
        .open(&path, StoreOptions::default().with_format("png"))
        .await
        .unwrap();
    let retina = registry
        .open(&path, StoreOptions::default().with_format("png").with_scale(2))
        .await
        .unwrap();

    png.put_tile(TileCoord::new(0, 0, 0), &b"1x"[..], TileHeaders::new()).await.unwrap();
    retina.put_tile(TileCoord::new(0, 0, 0), &b"2x"[..], TileHeaders::new()).await.unwrap();

    assert_eq!(&png.get_tile(TileCoord::new(0, 0, 0)).await.unwrap().data[..], b"1x");
    assert_eq!(&retina.get_tile(TileCoord::new(0, 0, 0)).await.unwrap().data[..], b"2x");
    assert_eq!(registry.cached_count().await, 1);
}

// =============================================================================
// Integrity
// =============================================================================

#[tokio::test]
async fn test_body_not_matching_its_hash_fails_reads() {
    let dir = TempDir::new().unwrap();
    let (_registry, store) = open_store(&dir).await;

    // trusted caller-supplied hash that does not describe the body
    let mislabeled: TileHeaders = [("content-md5", FOO_MD5)].into_iter().collect();
    store
        .put_tile(TileCoord::new(1, 0, 0), &b"not foo"[..], mislabeled)
        .await
        .unwrap();

    match store.get_tile(TileCoord::new(1, 0, 0)).await {
        Err(StoreError::Integrity { expected, actual }) => {
            assert_eq!(expected, FOO_MD5);
            assert_eq!(actual, ContentHash::of(b"not foo").as_str());
        }
        other => panic!("expected integrity error, got {:?}", other),
    }
}

// =============================================================================
// Compaction across stores
// =============================================================================

#[tokio::test]
async fn test_last_store_to_close_compacts_after_another_wrote() {
    let dir = TempDir::new().unwrap();
    let registry = HandleRegistry::new();
    let path = archive_path(&dir);

    let reader = registry.open(&path, StoreOptions::default()).await.unwrap();
    let writer = registry.open(&path, StoreOptions::default()).await.unwrap();
    writer
        .put_tile(TileCoord::new(0, 0, 0), &b"foo"[..], TileHeaders::new())
        .await
        .unwrap();

    writer.close().await.unwrap();
    assert_eq!(writer.compactions(), 0);

    reader.close().await.unwrap();
    assert_eq!(reader.compactions(), 1);
}

#[tokio::test]
async fn test_read_only_session_after_compaction_does_not_compact_again() {
    let dir = TempDir::new().unwrap();
    let registry = HandleRegistry::new();
    let path = archive_path(&dir);

    let writer = registry.open(&path, StoreOptions::default()).await.unwrap();
    writer
        .put_tile(TileCoord::new(0, 0, 0), &b"foo"[..], TileHeaders::new())
        .await
        .unwrap();
    writer.close().await.unwrap();
    assert_eq!(writer.compactions(), 1);

    let reader = registry.open(&path, StoreOptions::default()).await.unwrap();
    reader.get_tile(TileCoord::new(0, 0, 0)).await.unwrap();
    reader.close().await.unwrap();
    assert_eq!(reader.compactions(), 1);
}
