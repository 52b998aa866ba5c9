//! Export to and import from `{z}/{x}/{y}` directory trees.

use tempfile::TempDir;

use tilestash::transfer::INFO_FILE;
use tilestash::{
    export, import, HandleRegistry, StoreOptions, StreamOptions, TileCoord, TileHeaders, TileInfo,
};

use super::test_utils::{body_for, full_pyramid, open_store, put_all};

#[tokio::test]
async fn test_export_writes_tree() {
    let dir = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let (_registry, store) = open_store(&dir).await;
    put_all(&store, &full_pyramid(2)).await;
    store.put_info(&TileInfo::new("xyz", 0, 2)).await.unwrap();

    let summary = export(&store, StreamOptions::default(), out.path(), ".png")
        .await
        .unwrap();

    assert_eq!(summary.tiles, 21);
    assert_eq!(summary.failed, 0);
    assert!(summary.info);
    assert!(out.path().join(INFO_FILE).is_file());

    let coord = TileCoord::new(2, 3, 1);
    let written = std::fs::read(out.path().join("2").join("3").join("1.png")).unwrap();
    assert_eq!(written, body_for(coord));
}

#[tokio::test]
async fn test_export_respects_zoom_window() {
    let dir = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let (_registry, store) = open_store(&dir).await;
    put_all(&store, &full_pyramid(2)).await;

    let options = StreamOptions {
        min_zoom: 1,
        max_zoom: 1,
        ..StreamOptions::default()
    };
    let summary = export(&store, options, out.path(), "").await.unwrap();

    assert_eq!(summary.tiles, 4);
    assert!(!summary.info);
    assert!(!out.path().join("0").exists());
    assert!(out.path().join("1").join("0").join("1").is_file());
}

#[tokio::test]
async fn test_export_then_import_roundtrip() {
    let source_dir = TempDir::new().unwrap();
    let target_dir = TempDir::new().unwrap();
    let tree = TempDir::new().unwrap();

    let (_registry, source) = open_store(&source_dir).await;
    put_all(&source, &full_pyramid(2)).await;
    source
        .put_tile(TileCoord::new(3, 0, 0), &b"ocean"[..], TileHeaders::new())
        .await
        .unwrap();
    source
        .put_tile(TileCoord::new(3, 7, 7), &b"ocean"[..], TileHeaders::new())
        .await
        .unwrap();
    let info = TileInfo::new("xyz", 0, 3);
    source.put_info(&info).await.unwrap();

    export(&source, StreamOptions::default(), tree.path(), ".png")
        .await
        .unwrap();

    let registry = HandleRegistry::new();
    let target = registry
        .open(target_dir.path().join("copy.redb"), StoreOptions::default())
        .await
        .unwrap();
    let summary = import(&target, tree.path()).await.unwrap();

    assert_eq!(summary.tiles, 23);
    assert_eq!(summary.failed, 0);
    assert!(summary.info);
    assert_eq!(target.get_info().await.unwrap(), info);

    let original = source
        .stream_tiles(StreamOptions::default())
        .try_collect()
        .await
        .unwrap();
    let copied = target
        .stream_tiles(StreamOptions::default())
        .try_collect()
        .await
        .unwrap();
    assert_eq!(original.len(), copied.len());
    for (a, b) in original.iter().zip(&copied) {
        assert_eq!(a.coord, b.coord);
        assert_eq!(a.data, b.data);
        assert_eq!(b.headers.get("content-type"), Some("image/png"));
        assert_eq!(a.headers.content_md5(), b.headers.content_md5());
    }

    let ocean = tilestash::ContentHash::of(b"ocean");
    assert_eq!(target.refcount(&ocean).await.unwrap(), Some(2));
}

#[tokio::test]
async fn test_import_ignores_foreign_entries() {
    let tree = TempDir::new().unwrap();
    let dir = TempDir::new().unwrap();

    std::fs::create_dir_all(tree.path().join("0").join("0")).unwrap();
    std::fs::write(tree.path().join("0").join("0").join("0.pbf"), b"vector").unwrap();
    std::fs::write(tree.path().join("0").join("0").join("notes.txt"), b"x").unwrap();
    std::fs::create_dir_all(tree.path().join("styles")).unwrap();
    std::fs::write(tree.path().join("README"), b"x").unwrap();

    let (_registry, store) = open_store(&dir).await;
    let summary = import(&store, tree.path()).await.unwrap();

    assert_eq!(summary.tiles, 1);
    assert!(!summary.info);
    let tile = store.get_tile(TileCoord::new(0, 0, 0)).await.unwrap();
    assert_eq!(&tile.data[..], b"vector");
    assert_eq!(
        tile.headers.get("content-type"),
        Some("application/x-protobuf")
    );
}

#[tokio::test]
async fn test_import_counts_off_grid_tiles_as_failed() {
    let tree = TempDir::new().unwrap();
    let dir = TempDir::new().unwrap();

    std::fs::create_dir_all(tree.path().join("1").join("4")).unwrap();
    std::fs::write(tree.path().join("1").join("4").join("0.png"), b"x").unwrap();

    let (_registry, store) = open_store(&dir).await;
    let summary = import(&store, tree.path()).await.unwrap();

    assert_eq!(summary.tiles, 0);
    assert_eq!(summary.failed, 1);
}
