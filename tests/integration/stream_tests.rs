//! Pyramid streaming: ordering, completeness, bounds and paging.

use tempfile::TempDir;

use tilestash::tile::tile_range;
use tilestash::{
    Bounds, StoreError, StoreOptions, StreamOptions, TileCoord, TileHeaders, TileInfo,
};

use super::test_utils::{body_for, full_pyramid, open_store, open_store_with, put_all};

fn coords(tiles: &[tilestash::Tile]) -> Vec<TileCoord> {
    tiles.iter().map(|t| t.coord).collect()
}

#[tokio::test]
async fn test_stream_yields_everything_in_order() {
    let dir = TempDir::new().unwrap();
    let (_registry, store) = open_store(&dir).await;

    let expected = full_pyramid(3);
    // write in reverse so order comes from the index, not insertion
    let mut reversed = expected.clone();
    reversed.reverse();
    put_all(&store, &reversed).await;

    let tiles = store
        .stream_tiles(StreamOptions::default())
        .try_collect()
        .await
        .unwrap();

    assert_eq!(coords(&tiles), expected);
    for tile in &tiles {
        assert_eq!(tile.data, body_for(tile.coord));
    }
}

#[tokio::test]
async fn test_column_major_order_within_zoom() {
    let dir = TempDir::new().unwrap();
    let (_registry, store) = open_store(&dir).await;

    put_all(
        &store,
        &[
            TileCoord::new(4, 10, 3),
            TileCoord::new(4, 2, 15),
            TileCoord::new(4, 2, 1),
            TileCoord::new(2, 3, 0),
        ],
    )
    .await;

    let tiles = store
        .stream_tiles(StreamOptions::default())
        .try_collect()
        .await
        .unwrap();
    assert_eq!(
        coords(&tiles),
        vec![
            TileCoord::new(2, 3, 0),
            TileCoord::new(4, 2, 1),
            TileCoord::new(4, 2, 15),
            TileCoord::new(4, 10, 3),
        ]
    );
}

#[tokio::test]
async fn test_zoom_window() {
    let dir = TempDir::new().unwrap();
    let (_registry, store) = open_store(&dir).await;
    put_all(&store, &full_pyramid(3)).await;

    let tiles = store
        .stream_tiles(StreamOptions::new(1, 2, Bounds::WORLD))
        .try_collect()
        .await
        .unwrap();

    assert_eq!(tiles.len(), 4 + 16);
    assert!(tiles.iter().all(|t| (1..=2).contains(&t.coord.z)));
}

#[tokio::test]
async fn test_bounds_select_matching_tiles() {
    let dir = TempDir::new().unwrap();
    let (_registry, store) = open_store(&dir).await;
    put_all(&store, &full_pyramid(4)).await;

    let bounds = Bounds::new(-20.0, -10.0, 30.0, 40.0);
    let tiles = store
        .stream_tiles(StreamOptions::new(0, 4, bounds))
        .try_collect()
        .await
        .unwrap();

    let expected: Vec<TileCoord> = full_pyramid(4)
        .into_iter()
        .filter(|c| tile_range(&bounds, c.z).contains(c.x, c.y))
        .collect();
    assert!(!expected.is_empty());
    assert!(expected.len() < full_pyramid(4).len());
    assert_eq!(coords(&tiles), expected);
}

#[tokio::test]
async fn test_paging_does_not_skip_or_repeat() {
    let dir = TempDir::new().unwrap();
    let mut options = StoreOptions::default();
    options.stream_page_size = 3;
    let (_registry, store) = open_store_with(&dir, options).await;

    let expected = full_pyramid(3);
    put_all(&store, &expected).await;

    let mut stream = store.stream_tiles(StreamOptions::default());
    let mut seen = Vec::new();
    while let Some(item) = stream.next().await {
        seen.push(item.unwrap().coord);
    }
    assert_eq!(seen, expected);
}

#[tokio::test]
async fn test_info_record_restricts_window() {
    let dir = TempDir::new().unwrap();
    let (_registry, store) = open_store(&dir).await;
    put_all(&store, &full_pyramid(3)).await;
    store.put_info(&TileInfo::new("xyz", 1, 2)).await.unwrap();

    let tiles = store
        .stream_tiles(StreamOptions::default())
        .try_collect()
        .await
        .unwrap();
    assert_eq!(tiles.first().map(|t| t.coord), Some(TileCoord::new(1, 0, 0)));
    assert_eq!(tiles.last().map(|t| t.coord), Some(TileCoord::new(2, 3, 3)));
    assert_eq!(tiles.len(), 20);
}

#[tokio::test]
async fn test_disjoint_window_is_empty() {
    let dir = TempDir::new().unwrap();
    let (_registry, store) = open_store(&dir).await;
    put_all(&store, &full_pyramid(2)).await;
    store.put_info(&TileInfo::new("xyz", 0, 1)).await.unwrap();

    let tiles = store
        .stream_tiles(StreamOptions::new(2, 5, Bounds::WORLD))
        .try_collect()
        .await
        .unwrap();
    assert!(tiles.is_empty());
}

#[tokio::test]
async fn test_stream_is_restartable() {
    let dir = TempDir::new().unwrap();
    let (_registry, store) = open_store(&dir).await;
    put_all(&store, &full_pyramid(2)).await;

    let first = store.stream_tiles(StreamOptions::default()).try_collect().await.unwrap();
    let second = store.stream_tiles(StreamOptions::default()).try_collect().await.unwrap();
    assert_eq!(coords(&first), coords(&second));
}

#[tokio::test]
async fn test_dropped_tiles_leave_the_stream() {
    let dir = TempDir::new().unwrap();
    let (_registry, store) = open_store(&dir).await;
    put_all(&store, &full_pyramid(1)).await;
    store.drop_tile(TileCoord::new(1, 0, 1)).await.unwrap();

    let tiles = store.stream_tiles(StreamOptions::default()).try_collect().await.unwrap();
    assert_eq!(
        coords(&tiles),
        vec![
            TileCoord::new(0, 0, 0),
            TileCoord::new(1, 0, 0),
            TileCoord::new(1, 1, 0),
            TileCoord::new(1, 1, 1),
        ]
    );
}

#[tokio::test]
async fn test_stream_on_missing_archive_fails() {
    let dir = TempDir::new().unwrap();
    let (_registry, store) = open_store(&dir).await;

    let mut stream = store.stream_tiles(StreamOptions::default());
    assert!(matches!(
        stream.next().await,
        Some(Err(StoreError::ArchiveMissing { .. }))
    ));
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_stream_after_close_fails() {
    let dir = TempDir::new().unwrap();
    let (_registry, store) = open_store(&dir).await;
    store
        .put_tile(TileCoord::new(0, 0, 0), &b"foo"[..], TileHeaders::new())
        .await
        .unwrap();
    store.close().await.unwrap();

    let result = store.stream_tiles(StreamOptions::default()).try_collect().await;
    assert!(matches!(result, Err(StoreError::Closed)));
}

#[tokio::test]
async fn test_corrupt_tile_is_an_error_element_and_stream_continues() {
    let dir = TempDir::new().unwrap();
    let (_registry, store) = open_store(&dir).await;

    let mislabeled: TileHeaders = [("content-md5", tilestash::ContentHash::of(b"foo").as_str())]
        .into_iter()
        .collect();
    store
        .put_tile(TileCoord::new(1, 0, 0), &b"bar"[..], mislabeled)
        .await
        .unwrap();
    store
        .put_tile(TileCoord::new(1, 1, 1), &b"baz"[..], TileHeaders::new())
        .await
        .unwrap();

    let mut stream = store.stream_tiles(StreamOptions::default());
    assert!(matches!(
        stream.next().await,
        Some(Err(StoreError::Integrity { .. }))
    ));
    let next = stream.next().await.unwrap().unwrap();
    assert_eq!(next.coord, TileCoord::new(1, 1, 1));
    assert_eq!(&next.data[..], b"baz");
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_sparse_high_zoom_window_skips_empty_columns() {
    let dir = TempDir::new().unwrap();
    let mut options = StoreOptions::default();
    options.stream_page_size = 1;
    let (_registry, store) = open_store_with(&dir, options).await;

    let far_apart = [
        TileCoord::new(24, 3, 9_000_000),
        TileCoord::new(24, 8_000_000, 2),
        TileCoord::new(24, 16_000_000, 16_000_000),
    ];
    put_all(&store, &far_apart).await;

    let tiles = store
        .stream_tiles(StreamOptions::new(24, 24, Bounds::WORLD))
        .try_collect()
        .await
        .unwrap();
    assert_eq!(coords(&tiles), far_apart.to_vec());
}

#[tokio::test]
async fn test_narrow_latitude_band_skips_rows_outside_it() {
    let dir = TempDir::new().unwrap();
    let (_registry, store) = open_store(&dir).await;
    put_all(&store, &full_pyramid(4)).await;

    let band = Bounds::new(-180.0, -1.0, 180.0, 1.0);
    let tiles = store
        .stream_tiles(StreamOptions::new(4, 4, band))
        .try_collect()
        .await
        .unwrap();

    let range = tile_range(&band, 4);
    assert!(range.max_y - range.min_y <= 1);
    assert_eq!(tiles.len(), 16 * (range.max_y - range.min_y + 1) as usize);
    assert!(tiles.iter().all(|t| range.contains(t.coord.x, t.coord.y)));
    assert!(tiles.windows(2).all(|w| w[0].coord < w[1].coord));
}
