//! Ordered pyramid traversal.
//!
//! For every zoom level in the window, the bounds are turned into a tile
//! range. Each column is read with an ascending key range scan starting at
//! `tile:z/x/minY`; the first key past `tile:z/x/maxY` ends the column and
//! the scan seeks to `minY` of the next stored column, so rows outside the
//! window and empty columns are never walked. Tiles come out in `(z, x, y)`
//! order.
//!
//! The stream is pulled: each call to [`TileStream::next`] serves buffered
//! tiles and fetches the next page (one read transaction) only when the buffer
//! runs dry, so a slow consumer never has more than a page in memory.

use std::collections::VecDeque;
use std::sync::Arc;

use redb::Database;

use crate::error::StoreError;
use crate::tile::{tile_range, StreamOptions, Tile, TileCoord, TileRange, MAX_ZOOM};

use super::keys::{tile_key, Key};
use super::read::{open_table, read_info, resolve_tile, stored_hash};
use super::registry::Handle;

#[derive(Debug, Clone, Copy)]
struct ZoomSpan {
    z: u8,
    range: TileRange,
}

/// Position of the next unread key.
#[derive(Debug, Clone)]
struct Cursor {
    spans: VecDeque<ZoomSpan>,
    x: u32,
    y: u32,
}

impl Cursor {
    fn new(options: &StreamOptions) -> Self {
        let spans: VecDeque<ZoomSpan> = (options.min_zoom..=options.max_zoom)
            .map(|z| ZoomSpan {
                z,
                range: tile_range(&options.bounds, z),
            })
            .collect();
        let (x, y) = spans
            .front()
            .map(|s| (s.range.min_x, s.range.min_y))
            .unwrap_or((0, 0));
        Self { spans, x, y }
    }

    /// Move to the start of the next zoom level.
    fn next_zoom(&mut self) {
        self.spans.pop_front();
        if let Some(next) = self.spans.front() {
            self.x = next.range.min_x;
            self.y = next.range.min_y;
        }
    }
}

enum StreamState {
    /// The window has not been checked against the info record yet
    Pending(StreamOptions),
    Scanning(Cursor),
    Done,
}

/// A pull-based stream of stored tiles.
pub struct TileStream {
    /// Keeps the path's handle (and so its engine) registered as in use
    handle: Option<Arc<Handle>>,
    namespace: String,
    page_size: usize,
    state: StreamState,
    buffer: VecDeque<Result<Tile, StoreError>>,
}

impl TileStream {
    pub(crate) fn new(
        handle: Arc<Handle>,
        namespace: String,
        options: StreamOptions,
        page_size: usize,
    ) -> Self {
        Self {
            handle: Some(handle),
            namespace,
            page_size: page_size.max(1),
            state: StreamState::Pending(options),
            buffer: VecDeque::new(),
        }
    }

    /// A stream that yields one error and ends.
    pub(crate) fn failed(err: StoreError) -> Self {
        Self {
            handle: None,
            namespace: String::new(),
            page_size: 1,
            state: StreamState::Done,
            buffer: VecDeque::from([Err(err)]),
        }
    }

    /// Next tile, `None` once the window is exhausted.
    ///
    /// A tile whose body is missing or corrupt is yielded as an error and the
    /// stream carries on. A failure of the scan itself is yielded once and
    /// ends the stream.
    pub async fn next(&mut self) -> Option<Result<Tile, StoreError>> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(item);
            }

            match std::mem::replace(&mut self.state, StreamState::Done) {
                StreamState::Done => return None,
                StreamState::Pending(options) => match self.plan(options).await {
                    Ok(Some(cursor)) => self.state = StreamState::Scanning(cursor),
                    Ok(None) => return None,
                    Err(e) => return Some(Err(e)),
                },
                StreamState::Scanning(cursor) => match self.fetch(cursor).await {
                    Ok((tiles, next)) => {
                        self.buffer.extend(tiles);
                        if let Some(cursor) = next {
                            self.state = StreamState::Scanning(cursor);
                        }
                    }
                    Err(e) => return Some(Err(e)),
                },
            }
        }
    }

    /// Drain the stream into a vector, stopping at the first error.
    pub async fn try_collect(mut self) -> Result<Vec<Tile>, StoreError> {
        let mut tiles = Vec::new();
        while let Some(item) = self.next().await {
            tiles.push(item?);
        }
        Ok(tiles)
    }

    async fn database(&self) -> Result<Arc<Database>, StoreError> {
        match &self.handle {
            Some(handle) => handle.engine().reader().await,
            None => Err(StoreError::Closed),
        }
    }

    /// Clamp the window to the info record and lay out the per-zoom ranges.
    async fn plan(&self, options: StreamOptions) -> Result<Option<Cursor>, StoreError> {
        let db = self.database().await?;
        let namespace = self.namespace.clone();
        let info = tokio::task::spawn_blocking(move || read_info(&db, &namespace)).await??;

        let mut options = match info {
            Some(info) => match options.restrict(&info) {
                Some(options) => options,
                None => return Ok(None),
            },
            None => options,
        };
        options.max_zoom = options.max_zoom.min(MAX_ZOOM);
        if options.min_zoom > options.max_zoom {
            return Ok(None);
        }
        Ok(Some(Cursor::new(&options)))
    }

    async fn fetch(&self, cursor: Cursor) -> Result<Page, StoreError> {
        let db = self.database().await?;
        let namespace = self.namespace.clone();
        let page_size = self.page_size;
        tokio::task::spawn_blocking(move || scan_page(&db, &namespace, cursor, page_size)).await?
    }
}

/// Tiles read in one transaction, plus where to continue (if anywhere).
type Page = (Vec<Result<Tile, StoreError>>, Option<Cursor>);

fn scan_page(
    db: &Database,
    namespace: &str,
    mut cursor: Cursor,
    page_size: usize,
) -> Result<Page, StoreError> {
    let txn = db.begin_read()?;
    let Some(table) = open_table(&txn, namespace)? else {
        return Ok((Vec::new(), None));
    };

    let mut tiles = Vec::new();
    while let Some(span) = cursor.spans.front().copied() {
        let range = span.range;

        'seek: loop {
            if cursor.x > range.max_x {
                break;
            }
            let start = tile_key(TileCoord::new(span.z, cursor.x, cursor.y));
            let end = tile_key(TileCoord::new(span.z, range.max_x, range.max_y));

            for entry in table.range(start.as_slice()..=end.as_slice())? {
                let (key, value) = entry?;
                let coord = match Key::decode(key.value()) {
                    Some(Key::Tile(coord)) => coord,
                    _ => {
                        return Err(StoreError::Engine(format!(
                            "malformed key in tile index: {:?}",
                            String::from_utf8_lossy(key.value())
                        )))
                    }
                };

                if coord.y < range.min_y {
                    cursor.x = coord.x;
                    cursor.y = range.min_y;
                    continue 'seek;
                }
                if coord.y > range.max_y {
                    cursor.x = coord.x + 1;
                    cursor.y = range.min_y;
                    continue 'seek;
                }
                if tiles.len() >= page_size {
                    // resume at this entry on the next page
                    cursor.x = coord.x;
                    cursor.y = coord.y;
                    return Ok((tiles, Some(cursor)));
                }
                tiles.push(
                    stored_hash(value.value()).and_then(|hash| resolve_tile(&table, coord, &hash)),
                );
            }
            break;
        }

        cursor.next_zoom();
    }

    Ok((tiles, None))
}

