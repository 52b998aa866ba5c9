use std::time::Duration;

/// Default coalescing window after the first queued write.
pub const DEFAULT_BATCH_WINDOW: Duration = Duration::from_millis(10);

/// Default maximum number of write requests committed per flush.
pub const DEFAULT_BATCH_MAX_REQUESTS: usize = 1000;

/// Default number of tiles fetched per streaming page.
pub const DEFAULT_STREAM_PAGE_SIZE: usize = 64;

/// Name of the namespace used when no format, id or scale is given.
const DEFAULT_NAMESPACE: &str = "tiles";

/// Options for opening a store.
///
/// `format`, `id` and `scale` select an isolated namespace inside the archive
/// file, so one path can hold several pyramids side by side. The remaining
/// fields tune the path's write coalescer and are taken from whichever store
/// opens the path first.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreOptions {
    /// Tile format (e.g. `png`)
    pub format: String,

    /// Style or source identifier
    pub id: String,

    /// Pixel scale
    pub scale: u32,

    /// How long the coalescer waits for more writes after the first one
    pub batch_window: Duration,

    /// Upper bound on requests per flush
    pub batch_max_requests: usize,

    /// Tiles fetched per read transaction while streaming
    pub stream_page_size: usize,

    /// Compact the archive when the last writer closes it
    pub compact_on_close: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            format: String::new(),
            id: String::new(),
            scale: 1,
            batch_window: DEFAULT_BATCH_WINDOW,
            batch_max_requests: DEFAULT_BATCH_MAX_REQUESTS,
            stream_page_size: DEFAULT_STREAM_PAGE_SIZE,
            compact_on_close: true,
        }
    }
}

impl StoreOptions {
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_scale(mut self, scale: u32) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_batch_window(mut self, window: Duration) -> Self {
        self.batch_window = window;
        self
    }

    pub fn with_compact_on_close(mut self, enabled: bool) -> Self {
        self.compact_on_close = enabled;
        self
    }

    /// Engine table name of the namespace these options select.
    pub fn namespace(&self) -> String {
        let mut name = DEFAULT_NAMESPACE.to_string();
        if !self.format.is_empty() {
            name.push_str(&format!(";format={}", self.format));
        }
        if !self.id.is_empty() {
            name.push_str(&format!(";id={}", self.id));
        }
        if self.scale != 1 {
            name.push_str(&format!(";scale={}", self.scale));
        }
        name
    }
}
