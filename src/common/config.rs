use std::path::PathBuf;

/// Size of a page in bytes (4 KB)
pub const PAGE_SIZE: usize = 4096;

/// Default number of pages the buffer pool caches
pub const DEFAULT_BUFFER_POOL_PAGES: usize = 50;

/// Default K value for the LRU-K replacer. K = 1 degenerates to plain LRU.
pub const DEFAULT_LRUK_K: usize = 1;

/// Default maximum byte length of a string field
pub const STRING_LEN: usize = 128;

/// Runtime configuration for a [`Database`](crate::database::Database).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Maximum number of pages resident in the buffer pool
    pub buffer_pool_pages: usize,
    /// K value for the LRU-K replacer
    pub replacer_k: usize,
    /// Directory where `create_table` places new table files
    pub data_dir: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            buffer_pool_pages: DEFAULT_BUFFER_POOL_PAGES,
            replacer_k: DEFAULT_LRUK_K,
            data_dir: PathBuf::from("."),
        }
    }
}

impl DatabaseConfig {
    /// Builds a config from defaults overridden by `HEAPDB_POOL_PAGES` and `HEAPDB_DATA_DIR`.
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(pages) = std::env::var("HEAPDB_POOL_PAGES")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|&p| p > 0)
        {
            config.buffer_pool_pages = pages;
        }
        if let Ok(dir) = std::env::var("HEAPDB_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        config
    }

    pub fn with_buffer_pool_pages(mut self, pages: usize) -> Self {
        self.buffer_pool_pages = pages;
        self
    }

    pub fn with_replacer_k(mut self, k: usize) -> Self {
        self.replacer_k = k.max(1);
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }
}
