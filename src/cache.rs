//! 短生命週期的搜尋結果快取。
//!
//! 使用者每打一個字就會觸發一次搜尋，同一個關鍵字在幾秒內重複出現很常見
//! (刪字、重打)。結果以 `(分類, 關鍵字)` 為鍵，存活 [`SUGGESTION_TTL`]。

use std::{sync::Arc, time::Duration};

use moka::sync::Cache;

use crate::declare::{Category, SuggestionEntry};

/// 搜尋結果存活時間
pub const SUGGESTION_TTL: Duration = Duration::from_secs(8);
const SUGGESTION_CAPACITY: u64 = 512;

pub type Suggestions = Arc<Vec<SuggestionEntry>>;

pub struct SuggestionCache {
    inner: Cache<(Category, String), Suggestions>,
}

impl SuggestionCache {
    pub fn new(ttl: Duration) -> Self {
        SuggestionCache {
            inner: Cache::builder()
                .time_to_live(ttl)
                .max_capacity(SUGGESTION_CAPACITY)
                .build(),
        }
    }

    fn key(category: Category, query: &str) -> (Category, String) {
        (category, query.trim().to_string())
    }

    pub fn get(&self, category: Category, query: &str) -> Option<Suggestions> {
        self.inner.get(&Self::key(category, query))
    }

    pub fn insert(&self, category: Category, query: &str, entries: Suggestions) {
        self.inner.insert(Self::key(category, query), entries);
    }

    pub fn clear(&self) {
        self.inner.invalidate_all();
    }
}

impl Default for SuggestionCache {
    fn default() -> Self {
        Self::new(SUGGESTION_TTL)
    }
}
