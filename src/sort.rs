//! Ordering of a category's entries.
//!
//! Pinned entries always come first. Inside each partition entries without a
//! quote go last, then the mode decides: watch-list order, or change percent
//! in either direction. Remaining ties fall back to insertion order and then
//! to the code, so the result never depends on when a response arrived.

use std::{
    cmp::Ordering,
    sync::RwLock,
};

use rust_decimal::Decimal;

use crate::{
    config::watch_list::WatchListEntry,
    declare::{Category, Quote, SortMode},
    snapshot::SnapshotEntry,
};

/// Anything that pairs a watch-list entry with an optional quote.
pub trait Sortable {
    fn watch_entry(&self) -> &WatchListEntry;
    fn quote(&self) -> Option<&Quote>;
}

impl Sortable for SnapshotEntry {
    fn watch_entry(&self) -> &WatchListEntry {
        &self.entry
    }

    fn quote(&self) -> Option<&Quote> {
        self.quote.as_ref()
    }
}

impl Sortable for (WatchListEntry, Option<Quote>) {
    fn watch_entry(&self) -> &WatchListEntry {
        &self.0
    }

    fn quote(&self) -> Option<&Quote> {
        self.1.as_ref()
    }
}

fn change_percent<T: Sortable>(item: &T) -> Option<Decimal> {
    item.quote().map(|q| q.change_percent)
}

fn compare<T: Sortable>(a: &T, b: &T, mode: SortMode) -> Ordering {
    let (ea, eb) = (a.watch_entry(), b.watch_entry());

    // 置頂優先
    eb.pinned
        .cmp(&ea.pinned)
        // 沒有報價的排最後
        .then_with(|| a.quote().is_none().cmp(&b.quote().is_none()))
        .then_with(|| match mode {
            SortMode::Normal => Ordering::Equal,
            SortMode::Descending => change_percent(b).cmp(&change_percent(a)),
            SortMode::Ascending => change_percent(a).cmp(&change_percent(b)),
        })
        .then_with(|| ea.insertion_order.cmp(&eb.insertion_order))
        .then_with(|| ea.code.cmp(&eb.code))
}

/// Orders `entries` for `mode`. Pure; the input set is preserved.
pub fn sort<T: Sortable>(mut entries: Vec<T>, mode: SortMode) -> Vec<T> {
    entries.sort_by(|a, b| compare(a, b, mode));
    entries
}

/// The process-wide sort mode of each category.
///
/// Seeded from settings at start up. The engine writes every toggle back to
/// the settings and follows sort-mode edits made there.
pub struct SortEngine {
    fund: RwLock<SortMode>,
    stock: RwLock<SortMode>,
}

impl SortEngine {
    pub fn new(fund: SortMode, stock: SortMode) -> Self {
        SortEngine {
            fund: RwLock::new(fund),
            stock: RwLock::new(stock),
        }
    }

    fn slot(&self, category: Category) -> &RwLock<SortMode> {
        match category {
            Category::Fund => &self.fund,
            Category::Stock => &self.stock,
        }
    }

    pub fn mode(&self, category: Category) -> SortMode {
        match self.slot(category).read() {
            Ok(mode) => *mode,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn set_mode(&self, category: Category, mode: SortMode) {
        match self.slot(category).write() {
            Ok(mut current) => *current = mode,
            Err(poisoned) => *poisoned.into_inner() = mode,
        }
    }

    /// Normal -> Descending -> Ascending -> Normal; returns the new mode.
    pub fn change_order(&self, category: Category) -> SortMode {
        let mut current = match self.slot(category).write() {
            Ok(current) => current,
            Err(poisoned) => poisoned.into_inner(),
        };
        *current = current.next();
        *current
    }

    pub fn sort<T: Sortable>(&self, category: Category, entries: Vec<T>) -> Vec<T> {
        sort(entries, self.mode(category))
    }
}

impl Default for SortEngine {
    fn default() -> Self {
        Self::new(SortMode::Normal, SortMode::Normal)
    }
}
