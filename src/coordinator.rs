//! The refresh cycle: fetch, merge, sort, publish.
//!
//! Each category keeps its latest [`Snapshot`] behind `RwLock<Arc<_>>` and
//! replaces it as a whole. Fetch cycles and recomputes both build on the
//! snapshot they replace, so each holds the category's writer lock from
//! reading the previous snapshot until the new one is stored. A refresh asked for while another one of the same
//! category is running joins the running one instead of starting a second
//! batch. Results of a cycle that started before [`SyncCoordinator::teardown`]
//! are dropped.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, MutexGuard, RwLock,
};

use chrono::Local;
use futures::{
    future::{BoxFuture, Shared},
    FutureExt,
};
use scopeguard::defer;
use tokio::sync::broadcast;

use crate::{
    config::{
        store::ConfigStore,
        watch_list::{Settings, WatchList},
    },
    crawler::QuoteResults,
    declare::Category,
    error::FetchError,
    fetcher::QuoteFetcher,
    logging,
    snapshot::{Snapshot, SnapshotEntry},
    sort::SortEngine,
};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Copy, Clone, PartialEq, Eq, strum::Display)]
pub enum RefreshKind {
    /// 重新抓取報價
    Fetched,
    /// 沿用上次報價，只重算排序與損益
    Recomputed,
}

/// Sent after a snapshot was replaced.
#[derive(Debug, Clone)]
pub struct RefreshEvent {
    pub category: Category,
    pub kind: RefreshKind,
    pub snapshot: Arc<Snapshot>,
}

type InFlight = Shared<BoxFuture<'static, Arc<Snapshot>>>;

struct CategoryState {
    snapshot: RwLock<Arc<Snapshot>>,
    /// 進行中的 refresh 與它所屬的世代
    in_flight: Mutex<Option<(u64, InFlight)>>,
    writer: Mutex<()>,
}

impl CategoryState {
    fn new(category: Category) -> Self {
        CategoryState {
            snapshot: RwLock::new(Arc::new(Snapshot::empty(category))),
            in_flight: Mutex::new(None),
            writer: Mutex::new(()),
        }
    }

    fn writer(&self) -> MutexGuard<'_, ()> {
        match self.writer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn in_flight(&self) -> MutexGuard<'_, Option<(u64, InFlight)>> {
        match self.in_flight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn load(&self) -> Arc<Snapshot> {
        match self.snapshot.read() {
            Ok(snapshot) => Arc::clone(&snapshot),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    fn store(&self, snapshot: Arc<Snapshot>) {
        match self.snapshot.write() {
            Ok(mut current) => *current = snapshot,
            Err(poisoned) => *poisoned.into_inner() = snapshot,
        }
    }
}

/// Builds the entries of one category from this cycle's results.
///
/// Every watch-list entry appears exactly once. A code whose fetch failed
/// keeps the quote it had in `previous`, flagged stale, or stays absent if it
/// never resolved. The error is kept next to the entry either way.
pub fn merge(
    category: Category,
    watch_list: &WatchList,
    previous: &Snapshot,
    mut results: QuoteResults,
    settings: &Settings,
) -> Vec<SnapshotEntry> {
    watch_list
        .entries()
        .iter()
        .map(|entry| {
            let outcome = match results.remove(&entry.code) {
                Some(Ok(quote)) if quote.code == entry.code => Ok(quote),
                Some(Ok(quote)) => Err(FetchError::parse(format!(
                    "{} does not belong to {}",
                    quote.code, entry.code
                ))),
                Some(Err(why)) => Err(why),
                None => Err(FetchError::parse(format!("{} was not fetched", entry.code))),
            };

            let item = match outcome {
                Ok(quote) => SnapshotEntry::new(entry.clone(), Some(quote)),
                Err(why) => {
                    let kept = previous.quote(&entry.code).cloned();
                    let mut item = SnapshotEntry::new(entry.clone(), kept);
                    item.stale = item.quote.is_some();
                    item.error = Some(why);
                    item
                }
            };

            with_derived(category, item, settings)
        })
        .collect()
}

/// Rebuilds the entries from the previous snapshot without new quotes,
/// following the current watch list.
pub fn carry_over(
    category: Category,
    watch_list: &WatchList,
    previous: &Snapshot,
    settings: &Settings,
) -> Vec<SnapshotEntry> {
    watch_list
        .entries()
        .iter()
        .map(|entry| {
            let item = match previous.get(&entry.code) {
                Some(old) => SnapshotEntry {
                    entry: entry.clone(),
                    ..old.clone()
                },
                None => SnapshotEntry::new(entry.clone(), None),
            };

            with_derived(category, item, settings)
        })
        .collect()
}

fn with_derived(category: Category, item: SnapshotEntry, settings: &Settings) -> SnapshotEntry {
    let amount = match category {
        Category::Fund => settings.fund_amount(item.code()),
        Category::Stock => None,
    };
    item.with_earnings(amount)
}

pub struct SyncCoordinator {
    config: Arc<dyn ConfigStore>,
    fetcher: Arc<QuoteFetcher>,
    sorter: Arc<SortEngine>,
    fund: CategoryState,
    stock: CategoryState,
    events: broadcast::Sender<RefreshEvent>,
    generation: AtomicU64,
}

impl SyncCoordinator {
    pub fn new(
        config: Arc<dyn ConfigStore>,
        fetcher: Arc<QuoteFetcher>,
        sorter: Arc<SortEngine>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        SyncCoordinator {
            config,
            fetcher,
            sorter,
            fund: CategoryState::new(Category::Fund),
            stock: CategoryState::new(Category::Stock),
            events,
            generation: AtomicU64::new(0),
        }
    }

    fn state(&self, category: Category) -> &CategoryState {
        match category {
            Category::Fund => &self.fund,
            Category::Stock => &self.stock,
        }
    }

    pub fn fetcher(&self) -> &Arc<QuoteFetcher> {
        &self.fetcher
    }

    pub fn sorter(&self) -> &Arc<SortEngine> {
        &self.sorter
    }

    /// The latest complete snapshot. Cheap; never waits for a refresh.
    pub fn get_snapshot(&self, category: Category) -> Arc<Snapshot> {
        self.state(category).load()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RefreshEvent> {
        self.events.subscribe()
    }

    pub fn is_refreshing(&self, category: Category) -> bool {
        self.state(category).in_flight().is_some()
    }

    /// Runs one fetch cycle, or joins the one already running for
    /// `category`, and returns the snapshot it produced.
    pub async fn refresh(self: &Arc<Self>, category: Category) -> Arc<Snapshot> {
        let shared = {
            let mut in_flight = self.state(category).in_flight();
            match in_flight.as_ref() {
                Some((_, running)) => running.clone(),
                None => {
                    let generation = self.generation.load(Ordering::SeqCst);
                    let this = Arc::clone(self);
                    let cycle = async move { this.run_cycle(category, generation).await }
                        .boxed()
                        .shared();
                    *in_flight = Some((generation, cycle.clone()));
                    cycle
                }
            }
        };

        shared.await
    }

    async fn run_cycle(self: Arc<Self>, category: Category, generation: u64) -> Arc<Snapshot> {
        logging::debug_file_async(format!("開始 refresh {}", category));
        defer! {
            logging::debug_file_async(format!("結束 refresh {}", category));
        }

        // 本輪只讀一次設定
        let settings = self.config.load();
        let watch_list = settings.watch_list(category);
        let codes = watch_list.codes();

        let results = if codes.is_empty() {
            QuoteResults::new()
        } else {
            self.fetcher.fetch_quotes(&codes, category).await
        };

        let snapshot = self.commit(category, RefreshKind::Fetched, generation, |previous| {
            merge(category, watch_list, previous, results, &settings)
        });

        let state = self.state(category);
        let mut in_flight = state.in_flight();
        if matches!(in_flight.as_ref(), Some((g, _)) if *g == generation) {
            *in_flight = None;
        }

        snapshot
    }

    /// Rebuilds the snapshot from the last quotes: current watch list, sort
    /// mode and holdings. No network.
    pub fn recompute(&self, category: Category) -> Arc<Snapshot> {
        let generation = self.generation.load(Ordering::SeqCst);

        self.commit(category, RefreshKind::Recomputed, generation, |previous| {
            let settings = self.config.load();
            carry_over(category, settings.watch_list(category), previous, &settings)
        })
    }

    /// Builds the next entries from the current snapshot and publishes them,
    /// with no other writer of `category` in between.
    fn commit<F>(
        &self,
        category: Category,
        kind: RefreshKind,
        generation: u64,
        build: F,
    ) -> Arc<Snapshot>
    where
        F: FnOnce(&Snapshot) -> Vec<SnapshotEntry>,
    {
        let state = self.state(category);
        let _writer = state.writer();
        let previous = state.load();
        let entries = build(&previous);
        self.publish(category, entries, kind, generation)
    }

    /// Sorts, swaps in and announces a new snapshot, unless `generation`
    /// was torn down in the meantime. Returns the snapshot now current.
    fn publish(
        &self,
        category: Category,
        entries: Vec<SnapshotEntry>,
        kind: RefreshKind,
        generation: u64,
    ) -> Arc<Snapshot> {
        let state = self.state(category);
        if self.generation.load(Ordering::SeqCst) != generation {
            logging::info_file_async(format!(
                "Drop {} {} result from a torn down generation",
                category, kind
            ));
            return state.load();
        }

        let mode = self.sorter.mode(category);
        let snapshot = Arc::new(Snapshot {
            category,
            entries: self.sorter.sort(category, entries),
            mode,
            updated_at: Some(Local::now()),
        });

        state.store(Arc::clone(&snapshot));

        let absent = snapshot.absent_count();
        if absent > 0 {
            logging::warn_file_async(format!(
                "{} {}: {} of {} entries have no quote",
                category,
                kind,
                absent,
                snapshot.len()
            ));
        }

        // 沒有訂閱者時送出會失敗，忽略即可
        let _ = self.events.send(RefreshEvent {
            category,
            kind,
            snapshot: Arc::clone(&snapshot),
        });

        snapshot
    }

    /// Starts a new generation: running cycles finish but their results are
    /// dropped, and the next refresh starts from scratch.
    pub fn teardown(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        for category in Category::iterator() {
            *self.state(category).in_flight() = None;
        }
    }
}
