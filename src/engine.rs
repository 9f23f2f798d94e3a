//! Wires everything together for one process.
//!
//! [`Engine`] owns a scheduler per category, the coordinator they drive, and
//! a watcher that re-arms both schedulers when the configured interval
//! changes and re-sorts a category when its stored sort mode changes. Presenters subscribe to refresh events and read snapshots; they
//! never talk to providers directly.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use tokio::{sync::broadcast, task::JoinHandle};

use crate::{
    cache::Suggestions,
    config::{store::ConfigStore, App},
    coordinator::{RefreshEvent, SyncCoordinator},
    crawler::timor::Timor,
    declare::{Category, SortMode},
    error::FetchResult,
    fetcher::QuoteFetcher,
    logging,
    scheduler::{Scheduler, TickHandler, Visibility},
    snapshot::{Snapshot, SnapshotEntry},
    sort::SortEngine,
    time_gate::{SystemClock, TimeGate},
    util::http::HttpClient,
};

/// Visible: fetch. Hidden: only rebuild derived state from the last quotes.
pub struct CategoryTicker {
    coordinator: Arc<SyncCoordinator>,
    category: Category,
}

impl CategoryTicker {
    pub fn new(coordinator: Arc<SyncCoordinator>, category: Category) -> Self {
        CategoryTicker {
            coordinator,
            category,
        }
    }
}

#[async_trait]
impl TickHandler for CategoryTicker {
    async fn on_tick(&self, visible: bool) {
        if visible {
            self.coordinator.refresh(self.category).await;
        } else {
            self.coordinator.recompute(self.category);
        }
    }
}

pub struct Engine {
    config: Arc<dyn ConfigStore>,
    coordinator: Arc<SyncCoordinator>,
    gate: Arc<TimeGate>,
    visibility: Visibility,
    fund: Arc<Scheduler>,
    stock: Arc<Scheduler>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    /// 天天基金、新浪與節假日 API，使用系統時鐘
    pub fn new(config: Arc<dyn ConfigStore>, client: Arc<dyn HttpClient>, app: &App) -> Self {
        let fetcher = Arc::new(QuoteFetcher::with_default_providers(Arc::clone(&client), app));
        let calendar = Arc::new(Timor::new(client, app));
        let gate = Arc::new(TimeGate::from_config(app, calendar, Arc::new(SystemClock)));

        Self::with_parts(config, fetcher, gate)
    }

    pub fn with_parts(
        config: Arc<dyn ConfigStore>,
        fetcher: Arc<QuoteFetcher>,
        gate: Arc<TimeGate>,
    ) -> Self {
        let settings = config.load();
        let sorter = Arc::new(SortEngine::new(settings.fund_sort, settings.stock_sort));
        let coordinator = Arc::new(SyncCoordinator::new(Arc::clone(&config), fetcher, sorter));
        let visibility = Visibility::default();

        let scheduler = |category: Category| {
            Arc::new(Scheduler::new(
                &category.to_string(),
                Arc::clone(&gate),
                visibility.clone(),
                Arc::new(CategoryTicker::new(Arc::clone(&coordinator), category)),
            ))
        };
        let fund = scheduler(Category::Fund);
        let stock = scheduler(Category::Stock);

        Engine {
            config,
            coordinator,
            gate,
            visibility,
            fund,
            stock,
            watcher: Mutex::new(None),
        }
    }

    pub fn scheduler(&self, category: Category) -> &Scheduler {
        match category {
            Category::Fund => &*self.fund,
            Category::Stock => &*self.stock,
        }
    }

    pub fn gate(&self) -> &Arc<TimeGate> {
        &self.gate
    }

    pub fn coordinator(&self) -> &Arc<SyncCoordinator> {
        &self.coordinator
    }

    /// Looks up the holiday flag, arms both schedulers, starts following
    /// configuration changes, then refreshes both categories once regardless
    /// of trading hours.
    pub async fn start(&self) {
        let holiday = self.gate.ensure_holiday_state().await;
        let interval = self.config.load().interval;
        logging::info_file_async(format!(
            "Engine start: interval {} ms, holiday {}",
            interval, holiday
        ));

        self.fund.start(interval);
        self.stock.start(interval);
        self.watch_config(interval);

        futures::future::join(
            self.coordinator.refresh(Category::Fund),
            self.coordinator.refresh(Category::Stock),
        )
        .await;
    }

    fn watch_config(&self, interval: u64) {
        let mut changes = self.config.subscribe();
        let fund = Arc::clone(&self.fund);
        let stock = Arc::clone(&self.stock);
        let coordinator = Arc::clone(&self.coordinator);

        let handle = tokio::spawn(async move {
            let mut current = interval;
            while changes.changed().await.is_ok() {
                let settings = changes.borrow_and_update().clone();

                if settings.interval != current {
                    logging::info_file_async(format!(
                        "Interval changed {} -> {} ms",
                        current, settings.interval
                    ));
                    current = settings.interval;
                    fund.reconfigure(current);
                    stock.reconfigure(current);
                }

                for category in Category::iterator() {
                    let mode = settings.sort_mode(category);
                    if coordinator.sorter().mode(category) == mode {
                        continue;
                    }

                    logging::info_file_async(format!("{} sort mode changed to {}", category, mode));
                    coordinator.sorter().set_mode(category, mode);
                    coordinator.recompute(category);
                }
            }
        });

        let mut watcher = match self.watcher.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(old) = watcher.replace(handle) {
            old.abort();
        }
    }

    /// Stops both timers and drops results still on the way.
    pub fn stop(&self) {
        self.fund.stop();
        self.stock.stop();

        let mut watcher = match self.watcher.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(handle) = watcher.take() {
            handle.abort();
        }

        self.coordinator.teardown();
        logging::info_file_async("Engine stopped");
    }

    pub fn set_visible(&self, visible: bool) {
        self.visibility.set(visible);
    }

    pub fn is_visible(&self) -> bool {
        self.visibility.is_visible()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RefreshEvent> {
        self.coordinator.subscribe()
    }

    pub fn snapshot(&self, category: Category) -> Arc<Snapshot> {
        self.coordinator.get_snapshot(category)
    }

    /// 手動刷新，不看交易時段
    pub async fn refresh(&self, category: Category) -> Arc<Snapshot> {
        self.coordinator.refresh(category).await
    }

    /// 狀態列上的股票，依設定的順序
    pub fn status_bar(&self) -> Vec<SnapshotEntry> {
        let settings = self.config.load();
        self.snapshot(Category::Stock)
            .pick(&settings.display.status_bar_stocks)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Cycles the sort mode, saves it to the settings and re-sorts the
    /// current snapshot.
    pub fn change_order(&self, category: Category) -> Result<SortMode> {
        let mode = self.coordinator.sorter().change_order(category);
        self.config.update(&mut |settings| settings.set_sort_mode(category, mode))?;
        self.coordinator.recompute(category);
        Ok(mode)
    }

    pub async fn search(&self, category: Category, query: &str) -> FetchResult<Option<Suggestions>> {
        self.coordinator
            .fetcher()
            .search_suggestions(query, category)
            .await
    }

    /// Adds a code and fetches right away. Returns `false` if it was
    /// already there.
    pub async fn add_code(&self, category: Category, code: &str) -> Result<bool> {
        let mut added = false;
        self.config.update(&mut |settings| {
            added = settings.watch_list_mut(category).add(code);
        })?;

        if added {
            self.coordinator.refresh(category).await;
        }
        Ok(added)
    }

    pub fn remove_code(&self, category: Category, code: &str) -> Result<bool> {
        let mut removed = false;
        self.config.update(&mut |settings| {
            removed = settings.watch_list_mut(category).remove(code);
        })?;

        if removed {
            self.coordinator.recompute(category);
        }
        Ok(removed)
    }

    /// 置頂/取消置頂，回傳新的狀態
    pub fn toggle_pin(&self, category: Category, code: &str) -> Result<Option<bool>> {
        let mut pinned = None;
        self.config.update(&mut |settings| {
            pinned = settings.watch_list_mut(category).toggle_pin(code);
        })?;

        if pinned.is_some() {
            self.coordinator.recompute(category);
        }
        Ok(pinned)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Ok(mut watcher) = self.watcher.lock() {
            if let Some(handle) = watcher.take() {
                handle.abort();
            }
        }
    }
}
