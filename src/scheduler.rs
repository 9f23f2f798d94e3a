//! One repeating timer per category.
//!
//! A [`Scheduler`] is either stopped or running exactly one timer. Every
//! tick asks the [`TimeGate`] first; a closed market is logged and skipped.
//! Otherwise the handler runs in its own task with the current visibility,
//! so a slow cycle never delays the next tick.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, MutexGuard,
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::{
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};

use crate::{logging, time_gate::TimeGate};

/// 輪詢間隔下限(毫秒)
pub const MIN_INTERVAL_MS: u64 = 3000;

pub fn clamp_interval(interval_ms: u64) -> u64 {
    interval_ms.max(MIN_INTERVAL_MS)
}

#[async_trait]
pub trait TickHandler: Send + Sync {
    /// `visible` tells whether anyone is looking at the category right now.
    async fn on_tick(&self, visible: bool);
}

/// Whether the consuming view is on screen. Cloned handles share the flag.
#[derive(Debug, Clone)]
pub struct Visibility(Arc<AtomicBool>);

impl Visibility {
    pub fn new(visible: bool) -> Self {
        Visibility(Arc::new(AtomicBool::new(visible)))
    }

    pub fn set(&self, visible: bool) {
        self.0.store(visible, Ordering::Release);
    }

    pub fn is_visible(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl Default for Visibility {
    fn default() -> Self {
        Self::new(true)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running { interval_ms: u64 },
}

struct Timer {
    interval_ms: u64,
    handle: JoinHandle<()>,
}

struct Inner {
    /// 每次 arm / stop 都加一，舊的計時器看到不同的世代就不再觸發
    generation: u64,
    timer: Option<Timer>,
}

struct Shared {
    name: String,
    gate: Arc<TimeGate>,
    visibility: Visibility,
    handler: Arc<dyn TickHandler>,
    inner: Mutex<Inner>,
    dispatched: AtomicU64,
    skipped: AtomicU64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

pub struct Scheduler {
    shared: Arc<Shared>,
}

impl Scheduler {
    pub fn new(
        name: &str,
        gate: Arc<TimeGate>,
        visibility: Visibility,
        handler: Arc<dyn TickHandler>,
    ) -> Self {
        Scheduler {
            shared: Arc::new(Shared {
                name: name.to_string(),
                gate,
                visibility,
                handler,
                inner: Mutex::new(Inner {
                    generation: 0,
                    timer: None,
                }),
                dispatched: AtomicU64::new(0),
                skipped: AtomicU64::new(0),
            }),
        }
    }

    pub fn state(&self) -> SchedulerState {
        match &self.shared.lock().timer {
            Some(timer) => SchedulerState::Running {
                interval_ms: timer.interval_ms,
            },
            None => SchedulerState::Stopped,
        }
    }

    /// Ticks handed to the handler so far.
    pub fn dispatched(&self) -> u64 {
        self.shared.dispatched.load(Ordering::SeqCst)
    }

    /// Ticks dropped because the market was closed.
    pub fn skipped(&self) -> u64 {
        self.shared.skipped.load(Ordering::SeqCst)
    }

    /// Arms the timer and returns the interval actually used. Starting a
    /// running scheduler re-arms it.
    pub fn start(&self, interval_ms: u64) -> u64 {
        let mut inner = self.shared.lock();
        self.arm(&mut inner, interval_ms)
    }

    /// Replaces the running timer. A stopped scheduler stays stopped.
    pub fn reconfigure(&self, interval_ms: u64) -> Option<u64> {
        let mut inner = self.shared.lock();
        if inner.timer.is_none() {
            logging::debug_file_async(format!(
                "{} scheduler is stopped, ignore interval {} ms",
                self.shared.name, interval_ms
            ));
            return None;
        }

        Some(self.arm(&mut inner, interval_ms))
    }

    /// No tick reaches the handler after this returns. Calling it again is
    /// harmless.
    pub fn stop(&self) {
        let mut inner = self.shared.lock();
        inner.generation += 1;
        if let Some(timer) = inner.timer.take() {
            timer.handle.abort();
            logging::info_file_async(format!("{} scheduler stopped", self.shared.name));
        }
    }

    fn arm(&self, inner: &mut Inner, interval_ms: u64) -> u64 {
        let effective = clamp_interval(interval_ms);
        if effective != interval_ms {
            logging::warn_file_async(format!(
                "{} interval {} ms is below the floor, use {} ms",
                self.shared.name, interval_ms, effective
            ));
        }

        // 先拆掉舊的，任何時候最多一個計時器
        if let Some(old) = inner.timer.take() {
            old.handle.abort();
        }
        inner.generation += 1;

        let handle = tokio::spawn(run(
            Arc::clone(&self.shared),
            inner.generation,
            Duration::from_millis(effective),
        ));
        inner.timer = Some(Timer {
            interval_ms: effective,
            handle,
        });

        logging::info_file_async(format!(
            "{} scheduler armed every {} ms",
            self.shared.name, effective
        ));
        effective
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run(shared: Arc<Shared>, generation: u64, period: Duration) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let current = shared.lock().generation;
        if current != generation {
            break;
        }

        let now = shared.gate.clock().now();
        if !shared.gate.is_market_open(now) {
            shared.skipped.fetch_add(1, Ordering::SeqCst);
            logging::debug_file_async(format!("{} tick skipped, market closed", shared.name));
            continue;
        }

        let visible = shared.visibility.is_visible();
        let dispatch = Arc::clone(&shared);
        tokio::spawn(async move {
            let handler = Arc::clone(&dispatch.handler);
            let call = {
                let inner = dispatch.lock();
                if inner.generation != generation {
                    return;
                }
                dispatch.dispatched.fetch_add(1, Ordering::SeqCst);
                handler.on_tick(visible)
            };
            call.await;
        });
    }
}
