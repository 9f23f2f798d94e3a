//! Decides whether polling makes sense right now.
//!
//! The market is open when the exchange-local time falls inside one of the
//! configured sessions `[start, end)`, on a weekday that is not a holiday.
//! The holiday flag is fetched once per process and memoized; if the
//! calendar cannot be reached the day counts as a trading day.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use tokio::sync::OnceCell;
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    RetryIf,
};

use crate::{
    config::{App, Session},
    crawler::HolidayCalendar,
    error::FetchError,
    logging,
    util::datetime::{self, Weekend},
};

/// Source of "now". Tests swap it for a fixed or manually advanced clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 交易時段 `[start, end)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionWindow {
    pub name: String,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl SessionWindow {
    pub fn new(name: &str, start: NaiveTime, end: NaiveTime) -> Self {
        SessionWindow {
            name: name.to_string(),
            start,
            end,
        }
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        self.start <= time && time < self.end
    }

    fn from_config(session: &Session) -> Option<Self> {
        let start = datetime::parse_clock(&session.start)?;
        let end = datetime::parse_clock(&session.end)?;
        if end <= start {
            return None;
        }

        Some(Self::new(&session.name, start, end))
    }
}

/// 查節假日失敗時最多再試幾次
const HOLIDAY_RETRIES: usize = 2;

pub struct TimeGate {
    offset: FixedOffset,
    sessions: Vec<SessionWindow>,
    calendar: Arc<dyn HolidayCalendar>,
    clock: Arc<dyn Clock>,
    holiday: AtomicBool,
    checked: OnceCell<NaiveDate>,
}

impl TimeGate {
    pub fn new(
        offset: FixedOffset,
        sessions: Vec<SessionWindow>,
        calendar: Arc<dyn HolidayCalendar>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        TimeGate {
            offset,
            sessions,
            calendar,
            clock,
            holiday: AtomicBool::new(false),
            checked: OnceCell::new(),
        }
    }

    /// Builds the gate from the market section of `app.json`. Malformed
    /// sessions are logged and skipped.
    pub fn from_config(app: &App, calendar: Arc<dyn HolidayCalendar>, clock: Arc<dyn Clock>) -> Self {
        let mut sessions = Vec::with_capacity(app.market.sessions.len());
        for session in &app.market.sessions {
            match SessionWindow::from_config(session) {
                Some(window) => sessions.push(window),
                None => logging::error_file_async(format!(
                    "Ignore malformed trading session {:?}",
                    session
                )),
            }
        }

        Self::new(
            datetime::exchange_offset(app.market.utc_offset_hours),
            sessions,
            calendar,
            clock,
        )
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn sessions(&self) -> &[SessionWindow] {
        &self.sessions
    }

    /// Cached result of the last holiday lookup, `false` until one succeeded.
    pub fn is_holiday(&self) -> bool {
        self.holiday.load(Ordering::Acquire)
    }

    pub fn is_market_open<Tz: TimeZone>(&self, now: DateTime<Tz>) -> bool {
        let local = now.with_timezone(&self.offset);
        if local.is_weekend() || self.is_holiday() {
            return false;
        }

        let time = local.time();
        self.sessions.iter().any(|s| s.contains(time))
    }

    /// Looks today up in the holiday calendar and stores the answer. Any
    /// failure leaves today as a trading day.
    pub async fn refresh_holiday_state(&self) -> bool {
        let today = self.clock.now().with_timezone(&self.offset).date_naive();
        let strategy = ExponentialBackoff::from_millis(2)
            .factor(100)
            .max_delay(Duration::from_secs(2))
            .map(jitter)
            .take(HOLIDAY_RETRIES);

        let holiday = match RetryIf::spawn(
            strategy,
            || self.calendar.is_holiday(today),
            |why: &FetchError| !why.is_rate_limited(),
        )
        .await
        {
            Ok(holiday) => {
                logging::info_file_async(format!("{} is a holiday: {}", today, holiday));
                holiday
            }
            Err(why) => {
                logging::error_file_async(format!(
                    "Failed to look up holiday for {} because {}; treat it as a trading day",
                    today, why
                ));
                false
            }
        };

        self.holiday.store(holiday, Ordering::Release);
        holiday
    }

    /// Runs [`Self::refresh_holiday_state`] the first time only.
    pub async fn ensure_holiday_state(&self) -> bool {
        let _ = self
            .checked
            .get_or_init(|| async {
                self.refresh_holiday_state().await;
                self.clock.now().with_timezone(&self.offset).date_naive()
            })
            .await;

        self.is_holiday()
    }

    /// The day the holiday flag was looked up for.
    pub fn holiday_checked_on(&self) -> Option<NaiveDate> {
        self.checked.get().copied()
    }
}
