//! 測試用的假 HTTP 與假資料來源

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use hashbrown::HashMap;
use rust_decimal::Decimal;

use crate::{
    crawler::{HolidayCalendar, QuoteProvider, QuoteResults, SuggestionSource},
    declare::{Category, Quote, SuggestionEntry},
    error::{FetchError, FetchResult},
    time_gate::Clock,
    util::{datetime, http::HttpClient},
};

/// "2024-05-07 10:00:00" in UTC+8
pub fn parse_local(local: &str) -> DateTime<Utc> {
    datetime::parse_exchange_datetime(local, datetime::exchange_offset(8))
        .unwrap()
        .with_timezone(&Utc)
}

/// 手動撥動的時鐘
pub struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    pub fn at(local: &str) -> Self {
        ManualClock(Mutex::new(parse_local(local)))
    }

    pub fn set(&self, local: &str) {
        *self.0.lock().unwrap() = parse_local(local);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

/// Answers by the first route whose pattern is contained in the URL.
#[derive(Default)]
pub struct ScriptedHttp {
    routes: Vec<(String, FetchResult<Vec<u8>>)>,
    calls: AtomicUsize,
    urls: Mutex<Vec<String>>,
}

impl ScriptedHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, pattern: &str, body: &str) -> Self {
        self.routes
            .push((pattern.to_string(), Ok(body.as_bytes().to_vec())));
        self
    }

    pub fn fail(mut self, pattern: &str, why: FetchError) -> Self {
        self.routes.push((pattern.to_string(), Err(why)));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for ScriptedHttp {
    async fn get_bytes(&self, url: &str, _headers: &[(&str, &str)]) -> FetchResult<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().unwrap().push(url.to_string());

        self.routes
            .iter()
            .find(|(pattern, _)| url.contains(pattern.as_str()))
            .map(|(_, result)| result.clone())
            .unwrap_or_else(|| Err(FetchError::network(format!("no route for {}", url))))
    }
}

pub fn quote(code: &str, category: Category, change_percent: Decimal) -> Quote {
    let offset = datetime::exchange_offset(8);
    Quote {
        code: code.to_string(),
        name: format!("name of {}", code),
        category,
        current_value: Decimal::ONE_HUNDRED + change_percent,
        change_percent,
        change_amount: change_percent,
        open_value: Decimal::ONE_HUNDRED,
        previous_close_value: Decimal::ONE_HUNDRED,
        timestamp: offset.with_ymd_and_hms(2024, 5, 7, 10, 0, 0).unwrap(),
    }
}

/// Serves whatever was scripted last; codes without a script fail with a
/// parse error. Counts calls and can be slowed down.
pub struct StaticProvider {
    category: Category,
    answers: Mutex<HashMap<String, FetchResult<Quote>>>,
    calls: AtomicUsize,
    requested: Mutex<Vec<Vec<String>>>,
    delay: Option<Duration>,
}

impl StaticProvider {
    pub fn new(category: Category) -> Self {
        StaticProvider {
            category,
            answers: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            requested: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set(&self, code: &str, change_percent: Decimal) {
        self.answers
            .lock()
            .unwrap()
            .insert(code.to_string(), Ok(quote(code, self.category, change_percent)));
    }

    pub fn set_error(&self, code: &str, why: FetchError) {
        self.answers
            .lock()
            .unwrap()
            .insert(code.to_string(), Err(why));
    }

    pub fn set_raw(&self, code: &str, result: FetchResult<Quote>) {
        self.answers.lock().unwrap().insert(code.to_string(), result);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requested(&self) -> Vec<Vec<String>> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl QuoteProvider for StaticProvider {
    fn category(&self) -> Category {
        self.category
    }

    async fn fetch_quotes(&self, codes: &[String]) -> QuoteResults {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().unwrap().push(codes.to_vec());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let answers = self.answers.lock().unwrap();
        codes
            .iter()
            .map(|code| {
                let result = answers
                    .get(code)
                    .cloned()
                    .unwrap_or_else(|| Err(FetchError::parse(format!("no script for {}", code))));
                (code.clone(), result)
            })
            .collect()
    }
}

/// Returns the same entries for every query after an optional delay.
pub struct StaticSuggestions {
    category: Category,
    entries: Vec<SuggestionEntry>,
    calls: AtomicUsize,
    delay: Mutex<Option<Duration>>,
}

impl StaticSuggestions {
    pub fn new(category: Category, codes: &[&str]) -> Self {
        StaticSuggestions {
            category,
            entries: codes
                .iter()
                .map(|code| SuggestionEntry::new(code.to_string(), "name", category, "test"))
                .collect(),
            calls: AtomicUsize::new(0),
            delay: Mutex::new(None),
        }
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SuggestionSource for StaticSuggestions {
    fn category(&self) -> Category {
        self.category
    }

    async fn search(&self, query: &str) -> FetchResult<Vec<SuggestionEntry>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        Ok(self
            .entries
            .iter()
            .filter(|e| e.code.contains(query) || query == "*")
            .cloned()
            .collect())
    }
}

pub struct StaticCalendar {
    answer: FetchResult<bool>,
    calls: AtomicUsize,
}

impl StaticCalendar {
    pub fn new(answer: FetchResult<bool>) -> Self {
        StaticCalendar {
            answer,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HolidayCalendar for StaticCalendar {
    async fn is_holiday(&self, _date: NaiveDate) -> FetchResult<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer.clone()
    }
}
