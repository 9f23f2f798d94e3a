//! # 行情來源
//!
//! Every provider the engine talks to lives in its own module and is reached
//! through one of three seams:
//!
//! - [`QuoteProvider`]：報價，一次給一批代碼，逐一回傳結果
//! - [`SuggestionSource`]：代碼搜尋
//! - [`HolidayCalendar`]：交易日判斷
//!
//! Providers never see the watch list, the snapshot or each other. The
//! caller owns batching policy above the provider's own request limits.

use async_trait::async_trait;
use chrono::NaiveDate;
use hashbrown::HashMap;

use crate::{
    declare::{Category, Quote, SuggestionEntry},
    error::{FetchError, FetchResult},
};

/// 天天基金(東方財富)
pub mod eastmoney;
/// 新浪財經
pub mod sina;
/// 提莫的神秘小站 節假日 API
pub mod timor;

/// Per-code outcome of one fetch.
pub type QuoteResults = HashMap<String, FetchResult<Quote>>;

#[async_trait]
pub trait QuoteProvider: Send + Sync {
    fn category(&self) -> Category;

    /// Fetches every code in `codes`. The map holds one entry per requested
    /// code; a code that failed maps to its own error and never affects the
    /// others.
    async fn fetch_quotes(&self, codes: &[String]) -> QuoteResults;
}

#[async_trait]
pub trait SuggestionSource: Send + Sync {
    fn category(&self) -> Category;

    async fn search(&self, query: &str) -> FetchResult<Vec<SuggestionEntry>>;
}

#[async_trait]
pub trait HolidayCalendar: Send + Sync {
    /// `true` when the exchange is closed for the whole day.
    async fn is_holiday(&self, date: NaiveDate) -> FetchResult<bool>;
}

/// 股票代碼所屬市場
#[derive(Debug, Copy, Clone, PartialEq, Eq, strum::Display)]
pub enum Market {
    /// 滬深京 A 股與指數 sh/sz/bj
    AShare,
    /// 港股 hk
    HongKong,
    /// 美股 gb_ / usr_
    UnitedStates,
}

impl Market {
    /// Classifies a stock code by its prefix. Unknown prefixes are a
    /// configuration problem of that one code.
    pub fn from_code(code: &str) -> FetchResult<Market> {
        let lower = code.to_ascii_lowercase();
        if lower.starts_with("gb_") || lower.starts_with("usr_") {
            return Ok(Market::UnitedStates);
        }
        if lower.starts_with("hk") {
            return Ok(Market::HongKong);
        }
        if ["sh", "sz", "bj"].iter().any(|p| lower.starts_with(p)) && lower.len() > 2 {
            return Ok(Market::AShare);
        }

        Err(FetchError::Config(format!("Unknown market prefix in code '{}'", code)))
    }
}

/// 把同一個錯誤分給一批代碼
pub(crate) fn fail_all(codes: &[String], why: &FetchError) -> QuoteResults {
    codes
        .iter()
        .map(|code| (code.clone(), Err(why.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_market_from_code() {
        assert_eq!(Market::from_code("sh000001").unwrap(), Market::AShare);
        assert_eq!(Market::from_code("SZ000002").unwrap(), Market::AShare);
        assert_eq!(Market::from_code("bj830799").unwrap(), Market::AShare);
        assert_eq!(Market::from_code("hk00700").unwrap(), Market::HongKong);
        assert_eq!(Market::from_code("gb_aapl").unwrap(), Market::UnitedStates);
        assert_eq!(Market::from_code("usr_tsla").unwrap(), Market::UnitedStates);

        match Market::from_code("nasdaq_aapl") {
            Err(FetchError::Config(_)) => {}
            other => panic!("unexpected {:?}", other),
        }
        assert!(Market::from_code("sh").is_err());
    }

    #[test]
    fn test_fail_all() {
        let codes = vec!["a".to_string(), "b".to_string()];
        let results = fail_all(&codes, &FetchError::network("down"));
        assert_eq!(results.len(), 2);
        assert!(results.values().all(|r| r.is_err()));
    }
}
