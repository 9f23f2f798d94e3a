//! The presentation-ready view of one category.
//!
//! A [`Snapshot`] is rebuilt as a whole every cycle and published behind an
//! `Arc`; readers never see a half merged list.

use chrono::{DateTime, Local};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::{
    config::watch_list::WatchListEntry,
    declare::{Category, Quote, SortMode},
    error::FetchError,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotEntry {
    pub entry: WatchListEntry,
    /// `None` until the code resolved at least once
    pub quote: Option<Quote>,
    /// 最近一次抓取失敗的原因
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<FetchError>,
    /// The quote is from an earlier cycle because the last fetch failed.
    pub stale: bool,
    /// 持有金額 × 漲跌幅
    pub estimated_earnings: Option<Decimal>,
}

fn serialize_error<S: serde::Serializer>(
    error: &Option<FetchError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(why) => serializer.serialize_some(&why.to_string()),
        None => serializer.serialize_none(),
    }
}

impl SnapshotEntry {
    pub fn new(entry: WatchListEntry, quote: Option<Quote>) -> Self {
        SnapshotEntry {
            entry,
            quote,
            error: None,
            stale: false,
            estimated_earnings: None,
        }
    }

    pub fn code(&self) -> &str {
        &self.entry.code
    }

    pub fn is_absent(&self) -> bool {
        self.quote.is_none()
    }

    /// 依持有金額估算今日損益，取到分
    pub fn with_earnings(mut self, amount: Option<Decimal>) -> Self {
        self.estimated_earnings = match (amount, &self.quote) {
            (Some(amount), Some(quote)) => Some(
                (amount * quote.change_percent / Decimal::ONE_HUNDRED)
                    .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
            ),
            _ => None,
        };
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub category: Category,
    pub entries: Vec<SnapshotEntry>,
    pub mode: SortMode,
    /// `None` for the empty snapshot published before the first cycle
    pub updated_at: Option<DateTime<Local>>,
}

impl Snapshot {
    pub fn empty(category: Category) -> Self {
        Snapshot {
            category,
            entries: Vec::new(),
            mode: SortMode::Normal,
            updated_at: None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, code: &str) -> Option<&SnapshotEntry> {
        self.entries.iter().find(|e| e.code() == code)
    }

    pub fn quote(&self, code: &str) -> Option<&Quote> {
        self.get(code).and_then(|e| e.quote.as_ref())
    }

    pub fn codes(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.code()).collect()
    }

    pub fn absent_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_absent()).count()
    }

    /// 狀態列要顯示的項目，依 `codes` 的順序，找不到的略過
    pub fn pick<S: AsRef<str>>(&self, codes: &[S]) -> Vec<&SnapshotEntry> {
        codes.iter().filter_map(|code| self.get(code.as_ref())).collect()
    }

    /// 全部持有的估算損益
    pub fn total_earnings(&self) -> Decimal {
        self.entries
            .iter()
            .filter_map(|e| e.estimated_earnings)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::test_support::quote;

    fn entry(code: &str, order: u64, change: Option<Decimal>) -> SnapshotEntry {
        SnapshotEntry::new(
            WatchListEntry::new(code, order),
            change.map(|c| quote(code, Category::Fund, c)),
        )
    }

    #[test]
    fn test_earnings() {
        let e = entry("161725", 0, Some(dec!(1.235))).with_earnings(Some(dec!(1000)));
        assert_eq!(e.estimated_earnings, Some(dec!(12.35)));

        let falling = entry("161725", 0, Some(dec!(-0.875))).with_earnings(Some(dec!(200)));
        assert_eq!(falling.estimated_earnings, Some(dec!(-1.75)));

        let absent = entry("000001", 1, None).with_earnings(Some(dec!(1000)));
        assert_eq!(absent.estimated_earnings, None);

        let no_holding = entry("161725", 0, Some(dec!(1))).with_earnings(None);
        assert_eq!(no_holding.estimated_earnings, None);
    }

    #[test]
    fn test_pick_keeps_requested_order() {
        let snapshot = Snapshot {
            category: Category::Stock,
            entries: vec![
                entry("sh000001", 0, Some(dec!(1))),
                entry("sz399001", 1, Some(dec!(2))),
                entry("hk00700", 2, None),
            ],
            mode: SortMode::Normal,
            updated_at: None,
        };

        let picked: Vec<&str> = snapshot
            .pick(&["hk00700", "gb_aapl", "sh000001"])
            .iter()
            .map(|e| e.code())
            .collect();
        assert_eq!(picked, vec!["hk00700", "sh000001"]);
        assert_eq!(snapshot.absent_count(), 1);
        assert_eq!(snapshot.quote("sz399001").unwrap().change_percent, dec!(2));
    }

    #[test]
    fn test_total_earnings() {
        let snapshot = Snapshot {
            category: Category::Fund,
            entries: vec![
                entry("161725", 0, Some(dec!(1))).with_earnings(Some(dec!(1000))),
                entry("000001", 1, Some(dec!(-2))).with_earnings(Some(dec!(100))),
                entry("110011", 2, Some(dec!(3))),
            ],
            mode: SortMode::Normal,
            updated_at: None,
        };

        assert_eq!(snapshot.total_earnings(), dec!(8));
    }

    #[test]
    fn test_serialize_error_as_text() {
        let mut e = entry("sh000001", 0, None);
        e.error = Some(FetchError::network("timeout"));
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["error"], "Network error: timeout");
    }
}
