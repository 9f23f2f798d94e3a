use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::declare::{Category, SortMode};

/// 預設輪詢間隔(毫秒)
pub const DEFAULT_INTERVAL_MS: u64 = 10_000;
/// 狀態列最多顯示的股票數
pub const STATUS_BAR_LIMIT: usize = 4;

/// A code the user follows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchListEntry {
    pub code: String,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub insertion_order: u64,
}

impl WatchListEntry {
    pub fn new(code: &str, insertion_order: u64) -> Self {
        WatchListEntry {
            code: code.to_string(),
            pinned: false,
            insertion_order,
        }
    }
}

/// Older settings files store a bare list of codes.
#[derive(Deserialize)]
#[serde(untagged)]
pub enum RawEntry {
    Code(String),
    Entry(WatchListEntry),
}

/// An ordered set of codes, unique by code.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Vec<RawEntry>", into = "Vec<WatchListEntry>")]
pub struct WatchList {
    entries: Vec<WatchListEntry>,
}

impl From<Vec<RawEntry>> for WatchList {
    fn from(raw: Vec<RawEntry>) -> Self {
        let mut list = WatchList::default();
        let mut pending = Vec::new();

        for item in raw {
            match item {
                RawEntry::Entry(entry) => {
                    let code = entry.code.trim().to_string();
                    if code.is_empty() || list.contains(&code) {
                        continue;
                    }
                    // 手改的檔案常漏掉 insertion_order，重複時依檔案順序補上
                    let insertion_order = if list.has_order(entry.insertion_order) {
                        list.next_order()
                    } else {
                        entry.insertion_order
                    };
                    list.entries.push(WatchListEntry {
                        code,
                        insertion_order,
                        ..entry
                    });
                }
                RawEntry::Code(code) => pending.push(code),
            }
        }

        // 沒有順序的舊格式接在最後面
        for code in pending {
            list.add(&code);
        }

        list
    }
}

impl From<WatchList> for Vec<WatchListEntry> {
    fn from(list: WatchList) -> Self {
        list.entries
    }
}

impl WatchList {
    pub fn from_codes<S: AsRef<str>>(codes: &[S]) -> Self {
        let mut list = WatchList::default();
        for code in codes {
            list.add(code.as_ref());
        }
        list
    }

    pub fn entries(&self) -> &[WatchListEntry] {
        &self.entries
    }

    pub fn codes(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.code.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, code: &str) -> bool {
        self.entries.iter().any(|e| e.code == code)
    }

    pub fn get(&self, code: &str) -> Option<&WatchListEntry> {
        self.entries.iter().find(|e| e.code == code)
    }

    fn has_order(&self, order: u64) -> bool {
        self.entries.iter().any(|e| e.insertion_order == order)
    }

    fn next_order(&self) -> u64 {
        self.entries
            .iter()
            .map(|e| e.insertion_order + 1)
            .max()
            .unwrap_or(0)
    }

    /// Returns `false` when the code is blank or already present.
    pub fn add(&mut self, code: &str) -> bool {
        let code = code.trim();
        if code.is_empty() || self.contains(code) {
            return false;
        }

        let order = self.next_order();
        self.entries.push(WatchListEntry::new(code, order));
        true
    }

    pub fn remove(&mut self, code: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.code != code);
        before != self.entries.len()
    }

    pub fn set_pinned(&mut self, code: &str, pinned: bool) -> bool {
        match self.entries.iter_mut().find(|e| e.code == code) {
            Some(entry) => {
                entry.pinned = pinned;
                true
            }
            None => false,
        }
    }

    /// 置頂/取消置頂，回傳新的狀態
    pub fn toggle_pin(&mut self, code: &str) -> Option<bool> {
        let entry = self.entries.iter_mut().find(|e| e.code == code)?;
        entry.pinned = !entry.pinned;
        Some(entry.pinned)
    }
}

/// 持有金額
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FundHolding {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub amount: Decimal,
}

/// Display preferences. Only `fund_amount` and `status_bar_stocks` are read
/// by the engine; everything else is carried for the presenters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Display {
    pub icon_type: String,
    pub rise_color: String,
    pub fall_color: String,
    pub show_earnings: bool,
    pub hide_text: bool,
    pub fund_amount: HashMap<String, FundHolding>,
    pub status_bar_stocks: Vec<String>,
}

impl Default for Display {
    fn default() -> Self {
        Display {
            icon_type: "arrow".to_string(),
            rise_color: "#ff785d".to_string(),
            fall_color: "#95ec69".to_string(),
            show_earnings: false,
            hide_text: false,
            fund_amount: HashMap::new(),
            status_bar_stocks: vec!["sh000001".to_string()],
        }
    }
}

/// The user's settings as seen by one refresh cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// 輪詢間隔(毫秒)，低於下限時由排程器拉高
    #[serde(default = "default_interval")]
    pub interval: u64,
    #[serde(default)]
    pub funds: WatchList,
    #[serde(default)]
    pub stocks: WatchList,
    #[serde(default)]
    pub fund_sort: SortMode,
    #[serde(default)]
    pub stock_sort: SortMode,
    #[serde(default)]
    pub display: Display,
}

fn default_interval() -> u64 {
    DEFAULT_INTERVAL_MS
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            interval: DEFAULT_INTERVAL_MS,
            funds: WatchList::default(),
            stocks: WatchList::default(),
            fund_sort: SortMode::Normal,
            stock_sort: SortMode::Normal,
            display: Display::default(),
        }
    }
}

impl Settings {
    pub fn watch_list(&self, category: Category) -> &WatchList {
        match category {
            Category::Fund => &self.funds,
            Category::Stock => &self.stocks,
        }
    }

    pub fn watch_list_mut(&mut self, category: Category) -> &mut WatchList {
        match category {
            Category::Fund => &mut self.funds,
            Category::Stock => &mut self.stocks,
        }
    }

    pub fn sort_mode(&self, category: Category) -> SortMode {
        match category {
            Category::Fund => self.fund_sort,
            Category::Stock => self.stock_sort,
        }
    }

    pub fn set_sort_mode(&mut self, category: Category, mode: SortMode) {
        match category {
            Category::Fund => self.fund_sort = mode,
            Category::Stock => self.stock_sort = mode,
        }
    }

    /// Keeps the first [`STATUS_BAR_LIMIT`] codes.
    pub fn set_status_bar_stocks(&mut self, codes: Vec<String>) {
        let mut picked: Vec<String> = Vec::with_capacity(STATUS_BAR_LIMIT);
        for code in codes {
            if picked.len() == STATUS_BAR_LIMIT {
                break;
            }
            if !picked.contains(&code) {
                picked.push(code);
            }
        }
        self.display.status_bar_stocks = picked;
    }

    pub fn fund_amount(&self, code: &str) -> Option<Decimal> {
        self.display
            .fund_amount
            .get(code)
            .map(|holding| holding.amount)
            .filter(|amount| !amount.is_zero())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn test_add_assigns_monotonic_order() {
        let mut list = WatchList::default();
        assert!(list.add("161725"));
        assert!(list.add("000001"));
        assert!(!list.add("161725"));
        assert!(!list.add("   "));

        assert!(list.remove("161725"));
        assert!(list.add("110011"));

        let orders: Vec<(String, u64)> = list
            .entries()
            .iter()
            .map(|e| (e.code.clone(), e.insertion_order))
            .collect();
        assert_eq!(
            orders,
            vec![("000001".to_string(), 1), ("110011".to_string(), 2)]
        );
    }

    #[test]
    fn test_toggle_pin() {
        let mut list = WatchList::from_codes(&["sh000001", "sz000002"]);
        assert_eq!(list.toggle_pin("sz000002"), Some(true));
        assert_eq!(list.toggle_pin("sz000002"), Some(false));
        assert_eq!(list.toggle_pin("hk00700"), None);
        assert!(list.set_pinned("sh000001", true));
        assert!(list.get("sh000001").unwrap().pinned);
    }

    #[test]
    fn test_deserialize_mixed_formats() {
        let json = r#"[
            {"code": "000001", "pinned": true, "insertion_order": 5},
            "161725",
            "000001",
            {"code": "000001", "pinned": false, "insertion_order": 9}
        ]"#;
        let list: WatchList = serde_json::from_str(json).unwrap();

        assert_eq!(list.codes(), vec!["000001", "161725"]);
        assert!(list.get("000001").unwrap().pinned);
        assert_eq!(list.get("161725").unwrap().insertion_order, 6);
    }

    #[test]
    fn test_entries_without_order_keep_file_order() {
        let json = r#"[
            {"code": "sz000002"},
            {"code": "sh000001", "pinned": true},
            {"code": "hk00700"}
        ]"#;
        let list: WatchList = serde_json::from_str(json).unwrap();

        let orders: Vec<(String, u64)> = list
            .entries()
            .iter()
            .map(|e| (e.code.clone(), e.insertion_order))
            .collect();
        assert_eq!(
            orders,
            vec![
                ("sz000002".to_string(), 0),
                ("sh000001".to_string(), 1),
                ("hk00700".to_string(), 2)
            ]
        );

        let sorted = crate::sort::sort(
            list.entries()
                .iter()
                .filter(|e| !e.pinned)
                .map(|e| (e.clone(), None))
                .collect::<Vec<_>>(),
            crate::declare::SortMode::Normal,
        );
        let codes: Vec<&str> = sorted.iter().map(|(e, _)| e.code.as_str()).collect();
        assert_eq!(codes, vec!["sz000002", "hk00700"]);
    }

    #[test]
    fn test_settings_round_trip_keeps_orders() {
        let mut settings = Settings::default();
        settings.funds.add("161725");
        settings.funds.add("000001");
        settings.funds.set_pinned("000001", true);
        settings.stock_sort = SortMode::Descending;

        let text = serde_json::to_string(&settings).unwrap();
        let back: Settings = serde_json::from_str(&text).unwrap();
        assert_eq!(back, settings);
    }

    #[test]
    fn test_status_bar_limit() {
        let mut settings = Settings::default();
        settings.set_status_bar_stocks(
            ["sh000001", "sz399001", "sh000001", "hk00700", "gb_aapl", "sz000002"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        );

        assert_eq!(
            settings.display.status_bar_stocks,
            vec!["sh000001", "sz399001", "hk00700", "gb_aapl"]
        );
    }

    #[test]
    fn test_fund_amount() {
        let json = r#"{ "display": { "fund_amount": {
            "161725": { "name": "招商中证白酒", "amount": 1000 },
            "000001": { "amount": "0" }
        } } }"#;
        let settings: Settings = serde_json::from_str(json).unwrap();

        assert_eq!(settings.interval, DEFAULT_INTERVAL_MS);
        assert_eq!(settings.fund_amount("161725"), Some(dec!(1000)));
        assert_eq!(settings.fund_amount("000001"), None);
        assert_eq!(settings.display.icon_type, "arrow");
    }
}
