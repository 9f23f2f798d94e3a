use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 自選清單的分類
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Category {
    /// 基金
    Fund,
    /// 股票
    Stock,
}

impl Category {
    pub fn iterator() -> impl Iterator<Item = Self> {
        [Self::Fund, Self::Stock].iter().copied()
    }
}

/// 排序方式
///
/// The serial numbers match the values persisted in the user settings file:
/// `0` keeps the watch-list order, `-1` sorts by change percent descending and
/// `1` sorts by change percent ascending.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display)]
#[serde(into = "i32", try_from = "i32")]
pub enum SortMode {
    /// 依加入順序 0
    #[default]
    Normal,
    /// 漲幅由高到低 -1
    Descending,
    /// 漲幅由低到高 1
    Ascending,
}

impl SortMode {
    pub fn serial(&self) -> i32 {
        match self {
            SortMode::Normal => 0,
            SortMode::Descending => -1,
            SortMode::Ascending => 1,
        }
    }

    pub fn from(serial: i32) -> Option<SortMode> {
        match serial {
            0 => Some(SortMode::Normal),
            -1 => Some(SortMode::Descending),
            1 => Some(SortMode::Ascending),
            _ => None,
        }
    }

    /// Normal -> Descending -> Ascending -> Normal
    pub fn next(&self) -> SortMode {
        match self {
            SortMode::Normal => SortMode::Descending,
            SortMode::Descending => SortMode::Ascending,
            SortMode::Ascending => SortMode::Normal,
        }
    }
}

impl From<SortMode> for i32 {
    fn from(mode: SortMode) -> Self {
        mode.serial()
    }
}

impl TryFrom<i32> for SortMode {
    type Error = String;

    fn try_from(serial: i32) -> Result<Self, Self::Error> {
        SortMode::from(serial).ok_or_else(|| format!("unknown sort mode {}", serial))
    }
}

/// 單一標的的即時報價
///
/// A quote is produced by exactly one fetch and is never patched afterwards;
/// the next successful fetch for the same code replaces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub code: String,
    pub name: String,
    pub category: Category,
    /// 現價 (funds: estimated net value)
    pub current_value: Decimal,
    /// 漲跌幅 in percent, negative when falling
    pub change_percent: Decimal,
    /// 漲跌
    pub change_amount: Decimal,
    /// 開盤價 (funds: last published net value)
    pub open_value: Decimal,
    /// 昨收 (funds: last published net value)
    pub previous_close_value: Decimal,
    /// Provider-reported time in exchange-local offset, or the fetch time.
    pub timestamp: DateTime<FixedOffset>,
}

/// 搜尋代碼時的候選項目，只存在於一次搜尋互動中
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionEntry {
    /// Code in the format the quote providers expect, e.g. `sh600519`, `hk00700`, `gb_aapl`.
    pub code: String,
    /// `code | name`
    pub display_label: String,
    pub category: Category,
    /// Provider classification such as `A股`, `港股` or a fund type.
    pub kind: String,
}

impl SuggestionEntry {
    pub fn new(code: String, name: &str, category: Category, kind: &str) -> Self {
        SuggestionEntry {
            display_label: format!("{} | {}", code, name),
            code,
            category,
            kind: kind.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_mode_cycle() {
        let mut mode = SortMode::Normal;
        let mut seen = Vec::new();
        for _ in 0..3 {
            mode = mode.next();
            seen.push(mode);
        }

        assert_eq!(
            seen,
            vec![SortMode::Descending, SortMode::Ascending, SortMode::Normal]
        );
    }

    #[test]
    fn test_sort_mode_serde() {
        assert_eq!(serde_json::to_string(&SortMode::Descending).unwrap(), "-1");
        assert_eq!(serde_json::from_str::<SortMode>("1").unwrap(), SortMode::Ascending);
        assert!(serde_json::from_str::<SortMode>("7").is_err());
    }

    #[test]
    fn test_category_text() {
        assert_eq!(Category::Fund.to_string(), "fund");
        assert_eq!(serde_json::to_string(&Category::Stock).unwrap(), "\"stock\"");
        // 排程器名稱與設定檔用的是同一組字
        for category in Category::iterator() {
            let json = serde_json::to_string(&category).unwrap();
            assert_eq!(json.trim_matches('"'), category.to_string());
        }
    }
}
