use chrono::{
    DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc,
    Weekday,
};

/// A trait representing the weekend concept.
pub trait Weekend {
    /// Returns `true` on Saturday and Sunday.
    fn is_weekend(&self) -> bool;
}

impl<Tz: TimeZone> Weekend for DateTime<Tz> {
    fn is_weekend(&self) -> bool {
        matches!(self.weekday(), Weekday::Sat | Weekday::Sun)
    }
}

impl Weekend for NaiveDate {
    fn is_weekend(&self) -> bool {
        matches!(self.weekday(), Weekday::Sat | Weekday::Sun)
    }
}

/// 交易所時區，超出範圍時退回 UTC+8
pub fn exchange_offset(hours: i32) -> FixedOffset {
    FixedOffset::east_opt(hours * 3600)
        .or_else(|| FixedOffset::east_opt(8 * 3600))
        .unwrap_or_else(|| Utc.fix())
}

/// 交易所當地的現在時間
pub fn now_in(offset: FixedOffset) -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&offset)
}

/// Parses a provider timestamp that carries no zone and pins it to `offset`.
///
/// Accepts `%Y-%m-%d %H:%M:%S`, `%Y-%m-%d %H:%M` and `%Y/%m/%d %H:%M[:%S]`.
pub fn parse_exchange_datetime(text: &str, offset: FixedOffset) -> Option<DateTime<FixedOffset>> {
    const FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y/%m/%d %H:%M:%S",
        "%Y/%m/%d %H:%M",
    ];

    let text = text.trim();
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .and_then(|naive| offset.from_local_datetime(&naive).single())
}

/// "HH:MM" or "HH:MM:SS"
pub fn parse_clock(text: &str) -> Option<NaiveTime> {
    let text = text.trim();
    NaiveTime::parse_from_str(text, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M"))
        .ok()
}
