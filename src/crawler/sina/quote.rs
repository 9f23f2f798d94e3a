use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use hashbrown::HashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::{
    crawler::{
        fail_all,
        sina::{Sina, MAX_CODES_PER_REQUEST},
        Market, QuoteProvider, QuoteResults,
    },
    declare::{Category, Quote},
    error::{FetchError, FetchResult},
    logging,
    util::{datetime, text},
};

static HQ_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"var\s+hq_str_([A-Za-z0-9_$.]+)\s*=\s*"([^"]*)""#)
        .expect("hq_str pattern is valid")
});

/// Splits a `hq.sinajs.cn` body into `code => payload`, keyed by lower case code.
pub(crate) fn split_response(body: &str) -> HashMap<String, String> {
    HQ_LINE
        .captures_iter(body)
        .map(|caps| (caps[1].to_ascii_lowercase(), caps[2].to_string()))
        .collect()
}

fn field(fields: &[&str], index: usize, code: &str) -> FetchResult<Decimal> {
    let value = fields
        .get(index)
        .ok_or_else(|| FetchError::parse(format!("{} has no field {}", code, index)))?;
    text::parse_decimal(value, None)
        .map_err(|why| FetchError::parse(format!("{} field {}: {}", code, index, why)))
}

fn percent_of(change: Decimal, base: Decimal) -> Decimal {
    if base.is_zero() {
        return Decimal::ZERO;
    }

    (change / base * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Parses one payload according to the market the code belongs to.
pub(crate) fn parse_quote(
    code: &str,
    payload: &str,
    offset: FixedOffset,
    fetched_at: DateTime<FixedOffset>,
) -> FetchResult<Quote> {
    if payload.trim().is_empty() {
        return Err(FetchError::parse(format!("Sina knows nothing about {}", code)));
    }

    let fields: Vec<&str> = payload.split(',').collect();
    match Market::from_code(code)? {
        Market::AShare => parse_a_share(code, &fields, offset, fetched_at),
        Market::HongKong => parse_hong_kong(code, &fields, offset, fetched_at),
        Market::UnitedStates => parse_united_states(code, &fields, offset, fetched_at),
    }
}

/// 0 名稱 1 今開 2 昨收 3 現價 4 最高 5 最低 ... 30 日期 31 時間
fn parse_a_share(
    code: &str,
    fields: &[&str],
    offset: FixedOffset,
    fetched_at: DateTime<FixedOffset>,
) -> FetchResult<Quote> {
    let open = field(fields, 1, code)?;
    let previous_close = field(fields, 2, code)?;
    let mut current = field(fields, 3, code)?;
    // 停牌或開盤前現價為 0
    if current.is_zero() {
        current = previous_close;
    }
    let change = current - previous_close;

    let timestamp = match (fields.get(30), fields.get(31)) {
        (Some(date), Some(time)) => {
            datetime::parse_exchange_datetime(&format!("{} {}", date, time), offset)
        }
        _ => None,
    };

    Ok(Quote {
        code: code.to_string(),
        name: fields[0].trim().to_string(),
        category: Category::Stock,
        current_value: current,
        change_percent: percent_of(change, previous_close),
        change_amount: change,
        open_value: open,
        previous_close_value: previous_close,
        timestamp: timestamp.unwrap_or(fetched_at),
    })
}

/// 0 英文名 1 中文名 2 今開 3 昨收 4 最高 5 最低 6 現價 7 漲跌 8 漲幅 ... 17 日期 18 時間
fn parse_hong_kong(
    code: &str,
    fields: &[&str],
    offset: FixedOffset,
    fetched_at: DateTime<FixedOffset>,
) -> FetchResult<Quote> {
    let open = field(fields, 2, code)?;
    let previous_close = field(fields, 3, code)?;
    let current = field(fields, 6, code)?;
    let change = field(fields, 7, code).unwrap_or(current - previous_close);
    let change_percent =
        field(fields, 8, code).unwrap_or_else(|_| percent_of(change, previous_close));

    let timestamp = match (fields.get(17), fields.get(18)) {
        (Some(date), Some(time)) => {
            datetime::parse_exchange_datetime(&format!("{} {}", date, time), offset)
        }
        _ => None,
    };

    let name = match fields.get(1).map(|n| n.trim()) {
        Some(name) if !name.is_empty() => name,
        _ => fields[0].trim(),
    };

    Ok(Quote {
        code: code.to_string(),
        name: name.to_string(),
        category: Category::Stock,
        current_value: current,
        change_percent,
        change_amount: change,
        open_value: open,
        previous_close_value: previous_close,
        timestamp: timestamp.unwrap_or(fetched_at),
    })
}

/// 0 名稱 1 現價 2 漲幅 3 時間 4 漲跌 5 今開 6 最高 7 最低 ... 26 昨收
fn parse_united_states(
    code: &str,
    fields: &[&str],
    offset: FixedOffset,
    fetched_at: DateTime<FixedOffset>,
) -> FetchResult<Quote> {
    let current = field(fields, 1, code)?;
    let change_percent = field(fields, 2, code)?;
    let change = field(fields, 4, code)?;
    let open = field(fields, 5, code)?;
    let previous_close = field(fields, 26, code).unwrap_or(current - change);

    let timestamp = fields
        .get(3)
        .and_then(|time| datetime::parse_exchange_datetime(time, offset));

    Ok(Quote {
        code: code.to_string(),
        name: fields[0].trim().to_string(),
        category: Category::Stock,
        current_value: current,
        change_percent,
        change_amount: change,
        open_value: open,
        previous_close_value: previous_close,
        timestamp: timestamp.unwrap_or(fetched_at),
    })
}

impl Sina {
    async fn fetch_chunk(&self, codes: &[String], results: &mut QuoteResults) {
        // 港股指數區分大小寫，例如 hkHSI，代碼原樣送出
        let list = codes.join(",");
        let url = format!("https://{}/list={}", self.host, list);

        let body = match self.client.get_text_gbk(&url, &Self::headers()).await {
            Ok(body) => body,
            Err(why) => {
                logging::warn_file_async(format!(
                    "Failed to fetch {} stocks because {}",
                    codes.len(),
                    why
                ));
                results.extend(fail_all(codes, &why));
                return;
            }
        };

        let fetched_at = datetime::now_in(self.offset);
        let mut payloads = split_response(&body);
        for code in codes {
            let result = match payloads.remove(&code.to_ascii_lowercase()) {
                Some(payload) => parse_quote(code, &payload, self.offset, fetched_at),
                None => Err(FetchError::parse(format!("{} is missing from the response", code))),
            };
            results.insert(code.clone(), result);
        }
    }
}

#[async_trait]
impl QuoteProvider for Sina {
    fn category(&self) -> Category {
        Category::Stock
    }

    async fn fetch_quotes(&self, codes: &[String]) -> QuoteResults {
        let mut results = QuoteResults::with_capacity(codes.len());
        let mut valid = Vec::with_capacity(codes.len());

        for code in codes {
            match Market::from_code(code) {
                Ok(_) => valid.push(code.clone()),
                Err(why) => {
                    results.insert(code.clone(), Err(why));
                }
            }
        }

        for chunk in valid.chunks(MAX_CODES_PER_REQUEST) {
            self.fetch_chunk(chunk, &mut results).await;
        }

        results
    }
}
