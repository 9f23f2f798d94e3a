use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveTime, TimeZone};
use futures::future;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::{
    crawler::{eastmoney::EastMoney, QuoteProvider, QuoteResults},
    declare::{Category, Quote},
    error::{FetchError, FetchResult},
    logging,
    util::{datetime, text},
};

/// `jsonpgz({...});` 內的估值資料
#[derive(Deserialize, Debug)]
struct Estimate {
    fundcode: String,
    name: String,
    /// 淨值日期
    #[serde(default)]
    jzrq: String,
    /// 單位淨值
    #[serde(default)]
    dwjz: String,
    /// 估算淨值
    #[serde(default)]
    gsz: String,
    /// 估算漲幅
    #[serde(default)]
    gszzl: String,
    /// 估值時間
    #[serde(default)]
    gztime: String,
}

/// Turns one valuation script into a [`Quote`].
///
/// Funds without an intraday estimate (QDII, money market) still report the
/// last published net value; those come back unchanged at that value.
pub(crate) fn parse_estimate(
    code: &str,
    body: &str,
    offset: FixedOffset,
    fetched_at: DateTime<FixedOffset>,
) -> FetchResult<Quote> {
    let json = text::jsonp_body(body)
        .filter(|json| !json.is_empty())
        .ok_or_else(|| FetchError::parse(format!("No valuation for fund {}", code)))?;
    let estimate: Estimate = serde_json::from_str(json)?;

    if estimate.fundcode != code {
        return Err(FetchError::parse(format!(
            "Asked for fund {} but got {}",
            code, estimate.fundcode
        )));
    }

    let net_value = text::parse_decimal(&estimate.dwjz, None)
        .map_err(|why| FetchError::parse(format!("{} dwjz: {}", code, why)))?;

    let (current, change_percent) = match text::parse_decimal(&estimate.gsz, None) {
        Ok(gsz) => (
            gsz,
            text::parse_decimal(&estimate.gszzl, None).unwrap_or(Decimal::ZERO),
        ),
        Err(_) => (net_value, Decimal::ZERO),
    };

    let timestamp = datetime::parse_exchange_datetime(&estimate.gztime, offset)
        .or_else(|| {
            let date = chrono::NaiveDate::parse_from_str(&estimate.jzrq, "%Y-%m-%d").ok()?;
            let close = NaiveTime::from_hms_opt(15, 0, 0)?;
            offset.from_local_datetime(&date.and_time(close)).single()
        })
        .unwrap_or(fetched_at);

    Ok(Quote {
        code: code.to_string(),
        name: estimate.name,
        category: Category::Fund,
        current_value: current,
        change_percent,
        change_amount: (current - net_value).round_dp(4),
        open_value: net_value,
        previous_close_value: net_value,
        timestamp,
    })
}

impl EastMoney {
    async fn fetch_estimate(&self, code: &str) -> FetchResult<Quote> {
        let now = datetime::now_in(self.offset);
        let url = format!(
            "https://{host}/js/{code}.js?rt={time}",
            host = self.host,
            code = code,
            time = now.timestamp_millis()
        );
        let body = self.client.get_text(&url, &[]).await?;
        parse_estimate(code, &body, self.offset, now)
    }
}

#[async_trait]
impl QuoteProvider for EastMoney {
    fn category(&self) -> Category {
        Category::Fund
    }

    async fn fetch_quotes(&self, codes: &[String]) -> QuoteResults {
        // 沒有批次介面，各檔分開請求並同時送出
        let results = future::join_all(codes.iter().map(|code| async move {
            let result = self.fetch_estimate(code).await;
            if let Err(why) = &result {
                logging::warn_file_async(format!("Failed to fetch fund {} because {}", code, why));
            }
            (code.clone(), result)
        }))
        .await;

        results.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal_macros::dec;

    use super::*;
    use crate::{config::App, test_support::ScriptedHttp};

    const BODY: &str = r#"jsonpgz({"fundcode":"161725","name":"招商中证白酒指数(LOF)A","jzrq":"2024-05-06","dwjz":"1.0520","gsz":"1.0611","gszzl":"0.87","gztime":"2024-05-07 15:00"});"#;

    fn offset() -> FixedOffset {
        datetime::exchange_offset(8)
    }

    #[test]
    fn test_parse_estimate() {
        let fetched = datetime::now_in(offset());
        let quote = parse_estimate("161725", BODY, offset(), fetched).unwrap();

        assert_eq!(quote.name, "招商中证白酒指数(LOF)A");
        assert_eq!(quote.category, Category::Fund);
        assert_eq!(quote.current_value, dec!(1.0611));
        assert_eq!(quote.change_percent, dec!(0.87));
        assert_eq!(quote.change_amount, dec!(0.0091));
        assert_eq!(quote.previous_close_value, dec!(1.0520));
        assert_eq!(quote.timestamp.to_rfc3339(), "2024-05-07T15:00:00+08:00");
    }

    #[test]
    fn test_parse_estimate_without_valuation() {
        let body = r#"jsonpgz({"fundcode":"000009","name":"易方达天天理财货币A","jzrq":"2024-05-06","dwjz":"1.0000","gsz":"","gszzl":"","gztime":""});"#;
        let quote = parse_estimate("000009", body, offset(), datetime::now_in(offset())).unwrap();

        assert_eq!(quote.current_value, dec!(1.0000));
        assert_eq!(quote.change_percent, Decimal::ZERO);
        assert_eq!(quote.timestamp.to_rfc3339(), "2024-05-06T15:00:00+08:00");
    }

    #[test]
    fn test_parse_estimate_rejects_garbage() {
        let now = datetime::now_in(offset());
        assert!(matches!(
            parse_estimate("999999", "jsonpgz();", offset(), now),
            Err(FetchError::Parse(_))
        ));
        assert!(parse_estimate("161725", "<html>404</html>", offset(), now).is_err());
        // 回傳的代碼不符時不能掛到別的基金上
        assert!(parse_estimate("000001", BODY, offset(), now).is_err());
    }

    #[tokio::test]
    async fn test_fetch_quotes_isolates_failures() {
        let http = Arc::new(
            ScriptedHttp::new()
                .respond("/js/161725.js", BODY)
                .fail("/js/000001.js", FetchError::network("timeout")),
        );
        let provider = EastMoney::new(http.clone(), &App::default());

        let results = provider
            .fetch_quotes(&["161725".to_string(), "000001".to_string()])
            .await;

        assert_eq!(results.len(), 2);
        assert_eq!(results["161725"].as_ref().unwrap().current_value, dec!(1.0611));
        assert!(matches!(results["000001"], Err(FetchError::Network(_))));
        assert_eq!(http.calls(), 2);
    }
}
