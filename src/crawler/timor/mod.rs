//! 節假日查詢 `timor.tech/api/holiday/info/{yyyy-mm-dd}`
//!
//! `type.type`：0 工作日、1 週末、2 節日、3 調休(補班)。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;

use crate::{
    config::App,
    crawler::HolidayCalendar,
    error::{FetchError, FetchResult},
    util::http::HttpClient,
};

#[derive(Deserialize, Debug)]
struct DayType {
    #[serde(rename = "type")]
    kind: i32,
    #[serde(default)]
    name: String,
}

#[derive(Deserialize, Debug)]
struct HolidayInfoResponse {
    code: i32,
    #[serde(rename = "type")]
    day: Option<DayType>,
}

pub(crate) fn parse_holiday_info(body: &str) -> FetchResult<bool> {
    let res: HolidayInfoResponse = serde_json::from_str(body)?;
    if res.code != 0 {
        return Err(FetchError::parse(format!("Holiday API answered code {}", res.code)));
    }

    let day = res
        .day
        .ok_or_else(|| FetchError::parse("Holiday API answered without a day type"))?;

    match day.kind {
        0 | 3 => Ok(false),
        1 | 2 => Ok(true),
        other => Err(FetchError::parse(format!(
            "Unknown day type {} ({})",
            other, day.name
        ))),
    }
}

/// 提莫的神秘小站
pub struct Timor {
    client: Arc<dyn HttpClient>,
    host: String,
}

impl Timor {
    pub fn new(client: Arc<dyn HttpClient>, app: &App) -> Self {
        Timor {
            client,
            host: app.provider.holiday_host.clone(),
        }
    }
}

#[async_trait]
impl HolidayCalendar for Timor {
    async fn is_holiday(&self, date: NaiveDate) -> FetchResult<bool> {
        let url = format!(
            "https://{}/api/holiday/info/{}",
            self.host,
            date.format("%Y-%m-%d")
        );
        let body = self.client.get_text(&url, &[]).await?;
        parse_holiday_info(&body)
    }
}
