//! # 天天基金採集模組
//!
//! - **盤中估值 (`fund`)**：`fundgz` 的 JSONP 腳本，一檔基金一個請求。
//! - **基金清單 (`fund_list`)**：全部基金代碼與名稱，用於代碼搜尋。

use std::sync::Arc;

use chrono::FixedOffset;
use tokio::sync::OnceCell;

use crate::{config::App, util::datetime, util::http::HttpClient};

pub mod fund;
pub mod fund_list;

/// 天天基金採集器
pub struct EastMoney {
    client: Arc<dyn HttpClient>,
    host: String,
    list_host: String,
    offset: FixedOffset,
    /// 基金清單很大且幾乎不變，成功下載一次後就留著
    funds: OnceCell<Arc<Vec<fund_list::FundListItem>>>,
}

impl EastMoney {
    pub fn new(client: Arc<dyn HttpClient>, app: &App) -> Self {
        EastMoney {
            client,
            host: app.provider.fund_host.clone(),
            list_host: app.provider.fund_list_host.clone(),
            offset: datetime::exchange_offset(app.market.utc_offset_hours),
            funds: OnceCell::new(),
        }
    }
}
