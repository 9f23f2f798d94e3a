//! # 新浪財經採集模組
//!
//! - **行情 (`quote`)**：`hq.sinajs.cn/list=...`，一次可查多檔，GBK 編碼。
//! - **代碼搜尋 (`suggest`)**：`suggest3.sinajs.cn`，A 股、港股、美股。
//!
//! Both endpoints refuse requests without a finance.sina.com.cn referer.

use std::sync::Arc;

use chrono::FixedOffset;

use crate::{config::App, util::datetime, util::http::HttpClient};

pub mod quote;
pub mod suggest;

/// 新浪會檢查來源頁
pub const REFERER: &str = "https://finance.sina.com.cn";
/// 單一請求最多帶幾個代碼
pub const MAX_CODES_PER_REQUEST: usize = 60;

/// 新浪財經採集器
pub struct Sina {
    client: Arc<dyn HttpClient>,
    host: String,
    suggest_host: String,
    offset: FixedOffset,
}

impl Sina {
    pub fn new(client: Arc<dyn HttpClient>, app: &App) -> Self {
        Sina {
            client,
            host: app.provider.stock_host.clone(),
            suggest_host: app.provider.suggest_host.clone(),
            offset: datetime::exchange_offset(app.market.utc_offset_hours),
        }
    }

    fn headers() -> [(&'static str, &'static str); 1] {
        [("Referer", REFERER)]
    }
}
