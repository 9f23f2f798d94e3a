use std::{env, fs, io, path::PathBuf, str::FromStr};

use anyhow::Result;
use config::{Config as config_config, File as config_file};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::logging;

pub mod store;
pub mod watch_list;

const CONFIG_PATH: &str = "app.json";

/// Process level settings. The user's watch lists live in a separate file
/// behind a [`store::ConfigStore`], see [`System::watch_list_file`].
#[derive(Serialize, Deserialize, Default, Debug, Clone)]
pub struct App {
    #[serde(default)]
    pub system: System,
    #[serde(default)]
    pub http: Http,
    #[serde(default)]
    pub provider: Provider,
    #[serde(default)]
    pub market: Market,
}

const SYSTEM_WATCH_LIST_FILE: &str = "QUOTE_SYNC_WATCH_LIST_FILE";

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct System {
    #[serde(default = "default_watch_list_file")]
    pub watch_list_file: String,
}

impl Default for System {
    fn default() -> Self {
        System {
            watch_list_file: default_watch_list_file(),
        }
    }
}

fn default_watch_list_file() -> String {
    "watch_list.json".to_string()
}

const HTTP_CONNECT_TIMEOUT_SECS: &str = "QUOTE_SYNC_HTTP_CONNECT_TIMEOUT_SECS";
const HTTP_TIMEOUT_SECS: &str = "QUOTE_SYNC_HTTP_TIMEOUT_SECS";
const HTTP_MAX_CONCURRENT: &str = "QUOTE_SYNC_HTTP_MAX_CONCURRENT";

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Http {
    #[serde(default)]
    pub connect_timeout_secs: u64,
    #[serde(default)]
    pub timeout_secs: u64,
    /// 同時送出的請求上限
    #[serde(default)]
    pub max_concurrent: usize,
}

impl Default for Http {
    fn default() -> Self {
        Http {
            connect_timeout_secs: 5,
            timeout_secs: 8,
            max_concurrent: 8,
        }
    }
}

const PROVIDER_FUND_HOST: &str = "QUOTE_SYNC_FUND_HOST";
const PROVIDER_STOCK_HOST: &str = "QUOTE_SYNC_STOCK_HOST";
const PROVIDER_HOLIDAY_HOST: &str = "QUOTE_SYNC_HOLIDAY_HOST";

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Provider {
    /// 天天基金 估值
    pub fund_host: String,
    /// 天天基金 基金清單
    pub fund_list_host: String,
    /// 新浪 行情
    pub stock_host: String,
    /// 新浪 代碼搜尋
    pub suggest_host: String,
    /// 節假日查詢
    pub holiday_host: String,
}

impl Default for Provider {
    fn default() -> Self {
        Provider {
            fund_host: "fundgz.1234567.com.cn".to_string(),
            fund_list_host: "fund.eastmoney.com".to_string(),
            stock_host: "hq.sinajs.cn".to_string(),
            suggest_host: "suggest3.sinajs.cn".to_string(),
            holiday_host: "timor.tech".to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub name: String,
    /// HH:MM, inclusive
    pub start: String,
    /// HH:MM, exclusive
    pub end: String,
}

impl Session {
    pub fn new(name: &str, start: &str, end: &str) -> Self {
        Session {
            name: name.to_string(),
            start: start.to_string(),
            end: end.to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Market {
    /// 交易所時區，以小時為單位的 UTC 偏移
    #[serde(default)]
    pub utc_offset_hours: i32,
    #[serde(default)]
    pub sessions: Vec<Session>,
}

impl Default for Market {
    fn default() -> Self {
        Market {
            utc_offset_hours: 8,
            sessions: vec![
                Session::new("morning", "09:30", "11:30"),
                Session::new("afternoon", "13:00", "15:00"),
            ],
        }
    }
}

pub static SETTINGS: Lazy<App> = Lazy::new(|| {
    App::get().unwrap_or_else(|why| {
        logging::error_file_async(format!(
            "I can't read the config context because {:?}",
            why
        ));
        App::default().override_with_env()
    })
});

impl App {
    fn get() -> Result<Self> {
        let config_path = config_path();
        if config_path.exists() {
            let config: App = config_config::builder()
                .add_source(config_file::from(config_path))
                .build()?
                .try_deserialize()?;
            return Ok(config.override_with_env());
        }

        Ok(App::default().override_with_env())
    }

    /// 將來至於 env 的設定值覆蓋掉 json 上的設定值
    fn override_with_env(mut self) -> Self {
        if let Ok(file) = env::var(SYSTEM_WATCH_LIST_FILE) {
            self.system.watch_list_file = file;
        }

        if let Ok(secs) = env::var(HTTP_CONNECT_TIMEOUT_SECS) {
            self.http.connect_timeout_secs = u64::from_str(&secs).unwrap_or(5);
        }

        if let Ok(secs) = env::var(HTTP_TIMEOUT_SECS) {
            self.http.timeout_secs = u64::from_str(&secs).unwrap_or(8);
        }

        if let Ok(max) = env::var(HTTP_MAX_CONCURRENT) {
            self.http.max_concurrent = usize::from_str(&max).unwrap_or(8);
        }

        if let Ok(host) = env::var(PROVIDER_FUND_HOST) {
            self.provider.fund_host = host;
        }

        if let Ok(host) = env::var(PROVIDER_STOCK_HOST) {
            self.provider.stock_host = host;
        }

        if let Ok(host) = env::var(PROVIDER_HOLIDAY_HOST) {
            self.provider.holiday_host = host;
        }

        // 設定檔內若留空，回到預設值
        let defaults = Http::default();
        if self.http.connect_timeout_secs == 0 {
            self.http.connect_timeout_secs = defaults.connect_timeout_secs;
        }
        if self.http.timeout_secs == 0 {
            self.http.timeout_secs = defaults.timeout_secs;
        }
        if self.http.max_concurrent == 0 {
            self.http.max_concurrent = defaults.max_concurrent;
        }
        if self.market.sessions.is_empty() {
            self.market = Market::default();
        }

        self
    }
}

/// 回傳設定檔的路徑
fn config_path() -> PathBuf {
    PathBuf::from(CONFIG_PATH)
}

/// 回傳指定路徑的文字檔的內容
pub(crate) fn read_text_file(path: PathBuf) -> Result<String, io::Error> {
    fs::read_to_string(path)
}
