use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use once_cell::sync::{Lazy, OnceCell};
use reqwest::{header::HeaderMap, header::HeaderName, header::HeaderValue, Client, StatusCode};
use tokio::sync::Semaphore;

use crate::{
    config::{self, App},
    error::{FetchError, FetchResult},
    logging::Logger,
    util,
};

pub mod user_agent;

/// The shared reqwest backed client.
static CLIENT: OnceCell<Arc<ReqwestClient>> = OnceCell::new();

static LOGGER: Lazy<Logger> = Lazy::new(|| Logger::new("http"));

/// 傳輸失敗時的最大嘗試次數
const MAX_RETRIES: usize = 2;

/// The network capability the engine consumes.
///
/// Only GET is needed. Implementors report transport problems as
/// [`FetchError::Network`] and throttling as [`FetchError::RateLimited`].
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get_bytes(&self, url: &str, headers: &[(&str, &str)]) -> FetchResult<Vec<u8>>;

    async fn get_text(&self, url: &str, headers: &[(&str, &str)]) -> FetchResult<String> {
        let bytes = self.get_bytes(url, headers).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// GBK 編碼的回應轉成 UTF-8
    async fn get_text_gbk(&self, url: &str, headers: &[(&str, &str)]) -> FetchResult<String> {
        let bytes = self.get_bytes(url, headers).await?;
        Ok(util::text::gbk_2_utf8(&bytes))
    }
}

pub struct ReqwestClient {
    client: Client,
    semaphore: Semaphore,
}

impl ReqwestClient {
    pub fn new(app: &App) -> Result<Self> {
        // reqwest 使用 rustls-no-provider，需要先裝好加密實作
        let _ = rustls::crypto::ring::default_provider().install_default();

        let client = Client::builder()
            .brotli(true)
            .gzip(true)
            .zstd(true)
            .connect_timeout(Duration::from_secs(app.http.connect_timeout_secs))
            .timeout(Duration::from_secs(app.http.timeout_secs))
            .tcp_nodelay(true)
            .tcp_keepalive(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .pool_idle_timeout(Duration::from_secs(90))
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            .referer(true)
            .user_agent(user_agent::gen_random_ua())
            .build()
            .map_err(|e| anyhow!("Failed to create reqwest client: {:?}", e))?;

        Ok(ReqwestClient {
            client,
            semaphore: Semaphore::new(app.http.max_concurrent.max(1)),
        })
    }

    /// Returns the process wide client, building it from [`config::SETTINGS`]
    /// on first use.
    pub fn shared() -> Result<Arc<ReqwestClient>> {
        CLIENT
            .get_or_try_init(|| ReqwestClient::new(&config::SETTINGS).map(Arc::new))
            .cloned()
    }

    fn header_map(headers: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::with_capacity(headers.len() + 1);
        // 每個請求換一個 UA，避免被單純的特徵比對擋下
        if let Ok(ua) = HeaderValue::from_str(&user_agent::gen_random_ua()) {
            map.insert(reqwest::header::USER_AGENT, ua);
        }

        for (name, value) in headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    map.insert(name, value);
                }
                _ => LOGGER.warn(format!("Skip invalid header {}: {}", name, value)),
            }
        }

        map
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get_bytes(&self, url: &str, headers: &[(&str, &str)]) -> FetchResult<Vec<u8>> {
        let headers = Self::header_map(headers);
        let mut last_error = String::new();

        for attempt in 1..=MAX_RETRIES {
            let permit = self.semaphore.acquire().await;
            let start = Instant::now();
            let res = self.client.get(url).headers(headers.clone()).send().await;
            let elapsed = start.elapsed().as_millis();
            drop(permit);

            match res {
                Ok(response) => {
                    let status = response.status();
                    LOGGER.info(format!("GET:{} {} {} ms", url, status, elapsed));

                    if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::FORBIDDEN
                    {
                        // 被限流時不重試，等下一次排程
                        return Err(FetchError::RateLimited(format!("{} answered {}", url, status)));
                    }

                    if !status.is_success() {
                        return Err(FetchError::Network(format!("{} answered {}", url, status)));
                    }

                    return response
                        .bytes()
                        .await
                        .map(|b| b.to_vec())
                        .map_err(FetchError::from);
                }
                Err(why) => {
                    last_error = format!("{:?}", why);
                    LOGGER.error(format!(
                        "Attempt {} to GET:{} failed because {:?}. {} ms",
                        attempt, url, why, elapsed
                    ));
                    if attempt < MAX_RETRIES && !why.is_timeout() {
                        tokio::time::sleep(Duration::from_millis(200 * attempt as u64)).await;
                        continue;
                    }
                    break;
                }
            }
        }

        Err(FetchError::Network(format!(
            "Failed to GET {} after {} attempts; last error: {}",
            url, MAX_RETRIES, last_error
        )))
    }
}
