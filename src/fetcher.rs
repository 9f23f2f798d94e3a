//! Quote and suggestion access for the coordinator.
//!
//! [`QuoteFetcher`] owns one quote provider and one suggestion source per
//! category. It guarantees that every requested code gets exactly one result
//! and that a quote is only ever attached to the code it was fetched for.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use hashbrown::HashMap;

use crate::{
    cache::{SuggestionCache, Suggestions},
    config::App,
    crawler::{
        eastmoney::EastMoney, sina::Sina, QuoteProvider, QuoteResults, SuggestionSource,
    },
    declare::Category,
    error::{FetchError, FetchResult},
    logging,
    util::http::HttpClient,
};

/// 一組同分類的來源
struct Sources {
    quotes: Arc<dyn QuoteProvider>,
    suggestions: Arc<dyn SuggestionSource>,
}

/// A pending search. Issuing a new search makes every older token stale.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SearchToken(u64);

pub struct QuoteFetcher {
    fund: Sources,
    stock: Sources,
    suggestions: SuggestionCache,
    search_generation: AtomicU64,
}

impl QuoteFetcher {
    pub fn new(
        fund_quotes: Arc<dyn QuoteProvider>,
        fund_suggestions: Arc<dyn SuggestionSource>,
        stock_quotes: Arc<dyn QuoteProvider>,
        stock_suggestions: Arc<dyn SuggestionSource>,
        suggestions: SuggestionCache,
    ) -> Self {
        QuoteFetcher {
            fund: Sources {
                quotes: fund_quotes,
                suggestions: fund_suggestions,
            },
            stock: Sources {
                quotes: stock_quotes,
                suggestions: stock_suggestions,
            },
            suggestions,
            search_generation: AtomicU64::new(0),
        }
    }

    /// 天天基金 + 新浪
    pub fn with_default_providers(client: Arc<dyn HttpClient>, app: &App) -> Self {
        let eastmoney = Arc::new(EastMoney::new(Arc::clone(&client), app));
        let sina = Arc::new(Sina::new(client, app));

        Self::new(
            eastmoney.clone(),
            eastmoney,
            sina.clone(),
            sina,
            SuggestionCache::default(),
        )
    }

    fn sources(&self, category: Category) -> &Sources {
        match category {
            Category::Fund => &self.fund,
            Category::Stock => &self.stock,
        }
    }

    /// Fetches the latest quote of every code. Duplicates are requested once;
    /// the result holds one entry per distinct code.
    pub async fn fetch_quotes(&self, codes: &[String], category: Category) -> QuoteResults {
        let mut distinct: Vec<String> = Vec::with_capacity(codes.len());
        for code in codes {
            let code = code.trim();
            if !code.is_empty() && !distinct.iter().any(|c| c == code) {
                distinct.push(code.to_string());
            }
        }

        if distinct.is_empty() {
            return QuoteResults::new();
        }

        let mut raw = self.sources(category).quotes.fetch_quotes(&distinct).await;
        let mut results: QuoteResults = HashMap::with_capacity(distinct.len());

        for code in distinct {
            let result = match raw.remove(&code) {
                Some(Ok(quote)) if quote.code != code => Err(FetchError::parse(format!(
                    "Asked for {} but the provider answered {}",
                    code, quote.code
                ))),
                Some(Ok(quote)) if quote.category != category => Err(FetchError::parse(format!(
                    "{} came back as a {} quote",
                    code, quote.category
                ))),
                Some(result) => result,
                None => Err(FetchError::parse(format!("{} is missing from the response", code))),
            };
            results.insert(code, result);
        }

        let failed = results.values().filter(|r| r.is_err()).count();
        if failed > 0 {
            logging::warn_file_async(format!(
                "{} of {} {} quotes failed",
                failed,
                results.len(),
                category
            ));
        }

        results
    }

    /// Starts a new search and invalidates every earlier one.
    pub fn begin_search(&self) -> SearchToken {
        SearchToken(self.search_generation.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, token: SearchToken) -> bool {
        self.search_generation.load(Ordering::SeqCst) == token.0
    }

    /// Looks up codes matching `query`.
    ///
    /// Returns `Ok(None)` when a newer search was issued while this one was
    /// waiting on the provider; the caller drops it. The result is still
    /// cached so the newer search may reuse it.
    pub async fn search_suggestions(
        &self,
        query: &str,
        category: Category,
    ) -> FetchResult<Option<Suggestions>> {
        let token = self.begin_search();
        let query = query.trim();
        if query.is_empty() {
            return Ok(Some(Arc::new(Vec::new())));
        }

        if let Some(hit) = self.suggestions.get(category, query) {
            return Ok(Some(hit));
        }

        let entries = Arc::new(self.sources(category).suggestions.search(query).await?);
        self.suggestions.insert(category, query, Arc::clone(&entries));

        if !self.is_current(token) {
            logging::debug_file_async(format!("Drop superseded search '{}'", query));
            return Ok(None);
        }

        Ok(Some(entries))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rust_decimal_macros::dec;

    use super::*;
    use crate::test_support::{quote, StaticProvider, StaticSuggestions};

    struct Fixture {
        fetcher: Arc<QuoteFetcher>,
        funds: Arc<StaticProvider>,
        stocks: Arc<StaticProvider>,
        stock_search: Arc<StaticSuggestions>,
    }

    fn fixture() -> Fixture {
        let funds = Arc::new(StaticProvider::new(Category::Fund));
        let stocks = Arc::new(StaticProvider::new(Category::Stock));
        let fund_search = Arc::new(StaticSuggestions::new(Category::Fund, &["161725"]));
        let stock_search = Arc::new(StaticSuggestions::new(
            Category::Stock,
            &["sh600519", "sh600520"],
        ));

        let fetcher = Arc::new(QuoteFetcher::new(
            funds.clone(),
            fund_search,
            stocks.clone(),
            stock_search.clone(),
            SuggestionCache::default(),
        ));

        Fixture {
            fetcher,
            funds,
            stocks,
            stock_search,
        }
    }

    fn codes(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_fetch_quotes_dedupes_and_covers_every_code() {
        let f = fixture();
        f.stocks.set("sh000001", dec!(1.5));

        let results = f
            .fetcher
            .fetch_quotes(&codes(&["sh000001", "sz000002", "sh000001", " "]), Category::Stock)
            .await;

        assert_eq!(results.len(), 2);
        assert!(results["sh000001"].is_ok());
        assert!(results["sz000002"].is_err());
        assert_eq!(f.stocks.requested(), vec![codes(&["sh000001", "sz000002"])]);
        assert_eq!(f.funds.calls(), 0);
    }

    #[tokio::test]
    async fn test_fetch_quotes_rejects_mismatched_code() {
        let f = fixture();
        f.stocks
            .set_raw("sh000001", Ok(quote("sz399001", Category::Stock, dec!(0.3))));
        f.funds
            .set_raw("161725", Ok(quote("161725", Category::Stock, dec!(0.3))));

        let stocks = f.fetcher.fetch_quotes(&codes(&["sh000001"]), Category::Stock).await;
        assert!(matches!(stocks["sh000001"], Err(FetchError::Parse(_))));

        let funds = f.fetcher.fetch_quotes(&codes(&["161725"]), Category::Fund).await;
        assert!(matches!(funds["161725"], Err(FetchError::Parse(_))));
    }

    #[tokio::test]
    async fn test_empty_codes_make_no_request() {
        let f = fixture();
        assert!(f.fetcher.fetch_quotes(&[], Category::Fund).await.is_empty());
        assert_eq!(f.funds.calls(), 0);
    }

    #[tokio::test]
    async fn test_search_is_cached() {
        let f = fixture();

        let first = f.fetcher.search_suggestions("sh6005", Category::Stock).await.unwrap();
        let second = f.fetcher.search_suggestions(" sh6005 ", Category::Stock).await.unwrap();

        assert_eq!(first.unwrap().len(), 2);
        assert_eq!(second.unwrap().len(), 2);
        assert_eq!(f.stock_search.calls(), 1);

        let blank = f.fetcher.search_suggestions("", Category::Stock).await.unwrap();
        assert!(blank.unwrap().is_empty());
        assert_eq!(f.stock_search.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_search_is_discarded() {
        let f = fixture();
        f.stock_search.set_delay(Some(Duration::from_millis(500)));

        let slow = {
            let fetcher = Arc::clone(&f.fetcher);
            tokio::spawn(async move { fetcher.search_suggestions("sh600519", Category::Stock).await })
        };
        // 讓第一個搜尋先送出
        tokio::time::sleep(Duration::from_millis(10)).await;

        f.stock_search.set_delay(None);
        let fresh = f
            .fetcher
            .search_suggestions("sh600520", Category::Stock)
            .await
            .unwrap();

        assert_eq!(fresh.unwrap()[0].code, "sh600520");
        assert!(slow.await.unwrap().unwrap().is_none());
    }

    #[test]
    fn test_tokens() {
        let f = fixture();
        let first = f.fetcher.begin_search();
        assert!(f.fetcher.is_current(first));
        let second = f.fetcher.begin_search();
        assert!(!f.fetcher.is_current(first));
        assert!(f.fetcher.is_current(second));
    }
}
