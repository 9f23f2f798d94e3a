use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    crawler::{eastmoney::EastMoney, SuggestionSource},
    declare::{Category, SuggestionEntry},
    error::{FetchError, FetchResult},
    logging,
};

/// 搜尋結果最多回傳幾筆
pub const SUGGESTION_LIMIT: usize = 20;

/// One row of `fundcode_search.js`:
/// `["000001","HXCZHH","华夏成长混合","混合型-灵活","HUAXIACHENGZHANGHUNHE"]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundListItem {
    pub code: String,
    /// 拼音縮寫
    pub abbreviation: String,
    pub name: String,
    pub kind: String,
    pub pinyin: String,
}

/// `var r = [[...],[...]];`
pub(crate) fn parse_fund_list(body: &str) -> FetchResult<Vec<FundListItem>> {
    let start = body
        .find('[')
        .ok_or_else(|| FetchError::parse("Fund list has no array"))?;
    let end = body
        .rfind(']')
        .filter(|end| *end > start)
        .ok_or_else(|| FetchError::parse("Fund list array is not closed"))?;

    let rows: Vec<Vec<String>> = serde_json::from_str(&body[start..=end])?;
    let items = rows
        .into_iter()
        .filter(|row| row.len() >= 4)
        .map(|mut row| {
            row.resize(5, String::new());
            let mut fields = row.into_iter();
            let mut next = || fields.next().unwrap_or_default();
            FundListItem {
                code: next(),
                abbreviation: next(),
                name: next(),
                kind: next(),
                pinyin: next(),
            }
        })
        .collect();

    Ok(items)
}

/// 依代碼開頭、名稱或拼音比對
pub(crate) fn search_fund_list(
    items: &[FundListItem],
    query: &str,
    limit: usize,
) -> Vec<SuggestionEntry> {
    let query = query.trim();
    if query.is_empty() {
        return Vec::new();
    }
    let upper = query.to_uppercase();

    items
        .iter()
        .filter(|item| {
            item.code.starts_with(query)
                || item.name.contains(query)
                || item.abbreviation.contains(&upper)
                || item.pinyin.starts_with(&upper)
        })
        .take(limit)
        .map(|item| SuggestionEntry::new(item.code.clone(), &item.name, Category::Fund, &item.kind))
        .collect()
}

impl EastMoney {
    async fn fund_list(&self) -> FetchResult<Arc<Vec<FundListItem>>> {
        self.funds
            .get_or_try_init(|| async {
                let url = format!("https://{}/js/fundcode_search.js", self.list_host);
                let body = self.client.get_text(&url, &[]).await?;
                let items = parse_fund_list(&body)?;
                logging::info_file_async(format!("Loaded {} funds from {}", items.len(), url));
                Ok::<_, FetchError>(Arc::new(items))
            })
            .await
            .cloned()
    }
}

#[async_trait]
impl SuggestionSource for EastMoney {
    fn category(&self) -> Category {
        Category::Fund
    }

    async fn search(&self, query: &str) -> FetchResult<Vec<SuggestionEntry>> {
        let items = self.fund_list().await?;
        Ok(search_fund_list(&items, query, SUGGESTION_LIMIT))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{config::App, test_support::ScriptedHttp};

    const BODY: &str = r#"var r = [["000001","HXCZHH","华夏成长混合","混合型-灵活","HUAXIACHENGZHANGHUNHE"],["161725","ZSZZBJZSLOFA","招商中证白酒指数(LOF)A","指数型-股票","ZHAOSHANGZHONGZHENGBAIJIUZHISHULOFA"],["110011","YFDYXZXHHA","易方达优质精选混合(QDII)","QDII","YIFANGDAYOUZHIJINGXUANHUNHEQDII"],["bad"]];"#;

    #[test]
    fn test_parse_fund_list() {
        let items = parse_fund_list(BODY).unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[1].code, "161725");
        assert_eq!(items[1].kind, "指数型-股票");
        assert!(parse_fund_list("var r = ;").is_err());
    }

    #[test]
    fn test_search_fund_list() {
        let items = parse_fund_list(BODY).unwrap();

        let by_code = search_fund_list(&items, "1617", 10);
        assert_eq!(by_code.len(), 1);
        assert_eq!(by_code[0].display_label, "161725 | 招商中证白酒指数(LOF)A");

        let by_name = search_fund_list(&items, "白酒", 10);
        assert_eq!(by_name[0].code, "161725");

        let by_abbr = search_fund_list(&items, "hxcz", 10);
        assert_eq!(by_abbr[0].code, "000001");

        assert_eq!(search_fund_list(&items, "混合", 1).len(), 1);
        assert!(search_fund_list(&items, "  ", 10).is_empty());
    }

    #[tokio::test]
    async fn test_fund_list_downloaded_once() {
        let http = Arc::new(ScriptedHttp::new().respond("fundcode_search.js", BODY));
        let provider = EastMoney::new(http.clone(), &App::default());

        assert_eq!(provider.search("白酒").await.unwrap().len(), 1);
        assert_eq!(provider.search("混合").await.unwrap().len(), 2);
        assert_eq!(http.calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_download_is_retried_next_time() {
        let http = Arc::new(ScriptedHttp::new().fail("fundcode_search.js", FetchError::network("down")));
        let provider = EastMoney::new(http.clone(), &App::default());

        assert!(provider.search("白酒").await.is_err());
        assert!(provider.search("白酒").await.is_err());
        assert_eq!(http.calls(), 2);
    }
}
