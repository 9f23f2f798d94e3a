use async_trait::async_trait;

use crate::{
    crawler::{sina::Sina, SuggestionSource},
    declare::{Category, SuggestionEntry},
    error::FetchResult,
    util::text,
};

/// 0 關鍵字 1 類型 2 代碼 3 完整代碼 4 名稱
fn to_entry(item: &str) -> Option<SuggestionEntry> {
    let fields: Vec<&str> = item.split(',').collect();
    if fields.len() < 5 {
        return None;
    }

    let code = fields[2].trim();
    let name = fields[4].trim();
    if code.is_empty() {
        return None;
    }

    let (code, kind) = match fields[1] {
        "11" => (fields[3].trim().to_ascii_lowercase(), "A股"),
        "12" => (fields[3].trim().to_ascii_lowercase(), "B股"),
        "31" => (format!("hk{}", code), "港股"),
        "33" => (format!("hk{}", code.to_ascii_uppercase()), "港股指數"),
        "41" => (format!("gb_{}", code.to_ascii_lowercase()), "美股"),
        _ => return None,
    };

    if code.is_empty() {
        return None;
    }

    Some(SuggestionEntry::new(code, name, Category::Stock, kind))
}

/// `var suggestdata="a;b;c";` 只保留行情來源能查的類型
pub(crate) fn parse_suggestions(body: &str) -> Vec<SuggestionEntry> {
    let mut entries: Vec<SuggestionEntry> = Vec::new();
    for entry in text::quoted_body(body)
        .unwrap_or_default()
        .split(';')
        .filter_map(to_entry)
    {
        if !entries.iter().any(|e| e.code == entry.code) {
            entries.push(entry);
        }
    }

    entries
}

#[async_trait]
impl SuggestionSource for Sina {
    fn category(&self) -> Category {
        Category::Stock
    }

    async fn search(&self, query: &str) -> FetchResult<Vec<SuggestionEntry>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!(
            "https://{}/suggest/type=&key={}&name=suggestdata",
            self.suggest_host,
            urlencoding::encode(query)
        );
        let body = self.client.get_text_gbk(&url, &Self::headers()).await?;

        Ok(parse_suggestions(&body))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{config::App, error::FetchError, test_support::ScriptedHttp};

    const BODY: &str = r#"var suggestdata="maotai,11,600519,sh600519,贵州茅台,,贵州茅台,99,1,ESG,,;tengxun,31,00700,00700,腾讯控股,,腾讯控股,99,1,,,;aapl,41,aapl,aapl,苹果公司,,苹果公司,99,1,,,;hsi,33,hsi,hsi,恒生指数,,恒生指数,99,1,,,;bjfund,21,161725,of161725,招商白酒,,招商白酒,99,1,,,;maotai,11,600519,sh600519,贵州茅台,,贵州茅台,99,1,ESG,,";"#;

    #[test]
    fn test_parse_suggestions() {
        let entries = parse_suggestions(BODY);
        let codes: Vec<&str> = entries.iter().map(|e| e.code.as_str()).collect();

        assert_eq!(codes, vec!["sh600519", "hk00700", "gb_aapl", "hkHSI"]);
        assert_eq!(entries[0].display_label, "sh600519 | 贵州茅台");
        assert_eq!(entries[1].kind, "港股");
        assert!(entries.iter().all(|e| e.category == Category::Stock));
    }

    #[test]
    fn test_parse_empty_suggestions() {
        assert!(parse_suggestions(r#"var suggestdata="";"#).is_empty());
        assert!(parse_suggestions("").is_empty());
    }

    #[tokio::test]
    async fn test_search_encodes_query() {
        let http = Arc::new(ScriptedHttp::new().respond("suggestdata", BODY));
        let provider = Sina::new(http.clone(), &App::default());

        let entries = provider.search("贵州 茅台").await.unwrap();
        assert_eq!(entries.len(), 4);
        assert!(http.urls()[0].contains("key=%E8%B4%B5%E5%B7%9E%20%E8%8C%85%E5%8F%B0"));

        assert!(provider.search("   ").await.unwrap().is_empty());
        assert_eq!(http.calls(), 1);
    }

    #[tokio::test]
    async fn test_search_failure_propagates() {
        let http = Arc::new(ScriptedHttp::new().fail("suggestdata", FetchError::network("down")));
        let provider = Sina::new(http, &App::default());
        assert!(provider.search("maotai").await.is_err());
    }
}
