use std::{collections::HashSet, str::FromStr};

use anyhow::{anyhow, Result};
use rust_decimal::Decimal;

const NUMBER_ESCAPE_CHAR: &[char] = &['元', '%', ',', ' ', '"', '\n', '+'];

/// Decodes a GBK (GB18030 superset) body into UTF-8.
///
/// Sina serves its quote and suggest scripts as GBK; invalid sequences are
/// replaced rather than rejected so one bad name cannot sink a whole batch.
pub fn gbk_2_utf8(data: &[u8]) -> String {
    let (text, _, _) = encoding_rs::GB18030.decode(data);
    text.into_owned()
}

/// Parses a decimal value, dropping thousands separators, percent signs and
/// the other characters in `NUMBER_ESCAPE_CHAR` plus `escape_chars`.
///
/// ```
/// use quote_sync::util::text::parse_decimal;
/// let d = parse_decimal("1,234.56%", None).unwrap();
/// assert_eq!(d.to_string(), "1234.56");
/// ```
pub fn parse_decimal(s: &str, escape_chars: Option<Vec<char>>) -> Result<Decimal> {
    let cleaned = clean_escape_chars(s, escape_chars);
    Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .map_err(|why| anyhow!("Failed to parse '{}' as Decimal because {:?}", cleaned, why))
}

pub(crate) fn clean_escape_chars(s: &str, escape_chars: Option<Vec<char>>) -> String {
    let mut combined: Vec<char> = NUMBER_ESCAPE_CHAR.to_vec();
    if let Some(ec) = escape_chars {
        combined.extend(ec);
    }

    let filters = combined.iter().collect::<HashSet<_>>();
    s.chars().filter(|c| !filters.contains(c)).collect()
}

/// 取出 JSONP 括號內的內容，例如 `jsonpgz({...});` => `{...}`
pub fn jsonp_body(text: &str) -> Option<&str> {
    let start = text.find('(')?;
    let end = text.rfind(')')?;
    if end <= start {
        return None;
    }

    Some(text[start + 1..end].trim())
}

/// 取出第一對雙引號內的內容，例如 `var a="x,y";` => `x,y`
pub fn quoted_body(text: &str) -> Option<&str> {
    let start = text.find('"')?;
    let end = text.rfind('"')?;
    if end <= start {
        return None;
    }

    Some(&text[start + 1..end])
}
