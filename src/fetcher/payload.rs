//! Strict decoding of marketplace lookup responses.
//!
//! Bodies are deserialized into typed structs; a missing or mistyped required
//! field is `Malformed`, which the client retries like a network failure.

use serde::Deserialize;

use crate::types::{PriceQuote, Source};

#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Price(PriceQuote),
    Unlisted,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    /// Well-formed reply in which the marketplace reports an error (throttle,
    /// auth, maintenance).
    #[error("marketplace rejected request: {0}")]
    Rejected(String),

    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// How a Steam currency renders amounts: which character separates the
/// fraction and which groups thousands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoneyFormat {
    /// `$1,234.56`
    DecimalPoint,
    /// `1.234,56€`
    DecimalComma,
}

impl MoneyFormat {
    /// Format for a Steam `currency` code, or `None` for codes we do not parse.
    pub fn for_currency(code: u32) -> Option<Self> {
        match code {
            // USD, GBP
            1 | 2 => Some(MoneyFormat::DecimalPoint),
            // EUR, RUB, BRL
            3 | 5 | 7 => Some(MoneyFormat::DecimalComma),
            _ => None,
        }
    }

    fn separators(self) -> (char, char) {
        match self {
            MoneyFormat::DecimalPoint => ('.', ','),
            MoneyFormat::DecimalComma => (',', '.'),
        }
    }
}

// ---------------------------------------------------------------------------
// buff goods search
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct BuffResponse {
    code: String,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Option<BuffData>,
}

#[derive(Debug, Deserialize)]
struct BuffData {
    items: Vec<BuffGoods>,
}

#[derive(Debug, Deserialize)]
struct BuffGoods {
    market_hash_name: String,
    sell_min_price: String,
    #[serde(default)]
    sell_num: Option<i64>,
}

// ---------------------------------------------------------------------------
// steam priceoverview
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SteamOverview {
    success: bool,
    #[serde(default)]
    lowest_price: Option<String>,
    #[serde(default)]
    volume: Option<String>,
}

pub fn decode(
    source: Source,
    market_name: &str,
    body: &str,
    money: MoneyFormat,
) -> Result<Decoded, DecodeError> {
    match source {
        Source::Buff => decode_buff(market_name, body),
        Source::Steam => decode_steam(body, money),
    }
}

fn decode_buff(market_name: &str, body: &str) -> Result<Decoded, DecodeError> {
    let resp: BuffResponse =
        serde_json::from_str(body).map_err(|e| DecodeError::Malformed(e.to_string()))?;

    if resp.code != "OK" {
        let msg = resp.msg.unwrap_or_default();
        return Err(DecodeError::Rejected(format!("code={} msg={msg}", resp.code)));
    }

    let data = resp
        .data
        .ok_or_else(|| DecodeError::Malformed("missing `data`".to_string()))?;

    // Search is fuzzy; only an exact name match prices this item.
    let Some(goods) = data.items.into_iter().find(|g| g.market_hash_name == market_name) else {
        return Ok(Decoded::Unlisted);
    };

    let price = goods
        .sell_min_price
        .trim()
        .parse::<f64>()
        .map_err(|_| DecodeError::Malformed(format!("sell_min_price {:?}", goods.sell_min_price)))?;

    Ok(Decoded::Price(PriceQuote { price, volume: goods.sell_num }))
}

fn decode_steam(body: &str, money: MoneyFormat) -> Result<Decoded, DecodeError> {
    let resp: SteamOverview =
        serde_json::from_str(body).map_err(|e| DecodeError::Malformed(e.to_string()))?;

    if !resp.success {
        return Ok(Decoded::Unlisted);
    }
    let Some(lowest) = resp.lowest_price else {
        return Ok(Decoded::Unlisted);
    };

    let price = parse_money(&lowest, money)
        .ok_or_else(|| DecodeError::Malformed(format!("lowest_price {lowest:?}")))?;

    let volume = match resp.volume {
        Some(v) => Some(
            parse_count(&v).ok_or_else(|| DecodeError::Malformed(format!("volume {v:?}")))?,
        ),
        None => None,
    };

    Ok(Decoded::Price(PriceQuote { price, volume }))
}

/// `"$1,234.56"` → `1234.56` under [`MoneyFormat::DecimalPoint`]. Symbols and
/// spaces are dropped; separators must sit where `money` puts them, so an
/// amount rendered in another convention is rejected rather than rescaled.
fn parse_money(s: &str, money: MoneyFormat) -> Option<f64> {
    let (decimal, group) = money.separators();
    // Currency text may itself carry a dot (`pуб.`), so only the digit span counts.
    let kept: String = s
        .trim_matches(|c: char| !c.is_ascii_digit())
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();

    let (int_part, frac) = kept.split_once(decimal).unwrap_or((kept.as_str(), ""));
    if !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let mut groups = int_part.split(group);
    let lead = groups.next()?;
    if lead.is_empty() || !lead.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let mut digits = lead.to_string();
    let mut grouped = false;
    for g in groups {
        if g.len() != 3 || !g.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        digits.push_str(g);
        grouped = true;
    }
    if grouped && lead.len() > 3 {
        return None;
    }

    if frac.is_empty() {
        digits.parse().ok()
    } else {
        format!("{digits}.{frac}").parse().ok()
    }
}

/// `"1,234"` → `1234`.
fn parse_count(s: &str) -> Option<i64> {
    let cleaned: String = s.chars().filter(|c| c.is_ascii_digit()).collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const REDLINE: &str = "AK-47 | Redline (Field-Tested)";
    const USD: MoneyFormat = MoneyFormat::DecimalPoint;
    const EUR: MoneyFormat = MoneyFormat::DecimalComma;

    #[test]
    fn buff_exact_match_is_priced() {
        let body = r#"{"code":"OK","data":{"items":[
            {"market_hash_name":"StatTrak™ AK-47 | Redline (Field-Tested)","sell_min_price":"40.5","sell_num":3},
            {"market_hash_name":"AK-47 | Redline (Field-Tested)","sell_min_price":"11.00","sell_num":812}
        ]}}"#;
        let d = decode(Source::Buff, REDLINE, body, USD).unwrap();
        assert_eq!(d, Decoded::Price(PriceQuote { price: 11.0, volume: Some(812) }));
    }

    #[test]
    fn buff_without_match_is_unlisted() {
        let body = r#"{"code":"OK","data":{"items":[]}}"#;
        assert_eq!(decode(Source::Buff, REDLINE, body, USD).unwrap(), Decoded::Unlisted);
    }

    #[test]
    fn buff_error_code_is_rejected() {
        let body = r#"{"code":"Login Required","msg":"Please login"}"#;
        assert!(matches!(decode(Source::Buff, REDLINE, body, USD), Err(DecodeError::Rejected(_))));
    }

    #[test]
    fn buff_missing_or_mistyped_fields_are_malformed() {
        let missing_data = r#"{"code":"OK"}"#;
        let numeric_price = r#"{"code":"OK","data":{"items":[{"market_hash_name":"x","sell_min_price":11.0}]}}"#;
        let garbage_price = r#"{"code":"OK","data":{"items":[{"market_hash_name":"AK-47 | Redline (Field-Tested)","sell_min_price":"n/a"}]}}"#;
        for body in [missing_data, numeric_price, garbage_price, "<html>", ""] {
            assert!(
                matches!(decode(Source::Buff, REDLINE, body, USD), Err(DecodeError::Malformed(_))),
                "{body}"
            );
        }
    }

    #[test]
    fn steam_price_and_volume_are_cleaned() {
        let body = r#"{"success":true,"lowest_price":"$1,234.56","volume":"1,024","median_price":"$1,200.00"}"#;
        let d = decode(Source::Steam, REDLINE, body, USD).unwrap();
        assert_eq!(d, Decoded::Price(PriceQuote { price: 1234.56, volume: Some(1024) }));
    }

    #[test]
    fn steam_unlisted_variants() {
        assert_eq!(decode(Source::Steam, REDLINE, r#"{"success":false}"#, USD).unwrap(), Decoded::Unlisted);
        assert_eq!(
            decode(Source::Steam, REDLINE, r#"{"success":true,"volume":"3"}"#, USD).unwrap(),
            Decoded::Unlisted
        );
    }

    #[test]
    fn steam_bad_fields_are_malformed() {
        let bad_price = r#"{"success":true,"lowest_price":"--"}"#;
        let bad_volume = r#"{"success":true,"lowest_price":"$1.00","volume":"lots"}"#;
        let no_success = r#"{"lowest_price":"$1.00"}"#;
        for body in [bad_price, bad_volume, no_success] {
            assert!(
                matches!(decode(Source::Steam, REDLINE, body, USD), Err(DecodeError::Malformed(_))),
                "{body}"
            );
        }
    }

    fn steam_price(lowest: &str, money: MoneyFormat) -> Result<Decoded, DecodeError> {
        let body = serde_json::json!({"success": true, "lowest_price": lowest}).to_string();
        decode(Source::Steam, REDLINE, &body, money)
    }

    #[test]
    fn steam_decimal_comma_currencies_are_parsed_by_their_convention() {
        let cases = [
            ("12,34€", 12.34),
            ("1.234,56€", 1234.56),
            ("12,--€", 12.0),
            ("1 234,56 pуб.", 1234.56),
        ];
        for (lowest, expected) in cases {
            assert_eq!(
                steam_price(lowest, EUR).unwrap(),
                Decoded::Price(PriceQuote { price: expected, volume: None }),
                "{lowest}"
            );
        }
    }

    #[test]
    fn steam_amount_in_the_wrong_convention_is_malformed() {
        for lowest in ["12,34€", "1.234,56€", "$1,23.4"] {
            assert!(matches!(steam_price(lowest, USD), Err(DecodeError::Malformed(_))), "{lowest}");
        }
        for lowest in ["$1,234.56", "1,234,56"] {
            assert!(matches!(steam_price(lowest, EUR), Err(DecodeError::Malformed(_))), "{lowest}");
        }
    }

    #[test]
    fn only_known_currencies_have_a_money_format() {
        assert_eq!(MoneyFormat::for_currency(1), Some(MoneyFormat::DecimalPoint));
        assert_eq!(MoneyFormat::for_currency(3), Some(MoneyFormat::DecimalComma));
        assert_eq!(MoneyFormat::for_currency(23), None);
    }
}
