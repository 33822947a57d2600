//! Market symbol extraction from debate transcripts
//!
//! Tickers are short and collide with ordinary capitalized words, so plain
//! pattern matching is unreliable. The extractor combines an allow-list, a
//! deny-list and a small context gate, then adds tickers for known company
//! names. The result is bounded and deduplicated.

use crate::types::{StoredMessage, StoredMessageKind};
use regex::Regex;
use std::sync::LazyLock;

/// Maximum number of symbols returned by [`extract_symbols`]
pub const MAX_SYMBOLS: usize = 10;

/// Characters inspected on each side of a candidate token
const CONTEXT_CHARS: usize = 10;

/// Shortest and longest accepted token
const TOKEN_LEN: std::ops::RangeInclusive<usize> = 2..=5;

/// Tickers accepted wherever they appear
pub const KNOWN_TICKERS: &[&str] = &[
    "AAPL", "MSFT", "GOOGL", "AMZN", "META", "TSLA", "NVDA", "NFLX", "BABA", "JPM", "V", "JNJ",
    "WMT", "PG", "MA", "UNH", "HD", "DIS", "PYPL", "BAC", "XOM", "VZ", "ADBE", "CMCSA", "NKE",
    "CSCO", "PFE", "MRK", "ABT", "TMO",
];

/// Capitalized words that are never tickers
pub const COMMON_WORDS: &[&str] = &[
    "THE", "AND", "FOR", "ARE", "BUT", "NOT", "YOU", "ALL", "CAN", "HER", "WAS", "ONE", "OUR",
    "OUT", "DAY", "GET", "HAS", "HIM", "HIS", "HOW", "ITS", "MAY", "NEW", "NOW", "OLD", "SEE",
    "TWO", "WAY", "WHO", "BOY", "DID", "LET", "PUT", "SAY", "SHE", "TOO", "USE", "AI", "IT",
    "API", "CEO", "CFO", "CTO", "USA", "UK", "EU", "USD", "CNY", "GDP", "CPI", "PMI", "ETF",
    "IPO", "SEC", "FDA",
];

/// Company names mapped to their canonical ticker, scanned in this order
pub const COMPANY_NAMES: &[(&str, &str)] = &[
    ("特斯拉", "TSLA"),
    ("苹果", "AAPL"),
    ("微软", "MSFT"),
    ("英伟达", "NVDA"),
    ("谷歌", "GOOGL"),
    ("亚马逊", "AMZN"),
    ("Meta", "META"),
    ("脸书", "META"),
    ("Netflix", "NFLX"),
    ("奈飞", "NFLX"),
    ("阿里巴巴", "BABA"),
    ("腾讯", "TCEHY"),
    ("比亚迪", "BYDDF"),
    ("蔚来", "NIO"),
    ("理想", "LI"),
    ("小鹏", "XPEV"),
    ("苹果公司", "AAPL"),
    ("微软公司", "MSFT"),
];

/// Local term for "stock price"
const STOCK_PRICE_TERM: &str = "股价";

static UPPERCASE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Z]+").expect("static pattern compiles"));

/// Extract up to [`MAX_SYMBOLS`] distinct tickers in first-seen order.
///
/// ```
/// use opinion_room::symbols::extract_symbols;
///
/// let symbols = extract_symbols("TSLA surged as 特斯拉 reported strong deliveries; THE market reacted.");
/// assert_eq!(symbols, vec!["TSLA".to_string()]);
/// ```
pub fn extract_symbols(text: &str) -> Vec<String> {
    let mut symbols = SymbolSet::default();

    for m in UPPERCASE_RUN.find_iter(text) {
        let token = m.as_str();
        if !TOKEN_LEN.contains(&token.len()) || !at_word_boundary(text, m.start(), m.end()) {
            continue;
        }

        let accepted = if KNOWN_TICKERS.contains(&token) {
            true
        } else if COMMON_WORDS.contains(&token) {
            false
        } else {
            has_market_context(context_window(text, m.start(), m.end()))
        };

        if accepted && !symbols.insert(token) {
            return symbols.into_vec();
        }
    }

    for (name, ticker) in COMPANY_NAMES {
        if text.contains(name) && !symbols.insert(ticker) {
            break;
        }
    }

    symbols.into_vec()
}

/// Join every persona message of a transcript, the input to extraction
pub fn transcript_text(messages: &[StoredMessage]) -> String {
    messages
        .iter()
        .filter(|msg| msg.message_type == StoredMessageKind::Agent)
        .map(|msg| msg.content.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Ordered, bounded, duplicate-free collection
#[derive(Default)]
struct SymbolSet(Vec<String>);

impl SymbolSet {
    /// Insert unless present; returns `false` once the set is full
    fn insert(&mut self, symbol: &str) -> bool {
        if !self.0.iter().any(|s| s == symbol) {
            self.0.push(symbol.to_string());
        }
        self.0.len() < MAX_SYMBOLS
    }

    fn into_vec(self) -> Vec<String> {
        self.0
    }
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// ASCII word boundary on both sides of `start..end`
fn at_word_boundary(text: &str, start: usize, end: usize) -> bool {
    let bytes = text.as_bytes();
    let before = start == 0 || !is_word_byte(bytes[start - 1]);
    let after = end == bytes.len() || !is_word_byte(bytes[end]);
    before && after
}

/// Up to [`CONTEXT_CHARS`] characters either side of `start..end`
fn context_window(text: &str, start: usize, end: usize) -> &str {
    let from = text[..start]
        .char_indices()
        .rev()
        .nth(CONTEXT_CHARS - 1)
        .map(|(i, _)| i)
        .unwrap_or(0);
    let to = text[end..]
        .char_indices()
        .nth(CONTEXT_CHARS)
        .map(|(i, _)| end + i)
        .unwrap_or(text.len());
    &text[from..to]
}

fn has_market_context(window: &str) -> bool {
    window.contains('$')
        || window.to_lowercase().contains("stock")
        || window.contains(STOCK_PRICE_TERM)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DiscussionId;
    use proptest::prelude::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_whitelist_and_name_table_dedupe() {
        let text = "TSLA surged as 特斯拉 reported strong deliveries; THE market reacted.";
        assert_eq!(extract_symbols(text), strings(&["TSLA"]));
    }

    #[test]
    fn test_unknown_token_needs_context() {
        assert!(extract_symbols("We discussed XYZ at length.").is_empty());
        assert_eq!(extract_symbols("Buying $XYZ today"), strings(&["XYZ"]));
        assert_eq!(extract_symbols("XYZ Stock is cheap"), strings(&["XYZ"]));
        assert_eq!(extract_symbols("QQQ的股价上涨"), strings(&["QQQ"]));
    }

    #[test]
    fn test_blacklist_wins_over_context() {
        assert!(extract_symbols("THE stock of $USD and the CEO stock").is_empty());
    }

    #[test]
    fn test_context_window_is_bounded() {
        // `$` sits more than ten characters away from the token
        assert!(extract_symbols("$ is far away from    XYZ").is_empty());
        assert_eq!(extract_symbols("$ is near XYZ"), strings(&["XYZ"]));
    }

    #[test]
    fn test_token_length_and_boundaries() {
        assert!(extract_symbols("GOOGLE stock and A stock").is_empty());
        assert!(extract_symbols("aTSLA or TSLA2 or TSLA_x").is_empty());
        assert_eq!(extract_symbols("(NVDA), MSFT."), strings(&["NVDA", "MSFT"]));
    }

    #[test]
    fn test_name_table_order_and_mapping() {
        let text = "腾讯 and 比亚迪 compete with 苹果公司 and Netflix";
        assert_eq!(
            extract_symbols(text),
            strings(&["AAPL", "NFLX", "TCEHY", "BYDDF"])
        );
    }

    #[test]
    fn test_truncates_to_ten() {
        let text = "AAPL MSFT GOOGL AMZN META TSLA NVDA NFLX BABA JPM JNJ WMT 腾讯";
        let symbols = extract_symbols(text);
        assert_eq!(symbols.len(), MAX_SYMBOLS);
        assert_eq!(symbols[9], "JPM");
    }

    #[test]
    fn test_transcript_text_keeps_agent_messages_only() {
        let message = |id: i64, kind: StoredMessageKind, content: &str| StoredMessage {
            id,
            discussion_id: DiscussionId(1),
            agent_id: None,
            agent_name: None,
            content: content.to_string(),
            message_type: kind,
            created_at: None,
        };
        let messages = vec![
            message(1, StoredMessageKind::User, "What about AAPL?"),
            message(2, StoredMessageKind::Agent, "NVDA leads."),
            message(3, StoredMessageKind::Summary, "Summary mentions MSFT"),
            message(4, StoredMessageKind::Agent, "TSLA lags."),
        ];
        assert_eq!(transcript_text(&messages), "NVDA leads. TSLA lags.");
    }

    proptest! {
        #[test]
        fn prop_bounded_and_distinct(text in "[A-Za-z$ 特斯拉苹果腾讯股价]{0,200}") {
            let symbols = extract_symbols(&text);
            prop_assert!(symbols.len() <= MAX_SYMBOLS);
            let mut seen = std::collections::HashSet::new();
            for s in &symbols {
                prop_assert!(seen.insert(s.clone()));
            }
        }

        #[test]
        fn prop_second_pass_adds_nothing(text in "[A-Z$ a-z特斯拉微软Meta股价]{0,200}") {
            let first = extract_symbols(&text);
            let second = extract_symbols(&first.join(" "));
            for s in &second {
                prop_assert!(first.contains(s));
            }
        }

        #[test]
        fn prop_deterministic(text in ".{0,120}") {
            prop_assert_eq!(extract_symbols(&text), extract_symbols(&text));
        }
    }
}
