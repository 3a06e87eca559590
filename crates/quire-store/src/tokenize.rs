//! Query keyword extraction for the hybrid search pre-filter.
//!
//! Stored records carry their keywords in the `tokens` payload field, computed
//! upstream. At query time the store only needs a cheap way to turn the query
//! text into comparable keywords; [`KeywordTokenizer`] lower-cases, splits on
//! non-alphanumeric characters and removes Russian and English stop words.

use std::collections::HashSet;

/// Turns query text into keywords matched against the `tokens` field.
pub trait Tokenizer: Send + Sync {
    /// Keywords of `text`, in first-occurrence order, without duplicates.
    fn tokenize(&self, text: &str) -> Vec<String>;
}

/// Stop-word filtering keyword tokenizer.
#[derive(Debug, Clone)]
pub struct KeywordTokenizer {
    stop_words: HashSet<String>,
    max_keywords: usize,
    min_len: usize,
}

impl KeywordTokenizer {
    /// Tokenizer with the built-in Russian and English stop-word lists.
    pub fn new(max_keywords: usize) -> Self {
        let stop_words = stop_words::get(stop_words::LANGUAGE::Russian)
            .iter()
            .chain(stop_words::get(stop_words::LANGUAGE::English).iter())
            .map(|w| w.to_string())
            .collect();
        Self {
            stop_words,
            max_keywords,
            min_len: 2,
        }
    }

    /// Tokenizer with a caller-supplied stop-word list.
    pub fn with_stop_words<I, S>(max_keywords: usize, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            stop_words: words.into_iter().map(|w| w.as_ref().to_lowercase()).collect(),
            max_keywords,
            min_len: 2,
        }
    }

    /// Minimum keyword length in characters.
    pub fn with_min_len(mut self, min_len: usize) -> Self {
        self.min_len = min_len;
        self
    }
}

impl Default for KeywordTokenizer {
    fn default() -> Self {
        Self::new(20)
    }
}

impl Tokenizer for KeywordTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        let mut seen = HashSet::new();
        lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.chars().count() >= self.min_len)
            .filter(|w| !self.stop_words.contains(*w))
            .filter(|w| seen.insert(w.to_string()))
            .take(self.max_keywords)
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_basic() {
        let tokenizer = KeywordTokenizer::with_stop_words(10, ["the", "of"]);
        assert_eq!(
            tokenizer.tokenize("The price of the Rust course, Rust!"),
            vec!["price", "rust", "course"]
        );
    }

    #[test]
    fn test_tokenize_drops_short_tokens() {
        let tokenizer = KeywordTokenizer::with_stop_words(10, Vec::<String>::new());
        assert_eq!(tokenizer.tokenize("a b cd 7 42"), vec!["cd", "42"]);
    }

    #[test]
    fn test_tokenize_caps_keywords() {
        let tokenizer = KeywordTokenizer::with_stop_words(2, Vec::<String>::new());
        assert_eq!(tokenizer.tokenize("one two three"), vec!["one", "two"]);
    }

    #[test]
    fn test_builtin_stop_words() {
        let tokenizer = KeywordTokenizer::default();
        let tokens = tokenizer.tokenize("Как записаться на курс по 1С и the schedule");
        assert!(tokens.contains(&"записаться".to_string()));
        assert!(tokens.contains(&"schedule".to_string()));
        assert!(!tokens.contains(&"на".to_string()));
        assert!(!tokens.contains(&"the".to_string()));
        assert!(tokenizer.tokenize("и в на the and").is_empty());
    }
}
