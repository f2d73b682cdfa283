//! Word tokenization shared by the embedders and the ranking stages

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

// Unicode word characters: letters, marks, digits and connector punctuation
static WORD: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\w+").ok());

/// Lowercased words in order of appearance
pub fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    WORD.as_ref()
        .into_iter()
        .flat_map(move |re| re.find_iter(text))
        .map(|m| m.as_str().to_lowercase())
}

/// Distinct lowercased words strictly longer than `longer_than` characters
pub fn word_set(text: &str, longer_than: usize) -> HashSet<String> {
    words(text)
        .filter(|w| w.chars().count() > longer_than)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_words_split_on_punctuation() {
        let got: Vec<String> = words("Context-bundle: RRF_fusion, k0=60!").collect();
        assert_eq!(got, vec!["context", "bundle", "rrf_fusion", "k0", "60"]);
    }

    #[test]
    fn test_word_set_filters_short_words() {
        let set = word_set("The cat sat on a warm mat near the Cat", 2);
        assert!(set.contains("cat"));
        assert!(set.contains("warm"));
        assert!(!set.contains("on"));
        assert_eq!(set.len(), 6);
    }

    #[test]
    fn test_accented_words_stay_whole() {
        let got: Vec<String> = words("Résumé of the Café menu").collect();
        assert_eq!(got, vec!["résumé", "of", "the", "café", "menu"]);
    }

    #[test]
    fn test_cyrillic_words_are_tokenized() {
        let got: Vec<String> = words("Память агента, хранит КОНТЕКСТ").collect();
        assert_eq!(got, vec!["память", "агента", "хранит", "контекст"]);
    }

    #[test]
    fn test_length_filter_counts_chars_not_bytes() {
        // "день" is 4 chars but 8 bytes
        let set = word_set("день ум", 3);
        assert!(set.contains("день"));
        assert!(!set.contains("ум"));
        assert_eq!(set.len(), 1);
    }
}
