//! Word-list dictionary with edit-distance suggestions.

use std::collections::BTreeSet;

use resource_controller_sdk::Dictionary;

/// Suggestions are known words within this Levenshtein distance.
const MAX_SUGGESTION_DISTANCE: usize = 2;
const MAX_SUGGESTIONS: usize = 5;

/// Case-insensitive dictionary over a fixed word list.
#[derive(Debug, Clone, Default)]
pub struct StaticDictionary {
    words: BTreeSet<String>,
}

impl StaticDictionary {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            words: words
                .into_iter()
                .map(|w| w.as_ref().trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect(),
        }
    }

    /// One word per line; blank lines and `#` comments are ignored.
    #[must_use]
    pub fn from_word_list(text: &str) -> Self {
        Self::new(
            text.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#')),
        )
    }
}

impl Dictionary for StaticDictionary {
    fn check(&self, word: &str) -> bool {
        self.words.contains(&word.to_lowercase())
    }

    fn suggest(&self, word: &str) -> Vec<String> {
        let word = word.to_lowercase();
        let mut scored: Vec<(usize, &String)> = self
            .words
            .iter()
            .map(|candidate| (strsim::levenshtein(&word, candidate), candidate))
            .filter(|(distance, _)| *distance <= MAX_SUGGESTION_DISTANCE)
            .collect();
        scored.sort();
        scored
            .into_iter()
            .take(MAX_SUGGESTIONS)
            .map(|(_, w)| w.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_is_case_insensitive() {
        let dict = StaticDictionary::new(["Hello", "world"]);
        assert!(dict.check("HELLO"));
        assert!(dict.check("world"));
        assert!(!dict.check("wrld!"));
    }

    #[test]
    fn suggestions_are_closest_first_and_bounded() {
        let dict = StaticDictionary::from_word_list("# greetings\nhello\nhelp\nyellow\n\nworld\n");
        assert_eq!(dict.suggest("helo"), vec!["hello", "help"]);
        assert!(dict.suggest("xyzzy").is_empty());
    }
}
