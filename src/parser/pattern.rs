// Regex-driven tokenizer with a case normalisation policy

use std::borrow::Cow;
use log::debug;
use regex::Regex;

use crate::config::PulseConfig;
use crate::error::Result;
use super::TextTokenizer;

/// Tokens are the non-overlapping matches of a pattern.
///
/// Case-insensitive mode lowercases every match before it is counted;
/// case-sensitive mode counts matches verbatim.
#[derive(Debug, Clone)]
pub struct PatternTokenizer {
    regex: Regex,
    case_sensitive: bool,
}

impl PatternTokenizer {
    pub fn new(pattern: &str, case_sensitive: bool) -> Result<Self> {
        let regex = Regex::new(pattern)?;
        debug!("Compiled token pattern {:?} (case_sensitive={})", pattern, case_sensitive);
        Ok(Self { regex, case_sensitive })
    }

    pub fn from_config(config: &PulseConfig) -> Result<Self> {
        Ok(Self {
            regex: config.compile_pattern()?,
            case_sensitive: config.case_sensitive,
        })
    }

    fn normalize<'t>(&self, raw: &'t str) -> Cow<'t, str> {
        if self.case_sensitive {
            return Cow::Borrowed(raw);
        }
        if raw.is_ascii() {
            return if raw.bytes().any(|b| b.is_ascii_uppercase()) {
                Cow::Owned(raw.to_ascii_lowercase())
            } else {
                Cow::Borrowed(raw)
            };
        }
        // Titlecase letters are not uppercase but still have a lowercase form.
        let lowered = raw.to_lowercase();
        if lowered == raw {
            Cow::Borrowed(raw)
        } else {
            Cow::Owned(lowered)
        }
    }
}

impl TextTokenizer for PatternTokenizer {
    fn for_each_token(&self, text: &str, visit: &mut dyn FnMut(&str)) {
        for found in self.regex.find_iter(text) {
            let token = self.normalize(found.as_str());
            if token.is_empty() {
                continue;
            }
            visit(&token);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_when_case_insensitive() {
        let tokenizer = PatternTokenizer::new(r"\w+", false).unwrap();
        assert_eq!(tokenizer.tokenize("Hello hello HELLO"), vec!["hello", "hello", "hello"]);
    }

    #[test]
    fn keeps_case_when_case_sensitive() {
        let tokenizer = PatternTokenizer::new(r"\w+", true).unwrap();
        assert_eq!(tokenizer.tokenize("Hello hello HELLO"), vec!["Hello", "hello", "HELLO"]);
    }

    #[test]
    fn punctuation_is_not_part_of_tokens() {
        let tokenizer = PatternTokenizer::new(r"\w+", false).unwrap();
        assert_eq!(tokenizer.tokenize("run, run! run..."), vec!["run", "run", "run"]);
    }

    #[test]
    fn empty_matches_are_discarded() {
        let tokenizer = PatternTokenizer::new(r"\w*", false).unwrap();
        assert_eq!(tokenizer.tokenize("a  b"), vec!["a", "b"]);
    }

    #[test]
    fn unicode_words_are_lowercased() {
        let tokenizer = PatternTokenizer::new(r"\w+", false).unwrap();
        assert_eq!(tokenizer.tokenize("Привет ПРИВЕТ"), vec!["привет", "привет"]);
    }

    #[test]
    fn titlecase_letters_are_lowercased() {
        let tokenizer = PatternTokenizer::new(r"\w+", false).unwrap();
        assert_eq!(tokenizer.tokenize("ǅemal ǆemal ǄEMAL"), vec!["ǆemal", "ǆemal", "ǆemal"]);
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        assert!(PatternTokenizer::new("(open", false).is_err());
    }
}
