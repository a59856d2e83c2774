pub mod pattern;

/// Splits decoded chunk text into counting tokens.
pub trait TextTokenizer: Sync + Send {
    /// Call `visit` with every normalized, non-empty token of `text`, in order
    /// of appearance.
    fn for_each_token(&self, text: &str, visit: &mut dyn FnMut(&str));

    /// Collect the tokens of `text`.
    fn tokenize(&self, text: &str) -> Vec<String> {
        let mut tokens = Vec::new();
        self.for_each_token(text, &mut |token| tokens.push(token.to_string()));
        tokens
    }
}

pub use self::pattern::PatternTokenizer;
