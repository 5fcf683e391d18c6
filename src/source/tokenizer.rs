//! Text tokenization
//!
//! Normalization is ASCII-lowercase with ASCII alphanumerics, `_`, `#` and `@`
//! kept; every other character (including non-ASCII) separates tokens.

/// Is `c` part of a token?
#[inline]
pub fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '#' || c == '@'
}

/// Lazy token iterator over a borrowed text
///
/// Cloning restarts from the clone point, so the same text can be walked
/// more than once without re-tokenizing up front.
#[derive(Debug, Clone)]
pub struct Tokens<'a> {
    rest: &'a str,
}

impl<'a> Iterator for Tokens<'a> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let start = self.rest.find(is_token_char)?;
        let tail = &self.rest[start..];
        let end = tail.find(|c: char| !is_token_char(c)).unwrap_or(tail.len());

        let token = &tail[..end];
        self.rest = &tail[end..];

        Some(token.to_ascii_lowercase())
    }
}

/// Tokenize `text`
///
/// ```
/// use tweetpulse::source::tokenizer::tokenize;
///
/// let tokens: Vec<String> = tokenize("RT @Kanye: #Yeezy, out now!").collect();
/// assert_eq!(tokens, vec!["rt", "@kanye", "#yeezy", "out", "now"]);
/// ```
pub fn tokenize(text: &str) -> Tokens<'_> {
    Tokens { rest: text }
}
