//! Pattern matching utilities for prompt detection.

use memchr::memmem;
use regex::bytes::Regex;

/// Markers of a telnet login prompt (`login:`, `Login:`, `Username:`).
pub const LOGIN_PROMPTS: &[&str] = &[r"(?i-u)ogin:", r"(?i-u)sername:"];

/// Markers of a telnet password prompt.
pub const PASSWORD_PROMPTS: &[&str] = &[r"(?i-u)assword:"];

/// Trait for prompt matching - regex by default, extensible for custom parsers.
pub trait PromptMatcher: Send + Sync {
    /// Returns byte offset where match ends, or None if no match.
    fn find_match(&self, data: &[u8]) -> Option<usize>;

    /// Check if the data matches the pattern.
    fn is_match(&self, data: &[u8]) -> bool {
        self.find_match(data).is_some()
    }
}

/// Regex-based prompt matcher.
impl PromptMatcher for Regex {
    fn find_match(&self, data: &[u8]) -> Option<usize> {
        self.find(data).map(|m| m.end())
    }
}

/// The text a shell prints when it is ready for the next command.
///
/// Matches only at the end of the data: the symbol's text followed by
/// nothing but spaces or tabs. A `$` inside command output therefore never
/// ends a read early.
#[derive(Debug, Clone)]
pub struct PromptSymbol {
    symbol: String,
    trailing: Option<Regex>,
}

impl PromptSymbol {
    pub fn new(symbol: impl Into<String>) -> Self {
        let symbol = symbol.into();
        let trailing = compile_prompt_pattern(&symbol);
        Self { symbol, trailing }
    }

    pub fn as_str(&self) -> &str {
        &self.symbol
    }

    /// Whether the symbol text appears anywhere in `data`.
    pub fn contained_in(&self, data: &[u8]) -> bool {
        let needle = self.symbol.trim_end();
        !needle.is_empty() && memmem::find(data, needle.as_bytes()).is_some()
    }

    /// Adopt the whitespace that actually trailed the symbol in `observed`.
    ///
    /// Only applies when the last occurrence of the symbol is followed by
    /// nothing but horizontal whitespace, i.e. `observed` ends at a prompt.
    pub fn refine(&mut self, observed: &[u8]) {
        let core = self.symbol.trim_end();
        if core.is_empty() {
            return;
        }
        let Some(pos) = memmem::rfind(observed, core.as_bytes()) else {
            return;
        };
        let after = &observed[pos + core.len()..];
        if !after.iter().all(|b| matches!(b, b' ' | b'\t')) {
            return;
        }

        let refined = format!("{core}{}", String::from_utf8_lossy(after));
        if refined != self.symbol {
            *self = Self::new(refined);
        }
    }
}

impl Default for PromptSymbol {
    fn default() -> Self {
        Self::new("")
    }
}

impl PromptMatcher for PromptSymbol {
    fn find_match(&self, data: &[u8]) -> Option<usize> {
        self.trailing.as_ref()?.find(data).map(|m| m.end())
    }
}

/// Compile a prompt symbol into a pattern anchored to the end of the data.
///
/// Trailing whitespace in the symbol is relaxed to "any spaces or tabs", so
/// `$` and `$ ` both match `user@host:~$ `. Returns `None` for a blank
/// symbol, which never matches.
pub fn compile_prompt_pattern(symbol: &str) -> Option<Regex> {
    let core = symbol.trim_end();
    if core.is_empty() {
        return None;
    }
    Regex::new(&format!("{}[ \\t]*$", regex::escape(core))).ok()
}

/// Compile a list of patterns, e.g. [`LOGIN_PROMPTS`].
pub fn compile_patterns(patterns: &[&str]) -> Result<Vec<Regex>, regex::Error> {
    patterns.iter().map(|p| Regex::new(p)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_prompt_match() {
        let prompt = PromptSymbol::new("$ ");
        assert!(prompt.is_match(b"output\n$ "));
        assert!(prompt.is_match(b"user@host:~$ "));
        assert!(!prompt.is_match(b"router# "));
    }

    #[test]
    fn test_symbol_mid_output_does_not_match() {
        let prompt = PromptSymbol::new("$");
        assert!(!prompt.is_match(b"price: $5\nmore output"));
        assert!(!prompt.is_match(b"echo $\n"));
        assert!(prompt.contained_in(b"price: $5\nmore output"));
    }

    #[test]
    fn test_symbol_without_space_matches_spaced_prompt() {
        let prompt = PromptSymbol::new("#");
        assert!(prompt.is_match(b"localhost# "));
        assert!(prompt.is_match(b"localhost#"));
        assert!(prompt.is_match(b"localhost#\t"));
    }

    #[test]
    fn test_symbol_is_literal() {
        let prompt = PromptSymbol::new("(config)#");
        assert!(prompt.is_match(b"router(config)#"));
        assert!(!prompt.is_match(b"routerconfig#"));
    }

    #[test]
    fn test_blank_symbol_never_matches() {
        let prompt = PromptSymbol::new("  ");
        assert!(!prompt.is_match(b"anything  "));
        assert!(!prompt.contained_in(b"anything  "));
        assert!(compile_prompt_pattern("").is_none());
    }

    #[test]
    fn test_refine_adopts_trailing_space() {
        let mut prompt = PromptSymbol::new("$");
        prompt.refine(b"Welcome to Ubuntu\r\nuser@vm:~$ ");
        assert_eq!(prompt.as_str(), "$ ");
        assert!(prompt.is_match(b"done\n$ "));
    }

    #[test]
    fn test_refine_ignores_symbol_inside_output() {
        let mut prompt = PromptSymbol::new("$");
        prompt.refine(b"costs $5 today\r\n");
        assert_eq!(prompt.as_str(), "$");
    }

    #[test]
    fn test_login_patterns_are_case_insensitive() {
        let login = compile_patterns(LOGIN_PROMPTS).unwrap();
        assert!(login[0].is_match(b"vm login: "));
        assert!(login[0].is_match(b"LOGIN:"));
        assert!(login[1].is_match(b"Username:"));

        let password = compile_patterns(PASSWORD_PROMPTS).unwrap();
        assert!(password[0].is_match(b"Password: "));
        assert!(!password[0].is_match(b"pass: "));
    }

    #[test]
    fn test_regex_prompt_matcher() {
        let pattern = Regex::new(r"router#[ ]*$").unwrap();
        assert_eq!(pattern.find_match(b"show\nrouter# "), Some(13));
        assert!(!pattern.is_match(b"router> "));
    }
}
