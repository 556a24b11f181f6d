//! Token stream with edit marks.
//!
//! Passes address significant tokens (everything except whitespace and
//! comments) by position, mark ranges for removal and queue insertions.
//! Marks never shift positions, so a pass can keep scanning while it edits;
//! `render` applies them all at once.

use std::collections::BTreeMap;

use super::token::{tokenize, Token, TokenKind};

pub(crate) struct Stream {
    tokens: Vec<Token>,
    sig: Vec<usize>,
    removed: Vec<bool>,
    inserts: BTreeMap<usize, Vec<String>>,
}

impl Stream {
    pub fn new(src: &str) -> Self {
        let tokens = tokenize(src);
        let sig = tokens
            .iter()
            .enumerate()
            .filter(|(_, t)| !t.is_trivia())
            .map(|(i, _)| i)
            .collect();
        let removed = vec![false; tokens.len()];
        Self { tokens, sig, removed, inserts: BTreeMap::new() }
    }

    pub fn len(&self) -> usize {
        self.sig.len()
    }

    pub fn text(&self, p: usize) -> &str {
        self.sig.get(p).map(|&i| self.tokens[i].text.as_str()).unwrap_or("")
    }

    pub fn kind(&self, p: usize) -> Option<TokenKind> {
        self.sig.get(p).map(|&i| self.tokens[i].kind)
    }

    /// Punctuator or identifier with exactly this text.
    pub fn is(&self, p: usize, text: &str) -> bool {
        matches!(self.kind(p), Some(TokenKind::Punct | TokenKind::Ident)) && self.text(p) == text
    }

    pub fn is_word(&self, p: usize) -> bool {
        self.kind(p) == Some(TokenKind::Ident)
    }

    /// The token before `p` is `text`.
    pub fn prev_is(&self, p: usize, text: &str) -> bool {
        p > 0 && self.is(p - 1, text)
    }

    fn trivia_before(&self, p: usize) -> impl Iterator<Item = &Token> {
        let end = self.sig.get(p).copied().unwrap_or(self.tokens.len());
        let start = match p.checked_sub(1) {
            Some(prev) => self.sig[prev] + 1,
            None => 0,
        };
        self.tokens[start..end].iter()
    }

    /// Whitespace or a comment separates `p` from the previous token.
    pub fn gap_before(&self, p: usize) -> bool {
        self.trivia_before(p).next().is_some()
    }

    /// `p` starts a line (or the input).
    pub fn newline_before(&self, p: usize) -> bool {
        p == 0 || self.trivia_before(p).any(|t| t.text.contains('\n'))
    }

    /// Whitespace directly following `p`, if any.
    pub fn space_after(&self, p: usize) -> Option<&str> {
        let raw = *self.sig.get(p)? + 1;
        self.tokens
            .get(raw)
            .filter(|t| t.kind == TokenKind::Whitespace)
            .map(|t| t.text.as_str())
    }

    /// Matching closer for `(`, `[` or `{` at `p`.
    pub fn matching(&self, p: usize) -> Option<usize> {
        let close = match self.text(p) {
            "(" => ")",
            "[" => "]",
            "{" => "}",
            _ => return None,
        };
        let open = self.text(p);
        let mut depth = 0usize;
        for q in p..self.len() {
            if self.kind(q) != Some(TokenKind::Punct) {
                continue;
            }
            let t = self.text(q);
            if t == open {
                depth += 1;
            } else if t == close {
                depth -= 1;
                if depth == 0 {
                    return Some(q);
                }
            }
        }
        None
    }

    /// Matching opener for `)`, `]` or `}` at `p`.
    pub fn matching_back(&self, p: usize) -> Option<usize> {
        let open = match self.text(p) {
            ")" => "(",
            "]" => "[",
            "}" => "{",
            _ => return None,
        };
        let close = self.text(p);
        let mut depth = 0usize;
        for q in (0..=p).rev() {
            if self.kind(q) != Some(TokenKind::Punct) {
                continue;
            }
            let t = self.text(q);
            if t == close {
                depth += 1;
            } else if t == open {
                depth -= 1;
                if depth == 0 {
                    return Some(q);
                }
            }
        }
        None
    }

    /// Position after the balanced group opening at `p`, or `p + 1`.
    pub fn skip_group(&self, p: usize) -> usize {
        match self.text(p) {
            "(" | "[" | "{" if self.kind(p) == Some(TokenKind::Punct) => {
                self.matching(p).map_or(self.len(), |m| m + 1)
            }
            _ => p + 1,
        }
    }

    /// Nearest unclosed `{`, `(` or `[` enclosing `p`.
    pub fn enclosing_open(&self, p: usize) -> Option<usize> {
        let mut depth = 0usize;
        for q in (0..p).rev() {
            if self.kind(q) != Some(TokenKind::Punct) {
                continue;
            }
            match self.text(q) {
                ")" | "]" | "}" => depth += 1,
                "(" | "[" | "{" => {
                    if depth == 0 {
                        return Some(q);
                    }
                    depth -= 1;
                }
                _ => {}
            }
        }
        None
    }

    /// Removes significant tokens `from..=to` and everything between them.
    pub fn remove(&mut self, from: usize, to: usize) {
        if from > to || to >= self.len() {
            return;
        }
        for raw in self.sig[from]..=self.sig[to] {
            self.removed[raw] = true;
        }
    }

    /// Like `remove`, also dropping the whitespace that follows `to`.
    pub fn remove_keyword(&mut self, from: usize, to: usize) {
        self.remove(from, to);
        if let Some(&raw) = self.sig.get(to) {
            if let Some(t) = self.tokens.get(raw + 1) {
                if t.kind == TokenKind::Whitespace && !t.text.contains('\n') {
                    self.removed[raw + 1] = true;
                }
            }
        }
    }

    /// Like `remove`, also dropping the whitespace that precedes `from`.
    pub fn remove_suffix(&mut self, from: usize, to: usize) {
        self.remove(from, to);
        if let Some(&raw) = self.sig.get(from) {
            if let Some(prev) = raw.checked_sub(1) {
                let t = &self.tokens[prev];
                if t.kind == TokenKind::Whitespace && !t.text.contains('\n') {
                    self.removed[prev] = true;
                }
            }
        }
    }

    pub fn insert_after(&mut self, p: usize, text: impl Into<String>) {
        if let Some(&raw) = self.sig.get(p) {
            self.inserts.entry(raw).or_default().push(text.into());
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (i, token) in self.tokens.iter().enumerate() {
            if !self.removed[i] {
                out.push_str(&token.text);
            }
            if let Some(extra) = self.inserts.get(&i) {
                for text in extra {
                    out.push_str(text);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_skips_nested_groups() {
        let s = Stream::new("f(a, (b), [c]) { x }");
        assert_eq!(s.matching(1), Some(10));
        assert_eq!(s.matching_back(10), Some(1));
        assert_eq!(s.text(11), "{");
        assert_eq!(s.matching(11), Some(13));
    }

    #[test]
    fn remove_keeps_surrounding_text() {
        let mut s = Stream::new("let x: number = 1;");
        // let x : number = 1 ;
        s.remove(2, 3);
        assert_eq!(s.render(), "let x = 1;");
    }

    #[test]
    fn remove_keyword_eats_following_space() {
        let mut s = Stream::new("(public name)");
        s.remove_keyword(1, 1);
        assert_eq!(s.render(), "(name)");
    }

    #[test]
    fn inserts_follow_their_anchor() {
        let mut s = Stream::new("{}");
        s.insert_after(0, " a;");
        assert_eq!(s.render(), "{ a;}");
    }

    #[test]
    fn newline_detection() {
        let s = Stream::new("a\n  b c");
        assert!(s.newline_before(0));
        assert!(s.newline_before(1));
        assert!(!s.newline_before(2));
        assert!(s.gap_before(2));
    }
}
