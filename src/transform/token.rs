//! Lexer for TypeScript-flavoured script text.
//!
//! The lexer never fails: unterminated literals run to the end of the line
//! (strings) or the end of input (templates, block comments). Concatenating
//! the text of every token reproduces the input exactly.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Number,
    Str,
    Template,
    Regex,
    Punct,
    Whitespace,
    Comment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
}

impl Token {
    pub fn is_trivia(&self) -> bool {
        matches!(self.kind, TokenKind::Whitespace | TokenKind::Comment)
    }
}

// `<<`, `>>` and `>>>` are deliberately absent: closing generic groups such
// as `Array<Array<T>>` must lex as two `>` tokens.
const PUNCTUATORS: &[&str] = &[
    "...", "===", "!==", "**=", "&&=", "||=", "??=", "=>", "==", "!=", "<=", ">=", "&&", "||",
    "??", "?.", "++", "--", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "**",
];

const REGEX_PREFIX_WORDS: &[&str] = &[
    "return", "typeof", "instanceof", "in", "of", "new", "delete", "void", "throw", "case", "do",
    "else", "yield", "await",
];

pub fn tokenize(src: &str) -> Vec<Token> {
    let chars: Vec<char> = src.chars().collect();
    let len = chars.len();
    let mut tokens: Vec<Token> = Vec::new();
    let mut i = 0;

    while i < len {
        let c = chars[i];
        let start = i;
        let next = chars.get(i + 1).copied();

        let kind = if c.is_whitespace() {
            while i < len && chars[i].is_whitespace() {
                i += 1;
            }
            TokenKind::Whitespace
        } else if c == '/' && next == Some('/') {
            while i < len && chars[i] != '\n' {
                i += 1;
            }
            TokenKind::Comment
        } else if c == '/' && next == Some('*') {
            i += 2;
            while i < len && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                i += 1;
            }
            i = (i + 2).min(len);
            TokenKind::Comment
        } else if c == '"' || c == '\'' {
            i = scan_quoted(&chars, i, c);
            TokenKind::Str
        } else if c == '`' {
            i = scan_template(&chars, i);
            TokenKind::Template
        } else if is_ident_start(c) || (c == '#' && next.is_some_and(is_ident_start)) {
            i += 1;
            while i < len && is_ident_part(chars[i]) {
                i += 1;
            }
            TokenKind::Ident
        } else if c.is_ascii_digit() || (c == '.' && next.is_some_and(|n| n.is_ascii_digit())) {
            i = scan_number(&chars, i);
            TokenKind::Number
        } else if c == '/' && regex_allowed(&tokens) {
            match scan_regex(&chars, i) {
                Some(end) => {
                    i = end;
                    TokenKind::Regex
                }
                None => {
                    i += 1;
                    TokenKind::Punct
                }
            }
        } else {
            i = scan_punct(&chars, i);
            TokenKind::Punct
        };

        tokens.push(Token { kind, text: chars[start..i].iter().collect() });
    }

    tokens
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn scan_quoted(chars: &[char], mut i: usize, quote: char) -> usize {
    i += 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '\n' => return i,
            c if c == quote => return i + 1,
            _ => i += 1,
        }
    }
    chars.len()
}

fn scan_template(chars: &[char], mut i: usize) -> usize {
    i += 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '`' => return i + 1,
            '$' if chars.get(i + 1) == Some(&'{') => i = scan_substitution(chars, i + 2),
            _ => i += 1,
        }
    }
    chars.len()
}

/// Scans a `${ ... }` body, returning the index just past its closing brace.
fn scan_substitution(chars: &[char], mut i: usize) -> usize {
    let mut depth = 1usize;
    while i < chars.len() {
        match chars[i] {
            '{' => {
                depth += 1;
                i += 1;
            }
            '}' => {
                depth -= 1;
                i += 1;
                if depth == 0 {
                    return i;
                }
            }
            q @ ('"' | '\'') => i = scan_quoted(chars, i, q),
            '`' => i = scan_template(chars, i),
            _ => i += 1,
        }
    }
    chars.len()
}

fn scan_number(chars: &[char], mut i: usize) -> usize {
    while i < chars.len() {
        let c = chars[i];
        if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
            // exponent sign: 1e-9, 2E+3
            if (c == 'e' || c == 'E')
                && matches!(chars.get(i + 1), Some('+') | Some('-'))
                && !chars[..i].iter().rev().take_while(|c| c.is_ascii_alphanumeric() || **c == '.').any(|c| *c == 'x' || *c == 'X')
            {
                i += 2;
                continue;
            }
            i += 1;
        } else {
            break;
        }
    }
    i
}

fn regex_allowed(tokens: &[Token]) -> bool {
    let Some(prev) = tokens.iter().rev().find(|t| !t.is_trivia()) else {
        return true;
    };
    match prev.kind {
        TokenKind::Punct => !matches!(prev.text.as_str(), ")" | "]" | "}" | "++" | "--"),
        TokenKind::Ident => REGEX_PREFIX_WORDS.contains(&prev.text.as_str()),
        _ => false,
    }
}

fn scan_regex(chars: &[char], mut i: usize) -> Option<usize> {
    i += 1;
    let mut in_class = false;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '\n' => return None,
            '[' => {
                in_class = true;
                i += 1;
            }
            ']' => {
                in_class = false;
                i += 1;
            }
            '/' if !in_class => {
                i += 1;
                while i < chars.len() && is_ident_part(chars[i]) {
                    i += 1;
                }
                return Some(i);
            }
            _ => i += 1,
        }
    }
    None
}

fn scan_punct(chars: &[char], i: usize) -> usize {
    for p in PUNCTUATORS {
        let n = p.chars().count();
        if i + n <= chars.len() && chars[i..i + n].iter().copied().eq(p.chars()) {
            return i + n;
        }
    }
    i + 1
}
