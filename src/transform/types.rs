//! Recognition of type expressions in the token stream.
//!
//! Nothing here is a type checker: these routines only find where a type
//! expression starts and ends so the passes can cut it out.

use super::stream::Stream;
use super::token::TokenKind;

const TYPE_PREFIXES: &[&str] = &["keyof", "readonly", "unique", "infer", "asserts"];

// punctuators that may appear inside a `<...>` type argument list
const ANGLE_PUNCT: &[&str] = &["<", ">", ",", ".", "|", "&", "=", "=>", "...", "[", "(", "{"];

// declarations whose type parameters may carry `= Default`
const DEFAULTS_ALLOWED: &[&str] = &["function", "class", "interface", "type"];

/// Position just past the type expression starting at `p`.
pub(crate) fn skip_type(s: &Stream, p: usize) -> Option<usize> {
    let mut q = p;
    if s.is(q, "|") || s.is(q, "&") {
        q += 1;
    }
    q = skip_operand(s, q)?;
    while s.is(q, "|") || s.is(q, "&") {
        q = skip_operand(s, q + 1)?;
    }
    Some(q)
}

/// One member of a union or intersection, including array suffixes and
/// `x is T` predicates.
fn skip_operand(s: &Stream, p: usize) -> Option<usize> {
    if s.is_word(p) && s.is(p + 1, "is") && s.is_word(p + 2) {
        return skip_type(s, p + 2);
    }
    let mut q = skip_primary(s, p)?;
    // `T[]` and `T["key"]`, but a `[` after whitespace starts something else
    while s.is(q, "[") && !s.gap_before(q) {
        q = s.matching(q)? + 1;
    }
    Some(q)
}

fn skip_primary(s: &Stream, p: usize) -> Option<usize> {
    match s.kind(p)? {
        TokenKind::Str | TokenKind::Number | TokenKind::Template => return Some(p + 1),
        TokenKind::Regex | TokenKind::Whitespace | TokenKind::Comment => return None,
        TokenKind::Punct => {
            return match s.text(p) {
                "(" => {
                    let close = s.matching(p)?;
                    if s.is(close + 1, "=>") {
                        skip_type(s, close + 2)
                    } else {
                        Some(close + 1)
                    }
                }
                "{" | "[" => Some(s.matching(p)? + 1),
                // generic function type: <T>(x: T) => T
                "<" => skip_primary(s, match_angle(s, p)? + 1),
                "-" if s.kind(p + 1) == Some(TokenKind::Number) => Some(p + 2),
                _ => None,
            };
        }
        TokenKind::Ident => {}
    }

    let word = s.text(p);
    if TYPE_PREFIXES.contains(&word) && starts_type(s, p + 1) {
        return skip_operand(s, p + 1);
    }
    if word == "typeof" {
        return Some(skip_entity_name(s, p + 1));
    }
    if word == "new" && s.is(p + 1, "(") {
        return skip_primary(s, p + 1);
    }

    let mut q = skip_entity_name(s, p);
    if s.is(q, "<") {
        q = match_angle(s, q)? + 1;
    }
    Some(q)
}

fn starts_type(s: &Stream, p: usize) -> bool {
    matches!(
        s.kind(p),
        Some(TokenKind::Ident | TokenKind::Str | TokenKind::Number | TokenKind::Template)
    ) || ["(", "[", "{", "<"].iter().any(|t| s.is(p, t))
}

/// `a.b.c`, returning the position after the last name.
fn skip_entity_name(s: &Stream, p: usize) -> usize {
    let mut q = p + 1;
    while s.is(q, ".") && s.is_word(q + 1) {
        q += 2;
    }
    q
}

/// Matching `>` for the `<` at `open` when everything between reads as type
/// arguments. Comparisons, conditionals and arithmetic make this return
/// `None`. A bare `=` is only read as a type parameter default right after a
/// declaration keyword and name.
pub(crate) fn match_angle(s: &Stream, open: usize) -> Option<usize> {
    const LIMIT: usize = 256;

    if !s.is(open, "<") {
        return None;
    }
    let defaults = open
        .checked_sub(2)
        .is_some_and(|k| DEFAULTS_ALLOWED.contains(&s.text(k)));
    let mut depth = 0usize;
    let mut q = open;
    while q < s.len() && q - open < LIMIT {
        match s.kind(q)? {
            TokenKind::Ident | TokenKind::Str | TokenKind::Number => {}
            TokenKind::Punct => {
                let t = s.text(q);
                if !ANGLE_PUNCT.contains(&t) {
                    return None;
                }
                match t {
                    "<" => depth += 1,
                    ">" => {
                        depth -= 1;
                        if depth == 0 {
                            return Some(q);
                        }
                    }
                    "(" | "[" | "{" => q = s.matching(q)?,
                    "=" if !defaults => return None,
                    _ => {}
                }
            }
            _ => return None,
        }
        q += 1;
    }
    None
}

/// Opening `<` for the `>` at `close`, scanning backwards.
pub(crate) fn match_angle_back(s: &Stream, close: usize) -> Option<usize> {
    if !s.is(close, ">") {
        return None;
    }
    let mut depth = 0usize;
    for q in (0..=close).rev() {
        match s.text(q) {
            ">" => depth += 1,
            "<" => {
                depth -= 1;
                if depth == 0 {
                    return Some(q);
                }
            }
            ";" | "{" | "}" => return None,
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Renders what `skip_type` consumes when starting at significant token `p`.
    fn consumed(src: &str, p: usize) -> Option<String> {
        let s = Stream::new(src);
        let end = skip_type(&s, p)?;
        Some((p..end).map(|i| s.text(i)).collect::<Vec<_>>().join(" "))
    }

    #[test]
    fn simple_and_generic_types() {
        assert_eq!(consumed("string = 1", 0).as_deref(), Some("string"));
        assert_eq!(
            consumed("Map<string, Array<number>>, x", 0).as_deref(),
            Some("Map < string , Array < number > >")
        );
        assert_eq!(consumed("number[][] = []", 0).as_deref(), Some("number [ ] [ ]"));
    }

    #[test]
    fn unions_functions_and_objects() {
        assert_eq!(
            consumed("'a' | 'b' | null)", 0).as_deref(),
            Some("'a' | 'b' | null")
        );
        assert_eq!(
            consumed("(x: number) => void, y", 0).as_deref(),
            Some("( x : number ) => void")
        );
        assert_eq!(
            consumed("{ a: string; b?: number } {", 0).as_deref(),
            Some("{ a : string ; b ? : number }")
        );
    }

    #[test]
    fn prefixes_and_predicates() {
        assert_eq!(consumed("keyof typeof obj)", 0).as_deref(), Some("keyof typeof obj"));
        assert_eq!(consumed("readonly string[] =", 0).as_deref(), Some("readonly string [ ]"));
        assert_eq!(consumed("x is Fish {", 0).as_deref(), Some("x is Fish"));
    }

    #[test]
    fn not_a_type() {
        assert_eq!(consumed("= 3", 0), None);
        assert_eq!(consumed("/re/", 0), None);
    }

    #[test]
    fn angle_rejects_comparisons() {
        let s = Stream::new("a < b && c > d");
        assert_eq!(match_angle(&s, 1), None);
        let s = Stream::new("f<T, U>(x)");
        assert_eq!(match_angle(&s, 1), Some(5));
        assert_eq!(match_angle_back(&s, 5), Some(1));
    }

    #[test]
    fn angle_rejects_conditionals_and_assignments() {
        let s = Stream::new("x = a < b ? c : d > (e)");
        assert_eq!(match_angle(&s, 3), None);
        let s = Stream::new("let a = b < c, d = e > (f)");
        assert_eq!(match_angle(&s, 4), None);
        let s = Stream::new("function f<T = string>(x)");
        assert_eq!(match_angle(&s, 2), Some(6));
        let s = Stream::new("const m: Map<string, { a?: number }> = x");
        assert!(match_angle(&s, 4).is_some());
    }
}
