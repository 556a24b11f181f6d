//! Class-aware passes: heritage clauses, parameter properties and member
//! declarations.

use super::passes::{parse_params, skip_initializer};
use super::stream::Stream;
use super::token::TokenKind;
use super::types::{match_angle, skip_type};

const MEMBER_MODIFIERS: &[&str] = &[
    "public", "private", "protected", "readonly", "abstract", "override", "declare", "static",
    "async", "get", "set", "accessor",
];

// the subset that has no runtime meaning
const TYPE_ONLY_MODIFIERS: &[&str] =
    &["public", "private", "protected", "readonly", "abstract", "override", "declare"];

fn is_class_keyword(s: &Stream, p: usize) -> bool {
    s.text(p) == "class" && s.is_word(p) && !s.prev_is(p, ".")
}

/// Braces of the body of the class declared at `p`.
fn class_body(s: &Stream, p: usize) -> Option<(usize, usize)> {
    let mut q = p + 1;
    while q < s.len() {
        match s.text(q) {
            "{" => return Some((q, s.matching(q)?)),
            ";" | "}" | ")" => return None,
            "(" | "[" => q = s.skip_group(q),
            "<" => q = match_angle(s, q).map_or(q + 1, |c| c + 1),
            _ => q += 1,
        }
    }
    None
}

/// `abstract`, class type parameters, type arguments on the base class and
/// `implements` clauses.
pub(crate) fn class_heritage(src: &str) -> String {
    let mut s = Stream::new(src);
    for p in 0..s.len() {
        if !is_class_keyword(&s, p) {
            continue;
        }
        if s.prev_is(p, "abstract") {
            s.remove_keyword(p - 1, p - 1);
        }

        let mut q = p + 1;
        if s.is_word(q) && !matches!(s.text(q), "extends" | "implements") {
            q += 1;
        }
        if let Some(close) = match_angle(&s, q) {
            s.remove(q, close);
            q = close + 1;
        }

        if s.is(q, "extends") {
            q += 1;
            while (s.is_word(q) && s.text(q) != "implements") || s.is(q, ".") {
                q += 1;
            }
            if s.is(q, "(") {
                q = s.skip_group(q);
            }
            if let Some(close) = match_angle(&s, q) {
                s.remove(q, close);
                q = close + 1;
            }
        }

        if s.is(q, "implements") {
            let mut end = q + 1;
            while end < s.len() && !s.is(end, "{") {
                end = match_angle(&s, end).map_or(end + 1, |c| c + 1);
            }
            if s.is(end, "{") {
                s.remove_suffix(q, end - 1);
            }
        }
    }
    s.render()
}

/// Constructor parameter properties become plain parameters plus explicit
/// `this.<name> = <name>;` assignments at the top of the constructor body,
/// after the `super(...)` call in derived classes.
pub(crate) fn parameter_properties(src: &str) -> String {
    let mut s = Stream::new(src);
    for p in 0..s.len() {
        if s.text(p) != "constructor" || !s.is_word(p) || !s.is(p + 1, "(") {
            continue;
        }
        let Some(params) = parse_params(&s, p + 1) else {
            continue;
        };
        let Some(close) = s.matching(p + 1) else {
            continue;
        };

        let fields: Vec<String> = params
            .iter()
            .filter(|param| !param.modifiers.is_empty())
            .filter_map(|param| param.name(&s).map(str::to_string))
            .collect();
        for m in params.iter().flat_map(|param| param.modifiers.iter().copied()) {
            s.remove_keyword(m, m);
        }
        if fields.is_empty() {
            continue;
        }

        let body = close + 1;
        if !s.is(body, "{") {
            continue;
        }
        let Some(body_close) = s.matching(body) else {
            continue;
        };

        let separator = match s.space_after(body) {
            Some(ws) if ws.contains('\n') => {
                let indent = ws.rsplit('\n').next().unwrap_or_default();
                format!("\n{indent}")
            }
            _ => " ".to_string(),
        };
        let anchor = if derives(&s, p) {
            super_call_end(&s, body, body_close).unwrap_or(body)
        } else {
            body
        };

        let mut text = String::new();
        if s.is(anchor, ")") {
            text.push(';');
        }
        for name in &fields {
            text.push_str(&separator);
            text.push_str(&format!("this.{name} = {name};"));
        }
        s.insert_after(anchor, text);
    }
    s.render()
}

/// The class enclosing the member at `p` has an `extends` clause.
fn derives(s: &Stream, p: usize) -> bool {
    let Some(body) = s.enclosing_open(p) else {
        return false;
    };
    let mut q = body;
    while q > 0 {
        q -= 1;
        match s.text(q) {
            "extends" => return true,
            "class" => return false,
            ";" | "{" | "}" => return false,
            ")" => match s.matching_back(q) {
                Some(open) => q = open,
                None => return false,
            },
            _ => {}
        }
    }
    false
}

/// Last token of the top-level `super(...)` statement in a constructor body.
fn super_call_end(s: &Stream, body: usize, body_close: usize) -> Option<usize> {
    let mut q = body + 1;
    while q < body_close {
        if s.is(q, "super") && s.is(q + 1, "(") {
            let close = s.matching(q + 1)?;
            return Some(if s.is(close + 1, ";") { close + 1 } else { close });
        }
        q = s.skip_group(q);
    }
    None
}

/// Field annotations, optional and definite markers, type-only modifiers,
/// index signatures and bodiless (abstract, overload, `declare`) members.
pub(crate) fn class_members(src: &str) -> String {
    let mut s = Stream::new(src);
    for p in 0..s.len() {
        if !is_class_keyword(&s, p) {
            continue;
        }
        let Some((open, close)) = class_body(&s, p) else {
            continue;
        };
        let mut m = open + 1;
        while m < close {
            match strip_member(&mut s, m, close) {
                Some(next) if next > m => m = next,
                _ => break,
            }
        }
    }
    s.render()
}

/// Strips the member starting at `m`, returning where the next one starts.
fn strip_member(s: &mut Stream, m: usize, close: usize) -> Option<usize> {
    if s.is(m, ";") {
        return Some(m + 1);
    }

    let mut q = m;
    let mut type_only = Vec::new();
    let mut declaration_only = false;
    while s.is_word(q) && MEMBER_MODIFIERS.contains(&s.text(q)) && names_member(s, q + 1) {
        if matches!(s.text(q), "abstract" | "declare") {
            declaration_only = true;
        }
        if TYPE_ONLY_MODIFIERS.contains(&s.text(q)) {
            type_only.push(q);
        }
        q += 1;
    }
    if s.is(q, "*") {
        q += 1;
    }

    // static initialization block
    if s.is(q, "{") {
        return Some(s.matching(q)? + 1);
    }

    // [key: string]: T
    if s.is(q, "[") && s.is_word(q + 1) && s.is(q + 2, ":") {
        let mut end = s.matching(q)? + 1;
        if s.is(end, ":") {
            end = skip_type(s, end + 1)?;
        }
        let last = if s.is(end, ";") { end } else { end - 1 };
        s.remove(m, last);
        return Some(last + 1);
    }

    match s.kind(q)? {
        TokenKind::Ident | TokenKind::Str | TokenKind::Number => q += 1,
        TokenKind::Punct if s.is(q, "[") => q = s.matching(q)? + 1,
        _ => return None,
    }
    if s.is(q, "?") || s.is(q, "!") {
        s.remove(q, q);
        q += 1;
    }
    if let Some(close_angle) = match_angle(s, q) {
        q = close_angle + 1;
    }

    if s.is(q, "(") {
        q = s.matching(q)? + 1;
        if s.is(q, ":") {
            let end = skip_type(s, q + 1)?;
            s.remove_suffix(q, end - 1);
            q = end;
        }
        if s.is(q, "{") && !declaration_only {
            let body_close = s.matching(q)?;
            for &t in &type_only {
                s.remove_keyword(t, t);
            }
            return Some(body_close + 1);
        }
        // abstract methods and overload signatures
        let last = if s.is(q, ";") {
            q
        } else if s.is(q, "{") {
            s.matching(q)?
        } else {
            q - 1
        };
        s.remove(m, last);
        return Some(last + 1);
    }

    if s.is(q, ":") {
        let end = skip_type(s, q + 1)?;
        s.remove_suffix(q, end - 1);
        q = end;
    }
    if s.is(q, "=") {
        q = skip_initializer(s, q + 1);
    }
    if s.is(q, ";") {
        q += 1;
    }
    if q > close {
        return None;
    }
    if declaration_only {
        s.remove(m, q - 1);
    } else {
        for &t in &type_only {
            s.remove_keyword(t, t);
        }
    }
    Some(q)
}

/// A member name (or another modifier) follows, so the word before is a
/// modifier rather than the member's own name.
fn names_member(s: &Stream, p: usize) -> bool {
    if s.newline_before(p) {
        return false;
    }
    match s.kind(p) {
        Some(TokenKind::Ident | TokenKind::Str | TokenKind::Number) => true,
        Some(TokenKind::Punct) => matches!(s.text(p), "[" | "*" | "{"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heritage_clauses() {
        assert_eq!(
            class_heritage("abstract class Box<T> extends Base<T> implements A, B<T> {}"),
            "class Box extends Base {}"
        );
        assert_eq!(
            class_heritage("class Dog extends Animal {}"),
            "class Dog extends Animal {}"
        );
    }

    #[test]
    fn parameter_properties_in_multiline_body() {
        let src = "class P {\n  constructor(public x: number, private y: number) {\n    log();\n  }\n}";
        assert_eq!(
            parameter_properties(src),
            "class P {\n  constructor(x: number, y: number) {\n    this.x = x;\n    this.y = y;\n    log();\n  }\n}"
        );
    }

    #[test]
    fn parameter_properties_in_empty_body() {
        assert_eq!(
            parameter_properties("class P { constructor(readonly a, b) {} }"),
            "class P { constructor(a, b) { this.a = a;} }"
        );
    }

    #[test]
    fn parameter_properties_after_super() {
        let src = "class D extends B {\n  constructor(name, public tag) {\n    super(name);\n  }\n}";
        assert_eq!(
            parameter_properties(src),
            "class D extends B {\n  constructor(name, tag) {\n    super(name);\n    this.tag = tag;\n  }\n}"
        );
    }

    #[test]
    fn member_declarations() {
        let src = "class A {\n  private x: number = 1;\n  static count: number;\n  name?: string;\n  declare y: string;\n  abstract area(): number;\n  get v(): number { return this.x }\n}";
        assert_eq!(
            class_members(src),
            "class A {\n  x = 1;\n  static count;\n  name;\n  \n  \n  get v() { return this.x }\n}"
        );
    }

    #[test]
    fn index_signature_and_private_names() {
        let src = "class M {\n  [key: string]: unknown;\n  #secret: number = 2;\n}";
        assert_eq!(class_members(src), "class M {\n  \n  #secret = 2;\n}");
    }
}
