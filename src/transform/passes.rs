//! Stripping passes shared by both transform paths.
//!
//! Every pass takes script text and returns script text. Passes tokenize
//! their input afresh, so the edits of one pass are plain source to the next.

use super::stream::Stream;
use super::token::TokenKind;
use super::types::{match_angle, match_angle_back, skip_type};

pub(crate) const KEYWORDS: &[&str] = &[
    "break", "case", "catch", "class", "const", "continue", "debugger", "default", "delete", "do",
    "else", "export", "extends", "finally", "for", "function", "if", "import", "in", "instanceof",
    "let", "new", "return", "super", "switch", "throw", "try", "typeof", "var", "void", "while",
    "with", "yield", "await", "of",
];

/// Parameter-property modifiers.
pub(crate) const MODIFIERS: &[&str] = &["public", "private", "protected", "readonly", "override"];

pub(crate) fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(&word)
}

/// Token at `p` can end an expression.
pub(crate) fn is_expression_end(s: &Stream, p: usize) -> bool {
    match s.kind(p) {
        Some(TokenKind::Ident) => !is_keyword(s.text(p)),
        Some(TokenKind::Number | TokenKind::Str | TokenKind::Template | TokenKind::Regex) => true,
        Some(TokenKind::Punct) => matches!(s.text(p), ")" | "]" | "}"),
        _ => false,
    }
}

/// One entry of a parameter list, as positions into the stream.
#[derive(Debug, Clone)]
pub(crate) struct Param {
    pub modifiers: Vec<usize>,
    pub binding: (usize, usize),
    pub optional: Option<usize>,
    pub annotation: Option<(usize, usize)>,
    pub start: usize,
    /// The `,` or `)` that ends this parameter.
    pub end: usize,
}

impl Param {
    /// Name of a simple identifier binding.
    pub fn name<'a>(&self, s: &'a Stream) -> Option<&'a str> {
        let (from, to) = self.binding;
        (from == to && s.is_word(from)).then(|| s.text(from))
    }
}

/// Parses the parameter list opening at `open`. Returns `None` when the list
/// does not read as parameters.
pub(crate) fn parse_params(s: &Stream, open: usize) -> Option<Vec<Param>> {
    let close = s.matching(open)?;
    let mut params = Vec::new();
    let mut i = open + 1;

    while i < close {
        let start = i;
        let mut modifiers = Vec::new();
        while s.is_word(i) && MODIFIERS.contains(&s.text(i)) && starts_binding(s, i + 1) {
            modifiers.push(i);
            i += 1;
        }
        if s.is(i, "...") {
            i += 1;
        }
        let binding = if s.is_word(i) && !is_keyword(s.text(i)) {
            (i, i)
        } else if s.is(i, "{") || s.is(i, "[") {
            (i, s.matching(i)?)
        } else {
            return None;
        };
        i = binding.1 + 1;

        let optional = s.is(i, "?").then_some(i);
        if optional.is_some() {
            i += 1;
        }
        let annotation = if s.is(i, ":") {
            let end = skip_type(s, i + 1)?;
            let span = (i, end - 1);
            i = end;
            Some(span)
        } else {
            None
        };
        if s.is(i, "=") {
            i = skip_to_separator(s, i + 1, close);
        }
        if i > close {
            return None;
        }

        params.push(Param { modifiers, binding, optional, annotation, start, end: i });
        if i == close {
            break;
        }
        if !s.is(i, ",") {
            return None;
        }
        i += 1;
    }
    Some(params)
}

fn starts_binding(s: &Stream, p: usize) -> bool {
    s.is_word(p) || s.is(p, "{") || s.is(p, "[") || s.is(p, "...")
}

fn skip_to_separator(s: &Stream, mut i: usize, close: usize) -> usize {
    while i < close && !s.is(i, ",") {
        i = s.skip_group(i);
    }
    i
}

/// The `(` at `open` follows a function name, `function` or `constructor`.
pub(crate) fn is_callable_head(s: &Stream, open: usize) -> bool {
    let Some(prev) = open.checked_sub(1) else {
        return false;
    };
    if s.is(prev, ">") {
        return match_angle_back(s, prev)
            .and_then(|lt| lt.checked_sub(1))
            .is_some_and(|w| s.is_word(w) && !is_keyword(s.text(w)));
    }
    s.is_word(prev) && (s.text(prev) == "function" || !is_keyword(s.text(prev)))
}

/// The `(` at `open` is a call's argument list: it follows a callee name or
/// another call or index.
pub(crate) fn is_call_arguments(s: &Stream, open: usize) -> bool {
    let Some(prev) = open.checked_sub(1) else {
        return false;
    };
    if s.is(prev, ")") || s.is(prev, "]") {
        return true;
    }
    s.is_word(prev) && s.text(prev) != "async" && !is_keyword(s.text(prev))
}

/// The `(` at `open` starts a parameter list of a function, method, arrow
/// or catch clause.
pub(crate) fn is_parameter_list(s: &Stream, open: usize) -> bool {
    if !s.is(open, "(") {
        return false;
    }
    let Some(close) = s.matching(open) else {
        return false;
    };
    if s.prev_is(open, "catch") {
        return true;
    }
    let after = close + 1;
    if s.is(after, "=>") {
        return true;
    }
    if s.is(after, ":") {
        return match skip_type(s, after + 1) {
            // `cond ? (a) : b => c` and `cond ? f(a) : b => c` are conditionals
            Some(end) if s.is(end, "=>") => !s.prev_is(open, "?") && !is_call_arguments(s, open),
            Some(end) if s.is(end, "{") => is_callable_head(s, open),
            _ => false,
        };
    }
    s.is(after, "{") && is_callable_head(s, open)
}

/// End of an initializer expression starting at `i`: the position of the
/// `,`, `;` or closing bracket that ends it, or of the first token of the
/// next statement when a line break ends it.
pub(crate) fn skip_initializer(s: &Stream, mut i: usize) -> usize {
    let start = i;
    while i < s.len() {
        if s.kind(i) == Some(TokenKind::Punct) && matches!(s.text(i), "," | ";" | ")" | "]" | "}") {
            return i;
        }
        if i > start && s.newline_before(i) && !continues_expression(s, i) {
            return i;
        }
        i = s.skip_group(i);
    }
    i
}

fn continues_expression(s: &Stream, i: usize) -> bool {
    const TRAILING: &[&str] = &[
        "=", "=>", ",", "?", ":", "+", "-", "*", "/", "%", "**", "&&", "||", "??", "&", "|", "^",
        "==", "===", "!=", "!==", "<", ">", "<=", ">=", "!", "...", "new", "typeof", "await",
        "in", "instanceof",
    ];
    const LEADING: &[&str] = &[
        ".", "?.", "=>", "?", ":", "+", "-", "*", "/", "%", "**", "&&", "||", "??", "&", "|", "^",
        "==", "===", "!=", "!==", "<", ">", "<=", ">=", "(", "[", "in", "instanceof", "as",
        "satisfies",
    ];
    (i > 0 && TRAILING.contains(&s.text(i - 1)) && s.kind(i - 1) != Some(TokenKind::Str))
        || (LEADING.contains(&s.text(i)) && s.kind(i) != Some(TokenKind::Str))
}

fn at_statement_start(s: &Stream, p: usize) -> bool {
    p == 0 || s.newline_before(p) || s.prev_is(p, ";") || s.prev_is(p, "{") || s.prev_is(p, "}")
}

/// Start of the declaration whose keyword is at `p`, including `export` and
/// `declare` prefixes, when it begins a statement.
fn declaration_start(s: &Stream, p: usize) -> Option<usize> {
    let mut start = p;
    while s.prev_is(start, "export") || s.prev_is(start, "declare") {
        start -= 1;
    }
    at_statement_start(s, start).then_some(start)
}

pub(crate) fn parameter_annotations(src: &str) -> String {
    let mut s = Stream::new(src);
    for open in 0..s.len() {
        if !is_parameter_list(&s, open) {
            continue;
        }
        let Some(params) = parse_params(&s, open) else {
            continue;
        };
        for (n, param) in params.iter().enumerate() {
            if param.annotation.is_some() && param.name(&s) == Some("this") {
                // `this` parameters only exist in the type system
                if s.is(param.end, ",") {
                    s.remove_keyword(param.start, param.end);
                } else if n > 0 {
                    s.remove(param.start - 1, param.end - 1);
                } else {
                    s.remove(param.start, param.end - 1);
                }
                continue;
            }
            if let Some(q) = param.optional {
                s.remove(q, q);
            }
            if let Some((from, to)) = param.annotation {
                s.remove_suffix(from, to);
            }
        }
    }
    s.render()
}

/// Annotations on `let`, `const` and `var` declarators. With `arrays_only`
/// only annotations ending in `[]` are removed.
pub(crate) fn variable_annotations(src: &str, arrays_only: bool) -> String {
    let mut s = Stream::new(src);
    for p in 0..s.len() {
        if !matches!(s.text(p), "let" | "const" | "var") || !s.is_word(p) || s.prev_is(p, ".") {
            continue;
        }
        let mut i = p + 1;
        loop {
            let binding_end = if s.is_word(i) && !is_keyword(s.text(i)) {
                i
            } else if s.is(i, "{") || s.is(i, "[") {
                match s.matching(i) {
                    Some(m) => m,
                    None => break,
                }
            } else {
                break;
            };
            i = binding_end + 1;

            let definite = (s.is(i, "!") && s.is(i + 1, ":")).then_some(i);
            if definite.is_some() {
                i += 1;
            }
            if s.is(i, ":") {
                let Some(end) = skip_type(&s, i + 1) else {
                    break;
                };
                let is_array = s.is(end - 1, "]") && s.is(end - 2, "[");
                if !arrays_only || is_array {
                    if let Some(d) = definite {
                        s.remove(d, d);
                    }
                    s.remove_suffix(i, end - 1);
                }
                i = end;
            }
            if s.is(i, "=") {
                i = skip_initializer(&s, i + 1);
            }
            if !s.is(i, ",") {
                break;
            }
            i += 1;
        }
    }
    s.render()
}

pub(crate) fn arrow_return_types(src: &str) -> String {
    let mut s = Stream::new(src);
    for q in 0..s.len() {
        if !s.is(q, ")") || !s.is(q + 1, ":") {
            continue;
        }
        let Some(open) = s.matching_back(q) else {
            continue;
        };
        if s.prev_is(open, "?") || is_call_arguments(&s, open) {
            continue;
        }
        if let Some(end) = skip_type(&s, q + 2) {
            if s.is(end, "=>") {
                s.remove_suffix(q + 1, end - 1);
            }
        }
    }
    s.render()
}

pub(crate) fn function_return_types(src: &str) -> String {
    let mut s = Stream::new(src);
    for q in 0..s.len() {
        if !s.is(q, ")") || !s.is(q + 1, ":") {
            continue;
        }
        let Some(open) = s.matching_back(q) else {
            continue;
        };
        if !is_callable_head(&s, open) {
            continue;
        }
        if let Some(end) = skip_type(&s, q + 2) {
            if s.is(end, "{") {
                s.remove_suffix(q + 1, end - 1);
            }
        }
    }
    s.render()
}

pub(crate) fn type_aliases(src: &str) -> String {
    let mut s = Stream::new(src);
    for p in 0..s.len() {
        if s.text(p) != "type" || !s.is_word(p) || !s.is_word(p + 1) {
            continue;
        }
        let mut q = p + 2;
        if s.is(q, "<") {
            match match_angle(&s, q) {
                Some(close) => q = close + 1,
                None => continue,
            }
        }
        if !s.is(q, "=") {
            continue;
        }
        let Some(start) = declaration_start(&s, p) else {
            continue;
        };
        let end = type_alias_end(&s, q + 1);
        s.remove_keyword(start, end);
    }
    s.render()
}

/// Last position belonging to a type alias body starting at `from`.
fn type_alias_end(s: &Stream, from: usize) -> usize {
    let mut angle = 0usize;
    let mut q = from;
    while q < s.len() {
        if q > from && angle == 0 && s.newline_before(q) && !type_continues(s, q) {
            return q - 1;
        }
        if s.kind(q) == Some(TokenKind::Punct) {
            match s.text(q) {
                ";" if angle == 0 => return q,
                "<" => angle += 1,
                ">" => angle = angle.saturating_sub(1),
                "(" | "[" | "{" => {
                    q = s.skip_group(q);
                    continue;
                }
                ")" | "]" | "}" => return q.saturating_sub(1).max(from),
                _ => {}
            }
        }
        q += 1;
    }
    s.len().saturating_sub(1)
}

fn type_continues(s: &Stream, q: usize) -> bool {
    const TRAILING: &[&str] = &[
        "=", "|", "&", "?", ":", "=>", ",", "<", "extends", "keyof", "typeof", "readonly",
    ];
    const LEADING: &[&str] = &["|", "&", "?", ":", "=>", ".", "extends"];
    TRAILING.contains(&s.text(q - 1)) || LEADING.contains(&s.text(q))
}

/// Interface declarations, removed through the balanced closing brace.
pub(crate) fn interfaces(src: &str) -> String {
    let mut s = Stream::new(src);
    for p in 0..s.len() {
        if s.text(p) != "interface" || !s.is_word(p) || !s.is_word(p + 1) {
            continue;
        }
        let Some(start) = declaration_start(&s, p) else {
            continue;
        };
        let mut q = p + 2;
        while q < s.len() && !s.is(q, "{") && !s.is(q, ";") {
            q = match s.is(q, "<").then(|| match_angle(&s, q)).flatten() {
                Some(close) => close + 1,
                None => q + 1,
            };
        }
        if !s.is(q, "{") {
            continue;
        }
        if let Some(close) = s.matching(q) {
            s.remove_keyword(start, close);
        }
    }
    s.render()
}

/// Type parameter and type argument lists on declarations and calls.
pub(crate) fn generic_parameters(src: &str) -> String {
    let mut s = Stream::new(src);
    for q in 1..s.len() {
        if !s.is(q, "<") {
            continue;
        }
        let Some(close) = match_angle(&s, q) else {
            continue;
        };
        let after = close + 1;
        let named = s.is_word(q - 1) && !is_keyword(s.text(q - 1));

        let generic = if named {
            s.is(after, "(")
                || s.prev_is(q - 1, "class")
                || s.prev_is(q - 1, "extends")
                || s.prev_is(q - 1, "interface")
        } else {
            // <T>(x) => x
            s.is(after, "(") && s.matching(after).is_some_and(|c| s.is(c + 1, "=>"))
        };
        if generic {
            s.remove(q, close);
        }
    }
    s.render()
}

/// Access modifiers on constructor parameters, without synthesizing fields.
pub(crate) fn constructor_modifiers(src: &str) -> String {
    let mut s = Stream::new(src);
    for p in 0..s.len() {
        if s.text(p) != "constructor" || !s.is(p + 1, "(") {
            continue;
        }
        let Some(params) = parse_params(&s, p + 1) else {
            continue;
        };
        for m in params.iter().flat_map(|param| param.modifiers.iter().copied()) {
            s.remove_keyword(m, m);
        }
    }
    s.render()
}

/// `expr as T` and `expr satisfies T`.
pub(crate) fn type_assertions(src: &str) -> String {
    let mut s = Stream::new(src);
    for q in 1..s.len() {
        if !matches!(s.text(q), "as" | "satisfies") || !s.is_word(q) {
            continue;
        }
        if !is_expression_end(&s, q - 1) || in_module_braces(&s, q) {
            continue;
        }
        if let Some(end) = skip_type(&s, q + 1) {
            s.remove_suffix(q, end - 1);
        }
    }
    s.render()
}

/// `import { a as b }` and `export { a as b }` rename, they do not assert.
fn in_module_braces(s: &Stream, q: usize) -> bool {
    let Some(open) = s.enclosing_open(q) else {
        return false;
    };
    if !s.is(open, "{") {
        return false;
    }
    s.prev_is(open, "import")
        || s.prev_is(open, "export")
        || s.prev_is(open, "type")
        || (s.prev_is(open, ",") && open >= 2 && s.prev_is(open - 2, "import"))
}

/// Postfix `!` directly after an expression.
pub(crate) fn non_null_assertions(src: &str) -> String {
    let mut s = Stream::new(src);
    for q in 1..s.len() {
        if s.kind(q) != Some(TokenKind::Punct) || s.text(q) != "!" || s.gap_before(q) {
            continue;
        }
        let prev = q - 1;
        let operand = match s.kind(prev) {
            Some(TokenKind::Ident) => !is_keyword(s.text(prev)),
            Some(TokenKind::Punct) => matches!(s.text(prev), ")" | "]"),
            _ => false,
        };
        if operand {
            s.remove(q, q);
        }
    }
    s.render()
}
