//! Source-to-script transform: turns type-annotated playground source into
//! script text the engine can run.
//!
//! Two paths exist. The plain path runs the stripping passes in a fixed
//! order. The class-aware path runs the class passes first (heritage,
//! parameter properties, member declarations) and then the plain sequence.
//! Both operate on tokens, so string and template contents, comments and
//! regex literals are never edited.

mod class;
mod passes;
mod stream;
mod token;
mod types;

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

pub use token::{tokenize, Token, TokenKind};

static CLASS_DECLARATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bclass\s+[A-Za-z_$]").unwrap());
static CTOR_PARAMETER_PROPERTY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"constructor\s*\(\s*(?:public|private|protected|readonly)").unwrap()
});
static CLASS_ONLY_SYNTAX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?:extends|static|private|protected|public|readonly|implements|abstract|override|declare)\b",
    )
    .unwrap()
});
// `name: T;`, `name?: T`, `#name!: T` at the start of a line
static FIELD_DECLARATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*#?[A-Za-z_$][\w$]*\s*[?!]?\s*:\s*[\w$\[{(]").unwrap());

/// Which transform produced a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformPath {
    PlainStrip,
    ClassAware,
    /// A recognized pattern; the text is never executed.
    DirectPattern,
    /// A lone untyped `console.log(...)` statement, run as is.
    PassThrough,
}

impl fmt::Display for TransformPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransformPath::PlainStrip => "plain",
            TransformPath::ClassAware => "class-aware",
            TransformPath::DirectPattern => "pattern",
            TransformPath::PassThrough => "pass-through",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformResult {
    pub script: String,
    pub path: TransformPath,
}

/// One stripping step. Order within a path is fixed; later passes assume
/// earlier ones have run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    ParameterAnnotations,
    ArrayVariableAnnotations,
    VariableAnnotations,
    ArrowReturnTypes,
    FunctionReturnTypes,
    TypeAliases,
    Interfaces,
    GenericParameters,
    ConstructorModifiers,
    TypeAssertions,
    NonNullAssertions,
    ClassHeritage,
    ParameterProperties,
    ClassMembers,
}

pub const PLAIN_PASSES: &[Pass] = &[
    Pass::ParameterAnnotations,
    Pass::ArrayVariableAnnotations,
    Pass::VariableAnnotations,
    Pass::ArrowReturnTypes,
    Pass::FunctionReturnTypes,
    Pass::TypeAliases,
    Pass::Interfaces,
    Pass::GenericParameters,
    Pass::ConstructorModifiers,
    Pass::TypeAssertions,
    Pass::NonNullAssertions,
];

/// Runs ahead of [`PLAIN_PASSES`] on the class-aware path.
pub const CLASS_PASSES: &[Pass] = &[Pass::ClassHeritage, Pass::ParameterProperties, Pass::ClassMembers];

impl Pass {
    pub fn apply(self, src: &str) -> String {
        match self {
            Pass::ParameterAnnotations => passes::parameter_annotations(src),
            Pass::ArrayVariableAnnotations => passes::variable_annotations(src, true),
            Pass::VariableAnnotations => passes::variable_annotations(src, false),
            Pass::ArrowReturnTypes => passes::arrow_return_types(src),
            Pass::FunctionReturnTypes => passes::function_return_types(src),
            Pass::TypeAliases => passes::type_aliases(src),
            Pass::Interfaces => passes::interfaces(src),
            Pass::GenericParameters => passes::generic_parameters(src),
            Pass::ConstructorModifiers => passes::constructor_modifiers(src),
            Pass::TypeAssertions => passes::type_assertions(src),
            Pass::NonNullAssertions => passes::non_null_assertions(src),
            Pass::ClassHeritage => class::class_heritage(src),
            Pass::ParameterProperties => class::parameter_properties(src),
            Pass::ClassMembers => class::class_members(src),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Pass::ParameterAnnotations => "parameter-annotations",
            Pass::ArrayVariableAnnotations => "array-variable-annotations",
            Pass::VariableAnnotations => "variable-annotations",
            Pass::ArrowReturnTypes => "arrow-return-types",
            Pass::FunctionReturnTypes => "function-return-types",
            Pass::TypeAliases => "type-aliases",
            Pass::Interfaces => "interfaces",
            Pass::GenericParameters => "generic-parameters",
            Pass::ConstructorModifiers => "constructor-modifiers",
            Pass::TypeAssertions => "type-assertions",
            Pass::NonNullAssertions => "non-null-assertions",
            Pass::ClassHeritage => "class-heritage",
            Pass::ParameterProperties => "parameter-properties",
            Pass::ClassMembers => "class-members",
        }
    }
}

/// A single untyped `console.log(...)` statement runs without any transform.
pub fn is_pass_through(src: &str) -> bool {
    src.trim().starts_with("console.log(") && !src.contains(':')
}

/// Class declarations using syntax the plain passes do not cover.
pub fn needs_class_normalizer(src: &str) -> bool {
    CLASS_DECLARATION.is_match(src)
        && (CTOR_PARAMETER_PROPERTY.is_match(src)
            || CLASS_ONLY_SYNTAX.is_match(src)
            || FIELD_DECLARATION.is_match(src))
}

/// Picks the transform path for `src` and runs it.
pub fn transform(src: &str) -> TransformResult {
    if is_pass_through(src) {
        debug!(path = %TransformPath::PassThrough, "transform selected");
        return TransformResult { script: src.to_string(), path: TransformPath::PassThrough };
    }

    let (path, sequence): (TransformPath, Vec<Pass>) = if needs_class_normalizer(src) {
        (TransformPath::ClassAware, CLASS_PASSES.iter().chain(PLAIN_PASSES).copied().collect())
    } else {
        (TransformPath::PlainStrip, PLAIN_PASSES.to_vec())
    };
    debug!(path = %path, "transform selected");

    let script = sequence.into_iter().fold(src.to_string(), |text, pass| {
        let out = pass.apply(&text);
        if out != text {
            debug!(pass = pass.name(), "pass rewrote script");
        }
        out
    });
    TransformResult { script, path }
}

/// Runs only the plain passes, regardless of content.
pub fn strip_types(src: &str) -> String {
    PLAIN_PASSES.iter().fold(src.to_string(), |text, pass| pass.apply(&text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_through_needs_untyped_log() {
        assert!(is_pass_through("  console.log('hi', 1)\n"));
        assert!(!is_pass_through("console.log({ a: 1 })"));
        assert!(!is_pass_through("let a = 1; console.log(a)"));
        assert_eq!(transform("console.log(1)").path, TransformPath::PassThrough);
    }

    #[test]
    fn class_trigger() {
        assert!(needs_class_normalizer("class A { constructor(private a: number) {} }"));
        assert!(needs_class_normalizer("class B extends A {}"));
        assert!(needs_class_normalizer("class C {\n  x: number = 1;\n}"));
        assert!(!needs_class_normalizer("class D { go() { return 1 } }"));
        assert!(!needs_class_normalizer("const classy = 1; let x: number = 2;"));
    }

    #[test]
    fn plain_program() {
        let src = "interface User {\n  name: string;\n}\n\nfunction greet(user: User): string {\n  return `Hi ${user.name}`;\n}\nconst u: User = { name: 'Ada' } as User;\nconsole.log(greet(u));\n";
        let out = transform(src);
        assert_eq!(out.path, TransformPath::PlainStrip);
        assert_eq!(
            out.script,
            "\n\nfunction greet(user) {\n  return `Hi ${user.name}`;\n}\nconst u = { name: 'Ada' };\nconsole.log(greet(u));\n"
        );
    }

    #[test]
    fn untyped_text_is_unchanged() {
        let src = "const a = [1, 2].map((x) => x * 2);\nconst o = { k: a, t: `x:${a}` };\nif (a.length > 1 && o.k) { console.log(o.k ? 'y' : 'n'); }\nconst t = y ? g(h) : i => i;\nx = a < b ? c : d > (e);\nlet a = b < c, d = e > (f);\n";
        assert_eq!(transform(src).script, src);
        assert_eq!(strip_types(src), src);
    }

    #[test]
    fn class_program() {
        let src = "class Point {\n  constructor(public x: number, public y: number) {}\n  sum(): number { return this.x + this.y; }\n}\n";
        let out = transform(src);
        assert_eq!(out.path, TransformPath::ClassAware);
        assert_eq!(
            out.script,
            "class Point {\n  constructor(x, y) { this.x = x; this.y = y;}\n  sum() { return this.x + this.y; }\n}\n"
        );
    }

    #[test]
    fn path_names() {
        assert_eq!(TransformPath::ClassAware.to_string(), "class-aware");
        assert_eq!(TransformPath::DirectPattern.to_string(), "pattern");
    }
}
