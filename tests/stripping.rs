use tsplay::transform::{strip_types, transform, TransformPath};

#[test]
fn strings_and_comments_are_left_alone() {
    let src = "// x: number\nconst s: string = 'a: b as c';\nconst t = `${s}: interface`;";
    assert_eq!(
        strip_types(src),
        "// x: number\nconst s = 'a: b as c';\nconst t = `${s}: interface`;"
    );
}

#[test]
fn nested_interface_is_removed_whole() {
    let src = "interface Outer {\n  inner: { a: number; b: { c: string } };\n}\nconsole.log('after');";
    assert_eq!(strip_types(src), "\nconsole.log('after');");
}

#[test]
fn generics_assertions_and_non_null() {
    let src = "function id<T>(x: T): T { return x; }\nconst el = id<number>(5) as number;\nconst m = new Map<string, number>();\nconsole.log(m.get('k')!, el);";
    assert_eq!(
        strip_types(src),
        "function id(x) { return x; }\nconst el = id(5);\nconst m = new Map();\nconsole.log(m.get('k'), el);"
    );
}

#[test]
fn comparisons_are_not_generics() {
    let src = "const a: number = 1, b: number = 2;\nconsole.log(a < b, b > a);";
    assert_eq!(strip_types(src), "const a = 1, b = 2;\nconsole.log(a < b, b > a);");
}

#[test]
fn plain_class_stays_on_plain_path() {
    let src = "class A {\n  run() { return 1; }\n}";
    let result = transform(src);
    assert_eq!(result.path, TransformPath::PlainStrip);
    assert_eq!(result.script, src);
}

#[test]
fn class_fields_and_modifiers() {
    let src = "class Counter {\n  private count: number = 0;\n  static readonly step: number = 1;\n  label?: string;\n  inc(): void { this.count += Counter.step; }\n}";
    let result = transform(src);
    assert_eq!(result.path, TransformPath::ClassAware);
    assert_eq!(
        result.script,
        "class Counter {\n  count = 0;\n  static step = 1;\n  label;\n  inc() { this.count += Counter.step; }\n}"
    );
}
