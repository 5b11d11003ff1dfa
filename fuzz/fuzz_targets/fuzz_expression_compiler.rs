#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use slim_runtime::expr::{AttributeExpression, ExpressionCompiler, TextExpression, is_path};
use slim_runtime::RuntimeConfig;

#[derive(Debug, Arbitrary)]
struct Input {
    tag: String,
    name: String,
    value: String,
    text: String,
    custom: Option<String>,
}

fuzz_target!(|input: Input| {
    let mut compiler = ExpressionCompiler::new(&RuntimeConfig::default());
    if let Some(custom) = &input.custom {
        compiler.register_custom(custom.clone());
    }
    let attributes = vec![(input.name.clone(), input.value.clone())];

    match compiler.compile_attribute(&input.tag, &attributes, &input.name, &input.value) {
        Some(AttributeExpression::Property { path }) => assert!(is_path(&path)),
        Some(AttributeExpression::Conditional { path, .. }) => assert!(is_path(&path)),
        Some(AttributeExpression::Repeat(repeat)) => assert!(is_path(&repeat.path)),
        Some(AttributeExpression::Method(call)) => {
            assert!(!call.args.is_empty());
            assert!(call.args.iter().all(|arg| is_path(arg)));
        }
        Some(AttributeExpression::Inject { .. } | AttributeExpression::CustomAttribute { .. }) | None => {}
    }

    for span in compiler.compile_text(&input.text) {
        assert!(input.text.contains(&*span.span));
        match span.expression {
            TextExpression::Path(path) => assert!(is_path(&path)),
            TextExpression::Method(call) => assert!(call.args.iter().all(|arg| is_path(arg))),
        }
    }
});
