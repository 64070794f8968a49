//! Source-to-source instrumentation.
//!
//! Parses a program, wraps every callable body with `__trace.enter` /
//! `__trace.exit` hooks inside `try … finally`, and reroutes timer and
//! promise callbacks through `__trace.bind`. Output is deterministic for a
//! given input.
//!
//! Code built at runtime (`eval`, `Function`) and functions reached
//! through computed keys are passed through untraced.

pub mod rewriter;

use crate::script;
use crate::utils::error::InstrumentError;
use log::{debug, info};
use rewriter::Rewriter;

/// Result of instrumenting one program
///
/// **Public** - handed to the sandbox and printed by the CLI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instrumented {
    /// Rewritten program source
    pub source: String,

    /// Number of function bodies wrapped
    pub functions: usize,

    /// Number of timer / promise registration sites rewritten
    pub schedulers: usize,
}

/// Instrument program source
///
/// **Public** - first step of every run
///
/// # Arguments
/// * `source` - Program text in the script language
///
/// # Returns
/// The rewritten source plus rewrite counts
///
/// # Errors
/// * `InstrumentError::Parse` - The program does not parse; nothing runs
pub fn instrument(source: &str) -> Result<Instrumented, InstrumentError> {
    debug!("Instrumenting {} bytes of source", source.len());

    let mut program = script::parse(source)?;
    let mut rewriter = Rewriter::new();
    rewriter.rewrite_program(&mut program);

    let source = script::print_program(&program);

    info!(
        "Instrumented {} functions and {} scheduling sites",
        rewriter.functions, rewriter.schedulers
    );

    Ok(Instrumented {
        source,
        functions: rewriter.functions,
        schedulers: rewriter.schedulers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn enters(source: &str) -> Vec<String> {
        let out = instrument(source).unwrap().source;
        out.lines()
            .filter_map(|line| {
                let start = line.find("__trace.enter(")?;
                let rest = &line[start + "__trace.enter(".len()..];
                Some(rest[..rest.find(')')?].to_string())
            })
            .collect()
    }

    #[test]
    fn test_wraps_declaration() {
        let out = instrument("function main() { return 1 }").unwrap();
        assert_eq!(
            out.source,
            "function main() {\n    const __trace_id = __trace.enter(\"main\", \"function\");\n    try {\n        return 1;\n    } finally {\n        __trace.exit(__trace_id);\n    }\n}\n"
        );
        assert_eq!(out.functions, 1);
        assert_eq!(out.schedulers, 0);
    }

    #[test]
    fn test_names_from_bindings() {
        let names = enters(
            "const f = () => 1\nobj.g = function () {}\nx = { h: function () {}, k() {} }\nlet n = function own() {}",
        );
        assert_eq!(
            names,
            vec![
                "\"f\", \"function\"",
                "\"g\", \"function\"",
                "\"h\", \"function\"",
                "\"k\", \"function\"",
                "\"own\", \"function\"",
            ]
        );
    }

    #[test]
    fn test_class_members() {
        let names = enters("class Greeter { constructor() {} hello() {} static make() {} }");
        assert_eq!(
            names,
            vec![
                "\"Greeter.constructor\", \"function\"",
                "\"Greeter.hello\", \"function\"",
                "\"Greeter.make\", \"function\"",
            ]
        );
    }

    #[test]
    fn test_arguments_are_callbacks() {
        let names = enters("[1, 2].map(x => x * 2)\nrun(function step() {})");
        assert_eq!(
            names,
            vec!["\"anonymous\", \"callback\"", "\"step\", \"callback\""]
        );
    }

    #[test]
    fn test_timer_and_promise_binding() {
        let out = instrument(
            "setTimeout(() => tick(), 10)\nwindow.setInterval(tick, 5)\np.then(a, b).finally(c)",
        )
        .unwrap();
        assert!(out.source.contains("setTimeout(__trace.bind(() => {"));
        assert!(out.source.contains("\"setTimeout\"), 10);"));
        assert!(out
            .source
            .contains("window.setInterval(__trace.bind(tick, \"setInterval\"), 5);"));
        assert!(out.source.contains(
            "p.then(__trace.bind(a, \"then\"), __trace.bind(b, \"then\")).finally(__trace.bind(c, \"finally\"));"
        ));
        assert_eq!(out.schedulers, 4);
    }

    #[test]
    fn test_async_functions_and_patterns() {
        let out = instrument("async function load() { return 1 }").unwrap();
        assert!(out.source.starts_with(
            "async function load() {\n    const __trace_id = __trace.enter(\"load\", \"function\");"
        ));
        let names = enters(
            "const { size = () => 1 } = opts\nconst [first] = [function () {}]\nconst o = { get total() { return 1 } }",
        );
        assert_eq!(
            names,
            vec![
                "\"size\", \"function\"",
                "\"anonymous\", \"function\"",
                "\"total\", \"function\"",
            ]
        );
    }

    #[test]
    fn test_spread_arguments_are_not_bound() {
        let out = instrument("setTimeout(...args)").unwrap();
        assert!(out.source.contains("setTimeout(...args);"));
        assert_eq!(out.schedulers, 1);
    }

    #[test]
    fn test_arrow_expression_body_becomes_return() {
        let out = instrument("const double = x => x * 2").unwrap();
        assert!(out.source.contains("return x * 2;"));
        assert!(out.source.starts_with("const double = (x) => {"));
    }

    #[test]
    fn test_dynamic_code_passes_through() {
        let out = instrument("eval(\"1 + 1\")\nconst f = new Function(\"a\", \"return a\")").unwrap();
        assert_eq!(out.functions, 0);
        assert!(out.source.contains("eval(\"1 + 1\");"));
    }

    #[test]
    fn test_computed_keys_stay_untraced() {
        let out = instrument("o[k] = function () {}\nx = { [k]: () => 1 }").unwrap();
        assert_eq!(out.functions, 0);
    }

    #[test]
    fn test_deterministic() {
        let source = "function a() { b(() => c()) }\nclass K { m() { setTimeout(a, 1) } }";
        assert_eq!(instrument(source).unwrap(), instrument(source).unwrap());
    }

    #[test]
    fn test_parse_error_is_reported() {
        let err = instrument("function (").unwrap_err();
        let InstrumentError::Parse(parse) = err;
        assert_eq!(parse.line, 1);
    }

    #[test]
    fn test_output_reparses() {
        let source = "function outer() { inner() }\nfunction inner() { return [1, 2].filter(x => x > 1) }\nouter()";
        let out = instrument(source).unwrap();
        assert!(script::parse(&out.source).is_ok());
        assert_eq!(out.functions, 3);
    }
}
