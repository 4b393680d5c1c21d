//! Property-based tests for the compiler and VM.
//!
//! - compilation is deterministic and never panics
//! - arithmetic and comparison agree with `f64`
//! - globals and locals hold what was stored in them

use lox::Vm;
use proptest::prelude::*;

/// Runs a program and returns its output, or the error's message.
fn run(source: &str) -> String {
    let mut vm = Vm::with_output(Vec::new());
    match vm.interpret(source) {
        Ok(()) => String::from_utf8(vm.into_output()).unwrap(),
        Err(e) => e.to_string(),
    }
}

fn arb_small_int() -> impl Strategy<Value = i32> {
    -1000i32..1000i32
}

/// Fragments which, glued together, make mostly-plausible programs.
fn arb_fragment() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec![
        "var ", "x", "y", " = ", "1", "2.5", "\"s\"", "nil", "true", "false", "+", "-", "*", "/",
        "==", "!=", "<", ">=", "!", "(", ")", "{", "}", ";", "print ", "if ", "else ", "while ",
        "for ", "and ", "or ", "return ", "\n", "@",
    ])
}

fn arb_program() -> impl Strategy<Value = String> {
    prop::collection::vec(arb_fragment(), 0..40).prop_map(|v| v.concat())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn compile_is_deterministic(source in arb_program()) {
        prop_assert_eq!(lox::compile(&source), lox::compile(&source));
    }

    #[test]
    fn compile_never_panics(source in "[ -~\n]{0,80}") {
        let _ = lox::compile(&source);
    }

    #[test]
    fn failed_compile_reports_lines_in_order(source in arb_program()) {
        if let Err(errors) = lox::compile(&source) {
            prop_assert!(!errors.is_empty());
            let lines: Vec<usize> = errors.iter().map(|e| e.line).collect();
            let mut sorted = lines.clone();
            sorted.sort_unstable();
            prop_assert_eq!(lines, sorted);
        }
    }

    #[test]
    fn arithmetic_matches_f64(a in arb_small_int(), b in arb_small_int()) {
        let (x, y) = (f64::from(a), f64::from(b));
        let source = format!(
            "print {a} + {b}; print {a} - {b}; print {a} * {b};",
            a = x.abs(),
            b = y.abs(),
        );
        let expected = format!("{}\n{}\n{}\n", x.abs() + y.abs(), x.abs() - y.abs(), x.abs() * y.abs());
        prop_assert_eq!(run(&source), expected);
    }

    #[test]
    fn negation_matches_f64(a in arb_small_int(), b in 1i32..1000) {
        let (x, y) = (f64::from(a), f64::from(b));
        let source = format!("print -{} / {};", x.abs(), y);
        prop_assert_eq!(run(&source), format!("{}\n", -x.abs() / y));
    }

    #[test]
    fn comparison_matches_f64(a in 0i32..100, b in 0i32..100) {
        let source = format!(
            "print {a} < {b}; print {a} <= {b}; print {a} > {b}; print {a} >= {b}; print {a} == {b}; print {a} != {b};",
            a = a,
            b = b,
        );
        let expected = format!(
            "{}\n{}\n{}\n{}\n{}\n{}\n",
            a < b, a <= b, a > b, a >= b, a == b, a != b,
        );
        prop_assert_eq!(run(&source), expected);
    }

    #[test]
    fn globals_hold_their_values(name in "[a-z_][a-z_0-9]{0,8}", n in 0u32..100_000) {
        prop_assume!(!is_keyword(&name));
        let mut vm = Vm::with_output(Vec::new());
        vm.interpret(&format!("var {} = {};", name, n)).unwrap();
        prop_assert_eq!(vm.global(&name), Some(&lox::Value::Number(f64::from(n))));
    }

    #[test]
    fn locals_shadow_globals(outer in 0u32..1000, inner in 0u32..1000) {
        let source = format!("var v = {}; {{ var v = {}; print v; }} print v;", outer, inner);
        prop_assert_eq!(run(&source), format!("{}\n{}\n", inner, outer));
    }

    #[test]
    fn concatenation_joins_text(a in "[a-z ]{0,10}", b in "[a-z ]{0,10}") {
        let source = format!("print \"{}\" + \"{}\";", a, b);
        prop_assert_eq!(run(&source), format!("{}{}\n", a, b));
    }
}

fn is_keyword(s: &str) -> bool {
    matches!(
        s,
        "and" | "class" | "else" | "false" | "for" | "fun" | "if" | "nil" | "or" | "print"
            | "return" | "super" | "this" | "true" | "var" | "while"
    )
}
