//! This module provides the `Vm` struct, which owns the value stack and the
//! global variables, and executes compiled chunks.

mod exec;

use std::collections::HashMap;
use std::io::{self, Write};
use std::mem;
use std::rc::Rc;

use crate::compiler;
use crate::error::RuntimeErrorKind;
use crate::Chunk;
use crate::Result;
use crate::Value;
use crate::STACK_MAX;

use exec::Frame;

/// A virtual machine. One `Vm` can run any number of chunks in succession;
/// global variables persist between them.
///
/// Program output (`print`) goes to `W`, which is stdout by default.
pub struct Vm<W = io::Stdout> {
    /// Fixed-capacity value stack. Slots at or above `sp` are unused.
    stack: Vec<Value>,
    sp: usize,
    globals: HashMap<Rc<str>, Value>,
    out: W,
}

impl Vm<io::Stdout> {
    pub fn new() -> Self {
        Vm::with_output(io::stdout())
    }
}

impl Default for Vm<io::Stdout> {
    fn default() -> Self {
        Vm::new()
    }
}

impl<W: Write> Vm<W> {
    /// Creates a VM which writes program output to `out`.
    pub fn with_output(out: W) -> Self {
        Vm {
            stack: vec![Value::Nil; STACK_MAX],
            sp: 0,
            globals: HashMap::new(),
            out,
        }
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Looks up a global variable.
    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    /// Compiles and runs `source`. If compilation fails, nothing is run.
    pub fn interpret(&mut self, source: &str) -> Result<()> {
        let chunk = compiler::compile(source)?;
        self.run_chunk(&chunk)
    }

    /// Runs a compiled chunk to completion, or until the first runtime error.
    /// The stack is reset afterwards either way. A malformed chunk, such as
    /// one with a missing operand or an out-of-range constant index, stops
    /// with a runtime error.
    pub fn run_chunk(&mut self, chunk: &Chunk) -> Result<()> {
        let result = Frame::new(chunk).eval(self);
        self.reset_stack();
        result
    }

    fn reset_stack(&mut self) {
        for slot in &mut self.stack[..self.sp] {
            *slot = Value::Nil;
        }
        self.sp = 0;
    }

    // Stack manipulation

    fn push(&mut self, value: Value) -> std::result::Result<(), RuntimeErrorKind> {
        if self.sp == STACK_MAX {
            return Err(RuntimeErrorKind::StackOverflow);
        }
        self.stack[self.sp] = value;
        self.sp += 1;
        Ok(())
    }

    fn pop(&mut self) -> std::result::Result<Value, RuntimeErrorKind> {
        if self.sp == 0 {
            return Err(RuntimeErrorKind::StackUnderflow);
        }
        self.sp -= 1;
        Ok(mem::take(&mut self.stack[self.sp]))
    }

    /// Returns the value `distance` slots down from the top of the stack.
    fn peek(&self, distance: usize) -> std::result::Result<&Value, RuntimeErrorKind> {
        if distance >= self.sp {
            return Err(RuntimeErrorKind::StackUnderflow);
        }
        Ok(&self.stack[self.sp - 1 - distance])
    }

    /// Renders the live part of the stack, for tracing.
    fn stack_listing(&self) -> String {
        self.stack[..self.sp]
            .iter()
            .map(|value| format!("[ {} ]", value))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::Vm;

    use crate::error::RuntimeErrorKind;
    use crate::Chunk;
    use crate::Error;
    use crate::OpCode::*;
    use crate::Value;

    fn run(source: &str) -> (crate::Result<()>, String) {
        let mut vm = Vm::with_output(Vec::new());
        let result = vm.interpret(source);
        let out = String::from_utf8(vm.into_output()).unwrap();
        (result, out)
    }

    fn check_output(source: &str, expected: &str) {
        let (result, out) = run(source);
        result.unwrap();
        assert_eq!(out, expected);
    }

    fn check_runtime_error(source: &str, kind: RuntimeErrorKind) {
        match run(source).0 {
            Err(Error::Runtime(e)) => assert_eq!(e.kind, kind),
            other => panic!("expected a runtime error, got {:?}", other),
        }
    }

    fn chunk(code: Vec<u8>, constants: Vec<Value>) -> Chunk {
        let lines = vec![1; code.len()];
        Chunk {
            code,
            lines,
            constants,
        }
    }

    #[test]
    fn vm_test01() {
        let mut vm = Vm::with_output(Vec::new());
        let input = chunk(
            vec![Constant as u8, 0, DefineGlobal as u8, 1, Return as u8],
            vec![Value::Number(1.0), "a".into()],
        );
        vm.run_chunk(&input).unwrap();
        assert_eq!(Some(&Value::Number(1.0)), vm.global("a"));
    }

    #[test]
    fn vm_test02() {
        let mut vm = Vm::with_output(Vec::new());
        let input = chunk(
            vec![
                Constant as u8, 1,
                Constant as u8, 2,
                Add as u8,
                DefineGlobal as u8, 0,
                Return as u8,
            ],
            vec!["key".into(), "a".into(), "b".into()],
        );
        vm.run_chunk(&input).unwrap();
        assert_eq!(Some(&Value::from("ab")), vm.global("key"));
    }

    #[test]
    fn vm_test03() {
        // JumpIfFalse leaves the condition on the stack.
        let mut vm = Vm::with_output(Vec::new());
        let input = chunk(
            vec![
                False as u8,
                JumpIfFalse as u8, 0, 2,
                Pop as u8,
                True as u8,
                DefineGlobal as u8, 0,
                Return as u8,
            ],
            vec!["key".into()],
        );
        vm.run_chunk(&input).unwrap();
        assert_eq!(Some(&Value::Bool(false)), vm.global("key"));
    }

    #[test]
    fn vm_test04() {
        // Running off the end of the code halts.
        let mut vm = Vm::with_output(Vec::new());
        let input = chunk(vec![Nil as u8, DefineGlobal as u8, 0], vec!["x".into()]);
        vm.run_chunk(&input).unwrap();
        assert_eq!(Some(&Value::Nil), vm.global("x"));
    }

    #[test]
    fn invalid_opcode() {
        let mut vm = Vm::with_output(Vec::new());
        let input = chunk(vec![250], vec![]);
        match vm.run_chunk(&input) {
            Err(Error::Runtime(e)) => assert_eq!(e.kind, RuntimeErrorKind::InvalidOpcode(250)),
            other => panic!("expected a runtime error, got {:?}", other),
        }
    }

    #[test]
    fn precedence() {
        check_output("print 1 + 2 * 3;", "7\n");
        check_output("print (1 + 2) * 3;", "9\n");
        check_output("print 10 - 4 - 3;", "3\n");
        check_output("print 12 / 2 / 3;", "2\n");
        check_output("print -2 * 3 + 1;", "-5\n");
    }

    #[test]
    fn comparison() {
        check_output("print 2 >= 2; print 2 <= 2;", "true\ntrue\n");
        check_output("print 1 >= 2; print 3 <= 2;", "false\nfalse\n");
        check_output("print 1 < 2; print 1 > 2;", "true\nfalse\n");
        check_output("print 1 != 2; print !(1 == 1);", "true\nfalse\n");
    }

    #[test]
    fn equality() {
        check_output("print 1 == 1; print \"a\" == \"a\";", "true\ntrue\n");
        check_output("print nil == false; print 1 == \"1\";", "false\nfalse\n");
        check_output("print nil == nil; print 0 / 0 == 0 / 0;", "true\nfalse\n");
    }

    #[test]
    fn short_circuit() {
        check_output("print false and (1/0);", "false\n");
        check_output("print true or (1/0);", "true\n");
        check_output("print false and (\"a\" - 1);", "false\n");
        check_output("print true or (\"a\" - 1);", "true\n");
        check_output("print nil or 2; print 1 and 2; print nil and 1;", "2\n2\nnil\n");
    }

    #[test]
    fn truthiness() {
        let text = "if (0) print \"t\"; if (\"\") print \"s\"; if (nil) print \"n\"; else print \"e\";";
        check_output(text, "t\ns\ne\n");
        check_output("print !nil; print !0;", "true\nfalse\n");
    }

    #[test]
    fn strings() {
        check_output("print \"a\" + \"b\";", "ab\n");
        check_output("var s = \"x\"; s = s + s; print s + \"!\";", "xx!\n");
    }

    #[test]
    fn scoping() {
        let text = "
            var a = 1;
            { var a = 2; print a; }
            print a;";
        check_output(text, "2\n1\n");

        let text = "{ var a = 1; var b = 2; { var c = a + b; print c; } print a; }";
        check_output(text, "3\n1\n");
    }

    #[test]
    fn assignment_is_an_expression() {
        check_output("var a; var b; a = b = 3; print a; print b;", "3\n3\n");
        check_output("{ var a; var b; a = b = 4; print a + b; }", "8\n");
    }

    #[test]
    fn while_loop() {
        let text = "var i = 3; while (i > 0) { print i; i = i - 1; }";
        check_output(text, "3\n2\n1\n");
    }

    #[test]
    fn for_loop() {
        check_output("for (var i = 0; i < 3; i = i + 1) print i;", "0\n1\n2\n");

        let text = "var n = 0; for (; n < 2;) n = n + 1; print n;";
        check_output(text, "2\n");

        // The loop variable is scoped to the loop.
        check_runtime_error(
            "for (var i = 0; i < 1; i = i + 1) {} print i;",
            RuntimeErrorKind::UndefinedVariable("i".into()),
        );
    }

    #[test]
    fn if_else() {
        check_output("if (1 > 2) print 1; else print 2;", "2\n");
        check_output("if (1 < 2) print 1; else print 2;", "1\n");
        check_output("if (false) print 1; print 3;", "3\n");
    }

    #[test]
    fn undefined_variable() {
        let (result, out) = run("print b;");
        assert_eq!(out, "");
        match result {
            Err(Error::Runtime(e)) => {
                assert_eq!(e.to_string(), "Undefined variable 'b'.\n[line 1] in script");
            }
            other => panic!("expected a runtime error, got {:?}", other),
        }

        check_runtime_error("b = 1;", RuntimeErrorKind::UndefinedVariable("b".into()));
    }

    #[test]
    fn type_errors() {
        check_runtime_error("print \"a\" - 1;", RuntimeErrorKind::OperandsMustBeNumbers);
        check_runtime_error("print 1 < true;", RuntimeErrorKind::OperandsMustBeNumbers);
        check_runtime_error(
            "print 1 + \"a\";",
            RuntimeErrorKind::OperandsMustBeNumbersOrStrings,
        );
        check_runtime_error("print -\"a\";", RuntimeErrorKind::OperandMustBeNumber);
    }

    #[test]
    fn runtime_error_line() {
        match run("var a = 1;\n\nprint a - \"x\";").0 {
            Err(Error::Runtime(e)) => assert_eq!(e.line, 3),
            other => panic!("expected a runtime error, got {:?}", other),
        }
    }

    #[test]
    fn output_before_error_is_kept() {
        let (result, out) = run("print 1; print nope; print 2;");
        assert!(result.unwrap_err().is_runtime_error());
        assert_eq!(out, "1\n");
    }

    #[test]
    fn compile_error_runs_nothing() {
        let (result, out) = run("print 1; print ;");
        assert!(result.unwrap_err().is_compile_error());
        assert_eq!(out, "");
    }

    #[test]
    fn stack_overflow() {
        // 250 locals fill the stack; the pending operands push it past 256.
        let mut text = String::from("{");
        for i in 0..250 {
            text.push_str(&format!("var a{} = 0;", i));
        }
        text.push_str("print 1 + (1 + (1 + (1 + (1 + (1 + (1 + 1)))))); }");
        check_runtime_error(&text, RuntimeErrorKind::StackOverflow);
    }

    #[test]
    fn malformed_chunks() {
        let cases = vec![
            (chunk(vec![Pop as u8], vec![]), RuntimeErrorKind::StackUnderflow),
            (chunk(vec![Print as u8], vec![]), RuntimeErrorKind::StackUnderflow),
            (chunk(vec![Constant as u8], vec![]), RuntimeErrorKind::TruncatedInstruction),
            (chunk(vec![Jump as u8, 0], vec![]), RuntimeErrorKind::TruncatedInstruction),
            (chunk(vec![Constant as u8, 5], vec![]), RuntimeErrorKind::InvalidConstant(5)),
            (chunk(vec![Loop as u8, 0, 9], vec![]), RuntimeErrorKind::InvalidJump),
            (chunk(vec![True as u8, SetLocal as u8, 0, Pop as u8, Pop as u8], vec![]), RuntimeErrorKind::StackUnderflow),
        ];
        for (input, kind) in cases {
            let mut vm = Vm::with_output(Vec::new());
            match vm.run_chunk(&input) {
                Err(Error::Runtime(e)) => assert_eq!(e.kind, kind),
                other => panic!("expected a runtime error, got {:?}", other),
            }
            assert_eq!(vm.sp, 0);
        }
    }

    #[test]
    fn missing_line_numbers() {
        let mut vm = Vm::with_output(Vec::new());
        let input = Chunk {
            code: vec![Pop as u8],
            lines: vec![],
            constants: vec![],
        };
        match vm.run_chunk(&input) {
            Err(Error::Runtime(e)) => assert_eq!(e.line, 0),
            other => panic!("expected a runtime error, got {:?}", other),
        }
    }

    struct ClosedPipe;

    impl io::Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn output_write_error() {
        let mut vm = Vm::with_output(ClosedPipe);
        match vm.interpret("var a = 1; print a;") {
            Err(Error::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("expected an io error, got {:?}", other),
        }
        assert_eq!(vm.sp, 0);
        assert_eq!(vm.global("a"), Some(&Value::Number(1.0)));
    }

    #[test]
    fn reused_across_calls() {
        let mut vm = Vm::with_output(Vec::new());
        vm.interpret("var a = 1;").unwrap();
        vm.interpret("a = a + 1;").unwrap();
        assert!(vm.interpret("print nope;").is_err());
        assert_eq!(vm.sp, 0);
        vm.interpret("print a;").unwrap();
        assert_eq!(vm.output(), b"2\n");
    }
}
