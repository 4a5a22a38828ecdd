//! End-to-end lowering tests: build a function through the IR factories,
//! compile it, and compare the formatter output against the expected
//! flattened form, byte for byte.

use kiln_ir::types::Kind;
use kiln_ir::{fmt, Arch, Func, Imm, Node, Op2, OpStmt2};
use kiln_jit::{Compiler, ErrorKind, Opt};

fn compile(f: &mut Func) -> Compiler {
    let mut comp = Compiler::new();
    assert!(comp.compile(f, Opt::ALL), "errors: {:?}", comp.errors());
    comp
}

fn compiled_text(f: &Func) -> String {
    let body = f.get_compiled(Arch::NoArch).expect("compiled body");
    fmt::to_string(body, f.code())
}

/// uint64_t fib(uint64_t n) {
///   if (n > 2) { return f(n-1) + f(n-2); } else { return 1; }
/// }
fn build_fib() -> Func {
    let kind = Kind::Uint64;
    let mut f = Func::new("fib", &[kind], &[kind]);
    let n = f.param(0);
    let one = f.new_imm(Imm::new(kind, 1));
    let two = f.new_imm(Imm::new(kind, 2));
    let ftype = f.ftype();
    let entry = f.label();

    let cond = f.new_binary(Op2::Gtr, n, two);
    let n_minus_1 = f.new_binary(Op2::Sub, n, one);
    let call1 = f.new_call(ftype, entry, &[n_minus_1]);
    let n_minus_2 = f.new_binary(Op2::Sub, n, two);
    let call2 = f.new_call(ftype, entry, &[n_minus_2]);
    let sum = f.new_binary(Op2::Add, call1, call2);
    let ret_sum = f.new_return(&[sum]);
    let ret_one = f.new_return(&[one]);
    let body = f.new_if(cond, ret_sum, Some(ret_one));
    f.set_body(body);
    f
}

#[test]
fn fib_body_text() {
    let f = build_fib();
    assert_eq!(
        fmt::to_string(f.body(), f.code()),
        "(if (> var1000_ul 2)\n\
    (return (+ (call label_0 (- var1000_ul 1)) (call label_0 (- var1000_ul 2))))\n\
    (return 1))"
    );
}

#[test]
fn fib_compiled_text() {
    let mut f = build_fib();
    compile(&mut f);
    assert_eq!(
        compiled_text(&f),
        "(block\n\
    (asm_cmp var1000_ul 2)\n\
    (asm_jbe label_1)\n\
    (= var1002_ul (- var1000_ul 1))\n\
    (= var1003_ul (call label_0 var1002_ul))\n\
    (= var1004_ul (- var1000_ul 2))\n\
    (= var1005_ul (call label_0 var1004_ul))\n\
    (= var1001_ul (+ var1003_ul var1005_ul))\n\
    (return var1001_ul)\n\
    (goto label_2)\n\
    label_1\n\
    (= var1001_ul 1)\n\
    (return var1001_ul)\n\
    label_2)"
    );
}

/// uint64_t loop(uint64_t n) {
///   uint64_t total = 0, i;
///   for (i = 0; i < n; i++) { total += i; }
///   return total;
/// }
fn build_loop() -> Func {
    let kind = Kind::Uint64;
    let mut f = Func::new("loop", &[kind], &[kind]);
    let n = f.param(0);
    let total = f.result(0);
    let i = f.new_var(kind);
    let zero = f.new_imm(Imm::new(kind, 0));

    let init_total = f.new_assign(OpStmt2::Assign, total, zero);
    let init_i = f.new_assign(OpStmt2::Assign, i, zero);
    let test = f.new_binary(Op2::Lss, i, n);
    let post = f.new_inc(i);
    let step = f.new_assign(OpStmt2::AddAssign, total, i);
    let loop_ = f.new_for(init_i, test, post, step);
    let ret = f.new_return(&[total]);
    let body = f.new_block(&[init_total, loop_, ret]);
    f.set_body(body);
    f
}

#[test]
fn loop_body_text() {
    let f = build_loop();
    assert_eq!(
        fmt::to_string(f.body(), f.code()),
        "(block\n\
    (= var1001_ul 0)\n\
    (for (= var1002_ul 0) (< var1002_ul var1000_ul) (++ var1002_ul)\n\
        (+= var1001_ul var1002_ul))\n\
    (return var1001_ul))"
    );
}

#[test]
fn loop_compiled_text() {
    let mut f = build_loop();
    compile(&mut f);
    assert_eq!(
        compiled_text(&f),
        "(block\n\
    (= var1001_ul 0)\n\
    (= var1002_ul 0)\n\
    (goto label_2)\n\
    label_1\n\
    (+= var1001_ul var1002_ul)\n\
    (++ var1002_ul)\n\
    label_2\n\
    (asm_cmp var1002_ul var1000_ul)\n\
    (asm_jb label_1)\n\
    label_3\n\
    (return var1001_ul))"
    );
}

/// Switch with the default last: case bodies get labels so fallthrough
/// has somewhere to land, cases break implicitly.
#[test]
fn switch_compiled_text() {
    let kind = Kind::Uint64;
    let mut f = Func::new("fswitch1", &[kind], &[kind]);
    let n = f.param(0);
    let ret = f.result(0);
    let zero = f.new_imm(Imm::new(kind, 0));
    let one = f.new_imm(Imm::new(kind, 1));
    let two = f.new_imm(Imm::new(kind, 2));

    let a1 = f.new_assign(OpStmt2::Assign, ret, one);
    let case0 = f.new_case(zero, a1);
    let a2 = f.new_assign(OpStmt2::Assign, ret, two);
    let case1 = f.new_case(one, a2);
    let sum = f.new_binary(Op2::Add, n, one);
    let a3 = f.new_assign(OpStmt2::Assign, ret, sum);
    let default = f.new_default(a3);
    let switch = f.new_switch(n, &[case0, case1, default]);
    let ret_stmt = f.new_return(&[ret]);
    let body = f.new_block(&[switch, ret_stmt]);
    f.set_body(body);

    assert_eq!(
        fmt::to_string(f.body(), f.code()),
        "(block\n\
    (switch\n\
        var1000_ul\n\
        (case 0 (= var1001_ul 1))\n\
        (case 1 (= var1001_ul 2))\n\
        (default (= var1001_ul (+ var1000_ul 1))))\n\
    (return var1001_ul))"
    );

    compile(&mut f);
    assert_eq!(
        compiled_text(&f),
        "(block\n\
    (asm_cmp var1000_ul 0)\n\
    (asm_jne label_2)\n\
    (= var1001_ul 1)\n\
    (goto label_1)\n\
    label_2\n\
    (asm_cmp var1000_ul 1)\n\
    (asm_jne label_4)\n\
    label_3\n\
    (= var1001_ul 2)\n\
    (goto label_1)\n\
    label_4\n\
    label_5\n\
    (= var1001_ul (+ var1000_ul 1))\n\
    label_1\n\
    (return var1001_ul))"
    );
}

/// Switch with the default in the middle: the default body is skipped
/// over with a goto and reached through its body label once every
/// compare has failed, preserving its source position.
#[test]
fn switch_default_in_middle_compiled_text() {
    let kind = Kind::Uint64;
    let mut f = Func::new("fswitch2", &[kind], &[kind]);
    let n = f.param(0);
    let ret = f.result(0);
    let zero = f.new_imm(Imm::new(kind, 0));
    let one = f.new_imm(Imm::new(kind, 1));
    let two = f.new_imm(Imm::new(kind, 2));

    let a1 = f.new_assign(OpStmt2::Assign, ret, one);
    let case0 = f.new_case(zero, a1);
    let sum = f.new_binary(Op2::Add, n, one);
    let a2 = f.new_assign(OpStmt2::Assign, ret, sum);
    let default = f.new_default(a2);
    let a3 = f.new_assign(OpStmt2::Assign, ret, two);
    let case1 = f.new_case(one, a3);
    let switch = f.new_switch(n, &[case0, default, case1]);
    let ret_stmt = f.new_return(&[ret]);
    let body = f.new_block(&[switch, ret_stmt]);
    f.set_body(body);

    compile(&mut f);
    assert_eq!(
        compiled_text(&f),
        "(block\n\
    (asm_cmp var1000_ul 0)\n\
    (asm_jne label_2)\n\
    (= var1001_ul 1)\n\
    (goto label_1)\n\
    label_2\n\
    (goto label_4)\n\
    label_3\n\
    (= var1001_ul (+ var1000_ul 1))\n\
    (goto label_1)\n\
    label_4\n\
    (asm_cmp var1000_ul 1)\n\
    (asm_jne label_3)\n\
    label_5\n\
    (= var1001_ul 2)\n\
    label_1\n\
    (return var1001_ul))"
    );
}

/// An if/else-if chain; the guaranteed-true final arm still compares
/// against false (no peephole).
#[test]
fn cond_compiled_text() {
    let kind = Kind::Uint64;
    let mut f = Func::new("fcond", &[kind], &[kind]);
    let n = f.param(0);
    let ret = f.result(0);
    let zero = f.new_imm(Imm::new(kind, 0));
    let one = f.new_imm(Imm::new(kind, 1));
    let two = f.new_imm(Imm::new(kind, 2));

    let c1 = f.new_binary(Op2::Eql, n, zero);
    let b1 = f.new_assign(OpStmt2::Assign, ret, one);
    let c2 = f.new_binary(Op2::Eql, n, one);
    let b2 = f.new_assign(OpStmt2::Assign, ret, two);
    let sum = f.new_binary(Op2::Add, n, one);
    let b3 = f.new_assign(OpStmt2::Assign, ret, sum);
    let cond = f.new_cond(&[c1, b1, c2, b2, Node::TRUE, b3]);
    let ret_stmt = f.new_return(&[ret]);
    let body = f.new_block(&[cond, ret_stmt]);
    f.set_body(body);

    assert_eq!(
        fmt::to_string(f.body(), f.code()),
        "(block\n\
    (cond\n\
        (== var1000_ul 0)\n\
        (= var1001_ul 1)\n\
        (== var1000_ul 1)\n\
        (= var1001_ul 2)\n\
        true\n\
        (= var1001_ul (+ var1000_ul 1)))\n\
    (return var1001_ul))"
    );

    compile(&mut f);
    assert_eq!(
        compiled_text(&f),
        "(block\n\
    (asm_cmp var1000_ul 0)\n\
    (asm_jne label_2)\n\
    (= var1001_ul 1)\n\
    (goto label_1)\n\
    label_2\n\
    (asm_cmp var1000_ul 1)\n\
    (asm_jne label_3)\n\
    (= var1001_ul 2)\n\
    (goto label_1)\n\
    label_3\n\
    (asm_cmp true false)\n\
    (asm_je label_1)\n\
    (= var1001_ul (+ var1000_ul 1))\n\
    label_1\n\
    (return var1001_ul))"
    );
}

#[test]
fn compilation_is_idempotent() {
    // Two fresh builds lower to identical text.
    let mut a = build_fib();
    let mut b = build_fib();
    compile(&mut a);
    compile(&mut b);
    assert_eq!(compiled_text(&a), compiled_text(&b));

    // Recompiling an already compiled function is a no-op.
    let before = compiled_text(&a);
    let mut comp = Compiler::new();
    assert!(comp.compile(&mut a, Opt::ALL));
    assert_eq!(compiled_text(&a), before);
}

#[test]
fn loop_lowers_to_x64() {
    let mut f = build_loop();
    let mut comp = Compiler::new();
    assert!(comp.compile_x64(&mut f, Opt::ALL), "errors: {:?}", comp.errors());
    let body = f.get_compiled(Arch::X64).expect("x64 body");
    assert_eq!(
        fmt::to_string(body, f.code()),
        "(block\n\
    (x86_mov var1001_ul 0)\n\
    (x86_mov var1002_ul 0)\n\
    (x86_jmp label_2)\n\
    label_1\n\
    (x86_add var1001_ul var1002_ul)\n\
    (x86_inc var1002_ul)\n\
    label_2\n\
    (x86_cmp var1002_ul var1000_ul)\n\
    (x86_jb label_1)\n\
    label_3\n\
    (x86_ret var1001_ul))"
    );
}

#[test]
fn x64_pass_records_errors_instead_of_aborting() {
    // Calls have no x86-64 lowering rule in the subset; the pass must
    // still terminate with a body plus diagnostics.
    let mut f = build_fib();
    let mut comp = Compiler::new();
    assert!(!comp.compile_x64(&mut f, Opt::ALL));
    assert!(comp
        .errors()
        .iter()
        .any(|e| e.kind() == ErrorKind::UnsupportedLowering));
    assert!(f.get_compiled(Arch::X64).is_some());
}

#[test]
fn rem_assign_synthesis() {
    let kind = Kind::Uint64;
    let mut f = Func::new("frem", &[kind, kind], &[]);
    let x = f.param(0);
    let y = f.param(1);
    let stmt = f.new_assign(OpStmt2::RemAssign, x, y);
    let body = f.new_block(&[stmt]);
    f.set_body(body);

    let mut comp = Compiler::new();
    assert!(comp.compile_x64(&mut f, Opt::ALL), "errors: {:?}", comp.errors());
    let x64 = f.get_compiled(Arch::X64).expect("x64 body");
    assert_eq!(
        fmt::to_string(x64, f.code()),
        "(block\n\
    (x86_mov var1002_ul var1000_ul)\n\
    (x86_div var1002_ul var1001_ul)\n\
    (x86_mul var1002_ul var1001_ul)\n\
    (x86_sub var1000_ul var1002_ul))"
    );
}

#[test]
fn break_outside_loop_is_recorded() {
    let mut f = Func::new("stray", &[], &[]);
    let body = f.new_block(&[Node::BREAK]);
    f.set_body(body);

    let mut comp = Compiler::new();
    assert!(!comp.compile(&mut f, Opt::ALL));
    assert_eq!(comp.errors().len(), 1);
    assert!(matches!(
        comp.errors()[0].kind(),
        ErrorKind::UnresolvedControlFlow(_)
    ));
    // The pass still terminates and produces a (possibly empty) body.
    assert!(f.get_compiled(Arch::NoArch).is_some());
}

#[test]
fn continue_runs_the_post_statement() {
    // for (i = 0; i < n; i++) { if (i == 3) continue; total += i; }
    let kind = Kind::Uint64;
    let mut f = Func::new("fcontinue", &[kind], &[kind]);
    let n = f.param(0);
    let total = f.result(0);
    let i = f.new_var(kind);
    let zero = f.new_imm(Imm::new(kind, 0));
    let three = f.new_imm(Imm::new(kind, 3));

    let init = f.new_assign(OpStmt2::Assign, i, zero);
    let test = f.new_binary(Op2::Lss, i, n);
    let post = f.new_inc(i);
    let is_three = f.new_binary(Op2::Eql, i, three);
    let skip = f.new_if(is_three, Node::CONTINUE, None);
    let step = f.new_assign(OpStmt2::AddAssign, total, i);
    let inner = f.new_block(&[skip, step]);
    let loop_ = f.new_for(init, test, post, inner);
    let ret = f.new_return(&[total]);
    let body = f.new_block(&[loop_, ret]);
    f.set_body(body);

    compile(&mut f);
    // label_1 body, label_2 test, label_3 break are allocated first;
    // label_4 is the if-end, label_5 the lazily allocated continue
    // target, emitted between the body and the post statement.
    assert_eq!(
        compiled_text(&f),
        "(block\n\
    (= var1002_ul 0)\n\
    (goto label_2)\n\
    label_1\n\
    (asm_cmp var1002_ul 3)\n\
    (asm_jne label_4)\n\
    (goto label_5)\n\
    label_4\n\
    (+= var1001_ul var1002_ul)\n\
    label_5\n\
    (++ var1002_ul)\n\
    label_2\n\
    (asm_cmp var1002_ul var1000_ul)\n\
    (asm_jb label_1)\n\
    label_3\n\
    (return var1001_ul))"
    );
}

#[test]
fn short_circuit_rewrites_to_if_form() {
    // return a && b  — lowered through a fresh Bool var and an if.
    let mut f = Func::new("fland", &[Kind::Bool, Kind::Bool], &[Kind::Bool]);
    let a = f.param(0);
    let b = f.param(1);
    let land = f.new_binary(Op2::Land, a, b);
    let ret = f.new_return(&[land]);
    f.set_body(ret);

    compile(&mut f);
    assert_eq!(
        compiled_text(&f),
        "(block\n\
    (asm_cmp var1000_t false)\n\
    (asm_je label_1)\n\
    (= var1003_t var1001_t)\n\
    (goto label_2)\n\
    label_1\n\
    (= var1003_t false)\n\
    label_2\n\
    (= var1002_t var1003_t)\n\
    (return var1002_t))"
    );
}

#[test]
fn fold_constants_folds_literal_arithmetic() {
    let kind = Kind::Uint64;
    let mut f = Func::new("ffold", &[], &[kind]);
    let ret = f.result(0);
    let six = f.new_imm(Imm::new(kind, 6));
    let seven = f.new_imm(Imm::new(kind, 7));
    let product = f.new_binary(Op2::Mul, six, seven);
    let assign = f.new_assign(OpStmt2::Assign, ret, product);
    let ret_stmt = f.new_return(&[ret]);
    let body = f.new_block(&[assign, ret_stmt]);
    f.set_body(body);

    compile(&mut f);
    assert_eq!(
        compiled_text(&f),
        "(block\n\
    (= var1000_ul 42)\n\
    (return var1000_ul))"
    );
}

#[test]
fn discarded_expression_statement_leaves_no_dead_stores() {
    // A composite pure expression in statement position evaluates
    // nothing and hoists nothing: no dead intermediate stores may reach
    // the lowered body.
    let kind = Kind::Uint64;
    let mut f = Func::new("fdiscard", &[kind], &[kind]);
    let n = f.param(0);
    let one = f.new_imm(Imm::new(kind, 1));
    let a = f.new_binary(Op2::Add, n, one);
    let b = f.new_binary(Op2::Sub, n, one);
    let sum = f.new_binary(Op2::Add, a, b);
    let ret = f.new_return(&[n]);
    let body = f.new_block(&[sum, ret]);
    f.set_body(body);

    compile(&mut f);
    assert_eq!(
        compiled_text(&f),
        "(block\n\
    (= var1001_ul var1000_ul)\n\
    (return var1001_ul))"
    );
}

#[test]
fn discarded_expression_still_evaluates_calls() {
    // Calls buried in a discarded expression still execute, as
    // destination-less assign-calls.
    let kind = Kind::Uint64;
    let mut f = Func::new("feffect", &[kind], &[kind]);
    let n = f.param(0);
    let one = f.new_imm(Imm::new(kind, 1));
    let ftype = f.ftype();
    let entry = f.label();
    let call = f.new_call(ftype, entry, &[n]);
    let sum = f.new_binary(Op2::Add, call, one);
    let ret = f.new_return(&[n]);
    let body = f.new_block(&[sum, ret]);
    f.set_body(body);

    compile(&mut f);
    assert_eq!(
        compiled_text(&f),
        "(block\n\
    (= (call label_0 var1000_ul))\n\
    (= var1001_ul var1000_ul)\n\
    (return var1001_ul))"
    );
}

#[test]
fn remove_dead_code_drops_bare_atom_statements() {
    let kind = Kind::Uint64;
    let build = || {
        let mut f = Func::new("fatom", &[kind], &[]);
        let n = f.param(0);
        let body = f.new_block(&[n]);
        f.set_body(body);
        f
    };
    let mut comp = Compiler::new();

    let mut with = build();
    assert!(comp.compile(&mut with, Opt::ALL));
    assert_eq!(compiled_text(&with), "(block)");

    let mut without = build();
    assert!(comp.compile(&mut without, Opt::FOLD_CONSTANTS | Opt::SIMPLIFY_ALGEBRAIC));
    assert_eq!(compiled_text(&without), "(block\n    var1000_ul)");
}

#[test]
fn multi_destination_call_expands_componentwise() {
    let kind = Kind::Uint64;
    let mut f = Func::new("fpair", &[kind], &[kind, kind]);
    let n = f.param(0);
    let r0 = f.result(0);
    let r1 = f.result(1);
    let ftype = f.ftype();
    let entry = f.label();
    let call = f.new_call(ftype, entry, &[n]);
    let stmt = f.new_assign_call(&[r0, r1], call);
    let ret = f.new_return(&[r0, r1]);
    let body = f.new_block(&[stmt, ret]);
    f.set_body(body);

    compile(&mut f);
    assert_eq!(
        compiled_text(&f),
        "(block\n\
    (= var1003_ul var1004_ul (call label_0 var1000_ul))\n\
    (= var1001_ul var1003_ul)\n\
    (= var1002_ul var1004_ul)\n\
    (return var1001_ul var1002_ul))"
    );
}
