//! Determinism (spec §8): the same seed and policy must always produce a
//! structurally identical program — same statement counts, same evaluated
//! values everywhere.

use cprogen_core::context::EvalCtx;
use cprogen_core::stmt::{Stmt, StmtBlock};
use cprogen_core::{GenPolicy, Generator};

fn collect_values(block: &StmtBlock, out: &mut Vec<i128>) {
    for stmt in &block.stmts {
        collect_stmt_values(stmt, out);
    }
}

fn collect_stmt_values(stmt: &Stmt, out: &mut Vec<i128>) {
    let empty = EvalCtx::empty();
    match stmt {
        Stmt::ExprStmt(e) => out.push(e.evaluate(&empty).value()),
        Stmt::DeclStmt { init_expr, .. } => {
            if let Some(e) = init_expr {
                out.push(e.evaluate(&empty).value());
            }
        }
        Stmt::ScopeStmt(b) | Stmt::StmtBlock(b) => collect_values(b, out),
        Stmt::LoopSeqStmt(loops) => {
            for (_, body) in loops {
                collect_values(body, out);
            }
        }
        Stmt::LoopNestStmt { body, .. } => collect_values(body, out),
        Stmt::IfElseStmt {
            cond,
            then_branch,
            else_branch,
        } => {
            out.push(cond.evaluate(&empty).value());
            collect_values(then_branch, out);
            if let Some(else_branch) = else_branch {
                collect_values(else_branch, out);
            }
        }
        Stmt::StubStmt(_) => {}
    }
}

#[test]
fn identical_seed_and_policy_yield_identical_program() {
    let mut a = Generator::new(123_456, GenPolicy::default());
    let mut b = Generator::new(123_456, GenPolicy::default());

    let prog_a = a.generate();
    let prog_b = b.generate();

    assert_eq!(prog_a.root.stmts.len(), prog_b.root.stmts.len());
    assert_eq!(
        prog_a.input_table.borrow().vars.len(),
        prog_b.input_table.borrow().vars.len()
    );

    let mut values_a = Vec::new();
    let mut values_b = Vec::new();
    collect_values(&prog_a.root, &mut values_a);
    collect_values(&prog_b.root, &mut values_b);
    assert_eq!(values_a, values_b);
}

#[test]
fn different_seeds_usually_produce_different_programs() {
    let mut a = Generator::new(1, GenPolicy::default());
    let mut b = Generator::new(2, GenPolicy::default());

    let prog_a = a.generate();
    let prog_b = b.generate();

    let mut values_a = Vec::new();
    let mut values_b = Vec::new();
    collect_values(&prog_a.root, &mut values_a);
    collect_values(&prog_b.root, &mut values_b);
    assert_ne!(values_a, values_b);
}
