//! UB-freeness (spec §8): every expression actually reachable ("taken") in a
//! populated program must evaluate without tripping the abstract
//! interpreter's UB tag — the repair loop is expected to have rebuilt
//! anything that would have.
//!
//! Dead branches of an `if` whose condition is statically zero are exempt:
//! spec §4.I only requires the *live* side of a branch to be UB-free, and
//! `create_stencil`/`grow_arith_expr` may still grow a never-taken else-arm
//! with out-of-range constants for variety.

use cprogen_core::context::EvalCtx;
use cprogen_core::stmt::{Stmt, StmtBlock};
use cprogen_core::value::UbKind;
use cprogen_core::{GenPolicy, Generator};

fn check_block(block: &StmtBlock, ctx: &EvalCtx, bad: &mut Vec<UbKind>) {
    for stmt in &block.stmts {
        check_stmt(stmt, ctx, bad);
    }
}

fn check_stmt(stmt: &Stmt, ctx: &EvalCtx, bad: &mut Vec<UbKind>) {
    match stmt {
        Stmt::ExprStmt(e) => {
            let v = e.evaluate(ctx);
            if v.ub.is_ub() {
                bad.push(v.ub);
            }
        }
        Stmt::DeclStmt { init_expr, .. } => {
            if let Some(e) = init_expr {
                let v = e.evaluate(ctx);
                if v.ub.is_ub() {
                    bad.push(v.ub);
                }
            }
        }
        Stmt::ScopeStmt(b) | Stmt::StmtBlock(b) => check_block(b, ctx, bad),
        Stmt::LoopSeqStmt(loops) => {
            for (_, body) in loops {
                check_block(body, ctx, bad);
            }
        }
        Stmt::LoopNestStmt { body, .. } => check_block(body, ctx, bad),
        Stmt::IfElseStmt {
            cond,
            then_branch,
            else_branch,
        } => {
            let cv = cond.evaluate(ctx);
            if cv.ub.is_ub() {
                bad.push(cv.ub);
            }
            // Only the live side is required to be UB-free.
            if cv.is_true() {
                check_block(then_branch, ctx, bad);
            } else if let Some(else_branch) = else_branch {
                check_block(else_branch, ctx, bad);
            }
        }
        Stmt::StubStmt(_) => {}
    }
}

#[test]
fn taken_statements_never_carry_ub_across_many_seeds() {
    let ctx = EvalCtx::empty();
    for seed in 0..40u64 {
        let mut generator = Generator::new(seed, GenPolicy::default());
        let program = generator.generate();
        let mut bad = Vec::new();
        check_block(&program.root, &ctx, &mut bad);
        assert!(
            bad.is_empty(),
            "seed {seed} left live UB behind: {bad:?}"
        );
    }
}
