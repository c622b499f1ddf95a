//! Statements of the loop-nest AST.
//!
//! The translator walks [`AstStmt`]: every statement carries a link to its
//! next sibling, and loops, guards and blocks carry a nested body list.
//! [`AstNode`] is the same tree with plain vectors, which is what kernel
//! descriptions contain; [`AstStmt::from_nodes`] links it up.

use crate::ast::expr::{AffineExpr, Equation};
use crate::scop::PbbId;
use crate::utils::intern::Symbol;
use serde::{Serialize, Deserialize};

/// A statement and the rest of its sibling list.
#[derive(Debug, Clone, PartialEq)]
pub struct AstStmt {
    pub kind: AstKind,
    pub next: Option<Box<AstStmt>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AstKind {
    /// Head of a generated program
    Root,
    User(UserStmt),
    For(ForStmt),
    Guard(GuardStmt),
    Block { body: Option<Box<AstStmt>> },
}

/// One execution of a statement instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserStmt {
    pub statement: PbbId,
    /// Value of each original loop iterator, outermost first
    #[serde(default)]
    pub substitutions: Vec<Assignment>,
}

/// `lhs = rhs`; `lhs` names the original iterator when known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    #[serde(default)]
    pub lhs: Option<Symbol>,
    pub rhs: AffineExpr,
}

/// `for (iterator = lb; iterator <= ub; iterator += stride) body`
#[derive(Debug, Clone, PartialEq)]
pub struct ForStmt {
    pub iterator: Symbol,
    pub lb: AffineExpr,
    pub ub: AffineExpr,
    pub stride: i64,
    pub body: Option<Box<AstStmt>>,
}

/// `if (eq0 && eq1 && ...) then`
#[derive(Debug, Clone, PartialEq)]
pub struct GuardStmt {
    pub eqs: Vec<Equation>,
    pub then: Option<Box<AstStmt>>,
}

impl AstStmt {
    pub fn new(kind: AstKind) -> Self {
        Self { kind, next: None }
    }

    /// Link statements into a sibling list, preserving order.
    pub fn chain(stmts: Vec<AstStmt>) -> Option<Box<AstStmt>> {
        let mut head: Option<Box<AstStmt>> = None;
        for mut stmt in stmts.into_iter().rev() {
            stmt.next = head;
            head = Some(Box::new(stmt));
        }
        head
    }

    /// A program: a root statement followed by `nodes`.
    pub fn from_nodes(nodes: Vec<AstNode>) -> AstStmt {
        let mut root = AstStmt::new(AstKind::Root);
        root.next = Self::link(nodes);
        root
    }

    fn link(nodes: Vec<AstNode>) -> Option<Box<AstStmt>> {
        Self::chain(nodes.into_iter().map(AstStmt::from).collect())
    }

    /// This statement and its following siblings.
    pub fn siblings(&self) -> Siblings<'_> {
        Siblings { cur: Some(self) }
    }

    /// First user statement reached by descending into first children.
    ///
    /// Used to pick the statement whose domain types a loop's iterator. A
    /// loop like `for i { if (i == 0) S1; S2; }` yields `S1`, whose domain
    /// may be narrower than the loop.
    pub fn first_user(&self) -> Option<&UserStmt> {
        for stmt in self.siblings() {
            let found = match &stmt.kind {
                AstKind::Root => None,
                AstKind::User(user) => Some(user),
                AstKind::For(f) => f.body.as_deref().and_then(AstStmt::first_user),
                AstKind::Guard(g) => g.then.as_deref().and_then(AstStmt::first_user),
                AstKind::Block { body } => body.as_deref().and_then(AstStmt::first_user),
            };
            if found.is_some() {
                return found;
            }
        }
        None
    }

    /// Number of `For` statements in this list, nested ones included.
    pub fn count_loops(&self) -> usize {
        self.siblings()
            .map(|stmt| match &stmt.kind {
                AstKind::For(f) => 1 + f.body.as_deref().map_or(0, AstStmt::count_loops),
                AstKind::Guard(g) => g.then.as_deref().map_or(0, AstStmt::count_loops),
                AstKind::Block { body } => body.as_deref().map_or(0, AstStmt::count_loops),
                AstKind::Root | AstKind::User(_) => 0,
            })
            .sum()
    }
}

pub struct Siblings<'a> {
    cur: Option<&'a AstStmt>,
}

impl<'a> Iterator for Siblings<'a> {
    type Item = &'a AstStmt;

    fn next(&mut self) -> Option<&'a AstStmt> {
        let cur = self.cur?;
        self.cur = cur.next.as_deref();
        Some(cur)
    }
}

/// Vector-shaped AST, as found in kernel descriptions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AstNode {
    User(UserStmt),
    For {
        iterator: Symbol,
        lb: AffineExpr,
        ub: AffineExpr,
        #[serde(default = "default_stride")]
        stride: i64,
        #[serde(default)]
        body: Vec<AstNode>,
    },
    Guard {
        eqs: Vec<Equation>,
        #[serde(default)]
        then: Vec<AstNode>,
    },
    Block {
        #[serde(default)]
        body: Vec<AstNode>,
    },
}

fn default_stride() -> i64 {
    1
}

impl From<AstNode> for AstStmt {
    fn from(node: AstNode) -> Self {
        let kind = match node {
            AstNode::User(user) => AstKind::User(user),
            AstNode::For { iterator, lb, ub, stride, body } => AstKind::For(ForStmt {
                iterator,
                lb,
                ub,
                stride,
                body: AstStmt::link(body),
            }),
            AstNode::Guard { eqs, then } => AstKind::Guard(GuardStmt {
                eqs,
                then: AstStmt::link(then),
            }),
            AstNode::Block { body } => AstKind::Block { body: AstStmt::link(body) },
        };
        AstStmt::new(kind)
    }
}
