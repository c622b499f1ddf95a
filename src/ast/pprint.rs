//! CLooG-style printing of loop-nest ASTs.

use crate::ast::stmt::{AstKind, AstStmt};
use crate::utils::pretty::{format_list_with, PrettyPrint};
use pretty::{DocAllocator, DocBuilder};

fn list_doc<'a, D: DocAllocator<'a>>(head: Option<&AstStmt>, a: &'a D) -> DocBuilder<'a, D> {
    let mut doc = a.nil();
    let mut first = true;
    for stmt in head.into_iter().flat_map(AstStmt::siblings) {
        if matches!(stmt.kind, AstKind::Root) {
            continue;
        }
        if !first {
            doc = doc.append(a.hardline());
        }
        doc = doc.append(stmt_doc(stmt, a));
        first = false;
    }
    doc
}

fn braced<'a, D: DocAllocator<'a>>(
    header: String,
    body: Option<&AstStmt>,
    a: &'a D,
) -> DocBuilder<'a, D> {
    a.text(header)
        .append(a.text(" {"))
        .append(a.hardline().append(list_doc(body, a)).nest(2))
        .append(a.hardline())
        .append(a.text("}"))
}

fn stmt_doc<'a, D: DocAllocator<'a>>(stmt: &AstStmt, a: &'a D) -> DocBuilder<'a, D> {
    match &stmt.kind {
        AstKind::Root => a.nil(),
        AstKind::User(user) => {
            let args = format_list_with(&user.substitutions, ",", |s| s.rhs.to_string());
            a.text(format!("S{}({});", user.statement.0 + 1, args))
        }
        AstKind::For(f) => {
            let step = if f.stride == 1 {
                format!("{}++", f.iterator)
            } else {
                format!("{}+={}", f.iterator, f.stride)
            };
            let header = format!(
                "for ({it}={lb};{it}<={ub};{step})",
                it = f.iterator,
                lb = f.lb,
                ub = f.ub,
                step = step
            );
            braced(header, f.body.as_deref(), a)
        }
        AstKind::Guard(g) => {
            let cond = format_list_with(&g.eqs, " && ", |e| e.to_string());
            braced(format!("if ({})", cond), g.then.as_deref(), a)
        }
        AstKind::Block { body } => a
            .text("{")
            .append(a.hardline().append(list_doc(body.as_deref(), a)).nest(2))
            .append(a.hardline())
            .append(a.text("}")),
    }
}

impl PrettyPrint for AstStmt {
    /// The statement and all its following siblings.
    fn to_doc<'a, D: DocAllocator<'a>>(&self, allocator: &'a D) -> DocBuilder<'a, D> {
        list_doc(Some(self), allocator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::expr::{AffineExpr, Equation};
    use crate::ast::stmt::{Assignment, AstNode, UserStmt};
    use crate::scop::PbbId;
    use crate::utils::intern::intern;

    #[test]
    fn test_print_nest() {
        let s = AstNode::User(UserStmt {
            statement: PbbId(0),
            substitutions: vec![
                Assignment { lhs: None, rhs: AffineExpr::var("c1") },
                Assignment { lhs: None, rhs: AffineExpr::var("c3") },
            ],
        });
        let guard = AstNode::Guard {
            eqs: vec![Equation::ge(AffineExpr::var("c3"), AffineExpr::constant(1))],
            then: vec![s],
        };
        let nest = AstNode::For {
            iterator: intern("c1"),
            lb: AffineExpr::constant(0),
            ub: AffineExpr::sum(vec![AffineExpr::var("N"), AffineExpr::constant(-1)]),
            stride: 1,
            body: vec![AstNode::For {
                iterator: intern("c3"),
                lb: AffineExpr::constant(0),
                ub: AffineExpr::var("M"),
                stride: 2,
                body: vec![guard],
            }],
        };
        let text = AstStmt::from_nodes(vec![nest]).pretty();
        let expected = "\
for (c1=0;c1<=N-1;c1++) {
  for (c3=0;c3<=M;c3+=2) {
    if (c3 >= 1) {
      S1(c1,c3);
    }
  }
}";
        assert_eq!(text, expected);
    }
}
