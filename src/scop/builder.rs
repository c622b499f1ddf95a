//! Kernels described in JSON.
//!
//! A kernel lists its parameters, a context over them, and statements,
//! each nested in its own loops with affine bounds and writing one array
//! cell from a sum of loads. Building one produces:
//! - the original function as a [`Cfg`], one guarded loop nest per statement
//! - the [`Scop`] covering all of it
//! - a loop-nest AST, either given in the description or derived from the
//!   statement schedules (loops shared by statements with equal static
//!   positions, guards where their bounds differ)
//!
//! Affine expressions are written as text, such as `2*i + N - 1`, and
//! constraints as `N >= 1`.

use crate::ast::{AffineExpr, AstNode, AstStmt, Assignment, Equation, UserStmt};
use crate::ir::cfg::{BlockId, Cfg, EdgeId, Inst, LoopId};
use crate::ir::types::{IntType, Type};
use crate::ir::value::{BinaryOp, CmpOp, Value};
use crate::polyhedral::{Constraint, LinearExpr, Polytope, Space};
use crate::scop::{universe_context, Access, AccessKind, PbbId, PolyBb, Scop, ScopParam};
use crate::utils::errors::{InputError, InputErrorKind, LoopGenResult};
use crate::utils::intern::{intern, Symbol};
use log::debug;
use serde::{Serialize, Deserialize};
use std::collections::HashMap;

/// Type of array elements and indices.
const ELEMENT: Type = Type::Int(IntType { precision: 64, unsigned: false });

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelDesc {
    pub name: String,
    #[serde(default)]
    pub params: Vec<ParamDesc>,
    /// Constraints over the parameters
    #[serde(default)]
    pub context: Vec<String>,
    pub statements: Vec<StatementDesc>,
    /// Loop nest to generate; derived from the schedules when absent
    #[serde(default)]
    pub ast: Option<Vec<AstNode>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamDesc {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: Type,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopDesc {
    pub iterator: String,
    #[serde(rename = "type", default = "default_iv_type")]
    pub ty: Type,
    pub lb: String,
    pub ub: String,
}

fn default_iv_type() -> Type {
    Type::int(64, false)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessDesc {
    pub array: String,
    pub index: String,
}

/// `write = reads[0] + reads[1] + ... + offset`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatementDesc {
    pub name: String,
    #[serde(default)]
    pub loops: Vec<LoopDesc>,
    /// Static scattering positions, one per loop plus one; defaults to
    /// the statement's index followed by zeros
    #[serde(default)]
    pub schedule: Option<Vec<i64>>,
    pub write: AccessDesc,
    #[serde(default)]
    pub reads: Vec<AccessDesc>,
    #[serde(default)]
    pub offset: Option<String>,
}

/// A built kernel.
#[derive(Debug, Clone)]
pub struct Kernel {
    pub cfg: Cfg,
    pub scop: Scop,
    pub ast: AstStmt,
}

/// Bounds and schedule of a statement, as needed to derive an AST.
struct StmtShape {
    id: PbbId,
    beta: Vec<i64>,
    iterators: Vec<Symbol>,
    bounds: Vec<(LinearExpr, LinearExpr)>,
}

fn input_error(kind: InputErrorKind, message: impl Into<String>) -> InputError {
    InputError::new(kind, message)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Num(i64),
    Ident(&'a str),
    Plus,
    Minus,
    Star,
}

fn tokenize(text: &str) -> Result<Vec<Token<'_>>, InputError> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if c.is_ascii_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            let n = text[start..i].parse::<i64>().map_err(|_| {
                input_error(InputErrorKind::NonAffineBound, format!("constant too large in `{}`", text))
            })?;
            tokens.push(Token::Num(n));
        } else if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            tokens.push(Token::Ident(&text[start..i]));
        } else {
            tokens.push(match c {
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => Token::Star,
                _ => {
                    return Err(input_error(
                        InputErrorKind::NonAffineBound,
                        format!("unexpected `{}` in `{}`", c, text),
                    ))
                }
            });
            i += 1;
        }
    }
    Ok(tokens)
}

/// Parse an affine expression over `dims` (iterators, the expression's
/// first dimensions out of `n_dim`) and `params`.
pub fn parse_affine(
    text: &str,
    dims: &[&str],
    params: &[&str],
    n_dim: usize,
) -> Result<LinearExpr, InputError> {
    let non_affine = |msg: &str| input_error(InputErrorKind::NonAffineBound, format!("{} in `{}`", msg, text));
    let tokens = tokenize(text)?;
    let mut expr = LinearExpr::zero(n_dim, params.len());
    let mut pos = 0;
    if tokens.is_empty() {
        return Err(non_affine("empty expression"));
    }

    while pos < tokens.len() {
        let mut sign: i64 = 1;
        while let Some(t @ (Token::Plus | Token::Minus)) = tokens.get(pos) {
            if *t == Token::Minus {
                sign = -sign;
            }
            pos += 1;
        }

        let mut coeff = sign;
        let mut var: Option<&str> = None;
        loop {
            match tokens.get(pos) {
                Some(Token::Num(n)) => {
                    coeff = coeff.checked_mul(*n).ok_or_else(|| non_affine("coefficient overflow"))?;
                }
                Some(Token::Ident(name)) if var.is_none() => var = Some(*name),
                Some(Token::Ident(_)) => return Err(non_affine("product of variables")),
                _ => return Err(non_affine("missing operand")),
            }
            pos += 1;
            if tokens.get(pos) == Some(&Token::Star) {
                pos += 1;
            } else {
                break;
            }
        }

        let slot = match var {
            None => &mut expr.constant,
            Some(name) => {
                if let Some(d) = dims.iter().position(|d| *d == name) {
                    &mut expr.coeffs[d]
                } else if let Some(p) = params.iter().position(|p| *p == name) {
                    &mut expr.param_coeffs[p]
                } else {
                    return Err(input_error(
                        InputErrorKind::UnknownParameter,
                        format!("unknown name `{}` in `{}`", name, text),
                    ));
                }
            }
        };
        *slot = slot.checked_add(coeff).ok_or_else(|| non_affine("coefficient overflow"))?;

        match tokens.get(pos) {
            None | Some(Token::Plus) | Some(Token::Minus) => {}
            Some(_) => return Err(non_affine("missing operator")),
        }
    }
    Ok(expr)
}

/// Parse `lhs >= rhs`, `lhs <= rhs`, `lhs == rhs`, `lhs > rhs` or
/// `lhs < rhs`.
pub fn parse_constraint(
    text: &str,
    dims: &[&str],
    params: &[&str],
    n_dim: usize,
) -> Result<Constraint, InputError> {
    let one = LinearExpr::constant(1, n_dim, params.len());
    for op in [">=", "<=", "==", ">", "<"] {
        if let Some((lhs, rhs)) = text.split_once(op) {
            let lhs = parse_affine(lhs, dims, params, n_dim)?;
            let rhs = parse_affine(rhs, dims, params, n_dim)?;
            return Ok(match op {
                ">=" => Constraint::ge(lhs, rhs),
                "<=" => Constraint::le(lhs, rhs),
                "==" => Constraint::eq(lhs, rhs),
                ">" => Constraint::ge(lhs, rhs + one),
                _ => Constraint::le(lhs + one, rhs),
            });
        }
    }
    Err(input_error(
        InputErrorKind::NonAffineBound,
        format!("no comparison in constraint `{}`", text),
    ))
}

/// Emits the original loop nests.
struct NestBuilder<'a> {
    cfg: &'a mut Cfg,
    params: &'a [Value],
}

impl NestBuilder<'_> {
    /// `e` as a value of type `ty`, iterators read from `ivs`.
    fn linear(&self, e: &LinearExpr, ty: Type, ivs: &[Value]) -> Value {
        let mut acc: Option<Value> = None;
        let terms = e
            .coeffs
            .iter()
            .zip(ivs)
            .chain(e.param_coeffs.iter().zip(self.params))
            .filter(|(c, _)| **c != 0);
        for (&c, v) in terms {
            let term = Value::binary(BinaryOp::Mult, ty, v.clone().convert(ty), Value::constant(ty, c as i128));
            acc = Some(match acc {
                None => term,
                Some(a) => Value::binary(BinaryOp::Plus, ty, a, term),
            });
        }
        let constant = Value::constant(ty, e.constant as i128);
        match acc {
            None => constant,
            Some(a) => Value::binary(BinaryOp::Plus, ty, a, constant),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn nest(
        &mut self,
        s: &StatementDesc,
        bounds: &[(LinearExpr, LinearExpr)],
        accesses: &[Access],
        offset: Option<&LinearExpr>,
        level: usize,
        entry: EdgeId,
        outer: LoopId,
        ivs: &mut Vec<Value>,
        loops: &mut Vec<LoopId>,
    ) -> LoopGenResult<(EdgeId, BlockId)> {
        if level == bounds.len() {
            let bb = self.cfg.split_edge(entry);
            self.body(bb, accesses, offset, ivs);
            return Ok((self.cfg.single_succ_edge(bb)?, bb));
        }
        let desc = &s.loops[level];
        if !matches!(desc.ty, Type::Int(_)) {
            return Err(input_error(
                InputErrorKind::InvalidType,
                format!("loop `{}` must have an integer type, not {}", desc.iterator, desc.ty),
            )
            .into());
        }
        let (lb, ub) = &bounds[level];
        let lb = self.linear(lb, desc.ty, ivs);
        let ub = self.linear(ub, desc.ty, ivs);

        let guard = self
            .cfg
            .create_if_region_on_edge(entry, Value::compare(CmpOp::Le, lb.clone(), ub.clone()))?;
        let lp = self.cfg.create_empty_loop_on_edge(
            guard.true_edge,
            lb,
            1,
            ub,
            Some(intern(&desc.iterator)),
            desc.ty,
            outer,
        )?;
        let exit = self.cfg.single_exit(lp.id)?;
        self.cfg.split_edge(exit);
        let to_body = self.cfg.single_succ_edge(lp.header)?;

        ivs.push(self.cfg.var_value(lp.iv));
        loops.push(lp.id);
        let (_, bb) = self.nest(s, bounds, accesses, offset, level + 1, to_body, lp.id, ivs, loops)?;
        ivs.pop();
        Ok((guard.exit, bb))
    }

    fn body(&mut self, bb: BlockId, accesses: &[Access], offset: Option<&LinearExpr>, ivs: &[Value]) {
        let mut sum: Option<Value> = None;
        for read in accesses.iter().filter(|a| a.kind == AccessKind::Read) {
            let load = Value::load(ELEMENT, read.array, self.linear(&read.index, ELEMENT, ivs));
            let t = self.cfg.assign(bb, Some(intern("t")), load);
            sum = Some(add_element(sum, self.cfg.var_value(t)));
        }
        if let Some(offset) = offset {
            sum = Some(add_element(sum, self.linear(offset, ELEMENT, ivs)));
        }
        for write in accesses.iter().filter(|a| a.kind == AccessKind::Write) {
            let index = self.linear(&write.index, ELEMENT, ivs);
            let value = sum.clone().unwrap_or_else(|| Value::constant(ELEMENT, 0));
            self.cfg.push_inst(bb, Inst::Store { array: write.array, index, value });
        }
    }
}

fn add_element(sum: Option<Value>, v: Value) -> Value {
    match sum {
        None => v,
        Some(s) => Value::binary(BinaryOp::Plus, ELEMENT, s, v),
    }
}

impl KernelDesc {
    pub fn from_json(text: &str) -> LoopGenResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Build the original function, its SCoP and the AST to regenerate.
    pub fn build(&self, word_bits: u32) -> LoopGenResult<Kernel> {
        let mut cfg = Cfg::new(word_bits);
        let param_names: Vec<&str> = self.params.iter().map(|p| p.name.as_str()).collect();
        let param_syms: Vec<Symbol> = param_names.iter().map(|p| intern(p)).collect();

        let mut params = Vec::new();
        for (p, &name) in self.params.iter().zip(&param_syms) {
            let ty = match p.ty {
                Type::Int(it) => it,
                other => {
                    return Err(input_error(
                        InputErrorKind::InvalidType,
                        format!("parameter `{}` must have an integer type, not {}", p.name, other),
                    )
                    .into())
                }
            };
            let var = cfg.new_var(Some(name), p.ty);
            params.push(ScopParam { name, var, ty });
        }
        let param_vals: Vec<Value> = params.iter().map(|p| cfg.var_value(p.var)).collect();

        let mut context = universe_context(&param_syms);
        for c in &self.context {
            context.add_constraint(parse_constraint(c, &[], &param_names, 0)?);
        }

        let entry = cfg.add_edge(cfg.entry, cfg.exit, crate::ir::cfg::EdgeFlag::Fallthru);
        let first = cfg.split_edge(entry);
        let mut cur = cfg.single_succ_edge(first)?;
        let mut pbbs = Vec::new();
        let mut shapes = Vec::new();
        for (i, s) in self.statements.iter().enumerate() {
            let (pbb, shape, next) = self.build_statement(&mut cfg, i, s, cur, &param_names, &param_vals)?;
            pbbs.push(pbb);
            shapes.push(shape);
            cur = next;
        }
        let last = cfg.split_edge(cur);
        let exit = cfg.single_succ_edge(last)?;

        let mut scop = Scop { name: self.name.clone(), params, context, entry, exit, pbbs };
        scop.add_param_type_bounds();
        cfg.update_ssa();
        cfg.recompute_dominators();
        cfg.verify()?;

        let ast = match &self.ast {
            Some(nodes) => AstStmt::from_nodes(nodes.clone()),
            None => {
                let refs: Vec<&StmtShape> = shapes.iter().collect();
                let mut names = Vec::new();
                let mut pending = HashMap::new();
                AstStmt::from_nodes(ast_level(&refs, 0, &mut names, &param_syms, &mut pending))
            }
        };
        debug!(
            "built kernel {}: {} statements, {} blocks",
            self.name,
            scop.pbbs.len(),
            cfg.live_blocks().count()
        );
        Ok(Kernel { cfg, scop, ast })
    }

    fn build_statement(
        &self,
        cfg: &mut Cfg,
        index: usize,
        s: &StatementDesc,
        entry: EdgeId,
        params: &[&str],
        param_vals: &[Value],
    ) -> LoopGenResult<(PolyBb, StmtShape, EdgeId)> {
        let depth = s.loops.len();
        let n = params.len();
        let iters: Vec<&str> = s.loops.iter().map(|l| l.iterator.as_str()).collect();

        let space = Space::new(depth, n)
            .with_dim_names(iters.iter().map(|s| s.to_string()).collect())
            .with_param_names(params.iter().map(|s| s.to_string()).collect());
        let mut domain = Polytope::universe(space);
        let mut bounds = Vec::new();
        for (l, lp) in s.loops.iter().enumerate() {
            let lb = parse_affine(&lp.lb, &iters[..l], params, depth)?;
            let ub = parse_affine(&lp.ub, &iters[..l], params, depth)?;
            let it = LinearExpr::var(l, depth, n);
            domain.add_constraint(Constraint::ge(it.clone(), lb.clone()));
            domain.add_constraint(Constraint::le(it, ub.clone()));
            bounds.push((lb, ub));
        }

        let beta = match &s.schedule {
            Some(beta) => beta.clone(),
            None => {
                let mut beta = vec![0; depth + 1];
                beta[0] = index as i64;
                beta
            }
        };
        if beta.len() != depth + 1 {
            return Err(input_error(
                InputErrorKind::DimensionMismatch,
                format!("schedule of `{}` needs {} positions, has {}", s.name, depth + 1, beta.len()),
            )
            .into());
        }
        let nb = 2 * depth + 1;
        let sdim = nb + depth;
        let mut scattering = Polytope::universe(Space::new(sdim, n));
        for (k, &b) in beta.iter().enumerate() {
            scattering.add_constraint(Constraint::eq(
                LinearExpr::var(2 * k, sdim, n),
                LinearExpr::constant(b, sdim, n),
            ));
        }
        for k in 0..depth {
            scattering.add_constraint(Constraint::eq(
                LinearExpr::var(2 * k + 1, sdim, n),
                LinearExpr::var(nb + k, sdim, n),
            ));
        }

        let mut accesses = Vec::new();
        for read in &s.reads {
            accesses.push(Access {
                array: intern(&read.array),
                kind: AccessKind::Read,
                index: parse_affine(&read.index, &iters, params, depth)?,
            });
        }
        accesses.push(Access {
            array: intern(&s.write.array),
            kind: AccessKind::Write,
            index: parse_affine(&s.write.index, &iters, params, depth)?,
        });
        let offset = match &s.offset {
            Some(text) => Some(parse_affine(text, &iters, params, depth)?),
            None => None,
        };

        let mut builder = NestBuilder { cfg, params: param_vals };
        let mut ivs = Vec::new();
        let mut loops = Vec::new();
        let (next, bb) = builder.nest(
            s,
            &bounds,
            &accesses,
            offset.as_ref(),
            0,
            entry,
            Cfg::ROOT_LOOP,
            &mut ivs,
            &mut loops,
        )?;

        let id = PbbId(index as u32);
        let shape = StmtShape {
            id,
            beta,
            iterators: iters.iter().map(|s| intern(s)).collect(),
            bounds,
        };
        let pbb = PolyBb {
            id,
            name: s.name.clone(),
            black_box: bb,
            loops,
            domain,
            scattering,
            accesses,
        };
        Ok((pbb, shape, next))
    }
}

/// Smallest (or largest) of `exprs`, folded when all are constants.
fn hull(mut exprs: Vec<AffineExpr>, lower: bool) -> AffineExpr {
    let constants: Option<Vec<i64>> = exprs.iter().map(AffineExpr::as_constant).collect();
    match constants {
        Some(cs) if lower => AffineExpr::constant(cs.into_iter().min().unwrap_or(0)),
        Some(cs) => AffineExpr::constant(cs.into_iter().max().unwrap_or(0)),
        None if exprs.len() == 1 => exprs.remove(0),
        None if lower => AffineExpr::min(exprs),
        None => AffineExpr::max(exprs),
    }
}

fn iterator_term(name: Symbol) -> AffineExpr {
    AffineExpr::Term { var: Some(name), coeff: 1 }
}

/// Loop-nest AST for the statements in `shapes` below the loops named in
/// `names`. Statements sharing a static position share the loop at that
/// level; its bounds are the hull of theirs, and a statement whose own
/// bounds are tighter gets guarded.
fn ast_level(
    shapes: &[&StmtShape],
    level: usize,
    names: &mut Vec<Symbol>,
    params: &[Symbol],
    pending: &mut HashMap<PbbId, Vec<Equation>>,
) -> Vec<AstNode> {
    let mut positions: Vec<i64> = shapes.iter().map(|s| s.beta[level]).collect();
    positions.sort_unstable();
    positions.dedup();

    let mut nodes = Vec::new();
    for p in positions {
        let group: Vec<&StmtShape> = shapes.iter().copied().filter(|s| s.beta[level] == p).collect();

        for leaf in group.iter().filter(|s| s.bounds.len() == level) {
            let user = AstNode::User(UserStmt {
                statement: leaf.id,
                substitutions: names
                    .iter()
                    .zip(&leaf.iterators)
                    .map(|(&n, &orig)| Assignment { lhs: Some(orig), rhs: iterator_term(n) })
                    .collect(),
            });
            match pending.remove(&leaf.id) {
                Some(eqs) if !eqs.is_empty() => nodes.push(AstNode::Guard { eqs, then: vec![user] }),
                _ => nodes.push(user),
            }
        }

        let deeper: Vec<&StmtShape> = group.iter().copied().filter(|s| s.bounds.len() > level).collect();
        let Some(first) = deeper.first() else { continue };
        let name = first.iterators[level];
        let affine = |e: &LinearExpr| AffineExpr::from_linear(e, &names[..level], params);

        let mut lbs: Vec<AffineExpr> = Vec::new();
        let mut ubs: Vec<AffineExpr> = Vec::new();
        for s in &deeper {
            let (lb, ub) = (&s.bounds[level].0, &s.bounds[level].1);
            let (lb, ub) = (affine(lb), affine(ub));
            if !lbs.contains(&lb) {
                lbs.push(lb);
            }
            if !ubs.contains(&ub) {
                ubs.push(ub);
            }
        }
        let lb = hull(lbs, true);
        let ub = hull(ubs, false);

        for s in &deeper {
            let (own_lb, own_ub) = (affine(&s.bounds[level].0), affine(&s.bounds[level].1));
            let eqs = pending.entry(s.id).or_default();
            if own_lb != lb {
                eqs.push(Equation::ge(iterator_term(name), own_lb));
            }
            if own_ub != ub {
                eqs.push(Equation::le(iterator_term(name), own_ub));
            }
        }

        names.push(name);
        let body = ast_level(&deeper, level + 1, names, params, pending);
        names.pop();
        nodes.push(AstNode::For { iterator: name, lb, ub, stride: 1, body });
    }
    nodes
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ast::AstKind;
    use crate::utils::pretty::PrettyPrint;

    pub(crate) const VECTOR_ADD: &str = r#"{
        "name": "vadd",
        "params": [{"name": "N", "type": "i32"}],
        "context": ["N >= 1"],
        "statements": [{
            "name": "S1",
            "loops": [{"iterator": "i", "lb": "0", "ub": "N-1"}],
            "write": {"array": "C", "index": "i"},
            "reads": [{"array": "A", "index": "i"}, {"array": "B", "index": "i"}]
        }]
    }"#;

    #[test]
    fn test_parse_affine() {
        let e = parse_affine("2*i - N + 3", &["i"], &["N"], 1).unwrap();
        assert_eq!(e.coeffs, vec![2]);
        assert_eq!(e.param_coeffs, vec![-1]);
        assert_eq!(e.constant, 3);

        let e = parse_affine("-(i)", &["i"], &[], 1);
        assert!(e.is_err());
        let e = parse_affine("i*j", &["i", "j"], &[], 2).unwrap_err();
        assert_eq!(e.kind, InputErrorKind::NonAffineBound);
        let e = parse_affine("K", &[], &["N"], 0).unwrap_err();
        assert_eq!(e.kind, InputErrorKind::UnknownParameter);
        let e = parse_affine("i 2", &["i"], &[], 1).unwrap_err();
        assert_eq!(e.kind, InputErrorKind::NonAffineBound);
    }

    #[test]
    fn test_parse_constraint() {
        let c = parse_constraint("N > 3", &[], &["N"], 0).unwrap();
        assert!(c.is_satisfied(&[], &[4]));
        assert!(!c.is_satisfied(&[], &[3]));
        let c = parse_constraint("i <= N-1", &["i"], &["N"], 1).unwrap();
        assert!(c.is_satisfied(&[9], &[10]));
        assert!(!c.is_satisfied(&[10], &[10]));
    }

    #[test]
    fn test_build_vector_add() {
        let kernel = KernelDesc::from_json(VECTOR_ADD).unwrap().build(64).unwrap();
        assert_eq!(kernel.scop.pbbs.len(), 1);
        let pbb = &kernel.scop.pbbs[0];
        assert_eq!(pbb.depth(), 1);
        assert_eq!(pbb.loops.len(), 1);
        assert_eq!(kernel.cfg.block(pbb.black_box).loop_father, pbb.loops[0]);
        assert!(kernel.scop.region_blocks(&kernel.cfg).contains(&pbb.black_box));
        assert_eq!(kernel.ast.pretty(), "for (i=0;i<=N-1;i++) {\n  S1(i);\n}");
    }

    #[test]
    fn test_shared_loop_gets_hull_and_guard() {
        let json = r#"{
            "name": "fuse",
            "params": [{"name": "N", "type": "i32"}],
            "statements": [
                {"name": "S1", "loops": [{"iterator": "i", "lb": "0", "ub": "N-1"}],
                 "schedule": [0, 0], "write": {"array": "A", "index": "i"}},
                {"name": "S2", "loops": [{"iterator": "i", "lb": "1", "ub": "N-1"}],
                 "schedule": [0, 1], "write": {"array": "B", "index": "i"}}
            ]
        }"#;
        let kernel = KernelDesc::from_json(json).unwrap().build(64).unwrap();
        let expected = "\
for (i=0;i<=N-1;i++) {
  S1(i);
  if (i >= 1) {
    S2(i);
  }
}";
        assert_eq!(kernel.ast.pretty(), expected);
    }

    #[test]
    fn test_explicit_ast_is_used() {
        let mut desc = KernelDesc::from_json(VECTOR_ADD).unwrap();
        desc.ast = Some(vec![AstNode::Block { body: Vec::new() }]);
        let kernel = desc.build(64).unwrap();
        let next = kernel.ast.next.as_deref().unwrap();
        assert!(matches!(next.kind, AstKind::Block { .. }));
    }

    #[test]
    fn test_bad_schedule_rejected() {
        let mut desc = KernelDesc::from_json(VECTOR_ADD).unwrap();
        desc.statements[0].schedule = Some(vec![0]);
        assert!(desc.build(64).is_err());
    }
}
