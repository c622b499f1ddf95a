//! GIMPLE-like dumps of control-flow graphs.

use crate::ir::cfg::{Cfg, Inst, LoopId};
use crate::utils::pretty::{format_list_with, CodeFormatter};
use std::fmt;

fn dump_loop_tree(cfg: &Cfg, l: LoopId, f: &mut CodeFormatter) {
    let lp = cfg.get_loop(l);
    let mut header = format!("{} header {}", l, lp.header);
    if let Some(latch) = lp.latch {
        header.push_str(&format!(" latch {}", latch));
    }
    if let Some(iv) = lp.iv {
        header.push_str(&format!(" iv {}", iv));
    }
    if lp.can_be_parallel {
        header.push_str(" parallel");
    }
    f.writeln(&header);
    f.indent();
    for &child in &lp.children {
        dump_loop_tree(cfg, child, f);
    }
    f.dedent();
}

/// Render the live part of `cfg`: the loop tree, then every block with
/// its instructions and branch.
pub fn dump(cfg: &Cfg) -> String {
    let mut f = CodeFormatter::default_indent();
    f.section(";; loops", |f| dump_loop_tree(cfg, Cfg::ROOT_LOOP, f));

    for b in cfg.live_blocks() {
        let block = cfg.block(b);
        let mut header = format!("{} ({})", b, block.loop_father);
        if let Some(origin) = block.origin {
            header.push_str(&format!(" copy of {}", origin));
        }
        f.section(&header, |f| {
            for inst in &block.insts {
                match inst {
                    Inst::Phi { dest, args } => {
                        let args = format_list_with(args, ", ", |(e, v)| format!("{}({})", v, e));
                        f.writeln(&format!("{} = PHI <{}>", dest, args));
                    }
                    Inst::Assign { dest, value } => {
                        f.writeln(&format!("{} {} = {};", cfg.var(*dest).ty, dest, value));
                    }
                    Inst::Store { array, index, value } => {
                        f.writeln(&format!("{}[{}] = {};", array, index, value));
                    }
                }
            }
            match (&block.cond, cfg.true_edge(b), cfg.false_edge(b)) {
                (Some(cond), Some(t), Some(e)) => f.writeln(&format!(
                    "if ({}) goto {}; else goto {};",
                    cond,
                    cfg.edge(t).dest,
                    cfg.edge(e).dest
                )),
                _ => {
                    for s in cfg.succ_blocks(b) {
                        f.writeln(&format!("goto {};", s));
                    }
                }
            }
        });
    }
    f.finish()
}

impl fmt::Display for Cfg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", dump(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::cfg::EdgeFlag;
    use crate::ir::types::Type;
    use crate::ir::value::{CmpOp, Value};

    #[test]
    fn test_dump_loop() {
        let i32t = Type::int(32, false);
        let mut cfg = Cfg::new(64);
        let e = cfg.add_edge(cfg.entry, cfg.exit, EdgeFlag::Fallthru);
        let lp = cfg
            .create_empty_loop_on_edge(
                e,
                Value::constant(i32t, 0),
                1,
                Value::constant(i32t, 9),
                None,
                i32t,
                Cfg::ROOT_LOOP,
            )
            .unwrap();
        let text = dump(&cfg);
        assert!(text.contains(&format!("loop1 header {} latch {}", lp.header, lp.latch)));
        assert!(text.contains(&format!("{} = PHI <0(e0), {}(", lp.iv, lp.iv_next)));
        let cond = Value::compare(CmpOp::Lt, cfg.var_value(lp.iv), Value::constant(i32t, 9));
        assert!(text.contains(&format!("if ({}) goto {};", cond, lp.latch)));
    }
}
