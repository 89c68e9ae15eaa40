//! Dominator tree and natural-loop information over a function's CFG.
//!
//! The deferred-fixup phase consumes these to place structured-control-flow
//! merge instructions: a loop's merge block is its unique exit, and its
//! continue target must dominate the back-edge block. Earlier structurization
//! is assumed to have shaped the CFG so both exist; when they don't, lowering
//! reports a structural violation rather than guessing.
//!
//! Dominators are computed with the iterative intersection scheme over a
//! reverse post-order; loops are the natural loops of back edges (an edge
//! whose target dominates its source), merged per header.

use super::{Block, FunctionDef};
use crate::FxIndexSet;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

pub struct DomTree {
    /// Immediate dominator per block; the entry maps to itself.
    idom: Vec<Block>,
    /// Position of each block in reverse post-order (entry is 0).
    rpo_index: Vec<usize>,
    reachable: Vec<bool>,
}

impl DomTree {
    pub fn compute(func: &FunctionDef) -> Self {
        let n = func.blocks.len();
        let mut preds: Vec<SmallVec<[Block; 2]>> = vec![SmallVec::new(); n];
        for block in func.blocks() {
            for succ in func.successors(block) {
                preds[succ.0 as usize].push(block);
            }
        }

        // Depth-first post-order from the entry, iteratively.
        let mut post_order = Vec::with_capacity(n);
        let mut seen = vec![false; n];
        if n > 0 {
            let entry = func.entry();
            seen[entry.0 as usize] = true;
            let mut stack: Vec<(Block, SmallVec<[Block; 2]>)> =
                vec![(entry, func.successors(entry))];
            while let Some(frame) = stack.last_mut() {
                match frame.1.pop() {
                    Some(succ) => {
                        if !seen[succ.0 as usize] {
                            seen[succ.0 as usize] = true;
                            stack.push((succ, func.successors(succ)));
                        }
                    }
                    None => {
                        let (block, _) = stack.pop().unwrap();
                        post_order.push(block);
                    }
                }
            }
        }

        let mut rpo_index = vec![usize::MAX; n];
        for (i, &block) in post_order.iter().rev().enumerate() {
            rpo_index[block.0 as usize] = i;
        }

        let mut idom: Vec<Option<Block>> = vec![None; n];
        if n > 0 {
            idom[func.entry().0 as usize] = Some(func.entry());
            let mut changed = true;
            while changed {
                changed = false;
                for &block in post_order.iter().rev() {
                    if block == func.entry() {
                        continue;
                    }
                    let mut new_idom: Option<Block> = None;
                    for &pred in &preds[block.0 as usize] {
                        if idom[pred.0 as usize].is_none() {
                            continue;
                        }
                        new_idom = Some(match new_idom {
                            None => pred,
                            Some(other) => intersect(&idom, &rpo_index, pred, other),
                        });
                    }
                    if let Some(new_idom) = new_idom {
                        if idom[block.0 as usize] != Some(new_idom) {
                            idom[block.0 as usize] = Some(new_idom);
                            changed = true;
                        }
                    }
                }
            }
        }

        let reachable = idom.iter().map(Option::is_some).collect();
        Self {
            idom: idom
                .into_iter()
                .enumerate()
                .map(|(i, d)| d.unwrap_or(Block(i as u32)))
                .collect(),
            rpo_index,
            reachable,
        }
    }

    /// Does `a` dominate `b`? Unreachable blocks dominate nothing and are
    /// dominated by nothing but themselves.
    pub fn dominates(&self, a: Block, b: Block) -> bool {
        if a == b {
            return true;
        }
        if !self.reachable[a.0 as usize] || !self.reachable[b.0 as usize] {
            return false;
        }
        let mut cur = b;
        while self.rpo_index[cur.0 as usize] > self.rpo_index[a.0 as usize] {
            cur = self.idom[cur.0 as usize];
        }
        cur == a
    }
}

fn intersect(idom: &[Option<Block>], rpo_index: &[usize], a: Block, b: Block) -> Block {
    let (mut a, mut b) = (a, b);
    while a != b {
        while rpo_index[a.0 as usize] > rpo_index[b.0 as usize] {
            a = idom[a.0 as usize].unwrap();
        }
        while rpo_index[b.0 as usize] > rpo_index[a.0 as usize] {
            b = idom[b.0 as usize].unwrap();
        }
    }
    a
}

/// One natural loop: all blocks that can reach a back edge to `header`
/// without leaving through it.
pub struct Loop {
    pub header: Block,
    /// Sources of back edges into `header`.
    pub latches: SmallVec<[Block; 2]>,
    /// Every block of the loop, header included.
    pub blocks: FxIndexSet<Block>,
    /// Distinct blocks outside the loop that are branched to from inside.
    pub exits: SmallVec<[Block; 2]>,
}

impl Loop {
    /// The single back-edge block, when there is exactly one.
    pub fn latch(&self) -> Option<Block> {
        match self.latches.as_slice() {
            &[latch] => Some(latch),
            _ => None,
        }
    }

    /// The single exit block, when there is exactly one.
    pub fn unique_exit(&self) -> Option<Block> {
        match self.exits.as_slice() {
            &[exit] => Some(exit),
            _ => None,
        }
    }

    pub fn contains(&self, block: Block) -> bool {
        self.blocks.contains(&block)
    }

    pub fn is_latch(&self, block: Block) -> bool {
        self.latches.contains(&block)
    }
}

pub struct LoopInfo {
    loops: Vec<Loop>,
    by_header: FxHashMap<Block, usize>,
}

impl LoopInfo {
    pub fn compute(func: &FunctionDef, dom: &DomTree) -> Self {
        let mut loops: Vec<Loop> = Vec::new();
        let mut by_header: FxHashMap<Block, usize> = FxHashMap::default();

        for block in func.blocks() {
            for succ in func.successors(block) {
                if !dom.dominates(succ, block) {
                    continue;
                }
                // Back edge block -> succ: grow the natural loop of `succ`.
                let index = *by_header.entry(succ).or_insert_with(|| {
                    loops.push(Loop {
                        header: succ,
                        latches: SmallVec::new(),
                        blocks: [succ].into_iter().collect(),
                        exits: SmallVec::new(),
                    });
                    loops.len() - 1
                });
                let lp = &mut loops[index];
                lp.latches.push(block);

                let mut work = vec![block];
                while let Some(b) = work.pop() {
                    if !lp.blocks.insert(b) {
                        continue;
                    }
                    for pred in func.blocks().filter(|&p| func.successors(p).contains(&b)) {
                        if pred != lp.header {
                            work.push(pred);
                        }
                    }
                }
            }
        }

        for lp in &mut loops {
            for &b in &lp.blocks {
                for succ in func.successors(b) {
                    if !lp.blocks.contains(&succ) && !lp.exits.contains(&succ) {
                        lp.exits.push(succ);
                    }
                }
            }
        }

        Self { loops, by_header }
    }

    pub fn is_loop_header(&self, block: Block) -> bool {
        self.by_header.contains_key(&block)
    }

    /// The loop headed by `block`, if `block` is a header.
    pub fn loop_with_header(&self, block: Block) -> Option<&Loop> {
        self.by_header.get(&block).map(|&i| &self.loops[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Context, FunctionDef, InstKind, Value};

    fn cond(cx: &mut Context) -> Value {
        Value::Const(cx.c_bool(true))
    }

    /// entry -> header; header -> body | exit; body -> header.
    fn simple_loop(cx: &mut Context) -> FunctionDef {
        let void = cx.t_void();
        let mut f = FunctionDef::new("f", false, void);
        let entry = f.add_block("entry");
        let header = f.add_block("header");
        let body = f.add_block("body");
        let exit = f.add_block("exit");
        let c = cond(cx);
        f.push(entry, void, InstKind::Branch { target: header });
        f.push(header, void, InstKind::CondBranch { cond: c, if_true: body, if_false: exit });
        f.push(body, void, InstKind::Branch { target: header });
        f.push(exit, void, InstKind::Return { value: None });
        f
    }

    #[test]
    fn dominators_of_a_diamond() {
        let mut cx = Context::default();
        let void = cx.t_void();
        let mut f = FunctionDef::new("f", false, void);
        let entry = f.add_block("entry");
        let then = f.add_block("then");
        let els = f.add_block("else");
        let join = f.add_block("join");
        let c = cond(&mut cx);
        f.push(entry, void, InstKind::CondBranch { cond: c, if_true: then, if_false: els });
        f.push(then, void, InstKind::Branch { target: join });
        f.push(els, void, InstKind::Branch { target: join });
        f.push(join, void, InstKind::Return { value: None });

        let dom = DomTree::compute(&f);
        assert!(dom.dominates(entry, join));
        assert!(dom.dominates(entry, then));
        assert!(!dom.dominates(then, join));
        assert!(!dom.dominates(join, then));
    }

    #[test]
    fn natural_loop_blocks_latch_and_exit() {
        let mut cx = Context::default();
        let f = simple_loop(&mut cx);
        let dom = DomTree::compute(&f);
        let li = LoopInfo::compute(&f, &dom);

        let header = Block(1);
        let body = Block(2);
        let exit = Block(3);
        assert!(li.is_loop_header(header));
        assert!(!li.is_loop_header(body));
        let lp = li.loop_with_header(header).unwrap();
        assert_eq!(lp.latch(), Some(body));
        assert!(lp.is_latch(body));
        assert!(!lp.is_latch(header));
        assert_eq!(lp.unique_exit(), Some(exit));
        assert!(lp.contains(header) && lp.contains(body) && !lp.contains(exit));
    }

    #[test]
    fn single_block_loop_is_its_own_latch() {
        let mut cx = Context::default();
        let void = cx.t_void();
        let mut f = FunctionDef::new("f", false, void);
        let entry = f.add_block("entry");
        let header = f.add_block("header");
        let exit = f.add_block("exit");
        let c = cond(&mut cx);
        f.push(entry, void, InstKind::Branch { target: header });
        f.push(header, void, InstKind::CondBranch { cond: c, if_true: header, if_false: exit });
        f.push(exit, void, InstKind::Return { value: None });

        let dom = DomTree::compute(&f);
        let li = LoopInfo::compute(&f, &dom);
        let lp = li.loop_with_header(header).unwrap();
        assert_eq!(lp.latch(), Some(header));
        assert_eq!(lp.unique_exit(), Some(exit));
    }
}
