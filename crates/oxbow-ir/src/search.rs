//! Sub-tree search and replace.
//!
//! Searches compare the pattern against each node with the wildcard-aware
//! equality, in preorder. Once a subscript node has matched, the search
//! does not descend through it, so a wrapped location is not reported a
//! second time. The children of an `init-value-of` node are never
//! searched.
//!
//! Replacement clones the replacement expression at every rewrite site
//! and never keeps a reference into the pre-rewrite tree. A match at a
//! node replaces the whole subtree; anything the pattern would also match
//! deeper inside that subtree is gone with it.

use crate::exp::Exp;
use crate::oper::Oper;

fn do_search<'e>(pat: &Exp, node: &'e Exp, hits: &mut Vec<&'e Exp>, once: bool) {
    let matched = pat == node;
    if matched {
        hits.push(node);
        if once {
            return;
        }
    }
    // Recurse into children, unless a matching subscript.
    if matched && node.is_subscript() {
        return;
    }
    if node.op() == Oper::InitValueOf {
        return;
    }
    for i in 0..node.child_count() {
        if once && !hits.is_empty() {
            return;
        }
        do_search(pat, node.child(i), hits, once);
    }
}

impl Exp {
    /// Find the first occurrence of `pat` in this expression, in preorder.
    /// Useful with wildcards: searching for `succ(r[WILD])` returns the
    /// concrete `succ(r2)` node.
    pub fn search(&self, pat: &Exp) -> Option<&Exp> {
        let mut hits = Vec::new();
        do_search(pat, self, &mut hits, true);
        hits.into_iter().next()
    }

    /// Find every occurrence of `pat`, appending to `hits`. Returns true
    /// when anything was found. Callers may accumulate hits for several
    /// patterns into one list.
    pub fn search_all<'e>(&'e self, pat: &Exp, hits: &mut Vec<&'e Exp>) -> bool {
        let before = hits.len();
        do_search(pat, self, hits, false);
        hits.len() > before
    }

    /// Replace the first occurrence of `pat` with a clone of `repl`.
    /// Returns the new root and whether a change was made.
    pub fn search_replace(self, pat: &Exp, repl: &Exp) -> (Exp, bool) {
        self.replace_impl(pat, repl, true)
    }

    /// Replace every occurrence of `pat` with a clone of `repl`. Returns
    /// the new root and whether a change was made.
    pub fn search_replace_all(self, pat: &Exp, repl: &Exp) -> (Exp, bool) {
        self.replace_impl(pat, repl, false)
    }

    fn replace_impl(self, pat: &Exp, repl: &Exp, once: bool) -> (Exp, bool) {
        fn walk(node: Exp, pat: &Exp, repl: &Exp, once: bool, changed: &mut bool) -> Exp {
            if once && *changed {
                return node;
            }
            if pat == &node {
                *changed = true;
                return repl.clone();
            }
            if node.op() == Oper::InitValueOf {
                return node;
            }
            let mut node = node;
            for i in 0..node.child_count() {
                if once && *changed {
                    break;
                }
                let child = std::mem::replace(node.child_mut(i), Exp::Terminal(Oper::Nil));
                *node.child_mut(i) = walk(child, pat, repl, once, changed);
            }
            node
        }
        let mut changed = false;
        let root = walk(self, pat, repl, once, &mut changed);
        (root, changed)
    }
}
