//! The boolean expression tree evaluated against device state.
//!
//! A binding's predicate is a tree of [`Expr`] nodes. Leaves are [`Match`]es
//! against a single input's current value; everything else composes them.
//! Before a context has indexed a binding's leaves, each [`Match`] carries a
//! raw typecode (`MatchSource::Unresolved`); afterwards it carries an index
//! into the context's state table (`MatchSource::Resolved`). Keeping both
//! forms as one type with a `source` field (rather than two tree-node
//! variants and an in-place tag rewrite) avoids the aliasing that the
//! reference implementation's mutable discriminant swap relied on.

/// The six comparators the DSL supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl Comparator {
    pub fn apply(self, lhs: i32, rhs: i32) -> bool {
        match self {
            Comparator::Eq => lhs == rhs,
            Comparator::Ne => lhs != rhs,
            Comparator::Lt => lhs < rhs,
            Comparator::Gt => lhs > rhs,
            Comparator::Le => lhs <= rhs,
            Comparator::Ge => lhs >= rhs,
        }
    }
}

/// Where a [`Match`] gets the current value it compares against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchSource {
    /// Pre-bind: a raw 32-bit `(event_type << 16) | event_code` typecode.
    Unresolved(u32),
    /// Post-bind: an index into the owning context's state table.
    Resolved(usize),
}

/// A single leaf comparator: `source COMP value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    pub source: MatchSource,
    pub cmp: Comparator,
    pub value: i32,
}

impl Match {
    pub fn unresolved(typecode: u32, cmp: Comparator, value: i32) -> Self {
        Self {
            source: MatchSource::Unresolved(typecode),
            cmp,
            value,
        }
    }

    /// The typecode this leaf was parsed against. Panics if already resolved;
    /// callers only use this during the first indexing pass.
    pub fn typecode(&self) -> u32 {
        match self.source {
            MatchSource::Unresolved(tc) => tc,
            MatchSource::Resolved(_) => panic!("typecode() called on a resolved Match"),
        }
    }

    /// Rebind this leaf to a resolved state-table index.
    pub fn resolve(&mut self, index: usize) {
        self.source = MatchSource::Resolved(index);
    }

    /// Evaluate the comparator against a state value already looked up by the
    /// caller (which owns the state table this `Match` indexes into).
    pub fn eval(&self, state_value: i32) -> bool {
        self.cmp.apply(state_value, self.value)
    }
}

/// A duration modifier's node identity, assigned once per tree during
/// indexing so the owning context can keep per-node deadline and
/// poll-wait-membership state in flat side tables instead of aliased
/// pointers into the tree.
pub type DurId = usize;

/// A `[T] expr` duration qualifier: `expr` must evaluate true continuously
/// for `duration_ms` before this node itself reports true.
#[derive(Debug, Clone)]
pub struct Dur {
    pub duration_ms: u64,
    pub child: Box<Expr>,
    pub id: DurId,
}

/// The expression tree. OR/XOR/AND evaluate both children unconditionally
/// (never short-circuit) so a `Dur` node on either side keeps advancing.
#[derive(Debug, Clone)]
pub enum Expr {
    Or(Box<Expr>, Box<Expr>),
    Xor(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Dur(Dur),
    Primary(Match),
}

impl Expr {
    /// Depth-first visit of every leaf [`Match`], mutably. Used during
    /// context indexing to collect referenced typecodes (pass 1) and to
    /// rewrite them to resolved state indices (pass 2).
    pub fn for_each_match_mut(&mut self, f: &mut impl FnMut(&mut Match)) {
        match self {
            Expr::Or(l, r) | Expr::Xor(l, r) | Expr::And(l, r) => {
                l.for_each_match_mut(f);
                r.for_each_match_mut(f);
            }
            Expr::Not(e) => e.for_each_match_mut(f),
            Expr::Dur(d) => d.child.for_each_match_mut(f),
            Expr::Primary(m) => f(m),
        }
    }

    /// Depth-first visit of every leaf [`Match`], immutably.
    pub fn for_each_match(&self, f: &mut impl FnMut(&Match)) {
        match self {
            Expr::Or(l, r) | Expr::Xor(l, r) | Expr::And(l, r) => {
                l.for_each_match(f);
                r.for_each_match(f);
            }
            Expr::Not(e) => e.for_each_match(f),
            Expr::Dur(d) => d.child.for_each_match(f),
            Expr::Primary(m) => f(m),
        }
    }

    /// Assign sequential [`DurId`]s to every `Dur` node in this tree,
    /// starting from `*next_id`, and advance `*next_id` past them. Returns
    /// the number of `Dur` nodes found.
    pub fn assign_dur_ids(&mut self, next_id: &mut DurId) -> usize {
        match self {
            Expr::Or(l, r) | Expr::Xor(l, r) | Expr::And(l, r) => {
                l.assign_dur_ids(next_id) + r.assign_dur_ids(next_id)
            }
            Expr::Not(e) => e.assign_dur_ids(next_id),
            Expr::Dur(d) => {
                d.id = *next_id;
                *next_id += 1;
                1 + d.child.assign_dur_ids(next_id)
            }
            Expr::Primary(_) => 0,
        }
    }

    /// True iff no leaf in this tree still carries an unresolved typecode.
    pub fn all_matches_resolved(&self) -> bool {
        let mut ok = true;
        self.for_each_match(&mut |m| {
            if matches!(m.source, MatchSource::Unresolved(_)) {
                ok = false;
            }
        });
        ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(tc: u32, cmp: Comparator, value: i32) -> Expr {
        Expr::Primary(Match::unresolved(tc, cmp, value))
    }

    #[test]
    fn comparator_semantics() {
        assert!(Comparator::Eq.apply(5, 5));
        assert!(!Comparator::Eq.apply(5, 6));
        assert!(Comparator::Ne.apply(5, 6));
        assert!(Comparator::Lt.apply(1, 2));
        assert!(Comparator::Gt.apply(2, 1));
        assert!(Comparator::Le.apply(2, 2));
        assert!(Comparator::Ge.apply(2, 2));
    }

    #[test]
    fn for_each_match_visits_every_leaf_once() {
        let tree = Expr::And(
            Box::new(leaf(1, Comparator::Eq, 1)),
            Box::new(Expr::Not(Box::new(leaf(2, Comparator::Eq, 1)))),
        );
        let mut seen = Vec::new();
        tree.for_each_match(&mut |m| seen.push(m.typecode()));
        assert_eq!(seen, vec![1, 2]);
    }

    #[test]
    fn assign_dur_ids_counts_and_orders() {
        let mut tree = Expr::And(
            Box::new(Expr::Dur(Dur {
                duration_ms: 10,
                child: Box::new(leaf(1, Comparator::Eq, 1)),
                id: 0,
            })),
            Box::new(Expr::Dur(Dur {
                duration_ms: 20,
                child: Box::new(leaf(2, Comparator::Eq, 1)),
                id: 0,
            })),
        );
        let mut next = 0;
        let count = tree.assign_dur_ids(&mut next);
        assert_eq!(count, 2);
        assert_eq!(next, 2);
        if let Expr::And(l, r) = &tree {
            let Expr::Dur(ld) = l.as_ref() else {
                unreachable!()
            };
            let Expr::Dur(rd) = r.as_ref() else {
                unreachable!()
            };
            assert_eq!(ld.id, 0);
            assert_eq!(rd.id, 1);
        }
    }

    #[test]
    fn resolve_clears_unresolved_state() {
        let mut m = Match::unresolved(7, Comparator::Eq, 1);
        assert!(matches!(m.source, MatchSource::Unresolved(7)));
        m.resolve(3);
        assert!(matches!(m.source, MatchSource::Resolved(3)));
    }

    #[test]
    fn all_matches_resolved_detects_leftover_unresolved() {
        let mut tree = leaf(1, Comparator::Eq, 1);
        assert!(!tree.all_matches_resolved());
        tree.for_each_match_mut(&mut |m| m.resolve(0));
        assert!(tree.all_matches_resolved());
    }
}
