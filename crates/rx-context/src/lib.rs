//! Binding indexing and the runtime evaluation core.
//!
//! A [`Context`] owns every binding's expression tree, a flat table of the
//! device state values those trees reference, and a pair of side tables
//! tracking in-flight `[T]` duration qualifiers. It is built once from a
//! batch of parsed bindings ([`Context::init`]) and then driven by two
//! entry points: [`Context::input_event`] on every device read, and
//! [`Context::timeout`] on a periodic tick so armed durations can fire even
//! without further input. Neither entry point is reentrant — both take
//! `&mut self` and are meant to be driven from a single task.

use rx_expr::{Dur, DurId, Expr, Match, MatchSource};
use rx_parser::ParsedBinding;

/// Live state for one distinct typecode referenced by at least one binding,
/// kept sorted ascending by `typecode` so lookups can binary search.
/// `listeners` holds the indices of bindings whose tree references this
/// typecode, so a state change only re-evaluates the bindings that could
/// possibly care, not every binding in the context.
#[derive(Debug, Clone)]
struct EventState {
    typecode: u32,
    value: i32,
    listeners: Vec<usize>,
}

/// One binding: its (now fully resolved) predicate tree, the command to run
/// on a false-to-true transition, and the predicate's value as of the last
/// evaluation (so a repeat `true` result doesn't refire the command).
#[derive(Debug, Clone)]
pub struct Binding {
    expr: Expr,
    pub command: String,
    last_state: bool,
}

/// The indexed, evaluation-ready form of a set of bindings.
///
/// `Context::init` is infallible: it only allocates, and allocator failure
/// is not a condition idiomatic Rust code recovers from. This is a
/// deliberate departure from the reference implementation, whose equivalent
/// constructor could return `NULL` and whose one caller actually checked
/// the wrong thing (`ctx == NULL` rather than `ctx->durations == NULL`) when
/// guarding against it.
pub struct Context {
    states: Vec<EventState>,
    bindings: Vec<Binding>,
    /// True end-of-hold deadline per `Dur` node, indexed by `DurId`. Once a
    /// node fires this is left `Some` rather than cleared — the reference
    /// implementation's node keeps a stale nonzero `end` after firing, and
    /// a `Dur` node keeps reporting true on every subsequent evaluation
    /// (not just the one tick it crossed the threshold) for as long as its
    /// child stays true. That behavior is preserved here too.
    dur_deadlines: Vec<Option<u64>>,
    /// Whether a `Dur` node is currently a poll-wait candidate. Cleared when
    /// it fires or when its child goes false; this is the table `timeout`
    /// and `next_timeout` scan, and it intentionally diverges from
    /// `dur_deadlines` once a node has fired.
    dur_armed: Vec<bool>,
}

impl Context {
    /// Two-pass index of a batch of parsed bindings into an evaluation-ready
    /// `Context`.
    ///
    /// Pass 1 walks every binding's tree, collecting the set of unique
    /// typecodes referenced (so a key watched by ten bindings gets one state
    /// slot, not ten) and registers the binding as a listener of every state
    /// it references. Pass 2 walks every tree again, rewriting each leaf's
    /// `MatchSource::Unresolved` typecode into a `MatchSource::Resolved`
    /// index into the now-sorted state table, and assigns each `Dur` node a
    /// stable `DurId` used to index the duration side tables.
    pub fn init(mut parsed: Vec<ParsedBinding>) -> Context {
        let mut typecodes: Vec<u32> = Vec::new();
        for binding in &parsed {
            binding.expr.for_each_match(&mut |m: &Match| {
                let tc = m.typecode();
                if typecodes.binary_search(&tc).is_err() {
                    typecodes.push(tc);
                    typecodes.sort_unstable();
                }
            });
        }

        let mut states: Vec<EventState> = typecodes
            .iter()
            .map(|&typecode| EventState {
                typecode,
                value: 0,
                listeners: Vec::new(),
            })
            .collect();

        for (binding_idx, binding) in parsed.iter().enumerate() {
            binding.expr.for_each_match(&mut |m: &Match| {
                let tc = m.typecode();
                let idx = states
                    .binary_search_by(|s| s.typecode.cmp(&tc))
                    .expect("every referenced typecode was collected above");
                if !states[idx].listeners.contains(&binding_idx) {
                    states[idx].listeners.push(binding_idx);
                }
            });
        }

        let mut next_dur_id: DurId = 0;
        let mut bindings = Vec::with_capacity(parsed.len());
        for mut pb in parsed.drain(..) {
            pb.expr.for_each_match_mut(&mut |m: &mut Match| {
                let tc = m.typecode();
                let idx = states
                    .binary_search_by(|s| s.typecode.cmp(&tc))
                    .expect("every referenced typecode was collected in pass 1");
                m.resolve(idx);
            });
            pb.expr.assign_dur_ids(&mut next_dur_id);
            debug_assert!(pb.expr.all_matches_resolved());
            bindings.push(Binding {
                expr: pb.expr,
                command: pb.command,
                last_state: false,
            });
        }

        tracing::debug!(
            states = states.len(),
            bindings = bindings.len(),
            durations = next_dur_id,
            "context indexed"
        );

        Context {
            states,
            bindings,
            dur_deadlines: vec![None; next_dur_id],
            dur_armed: vec![false; next_dur_id],
        }
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// Every typecode at least one binding references, ascending. A device
    /// backend uses this to know which capabilities are worth reading at
    /// startup to seed initial state.
    pub fn referenced_typecodes(&self) -> impl Iterator<Item = u32> + '_ {
        self.states.iter().map(|s| s.typecode)
    }

    fn state_value(&self, index: usize) -> i32 {
        self.states[index].value
    }

    /// Seed a state slot's initial value (e.g. from a device's
    /// already-pressed keys at startup) without treating it as an edge — no
    /// binding is evaluated. A typecode no binding references is silently
    /// ignored, since the context never allocated a slot for it.
    pub fn seed_state(&mut self, typecode: u32, value: i32) {
        if let Ok(idx) = self.states.binary_search_by(|s| s.typecode.cmp(&typecode)) {
            self.states[idx].value = value;
        }
    }

    /// Recursively evaluate `expr` at time `now` (milliseconds on whatever
    /// monotonic clock the caller uses consistently). OR/XOR/AND always
    /// evaluate both sides — never short-circuiting — so a `Dur` node on
    /// either side keeps its arm/disarm state advancing regardless of which
    /// side "wins".
    fn eval_expr(&mut self, expr: &Expr, now: u64) -> bool {
        match expr {
            Expr::Or(l, r) => {
                let lv = self.eval_expr(l, now);
                let rv = self.eval_expr(r, now);
                lv || rv
            }
            Expr::Xor(l, r) => {
                let lv = self.eval_expr(l, now);
                let rv = self.eval_expr(r, now);
                lv ^ rv
            }
            Expr::And(l, r) => {
                let lv = self.eval_expr(l, now);
                let rv = self.eval_expr(r, now);
                lv && rv
            }
            Expr::Not(e) => !self.eval_expr(e, now),
            Expr::Dur(d) => self.eval_dur(d, now),
            Expr::Primary(m) => {
                let idx = match m.source {
                    MatchSource::Resolved(idx) => idx,
                    MatchSource::Unresolved(_) => {
                        unreachable!("Context::init resolves every Match before use")
                    }
                };
                m.eval(self.state_value(idx))
            }
        }
    }

    /// `[T] child`: `child` must hold true continuously for `duration_ms`
    /// before this node reports true.
    ///
    /// State machine per node, keyed by `DurId`:
    /// - child false: disarm (clear deadline and poll-wait membership), report false.
    /// - child true, not armed: arm with `deadline = now + duration_ms`, report false.
    /// - child true, armed, `now < deadline`: still waiting, report false.
    /// - child true, armed, `now >= deadline`: fires, and keeps reporting
    ///   true on every later evaluation as long as the child stays true.
    ///   The first such evaluation clears poll-wait membership (leaving
    ///   `dur_deadlines[id]` set — the preserved quirk).
    fn eval_dur(&mut self, d: &Dur, now: u64) -> bool {
        let child_true = self.eval_expr(&d.child, now);
        let id = d.id;

        if !child_true {
            self.dur_deadlines[id] = None;
            self.dur_armed[id] = false;
            return false;
        }

        match self.dur_deadlines[id] {
            None => {
                self.dur_deadlines[id] = Some(now + d.duration_ms);
                self.dur_armed[id] = true;
                false
            }
            Some(deadline) if now < deadline => false,
            Some(_) => {
                self.dur_armed[id] = false;
                true
            }
        }
    }

    /// Evaluate one binding at `now` and run its command iff the predicate
    /// just transitioned from false to true. A predicate that stays true
    /// (or drops back to false) across evaluations updates `last_state` but
    /// never refires.
    fn eval_binding(&mut self, idx: usize, now: u64, run: &mut impl FnMut(&str)) {
        let expr = self.bindings[idx].expr.clone();
        let rc = self.eval_expr(&expr, now);
        self.bindings[idx].expr = expr;

        if rc == self.bindings[idx].last_state {
            return;
        }
        if rc {
            run(&self.bindings[idx].command);
        }
        self.bindings[idx].last_state = rc;
    }

    /// Dispatch a new device reading. Looks up `typecode` in the sorted
    /// state table via binary search; if found and the value actually
    /// changed, updates it and re-evaluates only the bindings that
    /// reference this typecode, running the command of each whose
    /// predicate transitions from false to true.
    ///
    /// Unlike the reference implementation's equivalent routine, a search
    /// miss is detected by checking the found slot's typecode explicitly
    /// rather than trusting the last index `binary_search` examined — the
    /// reference implementation could reuse a stale slot from a previous,
    /// unrelated search when the typecode wasn't present at all.
    ///
    /// Returns the next duration deadline across all armed `Dur` nodes, if
    /// any, so the caller can schedule its next wakeup.
    pub fn input_event(
        &mut self,
        typecode: u32,
        value: i32,
        now: u64,
        mut run: impl FnMut(&str),
    ) -> Option<u64> {
        let found = self.states.binary_search_by(|s| s.typecode.cmp(&typecode));
        let idx = match found {
            Ok(idx) if self.states[idx].typecode == typecode => idx,
            _ => return self.next_timeout(now),
        };

        if self.states[idx].value == value {
            return self.next_timeout(now);
        }
        self.states[idx].value = value;

        let listeners = self.states[idx].listeners.clone();
        for binding_idx in listeners {
            self.eval_binding(binding_idx, now, &mut run);
        }
        self.next_timeout(now)
    }

    /// Periodic tick: re-evaluate every binding without any state change, so
    /// a `Dur` node armed purely by the passage of time (with no further
    /// input) still fires and its command still runs.
    pub fn timeout(&mut self, now: u64, mut run: impl FnMut(&str)) -> Option<u64> {
        for idx in 0..self.bindings.len() {
            self.eval_binding(idx, now, &mut run);
        }
        self.next_timeout(now)
    }

    /// Milliseconds until the earliest poll-wait-armed `Dur` node fires, or
    /// `None` if nothing is waiting. A deadline already in the past collapses
    /// to 0, telling the caller to re-enter `timeout` without sleeping at all
    /// rather than return a negative wait.
    pub fn next_timeout(&self, now: u64) -> Option<u64> {
        self.dur_armed
            .iter()
            .enumerate()
            .filter(|(_, &armed)| armed)
            .filter_map(|(id, _)| self.dur_deadlines[id])
            .map(|deadline| deadline.saturating_sub(now))
            .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rx_parser::parse;

    fn ctx_from(src: &str) -> Context {
        let parsed = parse("<test>", src).expect("valid binding source");
        Context::init(parsed)
    }

    #[test]
    fn shared_typecode_gets_one_state_slot() {
        let ctx = ctx_from("KEY_A <= cmd1\nKEY_A:eq 0 <= cmd2\nKEY_B <= cmd3\n");
        assert_eq!(ctx.state_count(), 2);
        assert_eq!(ctx.binding_count(), 3);
    }

    #[test]
    fn rising_edge_fires_command_once() {
        let mut ctx = ctx_from("KEY_A <= cmd\n");
        let entry = rx_codes::lookup("KEY_A").unwrap();
        let mut fired = Vec::new();

        // matches the already-seeded default value, so nothing is evaluated
        ctx.input_event(entry.typecode(), 0, 0, |c| fired.push(c.to_string()));
        assert!(fired.is_empty());

        ctx.input_event(entry.typecode(), 1, 1, |c| fired.push(c.to_string()));
        assert_eq!(fired, vec!["cmd".to_string()]);

        // same value again: no state change, no re-evaluation, no refire
        fired.clear();
        ctx.input_event(entry.typecode(), 1, 2, |c| fired.push(c.to_string()));
        assert!(fired.is_empty());
    }

    #[test]
    fn unknown_typecode_is_ignored_not_a_panic() {
        let mut ctx = ctx_from("KEY_A <= cmd\n");
        let mut fired = Vec::new();
        ctx.input_event(0xffff_ffff, 1, 0, |c| fired.push(c.to_string()));
        assert!(fired.is_empty());
    }

    #[test]
    fn duration_node_waits_then_fires() {
        let mut ctx = ctx_from("KEY_A [100] <= hold-cmd\n");
        let entry = rx_codes::lookup("KEY_A").unwrap();
        let mut fired = Vec::new();

        ctx.input_event(entry.typecode(), 1, 0, |c| fired.push(c.to_string()));
        assert!(fired.is_empty(), "must not fire before the hold elapses");

        let next = ctx.next_timeout(0);
        assert_eq!(next, Some(100));

        ctx.timeout(50, |c| fired.push(c.to_string()));
        assert!(fired.is_empty(), "must not fire early");

        ctx.timeout(100, |c| fired.push(c.to_string()));
        assert_eq!(fired, vec!["hold-cmd".to_string()]);
    }

    #[test]
    fn duration_node_disarms_if_child_goes_false_first() {
        let mut ctx = ctx_from("KEY_A [100] <= hold-cmd\n");
        let entry = rx_codes::lookup("KEY_A").unwrap();
        let mut fired = Vec::new();

        ctx.input_event(entry.typecode(), 1, 0, |c| fired.push(c.to_string()));
        ctx.input_event(entry.typecode(), 0, 50, |c| fired.push(c.to_string()));
        assert!(ctx.next_timeout(50).is_none());

        ctx.timeout(100, |c| fired.push(c.to_string()));
        assert!(fired.is_empty(), "released before the hold elapsed, never fires");
    }

    #[test]
    fn fired_duration_node_keeps_firing_while_held_but_leaves_poll_wait() {
        let mut ctx = ctx_from("KEY_A [100] <= hold-cmd\n");
        let entry = rx_codes::lookup("KEY_A").unwrap();
        let mut fired = Vec::new();

        ctx.input_event(entry.typecode(), 1, 0, |c| fired.push(c.to_string()));
        ctx.timeout(100, |c| fired.push(c.to_string()));
        assert_eq!(fired.len(), 1, "binding-level edge detection fires the command once");

        assert!(ctx.next_timeout(100).is_none(), "no longer poll-wait armed");
        assert_eq!(ctx.dur_deadlines[0], Some(100), "deadline left set after firing");

        // still held: the Dur node itself reports true again on the next
        // tick (it does not revert to "waiting"), but the binding doesn't
        // refire since its last observed state is already true.
        ctx.timeout(150, |c| fired.push(c.to_string()));
        assert_eq!(fired.len(), 1);
    }

    #[test]
    fn next_timeout_returns_a_relative_not_absolute_wait() {
        let mut ctx = ctx_from("KEY_A [500] <= echo held\n");
        let entry = rx_codes::lookup("KEY_A").unwrap();
        let mut fired = Vec::new();

        ctx.input_event(entry.typecode(), 1, 0, |c| fired.push(c.to_string()));
        assert_eq!(ctx.next_timeout(0), Some(500));

        ctx.timeout(499, |c| fired.push(c.to_string()));
        assert!(fired.is_empty());
        assert_eq!(ctx.next_timeout(499), Some(1));

        ctx.timeout(500, |c| fired.push(c.to_string()));
        assert_eq!(fired, vec!["echo held".to_string()]);
    }

    #[test]
    fn or_xor_and_evaluate_both_sides_even_when_short_circuitable() {
        let mut ctx = ctx_from("KEY_A | (KEY_B [100]) <= cmd\n");
        let a = rx_codes::lookup("KEY_A").unwrap();
        let b = rx_codes::lookup("KEY_B").unwrap();

        ctx.input_event(a.typecode(), 1, 0, |_| {});
        ctx.input_event(b.typecode(), 1, 0, |_| {});

        assert_eq!(
            ctx.next_timeout(0),
            Some(100),
            "the OR's true left side must not prevent the right Dur from arming"
        );
    }

    #[test]
    fn not_negates_current_truth_on_a_real_transition() {
        let mut ctx = ctx_from("!KEY_A <= cmd\n");
        let a = rx_codes::lookup("KEY_A").unwrap();
        let mut fired = Vec::new();

        // key goes down: !KEY_A is false, matches the binding's initial
        // last_state (false), so nothing fires
        ctx.input_event(a.typecode(), 1, 0, |c| fired.push(c.to_string()));
        assert!(fired.is_empty());

        // key goes up: !KEY_A becomes true, a real false->true transition
        ctx.input_event(a.typecode(), 0, 1, |c| fired.push(c.to_string()));
        assert_eq!(fired, vec!["cmd".to_string()]);

        // key goes down again: !KEY_A goes back to false, no command on the way down
        fired.clear();
        ctx.input_event(a.typecode(), 1, 2, |c| fired.push(c.to_string()));
        assert!(fired.is_empty());
    }

    #[test]
    fn listener_registration_is_deduped_per_binding() {
        // KEY_A appears twice in this binding's tree; it must still only be
        // evaluated (and thus only fire) once per state change.
        let mut ctx = ctx_from("KEY_A & KEY_A:ne 5 <= cmd\n");
        let a = rx_codes::lookup("KEY_A").unwrap();
        assert_eq!(ctx.states[0].listeners, vec![0]);

        let mut fired = Vec::new();
        ctx.input_event(a.typecode(), 1, 0, |c| fired.push(c.to_string()));
        assert_eq!(fired, vec!["cmd".to_string()]);
    }
}
