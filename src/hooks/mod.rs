//! Stateful-slot runtime ("hooks").
//!
//! A function component receives a [`Hooks`] render context for each call.
//! Every `use_*` call claims the next slot of the component's chain:
//!
//! ```text
//! render #1 (mount)           render #2 (update)
//! [0] Reducer(queue) ───────► [0] Reducer(queue)   same queue, new reducer
//! [1] Memo(v, [a])   ───────► [1] Memo(v, [a])     deps equal: kept
//! [2] Effect(e1)     ───────► [2] Effect(e2)       e2 shares e1's cleanup
//! ```
//!
//! On mount the chain is built fresh; on update the counterpart
//! generation's chain is walked in lockstep and each slot copied forward.
//! Slots are matched by call order only, so hooks must be called
//! unconditionally and in the same order on every render.

mod effect;

pub use effect::*;

use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tracing::{trace, warn};

use crate::element::Context;
use crate::engine::{FiberId, Flags, Lanes, RootId};
use crate::reconciler::ContextStack;
use crate::types::{Callback, Value};

/// Dependency list for memo and effect hooks.
pub type Deps = Vec<Value>;

/// Sink that turns a dispatched action into a scheduled render.
pub(crate) trait UpdateScheduler {
    fn schedule_update(&self, root: RootId, fiber: FiberId, lane: Lanes);
}

/// Compare dependency lists slot by slot with identity semantics.
///
/// An absent previous list always counts as changed. Lists of different
/// length compare over the shorter length.
pub fn are_hook_inputs_equal(next: &[Value], prev: Option<&[Value]>) -> bool {
    let Some(prev) = prev else {
        return false;
    };
    if next.len() != prev.len() {
        warn!(
            prev = prev.len(),
            next = next.len(),
            "dependency list changed length between renders"
        );
    }
    next.iter().zip(prev).all(|(a, b)| a.is_same(b))
}

// =============================================================================
// Slots
// =============================================================================

/// One persistent record of a component's chain.
#[derive(Clone)]
pub enum HookSlot {
    /// `Rc<ReducerQueue<S, A>>`, shared by both generations.
    Reducer(Rc<dyn Any>),
    Memo {
        value: Rc<dyn Any>,
        deps: Option<Deps>,
    },
    /// `Rc<RefCell<T>>`
    Ref(Rc<dyn Any>),
    Effect(Rc<Effect>),
}

impl HookSlot {
    fn kind(&self) -> &'static str {
        match self {
            HookSlot::Reducer(_) => "reducer",
            HookSlot::Memo { .. } => "memo",
            HookSlot::Ref(_) => "ref",
            HookSlot::Effect(_) => "effect",
        }
    }
}

impl std::fmt::Debug for HookSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HookSlot::Effect(effect) => write!(f, "{effect:?}"),
            HookSlot::Memo { deps, .. } => write!(f, "Memo({deps:?})"),
            other => f.write_str(other.kind()),
        }
    }
}

type Reducer<S, A> = dyn Fn(&S, A) -> S;

struct ReducerQueue<S, A> {
    state: RefCell<S>,
    reducer: RefCell<Rc<Reducer<S, A>>>,
    dispatch: Dispatch<A>,
}

/// Stable dispatcher bound to one reducer slot.
///
/// The reducer is applied eagerly and a render of the owning root is
/// scheduled. Dispatching after the component unmounted is a no-op.
pub struct Dispatch<A>(Rc<dyn Fn(A)>);

impl<A> Clone for Dispatch<A> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<A> Dispatch<A> {
    pub fn dispatch(&self, action: A) {
        (self.0)(action)
    }

    pub fn ptr_eq(&self, other: &Dispatch<A>) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl<A> std::fmt::Debug for Dispatch<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Dispatch({:p})", Rc::as_ptr(&self.0) as *const ())
    }
}

// =============================================================================
// Render context
// =============================================================================

/// Output of one component render.
pub(crate) struct RenderedHooks {
    pub(crate) chain: Vec<HookSlot>,
    pub(crate) effects: Vec<Rc<Effect>>,
    pub(crate) flags: Flags,
}

/// Render context handed to a function component.
pub struct Hooks<'a> {
    fiber: FiberId,
    root: RootId,
    current: Option<Vec<HookSlot>>,
    chain: Vec<HookSlot>,
    effects: Vec<Rc<Effect>>,
    flags: Flags,
    contexts: &'a ContextStack,
    updater: Weak<dyn UpdateScheduler>,
}

impl<'a> Hooks<'a> {
    /// # Arguments
    ///
    /// * `current` - the counterpart generation's chain, `None` on mount
    pub(crate) fn new(
        fiber: FiberId,
        root: RootId,
        current: Option<Vec<HookSlot>>,
        contexts: &'a ContextStack,
        updater: Weak<dyn UpdateScheduler>,
    ) -> Self {
        Self {
            fiber,
            root,
            current,
            chain: Vec::new(),
            effects: Vec::new(),
            flags: Flags::empty(),
            contexts,
            updater,
        }
    }

    pub(crate) fn finish(self) -> RenderedHooks {
        if let Some(current) = &self.current {
            if current.len() != self.chain.len() {
                warn!(
                    fiber = %self.fiber,
                    before = current.len(),
                    after = self.chain.len(),
                    "rendered a different number of hooks than the previous render"
                );
            }
        }
        RenderedHooks {
            chain: self.chain,
            effects: self.effects,
            flags: self.flags,
        }
    }

    pub fn is_mount(&self) -> bool {
        self.current.is_none()
    }

    /// The counterpart slot at the current position.
    fn counterpart(&self) -> Option<HookSlot> {
        self.current.as_ref()?.get(self.chain.len()).cloned()
    }

    fn mismatch(&self, expected: &str, found: Option<&HookSlot>) {
        if self.current.is_some() {
            warn!(
                fiber = %self.fiber,
                slot = self.chain.len(),
                expected,
                found = found.map(HookSlot::kind).unwrap_or("nothing"),
                "hook order changed; reinitialising slot"
            );
        }
    }

    // =========================================================================
    // State
    // =========================================================================

    /// Reducer-backed state. Returns the current state and a stable dispatcher.
    pub fn use_reducer<S, A>(
        &mut self,
        reducer: impl Fn(&S, A) -> S + 'static,
        initial: S,
    ) -> (S, Dispatch<A>)
    where
        S: Clone + 'static,
        A: 'static,
    {
        let previous = self.counterpart();
        let existing = previous.as_ref().and_then(|slot| match slot {
            HookSlot::Reducer(queue) => queue.clone().downcast::<ReducerQueue<S, A>>().ok(),
            _ => None,
        });

        let queue = match existing {
            Some(queue) => {
                *queue.reducer.borrow_mut() = Rc::new(reducer);
                queue
            }
            None => {
                self.mismatch("reducer", previous.as_ref());
                self.mount_reducer(Rc::new(reducer), initial)
            }
        };

        self.chain.push(HookSlot::Reducer(queue.clone()));
        let state = queue.state.borrow().clone();
        (state, queue.dispatch.clone())
    }

    /// Plain state: a reducer that replaces the value.
    pub fn use_state<S>(&mut self, initial: impl FnOnce() -> S) -> (S, Dispatch<S>)
    where
        S: Clone + 'static,
    {
        let previous = self.counterpart();
        let existing = previous.as_ref().and_then(|slot| match slot {
            HookSlot::Reducer(queue) => queue.clone().downcast::<ReducerQueue<S, S>>().ok(),
            _ => None,
        });

        let queue = match existing {
            Some(queue) => queue,
            None => {
                self.mismatch("state", previous.as_ref());
                // Initializer only runs on mount
                self.mount_reducer(Rc::new(|_: &S, next: S| next), initial())
            }
        };

        self.chain.push(HookSlot::Reducer(queue.clone()));
        let state = queue.state.borrow().clone();
        (state, queue.dispatch.clone())
    }

    fn mount_reducer<S, A>(&self, reducer: Rc<Reducer<S, A>>, initial: S) -> Rc<ReducerQueue<S, A>>
    where
        S: 'static,
        A: 'static,
    {
        let fiber = self.fiber;
        let root = self.root;
        let updater = self.updater.clone();

        Rc::new_cyclic(|weak: &Weak<ReducerQueue<S, A>>| {
            let weak = weak.clone();
            let dispatch = Dispatch(Rc::new(move |action: A| {
                let Some(queue) = weak.upgrade() else {
                    trace!(%fiber, "dispatch after unmount ignored");
                    return;
                };
                let reducer = queue.reducer.borrow().clone();
                let next = reducer(&queue.state.borrow(), action);
                *queue.state.borrow_mut() = next;

                match updater.upgrade() {
                    Some(updater) => updater.schedule_update(root, fiber, Lanes::SYNC),
                    None => trace!(%fiber, "renderer dropped; update not scheduled"),
                }
            }));

            ReducerQueue {
                state: RefCell::new(initial),
                reducer: RefCell::new(reducer),
                dispatch,
            }
        })
    }

    // =========================================================================
    // Memoization
    // =========================================================================

    /// Recompute `create` when any dependency changed by identity, or always
    /// when `deps` is `None`.
    pub fn use_memo<T: 'static>(&mut self, create: impl FnOnce() -> T, deps: Option<Deps>) -> Rc<T> {
        let previous = self.counterpart();
        match &previous {
            Some(HookSlot::Memo {
                value,
                deps: prev_deps,
            }) => {
                if let Some(next) = &deps {
                    if are_hook_inputs_equal(next, prev_deps.as_deref()) {
                        if let Ok(value) = value.clone().downcast::<T>() {
                            self.chain.push(HookSlot::Memo {
                                value: value.clone(),
                                deps: prev_deps.clone(),
                            });
                            return value;
                        }
                    }
                }
            }
            other => self.mismatch("memo", other.as_ref()),
        }

        let value = Rc::new(create());
        self.chain.push(HookSlot::Memo {
            value: value.clone(),
            deps,
        });
        value
    }

    /// A callback whose identity only changes when `deps` change.
    pub fn use_callback(&mut self, f: impl Fn() + 'static, deps: Option<Deps>) -> Callback {
        let memo = self.use_memo(move || Callback::new(f), deps);
        (*memo).clone()
    }

    /// A mutable cell that lives as long as the component.
    pub fn use_ref<T: 'static>(&mut self, initial: impl FnOnce() -> T) -> Rc<RefCell<T>> {
        let previous = self.counterpart();
        if let Some(HookSlot::Ref(cell)) = &previous {
            if let Ok(cell) = cell.clone().downcast::<RefCell<T>>() {
                self.chain.push(HookSlot::Ref(cell.clone()));
                return cell;
            }
        }
        self.mismatch("ref", previous.as_ref());

        let cell = Rc::new(RefCell::new(initial()));
        self.chain.push(HookSlot::Ref(cell.clone()));
        cell
    }

    // =========================================================================
    // Effects
    // =========================================================================

    /// Deferred effect: runs after commit, in a later scheduler task.
    pub fn use_effect(
        &mut self,
        create: impl FnOnce() -> Option<Destroy> + 'static,
        deps: Option<Deps>,
    ) {
        self.effect_impl(Flags::PASSIVE, HookFlags::PASSIVE, create, deps);
    }

    /// Layout effect: runs synchronously right after the host tree is mutated.
    pub fn use_layout_effect(
        &mut self,
        create: impl FnOnce() -> Option<Destroy> + 'static,
        deps: Option<Deps>,
    ) {
        self.effect_impl(Flags::LAYOUT, HookFlags::LAYOUT, create, deps);
    }

    fn effect_impl(
        &mut self,
        fiber_flags: Flags,
        hook_flags: HookFlags,
        create: impl FnOnce() -> Option<Destroy> + 'static,
        deps: Option<Deps>,
    ) {
        let previous = self.counterpart();
        let prev_effect = match &previous {
            Some(HookSlot::Effect(effect)) if effect.tag().contains(hook_flags) => Some(effect.clone()),
            other => {
                self.mismatch("effect", other.as_ref());
                None
            }
        };

        let (inst, unchanged) = match &prev_effect {
            Some(prev) => {
                let unchanged = deps.as_deref().is_some_and(|next| {
                    are_hook_inputs_equal(next, prev.deps().map(Vec::as_slice))
                });
                (prev.inst().clone(), unchanged)
            }
            None => (Rc::new(EffectInstance::default()), false),
        };

        let tag = if unchanged {
            hook_flags
        } else {
            self.flags |= fiber_flags;
            HookFlags::HAS_EFFECT | hook_flags
        };
        let effect = Rc::new(Effect::new(tag, inst, create, deps));
        self.effects.push(effect.clone());
        self.chain.push(HookSlot::Effect(effect));
    }

    // =========================================================================
    // Context
    // =========================================================================

    /// Nearest provided value of `context`. Does not claim a slot.
    pub fn use_context(&self, context: &Context) -> Value {
        self.contexts.read(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Fiber, FiberArena, FiberProps, WorkTag};
    use proptest::prelude::*;
    use std::cell::Cell;

    #[derive(Default)]
    struct Recorder {
        updates: RefCell<Vec<(RootId, FiberId, Lanes)>>,
    }

    impl UpdateScheduler for Recorder {
        fn schedule_update(&self, root: RootId, fiber: FiberId, lane: Lanes) {
            self.updates.borrow_mut().push((root, fiber, lane));
        }
    }

    struct Harness {
        fiber: FiberId,
        recorder: Rc<Recorder>,
        contexts: ContextStack,
        chain: Option<Vec<HookSlot>>,
    }

    fn setup() -> Harness {
        let mut arena = FiberArena::new();
        let fiber = arena.alloc(Fiber::new(WorkTag::FunctionComponent, FiberProps::Empty, None));
        Harness {
            fiber,
            recorder: Rc::new(Recorder::default()),
            contexts: ContextStack::new(),
            chain: None,
        }
    }

    impl Harness {
        /// One render; the resulting chain becomes the next render's counterpart.
        fn render<R>(&mut self, body: impl FnOnce(&mut Hooks<'_>) -> R) -> (R, Vec<Rc<Effect>>, Flags) {
            let recorder: Rc<dyn UpdateScheduler> = self.recorder.clone();
            let mut hooks = Hooks::new(
                self.fiber,
                RootId(0),
                self.chain.take(),
                &self.contexts,
                Rc::downgrade(&recorder),
            );
            let out = body(&mut hooks);
            let rendered = hooks.finish();
            self.chain = Some(rendered.chain);
            (out, rendered.effects, rendered.flags)
        }
    }

    // =========================================================================
    // State
    // =========================================================================

    #[test]
    fn test_use_state_persists_and_dispatch_schedules() {
        let mut h = setup();
        let ((count, set_count), _, _) = h.render(|hooks| hooks.use_state(|| 0i64));
        assert_eq!(count, 0);

        set_count.dispatch(5);
        assert_eq!(h.recorder.updates.borrow().len(), 1);
        assert_eq!(h.recorder.updates.borrow()[0].1, h.fiber);
        assert_eq!(h.recorder.updates.borrow()[0].2, Lanes::SYNC);

        let ((count, again), _, _) = h.render(|hooks| hooks.use_state(|| 100i64));
        assert_eq!(count, 5);
        assert!(again.ptr_eq(&set_count));
    }

    #[test]
    fn test_state_initializer_runs_once() {
        let mut h = setup();
        let calls = Rc::new(Cell::new(0));
        for _ in 0..3 {
            let c = calls.clone();
            h.render(|hooks| {
                hooks.use_state(move || {
                    c.set(c.get() + 1);
                    "x".to_string()
                })
            });
        }
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_use_reducer_applies_latest_reducer() {
        let mut h = setup();
        let ((_, dispatch), _, _) =
            h.render(|hooks| hooks.use_reducer(|s: &i64, a: i64| s + a, 10));
        dispatch.dispatch(2);
        dispatch.dispatch(3);
        let ((state, _), _, _) = h.render(|hooks| hooks.use_reducer(|s: &i64, a: i64| s * a, 0));
        assert_eq!(state, 15);

        // Next dispatch uses the reducer from the latest render
        dispatch.dispatch(2);
        let ((state, _), _, _) = h.render(|hooks| hooks.use_reducer(|s: &i64, a: i64| s * a, 0));
        assert_eq!(state, 30);
    }

    #[test]
    fn test_dispatch_after_unmount_is_ignored() {
        let mut h = setup();
        let ((_, set), _, _) = h.render(|hooks| hooks.use_state(|| 1));
        h.chain = None;
        set.dispatch(2);
        assert!(h.recorder.updates.borrow().is_empty());
    }

    // =========================================================================
    // Memo / ref
    // =========================================================================

    #[test]
    fn test_use_memo_recomputes_only_on_change() {
        let mut h = setup();
        let computed = Rc::new(Cell::new(0));
        let run = |h: &mut Harness, deps: Option<Deps>| {
            let c = computed.clone();
            h.render(|hooks| {
                *hooks.use_memo(
                    move || {
                        c.set(c.get() + 1);
                        c.get()
                    },
                    deps,
                )
            })
            .0
        };

        assert_eq!(run(&mut h, Some(vec![Value::from(1)])), 1);
        assert_eq!(run(&mut h, Some(vec![Value::from(1)])), 1);
        assert_eq!(run(&mut h, Some(vec![Value::from(2)])), 2);
        assert_eq!(run(&mut h, None), 3);
        assert_eq!(run(&mut h, None), 4);
    }

    #[test]
    fn test_use_callback_identity_follows_deps() {
        let mut h = setup();
        let mut run = |deps: i64| {
            h.render(|hooks| hooks.use_callback(|| {}, Some(vec![Value::from(deps)])))
                .0
        };
        let a = run(1);
        let b = run(1);
        let c = run(2);
        assert!(a.ptr_eq(&b));
        assert!(!b.ptr_eq(&c));
    }

    #[test]
    fn test_use_callback_ignores_added_deps() {
        let mut h = setup();
        let (a, _, _) = h.render(|hooks| hooks.use_callback(|| {}, Some(vec![])));
        let (b, _, _) = h.render(|hooks| hooks.use_callback(|| {}, Some(vec![Value::from(1)])));
        assert!(a.ptr_eq(&b));
    }

    #[test]
    fn test_use_ref_is_stable() {
        let mut h = setup();
        let (first, _, _) = h.render(|hooks| hooks.use_ref(|| 0u32));
        *first.borrow_mut() = 9;
        let (second, _, _) = h.render(|hooks| hooks.use_ref(|| 0u32));
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(*second.borrow(), 9);
    }

    // =========================================================================
    // Effects
    // =========================================================================

    #[test]
    fn test_effect_mount_always_fires() {
        let mut h = setup();
        let (_, effects, flags) = h.render(|hooks| hooks.use_effect(|| None, Some(vec![])));
        assert_eq!(effects.len(), 1);
        assert!(effects[0].fires(HookFlags::PASSIVE));
        assert!(flags.contains(Flags::PASSIVE));
    }

    #[test]
    fn test_effect_skips_when_deps_equal() {
        let mut h = setup();
        h.render(|hooks| hooks.use_effect(|| None, Some(vec![Value::from("a")])));
        let (_, effects, flags) =
            h.render(|hooks| hooks.use_effect(|| None, Some(vec![Value::from("a")])));
        assert!(!effects[0].fires(HookFlags::PASSIVE));
        assert!(!flags.contains(Flags::PASSIVE));

        let (_, effects, flags) =
            h.render(|hooks| hooks.use_effect(|| None, Some(vec![Value::from("b")])));
        assert!(effects[0].fires(HookFlags::PASSIVE));
        assert!(flags.contains(Flags::PASSIVE));
    }

    #[test]
    fn test_effect_without_deps_fires_every_render() {
        let mut h = setup();
        h.render(|hooks| hooks.use_layout_effect(|| None, None));
        let (_, effects, flags) = h.render(|hooks| hooks.use_layout_effect(|| None, None));
        assert!(effects[0].fires(HookFlags::LAYOUT));
        assert_eq!(flags, Flags::LAYOUT);
    }

    #[test]
    fn test_effect_generations_share_cleanup() {
        let mut h = setup();
        let destroyed = Rc::new(Cell::new(false));
        let d = destroyed.clone();
        let (_, first, _) = h.render(move |hooks| {
            hooks.use_effect(move || cleanup(move || d.set(true)), None)
        });
        first[0].create();

        let (_, second, _) = h.render(|hooks| hooks.use_effect(|| None, None));
        second[0].destroy();
        assert!(destroyed.get());
    }

    // =========================================================================
    // Order and context
    // =========================================================================

    #[test]
    fn test_changed_hook_order_reinitialises_slot() {
        let mut h = setup();
        h.render(|hooks| hooks.use_state(|| 1));
        let (value, _, _) = h.render(|hooks| *hooks.use_memo(|| "memo", None));
        assert_eq!(value, "memo");
        let ((state, _), _, _) = h.render(|hooks| hooks.use_state(|| 7));
        assert_eq!(state, 7);
    }

    #[test]
    fn test_use_context_reads_stack() {
        let mut h = setup();
        let theme = Context::new("light");
        let t = theme.clone();
        let (v, _, _) = h.render(move |hooks| hooks.use_context(&t));
        assert_eq!(v, Value::from("light"));

        h.contexts.push(&theme, Value::from("dark"));
        let (v, _, _) = h.render(|hooks| hooks.use_context(&theme));
        assert_eq!(v, Value::from("dark"));
        assert!(h.chain.as_ref().is_some_and(Vec::is_empty));
    }

    // =========================================================================
    // Dependency comparison
    // =========================================================================

    #[test]
    fn test_absent_previous_deps_is_change() {
        assert!(!are_hook_inputs_equal(&[], None));
        assert!(are_hook_inputs_equal(&[], Some(&[])));
    }

    proptest! {
        #[test]
        fn prop_inputs_equal_iff_no_index_differs(
            prev in proptest::collection::vec(0i64..4, 0..6),
            next in proptest::collection::vec(0i64..4, 0..6),
        ) {
            let prev_values: Vec<Value> = prev.iter().copied().map(Value::from).collect();
            let next_values: Vec<Value> = next.iter().copied().map(Value::from).collect();
            let differs = next.iter().zip(&prev).any(|(a, b)| a != b);
            prop_assert_eq!(
                are_hook_inputs_equal(&next_values, Some(&prev_values)),
                !differs
            );
        }
    }
}
