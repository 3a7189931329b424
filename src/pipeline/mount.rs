//! Renderer - roots, update scheduling and the render/commit turn.
//!
//! ```ignore
//! let event_loop = Rc::new(LocalEventLoop::new(SystemClock::new()));
//! let host = Rc::new(MemoryHost::new());
//! let renderer = Renderer::new(host.clone(), Scheduler::new(event_loop.clone()));
//!
//! let root = renderer.create_root(host.create_container("app"));
//! renderer.render(root, app.element())?;
//! event_loop.run_until_idle();
//! ```
//!
//! `render` and every state dispatch only stage work. A root has at most
//! one scheduled render task; it runs at [`ROOT_PRIORITY`], renders the
//! whole root, commits, runs layout effects and queues deferred effects
//! for one flush task at [`PASSIVE_PRIORITY`].

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use spark_signals::Signal;
use tracing::{debug, error, trace};

use crate::element::Node;
use crate::engine::{FiberId, FiberTree, Lanes, RootId};
use crate::error::{ReconcileError, Result};
use crate::hooks::UpdateScheduler;
use crate::host::{HostConfig, HostNode};
use crate::reconciler::WorkLoop;
use crate::renderer::{commit_mutation_effects, PassiveEffects};
use crate::scheduler::{Priority, Scheduler, Task, TaskCallback};

/// Priority of root render tasks.
pub const ROOT_PRIORITY: Priority = Priority::Immediate;

/// Priority of the deferred-effect flush.
pub const PASSIVE_PRIORITY: Priority = Priority::Normal;

// =============================================================================
// Renderer
// =============================================================================

/// Handle to a renderer. Clones share the same roots and scheduler.
#[derive(Clone)]
pub struct Renderer {
    core: Rc<RendererCore>,
}

impl Renderer {
    pub fn new(host: Rc<dyn HostConfig>, scheduler: Scheduler) -> Self {
        let core = Rc::new_cyclic(|self_weak| RendererCore {
            scheduler,
            host,
            tree: RefCell::new(FiberTree::new()),
            pending: RefCell::new(PendingWork::default()),
            passive: RefCell::new(PendingPassive::default()),
            is_rendering: Cell::new(false),
            self_weak: self_weak.clone(),
        });
        Self { core }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.core.scheduler
    }

    /// Create a root rendering into `container`.
    pub fn create_root(&self, container: HostNode) -> RootId {
        let id = self.core.tree.borrow_mut().create_root(container);
        debug!(root = ?id, ?container, "root created");
        id
    }

    /// Stage `node` for the next render of `root`.
    ///
    /// Calling again before that render runs replaces the staged node.
    pub fn render(&self, root: RootId, node: impl Into<Node>) -> Result<()> {
        self.core.tree.borrow().root(root)?;
        self.core
            .pending
            .borrow_mut()
            .staged
            .insert(root, node.into());
        self.core.ensure_root_is_scheduled(root);
        Ok(())
    }

    /// Render nothing into `root`, unmounting everything in it.
    pub fn unmount(&self, root: RootId) -> Result<()> {
        self.render(root, Node::Empty)
    }

    /// Render and commit `root` now instead of waiting for its task.
    ///
    /// # Errors
    ///
    /// [`ReconcileError::ReentrantRender`] when called from inside a render.
    pub fn flush_sync(&self, root: RootId) -> Result<()> {
        self.core.tree.borrow().root(root)?;
        if self.core.is_rendering.get() {
            return Err(ReconcileError::ReentrantRender);
        }
        let scheduled = self.core.pending.borrow_mut().callbacks.remove(&root);
        if let Some(task) = scheduled {
            self.core.scheduler.cancel_callback(&task);
        }
        self.core.perform_work_on_root(root)
    }

    /// Run pending deferred effects now. Returns false if there were none.
    pub fn flush_passive_effects(&self) -> bool {
        self.core.flush_passive_effects()
    }

    /// Error that aborted the last scheduled render of `root`, if any.
    pub fn take_error(&self, root: RootId) -> Option<ReconcileError> {
        self.core.pending.borrow_mut().errors.remove(&root)
    }

    /// Commit counter of `root`; bumps after every commit.
    pub fn revision(&self, root: RootId) -> Option<Signal<u64>> {
        self.core
            .tree
            .borrow()
            .root(root)
            .ok()
            .map(|r| r.revision.clone())
    }

    pub fn has_pending_work(&self, root: RootId) -> bool {
        let pending = self.core.pending.borrow();
        pending.callbacks.contains_key(&root) || pending.staged.contains_key(&root)
    }

    /// Live nodes across all roots, both generations.
    pub fn fiber_count(&self) -> usize {
        self.core.tree.borrow().arena.len()
    }
}

// =============================================================================
// Core
// =============================================================================

#[derive(Default)]
struct PendingWork {
    staged: HashMap<RootId, Node>,
    updates: Vec<(FiberId, Lanes)>,
    callbacks: HashMap<RootId, Task>,
    errors: HashMap<RootId, ReconcileError>,
}

#[derive(Default)]
struct PendingPassive {
    effects: PassiveEffects,
    task: Option<Task>,
}

struct RendererCore {
    scheduler: Scheduler,
    host: Rc<dyn HostConfig>,
    tree: RefCell<FiberTree>,
    pending: RefCell<PendingWork>,
    passive: RefCell<PendingPassive>,
    is_rendering: Cell<bool>,
    self_weak: Weak<RendererCore>,
}

impl UpdateScheduler for RendererCore {
    fn schedule_update(&self, root: RootId, fiber: FiberId, lane: Lanes) {
        trace!(?root, %fiber, ?lane, "update scheduled");
        self.pending.borrow_mut().updates.push((fiber, lane));
        self.ensure_root_is_scheduled(root);
    }
}

impl RendererCore {
    fn ensure_root_is_scheduled(&self, root: RootId) {
        let mut pending = self.pending.borrow_mut();
        if pending.callbacks.contains_key(&root) {
            return;
        }
        let core = self.self_weak.clone();
        let task = self.scheduler.schedule_callback(
            ROOT_PRIORITY,
            TaskCallback::once(move || {
                if let Some(core) = core.upgrade() {
                    core.perform_scheduled_work(root);
                }
            }),
        );
        debug!(?root, task = task.id(), "root scheduled");
        pending.callbacks.insert(root, task);
    }

    fn perform_scheduled_work(&self, root: RootId) {
        self.pending.borrow_mut().callbacks.remove(&root);
        if let Err(err) = self.perform_work_on_root(root) {
            error!(?root, %err, "render aborted");
            self.pending.borrow_mut().errors.insert(root, err);
        }
    }

    /// One full render and commit of `root`.
    fn perform_work_on_root(&self, root: RootId) -> Result<()> {
        if self.is_rendering.get() {
            return Err(ReconcileError::ReentrantRender);
        }
        self.flush_passive_effects();

        let (element, updates) = {
            let mut pending = self.pending.borrow_mut();
            (pending.staged.remove(&root), std::mem::take(&mut pending.updates))
        };
        {
            let mut tree = self.tree.borrow_mut();
            tree.root(root)?;
            for (fiber, lane) in updates {
                tree.mark_update_lane_from_fiber_to_root(fiber, lane);
            }
        }

        let mut effects = {
            let _rendering = RenderingGuard::enter(&self.is_rendering);
            let updater: Weak<dyn UpdateScheduler> = self.self_weak.clone();
            let finished =
                WorkLoop::new(&self.tree, &*self.host, updater, root).render_root_sync(element)?;

            let mut tree = self.tree.borrow_mut();
            tree.root_mut(root)?.finished_work = Some(finished);
            debug!(?root, %finished, "commit root");
            let effects = commit_mutation_effects(&mut tree, &*self.host, root, finished)?;

            let fiber_root = tree.root_mut(root)?;
            fiber_root.current = finished;
            fiber_root.finished_work = None;
            fiber_root.finished_lanes = std::mem::take(&mut fiber_root.pending_lanes);
            fiber_root.has_committed = true;
            effects
        };

        effects.run_layout();

        let revision = self.tree.borrow().root(root)?.revision.clone();
        revision.set(revision.get() + 1);

        if !effects.passive.is_empty() {
            self.schedule_passive_flush(&mut effects.passive);
        }
        Ok(())
    }

    fn schedule_passive_flush(&self, effects: &mut PassiveEffects) {
        let mut passive = self.passive.borrow_mut();
        passive.effects.append(effects);
        if passive.task.is_some() {
            return;
        }
        let core = self.self_weak.clone();
        passive.task = Some(self.scheduler.schedule_callback(
            PASSIVE_PRIORITY,
            TaskCallback::once(move || {
                if let Some(core) = core.upgrade() {
                    core.flush_passive_effects();
                }
            }),
        ));
    }

    fn flush_passive_effects(&self) -> bool {
        let (effects, task) = {
            let mut passive = self.passive.borrow_mut();
            (std::mem::take(&mut passive.effects), passive.task.take())
        };
        if let Some(task) = task {
            self.scheduler.cancel_callback(&task);
        }
        if effects.is_empty() {
            return false;
        }
        debug!(
            unmounts = effects.unmounts.len(),
            mounts = effects.mounts.len(),
            "flush passive effects"
        );
        effects.run();
        true
    }
}

/// Marks the renderer busy for the render and mutation phases.
struct RenderingGuard<'a>(&'a Cell<bool>);

impl<'a> RenderingGuard<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for RenderingGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{ClassComponent, ClassDef, Context, Element, FunctionComponent, Props};
    use crate::hooks::{cleanup, Dispatch};
    use crate::host::MemoryHost;
    use crate::scheduler::{LocalEventLoop, ManualClock};
    use crate::types::Value;
    use spark_signals::effect;

    struct Fixture {
        event_loop: Rc<LocalEventLoop<ManualClock>>,
        host: Rc<MemoryHost>,
        renderer: Renderer,
        container: HostNode,
        root: RootId,
    }

    fn setup() -> Fixture {
        let event_loop = Rc::new(LocalEventLoop::new(ManualClock::new()));
        let scheduler = Scheduler::new(event_loop.clone());
        let host = Rc::new(MemoryHost::new());
        let container = host.create_container("root");
        let renderer = Renderer::new(host.clone(), scheduler);
        let root = renderer.create_root(container);
        Fixture {
            event_loop,
            host,
            renderer,
            container,
            root,
        }
    }

    impl Fixture {
        fn markup(&self) -> String {
            self.host.to_markup(self.container)
        }

        fn run(&self) {
            self.event_loop.run_until_idle();
        }

        fn mount(&self, node: impl Into<Node>) {
            self.renderer.render(self.root, node).expect("render");
            self.run();
        }
    }

    fn counter() -> FunctionComponent {
        FunctionComponent::new("Counter", |_, hooks| {
            let (count, set_count) = hooks.use_state(|| 0i64);
            Element::host("button")
                .on("click", move || set_count.dispatch(count + 1))
                .child(count)
                .into()
        })
    }

    fn items(keys: &[&str]) -> Element {
        Element::host("ul").children(
            keys.iter()
                .map(|k| Node::from(Element::host("li").key(*k).child(*k))),
        )
    }

    #[test]
    fn test_render_waits_for_scheduler() {
        let f = setup();
        f.renderer.render(f.root, Element::host("div")).expect("render");
        assert_eq!(f.markup(), "");
        assert!(f.renderer.has_pending_work(f.root));
        f.run();
        assert_eq!(f.markup(), "<div></div>");
        assert!(!f.renderer.has_pending_work(f.root));
    }

    #[test]
    fn test_last_render_wins() {
        let f = setup();
        let renders = Rc::new(Cell::new(0));
        let r = renders.clone();
        let app = FunctionComponent::new("App", move |props, _| {
            r.set(r.get() + 1);
            Element::host("p")
                .child(props.get("label").and_then(Value::to_text))
                .into()
        });
        f.renderer.render(f.root, app.element().prop("label", "first")).expect("render");
        f.renderer.render(f.root, app.element().prop("label", "second")).expect("render");
        f.run();
        assert_eq!(f.markup(), "<p>second</p>");
        assert_eq!(renders.get(), 1);
    }

    #[test]
    fn test_counter_click_updates_text() {
        let f = setup();
        f.mount(counter().element());
        assert_eq!(f.markup(), "<button>0</button>");

        let button = f.host.find(f.container, "button").expect("button");
        assert!(f.host.click(button));
        assert!(f.renderer.has_pending_work(f.root));
        f.run();
        assert_eq!(f.markup(), "<button>1</button>");

        f.host.click(button);
        f.host.click(button);
        f.run();
        assert_eq!(f.markup(), "<button>2</button>");
        assert_eq!(f.host.find(f.container, "button"), Some(button));
    }

    #[test]
    fn test_keyed_reorder_keeps_host_nodes() {
        let f = setup();
        f.mount(items(&["a", "b", "c"]));
        let list = f.host.find(f.container, "ul").expect("ul");
        let b = f.host.children(list)[1];

        f.mount(items(&["c", "a", "b"]));
        assert_eq!(f.markup(), "<ul><li>c</li><li>a</li><li>b</li></ul>");
        assert_eq!(f.host.children(list)[2], b);

        f.mount(items(&["b"]));
        assert_eq!(f.markup(), "<ul><li>b</li></ul>");
        assert_eq!(f.host.children(list), vec![b]);
    }

    #[test]
    fn test_effect_order_and_cleanup() {
        let f = setup();
        let log = Rc::new(RefCell::new(Vec::<String>::new()));
        let l = log.clone();
        let fx = FunctionComponent::new("Fx", move |props, hooks| {
            let n = props.get("n").and_then(Value::as_int).unwrap_or(0);
            let layout = l.clone();
            hooks.use_layout_effect(
                move || {
                    layout.borrow_mut().push(format!("layout {n}"));
                    cleanup(move || layout.borrow_mut().push(format!("layout cleanup {n}")))
                },
                Some(vec![Value::from(n)]),
            );
            let passive = l.clone();
            hooks.use_effect(
                move || {
                    passive.borrow_mut().push(format!("passive {n}"));
                    cleanup(move || passive.borrow_mut().push(format!("passive cleanup {n}")))
                },
                Some(vec![Value::from(n)]),
            );
            Node::Empty
        });

        f.renderer.render(f.root, fx.element().prop("n", 0)).expect("render");
        f.renderer.flush_sync(f.root).expect("flush");
        assert_eq!(*log.borrow(), vec!["layout 0"]);
        f.run();
        assert_eq!(*log.borrow(), vec!["layout 0", "passive 0"]);

        log.borrow_mut().clear();
        f.mount(fx.element().prop("n", 0));
        assert!(log.borrow().is_empty());

        f.mount(fx.element().prop("n", 1));
        assert_eq!(
            *log.borrow(),
            vec!["layout cleanup 0", "layout 1", "passive cleanup 0", "passive 1"]
        );

        log.borrow_mut().clear();
        f.renderer.unmount(f.root).expect("unmount");
        f.renderer.flush_sync(f.root).expect("flush");
        assert_eq!(*log.borrow(), vec!["layout cleanup 1"]);
        f.run();
        assert_eq!(*log.borrow(), vec!["layout cleanup 1", "passive cleanup 1"]);
    }

    #[test]
    fn test_pending_passive_effects_flush_before_next_render() {
        let f = setup();
        let log = Rc::new(RefCell::new(Vec::<&str>::new()));
        let l = log.clone();
        let app = FunctionComponent::new("App", move |_, hooks| {
            l.borrow_mut().push("render");
            let passive = l.clone();
            hooks.use_effect(
                move || {
                    passive.borrow_mut().push("effect");
                    None
                },
                None,
            );
            Node::Empty
        });
        f.renderer.render(f.root, app.element()).expect("render");
        f.renderer.flush_sync(f.root).expect("flush");
        f.renderer.render(f.root, app.element()).expect("render");
        f.renderer.flush_sync(f.root).expect("flush");
        assert_eq!(*log.borrow(), vec!["render", "effect", "render"]);
        assert!(f.renderer.flush_passive_effects());
        assert!(!f.renderer.flush_passive_effects());
    }

    #[test]
    fn test_context_reaches_class_and_consumer() {
        struct Label;

        impl ClassComponent for Label {
            fn render(&mut self, _props: &Props, context: Option<&Value>) -> Node {
                Element::host("span")
                    .child(context.and_then(Value::to_text).unwrap_or_default())
                    .into()
            }
        }

        let f = setup();
        let theme = Context::new("light");
        let label = ClassDef::with_context("Label", theme.clone(), |_| Box::new(Label));
        let consumer = theme.consumer(|value| {
            Element::host("b")
                .child(value.to_text().unwrap_or_default())
                .into()
        });

        f.mount(Element::host("div").children([
            Node::from(theme.provider("dark").child(label.element())),
            Node::from(label.element()),
            Node::from(consumer),
        ]));
        assert_eq!(
            f.markup(),
            "<div><span>dark</span><span>light</span><b>light</b></div>"
        );
    }

    #[test]
    fn test_class_instance_persists_and_unmounts() {
        struct Tally {
            renders: i64,
            unmounted: Rc<Cell<bool>>,
        }

        impl ClassComponent for Tally {
            fn render(&mut self, _props: &Props, _context: Option<&Value>) -> Node {
                self.renders += 1;
                Element::host("i").child(self.renders).into()
            }

            fn component_will_unmount(&mut self) {
                self.unmounted.set(true);
            }
        }

        let f = setup();
        let unmounted = Rc::new(Cell::new(false));
        let u = unmounted.clone();
        let tally = ClassDef::new("Tally", move |_| {
            Box::new(Tally {
                renders: 0,
                unmounted: u.clone(),
            })
        });

        f.mount(tally.element());
        f.mount(tally.element());
        assert_eq!(f.markup(), "<i>2</i>");

        f.renderer.unmount(f.root).expect("unmount");
        f.renderer.flush_sync(f.root).expect("flush");
        assert!(unmounted.get());
        assert_eq!(f.markup(), "");
    }

    #[test]
    fn test_deleted_nodes_are_reclaimed() {
        let f = setup();
        let toggled = FunctionComponent::new("Toggled", |props, _| {
            let on = props.get("on").and_then(Value::as_bool).unwrap_or(false);
            let body = on.then(|| items(&["a", "b", "c"]));
            Element::host("section").child(body).into()
        });

        f.mount(toggled.element().prop("on", false));
        f.mount(toggled.element().prop("on", false));
        let baseline = f.renderer.fiber_count();
        for _ in 0..3 {
            f.mount(toggled.element().prop("on", true));
            f.mount(toggled.element().prop("on", false));
        }
        assert_eq!(f.renderer.fiber_count(), baseline);
        assert_eq!(f.markup(), "<section></section>");
    }

    #[test]
    fn test_dispatch_after_unmount_is_ignored() {
        let f = setup();
        let captured: Rc<RefCell<Option<Dispatch<i64>>>> = Rc::new(RefCell::new(None));
        let c = captured.clone();
        let app = FunctionComponent::new("App", move |_, hooks| {
            let (value, set_value) = hooks.use_state(|| 0i64);
            *c.borrow_mut() = Some(set_value);
            Node::from(value)
        });
        f.mount(app.element());
        assert_eq!(f.markup(), "0");

        f.renderer.unmount(f.root).expect("unmount");
        f.run();
        let dispatch = captured.borrow_mut().take().expect("dispatch");
        dispatch.dispatch(5);
        assert!(!f.renderer.has_pending_work(f.root));
        assert_eq!(f.markup(), "");
    }

    #[test]
    fn test_flush_sync_inside_render_is_rejected() {
        let f = setup();
        let slot: Rc<RefCell<Option<Renderer>>> = Rc::new(RefCell::new(None));
        let outcome: Rc<RefCell<Option<Result<()>>>> = Rc::new(RefCell::new(None));
        let (s, o, root) = (slot.clone(), outcome.clone(), f.root);
        let app = FunctionComponent::new("App", move |_, _| {
            if let Some(renderer) = s.borrow().as_ref() {
                *o.borrow_mut() = Some(renderer.flush_sync(root));
            }
            Node::Empty
        });
        *slot.borrow_mut() = Some(f.renderer.clone());
        f.mount(app.element());
        slot.borrow_mut().take();
        assert_eq!(outcome.borrow_mut().take(), Some(Err(ReconcileError::ReentrantRender)));
    }

    #[test]
    fn test_host_failure_is_recorded() {
        let f = setup();
        let orphan = f.renderer.create_root(HostNode(u64::MAX));
        f.renderer.render(orphan, Element::host("div")).expect("render");
        f.run();
        assert!(matches!(f.renderer.take_error(orphan), Some(ReconcileError::Host(_))));
        assert_eq!(f.renderer.take_error(orphan), None);
        assert_eq!(f.renderer.take_error(f.root), None);
    }

    #[test]
    fn test_unknown_root() {
        let f = setup();
        let bogus = RootId(42);
        assert_eq!(f.renderer.render(bogus, Node::Empty), Err(ReconcileError::UnknownRoot(bogus)));
        assert_eq!(f.renderer.flush_sync(bogus), Err(ReconcileError::UnknownRoot(bogus)));
        assert!(f.renderer.revision(bogus).is_none());
    }

    #[test]
    fn test_revision_signal_tracks_commits() {
        let f = setup();
        let seen = Rc::new(Cell::new(0u64));
        let s = seen.clone();
        let revision = f.renderer.revision(f.root).expect("root");
        let _stop = effect(move || s.set(revision.get()));

        assert_eq!(seen.get(), 0);
        f.mount(Element::host("div"));
        assert_eq!(seen.get(), 1);
        f.mount(Element::host("div").prop("id", "x"));
        assert_eq!(seen.get(), 2);
    }

    #[test]
    fn test_roots_render_independently() {
        let f = setup();
        let second_container = f.host.create_container("second");
        let second = f.renderer.create_root(second_container);

        f.renderer.render(f.root, counter().element()).expect("render");
        f.renderer.render(second, Element::host("aside").child("side")).expect("render");
        f.run();
        assert_eq!(f.markup(), "<button>0</button>");
        assert_eq!(f.host.to_markup(second_container), "<aside>side</aside>");

        let button = f.host.find(f.container, "button").expect("button");
        f.host.click(button);
        f.run();
        assert_eq!(f.markup(), "<button>1</button>");
        assert_eq!(f.host.to_markup(second_container), "<aside>side</aside>");
    }
}
