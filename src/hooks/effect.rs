//! Effect records.
//!
//! An effect record is created on every render that declares the effect.
//! The `inst` handle is shared by all records of the same slot across
//! renders, so the cleanup returned by one generation's create is what the
//! next generation (or unmount) destroys.

use std::cell::RefCell;
use std::rc::Rc;

use bitflags::bitflags;

use super::Deps;

bitflags! {
    /// Effect record tags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct HookFlags: u8 {
        /// The effect must fire this commit.
        const HAS_EFFECT = 1;
        const LAYOUT = 1 << 2;
        const PASSIVE = 1 << 3;
    }
}

/// Cleanup returned by an effect.
pub type Destroy = Box<dyn FnOnce()>;

type Create = Box<dyn FnOnce() -> Option<Destroy>>;

/// Wrap a cleanup closure for returning from an effect body.
pub fn cleanup(f: impl FnOnce() + 'static) -> Option<Destroy> {
    Some(Box::new(f))
}

/// Slot-lifetime state shared across effect generations.
#[derive(Default)]
pub(crate) struct EffectInstance {
    destroy: RefCell<Option<Destroy>>,
}

impl EffectInstance {
    pub(crate) fn take_destroy(&self) -> Option<Destroy> {
        self.destroy.borrow_mut().take()
    }
}

pub struct Effect {
    tag: HookFlags,
    inst: Rc<EffectInstance>,
    create: RefCell<Option<Create>>,
    deps: Option<Deps>,
}

impl Effect {
    pub(crate) fn new(
        tag: HookFlags,
        inst: Rc<EffectInstance>,
        create: impl FnOnce() -> Option<Destroy> + 'static,
        deps: Option<Deps>,
    ) -> Self {
        Self {
            tag,
            inst,
            create: RefCell::new(Some(Box::new(create))),
            deps,
        }
    }

    pub fn tag(&self) -> HookFlags {
        self.tag
    }

    pub fn deps(&self) -> Option<&Deps> {
        self.deps.as_ref()
    }

    pub(crate) fn inst(&self) -> &Rc<EffectInstance> {
        &self.inst
    }

    /// True when this record fires for the given kind.
    pub(crate) fn fires(&self, kind: HookFlags) -> bool {
        self.tag.contains(HookFlags::HAS_EFFECT | kind)
    }

    /// Run the previous generation's cleanup, if any.
    pub(crate) fn destroy(&self) {
        // Taken first: the cleanup may schedule updates
        if let Some(destroy) = self.inst.take_destroy() {
            destroy();
        }
    }

    /// Run the create function and keep its cleanup. Runs at most once.
    pub(crate) fn create(&self) {
        let create = self.create.borrow_mut().take();
        if let Some(create) = create {
            let destroy = create();
            *self.inst.destroy.borrow_mut() = destroy;
        }
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("tag", &self.tag)
            .field("deps", &self.deps)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_create_then_destroy() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let inst = Rc::new(EffectInstance::default());
        let l = log.clone();
        let effect = Effect::new(
            HookFlags::HAS_EFFECT | HookFlags::PASSIVE,
            inst.clone(),
            move || {
                l.borrow_mut().push("create");
                let l = l.clone();
                cleanup(move || l.borrow_mut().push("destroy"))
            },
            None,
        );

        effect.create();
        effect.create();
        assert_eq!(*log.borrow(), vec!["create"]);
        effect.destroy();
        effect.destroy();
        assert_eq!(*log.borrow(), vec!["create", "destroy"]);
    }

    #[test]
    fn test_cleanup_shared_across_generations() {
        let destroyed = Rc::new(Cell::new(0));
        let inst = Rc::new(EffectInstance::default());
        let d = destroyed.clone();
        let first = Effect::new(
            HookFlags::HAS_EFFECT | HookFlags::LAYOUT,
            inst.clone(),
            move || cleanup(move || d.set(d.get() + 1)),
            Some(vec![]),
        );
        first.create();

        let second = Effect::new(HookFlags::LAYOUT, inst, || None, Some(vec![]));
        second.destroy();
        assert_eq!(destroyed.get(), 1);
        assert!(!second.fires(HookFlags::LAYOUT));
        assert!(first.fires(HookFlags::LAYOUT));
        assert!(!first.fires(HookFlags::PASSIVE));
    }
}
