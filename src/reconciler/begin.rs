//! Begin phase - render a node and reconcile its children.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{trace, warn};

use crate::element::{ConsumerRender, ElementType, Node, Props, CONSUMER_RENDER_PROP, PROVIDER_VALUE_PROP};
use crate::engine::{FiberId, Lanes, MemoizedState, StateNode, WorkTag};
use crate::error::{ReconcileError, Result};
use crate::hooks::Hooks;

use super::complete::direct_text;
use super::work_loop::WorkLoop;
use super::ChildReconciler;

impl WorkLoop<'_> {
    /// Returns the first child to work on next, if any.
    pub(super) fn begin_work(&mut self, unit: FiberId) -> Result<Option<FiberId>> {
        let (tag, current) = {
            let mut tree = self.tree.borrow_mut();
            let fiber = &mut tree.arena[unit];
            fiber.lanes = Lanes::empty();
            fiber.child_lanes = Lanes::empty();
            (fiber.tag, fiber.alternate)
        };
        trace!(fiber = %unit, ?tag, "begin work");

        match tag {
            WorkTag::HostRoot => self.update_host_root(unit, current),
            WorkTag::HostComponent => self.update_host_component(unit, current),
            WorkTag::HostText => Ok(None),
            WorkTag::Fragment => self.update_fragment(unit, current),
            WorkTag::FunctionComponent => self.update_function_component(unit, current),
            WorkTag::ClassComponent => self.update_class_component(unit, current),
            WorkTag::ContextProvider => self.update_context_provider(unit, current),
            WorkTag::ContextConsumer => self.update_context_consumer(unit, current),
        }
    }

    fn reconcile_children(
        &mut self,
        unit: FiberId,
        current: Option<FiberId>,
        children: &Node,
    ) -> Result<Option<FiberId>> {
        let mut tree = self.tree.borrow_mut();
        let arena = &mut tree.arena;
        let mounting = current.is_none()
            || (arena[unit].tag == WorkTag::HostRoot && self.first_render);
        let reconciler = if mounting {
            ChildReconciler::mount()
        } else {
            ChildReconciler::update()
        };
        let current_first_child = current.and_then(|c| arena[c].child);
        let child = reconciler.reconcile_child_fibers(arena, unit, current_first_child, children);
        arena[unit].child = child;
        Ok(child)
    }

    fn element_props(&self, unit: FiberId, tag: WorkTag) -> Result<Props> {
        self.tree.borrow().arena[unit]
            .props()
            .cloned()
            .ok_or(ReconcileError::UnexpectedPayload { tag, phase: "begin" })
    }

    fn update_host_root(&mut self, unit: FiberId, current: Option<FiberId>) -> Result<Option<FiberId>> {
        let element = match &self.tree.borrow().arena[unit].memoized_state {
            MemoizedState::Root(element) => element.clone(),
            _ => {
                return Err(ReconcileError::UnexpectedPayload {
                    tag: WorkTag::HostRoot,
                    phase: "begin",
                })
            }
        };
        self.reconcile_children(unit, current, &element)
    }

    fn update_host_component(
        &mut self,
        unit: FiberId,
        current: Option<FiberId>,
    ) -> Result<Option<FiberId>> {
        let props = self.element_props(unit, WorkTag::HostComponent)?;
        // Text content is set on the element itself at complete/commit
        if direct_text(&props).is_some() {
            self.reconcile_children(unit, current, &Node::Empty)?;
            return Ok(None);
        }
        self.reconcile_children(unit, current, props.children())
    }

    fn update_fragment(&mut self, unit: FiberId, current: Option<FiberId>) -> Result<Option<FiberId>> {
        let props = self.element_props(unit, WorkTag::Fragment)?;
        self.reconcile_children(unit, current, props.children())
    }

    fn update_function_component(
        &mut self,
        unit: FiberId,
        current: Option<FiberId>,
    ) -> Result<Option<FiberId>> {
        let (component, props, chain) = {
            let tree = self.tree.borrow();
            let fiber = &tree.arena[unit];
            let Some(ElementType::Function(component)) = fiber.element_type.clone() else {
                return Err(ReconcileError::UnexpectedPayload {
                    tag: WorkTag::FunctionComponent,
                    phase: "begin",
                });
            };
            let props = fiber.props().cloned().unwrap_or_default();
            let chain = current.and_then(|c| tree.arena[c].memoized_state.hooks().cloned());
            (component, props, chain)
        };

        let mut hooks = Hooks::new(unit, self.root, chain, &self.contexts, self.updater.clone());
        let children = component.render(&props, &mut hooks);
        let rendered = hooks.finish();

        {
            let mut tree = self.tree.borrow_mut();
            let fiber = &mut tree.arena[unit];
            fiber.memoized_state = MemoizedState::Hooks(rendered.chain);
            fiber.effects = rendered.effects;
            fiber.flags |= rendered.flags;
        }
        self.reconcile_children(unit, current, &children)
    }

    fn update_class_component(
        &mut self,
        unit: FiberId,
        current: Option<FiberId>,
    ) -> Result<Option<FiberId>> {
        let (def, props, instance) = {
            let tree = self.tree.borrow();
            let fiber = &tree.arena[unit];
            let Some(ElementType::Class(def)) = fiber.element_type.clone() else {
                return Err(ReconcileError::UnexpectedPayload {
                    tag: WorkTag::ClassComponent,
                    phase: "begin",
                });
            };
            let instance = match &fiber.state_node {
                StateNode::Instance(instance) => Some(instance.clone()),
                _ => None,
            };
            (def, fiber.props().cloned().unwrap_or_default(), instance)
        };

        let instance = match instance {
            Some(instance) => instance,
            None => {
                let instance = Rc::new(RefCell::new(def.construct(&props)));
                self.tree.borrow_mut().arena[unit].state_node = StateNode::Instance(instance.clone());
                instance
            }
        };

        let context = def.context_type().map(|ctx| self.contexts.read(ctx));
        let children = instance.borrow_mut().render(&props, context.as_ref());
        self.reconcile_children(unit, current, &children)
    }

    fn update_context_provider(
        &mut self,
        unit: FiberId,
        current: Option<FiberId>,
    ) -> Result<Option<FiberId>> {
        let (context, props) = {
            let tree = self.tree.borrow();
            let fiber = &tree.arena[unit];
            let Some(ElementType::Provider(context)) = fiber.element_type.clone() else {
                return Err(ReconcileError::UnexpectedPayload {
                    tag: WorkTag::ContextProvider,
                    phase: "begin",
                });
            };
            (context, fiber.props().cloned().unwrap_or_default())
        };
        let value = props.get(PROVIDER_VALUE_PROP).cloned().unwrap_or_default();
        self.contexts.push(&context, value);
        self.reconcile_children(unit, current, props.children())
    }

    fn update_context_consumer(
        &mut self,
        unit: FiberId,
        current: Option<FiberId>,
    ) -> Result<Option<FiberId>> {
        let (context, props) = {
            let tree = self.tree.borrow();
            let fiber = &tree.arena[unit];
            let Some(ElementType::Consumer(context)) = fiber.element_type.clone() else {
                return Err(ReconcileError::UnexpectedPayload {
                    tag: WorkTag::ContextConsumer,
                    phase: "begin",
                });
            };
            (context, fiber.props().cloned().unwrap_or_default())
        };

        let value = self.contexts.read(&context);
        let render = props
            .get(CONSUMER_RENDER_PROP)
            .and_then(|v| v.downcast::<ConsumerRender>());
        let children = match render {
            Some(render) => render.call(&value),
            None => {
                warn!(fiber = %unit, "context consumer without a render function");
                Node::Empty
            }
        };
        self.reconcile_children(unit, current, &children)
    }
}
