//! Complete phase - create host nodes and compute host update payloads.
//!
//! Runs bottom-up as the work loop unwinds. A new host element is created,
//! gets every host descendant appended (the subtree is not attached to the
//! document yet, so this is free), then receives its initial props. An
//! existing host element only records what changed.

use std::rc::Rc;

use crate::element::{event_name_of, ElementType, Node, Props};
use crate::engine::{FiberArena, FiberId, FiberProps, Flags, PropChange, StateNode, WorkTag};
use crate::error::{ReconcileError, Result};
use crate::host::{HostConfig, HostNode};

use super::ContextStack;

/// Non-empty text passed directly as an element's children.
pub(crate) fn direct_text(props: &Props) -> Option<Rc<str>> {
    match props.children() {
        Node::Text(text) if !text.is_empty() => Some(text.clone()),
        _ => None,
    }
}

pub(crate) fn complete_work(
    arena: &mut FiberArena,
    host: &dyn HostConfig,
    contexts: &mut ContextStack,
    wip: FiberId,
) -> Result<()> {
    let tag = arena[wip].tag;
    match tag {
        WorkTag::HostRoot
        | WorkTag::FunctionComponent
        | WorkTag::ClassComponent
        | WorkTag::Fragment
        | WorkTag::ContextConsumer => Ok(()),
        WorkTag::ContextProvider => match &arena[wip].element_type {
            Some(ElementType::Provider(context)) => {
                contexts.pop(context);
                Ok(())
            }
            _ => Err(ReconcileError::UnexpectedPayload {
                tag,
                phase: "complete",
            }),
        },
        WorkTag::HostText => complete_host_text(arena, host, wip),
        WorkTag::HostComponent => complete_host_component(arena, host, wip),
    }
}

fn complete_host_text(arena: &mut FiberArena, host: &dyn HostConfig, wip: FiberId) -> Result<()> {
    let FiberProps::Text(text) = &arena[wip].pending_props else {
        return Err(ReconcileError::UnexpectedPayload {
            tag: WorkTag::HostText,
            phase: "complete",
        });
    };
    let text = text.clone();

    let existing = arena[wip].state_node.host();
    match (arena[wip].alternate, existing) {
        (Some(current), Some(_)) => {
            let old = arena[current]
                .memoized_props
                .as_ref()
                .and_then(|p| p.as_text().map(Rc::<str>::from));
            if old.as_deref() != Some(&*text) {
                arena[wip].flags |= Flags::UPDATE;
            }
        }
        _ => {
            let node = host.create_text_instance(&text);
            arena[wip].state_node = StateNode::Host(node);
        }
    }
    Ok(())
}

fn complete_host_component(
    arena: &mut FiberArena,
    host: &dyn HostConfig,
    wip: FiberId,
) -> Result<()> {
    let unexpected = ReconcileError::UnexpectedPayload {
        tag: WorkTag::HostComponent,
        phase: "complete",
    };
    let props = arena[wip].props().cloned().ok_or(unexpected.clone())?;
    let Some(ElementType::Host(tag)) = arena[wip].element_type.clone() else {
        return Err(unexpected);
    };

    if let (Some(current), Some(_)) = (arena[wip].alternate, arena[wip].state_node.host()) {
        let old = arena[current]
            .memoized_props
            .as_ref()
            .and_then(FiberProps::as_props)
            .cloned()
            .unwrap_or_default();
        let payload = diff_properties(&old, &props);
        if !payload.is_empty() {
            let fiber = &mut arena[wip];
            // Old element children must leave before the text replaces them
            if direct_text(&old).is_none() && direct_text(&props).is_some() {
                fiber.flags |= Flags::CONTENT_RESET;
            }
            fiber.update_payload = payload;
            fiber.flags |= Flags::UPDATE;
        }
        return Ok(());
    }

    let node = host.create_instance(&tag);
    append_all_children(arena, host, node, wip)?;
    finalize_initial_children(host, node, &props)?;
    arena[wip].state_node = StateNode::Host(node);
    Ok(())
}

/// Attach the nearest host descendants of `wip` to `parent`, looking
/// through components and fragments.
fn append_all_children(
    arena: &FiberArena,
    host: &dyn HostConfig,
    parent: HostNode,
    wip: FiberId,
) -> Result<()> {
    let mut next = arena[wip].child;
    while let Some(node) = next {
        let fiber = &arena[node];
        if fiber.tag.is_host() {
            let child = fiber
                .state_node
                .host()
                .ok_or(ReconcileError::MissingHostNode(fiber.tag))?;
            host.append_child(parent, child)?;
        } else if let Some(child) = fiber.child {
            next = Some(child);
            continue;
        }

        let mut cursor = node;
        while arena[cursor].sibling.is_none() {
            match arena[cursor].return_fiber {
                Some(parent_fiber) if parent_fiber != wip => cursor = parent_fiber,
                _ => return Ok(()),
            }
        }
        next = arena[cursor].sibling;
    }
    Ok(())
}

fn finalize_initial_children(host: &dyn HostConfig, node: HostNode, props: &Props) -> Result<()> {
    for (name, value) in props.attributes() {
        match event_name_of(name) {
            Some(event) => {
                if let Some(listener) = value.as_callback() {
                    host.add_event_listener(node, &event, listener.clone())?;
                }
            }
            None if value.is_null() => {}
            None => host.set_property(node, name, value)?,
        }
    }
    if let Some(text) = direct_text(props) {
        host.set_text_content(node, &text)?;
    }
    Ok(())
}

/// Host changes between two prop sets. Identity-equal values produce
/// nothing; a changed listener is removed before the new one is added.
pub(crate) fn diff_properties(old: &Props, new: &Props) -> Vec<PropChange> {
    if old.ptr_eq(new) {
        return Vec::new();
    }
    let mut changes = Vec::new();

    for (name, value) in old.attributes() {
        if new.get(name).is_some() || value.is_null() {
            continue;
        }
        match event_name_of(name) {
            Some(event) => changes.push(PropChange::RemoveListener(event)),
            None => changes.push(PropChange::Remove(Rc::from(name))),
        }
    }

    for (name, value) in new.attributes() {
        let previous = old.get(name).filter(|v| !v.is_null());
        if previous.is_some_and(|p| p.is_same(value)) {
            continue;
        }
        match event_name_of(name) {
            Some(event) => {
                if previous.is_some() {
                    changes.push(PropChange::RemoveListener(event.clone()));
                }
                if let Some(listener) = value.as_callback() {
                    changes.push(PropChange::AddListener(event, listener.clone()));
                }
            }
            None if value.is_null() => {
                if previous.is_some() {
                    changes.push(PropChange::Remove(Rc::from(name)));
                }
            }
            None => changes.push(PropChange::Set(Rc::from(name), value.clone())),
        }
    }

    let old_text = direct_text(old);
    let new_text = direct_text(new);
    if old_text != new_text {
        changes.push(PropChange::Text(new_text));
    }
    changes
}
