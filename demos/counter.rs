//! Counter demo - state, effects and keyed lists on the in-memory host.
//!
//! Run with: cargo run --example counter

use std::rc::Rc;

use spark_fiber::{
    Element, FunctionComponent, LocalEventLoop, MemoryHost, Node, Renderer, Scheduler,
    SystemClock, cleanup,
};
use spark_signals::effect;

fn main() {
    let event_loop = Rc::new(LocalEventLoop::new(SystemClock::new()));
    let host = Rc::new(MemoryHost::new());
    let container = host.create_container("app");
    let renderer = Renderer::new(host.clone(), Scheduler::new(event_loop.clone()));
    let root = renderer.create_root(container);

    let item = FunctionComponent::new("Item", |props, _| {
        let label = props.get("label").and_then(|v| v.to_text()).unwrap_or_default();
        Element::host("li").child(label).into()
    });

    let counter = FunctionComponent::new("Counter", move |_, hooks| {
        let (count, set_count) = hooks.use_state(|| 0i64);

        hooks.use_effect(
            move || {
                println!("  effect: count is {count}");
                cleanup(move || println!("  cleanup: count was {count}"))
            },
            Some(vec![count.into()]),
        );

        let rows = (0..count).rev().map(|n| {
            Node::from(item.element().key(n).prop("label", format!("row {n}")))
        });

        Element::host("div")
            .children([
                Node::from(
                    Element::host("button")
                        .on("click", move || set_count.dispatch(count + 1))
                        .child(format!("clicked {count} times")),
                ),
                Node::from(Element::host("ul").children(rows)),
            ])
            .into()
    });

    // Print the tree after every commit
    let revision = renderer.revision(root).expect("root exists");
    let markup_host = host.clone();
    let _stop = effect(move || {
        let commit = revision.get();
        if commit > 0 {
            println!("commit {commit}: {}", markup_host.to_markup(container));
        }
    });

    renderer.render(root, counter.element()).expect("render");
    event_loop.run_until_idle();

    for _ in 0..3 {
        let button = host.find(container, "button").expect("button mounted");
        host.click(button);
        event_loop.run_until_idle();
    }

    renderer.unmount(root).expect("unmount");
    event_loop.run_until_idle();
    println!(
        "host nodes: {} live, {} created",
        host.node_count(),
        host.created_count()
    );
}
