//! End-to-end render scenarios against the in-memory host.

use alloc::{rc::Rc, string::String, vec::Vec};
use core::{cell::Cell, time::Duration};

use crate::{
    describe::{Attributes, Component, Description, EventHandler, element},
    fiber::MutationTag,
    host::{HostRenderer, HostType, MemoryHost, MemoryNode},
    idle::{ManualIdleQueue, Root},
    reconcile::ReconcilePolicy,
    scheduler::{Session, UnitBudget, Unbounded, WorkStatus},
    RendererConfig, RenderError,
};

fn session() -> (Session<MemoryHost>, MemoryNode) {
    let session = Session::new(MemoryHost::new());
    let root = session.host().root();
    (session, root)
}

fn keyed_session() -> (Session<MemoryHost>, MemoryNode) {
    let config = RendererConfig::default().with_policy(ReconcilePolicy::Keyed);
    let session = Session::with_config(MemoryHost::new(), config);
    let root = session.host().root();
    (session, root)
}

fn greeting(value: &str) -> Description {
    element("div")
        .child(element("p").child(value))
        .build()
}

fn list(tags: &[&'static str]) -> Description {
    element("ul")
        .children(tags.iter().map(|tag| element(*tag)))
        .build()
}

fn keyed_list(keys: &[&str]) -> Description {
    element("ul")
        .children(
            keys.iter()
                .map(|key| element("li").key(*key).child(key.to_uppercase())),
        )
        .build()
}

#[test]
fn first_mount_creates_top_down_and_attaches_bottom_up() {
    let (mut session, root) = session();
    let report = session.render_blocking(greeting("hi"), root).unwrap();

    assert_eq!(
        session.host().call_log(),
        [
            "createNode(div#1)",
            "createNode(p#2)",
            "createNode(text#3, \"hi\")",
            "appendChild(p#2, text#3)",
            "appendChild(div#1, p#2)",
            "appendChild(root, div#1)",
        ]
    );
    assert_eq!(session.host().markup(), "<div><p>hi</p></div>");
    assert_eq!(report.placed, 3);
    assert!(report.deleted.is_empty());
}

#[test]
fn text_change_issues_a_single_set_attribute() {
    let (mut session, root) = session();
    session.render_blocking(greeting("hi"), root).unwrap();
    session.host_mut().take_calls();

    let report = session.render_blocking(greeting("bye"), root).unwrap();
    assert_eq!(
        session.host().call_log(),
        ["setAttribute(text#3, nodeValue, \"bye\")"]
    );
    assert_eq!(report.updated, 1);
    assert_eq!(report.attribute_changes, 1);
    assert_eq!(session.host().markup(), "<div><p>bye</p></div>");
}

#[test]
fn rendering_the_same_description_twice_is_a_noop() {
    let handler = EventHandler::new(|_| {});
    let description = element("form")
        .attr("id", "signup")
        .on("submit", handler)
        .child(element("input").attr("required", true))
        .child("Sign up")
        .build();
    let (mut session, root) = session();
    session.render_blocking(description.clone(), root).unwrap();
    session.host_mut().take_calls();

    let report = session.render_blocking(description, root).unwrap();
    assert!(report.is_noop());
    assert!(session.host().calls().is_empty());
}

#[test]
fn committed_tree_is_complete() {
    let (mut session, root) = session();
    session.render_blocking(list(&["a", "b", "c", "d"]), root).unwrap();
    session.render_blocking(list(&["a", "x", "c"]), root).unwrap();

    let arena = session.arena();
    let current = session.current_root().unwrap();
    for id in arena.preorder(current) {
        let fiber = &arena[id];
        assert_ne!(fiber.tag(), MutationTag::Deletion);
        assert!(fiber.alternate().is_none());
        if fiber.node_type().is_host() {
            assert!(fiber.host_node().is_some(), "{:?} has no host node", fiber.node_type());
        }
    }
    // Only the committed tree stays alive.
    assert_eq!(arena.len(), 5);
    assert!(session.deletions().is_empty());
}

#[test]
fn positional_replacement_keeps_sibling_order() {
    let (mut session, root) = session();
    session.render_blocking(list(&["a", "b", "c"]), root).unwrap();
    session.host_mut().take_calls();

    let report = session.render_blocking(list(&["a", "x", "c"]), root).unwrap();
    assert_eq!(
        session.host().call_log(),
        [
            "removeChild(ul#1, b#3)",
            "createNode(x#5)",
            "insertBefore(ul#1, x#5, c#4)",
        ]
    );
    assert_eq!(report.deleted, ["b"]);
    assert_eq!(session.host().markup(), "<ul><a></a><x></x><c></c></ul>");
}

#[test]
fn positional_growth_and_shrink() {
    let (mut session, root) = session();
    session.render_blocking(list(&["a", "c"]), root).unwrap();
    session.render_blocking(list(&["a", "b", "c"]), root).unwrap();
    assert_eq!(session.host().markup(), "<ul><a></a><b></b><c></c></ul>");

    session.render_blocking(list(&["a"]), root).unwrap();
    assert_eq!(session.host().markup(), "<ul><a></a></ul>");
    assert_eq!(session.host().live_nodes(), 2);
}

#[test]
fn keyed_insertion_only_places_the_new_child() {
    let (mut session, root) = keyed_session();
    session.render_blocking(keyed_list(&["a", "c"]), root).unwrap();
    session.host_mut().take_calls();

    let report = session.render_blocking(keyed_list(&["a", "b", "c"]), root).unwrap();
    assert!(report.deleted.is_empty());
    assert_eq!(report.placed, 2);
    let log = session.host().call_log();
    assert!(log.iter().all(|call| !call.starts_with("removeChild")));
    assert_eq!(log.last().map(String::as_str), Some("insertBefore(ul#1, li#6, li#4)"));
    assert_eq!(
        session.host().markup(),
        "<ul><li>A</li><li>B</li><li>C</li></ul>"
    );
}

#[test]
fn keyed_insertion_anchors_on_a_component_sibling() {
    let item = Component::new("Item", |_, _| Ok(element("li").child("C").build()));
    let items = |keys: &[&str]| {
        element("ul")
            .children(
                keys.iter()
                    .map(|key| element("li").key(*key).child(key.to_uppercase()).build()),
            )
            .child(item.describe(Attributes::new()).with_key("c"))
            .build()
    };
    let (mut session, root) = keyed_session();
    session.render_blocking(items(&["a"]), root).unwrap();
    session.host_mut().take_calls();

    let report = session.render_blocking(items(&["a", "b"]), root).unwrap();
    assert!(report.deleted.is_empty());
    assert_eq!(
        session.host().call_log(),
        [
            "createNode(li#6)",
            "createNode(text#7, \"B\")",
            "appendChild(li#6, text#7)",
            "insertBefore(ul#1, li#6, li#4)",
        ]
    );
    assert_eq!(
        session.host().markup(),
        "<ul><li>A</li><li>B</li><li>C</li></ul>"
    );
}

#[test]
fn long_lists_mount_with_appends_only() {
    let rows: Vec<Description> = (0..200)
        .map(|index| element("li").child(index.to_string()).build())
        .collect();
    let (mut session, root) = session();
    let report = session
        .render_blocking(element("ul").children(rows).build(), root)
        .unwrap();

    let log = session.host().call_log();
    assert_eq!(report.placed, 401);
    assert!(log.iter().all(|call| !call.starts_with("insertBefore")));
    assert_eq!(log.last().map(String::as_str), Some("appendChild(root, ul#1)"));
    assert_eq!(session.host().children(first_node(&session)).len(), 200);
}

#[test]
fn keyed_reorder_moves_without_recreating() {
    let (mut session, root) = keyed_session();
    session.render_blocking(keyed_list(&["a", "b", "c"]), root).unwrap();
    session.host_mut().take_calls();

    session.render_blocking(keyed_list(&["c", "a", "b"]), root).unwrap();
    let log = session.host().call_log();
    assert!(log.iter().all(|call| !call.starts_with("createNode")));
    assert!(log.iter().all(|call| !call.starts_with("removeChild")));
    assert_eq!(
        session.host().markup(),
        "<ul><li>C</li><li>A</li><li>B</li></ul>"
    );
}

#[test]
fn yielding_does_not_change_the_result() {
    let (mut at_once, root) = session();
    at_once.render_blocking(greeting("hi"), root).unwrap();

    let (mut sliced, root) = session();
    sliced.schedule_render(greeting("hi"), root);
    let report = sliced.finish_pass(|| UnitBudget::new(1)).unwrap();

    assert_eq!(sliced.host().calls(), at_once.host().calls());
    assert_eq!(report.units, 4);
    assert_eq!(report.slices, 4);
}

#[test]
fn suspended_pass_touches_nothing_on_the_host() {
    let (mut session, root) = session();
    session.schedule_render(greeting("hi"), root);
    let status = session.work_loop(&mut UnitBudget::new(3)).unwrap();

    assert_eq!(status, WorkStatus::Suspended);
    assert!(session.host().calls().is_empty());
    assert!(session.current_root().is_none());
    assert!(session.next_unit_of_work().is_some());
}

#[test]
fn replacing_an_in_flight_pass_discards_it() {
    let (mut session, root) = session();
    session.render_blocking(greeting("hi"), root).unwrap();
    session.host_mut().take_calls();
    let committed = session.current_root();

    session.schedule_render(greeting("bye"), root);
    assert_eq!(
        session.work_loop(&mut UnitBudget::new(2)).unwrap(),
        WorkStatus::Suspended
    );
    session.schedule_render(greeting("again"), root);
    session.finish_pass(|| Unbounded).unwrap();

    assert_ne!(session.current_root(), committed);
    assert_eq!(
        session.host().call_log(),
        ["setAttribute(text#3, nodeValue, \"again\")"]
    );
    assert_eq!(session.arena().len(), 4);
}

#[test]
fn replacing_a_pass_clears_pending_deletions() {
    let (mut session, root) = session();
    session.render_blocking(list(&["a", "b"]), root).unwrap();
    session.host_mut().take_calls();

    session.schedule_render(list(&["a"]), root);
    session.work_loop(&mut UnitBudget::new(2)).unwrap();
    let doomed = session.deletions().to_vec();
    assert_eq!(doomed.len(), 1);
    assert_eq!(session.arena()[doomed[0]].tag(), MutationTag::Deletion);

    session.schedule_render(list(&["a", "b"]), root);
    assert!(session.deletions().is_empty());
    assert_ne!(session.arena()[doomed[0]].tag(), MutationTag::Deletion);

    let report = session.finish_pass(|| Unbounded).unwrap();
    assert!(report.is_noop());
    assert!(session.host().calls().is_empty());
}

#[test]
fn failing_component_leaves_the_committed_tree_alone() {
    let broken = Component::new("Broken", |_, _| Err(anyhow::anyhow!("no data")));
    let (mut session, root) = session();
    session.render_blocking(greeting("hi"), root).unwrap();
    session.host_mut().take_calls();
    let fibers = session.arena().len();

    let error = session
        .render_blocking(
            element("div").child(broken.describe(Attributes::new())).build(),
            root,
        )
        .unwrap_err();
    assert!(matches!(&error, RenderError::Component { component, .. } if component == "Broken"));
    assert!(error.is_recoverable());
    assert!(session.host().calls().is_empty());
    assert_eq!(session.arena().len(), fibers);
    assert!(session.work_in_progress_root().is_none());

    session.render_blocking(greeting("still works"), root).unwrap();
    assert_eq!(session.host().markup(), "<div><p>still works</p></div>");
}

#[test]
fn host_failure_poisons_the_session() {
    let (mut session, root) = session();
    session.render_blocking(greeting("hi"), root).unwrap();
    session.host_mut().fail_after(0);

    let error = session.render_blocking(greeting("bye"), root).unwrap_err();
    assert!(matches!(error, RenderError::Host(_)));
    assert!(session.is_poisoned());
    assert!(matches!(
        session.render_blocking(greeting("again"), root),
        Err(RenderError::Poisoned)
    ));
}

#[test]
fn deleting_a_component_removes_its_host_nodes() {
    let item = Component::new("Item", |_, _| Ok(element("span").child("x").build()));
    let (mut session, root) = session();
    session
        .render_blocking(
            element("div").child(item.describe(Attributes::new())).build(),
            root,
        )
        .unwrap();
    session.host_mut().take_calls();

    let report = session.render_blocking(element("div").build(), root).unwrap();
    assert_eq!(session.host().call_log(), ["removeChild(div#1, span#2)"]);
    assert_eq!(report.deleted, ["Item"]);
    assert_eq!(session.host().markup(), "<div></div>");
}

#[test]
fn on_prefixed_properties_reach_the_host() {
    let (mut session, root) = session();
    session
        .render_blocking(element("div").attr("online", "no").attr("id", "x").build(), root)
        .unwrap();
    assert_eq!(session.host().markup(), r#"<div id="x" online="no"></div>"#);
    session.host_mut().take_calls();

    session
        .render_blocking(element("div").attr("online", "yes").attr("id", "x").build(), root)
        .unwrap();
    assert_eq!(
        session.host().call_log(),
        ["setAttribute(div#1, online, \"yes\")"]
    );
}

#[test]
fn moving_to_another_host_root_remounts() {
    let (mut session, root) = session();
    session.render_blocking(greeting("hi"), root).unwrap();
    let section = session
        .host_mut()
        .create_node(HostType::Element("section"), &Attributes::new())
        .unwrap();
    session.host_mut().append_child(&root, &section).unwrap();
    session.host_mut().take_calls();

    let report = session.render_blocking(greeting("hi"), section).unwrap();
    assert_eq!(report.deleted, ["div"]);
    assert_eq!(
        session.host().call_log(),
        [
            "removeChild(root, div#1)",
            "createNode(div#5)",
            "createNode(p#6)",
            "createNode(text#7, \"hi\")",
            "appendChild(p#6, text#7)",
            "appendChild(div#5, p#6)",
            "appendChild(section#4, div#5)",
        ]
    );
    assert_eq!(session.host().markup(), "<section><div><p>hi</p></div></section>");
    assert_eq!(session.host().children(section).len(), 1);
    assert_eq!(session.arena().len(), 4);

    session.host_mut().take_calls();
    session.render_blocking(greeting("bye"), section).unwrap();
    assert_eq!(
        session.host().call_log(),
        ["setAttribute(text#7, nodeValue, \"bye\")"]
    );
}

#[test]
fn components_receive_their_attributes() {
    let label = Component::new("Label", |attributes, _| {
        let caption = attributes
            .get("caption")
            .and_then(|value| value.as_text())
            .unwrap_or("none")
            .to_owned();
        Ok(element("label").child(caption).build())
    });
    let attributes: Attributes = [("caption", "Name")].into_iter().collect();
    let (mut session, root) = session();
    session.render_blocking(label.describe(attributes), root).unwrap();
    assert_eq!(session.host().markup(), "<label>Name</label>");
}

#[test]
fn handlers_are_bound_and_rebound_by_identity() {
    let first = EventHandler::new(|_| {});
    let second = EventHandler::new(|_| {});
    let button = |handler: &EventHandler| element("button").on("click", handler.clone()).build();
    let (mut session, root) = session();

    session.render_blocking(button(&first), root).unwrap();
    assert!(session.host().call_log().contains(&"bindHandler(button#1, click)".into()));
    session.host_mut().take_calls();

    session.render_blocking(button(&second), root).unwrap();
    assert_eq!(
        session.host().call_log(),
        ["unbindHandler(button#1, click)", "bindHandler(button#1, click)"]
    );
    let bound = session.host().handlers(first_node(&session), "click");
    assert_eq!(bound.len(), 1);
    assert!(bound[0].ptr_eq(&second));
}

fn first_node(session: &Session<MemoryHost>) -> MemoryNode {
    session.host().children(session.host().root())[0]
}

fn counter() -> Component {
    Component::new("Counter", |_, hooks| {
        let (count, set_count) = hooks.use_state(|| 0_u32);
        let increment = EventHandler::new(move |_| set_count.update(|count| count + 1));
        Ok(element("div")
            .child(element("button").on("click", increment).child(count.to_string()))
            .build())
    })
}

#[test]
fn state_updates_rerender_through_the_idle_queue() {
    let queue = Rc::new(ManualIdleQueue::new());
    let root = Root::new(Session::new(MemoryHost::new()), Rc::clone(&queue));
    let root_node = root.session().host().root();

    root.render_tree(counter().describe(Attributes::new()), root_node);
    assert!(root.is_slice_pending());
    let slices = queue.run_until_idle(|| UnitBudget::new(1));
    assert_eq!(slices, 5);
    assert_eq!(root.session().host().markup(), "<div><button>0</button></div>");
    assert_eq!(root.last_report().map(|report| report.slices), Some(5));

    for _ in 0..2 {
        let session = root.session();
        let button = session.host().find("button").unwrap();
        assert_eq!(session.host().dispatch(button, "click", &()), 1);
    }
    assert_eq!(queue.len(), 1);
    queue.run_until_idle(|| Unbounded);
    assert_eq!(root.session().host().markup(), "<div><button>2</button></div>");
    assert!(root.take_error().is_none());
}

#[test]
fn component_errors_are_kept_on_the_root() {
    let queue = Rc::new(ManualIdleQueue::new());
    let root = Root::new(Session::new(MemoryHost::new()), Rc::clone(&queue));
    let broken = Component::new("Broken", |_, _| Err(anyhow::anyhow!("boom")));
    let root_node = root.session().host().root();

    root.render_tree(broken.describe(Attributes::new()), root_node);
    queue.run_until_idle(|| Unbounded);
    assert!(matches!(root.take_error(), Some(RenderError::Component { .. })));
    assert!(root.take_error().is_none());
    assert!(root.last_report().is_none());
}

#[test]
fn state_set_by_a_failed_pass_stays_pending() {
    let renders = Rc::new(Cell::new(0));
    let fail = Rc::new(Cell::new(false));
    let component = Component::new("Flaky", {
        let renders = Rc::clone(&renders);
        let fail = Rc::clone(&fail);
        move |_, hooks| {
            renders.set(renders.get() + 1);
            let (value, set_value) = hooks.use_state(|| 1_i32);
            if fail.get() {
                set_value.set(value * 10);
                anyhow::bail!("flaky");
            }
            Ok(element("b").child(value.to_string()).build())
        }
    });
    let (mut session, root) = session();
    let description = component.describe(Attributes::new());
    session.render_blocking(description.clone(), root).unwrap();

    fail.set(true);
    assert!(session.render_blocking(description.clone(), root).is_err());
    fail.set(false);
    session.render_blocking(description, root).unwrap();
    // The failed render's pending value is still pending, so it shows up now.
    assert_eq!(session.host().markup(), "<b>10</b>");
    assert_eq!(renders.get(), 3);
}

#[test]
#[should_panic(expected = "same order")]
fn changing_hook_order_panics() {
    let flip = Rc::new(Cell::new(false));
    let component = Component::new("Shifty", {
        let flip = Rc::clone(&flip);
        move |_, hooks| {
            if flip.get() {
                let _ = hooks.use_state(|| "text");
            } else {
                let _ = hooks.use_state(|| 0_u8);
            }
            Ok(element("i").build())
        }
    });
    let (mut session, root) = session();
    let description = component.describe(Attributes::new());
    session.render_blocking(description.clone(), root).unwrap();
    flip.set(true);
    let _ = session.render_blocking(description, root);
}

#[test]
fn async_driver_yields_between_slices() {
    let (mut session, root) = session();
    let report = smol::block_on(session.render_async(
        list(&["a", "b", "c"]),
        root,
        Duration::from_millis(5),
    ))
    .unwrap();
    assert_eq!(report.placed, 4);
    assert_eq!(session.host().markup(), "<ul><a></a><b></b><c></c></ul>");
}

#[test]
fn unmount_removes_everything() {
    let (mut session, root) = session();
    session.render_blocking(greeting("hi"), root).unwrap();
    session.unmount().unwrap();

    assert_eq!(session.host().markup(), "");
    assert_eq!(session.host().live_nodes(), 0);
    assert!(session.arena().is_empty());
    assert!(session.current_root().is_none());

    session.render_blocking(greeting("back"), root).unwrap();
    assert_eq!(session.host().markup(), "<div><p>back</p></div>");
}

#[test]
fn idle_work_loop_without_a_pass() {
    let (mut session, _) = session();
    assert_eq!(session.work_loop(&mut Unbounded).unwrap(), WorkStatus::Idle);
    let host: MemoryHost = session.into_host();
    assert!(host.calls().is_empty());
}

#[test]
fn fibers_of_every_pass_are_reclaimed() {
    let (mut session, root) = session();
    for round in 0..10 {
        let tags: Vec<&'static str> = ["a", "b", "c"].into_iter().take(round % 3 + 1).collect();
        session.render_blocking(list(&tags), root).unwrap();
        assert_eq!(session.arena().len(), tags.len() + 2);
    }
}
