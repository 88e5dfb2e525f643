//! Terminal counter driven by the fiber reconciler.
//!
//! `+`/`-` change the counter, `a` appends a row to the keyed history list, `q` quits.

use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use tracing::info;
use waterui_fiber::{
    Component, RendererConfig, element,
    describe::{Attributes, ComponentResult, EventHandler},
    hooks::Hooks,
    logging::install_tracing,
    reconcile::ReconcilePolicy,
};
use waterui_fiber_tui::{Terminal, TuiAppBuilder};

fn counter(_: &Attributes, hooks: &mut Hooks) -> ComponentResult {
    let (count, set_count) = hooks.use_state(|| 0_i64);
    let (history, set_history) = hooks.use_state(Vec::<i64>::new);

    let increment = EventHandler::new({
        let set_count = set_count.clone();
        move |_| set_count.update(|count| count + 1)
    });
    let decrement = EventHandler::new(move |_| set_count.update(|count| count - 1));
    let record = EventHandler::new(move |_| {
        set_history.update(|history| {
            let mut next = history.clone();
            next.push(count);
            next
        });
    });

    let color = if count < 0 { "red" } else { "green" };
    Ok(element("div")
        .child(element("h1").child("waterui-fiber"))
        .child(
            element("p")
                .child("count: ")
                .child(element("b").attr("color", color).child(count.to_string())),
        )
        .child(
            element("p")
                .child(element("button").attr("id", "dec").on("press", decrement).child("-"))
                .child(" ")
                .child(element("button").attr("id", "inc").on("press", increment).child("+"))
                .child(" ")
                .child(element("button").attr("id", "rec").on("press", record).child("a")),
        )
        .child(element("ul").children(history.iter().enumerate().map(|(index, value)| {
            element("li")
                .key(index.to_string())
                .child(format!("#{index}: {value}"))
        })))
        .child(element("hr"))
        .child(element("p").attr("color", "grey").child("q to quit"))
        .build())
}

fn main() -> anyhow::Result<()> {
    install_tracing();

    let config = RendererConfig::default().with_policy(ReconcilePolicy::Keyed);
    let mut app = TuiAppBuilder::new()
        .with_terminal(Terminal::stdout()?)
        .with_config(config)
        .build()?;
    let report = app.render(Component::new("Counter", counter).describe(Attributes::new()))?;
    info!(placed = report.placed, "demo mounted");

    loop {
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        let target = match key.code {
            KeyCode::Char('q') | KeyCode::Esc => break,
            KeyCode::Char('+' | '=') => "inc",
            KeyCode::Char('-') => "dec",
            KeyCode::Char('a') => "rec",
            _ => continue,
        };
        app.dispatch(target, "press")?;
        app.refresh()?;
    }
    Ok(())
}
