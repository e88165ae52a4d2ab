//! Storefront Example - Tabs, accordion and modal on one product page
//!
//! This example demonstrates cross-component search reveal:
//! - A specifications tab opening when find-in-page lands inside it
//! - An open modal closing because the match made it stale
//! - Accordion items opening independently of each other
//!
//! Run with: RUST_LOG=spark_reveal=debug cargo run --example storefront

use std::rc::Rc;

use spark_reveal::{Coordinator, HeadlessHost, SegmentId, UnitHandle, UnitMode, UnitProps};
use spark_signals::effect;

fn render(host: &HeadlessHost, unit: &UnitHandle, texts: &[&str]) {
    for (id, text) in unit.store().segment_ids().iter().zip(texts) {
        if let Err(err) = unit.attach_node(id, host.create_node(*text)) {
            eprintln!("render failed: {err}");
        }
    }
}

fn print_page(units: &[&UnitHandle]) {
    for unit in units {
        let visible: Vec<String> = unit
            .visible_segments()
            .iter()
            .map(|s| s.to_string())
            .collect();
        println!("  {:<6} visible: [{}]", unit.id(), visible.join(", "));
    }
}

fn main() -> Result<(), spark_reveal::RevealError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== spark-reveal Storefront Example ===\n");

    let host = Rc::new(HeadlessHost::new());
    let coordinator = Coordinator::new(host.clone());
    println!("Host support: {:?}\n", coordinator.support());

    let tabs = coordinator.mount(UnitProps {
        id: Some("tabs".into()),
        segments: vec!["features".into(), "specs".into(), "warranty".into()],
        initially_open: vec!["features".into()],
        cross_component: true,
        ..Default::default()
    })?;
    render(
        &host,
        &tabs,
        &[
            "Lane keeping assist and adaptive cruise",
            "Horsepower: 203 hp, fuel economy 38 mpg",
            "Five year powertrain warranty",
        ],
    );

    let faq = coordinator.mount(UnitProps {
        id: Some("faq".into()),
        mode: UnitMode::Independent,
        segments: (0..4).map(SegmentId::at).collect(),
        cross_component: true,
        ..Default::default()
    })?;
    render(
        &host,
        &faq,
        &[
            "Which fuel grade is recommended?",
            "Is roadside assistance included?",
            "Can I transfer the warranty?",
            "How often is service required?",
        ],
    );

    let modal = coordinator.mount(UnitProps {
        id: Some("modal".into()),
        segments: vec!["body".into()],
        cross_component: true,
        ..Default::default()
    })?;
    render(&host, &modal, &["Book a test drive near you"]);

    // Views derive from the per-segment signal
    let specs_signal = tabs.store().state_signal(&"specs".into());
    let stop_watch = specs_signal.map(|signal| {
        effect(move || {
            println!("  (effect) specs tab is {}", signal.get());
        })
    });

    println!("\nInitial page:");
    print_page(&[&tabs, &faq, &modal]);

    println!("\nUser opens the test drive modal:");
    modal.open(&"body".into())?;
    print_page(&[&tabs, &faq, &modal]);

    for needle in ["horsepower", "warranty", "fuel"] {
        let hits = host.find_all(needle);
        println!("\nFind \"{needle}\" ({} hits):", hits.len());
        print_page(&[&tabs, &faq, &modal]);
    }

    println!("\nEscape closes the modal; the accordion collapses all:");
    modal.dismiss();
    faq.dismiss();
    print_page(&[&tabs, &faq, &modal]);

    if let Some(stop) = stop_watch {
        stop();
    }
    tabs.unmount();
    faq.unmount();
    modal.unmount();
    println!("\nMounted after teardown: {:?}", coordinator.mounted_units());

    Ok(())
}
