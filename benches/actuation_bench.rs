//! Quick benchmark for expansion and patching throughput

use foam_actuator::patch::EntryUpdate;
use foam_actuator::{BindingSet, KeyedEntryPatcher, TemplateExpander};
use serde_json::json;
use std::time::Instant;

const U_FILE: &str = "\
boundaryField
{
    JET1
    {
        type            fixedValue;
        value           uniform (0 0 0);
    }
    JET2
    {
        type            fixedValue;
        value           uniform (0 0 0);
    }
    JET3
    {
        type            fixedValue;
        value           uniform (0 0 0);
    }
}
";

fn main() {
    let bindings = BindingSet::from_pairs(&["x", "y", "z"], &[0.1, -0.2, 0.3]).unwrap();
    let expander = TemplateExpander::new();

    // Templates of varying complexity
    let templates = vec![
        json!({"U": {"JET1": {"value": "uniform (0 0 0)"}}}),
        json!({"U": {"JET1": {"value": "({x} 0 0)"}}}),
        json!({
            "U": {
                "JET1": {"value": "({x} 0 0)"},
                "JET2": {"value": "(0 {y} 0)"},
                "JET3": {"value": "(0 0 {z})"}
            },
            "k": {
                "JET1": {"value": "({0.5*x} 0 0)"},
                "JET2": {"value": "(0 {0.5*y*y} 0)"},
                "JET3": {"value": "(0 0 {2*z**0.5})"}
            }
        }),
    ];

    println!("Template Expansion Performance Test");
    println!("===================================\n");

    for template in &templates {
        let iterations = 20_000;
        let start = Instant::now();

        for _ in 0..iterations {
            let _ = expander.expand(template, &bindings);
        }

        let elapsed = start.elapsed();
        println!("Template: {}", template);
        println!("  Time for {} iterations: {:?}", iterations, elapsed);
        println!("  Per operation: {:?}\n", elapsed / iterations);
    }

    println!("Keyed-Entry Patch Performance Test");
    println!("==================================\n");

    let patcher = KeyedEntryPatcher::default();
    let updates = vec![
        EntryUpdate::new("JET1", "value", "(0.1 0 0)"),
        EntryUpdate::new("JET2", "value", "(0 -0.2 0)"),
        EntryUpdate::new("JET3", "value", "(0 0 0.3)"),
    ];

    // Warm up the pattern cache
    let _ = patcher.patch_content(U_FILE, &updates);

    let iterations = 20_000;
    let start = Instant::now();
    for _ in 0..iterations {
        let _ = patcher.patch_content(U_FILE, &updates);
    }
    let elapsed = start.elapsed();

    println!("{} entries x {} iterations:", updates.len(), iterations);
    println!("  Total: {:?}", elapsed);
    println!("  Per file: {:?}", elapsed / iterations);
}
