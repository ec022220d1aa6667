//! Property tests for the coverage model and the instrumenter.

use std::sync::Arc;

use lunacov::analyzer::{analyze, AnalyzeOptions};
use lunacov::instrument::{instrument_source, InstrumentOptions};
use lunacov::parser::parse;
use lunacov::report::{assemble, FileSummary, ReportSummary};
use lunacov::store::{CoverageStore, TrackOptions};
use proptest::prelude::*;

// ── Generators ──────────────────────────────────────────────────────────────

fn arb_expr() -> impl Strategy<Value = String> {
    let leaf = prop::sample::select(vec!["x", "y", "1", "true", "nil", "f()", "t.k", "#t", "a:m(2)"])
        .prop_map(String::from);
    leaf.prop_recursive(3, 12, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("{a} and {b}")),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("{a} or {b}")),
            inner.clone().prop_map(|a| format!("not {a}")),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("{a} == {b}")),
            inner.clone().prop_map(|a| format!("({a})")),
        ]
    })
}

fn arb_stmt() -> impl Strategy<Value = String> {
    let simple = prop_oneof![
        arb_expr().prop_map(|e| format!("x = {e}")),
        arb_expr().prop_map(|e| format!("local v = {e}")),
        Just("f(1, 2)".to_string()),
        Just("t.k = function(a) return a end".to_string()),
        Just("local s = [[long\nstring]]".to_string()),
    ];
    simple.prop_recursive(3, 24, 3, |inner| {
        let body = prop::collection::vec(inner, 0..3).prop_map(|s| s.join("\n"));
        prop_oneof![
            (arb_expr(), body.clone()).prop_map(|(c, b)| format!("if {c} then\n{b}\nend")),
            (arb_expr(), body.clone(), arb_expr(), body.clone(), body.clone())
                .prop_map(|(c, b, d, e, g)| format!("if {c} then {b}\nelseif {d} then\n{e}\nelse {g} end")),
            (arb_expr(), body.clone()).prop_map(|(c, b)| format!("while {c} do\n{b}\nend")),
            (body.clone(), arb_expr()).prop_map(|(b, c)| format!("repeat\n{b}\nuntil {c}")),
            body.clone().prop_map(|b| format!("for i = 1, 10 do {b} end")),
            body.clone().prop_map(|b| format!("for k, v in pairs(t) do\n{b}\nend")),
            body.clone().prop_map(|b| format!("do {b} end")),
            body.clone().prop_map(|b| format!("local function g(a, ...)\n{b}\nend")),
            body.prop_map(|b| format!("function M.obj:method(n)\n{b}\nreturn n\nend")),
        ]
    })
}

fn arb_program() -> impl Strategy<Value = String> {
    prop::collection::vec(arb_stmt(), 1..6).prop_map(|stmts| stmts.join("\n") + "\n")
}

#[derive(Debug, Clone)]
enum Event {
    Line(u32),
    CoveredLine(u32),
    Assert(u32),
}

fn arb_events() -> impl Strategy<Value = Vec<Event>> {
    prop::collection::vec(
        prop_oneof![
            (1u32..30).prop_map(Event::Line),
            (1u32..30).prop_map(Event::CoveredLine),
            (1u32..30).prop_map(Event::Assert),
        ],
        0..60,
    )
}

fn apply(store: &mut CoverageStore, path: &str, events: &[Event]) {
    for event in events {
        match *event {
            Event::Line(l) => store.track_line(path, l, TrackOptions::default()).unwrap(),
            Event::CoveredLine(l) => store.track_line(path, l, TrackOptions::covered()).unwrap(),
            Event::Assert(l) => store.mark_line_covered(path, l).unwrap(),
        }
    }
}

// ── Instrumentation ─────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn instrumented_output_reparses(src in arb_program()) {
        prop_assume!(parse("gen.lua", &src, 200).is_ok());
        let out = instrument_source("/p/gen.lua", &src, &InstrumentOptions::default()).unwrap();
        prop_assert!(parse("out.lua", &out.source, 2000).is_ok());
        prop_assert_eq!(out.source.lines().count(), src.lines().count());
    }

    #[test]
    fn dynamic_imports_also_reparse(src in arb_program()) {
        prop_assume!(parse("gen.lua", &src, 200).is_ok());
        let options = InstrumentOptions { static_imports: false, ..Default::default() };
        let out = instrument_source("/p/gen.lua", &src, &options).unwrap();
        prop_assert!(parse("out.lua", &out.source, 2000).is_ok());
    }
}

// ── Code map consistency ────────────────────────────────────────────────────

proptest! {
    #[test]
    fn executable_flags_match_the_count(src in arb_program()) {
        let map = analyze("/p/gen.lua", &src, &AnalyzeOptions::default()).unwrap();
        let flagged = map.lines.iter().filter(|l| l.executable).count();
        prop_assert_eq!(flagged, map.executable_line_count());

        let mut store = CoverageStore::new();
        store.initialize_file("/p/gen.lua", Arc::new(map.clone())).unwrap();
        store.activate_file("/p/gen.lua").unwrap();
        let report = assemble(&store);
        prop_assert_eq!(report.summary.executable_lines as usize, map.executable_line_count());
    }

    #[test]
    fn blocks_nest_inside_their_parents(src in arb_program()) {
        let map = analyze("/p/gen.lua", &src, &AnalyzeOptions::default()).unwrap();
        for block in &map.blocks {
            if let Some(parent) = block.parent_id.and_then(|id| map.block(id)) {
                prop_assert!(parent.start_line <= block.start_line && block.end_line <= parent.end_line);
            }
        }
        for cond in &map.conditions {
            for &child in &cond.component_ids {
                prop_assert_eq!(map.condition(child).and_then(|c| c.parent_id), Some(cond.id));
            }
        }
    }
}

// ── Store invariants ────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn coverage_implies_execution(events in arb_events(), src in arb_program()) {
        let mut store = CoverageStore::new();
        let map = analyze("/p/gen.lua", &src, &AnalyzeOptions::default()).unwrap();
        store.initialize_file("/p/gen.lua", Arc::new(map)).unwrap();
        store.activate_file("/p/gen.lua").unwrap();
        apply(&mut store, "/p/gen.lua", &events);
        apply(&mut store, "/p/other.lua", &events);
        store.finalize(true);

        for file in store.files() {
            for line in file.covered_lines() {
                prop_assert!(file.was_line_executed(line));
            }
        }
        for file in assemble(&store).files.values() {
            let s = &file.summary;
            prop_assert!(s.covered_lines <= s.executed_lines);
            prop_assert!(s.executed_lines <= s.executable_lines);
            for f in &file.functions {
                prop_assert!(!f.covered || f.executed);
            }
            for b in &file.blocks {
                prop_assert!(!b.covered || b.executed);
            }
        }
    }

    #[test]
    fn initialize_file_is_idempotent(events in arb_events(), src in arb_program()) {
        let map = Arc::new(analyze("/p/gen.lua", &src, &AnalyzeOptions::default()).unwrap());
        let mut store = CoverageStore::new();
        store.initialize_file("/p/gen.lua", Arc::clone(&map)).unwrap();
        apply(&mut store, "/p/gen.lua", &events);
        let before = store.file("/p/gen.lua").cloned();
        store.initialize_file("/p/gen.lua", map).unwrap();
        prop_assert_eq!(store.file("/p/gen.lua").cloned(), before);
    }
}

// ── Aggregates ──────────────────────────────────────────────────────────────

fn arb_summaries() -> impl Strategy<Value = Vec<FileSummary>> {
    prop::collection::vec(
        (0u32..200).prop_flat_map(|executable| (Just(executable), 0..=executable)).prop_map(|(executable, covered)| {
            FileSummary { executable_lines: executable, executed_lines: covered, covered_lines: covered, ..Default::default() }
        }),
        0..12,
    )
}

fn merged(files: &[FileSummary]) -> FileSummary {
    FileSummary {
        executable_lines: files.iter().map(|f| f.executable_lines).sum(),
        executed_lines: files.iter().map(|f| f.executed_lines).sum(),
        covered_lines: files.iter().map(|f| f.covered_lines).sum(),
        ..Default::default()
    }
}

proptest! {
    #[test]
    fn overall_pct_ignores_how_files_are_split(files in arb_summaries(), cut in 0usize..12) {
        let cut = cut.min(files.len());
        let whole = ReportSummary::from_files(&files);
        let (left, right) = files.split_at(cut);
        let split = ReportSummary::from_files([&merged(left), &merged(right)]);
        prop_assert!((whole.overall_pct - split.overall_pct).abs() < 1e-9);
        prop_assert!(whole.overall_pct.is_finite());
        prop_assert!((0.0..=100.0).contains(&whole.overall_pct));
    }
}
