//! End-to-end session lifecycles against the scripted host.

mod common;

use common::{FakeHost, Project};
use lunacov::{CoverageConfig, CoverageSession, LineState, Mode};

const TEN_LINES: &str = "\
local M = {}

-- helpers
local function add(a, b)
  return a + b
end
local x = add(1, 2)
local y = add(x, 3)
print(x, y)
return M
";

#[test]
fn asserted_lines_drive_line_coverage() {
    let project = Project::new(&[("calc.lua", TEN_LINES)]);
    let host = FakeHost::new();
    let mut session = CoverageSession::new(project.config()).unwrap();
    session.start(&host).unwrap();
    assert!(host.has_line_hook());

    host.run_lines(&project.path("calc.lua"), &[1, 7, 4, 5, 8, 5, 9, 10]);
    let key = project.key("calc.lua");
    for line in [1, 5, 7, 8, 9] {
        session.mark_line_covered(&key, line).unwrap();
    }
    session.stop(&host);
    assert!(!host.has_line_hook());

    let report = session.get_report_data().unwrap();
    let file = report.file(&key).unwrap();
    assert_eq!(file.summary.total_lines, 10);
    assert_eq!(file.summary.executable_lines, 7);
    assert_eq!(file.summary.executed_lines, 7);
    assert_eq!(file.summary.covered_lines, 5);
    assert!((file.summary.line_coverage_pct - 71.4).abs() < 0.05);

    assert_eq!(file.lines[&2].state, LineState::NonExecutable);
    assert_eq!(file.lines[&4].state, LineState::Executed);
    assert_eq!(file.lines[&5].state, LineState::Covered);
    assert_eq!(file.lines[&5].execution_count, 2);
    assert_eq!(file.lines[&6].state, LineState::NonExecutable);

    let add = &file.functions[0];
    assert_eq!(add.name, "add");
    assert!(add.executed && add.covered);
}

#[test]
fn short_circuited_and_through_the_runtime() {
    let project = Project::new(&[("guard.lua", "if a and b then\n  x()\nend\n")]);
    let config = CoverageConfig { use_instrumentation: true, ..project.config() };
    let session = CoverageSession::new(config).unwrap();
    let key = project.key("guard.lua");
    session.track_file(&key).unwrap();

    let rt = session.runtime();
    rt.header(&key, Some(1), Some(1));
    let left = rt.cond(&key, 2, false);
    rt.cond(&key, 1, left);

    let report = session.get_report_data().unwrap();
    let conds = &report.file(&key).unwrap().conditions;
    assert!(!conds[1].executed_true && conds[1].executed_false);
    assert_eq!(conds[2].execution_count, 0);
    assert!(!conds[0].executed_true && conds[0].executed_false);
    assert_eq!(report.summary.covered_conditions, 0);
}

#[test]
fn stop_without_start_leaves_the_host_alone() {
    let host = FakeHost::new();
    for config in [CoverageConfig::default(), CoverageConfig { use_instrumentation: true, ..Default::default() }] {
        let mut session = CoverageSession::new(config).unwrap();
        session.stop(&host);
        assert!(!session.is_active());
    }
    assert_eq!(host.hook_removals.get(), 0);
    assert_eq!(host.require_restores.get(), 0);
    assert!(!host.has_line_hook());
    assert!(!host.is_require_hooked());
}

#[test]
fn instrumented_modules_report_through_require() {
    let project = Project::new(&[
        (
            "app.lua",
            "local util = require(\"util\")\nlocal M = {}\nfunction M.run(x)\n  if x then\n    return util.double(x)\n  end\nend\nreturn M\n",
        ),
        ("util.lua", "local U = {}\nfunction U.double(n)\n  return n * 2\nend\nreturn U\n"),
    ]);
    let config = CoverageConfig { use_instrumentation: true, ..project.config() };
    let mut session = CoverageSession::new(config).unwrap();
    assert_eq!(session.mode(), Mode::Instrumentation);

    let host = FakeHost::new();
    session.start(&host).unwrap();
    host.bind(session.interceptor(), session.runtime().clone());
    assert!(host.is_require_hooked());
    assert!(!host.has_line_hook());

    assert_eq!(host.require("app").unwrap(), "instrumented:app");
    assert_eq!(host.loads(), vec!["instrumented:app", "instrumented:util"]);
    session.stop(&host);
    assert!(!host.is_require_hooked());

    let report = session.get_report_data().unwrap();
    assert_eq!(report.summary.total_files, 2);
    assert_eq!(report.summary.analyzed_files, 2);
    let app = report.file(&project.key("app.lua")).unwrap();
    assert!(session.was_line_executed(&project.key("app.lua"), 1));
    assert_eq!(app.functions[0].name, "M.run");
    assert!(app.functions[0].executed);
    assert!(app.blocks[0].executed);
    let util = report.file(&project.key("util.lua")).unwrap();
    assert_eq!(util.lines[&3].state, LineState::Executed);
}

#[test]
fn reset_keeps_running_files_attached() {
    let project = Project::new(&[("loop.lua", "local n = 0\nn = n + 1\nreturn n\n")]);
    let host = FakeHost::new();
    let mut session = CoverageSession::new(project.config()).unwrap();
    session.start(&host).unwrap();
    let path = project.path("loop.lua");
    let key = project.key("loop.lua");

    host.run_lines(&path, &[1, 2, 2]);
    session.reset();
    assert!(session.get_report_data().unwrap().files.is_empty());

    host.run_lines(&path, &[2, 3]);
    let report = session.get_report_data().unwrap();
    let file = report.file(&key).unwrap();
    assert_eq!(file.lines[&1].execution_count, 0);
    assert_eq!(file.lines[&2].execution_count, 1);
    assert_eq!(file.summary.executed_lines, 2);

    session.full_reset();
    host.run_lines(&path, &[1]);
    session.stop(&host);
    let report = session.get_report_data().unwrap();
    assert_eq!(report.file(&key).unwrap().summary.executed_lines, 1);
}

#[test]
fn full_reset_forgets_rewritten_modules() {
    let project = Project::new(&[("util.lua", "return {}\n")]);
    let config = CoverageConfig { use_instrumentation: true, ..project.config() };
    let mut session = CoverageSession::new(config).unwrap();
    let host = FakeHost::new();
    session.start(&host).unwrap();
    host.bind(session.interceptor(), session.runtime().clone());

    host.require("util").unwrap();
    assert_eq!(session.interceptor().instrumented_count(), 1);
    session.reset();
    assert_eq!(session.interceptor().instrumented_count(), 1);
    session.full_reset();
    assert_eq!(session.interceptor().instrumented_count(), 0);
    session.stop(&host);
}

#[test]
fn excluded_and_unchunked_sources_never_appear() {
    let project = Project::new(&[("src/a.lua", "x = 1\n"), ("spec/a_spec.lua", "y = 2\n")]);
    let config = CoverageConfig { exclude_patterns: vec!["*/spec/*".to_string()], ..project.config() };
    let host = FakeHost::new();
    let mut session = CoverageSession::new(config).unwrap();
    session.start(&host).unwrap();
    host.run_lines(&project.path("src/a.lua"), &[1]);
    host.run_lines(&project.path("spec/a_spec.lua"), &[1]);
    host.fire("=[C]", 1);
    host.fire("x = 1", 1);
    session.stop(&host);

    let report = session.get_report_data().unwrap();
    let files: Vec<&String> = report.files.keys().collect();
    assert_eq!(files, vec![&project.key("src/a.lua")]);
}

#[test]
fn validation_passes_on_a_real_run() {
    let project = Project::new(&[("calc.lua", TEN_LINES)]);
    let host = FakeHost::new();
    let mut session = CoverageSession::new(project.config()).unwrap();
    session.start(&host).unwrap();
    host.run_lines(&project.path("calc.lua"), &[1, 4, 5, 7, 8, 9, 10]);
    session.stop(&host);

    let validation = session.validate().unwrap();
    assert!(validation.is_valid(), "{:?}", validation.issues().collect::<Vec<_>>());
    assert!(validation.static_analysis.is_empty());
}

#[test]
fn configuration_from_toml() {
    let config = CoverageConfig::from_toml_str(
        "[coverage]\nuse_instrumentation = true\nmax_require_depth = 4\nunknown = \"ignored\"\n",
    )
    .unwrap();
    let session = CoverageSession::new(config).unwrap();
    assert_eq!(session.mode(), Mode::Instrumentation);
    assert_eq!(session.config().max_require_depth, 4);
    assert!(session.config().track_conditions);
}

#[test]
fn unparseable_files_report_their_text_only_classification() {
    let project = Project::new(&[("broken.lua", "local x = 1\nif x then\nprint(x)\n")]);
    let host = FakeHost::new();
    let mut session = CoverageSession::new(project.config()).unwrap();
    session.start(&host).unwrap();
    host.run_lines(&project.path("broken.lua"), &[1, 2, 3]);
    session.stop(&host);

    let report = session.get_report_data().unwrap();
    let summary = &report.file(&project.key("broken.lua")).unwrap().summary;
    assert!(summary.analyzed);
    assert!(summary.heuristic);
    assert!(summary.analysis_error.as_deref().is_some_and(|e| e.starts_with("parse error")));
    assert_eq!(summary.executed_lines, 3);
}
