//! `require` interception: nesting, cycles, depth bounds and fallbacks.

mod common;

use common::{FakeHost, Project};
use lunacov::{CoverageConfig, CoverageSession};

/// An instrumentation-mode session already started and bound to `host`.
fn running(project: &Project, host: &FakeHost, tweak: impl FnOnce(&mut CoverageConfig)) -> CoverageSession {
    let mut config = CoverageConfig { use_instrumentation: true, ..project.config() };
    tweak(&mut config);
    let mut session = CoverageSession::new(config).unwrap();
    session.start(host).unwrap();
    host.bind(session.interceptor(), session.runtime().clone());
    session
}

#[test]
fn nested_requires_are_each_instrumented_once() {
    let project = Project::new(&[
        ("top.lua", "local a = require(\"pkg.a\")\nlocal b = require(\"pkg.b\")\nreturn a + b\n"),
        ("pkg/a.lua", "local shared = require(\"pkg\")\nreturn shared.n\n"),
        ("pkg/b.lua", "local shared = require(\"pkg\")\nreturn shared.n * 2\n"),
        ("pkg/init.lua", "return { n = 1 }\n"),
    ]);
    let host = FakeHost::new();
    let session = running(&project, &host, |_| {});

    host.require("top").unwrap();
    assert_eq!(
        host.loads(),
        vec![
            "instrumented:top",
            "instrumented:pkg.a",
            "instrumented:pkg",
            "instrumented:pkg.b",
            "instrumented:pkg",
        ]
    );
    let interceptor = session.interceptor();
    assert_eq!(interceptor.instrumented_count(), 4);
    assert!(interceptor.is_instrumented(&project.key("pkg/init.lua")));
    assert_eq!(interceptor.peak_depth(), 3);

    let first = host.sources.borrow().iter().filter(|(n, _)| n == "pkg").map(|(_, s)| s.clone()).collect::<Vec<_>>();
    assert_eq!(first.len(), 2);
    assert_eq!(first[0], first[1]);
}

#[test]
fn cycles_fall_back_to_the_original_loader() {
    let project = Project::new(&[
        ("a.lua", "local b = require(\"b\")\nreturn {}\n"),
        ("b.lua", "local a = require(\"a\")\nreturn {}\n"),
    ]);
    let host = FakeHost::new();
    let session = running(&project, &host, |_| {});

    host.require("a").unwrap();
    assert_eq!(host.loads(), vec!["instrumented:a", "instrumented:b", "original:a"]);
    assert_eq!(session.interceptor().peak_depth(), 2);

    // The loading set unwinds, so a later require is intercepted again.
    host.require("a").unwrap();
    assert_eq!(host.loads()[3], "instrumented:a");
}

#[test]
fn depth_limit_bounds_recursion() {
    let files: Vec<(String, String)> = (1..=6)
        .map(|i| (format!("m{i}.lua"), format!("local next = require(\"m{}\")\nreturn {i}\n", i + 1)))
        .collect();
    let refs: Vec<(&str, &str)> = files.iter().map(|(n, c)| (n.as_str(), c.as_str())).collect();
    let project = Project::new(&refs);
    let host = FakeHost::new();
    let session = running(&project, &host, |c| c.max_require_depth = 3);

    host.require("m1").unwrap();
    assert_eq!(host.loads(), vec!["instrumented:m1", "instrumented:m2", "instrumented:m3", "original:m4"]);
    assert_eq!(session.interceptor().peak_depth(), 3);
}

#[test]
fn excluded_unresolved_and_engine_modules_pass_through() {
    let project = Project::new(&[
        ("busted/runner.lua", "return {}\n"),
        ("spec/helper.lua", "return {}\n"),
    ]);
    let host = FakeHost::new();
    let session = running(&project, &host, |c| {
        c.framework_patterns = vec!["busted".to_string(), "busted.*".to_string()];
        c.exclude_patterns = vec!["*/spec/*".to_string()];
    });

    host.require("busted.runner").unwrap();
    host.require("socket.http").unwrap();
    host.require("lunacov.runtime").unwrap();
    host.require("spec.helper").unwrap();
    host.require("spec.helper").unwrap();
    assert_eq!(
        host.loads(),
        vec![
            "original:busted.runner",
            "original:socket.http",
            "original:lunacov.runtime",
            "original:spec.helper",
            "original:spec.helper",
        ]
    );
    assert_eq!(session.interceptor().instrumented_count(), 0);
    assert!(session.get_report_data().unwrap().files.is_empty());
}

#[test]
fn broken_modules_load_unmodified_and_report_unanalyzed() {
    let project = Project::new(&[("broken.lua", "local function f(\n  return 1\nend\n")]);
    let host = FakeHost::new();
    let mut session = running(&project, &host, |_| {});

    assert_eq!(host.require("broken").unwrap(), "original:broken");
    session.stop(&host);

    let report = session.get_report_data().unwrap();
    let file = report.file(&project.key("broken.lua")).unwrap();
    assert!(!file.summary.analyzed);
    assert!(file.summary.analysis_error.as_deref().is_some_and(|e| e.starts_with("parse error")));
    assert_eq!(report.summary.analyzed_files, 0);
}

#[test]
fn empty_module_names_are_rejected() {
    let project = Project::new(&[]);
    let host = FakeHost::new();
    let _session = running(&project, &host, |_| {});
    assert_eq!(host.require("").unwrap_err().kind(), "validation");
}

#[test]
fn unhook_is_idempotent() {
    let project = Project::new(&[("m.lua", "return 1\n")]);
    let host = FakeHost::new();
    let config = CoverageConfig { use_instrumentation: true, ..project.config() };
    let session = CoverageSession::new(config).unwrap();
    let interceptor = session.interceptor();

    interceptor.unhook(&host).unwrap();
    assert_eq!(host.require_restores.get(), 0);

    interceptor.hook(&host).unwrap();
    interceptor.hook(&host).unwrap();
    assert!(interceptor.is_hooked());
    interceptor.unhook(&host).unwrap();
    interceptor.unhook(&host).unwrap();
    assert_eq!(host.require_restores.get(), 1);
    assert!(!host.is_require_hooked());

    // With the hook gone, require is the host's own.
    host.bind(interceptor, session.runtime().clone());
    assert_eq!(host.require("m").unwrap(), "original:m");
}
