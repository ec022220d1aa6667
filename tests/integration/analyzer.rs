//! Static analysis over whole files: the code map a session works from.

mod common;

use common::Project;
use lunacov::analyzer::{analyze, analyze_file, AnalyzeOptions, BlockKind, ConditionKind, FunctionKind, LineKind};
use lunacov::CoverageSession;

fn options() -> AnalyzeOptions {
    AnalyzeOptions { reject_vendor: false, ..Default::default() }
}

const SERVICE: &str = "\
local Service = {}
Service.__index = Service

--- Build a service.
function Service.new(name)
  local self = setmetatable({}, Service)
  self.name = name
  return self
end

function Service:handle(req)
  if not req then
    return nil, \"missing request\"
  elseif req.kind == \"ping\" and self.name then
    return \"pong\"
  end
  for _, h in ipairs(self.handlers or {}) do
    local ok = h(req)
    if ok then return ok end
  end
  return nil
end

return Service
";

#[test]
fn service_module_code_map() {
    let map = analyze("/app/service.lua", SERVICE, &options()).unwrap();
    assert!(map.parsed);
    assert_eq!(map.line_count(), 24);

    let functions: Vec<(&str, FunctionKind, u32, u32)> =
        map.functions.iter().map(|f| (f.name.as_str(), f.kind, f.start_line, f.end_line)).collect();
    assert_eq!(
        functions,
        vec![
            ("Service.new", FunctionKind::Module, 5, 9),
            ("Service:handle", FunctionKind::Method, 11, 22),
        ]
    );
    assert_eq!(map.functions[0].params, vec!["name"]);
    assert_eq!(map.functions[1].body_lines, Some((12, 21)));

    let blocks: Vec<(BlockKind, Option<usize>)> = map.blocks.iter().map(|b| (b.kind, b.parent_id)).collect();
    assert_eq!(
        blocks,
        vec![
            (BlockKind::If, None),
            (BlockKind::Then, Some(1)),
            (BlockKind::ElseIf, Some(1)),
            (BlockKind::For, None),
            (BlockKind::If, Some(4)),
            (BlockKind::Then, Some(5)),
        ]
    );

    let kinds: Vec<ConditionKind> = map.conditions.iter().map(|c| c.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ConditionKind::Not,
            ConditionKind::Identifier,
            ConditionKind::And,
            ConditionKind::Comparison,
            ConditionKind::Index,
            ConditionKind::Identifier,
        ]
    );
    assert_eq!(map.conditions[2].component_ids, vec![4, 5]);
}

#[test]
fn line_kinds_of_the_service_module() {
    let map = analyze("/app/service.lua", SERVICE, &options()).unwrap();
    let kind = |line: u32| map.line(line).map(|l| l.kind);
    assert_eq!(kind(1), Some(LineKind::Code));
    assert_eq!(kind(3), Some(LineKind::Blank));
    assert_eq!(kind(4), Some(LineKind::Comment));
    assert_eq!(kind(9), Some(LineKind::Structural));
    assert_eq!(kind(14), Some(LineKind::Code));
    assert_eq!(kind(16), Some(LineKind::Structural));
    assert!(!map.is_executable(9));
    assert!(map.is_executable(17));
    assert_eq!(map.line_text(24), Some("return Service"));
}

#[test]
fn structural_lines_count_only_when_asked() {
    let map = analyze("/app/service.lua", SERVICE, &options()).unwrap();
    let plain = map.executable_line_count();
    let with_keywords = map.executable_line_count_with(true);
    let structural = map.lines.iter().filter(|l| l.kind == LineKind::Structural).count();
    assert_eq!(with_keywords, plain + structural);
}

#[test]
fn syntax_errors_fall_back_to_heuristics() {
    let project = Project::new(&[("broken.lua", "local function f(a)\n  return a +\nend\nprint(f(1)\n")]);
    let map = analyze_file(&project.path("broken.lua"), &options()).unwrap();
    assert!(!map.parsed);
    assert!(map.parse_error.as_deref().is_some_and(|e| e.contains("parse error")));
    assert!(map.blocks.is_empty() && map.conditions.is_empty());
    assert_eq!(map.functions.len(), 1);
    assert_eq!(map.functions[0].name, "f");
    assert_eq!(map.functions[0].kind, FunctionKind::Local);
}

#[test]
fn same_basename_in_different_directories_stays_distinct() {
    let project = Project::new(&[
        ("lib/a/util.lua", "return 1\n"),
        ("lib/b/util.lua", "local x = 2\nreturn x\n"),
    ]);
    let session = CoverageSession::new(project.config()).unwrap();
    session.track_file(&project.key("lib/a/util.lua")).unwrap();
    session.track_file(&project.key("lib/b/util.lua")).unwrap();

    let report = session.get_report_data().unwrap();
    assert_eq!(report.summary.total_files, 2);
    assert_eq!(report.file(&project.key("lib/a/util.lua")).unwrap().summary.executable_lines, 1);
    assert_eq!(report.file(&project.key("lib/b/util.lua")).unwrap().summary.executable_lines, 2);
}

#[test]
fn tracked_files_that_fail_are_reported_unanalyzed() {
    let project = Project::new(&[("big.lua", "local padding = 1\n")]);
    let config = lunacov::CoverageConfig { max_file_size: 4, ..project.config() };
    let session = CoverageSession::new(config).unwrap();
    let err = session.track_file(&project.key("big.lua")).unwrap_err();
    assert_eq!(err.kind(), "size_limit_exceeded");

    let report = session.get_report_data().unwrap();
    let file = report.file(&project.key("big.lua")).unwrap();
    assert!(!file.summary.analyzed);
    assert!(file.summary.analysis_error.as_deref().is_some_and(|e| e.contains("byte limit")));
    assert_eq!(report.summary.analyzed_files, 0);
}
