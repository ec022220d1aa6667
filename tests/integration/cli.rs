//! End-to-end runs of the `lunacov` binary.

mod common;

use std::process::{Command, Output};

use common::Project;
use lunacov::instrument::output_path;

const MODULE: &str = "\
local M = {}

function M.pick(a, b)
  if a and b then
    return a
  end
  return b
end

return M
";

fn lunacov(args: &[&std::ffi::OsStr]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_lunacov")).args(args).output().unwrap()
}

#[test]
fn analyze_json_prints_the_code_map() {
    let project = Project::new(&[("m.lua", MODULE)]);
    let file = project.path("m.lua");
    let out = lunacov(&["analyze".as_ref(), file.as_os_str(), "--json".as_ref()]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let json: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(json["parsed"], true);
    assert_eq!(json["lines"].as_array().unwrap().len(), 10);
    assert_eq!(json["lines"][3]["kind"], "code");
    assert_eq!(json["lines"][1]["kind"], "blank");
    assert_eq!(json["functions"][0]["name"], "M.pick");
    assert_eq!(json["functions"][0]["kind"], "module");
    assert_eq!(json["blocks"][0]["kind"], "if");
    assert_eq!(json["conditions"][0]["kind"], "and");
}

#[test]
fn analyze_prints_a_summary_without_json() {
    let project = Project::new(&[("m.lua", MODULE)]);
    let out = lunacov(&["analyze".as_ref(), project.path("m.lua").as_os_str()]);
    assert!(out.status.success());
    let text = String::from_utf8(out.stdout).unwrap();
    assert!(text.contains("lines: 10 total, 6 executable"), "{text}");
    assert!(text.contains("M.pick"));
}

#[test]
fn instrument_writes_under_the_output_directory() {
    let project = Project::new(&[("src/m.lua", MODULE)]);
    let out_dir = tempfile::tempdir().unwrap();
    let file = project.path("src/m.lua");
    let out = lunacov(&["instrument".as_ref(), file.as_os_str(), "-o".as_ref(), out_dir.path().as_os_str()]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    assert!(out.stdout.is_empty());

    let written = output_path(out_dir.path(), &project.key("src/m.lua"));
    let source = std::fs::read_to_string(&written).unwrap();
    assert_eq!(source.lines().count(), MODULE.lines().count());
    assert!(source.starts_with("local __lc_rt = require(\"lunacov.runtime\")"));
    assert!(lunacov::parser::parse("out.lua", &source, 2000).is_ok());
}

#[test]
fn instrument_without_output_prints_the_rewrite() {
    let project = Project::new(&[("m.lua", "x = 1\n")]);
    let out = lunacov(&["instrument".as_ref(), project.path("m.lua").as_os_str()]);
    assert!(out.status.success());
    let text = String::from_utf8(out.stdout).unwrap();
    assert!(text.contains("__lc_l(__lc_file, 1); x = 1"), "{text}");
}

#[test]
fn check_fails_when_any_file_does_not_parse() {
    let project = Project::new(&[("good.lua", MODULE), ("broken.lua", "local x = 1\nlocal = 2\n")]);
    let good = project.path("good.lua");
    let broken = project.path("broken.lua");
    let out = lunacov(&["check".as_ref(), good.as_os_str(), broken.as_os_str()]);
    assert_eq!(out.status.code(), Some(1));

    let stdout = String::from_utf8(out.stdout).unwrap();
    assert!(stdout.contains(&format!("ok    {}", good.display())), "{stdout}");
    assert!(stdout.contains(&format!("FAIL  {}", broken.display())), "{stdout}");

    let stderr = String::from_utf8(out.stderr).unwrap();
    assert!(stderr.contains("1 of 2 file(s) failed"), "{stderr}");
    assert!(stderr.contains(&format!("{}:2:", broken.display())), "{stderr}");
    assert!(!stderr.contains("<unknown>"), "{stderr}");
}

#[test]
fn bad_config_files_exit_with_an_error() {
    let project = Project::new(&[("m.lua", "x = 1\n"), ("lunacov.toml", "enabled = \"yes\"\n")]);
    let config = project.path("lunacov.toml");
    let out = lunacov(&["--config".as_ref(), config.as_os_str(), "analyze".as_ref(), project.path("m.lua").as_os_str()]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("validation error in load_config"));
}
