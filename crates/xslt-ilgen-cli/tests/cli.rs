use clap::Parser;
use rstest::{fixture, rstest};
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;
use xslt_ilgen_cli::{Cli, OutputFormat, execute, resolve_options};

const ADDITION: &str = r#"{"op":"Add","args":[{"op":"LiteralInt32","value":2},{"op":"LiteralInt32","value":3}]}"#;

const ELEMENT: &str = r#"{"op":"ElementCtor","args":[
    {"op":"LiteralQName","value":"a"},
    {"op":"TextCtor","args":[{"op":"LiteralString","value":"hi"}]}
]}"#;

#[fixture]
fn workdir() -> TempDir {
    tempfile::tempdir().expect("temp dir")
}

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).expect("write input");
    path
}

fn cli(args: &[&str]) -> Cli {
    let mut argv = vec!["xslt-ilgen"];
    argv.extend_from_slice(args);
    Cli::parse_from(argv)
}

#[rstest]
fn text_listing_shows_folded_root(workdir: TempDir) {
    let input = write(&workdir, "add.json", ADDITION);
    let output = execute(&cli(&[input.to_str().expect("utf-8 path"), "--values", "--no-color"])).expect("execute");

    assert!(output.contains(".method M0 root (params 0)"), "{output}");
    assert!(output.contains("ldc 5"), "{output}");
    assert!(!output.contains("add."), "{output}");
    assert!(output.contains(".data"), "{output}");
}

#[rstest]
fn json_output_carries_program_and_static_data(workdir: TempDir) {
    let input = write(&workdir, "element.json", ELEMENT);
    let output = execute(&cli(&[input.to_str().expect("utf-8 path"), "--format", "json"])).expect("execute");

    let value: Value = serde_json::from_str(&output).expect("json output");
    assert_eq!(value["program"]["methods"][0]["name"], "root");
    assert!(value["static_data"]["names"].is_array());
    assert!(value.get("optimized_tree").is_none());
}

#[rstest]
fn emit_tree_includes_optimized_ir(workdir: TempDir) {
    let input = write(&workdir, "add.json", ADDITION);
    let output =
        execute(&cli(&[input.to_str().expect("utf-8 path"), "--values", "--format", "json", "--emit-tree"])).expect("execute");

    let value: Value = serde_json::from_str(&output).expect("json output");
    let tree = &value["optimized_tree"];
    assert_eq!(tree["op"], "QilExpression");
    assert_eq!(tree["args"][3]["op"], "LiteralInt32");
    assert_eq!(tree["args"][3]["value"], 5);
}

#[rstest]
fn options_file_is_overridden_by_flags(workdir: TempDir) {
    let input = write(&workdir, "add.json", ADDITION);
    let options = write(&workdir, "options.json", r#"{"speculative":false,"root_output":true}"#);
    let args = cli(&[input.to_str().expect("utf-8 path"), "--options", options.to_str().expect("utf-8 path"), "--values"]);

    let resolved = resolve_options(&args).expect("options");
    assert!(!resolved.speculative);
    assert!(!resolved.root_output);
    assert!(!resolved.debug);
    assert_eq!(args.format, OutputFormat::Text);
}

#[rstest]
#[case("missing.json", None)]
#[case("broken.json", Some(r#"{"op":"Frobnicate"}"#))]
#[case("garbage.json", Some("not json"))]
fn bad_input_is_reported(workdir: TempDir, #[case] name: &str, #[case] content: Option<&str>) {
    let input = match content {
        Some(text) => write(&workdir, name, text),
        None => workdir.path().join(name),
    };
    let error = execute(&cli(&[input.to_str().expect("utf-8 path")])).expect_err("must fail");
    assert!(error.to_string().contains(name), "{error:#}");
}
