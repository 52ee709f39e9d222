use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::tempdir;

const SOURCE: &str = "\
static int g(void) { return 1; }
int unused(void) { return 2; }
int f(void) { return g(); }
";

#[test]
fn extracts_to_stdout() {
    let temp = tempdir().unwrap();
    let file = temp.path().join("main.c");
    fs::write(&file, SOURCE).unwrap();

    cargo_bin_cmd!("cextract")
        .arg(&file)
        .arg("-f")
        .arg("f")
        .assert()
        .success()
        .stdout("static int (*klp_g)(void);\n\nint f(void) { return klp_g(); }\n");
}

#[test]
fn legacy_options_write_output_and_dump() {
    let temp = tempdir().unwrap();
    let file = temp.path().join("main.c");
    let output = temp.path().join("patch.c");
    fs::write(&file, SOURCE).unwrap();

    cargo_bin_cmd!("cextract")
        .arg("-DCE_EXTRACT_FUNCTIONS=f")
        .arg(format!("-DCE_OUTPUT_FILE={}", output.display()))
        .arg("-DCE_NO_EXTERNALIZATION")
        .arg("-DCE_DUMP_PASSES")
        .arg("-O2")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    let text = fs::read_to_string(&output).unwrap();
    assert_eq!(
        text,
        "static int g(void) { return 1; }\n\nint f(void) { return g(); }\n"
    );

    let dump = fs::read_to_string(temp.path().join("patch.c.closure.json")).unwrap();
    let report: serde_json::Value = serde_json::from_str(&dump).unwrap();
    assert_eq!(report["functions"][0], "f");
    assert_eq!(report["decls"].as_array().unwrap().len(), 2);
}

#[test]
fn unknown_function_fails() {
    let temp = tempdir().unwrap();
    let file = temp.path().join("main.c");
    fs::write(&file, SOURCE).unwrap();

    cargo_bin_cmd!("cextract")
        .arg(&file)
        .arg("--functions")
        .arg("missing")
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot extract `missing` (not found)"));
}

#[test]
fn missing_function_list_fails() {
    let temp = tempdir().unwrap();
    let file = temp.path().join("main.c");
    fs::write(&file, SOURCE).unwrap();

    cargo_bin_cmd!("cextract")
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("no functions to extract"));
}
