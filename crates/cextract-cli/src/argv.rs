//! Compiler-style argument normalization
//!
//! `cextract` is often dropped into a build in place of the compiler, so
//! its command line may carry the legacy `-DCE_*` options and arbitrary
//! compiler flags. They are rewritten into the clap options before parsing.

/// Rewritten argument vector and the flags that were dropped
#[derive(Debug, Default, PartialEq)]
pub struct Normalized {
    pub args: Vec<String>,
    pub ignored: Vec<String>,
}

/// Options that take their value in the next argument
const VALUE_OPTIONS: &[&str] = &[
    "-f",
    "--functions",
    "--export-symbols",
    "-o",
    "--output",
    "-I",
    "--include",
    "--config",
];

const SWITCHES: &[&str] = &[
    "--no-externalization",
    "--dump-passes",
    "--keep-includes",
    "-h",
    "--help",
    "-V",
    "--version",
];

/// Rewrite `args` (program name first) for clap
pub fn normalize<I>(args: I) -> Normalized
where
    I: IntoIterator<Item = String>,
{
    let mut out = Normalized::default();
    let mut args = args.into_iter();
    if let Some(program) = args.next() {
        out.args.push(program);
    }

    while let Some(arg) = args.next() {
        if let Some(list) = arg.strip_prefix("-DCE_EXTRACT_FUNCTIONS=") {
            out.args.extend(["--functions".to_string(), list.to_string()]);
        } else if let Some(list) = arg.strip_prefix("-DCE_EXPORT_SYMBOLS=") {
            out.args.extend(["--export-symbols".to_string(), list.to_string()]);
        } else if let Some(path) = arg.strip_prefix("-DCE_OUTPUT_FILE=") {
            let path = path.split(',').next().unwrap_or_default();
            out.args.extend(["--output".to_string(), path.to_string()]);
        } else if arg == "-DCE_NO_EXTERNALIZATION" {
            out.args.push("--no-externalization".to_string());
        } else if arg == "-DCE_DUMP_PASSES" {
            out.args.push("--dump-passes".to_string());
        } else if let Some(dir) = arg.strip_prefix("-I").filter(|d| !d.is_empty()) {
            out.args.extend(["--include".to_string(), dir.to_string()]);
        } else if VALUE_OPTIONS.contains(&arg.as_str()) {
            out.args.push(arg);
            out.args.extend(args.next());
        } else if SWITCHES.contains(&arg.as_str())
            || is_long_with_value(&arg)
            || !arg.starts_with('-')
        {
            out.args.push(arg);
        } else {
            out.ignored.push(arg);
        }
    }
    out
}

/// `--name=value` for one of the value options
fn is_long_with_value(arg: &str) -> bool {
    arg.split_once('=')
        .is_some_and(|(name, _)| name.starts_with("--") && VALUE_OPTIONS.contains(&name))
}
