#![allow(dead_code)]
use std::fmt::Write;
use std::path::Path;

use stackc::Config;
use test_support::load_cases;

/// Limits raised so the generated workload fits.
pub fn config() -> Config {
    let mut config = Config::default();
    config.limits.max_functions = 64;
    config.limits.max_variables = 256;
    config
}

/// Golden cases marked `bench: true`, plus one generated program.
pub fn workloads() -> Vec<(String, String)> {
    let cases = load_cases(Path::new("tests/programs")).expect("load cases");
    let mut workloads = cases
        .into_iter()
        .filter(|case| case.spec.bench)
        .map(|case| {
            let source = case.source().expect("read case program");
            (case.name, source)
        })
        .collect::<Vec<_>>();
    workloads.push(("generated".to_string(), generated_program(40)));
    workloads
}

/// A chain of `functions` functions, each calling the previous one, with
/// enough constant arithmetic to keep the optimizer busy.
pub fn generated_program(functions: usize) -> String {
    let mut source = String::new();
    for i in 0..functions {
        let tail = if i == 0 {
            "s + t".to_string()
        } else {
            format!("call f{}(s; t) + t", i - 1)
        };
        writeln!(
            source,
            "decl f{i}(a; b) {{\n    var s = a * 2 + b * 1 - 0;\n    var t = s / (1 + 1) + 3 ^ 2;\n    if (s > t) s = t; else t = s * s;\n    return {tail};\n}};"
        )
        .expect("write to string");
    }
    writeln!(
        source,
        "decl main() {{ var x = 0; scan x; var y = call f{}(x; 1); print y; }};\n$",
        functions.saturating_sub(1)
    )
    .expect("write to string");
    source
}
