use anyhow::{Context, Result, ensure};
use std::path::Path;

use stackc::{Config, Unit, pipeline, tree_text};
use test_support::{Case, CaseClass, load_cases, normalize_output};

fn case_config(case: &Case) -> Result<Config> {
    match case.config_path() {
        Some(path) => Config::load(&path).with_context(|| format!("Loading config of {}", case.name)),
        None => Ok(Config::default()),
    }
}

/// Every stage in one process, sharing the arena.
fn assemble_in_process(case: &Case, config: &Config) -> Result<String> {
    let mut unit = pipeline::compile_unit(&case.source()?, config)
        .with_context(|| format!("Frontend failed for {}", case.name))?;
    if case.spec.optimize {
        pipeline::optimize(&mut unit)
            .with_context(|| format!("Middleend failed for {}", case.name))?;
    }
    pipeline::generate(&unit, config).with_context(|| format!("Backend failed for {}", case.name))
}

/// Frontend, middleend and backend handing the tree over as text.
fn assemble_through_text(case: &Case, config: &Config) -> Result<String> {
    let unit = pipeline::compile_unit(&case.source()?, config)
        .with_context(|| format!("Frontend failed for {}", case.name))?;
    let text = serialize(&unit)?;

    let mut unit = tree_text::read(&text, config)
        .with_context(|| format!("Middleend could not read tree of {}", case.name))?;
    if case.spec.optimize {
        pipeline::optimize(&mut unit)
            .with_context(|| format!("Middleend failed for {}", case.name))?;
    }
    let text = serialize(&unit)?;

    let unit = tree_text::read(&text, config)
        .with_context(|| format!("Backend could not read tree of {}", case.name))?;
    pipeline::generate(&unit, config).with_context(|| format!("Backend failed for {}", case.name))
}

fn serialize(unit: &Unit) -> Result<String> {
    Ok(tree_text::write(&unit.ast, &unit.names)?)
}

fn ensure_error_contains(case: &Case, actual: &str) -> Result<()> {
    let expected = case.expected_error()?;
    ensure!(
        actual.contains(expected),
        "Expected error containing '{expected}' in {}, got '{actual}'",
        case.name
    );
    Ok(())
}

fn run_case(case: &Case) -> Result<()> {
    let config = case_config(case)?;
    let source = case.source()?;
    match case.spec.class {
        CaseClass::Success => {
            let expected = normalize_output(&case.expected_asm()?);
            let actual = normalize_output(&assemble_in_process(case, &config)?);
            assert_eq!(actual, expected, "Assembly mismatch for {}", case.name);
        }
        CaseClass::FrontendError => {
            let result = pipeline::compile_unit(&source, &config);
            ensure!(
                result.is_err(),
                "Expected frontend error in {}, but parsing succeeded",
                case.name
            );
            let actual = result.err().map(|err| err.to_string()).unwrap_or_default();
            ensure_error_contains(case, &actual)?;
        }
        CaseClass::OptimizerError => {
            let mut unit = pipeline::compile_unit(&source, &config)
                .with_context(|| format!("Frontend failed for {}", case.name))?;
            let result = pipeline::optimize(&mut unit);
            ensure!(
                result.is_err(),
                "Expected optimizer error in {}, but optimization succeeded",
                case.name
            );
            let actual = result.err().map(|err| err.to_string()).unwrap_or_default();
            ensure_error_contains(case, &actual)?;
        }
        CaseClass::BackendError => {
            let mut unit = pipeline::compile_unit(&source, &config)
                .with_context(|| format!("Frontend failed for {}", case.name))?;
            if case.spec.optimize {
                pipeline::optimize(&mut unit)
                    .with_context(|| format!("Middleend failed for {}", case.name))?;
            }
            let result = pipeline::generate(&unit, &config);
            ensure!(
                result.is_err(),
                "Expected backend error in {}, but lowering succeeded",
                case.name
            );
            let actual = result.err().map(|err| err.to_string()).unwrap_or_default();
            ensure_error_contains(case, &actual)?;
        }
    }
    Ok(())
}

#[test]
fn runs_programs_in_process() -> Result<()> {
    for case in load_cases(Path::new("tests/programs"))? {
        run_case(&case)?;
    }
    Ok(())
}

#[test]
fn text_boundary_matches_in_process() -> Result<()> {
    for case in load_cases(Path::new("tests/programs"))? {
        if case.spec.class != CaseClass::Success {
            continue;
        }
        let config = case_config(&case)?;
        let direct = assemble_in_process(&case, &config)?;
        let staged = assemble_through_text(&case, &config)?;
        assert_eq!(staged, direct, "Stage boundary changed output of {}", case.name);
    }
    Ok(())
}

#[test]
fn optimizer_reaches_a_fixed_point() -> Result<()> {
    for case in load_cases(Path::new("tests/programs"))? {
        if case.spec.class != CaseClass::Success {
            continue;
        }
        let config = case_config(&case)?;
        let mut unit = pipeline::compile_unit(&case.source()?, &config)?;
        pipeline::optimize(&mut unit)?;
        let once = serialize(&unit)?;

        let report = pipeline::optimize(&mut unit)?;
        ensure!(
            report.folded + report.simplified == 0,
            "Second optimization of {} still rewrote the tree: {report:?}",
            case.name
        );
        ensure!(serialize(&unit)? == once, "Tree of {} changed", case.name);
    }
    Ok(())
}
