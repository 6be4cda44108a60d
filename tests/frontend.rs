use std::path::Path;

use anyhow::{Context, Result, ensure};

use rill::fixtures::{self, Case, CaseClass};
use rill::{lexer, parser, sema};

fn run_case(case: &Case) -> Result<()> {
    let source = case.read_source()?;
    let tokenized = lexer::tokenize(&source);

    match case.spec.class {
        CaseClass::CheckSuccess => {
            let tokens = tokenized.with_context(|| format!("Tokenizing {}", case.name))?;
            let module = parser::parse_tokens(tokens)
                .with_context(|| format!("Parsing {}", case.name))?;
            let errors = sema::check(&module);
            ensure!(
                errors.is_empty(),
                "Expected a clean check for {}, got: {:?}",
                case.name,
                errors
            );
        }
        CaseClass::FrontendError => {
            let expected = case
                .spec
                .error_contains
                .as_deref()
                .expect("validated by load_cases");
            match tokenized {
                Err(error) => {
                    let actual = error.to_string();
                    ensure!(
                        actual.contains(expected),
                        "Expected frontend error containing '{expected}' in {}, got '{actual}'",
                        case.name
                    );
                }
                Ok(tokens) => {
                    let parse_result = parser::parse_tokens(tokens);
                    ensure!(
                        parse_result.is_err(),
                        "Expected frontend error in {}, but parsing succeeded",
                        case.name
                    );
                    let actual = parse_result
                        .expect_err("parse_result checked as err")
                        .to_string();
                    ensure!(
                        actual.contains(expected),
                        "Expected frontend error containing '{expected}' in {}, got '{actual}'",
                        case.name
                    );
                }
            }
        }
        CaseClass::CheckError => {
            let expected = case
                .spec
                .error_contains
                .as_deref()
                .expect("validated by load_cases");
            let tokens = tokenized.with_context(|| format!("Tokenizing {}", case.name))?;
            let module = parser::parse_tokens(tokens)
                .with_context(|| format!("Parsing {}", case.name))?;
            let errors = sema::check(&module);
            ensure!(
                !errors.is_empty(),
                "Expected check errors for {}, but the check was clean",
                case.name
            );
            let rendered = errors
                .iter()
                .map(|error| error.to_string())
                .collect::<Vec<_>>()
                .join("\n");
            ensure!(
                rendered.contains(expected),
                "Expected check error containing '{expected}' in {}, got:\n{rendered}",
                case.name
            );
        }
    }

    Ok(())
}

#[test]
fn runs_fixture_programs() -> Result<()> {
    let cases = fixtures::load_cases(Path::new("tests/programs"))?;
    for case in cases {
        run_case(&case).with_context(|| format!("Case {}", case.name))?;
    }
    Ok(())
}
