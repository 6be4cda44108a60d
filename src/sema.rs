//! Semantic analysis: symbol resolution, type checking, and control-flow
//! analysis, run in that order. Each pass accumulates errors and runs to the
//! end of its input; a pass with findings stops the later passes from
//! running at all.

pub mod checker;
pub mod error;
pub mod flow;
pub mod resolver;
pub mod types;

pub use error::SemaError;
pub use resolver::{Resolved, resolve};
pub use types::Type;

use crate::parser::ast::Module;

/// Runs the three semantic passes over a parsed module and returns the
/// ordered error list. Empty means the module is ready for code generation.
pub fn check(module: &Module) -> Vec<SemaError> {
    let resolved = resolver::resolve(module);
    if !resolved.errors.is_empty() {
        return resolved.errors;
    }
    let type_errors = checker::check_types(module);
    if !type_errors.is_empty() {
        return type_errors;
    }
    flow::analyze(module)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lexer, parser};
    use indoc::indoc;

    fn check_source(source: &str) -> Vec<SemaError> {
        let tokens = lexer::tokenize(source).expect("tokenize should succeed");
        let module = parser::parse_tokens(tokens).expect("parse should succeed");
        check(&module)
    }

    #[test]
    fn minimal_function_checks_clean() {
        assert_eq!(check_source("func main(): i32 { return 69 }"), vec![]);
    }

    #[test]
    fn clean_program_with_all_constructs() {
        let errors = check_source(indoc! {"
            use {
                io: std_io,
            }

            struct Point {
                x: i32,
                y: i32,
            }

            func manhattan(p: Point): i32 {
                return p.x + p.y
            }

            func clamp(n: i32, limit: i32): i32 {
                if n > limit then {
                    return limit
                }
                return n
            }

            func main(): i32 {
                p := Point{ x: 3, y: 4, }
                total := 0
                for (i := 0; i < 10; i += 1) {
                    total += clamp(manhattan(p), i)
                }
                return if total > 50 then 50 else total
            }
        "});
        assert_eq!(errors, vec![]);
    }

    #[test]
    fn resolver_errors_stop_type_checking() {
        // `mystery` is unresolved; the checker would also flag the call but
        // must never run.
        let errors = check_source(indoc! {"
            mystery(1)
            let x: bool = 1
        "});
        assert_eq!(
            errors,
            vec![SemaError::UndefinedIdentifier {
                name: "mystery".to_string()
            }]
        );
    }

    #[test]
    fn type_errors_stop_flow_analysis() {
        // The body both mis-returns a string and lacks a full return path;
        // only the type error surfaces.
        let errors = check_source(indoc! {"
            func f(x: i32): i32 {
                if x > 0 then {
                    return \"positive\"
                }
            }
        "});
        assert_eq!(
            errors,
            vec![SemaError::ReturnTypeMismatch {
                expected: "i32".to_string(),
                found: "string".to_string(),
            }]
        );
    }

    #[test]
    fn flow_errors_surface_for_well_typed_programs() {
        let errors = check_source("func f(): i32 { return 1; return 2 }");
        assert_eq!(errors, vec![SemaError::UnreachableCode { index: 1 }]);
    }

    #[test]
    fn trailing_whitespace_does_not_change_the_outcome() {
        let source = "func main(): i32 { return 69 }";
        let padded = format!("{source}\n\n   \n");
        assert_eq!(check_source(source), vec![]);
        assert_eq!(check_source(&padded), vec![]);
    }
}
