//! Pass 3: control-flow analysis. Verifies that every function with a
//! non-unit return type returns on all paths, and reports code that follows
//! a returning statement.

use crate::parser::ast::{Expression, Module, Statement};

use super::error::SemaError;

pub fn analyze(module: &Module) -> Vec<SemaError> {
    let mut analyzer = FlowAnalyzer { errors: Vec::new() };
    analyzer.analyze_statements(&module.statements);
    analyzer.errors
}

struct FlowAnalyzer {
    errors: Vec<SemaError>,
}

impl FlowAnalyzer {
    fn analyze_statements(&mut self, statements: &[Statement]) {
        self.check_unreachable(statements);
        for stmt in statements {
            self.analyze_stmt(stmt);
        }
    }

    fn analyze_stmt(&mut self, stmt: &Statement) {
        match stmt {
            Statement::FuncDecl(decl) => {
                if let Some(ret) = &decl.ret
                    && !block_returns(&decl.body.statements)
                {
                    self.errors.push(SemaError::MissingReturnPath {
                        name: decl.name.clone(),
                        ret: ret.to_string(),
                    });
                }
                self.analyze_statements(&decl.body.statements);
            }
            Statement::If {
                then_branch,
                else_branch,
                ..
            } => {
                self.analyze_stmt(then_branch);
                if let Some(else_branch) = else_branch {
                    self.analyze_stmt(else_branch);
                }
            }
            Statement::For { body, .. } => self.analyze_statements(&body.statements),
            Statement::Block(block) => self.analyze_statements(&block.statements),
            Statement::Expr {
                expr: Expression::Block(block),
                ..
            } => self.analyze_statements(&block.statements),
            _ => {}
        }
    }

    /// One error per block: everything after the first returning statement
    /// is unreachable.
    fn check_unreachable(&mut self, statements: &[Statement]) {
        for i in 0..statements.len().saturating_sub(1) {
            if stmt_returns(&statements[i]) {
                self.errors.push(SemaError::UnreachableCode { index: i + 1 });
                break;
            }
        }
    }
}

fn stmt_returns(stmt: &Statement) -> bool {
    match stmt {
        Statement::Return(_) => true,
        Statement::Block(block) => block_returns(&block.statements),
        Statement::Expr {
            expr: Expression::Block(block),
            ..
        } => block_returns(&block.statements),
        Statement::If {
            then_branch,
            else_branch: Some(else_branch),
            ..
        } => stmt_returns(then_branch) && stmt_returns(else_branch),
        _ => false,
    }
}

fn block_returns(statements: &[Statement]) -> bool {
    statements.iter().any(stmt_returns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lexer, parser};
    use indoc::indoc;

    fn analyze_source(source: &str) -> Vec<SemaError> {
        let tokens = lexer::tokenize(source).expect("tokenize should succeed");
        let module = parser::parse_tokens(tokens).expect("parse should succeed");
        analyze(&module)
    }

    #[test]
    fn straight_line_return_satisfies_the_function() {
        assert_eq!(
            analyze_source("func f(): i32 { return 1 }"),
            vec![]
        );
    }

    #[test]
    fn reports_function_that_may_not_return() {
        let errors = analyze_source(indoc! {"
            func f(x: i32): i32 {
                if x > 0 then {
                    return 1
                }
            }
        "});
        assert_eq!(
            errors,
            vec![SemaError::MissingReturnPath {
                name: "f".to_string(),
                ret: "i32".to_string(),
            }]
        );
    }

    #[test]
    fn if_with_both_branches_returning_counts() {
        let errors = analyze_source(indoc! {"
            func sign(x: i32): i32 {
                if x < 0 then {
                    return -1
                }
                else {
                    return 1
                }
            }
        "});
        assert_eq!(errors, vec![]);
    }

    #[test]
    fn if_without_else_does_not_count_as_returning() {
        let errors = analyze_source(indoc! {"
            func f(x: i32): i32 {
                if x < 0 then return -1
            }
        "});
        assert_eq!(
            errors,
            vec![SemaError::MissingReturnPath {
                name: "f".to_string(),
                ret: "i32".to_string(),
            }]
        );
    }

    #[test]
    fn unit_functions_need_no_return() {
        assert_eq!(analyze_source("func f() { }"), vec![]);
    }

    #[test]
    fn reports_unreachable_code_after_return() {
        let errors = analyze_source("func f(): i32 { return 1; return 2 }");
        assert_eq!(errors, vec![SemaError::UnreachableCode { index: 1 }]);
    }

    #[test]
    fn unreachable_code_is_reported_once_per_block() {
        let errors = analyze_source(indoc! {"
            func f(): i32 {
                return 1
                foo()
                bar()
            }
        "});
        assert_eq!(errors, vec![SemaError::UnreachableCode { index: 1 }]);
    }

    #[test]
    fn unreachable_code_found_in_nested_branches() {
        let errors = analyze_source(indoc! {"
            func f(x: i32): i32 {
                if x > 0 then {
                    return 1
                    x
                }
                return 0
            }
        "});
        assert_eq!(errors, vec![SemaError::UnreachableCode { index: 1 }]);
    }

    #[test]
    fn returning_if_statement_makes_the_rest_unreachable() {
        let errors = analyze_source(indoc! {"
            func f(x: i32): i32 {
                if x < 0 then {
                    return -1
                }
                else {
                    return 1
                }
                return 0
            }
        "});
        assert_eq!(errors, vec![SemaError::UnreachableCode { index: 1 }]);
    }

    #[test]
    fn nested_functions_are_analyzed() {
        let errors = analyze_source(indoc! {"
            func outer() {
                func inner(): i32 {
                }
            }
        "});
        assert_eq!(
            errors,
            vec![SemaError::MissingReturnPath {
                name: "inner".to_string(),
                ret: "i32".to_string(),
            }]
        );
    }

    #[test]
    fn for_bodies_are_analyzed() {
        let errors = analyze_source(indoc! {"
            func f(): i32 {
                for (i := 0; i < 10; i += 1) {
                    return 1
                    i
                }
                return 0
            }
        "});
        assert_eq!(errors, vec![SemaError::UnreachableCode { index: 1 }]);
    }
}
