use thiserror::Error;

/// Accumulated, non-fatal errors from the semantic passes. Each message
/// names the construct it is about; formatting beyond that (colors, paths)
/// is the caller's concern.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SemaError {
    // Resolution
    #[error("undefined identifier: {name}")]
    UndefinedIdentifier { name: String },
    #[error("undefined type: {name}")]
    UndefinedType { name: String },
    #[error("redeclared struct {name} in the same scope")]
    RedeclaredStruct { name: String },
    #[error("redeclared function {name} in the same scope")]
    RedeclaredFunction { name: String },
    #[error("duplicate member {member} in struct {name}")]
    DuplicateMember { member: String, name: String },

    // Type checking
    #[error("undefined variable: {name}")]
    UndefinedVariable { name: String },
    #[error("type mismatch: variable {name} declared as {declared} but initialized with {found}")]
    VarInitMismatch {
        name: String,
        declared: String,
        found: String,
    },
    #[error("invalid operands for {op}: {lhs} and {rhs}")]
    InvalidBinaryOperands {
        op: String,
        lhs: String,
        rhs: String,
    },
    #[error("invalid operand for {op}: {operand}")]
    InvalidUnaryOperand { op: String, operand: String },
    #[error("cannot compare {lhs} and {rhs}")]
    CannotCompare { lhs: String, rhs: String },
    #[error("cannot call non-function value of type {ty}")]
    NotAFunction { ty: String },
    #[error("wrong number of arguments, expected {expected}, found {found}")]
    WrongArgCount { expected: usize, found: usize },
    #[error("argument {index} type mismatch: expected {expected}, found {found}")]
    ArgTypeMismatch {
        index: usize,
        expected: String,
        found: String,
    },
    #[error("expression of type {ty} cannot be used as a struct")]
    NotAStruct { ty: String },
    #[error("{member} is not a member of struct {name}")]
    NotAMember { member: String, name: String },
    #[error("struct member {member} assigned multiple times")]
    MemberAssignedTwice { member: String },
    #[error("cannot assign {found} to {expected} of struct member {member}")]
    MemberTypeMismatch {
        member: String,
        expected: String,
        found: String,
    },
    #[error("struct member {member} is not assigned a value")]
    MemberNotAssigned { member: String },
    #[error("array index expression does not have a numeric type: {found}")]
    IndexNotNumeric { found: String },
    #[error("cannot index non-array type {ty}")]
    NotAnArray { ty: String },
    #[error("cannot assign {value} to {target}")]
    AssignMismatch { target: String, value: String },
    #[error("{construct} condition does not evaluate to a boolean type")]
    ConditionNotBool { construct: &'static str },
    #[error("if expression branches have mismatched types: {then_ty} and {else_ty}")]
    IfBranchMismatch { then_ty: String, else_ty: String },
    #[error("return statement outside of function")]
    ReturnOutsideFunction,
    #[error("cannot return a value from a unit function")]
    ReturnValueFromUnitFunction,
    #[error("expected function to return {expected}")]
    MissingReturnValue { expected: String },
    #[error("return type mismatch: expected {expected}, found {found}")]
    ReturnTypeMismatch { expected: String, found: String },

    // Flow analysis
    #[error("function '{name}' with return type {ret} does not return a value in all code paths")]
    MissingReturnPath { name: String, ret: String },
    #[error("unreachable code after statement {index}")]
    UnreachableCode { index: usize },
}
