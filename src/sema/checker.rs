//! Pass 2: type checking. A combined walk that owns a writable stack of
//! scope frames, so `name := value` can define the name with its inferred
//! type at the point of use.

use std::collections::HashMap;

use crate::parser::ast::{
    AssignOp, BinaryOp, Expression, FuncDecl, MemberInit, Module, Statement, TypeExpr, TypedName,
    UnaryOp,
};

use super::error::SemaError;
use super::types::{self, FuncType, StructMember, StructType, Type};

#[derive(Default)]
struct Frame {
    vars: HashMap<String, Type>,
    structs: HashMap<String, StructType>,
    funcs: HashMap<String, FuncType>,
    /// Return type of the enclosing function, inherited by nested frames.
    /// `None` outside any function.
    ret: Option<Type>,
}

pub fn check_types(module: &Module) -> Vec<SemaError> {
    let mut checker = Checker {
        frames: vec![Frame::default()],
        errors: Vec::new(),
    };
    for stmt in &module.statements {
        checker.check_stmt(stmt);
    }
    checker.errors
}

struct Checker {
    frames: Vec<Frame>,
    errors: Vec<SemaError>,
}

impl Checker {
    fn err(&mut self, error: SemaError) {
        self.errors.push(error);
    }

    fn push_frame(&mut self) {
        let ret = self.current_ret();
        self.frames.push(Frame {
            ret,
            ..Frame::default()
        });
    }

    fn pop_frame(&mut self) {
        self.frames.pop();
    }

    fn current_frame(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("at least the root frame")
    }

    fn current_ret(&self) -> Option<Type> {
        self.frames.last().and_then(|frame| frame.ret.clone())
    }

    fn define_var(&mut self, name: &str, ty: Type) {
        self.current_frame().vars.insert(name.to_string(), ty);
    }

    fn lookup_var(&self, name: &str) -> Option<&Type> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.vars.get(name))
    }

    fn lookup_struct(&self, name: &str) -> Option<&StructType> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.structs.get(name))
    }

    fn lookup_func(&self, name: &str) -> Option<&FuncType> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.funcs.get(name))
    }

    fn resolve_type(&mut self, type_expr: &TypeExpr) -> Option<Type> {
        match type_expr {
            TypeExpr::Named(name) => {
                if let Some(primitive) = types::primitive(name) {
                    return Some(primitive);
                }
                if let Some(strukt) = self.lookup_struct(name) {
                    return Some(Type::Struct(strukt.clone()));
                }
                self.err(SemaError::UndefinedType { name: name.clone() });
                None
            }
            TypeExpr::Array(elem) => {
                let elem = self.resolve_type(elem)?;
                Some(Type::Array(Box::new(elem)))
            }
            TypeExpr::Func { params, ret } => {
                let mut param_types = Vec::with_capacity(params.len());
                for param in params {
                    if let Some(param) = self.resolve_type(param) {
                        param_types.push(param);
                    }
                }
                let ret = match ret {
                    Some(ret) => self.resolve_type(ret)?,
                    None => Type::Unit,
                };
                Some(Type::Func(FuncType {
                    params: param_types,
                    ret: Box::new(ret),
                }))
            }
        }
    }

    fn check_stmt(&mut self, stmt: &Statement) {
        match stmt {
            Statement::VarDecl { name, ty, init } => self.check_var_decl(name, ty, init),
            Statement::StructDecl { name, members } => self.check_struct_decl(name, members),
            Statement::FuncDecl(decl) => self.check_func_decl(decl),
            Statement::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.check_condition(cond, "if statement");
                self.check_stmt(then_branch);
                if let Some(else_branch) = else_branch {
                    self.check_stmt(else_branch);
                }
            }
            Statement::For {
                init,
                cond,
                iter,
                body,
            } => {
                self.check_stmt(init);
                self.check_condition(cond, "for statement");
                self.check_expr(iter);
                self.check_block(&body.statements);
            }
            Statement::Return(expr) => self.check_return(expr),
            Statement::Expr { expr, .. } => {
                self.check_expr(expr);
            }
            Statement::Use { .. } => {}
            Statement::Block(block) => self.check_block(&block.statements),
        }
    }

    fn check_block(&mut self, statements: &[Statement]) {
        self.push_frame();
        for stmt in statements {
            self.check_stmt(stmt);
        }
        self.pop_frame();
    }

    fn check_condition(&mut self, cond: &Expression, construct: &'static str) {
        if let Some(ty) = self.check_expr(cond)
            && ty != Type::Bool
        {
            self.err(SemaError::ConditionNotBool { construct });
        }
    }

    fn check_var_decl(&mut self, name: &str, ty: &TypeExpr, init: &Option<Expression>) {
        let Some(declared) = self.resolve_type(ty) else {
            return;
        };
        if let Some(init) = init
            && let Some(found) = self.check_expr(init)
            && found != declared
        {
            self.err(SemaError::VarInitMismatch {
                name: name.to_string(),
                declared: declared.to_string(),
                found: found.to_string(),
            });
        }
        self.define_var(name, declared);
    }

    fn check_struct_decl(&mut self, name: &str, members: &[TypedName]) {
        if self.current_frame().structs.contains_key(name) {
            self.err(SemaError::RedeclaredStruct {
                name: name.to_string(),
            });
            return;
        }
        let mut resolved: Vec<StructMember> = Vec::with_capacity(members.len());
        for member in members {
            if resolved.iter().any(|m| m.name == member.name) {
                self.err(SemaError::DuplicateMember {
                    member: member.name.clone(),
                    name: name.to_string(),
                });
                continue;
            }
            if let Some(ty) = self.resolve_type(&member.ty) {
                resolved.push(StructMember {
                    name: member.name.clone(),
                    ty,
                });
            }
        }
        self.current_frame().structs.insert(
            name.to_string(),
            StructType {
                name: name.to_string(),
                members: resolved,
            },
        );
    }

    fn check_func_decl(&mut self, decl: &FuncDecl) {
        if self.current_frame().funcs.contains_key(&decl.name) {
            self.err(SemaError::RedeclaredFunction {
                name: decl.name.clone(),
            });
            return;
        }
        let ret = match &decl.ret {
            Some(ret) => match self.resolve_type(ret) {
                Some(ret) => ret,
                None => return,
            },
            None => Type::Unit,
        };
        let mut param_types = Vec::with_capacity(decl.params.len());
        for param in &decl.params {
            let Some(param_type) = self.resolve_type(&param.ty) else {
                return;
            };
            param_types.push(param_type);
        }
        self.current_frame().funcs.insert(
            decl.name.clone(),
            FuncType {
                params: param_types.clone(),
                ret: Box::new(ret.clone()),
            },
        );

        self.frames.push(Frame {
            ret: Some(ret),
            ..Frame::default()
        });
        for (param, param_type) in decl.params.iter().zip(param_types) {
            self.define_var(&param.name, param_type);
        }
        self.check_block(&decl.body.statements);
        self.pop_frame();
    }

    fn check_return(&mut self, expr: &Option<Expression>) {
        let Some(expected) = self.current_ret() else {
            self.err(SemaError::ReturnOutsideFunction);
            return;
        };
        let Some(expr) = expr else {
            if !expected.is_unit() {
                self.err(SemaError::MissingReturnValue {
                    expected: expected.to_string(),
                });
            }
            return;
        };
        let Some(found) = self.check_expr(expr) else {
            return;
        };
        if expected.is_unit() {
            self.err(SemaError::ReturnValueFromUnitFunction);
        } else if found != expected {
            self.err(SemaError::ReturnTypeMismatch {
                expected: expected.to_string(),
                found: found.to_string(),
            });
        }
    }

    fn check_expr(&mut self, expr: &Expression) -> Option<Type> {
        match expr {
            // TODO: derive the numeric type from the literal's lexeme instead
            // of defaulting to i32.
            Expression::Number(_) => Some(Type::I32),
            Expression::Str(_) => Some(Type::String),
            Expression::Bool(_) => Some(Type::Bool),
            Expression::Unit => Some(Type::Unit),
            Expression::Identifier(name) => self.check_identifier(name),
            Expression::Unary { op, rhs } => self.check_unary(*op, rhs),
            Expression::Binary { lhs, op, rhs } => self.check_binary(lhs, *op, rhs),
            Expression::Group(inner) => self.check_expr(inner),
            Expression::Call { callee, args } => self.check_call(callee, args),
            Expression::StructLiteral { ty, members } => self.check_struct_literal(ty, members),
            Expression::Member { object, name } => self.check_member(object, name),
            Expression::Index { array, index } => self.check_index(array, index),
            Expression::Assign { target, op, value } => self.check_assign(target, *op, value),
            Expression::DeclAssign { name, value } => {
                let ty = self.check_expr(value)?;
                self.define_var(name, ty.clone());
                Some(ty)
            }
            Expression::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.check_condition(cond, "if expression");
                let then_ty = self.check_expr(then_branch);
                let else_ty = self.check_expr(else_branch);
                match (then_ty, else_ty) {
                    (Some(then_ty), Some(else_ty)) if then_ty != else_ty => {
                        self.err(SemaError::IfBranchMismatch {
                            then_ty: then_ty.to_string(),
                            else_ty: else_ty.to_string(),
                        });
                        None
                    }
                    (then_ty, _) => then_ty,
                }
            }
            Expression::Block(block) => {
                self.push_frame();
                for stmt in &block.statements {
                    self.check_stmt(stmt);
                }
                let result = self.check_expr(&block.result);
                self.pop_frame();
                result
            }
        }
    }

    fn check_identifier(&mut self, name: &str) -> Option<Type> {
        if let Some(ty) = self.lookup_var(name) {
            return Some(ty.clone());
        }
        if let Some(strukt) = self.lookup_struct(name) {
            return Some(Type::Struct(strukt.clone()));
        }
        if let Some(func) = self.lookup_func(name) {
            return Some(Type::Func(func.clone()));
        }
        self.err(SemaError::UndefinedVariable {
            name: name.to_string(),
        });
        None
    }

    fn check_unary(&mut self, op: UnaryOp, rhs: &Expression) -> Option<Type> {
        let operand = self.check_expr(rhs)?;
        match op {
            UnaryOp::Plus | UnaryOp::Minus if operand.is_numeric() => Some(operand),
            UnaryOp::Not if operand == Type::Bool => Some(Type::Bool),
            _ => {
                self.err(SemaError::InvalidUnaryOperand {
                    op: op.to_string(),
                    operand: operand.to_string(),
                });
                None
            }
        }
    }

    fn check_binary(&mut self, lhs: &Expression, op: BinaryOp, rhs: &Expression) -> Option<Type> {
        let lhs_ty = self.check_expr(lhs);
        let rhs_ty = self.check_expr(rhs);
        let (lhs_ty, rhs_ty) = (lhs_ty?, rhs_ty?);
        match op {
            BinaryOp::Add
            | BinaryOp::Sub
            | BinaryOp::Mul
            | BinaryOp::Div
            | BinaryOp::Rem => {
                if lhs_ty.is_numeric() && rhs_ty.is_numeric() {
                    // No promotion between numeric types yet; the left
                    // operand's type stands for the whole expression.
                    return Some(lhs_ty);
                }
                if op == BinaryOp::Add && lhs_ty == Type::String && rhs_ty == Type::String {
                    return Some(Type::String);
                }
                self.invalid_operands(op, &lhs_ty, &rhs_ty)
            }
            BinaryOp::Eq | BinaryOp::Ne => {
                if lhs_ty != rhs_ty {
                    self.err(SemaError::CannotCompare {
                        lhs: lhs_ty.to_string(),
                        rhs: rhs_ty.to_string(),
                    });
                    return None;
                }
                Some(Type::Bool)
            }
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                if lhs_ty.is_numeric() && rhs_ty.is_numeric() {
                    return Some(Type::Bool);
                }
                self.invalid_operands(op, &lhs_ty, &rhs_ty)
            }
            BinaryOp::Or | BinaryOp::And => {
                if lhs_ty == Type::Bool && rhs_ty == Type::Bool {
                    return Some(Type::Bool);
                }
                self.invalid_operands(op, &lhs_ty, &rhs_ty)
            }
        }
    }

    fn invalid_operands(&mut self, op: BinaryOp, lhs: &Type, rhs: &Type) -> Option<Type> {
        self.err(SemaError::InvalidBinaryOperands {
            op: op.to_string(),
            lhs: lhs.to_string(),
            rhs: rhs.to_string(),
        });
        None
    }

    fn check_call(&mut self, callee: &Expression, args: &[Expression]) -> Option<Type> {
        let func = match self.check_expr(callee)? {
            Type::Func(func) => func,
            other => {
                self.err(SemaError::NotAFunction {
                    ty: other.to_string(),
                });
                return None;
            }
        };
        if args.len() != func.params.len() {
            self.err(SemaError::WrongArgCount {
                expected: func.params.len(),
                found: args.len(),
            });
            return None;
        }
        for (i, (arg, param)) in args.iter().zip(&func.params).enumerate() {
            let arg_ty = self.check_expr(arg)?;
            if arg_ty != *param {
                self.err(SemaError::ArgTypeMismatch {
                    index: i + 1,
                    expected: param.to_string(),
                    found: arg_ty.to_string(),
                });
                return None;
            }
        }
        Some(*func.ret)
    }

    fn check_struct_literal(&mut self, ty: &Expression, members: &[MemberInit]) -> Option<Type> {
        let strukt = match self.check_expr(ty)? {
            Type::Struct(strukt) => strukt,
            other => {
                self.err(SemaError::NotAStruct {
                    ty: other.to_string(),
                });
                return None;
            }
        };
        let mut assigned = vec![false; strukt.members.len()];
        for member in members {
            let Some(index) = strukt
                .members
                .iter()
                .position(|m| m.name == member.name)
            else {
                self.err(SemaError::NotAMember {
                    member: member.name.clone(),
                    name: strukt.name.clone(),
                });
                continue;
            };
            if assigned[index] {
                self.err(SemaError::MemberAssignedTwice {
                    member: member.name.clone(),
                });
                continue;
            }
            let Some(value_ty) = self.check_expr(&member.value) else {
                continue;
            };
            if value_ty != strukt.members[index].ty {
                self.err(SemaError::MemberTypeMismatch {
                    member: member.name.clone(),
                    expected: strukt.members[index].ty.to_string(),
                    found: value_ty.to_string(),
                });
                continue;
            }
            assigned[index] = true;
        }
        for (member, assigned) in strukt.members.iter().zip(&assigned) {
            if !assigned {
                self.err(SemaError::MemberNotAssigned {
                    member: member.name.clone(),
                });
            }
        }
        Some(Type::Struct(strukt))
    }

    fn check_member(&mut self, object: &Expression, name: &str) -> Option<Type> {
        let strukt = match self.check_expr(object)? {
            Type::Struct(strukt) => strukt,
            other => {
                self.err(SemaError::NotAStruct {
                    ty: other.to_string(),
                });
                return None;
            }
        };
        let Some(member) = strukt.member(name) else {
            self.err(SemaError::NotAMember {
                member: name.to_string(),
                name: strukt.name.clone(),
            });
            return None;
        };
        Some(member.ty.clone())
    }

    fn check_index(&mut self, array: &Expression, index: &Expression) -> Option<Type> {
        if let Some(index_ty) = self.check_expr(index)
            && !index_ty.is_numeric()
        {
            self.err(SemaError::IndexNotNumeric {
                found: index_ty.to_string(),
            });
            return None;
        }
        let elem = match self.check_expr(array)? {
            Type::Array(elem) => elem,
            other => {
                self.err(SemaError::NotAnArray {
                    ty: other.to_string(),
                });
                return None;
            }
        };
        Some(*elem)
    }

    fn check_assign(
        &mut self,
        target: &Expression,
        op: AssignOp,
        value: &Expression,
    ) -> Option<Type> {
        let target_ty = self.check_expr(target);
        let value_ty = self.check_expr(value);
        let (target_ty, value_ty) = (target_ty?, value_ty?);
        match op {
            AssignOp::Assign => {
                if target_ty != value_ty {
                    self.err(SemaError::AssignMismatch {
                        target: target_ty.to_string(),
                        value: value_ty.to_string(),
                    });
                }
            }
            AssignOp::AddAssign => {
                let numeric = target_ty.is_numeric() && value_ty.is_numeric();
                let strings = target_ty == Type::String && value_ty == Type::String;
                if !numeric && !strings {
                    self.err(SemaError::InvalidBinaryOperands {
                        op: op.to_string(),
                        lhs: target_ty.to_string(),
                        rhs: value_ty.to_string(),
                    });
                }
            }
            AssignOp::SubAssign => {
                if !(target_ty.is_numeric() && value_ty.is_numeric()) {
                    self.err(SemaError::InvalidBinaryOperands {
                        op: op.to_string(),
                        lhs: target_ty.to_string(),
                        rhs: value_ty.to_string(),
                    });
                }
            }
        }
        Some(target_ty)
    }
}
