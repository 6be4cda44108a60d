//! Pass 1: symbol resolution. Builds the scope tree, binds identifiers, and
//! reports unbound names and same-scope redeclarations. Scopes live in an
//! arena and refer to their parent by index.

use std::collections::HashMap;

use crate::parser::ast::{Expression, FuncDecl, Module, Statement, TypeExpr, TypedName};

use super::error::SemaError;
use super::types::{self, FuncType, StructMember, StructType, Type};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeId(usize);

#[derive(Debug, Default)]
pub struct Scope {
    parent: Option<ScopeId>,
    /// `None` marks a `:=` binding whose type the checker supplies later.
    vars: HashMap<String, Option<Type>>,
    structs: HashMap<String, StructType>,
    funcs: HashMap<String, FuncType>,
}

#[derive(Debug, Default)]
pub struct ScopeTree {
    scopes: Vec<Scope>,
}

impl ScopeTree {
    fn alloc(&mut self, parent: Option<ScopeId>) -> ScopeId {
        self.scopes.push(Scope {
            parent,
            ..Scope::default()
        });
        ScopeId(self.scopes.len() - 1)
    }

    fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0]
    }

    fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.0]
    }

    /// Walks the scope chain from `from` outward.
    fn chain(&self, from: ScopeId) -> impl Iterator<Item = &Scope> {
        let mut current = Some(from);
        std::iter::from_fn(move || {
            let scope = self.scope(current?);
            current = scope.parent;
            Some(scope)
        })
    }

    pub fn lookup_var(&self, from: ScopeId, name: &str) -> Option<&Option<Type>> {
        self.chain(from).find_map(|scope| scope.vars.get(name))
    }

    pub fn lookup_struct(&self, from: ScopeId, name: &str) -> Option<&StructType> {
        self.chain(from).find_map(|scope| scope.structs.get(name))
    }

    pub fn lookup_func(&self, from: ScopeId, name: &str) -> Option<&FuncType> {
        self.chain(from).find_map(|scope| scope.funcs.get(name))
    }
}

/// Result of symbol resolution, kept read-only afterwards.
pub struct Resolved {
    pub tree: ScopeTree,
    pub root: ScopeId,
    /// Parameter scope of each function declaration, in pre-order of
    /// declaration. Downstream consumers use this to re-enter a function's
    /// environment without re-walking the tree.
    pub func_scopes: Vec<ScopeId>,
    pub errors: Vec<SemaError>,
}

pub fn resolve(module: &Module) -> Resolved {
    let mut tree = ScopeTree::default();
    let root = tree.alloc(None);
    let mut resolver = Resolver {
        tree,
        current: root,
        func_scopes: Vec::new(),
        errors: Vec::new(),
    };
    for stmt in &module.statements {
        resolver.resolve_stmt(stmt);
    }
    Resolved {
        tree: resolver.tree,
        root,
        func_scopes: resolver.func_scopes,
        errors: resolver.errors,
    }
}

struct Resolver {
    tree: ScopeTree,
    current: ScopeId,
    func_scopes: Vec<ScopeId>,
    errors: Vec<SemaError>,
}

impl Resolver {
    fn err(&mut self, error: SemaError) {
        self.errors.push(error);
    }

    /// Converts a source type annotation to a concrete type, or reports the
    /// first undefined name and returns `None`.
    fn resolve_type(&mut self, type_expr: &TypeExpr) -> Option<Type> {
        match type_expr {
            TypeExpr::Named(name) => {
                if let Some(primitive) = types::primitive(name) {
                    return Some(primitive);
                }
                if let Some(strukt) = self.tree.lookup_struct(self.current, name) {
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

    fn resolve_stmt(&mut self, stmt: &Statement) {
        match stmt {
            Statement::VarDecl { name, ty, init } => self.resolve_var_decl(name, ty, init),
            Statement::StructDecl { name, members } => self.resolve_struct_decl(name, members),
            Statement::FuncDecl(decl) => self.resolve_func_decl(decl),
            Statement::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(cond);
                self.resolve_stmt(then_branch);
                if let Some(else_branch) = else_branch {
                    self.resolve_stmt(else_branch);
                }
            }
            Statement::For {
                init,
                cond,
                iter,
                body,
            } => {
                self.resolve_stmt(init);
                self.resolve_expr(cond);
                self.resolve_expr(iter);
                self.resolve_block(&body.statements);
            }
            Statement::Return(expr) => {
                if let Some(expr) = expr {
                    self.resolve_expr(expr);
                }
            }
            Statement::Expr { expr, .. } => self.resolve_expr(expr),
            // Module loading is an external collaborator; the bindings are
            // accepted and otherwise ignored here.
            Statement::Use { .. } => {}
            Statement::Block(block) => self.resolve_block(&block.statements),
        }
    }

    fn resolve_block(&mut self, statements: &[Statement]) {
        let outer = self.current;
        self.current = self.tree.alloc(Some(outer));
        for stmt in statements {
            self.resolve_stmt(stmt);
        }
        self.current = outer;
    }

    fn resolve_var_decl(&mut self, name: &str, ty: &TypeExpr, init: &Option<Expression>) {
        let Some(declared) = self.resolve_type(ty) else {
            return;
        };
        if let Some(init) = init {
            self.resolve_expr(init);
        }
        self.tree
            .scope_mut(self.current)
            .vars
            .insert(name.to_string(), Some(declared));
    }

    fn resolve_struct_decl(&mut self, name: &str, members: &[TypedName]) {
        if self.tree.scope(self.current).structs.contains_key(name) {
            self.err(SemaError::RedeclaredStruct {
                name: name.to_string(),
            });
            return;
        }
        let mut resolved_members: Vec<StructMember> = Vec::with_capacity(members.len());
        for member in members {
            if resolved_members.iter().any(|m| m.name == member.name) {
                self.err(SemaError::DuplicateMember {
                    member: member.name.clone(),
                    name: name.to_string(),
                });
                continue;
            }
            if let Some(ty) = self.resolve_type(&member.ty) {
                resolved_members.push(StructMember {
                    name: member.name.clone(),
                    ty,
                });
            }
        }
        self.tree.scope_mut(self.current).structs.insert(
            name.to_string(),
            StructType {
                name: name.to_string(),
                members: resolved_members,
            },
        );
    }

    fn resolve_func_decl(&mut self, decl: &FuncDecl) {
        if self.tree.scope(self.current).funcs.contains_key(&decl.name) {
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

        let param_scope = self.tree.alloc(Some(self.current));
        let mut param_types = Vec::with_capacity(decl.params.len());
        for param in &decl.params {
            let Some(param_type) = self.resolve_type(&param.ty) else {
                return;
            };
            param_types.push(param_type.clone());
            self.tree
                .scope_mut(param_scope)
                .vars
                .insert(param.name.clone(), Some(param_type));
        }

        // The function is visible inside its own body.
        self.tree.scope_mut(self.current).funcs.insert(
            decl.name.clone(),
            FuncType {
                params: param_types,
                ret: Box::new(ret),
            },
        );
        self.func_scopes.push(param_scope);

        let outer = self.current;
        self.current = param_scope;
        self.resolve_block(&decl.body.statements);
        self.current = outer;
    }

    fn resolve_expr(&mut self, expr: &Expression) {
        match expr {
            Expression::Number(_) | Expression::Str(_) | Expression::Bool(_) | Expression::Unit => {
            }
            Expression::Identifier(name) => {
                let bound = self.tree.lookup_var(self.current, name).is_some()
                    || self.tree.lookup_struct(self.current, name).is_some()
                    || self.tree.lookup_func(self.current, name).is_some();
                if !bound {
                    self.err(SemaError::UndefinedIdentifier { name: name.clone() });
                }
            }
            Expression::Unary { rhs, .. } => self.resolve_expr(rhs),
            Expression::Binary { lhs, rhs, .. } => {
                self.resolve_expr(lhs);
                self.resolve_expr(rhs);
            }
            Expression::Group(inner) => self.resolve_expr(inner),
            Expression::Call { callee, args } => {
                self.resolve_expr(callee);
                for arg in args {
                    self.resolve_expr(arg);
                }
            }
            Expression::StructLiteral { ty, members } => {
                self.resolve_expr(ty);
                for member in members {
                    self.resolve_expr(&member.value);
                }
            }
            Expression::Member { object, .. } => self.resolve_expr(object),
            Expression::Index { array, index } => {
                self.resolve_expr(array);
                self.resolve_expr(index);
            }
            Expression::Assign { target, value, .. } => {
                self.resolve_expr(target);
                self.resolve_expr(value);
            }
            Expression::DeclAssign { name, value } => {
                self.resolve_expr(value);
                // The type is only known to the checker; bind the name now so
                // later references resolve.
                self.tree
                    .scope_mut(self.current)
                    .vars
                    .insert(name.clone(), None);
            }
            Expression::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(cond);
                self.resolve_expr(then_branch);
                self.resolve_expr(else_branch);
            }
            Expression::Block(block) => {
                let outer = self.current;
                self.current = self.tree.alloc(Some(outer));
                for stmt in &block.statements {
                    self.resolve_stmt(stmt);
                }
                self.resolve_expr(&block.result);
                self.current = outer;
            }
        }
    }
}
