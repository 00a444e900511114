//! Lexical scopes for variables and functions.
//!
//! Structural scopes ([`Environment`]) live as long as the schema element that
//! owns them and point at their enclosing scope through an `Arc`. Call scopes
//! ([`Frame`]) exist only for the duration of one function call or quantified
//! binding and borrow the scope they were created in.

use crate::datasource::DataSourceNode;
use crate::engine::{CompiledExpression, EvaluationContext};
use crate::error::XPathError;
use crate::functions::Builtin;
use crate::item::Sequence;
use log::trace;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

/// A scope of variables and functions with an optional enclosing scope.
///
/// Bindings are shared by reference: defining a name in a parent after a child
/// was created is visible through the child.
#[derive(Default)]
pub struct Environment {
    variables: RwLock<HashMap<String, Arc<CompiledExpression>>>,
    functions: RwLock<HashMap<String, Arc<UserFunction>>>,
    enclosing: Option<Arc<Environment>>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh scope whose misses fall back to `parent`.
    pub fn enclosed(parent: &Arc<Environment>) -> Self {
        Self {
            enclosing: Some(Arc::clone(parent)),
            ..Self::default()
        }
    }

    pub fn enclosing(&self) -> Option<&Arc<Environment>> {
        self.enclosing.as_ref()
    }

    /// Binds `name` in this scope, replacing only a binding of this scope.
    pub fn define(&self, name: impl Into<String>, expr: CompiledExpression) {
        self.variables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), Arc::new(expr));
    }

    pub fn define_function(&self, function: UserFunction) {
        self.functions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(function.name.clone(), Arc::new(function));
    }

    fn read_variables(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<CompiledExpression>>> {
        self.variables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_functions(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<UserFunction>>> {
        self.functions.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_defined_locally(&self, name: &str) -> bool {
        self.read_variables().contains_key(name)
    }

    /// Finds `name` here or in an enclosing scope. Returns the expression and
    /// the scope that defined it, which is where it must be evaluated.
    pub fn resolve(&self, name: &str) -> Option<(Arc<CompiledExpression>, &Environment)> {
        let mut scope = Some(self);
        while let Some(env) = scope {
            if let Some(expr) = env.read_variables().get(name) {
                return Some((Arc::clone(expr), env));
            }
            scope = env.enclosing.as_deref();
        }
        None
    }

    pub fn resolve_function(&self, name: &str) -> Option<Arc<UserFunction>> {
        let mut scope = Some(self);
        while let Some(env) = scope {
            if let Some(function) = env.read_functions().get(name) {
                return Some(Arc::clone(function));
            }
            scope = env.enclosing.as_deref();
        }
        None
    }

    /// Names defined in this scope only, sorted.
    pub fn local_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.read_variables().keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut functions: Vec<_> = self.read_functions().keys().cloned().collect();
        functions.sort();
        f.debug_struct("Environment")
            .field("variables", &self.local_names())
            .field("functions", &functions)
            .field("enclosing", &self.enclosing)
            .finish()
    }
}

/// The innermost scope visible to an expression under evaluation.
pub enum Scope<'s, N> {
    Environment(&'s Environment),
    Call(&'s Frame<'s, N>),
}

impl<N> Clone for Scope<'_, N> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<N> Copy for Scope<'_, N> {}

impl<'s, N> Scope<'s, N> {
    /// Looks a variable up through call frames and then structural scopes.
    pub fn lookup(&self, name: &str) -> Option<Binding<'s, N>> {
        match *self {
            Scope::Environment(env) => env
                .resolve(name)
                .map(|(expr, scope)| Binding::Expression { expr, scope }),
            Scope::Call(frame) => match frame.bindings.get(name) {
                Some(value) => Some(Binding::Value(value)),
                None => frame.enclosing.lookup(name),
            },
        }
    }

    /// The nearest structural scope.
    pub fn environment(&self) -> &'s Environment {
        match *self {
            Scope::Environment(env) => env,
            Scope::Call(frame) => frame.enclosing.environment(),
        }
    }

    pub fn lookup_function(&self, name: &str) -> Option<Arc<UserFunction>> {
        self.environment().resolve_function(name)
    }
}

/// An ephemeral scope of already evaluated values: function parameters and
/// body-local variables, or the variables of a quantified expression.
pub struct Frame<'s, N> {
    owner: String,
    bindings: HashMap<String, Sequence<N>>,
    enclosing: Scope<'s, N>,
}

impl<'s, N> Frame<'s, N> {
    pub fn new(owner: impl Into<String>, enclosing: Scope<'s, N>) -> Self {
        Self {
            owner: owner.into(),
            bindings: HashMap::new(),
            enclosing,
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn bind(&mut self, name: impl Into<String>, value: Sequence<N>) {
        self.bindings.insert(name.into(), value);
    }
}

/// What a variable name resolved to.
pub enum Binding<'s, N> {
    /// A value bound in a call frame.
    Value(&'s Sequence<N>),
    /// A declared expression, evaluated on reference in its defining scope.
    Expression {
        expr: Arc<CompiledExpression>,
        scope: &'s Environment,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    /// Accepted for documentation; values are not checked against it.
    pub type_annotation: Option<String>,
}

#[derive(Debug, Clone)]
pub enum FunctionStatement {
    /// Binds a body-local variable, visible to later statements.
    Let {
        name: String,
        value: CompiledExpression,
    },
    /// Contributes its value to the function result.
    Expr(CompiledExpression),
}

/// A function declared in a schema, pattern or rule.
#[derive(Debug, Clone)]
pub struct UserFunction {
    pub name: String,
    pub params: Vec<Param>,
    /// Accepted for documentation; results are not coerced to it.
    pub return_type: Option<String>,
    pub body: Vec<FunctionStatement>,
}

impl UserFunction {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            return_type: None,
            body: Vec::new(),
        }
    }

    pub fn param(mut self, name: impl Into<String>) -> Self {
        self.params.push(Param {
            name: name.into(),
            type_annotation: None,
        });
        self
    }

    pub fn typed_param(mut self, name: impl Into<String>, type_annotation: impl Into<String>) -> Self {
        self.params.push(Param {
            name: name.into(),
            type_annotation: Some(type_annotation.into()),
        });
        self
    }

    pub fn returns(mut self, return_type: impl Into<String>) -> Self {
        self.return_type = Some(return_type.into());
        self
    }

    pub fn let_statement(mut self, name: impl Into<String>, value: CompiledExpression) -> Self {
        self.body.push(FunctionStatement::Let {
            name: name.into(),
            value,
        });
        self
    }

    pub fn statement(mut self, expr: CompiledExpression) -> Self {
        self.body.push(FunctionStatement::Expr(expr));
        self
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Runs the body in a fresh frame enclosing the caller's scope. The result
    /// is the concatenation of every expression statement's value.
    fn call<'a, N>(
        &self,
        args: Vec<Sequence<N>>,
        ctx: &EvaluationContext<'a, '_, N>,
    ) -> Result<Sequence<N>, XPathError>
    where
        N: DataSourceNode<'a> + 'a,
    {
        if args.len() != self.arity() {
            return Err(XPathError::arity(
                &self.name,
                self.arity().to_string(),
                args.len(),
            ));
        }
        trace!("Calling user function '{}' with {} argument(s)", self.name, args.len());

        let ctx = ctx.descend()?;
        let mut frame = Frame::new(&self.name, ctx.scope);
        for (param, value) in self.params.iter().zip(args) {
            frame.bind(param.name.clone(), value);
        }

        let mut result = Sequence::empty();
        for statement in &self.body {
            match statement {
                FunctionStatement::Let { name, value } => {
                    let bound = value.evaluate(&ctx.with_scope(Scope::Call(&frame)))?;
                    frame.bind(name.clone(), bound);
                }
                FunctionStatement::Expr(expr) => {
                    result.extend(expr.evaluate(&ctx.with_scope(Scope::Call(&frame)))?);
                }
            }
        }
        Ok(result)
    }
}

/// Anything callable from an expression.
#[derive(Debug, Clone)]
pub enum Callable {
    Builtin(Builtin),
    User(Arc<UserFunction>),
}

impl Callable {
    /// Resolves `name` against the scope chain first, then the built-in library.
    pub fn resolve<N>(name: &str, scope: &Scope<'_, N>) -> Option<Self> {
        scope
            .lookup_function(name)
            .map(Callable::User)
            .or_else(|| Builtin::from_name(name).map(Callable::Builtin))
    }

    pub fn name(&self) -> &str {
        match self {
            Callable::Builtin(builtin) => builtin.name(),
            Callable::User(function) => &function.name,
        }
    }

    pub fn invoke<'a, N>(
        &self,
        args: Vec<Sequence<N>>,
        ctx: &EvaluationContext<'a, '_, N>,
    ) -> Result<Sequence<N>, XPathError>
    where
        N: DataSourceNode<'a> + 'a,
    {
        match self {
            Callable::Builtin(builtin) => builtin.invoke(args, ctx),
            Callable::User(function) => function.call(args, ctx),
        }
    }
}
