use std::{cell::RefCell, fmt::Display, rc::Rc};

use crate::ast::FunctionDecl;
use crate::diagnostics::Diagnostic;

use super::entity::Entity;
use super::environment::Environment;
use super::{Interpreter, Value};

pub type NativeFn = fn(&mut Interpreter, &[Value]) -> Value;

pub enum Callable {
    Function(Function),
    Native(Native),
}

/// A user function: the shared declaration, the environment it closed over,
/// and its own entity half (every function is also an entity).
pub struct Function {
    pub decl: Rc<FunctionDecl>,
    pub closure: Rc<RefCell<Environment>>,
    pub fields: Rc<RefCell<Entity>>,
}

pub struct Native {
    pub name: &'static str,
    pub arity: i32,
    pub f: NativeFn,
}

impl Callable {
    /// Negative means variadic.
    pub fn arity(&self) -> i32 {
        match self {
            Callable::Function(function) => function.decl.params.len() as i32,
            Callable::Native(native) => native.arity,
        }
    }

    /// An arity mismatch is reported and yields `None` without executing.
    pub fn call(&self, interpreter: &mut Interpreter, args: Vec<Value>) -> Value {
        let arity = self.arity();
        if arity >= 0 && args.len() != arity as usize {
            interpreter.report(Diagnostic::ArityMismatch {
                expected: arity as usize,
                got: args.len(),
            });
            return Value::None;
        }
        match self {
            Callable::Function(function) => function.call(interpreter, args),
            Callable::Native(native) => (native.f)(interpreter, &args),
        }
    }
}

impl Function {
    /// Bind arguments in a fresh frame under the closure, run the body, and
    /// intercept the return signal. A body that never returns yields `None`.
    fn call(&self, interpreter: &mut Interpreter, args: Vec<Value>) -> Value {
        let env = Environment::nested(self.closure.clone());
        for (param, arg) in self.decl.params.iter().zip(args) {
            env.borrow_mut().define(param.lexeme.clone(), arg);
        }
        let decl = self.decl.clone();
        interpreter.execute_in_env(env, move |interpreter| {
            for statement in &decl.body {
                if let Some(value) = interpreter.execute(statement) {
                    return value;
                }
            }
            Value::None
        })
    }
}

impl Display for Callable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Callable::Function(function) => match &function.decl.name {
                Some(name) => write!(f, "<fn {}>", name.lexeme),
                None => write!(f, "<fn>"),
            },
            Callable::Native(native) => write!(f, "<native {}>", native.name),
        }
    }
}
