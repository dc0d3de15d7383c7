mod callable;
mod entity;
mod environment;

use std::{
    cell::RefCell,
    fmt::{Debug, Display},
    io::Write,
    rc::Rc,
};

use bigdecimal::{BigDecimal, One, RoundingMode, Zero};

use crate::ast::{Expression, FunctionDecl, Literal, Statement};
use crate::diagnostics::Diagnostic;
use crate::lexer::{Token, TokenKind};

pub use self::callable::{Callable, Function, Native, NativeFn};
pub use self::entity::{Entity, Key};
pub use self::environment::Environment;

/// A NANO runtime value. `Entity` and `Callable` are reference-shared: every
/// alias observes mutations made through any other.
#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Number(BigDecimal),
    Str(String),
    Entity(Rc<RefCell<Entity>>),
    Callable(Rc<Callable>),
}

impl Value {
    /// Only `None` and `false` are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            _ => true,
        }
    }

    /// The entity handle behind this value, if it has one. User functions
    /// count: each carries its own entity half.
    pub fn as_entity(&self) -> Option<Rc<RefCell<Entity>>> {
        match self {
            Value::Entity(entity) => Some(entity.clone()),
            Value::Callable(callable) => match &**callable {
                Callable::Function(function) => Some(function.fields.clone()),
                Callable::Native(_) => None,
            },
            _ => None,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::None => "None",
            Value::Bool(_) => "Bool",
            Value::Number(_) => "Number",
            Value::Str(_) => "String",
            Value::Entity(_) => "Entity",
            Value::Callable(_) => "Function",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            // Numeric magnitude; scale is ignored, so 2 == 2.0000000000.
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Entity(a), Value::Entity(b)) => Rc::ptr_eq(a, b),
            (Value::Callable(a), Value::Callable(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", format_number(n)),
            Value::Str(s) => write!(f, "{}", s),
            Value::Entity(entity) => {
                let entity = entity.borrow();
                if entity.is_array_like() {
                    write!(f, "[")?;
                    for i in 0..entity.size() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", entity.get(&Key::index(i)).unwrap_or(Value::None))?;
                    }
                    write!(f, "]")
                } else {
                    write!(f, "<entity {{")?;
                    for (i, (key, value)) in entity.entries.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{} : {}", key.0, value)?;
                    }
                    write!(f, "}}>")
                }
            }
            Value::Callable(callable) => write!(f, "{}", callable),
        }
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

/// Plain-decimal text with a literal trailing `.0` stripped.
fn format_number(n: &BigDecimal) -> String {
    let s = n.to_string();
    match s.strip_suffix(".0") {
        Some(stripped) => stripped.to_string(),
        None => s,
    }
}

pub struct Interpreter {
    environment: Rc<RefCell<Environment>>,
    stdout: Rc<RefCell<dyn Write>>,
    stderr: Rc<RefCell<dyn Write>>,
}

impl Interpreter {
    pub fn new(stdout: Rc<RefCell<dyn Write>>, stderr: Rc<RefCell<dyn Write>>) -> Self {
        let globals = Environment::global();
        {
            let mut globals = globals.borrow_mut();
            globals.define("true".to_string(), Value::Bool(true));
            globals.define("false".to_string(), Value::Bool(false));
            for (name, arity, f) in [
                ("print", -1, native_print as NativeFn),
                ("inspect", 1, native_inspect as NativeFn),
                ("len", 1, native_len as NativeFn),
            ] {
                globals.define(
                    name.to_string(),
                    Value::Callable(Rc::new(Callable::Native(Native { name, arity, f }))),
                );
            }
        }
        Self {
            environment: globals,
            stdout,
            stderr,
        }
    }

    /// Run a whole program. A return signal escaping a top-level statement is
    /// itself a diagnostic; everything else has already been reported along
    /// the way. Flushes stdout when done.
    pub fn interpret(&mut self, statements: &[Statement]) {
        for statement in statements {
            if self.execute(statement).is_some() {
                self.report(Diagnostic::TopLevelReturn);
            }
        }
        let _ = self.stdout.borrow_mut().flush();
    }

    fn report(&mut self, diagnostic: Diagnostic) {
        let _ = writeln!(self.stderr.borrow_mut(), "{}", diagnostic);
    }

    /// `Some(value)` is the return signal unwinding toward the enclosing
    /// call; every other outcome is `None`.
    fn execute(&mut self, statement: &Statement) -> Option<Value> {
        match statement {
            Statement::Expression(expression) => {
                self.evaluate(expression);
                None
            }
            Statement::Block(statements) => {
                let env = Environment::nested(self.environment.clone());
                self.execute_in_env(env, |interpreter| {
                    for statement in statements {
                        let signal = interpreter.execute(statement);
                        if signal.is_some() {
                            return signal;
                        }
                    }
                    None
                })
            }
            Statement::If(condition, then_branch, else_branch) => {
                if self.evaluate(condition).is_truthy() {
                    self.execute(then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.execute(else_branch)
                } else {
                    None
                }
            }
            Statement::While(condition, body) => {
                while self.evaluate(condition).is_truthy() {
                    let signal = self.execute(body);
                    if signal.is_some() {
                        return signal;
                    }
                }
                None
            }
            Statement::For(var, iterable, body) => {
                let iterable = self.evaluate(iterable);
                let Some(entity) = iterable.as_entity() else {
                    self.report(Diagnostic::ForLoopIterable {
                        got: iterable.to_string(),
                    });
                    return None;
                };
                // Length is captured once; the body growing the array does
                // not extend the loop.
                let length = entity.borrow().size();
                for i in 0..length {
                    let element = entity.borrow().get(&Key::index(i)).unwrap_or(Value::None);
                    let env = Environment::nested(self.environment.clone());
                    env.borrow_mut().define(var.lexeme.clone(), element);
                    let signal = self.execute_in_env(env, |interpreter| interpreter.execute(body));
                    if signal.is_some() {
                        return signal;
                    }
                }
                None
            }
            Statement::Function(decl) => {
                let function = self.make_function(decl.clone());
                if let Some(name) = &decl.name {
                    self.environment
                        .borrow_mut()
                        .define(name.lexeme.clone(), function);
                }
                None
            }
            Statement::Return(_, value) => {
                let value = match value {
                    Some(expression) => self.evaluate(expression),
                    None => Value::None,
                };
                Some(value)
            }
            Statement::Class { name, parent, body } => {
                let class = Entity::shared();
                if let Some(parent_name) = parent {
                    if let Some(parent_value) = self.lookup(parent_name) {
                        match parent_value.as_entity() {
                            Some(parent_entity) => {
                                class.borrow_mut().set_metaentity(parent_entity)
                            }
                            None => self.report(Diagnostic::ParentNotEntity {
                                name: parent_name.lexeme.clone(),
                            }),
                        }
                    }
                }
                let class_env = Environment::class_body(class.clone(), self.environment.clone());
                let signal = self.execute_in_env(class_env, |interpreter| {
                    for statement in body {
                        let signal = interpreter.execute(statement);
                        if signal.is_some() {
                            return signal;
                        }
                    }
                    None
                });
                if signal.is_some() {
                    return signal;
                }
                self.environment
                    .borrow_mut()
                    .define(name.lexeme.clone(), Value::Entity(class));
                None
            }
        }
    }

    fn execute_in_env<T>(
        &mut self,
        env: Rc<RefCell<Environment>>,
        f: impl FnOnce(&mut Self) -> T,
    ) -> T {
        let prev = std::mem::replace(&mut self.environment, env);
        let result = f(self);
        self.environment = prev;
        result
    }

    /// Evaluation never fails: type and lookup errors are reported and a
    /// substitute value flows on.
    fn evaluate(&mut self, expression: &Expression) -> Value {
        match expression {
            Expression::Literal(literal) => match literal {
                Literal::Number(n) => Value::Number(n.clone()),
                Literal::Str(s) => Value::Str(s.clone()),
                Literal::Bool(b) => Value::Bool(*b),
                Literal::None => Value::None,
            },
            Expression::Grouping(inner) => self.evaluate(inner),
            Expression::Unary(op, right) => {
                let right = self.evaluate(right);
                match op.kind {
                    TokenKind::Minus => match right {
                        Value::Number(n) => Value::Number(-n),
                        _ => {
                            self.report(Diagnostic::runtime("Operand of '-' must be numeric."));
                            Value::None
                        }
                    },
                    TokenKind::Bang => Value::Bool(!right.is_truthy()),
                    _ => Value::None,
                }
            }
            Expression::Binary(left, op, right) => self.binary(left, op, right),
            Expression::Variable(name) => self.lookup(name).unwrap_or(Value::None),
            Expression::Assign(name, value) => {
                let value = self.evaluate(value);
                self.environment.borrow_mut().assign(&name.lexeme, value.clone());
                value
            }
            Expression::Call(callee, _, args) => {
                let callee = self.evaluate(callee);
                let mut arguments = Vec::with_capacity(args.len());
                for arg in args {
                    arguments.push(self.evaluate(arg));
                }
                let Value::Callable(callable) = callee else {
                    self.report(Diagnostic::runtime(format!(
                        "Can only call functions, got {}.",
                        callee
                    )));
                    return Value::None;
                };
                callable.call(self, arguments)
            }
            Expression::Function(decl) => {
                let function = self.make_function(decl.clone());
                if let Some(name) = &decl.name {
                    self.environment
                        .borrow_mut()
                        .define(name.lexeme.clone(), function.clone());
                }
                function
            }
            Expression::Array(elements) => {
                let array = Entity::shared();
                for (i, element) in elements.iter().enumerate() {
                    let value = self.evaluate(element);
                    array.borrow_mut().set(Key::index(i), value);
                }
                Value::Entity(array)
            }
            Expression::Dict(entries) => {
                let dict = Entity::shared();
                for entry in entries {
                    let key = self.evaluate(&entry.key);
                    let value = self.evaluate(&entry.value);
                    dict.borrow_mut().set(Key(key), value);
                }
                Value::Entity(dict)
            }
            Expression::Get(object, index) => {
                let object = self.evaluate(object);
                let index = self.evaluate(index);
                let Some(entity) = object.as_entity() else {
                    self.report(Diagnostic::runtime(format!(
                        "Only arrays and dicts support indexing, got {}.",
                        object
                    )));
                    return Value::None;
                };
                let value = entity.borrow().get(&Key(index));
                value.unwrap_or(Value::None)
            }
            Expression::Set(object, index, value) => {
                let object = self.evaluate(object);
                let index = self.evaluate(index);
                let value = self.evaluate(value);
                let Some(entity) = object.as_entity() else {
                    self.report(Diagnostic::runtime(format!(
                        "Only arrays and dicts support index assignment, got {}.",
                        object
                    )));
                    return Value::None;
                };
                entity.borrow_mut().set(Key(index), value.clone());
                value
            }
            Expression::Ternary(condition, then_expr, else_expr) => {
                if self.evaluate(condition).is_truthy() {
                    self.evaluate(then_expr)
                } else {
                    self.evaluate(else_expr)
                }
            }
            Expression::Range(start, end, step) => self.range(start, end, step.as_deref()),
            Expression::Dot(object, name) => {
                let object = self.evaluate(object);
                let Some(entity) = object.as_entity() else {
                    self.report(Diagnostic::runtime(format!(
                        "Only entities support '.' property access, got {}.",
                        object
                    )));
                    return Value::None;
                };
                let value = entity.borrow().get(&Key::name(&name.lexeme));
                value.unwrap_or(Value::None)
            }
        }
    }

    fn binary(&mut self, left: &Expression, op: &Token, right: &Expression) -> Value {
        let left = self.evaluate(left);

        // && and || short-circuit and yield the deciding operand itself.
        match op.kind {
            TokenKind::And => {
                if !left.is_truthy() {
                    return left;
                }
                return self.evaluate(right);
            }
            TokenKind::Or => {
                if left.is_truthy() {
                    return left;
                }
                return self.evaluate(right);
            }
            _ => {}
        }

        let right = self.evaluate(right);
        match op.kind {
            TokenKind::Plus => self.add(left, right),
            TokenKind::EqualEqual => Value::Bool(left == right),
            TokenKind::BangEqual => Value::Bool(left != right),
            TokenKind::Minus
            | TokenKind::Star
            | TokenKind::Slash
            | TokenKind::Greater
            | TokenKind::GreaterEqual
            | TokenKind::Less
            | TokenKind::LessEqual => {
                let (Value::Number(l), Value::Number(r)) = (&left, &right) else {
                    self.report(Diagnostic::runtime(
                        "Operands must be numeric for arithmetic/comparison.",
                    ));
                    return Value::None;
                };
                match op.kind {
                    TokenKind::Minus => Value::Number(l - r),
                    TokenKind::Star => Value::Number(l * r),
                    TokenKind::Slash => {
                        if r.is_zero() {
                            self.report(Diagnostic::runtime("Division by zero."));
                            return Value::None;
                        }
                        Value::Number((l / r).with_scale_round(10, RoundingMode::HalfEven))
                    }
                    TokenKind::Greater => Value::Bool(l > r),
                    TokenKind::GreaterEqual => Value::Bool(l >= r),
                    TokenKind::Less => Value::Bool(l < r),
                    TokenKind::LessEqual => Value::Bool(l <= r),
                    _ => unreachable!(),
                }
            }
            _ => Value::None,
        }
    }

    /// `+` adds numbers, concatenates when either side is a string, and
    /// concatenates arrays into a fresh entity when the left side is one.
    fn add(&mut self, left: Value, right: Value) -> Value {
        if let (Value::Number(l), Value::Number(r)) = (&left, &right) {
            return Value::Number(l + r);
        }
        if matches!(left, Value::Str(_)) || matches!(right, Value::Str(_)) {
            return Value::Str(format!("{}{}", left, right));
        }
        if let Some(entity) = left.as_entity() {
            let combined = Entity::shared();
            let length = entity.borrow().size();
            for i in 0..length {
                let element = entity.borrow().get(&Key::index(i)).unwrap_or(Value::None);
                combined.borrow_mut().set(Key::index(i), element);
            }
            match right.as_entity() {
                Some(right_entity) => {
                    let right_length = right_entity.borrow().size();
                    for i in 0..right_length {
                        let element = right_entity
                            .borrow()
                            .get(&Key::index(i))
                            .unwrap_or(Value::None);
                        combined.borrow_mut().set(Key::index(length + i), element);
                    }
                }
                None => combined.borrow_mut().set(Key::index(length), right),
            }
            return Value::Entity(combined);
        }
        self.report(Diagnostic::runtime(
            "Operands of '+' must be numbers, strings, or arrays.",
        ));
        Value::None
    }

    fn range(
        &mut self,
        start: &Expression,
        end: &Expression,
        step: Option<&Expression>,
    ) -> Value {
        let start = self.evaluate(start);
        let end = self.evaluate(end);
        let step = step.map(|expression| self.evaluate(expression));

        let start = self.number_or_zero(start);
        let end = self.number_or_zero(end);
        let step = match step {
            None => {
                if start <= end {
                    BigDecimal::one()
                } else {
                    -BigDecimal::one()
                }
            }
            Some(value) => {
                let step = self.number_or_zero(value);
                if step.is_zero() {
                    self.report(Diagnostic::runtime("Range step cannot be zero."));
                    return Value::Entity(Entity::shared());
                }
                step
            }
        };

        let array = Entity::shared();
        let ascending = step > BigDecimal::zero();
        let mut index = 0;
        let mut current = start;
        while (ascending && current <= end) || (!ascending && current >= end) {
            array
                .borrow_mut()
                .set(Key::index(index), Value::Number(current.clone()));
            index += 1;
            current = &current + &step;
        }
        Value::Entity(array)
    }

    fn number_or_zero(&mut self, value: Value) -> BigDecimal {
        match value {
            Value::Number(n) => n,
            other => {
                self.report(Diagnostic::runtime(format!(
                    "Expected numeric range boundary, got {}.",
                    other
                )));
                BigDecimal::zero()
            }
        }
    }

    fn make_function(&mut self, decl: Rc<FunctionDecl>) -> Value {
        Value::Callable(Rc::new(Callable::Function(Function {
            decl,
            closure: self.environment.clone(),
            fields: Entity::shared(),
        })))
    }

    /// Environment lookup; an unbound name is a diagnostic here, once.
    fn lookup(&mut self, name: &Token) -> Option<Value> {
        let value = self.environment.borrow().get(&name.lexeme);
        if value.is_none() {
            self.report(Diagnostic::UndefinedVariable {
                name: name.lexeme.clone(),
                line: name.line,
            });
        }
        value
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(
            Rc::new(RefCell::new(std::io::stdout())),
            Rc::new(RefCell::new(std::io::stderr())),
        )
    }
}

// ---------- Built-ins ----------

fn native_print(interpreter: &mut Interpreter, args: &[Value]) -> Value {
    let line = args
        .iter()
        .map(|arg| arg.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    let _ = writeln!(interpreter.stdout.borrow_mut(), "{}", line);
    Value::None
}

fn native_inspect(interpreter: &mut Interpreter, args: &[Value]) -> Value {
    let text = inspect_value(&args[0]);
    let _ = writeln!(interpreter.stdout.borrow_mut(), "{}", text);
    Value::Str(text)
}

fn native_len(interpreter: &mut Interpreter, args: &[Value]) -> Value {
    match args[0].as_entity() {
        Some(entity) => {
            let size = entity.borrow().size();
            Value::Number(BigDecimal::from(size as u64))
        }
        None => {
            interpreter.report(Diagnostic::LenArgument);
            Value::Number(BigDecimal::zero())
        }
    }
}

/// Recursive dump of an entity and its metaentity chain; anything else shows
/// its type and stringification.
fn inspect_value(value: &Value) -> String {
    let mut out = String::new();
    match value {
        Value::Callable(callable) => match &**callable {
            Callable::Function(function) => {
                out.push_str("<fn>\n");
                match &function.decl.name {
                    Some(name) => out.push_str(&format!("  name: {}\n", name.lexeme)),
                    None => out.push_str("  anonymous\n"),
                }
                let params = function
                    .decl
                    .params
                    .iter()
                    .map(|p| p.lexeme.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                out.push_str(&format!("  params: {}\n", params));
                let body = function
                    .decl
                    .body
                    .iter()
                    .map(|s| s.to_string())
                    .collect::<Vec<_>>()
                    .join(" ");
                out.push_str(&format!("  body: {}\n", body));
                inspect_entries(&function.fields, 0, &mut out);
            }
            Callable::Native(_) => {
                out.push_str(&format!("Type: Native\n{}", value));
                return out;
            }
        },
        Value::Entity(entity) => {
            out.push_str("<entity>\n");
            inspect_entries(entity, 0, &mut out);
        }
        other => return format!("Type: {}\n{}", other.type_name(), other),
    }
    while out.ends_with('\n') {
        out.pop();
    }
    out
}

fn inspect_entries(entity: &Rc<RefCell<Entity>>, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    out.push_str(&format!("{}entries:\n", indent));
    for (key, value) in entity.borrow().entries.iter() {
        out.push_str(&format!("{}  {} : {}\n", indent, key.0, value));
    }
    let meta = entity.borrow().metaentity();
    if let Some(meta) = meta {
        out.push_str(&format!("{}meta =>\n", indent));
        out.push_str(&format!("{}  <entity>\n", indent));
        inspect_entries(&meta, depth + 1, out);
    }
}
