use std::{cell::RefCell, rc::Rc};

use rustc_hash::FxHashMap;

use super::entity::{Entity, Key};
use super::Value;

/// One frame of scope. The mode is fixed at construction: either an ordinary
/// lexical frame, or a class-body frame that accumulates definitions as
/// entries on the class entity.
pub enum Environment {
    Lexical {
        values: FxHashMap<String, Value>,
        enclosing: Option<Rc<RefCell<Environment>>>,
    },
    ClassBody {
        entity: Rc<RefCell<Entity>>,
        outer: Rc<RefCell<Environment>>,
    },
}

impl Environment {
    pub fn global() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Environment::Lexical {
            values: FxHashMap::default(),
            enclosing: None,
        }))
    }

    pub fn nested(enclosing: Rc<RefCell<Environment>>) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Environment::Lexical {
            values: FxHashMap::default(),
            enclosing: Some(enclosing),
        }))
    }

    pub fn class_body(
        entity: Rc<RefCell<Entity>>,
        outer: Rc<RefCell<Environment>>,
    ) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Environment::ClassBody { entity, outer }))
    }

    pub fn define(&mut self, name: String, value: Value) {
        match self {
            Environment::Lexical { values, .. } => {
                values.insert(name, value);
            }
            Environment::ClassBody { entity, .. } => {
                entity.borrow_mut().set(Key::name(&name), value);
            }
        }
    }

    /// First binding along the chain, or `None` if the name is unbound
    /// anywhere; the caller owns the diagnostic.
    pub fn get(&self, name: &str) -> Option<Value> {
        match self {
            Environment::Lexical { values, enclosing } => {
                if let Some(value) = values.get(name) {
                    return Some(value.clone());
                }
                enclosing.as_ref().and_then(|e| e.borrow().get(name))
            }
            Environment::ClassBody { entity, outer } => {
                if let Some(value) = entity.borrow().get(&Key::name(name)) {
                    return Some(value);
                }
                outer.borrow().get(name)
            }
        }
    }

    /// Write to the innermost frame that already binds `name`; if no frame
    /// does, create the binding right here. Bare assignment always succeeds.
    pub fn assign(&mut self, name: &str, value: Value) {
        match self {
            Environment::ClassBody { entity, .. } => {
                entity.borrow_mut().set(Key::name(name), value);
            }
            Environment::Lexical { values, enclosing } => {
                if values.contains_key(name) {
                    values.insert(name.to_string(), value);
                    return;
                }
                if let Some(enclosing) = enclosing {
                    if enclosing.borrow().contains(name) {
                        enclosing.borrow_mut().assign(name, value);
                        return;
                    }
                }
                values.insert(name.to_string(), value);
            }
        }
    }

    fn contains(&self, name: &str) -> bool {
        match self {
            Environment::Lexical { values, enclosing } => {
                values.contains_key(name)
                    || enclosing.as_ref().is_some_and(|e| e.borrow().contains(name))
            }
            Environment::ClassBody { entity, outer } => {
                entity.borrow().entries.contains_key(&Key::name(name))
                    || outer.borrow().contains(name)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use bigdecimal::BigDecimal;

    use super::*;

    fn number(n: i64) -> Value {
        Value::Number(BigDecimal::from(n))
    }

    #[test]
    fn test_get_walks_the_chain() {
        let global = Environment::global();
        global.borrow_mut().define("x".to_string(), number(1));
        let inner = Environment::nested(global);
        assert_eq!(inner.borrow().get("x"), Some(number(1)));
        assert_eq!(inner.borrow().get("missing"), None);
    }

    #[test]
    fn test_assign_updates_the_defining_frame() {
        let global = Environment::global();
        global.borrow_mut().define("x".to_string(), number(1));
        let inner = Environment::nested(global.clone());
        inner.borrow_mut().assign("x", number(2));
        assert_eq!(global.borrow().get("x"), Some(number(2)));
    }

    #[test]
    fn test_ambient_assignment_creates_locally() {
        let global = Environment::global();
        let inner = Environment::nested(global.clone());
        inner.borrow_mut().assign("fresh", number(7));
        assert_eq!(inner.borrow().get("fresh"), Some(number(7)));
        assert_eq!(global.borrow().get("fresh"), None);
    }

    #[test]
    fn test_class_body_writes_into_entity() {
        let global = Environment::global();
        let class = Entity::shared();
        let body = Environment::class_body(class.clone(), global);
        body.borrow_mut().define("field".to_string(), number(5));
        body.borrow_mut().assign("other", number(6));
        assert_eq!(class.borrow().get(&Key::name("field")), Some(number(5)));
        assert_eq!(class.borrow().get(&Key::name("other")), Some(number(6)));
    }

    #[test]
    fn test_class_body_reads_fall_back_to_outer() {
        let global = Environment::global();
        global.borrow_mut().define("outer".to_string(), number(9));
        let class = Entity::shared();
        let body = Environment::class_body(class, global);
        assert_eq!(body.borrow().get("outer"), Some(number(9)));
    }
}
