use std::{
    cell::RefCell,
    hash::{Hash, Hasher},
    rc::Rc,
};

use bigdecimal::BigDecimal;
use rustc_hash::FxHashMap;

use super::Value;

/// The universal container behind arrays, dicts, classes, and functions: a
/// value-keyed map plus an optional metaentity consulted on lookup misses.
#[derive(Default)]
pub struct Entity {
    pub entries: FxHashMap<Key, Value>,
    metaentity: Option<Rc<RefCell<Entity>>>,
}

impl Entity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Local entries first, then up the metaentity chain. `None` means the
    /// key is absent everywhere; callers substitute the `None` value.
    pub fn get(&self, key: &Key) -> Option<Value> {
        if let Some(value) = self.entries.get(key) {
            return Some(value.clone());
        }
        self.metaentity.as_ref().and_then(|meta| meta.borrow().get(key))
    }

    /// Writes are always local; the metaentity is never mutated through a child.
    pub fn set(&mut self, key: Key, value: Value) {
        self.entries.insert(key, value);
    }

    /// Local entry count only.
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn metaentity(&self) -> Option<Rc<RefCell<Entity>>> {
        self.metaentity.clone()
    }

    pub fn set_metaentity(&mut self, parent: Rc<RefCell<Entity>>) {
        self.metaentity = Some(parent);
    }

    /// True when the local keys are exactly the integers `0..size`, i.e. the
    /// entity follows the array convention.
    pub fn is_array_like(&self) -> bool {
        (0..self.entries.len()).all(|i| self.entries.contains_key(&Key::index(i)))
    }
}

/// A map key wrapping any value. Equality is value equality (entities and
/// callables by identity); numbers compare and hash by numeric magnitude, so
/// `1` and `1.0` are the same key.
#[derive(Clone)]
pub struct Key(pub Value);

impl Key {
    pub fn index(i: usize) -> Self {
        Key(Value::Number(BigDecimal::from(i as u64)))
    }

    pub fn name(name: &str) -> Self {
        Key(Value::Str(name.to_string()))
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.0 {
            Value::None => state.write_u8(0),
            Value::Bool(b) => {
                state.write_u8(1);
                b.hash(state);
            }
            Value::Number(n) => {
                state.write_u8(2);
                n.hash(state);
            }
            Value::Str(s) => {
                state.write_u8(3);
                s.hash(state);
            }
            Value::Entity(entity) => {
                state.write_u8(4);
                (Rc::as_ptr(entity) as usize).hash(state);
            }
            Value::Callable(callable) => {
                state.write_u8(5);
                (Rc::as_ptr(callable) as *const u8 as usize).hash(state);
            }
        }
    }
}
