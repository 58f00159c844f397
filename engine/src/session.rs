use std::collections::BTreeMap;

use crate::value::Value;

/// A variable binding and the block that last assigned it.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub value: Value,
    pub bound_by: usize,
}

/// The single namespace shared by every executed block of one run.
///
/// Created empty per run and dropped with the [`Engine`](crate::Engine).
/// Conditionals only ever see it through `&SessionState`.
#[derive(Debug, Default)]
pub struct SessionState {
    bindings: BTreeMap<String, Binding>,
    /// Index of the block currently executing.
    current_block: usize,
}

impl SessionState {
    pub fn new() -> Self {
        SessionState::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name).map(|b| &b.value)
    }

    pub fn binding(&self, name: &str) -> Option<&Binding> {
        self.bindings.get(name)
    }

    /// Bind `name` on behalf of the block currently executing.
    pub fn bind(&mut self, name: &str, value: Value) {
        self.bindings.insert(
            name.to_string(),
            Binding {
                value,
                bound_by: self.current_block,
            },
        );
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub(crate) fn enter_block(&mut self, index: usize) {
        self.current_block = index;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bindings_remember_their_block() {
        let mut session = SessionState::new();
        session.enter_block(2);
        session.bind("x", Value::Number(3.0));
        session.enter_block(5);
        session.bind("x", Value::Number(4.0));
        let binding = session.binding("x").unwrap();
        assert_eq!(binding.value, Value::Number(4.0));
        assert_eq!(binding.bound_by, 5);
        assert_eq!(session.len(), 1);
        assert!(session.get("y").is_none());
    }
}
