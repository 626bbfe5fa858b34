//! Typed per-connection variable store.
//!
//! Layers of the handler chain share side-channel data (TLS state, matcher
//! results) by type rather than by string key: the type is the name.

use std::any::{Any, TypeId};
use std::collections::HashMap;

/// A map holding at most one value per type.
#[derive(Default)]
pub struct Vars {
    map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Vars {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value, returning the previous value of the same type.
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.map
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|prev| prev.downcast::<T>().ok())
            .map(|prev| *prev)
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
    }

    pub fn get_mut<T: Send + Sync + 'static>(&mut self) -> Option<&mut T> {
        self.map
            .get_mut(&TypeId::of::<T>())
            .and_then(|v| v.downcast_mut::<T>())
    }

    /// Get the value of type `T`, inserting `T::default()` first if absent.
    pub fn get_or_default<T: Default + Send + Sync + 'static>(&mut self) -> &mut T {
        self.map
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(T::default()))
            .downcast_mut::<T>()
            .expect("Vars entry keyed by TypeId::of::<T>() holds a T")
    }

    pub fn remove<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.map
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast::<T>().ok())
            .map(|v| *v)
    }

    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.map.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl std::fmt::Debug for Vars {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vars").field("len", &self.map.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Default)]
    struct Matched(&'static str);

    #[test]
    fn values_are_keyed_by_type() {
        let mut vars = Vars::new();
        assert!(vars.insert(Matched("http")).is_none());
        assert!(vars.insert(42u32).is_none());

        assert_eq!(vars.get::<Matched>(), Some(&Matched("http")));
        assert_eq!(vars.get::<u32>(), Some(&42));
        assert_eq!(vars.get::<u64>(), None);
        assert_eq!(vars.len(), 2);
    }

    #[test]
    fn insert_replaces_and_returns_previous() {
        let mut vars = Vars::new();
        vars.insert(Matched("tls"));
        let prev = vars.insert(Matched("ssh"));
        assert_eq!(prev, Some(Matched("tls")));
        assert_eq!(vars.get::<Matched>(), Some(&Matched("ssh")));
    }

    #[test]
    fn get_or_default_then_mutate() {
        let mut vars = Vars::new();
        vars.get_or_default::<Vec<u8>>().push(1);
        vars.get_or_default::<Vec<u8>>().push(2);
        assert_eq!(vars.get::<Vec<u8>>(), Some(&vec![1, 2]));

        assert_eq!(vars.remove::<Vec<u8>>(), Some(vec![1, 2]));
        assert!(!vars.contains::<Vec<u8>>());
        assert!(vars.is_empty());
    }
}
