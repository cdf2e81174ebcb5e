use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::identifier::Identifier;
use crate::scale::ScaleData;

use super::RegistryError;

pub trait ScaleModifier: Send + Sync {
    fn modify_scale(&self, data: &ScaleData, value: f32, delta: f32) -> f32;
}

impl<F> ScaleModifier for F
where
    F: Fn(&ScaleData, f32, f32) -> f32 + Send + Sync,
{
    fn modify_scale(&self, data: &ScaleData, value: f32, delta: f32) -> f32 {
        self(data, value, delta)
    }
}

pub struct Modifier {
    id: Identifier,
    priority: f32,
    behavior: Box<dyn ScaleModifier>,
}

impl Modifier {
    pub fn new(id: Identifier, priority: f32, behavior: impl ScaleModifier + 'static) -> Self {
        Self {
            id,
            priority,
            behavior: Box::new(behavior),
        }
    }

    pub fn id(&self) -> &Identifier {
        &self.id
    }

    pub fn priority(&self) -> f32 {
        self.priority
    }

    pub fn modify_scale(&self, data: &ScaleData, value: f32, delta: f32) -> f32 {
        self.behavior.modify_scale(data, value, delta)
    }

    fn key(&self) -> ModifierKey {
        ModifierKey {
            priority: self.priority,
            id: self.id.clone(),
        }
    }
}

impl fmt::Debug for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Modifier")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
struct ModifierKey {
    priority: f32,
    id: Identifier,
}

impl Ord for ModifierKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .total_cmp(&self.priority)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for ModifierKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ModifierKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ModifierKey {}

#[derive(Clone, Default)]
pub struct ModifierSet {
    entries: BTreeMap<ModifierKey, Arc<Modifier>>,
}

impl ModifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, modifier: Arc<Modifier>) -> bool {
        if self.contains(modifier.id()) {
            return false;
        }
        self.entries.insert(modifier.key(), modifier);
        true
    }

    pub fn remove(&mut self, id: &Identifier) -> bool {
        let key = self
            .entries
            .keys()
            .find(|key| &key.id == id)
            .cloned();
        match key {
            Some(key) => self.entries.remove(&key).is_some(),
            None => false,
        }
    }

    pub fn contains(&self, id: &Identifier) -> bool {
        self.entries.keys().any(|key| &key.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Modifier>> {
        self.entries.values()
    }

    pub fn ids(&self) -> Vec<Identifier> {
        self.entries.keys().map(|key| key.id.clone()).collect()
    }

    pub fn to_vec(&self) -> Vec<Arc<Modifier>> {
        self.entries.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn difference(&self, other: &ModifierSet) -> Vec<Arc<Modifier>> {
        self.entries
            .iter()
            .filter(|(key, _)| !other.entries.contains_key(key))
            .map(|(_, modifier)| Arc::clone(modifier))
            .collect()
    }
}

impl PartialEq for ModifierSet {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self.entries.keys().zip(other.entries.keys()).all(|(a, b)| a == b)
    }
}

impl fmt::Debug for ModifierSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.keys().map(|key| key.id.to_string()))
            .finish()
    }
}

impl FromIterator<Arc<Modifier>> for ModifierSet {
    fn from_iter<I: IntoIterator<Item = Arc<Modifier>>>(iter: I) -> Self {
        let mut set = Self::new();
        for modifier in iter {
            set.insert(modifier);
        }
        set
    }
}

#[derive(Debug, Default)]
pub struct ModifierRegistry {
    entries: Vec<Arc<Modifier>>,
    by_id: HashMap<Identifier, usize>,
}

impl ModifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, modifier: Modifier) -> Result<Arc<Modifier>, RegistryError> {
        if self.by_id.contains_key(modifier.id()) {
            return Err(RegistryError::DuplicateModifier {
                id: modifier.id().clone(),
            });
        }
        let modifier = Arc::new(modifier);
        self.by_id
            .insert(modifier.id().clone(), self.entries.len());
        self.entries.push(Arc::clone(&modifier));
        Ok(modifier)
    }

    pub fn get(&self, id: &Identifier) -> Option<&Arc<Modifier>> {
        let index = self.by_id.get(id)?;
        self.entries.get(*index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Modifier>> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn modifier(path: &str, priority: f32) -> Arc<Modifier> {
        Arc::new(Modifier::new(
            Identifier::scaling(path),
            priority,
            |_: &ScaleData, value: f32, _: f32| value,
        ))
    }

    #[test]
    fn set_orders_by_priority_then_identifier() {
        let set: ModifierSet = [
            modifier("b", 0.0),
            modifier("a", 0.0),
            modifier("late", -1.0),
            modifier("early", 5.0),
        ]
        .into_iter()
        .collect();
        let order = set
            .ids()
            .iter()
            .map(|id| id.path().to_string())
            .collect::<Vec<_>>();
        assert_eq!(order, vec!["early", "a", "b", "late"]);
    }

    #[test]
    fn set_rejects_duplicate_ids_and_removes_by_id() {
        let mut set = ModifierSet::new();
        assert!(set.insert(modifier("a", 0.0)));
        assert!(!set.insert(modifier("a", 3.0)));
        assert_eq!(set.len(), 1);
        assert!(set.remove(&Identifier::scaling("a")));
        assert!(!set.remove(&Identifier::scaling("a")));
        assert!(set.is_empty());
    }

    #[test]
    fn difference_keeps_pipeline_order() {
        let a = modifier("a", 0.0);
        let b = modifier("b", 1.0);
        let c = modifier("c", 2.0);
        let full: ModifierSet = [a.clone(), b, c].into_iter().collect();
        let defaults: ModifierSet = [a].into_iter().collect();
        let delta = full
            .difference(&defaults)
            .iter()
            .map(|m| m.id().path().to_string())
            .collect::<Vec<_>>();
        assert_eq!(delta, vec!["c", "b"]);
    }

    #[test]
    fn registry_rejects_duplicates() {
        let mut registry = ModifierRegistry::new();
        registry
            .register(Modifier::new(
                Identifier::scaling("double"),
                0.0,
                |_: &ScaleData, value: f32, _: f32| value * 2.0,
            ))
            .expect("first registration");
        let err = registry
            .register(Modifier::new(
                Identifier::scaling("double"),
                0.0,
                |_: &ScaleData, value: f32, _: f32| value,
            ))
            .expect_err("duplicate");
        assert!(matches!(err, RegistryError::DuplicateModifier { .. }));
        assert_eq!(registry.len(), 1);
    }
}
