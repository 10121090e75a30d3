//! Set-like collections with functional helpers and incrementally maintained indexes
//!
//! [`Collection`] is the storage primitive for every group of entities in the
//! engine. [`IndexedCollection`] layers named derived subsets ("indexes") on
//! top of it and keeps them in sync as members are added, removed or reindexed.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;
use thiserror::Error;

/// Collection errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollectionError {
    /// `reduce` was called without a seed on an empty collection
    #[error("Reduce of empty collection with no initial value")]
    EmptyReduce,
}

/// Insertion-ordered set with unique membership
///
/// Functional helpers (`map`, `filter`, ...) operate over the current members
/// and always return new values; they never mutate the collection in place.
#[derive(Clone)]
pub struct Collection<T> {
    items: Vec<T>,
    positions: HashMap<T, usize>,
}

impl<T: Clone + Eq + Hash> Collection<T> {
    /// Create an empty collection
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            positions: HashMap::new(),
        }
    }

    /// Add an item, returns `true` if it was not already a member
    pub fn add(&mut self, item: T) -> bool {
        if self.positions.contains_key(&item) {
            return false;
        }
        self.positions.insert(item.clone(), self.items.len());
        self.items.push(item);
        true
    }

    /// Remove an item, returns `true` if it was a member
    pub fn delete(&mut self, item: &T) -> bool {
        let Some(position) = self.positions.remove(item) else {
            return false;
        };
        self.items.remove(position);
        for moved in &self.items[position..] {
            if let Some(index) = self.positions.get_mut(moved) {
                *index -= 1;
            }
        }
        true
    }

    /// Check membership
    pub fn has(&self, item: &T) -> bool {
        self.positions.contains_key(item)
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the collection has no members
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate members in insertion order
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Remove every member
    pub fn clear(&mut self) {
        self.items.clear();
        self.positions.clear();
    }

    /// Copy the members into a vector
    pub fn to_vec(&self) -> Vec<T> {
        self.items.clone()
    }

    /// Map every member into a new collection
    ///
    /// Members mapping to the same value collapse into one.
    pub fn map<U, F>(&self, f: F) -> Collection<U>
    where
        U: Clone + Eq + Hash,
        F: FnMut(&T) -> U,
    {
        self.items.iter().map(f).collect()
    }

    /// Members for which the predicate holds
    pub fn filter<F>(&self, mut predicate: F) -> Self
    where
        F: FnMut(&T) -> bool,
    {
        self.items.iter().filter(|item| predicate(item)).cloned().collect()
    }

    /// Members for which the predicate does not hold
    pub fn reject<F>(&self, mut predicate: F) -> Self
    where
        F: FnMut(&T) -> bool,
    {
        self.filter(|item| !predicate(item))
    }

    /// Fold the members into a single value
    ///
    /// Without a seed the first member becomes the accumulator, which fails on
    /// an empty collection.
    pub fn reduce<F>(&self, mut f: F, seed: Option<T>) -> Result<T, CollectionError>
    where
        F: FnMut(T, &T) -> T,
    {
        let mut members = self.items.iter();
        let mut accumulator = match seed {
            Some(seed) => seed,
            None => members.next().cloned().ok_or(CollectionError::EmptyReduce)?,
        };
        for item in members {
            accumulator = f(accumulator, item);
        }
        Ok(accumulator)
    }

    /// Fold the members into a value of another type, starting from `init`
    pub fn fold<A, F>(&self, init: A, f: F) -> A
    where
        F: FnMut(A, &T) -> A,
    {
        self.items.iter().fold(init, f)
    }

    /// Whether any member satisfies the predicate
    pub fn some<F>(&self, predicate: F) -> bool
    where
        F: FnMut(&T) -> bool,
    {
        self.items.iter().any(predicate)
    }

    /// Whether every member satisfies the predicate
    pub fn every<F>(&self, predicate: F) -> bool
    where
        F: FnMut(&T) -> bool,
    {
        self.items.iter().all(predicate)
    }

    /// First member (in insertion order) satisfying the predicate
    pub fn find<F>(&self, mut predicate: F) -> Option<&T>
    where
        F: FnMut(&T) -> bool,
    {
        self.items.iter().find(|item| predicate(item))
    }

    /// Union of this collection and `other`, keeping this collection's order first
    pub fn concat(&self, other: &Self) -> Self {
        let mut result = self.clone();
        for item in other.iter() {
            result.add(item.clone());
        }
        result
    }
}

impl<T: Clone + Eq + Hash> Default for Collection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Eq + Hash> FromIterator<T> for Collection<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut collection = Self::new();
        for item in iter {
            collection.add(item);
        }
        collection
    }
}

impl<T: Clone + Eq + Hash> Extend<T> for Collection<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.add(item);
        }
    }
}

impl<'a, T> IntoIterator for &'a Collection<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T> IntoIterator for Collection<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<T: Clone + Eq + Hash> PartialEq for Collection<T> {
    /// Set equality, insertion order is ignored
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.every(|item| other.has(item))
    }
}

impl<T: fmt::Debug> fmt::Debug for Collection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.items.iter()).finish()
    }
}

/// Pure function deriving an index value from a member, `None` means "no match"
pub type Indexer<T, V> = Rc<dyn Fn(&T) -> Option<V>>;

/// One named derived subset
struct Index<T, V> {
    indexer: Indexer<T, V>,
    values: Collection<V>,
    /// How many members currently derive each value
    counts: HashMap<V, usize>,
    /// Value each member derived when it was last indexed
    derived: HashMap<T, V>,
}

impl<T, V> Index<T, V>
where
    T: Clone + Eq + Hash,
    V: Clone + Eq + Hash,
{
    fn insert(&mut self, item: &T) {
        let Some(value) = (self.indexer)(item) else {
            return;
        };
        *self.counts.entry(value.clone()).or_insert(0) += 1;
        self.values.add(value.clone());
        self.derived.insert(item.clone(), value);
    }

    fn remove(&mut self, item: &T) {
        let Some(value) = self.derived.remove(item) else {
            return;
        };
        if let Some(count) = self.counts.get_mut(&value) {
            *count -= 1;
            if *count == 0 {
                self.counts.remove(&value);
                self.values.delete(&value);
            }
        }
    }
}

/// Collection that maintains named derived subsets of its members
///
/// For every index name `N` and member `I`, `get_indexed(N)` contains
/// `indexer(I)` exactly when the indexer returned `Some`. Property changes on
/// members are not detected automatically; call [`IndexedCollection::reindex_item`]
/// after mutating anything an indexer reads.
pub struct IndexedCollection<T, V> {
    items: Collection<T>,
    indexes: HashMap<String, Index<T, V>>,
}

impl<T, V> IndexedCollection<T, V>
where
    T: Clone + Eq + Hash,
    V: Clone + Eq + Hash,
{
    /// Create an empty indexed collection
    pub fn new() -> Self {
        Self {
            items: Collection::new(),
            indexes: HashMap::new(),
        }
    }

    /// Register a named index and populate it from the current members
    ///
    /// Registering a name that already exists is a no-op and returns `false`.
    pub fn set_index<F>(&mut self, name: impl Into<String>, indexer: F) -> bool
    where
        F: Fn(&T) -> Option<V> + 'static,
    {
        let name = name.into();
        if self.indexes.contains_key(&name) {
            log::debug!("Index '{}' already registered, keeping existing indexer", name);
            return false;
        }

        let mut index = Index {
            indexer: Rc::new(indexer),
            values: Collection::new(),
            counts: HashMap::new(),
            derived: HashMap::new(),
        };
        for item in self.items.iter() {
            index.insert(item);
        }
        log::debug!("Registered index '{}' ({} matches)", name, index.values.len());
        self.indexes.insert(name, index);
        true
    }

    /// Whether an index with this name is registered
    pub fn has_index(&self, name: &str) -> bool {
        self.indexes.contains_key(name)
    }

    /// Names of every registered index
    pub fn index_names(&self) -> impl Iterator<Item = &str> {
        self.indexes.keys().map(String::as_str)
    }

    /// The live derived subset for `name`
    pub fn get_indexed(&self, name: &str) -> Option<&Collection<V>> {
        self.indexes.get(name).map(|index| &index.values)
    }

    /// All members
    pub fn items(&self) -> &Collection<T> {
        &self.items
    }

    /// Add a member and run it through every indexer
    ///
    /// Adding an existing member reindexes it.
    pub fn add(&mut self, item: T) -> bool {
        let inserted = self.items.add(item.clone());
        self.reindex_item(&item);
        inserted
    }

    /// Remove a member and every value derived from it
    pub fn delete(&mut self, item: &T) -> bool {
        if !self.items.delete(item) {
            return false;
        }
        for index in self.indexes.values_mut() {
            index.remove(item);
        }
        true
    }

    /// Check membership
    pub fn has(&self, item: &T) -> bool {
        self.items.has(item)
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the collection has no members
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Recompute every index entry for a member
    ///
    /// Stale values derived on the previous pass are removed first, so
    /// repeated calls never accumulate duplicates. Non-members are ignored.
    pub fn reindex_item(&mut self, item: &T) {
        if !self.items.has(item) {
            return;
        }
        for index in self.indexes.values_mut() {
            index.remove(item);
            index.insert(item);
        }
    }
}

impl<T, V> Default for IndexedCollection<T, V>
where
    T: Clone + Eq + Hash,
    V: Clone + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn numbers(values: &[i32]) -> Collection<i32> {
        values.iter().copied().collect()
    }

    #[test]
    fn test_add_is_unique() {
        let mut collection = Collection::new();
        assert!(collection.add(1));
        assert!(!collection.add(1));
        assert!(collection.add(2));
        assert_eq!(collection.len(), 2);
        assert_eq!(collection.to_vec(), vec![1, 2]);
    }

    #[test]
    fn test_delete_keeps_order() {
        let mut collection = numbers(&[1, 2, 3, 4]);
        assert!(collection.delete(&2));
        assert!(!collection.delete(&2));
        assert_eq!(collection.to_vec(), vec![1, 3, 4]);
        assert!(collection.has(&4));
        assert!(collection.delete(&4));
        assert_eq!(collection.to_vec(), vec![1, 3]);
    }

    #[test]
    fn test_functional_helpers_do_not_mutate() {
        let collection = numbers(&[1, 2, 3, 4]);

        assert_eq!(collection.map(|n| n * 10).to_vec(), vec![10, 20, 30, 40]);
        assert_eq!(collection.filter(|n| n % 2 == 0).to_vec(), vec![2, 4]);
        assert_eq!(collection.reject(|n| n % 2 == 0).to_vec(), vec![1, 3]);
        assert!(collection.some(|n| *n == 3));
        assert!(collection.every(|n| *n > 0));
        assert_eq!(collection.find(|n| *n > 2), Some(&3));
        assert_eq!(collection.concat(&numbers(&[4, 5])).to_vec(), vec![1, 2, 3, 4, 5]);
        assert_eq!(collection.to_vec(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_reduce() {
        let collection = numbers(&[1, 2, 3]);
        assert_eq!(collection.reduce(|acc, n| acc + n, None), Ok(6));
        assert_eq!(collection.reduce(|acc, n| acc + n, Some(10)), Ok(16));

        let empty: Collection<i32> = Collection::new();
        assert_eq!(empty.reduce(|acc, n| acc + n, None), Err(CollectionError::EmptyReduce));
        assert_eq!(empty.reduce(|acc, n| acc + n, Some(7)), Ok(7));
    }

    #[test]
    fn test_index_registered_before_and_after_population() {
        let mut indexed: IndexedCollection<i32, i32> = IndexedCollection::new();
        indexed.set_index("even", |n| (n % 2 == 0).then_some(*n));
        for n in 1..=6 {
            indexed.add(n);
        }
        indexed.set_index("tens", |n| Some(n * 10));

        assert_eq!(indexed.get_indexed("even"), Some(&numbers(&[2, 4, 6])));
        assert_eq!(indexed.get_indexed("tens").map(Collection::len), Some(6));

        indexed.delete(&4);
        indexed.delete(&5);
        assert_eq!(indexed.get_indexed("even"), Some(&numbers(&[2, 6])));
        assert_eq!(indexed.get_indexed("tens"), Some(&numbers(&[10, 20, 30, 60])));
        assert!(indexed.get_indexed("missing").is_none());
    }

    #[test]
    fn test_set_index_is_idempotent_per_name() {
        let mut indexed: IndexedCollection<i32, i32> = IndexedCollection::new();
        indexed.add(3);
        assert!(indexed.set_index("id", |n| Some(*n)));
        assert!(!indexed.set_index("id", |_| None));
        assert_eq!(indexed.get_indexed("id"), Some(&numbers(&[3])));
    }

    #[test]
    fn test_reindex_is_idempotent() {
        let mut indexed: IndexedCollection<i32, i32> = IndexedCollection::new();
        indexed.set_index("odd", |n| (n % 2 == 1).then_some(*n));
        indexed.add(1);
        indexed.add(2);

        indexed.reindex_item(&1);
        let first = indexed.get_indexed("odd").cloned();
        indexed.reindex_item(&1);
        assert_eq!(indexed.get_indexed("odd").cloned(), first);
        assert_eq!(first, Some(numbers(&[1])));
    }

    #[test]
    fn test_reindex_removes_stale_value() {
        // Members are shared cells so the indexer can observe a mutation.
        #[derive(Clone)]
        struct Item(Rc<Cell<i32>>);
        impl PartialEq for Item {
            fn eq(&self, other: &Self) -> bool {
                Rc::ptr_eq(&self.0, &other.0)
            }
        }
        impl Eq for Item {}
        impl Hash for Item {
            fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
                Rc::as_ptr(&self.0).hash(state);
            }
        }

        let item = Item(Rc::new(Cell::new(5)));
        let mut indexed: IndexedCollection<Item, i32> = IndexedCollection::new();
        indexed.set_index("key", |item: &Item| Some(item.0.get()));
        indexed.add(item.clone());

        item.0.set(6);
        indexed.reindex_item(&item);
        assert_eq!(indexed.get_indexed("key"), Some(&numbers(&[6])));
    }

    #[test]
    fn test_shared_derived_value_survives_single_delete() {
        let mut indexed: IndexedCollection<i32, &'static str> = IndexedCollection::new();
        indexed.set_index("parity", |n| Some(if n % 2 == 0 { "even" } else { "odd" }));
        indexed.add(2);
        indexed.add(4);

        indexed.delete(&2);
        assert!(indexed.get_indexed("parity").is_some_and(|values| values.has(&"even")));
        indexed.delete(&4);
        assert!(indexed.get_indexed("parity").is_some_and(Collection::is_empty));
    }

    #[test]
    fn test_re_adding_member_reindexes_without_duplicates() {
        let mut indexed: IndexedCollection<i32, i32> = IndexedCollection::new();
        indexed.set_index("double", |n| Some(n * 2));
        assert!(indexed.add(1));
        assert!(!indexed.add(1));
        assert_eq!(indexed.len(), 1);
        assert_eq!(indexed.get_indexed("double"), Some(&numbers(&[2])));
    }
}
