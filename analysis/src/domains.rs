use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::hash::Hash;

///////////////////////////
/// Traits for domains. ///
///////////////////////////

pub trait JoinSemiLattice: Eq + Clone {
    /// Required to be the smallest element of the lattice.
    fn bottom() -> Self;

    /// Requirements:
    /// * a.join(a) == a
    /// * a.join(b) == b.join(a)
    /// * bottom.join(b) == b
    fn join(&self, other: &Self) -> Self;
}

pub trait Top: JoinSemiLattice {
    /// Requirements:
    /// Top is the greatest element of the lattice, top.join(b) == top.
    fn top() -> Self;
}

///////////////////////////////////////
/// Concrete domain implementations ///
///////////////////////////////////////

/// Flat constant lattice over 32-bit integers:
///
/// ```text
///        NAC
///   /  /  |  \  \
///  .. -1  0  1 ..
///   \  \  |  /  /
///       Undef
/// ```
///
/// `Undef` means no definition has been seen on any path, `Nac` means the
/// value is not a compile-time constant. Two distinct constants are
/// incomparable and join to `Nac`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Value {
    Undef,
    Const(i32),
    Nac,
}

impl Value {
    pub fn is_undef(&self) -> bool {
        matches!(self, Value::Undef)
    }

    pub fn is_const(&self) -> bool {
        matches!(self, Value::Const(_))
    }

    pub fn is_nac(&self) -> bool {
        matches!(self, Value::Nac)
    }

    pub fn as_const(&self) -> Option<i32> {
        match self {
            Value::Const(c) => Some(*c),
            _ => None,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Undef => write!(f, "undef"),
            Value::Const(c) => write!(f, "{c}"),
            Value::Nac => write!(f, "NAC"),
        }
    }
}

impl JoinSemiLattice for Value {
    fn bottom() -> Self {
        Value::Undef
    }

    fn join(&self, other: &Self) -> Self {
        match (*self, *other) {
            (Value::Nac, _) | (_, Value::Nac) => Value::Nac,
            (Value::Undef, v) | (v, Value::Undef) => v,
            (Value::Const(a), Value::Const(b)) => {
                if a == b {
                    Value::Const(a)
                } else {
                    Value::Nac
                }
            }
        }
    }
}

impl Top for Value {
    fn top() -> Self {
        Value::Nac
    }
}

/// Map lattice: a partial mapping from keys to lattice values where an
/// absent key means bottom. Bottom values are never stored, so two maps
/// compare equal exactly when their non-bottom entries coincide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Map<K: Eq + Hash + Copy, D: JoinSemiLattice>(HashMap<K, D>);

impl<K: Eq + Hash + Copy, D: JoinSemiLattice> Default for Map<K, D> {
    fn default() -> Self {
        Self(HashMap::new())
    }
}

impl<K: Eq + Hash + Copy, D: JoinSemiLattice> Map<K, D> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &K) -> Option<&D> {
        self.0.get(key)
    }

    pub fn get_or_bottom(&self, key: &K) -> D {
        self.0.get(key).cloned().unwrap_or_else(D::bottom)
    }

    /// Binds `key` to `value`, removing the entry when `value` is bottom.
    pub fn update(&mut self, key: K, value: D) {
        if value == D::bottom() {
            self.0.remove(&key);
        } else {
            self.0.insert(key, value);
        }
    }

    /// Destructive pointwise join. Returns whether the receiver changed.
    pub fn join_with(&mut self, other: &Self) -> bool {
        let mut changed = false;
        for (key, value) in &other.0 {
            let joined = match self.0.get(key) {
                Some(current) => current.join(value),
                None => value.clone(),
            };
            if self.0.get(key) != Some(&joined) {
                self.0.insert(*key, joined);
                changed = true;
            }
        }
        changed
    }

    /// Makes the receiver a copy of `other`. Returns whether it changed.
    pub fn assign_from(&mut self, other: &Self) -> bool {
        if self == other {
            return false;
        }
        *self = other.clone();
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &D)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Eq + Hash + Copy, D: JoinSemiLattice> JoinSemiLattice for Map<K, D> {
    fn bottom() -> Self {
        Self::new()
    }

    fn join(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.join_with(other);
        result
    }
}

/// Power set lattice ordered by inclusion, with the empty set as bottom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerSet<T: Eq + Hash + Clone>(HashSet<T>);

impl<T: Eq + Hash + Clone> Default for PowerSet<T> {
    fn default() -> Self {
        Self(HashSet::new())
    }
}

impl<T: Eq + Hash + Clone> PowerSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, element: T) -> bool {
        self.0.insert(element)
    }

    pub fn remove(&mut self, element: &T) -> bool {
        self.0.remove(element)
    }

    pub fn contains(&self, element: &T) -> bool {
        self.0.contains(element)
    }

    /// Destructive union. Returns whether the receiver grew.
    pub fn union_with(&mut self, other: &Self) -> bool {
        let before = self.0.len();
        self.0.extend(other.0.iter().cloned());
        self.0.len() > before
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<T: Eq + Hash + Clone> JoinSemiLattice for PowerSet<T> {
    fn bottom() -> Self {
        Self::new()
    }

    fn join(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.union_with(other);
        result
    }
}
