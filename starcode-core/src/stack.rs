//! Growable index stacks with an overflow flag, and per-distance towers of them.

/// A growable stack that locks itself instead of aborting when it cannot grow.
///
/// Once locked, pushes are dropped until [`Stack::clear`] is called, and
/// [`Stack::is_locked`] tells the caller that its content is incomplete.
#[derive(Clone, Debug)]
pub struct Stack<T> {
    items: Vec<T>,
    locked: bool,
}

impl<T> Default for Stack<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            locked: false,
        }
    }
}

impl<T> Stack<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            locked: false,
        }
    }

    /// Returns `false` if the item was dropped because the stack is locked.
    #[must_use]
    pub fn push(&mut self, item: T) -> bool {
        if self.locked {
            return false;
        }
        if self.items.len() == self.items.capacity() && self.items.try_reserve(1).is_err() {
            self.locked = true;
            return false;
        }
        self.items.push(item);
        true
    }

    pub fn pop(&mut self) -> Option<T> {
        self.items.pop()
    }

    /// Empties the stack and unlocks it, keeping its allocation.
    pub fn clear(&mut self) {
        self.items.clear();
        self.locked = false;
    }

    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }
}

impl<'a, T> IntoIterator for &'a Stack<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// One stack per distance, `0..=tau`.
#[derive(Clone, Debug)]
pub struct Tower<T> {
    levels: Vec<Stack<T>>,
}

impl<T> Tower<T> {
    pub fn new(levels: usize) -> Self {
        Self {
            levels: (0..levels).map(|_| Stack::new()).collect(),
        }
    }

    /// A tower wide enough to hold hits up to distance `tau`.
    pub fn for_tau(tau: u8) -> Self {
        Self::new(tau as usize + 1)
    }

    pub fn levels(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, dist: usize) -> &Stack<T> {
        &self.levels[dist]
    }

    pub fn level_mut(&mut self, dist: usize) -> &mut Stack<T> {
        &mut self.levels[dist]
    }

    pub fn clear(&mut self) {
        self.levels.iter_mut().for_each(Stack::clear);
    }

    /// `true` when any level dropped items since the last clear.
    pub fn is_saturated(&self) -> bool {
        self.levels.iter().any(Stack::is_locked)
    }

    /// Items per level, shortest distance first.
    pub fn counts(&self) -> Vec<usize> {
        self.levels.iter().map(Stack::len).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Stack<T>)> {
        self.levels.iter().enumerate()
    }
}
