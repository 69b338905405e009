//! Generational slab used to hand out stable, reusable job identities.
//!
//! A key is `(index, generation)`. Removing an entry bumps the slot's
//! generation, so a stale key never resolves to a later occupant of the slot.

pub(crate) struct Slab<T> {
    entries: Vec<Entry<T>>,
    free: Vec<usize>,
    len: usize,
}

enum Entry<T> {
    Occupied { generation: u32, value: T },
    Vacant { generation: u32 },
}

impl<T> Slab<T> {
    pub(crate) fn with_capacity(size: usize) -> Self {
        let entries = (0..size).map(|_| Entry::Vacant { generation: 0 }).collect();
        let free = (0..size).rev().collect();

        Self {
            entries,
            free,
            len: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Returns the key the next [`Slab::insert`] will use.
    pub(crate) fn vacant_key(&mut self) -> (usize, u32) {
        let index = match self.free.last() {
            Some(&i) => i,
            None => {
                self.grow();
                self.free[self.free.len() - 1]
            }
        };

        match self.entries[index] {
            Entry::Vacant { generation } => (index, generation),
            Entry::Occupied { .. } => unreachable!("free list points at an occupied slot"),
        }
    }

    pub(crate) fn insert(&mut self, value: T) -> (usize, u32) {
        let (index, generation) = self.vacant_key();
        self.free.pop();
        self.entries[index] = Entry::Occupied { generation, value };
        self.len += 1;

        (index, generation)
    }

    pub(crate) fn get(&self, index: usize, generation: u32) -> Option<&T> {
        match self.entries.get(index)? {
            Entry::Occupied {
                generation: current,
                value,
            } if *current == generation => Some(value),
            _ => None,
        }
    }

    pub(crate) fn remove(&mut self, index: usize, generation: u32) -> Option<T> {
        match self.entries.get(index)? {
            Entry::Occupied {
                generation: current,
                ..
            } if *current == generation => {}
            _ => return None,
        }

        let next = Entry::Vacant {
            generation: generation.wrapping_add(1),
        };
        let Entry::Occupied { value, .. } = std::mem::replace(&mut self.entries[index], next)
        else {
            return None;
        };
        self.free.push(index);
        self.len -= 1;

        Some(value)
    }

    /// Removes and returns every occupied value.
    pub(crate) fn drain(&mut self) -> Vec<T> {
        let mut values = Vec::with_capacity(self.len);
        for index in 0..self.entries.len() {
            if let Entry::Occupied { generation, .. } = self.entries[index]
                && let Some(value) = self.remove(index, generation)
            {
                values.push(value);
            }
        }
        values
    }

    fn grow(&mut self) {
        let len = self.entries.len();
        let new_len = if len == 0 { 16 } else { 2 * len };

        self.entries
            .extend((len..new_len).map(|_| Entry::Vacant { generation: 0 }));
        self.free.extend((len..new_len).rev());
    }
}

#[cfg(test)]
mod tests {
    use super::Slab;

    #[test]
    fn stale_keys_do_not_resolve() {
        let mut slab = Slab::with_capacity(1);
        let (index, generation) = slab.insert("first");
        assert_eq!(slab.remove(index, generation), Some("first"));

        let (reused, next_generation) = slab.insert("second");
        assert_eq!(reused, index);
        assert_ne!(next_generation, generation);
        assert_eq!(slab.get(index, generation), None);
        assert_eq!(slab.get(reused, next_generation), Some(&"second"));
    }

    #[test]
    fn grows_past_initial_capacity() {
        let mut slab = Slab::with_capacity(2);
        let keys: Vec<_> = (0..100).map(|i| slab.insert(i)).collect();

        assert_eq!(slab.len(), 100);
        for (i, (index, generation)) in keys.into_iter().enumerate() {
            assert_eq!(slab.get(index, generation), Some(&i));
        }
    }

    #[test]
    fn vacant_key_predicts_insert() {
        let mut slab = Slab::with_capacity(0);
        let predicted = slab.vacant_key();

        assert_eq!(slab.insert('x'), predicted);
    }

    #[test]
    fn drain_empties_the_slab() {
        let mut slab = Slab::with_capacity(4);
        slab.insert(1);
        let (index, generation) = slab.insert(2);
        slab.insert(3);
        slab.remove(index, generation);

        let mut drained = slab.drain();
        drained.sort();
        assert_eq!(drained, vec![1, 3]);
        assert_eq!(slab.len(), 0);
    }
}
