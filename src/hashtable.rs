//! Open-addressed, double-hashed string→index map (`spec.md` component B).
//!
//! Ported from `original_source/libcoda/hashtable.c`: same hash function
//! (`hash = hash * 0xF4243 ^ c`, case-insensitive variant upper-cases ASCII
//! before folding), same probe-step derivation from the high hash bits, and
//! the same grow-when-half-full policy starting at capacity `2^5`.

const INITIAL_POWER: u32 = 5;

fn strhash(s: &str) -> u64 {
    let mut hash: u64 = 0;
    for &b in s.as_bytes() {
        hash = hash.wrapping_mul(0xF4243) ^ (b as u64);
    }
    hash
}

fn strcasehash(s: &str) -> u64 {
    let mut hash: u64 = 0;
    for &b in s.as_bytes() {
        let lc = if b.is_ascii_uppercase() { b + 32 } else { b };
        hash = hash.wrapping_mul(0xF4243) ^ (lc as u64);
    }
    hash
}

fn names_equal(case_sensitive: bool, a: &str, b: &str) -> bool {
    if case_sensitive {
        a == b
    } else {
        a.eq_ignore_ascii_case(b)
    }
}

struct Slot {
    name: String,
    index: i64,
}

/// A case-sensitive or case-insensitive string→index map.
pub struct Hashtable {
    slots: Vec<Option<Slot>>,
    power: u32,
    size: u64,
    used: u64,
    case_sensitive: bool,
}

impl Hashtable {
    pub fn new(case_sensitive: bool) -> Self {
        Hashtable { slots: Vec::new(), power: INITIAL_POWER, size: 0, used: 0, case_sensitive }
    }

    fn hash(&self, name: &str) -> u64 {
        if self.case_sensitive { strhash(name) } else { strcasehash(name) }
    }

    fn step_for(&self, hash: u64, mask: u64, power: u32) -> u64 {
        (((hash & !mask) >> (power - 1)) & (mask >> 2)) | 1
    }

    fn allocate(&mut self) {
        self.size = 1u64 << self.power;
        self.slots = (0..self.size).map(|_| None).collect();
    }

    /// Insert `name` bound to `index`. Returns `false` without modifying the
    /// table if `name` is already present (case rules per `case_sensitive`).
    pub fn add(&mut self, name: &str, index: i64) -> bool {
        let hash = self.hash(name);

        if self.size == 0 {
            self.allocate();
        } else {
            let mask = self.size - 1;
            let mut i = hash & mask;
            let mut step = 0u64;
            while let Some(slot) = &self.slots[i as usize] {
                if names_equal(self.case_sensitive, name, &slot.name) {
                    return false;
                }
                if step == 0 {
                    step = self.step_for(hash, mask, self.power);
                }
                i = if i < step { i + self.size - step } else { i - step };
            }
        }

        if self.used == self.size >> 1 {
            self.grow();
        }

        let mask = self.size - 1;
        let mut i = hash & mask;
        let mut step = 0u64;
        while self.slots[i as usize].is_some() {
            if step == 0 {
                step = self.step_for(hash, mask, self.power);
            }
            i = if i < step { i + self.size - step } else { i - step };
        }
        self.slots[i as usize] = Some(Slot { name: name.to_string(), index });
        self.used += 1;
        true
    }

    fn grow(&mut self) {
        let new_power = self.power + 1;
        let new_size = self.size << 1;
        let new_mask = new_size - 1;
        let mut new_slots: Vec<Option<Slot>> = (0..new_size).map(|_| None).collect();

        for old in self.slots.drain(..) {
            if let Some(slot) = old {
                let new_hash = self.hash(&slot.name);
                let mut j = new_hash & new_mask;
                let mut step = 0u64;
                while new_slots[j as usize].is_some() {
                    if step == 0 {
                        step = (((new_hash & !new_mask) >> (new_power - 1)) & (new_mask >> 2)) | 1;
                    }
                    j = if j < step { j + new_size - step } else { j - step };
                }
                new_slots[j as usize] = Some(slot);
            }
        }

        self.slots = new_slots;
        self.power = new_power;
        self.size = new_size;
    }

    /// Look up the index bound to `name`, or `-1` if absent.
    pub fn get(&self, name: &str) -> i64 {
        if self.size == 0 {
            return -1;
        }
        let hash = self.hash(name);
        let mask = self.size - 1;
        let mut i = hash & mask;
        let mut step = 0u64;
        while let Some(slot) = &self.slots[i as usize] {
            if names_equal(self.case_sensitive, name, &slot.name) {
                return slot.index;
            }
            if step == 0 {
                step = self.step_for(hash, mask, self.power);
            }
            i = if i < step { i + self.size - step } else { i - step };
        }
        -1
    }

    pub fn len(&self) -> usize {
        self.used as usize
    }

    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    pub fn capacity(&self) -> usize {
        self.size as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_get_roundtrips() {
        let mut h = Hashtable::new(true);
        assert!(h.add("alpha", 0));
        assert!(h.add("beta", 1));
        assert_eq!(h.get("alpha"), 0);
        assert_eq!(h.get("beta"), 1);
        assert_eq!(h.get("gamma"), -1);
    }

    #[test]
    fn duplicate_add_is_a_noop_failure() {
        let mut h = Hashtable::new(true);
        assert!(h.add("alpha", 0));
        assert!(!h.add("alpha", 42));
        assert_eq!(h.get("alpha"), 0);
    }

    #[test]
    fn case_insensitive_table_folds_case() {
        let mut h = Hashtable::new(false);
        assert!(h.add("Alpha", 0));
        assert!(!h.add("ALPHA", 1));
        assert_eq!(h.get("alpha"), 0);
    }

    #[test]
    fn case_sensitive_table_treats_case_as_distinct() {
        let mut h = Hashtable::new(true);
        assert!(h.add("Alpha", 0));
        assert!(h.add("ALPHA", 1));
        assert_eq!(h.get("Alpha"), 0);
        assert_eq!(h.get("ALPHA"), 1);
    }

    #[test]
    fn capacity_grows_strictly_monotonically_and_entries_survive() {
        let mut h = Hashtable::new(true);
        let mut last_capacity = h.capacity();
        for i in 0..500 {
            let name = format!("name_{i}");
            assert!(h.add(&name, i));
            assert!(h.capacity() >= last_capacity);
            last_capacity = h.capacity();
        }
        for i in 0..500 {
            let name = format!("name_{i}");
            assert_eq!(h.get(&name), i);
        }
        assert_eq!(h.len(), 500);
    }
}
