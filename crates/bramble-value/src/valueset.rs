use crate::error::ValueResult;
use crate::value::Value;

const MINIMUM_SLOTS: usize = 64;

/// An insert-only set of values, keyed by [`Value::hash_value`] and
/// compared with [`Value::equals`].
///
/// Open addressing with triangular probing over a power-of-two table. A
/// stored hash of zero marks an empty slot, so values hashing to zero are
/// stored under one instead.
#[derive(Debug, Default)]
pub struct ValueSet {
    slots: Vec<Slot>,
    len: usize,
}

#[derive(Debug, Default)]
struct Slot {
    hash: u64,
    value: Option<Value>,
}

impl ValueSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Add `value` unless an equal value is already present. Returns
    /// whether it was already present.
    pub fn test_and_add(&mut self, value: &Value) -> ValueResult<bool> {
        let hash = value.hash_value()?;
        self.test_and_add_hashed(hash, value)
    }

    pub(crate) fn test_and_add_hashed(&mut self, hash: u64, value: &Value) -> ValueResult<bool> {
        let hash = if hash == 0 { 1 } else { hash };
        let mut vacant = None;
        if !self.slots.is_empty() {
            let mask = self.slots.len() - 1;
            let mut index = hash as usize & mask;
            let mut step = 0;
            loop {
                let slot = &self.slots[index];
                match &slot.value {
                    None => {
                        vacant = Some(index);
                        break;
                    }
                    Some(existing) if slot.hash == hash && existing.equals(value)? => {
                        return Ok(true);
                    }
                    Some(_) => {}
                }
                step += 1;
                index = (index + step) & mask;
            }
        }
        // Keep the table at most half full.
        let index = match vacant {
            Some(index) if (self.len + 1) * 2 <= self.slots.len() => index,
            _ => {
                self.grow();
                self.vacant_slot(hash)
            }
        };
        self.slots[index] = Slot {
            hash,
            value: Some(value.clone()),
        };
        self.len += 1;
        Ok(false)
    }

    fn vacant_slot(&self, hash: u64) -> usize {
        let mask = self.slots.len() - 1;
        let mut index = hash as usize & mask;
        let mut step = 0;
        while self.slots[index].value.is_some() {
            step += 1;
            index = (index + step) & mask;
        }
        index
    }

    fn grow(&mut self) {
        let capacity = (self.slots.len() * 2).max(MINIMUM_SLOTS);
        let old = std::mem::replace(
            &mut self.slots,
            std::iter::repeat_with(Slot::default).take(capacity).collect(),
        );
        for slot in old {
            if slot.value.is_some() {
                let index = self.vacant_slot(slot.hash);
                self.slots[index] = slot;
            }
        }
    }
}
