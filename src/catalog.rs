//! # Register Catalog
//!
//! Bounded, uniqueness-enforcing store of register descriptors plus the
//! per-descriptor runtime state the polling engine maintains. Iteration
//! order is insertion order; indices are stable between mutations but
//! not across removals, so per-iteration consumers bind by index once
//! and re-resolve on the next cycle.
//!
//! Every lookup returns a descriptor copy. The catalog itself carries
//! no lock: callers that share it across threads wrap it in a mutex and
//! treat poisoning as fatal.

use crate::constants::{MAX_LATEST_PUBLISHED_LEN, MAX_REGISTERS_NUM};
use crate::descriptor::{RegisterDescriptor, RegisterType};
use crate::error::CatalogInsertError;

/// Non-persistent monitoring state attached to one descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeState {
    /// Value string of the most recent publish, empty before the first.
    pub latest_published_value: String,
    /// Polling-clock second of the most recent publish.
    pub latest_published_time_s: u32,
    /// Entry was batched but the batch is not yet acknowledged.
    pub must_publish: bool,
}

#[derive(Debug)]
struct Slot {
    desc: RegisterDescriptor,
    runtime: RuntimeState,
}

/// Insertion-ordered store of up to 60 register descriptors.
#[derive(Debug, Default)]
pub struct RegisterCatalog {
    slots: Vec<Slot>,
}

impl RegisterCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self {
            slots: Vec::with_capacity(MAX_REGISTERS_NUM),
        }
    }

    /// Insert a descriptor, checking name and bus-tuple uniqueness
    /// before consuming a slot. Runtime state starts zeroed.
    pub fn add(&mut self, desc: RegisterDescriptor) -> Result<(), CatalogInsertError> {
        if self.slots.iter().any(|s| s.desc.name == desc.name) {
            return Err(CatalogInsertError::DuplicateName);
        }
        if self
            .slots
            .iter()
            .any(|s| s.desc.modbus_tuple() == desc.modbus_tuple())
        {
            return Err(CatalogInsertError::DuplicateModbusTuple);
        }
        if self.slots.len() >= MAX_REGISTERS_NUM {
            return Err(CatalogInsertError::Full);
        }
        self.slots.push(Slot {
            desc,
            runtime: RuntimeState::default(),
        });
        Ok(())
    }

    /// Remove the descriptor with the given name together with its
    /// runtime state. Returns false when no such descriptor exists.
    pub fn remove(&mut self, name: &str) -> bool {
        match self.slots.iter().position(|s| s.desc.name == name) {
            Some(index) => {
                self.slots.remove(index);
                true
            }
            None => false,
        }
    }

    /// Number of descriptors currently stored.
    pub fn count(&self) -> usize {
        self.slots.len()
    }

    /// Discard every descriptor.
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Copy of the descriptor with the given name.
    pub fn find(&self, name: &str) -> Option<RegisterDescriptor> {
        self.slot(name).map(|s| s.desc.clone())
    }

    /// Copy of the descriptor matching a (function, slave, register) tuple.
    pub fn find_by_modbus(
        &self,
        read_function: u8,
        slave_addr: u8,
        reg_id: u16,
    ) -> Option<RegisterDescriptor> {
        self.slots
            .iter()
            .find(|s| s.desc.modbus_tuple() == (read_function, slave_addr, reg_id))
            .map(|s| s.desc.clone())
    }

    /// Copy of the descriptor at the given insertion-order index.
    pub fn at(&self, index: usize) -> Option<RegisterDescriptor> {
        self.slots.get(index).map(|s| s.desc.clone())
    }

    fn slot(&self, name: &str) -> Option<&Slot> {
        self.slots.iter().find(|s| s.desc.name == name)
    }

    fn slot_mut(&mut self, name: &str) -> Option<&mut Slot> {
        self.slots.iter_mut().find(|s| s.desc.name == name)
    }

    // ========================================================================
    // Field Setters
    // ========================================================================

    /// Enable or disable polling for a register.
    pub fn set_monitored(&mut self, name: &str, monitored: bool) -> bool {
        match self.slot_mut(name) {
            Some(slot) => {
                slot.desc.monitored = monitored;
                true
            }
            None => false,
        }
    }

    /// Enable change-driven publishing; only valid while monitored.
    pub fn set_on_change(&mut self, name: &str, on_change: bool) -> bool {
        match self.slot_mut(name) {
            Some(slot) if slot.desc.monitored => {
                slot.desc.publish_on_change = on_change;
                true
            }
            _ => false,
        }
    }

    /// Set the change-check cadence; requires monitored and on-change.
    pub fn set_change_check_interval(&mut self, name: &str, interval_s: u32) -> bool {
        match self.slot_mut(name) {
            Some(slot) if slot.desc.monitored && slot.desc.publish_on_change => {
                slot.desc.change_check_interval_s = interval_s;
                true
            }
            _ => false,
        }
    }

    /// Set the heartbeat delay; requires monitored.
    pub fn set_max_publish_delay(&mut self, name: &str, delay_s: u32) -> bool {
        match self.slot_mut(name) {
            Some(slot) if slot.desc.monitored => {
                slot.desc.max_publish_delay_s = delay_s;
                true
            }
            _ => false,
        }
    }

    /// Set the writable flag and write function together; the caller
    /// validates the function code.
    pub fn set_writable(&mut self, name: &str, writable: bool, write_function: u8) -> bool {
        match self.slot_mut(name) {
            Some(slot) => {
                slot.desc.writable = writable;
                slot.desc.write_function = write_function;
                true
            }
            None => false,
        }
    }

    /// Set two's-complement interpretation; Number registers only.
    pub fn set_interpret_as_signed(&mut self, name: &str, signed: bool) -> bool {
        match self.slot_mut(name) {
            Some(slot) if slot.desc.ty == RegisterType::Number => {
                slot.desc.interpret_as_signed = signed;
                true
            }
            _ => false,
        }
    }

    /// Set the multiplicative coefficient; scaled types only, never 0.
    pub fn set_factor(&mut self, name: &str, factor: f64) -> bool {
        match self.slot_mut(name) {
            Some(slot) if factor != 0.0 && slot.desc.ty.supports_scaling() => {
                slot.desc.factor = factor;
                true
            }
            _ => false,
        }
    }

    /// Set the additive coefficient; scaled types only.
    pub fn set_offset(&mut self, name: &str, offset: f64) -> bool {
        match self.slot_mut(name) {
            Some(slot) if slot.desc.ty.supports_scaling() => {
                slot.desc.offset = offset;
                true
            }
            _ => false,
        }
    }

    /// Set the fixed-point fractional digits; scaled types only.
    pub fn set_decimals(&mut self, name: &str, decimals: u8) -> bool {
        match self.slot_mut(name) {
            Some(slot) if slot.desc.ty.supports_scaling() => {
                slot.desc.decimals = decimals;
                true
            }
            _ => false,
        }
    }

    /// Set the word span within the register type's admissible range.
    /// Raw registers always span one word and reject any change.
    pub fn set_word_count(&mut self, name: &str, word_count: u8) -> bool {
        match self.slot_mut(name) {
            Some(slot)
                if slot.desc.ty != RegisterType::Raw
                    && slot.desc.ty.admits_word_count(word_count) =>
            {
                slot.desc.word_count = word_count;
                true
            }
            _ => false,
        }
    }

    // ========================================================================
    // Runtime State (indexed, for the polling engine)
    // ========================================================================

    /// Latest published value at the given index.
    pub fn latest_published_value_at(&self, index: usize) -> Option<&str> {
        self.slots
            .get(index)
            .map(|s| s.runtime.latest_published_value.as_str())
    }

    /// Store the latest published value; rejects overlong strings.
    pub fn set_latest_published_value_at(&mut self, index: usize, value: &str) -> bool {
        match self.slots.get_mut(index) {
            Some(slot) if value.len() <= MAX_LATEST_PUBLISHED_LEN => {
                slot.runtime.latest_published_value.clear();
                slot.runtime.latest_published_value.push_str(value);
                true
            }
            _ => false,
        }
    }

    /// Latest publish time at the given index.
    pub fn latest_published_time_at(&self, index: usize) -> Option<u32> {
        self.slots.get(index).map(|s| s.runtime.latest_published_time_s)
    }

    /// Store the latest publish time.
    pub fn set_latest_published_time_at(&mut self, index: usize, time_s: u32) -> bool {
        match self.slots.get_mut(index) {
            Some(slot) => {
                slot.runtime.latest_published_time_s = time_s;
                true
            }
            None => false,
        }
    }

    /// Pending-retry flag at the given index.
    pub fn must_publish_at(&self, index: usize) -> Option<bool> {
        self.slots.get(index).map(|s| s.runtime.must_publish)
    }

    /// Set the pending-retry flag.
    pub fn set_must_publish_at(&mut self, index: usize, must_publish: bool) -> bool {
        match self.slots.get_mut(index) {
            Some(slot) => {
                slot.runtime.must_publish = must_publish;
                true
            }
            None => false,
        }
    }

    /// Clear the pending-retry flag on every slot after a batch publish
    /// was acknowledged.
    pub fn clear_must_publish(&mut self) {
        for slot in &mut self.slots {
            slot.runtime.must_publish = false;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(name: &str, function: u8, slave: u8, reg: u16) -> RegisterDescriptor {
        RegisterDescriptor::new(name, function, slave, reg, RegisterType::Number)
    }

    #[test]
    fn test_add_and_count() {
        let mut catalog = RegisterCatalog::new();
        assert_eq!(catalog.count(), 0);
        assert!(catalog.add(desc("a", 3, 1, 100)).is_ok());
        assert!(catalog.add(desc("b", 3, 1, 101)).is_ok());
        assert_eq!(catalog.count(), 2);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut catalog = RegisterCatalog::new();
        assert!(catalog.add(desc("a", 3, 1, 100)).is_ok());
        assert_eq!(
            catalog.add(desc("a", 3, 1, 200)),
            Err(CatalogInsertError::DuplicateName)
        );
        assert_eq!(catalog.count(), 1);
    }

    #[test]
    fn test_duplicate_tuple_rejected() {
        let mut catalog = RegisterCatalog::new();
        assert!(catalog.add(desc("a", 3, 1, 100)).is_ok());
        assert_eq!(
            catalog.add(desc("b", 3, 1, 100)),
            Err(CatalogInsertError::DuplicateModbusTuple)
        );
        assert_eq!(catalog.count(), 1);
        // A different function code makes the tuple unique again.
        assert!(catalog.add(desc("b", 4, 1, 100)).is_ok());
    }

    #[test]
    fn test_capacity_bound() {
        let mut catalog = RegisterCatalog::new();
        for i in 0..MAX_REGISTERS_NUM {
            assert!(catalog.add(desc(&format!("r{}", i), 3, 1, i as u16)).is_ok());
        }
        assert_eq!(
            catalog.add(desc("overflow", 3, 1, 9999)),
            Err(CatalogInsertError::Full)
        );
        assert_eq!(catalog.count(), MAX_REGISTERS_NUM);
    }

    #[test]
    fn test_uniqueness_holds_after_any_add_sequence() {
        let mut catalog = RegisterCatalog::new();
        let attempts = [
            desc("a", 3, 1, 1),
            desc("b", 3, 1, 1), // duplicate tuple
            desc("a", 3, 2, 2), // duplicate name
            desc("b", 3, 1, 2),
            desc("c", 3, 1, 2), // duplicate tuple
        ];
        let mut accepted = Vec::new();
        for d in attempts {
            if catalog.add(d.clone()).is_ok() {
                accepted.push(d);
            }
        }
        assert_eq!(catalog.count(), accepted.len());
        for d in &accepted {
            assert_eq!(catalog.find(&d.name).unwrap().modbus_tuple(), d.modbus_tuple());
        }
    }

    #[test]
    fn test_remove() {
        let mut catalog = RegisterCatalog::new();
        catalog.add(desc("a", 3, 1, 100)).unwrap();
        assert!(catalog.remove("a"));
        assert!(!catalog.remove("a"));
        assert_eq!(catalog.count(), 0);
        // The freed name and tuple can be reused.
        assert!(catalog.add(desc("a", 3, 1, 100)).is_ok());
    }

    #[test]
    fn test_find_and_lookup_by_modbus() {
        let mut catalog = RegisterCatalog::new();
        catalog.add(desc("a", 3, 1, 100)).unwrap();
        assert_eq!(catalog.find("a").unwrap().reg_id, 100);
        assert!(catalog.find("missing").is_none());
        assert_eq!(catalog.find_by_modbus(3, 1, 100).unwrap().name, "a");
        assert!(catalog.find_by_modbus(4, 1, 100).is_none());
    }

    #[test]
    fn test_insertion_order_iteration() {
        let mut catalog = RegisterCatalog::new();
        catalog.add(desc("first", 3, 1, 1)).unwrap();
        catalog.add(desc("second", 3, 1, 2)).unwrap();
        catalog.add(desc("third", 3, 1, 3)).unwrap();
        catalog.remove("second");
        assert_eq!(catalog.at(0).unwrap().name, "first");
        assert_eq!(catalog.at(1).unwrap().name, "third");
        assert!(catalog.at(2).is_none());
    }

    #[test]
    fn test_lookups_return_copies() {
        let mut catalog = RegisterCatalog::new();
        catalog.add(desc("a", 3, 1, 100)).unwrap();
        let mut copy = catalog.find("a").unwrap();
        copy.monitored = true;
        assert!(!catalog.find("a").unwrap().monitored);
    }

    #[test]
    fn test_monitoring_setter_chain() {
        let mut catalog = RegisterCatalog::new();
        catalog.add(desc("a", 3, 1, 100)).unwrap();

        // On-change and intervals are inert until monitored.
        assert!(!catalog.set_on_change("a", true));
        assert!(!catalog.set_max_publish_delay("a", 10));

        assert!(catalog.set_monitored("a", true));
        assert!(!catalog.set_change_check_interval("a", 5));
        assert!(catalog.set_on_change("a", true));
        assert!(catalog.set_change_check_interval("a", 5));
        assert!(catalog.set_max_publish_delay("a", 60));

        let d = catalog.find("a").unwrap();
        assert!(d.monitored && d.publish_on_change);
        assert_eq!(d.change_check_interval_s, 5);
        assert_eq!(d.max_publish_delay_s, 60);
    }

    #[test]
    fn test_signed_only_for_number() {
        let mut catalog = RegisterCatalog::new();
        catalog.add(desc("n", 3, 1, 1)).unwrap();
        catalog
            .add(RegisterDescriptor::new("f", 3, 1, 2, RegisterType::Float))
            .unwrap();
        catalog
            .add(RegisterDescriptor::new("r", 3, 1, 3, RegisterType::Raw))
            .unwrap();

        assert!(catalog.set_interpret_as_signed("n", true));
        assert!(!catalog.set_interpret_as_signed("f", true));
        assert!(!catalog.set_interpret_as_signed("r", true));
    }

    #[test]
    fn test_scaling_setters() {
        let mut catalog = RegisterCatalog::new();
        catalog.add(desc("n", 3, 1, 1)).unwrap();
        catalog
            .add(RegisterDescriptor::new("s", 3, 1, 2, RegisterType::Str))
            .unwrap();

        assert!(catalog.set_factor("n", 0.5));
        assert!(!catalog.set_factor("n", 0.0));
        assert!(catalog.set_offset("n", -2.0));
        assert!(catalog.set_decimals("n", 3));

        assert!(!catalog.set_factor("s", 0.5));
        assert!(!catalog.set_offset("s", 1.0));
        assert!(!catalog.set_decimals("s", 1));
    }

    #[test]
    fn test_word_count_setter() {
        let mut catalog = RegisterCatalog::new();
        catalog.add(desc("n", 3, 1, 1)).unwrap();
        catalog
            .add(RegisterDescriptor::new("f", 3, 1, 2, RegisterType::Float))
            .unwrap();
        catalog
            .add(RegisterDescriptor::new("s", 3, 1, 3, RegisterType::Str))
            .unwrap();
        catalog
            .add(RegisterDescriptor::new("r", 3, 1, 4, RegisterType::Raw))
            .unwrap();

        assert!(catalog.set_word_count("n", 4));
        assert!(!catalog.set_word_count("n", 5));
        assert!(catalog.set_word_count("f", 4));
        assert!(!catalog.set_word_count("f", 3));
        assert!(catalog.set_word_count("s", 10));
        assert!(!catalog.set_word_count("s", 11));
        assert!(!catalog.set_word_count("r", 1));
    }

    #[test]
    fn test_runtime_state_by_index() {
        let mut catalog = RegisterCatalog::new();
        catalog.add(desc("a", 3, 1, 100)).unwrap();

        assert_eq!(catalog.latest_published_value_at(0), Some(""));
        assert_eq!(catalog.latest_published_time_at(0), Some(0));
        assert_eq!(catalog.must_publish_at(0), Some(false));

        assert!(catalog.set_latest_published_value_at(0, "42.5"));
        assert!(catalog.set_latest_published_time_at(0, 17));
        assert!(catalog.set_must_publish_at(0, true));

        assert_eq!(catalog.latest_published_value_at(0), Some("42.5"));
        assert_eq!(catalog.latest_published_time_at(0), Some(17));
        assert_eq!(catalog.must_publish_at(0), Some(true));

        assert!(catalog.latest_published_value_at(1).is_none());
        assert!(!catalog.set_latest_published_time_at(1, 1));
    }

    #[test]
    fn test_latest_value_length_bound() {
        let mut catalog = RegisterCatalog::new();
        catalog.add(desc("a", 3, 1, 100)).unwrap();
        let exact = "x".repeat(MAX_LATEST_PUBLISHED_LEN);
        assert!(catalog.set_latest_published_value_at(0, &exact));
        let over = "x".repeat(MAX_LATEST_PUBLISHED_LEN + 1);
        assert!(!catalog.set_latest_published_value_at(0, &over));
        assert_eq!(catalog.latest_published_value_at(0), Some(exact.as_str()));
    }

    #[test]
    fn test_runtime_reset_on_recreate() {
        let mut catalog = RegisterCatalog::new();
        catalog.add(desc("a", 3, 1, 100)).unwrap();
        catalog.set_must_publish_at(0, true);
        catalog.set_latest_published_time_at(0, 99);
        catalog.remove("a");
        catalog.add(desc("a", 3, 1, 100)).unwrap();
        assert_eq!(catalog.must_publish_at(0), Some(false));
        assert_eq!(catalog.latest_published_time_at(0), Some(0));
    }

    #[test]
    fn test_clear_must_publish() {
        let mut catalog = RegisterCatalog::new();
        catalog.add(desc("a", 3, 1, 1)).unwrap();
        catalog.add(desc("b", 3, 1, 2)).unwrap();
        catalog.set_must_publish_at(0, true);
        catalog.set_must_publish_at(1, true);
        catalog.clear_must_publish();
        assert_eq!(catalog.must_publish_at(0), Some(false));
        assert_eq!(catalog.must_publish_at(1), Some(false));
    }
}
