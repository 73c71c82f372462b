//! Per-routine scoped state shared by the expression/statement emitter
//! (C5) and the CFG emitter (C6): the global-address cache, the FOR-loop
//! temp cache, and the array-element base-address cache, all of which are
//! created on function entry and discarded on function exit.

use crate::types::TypeDescriptor;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone)]
pub struct VariableSlot {
    /// The mangled stack-slot name (locals/parameters) or data symbol
    /// (globals) this variable lives at.
    pub address: String,
    pub type_descriptor: TypeDescriptor,
    pub is_global: bool,
}

#[derive(Debug, Clone)]
pub struct ForLoopTemps {
    pub limit_slot: String,
    pub step_slot: String,
    /// Holds 1 for ascending (step >= 0), 0 for descending, computed at
    /// init time when the step isn't a compile-time constant.
    pub direction_slot: String,
}

/// Scope alive for exactly one routine's codegen. Constructed on function
/// entry, discarded on exit; callers should drop it (or let it go out of
/// scope) immediately after `emitFunction`/`emitSub` returns, including on
/// error paths.
#[derive(Default)]
pub struct FunctionContext {
    pub locals: HashMap<String, VariableSlot>,
    pub global_address_cache: HashMap<String, String>,
    pub for_loop_temps: HashMap<String, ForLoopTemps>,
    /// `"arrayName:serializedIndex" -> stack slot holding the element
    /// address`. Cleared at each statement boundary and invalidated
    /// wherever the statement emitter determines array contents or an
    /// index variable may have changed.
    pub array_element_cache: HashMap<String, String>,
    pub emitted_block_ids: HashSet<usize>,
    /// Condition temp stashed by a loop header, consumed by the very next
    /// terminator emission.
    pub pending_condition: Option<String>,
    pub return_type: TypeDescriptor,
    pub return_slot: Option<String>,
}

impl FunctionContext {
    pub fn new(return_type: TypeDescriptor) -> Self {
        FunctionContext {
            return_type,
            ..Default::default()
        }
    }

    /// Invalidation rule for the array-element cache: clear it wholesale
    /// at every statement boundary (the exact invalidation condition from
    /// the design -- "any assignment that could change array contents or
    /// index variable values" -- is approximated conservatively here by a
    /// full clear rather than tracking aliasing, which the design flags as
    /// a known under-approximation risk in the other direction).
    pub fn clear_array_element_cache(&mut self) {
        self.array_element_cache.clear();
    }

    pub fn cache_key(array_name: &str, serialized_index: &str) -> String {
        format!("{}:{}", array_name, serialized_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BaseType;

    #[test]
    fn new_carries_the_return_type_and_starts_empty() {
        let fx = FunctionContext::new(TypeDescriptor::new(BaseType::Long));
        assert_eq!(fx.return_type.base_type, BaseType::Long);
        assert!(fx.locals.is_empty());
        assert!(fx.array_element_cache.is_empty());
    }

    #[test]
    fn clear_array_element_cache_empties_it() {
        let mut fx = FunctionContext::new(TypeDescriptor::new(BaseType::Integer));
        fx.array_element_cache.insert("A:0".to_string(), "%slot".to_string());
        fx.clear_array_element_cache();
        assert!(fx.array_element_cache.is_empty());
    }

    #[test]
    fn cache_key_joins_array_and_index() {
        assert_eq!(FunctionContext::cache_key("A", "0,1"), "A:0,1");
    }
}
