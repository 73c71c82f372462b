//! The symbol table contract consumed from semantic analysis: variable,
//! array, function, and user-defined-type symbols, keyed by name.
//!
//! The codegen never mutates this table; it only looks things up by name
//! while lowering a routine.

use crate::types::TypeDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
    Global,
    Function(String),
}

impl Scope {
    pub fn function(name: impl Into<String>) -> Self {
        Scope::Function(name.into())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableSymbol {
    pub name: String,
    pub type_descriptor: TypeDescriptor,
    pub scope: Scope,
    pub is_global: bool,
    pub is_shared: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArraySymbol {
    pub name: String,
    pub element_type: TypeDescriptor,
    pub dimensions: u32,
    pub scope: Scope,
    pub is_global: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionSymbol {
    pub name: String,
    pub parameter_names: Vec<String>,
    pub parameter_types: Vec<TypeDescriptor>,
    pub return_type: TypeDescriptor,
}

/// A single field of a `TYPE ... END TYPE` record, in source order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UdtField {
    pub name: String,
    pub type_descriptor: TypeDescriptor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeSymbol {
    pub name: String,
    pub fields: Vec<UdtField>,
    /// Tagged by the frontend when the record should be padded/aligned to
    /// 16 bytes for SIMD-friendly storage.
    pub simd_eligible: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SymbolTable {
    pub variables: HashMap<String, VariableSymbol>,
    pub arrays: HashMap<String, ArraySymbol>,
    pub functions: HashMap<String, FunctionSymbol>,
    pub types: HashMap<String, TypeSymbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn variable(&self, name: &str) -> Option<&VariableSymbol> {
        self.variables.get(name)
    }

    pub fn array(&self, name: &str) -> Option<&ArraySymbol> {
        self.arrays.get(name)
    }

    pub fn function(&self, name: &str) -> Option<&FunctionSymbol> {
        self.functions.get(name)
    }

    pub fn udt(&self, name: &str) -> Option<&TypeSymbol> {
        self.types.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BaseType, TypeDescriptor};

    #[test]
    fn lookups_miss_on_an_empty_table() {
        let table = SymbolTable::new();
        assert!(table.variable("X").is_none());
        assert!(table.array("N").is_none());
        assert!(table.function("FOO").is_none());
        assert!(table.udt("Point").is_none());
    }

    #[test]
    fn variable_lookup_finds_an_inserted_symbol() {
        let mut table = SymbolTable::new();
        table.variables.insert(
            "X".to_string(),
            VariableSymbol {
                name: "X".to_string(),
                type_descriptor: TypeDescriptor::new(BaseType::Integer),
                scope: Scope::Global,
                is_global: true,
                is_shared: false,
            },
        );
        assert!(table.variable("X").is_some());
        assert!(table.variable("Y").is_none());
    }

    #[test]
    fn scope_function_wraps_a_name() {
        let scope = Scope::function("Foo");
        assert_eq!(scope, Scope::Function("Foo".to_string()));
    }
}
