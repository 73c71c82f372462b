//! Code generation configuration.
//!
//! Knobs that affect emitted IL but aren't part of any single AST node:
//! the GOSUB return-stack capacity, whether array bounds checks are
//! emitted, and so on. Mirrors the extensibility shape of a compiler
//! config object -- construct one, override what you need, pass it
//! through to the driver -- without pulling in a CLI or file format to
//! populate it (both are out of scope for this crate).

/// Default depth of the GOSUB return stack. See the open design question
/// on overflow: this crate does not insert a bounds check on the push path
/// by default (see [`CodegenConfig::check_gosub_stack_overflow`]).
pub const DEFAULT_GOSUB_STACK_DEPTH: u32 = 16;

/// Byte size of one GOSUB return-stack entry (a block ID stored as a word).
pub const GOSUB_STACK_ENTRY_SIZE: u32 = 4;

#[derive(Debug, Clone)]
pub struct CodegenConfig {
    /// Capacity of `$gosub_return_stack`, in entries.
    pub gosub_stack_depth: u32,
    /// Emit `rt_array_bounds_check` calls before array element addressing.
    /// Semantic analysis marks which accesses require it; this is a global
    /// kill switch on top of that, primarily for test fixtures that don't
    /// carry that annotation.
    pub bounds_checks_enabled: bool,
    /// Insert a runtime check on the GOSUB stack push path rather than
    /// writing past the configured capacity blindly. Off by default to
    /// match the documented (if latent) current behavior; see the open
    /// design question on GOSUB stack overflow.
    pub check_gosub_stack_overflow: bool,
    /// Keep the array-element base-address cache (the workaround for the
    /// documented backend miscompilation of repeated index*size
    /// computations). Only disable this after empirically proving the
    /// miscompilation absent on the target QBE build in use.
    pub array_element_cache_enabled: bool,
}

impl CodegenConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gosub_stack_depth(mut self, depth: u32) -> Self {
        self.gosub_stack_depth = depth;
        self
    }

    pub fn with_bounds_checks(mut self, enabled: bool) -> Self {
        self.bounds_checks_enabled = enabled;
        self
    }

    pub fn with_gosub_overflow_check(mut self, enabled: bool) -> Self {
        self.check_gosub_stack_overflow = enabled;
        self
    }
}

impl Default for CodegenConfig {
    fn default() -> Self {
        CodegenConfig {
            gosub_stack_depth: DEFAULT_GOSUB_STACK_DEPTH,
            bounds_checks_enabled: true,
            check_gosub_stack_overflow: false,
            array_element_cache_enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_methods_chain() {
        let cfg = CodegenConfig::new()
            .with_gosub_stack_depth(32)
            .with_bounds_checks(false)
            .with_gosub_overflow_check(true);
        assert_eq!(cfg.gosub_stack_depth, 32);
        assert!(!cfg.bounds_checks_enabled);
        assert!(cfg.check_gosub_stack_overflow);
    }
}
