//! The statement/expression emitter (C5) and CFG emitter (C6), plus the
//! scoped context ([`context`]) they share.
//!
//! Both halves are free functions taking `&mut RoutineCtx` rather than
//! methods on a god-object, so the borrow checker sees exactly which piece
//! of per-routine state each call touches.

pub mod cfg_emit;
pub mod context;
pub mod expr;
pub mod stmt;

use crate::builder::IlBuilder;
use crate::config::CodegenConfig;
use crate::data::DataPreprocessorResult;
use crate::mangle::NameMangler;
use crate::symbols::SymbolTable;
use context::FunctionContext;

/// Everything one routine's codegen needs, bundled so call sites pass one
/// argument instead of five. Lives exactly as long as the routine being
/// generated; `fx` is rebuilt fresh per routine, the rest are shared across
/// the whole program.
pub struct RoutineCtx<'a> {
    pub b: &'a mut IlBuilder,
    pub mangler: &'a mut NameMangler,
    pub symbols: &'a SymbolTable,
    pub config: &'a CodegenConfig,
    pub data: &'a DataPreprocessorResult,
    pub fx: FunctionContext,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BaseType, TypeDescriptor};

    #[test]
    fn routine_ctx_bundles_the_five_shared_pieces() {
        let mut b = IlBuilder::new();
        let mut mangler = NameMangler::new();
        let symbols = SymbolTable::new();
        let config = CodegenConfig::new();
        let data = DataPreprocessorResult::default();
        let fx = FunctionContext::new(TypeDescriptor::new(BaseType::Integer));

        let ctx = RoutineCtx {
            b: &mut b,
            mangler: &mut mangler,
            symbols: &symbols,
            config: &config,
            data: &data,
            fx,
        };

        assert!(ctx.fx.locals.is_empty());
        assert!(ctx.symbols.variable("X").is_none());
    }
}
