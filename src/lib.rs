//! BASIC-to-QBE code generation backend.
//!
//! Takes the output of semantic analysis -- a [`symbols::SymbolTable`], a
//! [`cfg::ProgramCfg`] (one CFG per routine plus `main`), and a flattened
//! [`data::DataPreprocessorResult`] for `DATA`/`READ`/`RESTORE` -- and lowers
//! it to a complete QBE IL module, ready to hand to `qbe` and then an
//! assembler/linker. Parsing, semantic analysis, and the DATA preprocessor
//! pass itself are out of scope for this crate.

pub mod ast;
pub mod builder;
pub mod cfg;
pub mod codegen;
pub mod config;
pub mod data;
pub mod driver;
pub mod error;
pub mod layout;
pub mod mangle;
pub mod runtime;
pub mod symbols;
pub mod types;

pub use cfg::ProgramCfg;
pub use config::CodegenConfig;
pub use data::DataPreprocessorResult;
pub use error::CodeGenError;
pub use symbols::SymbolTable;

use driver::ProgramDriver;

/// Generate a complete QBE IL module for `program`.
///
/// This is the crate's single entry point; everything under [`codegen`] is
/// reached through [`driver::ProgramDriver`], which owns the emission order
/// for the program as a whole.
pub fn generate(
    program: &ProgramCfg,
    symbols: &SymbolTable,
    data: &DataPreprocessorResult,
    config: &CodegenConfig,
) -> Result<String, CodeGenError> {
    ProgramDriver::new(symbols, config, data).generate(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfg::{BasicBlock, ControlFlowGraph};
    use types::{BaseType, TypeDescriptor};

    #[test]
    fn generate_on_an_empty_program_produces_a_main_function() {
        let program = ProgramCfg {
            main_cfg: ControlFlowGraph {
                blocks: vec![BasicBlock {
                    id: 0,
                    label: "entry".to_string(),
                    statements: vec![],
                    loop_header: None,
                    predecessors: vec![],
                    successors: vec![],
                }],
                edges: vec![],
                entry_block: 0,
                parameters: vec![],
                gosub_return_blocks: Default::default(),
                return_type: TypeDescriptor::new(BaseType::Void),
            },
            function_cfgs: Default::default(),
        };
        let symbols = SymbolTable::new();
        let data = DataPreprocessorResult::default();
        let config = CodegenConfig::new();

        let ir = generate(&program, &symbols, &data, &config).expect("generation succeeds");
        assert!(ir.contains("$main"));
    }
}
