//! Program driver (C7): assembles a whole [`ProgramCfg`] into one QBE IL
//! module.
//!
//! QBE, like most assemblers, wants data before code: this owns the single
//! [`IlBuilder`]/[`NameMangler`] pair for the whole program and is
//! responsible for getting the sections in the right order -- globals and
//! array descriptors, the GOSUB return stack, the DATA segment, the string
//! pool, then `main` followed by every `SUB`/`FUNCTION` in name order.
//! Everything below this module (C1-C6) only ever emits into the builder
//! it's handed; this is the one place that decides emission order for the
//! program as a whole.

use crate::builder::IlBuilder;
use crate::cfg::{ControlFlowGraph, ProgramCfg};
use crate::codegen::cfg_emit::{generate_routine, RoutineKind};
use crate::codegen::context::FunctionContext;
use crate::codegen::RoutineCtx;
use crate::config::{CodegenConfig, GOSUB_STACK_ENTRY_SIZE};
use crate::data::{DataPreprocessorResult, DataValue};
use crate::error::CodeGenError;
use crate::mangle::{FunctionScopeGuard, NameMangler};
use crate::symbols::SymbolTable;
use crate::types::BaseType;

const GOSUB_STACK_LABEL: &str = "gosub_return_stack";
const GOSUB_SP_LABEL: &str = "gosub_return_sp";
const DATA_VALUES_LABEL: &str = "__data_values";
const DATA_POINTER_LABEL: &str = "__data_pointer";
const DATA_START_LABEL: &str = "__data_start";
const DATA_END_CONST_LABEL: &str = "__data_end_const";

/// Drives generation of a whole program's QBE IL text from its CFGs,
/// symbol table, and preprocessed DATA segment.
pub struct ProgramDriver<'a> {
    symbols: &'a SymbolTable,
    config: &'a CodegenConfig,
    data: &'a DataPreprocessorResult,
}

impl<'a> ProgramDriver<'a> {
    pub fn new(symbols: &'a SymbolTable, config: &'a CodegenConfig, data: &'a DataPreprocessorResult) -> Self {
        ProgramDriver { symbols, config, data }
    }

    /// Lower `program` to a complete QBE IL module.
    pub fn generate(&self, program: &ProgramCfg) -> Result<String, CodeGenError> {
        let mut b = IlBuilder::new();
        let mut mangler = NameMangler::new();

        self.emit_globals(&mut b, &mut mangler)?;
        self.emit_gosub_stack(&mut b);
        self.emit_data_segment(&mut b);
        b.emit_pool();

        self.generate_main(&mut b, &mut mangler, &program.main_cfg)?;
        for (name, cfg) in &program.function_cfgs {
            self.generate_named_routine(&mut b, &mut mangler, name, cfg)?;
        }

        b.emit_late_pool();
        Ok(b.finish())
    }

    /// Every global scalar variable plus every array's fixed-layout
    /// descriptor (8-byte base pointer, 4-byte element count: see
    /// [`crate::codegen::expr::array_element_address`]). Arrays get a
    /// descriptor here regardless of BASIC-level scope -- QBE has no
    /// function-local static storage, so a "local" array's descriptor
    /// lives at program scope too; only its contents are (re)allocated
    /// per call via `DIM`.
    fn emit_globals(&self, b: &mut IlBuilder, mangler: &mut NameMangler) -> Result<(), CodeGenError> {
        let mut variables: Vec<_> = self.symbols.variables.values().filter(|v| v.is_global).collect();
        variables.sort_by(|a, b| a.name.cmp(&b.name));
        for symbol in variables {
            let size = if symbol.type_descriptor.is_udt() {
                let udt_name = symbol.type_descriptor.udt_name.as_deref().unwrap_or_default();
                crate::layout::udt_layout(udt_name, self.symbols)?.size
            } else {
                symbol.type_descriptor.size()
            };
            let label = mangler.global_variable(&symbol.name);
            b.data_zero(label.trim_start_matches('$'), size.max(1), false);
        }

        let mut arrays: Vec<_> = self.symbols.arrays.values().collect();
        arrays.sort_by(|a, b| a.name.cmp(&b.name));
        for symbol in arrays {
            let label = mangler.array_descriptor(&symbol.name);
            b.data_zero(label.trim_start_matches('$'), 12, false);
        }
        Ok(())
    }

    /// The software GOSUB return stack (see [`crate::codegen::cfg_emit`]'s
    /// push/pop): `$gosub_return_stack` holds up to `config.gosub_stack_depth`
    /// return-block IDs as words, `$gosub_return_sp` is the next free slot.
    fn emit_gosub_stack(&self, b: &mut IlBuilder) {
        let bytes = self.config.gosub_stack_depth * GOSUB_STACK_ENTRY_SIZE;
        b.data_zero(GOSUB_STACK_LABEL, bytes, false);
        b.data_words(GOSUB_SP_LABEL, &[0], false);
    }

    /// The flattened DATA segment `READ`/`RESTORE` walk (see
    /// [`crate::codegen::stmt::emit_read`]): one 16-byte record per DATA
    /// value (4-byte type tag, 4 bytes padding, 8-byte payload), bracketed
    /// by the three runtime-state globals a `READ`/`RESTORE` pair needs:
    /// `$__data_start` (the cursor's reset value), `$__data_end_const` (the
    /// record count, checked against the cursor before every `READ`), and
    /// `$__data_pointer` itself. String payloads point at a pool entry
    /// registered here, ahead of the pool flush in `generate`. Omitted
    /// entirely when the program has no DATA statements.
    fn emit_data_segment(&self, b: &mut IlBuilder) {
        if self.data.is_empty() {
            return;
        }
        let mut items = Vec::with_capacity(self.data.values.len() * 3);
        for value in &self.data.values {
            items.push(format!("w {}", value.tag()));
            items.push("w 0".to_string());
            match value {
                DataValue::Int(n) => items.push(format!("l {}", n)),
                DataValue::Double(f) => items.push(format!("d {}", data_float_literal(*f))),
                DataValue::Str(s) => {
                    let label = b.register_string(s);
                    items.push(format!("l ${}", label));
                }
            }
        }
        b.raw(&format!("data ${} = {{ {} }}\n", DATA_VALUES_LABEL, items.join(", ")));
        b.data_words(DATA_START_LABEL, &[0], false);
        b.data_words(DATA_END_CONST_LABEL, &[self.data.values.len() as i64], false);
        b.data_words(DATA_POINTER_LABEL, &[0], false);
    }

    fn generate_main(&self, b: &mut IlBuilder, mangler: &mut NameMangler, cfg: &ControlFlowGraph) -> Result<(), CodeGenError> {
        let mut guard = FunctionScopeGuard::enter(mangler, "main", &cfg.parameters);
        let mut ctx = RoutineCtx {
            b,
            mangler: &mut guard,
            symbols: self.symbols,
            config: self.config,
            data: self.data,
            fx: FunctionContext::new(cfg.return_type.clone()),
        };
        generate_routine(&mut ctx, cfg, RoutineKind::Main, "main", "main")
    }

    /// A `FUNCTION` returns something other than `VOID`; a `SUB` is a
    /// `FUNCTION` with a `VOID` return type, so the two share one code
    /// path here and only differ in which mangler scheme names them.
    fn generate_named_routine(
        &self,
        b: &mut IlBuilder,
        mangler: &mut NameMangler,
        name: &str,
        cfg: &ControlFlowGraph,
    ) -> Result<(), CodeGenError> {
        let is_sub = cfg.return_type.base_type == BaseType::Void;
        let kind = if is_sub { RoutineKind::Sub } else { RoutineKind::Function };
        let mangled = if is_sub { mangler.sub_name(name) } else { mangler.function_name(name) };
        let qbe_name = mangled.trim_start_matches('$').to_string();

        let mut guard = FunctionScopeGuard::enter(mangler, name, &cfg.parameters);
        let mut ctx = RoutineCtx {
            b,
            mangler: &mut guard,
            symbols: self.symbols,
            config: self.config,
            data: self.data,
            fx: FunctionContext::new(cfg.return_type.clone()),
        };
        generate_routine(&mut ctx, cfg, kind, name, &qbe_name)
    }
}

/// QBE `data` float literals are plain (no `d_`/`s_` prefix, unlike the
/// instruction-operand immediates `format_float_literal` in [`crate::codegen::expr`]
/// produces).
fn data_float_literal(value: f64) -> String {
    if value.fract() == 0.0 && value.is_finite() {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::BasicBlock;
    use crate::symbols::{Scope, VariableSymbol};
    use crate::types::TypeDescriptor;

    fn empty_cfg() -> ControlFlowGraph {
        ControlFlowGraph {
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
        }
    }

    #[test]
    fn empty_program_emits_a_runnable_main() {
        let symbols = SymbolTable::new();
        let config = CodegenConfig::new();
        let data = DataPreprocessorResult::default();
        let driver = ProgramDriver::new(&symbols, &config, &data);

        let program = ProgramCfg {
            main_cfg: empty_cfg(),
            function_cfgs: Default::default(),
        };
        let ir = driver.generate(&program).expect("generation succeeds");
        assert!(ir.contains("function w $main("));
        assert!(ir.contains("data $gosub_return_stack"));
        assert!(ir.contains("data $gosub_return_sp"));
        assert!(!ir.contains(DATA_VALUES_LABEL));
    }

    #[test]
    fn global_variables_get_zero_initialized_data() {
        let mut symbols = SymbolTable::new();
        symbols.variables.insert(
            "X".to_string(),
            VariableSymbol {
                name: "X".to_string(),
                type_descriptor: TypeDescriptor::new(BaseType::Integer),
                scope: Scope::Global,
                is_global: true,
                is_shared: false,
            },
        );
        let config = CodegenConfig::new();
        let data = DataPreprocessorResult::default();
        let driver = ProgramDriver::new(&symbols, &config, &data);

        let program = ProgramCfg {
            main_cfg: empty_cfg(),
            function_cfgs: Default::default(),
        };
        let ir = driver.generate(&program).expect("generation succeeds");
        assert!(ir.contains("data $var_X = { z 4 }"));
    }

    #[test]
    fn data_segment_round_trips_every_value_kind() {
        let symbols = SymbolTable::new();
        let config = CodegenConfig::new();
        let data = DataPreprocessorResult {
            values: vec![DataValue::Int(42), DataValue::Double(3.5), DataValue::Str("hi".to_string())],
            label_restore_points: Default::default(),
            line_restore_points: Default::default(),
        };
        let driver = ProgramDriver::new(&symbols, &config, &data);

        let program = ProgramCfg {
            main_cfg: empty_cfg(),
            function_cfgs: Default::default(),
        };
        let ir = driver.generate(&program).expect("generation succeeds");
        assert!(ir.contains("data $__data_values = { w 0, w 0, l 42, w 1, w 0, d 3.5, w 2, w 0, l $str_0 }"));
        assert!(ir.contains("data $__data_start = { w 0 }"));
        assert!(ir.contains("data $__data_end_const = { w 3 }"));
        assert!(ir.contains("data $__data_pointer = { w 0 }"));
        assert!(ir.contains("b \"hi\""));
    }

    #[test]
    fn unconditional_exit_block_with_no_out_edges_closes_main() {
        let symbols = SymbolTable::new();
        let config = CodegenConfig::new();
        let data = DataPreprocessorResult::default();
        let driver = ProgramDriver::new(&symbols, &config, &data);

        // A one-block program: the entry block has no out edges at all.
        let program = ProgramCfg {
            main_cfg: empty_cfg(),
            function_cfgs: Default::default(),
        };
        let ir = driver.generate(&program).expect("generation succeeds");
        assert!(ir.contains("ret 0"));
    }
}
