//! CFG walk and terminator emission (C6): turns a [`ControlFlowGraph`] into
//! a QBE function body, one basic block at a time, in ID order.
//!
//! `emit_statement` (see [`super::stmt`]) only ever emits instructions that
//! belong to a block's own body; everything about how a block *ends* --
//! which edge to take, whether a FOR increment or a GOSUB push/pop belongs
//! here -- is decided in this module by combining three things the CFG
//! carries: the block's trailing statement, its `loop_header` tag, and its
//! outgoing edges.

use super::context::VariableSlot;
use super::stmt;
use super::RoutineCtx;
use crate::ast::{Expression, Statement};
use crate::builder::{Align, ComparePred};
use crate::cfg::{BasicBlock, BlockId, CfgEdge, ControlFlowGraph, EdgeType, LoopHeaderKind};
use crate::codegen::expr::emit_expression_as;
use crate::error::CodeGenError;
use crate::runtime::RuntimeShim;
use crate::types::{BaseType, QbeType, TypeDescriptor};

/// Which calling convention a routine's entry/exit follows. `Main` always
/// returns a word exit code regardless of the BASIC program's declared
/// type; `Sub` never returns a value; `Function` follows the CFG's
/// `return_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutineKind {
    Main,
    Sub,
    Function,
}

fn zero_literal(ty: QbeType) -> &'static str {
    match ty {
        QbeType::W | QbeType::L => "0",
        QbeType::S => "s_0.0",
        QbeType::D => "d_0.0",
    }
}

/// The QBE label text for block `id`: always `block_<id>`, kept strictly
/// separate from `NameMangler::label`'s `line_<digits>`/`label_<sanitized>`
/// scheme for BASIC-level GOTO/GOSUB text. A block's own `label` field is a
/// free-form debug string with no uniqueness guarantee across a routine (two
/// `FOR` loops both head a block debug-labeled `"for_header"`, say), so only
/// the numeric ID is safe to key a block-entry/jump-target label on.
fn block_label(id: BlockId) -> String {
    format!("block_{}", id)
}

/// Locate the `FOR` statement that initialized the loop `header_id` heads,
/// by walking to the predecessor whose last statement is that `FOR`. Used
/// both for the header's condition and for deciding which predecessor edge
/// is the init edge (skip the increment) versus the back edge (emit it).
fn for_init_statement<'a>(cfg: &'a ControlFlowGraph, header_id: BlockId) -> Option<(&'a str, Option<&'a Expression>)> {
    let header = cfg.block(header_id)?;
    for &pred_id in &header.predecessors {
        let pred = cfg.block(pred_id)?;
        if let Some(Statement::For { variable, step, .. }) = pred.statements.last() {
            return Some((variable.as_str(), step.as_ref()));
        }
    }
    None
}

/// Lowers one routine's entire CFG into an open/emit/close `IlBuilder`
/// function. `qbe_name` is the bare (no sigil) mangled function name;
/// `routine_name` is its BASIC-level name, needed to name and alias the
/// FUNCTION return-value shadow local (design 4.2); caller owns the
/// `NameMangler` scope (see [`crate::mangle::FunctionScopeGuard`]).
pub fn generate_routine(
    ctx: &mut RoutineCtx<'_>,
    cfg: &ControlFlowGraph,
    kind: RoutineKind,
    routine_name: &str,
    qbe_name: &str,
) -> Result<(), CodeGenError> {
    let return_type = match kind {
        RoutineKind::Main => Some(QbeType::W),
        RoutineKind::Sub => None,
        RoutineKind::Function => {
            if cfg.return_type.base_type == BaseType::Void {
                None
            } else {
                Some(cfg.return_type.qbe_type())
            }
        }
    };

    let mut param_list = Vec::with_capacity(cfg.parameters.len());
    let mut param_info = Vec::with_capacity(cfg.parameters.len());
    for raw_name in &cfg.parameters {
        let symbol = ctx
            .symbols
            .variable(raw_name)
            .ok_or_else(|| CodeGenError::undefined_variable(raw_name))?;
        let ty = symbol.type_descriptor.clone();
        let slot = ctx.mangler.local_variable(raw_name);
        let bare_in = format!("{}_in", slot.trim_start_matches('%'));
        param_list.push((ty.qbe_type(), bare_in.clone()));
        param_info.push((raw_name.clone(), ty, slot, bare_in));
    }

    ctx.b.open_function(qbe_name, return_type, &param_list);
    ctx.b.emit_label("routine_entry");

    for (raw_name, ty, slot, bare_in) in &param_info {
        ctx.b.alloc_named(slot, Align::for_size(ty.size().max(1)), ty.size().max(1));
        ctx.b.store(ty.qbe_type(), &format!("%{}", bare_in), slot);
        ctx.fx.locals.insert(
            raw_name.clone(),
            VariableSlot {
                address: slot.clone(),
                type_descriptor: ty.clone(),
                is_global: false,
            },
        );
    }

    emit_local_declarations(ctx, cfg)?;

    if matches!(kind, RoutineKind::Function) && return_type.is_some() {
        let rt = cfg.return_type.clone();
        // BASIC lets a FUNCTION body assign to its own name to set the
        // return value; the shadow local carries the name+suffix design
        // 4.2 specifies so it reads like any other typed local in a dump
        // of the emitted IL, and is aliased under the routine's own name
        // below so an ordinary `LET <FunctionName> = ...` just works.
        let shadow_name = format!("{}{}", routine_name, crate::types::return_suffix(&rt));
        let slot = ctx.mangler.local_variable(&shadow_name);
        ctx.b.alloc_named(&slot, Align::for_size(rt.size().max(1)), rt.size().max(1));
        let zero = ctx.b.copy(rt.qbe_type(), zero_literal(rt.qbe_type()));
        ctx.b.store(rt.qbe_type(), &zero, &slot);
        ctx.fx.return_slot = Some(slot.clone());
        ctx.fx.locals.insert(
            routine_name.to_string(),
            VariableSlot {
                address: slot,
                type_descriptor: rt,
                is_global: false,
            },
        );
    }

    let entry_label = block_label(cfg.entry_block);
    ctx.b.jmp(&entry_label);

    for block in cfg.blocks_in_id_order() {
        let label = block_label(block.id);
        ctx.b.emit_label(&label);
        for stmt_node in &block.statements {
            stmt::emit_statement(ctx, stmt_node)?;
        }
        emit_terminator(ctx, cfg, block, kind)?;
    }

    ctx.b.close_function();
    Ok(())
}

/// Entry-block allocation for every `LOCAL` declaration anywhere in the
/// routine (BASIC allows `LOCAL` mid-body; the slot itself still lives for
/// the whole function, matching the documented "allocate once, in the
/// entry block" rule). Parameters are skipped since they already have a
/// slot from the parameter loop.
fn emit_local_declarations(ctx: &mut RoutineCtx<'_>, cfg: &ControlFlowGraph) -> Result<(), CodeGenError> {
    let mut seen = std::collections::HashSet::new();
    for block in &cfg.blocks {
        for stmt_node in &block.statements {
            let Statement::Local { name, type_descriptor } = stmt_node else {
                continue;
            };
            if ctx.fx.locals.contains_key(name) || !seen.insert(name.clone()) {
                continue;
            }
            let slot = ctx.mangler.local_variable(name);
            let size = if type_descriptor.is_udt() {
                let udt_name = type_descriptor.udt_name.as_deref().unwrap_or_default();
                crate::layout::udt_layout(udt_name, ctx.symbols)?.size
            } else {
                type_descriptor.size()
            };
            ctx.b.alloc_named(&slot, Align::for_size(size.max(1)), size.max(1));
            if type_descriptor.is_udt() {
                RuntimeShim::memset(ctx.b, &slot, 0, size);
            } else {
                let zero = ctx.b.copy(type_descriptor.qbe_type(), zero_literal(type_descriptor.qbe_type()));
                ctx.b.store(type_descriptor.qbe_type(), &zero, &slot);
            }
            ctx.fx.locals.insert(
                name.clone(),
                VariableSlot {
                    address: slot,
                    type_descriptor: type_descriptor.clone(),
                    is_global: false,
                },
            );
        }
    }
    Ok(())
}

// -- terminator dispatch ----------------------------------------------------

fn emit_terminator(
    ctx: &mut RoutineCtx<'_>,
    cfg: &ControlFlowGraph,
    block: &BasicBlock,
    kind: RoutineKind,
) -> Result<(), CodeGenError> {
    match block.statements.last() {
        Some(Statement::OnGoto { .. }) => return emit_on_goto(ctx, cfg, block),
        Some(Statement::OnGosub { .. }) => return emit_on_gosub(ctx, cfg, block),
        Some(Statement::OnCall { .. }) => return emit_on_call(ctx, cfg, block),
        _ => {}
    }

    let out_edges = cfg.out_edges(block.id);

    if out_edges.iter().any(|e| e.edge_type == EdgeType::Return) {
        return emit_gosub_return(ctx, cfg);
    }

    match out_edges.len() {
        0 => emit_routine_exit(ctx, block, kind),
        1 if out_edges[0].edge_type == EdgeType::Call => emit_gosub_call(ctx, cfg, out_edges[0]),
        1 => {
            let target = out_edges[0].target;
            maybe_emit_for_increment(ctx, cfg, block, target)?;
            let label = block_label(target);
            ctx.b.jmp(&label);
            Ok(())
        }
        2 => emit_conditional(ctx, cfg, block, &out_edges),
        _ => emit_fallback_switch(ctx, cfg, &out_edges),
    }
}

fn emit_routine_exit(ctx: &mut RoutineCtx<'_>, block: &BasicBlock, kind: RoutineKind) -> Result<(), CodeGenError> {
    if let Some(Statement::Return { value }) = block.statements.last() {
        stmt::emit_function_return(ctx, value.as_ref())?;
    }
    if matches!(kind, RoutineKind::Main) {
        ctx.b.ret(Some("0"));
        return Ok(());
    }
    match ctx.fx.return_slot.clone() {
        Some(slot) => {
            let rt = ctx.fx.return_type.clone();
            let value = ctx.b.load(rt.qbe_type(), &slot);
            ctx.b.ret(Some(&value));
        }
        None => ctx.b.ret(None),
    }
    Ok(())
}

/// Back edge into a `FOR` loop header: run the increment unless this edge
/// *is* the loop's init edge (the `FOR` statement's own fallthrough into
/// its header, which must not be incremented before the first test).
fn maybe_emit_for_increment(
    ctx: &mut RoutineCtx<'_>,
    cfg: &ControlFlowGraph,
    block: &BasicBlock,
    target: BlockId,
) -> Result<(), CodeGenError> {
    let Some(target_block) = cfg.block(target) else {
        return Ok(());
    };
    if target_block.loop_header != Some(LoopHeaderKind::ForHeader) {
        return Ok(());
    }
    if matches!(block.statements.last(), Some(Statement::For { .. })) {
        return Ok(()); // this is the init edge, not the back edge.
    }
    if let Some((variable, _step)) = for_init_statement(cfg, target) {
        stmt::emit_for_increment(ctx, variable)?;
    }
    Ok(())
}

fn emit_conditional(
    ctx: &mut RoutineCtx<'_>,
    cfg: &ControlFlowGraph,
    block: &BasicBlock,
    out_edges: &[&CfgEdge],
) -> Result<(), CodeGenError> {
    let true_edge = out_edges
        .iter()
        .find(|e| e.edge_type == EdgeType::ConditionalTrue)
        .ok_or_else(|| CodeGenError::malformed_cfg("conditional block missing a true edge"))?;
    let false_edge = out_edges
        .iter()
        .find(|e| e.edge_type == EdgeType::ConditionalFalse)
        .ok_or_else(|| CodeGenError::malformed_cfg("conditional block missing a false edge"))?;

    let condition = if block.loop_header == Some(LoopHeaderKind::ForHeader) {
        let (variable, step) = for_init_statement(cfg, block.id)
            .ok_or_else(|| CodeGenError::malformed_cfg("FOR header has no matching FOR init block"))?;
        stmt::emit_for_condition(ctx, variable, step)?
    } else {
        match block.statements.last() {
            Some(Statement::If { condition }) | Some(Statement::While { condition }) => {
                stmt::emit_branch_condition(ctx, condition)?
            }
            Some(Statement::Do { condition: Some(condition) }) => stmt::emit_branch_condition(ctx, condition)?,
            Some(Statement::Case { selector }) => emit_case_condition(ctx, selector, true_edge)?,
            other => {
                return Err(CodeGenError::malformed_cfg(format!(
                    "block with two conditional out-edges has no recognized condition statement: {:?}",
                    other
                )))
            }
        }
    };

    let true_label = block_label(true_edge.target);
    let false_label = block_label(false_edge.target);
    ctx.b.jnz(&condition, &true_label, &false_label);
    Ok(())
}

/// `SELECT CASE` is lowered by the CFG as a ladder of one block per arm,
/// each comparing the selector against the value carried on its
/// `ConditionalTrue` edge's `label`.
fn emit_case_condition(ctx: &mut RoutineCtx<'_>, selector: &Expression, true_edge: &CfgEdge) -> Result<String, CodeGenError> {
    let selector_v = emit_expression_as(ctx, selector, &TypeDescriptor::new(BaseType::Integer))?;
    let literal = true_edge
        .label
        .as_deref()
        .ok_or_else(|| CodeGenError::malformed_cfg("CASE conditional edge missing its comparison value"))?;
    Ok(ctx.b.compare(ComparePred::Eq, QbeType::W, &selector_v, literal))
}

fn emit_fallback_switch(ctx: &mut RoutineCtx<'_>, cfg: &ControlFlowGraph, out_edges: &[&CfgEdge]) -> Result<(), CodeGenError> {
    ctx.b
        .error_comment("more than two outgoing edges with no recognized dispatch statement; falling through to the first");
    match out_edges.first() {
        Some(edge) => {
            let label = block_label(edge.target);
            ctx.b.jmp(&label);
        }
        None => ctx.b.ret(None),
    }
    Ok(())
}

// -- GOSUB push / pop --------------------------------------------------------

fn gosub_push(ctx: &mut RoutineCtx<'_>, return_block_id: BlockId) -> Result<(), CodeGenError> {
    let sp = ctx.b.load(QbeType::W, "$gosub_return_sp");
    if ctx.config.check_gosub_stack_overflow {
        let capacity = ctx.config.gosub_stack_depth.to_string();
        RuntimeShim::array_bounds_check(ctx.b, &sp, &capacity);
    }
    let sp_l = ctx.b.convert("extsw", QbeType::L, &sp);
    let offset = ctx.b.binary("mul", QbeType::L, &sp_l, "4");
    let addr = ctx.b.binary("add", QbeType::L, "$gosub_return_stack", &offset);
    ctx.b.store(QbeType::W, &return_block_id.to_string(), &addr);
    let next_sp = ctx.b.binary("add", QbeType::W, &sp, "1");
    ctx.b.store(QbeType::W, &next_sp, "$gosub_return_sp");
    Ok(())
}

fn emit_gosub_call(ctx: &mut RoutineCtx<'_>, cfg: &ControlFlowGraph, edge: &CfgEdge) -> Result<(), CodeGenError> {
    let return_block_id: BlockId = edge
        .label
        .as_deref()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| CodeGenError::malformed_cfg("GOSUB call edge missing its return-block label"))?;
    gosub_push(ctx, return_block_id)?;
    let target_label = block_label(edge.target);
    ctx.b.jmp(&target_label);
    Ok(())
}

/// `RETURN` out of a GOSUB: pop the stack and dispatch to whichever call
/// site pushed it, via a linear comparison chain against every recorded
/// return point. A pop that matches none of them (stack corruption, or a
/// bare `RETURN` outside any `GOSUB`) is a runtime error, not UB.
fn emit_gosub_return(ctx: &mut RoutineCtx<'_>, cfg: &ControlFlowGraph) -> Result<(), CodeGenError> {
    let sp = ctx.b.load(QbeType::W, "$gosub_return_sp");
    let prev_sp = ctx.b.binary("sub", QbeType::W, &sp, "1");
    ctx.b.store(QbeType::W, &prev_sp, "$gosub_return_sp");
    let prev_sp_l = ctx.b.convert("extsw", QbeType::L, &prev_sp);
    let offset = ctx.b.binary("mul", QbeType::L, &prev_sp_l, "4");
    let addr = ctx.b.binary("add", QbeType::L, "$gosub_return_stack", &offset);
    let popped = ctx.b.load(QbeType::W, &addr);

    let mut targets: Vec<BlockId> = cfg.gosub_return_blocks.iter().copied().collect();
    targets.sort_unstable();
    for target in targets {
        let cmp = ctx.b.compare(ComparePred::Eq, QbeType::W, &popped, &target.to_string());
        let match_label = block_label(target);
        let next_label = ctx.mangler.unique_label("gosub_dispatch_next");
        ctx.b.jnz(&cmp, &match_label, &next_label);
        ctx.b.emit_label(&next_label);
    }
    ctx.b.error_comment("RETURN with no matching GOSUB call site");
    RuntimeShim::runtime_error(ctx.b, 1, "0");
    ctx.b.ret(None);
    Ok(())
}

// -- ON GOTO / ON GOSUB / ON CALL --------------------------------------------

fn emit_on_goto(ctx: &mut RoutineCtx<'_>, cfg: &ControlFlowGraph, block: &BasicBlock) -> Result<(), CodeGenError> {
    let Some(Statement::OnGoto { selector, targets }) = block.statements.last() else {
        return Err(CodeGenError::malformed_cfg("emit_on_goto called on a non-ON-GOTO block"));
    };
    let edges = cfg.out_edges(block.id);
    let default_edge = edges
        .iter()
        .find(|e| e.edge_type == EdgeType::Fallthrough)
        .ok_or_else(|| CodeGenError::malformed_cfg("ON GOTO block missing its fallthrough edge"))?;
    let default_label = block_label(default_edge.target);

    let mut cases = vec![default_label.clone(); targets.len()];
    for edge in &edges {
        if edge.edge_type != EdgeType::Jump {
            continue;
        }
        if let Some(idx) = edge.label.as_deref().and_then(|s| s.parse::<usize>().ok()) {
            if idx < cases.len() {
                cases[idx] = block_label(edge.target);
            }
        }
    }

    let selector_v = emit_expression_as(ctx, selector, &TypeDescriptor::new(BaseType::Integer))?;
    let zero_based = ctx.b.binary("sub", QbeType::W, &selector_v, "1");
    ctx.b.emit_switch(&zero_based, &cases, &default_label);
    Ok(())
}

fn emit_on_gosub(ctx: &mut RoutineCtx<'_>, cfg: &ControlFlowGraph, block: &BasicBlock) -> Result<(), CodeGenError> {
    let Some(Statement::OnGosub { selector, targets }) = block.statements.last() else {
        return Err(CodeGenError::malformed_cfg("emit_on_gosub called on a non-ON-GOSUB block"));
    };
    let edges = cfg.out_edges(block.id);
    let default_edge = edges
        .iter()
        .find(|e| e.edge_type == EdgeType::Fallthrough)
        .ok_or_else(|| CodeGenError::malformed_cfg("ON GOSUB block missing its fallthrough edge"))?;
    let default_label = block_label(default_edge.target);
    let return_block = default_edge.target;

    let selector_v = emit_expression_as(ctx, selector, &TypeDescriptor::new(BaseType::Integer))?;
    let zero_based = ctx.b.binary("sub", QbeType::W, &selector_v, "1");

    for idx in 0..targets.len() {
        let cmp = ctx.b.compare(ComparePred::Eq, QbeType::W, &zero_based, &idx.to_string());
        let then_label = ctx.mangler.unique_label("on_gosub_case");
        let next_label = ctx.mangler.unique_label("on_gosub_next");
        ctx.b.jnz(&cmp, &then_label, &next_label);
        ctx.b.emit_label(&then_label);

        let jump_edge = edges
            .iter()
            .find(|e| e.edge_type == EdgeType::Jump && e.label.as_deref() == Some(idx.to_string().as_str()));
        match jump_edge {
            Some(edge) => {
                gosub_push(ctx, return_block)?;
                let target_label = block_label(edge.target);
                ctx.b.jmp(&target_label);
            }
            None => ctx.b.jmp(&default_label),
        }
        ctx.b.emit_label(&next_label);
    }
    ctx.b.jmp(&default_label);
    Ok(())
}

fn emit_on_call(ctx: &mut RoutineCtx<'_>, cfg: &ControlFlowGraph, block: &BasicBlock) -> Result<(), CodeGenError> {
    let Some(Statement::OnCall { selector, targets }) = block.statements.last() else {
        return Err(CodeGenError::malformed_cfg("emit_on_call called on a non-ON-CALL block"));
    };
    let edges = cfg.out_edges(block.id);
    let continue_edge = edges
        .first()
        .ok_or_else(|| CodeGenError::malformed_cfg("ON CALL block missing its continuation edge"))?;
    let continue_label = block_label(continue_edge.target);

    let selector_v = emit_expression_as(ctx, selector, &TypeDescriptor::new(BaseType::Integer))?;
    let zero_based = ctx.b.binary("sub", QbeType::W, &selector_v, "1");

    for (idx, name) in targets.iter().enumerate() {
        ctx.symbols.function(name).ok_or_else(|| CodeGenError::undefined_function(name))?;
        let cmp = ctx.b.compare(ComparePred::Eq, QbeType::W, &zero_based, &idx.to_string());
        let then_label = ctx.mangler.unique_label("on_call_case");
        let next_label = ctx.mangler.unique_label("on_call_next");
        ctx.b.jnz(&cmp, &then_label, &next_label);
        ctx.b.emit_label(&then_label);

        let mangled = ctx.mangler.sub_name(name);
        let callee = mangled.trim_start_matches('$').to_string();
        ctx.b.call(None, &callee, &[]);
        ctx.b.jmp(&continue_label);
        ctx.b.emit_label(&next_label);
    }
    ctx.b.jmp(&continue_label);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_label_is_keyed_on_id_not_the_debug_label() {
        assert_eq!(block_label(0), "block_0");
        assert_eq!(block_label(5), "block_5");
    }

    fn block(id: BlockId, label: &str, statements: Vec<Statement>, predecessors: Vec<BlockId>) -> BasicBlock {
        BasicBlock {
            id,
            label: label.to_string(),
            statements,
            loop_header: None,
            predecessors,
            successors: vec![],
        }
    }

    #[test]
    fn block_label_disambiguates_blocks_sharing_a_debug_label() {
        let a = block(1, "for_header", vec![], vec![]);
        let b = block(2, "for_header", vec![], vec![]);
        assert_ne!(block_label(a.id), block_label(b.id));
    }

    #[test]
    fn zero_literal_picks_the_type_appropriate_spelling() {
        assert_eq!(zero_literal(QbeType::W), "0");
        assert_eq!(zero_literal(QbeType::L), "0");
        assert_eq!(zero_literal(QbeType::D), "d_0.0");
        assert_eq!(zero_literal(QbeType::S), "s_0.0");
    }

    #[test]
    fn for_init_statement_finds_the_predecessor_for_statement() {
        let init_block = block(
            0,
            "for_init",
            vec![Statement::For {
                variable: "I%".to_string(),
                start: Expression::NumberLiteral(crate::ast::NumberLiteral::Int(1)),
                limit: Expression::NumberLiteral(crate::ast::NumberLiteral::Int(10)),
                step: None,
            }],
            vec![],
        );
        let header = block(1, "for_header", vec![], vec![0]);

        let cfg = ControlFlowGraph {
            blocks: vec![init_block, header],
            edges: vec![],
            entry_block: 0,
            parameters: vec![],
            return_type: TypeDescriptor::new(BaseType::Void),
            gosub_return_blocks: Default::default(),
        };

        let (variable, step) = for_init_statement(&cfg, 1).expect("predecessor FOR found");
        assert_eq!(variable, "I%");
        assert!(step.is_none());
    }
}
