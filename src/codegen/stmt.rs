//! Statement lowering (design 4.5.4), plus the condition-evaluation helpers
//! the CFG emitter drives directly for loop/branch headers (`IF`, `WHILE`,
//! `DO`, `FOR`), and the UDT field-by-field copy (4.5.3).
//!
//! `emit_statement` handles every statement kind that contributes
//! instructions to its own block. `RETURN`, `ON_GOTO`, `ON_GOSUB`,
//! `ON_CALL` are terminator-only constructs consumed by [`super::cfg_emit`]
//! before it ever calls `emit_statement` on a block's body; reaching one
//! here is a no-op (the block-walk skips them, this is just defense in
//! depth for a malformed CFG).

use super::context::ForLoopTemps;
use super::expr::{array_element_address, emit_expression, emit_expression_as, expression_address, variable_slot};
use super::RoutineCtx;
use crate::ast::{Expression, LValue, NumberLiteral, PrintItem, PrintSeparator, Statement};
use crate::builder::{Align, ComparePred};
use crate::error::CodeGenError;
use crate::layout::udt_layout;
use crate::runtime::{print_dispatch_kind, PrintKind, RuntimeShim};
use crate::types::{BaseType, QbeType, TypeDescriptor};

pub fn emit_statement(ctx: &mut RoutineCtx<'_>, stmt: &Statement) -> Result<(), CodeGenError> {
    ctx.fx.clear_array_element_cache();
    match stmt {
        Statement::Let { target, value } => store_expr_into(ctx, target, value),
        Statement::Print { items } => emit_print(ctx, items),
        Statement::Input {
            prompt,
            target,
            value_type,
        } => emit_input(ctx, prompt.as_deref(), target, value_type),
        Statement::Read { target } => emit_read(ctx, target),
        Statement::Restore { label } => emit_restore(ctx, label.as_deref()),
        Statement::SliceAssign {
            variable,
            from,
            to,
            value,
        } => emit_slice_assign(ctx, variable, from, to, value),
        Statement::End => {
            RuntimeShim::end_program(ctx.b);
            Ok(())
        }
        Statement::Dim { array, dimensions } => emit_dim(ctx, array, dimensions),
        Statement::Redim { array, dimensions } => emit_dim(ctx, array, dimensions),
        Statement::Erase { array } => emit_erase(ctx, array),
        Statement::Local { .. } => Ok(()), // slot already allocated by the entry block.
        Statement::Call { name, args } => emit_call_statement(ctx, name, args),
        Statement::Shared { name } => {
            ctx.mangler.add_shared_variable(name);
            Ok(())
        }
        Statement::For {
            variable,
            start,
            limit,
            step,
        } => emit_for_init(ctx, variable, start, limit, step.as_ref()),
        // Terminator-only constructs; the CFG emitter consumes these before
        // reaching the generic body walk.
        Statement::If { .. }
        | Statement::While { .. }
        | Statement::Do { .. }
        | Statement::Case { .. }
        | Statement::Return { .. }
        | Statement::OnGoto { .. }
        | Statement::OnGosub { .. }
        | Statement::OnCall { .. } => Ok(()),
    }
}

// -- lvalue addressing -----------------------------------------------------

/// Type of an lvalue without emitting any instructions — a pure symbol/
/// layout lookup, safe to call before deciding how to lower a store.
pub fn lvalue_type(ctx: &RoutineCtx<'_>, target: &LValue) -> Result<TypeDescriptor, CodeGenError> {
    match target {
        LValue::Variable(name) => {
            if let Some(slot) = ctx.fx.locals.get(name) {
                Ok(slot.type_descriptor.clone())
            } else {
                ctx.symbols
                    .variable(name)
                    .map(|sym| sym.type_descriptor.clone())
                    .ok_or_else(|| CodeGenError::undefined_variable(name))
            }
        }
        LValue::ArrayElement { array, .. } => ctx
            .symbols
            .array(array)
            .map(|sym| sym.element_type.clone())
            .ok_or_else(|| CodeGenError::undefined_variable(array)),
        LValue::Member { base, field } => {
            let base_ty = lvalue_type(ctx, base)?;
            let udt_name = base_ty
                .udt_name
                .as_deref()
                .ok_or_else(|| CodeGenError::Logic(format!("member access on non-UDT lvalue (field '{}')", field)))?;
            let layout = udt_layout(udt_name, ctx.symbols)?;
            layout
                .field(field)
                .map(|f| f.type_descriptor.clone())
                .ok_or_else(|| CodeGenError::Logic(format!("unknown field '{}' on type '{}'", field, udt_name)))
        }
        LValue::StringSlice { .. } => Ok(TypeDescriptor::new(BaseType::String)),
    }
}

/// Address of an lvalue. Companion to [`lvalue_type`]; unlike that
/// function this does emit instructions (index/base evaluation).
pub fn lvalue_address(ctx: &mut RoutineCtx<'_>, target: &LValue) -> Result<(String, TypeDescriptor), CodeGenError> {
    match target {
        LValue::Variable(name) => {
            let slot = variable_slot(ctx, name)?;
            Ok((slot.address, slot.type_descriptor))
        }
        LValue::ArrayElement { array, indices } => array_element_address(ctx, array, indices),
        LValue::Member { base, field } => {
            let (base_addr, base_ty) = lvalue_address(ctx, base)?;
            let udt_name = base_ty
                .udt_name
                .as_deref()
                .ok_or_else(|| CodeGenError::Logic(format!("member access on non-UDT lvalue (field '{}')", field)))?;
            let layout = udt_layout(udt_name, ctx.symbols)?;
            let f = layout
                .field(field)
                .ok_or_else(|| CodeGenError::Logic(format!("unknown field '{}' on type '{}'", field, udt_name)))?;
            let addr = ctx.b.binary("add", crate::types::QbeType::L, &base_addr, &f.offset.to_string());
            Ok((addr, f.type_descriptor.clone()))
        }
        LValue::StringSlice { variable, .. } => {
            let slot = variable_slot(ctx, variable)?;
            Ok((slot.address, slot.type_descriptor))
        }
    }
}

// -- stores (design 4.5.1 store half, 4.5.3 UDT copy) ----------------------

fn store_expr_into(ctx: &mut RoutineCtx<'_>, target: &LValue, value_expr: &crate::ast::Expression) -> Result<(), CodeGenError> {
    let (addr, target_ty) = lvalue_address(ctx, target)?;
    if target_ty.is_udt() {
        let (src_addr, _) = expression_address(ctx, value_expr)?;
        return copy_udt(ctx, &target_ty, &addr, &src_addr);
    }
    if target_ty.is_reference_counted() {
        let old = ctx.b.load(crate::types::QbeType::L, &addr);
        RuntimeShim::release(ctx.b, &old);
        let new_val = emit_expression_as(ctx, value_expr, &target_ty)?;
        let retained = RuntimeShim::retain(ctx.b, &new_val);
        ctx.b.store(crate::types::QbeType::L, &retained, &addr);
        return Ok(());
    }
    let value = emit_expression_as(ctx, value_expr, &target_ty)?;
    ctx.b.store(target_ty.qbe_type(), &value, &addr);
    Ok(())
}

/// Store an already-computed value (not an `Expression`) into `target`,
/// applying the same string-refcount discipline as [`store_expr_into`].
/// Used by `INPUT`/`READ`, whose value comes from a runtime call rather
/// than an AST expression.
fn store_value_into(ctx: &mut RoutineCtx<'_>, target: &LValue, value: &str, value_ty: &TypeDescriptor) -> Result<(), CodeGenError> {
    let (addr, target_ty) = lvalue_address(ctx, target)?;
    if target_ty.is_reference_counted() {
        let old = ctx.b.load(crate::types::QbeType::L, &addr);
        RuntimeShim::release(ctx.b, &old);
        let retained = RuntimeShim::retain(ctx.b, value);
        ctx.b.store(crate::types::QbeType::L, &retained, &addr);
        return Ok(());
    }
    let coerced = if value_ty.qbe_type() == target_ty.qbe_type() {
        value.to_string()
    } else {
        match crate::types::conversion(value_ty.qbe_type(), target_ty.qbe_type()) {
            crate::types::ConvertOp::Copy => ctx.b.copy(target_ty.qbe_type(), value),
            crate::types::ConvertOp::Single(m) => ctx.b.convert(m, target_ty.qbe_type(), value),
            crate::types::ConvertOp::Chained(first, mid, second) => {
                let mid_val = ctx.b.convert(first, mid, value);
                ctx.b.convert(second, target_ty.qbe_type(), &mid_val)
            }
        }
    };
    ctx.b.store(target_ty.qbe_type(), &coerced, &addr);
    Ok(())
}

/// Field-by-field UDT copy: for each field in source order, load+store at
/// its QBE type; STRING fields release the destination's old value and
/// retain the source's; nested UDT fields recurse.
pub fn copy_udt(ctx: &mut RoutineCtx<'_>, ty: &TypeDescriptor, dest_addr: &str, src_addr: &str) -> Result<(), CodeGenError> {
    use crate::types::QbeType;
    let udt_name = ty
        .udt_name
        .as_deref()
        .ok_or_else(|| CodeGenError::Logic("copy_udt called on a non-UDT type".into()))?;
    let layout = udt_layout(udt_name, ctx.symbols)?;
    for field in &layout.fields {
        let src_field_addr = ctx.b.binary("add", QbeType::L, src_addr, &field.offset.to_string());
        let dst_field_addr = ctx.b.binary("add", QbeType::L, dest_addr, &field.offset.to_string());
        if field.type_descriptor.is_udt() {
            copy_udt(ctx, &field.type_descriptor, &dst_field_addr, &src_field_addr)?;
        } else if field.type_descriptor.is_reference_counted() {
            let old = ctx.b.load(QbeType::L, &dst_field_addr);
            RuntimeShim::release(ctx.b, &old);
            let src_val = ctx.b.load(QbeType::L, &src_field_addr);
            let retained = RuntimeShim::retain(ctx.b, &src_val);
            ctx.b.store(QbeType::L, &retained, &dst_field_addr);
        } else {
            let qty = field.type_descriptor.qbe_type();
            let v = ctx.b.load(qty, &src_field_addr);
            ctx.b.store(qty, &v, &dst_field_addr);
        }
    }
    Ok(())
}

// -- PRINT ------------------------------------------------------------------

fn emit_print(ctx: &mut RoutineCtx<'_>, items: &[PrintItem]) -> Result<(), CodeGenError> {
    if items.is_empty() {
        RuntimeShim::print_newline(ctx.b);
        return Ok(());
    }
    let last = items.len() - 1;
    for (i, item) in items.iter().enumerate() {
        let (value, ty) = emit_expression(ctx, &item.expr)?;
        match print_dispatch_kind(&ty) {
            PrintKind::Int(base) => RuntimeShim::print_int(ctx.b, &value, base),
            PrintKind::Single => RuntimeShim::print_single(ctx.b, &value),
            PrintKind::Double => RuntimeShim::print_double(ctx.b, &value),
            PrintKind::String => RuntimeShim::print_string(ctx.b, &value),
        }
        match item.trailing_separator {
            Some(PrintSeparator::Tab) => RuntimeShim::print_tab(ctx.b),
            Some(PrintSeparator::None) => {}
            None if i == last => RuntimeShim::print_newline(ctx.b),
            None => {}
        }
    }
    Ok(())
}

// -- INPUT / READ / RESTORE -------------------------------------------------

fn emit_input(
    ctx: &mut RoutineCtx<'_>,
    prompt: Option<&str>,
    target: &LValue,
    value_type: &TypeDescriptor,
) -> Result<(), CodeGenError> {
    if let Some(text) = prompt {
        let label = ctx.b.register_string(text);
        let ptr = ctx.b.copy(crate::types::QbeType::L, &format!("${}", label));
        RuntimeShim::print_string(ctx.b, &ptr);
    }
    let value = match value_type.base_type {
        BaseType::Single => RuntimeShim::input_single(ctx.b),
        BaseType::Double => RuntimeShim::input_double(ctx.b),
        BaseType::String | BaseType::Unicode => RuntimeShim::input_string(ctx.b),
        _ => RuntimeShim::input_int(ctx.b),
    };
    store_value_into(ctx, target, &value, value_type)
}

/// `READ` walks the flattened DATA segment the driver laid out: each entry
/// is a 16-byte record (4-byte type tag, 4 bytes padding, 8-byte payload)
/// starting at `$__data_values`, indexed by the word-sized `$__data_pointer`
/// global the driver also owns. Guarded by the same `rt_array_bounds_check`
/// intrinsic array indexing uses, against `$__data_end_const` (the record
/// count), so a `READ` with no DATA left behaves like an out-of-bounds array
/// access rather than walking off the end of the blob into `$__data_pointer`
/// itself.
fn emit_read(ctx: &mut RoutineCtx<'_>, target: &LValue) -> Result<(), CodeGenError> {
    use crate::types::QbeType;
    let ty = lvalue_type(ctx, target)?;
    let ptr = ctx.b.load(QbeType::W, "$__data_pointer");
    if ctx.config.bounds_checks_enabled {
        let end = ctx.b.load(QbeType::W, "$__data_end_const");
        RuntimeShim::array_bounds_check(ctx.b, &ptr, &end);
    }
    let ptr_l = ctx.b.convert("extsw", QbeType::L, &ptr);
    let offset = ctx.b.binary("mul", QbeType::L, &ptr_l, "16");
    let entry_addr = ctx.b.binary("add", QbeType::L, "$__data_values", &offset);
    let payload_addr = ctx.b.binary("add", QbeType::L, &entry_addr, "8");
    let value = ctx.b.load(ty.qbe_type(), &payload_addr);
    let next = ctx.b.binary("add", QbeType::W, &ptr, "1");
    ctx.b.store(QbeType::W, &next, "$__data_pointer");
    store_value_into(ctx, target, &value, &ty)
}

/// `RESTORE` resets `$__data_pointer` to a compile-time-known index: the
/// program start (bare `RESTORE`, read from `$__data_start` rather than a
/// bare `0` literal so the reset value has the same single source of truth
/// the driver emits it from), or the index recorded for a label/line number
/// by the DATA preprocessor pass.
fn emit_restore(ctx: &mut RoutineCtx<'_>, label: Option<&str>) -> Result<(), CodeGenError> {
    use crate::types::QbeType;
    match label {
        None => {
            let start = ctx.b.load(QbeType::W, "$__data_start");
            ctx.b.store(QbeType::W, &start, "$__data_pointer");
        }
        Some(l) => {
            let index = if let Ok(line) = l.parse::<u32>() {
                *ctx.data
                    .line_restore_points
                    .get(&line)
                    .ok_or_else(|| CodeGenError::Logic(format!("RESTORE to unknown line '{}'", l)))?
            } else {
                *ctx.data
                    .label_restore_points
                    .get(l)
                    .ok_or_else(|| CodeGenError::Logic(format!("RESTORE to unknown label '{}'", l)))?
            };
            ctx.b.store(QbeType::W, &index.to_string(), "$__data_pointer");
        }
    }
    Ok(())
}

// -- SLICE_ASSIGN ------------------------------------------------------------

/// `s$(a TO b) = r$` mutates `s$` in place. `s$`'s descriptor may be shared
/// with another variable via a prior `retain`-based assignment, so the
/// target is cloned to a uniquely owned buffer first -- the old (possibly
/// shared) descriptor is released, and the clone retained in its place --
/// before the runtime mutates it byte-for-byte.
fn emit_slice_assign(
    ctx: &mut RoutineCtx<'_>,
    variable: &str,
    from: &crate::ast::Expression,
    to: &crate::ast::Expression,
    value: &crate::ast::Expression,
) -> Result<(), CodeGenError> {
    use crate::types::QbeType;
    let slot = variable_slot(ctx, variable)?;
    let old = ctx.b.load(QbeType::L, &slot.address);
    let cloned = RuntimeShim::clone_string(ctx.b, &old);
    RuntimeShim::release(ctx.b, &old);
    let owned = RuntimeShim::retain(ctx.b, &cloned);
    ctx.b.store(QbeType::L, &owned, &slot.address);

    let from_v = emit_expression_as(ctx, from, &TypeDescriptor::new(BaseType::Integer))?;
    let to_v = emit_expression_as(ctx, to, &TypeDescriptor::new(BaseType::Integer))?;
    let value_v = emit_expression_as(ctx, value, &TypeDescriptor::new(BaseType::String))?;
    RuntimeShim::slice_assign(ctx.b, &slot.address, &from_v, &to_v, &value_v);
    Ok(())
}

// -- DIM / REDIM / ERASE -----------------------------------------------------

fn emit_dim(ctx: &mut RoutineCtx<'_>, array: &str, dimensions: &[crate::ast::Expression]) -> Result<(), CodeGenError> {
    let symbol = ctx
        .symbols
        .array(array)
        .ok_or_else(|| CodeGenError::undefined_variable(array))?
        .clone();
    let descriptor_addr = ctx.mangler.array_descriptor(array);

    let mut count = emit_expression_as(ctx, &dimensions[0], &TypeDescriptor::new(BaseType::Integer))?;
    for extra in &dimensions[1..] {
        let next = emit_expression_as(ctx, extra, &TypeDescriptor::new(BaseType::Integer))?;
        count = ctx.b.binary("mul", crate::types::QbeType::W, &count, &next);
    }
    let element_size = symbol.element_type.size().max(1);
    RuntimeShim::array_alloc(ctx.b, &descriptor_addr, &element_size.to_string(), &count);
    Ok(())
}

fn emit_erase(ctx: &mut RoutineCtx<'_>, array: &str) -> Result<(), CodeGenError> {
    let descriptor_addr = ctx.mangler.array_descriptor(array);
    RuntimeShim::array_free(ctx.b, &descriptor_addr);
    Ok(())
}

// -- CALL --------------------------------------------------------------------

fn emit_call_statement(ctx: &mut RoutineCtx<'_>, name: &str, args: &[crate::ast::Expression]) -> Result<(), CodeGenError> {
    ctx.symbols
        .function(name)
        .ok_or_else(|| CodeGenError::undefined_function(name))?;
    let mut typed_args = Vec::with_capacity(args.len());
    for arg in args {
        let (value, ty) = emit_expression(ctx, arg)?;
        typed_args.push((ty.qbe_type(), value));
    }
    let mangled = ctx.mangler.sub_name(name);
    let callee = mangled.trim_start_matches('$').to_string();
    ctx.b.call(None, &callee, &typed_args);
    Ok(())
}

// -- condition evaluation for loop/branch headers (driven by cfg_emit) -----

/// `IF`/`WHILE`/`DO WHILE` condition: evaluate to a word, non-zero is true.
pub fn emit_branch_condition(ctx: &mut RoutineCtx<'_>, condition: &crate::ast::Expression) -> Result<String, CodeGenError> {
    emit_expression_as(ctx, condition, &TypeDescriptor::new(BaseType::Integer))
}

// -- FOR loop init / condition / increment ----------------------------------

/// Does `step` resolve to a known-constant integer at compile time? Used to
/// pick `sle`/`sge` directly instead of a runtime direction flag.
fn constant_step(step: Option<&Expression>) -> Option<i64> {
    match step {
        None => Some(1),
        Some(Expression::NumberLiteral(NumberLiteral::Int(n))) => Some(*n),
        Some(_) => None,
    }
}

/// `FOR` statement init: stores the start value into the loop variable,
/// and caches limit/step/direction in stack slots for the header and
/// increment blocks to read back later.
fn emit_for_init(
    ctx: &mut RoutineCtx<'_>,
    variable: &str,
    start: &Expression,
    limit: &Expression,
    step: Option<&Expression>,
) -> Result<(), CodeGenError> {
    let var_slot = variable_slot(ctx, variable)?;
    let ty = var_slot.type_descriptor.clone();
    let qty = ty.qbe_type();

    let start_v = emit_expression_as(ctx, start, &ty)?;
    ctx.b.store(qty, &start_v, &var_slot.address);

    let limit_v = emit_expression_as(ctx, limit, &ty)?;
    let limit_slot = ctx.b.alloc(Align::for_size(ty.size()), ty.size().max(1));
    ctx.b.store(qty, &limit_v, &limit_slot);

    let step_slot = ctx.b.alloc(Align::for_size(ty.size()), ty.size().max(1));
    let step_v = match constant_step(step) {
        Some(n) => ctx.b.copy(qty, &n.to_string()),
        None => emit_expression_as(ctx, step.unwrap(), &ty)?,
    };
    ctx.b.store(qty, &step_v, &step_slot);

    let direction_slot = ctx.b.alloc(Align::Four, 4);
    let direction_v = match constant_step(step) {
        Some(n) if n >= 0 => "1".to_string(),
        Some(_) => "0".to_string(),
        None => {
            let zero = ctx.b.copy(qty, "0");
            ctx.b.compare(ComparePred::Ge, qty, &step_v, &zero)
        }
    };
    ctx.b.store(QbeType::W, &direction_v, &direction_slot);

    ctx.fx.for_loop_temps.insert(
        variable.to_string(),
        ForLoopTemps {
            limit_slot,
            step_slot,
            direction_slot,
        },
    );
    Ok(())
}

/// `FOR` header condition: `var <= limit` for ascending, `var >= limit` for
/// descending. A non-constant step picks the direction at runtime via the
/// flag `emit_for_init` computed, blended branchlessly (`flag` is always
/// `0`/`1`): `(flag & le) | (!flag & ge)`.
pub fn emit_for_condition(ctx: &mut RoutineCtx<'_>, variable: &str, step: Option<&Expression>) -> Result<String, CodeGenError> {
    let var_slot = variable_slot(ctx, variable)?;
    let ty = var_slot.type_descriptor.clone();
    let qty = ty.qbe_type();
    let temps = ctx
        .fx
        .for_loop_temps
        .get(variable)
        .cloned()
        .ok_or_else(|| CodeGenError::malformed_cfg(format!("no FOR init recorded for '{}'", variable)))?;

    let var_v = ctx.b.load(qty, &var_slot.address);
    let limit_v = ctx.b.load(qty, &temps.limit_slot);

    match constant_step(step) {
        Some(n) if n >= 0 => Ok(ctx.b.compare(ComparePred::Le, qty, &var_v, &limit_v)),
        Some(_) => Ok(ctx.b.compare(ComparePred::Ge, qty, &var_v, &limit_v)),
        None => {
            let le = ctx.b.compare(ComparePred::Le, qty, &var_v, &limit_v);
            let ge = ctx.b.compare(ComparePred::Ge, qty, &var_v, &limit_v);
            let flag = ctx.b.load(QbeType::W, &temps.direction_slot);
            let not_flag = ctx.b.binary("xor", QbeType::W, &flag, "1");
            let a = ctx.b.binary("and", QbeType::W, &flag, &le);
            let bv = ctx.b.binary("and", QbeType::W, &not_flag, &ge);
            Ok(ctx.b.binary("or", QbeType::W, &a, &bv))
        }
    }
}

/// `FOR` increment block: `var = var + step`.
pub fn emit_for_increment(ctx: &mut RoutineCtx<'_>, variable: &str) -> Result<(), CodeGenError> {
    let var_slot = variable_slot(ctx, variable)?;
    let ty = var_slot.type_descriptor.clone();
    let qty = ty.qbe_type();
    let temps = ctx
        .fx
        .for_loop_temps
        .get(variable)
        .cloned()
        .ok_or_else(|| CodeGenError::malformed_cfg(format!("no FOR init recorded for '{}'", variable)))?;
    let var_v = ctx.b.load(qty, &var_slot.address);
    let step_v = ctx.b.load(qty, &temps.step_slot);
    let next = ctx.b.binary("add", qty, &var_v, &step_v);
    ctx.b.store(qty, &next, &var_slot.address);
    Ok(())
}

pub fn emit_function_return(ctx: &mut RoutineCtx<'_>, value: Option<&crate::ast::Expression>) -> Result<(), CodeGenError> {
    let return_type = ctx.fx.return_type.clone();
    let Some(slot) = ctx.fx.return_slot.clone() else {
        return Ok(());
    };
    match value {
        Some(expr) => {
            let v = emit_expression_as(ctx, expr, &return_type)?;
            ctx.b.store(return_type.qbe_type(), &v, &slot);
        }
        None => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::IlBuilder;
    use crate::config::CodegenConfig;
    use crate::data::DataPreprocessorResult;
    use crate::mangle::NameMangler;
    use crate::symbols::{Scope, SymbolTable, VariableSymbol};
    use super::super::context::FunctionContext;

    fn global_var(name: &str, base_type: BaseType) -> VariableSymbol {
        VariableSymbol {
            name: name.to_string(),
            type_descriptor: TypeDescriptor::new(base_type),
            scope: Scope::Global,
            is_global: true,
            is_shared: false,
        }
    }

    fn ctx_with<'a>(
        b: &'a mut IlBuilder,
        mangler: &'a mut NameMangler,
        symbols: &'a SymbolTable,
        config: &'a CodegenConfig,
        data: &'a DataPreprocessorResult,
    ) -> RoutineCtx<'a> {
        RoutineCtx {
            b,
            mangler,
            symbols,
            config,
            data,
            fx: FunctionContext::new(TypeDescriptor::new(BaseType::Void)),
        }
    }

    #[test]
    fn lvalue_type_looks_up_a_global_variable() {
        let mut symbols = SymbolTable::new();
        symbols.variables.insert("X%".to_string(), global_var("X%", BaseType::Integer));
        let mut b = IlBuilder::new();
        let mut mangler = NameMangler::new();
        let config = CodegenConfig::new();
        let data = DataPreprocessorResult::default();
        let ctx = ctx_with(&mut b, &mut mangler, &symbols, &config, &data);

        let ty = lvalue_type(&ctx, &LValue::Variable("X%".to_string())).expect("known variable");
        assert_eq!(ty.base_type, BaseType::Integer);
    }

    #[test]
    fn emit_read_resets_pointer_through_the_data_start_global() {
        let symbols = SymbolTable::new();
        let mut b = IlBuilder::new();
        let mut mangler = NameMangler::new();
        let config = CodegenConfig::new();
        let data = DataPreprocessorResult::default();
        let mut ctx = ctx_with(&mut b, &mut mangler, &symbols, &config, &data);

        emit_restore(&mut ctx, None).expect("bare RESTORE succeeds");
        let text = ctx.b.text().to_string();
        assert!(text.contains("load $__data_start"));
        assert!(text.contains("store $__data_pointer") || text.contains("$__data_pointer"));
    }

    #[test]
    fn emit_read_bounds_checks_against_data_end_const_when_enabled() {
        let mut symbols = SymbolTable::new();
        symbols.variables.insert("N%".to_string(), global_var("N%", BaseType::Integer));
        let mut b = IlBuilder::new();
        let mut mangler = NameMangler::new();
        let config = CodegenConfig::new().with_bounds_checks(true);
        let data = DataPreprocessorResult::default();
        let mut ctx = ctx_with(&mut b, &mut mangler, &symbols, &config, &data);
        ctx.fx.locals.insert(
            "N%".to_string(),
            super::super::context::VariableSlot {
                address: "$n".to_string(),
                type_descriptor: TypeDescriptor::new(BaseType::Integer),
                is_global: true,
            },
        );

        emit_read(&mut ctx, &LValue::Variable("N%".to_string())).expect("read succeeds");
        let text = ctx.b.text().to_string();
        assert!(text.contains("load $__data_end_const"));
        assert!(text.contains("call $rt_array_bounds_check"));
    }

    #[test]
    fn restore_to_unknown_label_is_a_logic_error() {
        let symbols = SymbolTable::new();
        let mut b = IlBuilder::new();
        let mut mangler = NameMangler::new();
        let config = CodegenConfig::new();
        let data = DataPreprocessorResult::default();
        let mut ctx = ctx_with(&mut b, &mut mangler, &symbols, &config, &data);

        let err = emit_restore(&mut ctx, Some("MISSING")).expect_err("label is not recorded");
        assert!(err.to_string().contains("unknown label"));
    }
}
