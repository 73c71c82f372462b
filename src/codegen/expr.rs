//! Expression lowering: AST `Expression` nodes to QBE temporaries.
//!
//! Two public entry points mirror the design: [`emit_expression`] lowers an
//! expression to its natural type, [`emit_expression_as`] composes that with
//! a coercion to a caller-supplied expected type.

use super::RoutineCtx;
use crate::ast::{BinaryOp, Expression, NumberLiteral, UnaryOp};
use crate::builder::{Align, ComparePred};
use crate::error::CodeGenError;
use crate::runtime::RuntimeShim;
use crate::symbols::VariableSymbol;
use crate::types::{self, BaseType, ConvertOp, QbeType, TypeDescriptor};
use super::context::VariableSlot;

/// Lower `expr`, returning the QBE value (or address, for UDTs) and its type.
pub fn emit_expression(
    ctx: &mut RoutineCtx<'_>,
    expr: &Expression,
) -> Result<(String, TypeDescriptor), CodeGenError> {
    match expr {
        Expression::NumberLiteral(lit) => Ok(emit_number_literal(ctx, *lit)),
        Expression::StringLiteral(s) => Ok(emit_string_literal(ctx, s)),
        Expression::Variable(name) => load_variable(ctx, name),
        Expression::Binary { left, op, right } => emit_binary(ctx, left, *op, right),
        Expression::Unary { op, operand } => emit_unary(ctx, *op, operand),
        Expression::ArrayAccess { array, indices } => {
            let (address, element_type) = array_element_address(ctx, array, indices)?;
            load_from_address(ctx, &address, &element_type)
        }
        Expression::MemberAccess { base, field } => {
            let (address, field_type) = member_address(ctx, base, field)?;
            load_from_address(ctx, &address, &field_type)
        }
        Expression::Call { name, args } => emit_call(ctx, name, args),
        Expression::Iif {
            condition,
            when_true,
            when_false,
        } => emit_iif(ctx, condition, when_true, when_false),
        Expression::MethodCall {
            receiver,
            method,
            args,
        } => emit_method_call(ctx, receiver, method, args),
    }
}

/// Lower `expr` and coerce the result to `expected`.
pub fn emit_expression_as(
    ctx: &mut RoutineCtx<'_>,
    expr: &Expression,
    expected: &TypeDescriptor,
) -> Result<String, CodeGenError> {
    let (value, actual) = emit_expression(ctx, expr)?;
    Ok(coerce(ctx, &value, &actual, expected))
}

/// Emit whatever conversion instructions get `value: actual` into
/// `expected`'s QBE type. A no-op if the two already agree.
fn coerce(ctx: &mut RoutineCtx<'_>, value: &str, actual: &TypeDescriptor, expected: &TypeDescriptor) -> String {
    let (from, to) = (actual.qbe_type(), expected.qbe_type());
    if from == to {
        return value.to_string();
    }
    match types::conversion(from, to) {
        ConvertOp::Copy => ctx.b.copy(to, value),
        ConvertOp::Single(mnemonic) => ctx.b.convert(mnemonic, to, value),
        ConvertOp::Chained(first, mid_ty, second) => {
            let mid = ctx.b.convert(first, mid_ty, value);
            ctx.b.convert(second, to, &mid)
        }
    }
}

fn format_float_literal(prefix: char, value: f64) -> String {
    if value.fract() == 0.0 && value.is_finite() {
        format!("{}_{:.1}", prefix, value)
    } else {
        format!("{}_{}", prefix, value)
    }
}

fn emit_number_literal(ctx: &mut RoutineCtx<'_>, lit: NumberLiteral) -> (String, TypeDescriptor) {
    match lit {
        NumberLiteral::Int(n) => {
            let ty = if n >= i32::MIN as i64 && n <= i32::MAX as i64 {
                TypeDescriptor::new(BaseType::Integer)
            } else {
                TypeDescriptor::new(BaseType::Long)
            };
            let value = ctx.b.copy(ty.qbe_type(), &n.to_string());
            (value, ty)
        }
        NumberLiteral::Float(f) => {
            let ty = TypeDescriptor::new(BaseType::Double);
            let literal = format_float_literal('d', f);
            let value = ctx.b.copy(QbeType::D, &literal);
            (value, ty)
        }
    }
}

fn emit_string_literal(ctx: &mut RoutineCtx<'_>, s: &str) -> (String, TypeDescriptor) {
    let label = ctx.b.register_string(s);
    let value = ctx.b.copy(QbeType::L, &format!("${}", label));
    (value, TypeDescriptor::new(BaseType::String))
}

// -- variable access (design 4.5.1) --------------------------------------

/// Resolve `raw_name` to its stack slot / data symbol, allocating the
/// global-address-cache entry on first reference. Locals must already have
/// been allocated by the CFG emitter's entry-block pass; a miss there is a
/// malformed-CFG error, not a lazy-allocation opportunity.
pub fn variable_slot(ctx: &mut RoutineCtx<'_>, raw_name: &str) -> Result<VariableSlot, CodeGenError> {
    if let Some(slot) = ctx.fx.locals.get(raw_name) {
        return Ok(slot.clone());
    }
    let symbol: &VariableSymbol = ctx
        .symbols
        .variable(raw_name)
        .ok_or_else(|| CodeGenError::undefined_variable(raw_name))?;
    if !symbol.is_global {
        return Err(CodeGenError::malformed_cfg(format!(
            "local variable '{}' referenced before entry-block allocation",
            raw_name
        )));
    }
    let type_descriptor = symbol.type_descriptor.clone();
    let address = if let Some(cached) = ctx.fx.global_address_cache.get(raw_name) {
        cached.clone()
    } else {
        let mangled = ctx.mangler.global_variable(raw_name);
        ctx.fx.global_address_cache.insert(raw_name.to_string(), mangled.clone());
        mangled
    };
    let slot = VariableSlot {
        address,
        type_descriptor,
        is_global: true,
    };
    ctx.fx.locals.insert(raw_name.to_string(), slot.clone());
    Ok(slot)
}

fn load_from_address(
    ctx: &mut RoutineCtx<'_>,
    address: &str,
    type_descriptor: &TypeDescriptor,
) -> Result<(String, TypeDescriptor), CodeGenError> {
    if type_descriptor.is_udt() {
        // UDTs are never loaded into a value; the address stands in for the
        // whole record and is consumed by field access or a field-by-field
        // copy (see stmt::copy_udt).
        return Ok((address.to_string(), type_descriptor.clone()));
    }
    let value = ctx.b.load(type_descriptor.qbe_type(), address);
    Ok((value, type_descriptor.clone()))
}

fn load_variable(ctx: &mut RoutineCtx<'_>, raw_name: &str) -> Result<(String, TypeDescriptor), CodeGenError> {
    let slot = variable_slot(ctx, raw_name)?;
    load_from_address(ctx, &slot.address, &slot.type_descriptor)
}

// -- array element access (design 4.5.2) ---------------------------------

/// Serialize an index-expression list deterministically for the
/// element-base cache key. Returns `None` for expressions too dynamic to
/// serialize (anything but a bare variable or literal), matching the
/// documented "never cache calls" carve-out.
fn serialize_indices(indices: &[Expression]) -> Option<String> {
    let mut parts = Vec::with_capacity(indices.len());
    for index in indices {
        match index {
            Expression::NumberLiteral(NumberLiteral::Int(n)) => parts.push(n.to_string()),
            Expression::Variable(name) => parts.push(name.clone()),
            _ => return None,
        }
    }
    Some(parts.join(","))
}

/// Compute `base + index * elementSize`, where `base` is the array
/// descriptor's runtime-held base pointer (loaded fresh, not the
/// descriptor's own address). Single-dimension indexing only; multi-dim
/// arrays fold indices left-to-right into a single offset by the caller's
/// semantic layer before reaching this layer (descriptor carries one
/// logical extent).
pub fn array_element_address(
    ctx: &mut RoutineCtx<'_>,
    array_name: &str,
    indices: &[Expression],
) -> Result<(String, TypeDescriptor), CodeGenError> {
    let symbol = ctx
        .symbols
        .array(array_name)
        .ok_or_else(|| CodeGenError::undefined_variable(array_name))?
        .clone();

    let cache_key = if ctx.config.array_element_cache_enabled {
        serialize_indices(indices).map(|s| crate::codegen::context::FunctionContext::cache_key(array_name, &s))
    } else {
        None
    };
    if let Some(key) = &cache_key {
        if let Some(cached) = ctx.fx.array_element_cache.get(key) {
            return Ok((cached.clone(), symbol.element_type.clone()));
        }
    }

    // The descriptor is a fixed-layout block: an 8-byte base pointer
    // followed by a 4-byte element count (see driver::emit_globals).
    let descriptor_addr = ctx.mangler.array_descriptor(array_name);
    let base = ctx.b.load(QbeType::L, &descriptor_addr);

    let mut index_value = emit_expression_as(ctx, &indices[0], &TypeDescriptor::new(BaseType::Integer))?;
    for extra in &indices[1..] {
        let next = emit_expression_as(ctx, extra, &TypeDescriptor::new(BaseType::Integer))?;
        index_value = ctx.b.binary("add", QbeType::W, &index_value, &next);
    }

    if ctx.config.bounds_checks_enabled {
        let len = ctx.b.load(QbeType::W, &format!("{}+8", descriptor_addr));
        RuntimeShim::array_bounds_check(ctx.b, &index_value, &len);
    }

    let element_size = symbol.element_type.size().max(1);
    let index_l = coerce(ctx, &index_value, &TypeDescriptor::new(BaseType::Integer), &TypeDescriptor::new(BaseType::Long));
    let offset = ctx.b.binary("mul", QbeType::L, &index_l, &element_size.to_string());
    let address = ctx.b.binary("add", QbeType::L, &base, &offset);

    if let Some(key) = cache_key {
        let slot = ctx.b.alloc(Align::Eight, 8);
        ctx.b.store(QbeType::L, &address, &slot);
        ctx.fx.array_element_cache.insert(key, slot);
    }

    Ok((address, symbol.element_type))
}

// -- member access (design 4.5.3 address half) ---------------------------

/// Compute the address of `base.field`. `base` may itself be a variable,
/// array element, or nested member access.
pub fn member_address(
    ctx: &mut RoutineCtx<'_>,
    base: &Expression,
    field: &str,
) -> Result<(String, TypeDescriptor), CodeGenError> {
    let (base_addr, base_type) = expression_address(ctx, base)?;
    let udt_name = base_type
        .udt_name
        .as_deref()
        .ok_or_else(|| CodeGenError::Logic(format!("member access on non-UDT expression (field '{}')", field)))?;
    let layout = crate::layout::udt_layout(udt_name, ctx.symbols)?;
    let field_offset = layout
        .field(field)
        .ok_or_else(|| CodeGenError::Logic(format!("unknown field '{}' on type '{}'", field, udt_name)))?;
    let address = ctx.b.binary("add", QbeType::L, &base_addr, &field_offset.offset.to_string());
    Ok((address, field_offset.type_descriptor.clone()))
}

/// Address of an arbitrary expression, for contexts that need a pointer
/// rather than a loaded value (member-access bases, method-call receivers).
/// Only the addressable expression kinds are legal here; anything else is
/// an internal-invariant violation (the caller should have type-checked
/// this already).
pub fn expression_address(
    ctx: &mut RoutineCtx<'_>,
    expr: &Expression,
) -> Result<(String, TypeDescriptor), CodeGenError> {
    match expr {
        Expression::Variable(name) => {
            let slot = variable_slot(ctx, name)?;
            Ok((slot.address, slot.type_descriptor))
        }
        Expression::ArrayAccess { array, indices } => array_element_address(ctx, array, indices),
        Expression::MemberAccess { base, field } => member_address(ctx, base, field),
        other => Err(CodeGenError::Logic(format!(
            "expression is not addressable: {:?}",
            other
        ))),
    }
}

// -- binary / unary -------------------------------------------------------

fn emit_binary(
    ctx: &mut RoutineCtx<'_>,
    left: &Expression,
    op: BinaryOp,
    right: &Expression,
) -> Result<(String, TypeDescriptor), CodeGenError> {
    if matches!(op, BinaryOp::And | BinaryOp::Or | BinaryOp::Xor | BinaryOp::ShiftLeft | BinaryOp::ShiftRight) {
        let word = TypeDescriptor::new(BaseType::Integer);
        let lv = emit_expression_as(ctx, left, &word)?;
        let rv = emit_expression_as(ctx, right, &word)?;
        let mnemonic = match op {
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Xor => "xor",
            BinaryOp::ShiftLeft => "shl",
            BinaryOp::ShiftRight => "sar",
            _ => unreachable!(),
        };
        let result = ctx.b.binary(mnemonic, QbeType::W, &lv, &rv);
        return Ok((result, word));
    }

    if op == BinaryOp::Concat {
        let lv = emit_expression_as(ctx, left, &TypeDescriptor::new(BaseType::String))?;
        let rv = emit_expression_as(ctx, right, &TypeDescriptor::new(BaseType::String))?;
        let result = RuntimeShim::concat(ctx.b, &lv, &rv);
        return Ok((result, TypeDescriptor::new(BaseType::String)));
    }

    let (lv, lty) = emit_expression(ctx, left)?;
    let (rv, rty) = emit_expression(ctx, right)?;
    let common = types::promote(&lty, &rty);

    if common.is_string() {
        let lv = coerce(ctx, &lv, &lty, &common);
        let rv = coerce(ctx, &rv, &rty, &common);
        return emit_string_comparison(ctx, op, &lv, &rv);
    }

    let lv = coerce(ctx, &lv, &lty, &common);
    let rv = coerce(ctx, &rv, &rty, &common);
    let qty = common.qbe_type();

    let mnemonic = match op {
        BinaryOp::Add => Some("add"),
        BinaryOp::Sub => Some("sub"),
        BinaryOp::Mul => Some("mul"),
        BinaryOp::Div => Some("div"),
        BinaryOp::Mod => Some("rem"),
        _ => None,
    };
    if let Some(mnemonic) = mnemonic {
        let result = ctx.b.binary(mnemonic, qty, &lv, &rv);
        return Ok((result, common));
    }

    let pred = comparison_pred(op)?;
    let result = ctx.b.compare(pred, qty, &lv, &rv);
    Ok((result, TypeDescriptor::new(BaseType::Integer)))
}

fn comparison_pred(op: BinaryOp) -> Result<ComparePred, CodeGenError> {
    Ok(match op {
        BinaryOp::Eq => ComparePred::Eq,
        BinaryOp::Ne => ComparePred::Ne,
        BinaryOp::Lt => ComparePred::Lt,
        BinaryOp::Le => ComparePred::Le,
        BinaryOp::Gt => ComparePred::Gt,
        BinaryOp::Ge => ComparePred::Ge,
        other => return Err(CodeGenError::Logic(format!("{:?} is not a comparison operator", other))),
    })
}

fn emit_string_comparison(
    ctx: &mut RoutineCtx<'_>,
    op: BinaryOp,
    lhs: &str,
    rhs: &str,
) -> Result<(String, TypeDescriptor), CodeGenError> {
    let ordering = RuntimeShim::compare(ctx.b, lhs, rhs);
    let pred = comparison_pred(op)?;
    let result = ctx.b.compare(pred, QbeType::W, &ordering, "0");
    Ok((result, TypeDescriptor::new(BaseType::Integer)))
}

fn emit_unary(ctx: &mut RoutineCtx<'_>, op: UnaryOp, operand: &Expression) -> Result<(String, TypeDescriptor), CodeGenError> {
    let (value, ty) = emit_expression(ctx, operand)?;
    match op {
        UnaryOp::Neg => {
            let result = ctx.b.convert("neg", ty.qbe_type(), &value);
            Ok((result, ty))
        }
        UnaryOp::Not => {
            let word = coerce(ctx, &value, &ty, &TypeDescriptor::new(BaseType::Integer));
            let result = ctx.b.binary("xor", QbeType::W, &word, "-1");
            Ok((result, TypeDescriptor::new(BaseType::Integer)))
        }
    }
}

// -- calls ----------------------------------------------------------------

fn integer_type() -> TypeDescriptor {
    TypeDescriptor::new(BaseType::Integer)
}
fn double_type() -> TypeDescriptor {
    TypeDescriptor::new(BaseType::Double)
}
fn string_type() -> TypeDescriptor {
    TypeDescriptor::new(BaseType::String)
}

/// Dispatch a built-in BASIC function (`LEN`, `CHR$`, `MID$`, `ABS`, ...) to
/// its runtime-shim call, returning `None` for anything not recognized so
/// the caller falls through to user-defined `SUB`/`FUNCTION` lookup.
fn try_emit_builtin(
    ctx: &mut RoutineCtx<'_>,
    name: &str,
    args: &[Expression],
) -> Result<Option<(String, TypeDescriptor)>, CodeGenError> {
    let result = match name.to_uppercase().as_str() {
        "LEN" => {
            let s = emit_expression_as(ctx, &args[0], &string_type())?;
            (RuntimeShim::len(ctx.b, &s), integer_type())
        }
        "CHR$" => {
            let code = emit_expression_as(ctx, &args[0], &integer_type())?;
            (RuntimeShim::chr(ctx.b, &code), string_type())
        }
        "ASC" => {
            let s = emit_expression_as(ctx, &args[0], &string_type())?;
            (RuntimeShim::asc(ctx.b, &s), integer_type())
        }
        "MID$" => {
            let s = emit_expression_as(ctx, &args[0], &string_type())?;
            let start = emit_expression_as(ctx, &args[1], &integer_type())?;
            let length = if args.len() > 2 {
                emit_expression_as(ctx, &args[2], &integer_type())?
            } else {
                crate::runtime::MID_TO_END.to_string()
            };
            (RuntimeShim::mid(ctx.b, &s, &start, &length), string_type())
        }
        "LEFT$" => {
            let s = emit_expression_as(ctx, &args[0], &string_type())?;
            let count = emit_expression_as(ctx, &args[1], &integer_type())?;
            (RuntimeShim::left(ctx.b, &s, &count), string_type())
        }
        "RIGHT$" => {
            let s = emit_expression_as(ctx, &args[0], &string_type())?;
            let count = emit_expression_as(ctx, &args[1], &integer_type())?;
            (RuntimeShim::right(ctx.b, &s, &count), string_type())
        }
        "UCASE$" => {
            let s = emit_expression_as(ctx, &args[0], &string_type())?;
            (RuntimeShim::ucase(ctx.b, &s), string_type())
        }
        "LCASE$" => {
            let s = emit_expression_as(ctx, &args[0], &string_type())?;
            (RuntimeShim::lcase(ctx.b, &s), string_type())
        }
        "STR$" => {
            let (value, ty) = emit_expression(ctx, &args[0])?;
            (RuntimeShim::str_from(ctx.b, &value, ty.qbe_type()), string_type())
        }
        "VAL" => {
            let s = emit_expression_as(ctx, &args[0], &string_type())?;
            (RuntimeShim::val(ctx.b, &s), double_type())
        }
        "TIMER" => (RuntimeShim::timer(ctx.b), double_type()),
        "RND" => {
            let seed = if args.is_empty() {
                "d_0.0".to_string()
            } else {
                emit_expression_as(ctx, &args[0], &double_type())?
            };
            (RuntimeShim::rnd(ctx.b, &seed), double_type())
        }
        "ABS" => {
            let (value, ty) = emit_expression(ctx, &args[0])?;
            if ty.is_string() || ty.is_udt() {
                return Err(CodeGenError::Logic("ABS requires a numeric argument".to_string()));
            }
            if matches!(ty.qbe_type(), QbeType::W | QbeType::L) {
                (RuntimeShim::math_unary(ctx.b, "rt_abs", ty.qbe_type(), &value), ty)
            } else {
                let d = coerce(ctx, &value, &ty, &double_type());
                (RuntimeShim::math_unary(ctx.b, "rt_abs", QbeType::D, &d), double_type())
            }
        }
        "INT" => {
            let d = emit_expression_as(ctx, &args[0], &double_type())?;
            let floored = RuntimeShim::math_unary(ctx.b, "rt_int", QbeType::D, &d);
            (coerce(ctx, &floored, &double_type(), &integer_type()), integer_type())
        }
        "SQR" => {
            let d = emit_expression_as(ctx, &args[0], &double_type())?;
            (RuntimeShim::math_unary(ctx.b, "rt_sqr", QbeType::D, &d), double_type())
        }
        "SIN" => {
            let d = emit_expression_as(ctx, &args[0], &double_type())?;
            (RuntimeShim::math_unary(ctx.b, "rt_sin", QbeType::D, &d), double_type())
        }
        "COS" => {
            let d = emit_expression_as(ctx, &args[0], &double_type())?;
            (RuntimeShim::math_unary(ctx.b, "rt_cos", QbeType::D, &d), double_type())
        }
        "TAN" => {
            let d = emit_expression_as(ctx, &args[0], &double_type())?;
            (RuntimeShim::math_unary(ctx.b, "rt_tan", QbeType::D, &d), double_type())
        }
        _ => return Ok(None),
    };
    Ok(Some(result))
}

/// The return type a builtin would produce, without emitting anything --
/// used by [`peek_type`] to resolve an `IIF` branch's common type ahead of
/// the branch that actually evaluates it.
fn builtin_return_type(
    ctx: &mut RoutineCtx<'_>,
    name: &str,
    args: &[Expression],
) -> Result<Option<TypeDescriptor>, CodeGenError> {
    let ty = match name.to_uppercase().as_str() {
        "LEN" | "ASC" | "INT" => integer_type(),
        "CHR$" | "MID$" | "LEFT$" | "RIGHT$" | "UCASE$" | "LCASE$" | "STR$" => string_type(),
        "VAL" | "TIMER" | "RND" | "SQR" | "SIN" | "COS" | "TAN" => double_type(),
        "ABS" => {
            let (_, arg_ty) = peek_type(ctx, &args[0])?;
            if matches!(arg_ty.qbe_type(), QbeType::W | QbeType::L) {
                arg_ty
            } else {
                double_type()
            }
        }
        _ => return Ok(None),
    };
    Ok(Some(ty))
}

fn emit_call(ctx: &mut RoutineCtx<'_>, name: &str, args: &[Expression]) -> Result<(String, TypeDescriptor), CodeGenError> {
    if let Some(result) = try_emit_builtin(ctx, name, args)? {
        return Ok(result);
    }

    let symbol = ctx
        .symbols
        .function(name)
        .ok_or_else(|| CodeGenError::undefined_function(name))?
        .clone();

    let mut typed_args = Vec::with_capacity(args.len());
    for (arg, param_type) in args.iter().zip(symbol.parameter_types.iter()) {
        let value = emit_expression_as(ctx, arg, param_type)?;
        typed_args.push((param_type.qbe_type(), value));
    }
    for arg in args.iter().skip(symbol.parameter_types.len()) {
        let (value, ty) = emit_expression(ctx, arg)?;
        typed_args.push((ty.qbe_type(), value));
    }

    let mangled = ctx.mangler.function_name(name);
    let callee = mangled.trim_start_matches('$');
    let dest_type = if symbol.return_type.base_type == BaseType::Void {
        None
    } else {
        Some(symbol.return_type.qbe_type())
    };
    let result = ctx.b.call(dest_type, callee, &typed_args);
    let value = result.unwrap_or_else(|| "0".to_string());
    Ok((value, symbol.return_type))
}

fn emit_iif(
    ctx: &mut RoutineCtx<'_>,
    condition: &Expression,
    when_true: &Expression,
    when_false: &Expression,
) -> Result<(String, TypeDescriptor), CodeGenError> {
    let cond = emit_expression_as(ctx, condition, &TypeDescriptor::new(BaseType::Integer))?;

    let (_, true_ty) = peek_type(ctx, when_true)?;
    let (_, false_ty) = peek_type(ctx, when_false)?;
    let common = types::promote(&true_ty, &false_ty);

    let slot = ctx.b.alloc(Align::for_size(common.size()), common.size().max(1));
    let true_label = ctx.mangler.unique_label("iif_true");
    let false_label = ctx.mangler.unique_label("iif_false");
    let merge_label = ctx.mangler.unique_label("iif_merge");

    ctx.b.jnz(&cond, &true_label, &false_label);

    ctx.b.emit_label(&true_label);
    let tv = emit_expression_as(ctx, when_true, &common)?;
    ctx.b.store(common.qbe_type(), &tv, &slot);
    ctx.b.jmp(&merge_label);

    ctx.b.emit_label(&false_label);
    let fv = emit_expression_as(ctx, when_false, &common)?;
    ctx.b.store(common.qbe_type(), &fv, &slot);
    ctx.b.jmp(&merge_label);

    ctx.b.emit_label(&merge_label);
    let value = ctx.b.load(common.qbe_type(), &slot);
    Ok((value, common))
}

/// `IIF` needs each branch's natural type before deciding the common type,
/// but evaluating a branch twice would double its side effects. Every
/// expression kind here has a type derivable from the symbol table and its
/// operand types alone, with no instruction emission: `peek_type` mirrors
/// `emit_expression`'s type-selection logic one level deep (recursing for
/// compound expressions) without ever touching `ctx.b`. The actual value
/// emission happens once more under the real branch label.
fn peek_type(ctx: &mut RoutineCtx<'_>, expr: &Expression) -> Result<(String, TypeDescriptor), CodeGenError> {
    match expr {
        Expression::Variable(name) => {
            let slot = variable_slot(ctx, name)?;
            Ok((slot.address, slot.type_descriptor))
        }
        Expression::NumberLiteral(NumberLiteral::Int(_)) => Ok((String::new(), TypeDescriptor::new(BaseType::Integer))),
        Expression::NumberLiteral(NumberLiteral::Float(_)) => Ok((String::new(), TypeDescriptor::new(BaseType::Double))),
        Expression::StringLiteral(_) => Ok((String::new(), TypeDescriptor::new(BaseType::String))),
        Expression::Call { name, args } => {
            if let Some(ty) = builtin_return_type(ctx, name, args)? {
                return Ok((String::new(), ty));
            }
            let symbol = ctx.symbols.function(name).ok_or_else(|| CodeGenError::undefined_function(name))?;
            Ok((String::new(), symbol.return_type.clone()))
        }
        Expression::ArrayAccess { array, .. } => {
            let symbol = ctx.symbols.array(array).ok_or_else(|| CodeGenError::undefined_variable(array))?;
            Ok((String::new(), symbol.element_type.clone()))
        }
        Expression::MemberAccess { base, field } => {
            let (_, base_type) = peek_type(ctx, base)?;
            let udt_name = base_type
                .udt_name
                .as_deref()
                .ok_or_else(|| CodeGenError::Logic(format!("member access on non-UDT expression (field '{}')", field)))?;
            let layout = crate::layout::udt_layout(udt_name, ctx.symbols)?;
            let field = layout
                .field(field)
                .ok_or_else(|| CodeGenError::Logic(format!("unknown field '{}' on type '{}'", field, udt_name)))?;
            Ok((String::new(), field.type_descriptor.clone()))
        }
        Expression::Binary { left, op, right } => Ok((String::new(), peek_binary_type(ctx, left, *op, right)?)),
        Expression::Unary { op, operand } => {
            let (_, ty) = peek_type(ctx, operand)?;
            Ok((String::new(), match op {
                UnaryOp::Neg => ty,
                UnaryOp::Not => TypeDescriptor::new(BaseType::Integer),
            }))
        }
        Expression::Iif { when_true, when_false, .. } => {
            let (_, t) = peek_type(ctx, when_true)?;
            let (_, f) = peek_type(ctx, when_false)?;
            Ok((String::new(), types::promote(&t, &f)))
        }
        // A method call's result is always the receiver pointer's address
        // space, per `emit_method_call` -- statically `Long`, regardless of
        // the method or receiver.
        Expression::MethodCall { .. } => Ok((String::new(), TypeDescriptor::new(BaseType::Long))),
    }
}

/// Mirrors `emit_binary`'s type-selection (not its emission): the logical,
/// concat, and comparison operators fix their own result type; everything
/// else promotes its operands' peeked types the same way `emit_binary` would
/// after evaluating them.
fn peek_binary_type(ctx: &mut RoutineCtx<'_>, left: &Expression, op: BinaryOp, right: &Expression) -> Result<TypeDescriptor, CodeGenError> {
    match op {
        BinaryOp::And | BinaryOp::Or | BinaryOp::Xor | BinaryOp::ShiftLeft | BinaryOp::ShiftRight => {
            Ok(TypeDescriptor::new(BaseType::Integer))
        }
        BinaryOp::Concat => Ok(TypeDescriptor::new(BaseType::String)),
        BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            Ok(TypeDescriptor::new(BaseType::Integer))
        }
        _ => {
            let (_, lty) = peek_type(ctx, left)?;
            let (_, rty) = peek_type(ctx, right)?;
            let common = types::promote(&lty, &rty);
            Ok(if common.is_string() { TypeDescriptor::new(BaseType::Integer) } else { common })
        }
    }
}

fn emit_method_call(
    ctx: &mut RoutineCtx<'_>,
    receiver: &Expression,
    method: &str,
    args: &[Expression],
) -> Result<(String, TypeDescriptor), CodeGenError> {
    let (receiver_addr, _receiver_type) = expression_address(ctx, receiver)?;
    let mangled = ctx.mangler.method_name(method);
    let callee = mangled.trim_start_matches('$');

    let mut typed_args = vec![(QbeType::L, receiver_addr)];
    for arg in args {
        let (value, ty) = emit_expression(ctx, arg)?;
        typed_args.push((ty.qbe_type(), value));
    }
    let result = ctx.b.call(Some(QbeType::L), callee, &typed_args);
    Ok((result.unwrap_or_else(|| "0".to_string()), TypeDescriptor::new(BaseType::Long)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::IlBuilder;
    use crate::config::CodegenConfig;
    use crate::data::DataPreprocessorResult;
    use crate::mangle::NameMangler;
    use crate::symbols::{SymbolTable, VariableSymbol};
    use crate::types::BaseType;
    use super::super::context::FunctionContext;

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

    fn global_var(name: &str, base_type: BaseType) -> VariableSymbol {
        VariableSymbol {
            name: name.to_string(),
            type_descriptor: TypeDescriptor::new(base_type),
            scope: crate::symbols::Scope::Global,
            is_global: true,
            is_shared: false,
        }
    }

    #[test]
    fn small_int_literal_is_integer_typed() {
        let mut b = IlBuilder::new();
        let (_, ty) = emit_number_literal(
            &mut ctx_with(&mut b, &mut NameMangler::new(), &SymbolTable::new(), &CodegenConfig::new(), &DataPreprocessorResult::default()),
            NumberLiteral::Int(42),
        );
        assert_eq!(ty.base_type, BaseType::Integer);
    }

    #[test]
    fn out_of_range_int_literal_promotes_to_long() {
        let mut b = IlBuilder::new();
        let (_, ty) = emit_number_literal(
            &mut ctx_with(&mut b, &mut NameMangler::new(), &SymbolTable::new(), &CodegenConfig::new(), &DataPreprocessorResult::default()),
            NumberLiteral::Int(i64::from(i32::MAX) + 1),
        );
        assert_eq!(ty.base_type, BaseType::Long);
    }

    #[test]
    fn peek_type_does_not_default_a_long_binary_branch_to_integer() {
        let mut symbols = SymbolTable::new();
        symbols.variables.insert("L&".to_string(), global_var("L&", BaseType::Long));
        let mut b = IlBuilder::new();
        let mut mangler = NameMangler::new();
        let config = CodegenConfig::new();
        let data = DataPreprocessorResult::default();
        let mut ctx = ctx_with(&mut b, &mut mangler, &symbols, &config, &data);

        let expr = Expression::Binary {
            left: Box::new(Expression::Variable("L&".to_string())),
            op: BinaryOp::Add,
            right: Box::new(Expression::NumberLiteral(NumberLiteral::Int(1))),
        };
        let (_, ty) = peek_type(&mut ctx, &expr).expect("peek succeeds");
        assert_eq!(ty.base_type, BaseType::Long);
        assert!(ctx.b.text().is_empty(), "peek_type must not emit any instructions");
    }

    #[test]
    fn peek_type_treats_a_comparison_as_integer() {
        let symbols = SymbolTable::new();
        let mut b = IlBuilder::new();
        let mut mangler = NameMangler::new();
        let config = CodegenConfig::new();
        let data = DataPreprocessorResult::default();
        let mut ctx = ctx_with(&mut b, &mut mangler, &symbols, &config, &data);

        let expr = Expression::Binary {
            left: Box::new(Expression::NumberLiteral(NumberLiteral::Float(1.0))),
            op: BinaryOp::Lt,
            right: Box::new(Expression::NumberLiteral(NumberLiteral::Float(2.0))),
        };
        let (_, ty) = peek_type(&mut ctx, &expr).expect("peek succeeds");
        assert_eq!(ty.base_type, BaseType::Integer);
    }

    #[test]
    fn variable_slot_rejects_an_unallocated_local() {
        let mut symbols = SymbolTable::new();
        symbols.variables.insert(
            "X%".to_string(),
            VariableSymbol {
                name: "X%".to_string(),
                type_descriptor: TypeDescriptor::new(BaseType::Integer),
                scope: crate::symbols::Scope::function("Main"),
                is_global: false,
                is_shared: false,
            },
        );
        let mut b = IlBuilder::new();
        let mut mangler = NameMangler::new();
        let config = CodegenConfig::new();
        let data = DataPreprocessorResult::default();
        let mut ctx = ctx_with(&mut b, &mut mangler, &symbols, &config, &data);

        let err = variable_slot(&mut ctx, "X%").expect_err("local must be pre-allocated");
        assert!(err.to_string().contains("entry-block allocation"));
    }
}
