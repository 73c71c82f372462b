//! Thin typed emitters for calls into the externally linked C runtime
//! library. The rest of codegen speaks in BASIC-level operations (`concat`,
//! `retain`, `print_int`) rather than raw `call` instructions; this module
//! is the one place that knows the runtime's symbol names, argument order,
//! and typing discipline (the ABI boundary documented in the design's
//! external interfaces section).

use crate::builder::IlBuilder;
use crate::types::{BaseType, QbeType, TypeDescriptor};

/// Sentinel passed to `string_mid` meaning "to the end of the string".
pub const MID_TO_END: i64 = i32::MAX as i64;

pub struct RuntimeShim;

impl RuntimeShim {
    // -- print / output ---------------------------------------------------

    pub fn print_int(b: &mut IlBuilder, value: &str, base_type: BaseType) {
        let name = match base_type {
            BaseType::Long => "rt_print_i64",
            BaseType::ULong => "rt_print_u64",
            BaseType::UInteger | BaseType::UShort | BaseType::UByte => "rt_print_u32",
            _ => "rt_print_i32",
        };
        let ty = if matches!(base_type, BaseType::Long | BaseType::ULong) {
            QbeType::L
        } else {
            QbeType::W
        };
        b.call(None, name, &[(ty, value.to_string())]);
    }

    pub fn print_single(b: &mut IlBuilder, value: &str) {
        b.call(None, "rt_print_single", &[(QbeType::S, value.to_string())]);
    }

    pub fn print_double(b: &mut IlBuilder, value: &str) {
        b.call(None, "rt_print_double", &[(QbeType::D, value.to_string())]);
    }

    pub fn print_string(b: &mut IlBuilder, descriptor: &str) {
        b.call(None, "rt_print_string", &[(QbeType::L, descriptor.to_string())]);
    }

    pub fn print_newline(b: &mut IlBuilder) {
        b.call(None, "rt_print_newline", &[]);
    }

    pub fn print_tab(b: &mut IlBuilder) {
        b.call(None, "rt_print_tab", &[]);
    }

    // -- string ops ---------------------------------------------------------

    pub fn concat(b: &mut IlBuilder, lhs: &str, rhs: &str) -> String {
        b.call(
            Some(QbeType::L),
            "string_concat",
            &[(QbeType::L, lhs.to_string()), (QbeType::L, rhs.to_string())],
        )
        .expect("string_concat always returns a descriptor")
    }

    pub fn len(b: &mut IlBuilder, s: &str) -> String {
        b.call(Some(QbeType::W), "string_len", &[(QbeType::L, s.to_string())])
            .expect("string_len always returns a word")
    }

    pub fn chr(b: &mut IlBuilder, code_point: &str) -> String {
        b.call(Some(QbeType::L), "string_chr", &[(QbeType::W, code_point.to_string())])
            .expect("string_chr always returns a descriptor")
    }

    pub fn asc(b: &mut IlBuilder, s: &str) -> String {
        b.call(Some(QbeType::W), "string_asc", &[(QbeType::L, s.to_string())])
            .expect("string_asc always returns a word")
    }

    pub fn mid(b: &mut IlBuilder, s: &str, start: &str, length: &str) -> String {
        b.call(
            Some(QbeType::L),
            "string_mid",
            &[
                (QbeType::L, s.to_string()),
                (QbeType::W, start.to_string()),
                (QbeType::W, length.to_string()),
            ],
        )
        .expect("string_mid always returns a descriptor")
    }

    pub fn left(b: &mut IlBuilder, s: &str, count: &str) -> String {
        b.call(
            Some(QbeType::L),
            "string_left",
            &[(QbeType::L, s.to_string()), (QbeType::W, count.to_string())],
        )
        .expect("string_left always returns a descriptor")
    }

    pub fn right(b: &mut IlBuilder, s: &str, count: &str) -> String {
        b.call(
            Some(QbeType::L),
            "string_right",
            &[(QbeType::L, s.to_string()), (QbeType::W, count.to_string())],
        )
        .expect("string_right always returns a descriptor")
    }

    pub fn ucase(b: &mut IlBuilder, s: &str) -> String {
        b.call(Some(QbeType::L), "string_ucase", &[(QbeType::L, s.to_string())])
            .expect("string_ucase always returns a descriptor")
    }

    pub fn lcase(b: &mut IlBuilder, s: &str) -> String {
        b.call(Some(QbeType::L), "string_lcase", &[(QbeType::L, s.to_string())])
            .expect("string_lcase always returns a descriptor")
    }

    /// Returns a word in `{-1, 0, 1}`.
    pub fn compare(b: &mut IlBuilder, lhs: &str, rhs: &str) -> String {
        b.call(
            Some(QbeType::W),
            "string_compare",
            &[(QbeType::L, lhs.to_string()), (QbeType::L, rhs.to_string())],
        )
        .expect("string_compare always returns a word")
    }

    // -- string lifecycle -----------------------------------------------

    /// Deep-copy `s` into a freshly allocated, uniquely owned buffer.
    /// Needed before any in-place mutation (e.g. a slice assignment) of a
    /// descriptor that may be `retain`-shared with another variable.
    pub fn clone_string(b: &mut IlBuilder, s: &str) -> String {
        b.call(Some(QbeType::L), "string_clone", &[(QbeType::L, s.to_string())])
            .expect("string_clone always returns a descriptor")
    }

    pub fn retain(b: &mut IlBuilder, s: &str) -> String {
        b.call(Some(QbeType::L), "string_retain", &[(QbeType::L, s.to_string())])
            .expect("string_retain always returns its argument")
    }

    pub fn release(b: &mut IlBuilder, s: &str) {
        b.call(None, "string_release", &[(QbeType::L, s.to_string())]);
    }

    // -- arrays --------------------------------------------------------

    pub fn array_bounds_check(b: &mut IlBuilder, index: &str, length: &str) {
        b.call(
            None,
            "rt_array_bounds_check",
            &[(QbeType::W, index.to_string()), (QbeType::W, length.to_string())],
        );
    }

    pub fn array_alloc(b: &mut IlBuilder, descriptor_addr: &str, element_size: &str, count: &str) {
        b.call(
            None,
            "rt_array_alloc",
            &[
                (QbeType::L, descriptor_addr.to_string()),
                (QbeType::W, element_size.to_string()),
                (QbeType::W, count.to_string()),
            ],
        );
    }

    pub fn array_free(b: &mut IlBuilder, descriptor_addr: &str) {
        b.call(None, "rt_array_free", &[(QbeType::L, descriptor_addr.to_string())]);
    }

    // -- math -----------------------------------------------------------------

    pub fn math_unary(b: &mut IlBuilder, name: &str, ty: QbeType, value: &str) -> String {
        b.call(Some(ty), name, &[(ty, value.to_string())])
            .expect("math runtime helpers always return a value")
    }

    pub fn timer(b: &mut IlBuilder) -> String {
        b.call(Some(QbeType::D), "rt_timer", &[])
            .expect("rt_timer always returns a double")
    }

    pub fn rnd(b: &mut IlBuilder, seed: &str) -> String {
        b.call(Some(QbeType::D), "rt_rnd", &[(QbeType::D, seed.to_string())])
            .expect("rt_rnd always returns a double")
    }

    // -- input ------------------------------------------------------------

    pub fn input_int(b: &mut IlBuilder) -> String {
        b.call(Some(QbeType::W), "rt_input_int", &[])
            .expect("rt_input_int always returns a word")
    }

    pub fn input_single(b: &mut IlBuilder) -> String {
        b.call(Some(QbeType::S), "rt_input_single", &[])
            .expect("rt_input_single always returns a single")
    }

    pub fn input_double(b: &mut IlBuilder) -> String {
        b.call(Some(QbeType::D), "rt_input_double", &[])
            .expect("rt_input_double always returns a double")
    }

    pub fn input_string(b: &mut IlBuilder) -> String {
        b.call(Some(QbeType::L), "rt_input_string", &[])
            .expect("rt_input_string always returns a descriptor")
    }

    // -- conversion -------------------------------------------------------

    pub fn str_from(b: &mut IlBuilder, value: &str, ty: QbeType) -> String {
        b.call(Some(QbeType::L), "rt_str", &[(ty, value.to_string())])
            .expect("rt_str always returns a descriptor")
    }

    pub fn val(b: &mut IlBuilder, s: &str) -> String {
        b.call(Some(QbeType::D), "rt_val", &[(QbeType::L, s.to_string())])
            .expect("rt_val always returns a double")
    }

    // -- control -----------------------------------------------------------

    pub fn end_program(b: &mut IlBuilder) {
        b.call(None, "rt_end", &[]);
    }

    pub fn runtime_error(b: &mut IlBuilder, code: i64, message_descriptor: &str) {
        b.call(
            None,
            "rt_runtime_error",
            &[(QbeType::W, code.to_string()), (QbeType::L, message_descriptor.to_string())],
        );
    }

    pub fn memset(b: &mut IlBuilder, address: &str, byte_value: i64, count: u32) {
        b.call(
            None,
            "memset",
            &[
                (QbeType::L, address.to_string()),
                (QbeType::W, byte_value.to_string()),
                (QbeType::L, count.to_string()),
            ],
        );
    }

    /// Slice-assign runtime hook for `s$(a TO b) = r$`.
    pub fn slice_assign(b: &mut IlBuilder, dest_addr: &str, from: &str, to: &str, value: &str) {
        b.call(
            None,
            "string_slice_assign",
            &[
                (QbeType::L, dest_addr.to_string()),
                (QbeType::W, from.to_string()),
                (QbeType::W, to.to_string()),
                (QbeType::L, value.to_string()),
            ],
        );
    }
}

/// Choose the `print_*` family for a value of the given type.
pub fn print_dispatch_kind(t: &TypeDescriptor) -> PrintKind {
    match t.base_type {
        BaseType::Single => PrintKind::Single,
        BaseType::Double => PrintKind::Double,
        BaseType::String | BaseType::Unicode => PrintKind::String,
        _ => PrintKind::Int(t.base_type),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintKind {
    Int(BaseType),
    Single,
    Double,
    String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn print_int_dispatches_on_width_and_signedness() {
        let mut b = IlBuilder::new();
        RuntimeShim::print_int(&mut b, "%x", BaseType::Integer);
        RuntimeShim::print_int(&mut b, "%y", BaseType::Long);
        RuntimeShim::print_int(&mut b, "%z", BaseType::UInteger);
        let text = b.finish();
        assert!(text.contains("call $rt_print_i32(w %x)"));
        assert!(text.contains("call $rt_print_i64(l %y)"));
        assert!(text.contains("call $rt_print_u32(w %z)"));
    }

    #[test]
    fn array_bounds_check_passes_index_and_length() {
        let mut b = IlBuilder::new();
        RuntimeShim::array_bounds_check(&mut b, "%i", "%n");
        assert!(b.finish().contains("call $rt_array_bounds_check(w %i, w %n)"));
    }

    #[test]
    fn runtime_error_passes_code_and_message() {
        let mut b = IlBuilder::new();
        RuntimeShim::runtime_error(&mut b, 7, "$str_0");
        assert!(b.finish().contains("call $rt_runtime_error(w 7, l $str_0)"));
    }

    #[test]
    fn memset_passes_address_value_and_count() {
        let mut b = IlBuilder::new();
        RuntimeShim::memset(&mut b, "%p", 0, 16);
        assert!(b.finish().contains("call $memset(l %p, w 0, l 16)"));
    }

    #[test]
    fn concat_returns_a_descriptor_temp() {
        let mut b = IlBuilder::new();
        let dest = RuntimeShim::concat(&mut b, "%a", "%b");
        assert!(b.finish().contains(&format!("{} =l call $string_concat(l %a, l %b)", dest)));
    }

    #[test]
    fn print_dispatch_kind_maps_base_types() {
        assert_eq!(
            print_dispatch_kind(&TypeDescriptor::new(BaseType::Single)),
            PrintKind::Single
        );
        assert_eq!(
            print_dispatch_kind(&TypeDescriptor::new(BaseType::Double)),
            PrintKind::Double
        );
        assert_eq!(
            print_dispatch_kind(&TypeDescriptor::new(BaseType::String)),
            PrintKind::String
        );
        assert_eq!(
            print_dispatch_kind(&TypeDescriptor::new(BaseType::Integer)),
            PrintKind::Int(BaseType::Integer)
        );
    }
}
