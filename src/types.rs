//! BASIC type system as seen by the code generator: the QBE mapping,
//! UDT layout, arithmetic promotion, and conversion op selection.
//!
//! This is the target-facing half of the type system; the frontend's
//! richer type-checking lattice is out of scope here. The codegen only
//! needs: "what QBE type/size/alignment does this BASIC type have" and
//! "what is the common type of these two operands".

use serde::{Deserialize, Serialize};

/// BASIC base types, as resolved by semantic analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BaseType {
    Byte,
    UByte,
    Short,
    UShort,
    Integer,
    UInteger,
    Long,
    ULong,
    Single,
    Double,
    String,
    Unicode,
    UserDefined,
    Object,
    Void,
}

/// A QBE base type character: `w` (word), `l` (long), `s` (single), `d` (double).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QbeType {
    W,
    L,
    S,
    D,
}

impl QbeType {
    /// The character QBE uses for this type in instructions (`loadw`, `add`, ...).
    pub fn letter(self) -> char {
        match self {
            QbeType::W => 'w',
            QbeType::L => 'l',
            QbeType::S => 's',
            QbeType::D => 'd',
        }
    }
}

impl std::fmt::Display for QbeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// A resolved BASIC type: a base type plus, for `USER_DEFINED`, the name of
/// the record type it refers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub base_type: BaseType,
    pub udt_name: Option<String>,
}

impl TypeDescriptor {
    pub fn new(base_type: BaseType) -> Self {
        TypeDescriptor {
            base_type,
            udt_name: None,
        }
    }

    pub fn udt(name: impl Into<String>) -> Self {
        TypeDescriptor {
            base_type: BaseType::UserDefined,
            udt_name: Some(name.into()),
        }
    }

    pub fn is_string(&self) -> bool {
        matches!(self.base_type, BaseType::String | BaseType::Unicode)
    }

    pub fn is_udt(&self) -> bool {
        self.base_type == BaseType::UserDefined
    }

    pub fn is_reference_counted(&self) -> bool {
        self.is_string()
    }

    /// QBE type character used for loads, stores, and arithmetic on this type.
    /// Strings, UDTs, and objects are pointer-sized (`l`); everything else
    /// follows the table in the design doc.
    pub fn qbe_type(&self) -> QbeType {
        match self.base_type {
            BaseType::Byte | BaseType::UByte => QbeType::W,
            BaseType::Short | BaseType::UShort => QbeType::W,
            BaseType::Integer | BaseType::UInteger => QbeType::W,
            BaseType::Single => QbeType::S,
            BaseType::Long | BaseType::ULong => QbeType::L,
            BaseType::Double => QbeType::D,
            BaseType::String
            | BaseType::Unicode
            | BaseType::UserDefined
            | BaseType::Object => QbeType::L,
            BaseType::Void => QbeType::W, // never actually emitted; placeholder
        }
    }

    /// Size in bytes, for non-UDT scalar types. UDT sizes come from
    /// [`crate::layout::udt_size`] instead, since they require the symbol
    /// table's field list.
    pub fn size(&self) -> u32 {
        match self.base_type {
            BaseType::Byte | BaseType::UByte => 1,
            BaseType::Short | BaseType::UShort => 2,
            BaseType::Integer | BaseType::UInteger => 4,
            BaseType::Single => 4,
            BaseType::Long | BaseType::ULong => 8,
            BaseType::Double => 8,
            BaseType::String
            | BaseType::Unicode
            | BaseType::UserDefined
            | BaseType::Object => 8,
            BaseType::Void => 0,
        }
    }

    pub fn alignment(&self) -> u32 {
        // Every scalar's natural alignment equals its size except sub-word
        // ints, which align to their own size too (1, 2, 4).
        self.size().max(1)
    }

    /// Rank used by [`promote`]: higher wins ties against lower.
    fn numeric_rank(&self) -> u8 {
        match self.base_type {
            BaseType::Double => 6,
            BaseType::Single => 5,
            BaseType::Long | BaseType::ULong => 4,
            BaseType::Integer | BaseType::UInteger => 3,
            BaseType::Short | BaseType::UShort => 2,
            BaseType::Byte | BaseType::UByte => 1,
            _ => 0,
        }
    }
}

impl std::fmt::Display for BaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BaseType::Byte => "BYTE",
            BaseType::UByte => "UBYTE",
            BaseType::Short => "SHORT",
            BaseType::UShort => "USHORT",
            BaseType::Integer => "INTEGER",
            BaseType::UInteger => "UINTEGER",
            BaseType::Long => "LONG",
            BaseType::ULong => "ULONG",
            BaseType::Single => "SINGLE",
            BaseType::Double => "DOUBLE",
            BaseType::String => "STRING",
            BaseType::Unicode => "UNICODE",
            BaseType::UserDefined => "USER_DEFINED",
            BaseType::Object => "OBJECT",
            BaseType::Void => "VOID",
        };
        write!(f, "{}", name)
    }
}

/// Arithmetic-type promotion for a binary operator applied to `lhs`/`rhs`.
///
/// STRING dominates any mix (the caller is assumed to have already rejected
/// combinations semantic analysis should have caught, e.g. UDT + INTEGER).
/// Otherwise the widest type by rank wins; unsigned variants share their
/// signed counterpart's rank and the result keeps the `lhs` signedness in
/// ties at the same base rank, defaulting to `INTEGER` when both operands
/// are smaller (BYTE/SHORT mixes promote up to INTEGER, matching QBE's lack
/// of sub-word arithmetic).
pub fn promote(lhs: &TypeDescriptor, rhs: &TypeDescriptor) -> TypeDescriptor {
    if lhs.is_string() || rhs.is_string() {
        return TypeDescriptor::new(BaseType::String);
    }

    let (wider, narrower) = if lhs.numeric_rank() >= rhs.numeric_rank() {
        (lhs, rhs)
    } else {
        (rhs, lhs)
    };

    if wider.numeric_rank() <= TypeDescriptor::new(BaseType::Integer).numeric_rank() {
        let _ = narrower;
        return TypeDescriptor::new(BaseType::Integer);
    }

    wider.clone()
}

/// The QBE conversion instruction mnemonic(s) needed to go from `from` to
/// `to`. Some conversions require two steps (e.g. `w -> d` goes through
/// `l`), which the caller emits as two instructions through an intermediate
/// temporary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertOp {
    /// Single instruction, e.g. `extsw`.
    Single(&'static str),
    /// Two instructions chained through an intermediate value of the given
    /// QBE type, e.g. `w -> d` is `extsw` then `sltof`.
    Chained(&'static str, QbeType, &'static str),
    /// No-op: value representation already matches (e.g. narrowing `l -> w`
    /// is a value-preserving copy under QBE's semantics).
    Copy,
}

pub fn conversion(from: QbeType, to: QbeType) -> ConvertOp {
    use QbeType::*;
    match (from, to) {
        (a, b) if a == b => ConvertOp::Copy,
        (W, L) => ConvertOp::Single("extsw"),
        (W, S) => ConvertOp::Single("swtof"),
        (W, D) => ConvertOp::Chained("extsw", L, "sltof"),
        (L, W) => ConvertOp::Copy,
        (L, S) => ConvertOp::Single("sltof"),
        (L, D) => ConvertOp::Single("sltof"),
        (S, W) => ConvertOp::Single("stosi"),
        (S, L) => ConvertOp::Chained("stosi", W, "extsw"),
        (S, D) => ConvertOp::Single("exts"),
        (D, W) => ConvertOp::Single("dtosi"),
        (D, L) => ConvertOp::Chained("dtosi", W, "extsw"),
        (D, S) => ConvertOp::Single("truncd"),
    }
}

/// Suffix appended to a `FUNCTION`'s name to build its shadow return-value
/// local (BASIC lets a function body assign to its own name to set the
/// return value).
pub fn return_suffix(t: &TypeDescriptor) -> &'static str {
    match t.base_type {
        BaseType::Integer | BaseType::UInteger => "_INT",
        BaseType::Long | BaseType::ULong => "_LONG",
        BaseType::Short | BaseType::UShort => "_SHORT",
        BaseType::Byte | BaseType::UByte => "_BYTE",
        BaseType::Single => "_FLOAT",
        BaseType::Double => "_DOUBLE",
        BaseType::String | BaseType::Unicode => "_STRING",
        BaseType::UserDefined | BaseType::Object | BaseType::Void => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promote_picks_widest_numeric() {
        let d = TypeDescriptor::new(BaseType::Double);
        let i = TypeDescriptor::new(BaseType::Integer);
        assert_eq!(promote(&d, &i).base_type, BaseType::Double);
        assert_eq!(promote(&i, &d).base_type, BaseType::Double);
    }

    #[test]
    fn promote_string_dominates() {
        let s = TypeDescriptor::new(BaseType::String);
        let i = TypeDescriptor::new(BaseType::Integer);
        assert_eq!(promote(&s, &i).base_type, BaseType::String);
    }

    #[test]
    fn promote_small_ints_default_to_integer() {
        let b = TypeDescriptor::new(BaseType::Byte);
        let sh = TypeDescriptor::new(BaseType::Short);
        assert_eq!(promote(&b, &sh).base_type, BaseType::Integer);
    }

    #[test]
    fn qbe_type_mapping_matches_table() {
        assert_eq!(TypeDescriptor::new(BaseType::Integer).qbe_type(), QbeType::W);
        assert_eq!(TypeDescriptor::new(BaseType::Long).qbe_type(), QbeType::L);
        assert_eq!(TypeDescriptor::new(BaseType::Single).qbe_type(), QbeType::S);
        assert_eq!(TypeDescriptor::new(BaseType::Double).qbe_type(), QbeType::D);
        assert_eq!(TypeDescriptor::new(BaseType::String).qbe_type(), QbeType::L);
    }

    #[test]
    fn conversion_w_to_d_is_chained() {
        match conversion(QbeType::W, QbeType::D) {
            ConvertOp::Chained("extsw", QbeType::L, "sltof") => {}
            other => panic!("unexpected conversion: {:?}", other),
        }
    }
}
