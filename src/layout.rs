//! User-defined type (record) layout: field offsets, size, and alignment.
//!
//! Fields are laid out flat in source order (nested UDTs are expanded
//! recursively, never boxed): each field's offset is rounded up to its own
//! natural alignment, and the final size is rounded up to the largest
//! field's alignment. A record tagged `simdEligible` by the frontend is
//! padded and aligned to 16 bytes regardless of what its fields would
//! otherwise require.

use crate::error::CodeGenError;
use crate::symbols::{SymbolTable, TypeSymbol};
use crate::types::{BaseType, TypeDescriptor};

fn pad_to(offset: u32, align: u32) -> u32 {
    if align == 0 {
        return offset;
    }
    offset.div_ceil(align) * align
}

/// Byte size and alignment of a scalar or (recursively) UDT-typed field.
fn field_size_align(
    t: &TypeDescriptor,
    symbols: &SymbolTable,
) -> Result<(u32, u32), CodeGenError> {
    if t.base_type == BaseType::UserDefined {
        let name = t
            .udt_name
            .as_deref()
            .ok_or_else(|| CodeGenError::Logic("USER_DEFINED field with no type name".into()))?;
        let layout = udt_layout(name, symbols)?;
        Ok((layout.size, layout.alignment))
    } else {
        Ok((t.size(), t.alignment()))
    }
}

#[derive(Debug, Clone)]
pub struct FieldOffset {
    pub name: String,
    pub offset: u32,
    pub type_descriptor: TypeDescriptor,
}

#[derive(Debug, Clone)]
pub struct UdtLayout {
    pub name: String,
    pub size: u32,
    pub alignment: u32,
    pub fields: Vec<FieldOffset>,
}

impl UdtLayout {
    pub fn field(&self, name: &str) -> Option<&FieldOffset> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Compute the flat layout of UDT `name`. Recurses into nested UDT fields
/// for size/alignment only; the layout itself stays flat (no boxing).
pub fn udt_layout(name: &str, symbols: &SymbolTable) -> Result<UdtLayout, CodeGenError> {
    let type_symbol: &TypeSymbol = symbols
        .udt(name)
        .ok_or_else(|| CodeGenError::undefined_type(name))?;

    let mut offset = 0u32;
    let mut max_align = 1u32;
    let mut fields = Vec::with_capacity(type_symbol.fields.len());

    for field in &type_symbol.fields {
        let (size, align) = field_size_align(&field.type_descriptor, symbols)?;
        offset = pad_to(offset, align);
        fields.push(FieldOffset {
            name: field.name.clone(),
            offset,
            type_descriptor: field.type_descriptor.clone(),
        });
        offset += size;
        max_align = max_align.max(align);
    }

    if type_symbol.simd_eligible {
        max_align = max_align.max(16);
    }

    let size = pad_to(offset, max_align);

    Ok(UdtLayout {
        name: type_symbol.name.clone(),
        size,
        alignment: max_align,
        fields,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::UdtField;

    fn point_table() -> SymbolTable {
        let mut symbols = SymbolTable::new();
        symbols.types.insert(
            "Point".to_string(),
            TypeSymbol {
                name: "Point".to_string(),
                fields: vec![
                    UdtField {
                        name: "X".to_string(),
                        type_descriptor: TypeDescriptor::new(BaseType::Integer),
                    },
                    UdtField {
                        name: "Y".to_string(),
                        type_descriptor: TypeDescriptor::new(BaseType::Integer),
                    },
                    UdtField {
                        name: "NAME".to_string(),
                        type_descriptor: TypeDescriptor::new(BaseType::String),
                    },
                ],
                simd_eligible: false,
            },
        );
        symbols
    }

    #[test]
    fn point_layout_matches_scenario_5() {
        let symbols = point_table();
        let layout = udt_layout("Point", &symbols).unwrap();
        assert_eq!(layout.field("X").unwrap().offset, 0);
        assert_eq!(layout.field("Y").unwrap().offset, 4);
        assert_eq!(layout.field("NAME").unwrap().offset, 8);
        assert_eq!(layout.size, 16);
    }

    #[test]
    fn simd_eligible_pads_to_16() {
        let mut symbols = SymbolTable::new();
        symbols.types.insert(
            "Vec3".to_string(),
            TypeSymbol {
                name: "Vec3".to_string(),
                fields: vec![
                    UdtField {
                        name: "X".to_string(),
                        type_descriptor: TypeDescriptor::new(BaseType::Single),
                    },
                    UdtField {
                        name: "Y".to_string(),
                        type_descriptor: TypeDescriptor::new(BaseType::Single),
                    },
                    UdtField {
                        name: "Z".to_string(),
                        type_descriptor: TypeDescriptor::new(BaseType::Single),
                    },
                ],
                simd_eligible: true,
            },
        );
        let layout = udt_layout("Vec3", &symbols).unwrap();
        assert_eq!(layout.alignment, 16);
        assert_eq!(layout.size % 16, 0);
    }

    #[test]
    fn nested_udt_is_flattened_by_size() {
        let mut symbols = point_table();
        symbols.types.insert(
            "Line".to_string(),
            TypeSymbol {
                name: "Line".to_string(),
                fields: vec![
                    UdtField {
                        name: "START".to_string(),
                        type_descriptor: TypeDescriptor::udt("Point"),
                    },
                    UdtField {
                        name: "END".to_string(),
                        type_descriptor: TypeDescriptor::udt("Point"),
                    },
                ],
                simd_eligible: false,
            },
        );
        let layout = udt_layout("Line", &symbols).unwrap();
        assert_eq!(layout.field("START").unwrap().offset, 0);
        assert_eq!(layout.field("END").unwrap().offset, 16);
        assert_eq!(layout.size, 32);
    }
}
