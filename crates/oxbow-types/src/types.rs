//! C-like type representation.
//!
//! All sizes and offsets are in bits. A size of 0 means "size not yet
//! known"; such a type still compares equal to a sized type of the same
//! class when matched broadly.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Signedness of an integer type.
///
/// Tracked as a tri-state because lifted code frequently leaves it
/// undetermined until type analysis runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Signedness {
    Signed,
    #[default]
    Unknown,
    Unsigned,
}

/// A type, as attached to expressions and signature entries.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Type {
    /// void: no value.
    Void,

    /// Boolean.
    Boolean,

    /// 8-bit character.
    Char,

    /// Integer of the given size in bits (0 = unknown size).
    Integer { size: u32, signedness: Signedness },

    /// Floating point of the given size in bits.
    Float { size: u32 },

    /// Pointer to another type.
    Pointer(Box<Type>),

    /// Array of elements.
    Array(ArrayType),

    /// Structure with sequentially laid out fields.
    Compound(CompoundType),

    /// A type about which only the size is known. Produced by the decoder
    /// for memory accesses before inference assigns a real type.
    Size(u32),

    /// A type variable, used by the constraint generator for
    /// not-yet-resolved pointer targets.
    Alpha(u32),
}

/// Array type: element type plus optional length (element count).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArrayType {
    pub base: Box<Type>,
    pub length: Option<u32>,
}

/// One field of a compound.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Field {
    pub ty: Type,
    pub name: String,
}

/// A compound (struct) type. Fields are laid out sequentially with no
/// padding model beyond explicit `pad` fields inserted by the loader.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CompoundType {
    pub fields: Vec<Field>,
}

impl Type {
    /// Integer with unknown signedness.
    pub fn int(size: u32) -> Type {
        Type::Integer {
            size,
            signedness: Signedness::Unknown,
        }
    }

    /// Signed integer.
    pub fn int_signed(size: u32) -> Type {
        Type::Integer {
            size,
            signedness: Signedness::Signed,
        }
    }

    pub fn float(size: u32) -> Type {
        Type::Float { size }
    }

    pub fn pointer(to: Type) -> Type {
        Type::Pointer(Box::new(to))
    }

    pub fn array(base: Type, length: Option<u32>) -> Type {
        Type::Array(ArrayType {
            base: Box::new(base),
            length,
        })
    }

    /// Size of this type in bits. 0 for incomplete types.
    pub fn size(&self) -> u32 {
        match self {
            Type::Void => 0,
            Type::Boolean => 1,
            Type::Char => 8,
            Type::Integer { size, .. } => *size,
            Type::Float { size } => *size,
            Type::Pointer(_) => crate::STD_SIZE,
            Type::Array(a) => a.base.size() * a.length.unwrap_or(0),
            Type::Compound(c) => c.size(),
            Type::Size(size) => *size,
            Type::Alpha(_) => 0,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Type::Integer { .. })
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Type::Float { .. })
    }

    pub fn is_char(&self) -> bool {
        matches!(self, Type::Char)
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Pointer(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array(_))
    }

    pub fn is_compound(&self) -> bool {
        matches!(self, Type::Compound(_))
    }

    /// True for `ptr(alpha)`: a pointer whose target is still a type
    /// variable. Constraint simplification must not fold comparisons
    /// involving these.
    pub fn is_pointer_to_alpha(&self) -> bool {
        matches!(self, Type::Pointer(t) if matches!(**t, Type::Alpha(_)))
    }

    /// The pointed-to type, if this is a pointer.
    pub fn points_to(&self) -> Option<&Type> {
        match self {
            Type::Pointer(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayType> {
        match self {
            Type::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_compound(&self) -> Option<&CompoundType> {
        match self {
            Type::Compound(c) => Some(c),
            _ => None,
        }
    }

    /// Broad comparison: same class of type, ignoring sizes and
    /// signedness. Used when a constraint only pins the class.
    pub fn broad_eq(&self, other: &Type) -> bool {
        match (self, other) {
            (Type::Integer { .. }, Type::Integer { .. }) => true,
            (Type::Float { .. }, Type::Float { .. }) => true,
            (Type::Pointer(_), Type::Pointer(_)) => true,
            (Type::Size(_), Type::Size(_)) => true,
            _ => self == other,
        }
    }

    /// Same type with the size replaced. Classes without a size are
    /// returned unchanged.
    pub fn with_size(&self, size: u32) -> Type {
        match self {
            Type::Integer { signedness, .. } => Type::Integer {
                size,
                signedness: *signedness,
            },
            Type::Float { .. } => Type::Float { size },
            Type::Size(_) => Type::Size(size),
            other => other.clone(),
        }
    }

    /// Rough C rendering, for diagnostics and signature printing.
    pub fn ctype(&self) -> String {
        match self {
            Type::Void => "void".into(),
            Type::Boolean => "bool".into(),
            Type::Char => "char".into(),
            Type::Integer { size, signedness } => {
                let base = match size {
                    0 => "int".into(),
                    8 => "char".into(),
                    16 => "short".into(),
                    32 => "int".into(),
                    64 => "long long".into(),
                    n => format!("int{n}"),
                };
                if *signedness == Signedness::Unsigned {
                    format!("unsigned {base}")
                } else {
                    base
                }
            }
            Type::Float { size } => match size {
                32 => "float".into(),
                64 => "double".into(),
                n => format!("float{n}"),
            },
            Type::Pointer(t) => format!("{} *", t.ctype()),
            Type::Array(a) => match a.length {
                Some(n) => format!("{}[{}]", a.base.ctype(), n),
                None => format!("{}[]", a.base.ctype()),
            },
            Type::Compound(_) => "struct".into(),
            Type::Size(n) => format!("__size{n}"),
            Type::Alpha(n) => format!("alpha{n}"),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.ctype())
    }
}

impl CompoundType {
    pub fn new(fields: Vec<Field>) -> CompoundType {
        CompoundType { fields }
    }

    /// Total size in bits.
    pub fn size(&self) -> u32 {
        self.fields.iter().map(|f| f.ty.size()).sum()
    }

    /// The field covering the given bit offset, with the offset of its
    /// start, or None when the offset is past the end.
    fn field_at(&self, bit_offset: u32) -> Option<(&Field, u32)> {
        let mut start = 0;
        for f in &self.fields {
            let sz = f.ty.size();
            if bit_offset < start + sz {
                return Some((f, start));
            }
            start += sz;
        }
        None
    }

    /// Name of the field covering the given bit offset.
    pub fn name_at_offset(&self, bit_offset: u32) -> Option<&str> {
        self.field_at(bit_offset).map(|(f, _)| f.name.as_str())
    }

    /// Type of the field covering the given bit offset.
    pub fn type_at_offset(&self, bit_offset: u32) -> Option<&Type> {
        self.field_at(bit_offset).map(|(f, _)| &f.ty)
    }

    /// How far into the covering field the given bit offset lands.
    pub fn offset_remainder(&self, bit_offset: u32) -> u32 {
        match self.field_at(bit_offset) {
            Some((_, start)) => bit_offset - start,
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point() -> CompoundType {
        CompoundType::new(vec![
            Field {
                ty: Type::int(32),
                name: "x".into(),
            },
            Field {
                ty: Type::int(32),
                name: "y".into(),
            },
        ])
    }

    #[test]
    fn sizes() {
        assert_eq!(Type::int(32).size(), 32);
        assert_eq!(Type::pointer(Type::Void).size(), 32);
        assert_eq!(Type::array(Type::int(16), Some(4)).size(), 64);
        assert_eq!(Type::Compound(point()).size(), 64);
    }

    #[test]
    fn compound_offsets() {
        let c = point();
        assert_eq!(c.name_at_offset(0), Some("x"));
        assert_eq!(c.name_at_offset(32), Some("y"));
        assert_eq!(c.name_at_offset(40), Some("y"));
        assert_eq!(c.name_at_offset(64), None);
        assert_eq!(c.offset_remainder(40), 8);
        assert_eq!(c.type_at_offset(32), Some(&Type::int(32)));
    }

    #[test]
    fn broad_match_ignores_size() {
        assert!(Type::int(0).broad_eq(&Type::int_signed(32)));
        assert!(Type::float(32).broad_eq(&Type::float(64)));
        assert!(!Type::int(32).broad_eq(&Type::float(32)));
        assert!(Type::pointer(Type::Char).broad_eq(&Type::pointer(Type::Void)));
    }

    #[test]
    fn pointer_to_alpha() {
        assert!(Type::pointer(Type::Alpha(1)).is_pointer_to_alpha());
        assert!(!Type::pointer(Type::Char).is_pointer_to_alpha());
    }

    #[test]
    fn serde_round_trip() {
        let t = Type::pointer(Type::Compound(point()));
        let s = serde_json::to_string(&t).unwrap();
        let back: Type = serde_json::from_str(&s).unwrap();
        assert_eq!(t, back);
    }
}
