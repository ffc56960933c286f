//! Static type graph shared by every backend (`spec.md` component C).
//!
//! A `Type` describes the *shape* of a value the same way the original's
//! `coda_type` hierarchy does, but as a Rust tagged union instead of a
//! family of opaque structs behind a common base. Types form a DAG and are
//! shared by reference (`Rc`) the way `adbf_rs`'s `FieldMeta` values are
//! shared across a `Table`'s column list, generalized here to a recursive
//! tree instead of a flat field list.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// The product format a type belongs to. Carried on every `Type` the way
/// the original tags every `coda_type` with a `coda_format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Ascii,
    Binary,
    Xml,
    Hdf4,
    Hdf5,
    Cdf,
    NetCdf,
    Grib,
    Rinex,
    Sp3,
}

/// The primitive representation a numeric or text value decodes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadAs {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    Char,
    String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberClass {
    Integer,
    Real,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Big,
    Little,
}

/// A reference-counted handle into the static type graph. Cloning is
/// cheap (refcount bump); the graph itself is a DAG, never deep-copied.
pub type TypeRef = Rc<Type>;

/// Definition identity is reference identity, not structural equality: two
/// separately-built records with the same fields are still different
/// definitions (`spec.md` §3.2 invariant 2 compares `definition` pointers).
pub fn same_type(a: &TypeRef, b: &TypeRef) -> bool {
    Rc::ptr_eq(a, b)
}

pub fn same_type_opt(a: Option<TypeRef>, b: &TypeRef) -> bool {
    matches!(a, Some(a) if Rc::ptr_eq(&a, b))
}

/// One field of a `Record` type.
#[derive(Debug, Clone)]
pub struct Field {
    pub real_name: String,
    pub sanitized_name: String,
    pub field_type: TypeRef,
    pub optional: bool,
}

/// One dimension of an `Array` type: either a fixed extent or a reference
/// to an externally-evaluated expression (out of scope for this core; see
/// `spec.md` Non-goals for the expression compiler).
#[derive(Debug, Clone)]
pub enum Dimension {
    Fixed(i64),
    Variable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialKind {
    Time,
    NoData,
}

/// The recursive shape-describing value. Every variant carries the common
/// `format`/`description`/`attributes` metadata via `Common`.
#[derive(Debug)]
pub enum Type {
    Number {
        common: Common,
        class: NumberClass,
        read_as: ReadAs,
        byte_size: Option<i64>,
        endianness: Option<Endianness>,
        unit: Option<String>,
    },
    Text {
        common: Common,
        read_as: ReadAs,
        byte_size: Option<i64>,
    },
    Raw {
        common: Common,
        byte_size: Option<i64>,
    },
    Record {
        common: Common,
        fields: Vec<Field>,
        real_name_index: HashMap<String, usize>,
        sanitized_name_index: HashMap<String, usize>,
        is_union: bool,
    },
    Array {
        common: Common,
        base_type: TypeRef,
        dims: Vec<Dimension>,
    },
    Special {
        common: Common,
        kind: SpecialKind,
        base_type: TypeRef,
    },
}

/// Metadata shared by every `Type` variant: format tag, optional
/// human-readable description, optional attributes record, and a
/// reference count proxied by `Rc` itself (kept here only as a
/// `RefCell<u64>` for diagnostics, since `Rc::strong_count` already
/// governs actual lifetime).
#[derive(Debug)]
pub struct Common {
    pub format: Format,
    pub description: Option<String>,
    pub attributes: RefCell<Option<TypeRef>>,
}

impl Common {
    pub fn new(format: Format) -> Self {
        Common { format, description: None, attributes: RefCell::new(None) }
    }

    pub fn with_description(format: Format, description: impl Into<String>) -> Self {
        Common { format, description: Some(description.into()), attributes: RefCell::new(None) }
    }
}

impl Type {
    pub fn common(&self) -> &Common {
        match self {
            Type::Number { common, .. }
            | Type::Text { common, .. }
            | Type::Raw { common, .. }
            | Type::Record { common, .. }
            | Type::Array { common, .. }
            | Type::Special { common, .. } => common,
        }
    }

    pub fn format(&self) -> Format {
        self.common().format
    }

    pub fn attributes(&self) -> Option<TypeRef> {
        self.common().attributes.borrow().clone()
    }

    pub fn set_attributes(&self, attrs: TypeRef) {
        *self.common().attributes.borrow_mut() = Some(attrs);
    }

    pub fn as_record(&self) -> Option<&[Field]> {
        match self {
            Type::Record { fields, .. } => Some(fields),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<(&TypeRef, &[Dimension])> {
        match self {
            Type::Array { base_type, dims, .. } => Some((base_type, dims)),
            _ => None,
        }
    }

    /// `num_elements` is the product of fixed dims if all dims are fixed,
    /// else -1, per `spec.md` §3.1.
    pub fn num_elements(&self) -> Option<i64> {
        match self {
            Type::Array { dims, .. } => {
                let mut total: i64 = 1;
                for d in dims {
                    match d {
                        Dimension::Fixed(n) => total *= n,
                        Dimension::Variable => return Some(-1),
                    }
                }
                Some(total)
            }
            _ => None,
        }
    }

    pub fn field_index_by_real_name(&self, name: &str) -> Option<usize> {
        match self {
            Type::Record { real_name_index, .. } => real_name_index.get(name).copied(),
            _ => None,
        }
    }

    pub fn field_index_by_sanitized_name(&self, name: &str) -> Option<usize> {
        match self {
            Type::Record { sanitized_name_index, .. } => sanitized_name_index.get(name).copied(),
            _ => None,
        }
    }
}

/// Builds a `Record` type, computing the real-name/sanitized-name index
/// maps from the field list (`spec.md` §3.1: "an auxiliary real-name→index
/// map and sanitized-name→index map").
pub fn new_record(common: Common, fields: Vec<Field>, is_union: bool) -> TypeRef {
    let mut real_name_index = HashMap::with_capacity(fields.len());
    let mut sanitized_name_index = HashMap::with_capacity(fields.len());
    for (i, f) in fields.iter().enumerate() {
        real_name_index.insert(f.real_name.clone(), i);
        sanitized_name_index.insert(f.sanitized_name.clone(), i);
    }
    Rc::new(Type::Record { common, fields, real_name_index, sanitized_name_index, is_union })
}

pub fn new_array(common: Common, base_type: TypeRef, dims: Vec<Dimension>) -> TypeRef {
    Rc::new(Type::Array { common, base_type, dims })
}

pub fn new_number(
    common: Common,
    class: NumberClass,
    read_as: ReadAs,
    byte_size: Option<i64>,
    endianness: Option<Endianness>,
    unit: Option<String>,
) -> TypeRef {
    Rc::new(Type::Number { common, class, read_as, byte_size, endianness, unit })
}

pub fn new_text(common: Common, read_as: ReadAs, byte_size: Option<i64>) -> TypeRef {
    Rc::new(Type::Text { common, read_as, byte_size })
}

pub fn new_raw(common: Common, byte_size: Option<i64>) -> TypeRef {
    Rc::new(Type::Raw { common, byte_size })
}

pub fn new_special(common: Common, kind: SpecialKind, base_type: TypeRef) -> TypeRef {
    Rc::new(Type::Special { common, kind, base_type })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf_f64(format: Format) -> TypeRef {
        new_number(Common::new(format), NumberClass::Real, ReadAs::F64, Some(8), Some(Endianness::Big), None)
    }

    #[test]
    fn record_field_index_maps_match_declaration_order() {
        let fields = vec![
            Field { real_name: "X".into(), sanitized_name: "x".into(), field_type: leaf_f64(Format::Binary), optional: false },
            Field { real_name: "Y".into(), sanitized_name: "y".into(), field_type: leaf_f64(Format::Binary), optional: true },
        ];
        let record = new_record(Common::new(Format::Binary), fields, false);
        assert_eq!(record.field_index_by_real_name("X"), Some(0));
        assert_eq!(record.field_index_by_sanitized_name("y"), Some(1));
        assert_eq!(record.field_index_by_real_name("missing"), None);
    }

    #[test]
    fn array_num_elements_is_product_of_fixed_dims() {
        let base = leaf_f64(Format::Binary);
        let arr = new_array(Common::new(Format::Binary), base, vec![Dimension::Fixed(3), Dimension::Fixed(4)]);
        assert_eq!(arr.num_elements(), Some(12));
    }

    #[test]
    fn array_with_variable_dim_has_unknown_num_elements() {
        let base = leaf_f64(Format::Binary);
        let arr = new_array(Common::new(Format::Binary), base, vec![Dimension::Fixed(3), Dimension::Variable]);
        assert_eq!(arr.num_elements(), Some(-1));
    }

    #[test]
    fn attributes_are_attachable_after_construction() {
        let scalar = leaf_f64(Format::Binary);
        let attrs = new_record(Common::new(Format::Binary), Vec::new(), false);
        scalar.set_attributes(attrs.clone());
        assert!(Rc::ptr_eq(&scalar.attributes().unwrap(), &attrs));
    }

    #[test]
    fn type_graph_allows_sharing_the_same_base_type() {
        let base = leaf_f64(Format::Binary);
        let a = new_array(Common::new(Format::Binary), base.clone(), vec![Dimension::Fixed(2)]);
        let b = new_array(Common::new(Format::Binary), base.clone(), vec![Dimension::Fixed(5)]);
        let (base_a, _) = a.as_array().unwrap();
        let (base_b, _) = b.as_array().unwrap();
        assert!(Rc::ptr_eq(base_a, base_b));
        assert_eq!(Rc::strong_count(&base), 3);
    }
}
