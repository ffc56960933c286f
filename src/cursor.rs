//! The cursor: a bounded stack of navigation frames plus the uniform
//! navigation/introspection/read operations (`spec.md` component D, the
//! cursor half; §4.1 "Cursor runtime").
//!
//! A cursor never owns the dynamic types it visits; per Design Notes §9
//! ("Parent back-references... borrowed views with a lifetime tied to the
//! product"), `Cursor<'p>` borrows its [`crate::product::Product`] for its
//! whole lifetime and only clones `Rc` handles (cheap refcount bumps) into
//! its frame stack.

use std::cell::Cell;
use std::rc::Rc;

use crate::dynamic::{DynamicRef, DynamicType, SpecialInstance};
use crate::error::{Error, Result};
use crate::mem;
use crate::product::Product;
use crate::types::{Dimension, Type, TypeRef};
use crate::util;

/// `spec.md` §3.1: "Fixed depth limit (implementation chooses, ≥ 16 is
/// sufficient for known products)."
pub const MAX_DEPTH: usize = 32;

thread_local! {
    /// `CODA_OPTIONS` (`SPEC_FULL.md` "Configuration"): the one
    /// process/thread-wide knob `spec.md` calls out by name.
    static PERFORM_BOUNDARY_CHECKS: Cell<bool> = Cell::new(true);
}

pub fn set_option_perform_boundary_checks(enabled: bool) {
    PERFORM_BOUNDARY_CHECKS.with(|c| c.set(enabled));
}

pub fn option_perform_boundary_checks() -> bool {
    PERFORM_BOUNDARY_CHECKS.with(|c| c.get())
}

#[derive(Clone)]
struct Frame {
    dynamic: DynamicRef,
    /// -1 at the root, or while pointing at a parent's attributes.
    index: i64,
    bit_offset: i64,
}

/// A bounded navigation stack into a [`Product`]'s dynamic-type tree.
pub struct Cursor<'p> {
    product: &'p Product,
    frames: Vec<Frame>,
}

impl<'p> Cursor<'p> {
    /// `set_product`: initialize a cursor with a single frame
    /// `{root, index=-1, bit_offset=-1}`.
    pub fn set_product(product: &'p Product) -> Self {
        Cursor { product, frames: vec![Frame { dynamic: product.root.clone(), index: -1, bit_offset: -1 }] }
    }

    fn top(&self) -> &Frame {
        self.frames.last().expect("cursor frame stack is never empty")
    }

    fn push(&mut self, frame: Frame) -> Result<()> {
        if self.frames.len() >= MAX_DEPTH {
            return Err(Error::invalid_argument(format!("cursor exceeds maximum depth ({MAX_DEPTH})")));
        }
        self.frames.push(frame);
        Ok(())
    }

    pub fn get_depth(&self) -> usize {
        self.frames.len() - 1
    }

    pub fn get_index(&self) -> i64 {
        self.top().index
    }

    pub fn get_type(&self) -> Option<TypeRef> {
        self.top().dynamic.definition()
    }

    fn current(&self) -> &DynamicRef {
        &self.top().dynamic
    }

    /// `goto_record_field_by_index(i)`.
    pub fn goto_record_field_by_index(&mut self, i: i64) -> Result<()> {
        #[cfg(feature = "hdf5")]
        if let DynamicType::Hdf5(h) = &**self.current() {
            let child = crate::hdf5_backend::record_field(h, i)?;
            return self.push(Frame { dynamic: child, index: i, bit_offset: -1 });
        }

        let record = self
            .current()
            .as_record()
            .ok_or_else(|| Error::invalid_argument("current type is not a record"))?;
        let num_fields = record.field_type.borrow().len();
        if i < 0 || i as usize >= num_fields {
            return Err(Error::invalid_index(format!("field index {i} out of range [0, {num_fields})")));
        }
        let child = record.field_type.borrow()[i as usize]
            .clone()
            .unwrap_or_else(|| mem::no_data_new(record.definition.borrow().format()));
        self.push(Frame { dynamic: child, index: i, bit_offset: -1 })
    }

    /// `goto_record_field_by_name(name)`: looks up the field by its
    /// sanitized identifier, falling back to the real name.
    pub fn goto_record_field_by_name(&mut self, name: &str) -> Result<()> {
        let definition = self
            .get_type()
            .ok_or_else(|| Error::invalid_argument("current type has no definition"))?;
        let index = definition
            .field_index_by_sanitized_name(name)
            .or_else(|| definition.field_index_by_real_name(name))
            .ok_or_else(|| Error::invalid_name(format!("no such field: {name}")))?;
        self.goto_record_field_by_index(index as i64)
    }

    /// `goto_next_record_field`: pop, then `goto_record_field_by_index(prev_index + 1)`.
    pub fn goto_next_record_field(&mut self) -> Result<()> {
        let prev_index = self.top().index;
        self.goto_parent()?;
        self.goto_record_field_by_index(prev_index + 1)
    }

    fn array_dims(&self) -> Result<Vec<i64>> {
        let definition = self.current().definition().ok_or_else(|| Error::invalid_argument("current type is not an array"))?;
        let (_, dims) = definition.as_array().ok_or_else(|| Error::invalid_argument("current type is not an array"))?;
        dims.iter()
            .map(|d| match d {
                Dimension::Fixed(n) => Ok(*n),
                Dimension::Variable => {
                    if dims.len() != 1 {
                        Err(Error::invalid_argument(
                            "multiple variable dimensions are not supported without an expression evaluator",
                        ))
                    } else {
                        // Only a mem-backend array can have a variable dimension; an
                        // HDF5 dataset's shape is always concrete, so this never runs
                        // against an `Hdf5`-backed instance.
                        let array = self.current().as_array().expect("array definition implies a mem-backend array instance");
                        Ok(array.element.borrow().len() as i64)
                    }
                }
            })
            .collect()
    }

    /// `goto_array_element(subs[])`: linearizes row-major (last subscript
    /// fastest) and pushes the child whose definition is the array base type.
    pub fn goto_array_element(&mut self, subs: &[i64]) -> Result<()> {
        let dims = self.array_dims()?;
        let index = util::linearize_subscripts(&dims, subs)?;
        self.goto_array_element_by_index(index)
    }

    /// `goto_array_element_by_index(i)`: bounds-checked when
    /// `perform_boundary_checks` is enabled.
    pub fn goto_array_element_by_index(&mut self, i: i64) -> Result<()> {
        #[cfg(feature = "hdf5")]
        if let DynamicType::Hdf5(h) = &**self.current() {
            let child = crate::hdf5_backend::array_element(h, i)?;
            return self.push(Frame { dynamic: child, index: i, bit_offset: -1 });
        }

        let array = self
            .current()
            .as_array()
            .ok_or_else(|| Error::invalid_argument("current type is not an array"))?;
        let elements = array.element.borrow();
        if option_perform_boundary_checks() && (i < 0 || i as usize >= elements.len()) {
            return Err(Error::array_out_of_bounds(format!("array index {i} out of range [0, {})", elements.len())));
        }
        let child = elements
            .get(i as usize)
            .cloned()
            .flatten()
            .unwrap_or_else(|| mem::no_data_new(array.definition.format()));
        drop(elements);
        self.push(Frame { dynamic: child, index: i, bit_offset: -1 })
    }

    /// `goto_next_array_element`: increments the current index.
    pub fn goto_next_array_element(&mut self) -> Result<()> {
        let prev_index = self.top().index;
        self.goto_parent()?;
        self.goto_array_element_by_index(prev_index + 1)
    }

    /// `goto_attributes`: pushes a frame whose dynamic type is the current
    /// frame's attributes record, or the canonical empty-record singleton
    /// in the parent's format if absent.
    pub fn goto_attributes(&mut self) -> Result<()> {
        let format = self.current().definition().map(|t| t.format()).unwrap_or(crate::types::Format::Binary);
        let attrs = self.current().attributes().unwrap_or_else(|| self.product.empty_record(format));
        self.push(Frame { dynamic: attrs, index: -1, bit_offset: -1 })
    }

    /// `goto_parent`: pops.
    pub fn goto_parent(&mut self) -> Result<()> {
        if self.frames.len() <= 1 {
            return Err(Error::invalid_argument("cursor is already at the root; it has no parent"));
        }
        self.frames.pop();
        Ok(())
    }

    /// `goto_root`.
    pub fn goto_root(&mut self) {
        self.frames.truncate(1);
    }

    /// `get_num_elements`: field count for records, element count for
    /// arrays, `1` for scalars.
    pub fn get_num_elements(&self) -> Result<i64> {
        match &**self.current() {
            DynamicType::Record(r) => Ok(r.field_type.borrow().len() as i64),
            DynamicType::Array(a) => Ok(a.element.borrow().len() as i64),
            #[cfg(feature = "hdf5")]
            DynamicType::Hdf5(h) => Ok(crate::hdf5_backend::num_fields(h).unwrap_or_else(|| h.definition.num_elements().unwrap_or(1))),
            _ => Ok(1),
        }
    }

    /// `get_array_dim`.
    pub fn get_array_dim(&self) -> Result<Vec<i64>> {
        self.array_dims()
    }

    /// `get_string_length`: the byte length of a text/raw data instance.
    pub fn get_string_length(&self) -> Result<i64> {
        #[cfg(feature = "hdf5")]
        if let DynamicType::Hdf5(h) = &**self.current() {
            return Ok(crate::hdf5_backend::read_string(h, usize::MAX)?.len() as i64);
        }

        let data = self
            .current()
            .as_data()
            .ok_or_else(|| Error::invalid_argument("current type is not string/char data"))?;
        Ok(data.length)
    }

    fn require_data(&self) -> Result<&crate::dynamic::DataInstance> {
        if let DynamicType::Special(SpecialInstance::Time { base_type, .. }) = &**self.current() {
            return base_type.as_data().ok_or_else(|| Error::invalid_argument("time base type is not scalar data"));
        }
        self.current().as_data().ok_or_else(|| Error::invalid_argument("current type is not scalar data"))
    }

    fn data_bytes(&self) -> Result<&[u8]> {
        let data = self.require_data()?;
        Ok(self.product.arena.get(data.offset, data.length))
    }

    pub fn read_i32(&self) -> Result<i32> {
        #[cfg(feature = "hdf5")]
        if let DynamicType::Hdf5(h) = &**self.current() {
            return crate::hdf5_backend::read_scalar::<i32>(h);
        }
        let bytes = self.data_bytes()?;
        let arr: [u8; 4] = bytes.try_into().map_err(|_| Error::invalid_format("expected a 4-byte i32 value"))?;
        Ok(i32::from_be_bytes(arr))
    }

    pub fn read_u32(&self) -> Result<u32> {
        #[cfg(feature = "hdf5")]
        if let DynamicType::Hdf5(h) = &**self.current() {
            return crate::hdf5_backend::read_scalar::<u32>(h);
        }
        let bytes = self.data_bytes()?;
        let arr: [u8; 4] = bytes.try_into().map_err(|_| Error::invalid_format("expected a 4-byte u32 value"))?;
        Ok(u32::from_be_bytes(arr))
    }

    pub fn read_i64(&self) -> Result<i64> {
        #[cfg(feature = "hdf5")]
        if let DynamicType::Hdf5(h) = &**self.current() {
            return crate::hdf5_backend::read_scalar::<i64>(h);
        }
        let bytes = self.data_bytes()?;
        let arr: [u8; 8] = bytes.try_into().map_err(|_| Error::invalid_format("expected an 8-byte i64 value"))?;
        Ok(i64::from_be_bytes(arr))
    }

    pub fn read_f32(&self) -> Result<f32> {
        #[cfg(feature = "hdf5")]
        if let DynamicType::Hdf5(h) = &**self.current() {
            return crate::hdf5_backend::read_scalar::<f32>(h);
        }
        let bytes = self.data_bytes()?;
        let arr: [u8; 4] = bytes.try_into().map_err(|_| Error::invalid_format("expected a 4-byte f32 value"))?;
        Ok(f32::from_be_bytes(arr))
    }

    pub fn read_double(&self) -> Result<f64> {
        #[cfg(feature = "hdf5")]
        if let DynamicType::Hdf5(h) = &**self.current() {
            return crate::hdf5_backend::read_scalar::<f64>(h);
        }
        let bytes = self.data_bytes()?;
        let arr: [u8; 8] = bytes.try_into().map_err(|_| Error::invalid_format("expected an 8-byte f64 value"))?;
        Ok(f64::from_be_bytes(arr))
    }

    pub fn read_char(&self) -> Result<u8> {
        #[cfg(feature = "hdf5")]
        if let DynamicType::Hdf5(h) = &**self.current() {
            return crate::hdf5_backend::read_scalar::<u8>(h);
        }
        let bytes = self.data_bytes()?;
        bytes.first().copied().ok_or_else(|| Error::invalid_format("expected a 1-byte char value"))
    }

    /// `read_string(dst, cap)`: truncates to `cap - 1` bytes and guarantees
    /// NUL termination the way the original's C-string destination does;
    /// here that is modeled as returning an owned, already-truncated `String`.
    pub fn read_string(&self, cap: usize) -> Result<String> {
        #[cfg(feature = "hdf5")]
        if let DynamicType::Hdf5(h) = &**self.current() {
            return crate::hdf5_backend::read_string(h, cap);
        }
        let bytes = self.data_bytes()?;
        let truncated = &bytes[..bytes.len().min(cap.saturating_sub(1))];
        Ok(String::from_utf8_lossy(truncated).into_owned())
    }

    pub fn read_bytes(&self, offset: i64, length: i64) -> Result<Vec<u8>> {
        let data = self.require_data()?;
        if offset < 0 || offset + length > data.length {
            return Err(Error::array_out_of_bounds("requested byte range exceeds the data instance's length"));
        }
        Ok(self.product.arena.get(data.offset + offset, length).to_vec())
    }

    /// Reads every element of the current array as an `f64`, the common
    /// case for RINEX/SP3 numeric fields.
    pub fn read_double_array(&mut self) -> Result<Vec<f64>> {
        let n = self.get_num_elements()?;
        let mut out = Vec::with_capacity(n as usize);
        for i in 0..n {
            self.goto_array_element_by_index(i)?;
            out.push(self.read_double()?);
            self.goto_parent()?;
        }
        Ok(out)
    }

    /// `read_<scalar>_partial_array(offset, length)`.
    pub fn read_double_partial_array(&mut self, offset: i64, length: i64) -> Result<Vec<f64>> {
        let n = self.get_num_elements()?;
        if offset < 0 || offset + length > n {
            return Err(Error::array_out_of_bounds("partial array range exceeds the array's element count"));
        }
        let mut out = Vec::with_capacity(length as usize);
        for i in offset..offset + length {
            self.goto_array_element_by_index(i)?;
            out.push(self.read_double()?);
            self.goto_parent()?;
        }
        Ok(out)
    }
}

/// Canonical empty-record type, used to build the per-format
/// empty-attributes singleton (`spec.md` §9 "Empty-record and no-data
/// singletons").
pub fn empty_record_type(format: crate::types::Format) -> TypeRef {
    Rc::new(Type::Record {
        common: crate::types::Common::new(format),
        fields: Vec::new(),
        real_name_index: Default::default(),
        sanitized_name_index: Default::default(),
        is_union: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Common, Field, Format, NumberClass, ReadAs};

    fn f64_type() -> TypeRef {
        crate::types::new_number(Common::new(Format::Binary), NumberClass::Real, ReadAs::F64, Some(8), None, None)
    }

    fn build_seed_product() -> Product {
        let mut arena = mem::arena::Arena::new();

        let xy_type = crate::types::new_record(
            Common::new(Format::Binary),
            vec![
                Field { real_name: "x".into(), sanitized_name: "x".into(), field_type: f64_type(), optional: false },
                Field { real_name: "y".into(), sanitized_name: "y".into(), field_type: f64_type(), optional: false },
            ],
            false,
        );
        let b_array_type = crate::types::new_array(Common::new(Format::Binary), xy_type.clone(), vec![Dimension::Fixed(2)]);
        let root_type = crate::types::new_record(
            Common::new(Format::Binary),
            vec![
                Field { real_name: "a".into(), sanitized_name: "a".into(), field_type: f64_type(), optional: false },
                Field { real_name: "b".into(), sanitized_name: "b".into(), field_type: b_array_type.clone(), optional: false },
            ],
            false,
        );

        let a_value = mem::double_new(f64_type(), None, &mut arena, 1.0).unwrap();

        let mut make_xy = |x: f64, y: f64| {
            let rec = mem::record_new(xy_type.clone(), None).unwrap();
            mem::record_add_field(&rec, "x", mem::double_new(f64_type(), None, &mut arena, x).unwrap(), false).unwrap();
            mem::record_add_field(&rec, "y", mem::double_new(f64_type(), None, &mut arena, y).unwrap(), false).unwrap();
            rec
        };
        let elt0 = make_xy(10.0, 11.0);
        let elt1 = make_xy(20.0, 21.0);

        let b_array = mem::array_new(b_array_type, None).unwrap();
        mem::array_set_element(&b_array, 0, elt0).unwrap();
        mem::array_set_element(&b_array, 1, elt1).unwrap();

        let root = mem::record_new(root_type, None).unwrap();
        mem::record_add_field(&root, "a", a_value, false).unwrap();
        mem::record_add_field(&root, "b", b_array, false).unwrap();

        Product::from_parts(Format::Binary, root, arena)
    }

    #[test]
    fn cursor_walk_of_nested_record_seed() {
        let product = build_seed_product();
        let mut cursor = Cursor::set_product(&product);
        cursor.goto_record_field_by_name("b").unwrap();
        cursor.goto_array_element(&[1]).unwrap();
        cursor.goto_record_field_by_name("y").unwrap();
        assert_eq!(cursor.get_depth(), 3);
        assert_eq!(cursor.read_double().unwrap(), 21.0);
    }

    #[test]
    fn next_record_field_advances_by_one() {
        let product = build_seed_product();
        let mut cursor = Cursor::set_product(&product);
        cursor.goto_record_field_by_index(0).unwrap();
        assert_eq!(cursor.read_double().unwrap(), 1.0);
        cursor.goto_next_record_field().unwrap();
        assert!(cursor.get_type().unwrap().as_array().is_some());
    }

    #[test]
    fn array_element_by_index_matches_subscript_navigation() {
        let product = build_seed_product();
        let mut by_subs = Cursor::set_product(&product);
        by_subs.goto_record_field_by_name("b").unwrap();
        by_subs.goto_array_element(&[1]).unwrap();
        by_subs.goto_record_field_by_name("x").unwrap();

        let mut by_index = Cursor::set_product(&product);
        by_index.goto_record_field_by_name("b").unwrap();
        by_index.goto_array_element_by_index(1).unwrap();
        by_index.goto_record_field_by_name("x").unwrap();

        assert_eq!(by_subs.read_double().unwrap(), by_index.read_double().unwrap());
    }

    #[test]
    fn out_of_bounds_array_access_fails_when_boundary_checks_enabled() {
        set_option_perform_boundary_checks(true);
        let product = build_seed_product();
        let mut cursor = Cursor::set_product(&product);
        cursor.goto_record_field_by_name("b").unwrap();
        assert!(cursor.goto_array_element_by_index(5).is_err());
    }

    #[test]
    fn goto_parent_at_root_fails() {
        let product = build_seed_product();
        let mut cursor = Cursor::set_product(&product);
        assert!(cursor.goto_parent().is_err());
    }

    #[test]
    fn goto_attributes_falls_back_to_empty_record_singleton() {
        let product = build_seed_product();
        let mut cursor = Cursor::set_product(&product);
        cursor.goto_record_field_by_index(0).unwrap();
        cursor.goto_attributes().unwrap();
        assert_eq!(cursor.get_num_elements().unwrap(), 0);
    }
}
