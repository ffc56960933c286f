use super::*;
use crate::types::{Common, Dimension, Field, Format, NumberClass, ReadAs};

fn number_type(format: Format) -> TypeRef {
    crate::types::new_number(Common::new(format), NumberClass::Real, ReadAs::F64, Some(8), None, None)
}

#[test]
fn identifier_from_name_strips_leading_non_alpha_and_sanitizes() {
    let mut hash = Hashtable::new(true);
    let id = identifier_from_name(Some("  2nd-field!"), &mut hash);
    assert_eq!(id, "nd_field_");
}

#[test]
fn identifier_from_name_falls_back_to_unnamed() {
    let mut hash = Hashtable::new(true);
    let id = identifier_from_name(Some("123"), &mut hash);
    assert_eq!(id, "unnamed");
}

#[test]
fn identifier_from_name_deduplicates_with_numeric_suffixes() {
    let mut hash = Hashtable::new(true);
    let a = identifier_from_name(Some("x"), &mut hash);
    let b = identifier_from_name(Some("x"), &mut hash);
    let c = identifier_from_name(Some("x"), &mut hash);
    assert_eq!((a.as_str(), b.as_str(), c.as_str()), ("x", "x_1", "x_2"));
}

#[test]
fn record_builder_rejects_duplicate_field_fill_and_requires_validation() {
    let field_type = number_type(Format::Binary);
    let fields = vec![Field { real_name: "a".into(), sanitized_name: "a".into(), field_type: field_type.clone(), optional: false }];
    let record_def = crate::types::new_record(Common::new(Format::Binary), fields, false);

    let record = record_new(record_def.clone(), None).unwrap();
    assert!(record_validate(&record).is_err());

    let mut arena = Arena::new();
    let value = double_new(field_type, None, &mut arena, 1.5).unwrap();
    record_add_field(&record, "a", value.clone(), false).unwrap();
    assert!(record_validate(&record).is_ok());
    assert!(record_add_field(&record, "a", value, false).is_err());
}

#[test]
fn array_static_length_rejects_double_fill_and_wrong_element_type() {
    let base = number_type(Format::Binary);
    let other = number_type(Format::Binary);
    let array_def = crate::types::new_array(Common::new(Format::Binary), base.clone(), vec![Dimension::Fixed(2)]);

    let array = array_new(array_def, None).unwrap();
    let mut arena = Arena::new();
    let elt0 = double_new(base.clone(), None, &mut arena, 1.0).unwrap();
    array_set_element(&array, 0, elt0.clone()).unwrap();
    assert!(array_set_element(&array, 0, elt0).is_err());

    let wrong = double_new(other, None, &mut arena, 2.0).unwrap();
    assert!(array_set_element(&array, 1, wrong).is_err());

    assert!(array_validate(&array).is_err()); // slot 1 still empty
}

#[test]
fn dynamic_array_grows_by_pushing_and_validates_against_fixed_length() {
    let base = number_type(Format::Binary);
    let array_def = crate::types::new_array(Common::new(Format::Binary), base.clone(), vec![Dimension::Fixed(2)]);
    let array = array_new(array_def, None).unwrap();

    let mut arena = Arena::new();
    array_add_element(&array, double_new(base.clone(), None, &mut arena, 1.0).unwrap()).unwrap();
    array_add_element(&array, double_new(base, None, &mut arena, 2.0).unwrap()).unwrap();
    assert!(array_validate(&array).is_ok());
}

#[test]
fn data_instance_round_trips_bytes_through_the_arena() {
    let raw_type = crate::types::new_raw(Common::new(Format::Binary), Some(3));
    let mut arena = Arena::new();
    let instance = data_new(raw_type, None, &mut arena, &[1, 2, 3]).unwrap();
    let d = instance.as_data().unwrap();
    assert_eq!(arena.get(d.offset, d.length), &[1, 2, 3]);
}

#[test]
fn data_new_rejects_length_mismatch_against_a_fixed_byte_size() {
    let raw_type = crate::types::new_raw(Common::new(Format::Binary), Some(4));
    let mut arena = Arena::new();
    assert!(data_new(raw_type, None, &mut arena, &[1, 2, 3]).is_err());
}

#[test]
fn update_wraps_a_bare_scalar_into_a_one_element_array() {
    let base = number_type(Format::Binary);
    let mut arena = Arena::new();
    let scalar = double_new(base.clone(), None, &mut arena, 4.0).unwrap();

    let array_def = crate::types::new_array(Common::new(Format::Binary), base, vec![Dimension::Fixed(1)]);
    let updated = update(scalar, &array_def, &mut arena).unwrap();
    assert!(updated.as_array().is_some());
}

#[test]
fn no_data_singleton_has_no_definition() {
    let nd = no_data_new(Format::Rinex);
    assert!(nd.definition().is_none());
}
