//! Integration-level exercises of the six numbered boundary scenarios,
//! run only against the public API (`coda::prelude` plus the handful of
//! standalone modules a real caller would reach for alongside it).

use coda::prelude::*;
use coda::types::{Common, Dimension, Field, Format, NumberClass, ReadAs};
use coda::{mem, time, util};

fn i32_type() -> coda::types::TypeRef {
    coda::types::new_number(Common::new(Format::Binary), NumberClass::Integer, ReadAs::I32, Some(4), None, None)
}

fn f64_type() -> coda::types::TypeRef {
    coda::types::new_number(Common::new(Format::Binary), NumberClass::Real, ReadAs::F64, Some(8), None, None)
}

/// `root = { a: i32, b: [2] of { x: f64, y: f64 } }`.
fn build_nested_record_product() -> Product {
    let mut arena = mem::arena::Arena::new();

    let xy_type = coda::types::new_record(
        Common::new(Format::Binary),
        vec![
            Field { real_name: "x".into(), sanitized_name: "x".into(), field_type: f64_type(), optional: false },
            Field { real_name: "y".into(), sanitized_name: "y".into(), field_type: f64_type(), optional: false },
        ],
        false,
    );
    let b_array_type = coda::types::new_array(Common::new(Format::Binary), xy_type.clone(), vec![Dimension::Fixed(2)]);
    let root_type = coda::types::new_record(
        Common::new(Format::Binary),
        vec![
            Field { real_name: "a".into(), sanitized_name: "a".into(), field_type: i32_type(), optional: false },
            Field { real_name: "b".into(), sanitized_name: "b".into(), field_type: b_array_type.clone(), optional: false },
        ],
        false,
    );

    let a_value = mem::int32_new(i32_type(), None, &mut arena, 7).unwrap();

    let mut make_xy = |x: f64, y: f64| {
        let rec = mem::record_new(xy_type.clone(), None).unwrap();
        mem::record_add_field(&rec, "x", mem::double_new(f64_type(), None, &mut arena, x).unwrap(), false).unwrap();
        mem::record_add_field(&rec, "y", mem::double_new(f64_type(), None, &mut arena, y).unwrap(), false).unwrap();
        rec
    };
    let elt0 = make_xy(1.0, 2.0);
    let elt1 = make_xy(3.0, 4.0);

    let b_array = mem::array_new(b_array_type, None).unwrap();
    mem::array_set_element(&b_array, 0, elt0).unwrap();
    mem::array_set_element(&b_array, 1, elt1).unwrap();

    let root = mem::record_new(root_type, None).unwrap();
    mem::record_add_field(&root, "a", a_value, false).unwrap();
    mem::record_add_field(&root, "b", b_array, false).unwrap();

    Product::from_parts(Format::Binary, root, arena)
}

#[test]
fn cursor_walk_of_a_nested_record_lands_on_the_expected_slot() {
    let product = build_nested_record_product();
    let mut cursor = product.cursor();

    cursor.goto_record_field_by_name("b").unwrap();
    cursor.goto_array_element(&[1]).unwrap();
    cursor.goto_record_field_by_name("y").unwrap();

    assert_eq!(cursor.get_depth(), 3);
    assert_eq!(cursor.read_double().unwrap(), 4.0);
}

#[test]
fn dimension_linearization_agrees_across_subscript_index_and_fortran_conversion() {
    let dims = [3i64, 4];

    let by_subscript = util::linearize_subscripts(&dims, &[2, 1]).unwrap();
    assert_eq!(by_subscript, 9);

    let fortran = util::c_index_to_fortran_index(&dims, 9).unwrap();
    assert_eq!(fortran, 5);
}

#[test]
fn leap_second_boundary_round_trips_through_utc_parts() {
    let table = time::LeapSecondTable::builtin();

    let seed = time::DateTimeParts { year: 2008, month: 12, day: 31, hour: 23, minute: 59, second: 60, musec: 0 };
    let seconds = time::parts_to_double_utc(&seed, &table).unwrap();
    assert_eq!(seconds, 284083233.0);

    let parts = time::double_to_parts_utc(seconds, &table).unwrap();
    assert_eq!(parts, seed);

    let next = time::double_to_parts_utc(284083234.0, &table).unwrap();
    assert_eq!(
        (next.year, next.month, next.day, next.hour, next.minute, next.second),
        (2009, 1, 1, 0, 0, 0)
    );
}

fn fixed_header_line(fields: &[(usize, &str)], label: &str) -> String {
    let mut chars = vec![' '; 60];
    for (start, text) in fields {
        for (i, c) in text.chars().enumerate() {
            chars[start + i] = c;
        }
    }
    let body: String = chars.into_iter().collect();
    format!("{body}{label}")
}

#[test]
fn rinex_3_observation_epoch_opens_through_the_public_product_api() {
    let version_line = fixed_header_line(&[(0, "3.00"), (20, "O"), (40, "G")], "RINEX VERSION / TYPE");
    let obs_types_line = fixed_header_line(&[(0, "G"), (3, "1"), (7, "C1C")], "SYS / # / OBS TYPES");
    let end_of_header = fixed_header_line(&[], "END OF HEADER");
    let contents = format!(
        "{version_line}\n{obs_types_line}\n{end_of_header}\n> 2020 01 01 00 00  0.0000000  0  1\nG01  20000000.000  0  0\n"
    );

    let product = coda::rinex::open(&contents).unwrap();
    let mut cursor = product.cursor();

    cursor.goto_record_field_by_name("record").unwrap();
    cursor.goto_array_element_by_index(0).unwrap();
    cursor.goto_record_field_by_name("gps").unwrap();
    cursor.goto_array_element_by_index(0).unwrap();
    cursor.goto_record_field_by_name("C1C").unwrap();
    cursor.goto_record_field_by_name("observation").unwrap();

    assert_eq!(cursor.read_double().unwrap(), 20000000.0);
}

fn pad(text: &str, width: usize) -> String {
    let mut s = text.to_string();
    while s.len() < width {
        s.push(' ');
    }
    s
}

#[test]
fn sp3_position_and_clock_row_opens_through_the_public_product_api() {
    let mut lines = vec![pad("#aP2020", 60)];
    for _ in 1..22 {
        lines.push(String::new());
    }
    lines.push("*  2020  1  1  0  0  0.00000000".to_string());
    lines.push("PG01  15000.000000   0.000000   0.000000      1.000000".to_string());
    lines.push("EOF".to_string());
    let contents = lines.join("\n") + "\n";

    let product = coda::sp3::open(&contents).unwrap();
    let mut cursor = product.cursor();

    cursor.goto_record_field_by_name("record").unwrap();
    cursor.goto_array_element_by_index(0).unwrap();
    cursor.goto_record_field_by_name("pos_clk").unwrap();
    cursor.goto_array_element_by_index(0).unwrap();
    cursor.goto_record_field_by_name("vehicle_id").unwrap();

    assert_eq!(cursor.read_string(8).unwrap(), "G01");
}

#[test]
fn file_filter_walk_flags_unsupported_files_and_matches_readable_products() {
    use std::fs;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!("coda-boundary-test-{}-{}", std::process::id(), n));
    fs::create_dir_all(&dir).unwrap();

    let write_sp3 = |name: &str| {
        let mut file = fs::File::create(dir.join(name)).unwrap();
        writeln!(file, "{}", pad("#aP2020", 60)).unwrap();
        for _ in 1..22 {
            writeln!(file).unwrap();
        }
        writeln!(file, "*  2020  1  1  0  0  0.00000000").unwrap();
        writeln!(file, "PG01  15000.000000   0.000000   0.000000      1.000000").unwrap();
        writeln!(file, "EOF").unwrap();
    };
    write_sp3("a.sp3");
    write_sp3("b.sp3");
    fs::write(dir.join("c.bin"), [0u8, 1, 2, 3]).unwrap();

    let predicate = coda::filter::parse_literal_predicate("true").unwrap();
    let mut statuses = Vec::new();
    let result = coda::filter::match_filefilter(&*predicate, &[dir.clone()], &mut |_path, status, _err| {
        statuses.push(status);
        0
    })
    .unwrap();

    assert_eq!(result, 0);
    assert_eq!(statuses.len(), 3);
    assert_eq!(statuses.iter().filter(|s| **s == coda::filter::MatchStatus::Match).count(), 2);
    assert_eq!(statuses.iter().filter(|s| **s == coda::filter::MatchStatus::UnsupportedFile).count(), 1);

    fs::remove_dir_all(&dir).ok();
}
