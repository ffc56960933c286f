use super::*;
use crate::cursor::Cursor;

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

fn minimal_observation_file() -> String {
    let version_line = fixed_header_line(&[(0, "3.00"), (20, "O"), (40, "G")], "RINEX VERSION / TYPE");
    let obs_types_line = fixed_header_line(&[(0, "G"), (3, "1"), (7, "C1C")], "SYS / # / OBS TYPES");
    let end_of_header = fixed_header_line(&[], "END OF HEADER");

    format!(
        "{version_line}\n{obs_types_line}\n{end_of_header}\n> 2020 01 01 00 00  0.0000000  0  1\nG01  20000000.000  0  0\n"
    )
}

#[test]
fn observation_epoch_boundary_scenario() {
    let contents = minimal_observation_file();
    let product = open(&contents).unwrap();

    let mut cursor = Cursor::set_product(&product);
    cursor.goto_record_field_by_name("record").unwrap();
    cursor.goto_array_element_by_index(0).unwrap();

    cursor.goto_record_field_by_name("flag").unwrap();
    assert_eq!(cursor.read_string(8).unwrap(), "0");
    cursor.goto_parent().unwrap();

    cursor.goto_record_field_by_name("gps").unwrap();
    cursor.goto_array_element_by_index(0).unwrap();

    cursor.goto_record_field_by_name("number").unwrap();
    assert_eq!(cursor.read_i64().unwrap(), 1);
    cursor.goto_parent().unwrap();

    cursor.goto_record_field_by_name("C1C").unwrap();
    cursor.goto_record_field_by_name("observation").unwrap();
    assert_eq!(cursor.read_double().unwrap(), 20000000.0);
    cursor.goto_parent().unwrap();

    cursor.goto_record_field_by_name("lli").unwrap();
    assert_eq!(cursor.read_i64().unwrap(), 0);
    cursor.goto_parent().unwrap();

    cursor.goto_record_field_by_name("signal_strength").unwrap();
    assert_eq!(cursor.read_i64().unwrap(), 0);
}

#[test]
fn unsupported_file_type_is_rejected() {
    let version_line = fixed_header_line(&[(0, "3.00"), (20, "X"), (40, "G")], "RINEX VERSION / TYPE");
    assert!(open(&format!("{version_line}\n")).is_err());
}

#[test]
fn missing_obs_types_header_fails() {
    let version_line = fixed_header_line(&[(0, "3.00"), (20, "O"), (40, "G")], "RINEX VERSION / TYPE");
    let end_of_header = fixed_header_line(&[], "END OF HEADER");
    assert!(open(&format!("{version_line}\n{end_of_header}\n")).is_err());
}
