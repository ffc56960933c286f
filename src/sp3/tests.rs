use super::*;
use crate::cursor::Cursor;

fn pad(text: &str, width: usize) -> String {
    let mut s = text.to_string();
    while s.len() < width {
        s.push(' ');
    }
    s
}

fn minimal_position_file() -> String {
    let header_line1 = pad("#aP2020", 60);
    let mut lines = vec![header_line1];
    for _ in 1..HEADER_LINES {
        lines.push(String::new());
    }
    lines.push("*  2020  1  1  0  0  0.00000000".to_string());
    lines.push("PG01  15000.000000   0.000000   0.000000      1.000000".to_string());
    lines.push("EOF".to_string());
    lines.join("\n") + "\n"
}

#[test]
fn position_and_clock_boundary_scenario() {
    let contents = minimal_position_file();
    let product = open(&contents).unwrap();

    let mut cursor = Cursor::set_product(&product);
    cursor.goto_record_field_by_name("record").unwrap();
    cursor.goto_array_element_by_index(0).unwrap();
    cursor.goto_record_field_by_name("pos_clk").unwrap();
    cursor.goto_array_element_by_index(0).unwrap();

    cursor.goto_record_field_by_name("vehicle_id").unwrap();
    assert_eq!(cursor.read_string(8).unwrap(), "G01");
    cursor.goto_parent().unwrap();

    cursor.goto_record_field_by_name("x_coordinate").unwrap();
    assert_eq!(cursor.read_double().unwrap(), 15000.0);
    cursor.goto_parent().unwrap();

    cursor.goto_record_field_by_name("clock").unwrap();
    assert_eq!(cursor.read_double().unwrap(), 1.0);
}

#[test]
fn velocity_records_are_rejected_when_header_declares_position_only() {
    let contents = minimal_position_file();
    let replaced = contents.replace(
        "PG01  15000.000000   0.000000   0.000000      1.000000\n",
        "PG01  15000.000000   0.000000   0.000000      1.000000\nVG01      1.000000   2.000000   3.000000      0.100000\n",
    );
    assert!(open(&replaced).is_err());
}

fn correlation_line() -> String {
    let mut chars = vec![' '; 30];
    chars[0] = 'E';
    chars[1] = 'P';
    for (i, c) in "10".chars().enumerate() {
        chars[4 + i] = c;
    }
    chars.into_iter().collect()
}

#[test]
fn correlation_record_attaches_to_preceding_position_record() {
    let contents = minimal_position_file();
    let with_corr = contents.replace("EOF\n", &format!("{}\nEOF\n", correlation_line()));
    let product = open(&with_corr).unwrap();

    let mut cursor = Cursor::set_product(&product);
    cursor.goto_record_field_by_name("record").unwrap();
    cursor.goto_array_element_by_index(0).unwrap();
    cursor.goto_record_field_by_name("pos_clk").unwrap();
    cursor.goto_array_element_by_index(0).unwrap();
    cursor.goto_record_field_by_name("correlation").unwrap();
    cursor.goto_record_field_by_name("x_sdev").unwrap();
    assert_eq!(cursor.read_i64().unwrap(), 10);
}

#[test]
fn truncated_header_fails() {
    assert!(open("#aP2020\n").is_err());
}
