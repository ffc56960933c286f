//! RINEX navigation file assembler: `read_navigation_header` +
//! `read_navigation_records` (`spec.md` §4.3 "Navigation records").
//!
//! Per-system record layouts (GPS 29 values, GLONASS 15, Galileo 28, SBAS
//! 15) are read as 4-values-per-line continuations of 19-character
//! floating-point fields starting at column 4.

use super::header::{self, Header};
use super::{field, parse_f64_or_default, record_type, variable_array_type, Builder, LineReader, SatelliteSystem};
use crate::error::Result;
use crate::mem;
use crate::product::Product;
use crate::types::{Common, Field, Format, TypeRef};

#[derive(Clone)]
struct Schema {
    header_type: TypeRef,
    root_type: TypeRef,
    record_types: [(SatelliteSystem, TypeRef, TypeRef); 4],
}

thread_local! {
    static SCHEMA: std::cell::RefCell<Option<Schema>> = std::cell::RefCell::new(None);
}

/// The navigation type graph never varies between files, so it is built
/// once per thread and reused (`spec.md` §5 "initialized once per thread
/// on first use").
fn schema() -> Schema {
    SCHEMA.with(|cell| {
        let mut cached = cell.borrow_mut();
        if cached.is_none() {
            *cached = Some(build_schema());
        }
        cached.as_ref().unwrap().clone()
    })
}

fn build_schema() -> Schema {
    let header_type = record_type(vec![("file_type", super::text_leaf("RINEX file type")), ("version", super::f64_leaf("RINEX format version"))]);

    let systems = [SatelliteSystem::Gps, SatelliteSystem::Glonass, SatelliteSystem::Galileo, SatelliteSystem::Sbas];
    let mut root_fields = vec![Field { real_name: "header".into(), sanitized_name: "header".into(), field_type: header_type.clone(), optional: false }];
    let mut record_types = Vec::with_capacity(4);
    for system in systems {
        let n = system.navigation_value_count();
        let mut fields = vec![
            Field { real_name: "number".into(), sanitized_name: "number".into(), field_type: super::i64_leaf("satellite PRN number"), optional: false },
            Field { real_name: "epoch".into(), sanitized_name: "epoch".into(), field_type: super::f64_leaf("epoch datetime"), optional: false },
        ];
        for i in 0..n {
            fields.push(Field { real_name: format!("value_{i}"), sanitized_name: format!("value_{i}"), field_type: super::f64_leaf("navigation parameter"), optional: false });
        }
        let element_type = crate::types::new_record(Common::new(Format::Rinex), fields, false);
        let array_type = variable_array_type(element_type.clone());
        root_fields.push(Field { real_name: system.field_name().into(), sanitized_name: system.field_name().into(), field_type: array_type.clone(), optional: true });
        record_types.push((system, element_type, array_type));
    }
    let root_type = crate::types::new_record(Common::new(Format::Rinex), root_fields, false);

    Schema { header_type, root_type, record_types: record_types.try_into().ok().unwrap() }
}

/// Every header label the original's navigation header reader recognizes
/// (`original_source/libcoda/coda-rinex.c`), excluding `RINEX VERSION /
/// TYPE` (consumed before the header loop starts) and `END OF HEADER`
/// (the loop's own terminator).
const KNOWN_LABELS: &[&str] = &["PGM / RUN BY / DATE", "COMMENT", "IONOSPHERIC CORR", "TIME SYSTEM CORR", "LEAP SECONDS"];

pub fn assemble(reader: &mut LineReader, builder: &mut Builder, version_type: super::header::VersionType) -> Result<Product> {
    let mut hdr = Header::default();
    header::read_header_lines(reader, &mut hdr, KNOWN_LABELS, |reader, hdr, label, line| match label {
        "LEAP SECONDS" => {
            hdr.leap_seconds = Some(header::parse_leap_seconds(reader, line)?);
            Ok(true)
        }
        _ => Ok(false),
    })?;

    let schema = schema();
    let header_value = {
        let header_fields = schema.header_type.as_record().expect("header_type is always a record");
        let h = mem::record_new(schema.header_type.clone(), None)?;
        mem::record_add_field(&h, "file_type", mem::string_new(header_fields[0].field_type.clone(), None, &mut builder.arena, &version_type.file_type.to_string())?, false)?;
        mem::record_add_field(&h, "version", mem::double_new(header_fields[1].field_type.clone(), None, &mut builder.arena, version_type.version)?, false)?;
        if let Some(ls) = hdr.leap_seconds {
            mem::record_add_field(&h, "leap_seconds", mem::int64_new(super::i64_leaf("leap seconds"), None, &mut builder.arena, ls)?, true)?;
        }
        mem::record_validate(&h)?;
        h
    };

    let mut arrays = Vec::new();
    for (system, _element_type, array_type) in &schema.record_types {
        arrays.push((*system, mem::array_new(array_type.clone(), None)?));
    }

    while let Some(line) = reader.next_line() {
        if line.trim().is_empty() {
            continue;
        }
        let code = line.chars().next().unwrap_or(' ');
        let system = SatelliteSystem::from_code(code)?;
        let (_, element_type, _) = schema.record_types.iter().find(|(s, _, _)| *s == system).expect("all four systems are present in the schema");
        let number: i64 = field(line, 1, 2).trim().parse().unwrap_or(0);
        let epoch_tokens: Vec<&str> = field(line, 4, 19).split_whitespace().collect();
        let epoch_seconds = parse_epoch_tokens(reader, &epoch_tokens)?;

        let n = system.navigation_value_count();
        let mut values = Vec::with_capacity(n);
        let mut remaining_on_line = 3usize;
        let mut current_line = line.to_string();
        let mut col = 23usize;
        for _ in 0..n {
            if remaining_on_line == 0 {
                current_line = reader.require_line()?.to_string();
                col = 4;
                remaining_on_line = 4;
            }
            values.push(parse_f64_or_default(&field(&current_line, col, 19)));
            col += 19;
            remaining_on_line -= 1;
        }

        let element_fields = element_type.as_record().expect("navigation element_type is always a record");
        let rec = mem::record_new(element_type.clone(), None)?;
        mem::record_add_field(&rec, "number", mem::int64_new(element_fields[0].field_type.clone(), None, &mut builder.arena, number)?, false)?;
        mem::record_add_field(&rec, "epoch", mem::double_new(element_fields[1].field_type.clone(), None, &mut builder.arena, epoch_seconds)?, false)?;
        for (i, value) in values.into_iter().enumerate() {
            let field_type = element_fields[2 + i].field_type.clone();
            mem::record_add_field(&rec, &format!("value_{i}"), mem::double_new(field_type, None, &mut builder.arena, value)?, false)?;
        }
        mem::record_validate(&rec)?;

        let (_, array) = arrays.iter().find(|(s, _)| *s == system).unwrap();
        mem::array_add_element(array, rec)?;
    }

    let root = mem::record_new(schema.root_type.clone(), None)?;
    mem::record_add_field(&root, "header", header_value, false)?;
    for (system, array) in arrays {
        mem::array_validate(&array)?;
        mem::record_add_field(&root, system.field_name(), array, false)?;
    }
    mem::record_validate(&root)?;

    Ok(Product::from_parts(Format::Rinex, root, std::mem::replace(&mut builder.arena, crate::mem::arena::Arena::new())))
}

fn parse_epoch_tokens(reader: &mut LineReader, tokens: &[&str]) -> Result<f64> {
    if tokens.len() < 6 {
        return Err(reader.error(format!("malformed navigation epoch ({} tokens)", tokens.len())));
    }
    let year: i32 = tokens[0].parse().map_err(|_| reader.error("malformed epoch year"))?;
    let month: i32 = tokens[1].parse().map_err(|_| reader.error("malformed epoch month"))?;
    let day: i32 = tokens[2].parse().map_err(|_| reader.error("malformed epoch day"))?;
    let hour: i32 = tokens[3].parse().map_err(|_| reader.error("malformed epoch hour"))?;
    let minute: i32 = tokens[4].parse().map_err(|_| reader.error("malformed epoch minute"))?;
    let second: i32 = tokens[5].parse().map_err(|_| reader.error("malformed epoch second"))?;
    let parts = crate::time::DateTimeParts { year, month, day, hour, minute, second, musec: 0 };
    crate::time::parts_to_double(&parts).map_err(|e| reader.error(e.to_string()))
}
