//! RINEX clock file assembler: `read_clock_header` + `read_clock_records`
//! (`spec.md` §4.3 "Clock records"): two-character type code, 4-character
//! name, epoch, numeric-count in `[1,6]`, and up to 6 values spread over
//! one or two lines in 19-character columns.

use super::header::{self, Header};
use super::{field, parse_f64_or_default, parse_i64_or_default, record_type, text_leaf, variable_array_type, Builder, LineReader};
use crate::error::{Error, Result};
use crate::mem;
use crate::product::Product;
use crate::types::{Common, Field, Format, TypeRef};

#[derive(Clone)]
struct Schema {
    header_type: TypeRef,
    root_type: TypeRef,
    record_type: TypeRef,
    record_array_type: TypeRef,
    value_leaf: TypeRef,
}

thread_local! {
    static SCHEMA: std::cell::RefCell<Option<Schema>> = std::cell::RefCell::new(None);
}

/// The clock type graph never varies between files, so it is built once
/// per thread and reused (`spec.md` §5 "initialized once per thread on
/// first use").
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
    let header_type = record_type(vec![("file_type", text_leaf("RINEX file type")), ("version", super::f64_leaf("RINEX format version"))]);
    let value_leaf = super::f64_leaf("clock parameter value");
    let values_array = crate::types::new_array(Common::new(Format::Rinex), value_leaf.clone(), vec![crate::types::Dimension::Variable]);

    let fields = vec![
        Field { real_name: "type_code".into(), sanitized_name: "type_code".into(), field_type: text_leaf("clock data type code"), optional: false },
        Field { real_name: "name".into(), sanitized_name: "name".into(), field_type: text_leaf("receiver or satellite name"), optional: false },
        Field { real_name: "epoch".into(), sanitized_name: "epoch".into(), field_type: super::f64_leaf("epoch datetime"), optional: false },
        Field { real_name: "values".into(), sanitized_name: "values".into(), field_type: values_array, optional: false },
    ];
    let record_type = crate::types::new_record(Common::new(Format::Rinex), fields, false);
    let record_array_type = variable_array_type(record_type.clone());
    let root_type = record_type_helper(header_type.clone(), record_array_type.clone());

    Schema { header_type, root_type, record_type, record_array_type, value_leaf }
}

fn record_type_helper(header_type: TypeRef, record_array_type: TypeRef) -> TypeRef {
    record_type(vec![("header", header_type), ("record", record_array_type)])
}

/// Every header label the original's `read_clock_header` recognizes
/// (`original_source/libcoda/coda-rinex.c`), excluding `RINEX VERSION /
/// TYPE` (consumed before the header loop starts) and `END OF HEADER`
/// (the loop's own terminator).
const KNOWN_LABELS: &[&str] = &[
    "PGM / RUN BY / DATE",
    "COMMENT",
    "SYS / # / OBS TYPES",
    "TIME SYSTEM ID",
    "LEAP SECONDS",
    "SYS / DCBS APPLIED",
    "SYS / PCVS APPLIED",
    "# / TYPES OF DATA",
    "STATION NAME / NUM",
    "STATION CLK REF",
    "ANALYSIS CENTER",
    "# OF CLK REF",
    "ANALYSIS CLK REF",
    "# OF SOLN STA / TRF",
    "SOLN STA NAME / NUM",
    "# OF SOLN SATS",
    "PRN LIST",
];

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

    let records = mem::array_new(schema.record_array_type.clone(), None)?;

    while let Some(line) = reader.next_line() {
        if line.trim().is_empty() {
            continue;
        }
        let type_code = field(line, 0, 2).trim().to_string();
        let name = field(line, 3, 4).trim().to_string();
        let tokens: Vec<&str> = field(line, 8, 26).split_whitespace().collect();
        let epoch_seconds = parse_epoch_tokens(reader, &tokens)?;
        let count = parse_i64_or_default(&field(line, 34, 2));
        if !(1..=6).contains(&count) {
            return Err(reader.error(format!("clock record numeric count {count} out of range [1,6]")));
        }

        let mut values = Vec::with_capacity(count as usize);
        let mut col = 40usize;
        let mut current_line = line.to_string();
        let mut remaining_on_line = 2usize;
        for _ in 0..count {
            if remaining_on_line == 0 {
                current_line = reader.require_line()?.to_string();
                col = 4;
                remaining_on_line = 4;
            }
            values.push(parse_f64_or_default(&field(&current_line, col, 19)));
            col += 19;
            remaining_on_line -= 1;
        }

        let record_fields = schema.record_type.as_record().expect("record_type is always a record");
        let rec = mem::record_new(schema.record_type.clone(), None)?;
        mem::record_add_field(&rec, "type_code", mem::string_new(record_fields[0].field_type.clone(), None, &mut builder.arena, &type_code)?, false)?;
        mem::record_add_field(&rec, "name", mem::string_new(record_fields[1].field_type.clone(), None, &mut builder.arena, &name)?, false)?;
        mem::record_add_field(&rec, "epoch", mem::double_new(record_fields[2].field_type.clone(), None, &mut builder.arena, epoch_seconds)?, false)?;

        let values_array = mem::array_new(record_fields[3].field_type.clone(), None)?;
        for v in values {
            mem::array_add_element(&values_array, mem::double_new(schema.value_leaf.clone(), None, &mut builder.arena, v)?)?;
        }
        mem::array_validate(&values_array)?;
        mem::record_add_field(&rec, "values", values_array, false)?;
        mem::record_validate(&rec)?;

        mem::array_add_element(&records, rec)?;
    }
    mem::array_validate(&records)?;

    let root = mem::record_new(schema.root_type.clone(), None)?;
    mem::record_add_field(&root, "header", header_value, false)?;
    mem::record_add_field(&root, "record", records, false)?;
    mem::record_validate(&root)?;

    Ok(Product::from_parts(Format::Rinex, root, std::mem::replace(&mut builder.arena, crate::mem::arena::Arena::new())))
}

fn parse_epoch_tokens(reader: &mut LineReader, tokens: &[&str]) -> Result<f64> {
    if tokens.len() < 6 {
        return Err(Error::file_read(format!("line {}: malformed clock epoch ({} tokens)", reader.line_number, tokens.len())));
    }
    let year: i32 = tokens[0].parse().map_err(|_| reader.error("malformed epoch year"))?;
    let month: i32 = tokens[1].parse().map_err(|_| reader.error("malformed epoch month"))?;
    let day: i32 = tokens[2].parse().map_err(|_| reader.error("malformed epoch day"))?;
    let hour: i32 = tokens[3].parse().map_err(|_| reader.error("malformed epoch hour"))?;
    let minute: i32 = tokens[4].parse().map_err(|_| reader.error("malformed epoch minute"))?;
    let second: f64 = tokens[5].parse().map_err(|_| reader.error("malformed epoch second"))?;
    let parts = crate::time::DateTimeParts {
        year,
        month,
        day,
        hour,
        minute,
        second: second.trunc() as i32,
        musec: (second.fract() * 1_000_000.0).round() as i32,
    };
    crate::time::parts_to_double(&parts).map_err(|e| reader.error(e.to_string()))
}
