//! SP3 satellite-orbit file assembler (`spec.md` §4.3 "SP3 parsing state
//! machine"): fixed 22-line header followed by epoch/position-velocity
//! body lines, assembled into a dynamic-type tree on top of the in-memory
//! backend.
//!
//! Grounded on `original_source/libcoda/coda-sp3.c`: header line 1's column
//! 2 carries the position/velocity flag; `P`/`V` row column offsets
//! (vehicle id at 1, then four 14-wide numeric fields at 4/18/32/46) are
//! taken verbatim from `read_record`.

use crate::dynamic::DynamicRef;
use crate::error::{Error, Result};
use crate::mem;
use crate::mem::arena::Arena;
use crate::product::Product;
use crate::types::{Common, Field, Format, TypeRef};

/// Number of fixed-layout lines in an SP3 header (`spec.md` §4.3: version
/// line, start-line, 5 satellite-ID lines, 5 accuracy lines, 2 time-system
/// lines, `%f` base lines, 7 comment lines).
const HEADER_LINES: usize = 22;

fn field(line: &str, start: usize, len: usize) -> String {
    let chars: Vec<char> = line.chars().collect();
    if start >= chars.len() {
        return String::new();
    }
    let end = (start + len).min(chars.len());
    chars[start..end].iter().collect()
}

fn parse_f64_or_default(text: &str) -> f64 {
    text.trim().parse().unwrap_or_else(|_| {
        log::trace!("sp3: blank/unparseable numeric field {text:?}, defaulting to 0.0");
        0.0
    })
}

#[derive(Clone)]
struct Schema {
    root_type: TypeRef,
    record_array_type: TypeRef,
    record_type: TypeRef,
    pos_clk_type: TypeRef,
    pos_clk_array_type: TypeRef,
    vel_rate_type: TypeRef,
    vel_rate_array_type: TypeRef,
    correlation_type: TypeRef,
    header_type: TypeRef,
    pos_vel_leaf: TypeRef,
}

thread_local! {
    static SCHEMA: std::cell::RefCell<Option<Schema>> = std::cell::RefCell::new(None);
}

/// The SP3 type graph never varies between files, so it is built once
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

fn rec(fields: Vec<(&str, TypeRef, bool)>) -> TypeRef {
    let fields = fields
        .into_iter()
        .map(|(name, ty, optional)| Field { real_name: name.to_string(), sanitized_name: name.to_string(), field_type: ty, optional })
        .collect();
    crate::types::new_record(Common::new(Format::Sp3), fields, false)
}

fn build_schema() -> Schema {
    let pos_vel_leaf = crate::types::new_text(Common::with_description(Format::Sp3, "position/velocity flag"), crate::types::ReadAs::String, Some(1));
    let header_type = rec(vec![("pos_vel_flag", pos_vel_leaf.clone(), false)]);

    let vehicle_id_leaf = crate::types::new_text(Common::with_description(Format::Sp3, "satellite vehicle id"), crate::types::ReadAs::String, Some(3));
    let sdev_leaf = || crate::types::new_number(Common::with_description(Format::Sp3, "standard deviation exponent"), crate::types::NumberClass::Integer, crate::types::ReadAs::I64, Some(8), None, None);
    let correlation_type = rec(vec![
        ("x_sdev", sdev_leaf(), false),
        ("y_sdev", sdev_leaf(), false),
        ("z_sdev", sdev_leaf(), false),
        ("clock_sdev", sdev_leaf(), false),
    ]);

    let coord_leaf = || crate::types::new_number(Common::with_description(Format::Sp3, "coordinate or clock value"), crate::types::NumberClass::Real, crate::types::ReadAs::F64, Some(8), None, None);
    let pos_clk_type = rec(vec![
        ("vehicle_id", vehicle_id_leaf.clone(), false),
        ("x_coordinate", coord_leaf(), false),
        ("y_coordinate", coord_leaf(), false),
        ("z_coordinate", coord_leaf(), false),
        ("clock", coord_leaf(), false),
        ("correlation", correlation_type.clone(), true),
    ]);
    let pos_clk_array_type = crate::types::new_array(Common::new(Format::Sp3), pos_clk_type.clone(), vec![crate::types::Dimension::Variable]);

    let vel_rate_type = rec(vec![
        ("vehicle_id", vehicle_id_leaf, false),
        ("x_velocity", coord_leaf(), false),
        ("y_velocity", coord_leaf(), false),
        ("z_velocity", coord_leaf(), false),
        ("clock_rate", coord_leaf(), false),
        ("correlation", correlation_type.clone(), true),
    ]);
    let vel_rate_array_type = crate::types::new_array(Common::new(Format::Sp3), vel_rate_type.clone(), vec![crate::types::Dimension::Variable]);

    let epoch_leaf = crate::types::new_number(Common::with_description(Format::Sp3, "epoch datetime"), crate::types::NumberClass::Real, crate::types::ReadAs::F64, Some(8), None, None);
    let record_type = rec(vec![
        ("epoch", epoch_leaf, false),
        ("pos_clk", pos_clk_array_type.clone(), false),
        ("vel_rate", vel_rate_array_type.clone(), true),
    ]);
    let record_array_type = crate::types::new_array(Common::new(Format::Sp3), record_type.clone(), vec![crate::types::Dimension::Variable]);
    let root_type = rec(vec![("header", header_type.clone(), false), ("record", record_array_type.clone(), false)]);

    Schema {
        root_type,
        record_array_type,
        record_type,
        pos_clk_type,
        pos_clk_array_type,
        vel_rate_type,
        vel_rate_array_type,
        correlation_type,
        header_type,
        pos_vel_leaf,
    }
}

struct Reader<'a> {
    lines: std::str::Lines<'a>,
    line_number: u64,
}

impl<'a> Reader<'a> {
    fn new(contents: &'a str) -> Self {
        Reader { lines: contents.lines(), line_number: 0 }
    }

    fn next_line(&mut self) -> Option<&'a str> {
        let line = self.lines.next()?;
        self.line_number += 1;
        Some(line.strip_suffix('\r').unwrap_or(line))
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::file_read(format!("line {}: {}", self.line_number, message.into()))
    }
}

fn parse_epoch_line(reader: &Reader, line: &str) -> Result<f64> {
    let tokens: Vec<&str> = line[1..].split_whitespace().collect();
    if tokens.len() < 6 {
        return Err(reader.error(format!("malformed epoch line ({} tokens)", tokens.len())));
    }
    let year: i32 = tokens[0].parse().map_err(|_| reader.error("malformed epoch year"))?;
    let month: i32 = tokens[1].parse().map_err(|_| reader.error("malformed epoch month"))?;
    let day: i32 = tokens[2].parse().map_err(|_| reader.error("malformed epoch day"))?;
    let hour: i32 = tokens[3].parse().map_err(|_| reader.error("malformed epoch hour"))?;
    let minute: i32 = tokens[4].parse().map_err(|_| reader.error("malformed epoch minute"))?;
    let seconds: f64 = tokens[5].parse().map_err(|_| reader.error("malformed epoch second"))?;
    let parts = crate::time::DateTimeParts {
        year,
        month,
        day,
        hour,
        minute,
        second: seconds.trunc() as i32,
        musec: (seconds.fract() * 1_000_000.0).round() as i32,
    };
    crate::time::parts_to_double(&parts).map_err(|e| reader.error(e.to_string()))
}

fn parse_pos_clk(schema: &Schema, arena: &mut Arena, line: &str) -> Result<DynamicRef> {
    let rec = mem::record_new(schema.pos_clk_type.clone(), None)?;
    mem::record_add_field(&rec, "vehicle_id", mem::string_new(schema.pos_clk_type.as_record().unwrap()[0].field_type.clone(), None, arena, field(line, 1, 3).trim())?, false)?;
    mem::record_add_field(&rec, "x_coordinate", mem::double_new(schema.pos_clk_type.as_record().unwrap()[1].field_type.clone(), None, arena, parse_f64_or_default(&field(line, 4, 14)))?, false)?;
    mem::record_add_field(&rec, "y_coordinate", mem::double_new(schema.pos_clk_type.as_record().unwrap()[2].field_type.clone(), None, arena, parse_f64_or_default(&field(line, 18, 14)))?, false)?;
    mem::record_add_field(&rec, "z_coordinate", mem::double_new(schema.pos_clk_type.as_record().unwrap()[3].field_type.clone(), None, arena, parse_f64_or_default(&field(line, 32, 14)))?, false)?;
    mem::record_add_field(&rec, "clock", mem::double_new(schema.pos_clk_type.as_record().unwrap()[4].field_type.clone(), None, arena, parse_f64_or_default(&field(line, 46, 14)))?, false)?;
    Ok(rec)
}

fn parse_vel_rate(schema: &Schema, arena: &mut Arena, line: &str) -> Result<DynamicRef> {
    let rec = mem::record_new(schema.vel_rate_type.clone(), None)?;
    mem::record_add_field(&rec, "vehicle_id", mem::string_new(schema.vel_rate_type.as_record().unwrap()[0].field_type.clone(), None, arena, field(line, 1, 3).trim())?, false)?;
    mem::record_add_field(&rec, "x_velocity", mem::double_new(schema.vel_rate_type.as_record().unwrap()[1].field_type.clone(), None, arena, parse_f64_or_default(&field(line, 4, 14)))?, false)?;
    mem::record_add_field(&rec, "y_velocity", mem::double_new(schema.vel_rate_type.as_record().unwrap()[2].field_type.clone(), None, arena, parse_f64_or_default(&field(line, 18, 14)))?, false)?;
    mem::record_add_field(&rec, "z_velocity", mem::double_new(schema.vel_rate_type.as_record().unwrap()[3].field_type.clone(), None, arena, parse_f64_or_default(&field(line, 32, 14)))?, false)?;
    mem::record_add_field(&rec, "clock_rate", mem::double_new(schema.vel_rate_type.as_record().unwrap()[4].field_type.clone(), None, arena, parse_f64_or_default(&field(line, 46, 14)))?, false)?;
    Ok(rec)
}

fn parse_correlation(schema: &Schema, arena: &mut Arena, line: &str) -> Result<DynamicRef> {
    let int_field = |start: usize| -> i64 {
        let s = field(line, start, 4);
        if s.trim().is_empty() {
            0
        } else {
            s.trim().parse().unwrap_or(0)
        }
    };
    let rec = mem::record_new(schema.correlation_type.clone(), None)?;
    let fields = schema.correlation_type.as_record().unwrap();
    mem::record_add_field(&rec, "x_sdev", mem::int64_new(fields[0].field_type.clone(), None, arena, int_field(4))?, false)?;
    mem::record_add_field(&rec, "y_sdev", mem::int64_new(fields[1].field_type.clone(), None, arena, int_field(9))?, false)?;
    mem::record_add_field(&rec, "z_sdev", mem::int64_new(fields[2].field_type.clone(), None, arena, int_field(14))?, false)?;
    mem::record_add_field(&rec, "clock_sdev", mem::int64_new(fields[3].field_type.clone(), None, arena, int_field(19))?, false)?;
    mem::record_validate(&rec)?;
    Ok(rec)
}

pub fn open(contents: &str) -> Result<Product> {
    let mut reader = Reader::new(contents);
    let schema = schema();
    let mut arena = Arena::new();

    let header_line1 = reader.next_line().ok_or_else(|| reader.error("empty SP3 file"))?;
    let pos_vel_flag = header_line1.chars().nth(2).ok_or_else(|| reader.error("missing position/velocity flag"))?;
    for _ in 1..HEADER_LINES {
        reader.next_line().ok_or_else(|| reader.error("truncated SP3 header"))?;
    }

    let header_value = {
        let h = mem::record_new(schema.header_type.clone(), None)?;
        mem::record_add_field(&h, "pos_vel_flag", mem::string_new(schema.pos_vel_leaf.clone(), None, &mut arena, &pos_vel_flag.to_string())?, false)?;
        mem::record_validate(&h)?;
        h
    };

    let records = mem::array_new(schema.record_array_type.clone(), None)?;

    let mut current_pos_clk_array: Option<DynamicRef> = None;
    let mut current_vel_rate_array: Option<DynamicRef> = None;
    let mut current_epoch: Option<f64> = None;
    let mut pending_pos_clk: Option<DynamicRef> = None;
    let mut pending_vel_rate: Option<DynamicRef> = None;

    macro_rules! flush_pending_pos_clk {
        () => {
            if let Some(p) = pending_pos_clk.take() {
                mem::record_validate(&p)?;
                mem::array_add_element(current_pos_clk_array.as_ref().expect("epoch header precedes any position record"), p)?;
            }
        };
    }
    macro_rules! flush_pending_vel_rate {
        () => {
            if let Some(v) = pending_vel_rate.take() {
                mem::record_validate(&v)?;
                mem::array_add_element(current_vel_rate_array.as_ref().expect("epoch header precedes any velocity record"), v)?;
            }
        };
    }
    macro_rules! flush_epoch {
        () => {
            if let Some(epoch_seconds) = current_epoch.take() {
                flush_pending_pos_clk!();
                flush_pending_vel_rate!();
                let rec = mem::record_new(schema.record_type.clone(), None)?;
                mem::record_add_field(
                    &rec,
                    "epoch",
                    mem::double_new(schema.record_type.as_record().unwrap()[0].field_type.clone(), None, &mut arena, epoch_seconds)?,
                    false,
                )?;
                mem::array_validate(current_pos_clk_array.as_ref().unwrap())?;
                mem::record_add_field(&rec, "pos_clk", current_pos_clk_array.take().unwrap(), false)?;
                if let Some(vel_rate) = current_vel_rate_array.take() {
                    mem::array_validate(&vel_rate)?;
                    mem::record_add_field(&rec, "vel_rate", vel_rate, false)?;
                }
                mem::record_validate(&rec)?;
                mem::array_add_element(&records, rec)?;
            }
        };
    }

    while let Some(line) = reader.next_line() {
        if line.trim().is_empty() {
            continue;
        }
        if line.starts_with("EOF") {
            break;
        } else if let Some(rest) = line.strip_prefix('*') {
            let _ = rest;
            flush_epoch!();
            current_epoch = Some(parse_epoch_line(&reader, line)?);
            current_pos_clk_array = Some(mem::array_new(schema.pos_clk_array_type.clone(), None)?);
            current_vel_rate_array = if pos_vel_flag == 'V' { Some(mem::array_new(schema.vel_rate_array_type.clone(), None)?) } else { None };
        } else if line.starts_with("EP") {
            if let Some(p) = &pending_pos_clk {
                mem::record_add_field(p, "correlation", parse_correlation(&schema, &mut arena, line)?, false)?;
            } else {
                return Err(reader.error("'EP' correlation record without a preceding 'P' record"));
            }
        } else if line.starts_with("EV") {
            if let Some(v) = &pending_vel_rate {
                mem::record_add_field(v, "correlation", parse_correlation(&schema, &mut arena, line)?, false)?;
            } else {
                return Err(reader.error("'EV' correlation record without a preceding 'V' record"));
            }
        } else if let Some(rest) = line.strip_prefix('P') {
            let _ = rest;
            if current_pos_clk_array.is_none() {
                return Err(reader.error("'P' record without a preceding epoch header"));
            }
            flush_pending_pos_clk!();
            pending_pos_clk = Some(parse_pos_clk(&schema, &mut arena, line)?);
        } else if let Some(rest) = line.strip_prefix('V') {
            let _ = rest;
            if pos_vel_flag != 'V' {
                return Err(reader.error("'V' record present but header's position/velocity flag is not 'V'"));
            }
            if current_vel_rate_array.is_none() {
                return Err(reader.error("'V' record without a preceding epoch header"));
            }
            flush_pending_vel_rate!();
            pending_vel_rate = Some(parse_vel_rate(&schema, &mut arena, line)?);
        }
    }
    flush_epoch!();
    mem::array_validate(&records)?;

    let root = mem::record_new(schema.root_type.clone(), None)?;
    mem::record_add_field(&root, "header", header_value, false)?;
    mem::record_add_field(&root, "record", records, false)?;
    mem::record_validate(&root)?;

    Ok(Product::from_parts(Format::Sp3, root, arena))
}

#[cfg(test)]
mod tests;
