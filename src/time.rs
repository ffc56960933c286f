//! MJD2000 calendar, leap-second-aware TAI/UTC conversion, and the
//! pattern-language string↔epoch conversion (`spec.md` component A).
//!
//! Ported from `original_source/libcoda/coda-time.c`: the epoch is
//! 2000-01-01T00:00:00 (TAI for the `*_utc` flavors, a naive 86400s/day
//! calendar otherwise), the calendar switches from Julian to Gregorian at
//! the 1752-09-02/14 transition, and leap seconds come from either the
//! built-in table or a `CODA_LEAP_SECOND_TABLE` file in `tai-utc.dat`
//! format.

use crate::error::{Error, Result};

const TRANSITION_DAY: i32 = 2;
const TRANSITION_MONTH: i32 = 9;
const TRANSITION_YEAR: i32 = 1752;

fn y(year: i32) -> i32 {
    year + (year < 0) as i32
}

fn int_div(a: i32, b: i32) -> i32 {
    a / b - (a % b < 0) as i32
}

fn int_mod(a: i32, b: i32) -> i32 {
    a % b + b * ((a % b < 0) as i32)
}

const MONTH_DAYS_NONLEAP: [i32; 13] = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334, 365];
const MONTH_DAYS_LEAP: [i32; 13] = [0, 31, 60, 91, 121, 152, 182, 213, 244, 274, 305, 335, 366];

fn dmy_to_mjd2000_julian(d: i32, m: i32, year: i32) -> Result<i32> {
    let yy = y(year);
    if year == 0 || !(1..=12).contains(&m) || d < 1
        || d > MONTH_DAYS_NONLEAP[m as usize] - MONTH_DAYS_NONLEAP[(m - 1) as usize] + ((m == 2 && yy % 4 == 0) as i32)
    {
        return Err(invalid_date(d, m, year));
    }
    Ok(d + 365 * yy + int_div(yy, 4) + MONTH_DAYS_NONLEAP[(m - 1) as usize]
        - ((m <= 2 && yy % 4 == 0) as i32) + 1721058)
}

fn dmy_to_mjd2000_gregorian(d: i32, m: i32, year: i32) -> Result<i32> {
    let yy = y(year);
    let is_leap = (yy % 4 == 0) ^ (yy % 100 == 0) ^ (yy % 400 == 0);
    if year == 0 || !(1..=12).contains(&m) || d < 1
        || d > MONTH_DAYS_NONLEAP[m as usize] - MONTH_DAYS_NONLEAP[(m - 1) as usize] + ((m == 2 && is_leap) as i32)
    {
        return Err(invalid_date(d, m, year));
    }
    let leap_term = (m <= 2 && yy % 4 == 0) as i32 - (m <= 2 && yy % 100 == 0) as i32
        + (m <= 2 && yy % 400 == 0) as i32;
    Ok(d + MONTH_DAYS_NONLEAP[(m - 1) as usize] + 365 * yy + int_div(yy, 4) - int_div(yy, 100) + int_div(yy, 400)
        - leap_term - 579551)
}

fn invalid_date(d: i32, m: i32, year: i32) -> Error {
    Error::invalid_datetime(format!("invalid date/time argument ({d:02}-{m:02}-{year:04})"))
}

fn dmy_to_mjd2000(d: i32, m: i32, year: i32) -> Result<i32> {
    let the_date = dmy_to_mjd2000_julian(d, m, year)?;
    let transition = dmy_to_mjd2000_julian(TRANSITION_DAY, TRANSITION_MONTH, TRANSITION_YEAR)?;

    if the_date <= transition {
        Ok(the_date - 2451545)
    } else {
        let greg_date = dmy_to_mjd2000_gregorian(d, m, year)?;
        if greg_date - 150934 <= transition - 2451545 {
            return Err(invalid_date(d, m, year));
        }
        Ok(greg_date - 150934)
    }
}

fn getday(table: &[i32; 13], dayno: i32) -> (i32, i32) {
    let mut month = 1;
    for i in 1..=12 {
        if dayno < table[i] {
            month = i as i32;
            break;
        }
        month = i as i32;
    }
    (1 + dayno - table[(month - 1) as usize], month)
}

fn mjd2000_to_dmy_julian(mjd: i32) -> (i32, i32, i32) {
    let mut year = 2000;
    let mut date = mjd - 13;

    year += 4 * int_div(date, 1461);
    date = int_mod(date, 1461);

    let (day, month) = if date < 366 {
        getday(&MONTH_DAYS_LEAP, date)
    } else {
        year += 1;
        date -= 366;
        year += int_div(date, 365);
        date = int_mod(date, 365);
        getday(&MONTH_DAYS_NONLEAP, date)
    };
    if year <= 0 {
        year -= 1;
    }
    (day, month, year)
}

fn mjd2000_to_dmy_gregorian(mjd: i32) -> (i32, i32, i32) {
    let mut year = 2000;
    let mut date = mjd;

    year += 400 * int_div(date, 146097);
    date = int_mod(date, 146097);

    let (day, month) = if date < 36525 {
        year += 4 * int_div(date, 1461);
        date = int_mod(date, 1461);
        if date < 366 {
            getday(&MONTH_DAYS_LEAP, date)
        } else {
            year += 1;
            date -= 366;
            year += int_div(date, 365);
            date = int_mod(date, 365);
            getday(&MONTH_DAYS_NONLEAP, date)
        }
    } else {
        date -= 36525;
        year += 100;
        year += 100 * int_div(date, 36524);
        date = int_mod(date, 36524);

        if date < 1460 {
            year += int_div(date, 365);
            date = int_mod(date, 365);
            getday(&MONTH_DAYS_NONLEAP, date)
        } else {
            date -= 1460;
            year += 4;
            year += 4 * int_div(date, 1461);
            date = int_mod(date, 1461);
            if date < 366 {
                getday(&MONTH_DAYS_LEAP, date)
            } else {
                year += 1;
                date -= 366;
                year += int_div(date, 365);
                date = int_mod(date, 365);
                getday(&MONTH_DAYS_NONLEAP, date)
            }
        }
    };
    if year <= 0 {
        year -= 1;
    }
    (day, month, year)
}

fn mjd2000_to_dmy(mjd2000: i32) -> Result<(i32, i32, i32)> {
    let transition = dmy_to_mjd2000(TRANSITION_DAY, TRANSITION_MONTH, TRANSITION_YEAR)?;
    Ok(if mjd2000 <= transition {
        mjd2000_to_dmy_julian(mjd2000)
    } else {
        mjd2000_to_dmy_gregorian(mjd2000)
    })
}

fn hms_to_daytime(hour: i32, minute: i32, second: i32, musec: i32) -> Result<f64> {
    if !(0..=23).contains(&hour) || !(0..=59).contains(&minute) || !(0..=60).contains(&second)
        || !(0..=999_999).contains(&musec)
    {
        return Err(Error::invalid_datetime(format!(
            "invalid date/time argument ({hour:02}:{minute:02}:{second:02}.{musec:06})"
        )));
    }
    Ok(3600.0 * hour as f64 + 60.0 * minute as f64 + second as f64 + musec as f64 / 1_000_000.0)
}

fn seconds_to_hms(dayseconds: i32) -> Result<(i32, i32, i32)> {
    if !(0..=86399).contains(&dayseconds) {
        return Err(Error::invalid_datetime(format!(
            "dayseconds argument ({dayseconds}) is not in the range [0,86400)"
        )));
    }
    let mut s = dayseconds;
    let hour = s / 3600;
    s %= 3600;
    let minute = s / 60;
    s %= 60;
    Ok((hour, minute, s))
}

/// Decomposed year/month/day/hour/minute/second/microsecond parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateTimeParts {
    pub year: i32,
    pub month: i32,
    pub day: i32,
    pub hour: i32,
    pub minute: i32,
    pub second: i32,
    pub musec: i32,
}

/// Convert `year`'s day-of-year to a month/day pair, using the same
/// calendar rules as the rest of this module.
pub fn dayofyear_to_month_day(year: i32, day_of_year: i32) -> Result<(i32, i32)> {
    if !(0..=366).contains(&day_of_year) {
        return Err(Error::invalid_datetime(format!("invalid day of year argument ({day_of_year:03})")));
    }
    let mjd = dmy_to_mjd2000(1, 1, year)? + (day_of_year - 1);
    let (day, month, _) = mjd2000_to_dmy(mjd)?;
    Ok((month, day))
}

/// Decompose a non-leap-second-aware epoch value (86400s/day calendar).
pub fn double_to_parts(datetime: f64) -> Result<DateTimeParts> {
    if datetime.is_nan() {
        return Err(Error::invalid_datetime("datetime argument is NaN"));
    }
    if datetime.is_infinite() {
        return Err(Error::invalid_datetime("datetime argument is Infinite"));
    }

    let datetime = datetime + 5e-7;
    let seconds = datetime.floor();
    let days = (seconds / 86400.0).floor() as i32;
    let (day, month, year) = mjd2000_to_dmy(days)?;
    let dayseconds = (seconds - days as f64 * 86400.0) as i32;
    let (hour, minute, second) = seconds_to_hms(dayseconds)?;
    let musec = ((datetime - seconds) * 1e6).floor() as i32;

    Ok(DateTimeParts { year, month, day, hour, minute, second, musec })
}

/// Decompose a TAI epoch value into its UTC parts, applying leap-second
/// correction via `table`.
pub fn double_to_parts_utc(datetime: f64, table: &LeapSecondTable) -> Result<DateTimeParts> {
    if datetime.is_nan() {
        return Err(Error::invalid_datetime("datetime argument is NaN"));
    }
    if datetime.is_infinite() {
        return Err(Error::invalid_datetime("datetime argument is Infinite"));
    }

    let datetime = datetime + 5e-7;
    let mut seconds = datetime.floor();

    let mut leap_sec = 0usize;
    while leap_sec < table.entries.len() && seconds > table.entries[leap_sec] {
        leap_sec += 1;
    }
    let is_leap_sec = (seconds - table.entries[leap_sec]).abs() < 0.1;
    let offset = 10.0 + leap_sec as f64 + is_leap_sec as i32 as f64;
    seconds -= offset;
    let datetime = datetime - offset;

    let days = (seconds / 86400.0).floor() as i32;
    let (day, month, year) = mjd2000_to_dmy(days)?;
    let dayseconds = (seconds - days as f64 * 86400.0) as i32;
    let (hour, minute, mut second) = seconds_to_hms(dayseconds)?;
    second += is_leap_sec as i32;
    let musec = ((datetime - seconds) * 1e6).floor() as i32;

    Ok(DateTimeParts { year, month, day, hour, minute, second, musec })
}

/// Compose a non-leap-second-aware epoch value from decomposed parts.
pub fn parts_to_double(p: &DateTimeParts) -> Result<f64> {
    let mjd2000 = dmy_to_mjd2000(p.day, p.month, p.year)?;
    let daytime = hms_to_daytime(p.hour, p.minute, p.second, p.musec)?;
    Ok(86400.0 * mjd2000 as f64 + daytime)
}

/// Compose a TAI epoch value from UTC decomposed parts, applying
/// leap-second correction via `table`.
pub fn parts_to_double_utc(p: &DateTimeParts, table: &LeapSecondTable) -> Result<f64> {
    let mjd2000 = dmy_to_mjd2000(p.day, p.month, p.year)?;
    let daytime = hms_to_daytime(p.hour, p.minute, p.second, p.musec)?;

    let mut t = 86400.0 * mjd2000 as f64 + 10.0;
    let mut leap_sec = 0usize;
    while leap_sec < table.entries.len() && t >= table.entries[leap_sec] {
        t += 1.0;
        leap_sec += 1;
    }

    Ok(t + daytime)
}

const MONTH_NAMES: [&str; 12] =
    ["JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC"];

/// The original's `coda_month_to_integer`: case-insensitive 3-letter month
/// abbreviation lookup.
pub fn month_to_integer(month: &str) -> Result<i32> {
    let month = month.get(0..3).unwrap_or(month);
    for (i, name) in MONTH_NAMES.iter().enumerate() {
        if month.eq_ignore_ascii_case(name) {
            return Ok(i as i32 + 1);
        }
    }
    Err(Error::invalid_argument(format!("invalid month argument ({month})")))
}

/// Leap second table: either the built-in 1972-2015 list, or one loaded
/// from a `CODA_LEAP_SECOND_TABLE` file in `tai-utc.dat` format.
#[derive(Debug, Clone)]
pub struct LeapSecondTable {
    entries: Vec<f64>,
}

const BUILTIN_LEAP_SECONDS: &[f64] = &[
    -867887990.0, // 1972-07-01 UTC
    -851990389.0, // 1973-01-01 UTC
    -820454388.0, // 1974-01-01 UTC
    -788918387.0, // 1975-01-01 UTC
    -757382386.0, // 1976-01-01 UTC
    -725759985.0, // 1977-01-01 UTC
    -694223984.0, // 1978-01-01 UTC
    -662687983.0, // 1979-01-01 UTC
    -631151982.0, // 1980-01-01 UTC
    -583891181.0, // 1981-07-01 UTC
    -552355180.0, // 1982-07-01 UTC
    -520819179.0, // 1983-07-01 UTC
    -457660778.0, // 1985-07-01 UTC
    -378691177.0, // 1988-01-01 UTC
    -315532776.0, // 1990-01-01 UTC
    -283996775.0, // 1991-01-01 UTC
    -236735974.0, // 1992-07-01 UTC
    -205199973.0, // 1993-07-01 UTC
    -173663972.0, // 1994-07-01 UTC
    -126230371.0, // 1996-01-01 UTC
    -78969570.0,  // 1997-07-01 UTC
    -31535969.0,  // 1999-01-01 UTC
    189388832.0,  // 2006-01-01 UTC
    284083233.0,  // 2009-01-01 UTC
    394416034.0,  // 2012-07-01 UTC
    489024035.0,  // 2015-07-01 UTC
];

impl LeapSecondTable {
    /// The built-in table shipped with this crate (same values as the
    /// original's compiled-in default).
    pub fn builtin() -> Self {
        LeapSecondTable { entries: BUILTIN_LEAP_SECONDS.to_vec() }
    }

    /// Parse a leap second table in `tai-utc.dat` format (as distributed at
    /// `ftp://maia.usno.navy.mil/ser7/tai-utc.dat`), one record per line:
    /// ` 1972 JAN  1 =JD 2441317.5  TAI-UTC=  10.0 S + (MJD - 41317.) X 0.0 S`
    pub fn parse(contents: &str) -> Result<Self> {
        let mut raw: Vec<f64> = Vec::new();
        let mut count = 0i32;

        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let jd = parse_jd_field(line)?;
            if jd > 2441317.5 {
                let value = (jd - 2451544.5) * 86400.0 + (10 + count) as f64;
                insert_sorted(&mut raw, value);
                count += 1;
            }
        }

        if raw.is_empty() {
            return Err(Error::file_read("leap second table file contains no usable records"));
        }

        Ok(LeapSecondTable { entries: raw })
    }

    pub fn load_from_env() -> Result<Self> {
        match std::env::var_os("CODA_LEAP_SECOND_TABLE") {
            Some(path) => {
                let contents = std::fs::read_to_string(&path)
                    .map_err(|e| Error::file_open(format!("could not open {}: {e}", path.to_string_lossy())))?;
                Self::parse(&contents)
            }
            None => Ok(Self::builtin()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn insert_sorted(table: &mut Vec<f64>, value: f64) {
    match table.binary_search_by(|probe| probe.partial_cmp(&value).unwrap()) {
        Ok(_) => {} // duplicate entry, ignored
        Err(pos) => table.insert(pos, value),
    }
}

fn parse_jd_field(line: &str) -> Result<f64> {
    let marker = "=JD";
    let start = line.find(marker).ok_or_else(|| Error::file_read("not a valid leap second file line"))?;
    let rest = &line[start + marker.len()..];
    let end = rest.find("TAI-UTC").unwrap_or(rest.len());
    rest[..end].trim().parse::<f64>().map_err(|_| Error::file_read("not a valid leap second file line"))
}

/// Format decomposed parts according to the date/time pattern language
/// (`yyyy`, `MM`/`MMM`, `dd`, `DDD`, `HH`, `mm`, `ss`, `S`..`SSSSSS`, literal
/// text in `'...'`, a single non-alternated format — callers pick the
/// leading alternative of a `|`-separated format themselves since
/// formatting, unlike parsing, is never ambiguous).
pub fn parts_to_string(p: &DateTimeParts, format: &str) -> Result<String> {
    let chars: Vec<char> = format.chars().collect();
    let mut out = String::new();
    let mut fi = 0usize;
    let mut literal = false;

    while fi < chars.len() && (literal || chars[fi] != '|') {
        if chars[fi] == '\'' {
            fi += 1;
            if fi >= chars.len() || chars[fi] != '\'' {
                literal = !literal;
                continue;
            }
        }
        if literal {
            out.push(chars[fi]);
            fi += 1;
        } else if matches(&chars, fi, "yyyy") {
            if !(0..=9999).contains(&p.year) {
                return Err(Error::invalid_datetime("the year can not be represented using a positive four digit number"));
            }
            out.push_str(&format!("{:04}", p.year));
            fi += 4;
        } else if matches(&chars, fi, "MMM") {
            if !(1..=12).contains(&p.month) {
                return Err(Error::invalid_datetime("the month value is not within range (1 - 12)"));
            }
            out.push_str(MONTH_NAMES[(p.month - 1) as usize]);
            fi += 3;
        } else if matches(&chars, fi, "MM") {
            if !(1..=12).contains(&p.month) {
                return Err(Error::invalid_datetime("the month value is not within range (1 - 12)"));
            }
            out.push_str(&format!("{:02}", p.month));
            fi += 2;
        } else if matches(&chars, fi, "dd") {
            if !(1..=31).contains(&p.day) {
                return Err(Error::invalid_datetime("the day value is not within range (1 - 31)"));
            }
            out.push_str(&format!("{:02}", p.day));
            fi += 2;
        } else if matches(&chars, fi, "DDD") {
            let mjd = dmy_to_mjd2000(p.day, p.month, p.year)?;
            let mjd_offset = dmy_to_mjd2000(1, 1, p.year)?;
            out.push_str(&format!("{:03}", mjd - mjd_offset + 1));
            fi += 3;
        } else if matches(&chars, fi, "HH") {
            if !(0..=23).contains(&p.hour) {
                return Err(Error::invalid_datetime("the hour value is not within range (0 - 23)"));
            }
            out.push_str(&format!("{:02}", p.hour));
            fi += 2;
        } else if matches(&chars, fi, "mm") {
            if !(0..=59).contains(&p.minute) {
                return Err(Error::invalid_datetime("the minute value is not within range (0 - 59)"));
            }
            out.push_str(&format!("{:02}", p.minute));
            fi += 2;
        } else if matches(&chars, fi, "ss") {
            if !(0..=60).contains(&p.second) {
                return Err(Error::invalid_datetime("the second value is not within range (0 - 60)"));
            }
            out.push_str(&format!("{:02}", p.second));
            fi += 2;
        } else if chars[fi] == 'S' {
            if !(0..=999_999).contains(&p.musec) {
                return Err(Error::invalid_datetime("the microsecond value is not within range (0 - 999999)"));
            }
            let mut n = 0usize;
            while fi < chars.len() && chars[fi] == 'S' {
                fi += 1;
                n += 1;
            }
            let mut fraction = p.musec;
            for _ in n..6 {
                fraction /= 10;
            }
            out.push_str(&format!("{:0width$}", fraction, width = n));
        } else if chars[fi].is_ascii_alphabetic() {
            return Err(Error::invalid_format(format!("unsupported character sequence in date/time format ({format})")));
        } else {
            out.push(chars[fi]);
            fi += 1;
        }
    }

    if literal {
        return Err(Error::invalid_format(format!("missing closing ' in date/time format ({format})")));
    }

    Ok(out)
}

fn matches(chars: &[char], at: usize, pattern: &str) -> bool {
    let pat: Vec<char> = pattern.chars().collect();
    at + pat.len() <= chars.len() && chars[at..at + pat.len()] == pat[..]
}

/// Parse `str` against a single (non-alternated) format pattern.
fn string_to_parts_single(format: &str, s: &str) -> Result<DateTimeParts> {
    let fmt: Vec<char> = format.chars().collect();
    let text: Vec<char> = s.chars().collect();
    let mut fi = 0usize;
    let mut si = 0usize;
    let mut literal = false;

    let mut p = DateTimeParts { year: 2000, month: 1, day: 1, hour: 0, minute: 0, second: 0, musec: 0 };

    let err = |msg: String| Error::invalid_datetime(msg);

    while fi < fmt.len() && (literal || fmt[fi] != '|') {
        if fmt[fi] == '\'' {
            fi += 1;
            if fi >= fmt.len() || fmt[fi] != '\'' {
                literal = !literal;
                continue;
            }
        }
        if literal {
            if si >= text.len() || fmt[fi] != text[si] {
                return Err(err(format!("date/time argument ({s}) has an incorrect fixed character (format: {format})")));
            }
            fi += 1;
            si += 1;
        } else if matches(&fmt, fi, "yyyy") {
            let use_leading_spaces = fmt.get(fi + 4) == Some(&'*');
            p.year = parse_fixed_int(&text, si, 4, use_leading_spaces)
                .ok_or_else(|| err(format!("date/time argument ({s}) has an incorrect year value (format: {format})")))?;
            fi += 4 + use_leading_spaces as usize;
            si += 4;
        } else if matches(&fmt, fi, "MMM") {
            let token: String = text.get(si..si + 3).unwrap_or(&[]).iter().collect();
            p.month = month_to_integer(&token)
                .map_err(|_| err(format!("date/time argument ({s}) has an incorrect month value (format: {format})")))?;
            fi += 3;
            si += 3;
        } else if matches(&fmt, fi, "MM") {
            let use_leading_spaces = fmt.get(fi + 2) == Some(&'*');
            p.month = parse_fixed_int(&text, si, 2, use_leading_spaces)
                .ok_or_else(|| err(format!("date/time argument ({s}) has an incorrect month value (format: {format})")))?;
            fi += 2 + use_leading_spaces as usize;
            si += 2;
        } else if matches(&fmt, fi, "dd") {
            let use_leading_spaces = fmt.get(fi + 2) == Some(&'*');
            p.day = parse_fixed_int(&text, si, 2, use_leading_spaces)
                .ok_or_else(|| err(format!("date/time argument ({s}) has an incorrect day value (format: {format})")))?;
            fi += 2 + use_leading_spaces as usize;
            si += 2;
        } else if matches(&fmt, fi, "DDD") {
            let use_leading_spaces = fmt.get(fi + 3) == Some(&'*');
            let day_of_year = parse_fixed_int(&text, si, 3, use_leading_spaces)
                .ok_or_else(|| err(format!("date/time argument ({s}) has an incorrect day value (format: {format})")))?;
            let (month, day) = dayofyear_to_month_day(p.year, day_of_year)
                .map_err(|_| err(format!("date/time argument ({s}) has an invalid day value (format: {format})")))?;
            p.month = month;
            p.day = day;
            fi += 3 + use_leading_spaces as usize;
            si += 3;
        } else if matches(&fmt, fi, "HH") {
            let use_leading_spaces = fmt.get(fi + 2) == Some(&'*');
            p.hour = parse_fixed_int(&text, si, 2, use_leading_spaces)
                .ok_or_else(|| err(format!("date/time argument ({s}) has an incorrect hour value (format: {format})")))?;
            fi += 2 + use_leading_spaces as usize;
            si += 2;
        } else if matches(&fmt, fi, "mm") {
            let use_leading_spaces = fmt.get(fi + 2) == Some(&'*');
            p.minute = parse_fixed_int(&text, si, 2, use_leading_spaces)
                .ok_or_else(|| err(format!("date/time argument ({s}) has an incorrect minute value (format: {format})")))?;
            fi += 2 + use_leading_spaces as usize;
            si += 2;
        } else if matches(&fmt, fi, "ss") {
            let use_leading_spaces = fmt.get(fi + 2) == Some(&'*');
            p.second = parse_fixed_int(&text, si, 2, use_leading_spaces)
                .ok_or_else(|| err(format!("date/time argument ({s}) has an incorrect second value (format: {format})")))?;
            fi += 2 + use_leading_spaces as usize;
            si += 2;
        } else if fmt[fi] == 'S' {
            let mut n = 0usize;
            while fi < fmt.len() && fmt[fi] == 'S' {
                fi += 1;
                n += 1;
            }
            let digits = n.min(6);
            let mut musec = parse_fixed_int(&text, si, digits, false)
                .ok_or_else(|| err(format!("date/time argument ({s}) has an incorrect fractional second value (format: {format})")))?;
            si += n;
            for _ in digits..6 {
                musec *= 10;
            }
            p.musec = musec;
        } else if fmt[fi].is_ascii_alphabetic() || fmt[fi] == '*' {
            return Err(Error::invalid_format(format!("unsupported character sequence in date/time format ({format})")));
        } else {
            if si >= text.len() || fmt[fi] != text[si] {
                return Err(err(format!("date/time argument ({s}) has an incorrect fixed character (format: {format})")));
            }
            fi += 1;
            si += 1;
        }
    }

    if literal {
        return Err(Error::invalid_format(format!("missing closing ' in date/time format ({format})")));
    }
    if si != text.len() {
        return Err(err(format!("date/time argument ({s}) contains additional characters (format: {format})")));
    }

    Ok(p)
}

fn parse_fixed_int(text: &[char], start: usize, num_digits: usize, use_leading_spaces: bool) -> Option<i32> {
    if start + num_digits > text.len() {
        return None;
    }
    let mut slice = &text[start..start + num_digits];
    if use_leading_spaces {
        while slice.len() > 1 && slice[0] == ' ' {
            slice = &slice[1..];
        }
    }
    let mut value = 0i32;
    for &c in slice {
        if !c.is_ascii_digit() {
            return None;
        }
        value = value * 10 + (c as i32 - '0' as i32);
    }
    Some(value)
}

/// Parse `str` against a `|`-separated list of format alternatives, trying
/// each in sequence until one matches.
pub fn string_to_parts(format: &str, s: &str) -> Result<DateTimeParts> {
    if !format.contains('|') {
        return string_to_parts_single(format, s);
    }

    let mut literal = false;
    let mut start = 0usize;
    let chars: Vec<char> = format.chars().collect();
    let mut i = 0usize;
    let mut last_err = None;

    loop {
        while i < chars.len() && (literal || chars[i] != '|') {
            if chars[i] == '\'' {
                literal = !literal;
            }
            i += 1;
        }
        let alt: String = chars[start..i].iter().collect();
        match string_to_parts_single(&alt, s) {
            Ok(parts) => return Ok(parts),
            Err(e) => last_err = Some(e),
        }
        if i >= chars.len() {
            break;
        }
        i += 1; // skip '|'
        start = i;
    }

    Err(last_err.unwrap_or_else(|| Error::invalid_datetime(format!(
        "date/time argument ({s}) did not match any of the formats ({format})"
    ))))
}

/// The fixed ISO-ish convenience format the original's
/// `coda_time_to_string`/`coda_string_to_time` wrappers use.
pub const ISO_FORMAT: &str = "yyyy-MM-dd HH:mm:ss.SSSSSS";

pub fn to_iso_string(p: &DateTimeParts) -> Result<String> {
    parts_to_string(p, ISO_FORMAT)
}

pub fn from_iso_str(s: &str) -> Result<DateTimeParts> {
    string_to_parts(ISO_FORMAT, s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_round_trips_through_parts() {
        let epoch = DateTimeParts { year: 2000, month: 1, day: 1, hour: 0, minute: 0, second: 0, musec: 0 };
        let seconds = parts_to_double(&epoch).unwrap();
        assert_eq!(seconds, 0.0);
        let back = double_to_parts(seconds).unwrap();
        assert_eq!(back, epoch);
    }

    #[test]
    fn julian_gregorian_transition_is_handled() {
        assert!(dmy_to_mjd2000(2, 9, 1752).is_ok());
        assert!(dmy_to_mjd2000(3, 9, 1752).is_err());
        assert!(dmy_to_mjd2000(13, 9, 1752).is_err());
        assert!(dmy_to_mjd2000(14, 9, 1752).is_ok());
    }

    #[test]
    fn leap_second_boundary_inserts_a_60th_second() {
        let table = LeapSecondTable::builtin();
        // 2008-12-31 23:59:60 UTC is TAI 284083233 per the original's documented example.
        let parts = double_to_parts_utc(284083233.0, &table).unwrap();
        assert_eq!(parts.second, 60);
        assert_eq!((parts.year, parts.month, parts.day), (2008, 12, 31));

        let next = double_to_parts_utc(284083234.0, &table).unwrap();
        assert_eq!((next.year, next.month, next.day, next.hour, next.minute, next.second), (2009, 1, 1, 0, 0, 0));
    }

    #[test]
    fn parts_to_double_utc_matches_documented_example() {
        let table = LeapSecondTable::builtin();
        let p = DateTimeParts { year: 2000, month: 1, day: 1, hour: 0, minute: 0, second: 0, musec: 0 };
        let seconds = parts_to_double_utc(&p, &table).unwrap();
        assert_eq!(seconds, 32.0);
    }

    #[test]
    fn format_and_parse_roundtrip() {
        let p = DateTimeParts { year: 2005, month: 4, day: 3, hour: 2, minute: 1, second: 0, musec: 500000 };
        let s = parts_to_string(&p, ISO_FORMAT).unwrap();
        assert_eq!(s, "2005-04-03 02:01:00.500000");
        let parsed = string_to_parts(ISO_FORMAT, &s).unwrap();
        assert_eq!(parsed, p);
    }

    #[test]
    fn month_abbreviation_token_formats_and_parses() {
        let p = DateTimeParts { year: 2020, month: 7, day: 4, hour: 0, minute: 0, second: 0, musec: 0 };
        let s = parts_to_string(&p, "dd-MMM-yyyy").unwrap();
        assert_eq!(s, "04-JUL-2020");
        let parsed = string_to_parts("dd-MMM-yyyy", &s).unwrap();
        assert_eq!((parsed.year, parsed.month, parsed.day), (2020, 7, 4));
    }

    #[test]
    fn day_of_year_token_round_trips() {
        let p = DateTimeParts { year: 2021, month: 3, day: 1, hour: 0, minute: 0, second: 0, musec: 0 };
        let s = parts_to_string(&p, "yyyy-DDD").unwrap();
        assert_eq!(s, "2021-060");
        let parsed = string_to_parts("yyyy-DDD", &s).unwrap();
        assert_eq!((parsed.year, parsed.month, parsed.day), (2021, 3, 1));
    }

    #[test]
    fn alternation_tries_formats_in_sequence() {
        let format = "yyyy-MM-dd|yyyyMMdd";
        let a = string_to_parts(format, "2020-07-04").unwrap();
        let b = string_to_parts(format, "20200704").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn alternation_reports_failure_when_no_format_matches() {
        let format = "yyyy-MM-dd|yyyyMMdd";
        assert!(string_to_parts(format, "not-a-date").is_err());
    }

    #[test]
    fn month_to_integer_is_case_insensitive() {
        assert_eq!(month_to_integer("jan").unwrap(), 1);
        assert_eq!(month_to_integer("DEC").unwrap(), 12);
        assert!(month_to_integer("xxx").is_err());
    }

    #[test]
    fn nan_and_infinite_epoch_values_are_rejected() {
        assert!(double_to_parts(f64::NAN).is_err());
        assert!(double_to_parts(f64::INFINITY).is_err());
    }

    #[test]
    fn parse_leap_second_table_file_format() {
        let contents = "\
 1972 JAN  1 =JD 2441317.5  TAI-UTC=  10.0       S + (MJD - 41317.)       X 0.0      S
 1972 JUL  1 =JD 2441499.5  TAI-UTC=  11.0       S + (MJD - 41317.)       X 0.0      S
";
        let table = LeapSecondTable::parse(contents).unwrap();
        assert_eq!(table.len(), 1); // first entry (jd <= 2441317.5) is filtered out
    }
}
