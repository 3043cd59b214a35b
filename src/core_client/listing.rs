//! Parsing of Unix `ls -l` style directory listings.

use chrono::{Datelike, NaiveDate, NaiveDateTime};

use crate::core_client::error::FtpError;

/// One entry of a remote directory listing.
#[derive(Debug, Clone, PartialEq)]
pub struct DirEntry {
    pub name: String,
    pub size: u64,
    pub modified: NaiveDateTime,
    pub permissions: String,
}

impl DirEntry {
    pub fn is_dir(&self) -> bool {
        self.permissions.starts_with('d')
    }

    /// Modification time as epoch seconds, the unit the download history
    /// is kept in.
    pub fn epoch(&self) -> i64 {
        self.modified.and_utc().timestamp()
    }
}

fn month_number(abbr: &str) -> Option<u32> {
    let n = match abbr {
        "Jan" => 1,
        "Feb" => 2,
        "Mar" => 3,
        "Apr" => 4,
        "May" => 5,
        "Jun" => 6,
        "Jul" => 7,
        "Aug" => 8,
        "Sep" => 9,
        "Oct" => 10,
        "Nov" => 11,
        "Dec" => 12,
        _ => return None,
    };
    Some(n)
}

fn bad(line: &str, what: &str) -> FtpError {
    FtpError::BadFormat(format!("{what} in listing line {line:?}"))
}

/// Parses one long-format listing line.
///
/// Fields are `permissions links owner group size month day time-or-year`,
/// whitespace-delimited; the name is everything one character past the end
/// of the eighth field, embedded spaces preserved. The eighth field is
/// ambiguous: servers print `HH:MM` for entries dated within roughly the
/// last year and the year otherwise. When only a time is given the year is
/// taken from `now`, then rolled back by one if that would place the entry
/// in the future.
pub fn parse_list_line(line: &str, now: NaiveDateTime) -> Result<DirEntry, FtpError> {
    let bytes = line.as_bytes();
    let mut fields: Vec<&str> = Vec::with_capacity(8);
    let mut idx = 0;

    for _ in 0..8 {
        while idx < bytes.len() && bytes[idx].is_ascii_whitespace() {
            idx += 1;
        }
        let start = idx;
        while idx < bytes.len() && !bytes[idx].is_ascii_whitespace() {
            idx += 1;
        }
        if start == idx {
            return Err(bad(line, "too few fields"));
        }
        fields.push(&line[start..idx]);
    }

    // Name starts one character past the eighth field boundary.
    if idx + 1 >= line.len() {
        return Err(bad(line, "missing name"));
    }
    let name = &line[idx + 1..];

    let permissions = fields[0];
    let size: u64 = fields[4].parse().map_err(|_| bad(line, "bad size"))?;
    let month = month_number(fields[5]).ok_or_else(|| bad(line, "unrecognized month"))?;
    let day: u32 = fields[6].parse().map_err(|_| bad(line, "bad day"))?;
    if day == 0 {
        return Err(bad(line, "bad day"));
    }

    let (year, hour, minute) = match fields[7].parse::<i32>() {
        Ok(y) if y > 2000 => (y, 12, 0),
        _ => {
            let (h, m) = fields[7]
                .split_once(':')
                .ok_or_else(|| bad(line, "bad time field"))?;
            let hour: u32 = h.parse().map_err(|_| bad(line, "bad hour"))?;
            let minute: u32 = m.parse().map_err(|_| bad(line, "bad minute"))?;
            (now.year(), hour, minute)
        }
    };

    let stamp = |y: i32| {
        NaiveDate::from_ymd_opt(y, month, day).and_then(|d| d.and_hms_opt(hour, minute, 0))
    };
    let mut modified = stamp(year).ok_or_else(|| bad(line, "invalid date"))?;
    if modified > now {
        // A year-less date in the future can only mean last year.
        modified = stamp(year - 1).ok_or_else(|| bad(line, "invalid date"))?;
    }

    Ok(DirEntry {
        name: name.to_string(),
        size,
        modified,
        permissions: permissions.to_string(),
    })
}
