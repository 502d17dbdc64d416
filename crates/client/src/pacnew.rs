//! Configuration files the upgrade saved as `.pacnew`.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

use chrono::{DateTime, TimeZone};
use pacnotify_protocol::PacnewRecord;

const PACNEW_SUFFIX: &str = ".pacnew";

/// Builds the record for a file the engine saved next to `file`.
pub fn record(package: &str, old_version: &str, file: &str) -> PacnewRecord {
    let path = if file.ends_with(PACNEW_SUFFIX) {
        file.to_string()
    } else {
        format!("{file}{PACNEW_SUFFIX}")
    };
    PacnewRecord {
        package: package.into(),
        old_version: old_version.into(),
        path,
    }
}

/// `'path' name-oldver` pairs joined by spaces, quoted for `sh`.
pub fn pacfiles(records: &[PacnewRecord]) -> String {
    records
        .iter()
        .map(|r| format!("{} {}-{}", shell_quote(&r.path), r.package, r.old_version))
        .collect::<Vec<_>>()
        .join(" ")
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Appends one line per record to the log at `path`, creating it if needed.
pub fn append_log<Tz>(path: &Path, records: &[PacnewRecord], at: DateTime<Tz>) -> io::Result<()>
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    if records.is_empty() {
        return Ok(());
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let stamp = at.format("%Y-%m-%d %H:%M");
    let mut text = String::new();
    for r in records {
        text.push_str(&format!(
            "[{stamp}] {} (from {} {})\n",
            r.path, r.package, r.old_version
        ));
    }
    file.write_all(text.as_bytes())
}
