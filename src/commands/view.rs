use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};

use dirsync::eventlog::{format_record, load_records, LogFilter};

pub fn cmd_view(log_file: &Path, filter: Option<&str>, from: Option<&str>, to: Option<&str>) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    view(&mut out, log_file, filter, from, to)
}

/// Print the records of `log_file` that pass the filter.
pub fn view<W: Write>(
    out: &mut W,
    log_file: &Path,
    filter: Option<&str>,
    from: Option<&str>,
    to: Option<&str>,
) -> Result<()> {
    let filter = LogFilter::new(filter, from, to)?;
    let records = load_records(log_file)
        .with_context(|| format!("failed to read log file {}", log_file.display()))?;
    let matching = filter.apply(records);

    writeln!(out, "Showing {} matching log entries:", matching.len())?;
    writeln!(out)?;
    for record in &matching {
        writeln!(out, "{}", format_record(record))?;
    }
    Ok(())
}
