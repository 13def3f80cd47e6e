//! Command implementations.
//!
//! Each subcommand is implemented in its own module for clean separation.

pub(crate) mod bauds;
pub(crate) mod decode;
pub(crate) mod handshake;
pub(crate) mod stream;

use {
    cerelink::{Record, StatsSnapshot},
    console::style,
};

/// One record as a text line: timestamp, status bytes, channel microvolts.
pub(crate) fn format_record(record: &Record) -> String {
    let channels = record
        .volts
        .iter()
        .map(|v| format!("{:>11.3}", v * 1e6))
        .collect::<Vec<_>>()
        .join(" ");
    format!(
        "{:>10}  {:02X}{:02X}{:02X}  {channels}",
        record.timestamp, record.status[0], record.status[1], record.status[2]
    )
}

/// Print the statistics summary to stderr.
pub(crate) fn print_stats(snapshot: &StatsSnapshot) {
    eprintln!();
    eprintln!("{}", style("Frame statistics").bold());
    eprintln!("{snapshot}");
}
