//! Offline capture decoding.

use {
    super::{format_record, print_stats},
    crate::{CliError, config::Config, resolve_scale},
    anyhow::Context,
    cerelink::{FrameDecoder, Record, StatsSnapshot},
    log::{debug, warn},
    serde::Serialize,
    std::{fs, path::Path},
};

#[derive(Serialize)]
struct DecodeReport<'a> {
    records: &'a [Record],
    stats: StatsSnapshot,
}

/// Decode a raw capture and print its records and statistics.
pub(crate) fn cmd_decode(config: &Config, capture: &Path, json: bool) -> Result<(), CliError> {
    let scale = resolve_scale(config)?;
    let bytes = fs::read(capture)
        .with_context(|| format!("Failed to read capture {}", capture.display()))?;
    debug!("Decoding {} byte(s) from {}", bytes.len(), capture.display());

    let mut decoder = FrameDecoder::new(scale);
    decoder.extend(&bytes);
    let records = decoder.finish();
    let stats = decoder
        .stats()
        .snapshot();

    if stats.valid == 0 {
        warn!("No valid frames in {}", capture.display());
    }

    if json {
        let report = DecodeReport {
            records: &records,
            stats,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize records")?
        );
        return Ok(());
    }

    for record in &records {
        println!("{}", format_record(record));
    }
    print_stats(&stats);
    Ok(())
}
