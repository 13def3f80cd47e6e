//! Live streaming command.
//!
//! Negotiates the link rate, then prints every decoded record until the
//! duration elapses or Ctrl-C is pressed.

use {
    super::{format_record, print_stats},
    crate::{
        Cli, CliError, config::Config, resolve_port, resolve_scale, resolve_target,
        use_fancy_output, was_interrupted,
    },
    anyhow::Context,
    cerelink::{NativeOpener, NativePort, Negotiator, Record, StreamSession},
    console::style,
    indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle},
    log::{debug, info},
    std::{
        io,
        time::{Duration, Instant},
    },
};

/// Interval between record rate log lines.
const RATE_LOG_INTERVAL: Duration = Duration::from_secs(2);

/// Counts records and reports the rate once per interval.
struct RateMeter {
    count: u64,
    since: Instant,
    interval: Duration,
}

impl RateMeter {
    fn new(now: Instant, interval: Duration) -> Self {
        Self {
            count: 0,
            since: now,
            interval,
        }
    }

    /// Add `n` records; returns records per second when an interval has passed.
    fn record(&mut self, n: usize, now: Instant) -> Option<f64> {
        self.count += n as u64;
        let elapsed = now.saturating_duration_since(self.since);
        if elapsed < self.interval {
            return None;
        }
        let rate = self.count as f64 / elapsed.as_secs_f64();
        self.count = 0;
        self.since = now;
        Some(rate)
    }
}

/// Write one line per record.
///
/// Returns `Ok(false)` once the reader has gone away.
fn write_records<W: io::Write>(
    out: &mut W,
    records: &[Record],
    json: bool,
) -> Result<bool, CliError> {
    for record in records {
        let line = if json {
            serde_json::to_string(record).context("Failed to serialize record")?
        } else {
            format_record(record)
        };
        if let Err(e) = writeln!(out, "{line}") {
            // Downstream pipe closed
            if e.kind() == io::ErrorKind::BrokenPipe {
                debug!("stdout closed, stopping stream");
                return Ok(false);
            }
            return Err(anyhow::Error::new(e)
                .context("Failed to write record")
                .into());
        }
    }
    Ok(true)
}

fn spinner(cli: &Cli) -> ProgressBar {
    if cli.quiet || !use_fancy_output() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(template) = ProgressStyle::with_template("{spinner:.green} [{elapsed}] {msg}") {
        pb.set_style(template);
    }
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn negotiate(
    cli: &Cli,
    config: &Config,
    port: &str,
) -> Result<StreamSession<NativePort>, CliError> {
    let target = resolve_target(cli, config)?;
    let scale = resolve_scale(config)?;
    let mut negotiator = Negotiator::new(NativeOpener, port, target)
        .with_timings(config.timings())
        .with_scale(scale);
    let link_err =
        |e: cerelink::Error| CliError::from_link(e, format!("Negotiation on {port} failed"));

    let pb = spinner(cli);
    pb.set_message(format!("Waiting for board on {port}"));
    let result = (|| {
        negotiator
            .connect()
            .map_err(link_err)?;
        pb.set_message(format!("Requesting {target}"));
        negotiator
            .send_handshake()
            .map_err(link_err)?;
        negotiator
            .await_reconfig()
            .map_err(link_err)?;
        pb.set_message(format!("Reconnecting at {} baud", target.baud()));
        negotiator
            .reconnect()
            .map_err(link_err)?;
        negotiator
            .confirm_streaming()
            .map_err(link_err)
    })();
    pb.finish_and_clear();

    let session = result?;
    if !cli.quiet {
        eprintln!(
            "{} Streaming from {} at {} baud",
            style("✓").green(),
            style(port).green(),
            session.baud_rate()
        );
    }
    Ok(session)
}

/// Negotiate and stream records to stdout.
pub(crate) fn cmd_stream(
    cli: &Cli,
    config: &Config,
    duration: Option<u64>,
    json: bool,
) -> Result<(), CliError> {
    let port = resolve_port(cli, config)?;
    let mut session = negotiate(cli, config, &port)?;

    let deadline = duration.map(|secs| Instant::now() + Duration::from_secs(secs));
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let mut meter = RateMeter::new(Instant::now(), RATE_LOG_INTERVAL);

    // Every exit breaks out so the port is closed and stats are printed
    let outcome = loop {
        if was_interrupted() {
            debug!("Ctrl-C received, stopping stream");
            break Ok(());
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break Ok(());
        }

        let records = match session.poll() {
            Ok(records) => records,
            Err(e) => {
                break Err(CliError::from_link(
                    e,
                    format!("Stream on {port} failed"),
                ));
            },
        };
        if let Some(rate) = meter.record(records.len(), Instant::now()) {
            info!("{rate:.1} records/s");
        }
        match write_records(&mut out, &records, json) {
            Ok(true) => {},
            Ok(false) => break Ok(()),
            Err(e) => break Err(e),
        }
    };
    drop(out);

    let stats = session
        .close()
        .context("Failed to close port")?;
    if !cli.quiet {
        print_stats(&stats);
    }
    outcome
}
