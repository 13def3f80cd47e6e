//! Handshake packet command.

use {
    crate::{Cli, CliError, config::Config, resolve_target},
    cerelink::{
        HandshakePacket,
        protocol::{handshake::hex_string, unix_timestamp},
    },
    log::info,
};

/// Print the handshake packet that selects the target rate.
pub(crate) fn cmd_handshake(
    cli: &Cli,
    config: &Config,
    timestamp: Option<u32>,
) -> Result<(), CliError> {
    let target = resolve_target(cli, config)?;
    let timestamp = timestamp.unwrap_or_else(unix_timestamp);
    let packet = HandshakePacket::baud_select(target, timestamp);

    info!("Handshake for {target} at timestamp {timestamp}");
    println!("{}", hex_string(&packet.encode()));
    Ok(())
}
