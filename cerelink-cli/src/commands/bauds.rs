//! Baud code table command.

use {
    anyhow::Result,
    cerelink::protocol::{BAUD_TABLE, DEFAULT_BAUD, DEFAULT_TARGET},
    console::style,
    serde::Serialize,
};

#[derive(Serialize)]
struct BaudEntry {
    code: u8,
    baud: u32,
    boot: bool,
    default_target: bool,
}

fn entries() -> Vec<BaudEntry> {
    BAUD_TABLE
        .iter()
        .map(|&(code, baud)| BaudEntry {
            code: code.code(),
            baud,
            boot: code == DEFAULT_BAUD,
            default_target: code == DEFAULT_TARGET,
        })
        .collect()
}

/// Print the baud code table.
pub(crate) fn cmd_bauds(json: bool) -> Result<()> {
    let entries = entries();

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!("{}", style("Code  Baud rate").bold());
    for entry in &entries {
        let note = if entry.boot {
            style("boot rate").dim().to_string()
        } else if entry.default_target {
            style("default target").green().to_string()
        } else {
            String::new()
        };
        println!("0x{:02X}  {:>9}  {note}", entry.code, entry.baud);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_cover_table() {
        let entries = entries();
        assert_eq!(entries.len(), 8);
        assert_eq!(entries[0].baud, 9600);
        assert!(entries[0].boot);
        assert!(entries[4].default_target);
        assert_eq!(entries[7].code, 0x07);
    }
}
