//! Reading Annex-B input files.

use anyhow::{Context, Result};
use std::path::Path;

/// Read a bitstream file.
///
/// Hex text is decoded when `hex` is set or the file ends in `.hex`;
/// whitespace in hex input is ignored.
pub fn read_bitstream(path: &Path, hex: bool) -> Result<Vec<u8>> {
    if hex || is_hex_file(path) {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read hex input: {:?}", path))?;
        decode_hex(&text).with_context(|| format!("Invalid hex in {:?}", path))
    } else {
        std::fs::read(path).with_context(|| format!("Failed to read input: {:?}", path))
    }
}

fn is_hex_file(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("hex"))
}

/// Decode hex text, skipping whitespace.
pub fn decode_hex(text: &str) -> Result<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    Ok(hex::decode(compact)?)
}
