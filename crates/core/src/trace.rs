//! Trace-file parsing for the trace core.
//!
//! Two line formats are accepted:
//!
//! - `TS OP ADDR [P0 .. P7]` — a timestamped access, `OP` one of `LD`/`ST`
//!   (case-insensitive), `ADDR` decimal or `0x`-prefixed hex, and up to 8
//!   optional payload words for writes.
//! - `OP ADDR [P0 .. P7]` — the same without a leading timestamp; entries
//!   are then back-to-back issued as fast as the trace core's MSHR budget
//!   allows.
//!
//! Blank lines and lines starting with `#` are skipped.

use crate::common::error::{SimError, SimResult};
use crate::common::request::{Payload, ReqType};

/// One parsed trace line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEntry {
    /// Explicit issue timestamp, if the line carried one.
    pub clk: Option<u64>,
    /// Read or write.
    pub kind: ReqType,
    /// Linear address.
    pub addr: u64,
    /// Payload words, present only when the line supplied any.
    pub payload: Option<Payload>,
}

/// Parses a full trace file's text into entries, in file order.
///
/// # Errors
/// Returns [`SimError::Config`] on a malformed line, naming its 1-based
/// line number.
pub fn parse_trace(text: &str) -> SimResult<Vec<TraceEntry>> {
    let mut entries = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        entries.push(parse_line(line, idx + 1)?);
    }
    Ok(entries)
}

fn parse_op(field: &str) -> Option<ReqType> {
    match field.to_ascii_uppercase().as_str() {
        "LD" => Some(ReqType::Read),
        "ST" => Some(ReqType::Write),
        _ => None,
    }
}

fn parse_number(field: &str, line_no: usize) -> SimResult<u64> {
    if let Some(hex) = field.strip_prefix("0x").or_else(|| field.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else {
        field.parse::<u64>()
    }
    .map_err(|_| SimError::config(format!("trace line {line_no}: invalid numeric field {field:?}")))
}

fn parse_line(line: &str, line_no: usize) -> SimResult<TraceEntry> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 2 {
        return Err(SimError::config(format!(
            "trace line {line_no}: expected at least an opcode and an address"
        )));
    }

    let (clk, op_idx) = match (fields[0].parse::<u64>(), parse_op(fields[1])) {
        (Ok(ts), Some(_)) => (Some(ts), 1),
        _ => (None, 0),
    };

    let kind = parse_op(fields[op_idx])
        .ok_or_else(|| SimError::config(format!("trace line {line_no}: unrecognized opcode {:?}", fields[op_idx])))?;
    let addr_field = fields
        .get(op_idx + 1)
        .ok_or_else(|| SimError::config(format!("trace line {line_no}: missing address")))?;
    let addr = parse_number(addr_field, line_no)?;

    let payload_fields = &fields[(op_idx + 2).min(fields.len())..];
    let payload = if payload_fields.is_empty() {
        None
    } else {
        let mut words = [0u64; 8];
        for (slot, field) in words.iter_mut().zip(payload_fields.iter().take(8)) {
            *slot = parse_number(field, line_no)?;
        }
        Some(words)
    };

    Ok(TraceEntry { clk, kind, addr, payload })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamped_read_parses() {
        let entries = parse_trace("100 LD 0x1000\n").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].clk, Some(100));
        assert_eq!(entries[0].kind, ReqType::Read);
        assert_eq!(entries[0].addr, 0x1000);
        assert!(entries[0].payload.is_none());
    }

    #[test]
    fn legacy_write_with_payload_parses() {
        let entries = parse_trace("ST 4096 1 2 3 4 5 6 7 8\n").unwrap();
        assert_eq!(entries[0].clk, None);
        assert_eq!(entries[0].kind, ReqType::Write);
        assert_eq!(entries[0].addr, 4096);
        assert_eq!(entries[0].payload, Some([1, 2, 3, 4, 5, 6, 7, 8]));
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let entries = parse_trace("# a comment\n\nLD 8\n").unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn unrecognized_opcode_is_rejected() {
        assert!(parse_trace("X 8\n").is_err());
    }
}
