// reads memory access traces, one `<proc_id> <op> <address>` record per line

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use thiserror::Error;

use crate::coherence::{Addr, Op};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceRecord {
    pub proc_id: usize,
    pub op: Op,
    pub addr: Addr,
}

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("cannot read trace: {0}")]
    Io(#[from] io::Error),
    #[error("line {line}: expected `<proc_id> <op> <address>`, got `{text}`")]
    Malformed { line: usize, text: String },
    #[error("line {line}: invalid processor id `{text}`")]
    BadProcessor { line: usize, text: String },
    #[error("line {line}: unknown operation `{text}` (expected r or w)")]
    BadOp { line: usize, text: String },
    #[error("line {line}: invalid hex address `{text}`")]
    BadAddr { line: usize, text: String },
    #[error("line {line}: processor {proc_id} out of range, system has {num_procs}")]
    ProcOutOfRange { line: usize, proc_id: usize, num_procs: usize },
}

/// Parses one trace line. Blank lines and `#` comments yield `None`.
/// `line_no` is only used for error messages.
pub fn parse_line(text: &str, line_no: usize) -> Result<Option<TraceRecord>, TraceError> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    let malformed = || TraceError::Malformed { line: line_no, text: trimmed.to_string() };
    let mut parts = trimmed.split_whitespace();
    let (Some(proc_s), Some(op_s), Some(addr_s), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(malformed());
    };

    let proc_id = proc_s.parse::<usize>().map_err(|_| TraceError::BadProcessor {
        line: line_no,
        text: proc_s.to_string(),
    })?;
    let op = match op_s {
        "r" | "R" => Op::Read,
        "w" | "W" => Op::Write,
        _ => return Err(TraceError::BadOp { line: line_no, text: op_s.to_string() }),
    };
    let hex = addr_s
        .strip_prefix("0x")
        .or_else(|| addr_s.strip_prefix("0X"))
        .unwrap_or(addr_s);
    let addr = u64::from_str_radix(hex, 16).map_err(|_| TraceError::BadAddr {
        line: line_no,
        text: addr_s.to_string(),
    })?;

    Ok(Some(TraceRecord { proc_id, op, addr: Addr(addr) }))
}

/// Streams records out of a trace, checking processor ids against the system size.
pub struct TraceReader<R> {
    lines: io::Lines<R>,
    line_no: usize,
    num_procs: usize,
}

impl<R: BufRead> TraceReader<R> {
    pub fn new(reader: R, num_procs: usize) -> Self {
        TraceReader { lines: reader.lines(), line_no: 0, num_procs }
    }
}

impl<R: BufRead> Iterator for TraceReader<R> {
    type Item = Result<TraceRecord, TraceError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let text = match self.lines.next()? {
                Ok(text) => text,
                Err(e) => return Some(Err(e.into())),
            };
            self.line_no += 1;
            match parse_line(&text, self.line_no) {
                Ok(None) => continue,
                Ok(Some(rec)) if rec.proc_id >= self.num_procs => {
                    return Some(Err(TraceError::ProcOutOfRange {
                        line: self.line_no,
                        proc_id: rec.proc_id,
                        num_procs: self.num_procs,
                    }))
                },
                other => return other.transpose(),
            }
        }
    }
}

pub fn read_trace(path: &Path, num_procs: usize) -> Result<TraceReader<BufReader<File>>, TraceError> {
    let f = File::open(path)?;
    Ok(TraceReader::new(BufReader::new(f), num_procs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_records() {
        let rec = parse_line("3 w 0x7fff1234", 1).unwrap().unwrap();
        assert_eq!(rec, TraceRecord { proc_id: 3, op: Op::Write, addr: Addr(0x7fff_1234) });
        let rec = parse_line("  0 r 400a10\n", 2).unwrap().unwrap();
        assert_eq!(rec, TraceRecord { proc_id: 0, op: Op::Read, addr: Addr(0x40_0a10) });
        assert!(parse_line("   ", 3).unwrap().is_none());
        assert!(parse_line("# header", 4).unwrap().is_none());
    }

    #[test]
    fn reports_bad_lines() {
        assert!(matches!(parse_line("0 r", 7), Err(TraceError::Malformed { line: 7, .. })));
        assert!(matches!(parse_line("0 r 0x1 extra", 1), Err(TraceError::Malformed { .. })));
        assert!(matches!(parse_line("x r 0x1", 1), Err(TraceError::BadProcessor { .. })));
        assert!(matches!(parse_line("0 x 0x1", 1), Err(TraceError::BadOp { .. })));
        assert!(matches!(parse_line("0 r 0xzz", 1), Err(TraceError::BadAddr { .. })));
    }

    #[test]
    fn reader_checks_processor_range() {
        let text = "0 r 0x0\n\n1 w 0x4\n2 r 0x8\n";
        let mut reader = TraceReader::new(text.as_bytes(), 2);
        assert_eq!(reader.next().unwrap().unwrap().proc_id, 0);
        assert_eq!(reader.next().unwrap().unwrap().op, Op::Write);
        assert!(matches!(
            reader.next(),
            Some(Err(TraceError::ProcOutOfRange { line: 4, proc_id: 2, num_procs: 2 }))
        ));
        assert!(reader.next().is_none());
    }
}
