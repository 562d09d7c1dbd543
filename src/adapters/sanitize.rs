//! Log redaction for patient identifiers and raw clinical values.
//!
//! Formatted log lines pass through [`SanitizingMakeWriter`] before reaching
//! the sink. It replaces:
//! - UUIDs and generated patient ids (`P0042`)
//! - medical record numbers (`MRN:1234567`)
//! - `patient_id=...` style assignments
//! - raw vital/lab readings written as `HR=118` or `lactate: 4.2`
//!
//! Aggregates (counts, metrics, probabilities) are left alone.

use std::io::{self, Write};
use std::sync::OnceLock;

use regex::{Regex, RegexSet};
use tracing_subscriber::fmt::MakeWriter;

/// Longest line scanned; anything past it is dropped and marked.
const MAX_LINE_BYTES: usize = 16 * 1024;

/// Measurement names whose raw values are redacted.
const CLINICAL_KEYS: &str = "hr|heart_rate|temp|temperature|resp|resp_rate|o2sat|o2_sat|spo2|sbp|dbp|map|wbc|platelets|creatinine|lactate|age";

/// Redaction table: a `RegexSet` picks which rules apply to a line.
struct Redactor {
    any: RegexSet,
    rules: Vec<(Regex, &'static str)>,
}

impl Redactor {
    fn get() -> &'static Self {
        static REDACTOR: OnceLock<Redactor> = OnceLock::new();
        REDACTOR.get_or_init(|| {
            let vitals = format!(r"(?i)\b({CLINICAL_KEYS})\b(\s*[:=]\s*)-?\d+(?:\.\d+)?");
            let table: [(&str, &'static str); 5] = [
                (
                    r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
                    "[REDACTED-UUID]",
                ),
                (r"\bMRN[:\s]?\d{6,10}\b", "[REDACTED-MRN]"),
                (
                    r#"(?i)\b(patient[_ ]?id)(\s*[:=]\s*)"?[A-Za-z0-9_-]+"?"#,
                    "${1}${2}[REDACTED-ID]",
                ),
                (r"\bP\d{4,}\b", "[REDACTED-ID]"),
                (&vitals, "${1}${2}[REDACTED]"),
            ];

            // Constant patterns.
            let any = RegexSet::new(table.iter().map(|(p, _)| *p)).expect("Valid regex set");
            let rules = table
                .iter()
                .map(|(p, r)| (Regex::new(p).expect("Valid regex"), *r))
                .collect();
            Self { any, rules }
        })
    }

    fn redact(&self, line: &str) -> String {
        let mut out = line.to_string();
        for idx in &self.any.matches(line) {
            let (regex, replacement) = &self.rules[idx];
            out = regex.replace_all(&out, *replacement).into_owned();
        }
        out
    }
}

/// Redact identifiers and raw clinical values from `input`.
#[must_use]
pub fn sanitize(input: &str) -> String {
    sanitize_within(input, MAX_LINE_BYTES)
}

fn sanitize_within(input: &str, max_bytes: usize) -> String {
    if input.len() <= max_bytes {
        return Redactor::get().redact(input);
    }
    let mut end = max_bytes;
    while !input.is_char_boundary(end) {
        end -= 1;
    }
    let mut out = Redactor::get().redact(&input[..end]);
    out.push_str(" [TRUNCATED]");
    out
}

/// Wraps a `tracing_subscriber` writer factory so every formatted line is
/// redacted before it reaches the sink.
#[derive(Debug, Clone)]
pub struct SanitizingMakeWriter<M> {
    inner: M,
}

impl<M> SanitizingMakeWriter<M> {
    #[must_use]
    pub fn new(inner: M) -> Self {
        Self { inner }
    }
}

impl<'a, M: MakeWriter<'a>> MakeWriter<'a> for SanitizingMakeWriter<M> {
    type Writer = SanitizingWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        SanitizingWriter {
            inner: self.inner.make_writer(),
            pending: Vec::new(),
        }
    }
}

/// Holds bytes until a full line is available, then writes it redacted.
pub struct SanitizingWriter<W> {
    inner: W,
    pending: Vec<u8>,
}

impl<W: Write> SanitizingWriter<W> {
    fn emit(&mut self, bytes: &[u8]) -> io::Result<()> {
        let line = sanitize(&String::from_utf8_lossy(bytes));
        self.inner.write_all(line.as_bytes())
    }
}

impl<W: Write> Write for SanitizingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.emit(&line)?;
        }
        // An unterminated line is capped rather than buffered forever.
        if self.pending.len() > 2 * MAX_LINE_BYTES {
            let line = std::mem::take(&mut self.pending);
            self.emit(&line)?;
            self.inner.write_all(b"\n")?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.emit(&rest)?;
        }
        self.inner.flush()
    }
}
