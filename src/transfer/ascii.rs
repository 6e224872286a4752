//! ASCII line-ending translation
//!
//! Uploads in ASCII mode send `CRLF` for every local `LF`; downloads turn the
//! network `CRLF` back into `LF`. A lone `CR` passes through untouched in both
//! directions.

/// Local text to network form.
#[derive(Debug, Default)]
pub struct AsciiEncoder;

impl AsciiEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the encoded form of `input` to `out`. Every `LF` becomes
    /// `CRLF`, even one already preceded by a local `CR`, so the decoder
    /// restores the exact input.
    pub fn encode(&mut self, input: &[u8], out: &mut Vec<u8>) {
        out.reserve(input.len() + input.len() / 16);
        for &b in input {
            if b == b'\n' {
                out.push(b'\r');
            }
            out.push(b);
        }
    }
}

/// Network text to local form. Keeps a trailing `CR` pending across chunk
/// boundaries so a `CRLF` split between two reads still collapses.
#[derive(Debug, Default)]
pub struct AsciiDecoder {
    pending_cr: bool,
}

impl AsciiDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, input: &[u8], out: &mut Vec<u8>) {
        out.reserve(input.len() + 1);
        for &b in input {
            if self.pending_cr {
                self.pending_cr = false;
                if b != b'\n' {
                    out.push(b'\r');
                }
            }
            if b == b'\r' {
                self.pending_cr = true;
            } else {
                out.push(b);
            }
        }
    }

    /// Flushes a `CR` held back at end of stream.
    pub fn finish(&mut self, out: &mut Vec<u8>) {
        if self.pending_cr {
            self.pending_cr = false;
            out.push(b'\r');
        }
    }
}
