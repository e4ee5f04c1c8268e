//! TYPE A newline translation for the data channel.
//!
//! Outbound (RETR) bytes have bare LF expanded to CRLF; inbound
//! (STOR/APPE) bytes have CRLF collapsed to LF on hosts whose native
//! convention is LF. Both directions stream chunk by chunk, so the
//! collapse side carries a possible trailing CR across chunk
//! boundaries instead of requiring the caller to pre-size buffers.

/// Expands bare LF to CRLF, appending to `out`.
///
/// Output can grow to at most twice the input. An LF already preceded
/// by CR is left alone so CRLF input passes through unchanged.
pub fn expand_lf(input: &[u8], out: &mut Vec<u8>) {
    let mut previous = 0u8;
    for &byte in input {
        if byte == b'\n' && previous != b'\r' {
            out.push(b'\r');
        }
        out.push(byte);
        previous = byte;
    }
}

/// Whether inbound TYPE A bytes are translated on this host.
///
/// Hosts whose native text convention is already CRLF store received
/// bytes verbatim.
#[must_use]
pub const fn inbound_translation_enabled() -> bool {
    cfg!(not(windows))
}

/// Streaming CRLF-to-LF collapse with cross-chunk carry.
#[derive(Debug, Default)]
pub struct CrlfCollapse {
    pending_cr: bool,
}

impl CrlfCollapse {
    /// Creates a collapser with no pending state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Translates one chunk, appending to `out`.
    pub fn push(&mut self, input: &[u8], out: &mut Vec<u8>) {
        for &byte in input {
            if self.pending_cr {
                self.pending_cr = false;
                if byte == b'\n' {
                    out.push(b'\n');
                    continue;
                }
                out.push(b'\r');
            }
            if byte == b'\r' {
                self.pending_cr = true;
            } else {
                out.push(byte);
            }
        }
    }

    /// Flushes a trailing lone CR at end of stream.
    pub fn finish(&mut self, out: &mut Vec<u8>) {
        if self.pending_cr {
            out.push(b'\r');
            self.pending_cr = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expand(input: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        expand_lf(input, &mut out);
        out
    }

    fn collapse_chunked(chunks: &[&[u8]]) -> Vec<u8> {
        let mut collapse = CrlfCollapse::new();
        let mut out = Vec::new();
        for chunk in chunks {
            collapse.push(chunk, &mut out);
        }
        collapse.finish(&mut out);
        out
    }

    #[test]
    fn expand_inserts_cr_before_bare_lf() {
        assert_eq!(expand(b"a\nb\n"), b"a\r\nb\r\n");
    }

    #[test]
    fn expand_leaves_existing_crlf_alone() {
        assert_eq!(expand(b"a\r\nb"), b"a\r\nb");
    }

    #[test]
    fn expand_doubles_worst_case() {
        assert_eq!(expand(b"\n\n\n"), b"\r\n\r\n\r\n");
    }

    #[test]
    fn collapse_folds_crlf_pairs() {
        assert_eq!(collapse_chunked(&[b"a\r\nb\r\n"]), b"a\nb\n");
    }

    #[test]
    fn collapse_preserves_lone_cr() {
        assert_eq!(collapse_chunked(&[b"a\rb"]), b"a\rb");
        assert_eq!(collapse_chunked(&[b"tail\r"]), b"tail\r");
    }

    #[test]
    fn collapse_handles_split_across_chunks() {
        assert_eq!(collapse_chunked(&[b"line\r", b"\nnext"]), b"line\nnext");
    }

    #[test]
    fn round_trip_restores_unix_text() {
        let original = b"one\ntwo\nthree\n";
        let expanded = expand(original);
        let collapsed = collapse_chunked(&[&expanded]);
        assert_eq!(collapsed, original);
    }
}
