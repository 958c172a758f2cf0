//! Plain-text extraction from raw PTY output.

use vte::{Params, Parser, Perform};

/// Output sanitizer using the VTE parser.
pub struct OutputSanitizer;

impl OutputSanitizer {
    /// Strip ANSI/VT control sequences from raw shell bytes.
    ///
    /// PTY line endings (`\r\n`) become `\n`, a backspace erases the
    /// previous character, and invalid UTF-8 is replaced.
    pub fn strip_ansi(input: &[u8]) -> String {
        let mut extractor = PlainTextExtractor::default();
        let mut parser = Parser::new();

        parser.advance(&mut extractor, input);

        extractor.output
    }

    /// Strip control sequences from a string.
    pub fn strip_ansi_str(input: &str) -> String {
        Self::strip_ansi(input.as_bytes())
    }

    /// Incremental stripper for output that arrives in chunks.
    pub fn stream() -> SanitizerStream {
        SanitizerStream::default()
    }
}

/// Parser state carried across chunks, so an escape sequence split between
/// two reads is still recognized.
pub struct SanitizerStream {
    parser: Parser,
    extractor: PlainTextExtractor,
}

impl Default for SanitizerStream {
    fn default() -> Self {
        Self {
            parser: Parser::new(),
            extractor: PlainTextExtractor::default(),
        }
    }
}

impl SanitizerStream {
    pub fn feed(&mut self, chunk: &[u8]) {
        self.parser.advance(&mut self.extractor, chunk);
    }

    /// Bytes of plain text produced so far.
    pub fn len(&self) -> usize {
        self.extractor.output.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extractor.output.is_empty()
    }

    pub fn finish(self) -> String {
        self.extractor.output
    }
}

#[derive(Default)]
struct PlainTextExtractor {
    output: String,
}

impl Perform for PlainTextExtractor {
    fn print(&mut self, c: char) {
        self.output.push(c);
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            b'\n' | b'\t' => self.output.push(byte as char),
            // backspace
            0x08 => {
                self.output.pop();
            }
            // \r, bell, and the rest
            _ => {}
        }
    }

    fn hook(&mut self, _params: &Params, _intermediates: &[u8], _ignore: bool, _action: char) {}

    fn osc_dispatch(&mut self, _params: &[&[u8]], _bell_terminated: bool) {}

    fn csi_dispatch(
        &mut self,
        _params: &Params,
        _intermediates: &[u8],
        _ignore: bool,
        _action: char,
    ) {
    }

    fn esc_dispatch(&mut self, _intermediates: &[u8], _ignore: bool, _byte: u8) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_handles_split_escape() {
        let mut stream = OutputSanitizer::stream();
        stream.feed(b"ok \x1b[3");
        stream.feed(b"1mred\x1b[0m\r\n");
        assert_eq!(stream.len(), 7);
        assert_eq!(stream.finish(), "ok red\n");
    }

    #[test]
    fn test_plain_text() {
        assert_eq!(OutputSanitizer::strip_ansi(b"hello world"), "hello world");
    }

    #[test]
    fn test_strip_color_codes() {
        let input = b"\x1b[32m\x1b[1mGreen Bold\x1b[0m Normal \x1b[34mBlue\x1b[0m";
        assert_eq!(OutputSanitizer::strip_ansi(input), "Green Bold Normal Blue");
    }

    #[test]
    fn test_crlf_becomes_lf() {
        let input = b"total 8\r\ndrwxr-xr-x 2 root root 4096 .\r\n";
        assert_eq!(
            OutputSanitizer::strip_ansi(input),
            "total 8\ndrwxr-xr-x 2 root root 4096 .\n"
        );
    }

    #[test]
    fn test_backspace_erases() {
        assert_eq!(OutputSanitizer::strip_ansi(b"lss\x08 -la"), "ls -la");
        assert_eq!(OutputSanitizer::strip_ansi(b"\x08x"), "x");
    }

    #[test]
    fn test_prompt_title_and_bracketed_paste() {
        let input = b"\x1b]0;root@host: ~\x07\x1b[?2004hroot@host:~# ";
        assert_eq!(OutputSanitizer::strip_ansi(input), "root@host:~# ");
    }

    #[test]
    fn test_preserve_tabs() {
        assert_eq!(
            OutputSanitizer::strip_ansi_str("col1\tcol2\x07"),
            "col1\tcol2"
        );
    }

    #[test]
    fn test_multibyte_text() {
        assert_eq!(OutputSanitizer::strip_ansi("héllo ✓".as_bytes()), "héllo ✓");
    }

    #[test]
    fn test_only_escape_codes() {
        assert_eq!(OutputSanitizer::strip_ansi(b"\x1b[31m\x1b[0m\x1b[2J"), "");
    }
}
