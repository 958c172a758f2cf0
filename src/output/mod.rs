//! Output processing for captured shell text.
//!
//! Interactive shells behind a PTY emit colors, prompt titles, bracketed
//! paste toggles, and `\r\n` line endings. None of that belongs in a chat
//! message.
//!
//! # Example
//!
//! ```
//! use teleshell::output::OutputSanitizer;
//!
//! let raw = b"\x1b[31mRed text\x1b[0m\r\n";
//! assert_eq!(OutputSanitizer::strip_ansi(raw), "Red text\n");
//! ```

mod sanitizer;

pub use sanitizer::{OutputSanitizer, SanitizerStream};
