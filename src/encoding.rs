//! Text encodings for the store's text operations.

use crate::error::{Error, Result};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
const UTF16_LE_BOM: &[u8] = &[0xFF, 0xFE];
const UTF16_BE_BOM: &[u8] = &[0xFE, 0xFF];

/// Encoding used when reading or writing text entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextEncoding {
    /// UTF-8 without a byte-order mark.
    #[default]
    Utf8,
    /// UTF-8 with a leading byte-order mark.
    Utf8Bom,
    Utf16Le,
    Utf16Be,
}

impl TextEncoding {
    /// The byte-order mark written at the start of a new file.
    pub fn preamble(self) -> &'static [u8] {
        match self {
            Self::Utf8 => &[],
            Self::Utf8Bom => UTF8_BOM,
            Self::Utf16Le => UTF16_LE_BOM,
            Self::Utf16Be => UTF16_BE_BOM,
        }
    }

    /// Encode `text` without a preamble.
    pub fn encode_body(self, text: &str) -> Vec<u8> {
        match self {
            Self::Utf8 | Self::Utf8Bom => text.as_bytes().to_vec(),
            Self::Utf16Le => text.encode_utf16().flat_map(u16::to_le_bytes).collect(),
            Self::Utf16Be => text.encode_utf16().flat_map(u16::to_be_bytes).collect(),
        }
    }

    /// Encode `text` as the full contents of a file, preamble included.
    pub fn encode(self, text: &str) -> Vec<u8> {
        let mut out = self.preamble().to_vec();
        out.extend(self.encode_body(text));
        out
    }

    /// Decode file contents, stripping a leading byte-order mark.
    ///
    /// A UTF-8 BOM is tolerated regardless of the requested UTF-8 flavour.
    /// `path` is only used for error messages.
    pub fn decode(self, bytes: &[u8], path: &str) -> Result<String> {
        match self {
            Self::Utf8 | Self::Utf8Bom => {
                let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
                String::from_utf8(body.to_vec())
                    .map_err(|e| Error::encoding(path, e.to_string()))
            }
            Self::Utf16Le => {
                let body = bytes.strip_prefix(UTF16_LE_BOM).unwrap_or(bytes);
                decode_utf16(body, u16::from_le_bytes, path)
            }
            Self::Utf16Be => {
                let body = bytes.strip_prefix(UTF16_BE_BOM).unwrap_or(bytes);
                decode_utf16(body, u16::from_be_bytes, path)
            }
        }
    }
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16, path: &str) -> Result<String> {
    if bytes.len() % 2 != 0 {
        return Err(Error::encoding(path, "odd number of bytes in UTF-16 data"));
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| unit([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).map_err(|e| Error::encoding(path, e.to_string()))
}

/// Split text into lines, accepting `\n`, `\r\n` and lone `\r` terminators.
///
/// A trailing terminator does not produce an empty final line.
pub fn split_lines(text: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\n' => lines.push(std::mem::take(&mut current)),
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                lines.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}
