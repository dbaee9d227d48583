//! Text encoding repair for configuration files.
//!
//! Editors on some platforms save with a byte-order mark or as UTF-16. The
//! loader's first attempt reads the raw bytes as UTF-8; on failure it calls
//! [`repair`] and retries once.

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
const UTF16_LE_BOM: &[u8] = &[0xFF, 0xFE];
const UTF16_BE_BOM: &[u8] = &[0xFE, 0xFF];

/// Detected source encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEncoding {
    Utf8,
    Utf8Bom,
    Utf16Le,
    Utf16Be,
}

/// Guess the encoding from a BOM, falling back to a NUL-byte heuristic for
/// BOM-less UTF-16.
pub fn detect(bytes: &[u8]) -> SourceEncoding {
    if bytes.starts_with(UTF8_BOM) {
        return SourceEncoding::Utf8Bom;
    }
    if bytes.starts_with(UTF16_LE_BOM) {
        return SourceEncoding::Utf16Le;
    }
    if bytes.starts_with(UTF16_BE_BOM) {
        return SourceEncoding::Utf16Be;
    }
    if bytes.len() >= 2 {
        // ASCII text in UTF-16 has a NUL in every other byte.
        let sample = &bytes[..bytes.len().min(64) & !1];
        let even_nuls = sample.iter().step_by(2).filter(|b| **b == 0).count();
        let odd_nuls = sample.iter().skip(1).step_by(2).filter(|b| **b == 0).count();
        let half = sample.len() / 2;
        if odd_nuls * 2 > half && even_nuls == 0 {
            return SourceEncoding::Utf16Le;
        }
        if even_nuls * 2 > half && odd_nuls == 0 {
            return SourceEncoding::Utf16Be;
        }
    }
    SourceEncoding::Utf8
}

/// Re-encode `bytes` as UTF-8 text, dropping any BOM.
///
/// Returns `None` when the bytes are not valid in the detected encoding.
pub fn repair(bytes: &[u8]) -> Option<String> {
    match detect(bytes) {
        SourceEncoding::Utf8 => String::from_utf8(bytes.to_vec()).ok(),
        SourceEncoding::Utf8Bom => String::from_utf8(bytes[UTF8_BOM.len()..].to_vec()).ok(),
        SourceEncoding::Utf16Le => decode_utf16(strip(bytes, UTF16_LE_BOM), u16::from_le_bytes),
        SourceEncoding::Utf16Be => decode_utf16(strip(bytes, UTF16_BE_BOM), u16::from_be_bytes),
    }
    .map(|text| text.trim_start_matches('\u{feff}').to_string())
}

fn strip<'a>(bytes: &'a [u8], bom: &[u8]) -> &'a [u8] {
    bytes.strip_prefix(bom).unwrap_or(bytes)
}

fn decode_utf16(bytes: &[u8], to_unit: fn([u8; 2]) -> u16) -> Option<String> {
    if bytes.len() % 2 != 0 {
        return None;
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| to_unit([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf16le(text: &str, bom: bool) -> Vec<u8> {
        let mut out = if bom { UTF16_LE_BOM.to_vec() } else { Vec::new() };
        for unit in text.encode_utf16() {
            out.extend_from_slice(&unit.to_le_bytes());
        }
        out
    }

    #[test]
    fn test_detect() {
        assert_eq!(detect(b"port = 1"), SourceEncoding::Utf8);
        assert_eq!(detect(b"\xEF\xBB\xBFport = 1"), SourceEncoding::Utf8Bom);
        assert_eq!(detect(&utf16le("port = 1", true)), SourceEncoding::Utf16Le);
        assert_eq!(detect(&utf16le("port = 1", false)), SourceEncoding::Utf16Le);
    }

    #[test]
    fn test_repair_utf8_bom() {
        assert_eq!(repair(b"\xEF\xBB\xBF{\"a\":1}").as_deref(), Some("{\"a\":1}"));
    }

    #[test]
    fn test_repair_utf16() {
        let text = "{\"server\": {\"port\": 9000}}";
        assert_eq!(repair(&utf16le(text, true)).as_deref(), Some(text));

        let mut be = UTF16_BE_BOM.to_vec();
        for unit in text.encode_utf16() {
            be.extend_from_slice(&unit.to_be_bytes());
        }
        assert_eq!(repair(&be).as_deref(), Some(text));
    }

    #[test]
    fn test_repair_rejects_garbage() {
        assert_eq!(repair(&[0xC3, 0x28, 0x41, 0x42]), None);
    }
}
