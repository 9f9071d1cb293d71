//! Log sanitation helpers. Strings that originate on the radio side
//! (firmware versions, channel names, node names) are untrusted and may
//! contain control characters; everything logged verbatim goes through
//! [`escape_log`] so log lines stay single-line and grep-able.

/// Escape a string for single-line logging: newlines, carriage returns and
/// tabs become their escape sequences, other control characters become
/// `\xNN`, and anything past the preview cap is truncated with an ellipsis.
pub fn escape_log(s: &str) -> String {
    const MAX_PREVIEW: usize = 200;
    let mut out = String::with_capacity(s.len().min(MAX_PREVIEW) + 8);
    for (count, ch) in s.chars().enumerate() {
        if count >= MAX_PREVIEW {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                use std::fmt::Write;
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

/// First `max` bytes of a buffer as lowercase hex, for frame-level debug
/// logging without dumping whole payloads.
pub fn hex_preview(data: &[u8], max: usize) -> String {
    let shown = data.len().min(max);
    let mut out = String::with_capacity(shown * 2 + 1);
    for b in &data[..shown] {
        use std::fmt::Write;
        let _ = write!(&mut out, "{:02x}", b);
    }
    if data.len() > shown {
        out.push('…');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_control_characters() {
        assert_eq!(escape_log("a\nb\r\tc"), "a\\nb\\r\\tc");
        assert_eq!(escape_log("bell\x07"), "bell\\x07");
        assert_eq!(escape_log("back\\slash"), "back\\\\slash");
    }

    #[test]
    fn hex_preview_truncates() {
        assert_eq!(hex_preview(&[0xDE, 0xAD, 0xBE, 0xEF], 2), "dead…");
        assert_eq!(hex_preview(&[0x01], 4), "01");
    }
}
