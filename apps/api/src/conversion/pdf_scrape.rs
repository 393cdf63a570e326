//! Last-resort PDF text scraper.
//!
//! Reads literal strings shown by the `Tj`, `'`, `"` and `TJ` text operators
//! straight out of the file bytes. Only uncompressed content streams yield
//! anything; compressed streams are skipped silently.

pub fn is_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF")
}

pub fn scrape_pdf_text(bytes: &[u8]) -> String {
    let mut out = String::new();
    let mut pending: Vec<String> = Vec::new();
    let mut in_array = false;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'(' => {
                let (literal, next) = read_literal(bytes, i + 1);
                pending.push(literal);
                i = next;
                continue;
            }
            b'[' => {
                in_array = true;
                pending.clear();
            }
            b']' => in_array = false,
            b'T' if !in_array => match bytes.get(i + 1) {
                Some(b'j') | Some(b'J') => {
                    flush(&mut out, &mut pending, " ");
                    i += 2;
                    continue;
                }
                Some(b'*') => out.push('\n'),
                _ => {}
            },
            b'\'' | b'"' if !in_array && !pending.is_empty() => {
                flush(&mut out, &mut pending, "\n");
            }
            b'E' if bytes.get(i + 1) == Some(&b'T') => {
                pending.clear();
                if !out.ends_with('\n') && !out.is_empty() {
                    out.push('\n');
                }
                i += 2;
                continue;
            }
            b'B' if bytes.get(i + 1) == Some(&b'T') => pending.clear(),
            _ => {}
        }
        i += 1;
    }

    out.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn flush(out: &mut String, pending: &mut Vec<String>, separator: &str) {
    if pending.is_empty() {
        return;
    }
    out.push_str(&pending.concat());
    out.push_str(separator);
    pending.clear();
}

/// Reads a PDF literal string starting just after its opening paren.
/// Returns the decoded text and the index after the closing paren.
fn read_literal(bytes: &[u8], start: usize) -> (String, usize) {
    let mut text = String::new();
    let mut depth = 1;
    let mut i = start;

    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'\\' => {
                let Some(&escaped) = bytes.get(i + 1) else {
                    break;
                };
                match escaped {
                    b'n' => text.push('\n'),
                    b'r' => text.push('\r'),
                    b't' => text.push('\t'),
                    b'b' | b'f' => {}
                    b'0'..=b'7' => {
                        let mut value: u32 = 0;
                        let mut len = 0;
                        while len < 3 {
                            match bytes.get(i + 1 + len) {
                                Some(d @ b'0'..=b'7') => {
                                    value = value * 8 + u32::from(d - b'0');
                                    len += 1;
                                }
                                _ => break,
                            }
                        }
                        if let Some(c) = char::from_u32(value & 0xFF) {
                            text.push(c);
                        }
                        i += 1 + len;
                        continue;
                    }
                    b'\r' | b'\n' => {}
                    other => text.push(other as char),
                }
                i += 2;
                continue;
            }
            b'(' => {
                depth += 1;
                text.push('(');
            }
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return (text, i + 1);
                }
                text.push(')');
            }
            _ => text.push(b as char),
        }
        i += 1;
    }

    (text, i)
}
