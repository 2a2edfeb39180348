//! RFC 2047 encoded-word decoding for envelope subjects and display names.
//!
//! `=?charset?B|Q?text?=` runs are replaced by their decoded text. Linear
//! whitespace between two adjacent encoded words is dropped, and adjacent
//! words in the same charset are decoded together so a multi-byte character
//! split across words survives. Malformed words are left as they are.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use encoding_rs::Encoding;

/// One encoded word found in the input.
struct Word<'a> {
    charset: &'a str,
    bytes: Vec<u8>,
    end: usize,
}

/// Decodes every encoded word in `input`.
#[must_use]
pub fn decode(input: &str) -> String {
    if !input.contains("=?") {
        return input.to_string();
    }

    let mut out = String::with_capacity(input.len());
    let mut pos = 0;
    // Pending raw bytes of adjacent words sharing a charset.
    let mut pending: Option<(&str, Vec<u8>)> = None;

    while pos < input.len() {
        let Some(offset) = input[pos..].find("=?") else {
            break;
        };
        let start = pos + offset;

        let Some(word) = parse_word(input, start) else {
            flush(&mut out, &mut pending);
            out.push_str(&input[pos..start + 2]);
            pos = start + 2;
            continue;
        };

        let gap = &input[pos..start];
        let adjacent = pending.is_some() && gap.chars().all(char::is_whitespace);
        if !adjacent {
            flush(&mut out, &mut pending);
            out.push_str(gap);
        }

        let end = word.end;
        let same_charset = pending
            .as_ref()
            .is_some_and(|(charset, _)| charset.eq_ignore_ascii_case(word.charset));
        if same_charset {
            if let Some((_, bytes)) = pending.as_mut() {
                bytes.extend_from_slice(&word.bytes);
            }
        } else {
            flush(&mut out, &mut pending);
            pending = Some((word.charset, word.bytes));
        }
        pos = end;
    }

    flush(&mut out, &mut pending);
    out.push_str(&input[pos..]);
    out
}

fn flush(out: &mut String, pending: &mut Option<(&str, Vec<u8>)>) {
    if let Some((charset, bytes)) = pending.take() {
        out.push_str(&to_text(charset, &bytes));
    }
}

/// Parses `=?charset?enc?text?=` starting at `start`.
fn parse_word(input: &str, start: usize) -> Option<Word<'_>> {
    let rest = input.get(start + 2..)?;
    let (charset, rest) = rest.split_once('?')?;
    let (encoding, rest) = rest.split_once('?')?;
    let text_len = rest.find("?=")?;
    let text = &rest[..text_len];

    if charset.is_empty() || text.contains(char::is_whitespace) {
        return None;
    }
    // RFC 2231 language suffix: `utf-8*en`.
    let charset = charset.split('*').next().unwrap_or(charset);

    let bytes = match encoding {
        "B" | "b" => decode_b(text)?,
        "Q" | "q" => decode_q(text)?,
        _ => return None,
    };

    let end = input.len() - rest.len() + text_len + 2;
    Some(Word {
        charset,
        bytes,
        end,
    })
}

fn decode_b(text: &str) -> Option<Vec<u8>> {
    // Some mailers drop the padding.
    let mut padded = text.to_string();
    while padded.len() % 4 != 0 {
        padded.push('=');
    }
    STANDARD.decode(padded.as_bytes()).ok()
}

fn decode_q(text: &str) -> Option<Vec<u8>> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => out.push(b' '),
            b'=' => {
                let hex = text.get(i + 1..i + 3)?;
                out.push(u8::from_str_radix(hex, 16).ok()?);
                i += 2;
            }
            b => out.push(b),
        }
        i += 1;
    }
    Some(out)
}

fn to_text(charset: &str, bytes: &[u8]) -> String {
    match Encoding::for_label(charset.trim().as_bytes()) {
        Some(encoding) => encoding.decode_without_bom_handling(bytes).0.into_owned(),
        None => String::from_utf8_lossy(bytes).into_owned(),
    }
}
