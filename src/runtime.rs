use std::collections::HashMap;

/// Runtime side of the translation calls emitted for `trans` tags.
///
/// Implementations look messages up in whatever catalog they own; the
/// engine performs `%name%` substitution on the returned text.
pub trait Translator {
    fn translate(&self, message: &str, domain: &str) -> String;

    fn translate_plural(&self, singular: &str, plural: &str, domain: &str, n: u64) -> String;
}

/// Returns source messages untouched, choosing the plural form when
/// `n != 1`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

impl Translator for Passthrough {
    fn translate(&self, message: &str, _domain: &str) -> String {
        message.to_string()
    }

    fn translate_plural(&self, singular: &str, plural: &str, _domain: &str, n: u64) -> String {
        let form = if n == 1 { singular } else { plural };
        form.to_string()
    }
}

/// Replace `%name%` tokens found in `replacements`, in a single pass.
///
/// Unknown tokens and lone `%` signs are kept as-is, and substituted
/// values are never rescanned.
pub fn substitute(message: &str, replacements: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(message.len());
    let mut rest = message;

    while let Some(start) = rest.find('%') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('%') {
            Some(end) => {
                let key = &rest[start..start + end + 2];
                if let Some(value) = replacements.get(key) {
                    out.push_str(value);
                    rest = &after[end + 1..];
                } else {
                    out.push('%');
                    rest = after;
                }
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}
