//! Text escaping and content-line folding for the text-based payload formats.

/// Maximum content line length in octets, excluding the line break (RFC 5545 §3.1, RFC 2425 §5.8.1).
pub const MAX_LINE_OCTETS: usize = 75;

/// Escapes a vCard / iCalendar TEXT value.
///
/// Escapes backslash, semicolon, comma and newline. A bare CR is dropped so a
/// CRLF pair collapses into a single `\n`.
#[must_use]
pub fn escape_text(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            ';' => result.push_str("\\;"),
            ',' => result.push_str("\\,"),
            '\n' => result.push_str("\\n"),
            '\r' => {}
            _ => result.push(c),
        }
    }
    result
}

/// Escapes an SSID or password inside a `WIFI:` payload.
#[must_use]
pub fn escape_wifi(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 4);
    for c in s.chars() {
        if matches!(c, '\\' | ';' | ':' | ',') {
            result.push('\\');
        }
        result.push(c);
    }
    result
}

/// Percent-encodes a URI component.
///
/// Leaves `A-Z a-z 0-9 - _ . ! ~ * ' ( )` untouched, matching the component
/// encoding browsers and most scanner apps use.
#[must_use]
pub fn encode_component(s: &str) -> String {
    urlencoding::encode(s)
        .replace("%21", "!")
        .replace("%2A", "*")
        .replace("%27", "'")
        .replace("%28", "(")
        .replace("%29", ")")
}

/// Folds one content line to the 75-octet limit.
///
/// Continuation lines start with a single space and carry at most 74 octets
/// of content. UTF-8 sequences are never split. The result has no trailing
/// line break.
#[must_use]
pub fn fold_line(line: &str) -> String {
    let bytes = line.as_bytes();
    if bytes.len() <= MAX_LINE_OCTETS {
        return line.to_string();
    }

    let mut result = String::with_capacity(bytes.len() + (bytes.len() / MAX_LINE_OCTETS) * 3);
    let mut pos = 0;
    let mut first_line = true;

    while pos < bytes.len() {
        let max_len = if first_line {
            MAX_LINE_OCTETS
        } else {
            MAX_LINE_OCTETS - 1
        };

        let mut end = (pos + max_len).min(bytes.len());
        while end > pos && !line.is_char_boundary(end) {
            end -= 1;
        }
        if end == pos {
            // A single character wider than the budget; emit it whole.
            end = pos + 1;
            while !line.is_char_boundary(end) {
                end += 1;
            }
        }

        if !first_line {
            result.push_str("\r\n ");
        }
        result.push_str(&line[pos..end]);

        pos = end;
        first_line = false;
    }

    result
}

/// Folds every line and joins them with CRLF.
#[must_use]
pub fn join_content_lines<I, S>(lines: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines
        .into_iter()
        .map(|line| fold_line(line.as_ref()))
        .collect::<Vec<_>>()
        .join("\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_text_special() {
        assert_eq!(escape_text("a,b;c\\d"), "a\\,b\\;c\\\\d");
        assert_eq!(escape_text("line1\r\nline2"), "line1\\nline2");
    }

    #[test]
    fn escape_wifi_reserved() {
        assert_eq!(escape_wifi(r"a;b:c,d\e"), r"a\;b\:c\,d\\e");
        assert_eq!(escape_wifi("plain"), "plain");
    }

    #[test]
    fn component_encoding_keeps_mark_characters() {
        assert_eq!(encode_component("Hi there!"), "Hi%20there!");
        assert_eq!(encode_component("(a*b)'~"), "(a*b)'~");
        assert_eq!(encode_component("a&b=c"), "a%26b%3Dc");
        assert_eq!(encode_component("咖啡"), "%E5%92%96%E5%95%A1");
    }

    #[test]
    fn fold_short_line() {
        assert_eq!(fold_line("SUMMARY:Short"), "SUMMARY:Short");
        let exact = "X".repeat(75);
        assert_eq!(fold_line(&exact), exact);
    }

    #[test]
    fn fold_boundary_75_octets() {
        let result = fold_line(&"A".repeat(80));
        let lines: Vec<&str> = result.split("\r\n").collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), 75);
        assert_eq!(lines[1], format!(" {}", "A".repeat(5)));
    }

    #[test]
    fn fold_long_line_unfolds_to_original() {
        let line = "X".repeat(300);
        let result = fold_line(&line);
        for physical in result.split("\r\n") {
            assert!(physical.len() <= MAX_LINE_OCTETS);
        }
        assert_eq!(result.replace("\r\n ", ""), line);
    }

    #[test]
    fn fold_preserves_utf8() {
        let line = format!("{}日本語", "A".repeat(73));
        let result = fold_line(&line);
        for physical in result.split("\r\n") {
            assert!(physical.len() <= MAX_LINE_OCTETS);
        }
        assert_eq!(result.replace("\r\n ", ""), line);
    }
}
