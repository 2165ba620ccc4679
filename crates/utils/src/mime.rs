/// Parses headers from raw email content, returning an ordered list of headers
/// and a reference to the content after the blank-line separator.
///
/// Headers are preserved in their original order with case-preserved keys
/// and trimmed values. Duplicate headers (e.g. `Received` or multiple
/// `DKIM-Signature`) are kept. Folded header lines (continuations starting
/// with a space or a tab) are unfolded into the previous value, separated
/// by a single space.
///
/// # Examples
///
/// ```rust
/// let (headers, content) = mailgate_utils::parse_raw_headers(
///     "From: alice@example.com\r\nTo: bob@example.com\r\n\r\nHello!"
/// );
/// assert_eq!(headers.len(), 2);
/// assert_eq!(headers[0], ("From".to_string(), "alice@example.com".to_string()));
/// assert_eq!(content, "Hello!");
/// ```
///
/// Folded values are joined:
///
/// ```rust
/// let (headers, _) = mailgate_utils::parse_raw_headers(
///     "DKIM-Signature: v=1; d=example.com;\r\n\th=from:to;\r\n\r\nBody"
/// );
/// assert_eq!(headers.len(), 1);
/// assert_eq!(headers[0].1, "v=1; d=example.com; h=from:to;");
/// ```
pub fn parse_raw_headers(raw: &str) -> (Vec<(String, String)>, &str) {
    let mut headers: Vec<(String, String)> = Vec::new();
    let mut pos = 0;

    for line in raw.lines() {
        let line_len = line.len();
        let end = pos + line_len;
        let consumed = if raw[end..].starts_with("\r\n") {
            end + 2
        } else if raw[end..].starts_with('\n') {
            end + 1
        } else {
            end
        };

        if line.trim().is_empty() {
            pos = consumed;
            break;
        }

        if line.starts_with([' ', '\t']) {
            match headers.last_mut() {
                Some((_, value)) => {
                    if !value.is_empty() {
                        value.push(' ');
                    }
                    value.push_str(line.trim());
                }
                // continuation without a header to attach to, this is content
                None => break,
            }
        } else if let Some((key, value)) = line.split_once(':') {
            headers.push((key.trim().to_string(), value.trim().to_string()));
        } else {
            // Line is not a header (no colon) and not blank, treat as start of content
            break;
        }

        pos = consumed;
    }

    (headers, &raw[pos..])
}
