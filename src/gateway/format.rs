//! Message framing for Telegram's HTML parse mode.

/// Telegram's per-message text limit, in characters.
pub const MESSAGE_LIMIT: usize = 4096;

/// Escape `&`, `<` and `>` for HTML parse mode.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        push_escaped(&mut escaped, c);
    }
    escaped
}

fn push_escaped(out: &mut String, c: char) {
    match c {
        '&' => out.push_str("&amp;"),
        '<' => out.push_str("&lt;"),
        '>' => out.push_str("&gt;"),
        _ => out.push(c),
    }
}

fn escaped_len(c: char) -> usize {
    match c {
        '&' => 5,
        '<' | '>' => 4,
        _ => 1,
    }
}

/// Render `body` as preformatted blocks under an optional header.
///
/// The first block starts with `header` (already HTML). Every returned
/// message fits in [`MESSAGE_LIMIT`] characters; splits prefer line breaks
/// and never cut an escape sequence.
pub fn pre_blocks(header: &str, body: &str) -> Vec<String> {
    const OPEN: &str = "<pre>";
    const CLOSE: &str = "</pre>";
    let overhead = OPEN.len() + CLOSE.len();

    let mut messages = Vec::new();
    let mut prefix = header.to_string();
    let mut remaining: Vec<char> = body.chars().collect();

    loop {
        let room = MESSAGE_LIMIT.saturating_sub(prefix.chars().count() + overhead);
        let take = fit(&remaining, room);
        let piece: String = remaining[..take].iter().collect();
        messages.push(format!("{}{}{}{}", prefix, OPEN, escape_html(&piece), CLOSE));
        remaining.drain(..take);
        if remaining.is_empty() {
            break;
        }
        prefix.clear();
    }
    messages
}

/// How many chars of `chars` fit in `room` escaped characters.
///
/// Backs up to just after the last newline when the cut is mid-line and a
/// newline exists in the window. Always takes at least one char.
fn fit(chars: &[char], room: usize) -> usize {
    let mut used = 0;
    let mut take = 0;
    let mut last_newline = None;
    for (i, c) in chars.iter().enumerate() {
        let len = escaped_len(*c);
        if used + len > room {
            break;
        }
        used += len;
        take = i + 1;
        if *c == '\n' {
            last_newline = Some(i + 1);
        }
    }
    if take < chars.len() {
        if let Some(cut) = last_newline {
            take = cut;
        }
    }
    take.max(1).min(chars.len())
}

/// Split plain (already escaped) text into limit-sized messages.
///
/// Prefers line boundaries and never cuts an `&…;` entity.
pub fn split_message(text: &str) -> Vec<String> {
    if text.chars().count() <= MESSAGE_LIMIT {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut count = 0;
    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if count + line_len > MESSAGE_LIMIT && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            count = 0;
        }
        if line_len <= MESSAGE_LIMIT {
            current.push_str(line);
            count += line_len;
            continue;
        }
        // a single line longer than the limit
        for c in line.chars() {
            if count == MESSAGE_LIMIT || (c == '&' && count + 5 > MESSAGE_LIMIT) {
                chunks.push(std::mem::take(&mut current));
                count = 0;
            }
            current.push(c);
            count += 1;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("a < b && c > d"), "a &lt; b &amp;&amp; c &gt; d");
        assert_eq!(escape_html("plain"), "plain");
    }

    #[test]
    fn test_short_output_is_one_block() {
        let messages = pre_blocks("<b>$ ls</b>\n", "a.txt\nb.txt\n");
        assert_eq!(messages, vec!["<b>$ ls</b>\n<pre>a.txt\nb.txt\n</pre>"]);
    }

    #[test]
    fn test_long_output_fits_limit() {
        let body = "line of output\n".repeat(1000);
        let messages = pre_blocks("<b>$ cat log</b>\n", &body);

        assert!(messages.len() > 1);
        for message in &messages {
            assert!(message.chars().count() <= MESSAGE_LIMIT);
            assert!(message.contains("<pre>") && message.ends_with("</pre>"));
        }
        // nothing lost
        let joined: String = messages
            .iter()
            .map(|m| {
                let start = m.find("<pre>").unwrap() + 5;
                &m[start..m.len() - 6]
            })
            .collect();
        assert_eq!(joined, body);
    }

    #[test]
    fn test_escapes_count_toward_limit() {
        let body = "<".repeat(3000);
        let messages = pre_blocks("", &body);
        assert_eq!(messages.len(), 3);
        for message in &messages {
            assert!(message.chars().count() <= MESSAGE_LIMIT);
            assert!(!message.contains("&l</pre>"));
        }
    }

    #[test]
    fn test_split_message_short() {
        assert_eq!(split_message("hello"), vec!["hello"]);
    }

    #[test]
    fn test_split_message_on_lines() {
        let text = format!("{}\n{}", "a".repeat(3000), "b".repeat(3000));
        let chunks = split_message(&text);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].ends_with('\n'));
        assert_eq!(chunks[1], "b".repeat(3000));
    }

    #[test]
    fn test_split_message_long_line_keeps_entities() {
        let text = format!("{}&amp;{}", "x".repeat(4093), "y".repeat(10));
        let chunks = split_message(&text);
        assert_eq!(chunks[0], "x".repeat(4093));
        assert!(chunks[1].starts_with("&amp;"));
    }
}
