//! Markdown-to-prose cleanup applied to every extracted document.

/// Strips headers, emphasis, inline code, links, images, blockquotes, list
/// bullets and horizontal rules, and collapses runs of blank lines.
pub fn strip_markdown(input: &str) -> String {
    let mut lines = Vec::new();
    let mut blank_run = 0;

    for raw_line in input.lines() {
        let line = clean_line(raw_line);
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
            lines.push(String::new());
        } else {
            blank_run = 0;
            lines.push(line);
        }
    }

    lines.join("\n").trim().to_string()
}

/// Whitespace-delimited word count.
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

fn clean_line(line: &str) -> String {
    let trimmed = line.trim();
    if is_horizontal_rule(trimmed) || trimmed.starts_with("```") {
        return String::new();
    }

    let mut rest = trimmed;
    while let Some(stripped) = rest.strip_prefix('>') {
        rest = stripped.trim_start();
    }

    let hashes = rest.chars().take_while(|c| *c == '#').count();
    if (1..=6).contains(&hashes) {
        let after = &rest[hashes..];
        if after.is_empty() || after.starts_with(' ') {
            rest = after.trim_start();
        }
    }

    for bullet in ["- ", "* ", "+ "] {
        if let Some(stripped) = rest.strip_prefix(bullet) {
            rest = stripped.trim_start();
            break;
        }
    }

    strip_emphasis(&strip_links(rest))
}

fn is_horizontal_rule(line: &str) -> bool {
    let compact: String = line.chars().filter(|c| !c.is_whitespace()).collect();
    compact.len() >= 3
        && ['-', '*', '_']
            .iter()
            .any(|m| compact.chars().all(|c| c == *m))
}

/// `[text](url)` → `text`, `![alt](url)` → `alt`.
fn strip_links(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;

    while let Some(open) = rest.find('[') {
        let Some(close_rel) = rest[open..].find("](") else {
            break;
        };
        let close = open + close_rel;
        let Some(paren_rel) = rest[close + 2..].find(')') else {
            break;
        };
        let url_end = close + 2 + paren_rel;

        let prefix = &rest[..open];
        out.push_str(prefix.strip_suffix('!').unwrap_or(prefix));
        out.push_str(&rest[open + 1..close]);
        rest = &rest[url_end + 1..];
    }

    out.push_str(rest);
    out
}

/// Removes `*`, `~~` and backticks everywhere, and `_` only at word edges so
/// identifiers like `snake_case` survive.
fn strip_emphasis(line: &str) -> String {
    let line = line.replace("~~", "");
    let chars: Vec<char> = line.chars().collect();
    let mut out = String::with_capacity(line.len());

    for (i, &c) in chars.iter().enumerate() {
        match c {
            '*' | '`' => continue,
            '_' => {
                let prev_word = i > 0 && chars[i - 1].is_alphanumeric();
                let next_word = chars.get(i + 1).is_some_and(|n| n.is_alphanumeric());
                if prev_word && next_word {
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
    }

    out
}
