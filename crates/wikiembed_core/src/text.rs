use std::fmt::Display;

use percent_encoding::percent_decode;

/// How far back from a hard cut `limit_length` will look for a nicer boundary.
const MAX_CUT: usize = 50;
const ELLIPSIS: char = '\u{2026}';

/// Inline styles understood by the chat surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Style {
    Bold,
    Italic,
    Underline,
    Strike,
    Spoiler,
}

impl Style {
    pub(crate) fn marker(self) -> &'static str {
        match self {
            Self::Bold => "**",
            Self::Italic => "*",
            Self::Underline => "__",
            Self::Strike => "~~",
            Self::Spoiler => "||",
        }
    }
}

/// Converts a failed optional sub-step into `None`, logging what was skipped.
pub trait BestEffort<T> {
    fn best_effort(self, what: &str) -> Option<T>;
}

impl<T, E: Display> BestEffort<T> for Result<T, E> {
    fn best_effort(self, what: &str) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(error) => {
                tracing::debug!("skipped {what}: {error}");
                None
            }
        }
    }
}

pub fn char_len(value: &str) -> usize {
    value.chars().count()
}

/// Escape characters the chat surface would read as inline markup.
pub fn escape_formatting(value: &str) -> String {
    let mut output = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '\\' | '*' | '_' | '~' | '`' | '|') {
            output.push('\\');
        }
        output.push(ch);
    }
    output
}

/// `[label](url)` for a label that is already escaped; the URL is made safe
/// for the link syntax.
pub fn markdown_link(label: &str, url: &str) -> String {
    let label = label
        .replace('\n', " ")
        .replace('[', "\\[")
        .replace(']', "\\]");
    let url = url
        .replace(' ', "%20")
        .replace('(', "%28")
        .replace(')', "%29");
    format!("[{label}]({url})")
}

pub fn collapse_whitespace(value: &str) -> String {
    let mut output = String::with_capacity(value.len());
    let mut previous_was_space = false;
    for ch in value.chars() {
        if ch.is_whitespace() {
            if !previous_was_space {
                output.push(' ');
                previous_was_space = true;
            }
        } else {
            output.push(ch);
            previous_was_space = false;
        }
    }
    output.trim().to_string()
}

/// Trim every line and collapse runs of three or more line breaks to two.
pub fn collapse_blank_lines(value: &str) -> String {
    let mut output = String::with_capacity(value.len());
    let mut pending_breaks = 0usize;
    for line in value.lines() {
        let line = line.trim();
        if line.is_empty() {
            if !output.is_empty() {
                pending_breaks += 1;
            }
            continue;
        }
        if !output.is_empty() {
            let breaks = (pending_breaks + 1).min(2);
            for _ in 0..breaks {
                output.push('\n');
            }
        }
        output.push_str(line);
        pending_breaks = 0;
    }
    output
}

/// Decode well-formed `%XX` runs; malformed or non-UTF-8 runs are kept verbatim.
pub fn partial_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut output = String::with_capacity(value.len());
    let mut index = 0usize;
    while index < bytes.len() {
        if bytes[index] != b'%' {
            let next = value[index..]
                .find('%')
                .map(|offset| index + offset)
                .unwrap_or(bytes.len());
            output.push_str(&value[index..next]);
            index = next;
            continue;
        }
        let start = index;
        while index + 2 < bytes.len()
            && bytes[index] == b'%'
            && bytes[index + 1].is_ascii_hexdigit()
            && bytes[index + 2].is_ascii_hexdigit()
        {
            index += 3;
        }
        if index == start {
            output.push('%');
            index += 1;
            continue;
        }
        let run = &value[start..index];
        match percent_decode(run.as_bytes()).decode_utf8() {
            Ok(decoded) => output.push_str(&decoded),
            Err(_) => output.push_str(run),
        }
    }
    output
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Piece {
    Text { whitespace: bool, newline: bool, sentence_end: bool },
    Atom,
    Open(Style),
    Close(Style),
}

/// Split markdown into atomic pieces; escapes, links and code spans never split.
fn tokenize(value: &str) -> Vec<(Piece, &str)> {
    let mut pieces = Vec::new();
    let mut stack: Vec<Style> = Vec::new();
    let mut index = 0usize;
    while index < value.len() {
        let rest = &value[index..];
        let Some(ch) = rest.chars().next() else {
            break;
        };

        if ch == '\\' {
            let width = rest[1..].chars().next().map(char::len_utf8).unwrap_or(0);
            pieces.push((Piece::Atom, &rest[..1 + width]));
            index += 1 + width;
            continue;
        }
        if ch == '['
            && let Some(end) = link_end(rest)
        {
            pieces.push((Piece::Atom, &rest[..end]));
            index += end;
            continue;
        }
        if ch == '`'
            && let Some(end) = rest[1..].find('`')
        {
            pieces.push((Piece::Atom, &rest[..end + 2]));
            index += end + 2;
            continue;
        }
        if ch == '*' {
            let mut run = rest.bytes().take_while(|byte| *byte == b'*').count();
            let mut offset = 0usize;
            while run > 0 {
                let style = match stack.last() {
                    Some(Style::Bold) if run >= 2 => Some(Style::Bold),
                    Some(Style::Italic) => Some(Style::Italic),
                    _ => None,
                };
                if let Some(style) = style {
                    let width = style.marker().len();
                    stack.pop();
                    pieces.push((Piece::Close(style), &rest[offset..offset + width]));
                    offset += width;
                    run -= width;
                    continue;
                }
                let style = if run >= 2 { Style::Bold } else { Style::Italic };
                let width = style.marker().len();
                stack.push(style);
                pieces.push((Piece::Open(style), &rest[offset..offset + width]));
                offset += width;
                run -= width;
            }
            index += offset;
            continue;
        }
        let paired = [Style::Underline, Style::Strike, Style::Spoiler]
            .into_iter()
            .find(|style| rest.starts_with(style.marker()));
        if let Some(style) = paired {
            let marker = &rest[..2];
            if stack.last() == Some(&style) {
                stack.pop();
                pieces.push((Piece::Close(style), marker));
            } else if stack.contains(&style) {
                pieces.push((Piece::Atom, marker));
            } else {
                stack.push(style);
                pieces.push((Piece::Open(style), marker));
            }
            index += 2;
            continue;
        }

        let width = ch.len_utf8();
        let sentence_end = matches!(ch, '.' | '!' | '?' | '\u{3002}');
        pieces.push((
            Piece::Text {
                whitespace: ch.is_whitespace(),
                newline: ch == '\n',
                sentence_end,
            },
            &rest[..width],
        ));
        index += width;
    }
    pieces
}

/// Byte length of a `[label](target)` construct starting at `value[0]`.
fn link_end(value: &str) -> Option<usize> {
    let bytes = value.as_bytes();
    let mut index = 1usize;
    let mut depth = 1usize;
    while index < bytes.len() {
        match bytes[index] {
            b'\\' => index += 1,
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            b'\n' => return None,
            _ => {}
        }
        index += 1;
    }
    if depth != 0 || bytes.get(index + 1) != Some(&b'(') {
        return None;
    }
    let target_start = index + 2;
    let close = value[target_start..].find(')')?;
    let target = &value[target_start..target_start + close];
    if target.contains(char::is_whitespace) {
        return None;
    }
    Some(target_start + close + 1)
}

fn closers_len(stack: &[Style]) -> usize {
    stack.iter().map(|style| style.marker().len()).sum()
}

/// Shorten `value` to at most `limit` characters without splitting links,
/// escapes or code spans, closing any inline style left open and marking the
/// cut with an ellipsis. Returns an empty string when nothing well-formed fits.
pub fn limit_length(value: &str, limit: usize) -> String {
    if char_len(value) <= limit {
        return value.to_string();
    }
    if limit == 0 {
        return String::new();
    }

    let pieces = tokenize(value);
    let mut stack: Vec<Style> = Vec::new();
    let mut length = 0usize;
    let mut hard_cut = 0usize;
    let mut cut_length = Vec::with_capacity(pieces.len() + 1);
    for (index, (piece, slice)) in pieces.iter().enumerate() {
        cut_length.push(length);
        if length + closers_len(&stack) + 1 <= limit {
            hard_cut = index;
        } else {
            break;
        }
        match piece {
            Piece::Open(style) => stack.push(*style),
            Piece::Close(_) => {
                stack.pop();
            }
            _ => {}
        }
        length += char_len(slice);
    }

    let floor = cut_length[hard_cut].saturating_sub(MAX_CUT);
    let boundary = |accept: &dyn Fn(usize) -> bool| {
        (1..=hard_cut)
            .rev()
            .take_while(|index| cut_length[*index] >= floor)
            .find(|index| accept(*index))
    };
    let cut = boundary(&|index| matches!(pieces[index].0, Piece::Text { newline: true, .. }))
        .or_else(|| {
            boundary(&|index| {
                matches!(pieces[index].0, Piece::Text { whitespace: true, .. })
                    && matches!(pieces[index - 1].0, Piece::Text { sentence_end: true, .. })
            })
        })
        .or_else(|| boundary(&|index| matches!(pieces[index].0, Piece::Text { whitespace: true, .. })))
        .unwrap_or(hard_cut);

    let mut kept = pieces[..cut].to_vec();
    loop {
        match kept.last() {
            Some((Piece::Text { whitespace: true, .. }, _)) | Some((Piece::Open(_), _)) => {
                kept.pop();
            }
            _ => break,
        }
    }
    if !kept
        .iter()
        .any(|(piece, _)| matches!(piece, Piece::Text { whitespace: false, .. } | Piece::Atom))
    {
        return String::new();
    }

    let mut open: Vec<Style> = Vec::new();
    let mut output = String::with_capacity(limit * 4);
    for (piece, slice) in &kept {
        match piece {
            Piece::Open(style) => open.push(*style),
            Piece::Close(_) => {
                open.pop();
            }
            _ => {}
        }
        output.push_str(slice);
    }
    output.push(ELLIPSIS);
    for style in open.iter().rev() {
        output.push_str(style.marker());
    }
    output
}

/// Group digits the way the wiki's content language does.
pub fn format_number(value: u64, lang: &str) -> String {
    let separator = match lang.split('-').next().unwrap_or("") {
        "de" | "es" | "it" | "nl" | "pt" | "id" | "tr" | "da" => '.',
        "fr" | "pl" | "ru" | "uk" | "cs" | "sv" | "fi" | "nb" | "hu" => '\u{a0}',
        _ => ',',
    };
    let digits = value.to_string();
    let mut output = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            output.push(separator);
        }
        output.push(ch);
    }
    output
}

/// `2024-03-01T12:30:00Z` -> `2024-03-01 12:30`.
pub fn format_timestamp(value: &str) -> String {
    let trimmed = value.trim().trim_end_matches('Z');
    match trimmed.split_once('T') {
        Some((date, time)) => {
            let time = time.get(..5).unwrap_or(time);
            format!("{date} {time}")
        }
        None => trimmed.to_string(),
    }
}
