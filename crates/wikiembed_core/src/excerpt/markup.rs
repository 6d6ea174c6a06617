use scraper::{ElementRef, Html};

use super::signatures::is_removed;
use super::{Piece, pieces};
use crate::text::{Style, collapse_blank_lines, collapse_whitespace, escape_formatting, markdown_link};

/// Render a run of body pieces as chat markdown.
pub fn render(body: &[Piece<'_>], server: &str) -> String {
    let mut output = String::new();
    for piece in body {
        write_piece(&mut output, *piece, server);
    }
    collapse_blank_lines(&output)
}

/// Render the children of `element` as chat markdown.
pub fn render_children(element: ElementRef<'_>, server: &str) -> String {
    render(&pieces(element), server)
}

/// Visible text of `element` without markup, skipping removed elements.
pub fn plain_text(element: ElementRef<'_>) -> String {
    let mut output = String::new();
    collect_plain(&mut output, element);
    collapse_whitespace(&output)
}

/// Visible text of an HTML snippet such as a display title.
pub fn strip_html(html: &str) -> String {
    let document = Html::parse_fragment(html);
    plain_text(document.root_element())
}

fn collect_plain(output: &mut String, element: ElementRef<'_>) {
    for piece in pieces(element) {
        match piece {
            Piece::Text(text) => output.push_str(text),
            Piece::Element(child) if child.value().name() == "br" => output.push(' '),
            Piece::Element(child) if !is_removed(child) => collect_plain(output, child),
            Piece::Element(_) => {}
        }
    }
}

fn ends_with_space(output: &str) -> bool {
    output.chars().next_back().is_none_or(char::is_whitespace)
}

fn new_line(output: &mut String) {
    if !output.is_empty() && !output.ends_with('\n') {
        output.push('\n');
    }
}

fn push_text(output: &mut String, text: &str) {
    if text.trim().is_empty() {
        if !text.is_empty() && !ends_with_space(output) {
            output.push(' ');
        }
        return;
    }
    if text.starts_with(char::is_whitespace) && !ends_with_space(output) {
        output.push(' ');
    }
    let words: Vec<&str> = text.split_whitespace().collect();
    output.push_str(&escape_formatting(&words.join(" ")));
    if text.ends_with(char::is_whitespace) {
        output.push(' ');
    }
}

fn write_piece(output: &mut String, piece: Piece<'_>, server: &str) {
    match piece {
        Piece::Text(text) => push_text(output, text),
        Piece::Element(element) => write_element(output, element, server),
    }
}

fn write_children(output: &mut String, element: ElementRef<'_>, server: &str) {
    for piece in pieces(element) {
        write_piece(output, piece, server);
    }
}

fn write_element(output: &mut String, element: ElementRef<'_>, server: &str) {
    if is_removed(element) {
        return;
    }
    match element.value().name() {
        "br" => output.push('\n'),
        "b" | "strong" => emphasize(output, element, server, Style::Bold),
        "i" | "em" | "cite" | "dfn" | "var" => emphasize(output, element, server, Style::Italic),
        "s" | "del" | "strike" => emphasize(output, element, server, Style::Strike),
        "u" | "ins" => emphasize(output, element, server, Style::Underline),
        "code" | "tt" | "kbd" | "samp" => {
            let text = plain_text(element).replace('`', "'");
            if !text.is_empty() {
                if !ends_with_space(output) {
                    output.push(' ');
                }
                output.push('`');
                output.push_str(&text);
                output.push('`');
            }
        }
        "a" => write_link(output, element, server),
        "img" | "video" | "audio" | "svg" | "map" => {}
        "li" => {
            new_line(output);
            output.push_str("\u{2022} ");
            write_children(output, element, server);
            new_line(output);
        }
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "dt" => {
            let text = plain_text(element);
            if !text.is_empty() {
                new_line(output);
                output.push_str("**");
                output.push_str(&escape_formatting(&text));
                output.push_str("**\n");
            }
        }
        "p" => {
            new_line(output);
            write_children(output, element, server);
            output.push_str("\n\n");
        }
        "div" | "ul" | "ol" | "dl" | "dd" | "blockquote" | "center" | "section" | "pre"
        | "hr" | "figcaption" => {
            new_line(output);
            write_children(output, element, server);
            new_line(output);
        }
        _ => write_children(output, element, server),
    }
}

/// Wrap non-blank content in `style`, keeping surrounding spaces outside the markers.
fn emphasize(output: &mut String, element: ElementRef<'_>, server: &str, style: Style) {
    let mut inner = String::new();
    write_children(&mut inner, element, server);
    let trimmed = inner.trim();
    if trimmed.is_empty() {
        if !inner.is_empty() && !ends_with_space(output) {
            output.push(' ');
        }
        return;
    }
    if inner.starts_with(char::is_whitespace) && !ends_with_space(output) {
        output.push(' ');
    }
    output.push_str(style.marker());
    output.push_str(trimmed);
    output.push_str(style.marker());
    if inner.ends_with(char::is_whitespace) {
        output.push(' ');
    }
}

fn absolute_link(href: &str, server: &str) -> Option<String> {
    if let Some(rest) = href.strip_prefix("//") {
        Some(format!("https://{rest}"))
    } else if href.starts_with('/') {
        Some(format!("{server}{href}"))
    } else if href.starts_with("https://") || href.starts_with("http://") {
        Some(href.to_string())
    } else {
        None
    }
}

fn write_link(output: &mut String, element: ElementRef<'_>, server: &str) {
    let mut label = String::new();
    write_children(&mut label, element, server);
    let label = collapse_whitespace(&label);
    if label.is_empty() {
        return;
    }
    match element
        .value()
        .attr("href")
        .filter(|href| !href.starts_with('#'))
        .and_then(|href| absolute_link(href, server))
    {
        Some(url) => output.push_str(&markdown_link(&label, &url)),
        None => output.push_str(&label),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn render_html(html: &str) -> String {
        let document = Html::parse_fragment(html);
        render_children(document.root_element(), "https://wiki.example.org")
    }

    #[test]
    fn inline_styles_become_markers() {
        assert_eq!(
            render_html("<p>A <b>bold</b>, <i>italic</i>, <s>gone</s> and <u>under</u> word.</p>"),
            "A **bold**, *italic*, ~~gone~~ and __under__ word."
        );
    }

    #[test]
    fn empty_emphasis_is_dropped() {
        assert_eq!(render_html("<p>Before <b> </b>after</p>"), "Before after");
    }

    #[test]
    fn links_are_absolutized_and_encoded() {
        assert_eq!(
            render_html(r##"<p>See <a href="/wiki/Foo_(bar)">Foo</a> or <a href="#Notes">notes</a>.</p>"##),
            "See [Foo](https://wiki.example.org/wiki/Foo_%28bar%29) or notes."
        );
        assert_eq!(
            render_html(r#"<a href="//cdn.example.org/x"><img src="x.png"></a>"#),
            ""
        );
    }

    #[test]
    fn lists_and_breaks_become_lines() {
        assert_eq!(
            render_html("<ul><li>One</li><li>Two<br>lines</li></ul>"),
            "\u{2022} One\n\u{2022} Two\nlines"
        );
    }

    #[test]
    fn removed_elements_and_markup_characters_are_handled() {
        assert_eq!(
            render_html(r#"<p>5*3 = 15<sup class="reference">[2]</sup><span class="mw-editsection">edit</span></p>"#),
            "5\\*3 = 15"
        );
    }

    #[test]
    fn strip_html_keeps_visible_text() {
        assert_eq!(strip_html("<i>Foo</i> (<span style=\"x\">bar</span>)"), "Foo (bar)");
    }

    #[test]
    fn paragraphs_collapse_to_one_blank_line() {
        assert_eq!(render_html("<p>One</p><p></p><p></p><p>Two</p>"), "One\n\nTwo");
    }
}
