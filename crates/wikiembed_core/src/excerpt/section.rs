use scraper::ElementRef;

use super::markup::plain_text;
use super::signatures::has_class;
use super::{Piece, child_elements};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    pub level: u8,
    pub id: Option<String>,
    pub text: String,
}

/// Body range `[start, end)` belonging to a located heading.
#[derive(Debug, Clone)]
pub struct Located {
    pub heading: Heading,
    pub start: usize,
    pub end: usize,
}

fn heading_level(element: ElementRef<'_>) -> Option<u8> {
    match element.value().name() {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

/// Recognize `hN` elements and the newer `div.mw-heading` wrappers around them.
pub fn heading(element: ElementRef<'_>) -> Option<Heading> {
    let target = if has_class(element, "mw-heading") {
        child_elements(element).find(|child| heading_level(*child).is_some())?
    } else {
        element
    };
    let level = heading_level(target)?;
    let id = target
        .value()
        .id()
        .map(str::to_string)
        .or_else(|| {
            child_elements(target)
                .find(|child| has_class(*child, "mw-headline"))
                .and_then(|headline| headline.value().id().map(str::to_string))
        });
    Some(Heading {
        level,
        id,
        text: plain_text(target),
    })
}

fn headings(body: &[Piece<'_>]) -> Vec<(usize, Heading)> {
    body.iter()
        .enumerate()
        .filter_map(|(index, piece)| match piece {
            Piece::Element(element) => heading(*element).map(|heading| (index, heading)),
            Piece::Text(_) => None,
        })
        .collect()
}

/// Everything before the first heading.
pub fn lead<'p, 'a>(body: &'p [Piece<'a>]) -> &'p [Piece<'a>] {
    let end = headings(body)
        .first()
        .map(|(index, _)| *index)
        .unwrap_or(body.len());
    &body[..end]
}

/// Find the heading named by `fragment`, trying exact and case-insensitive id
/// matches before exact, case-insensitive, and substring matches on its text.
pub fn locate(body: &[Piece<'_>], fragment: &str) -> Option<Located> {
    let all = headings(body);
    let wanted_id = fragment.trim().replace(' ', "_");
    let wanted_text = fragment.trim().replace('_', " ");
    let wanted_lower = wanted_text.to_lowercase();

    let matchers: [&dyn Fn(&Heading) -> bool; 5] = [
        &|heading: &Heading| heading.id.as_deref() == Some(wanted_id.as_str()),
        &|heading: &Heading| {
            heading
                .id
                .as_deref()
                .is_some_and(|id| id.to_lowercase() == wanted_id.to_lowercase())
        },
        &|heading: &Heading| heading.text == wanted_text,
        &|heading: &Heading| heading.text.to_lowercase() == wanted_lower,
        &|heading: &Heading| heading.text.to_lowercase().contains(&wanted_lower),
    ];
    let position = matchers
        .iter()
        .find_map(|matcher| all.iter().position(|(_, heading)| matcher(heading)))?;

    let (index, heading) = &all[position];
    let end = all[position + 1..]
        .iter()
        .find(|(_, next)| next.level <= heading.level)
        .map(|(next_index, _)| *next_index)
        .unwrap_or(body.len());
    Some(Located {
        heading: heading.clone(),
        start: index + 1,
        end,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::excerpt::pieces;
    use scraper::Html;

    const BODY: &str = r#"
<p>Lead.</p>
<div class="mw-heading mw-heading2"><h2 id="Early_life">Early life</h2></div>
<p>Childhood.</p>
<h3><span class="mw-headline" id="Education">Education</span></h3>
<p>School.</p>
<h2><span class="mw-headline" id="Later_years">Later years</span></h2>
<p>Retirement.</p>
"#;

    fn with_body<R>(check: impl FnOnce(&[Piece<'_>]) -> R) -> R {
        let document = Html::parse_fragment(BODY);
        let body = pieces(document.root_element());
        check(&body)
    }

    #[test]
    fn locate_prefers_ids_then_text() {
        with_body(|body| {
            let found = locate(body, "Early life").expect("exact id");
            assert_eq!(found.heading.text, "Early life");
            assert_eq!(found.heading.level, 2);

            let found = locate(body, "later_YEARS").expect("case-insensitive id");
            assert_eq!(found.heading.text, "Later years");

            let found = locate(body, "educ").expect("substring");
            assert_eq!(found.heading.level, 3);
            assert!(locate(body, "Death").is_none());
        });
    }

    #[test]
    fn located_range_stops_at_same_or_higher_level() {
        with_body(|body| {
            let found = locate(body, "Early_life").expect("section");
            let texts: Vec<String> = body[found.start..found.end]
                .iter()
                .filter_map(|piece| match piece {
                    Piece::Element(element) => Some(plain_text(*element)),
                    Piece::Text(_) => None,
                })
                .collect();
            assert_eq!(texts, vec!["Childhood.", "Education", "School."]);

            let found = locate(body, "Education").expect("subsection");
            let Piece::Element(next) = body[found.end] else {
                panic!("section must end at an element");
            };
            assert_eq!(heading(next).map(|heading| heading.text).as_deref(), Some("Later years"));
        });
    }

    #[test]
    fn lead_stops_at_first_heading() {
        with_body(|body| {
            let lead = lead(body);
            assert!(lead.iter().any(|piece| matches!(piece, Piece::Element(element) if plain_text(*element) == "Lead.")));
            assert!(!lead.iter().any(|piece| matches!(piece, Piece::Element(element) if element.value().name() == "div")));
        });
    }
}
