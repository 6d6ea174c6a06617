//! Pure extraction of a bounded excerpt from rendered page HTML.
//!
//! [`extract`] never performs I/O: it takes the HTML produced by
//! `action=parse`, facts already known from page metadata, and an
//! [`ExcerptBudget`], and returns whatever parts fit.

mod images;
mod infobox;
mod markup;
mod section;
mod signatures;

use scraper::node::Node;
use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};

use crate::output::{FIELD_NAME_LIMIT, Field};
use crate::text::limit_length;

pub use markup::strip_html;
use signatures::Layout;

/// Size limits for each excerpt part; zero turns that part off.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExcerptBudget {
    pub desc_length: usize,
    pub field_count: usize,
    pub field_length: usize,
    pub section_length: usize,
    pub section_desc_length: usize,
}

impl Default for ExcerptBudget {
    fn default() -> Self {
        Self {
            desc_length: 1_000,
            field_count: 25,
            field_length: 500,
            section_length: 1_000,
            section_desc_length: 500,
        }
    }
}

impl ExcerptBudget {
    pub fn disabled() -> Self {
        Self {
            desc_length: 0,
            field_count: 0,
            field_length: 0,
            section_length: 0,
            section_desc_length: 0,
        }
    }
}

/// Facts learned from page metadata before the HTML was fetched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownFacts {
    /// Scheme and host used to absolutize relative links.
    pub server: String,
    pub page_image: Option<String>,
    pub site_logo: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionExcerpt {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Excerpt {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<SectionExcerpt>,
    pub fields: Vec<Field>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    pub extra_images: Vec<String>,
}

/// A child of an element: text or a nested element.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Piece<'a> {
    Text(&'a str),
    Element(ElementRef<'a>),
}

pub(crate) fn pieces(element: ElementRef<'_>) -> Vec<Piece<'_>> {
    element
        .children()
        .filter_map(|node| match node.value() {
            Node::Text(text) => Some(Piece::Text(&**text)),
            Node::Element(_) => ElementRef::wrap(node).map(Piece::Element),
            _ => None,
        })
        .collect()
}

pub(crate) fn child_elements(element: ElementRef<'_>) -> impl Iterator<Item = ElementRef<'_>> {
    element.children().filter_map(ElementRef::wrap)
}

pub(crate) fn descendant_elements(element: ElementRef<'_>) -> impl Iterator<Item = ElementRef<'_>> {
    element.descendants().skip(1).filter_map(ElementRef::wrap)
}

fn content_root(document: &Html) -> ElementRef<'_> {
    let root = document.root_element();
    descendant_elements(root)
        .find(|element| signatures::has_class(*element, "mw-parser-output"))
        .unwrap_or(root)
}

fn find_infobox(root: ElementRef<'_>) -> Option<(ElementRef<'_>, Layout)> {
    signatures::INFOBOXES.iter().find_map(|(signature, layout)| {
        descendant_elements(root)
            .find(|element| signature.matches(*element))
            .map(|element| (element, *layout))
    })
}

fn bounded(text: &str, limit: usize) -> Option<String> {
    if limit == 0 {
        return None;
    }
    Some(limit_length(text, limit)).filter(|value| !value.trim().is_empty())
}

/// Extract description, infobox fields, images and an optional section.
pub fn extract(
    html: &str,
    known: &KnownFacts,
    budget: &ExcerptBudget,
    fragment: Option<&str>,
) -> Excerpt {
    let document = Html::parse_fragment(html);
    let root = content_root(&document);
    let body = pieces(root);
    let infobox = find_infobox(root);

    let mut excerpt = Excerpt::default();
    if let Some((element, layout)) = infobox {
        let parsed = infobox::parse(element, layout, budget, &known.server);
        excerpt.title = parsed
            .title
            .and_then(|title| bounded(&title, FIELD_NAME_LIMIT));
        excerpt.fields = parsed.fields;
    }

    let lead = markup::render(section::lead(&body), &known.server);
    let located = fragment
        .filter(|fragment| !fragment.trim().is_empty())
        .and_then(|fragment| section::locate(&body, fragment));
    if let Some(found) = located {
        let text = markup::render(&body[found.start..found.end], &known.server);
        excerpt.section = bounded(&text, budget.section_length).map(|body| SectionExcerpt {
            title: limit_length(&found.heading.text, FIELD_NAME_LIMIT),
            body,
        });
    }
    let description_limit = if excerpt.section.is_some() {
        budget.section_desc_length
    } else {
        budget.desc_length
    };
    excerpt.description = bounded(&lead, description_limit);

    let images = images::select(root, infobox.map(|(element, _)| element), known);
    excerpt.thumbnail = images.thumbnail;
    excerpt.extra_images = images.extra;
    excerpt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::char_len;

    const PAGE: &str = r#"
<div class="mw-parser-output">
  <aside class="portable-infobox">
    <h2 class="pi-item pi-title">Iron Sword</h2>
    <figure class="pi-item pi-image"><a href="/wiki/File:Iron_Sword.png"><img src="https://static.example.org/images/a/ab/Iron_Sword.png/revision/latest/scale-to-width-down/268?cb=20240101" width="268"></a></figure>
    <div class="pi-item pi-data"><h3 class="pi-data-label">Damage</h3><div class="pi-data-value">10</div></div>
    <div class="pi-item pi-data"><h3 class="pi-data-label">Weight</h3><div class="pi-data-value">2 kg</div></div>
  </aside>
  <p>The <b>Iron Sword</b> is a <a href="/wiki/Weapon">weapon</a> forged from iron.<sup class="reference">[1]</sup></p>
  <p>It is common.</p>
  <h2><span class="mw-headline" id="Crafting_recipe">Crafting recipe</span><span class="mw-editsection">[edit]</span></h2>
  <p>Combine <i>two</i> iron ingots.</p>
  <h3><span class="mw-headline" id="Notes">Notes</span></h3>
  <p>Cannot be repaired.</p>
  <h2><span class="mw-headline" id="Trivia">Trivia</span></h2>
  <p>Named after iron.</p>
</div>"#;

    fn known() -> KnownFacts {
        KnownFacts {
            server: "https://game.example.org".to_string(),
            page_image: None,
            site_logo: Some("https://game.example.org/logo.png".to_string()),
        }
    }

    #[test]
    fn extract_reads_lead_infobox_and_thumbnail() {
        let excerpt = extract(PAGE, &known(), &ExcerptBudget::default(), None);
        assert_eq!(excerpt.title.as_deref(), Some("Iron Sword"));
        assert_eq!(
            excerpt.description.as_deref(),
            Some("The **Iron Sword** is a [weapon](https://game.example.org/wiki/Weapon) forged from iron.\n\nIt is common.")
        );
        let names: Vec<&str> = excerpt.fields.iter().map(|field| field.name.as_str()).collect();
        assert_eq!(names, vec!["Damage", "Weight"]);
        assert_eq!(
            excerpt.thumbnail.as_deref(),
            Some("https://static.example.org/images/a/ab/Iron_Sword.png/revision/latest?cb=20240101")
        );
        assert!(excerpt.section.is_none());
    }

    #[test]
    fn extract_locates_requested_section_including_subsections() {
        let excerpt = extract(PAGE, &known(), &ExcerptBudget::default(), Some("crafting recipe"));
        let section = excerpt.section.expect("section");
        assert_eq!(section.title, "Crafting recipe");
        assert!(section.body.contains("Combine *two* iron ingots."));
        assert!(section.body.contains("Cannot be repaired."));
        assert!(!section.body.contains("Named after iron."));
        assert!(excerpt.description.is_some());
    }

    #[test]
    fn extract_falls_back_to_lead_for_unknown_fragment() {
        let excerpt = extract(PAGE, &known(), &ExcerptBudget::default(), Some("Nowhere"));
        assert!(excerpt.section.is_none());
        assert!(excerpt.description.expect("lead").starts_with("The **Iron Sword**"));
    }

    #[test]
    fn zero_budget_disables_each_part() {
        let excerpt = extract(PAGE, &known(), &ExcerptBudget::disabled(), Some("Crafting recipe"));
        assert!(excerpt.description.is_none());
        assert!(excerpt.section.is_none());
        assert!(excerpt.fields.is_empty());

        let budget = ExcerptBudget {
            desc_length: 0,
            ..ExcerptBudget::default()
        };
        let excerpt = extract(PAGE, &known(), &budget, None);
        assert!(excerpt.description.is_none());
        assert_eq!(excerpt.fields.len(), 2);
    }

    #[test]
    fn lead_keeps_its_own_limit_when_the_section_is_disabled() {
        let budget = ExcerptBudget {
            section_length: 0,
            section_desc_length: 0,
            ..ExcerptBudget::default()
        };
        let excerpt = extract(PAGE, &known(), &budget, Some("Crafting recipe"));
        assert!(excerpt.section.is_none());
        assert!(excerpt.description.expect("lead").starts_with("The **Iron Sword**"));
    }

    #[test]
    fn truncated_parts_respect_budget_and_close_emphasis() {
        let html = format!(
            r#"<div class="mw-parser-output"><p><b>{}</b></p></div>"#,
            "bold words ".repeat(40)
        );
        let budget = ExcerptBudget {
            desc_length: 60,
            ..ExcerptBudget::default()
        };
        let excerpt = extract(&html, &known(), &budget, None);
        let description = excerpt.description.expect("description");
        assert!(char_len(&description) <= 60);
        assert!(description.starts_with("**"));
        assert!(description.ends_with("**"));
        assert_eq!(description.matches("**").count(), 2);
    }

    #[test]
    fn extract_uses_site_logo_when_page_has_no_images() {
        let excerpt = extract("<p>Plain text.</p>", &known(), &ExcerptBudget::default(), None);
        assert_eq!(excerpt.description.as_deref(), Some("Plain text."));
        assert_eq!(excerpt.thumbnail.as_deref(), Some("https://game.example.org/logo.png"));
    }
}
