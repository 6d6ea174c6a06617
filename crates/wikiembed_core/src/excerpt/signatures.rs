use scraper::ElementRef;

/// A structural pattern matched against one element: tag, required classes,
/// and an id prefix. Absent parts match anything.
#[derive(Debug, Clone, Copy)]
pub struct Signature {
    pub tag: Option<&'static str>,
    pub classes: &'static [&'static str],
    pub id_prefix: Option<&'static str>,
}

impl Signature {
    const fn tag(tag: &'static str) -> Self {
        Self {
            tag: Some(tag),
            classes: &[],
            id_prefix: None,
        }
    }

    const fn class(class: &'static [&'static str]) -> Self {
        Self {
            tag: None,
            classes: class,
            id_prefix: None,
        }
    }

    const fn tag_class(tag: &'static str, classes: &'static [&'static str]) -> Self {
        Self {
            tag: Some(tag),
            classes,
            id_prefix: None,
        }
    }

    pub fn matches(&self, element: ElementRef<'_>) -> bool {
        let value = element.value();
        self.tag.is_none_or(|tag| value.name().eq_ignore_ascii_case(tag))
            && self.classes.iter().all(|class| has_class(element, class))
            && self.id_prefix.is_none_or(|prefix| {
                value
                    .id()
                    .is_some_and(|id| id.to_ascii_lowercase().starts_with(prefix))
            })
    }
}

pub fn has_class(element: ElementRef<'_>, class: &str) -> bool {
    element
        .value()
        .classes()
        .any(|candidate| candidate.eq_ignore_ascii_case(class))
}

/// How rows of a detected infobox are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Portable,
    Table,
    Div,
}

/// Known infobox containers, most specific first.
pub const INFOBOXES: &[(Signature, Layout)] = &[
    (Signature::tag_class("aside", &["portable-infobox"]), Layout::Portable),
    (Signature::tag_class("div", &["druid-infobox"]), Layout::Div),
    (Signature::tag_class("table", &["infobox"]), Layout::Table),
    (Signature::tag_class("table", &["infobox_v2"]), Layout::Table),
    (Signature::tag_class("table", &["infobox_v3"]), Layout::Table),
    (Signature::tag_class("table", &["infoboxtable"]), Layout::Table),
    (Signature::tag_class("table", &["tpl-infobox"]), Layout::Table),
    (Signature::tag_class("table", &["infobox-table"]), Layout::Table),
    (Signature::tag_class("div", &["notaninfobox"]), Layout::Div),
    (Signature::tag_class("div", &["infobox-wrapper"]), Layout::Div),
    (Signature::tag_class("div", &["infobox"]), Layout::Div),
    (Signature::tag_class("table", &["wikitable", "ruleset"]), Layout::Table),
    (Signature::tag_class("table", &["ib"]), Layout::Table),
    (Signature::tag_class("table", &["sinfobox"]), Layout::Table),
    (
        Signature {
            tag: Some("table"),
            classes: &[],
            id_prefix: Some("infobox"),
        },
        Layout::Table,
    ),
    (Signature::tag_class("table", &["toccolours"]), Layout::Table),
    (Signature::class(&["va-infobox"]), Layout::Div),
];

/// Elements never carried into excerpt text.
pub const REMOVED: &[Signature] = &[
    Signature::tag("script"),
    Signature::tag("style"),
    Signature::tag("noscript"),
    Signature::tag("link"),
    Signature::tag("meta"),
    Signature::tag("figure"),
    Signature::tag("table"),
    Signature::tag("aside"),
    Signature::tag_class("sup", &["reference"]),
    Signature::class(&["mw-editsection"]),
    Signature::class(&["toc"]),
    Signature::class(&["navbox"]),
    Signature::class(&["ambox"]),
    Signature::class(&["metadata"]),
    Signature::class(&["noexcerpt"]),
    Signature::class(&["noprint"]),
    Signature::class(&["mw-empty-elt"]),
    Signature::class(&["gallery"]),
    Signature::class(&["thumb"]),
    Signature::class(&["references"]),
    Signature::class(&["reflist"]),
    Signature::class(&["mw-references-wrap"]),
    Signature::class(&["hatnote"]),
    Signature::class(&["dablink"]),
    Signature::class(&["printfooter"]),
    Signature::class(&["catlinks"]),
    Signature::class(&["error"]),
];

pub fn is_removed(element: ElementRef<'_>) -> bool {
    REMOVED.iter().any(|signature| signature.matches(element))
        || INFOBOXES.iter().any(|(signature, _)| signature.matches(element))
}

pub fn infobox_layout(element: ElementRef<'_>) -> Option<Layout> {
    INFOBOXES
        .iter()
        .find(|(signature, _)| signature.matches(element))
        .map(|(_, layout)| *layout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn first_element(html: &Html) -> ElementRef<'_> {
        html.root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .find(|element| !matches!(element.value().name(), "html" | "head" | "body"))
            .expect("element")
    }

    #[test]
    fn infobox_signatures_cover_common_variants() {
        for (markup, layout) in [
            (r#"<aside class="portable-infobox pi-theme-a"></aside>"#, Layout::Portable),
            (r#"<table class="wikitable infobox"></table>"#, Layout::Table),
            (r#"<table class="Infobox_v2"></table>"#, Layout::Table),
            (r#"<table id="infobox-character"></table>"#, Layout::Table),
            (r#"<div class="druid-infobox"></div>"#, Layout::Div),
            (r#"<table class="wikitable ruleset"></table>"#, Layout::Table),
        ] {
            let html = Html::parse_fragment(markup);
            assert_eq!(infobox_layout(first_element(&html)), Some(layout), "{markup}");
        }
    }

    #[test]
    fn plain_tables_are_not_infoboxes_but_are_removed() {
        let html = Html::parse_fragment(r#"<table class="wikitable"></table>"#);
        let element = first_element(&html);
        assert_eq!(infobox_layout(element), None);
        assert!(is_removed(element));
    }

    #[test]
    fn removal_signatures_require_every_class() {
        let html = Html::parse_fragment(r#"<sup class="reference">[1]</sup>"#);
        assert!(is_removed(first_element(&html)));
        let html = Html::parse_fragment(r#"<sup class="note">1</sup>"#);
        assert!(!is_removed(first_element(&html)));
    }
}
