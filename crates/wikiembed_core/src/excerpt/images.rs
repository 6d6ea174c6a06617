use scraper::ElementRef;

use super::signatures::Signature;
use super::{KnownFacts, descendant_elements};

const RASTER_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];
const MIN_WIDTH: u32 = 50;
const MAX_EXTRA_IMAGES: usize = 4;

/// Containers whose images are decoration rather than page content.
const DECORATION: &[Signature] = &[
    Signature {
        tag: None,
        classes: &["navbox"],
        id_prefix: None,
    },
    Signature {
        tag: None,
        classes: &["ambox"],
        id_prefix: None,
    },
    Signature {
        tag: None,
        classes: &["metadata"],
        id_prefix: None,
    },
    Signature {
        tag: None,
        classes: &["noexcerpt"],
        id_prefix: None,
    },
    Signature {
        tag: None,
        classes: &["mw-editsection"],
        id_prefix: None,
    },
];

#[derive(Debug, Default)]
pub struct Images {
    pub thumbnail: Option<String>,
    pub extra: Vec<String>,
}

/// Choose the card thumbnail: known page image, first infobox image, first
/// body image, then the site logo.
pub fn select(root: ElementRef<'_>, infobox: Option<ElementRef<'_>>, known: &KnownFacts) -> Images {
    let infobox_images: Vec<String> = infobox
        .map(|element| qualifying(element, &known.server).collect())
        .unwrap_or_default();

    let thumbnail = known
        .page_image
        .clone()
        .or_else(|| infobox_images.first().cloned())
        .or_else(|| {
            descendant_elements(root)
                .filter(|image| image.value().name() == "img")
                .filter(|image| !is_decoration(*image))
                .find_map(|image| image_url(image, &known.server))
        })
        .or_else(|| known.site_logo.clone());

    let mut extra: Vec<String> = Vec::new();
    for image in infobox_images {
        if extra.len() >= MAX_EXTRA_IMAGES {
            break;
        }
        if Some(&image) != thumbnail.as_ref() && !extra.contains(&image) {
            extra.push(image);
        }
    }
    Images { thumbnail, extra }
}

fn qualifying<'a>(element: ElementRef<'a>, server: &'a str) -> impl Iterator<Item = String> + 'a {
    descendant_elements(element)
        .filter(|image| image.value().name() == "img")
        .filter_map(move |image| image_url(image, server))
}

fn is_decoration(image: ElementRef<'_>) -> bool {
    image
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| DECORATION.iter().any(|signature| signature.matches(ancestor)))
}

/// Original-size URL of a content image, or `None` for icons, placeholders,
/// and vector graphics.
pub fn image_url(image: ElementRef<'_>, server: &str) -> Option<String> {
    let value = image.value();
    let lazy = value.attr("data-src").filter(|src| !src.starts_with("data:"));
    let source = match value.attr("src") {
        Some(src) if !src.starts_with("data:") && !value.classes().any(|class| class == "lazyload") => {
            Some(src)
        }
        _ => None,
    }
    .or(lazy)?;

    if let Some(width) = value.attr("width").and_then(|width| width.trim().parse::<u32>().ok())
        && width < MIN_WIDTH
    {
        return None;
    }

    let absolute = if let Some(rest) = source.strip_prefix("//") {
        format!("https://{rest}")
    } else if source.starts_with('/') {
        format!("{server}{source}")
    } else {
        source.to_string()
    };
    let original = original_url(&absolute);
    is_raster(&original).then_some(original)
}

/// Undo thumbnail scaling: `/thumb/` paths lose the scaled file name and
/// revision-style paths are cut after `/revision/latest`.
pub fn original_url(url: &str) -> String {
    let (path, query) = match url.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (url, None),
    };
    if let Some(index) = path.find("/revision/latest") {
        let base = &path[..index + "/revision/latest".len()];
        return match query {
            Some(query) => format!("{base}?{query}"),
            None => base.to_string(),
        };
    }
    if path.contains("/thumb/") {
        let unscaled = path.replacen("/thumb/", "/", 1);
        if let Some((original, _)) = unscaled.rsplit_once('/') {
            return original.to_string();
        }
    }
    url.to_string()
}

fn is_raster(url: &str) -> bool {
    let path = url.split_once('?').map(|(path, _)| path).unwrap_or(url);
    let path = path.split_once("/revision/").map(|(path, _)| path).unwrap_or(path);
    path.rsplit_once('.')
        .map(|(_, extension)| extension.to_ascii_lowercase())
        .is_some_and(|extension| RASTER_EXTENSIONS.contains(&extension.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn known() -> KnownFacts {
        KnownFacts {
            server: "https://wiki.example.org".to_string(),
            page_image: None,
            site_logo: Some("https://wiki.example.org/logo.png".to_string()),
        }
    }

    #[test]
    fn original_url_reverses_thumbnail_paths() {
        assert_eq!(
            original_url("https://upload.example.org/wiki/thumb/a/ab/Foo.png/220px-Foo.png"),
            "https://upload.example.org/wiki/a/ab/Foo.png"
        );
        assert_eq!(
            original_url("https://static.example.net/x/images/a/ab/Foo.png/revision/latest/scale-to-width-down/250?cb=1"),
            "https://static.example.net/x/images/a/ab/Foo.png/revision/latest?cb=1"
        );
        assert_eq!(
            original_url("https://wiki.example.org/images/Foo.png"),
            "https://wiki.example.org/images/Foo.png"
        );
    }

    #[test]
    fn image_url_prefers_lazy_sources_and_skips_icons() {
        let html = Html::parse_fragment(
            r#"<img class="lazyload" src="data:image/gif;base64,R0lG" data-src="//cdn.example.org/thumb/a/ab/Big.jpg/300px-Big.jpg" width="300">
               <img src="/images/icon.png" width="16">
               <img src="/images/diagram.svg" width="400">"#,
        );
        let urls: Vec<Option<String>> = descendant_elements(html.root_element())
            .filter(|element| element.value().name() == "img")
            .map(|image| image_url(image, "https://wiki.example.org"))
            .collect();
        assert_eq!(
            urls,
            vec![Some("https://cdn.example.org/a/ab/Big.jpg".to_string()), None, None]
        );
    }

    #[test]
    fn select_prefers_known_image_then_infobox_then_body() {
        let html = Html::parse_fragment(
            r#"<div class="navbox"><img src="/images/nav.png"></div>
               <p><img src="/images/body.png"></p>
               <table class="infobox"><tr><td><img src="/images/a.png"></td></tr><tr><td><img src="/images/b.png"></td></tr></table>"#,
        );
        let root = html.root_element();
        let infobox = descendant_elements(root).find(|element| element.value().name() == "table");

        let images = select(root, infobox, &known());
        assert_eq!(images.thumbnail.as_deref(), Some("https://wiki.example.org/images/a.png"));
        assert_eq!(images.extra, vec!["https://wiki.example.org/images/b.png".to_string()]);

        let images = select(root, None, &known());
        assert_eq!(images.thumbnail.as_deref(), Some("https://wiki.example.org/images/body.png"));

        let mut facts = known();
        facts.page_image = Some("https://wiki.example.org/images/known.png".to_string());
        let images = select(root, infobox, &facts);
        assert_eq!(images.thumbnail.as_deref(), Some("https://wiki.example.org/images/known.png"));
        assert_eq!(images.extra.len(), 2);
    }
}
