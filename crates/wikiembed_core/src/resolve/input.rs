use crate::farm::FarmRegistry;
use crate::snapshot::SiteDirectory;
use crate::text::{char_len, partial_decode};
use crate::wiki::{NS_SPECIAL, WikiReference};

use super::ResolutionState;
use super::diff::DiffRequest;

pub const MAX_TITLE_LENGTH: usize = 250;

/// Renderers reachable without the combined metadata query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Alias {
    Random { namespace: Option<i32> },
    Overview,
    Diff(DiffRequest),
    /// Bare link to `title`, no fetch at all.
    Page { title: String },
    Search { terms: String },
}

/// Parse `text` into `state`.
///
/// With `classifier` set, an absolute URL on a known wiki is taken apart and
/// the wiki it points at is returned; the caller switches to it without
/// counting a hop.
pub fn normalize(
    text: &str,
    state: &mut ResolutionState,
    wiki: &WikiReference,
    classifier: Option<(&FarmRegistry, &SiteDirectory)>,
) -> Option<WikiReference> {
    let mut text = text.trim();
    if let Some(inner) = text
        .strip_prefix("||")
        .and_then(|rest| rest.strip_suffix("||"))
        .filter(|inner| !inner.trim().is_empty())
    {
        state.spoiler = true;
        text = inner.trim();
    }
    if let Some(inner) = text.strip_prefix('<').and_then(|rest| rest.strip_suffix('>')) {
        state.no_preview = true;
        text = inner.trim();
    }

    let classified = classifier
        .filter(|_| text.starts_with("https://") || text.starts_with("http://"))
        .and_then(|(farms, directory)| farms.classify(text, directory));

    let (raw_title, fragment, inline_query, switched) = match classified {
        Some(classified) => (
            classified.title,
            classified.fragment,
            classified.query,
            Some(classified.wiki),
        ),
        None => {
            let (rest, fragment) = match text.split_once('#') {
                Some((rest, fragment)) => (rest, Some(fragment.to_string())),
                None => (text, None),
            };
            let (rest, query) = split_query(rest);
            (rest.to_string(), fragment, query, None)
        }
    };
    let title_wiki = switched.as_ref().unwrap_or(wiki);

    for (key, value) in inline_query {
        state
            .query
            .insert(partial_decode(&key), partial_decode(&value));
    }
    if let Some(fragment) = fragment {
        let fragment = partial_decode(&fragment).trim().to_string();
        state.fragment = (!fragment.is_empty()).then_some(fragment);
    }

    let mut title = clean_title(&raw_title);
    if title.is_empty()
        && let Some(value) = state.query.remove(&title_wiki.title_parameter())
    {
        title = clean_title(&value);
    }
    if char_len(&title) > MAX_TITLE_LENGTH {
        title = title.chars().take(MAX_TITLE_LENGTH).collect();
        state.truncated = true;
    }
    state.title = title;

    if state.query.get("redirect").is_some_and(|value| value == "no") {
        state.no_redirect = true;
    }
    if state
        .query
        .get("action")
        .is_some_and(|action| !action.is_empty() && action != "view")
    {
        state.no_preview = true;
    }
    switched
}

/// Split `Title?key=value&...`; a `?` without any `=` after it belongs to the title.
fn split_query(text: &str) -> (&str, Vec<(String, String)>) {
    let Some((rest, query)) = text.split_once('?') else {
        return (text, Vec::new());
    };
    if !query.contains('=') {
        return (text, Vec::new());
    }
    let pairs = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (key.to_string(), value.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect();
    (rest, pairs)
}

fn clean_title(raw: &str) -> String {
    partial_decode(raw)
        .replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Case-insensitive first-word aliases, their `Special:` equivalents, and
/// `?diff=` links.
pub fn alias(state: &ResolutionState, wiki: &WikiReference) -> Option<Alias> {
    if state.query.contains_key("diff")
        && let Some(request) = DiffRequest::from_query(&state.query)
    {
        return Some(Alias::Diff(request));
    }

    let title = state.title.as_str();
    let (first, rest) = match title.split_once(' ') {
        Some((first, rest)) => (first, rest.trim()),
        None => (title, ""),
    };
    match first.to_lowercase().as_str() {
        "random" if rest.is_empty() => return Some(Alias::Random { namespace: None }),
        "random" => {
            if let Some(id) = wiki.namespace_id(rest) {
                return Some(Alias::Random {
                    namespace: Some(id),
                });
            }
        }
        "overview" | "statistics" | "version" if rest.is_empty() => return Some(Alias::Overview),
        "diff" => {
            if let Some(request) = DiffRequest::from_args(rest) {
                return Some(Alias::Diff(request));
            }
        }
        "page" => {
            return Some(Alias::Page {
                title: rest.to_string(),
            });
        }
        "search" => {
            return Some(Alias::Search {
                terms: rest.to_string(),
            });
        }
        _ => {}
    }

    if !state.query.is_empty() || state.fragment.is_some() {
        return None;
    }
    let (namespace, name) = wiki.split_namespace(title);
    if namespace != NS_SPECIAL {
        return None;
    }
    let (name, subpage) = match name.split_once('/') {
        Some((name, subpage)) => (name, Some(subpage.trim())),
        None => (name, None),
    };
    match wiki.special_canonical(name).as_deref() {
        Some("Randompage") => Some(Alias::Random {
            namespace: subpage.and_then(|subpage| wiki.namespace_id(subpage)),
        }),
        Some("Statistics" | "Version") => Some(Alias::Overview),
        Some("Diff") => subpage
            .and_then(|subpage| DiffRequest::from_args(&subpage.replace('/', " ")))
            .map(Alias::Diff),
        _ => None,
    }
}
