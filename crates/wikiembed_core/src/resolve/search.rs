use std::collections::BTreeMap;

use crate::client::FetchError;
use crate::output::{Card, Reaction, RenderedOutput, spoiler_wrap};
use crate::text::{escape_formatting, format_number, markdown_link};
use crate::wiki::{SiteMeta, WikiReference};

use super::{Ctx, ResolutionState, site_author};

const RESULT_LIMIT: usize = 10;

/// Title of the best full-text hit for `title`, if any.
pub fn suggest(ctx: &Ctx<'_>, wiki: &WikiReference, title: &str) -> Result<Option<String>, FetchError> {
    let response = ctx.query(
        wiki,
        &[
            ("action", "query".to_string()),
            ("list", "search".to_string()),
            ("srsearch", title.to_string()),
            ("srlimit", "1".to_string()),
            ("srinfo", String::new()),
            ("srprop", String::new()),
        ],
    )?;
    Ok(response.query.search.into_iter().next().map(|hit| hit.title))
}

fn search_link(wiki: &WikiReference, terms: &str, state: &ResolutionState) -> String {
    let query = BTreeMap::from([
        ("search".to_string(), terms.to_string()),
        ("fulltext".to_string(), "1".to_string()),
    ]);
    let title = format!("{}:Search", wiki.namespace_name(crate::wiki::NS_SPECIAL));
    spoiler_wrap(&wiki.to_link(&title, &query, None), state.spoiler)
}

/// Hit list card for `terms`.
pub fn render(
    ctx: &Ctx<'_>,
    wiki: &WikiReference,
    meta: &SiteMeta,
    terms: &str,
    state: &ResolutionState,
) -> RenderedOutput {
    let link = search_link(wiki, terms, state);
    if terms.trim().is_empty() || state.no_preview || state.spoiler {
        return RenderedOutput::text(link);
    }

    let response = match ctx.query(
        wiki,
        &[
            ("action", "query".to_string()),
            ("list", "search".to_string()),
            ("srsearch", terms.to_string()),
            ("srlimit", RESULT_LIMIT.to_string()),
            ("srinfo", "totalhits".to_string()),
            ("srprop", String::new()),
        ],
    ) {
        Ok(response) => response,
        Err(error) => {
            tracing::warn!(terms = %terms, "search failed: {error}");
            return RenderedOutput::text(link);
        }
    };
    let hits = response.query.search;
    if hits.is_empty() {
        return RenderedOutput::text(link).marked(Reaction::Shrug);
    }

    let lines: Vec<String> = hits
        .iter()
        .map(|hit| {
            format!(
                "\u{2022} {}",
                markdown_link(&escape_formatting(&hit.title), &wiki.page_link(&hit.title))
            )
        })
        .collect();
    let total = response
        .query
        .searchinfo
        .map(|info| info.totalhits)
        .unwrap_or(hits.len() as u64);

    let mut card = Card::new(&format!("Search: {terms}"), link.clone());
    card.author = site_author(wiki, meta);
    card.description = Some(lines.join("\n"));
    card.footer = Some(format!("{} results", format_number(total, &meta.lang)));
    RenderedOutput::card(link, card)
}
