use std::thread;

use crate::api::Revision;
use crate::client::FetchError;
use crate::output::{Card, Field, RenderedOutput, spoiler_wrap};
use crate::text::{escape_formatting, format_number, format_timestamp, markdown_link};
use crate::wiki::{NS_USER, SiteMeta, WikiReference};

use super::{Ctx, ResolutionState, SITEINFO_PROPS, bounded, fetch_failure, joined, site_author};

/// Oldest revision of `title`, whose author is taken as the wiki's founder.
fn first_revision(ctx: &Ctx<'_>, wiki: &WikiReference, title: &str) -> Result<Option<Revision>, FetchError> {
    if ctx.cancel.is_cancelled() {
        return Ok(None);
    }
    let response = ctx.query(
        wiki,
        &[
            ("action", "query".to_string()),
            ("prop", "revisions".to_string()),
            ("titles", title.to_string()),
            ("rvdir", "newer".to_string()),
            ("rvlimit", "1".to_string()),
            ("rvprop", "user|timestamp".to_string()),
        ],
    )?;
    Ok(response
        .query
        .pages
        .into_iter()
        .next()
        .and_then(|page| page.revisions.into_iter().next()))
}

fn site_description(ctx: &Ctx<'_>, wiki: &WikiReference, lang: &str) -> Result<Option<String>, FetchError> {
    if ctx.cancel.is_cancelled() {
        return Ok(None);
    }
    let response = ctx.query(
        wiki,
        &[
            ("action", "query".to_string()),
            ("meta", "allmessages".to_string()),
            ("ammessages", "description".to_string()),
            ("amenableparser", "1".to_string()),
            ("amlang", lang.to_string()),
        ],
    )?;
    Ok(response.query.message("description").map(str::to_string))
}

/// Statistics card for the whole wiki. Founder and description lookups run
/// concurrently; either failing only drops its part.
pub fn render(ctx: &Ctx<'_>, wiki: &WikiReference, state: &ResolutionState) -> RenderedOutput {
    let response = match ctx.query(
        wiki,
        &[
            ("action", "query".to_string()),
            ("meta", "siteinfo".to_string()),
            ("siprop", format!("{SITEINFO_PROPS}|statistics|rightsinfo")),
        ],
    ) {
        Ok(response) => response,
        Err(error) => return fetch_failure(&error, state),
    };
    let wiki = ctx.refresh(wiki, &response.query);
    let meta = SiteMeta::from_query(&response.query, &wiki).unwrap_or_default();
    let main_page = if meta.main_page.is_empty() {
        wiki.main_page.clone().unwrap_or_default()
    } else {
        meta.main_page.clone()
    };
    let link = spoiler_wrap(&wiki.page_link(&main_page), state.spoiler);
    if state.no_preview || state.spoiler {
        return RenderedOutput::text(link);
    }

    let (founder, description) = thread::scope(|scope| {
        let founder = scope.spawn(|| first_revision(ctx, &wiki, &main_page));
        let description = scope.spawn(|| site_description(ctx, &wiki, &meta.lang));
        (
            joined(founder, "founder lookup"),
            joined(description, "site description"),
        )
    });
    if ctx.cancel.is_cancelled() {
        return RenderedOutput::Cancelled;
    }

    let title = if meta.sitename.is_empty() { wiki.host() } else { meta.sitename.as_str() };
    let mut card = Card::new(title, link.clone());
    card.author = site_author(&wiki, &meta);
    card.thumbnail = meta.logo.clone();
    card.description = bounded(
        description
            .or_else(|| meta.description.clone())
            .map(|text| escape_formatting(&text))
            .as_deref(),
        ctx.budget.desc_length,
    );

    let lang = meta.lang.as_str();
    if let Some(statistics) = &response.query.statistics {
        for (name, value) in [
            ("Articles", statistics.articles),
            ("Pages", statistics.pages),
            ("Edits", statistics.edits),
            ("Files", statistics.images),
            ("Users", statistics.users),
            ("Active users", statistics.activeusers),
            ("Administrators", statistics.admins),
        ] {
            card.fields.push(Field::new(name, format_number(value, lang), true));
        }
    }
    if let Some(revision) = founder {
        if let Some(user) = revision.user.as_deref().filter(|_| !revision.userhidden) {
            let page = format!("{}:{user}", wiki.namespace_name(NS_USER));
            card.fields.push(Field::new(
                "Founder",
                markdown_link(&escape_formatting(user), &wiki.page_link(&page)),
                true,
            ));
        }
        if !revision.timestamp.is_empty() {
            card.fields
                .push(Field::new("Created", format_timestamp(&revision.timestamp), true));
        }
    }
    if let Some(rights) = response
        .query
        .rightsinfo
        .as_ref()
        .filter(|rights| !rights.text.is_empty())
    {
        let value = if rights.url.is_empty() {
            escape_formatting(&rights.text)
        } else {
            markdown_link(&escape_formatting(&rights.text), &wiki.absolute_url(&rights.url))
        };
        card.fields.push(Field::new("License", value, true));
    }
    card.footer = Some(meta.generator.clone()).filter(|generator| !generator.is_empty());
    RenderedOutput::card(link, card)
}
