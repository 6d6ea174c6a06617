use std::collections::BTreeMap;
use std::sync::Arc;

use crate::api::{PageItem, QueryPayload};
use crate::excerpt::{self, KnownFacts, strip_html};
use crate::output::{Card, Field, Reaction, RenderedOutput, spoiler_wrap};
use crate::special::SpecialPageDispatcher;
use crate::text::{BestEffort, escape_formatting, format_number, partial_decode};
use crate::wiki::{
    NS_CATEGORY, NS_FILE, NS_HELP, NS_MESSAGE_WALL, NS_SPECIAL, NS_USER, NS_USER_PROFILE,
    NS_USER_TALK, SiteMeta, WikiReference,
};

use super::{
    Ctx, ResolutionState, SITEINFO_PROPS, Step, bounded, fetch_failure, search, site_author, user,
};

const USER_NAMESPACES: [i32; 4] = [NS_USER, NS_USER_TALK, NS_USER_PROFILE, NS_MESSAGE_WALL];

/// What the combined metadata query asks about.
#[derive(Debug, Clone, Copy)]
pub(super) enum Target<'t> {
    Title(&'t str),
    /// One random page from the `|`-joined namespace ids.
    Random(&'t str),
}

pub(super) fn page_params(target: Target<'_>, no_redirect: bool) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("action", "query".to_string()),
        ("meta", "siteinfo|allmessages".to_string()),
        ("siprop", SITEINFO_PROPS.to_string()),
        ("ammessages", "description".to_string()),
        ("amenableparser", "1".to_string()),
        ("prop", "info|pageprops|pageimages|extracts|categoryinfo".to_string()),
        (
            "ppprop",
            "description|displaytitle|page_image_free|wikibase-shortdesc|disambiguation".to_string(),
        ),
        ("piprop", "original".to_string()),
        ("exintro", "1".to_string()),
        ("explaintext", "1".to_string()),
        ("exsentences", "10".to_string()),
        ("iwurl", "1".to_string()),
        ("converttitles", "1".to_string()),
    ];
    if !no_redirect {
        params.push(("redirects", "1".to_string()));
    }
    match target {
        Target::Title(title) => params.push(("titles", title.to_string())),
        Target::Random(namespaces) => {
            params.push(("generator", "random".to_string()));
            params.push(("grnnamespace", namespaces.to_string()));
            params.push(("grnlimit", "1".to_string()));
        }
    }
    params
}

/// The generic path: one combined query, then branch on what came back.
pub(super) fn generic(
    ctx: &Ctx<'_>,
    wiki: &Arc<WikiReference>,
    mut state: ResolutionState,
    search_terms: Option<String>,
) -> Step {
    if state.title.is_empty()
        && let Some(main_page) = wiki.main_page.as_deref()
        && search_terms.is_none()
    {
        state.title = main_page.to_string();
    }
    let lookup = if search_terms.is_some() { "" } else { state.title.as_str() };
    let response = match ctx.query(wiki, &page_params(Target::Title(lookup), state.no_redirect)) {
        Ok(response) => response,
        Err(error) => return Step::Done(fetch_failure(&error, &state)),
    };
    let payload = &response.query;
    let wiki = ctx.refresh(wiki, payload);
    let meta = SiteMeta::from_query(payload, &wiki).unwrap_or_default();

    if let Some(terms) = search_terms {
        return Step::Done(search::render(ctx, &wiki, &meta, &terms, &state));
    }

    if !state.commands_applied
        && let Some(commands) = ctx.services.command_set(&wiki)
        && let Some((rewritten, hint)) = commands.rewrite(&state.title)
    {
        tracing::debug!(set = %commands.name, title = %rewritten, "command set rewrite");
        state.commands_applied = true;
        state.command_hint.push(hint);
        return Step::Redispatch {
            text: rewritten,
            state,
        };
    }

    let page = payload.pages.first();
    if let Some(page) = page {
        let (_, rest) = wiki.split_namespace(&page.title);
        if USER_NAMESPACES.contains(&page.ns) && (!rest.contains('/') || user::is_ip_range(rest)) {
            return Step::Done(user::render(ctx, &wiki, &meta, page, &state));
        }
        if page.ns == NS_SPECIAL
            && let Some(name) = contributions_target(&wiki, &page.title)
        {
            return Step::Redispatch {
                text: format!("{}:{name}", wiki.namespace_name(NS_USER)),
                state,
            };
        }
    }

    if let Some(step) = indirection(ctx, &wiki, payload, &state) {
        return step;
    }

    if let Some(page) = page {
        if page.invalid {
            return Step::Done(
                RenderedOutput::text(state.link_on(&wiki, &page.title)).marked(Reaction::Shrug),
            );
        }
        if page.missing && !page.known {
            return missing(ctx, &wiki, page, state);
        }
    }

    if let Some(interwiki) = payload.interwiki.first() {
        return interwiki_step(ctx, &wiki, interwiki.url.as_deref(), &interwiki.title, state);
    }

    let Some(page) = page else {
        if state.title.is_empty() && !meta.main_page.is_empty() {
            return Step::Redispatch {
                text: meta.main_page.clone(),
                state,
            };
        }
        return Step::Done(RenderedOutput::text(state.link_on(&wiki, &state.title)));
    };

    if state.no_preview || state.spoiler {
        return Step::Done(RenderedOutput::text(state.link_on(&wiki, &page.title)));
    }
    Step::Done(match page.ns {
        NS_SPECIAL => {
            let (canonical, _) = crate::special::special_parts(&wiki, &page.title);
            SpecialPageDispatcher::new(ctx).render(page, &canonical, &meta, &wiki, &state)
        }
        NS_FILE => file_card(&wiki, &meta, page, &state),
        _ => render_page(ctx, &wiki, &meta, page, payload, &state),
    })
}

/// `Special:Contributions/<name>` for a bare user name.
fn contributions_target(wiki: &WikiReference, title: &str) -> Option<String> {
    let (canonical, subpage) = crate::special::special_parts(wiki, title);
    let name = subpage?;
    (canonical == "Contributions" && !name.is_empty() && !name.contains('/')).then_some(name)
}

fn indirection(
    ctx: &Ctx<'_>,
    wiki: &WikiReference,
    payload: &QueryPayload,
    state: &ResolutionState,
) -> Option<Step> {
    let services = ctx.services;
    let candidates = payload
        .interwiki
        .iter()
        .map(|interwiki| interwiki.title.as_str())
        .chain(payload.pages.iter().map(|page| page.title.as_str()))
        .chain(std::iter::once(state.title.as_str()));
    for candidate in candidates {
        if let Some((target, title)) = services.farms.indirection(wiki, candidate, &services.directory) {
            let link = target.to_link(&title, &BTreeMap::new(), state.fragment.as_deref());
            let fragment = state.fragment.clone();
            return Some(Step::hop(
                target,
                title,
                state.clone(),
                BTreeMap::new(),
                fragment,
                link,
            ));
        }
    }
    None
}

fn missing(ctx: &Ctx<'_>, wiki: &WikiReference, page: &PageItem, mut state: ResolutionState) -> Step {
    if !state.suggested
        && let Some(hit) = search::suggest(ctx, wiki, &page.title).best_effort("search suggestion").flatten()
        && hit != page.title
    {
        tracing::debug!(missing = %page.title, suggestion = %hit, "using search suggestion");
        state.suggested = true;
        return Step::Redispatch { text: hit, state };
    }

    if !state.probed {
        let services = ctx.services;
        let (_, rest) = wiki.split_namespace(&page.title);
        let probe = match page.ns {
            NS_FILE => services
                .farms
                .shared_repo(wiki, &services.directory)
                .map(|repo| (repo, format!("File:{rest}"))),
            NS_HELP => services
                .farms
                .help_hub(wiki, &services.directory)
                .map(|hub| (hub, format!("Help:{rest}"))),
            _ => None,
        };
        if let Some((target, title)) = probe {
            let link = wiki.to_link(&page.title, &state.query, state.fragment.as_deref());
            let query = state.query.clone();
            let fragment = state.fragment.clone();
            state.probed = true;
            return Step::hop(target, title, state, query, fragment, link);
        }
    }

    Step::Done(RenderedOutput::text(state.link_on(wiki, &page.title)).marked(Reaction::Shrug))
}

fn interwiki_step(
    ctx: &Ctx<'_>,
    wiki: &WikiReference,
    url: Option<&str>,
    title: &str,
    state: ResolutionState,
) -> Step {
    let Some(url) = url else {
        return Step::Done(RenderedOutput::text(state.link_on(wiki, title)));
    };
    let url = wiki.absolute_url(url);
    let services = ctx.services;
    if let Some(classified) = services.farms.classify(&url, &services.directory) {
        let query = classified
            .query
            .iter()
            .map(|(key, value)| (partial_decode(key), partial_decode(value)))
            .collect();
        let fragment = classified.fragment.clone().or_else(|| state.fragment.clone());
        return Step::hop(classified.wiki, classified.title, state, query, fragment, url);
    }

    let mut link = url;
    if let Some(fragment) = state.fragment.as_deref()
        && !link.contains('#')
    {
        link.push('#');
        link.push_str(&crate::wiki::encode_fragment(fragment));
    }
    let output = RenderedOutput::text(spoiler_wrap(&link, state.spoiler));
    Step::Done(if state.hops >= ctx.max_hops {
        output.marked(Reaction::Warning)
    } else {
        output
    })
}

fn display_title(page: &PageItem) -> String {
    page.pageprops
        .displaytitle
        .as_deref()
        .map(strip_html)
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| page.title.clone())
}

/// Equal up to letter case and `_` for space.
fn same_title(left: &str, right: &str) -> bool {
    let fold = |title: &str| title.trim().replace('_', " ").to_lowercase();
    fold(left) == fold(right)
}

fn base_card(wiki: &WikiReference, meta: &SiteMeta, page: &PageItem, link: &str) -> Card {
    let mut card = Card::new(&display_title(page), link);
    card.author = site_author(wiki, meta);
    card
}

fn file_card(
    wiki: &WikiReference,
    meta: &SiteMeta,
    page: &PageItem,
    state: &ResolutionState,
) -> RenderedOutput {
    let link = wiki.to_link(&page.title, &state.query, state.fragment.as_deref());
    let mut card = base_card(wiki, meta, page, &link);
    card.image = page
        .original
        .as_ref()
        .map(|original| wiki.absolute_url(&original.source));
    RenderedOutput::card(link, card)
}

fn category_summary(page: &PageItem, lang: &str) -> Option<Field> {
    let info = page.categoryinfo.as_ref()?;
    let value = format!(
        "{} pages \u{b7} {} subcategories \u{b7} {} files",
        format_number(info.pages, lang),
        format_number(info.subcats, lang),
        format_number(info.files, lang),
    );
    Some(Field::new("Category", value, false))
}

/// Card for an ordinary content page: metadata first, then the parsed
/// excerpt, falling back to the metadata description when parsing fails.
pub(super) fn render_page(
    ctx: &Ctx<'_>,
    wiki: &WikiReference,
    meta: &SiteMeta,
    page: &PageItem,
    payload: &QueryPayload,
    state: &ResolutionState,
) -> RenderedOutput {
    let fragment = state.fragment.clone().or_else(|| {
        payload
            .redirects
            .iter()
            .find(|redirect| redirect.to == page.title)
            .and_then(|redirect| redirect.tofragment.clone())
    });
    let link = wiki.to_link(&page.title, &state.query, fragment.as_deref());
    let mut card = base_card(wiki, meta, page, &link);
    if page.ns == NS_CATEGORY
        && let Some(field) = category_summary(page, &meta.lang)
    {
        card.fields.push(field);
    }

    let light = page
        .extract
        .as_deref()
        .or(page.pageprops.description.as_deref())
        .or(page.pageprops.shortdesc.as_deref())
        .map(escape_formatting);
    let page_image = page
        .original
        .as_ref()
        .map(|original| wiki.absolute_url(&original.source));
    let known = KnownFacts {
        server: wiki.server.clone(),
        page_image: page_image.clone(),
        site_logo: meta.logo.clone(),
    };

    if ctx.cancel.is_cancelled() {
        return RenderedOutput::Cancelled;
    }
    let budget = ctx.budget;
    match ctx.parse(wiki, &parse_params(page, state)) {
        Ok(parsed) => {
            let excerpt = excerpt::extract(&parsed.parse.text, &known, &budget, fragment.as_deref());
            let description_limit = if excerpt.section.is_some() {
                budget.section_desc_length
            } else {
                budget.desc_length
            };
            if let Some(section) = excerpt.section {
                card.fields.insert(0, Field::new(section.title, section.body, false));
            }
            card.description = excerpt
                .description
                .or_else(|| bounded(light.as_deref(), description_limit));
            card.fields.extend(excerpt.fields);
            card.thumbnail = excerpt.thumbnail;
            if card.thumbnail.is_some() {
                card.image = excerpt.extra_images.into_iter().next();
            }
            // The infobox heading carries the stylized name when no override exists.
            if page.pageprops.displaytitle.is_none()
                && let Some(title) = excerpt.title.filter(|title| same_title(title, &page.title))
            {
                card.title = title;
            }
        }
        Err(error) => {
            tracing::warn!(title = %page.title, "content fetch failed, using page metadata: {error}");
            card.description = bounded(light.as_deref(), budget.desc_length);
            card.thumbnail = page_image.or_else(|| meta.logo.clone());
        }
    }
    if !state.command_hint.is_empty() {
        card.footer = Some(state.command_hint.join(" \u{2192} "));
    }

    let content = if state.suggested {
        format!("Suggested: {link}")
    } else {
        link
    };
    RenderedOutput::card(content, card)
}

fn parse_params(page: &PageItem, state: &ResolutionState) -> Vec<(&'static str, String)> {
    let mut params = vec![("action", "parse".to_string())];
    match state
        .query
        .get("oldid")
        .filter(|oldid| oldid.trim().parse::<u64>().is_ok())
    {
        Some(oldid) => params.push(("oldid", oldid.trim().to_string())),
        None => params.push(("page", page.title.clone())),
    }
    params.extend([
        ("prop", "text|images|displaytitle".to_string()),
        ("disableeditsection", "1".to_string()),
        ("disabletoc", "1".to_string()),
        ("disablelimitreport", "1".to_string()),
        ("redirects", "1".to_string()),
    ]);
    params
}
