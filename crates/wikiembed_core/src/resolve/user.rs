use std::net::IpAddr;
use std::thread;

use crate::api::{BlockItem, ContributionItem, PageItem, UserItem};
use crate::client::FetchError;
use crate::output::{Card, Field, Reaction, RenderedOutput, spoiler_wrap};
use crate::text::{escape_formatting, format_number, format_timestamp, markdown_link};
use crate::wiki::{SiteMeta, WikiReference};

use super::{Ctx, ResolutionState, bounded, joined, site_author};

const IMPLICIT_GROUPS: [&str; 3] = ["*", "user", "autoconfirmed"];

pub fn is_ip(name: &str) -> bool {
    name.trim().parse::<IpAddr>().is_ok()
}

/// `address/prefix` in CIDR notation.
pub fn is_ip_range(name: &str) -> bool {
    let Some((address, prefix)) = name.trim().split_once('/') else {
        return false;
    };
    let Ok(address) = address.parse::<IpAddr>() else {
        return false;
    };
    let max = if address.is_ipv4() { 32 } else { 128 };
    prefix.parse::<u8>().is_ok_and(|prefix| prefix <= max)
}

enum Account {
    Registered(UserItem),
    Anonymous(Option<BlockItem>),
}

fn account(ctx: &Ctx<'_>, wiki: &WikiReference, name: &str, anonymous: bool) -> Result<Account, FetchError> {
    if anonymous {
        let response = ctx.query(
            wiki,
            &[
                ("action", "query".to_string()),
                ("list", "blocks".to_string()),
                ("bkip", name.to_string()),
                ("bklimit", "1".to_string()),
                ("bkprop", "id|user|by|timestamp|expiry|reason".to_string()),
            ],
        )?;
        return Ok(Account::Anonymous(response.query.blocks.into_iter().next()));
    }
    let response = ctx.query(
        wiki,
        &[
            ("action", "query".to_string()),
            ("list", "users".to_string()),
            ("ususers", name.to_string()),
            ("usprop", "editcount|groups|registration|gender|blockinfo".to_string()),
        ],
    )?;
    Ok(Account::Registered(
        response.query.users.into_iter().next().unwrap_or_default(),
    ))
}

fn last_contribution(
    ctx: &Ctx<'_>,
    wiki: &WikiReference,
    name: &str,
) -> Result<Option<ContributionItem>, FetchError> {
    if ctx.cancel.is_cancelled() {
        return Ok(None);
    }
    let target = if is_ip_range(name) {
        ("uciprange", name.to_string())
    } else {
        ("ucuser", name.to_string())
    };
    let response = ctx.query(
        wiki,
        &[
            ("action", "query".to_string()),
            ("list", "usercontribs".to_string()),
            target,
            ("uclimit", "1".to_string()),
            ("ucprop", "ids|title|timestamp".to_string()),
        ],
    )?;
    Ok(response.query.usercontribs.into_iter().next())
}

fn block_text(by: &str, expiry: &str, reason: &str) -> String {
    let expiry = if expiry.is_empty() || expiry == "infinity" || expiry == "infinite" {
        "indefinitely".to_string()
    } else {
        format!("until {}", format_timestamp(expiry))
    };
    let mut text = format!("by {} {expiry}", escape_formatting(by));
    if !reason.trim().is_empty() {
        text.push_str(": ");
        text.push_str(&escape_formatting(reason.trim()));
    }
    text
}

/// Profile card for a user, user talk or profile page. The account (or IP
/// block) lookup and the latest-contribution lookup run concurrently.
pub fn render(
    ctx: &Ctx<'_>,
    wiki: &WikiReference,
    meta: &SiteMeta,
    page: &PageItem,
    state: &ResolutionState,
) -> RenderedOutput {
    let (_, rest) = wiki.split_namespace(&page.title);
    let name = if is_ip_range(rest) {
        rest
    } else {
        rest.split('/').next().unwrap_or(rest)
    };
    let link = wiki.to_link(&page.title, &state.query, state.fragment.as_deref());
    if state.no_preview || state.spoiler {
        return RenderedOutput::text(spoiler_wrap(&link, state.spoiler));
    }
    if ctx.cancel.is_cancelled() {
        return RenderedOutput::Cancelled;
    }

    let anonymous = is_ip(name) || is_ip_range(name);
    let (account, contribution) = thread::scope(|scope| {
        let contribution = scope.spawn(|| last_contribution(ctx, wiki, name));
        let account = account(ctx, wiki, name, anonymous);
        (account, joined(contribution, "last contribution"))
    });
    if ctx.cancel.is_cancelled() {
        return RenderedOutput::Cancelled;
    }
    let account = match account {
        Ok(account) => account,
        Err(error) => {
            tracing::warn!(user = %name, "user lookup failed: {error}");
            return RenderedOutput::text(link);
        }
    };
    if let Account::Registered(user) = &account
        && (user.missing || user.invalid)
        && page.missing
    {
        return RenderedOutput::text(link).marked(Reaction::Shrug);
    }

    let lang = meta.lang.as_str();
    let mut card = Card::new(name, link.clone());
    card.author = site_author(wiki, meta);
    card.description = bounded(
        page.extract.as_deref().map(escape_formatting).as_deref(),
        ctx.budget.desc_length,
    );

    match &account {
        Account::Registered(user) => {
            if let Some(count) = user.editcount {
                card.fields.push(Field::new("Edit count", format_number(count, lang), true));
            }
            let groups: Vec<&str> = user
                .groups
                .iter()
                .map(String::as_str)
                .filter(|group| !IMPLICIT_GROUPS.contains(group))
                .collect();
            if !groups.is_empty() {
                card.fields.push(Field::new("Groups", groups.join(", "), true));
            }
            if let Some(registration) = user.registration.as_deref() {
                card.fields
                    .push(Field::new("Registered", format_timestamp(registration), true));
            }
            if let Some(gender) = user.gender.as_deref().filter(|gender| *gender != "unknown") {
                card.fields.push(Field::new("Gender", gender, true));
            }
            if user.blockid.is_some() {
                card.fields.push(Field::new(
                    "Blocked",
                    block_text(
                        user.blockedby.as_deref().unwrap_or_default(),
                        user.blockexpiry.as_deref().unwrap_or_default(),
                        user.blockreason.as_deref().unwrap_or_default(),
                    ),
                    false,
                ));
            }
        }
        Account::Anonymous(Some(block)) => {
            card.fields.push(Field::new(
                "Blocked",
                block_text(&block.by, &block.expiry, &block.reason),
                false,
            ));
        }
        Account::Anonymous(None) => {}
    }

    if let Some(contribution) = contribution {
        let value = format!(
            "{} ({})",
            markdown_link(
                &escape_formatting(&contribution.title),
                &wiki.page_link(&contribution.title)
            ),
            format_timestamp(&contribution.timestamp),
        );
        card.fields.push(Field::new("Last edit", value, false));
    }
    RenderedOutput::card(link, card)
}
