use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Context, Result, bail};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use reqwest::Url;

use crate::api::{QueryPayload, SiteInfo};

pub const NS_SPECIAL: i32 = -1;
pub const NS_MAIN: i32 = 0;
pub const NS_USER: i32 = 2;
pub const NS_USER_TALK: i32 = 3;
pub const NS_FILE: i32 = 6;
pub const NS_HELP: i32 = 12;
pub const NS_CATEGORY: i32 = 14;
pub const NS_USER_PROFILE: i32 = 202;
pub const NS_MESSAGE_WALL: i32 = 1200;

const TITLE_ENCODE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b'<')
    .add(b'>')
    .add(b'=')
    .add(b'?')
    .add(b'[')
    .add(b']')
    .add(b'\\')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

const FRAGMENT_ENCODE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'[')
    .add(b']')
    .add(b'\\')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

const DEFAULT_NAMESPACES: &[(i32, &str)] = &[
    (-2, "Media"),
    (-1, "Special"),
    (0, ""),
    (1, "Talk"),
    (2, "User"),
    (3, "User talk"),
    (4, "Project"),
    (5, "Project talk"),
    (6, "File"),
    (7, "File talk"),
    (8, "MediaWiki"),
    (9, "MediaWiki talk"),
    (10, "Template"),
    (11, "Template talk"),
    (12, "Help"),
    (13, "Help talk"),
    (14, "Category"),
    (15, "Category talk"),
];

/// Special page names recognized before any siteinfo has been seen.
const DEFAULT_SPECIAL_ALIASES: &[(&str, &str)] = &[
    ("random", "Randompage"),
    ("randompage", "Randompage"),
    ("statistics", "Statistics"),
    ("version", "Version"),
    ("diff", "Diff"),
    ("search", "Search"),
    ("contributions", "Contributions"),
    ("contribs", "Contributions"),
    ("recentchanges", "Recentchanges"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    pub id: i32,
    pub name: String,
    pub canonical: Option<String>,
    pub aliases: Vec<String>,
}

impl Namespace {
    fn matches(&self, prefix: &str) -> bool {
        let wanted = fold(prefix);
        std::iter::once(&self.name)
            .chain(self.canonical.iter())
            .chain(self.aliases.iter())
            .any(|name| !name.is_empty() && fold(name) == wanted)
    }
}

/// Identity and URL layout of one wiki installation.
///
/// Values are never edited in place: a fresh siteinfo response produces a new
/// reference through [`WikiReference::with_site_info`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WikiReference {
    /// Scheme and host, e.g. `https://en.wikipedia.org`.
    pub server: String,
    /// Always ends with `/`.
    pub script_path: String,
    /// Absolute path containing `$1`.
    pub article_path: String,
    pub space_char: char,
    pub namespaces: BTreeMap<i32, Namespace>,
    pub content_namespaces: BTreeSet<i32>,
    pub special_aliases: BTreeMap<String, String>,
    pub farm: Option<String>,
    pub central_auth: bool,
    pub lang: String,
    pub main_page: Option<String>,
}

impl WikiReference {
    /// Build a reference from any URL below the wiki's script path.
    pub fn from_base_url(base_url: &str) -> Result<Self> {
        let url = Url::parse(base_url.trim())
            .with_context(|| format!("invalid wiki URL: {base_url}"))?;
        let Some(host) = url.host_str() else {
            bail!("wiki URL has no host: {base_url}");
        };
        let server = match url.port() {
            Some(port) => format!("{}://{host}:{port}", url.scheme()),
            None => format!("{}://{host}", url.scheme()),
        };
        let path = url.path();
        let path = path
            .strip_suffix("api.php")
            .or_else(|| path.strip_suffix("index.php"))
            .unwrap_or(path);
        let mut script_path = path.to_string();
        if !script_path.ends_with('/') {
            script_path.push('/');
        }
        let article_path = match script_path.strip_suffix("/w/") {
            Some(root) => format!("{root}/wiki/$1"),
            None => format!("{script_path}wiki/$1"),
        };
        Ok(Self::new(server, script_path, article_path))
    }

    pub fn new(server: String, script_path: String, article_path: String) -> Self {
        let namespaces = DEFAULT_NAMESPACES
            .iter()
            .map(|(id, name)| {
                let aliases = if *id == 6 {
                    vec!["Image".to_string()]
                } else {
                    Vec::new()
                };
                (
                    *id,
                    Namespace {
                        id: *id,
                        name: name.to_string(),
                        canonical: Some(name.to_string()),
                        aliases,
                    },
                )
            })
            .collect();
        Self {
            server,
            script_path,
            article_path,
            space_char: '_',
            namespaces,
            content_namespaces: BTreeSet::from([NS_MAIN]),
            special_aliases: BTreeMap::new(),
            farm: None,
            central_auth: false,
            lang: "en".to_string(),
            main_page: None,
        }
    }

    pub fn with_farm(mut self, farm: &str, central_auth: bool) -> Self {
        self.farm = Some(farm.to_string());
        self.central_auth = central_auth;
        self
    }

    /// Cache key: host plus script path.
    pub fn key(&self) -> String {
        let host = self
            .server
            .split_once("://")
            .map(|(_, host)| host)
            .unwrap_or(&self.server);
        format!("{}{}", host.to_ascii_lowercase(), self.script_path)
    }

    pub fn host(&self) -> &str {
        self.server
            .split_once("://")
            .map(|(_, host)| host)
            .unwrap_or(&self.server)
    }

    pub fn base_url(&self) -> String {
        format!("{}{}", self.server, self.script_path)
    }

    pub fn api_url(&self) -> String {
        format!("{}{}api.php", self.server, self.script_path)
    }

    /// A new reference carrying the layout reported by siteinfo.
    pub fn with_site_info(&self, info: &SiteInfo<'_>) -> WikiReference {
        let general = info.general;
        let mut next = self.clone();

        if !general.server.is_empty() {
            next.server = match general.server.strip_prefix("//") {
                Some(rest) => format!("https://{rest}"),
                None => general.server.clone(),
            };
        }
        next.script_path = format!("{}/", general.scriptpath.trim_end_matches('/'));
        if general.articlepath.contains("$1") {
            next.article_path = general.articlepath.clone();
        }
        if !general.lang.is_empty() {
            next.lang = general.lang.clone();
        }
        if !general.mainpage.is_empty() {
            next.main_page = Some(general.mainpage.clone());
        }
        if general.centralidlookupprovider.as_deref() == Some("CentralAuth") {
            next.central_auth = true;
        }

        if !info.namespaces.is_empty() {
            next.namespaces = info
                .namespaces
                .values()
                .map(|namespace| {
                    let aliases = info
                        .aliases
                        .iter()
                        .filter(|alias| alias.id == namespace.id)
                        .map(|alias| alias.alias.clone())
                        .collect();
                    (
                        namespace.id,
                        Namespace {
                            id: namespace.id,
                            name: namespace.name.clone(),
                            canonical: namespace.canonical.clone(),
                            aliases,
                        },
                    )
                })
                .collect();
            next.content_namespaces = info
                .namespaces
                .values()
                .filter(|namespace| namespace.content)
                .map(|namespace| namespace.id)
                .collect();
            if next.content_namespaces.is_empty() {
                next.content_namespaces.insert(NS_MAIN);
            }
        }

        if !info.special_aliases.is_empty() {
            next.special_aliases = info
                .special_aliases
                .iter()
                .flat_map(|entry| {
                    std::iter::once(&entry.realname)
                        .chain(entry.aliases.iter())
                        .map(|alias| (special_key(alias), entry.realname.clone()))
                })
                .collect();
        }
        next
    }

    /// Turn a protocol-relative or root-relative URL into an absolute one.
    pub fn absolute_url(&self, url: &str) -> String {
        if let Some(rest) = url.strip_prefix("//") {
            format!("https://{rest}")
        } else if url.starts_with('/') {
            format!("{}{url}", self.server)
        } else {
            url.to_string()
        }
    }

    pub fn to_link(
        &self,
        title: &str,
        query: &BTreeMap<String, String>,
        fragment: Option<&str>,
    ) -> String {
        let title = title.replace(' ', &self.space_char.to_string());
        let encoded = utf8_percent_encode(&title, TITLE_ENCODE).to_string();
        let mut link = if query.is_empty() {
            format!("{}{}", self.server, self.article_path.replace("$1", &encoded))
        } else {
            let mut link = format!("{}{}index.php?title={encoded}", self.server, self.script_path);
            for (key, value) in query {
                link.push('&');
                link.push_str(&utf8_percent_encode(key, TITLE_ENCODE).to_string());
                link.push('=');
                link.push_str(&utf8_percent_encode(value, TITLE_ENCODE).to_string());
            }
            link
        };
        if let Some(fragment) = fragment.filter(|fragment| !fragment.is_empty()) {
            link.push('#');
            link.push_str(&encode_fragment(fragment));
        }
        link
    }

    pub fn page_link(&self, title: &str) -> String {
        self.to_link(title, &BTreeMap::new(), None)
    }

    pub fn namespace_id(&self, prefix: &str) -> Option<i32> {
        self.namespaces
            .values()
            .find(|namespace| namespace.matches(prefix))
            .map(|namespace| namespace.id)
    }

    pub fn namespace_name(&self, id: i32) -> &str {
        self.namespaces
            .get(&id)
            .map(|namespace| namespace.name.as_str())
            .unwrap_or("")
    }

    /// Split `Prefix:Rest` when `Prefix` names a namespace of this wiki.
    pub fn split_namespace<'a>(&self, title: &'a str) -> (i32, &'a str) {
        if let Some((prefix, rest)) = title.split_once(':')
            && let Some(id) = self.namespace_id(prefix.trim())
        {
            return (id, rest.trim_start());
        }
        (NS_MAIN, title)
    }

    /// Canonical special page name for a localized name or alias.
    pub fn special_canonical(&self, name: &str) -> Option<String> {
        let key = special_key(name);
        if let Some(canonical) = self.special_aliases.get(&key) {
            return Some(canonical.clone());
        }
        DEFAULT_SPECIAL_ALIASES
            .iter()
            .find(|(alias, _)| *alias == key)
            .map(|(_, canonical)| canonical.to_string())
    }

    /// Query key whose article path template value contains `$1`.
    pub fn title_parameter(&self) -> String {
        self.article_path
            .split_once('?')
            .and_then(|(_, query)| {
                query
                    .split('&')
                    .filter_map(|pair| pair.split_once('='))
                    .find(|(_, value)| value.contains("$1"))
                    .map(|(key, _)| key.to_string())
            })
            .unwrap_or_else(|| "title".to_string())
    }

    /// Extract the raw, still-encoded title from a URL path on this wiki.
    pub fn title_from_path(&self, path: &str, query: &[(String, String)]) -> Option<String> {
        if let Some((prefix, suffix)) = self.article_path.split_once("$1")
            && !prefix.contains('?')
            && let Some(rest) = path.strip_prefix(prefix)
        {
            return Some(rest.strip_suffix(suffix).unwrap_or(rest).to_string());
        }
        let index = format!("{}index.php", self.script_path);
        if path == index || path == self.script_path || path == "/" {
            let parameter = self.title_parameter();
            return Some(
                query
                    .iter()
                    .find(|(key, _)| *key == parameter)
                    .map(|(_, value)| value.clone())
                    .unwrap_or_default(),
            );
        }
        None
    }
}

/// Per-response site details that are not part of the wiki's identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiteMeta {
    pub sitename: String,
    pub logo: Option<String>,
    pub lang: String,
    pub main_page: String,
    pub generator: String,
    pub description: Option<String>,
}

impl SiteMeta {
    pub fn from_query(payload: &QueryPayload, wiki: &WikiReference) -> Option<Self> {
        let general = payload.general.as_ref()?;
        Some(Self {
            sitename: general.sitename.clone(),
            logo: general
                .logo
                .as_deref()
                .filter(|logo| !logo.is_empty())
                .map(|logo| wiki.absolute_url(logo)),
            lang: general.lang.clone(),
            main_page: general.mainpage.clone(),
            generator: general.generator.clone(),
            description: payload.message("description").map(str::to_string),
        })
    }
}

pub fn encode_fragment(fragment: &str) -> String {
    utf8_percent_encode(&fragment.replace(' ', "_"), FRAGMENT_ENCODE).to_string()
}

fn fold(value: &str) -> String {
    value.replace('_', " ").trim().to_lowercase()
}

fn special_key(value: &str) -> String {
    value.trim().replace(' ', "_").to_lowercase()
}
