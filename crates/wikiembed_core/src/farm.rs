use anyhow::{Context, Result};
use regex::Regex;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::snapshot::SiteDirectory;
use crate::wiki::WikiReference;

/// Declarative description of a wiki farm; built-ins use the same shape as config.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct FarmSpec {
    pub name: String,
    /// Host regex; an optional `sub` group names the member wiki.
    pub host: String,
    #[serde(default = "default_script_path")]
    pub script_path: String,
    /// Member wikis may sit below a `/<lang>/` path prefix.
    #[serde(default)]
    pub lang_prefix: bool,
    /// Relative to the script path unless it starts with `/`.
    #[serde(default = "default_article_path")]
    pub article_path: String,
    #[serde(default)]
    pub central_auth: bool,
    /// Title regex with `sub`, optional `lang`, and `title` groups.
    pub indirection: Option<String>,
    /// Member base URL template using `$sub` and `$lang`.
    pub member_url: Option<String>,
    /// Shared file repository consulted for missing files.
    pub shared_repo: Option<String>,
    /// Community help hub consulted for missing help pages.
    pub help_hub: Option<String>,
}

fn default_script_path() -> String {
    "/w/".to_string()
}

fn default_article_path() -> String {
    "/wiki/$1".to_string()
}

fn builtin_specs() -> Vec<FarmSpec> {
    vec![
        FarmSpec {
            name: "fandom".to_string(),
            host: r"^(?P<sub>[a-z0-9-]+)\.(?:fandom\.com|wikia\.org)$".to_string(),
            script_path: "/".to_string(),
            lang_prefix: true,
            article_path: "wiki/$1".to_string(),
            central_auth: false,
            indirection: Some(
                r"^(?i)w:c:(?:(?P<lang>[a-z]{2,3}(?:-[a-z]+)?)\.)?(?P<sub>[a-z0-9-]+):(?P<title>.*)$"
                    .to_string(),
            ),
            member_url: Some("https://$sub.fandom.com/$lang".to_string()),
            shared_repo: None,
            help_hub: Some("https://community.fandom.com/".to_string()),
        },
        FarmSpec {
            name: "wikigg".to_string(),
            host: r"^(?P<sub>[a-z0-9-]+)\.wiki\.gg$".to_string(),
            script_path: "/".to_string(),
            lang_prefix: true,
            article_path: "wiki/$1".to_string(),
            central_auth: false,
            indirection: None,
            member_url: Some("https://$sub.wiki.gg/$lang".to_string()),
            shared_repo: None,
            help_hub: None,
        },
        FarmSpec {
            name: "miraheze".to_string(),
            host: r"^(?P<sub>[a-z0-9]+)\.miraheze\.org$".to_string(),
            script_path: "/w/".to_string(),
            lang_prefix: false,
            article_path: "/wiki/$1".to_string(),
            central_auth: true,
            indirection: Some(r"^(?i)mh:(?P<sub>[a-z0-9]+):(?P<title>.*)$".to_string()),
            member_url: Some("https://$sub.miraheze.org/w/".to_string()),
            shared_repo: None,
            help_hub: Some("https://meta.miraheze.org/w/".to_string()),
        },
        FarmSpec {
            name: "wikimedia".to_string(),
            host: concat!(
                r"^(?:(?P<sub>[a-z0-9-]+)\.(?:wikipedia|wiktionary|wikibooks|wikiquote|",
                r"wikisource|wikinews|wikiversity|wikivoyage|wikimedia)\.org|",
                r"www\.(?:mediawiki|wikidata)\.org)$"
            )
            .to_string(),
            script_path: "/w/".to_string(),
            lang_prefix: false,
            article_path: "/wiki/$1".to_string(),
            central_auth: true,
            indirection: None,
            member_url: None,
            shared_repo: Some("https://commons.wikimedia.org/w/".to_string()),
            help_hub: None,
        },
    ]
}

#[derive(Debug, Clone)]
struct FarmRule {
    spec: FarmSpec,
    host: Regex,
    indirection: Option<Regex>,
}

impl FarmRule {
    fn compile(spec: FarmSpec) -> Result<Self> {
        let host = Regex::new(&spec.host)
            .with_context(|| format!("invalid host pattern for farm {}", spec.name))?;
        let indirection = spec
            .indirection
            .as_deref()
            .map(Regex::new)
            .transpose()
            .with_context(|| format!("invalid indirection pattern for farm {}", spec.name))?;
        Ok(Self {
            spec,
            host,
            indirection,
        })
    }

    /// Reference for the member wiki at `host`, below an optional language prefix.
    fn member(&self, scheme: &str, host: &str, lang: Option<&str>) -> WikiReference {
        let script_path = match lang {
            Some(lang) if self.spec.lang_prefix => {
                format!("{}{lang}/", self.spec.script_path)
            }
            _ => self.spec.script_path.clone(),
        };
        let article_path = if self.spec.article_path.starts_with('/') {
            self.spec.article_path.clone()
        } else {
            format!("{script_path}{}", self.spec.article_path)
        };
        let mut wiki = WikiReference::new(format!("{scheme}://{host}"), script_path, article_path)
            .with_farm(&self.spec.name, self.spec.central_auth);
        if let Some(lang) = lang {
            wiki.lang = lang.to_string();
        }
        wiki
    }

    fn lang_segment<'a>(&self, path: &'a str) -> Option<&'a str> {
        if !self.spec.lang_prefix {
            return None;
        }
        let rest = path.strip_prefix(&self.spec.script_path)?;
        let (segment, _) = rest.split_once('/')?;
        is_lang_code(segment).then_some(segment)
    }
}

fn is_lang_code(segment: &str) -> bool {
    let (base, variant) = match segment.split_once('-') {
        Some((base, variant)) => (base, Some(variant)),
        None => (segment, None),
    };
    (2..=3).contains(&base.len())
        && base.bytes().all(|byte| byte.is_ascii_lowercase())
        && variant.is_none_or(|variant| {
            !variant.is_empty() && variant.bytes().all(|byte| byte.is_ascii_lowercase())
        })
}

/// A URL recognized as pointing at a page of a known wiki.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedUrl {
    pub wiki: WikiReference,
    /// Raw, still percent-encoded title.
    pub title: String,
    pub query: Vec<(String, String)>,
    pub fragment: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FarmRegistry {
    rules: Vec<FarmRule>,
}

impl FarmRegistry {
    pub fn builtin() -> Result<Self> {
        Self::with_extra(&[])
    }

    /// Built-in rules followed by configured ones.
    pub fn with_extra(extra: &[FarmSpec]) -> Result<Self> {
        let rules = builtin_specs()
            .into_iter()
            .chain(extra.iter().cloned())
            .map(FarmRule::compile)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    fn rule(&self, farm: &str) -> Option<&FarmRule> {
        self.rules.iter().find(|rule| rule.spec.name == farm)
    }

    /// Reference for the wiki serving `url`, from farm rules or the site directory.
    pub fn wiki_for_url(&self, url: &Url, directory: &SiteDirectory) -> Option<WikiReference> {
        let host = url.host_str()?.to_ascii_lowercase();
        if let Some(rule) = self.rules.iter().find(|rule| rule.host.is_match(&host)) {
            let lang = rule.lang_segment(url.path());
            return Some(rule.member(url.scheme(), &host, lang));
        }
        directory.lookup(&host)
    }

    pub fn wiki_for_base(&self, base_url: &str, directory: &SiteDirectory) -> Option<WikiReference> {
        let url = Url::parse(base_url).ok()?;
        self.wiki_for_url(&url, directory)
    }

    /// Classify an absolute URL as a page on a known wiki.
    pub fn classify(&self, raw: &str, directory: &SiteDirectory) -> Option<ClassifiedUrl> {
        let url = Url::parse(raw.trim()).ok()?;
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }
        let wiki = self.wiki_for_url(&url, directory)?;
        let query: Vec<(String, String)> = url
            .query()
            .map(|query| {
                query
                    .split('&')
                    .filter(|pair| !pair.is_empty())
                    .map(|pair| match pair.split_once('=') {
                        Some((key, value)) => (key.to_string(), value.to_string()),
                        None => (pair.to_string(), String::new()),
                    })
                    .collect()
            })
            .unwrap_or_default();
        let title = wiki.title_from_path(url.path(), &query)?;
        let parameter = wiki.title_parameter();
        let query = query
            .into_iter()
            .filter(|(key, _)| *key != parameter)
            .collect();
        Some(ClassifiedUrl {
            wiki,
            title,
            query,
            fragment: url.fragment().map(str::to_string),
        })
    }

    /// Farm-wide indirection such as `w:c:community:Help`, resolved to the member wiki.
    pub fn indirection(
        &self,
        current: &WikiReference,
        title: &str,
        directory: &SiteDirectory,
    ) -> Option<(WikiReference, String)> {
        let rule = self.rule(current.farm.as_deref()?)?;
        let captures = rule.indirection.as_ref()?.captures(title)?;
        let sub = captures.name("sub")?.as_str().to_lowercase();
        let lang = captures
            .name("lang")
            .map(|lang| format!("{}/", lang.as_str().to_lowercase()))
            .unwrap_or_default();
        let target_title = captures.name("title").map(|title| title.as_str()).unwrap_or("");
        let base = rule
            .spec
            .member_url
            .as_deref()?
            .replace("$sub", &sub)
            .replace("$lang", &lang);
        let wiki = self.wiki_for_base(&base, directory)?;
        if wiki.key() == current.key() && target_title == title {
            return None;
        }
        Some((wiki, target_title.to_string()))
    }

    /// Wiki holding shared files for members of `current`'s farm.
    pub fn shared_repo(&self, current: &WikiReference, directory: &SiteDirectory) -> Option<WikiReference> {
        let rule = self.rule(current.farm.as_deref()?)?;
        let repo = self.wiki_for_base(rule.spec.shared_repo.as_deref()?, directory)?;
        (repo.key() != current.key()).then_some(repo)
    }

    /// Wiki hosting farm-wide help pages for members of `current`'s farm.
    pub fn help_hub(&self, current: &WikiReference, directory: &SiteDirectory) -> Option<WikiReference> {
        let rule = self.rule(current.farm.as_deref()?)?;
        let hub = self.wiki_for_base(rule.spec.help_hub.as_deref()?, directory)?;
        (hub.key() != current.key()).then_some(hub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> FarmRegistry {
        FarmRegistry::builtin().expect("builtin farms")
    }

    #[test]
    fn classify_fandom_urls_with_language_prefix() {
        let directory = SiteDirectory::default();
        let classified = registry()
            .classify("https://minecraft.fandom.com/de/wiki/Diamant#Vorkommen", &directory)
            .expect("classified");
        assert_eq!(classified.wiki.script_path, "/de/");
        assert_eq!(classified.wiki.article_path, "/de/wiki/$1");
        assert_eq!(classified.wiki.farm.as_deref(), Some("fandom"));
        assert_eq!(classified.wiki.lang, "de");
        assert_eq!(classified.title, "Diamant");
        assert_eq!(classified.fragment.as_deref(), Some("Vorkommen"));

        let root = registry()
            .classify("https://minecraft.fandom.com/wiki/Diamond", &directory)
            .expect("classified");
        assert_eq!(root.wiki.script_path, "/");
        assert_eq!(root.title, "Diamond");
    }

    #[test]
    fn classify_index_php_urls_keeps_other_parameters() {
        let directory = SiteDirectory::default();
        let classified = registry()
            .classify(
                "https://en.wikipedia.org/w/index.php?title=Rust_(programming_language)&oldid=5",
                &directory,
            )
            .expect("classified");
        assert_eq!(classified.wiki.key(), "en.wikipedia.org/w/");
        assert!(classified.wiki.central_auth);
        assert_eq!(classified.title, "Rust_(programming_language)");
        assert_eq!(classified.query, vec![("oldid".to_string(), "5".to_string())]);
    }

    #[test]
    fn classify_rejects_unknown_hosts_and_paths() {
        let directory = SiteDirectory::default();
        assert!(registry().classify("https://example.com/wiki/Foo", &directory).is_none());
        assert!(registry()
            .classify("https://en.wikipedia.org/static/images/logo.png", &directory)
            .is_none());
        assert!(registry().classify("not a url", &directory).is_none());
    }

    #[test]
    fn indirection_resolves_member_wikis() {
        let directory = SiteDirectory::default();
        let registry = registry();
        let current = registry
            .wiki_for_base("https://minecraft.fandom.com/", &directory)
            .expect("fandom wiki");
        let (target, title) = registry
            .indirection(&current, "w:c:de.community:Hilfe:Übersicht", &directory)
            .expect("indirection");
        assert_eq!(target.key(), "community.fandom.com/de/");
        assert_eq!(title, "Hilfe:Übersicht");

        let miraheze = registry
            .wiki_for_base("https://meta.miraheze.org/w/", &directory)
            .expect("miraheze wiki");
        let (target, title) = registry
            .indirection(&miraheze, "mh:allthetropes:Main Page", &directory)
            .expect("indirection");
        assert_eq!(target.key(), "allthetropes.miraheze.org/w/");
        assert_eq!(title, "Main Page");
        assert!(registry.indirection(&miraheze, "Plain title", &directory).is_none());
    }

    #[test]
    fn probes_point_at_shared_repositories_and_hubs() {
        let directory = SiteDirectory::default();
        let registry = registry();
        let wikipedia = registry
            .wiki_for_base("https://en.wikipedia.org/w/", &directory)
            .expect("wikipedia");
        let repo = registry.shared_repo(&wikipedia, &directory).expect("commons");
        assert_eq!(repo.key(), "commons.wikimedia.org/w/");
        assert!(registry.shared_repo(&repo, &directory).is_none());

        let fandom = registry
            .wiki_for_base("https://minecraft.fandom.com/", &directory)
            .expect("fandom");
        let hub = registry.help_hub(&fandom, &directory).expect("hub");
        assert_eq!(hub.key(), "community.fandom.com/");
    }

    #[test]
    fn configured_farms_extend_the_registry() {
        let directory = SiteDirectory::default();
        let registry = FarmRegistry::with_extra(&[FarmSpec {
            name: "example".to_string(),
            host: r"^(?P<sub>[a-z]+)\.example\.net$".to_string(),
            script_path: "/w/".to_string(),
            lang_prefix: false,
            article_path: "/view/$1".to_string(),
            central_auth: false,
            indirection: None,
            member_url: None,
            shared_repo: None,
            help_hub: None,
        }])
        .expect("registry");
        let classified = registry
            .classify("https://games.example.net/view/Start", &directory)
            .expect("classified");
        assert_eq!(classified.title, "Start");
        assert_eq!(classified.wiki.farm.as_deref(), Some("example"));
    }

    #[test]
    fn invalid_patterns_are_reported() {
        let error = FarmRegistry::with_extra(&[FarmSpec {
            name: "broken".to_string(),
            host: "(".to_string(),
            script_path: default_script_path(),
            lang_prefix: false,
            article_path: default_article_path(),
            central_auth: false,
            indirection: None,
            member_url: None,
            shared_repo: None,
            help_hub: None,
        }])
        .expect_err("must fail");
        assert!(error.to_string().contains("broken"));
    }
}
