use std::collections::BTreeMap;

use anyhow::{Context, Result};

use crate::config::{CommandSet, EmbedConfig};
use crate::farm::FarmRegistry;
use crate::snapshot::{SiteDirectory, WikiCache};
use crate::wiki::WikiReference;

/// Process-wide, read-mostly state shared by every resolution.
#[derive(Debug)]
pub struct Services {
    pub wikis: WikiCache,
    pub directory: SiteDirectory,
    pub farms: FarmRegistry,
    commands: BTreeMap<String, CommandSet>,
}

impl Services {
    pub fn from_config(config: &EmbedConfig) -> Result<Self> {
        let farms = FarmRegistry::with_extra(&config.farms).context("invalid farm rule")?;
        let directory = SiteDirectory::from_specs(&config.sites).context("invalid site entry")?;
        let mut commands = BTreeMap::new();
        for set in &config.commands {
            let wiki = match farms.wiki_for_base(&set.wiki, &directory) {
                Some(wiki) => wiki,
                None => WikiReference::from_base_url(&set.wiki)
                    .with_context(|| format!("invalid wiki for command set {}", set.name))?,
            };
            commands.insert(wiki.key(), set.clone());
        }
        Ok(Self {
            wikis: WikiCache::default(),
            directory,
            farms,
            commands,
        })
    }

    pub fn command_set(&self, wiki: &WikiReference) -> Option<&CommandSet> {
        self.commands.get(&wiki.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_sets_are_keyed_by_wiki() {
        let config: EmbedConfig = toml::from_str(
            r#"
[[commands]]
wiki = "https://minecraft.fandom.com/"
name = "mc"
aliases = { mob = "$1 (mob)" }
"#,
        )
        .expect("config");
        let services = Services::from_config(&config).expect("services");
        let wiki = WikiReference::from_base_url("https://minecraft.fandom.com/").expect("wiki");
        let set = services.command_set(&wiki).expect("command set");
        assert_eq!(set.rewrite("mob Zombie"), Some(("Zombie (mob)".to_string(), "mc mob".to_string())));

        let other = WikiReference::from_base_url("https://terraria.wiki.gg/").expect("wiki");
        assert!(services.command_set(&other).is_none());
    }

    #[test]
    fn invalid_sites_are_rejected() {
        let config: EmbedConfig =
            toml::from_str("[[sites]]\nname = \"bad\"\nurl = \"not a url\"\n").expect("config");
        assert!(Services::from_config(&config).is_err());
    }
}
