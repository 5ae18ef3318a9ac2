//! Localized, colour-coded player messages.
//!
//! Messages are grouped per language, then per category. Lookups fall back to
//! [`DEFAULT_LANGUAGE`] and finally to the label itself, so a missing
//! translation never hides a message completely.

use essentials_core::{ConfigurationUnit, ConstructionError, HostContext, Session, Unit, UnitError};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{info, warn};

const FILE_NAME: &str = "messages.toml";

pub const DEFAULT_LANGUAGE: &str = "en_EN";
pub const CHAT_CATEGORY: &str = "chat";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Language {
    /// Prepended to every chat message
    #[serde(default)]
    pub chat_prefix: String,
    /// Category to label to text
    #[serde(default)]
    pub messages: BTreeMap<String, BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageCatalog {
    pub languages: BTreeMap<String, Language>,
}

impl Default for MessageCatalog {
    fn default() -> Self {
        let chat = [
            ("motd", "&eWelcome to the server, &f{0}&e!"),
            ("reloaded", "&aConfiguration reloaded."),
            ("kicked", "&cYou were disconnected: {0}"),
        ]
        .into_iter()
        .map(|(label, text)| (label.to_string(), text.to_string()))
        .collect();

        let english = Language {
            chat_prefix: "&6[Essentials] &r".to_string(),
            messages: BTreeMap::from([(CHAT_CATEGORY.to_string(), chat)]),
        };

        Self {
            languages: BTreeMap::from([(DEFAULT_LANGUAGE.to_string(), english)]),
        }
    }
}

impl MessageCatalog {
    fn language(&self, lang: &str) -> Option<&Language> {
        self.languages.get(lang).or_else(|| {
            self.languages
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(lang))
                .map(|(_, language)| language)
        })
    }

    fn lookup(&self, label: &str, category: &str, lang: &str) -> Option<&str> {
        let find = |lang: &str| {
            self.language(lang)
                .and_then(|language| language.messages.get(category))
                .and_then(|messages| messages.get(label))
                .map(String::as_str)
        };
        find(lang).or_else(|| find(DEFAULT_LANGUAGE))
    }

    fn chat_prefix(&self, lang: &str) -> &str {
        self.language(lang)
            .or_else(|| self.language(DEFAULT_LANGUAGE))
            .map(|language| language.chat_prefix.as_str())
            .unwrap_or_default()
    }
}

pub struct MessagesConfiguration {
    path: PathBuf,
    catalog: RwLock<MessageCatalog>,
}

impl MessagesConfiguration {
    /// Message `label` of `category` in `lang`, colour codes translated.
    pub fn message(&self, label: &str, category: &str, lang: &str) -> String {
        let catalog = self.catalog.read();
        match catalog.lookup(label, category, lang) {
            Some(text) => colorize(text),
            None => {
                warn!("Missing message {}.{}", category, label);
                label.to_string()
            }
        }
    }

    pub fn chat_message(&self, label: &str, lang: &str) -> String {
        let prefix = colorize(self.catalog.read().chat_prefix(lang));
        format!("{}{}", prefix, self.message(label, CHAT_CATEGORY, lang))
    }

    /// Chat message with `{0}`, `{1}`, ... replaced by `args`.
    pub fn chat_message_format(&self, label: &str, lang: &str, args: &[&str]) -> String {
        format_args_into(&self.chat_message(label, lang), args)
    }

    /// Sends a chat message in the session's own language.
    pub fn send_chat_message(&self, session: &dyn Session, label: &str, args: &[&str]) {
        session.send_message(&self.chat_message_format(label, &session.locale(), args));
    }
}

impl Unit for MessagesConfiguration {
    const NAME: &'static str = "MessagesConfiguration";

    fn construct(context: HostContext) -> Result<Self, ConstructionError> {
        Ok(Self {
            path: context.data_directory()?.join(FILE_NAME),
            catalog: RwLock::new(MessageCatalog::default()),
        })
    }
}

impl ConfigurationUnit for MessagesConfiguration {
    fn load_file(&self) -> Result<(), UnitError> {
        let catalog: MessageCatalog = super::load_or_create(&self.path)?;
        if catalog.language(DEFAULT_LANGUAGE).is_none() {
            return Err(UnitError::invalid_data(format!(
                "{} has no {} section",
                self.path.display(),
                DEFAULT_LANGUAGE
            )));
        }

        info!("Loaded messages for {} languages", catalog.languages.len());
        *self.catalog.write() = catalog;
        Ok(())
    }
}

/// Translates `&` colour codes into section-sign codes.
pub fn colorize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match chars.peek() {
            Some(&code) if c == '&' && is_format_code(code) => out.push('§'),
            _ => out.push(c),
        }
    }
    out
}

fn is_format_code(c: char) -> bool {
    matches!(c.to_ascii_lowercase(), '0'..='9' | 'a'..='f' | 'k'..='o' | 'r')
}

fn format_args_into(template: &str, args: &[&str]) -> String {
    args.iter()
        .enumerate()
        .fold(template.to_string(), |text, (i, arg)| {
            text.replace(&format!("{{{}}}", i), arg)
        })
}
