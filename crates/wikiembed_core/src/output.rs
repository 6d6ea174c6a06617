use serde::Serialize;

use crate::text::{char_len, limit_length};

pub const CONTENT_LIMIT: usize = 2_000;
pub const TITLE_LIMIT: usize = 256;
pub const DESCRIPTION_LIMIT: usize = 4_096;
pub const FIELD_NAME_LIMIT: usize = 256;
pub const FIELD_VALUE_LIMIT: usize = 1_024;
pub const FIELD_COUNT_LIMIT: usize = 25;
pub const FOOTER_LIMIT: usize = 2_048;
pub const CARD_TOTAL_LIMIT: usize = 6_000;

/// Placeholder for a field half that must not be empty.
pub const BLANK: &str = "\u{200b}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reaction {
    Success,
    NoWiki,
    Error,
    Warning,
    Shrug,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RenderedOutput {
    Reaction { reaction: Reaction },
    Message(Message),
    Cancelled,
}

impl RenderedOutput {
    pub fn reaction(reaction: Reaction) -> Self {
        Self::Reaction { reaction }
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self::Message(Message::text(content))
    }

    pub fn card(content: impl Into<String>, card: Card) -> Self {
        Self::Message(Message::with_card(content, card))
    }

    /// Attach a marker to a message, or replace a bare reaction.
    pub fn marked(self, reaction: Reaction) -> Self {
        match self {
            Self::Message(message) => Self::Message(Message {
                reaction: Some(reaction),
                ..message
            }),
            Self::Reaction { .. } => Self::Reaction { reaction },
            Self::Cancelled => Self::Cancelled,
        }
    }

    pub fn as_message(&self) -> Option<&Message> {
        match self {
            Self::Message(message) => Some(message),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card: Option<Card>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reaction: Option<Reaction>,
}

impl Message {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: limit_length(&content.into(), CONTENT_LIMIT),
            card: None,
            reaction: None,
        }
    }

    pub fn with_card(content: impl Into<String>, mut card: Card) -> Self {
        card.enforce_limits();
        Self {
            card: Some(card),
            ..Self::text(content)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Author {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Field {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            inline,
        }
    }

    /// A standalone bold heading occupying a full row.
    pub fn header(text: &str) -> Self {
        Self::new(BLANK, format!("**{text}**"), false)
    }

    fn serialized_len(&self) -> usize {
        char_len(&self.name) + char_len(&self.value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Card {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<Author>,
    pub title: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<Field>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
}

impl Card {
    pub fn new(title: &str, url: impl Into<String>) -> Self {
        Self {
            title: title.to_string(),
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn serialized_len(&self) -> usize {
        char_len(&self.title)
            + self.author.as_ref().map(|author| char_len(&author.name)).unwrap_or(0)
            + self.description.as_deref().map(char_len).unwrap_or(0)
            + self.footer.as_deref().map(char_len).unwrap_or(0)
            + self.fields.iter().map(Field::serialized_len).sum::<usize>()
    }

    /// Clamp every part to its platform limit, then shed trailing fields and
    /// finally description text until the whole card fits.
    pub fn enforce_limits(&mut self) {
        self.title = limit_length(&self.title, TITLE_LIMIT);
        if let Some(author) = &mut self.author {
            author.name = limit_length(&author.name, TITLE_LIMIT);
        }
        self.description = self
            .description
            .take()
            .map(|text| limit_length(&text, DESCRIPTION_LIMIT))
            .filter(|text| !text.is_empty());
        self.footer = self
            .footer
            .take()
            .map(|text| limit_length(&text, FOOTER_LIMIT))
            .filter(|text| !text.is_empty());
        self.fields.truncate(FIELD_COUNT_LIMIT);
        for field in &mut self.fields {
            field.name = limit_length(&field.name, FIELD_NAME_LIMIT);
            field.value = limit_length(&field.value, FIELD_VALUE_LIMIT);
        }
        self.fields
            .retain(|field| !field.name.is_empty() && !field.value.is_empty());

        while self.serialized_len() > CARD_TOTAL_LIMIT && !self.fields.is_empty() {
            self.fields.pop();
        }
        let overflow = self.serialized_len().saturating_sub(CARD_TOTAL_LIMIT);
        if overflow > 0
            && let Some(description) = self.description.take()
        {
            let keep = char_len(&description).saturating_sub(overflow);
            self.description = Some(limit_length(&description, keep)).filter(|text| !text.is_empty());
        }
    }
}

/// Wrap a link so the chat surface hides it behind a spoiler.
pub fn spoiler_wrap(text: &str, spoiler: bool) -> String {
    if spoiler {
        format!("||{text}||")
    } else {
        text.to_string()
    }
}
