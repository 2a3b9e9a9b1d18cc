use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single card in the grid: a quote or an article teaser. Identity is by
/// `id` (the quote text itself for quotes, the feed id for articles).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayItem {
    pub id: String,
    pub primary_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
}

impl DisplayItem {
    pub fn quote(text: impl Into<String>, author: impl Into<String>) -> Self {
        let text = text.into();
        let author = author.into();
        Self {
            id: text.clone(),
            primary_text: text,
            secondary_text: if author.is_empty() { None } else { Some(author) },
            target_url: None,
        }
    }

    pub fn article(id: impl Into<String>, title: impl Into<String>, url: impl Into<String>) -> Self {
        let url = url.into();
        let domain = domain_from_url(&url);
        Self {
            id: id.into(),
            primary_text: title.into(),
            secondary_text: if domain.is_empty() { None } else { Some(domain) },
            target_url: Some(url),
        }
    }

    /// The link opened when the card is followed: the article URL when the
    /// item carries one, otherwise a web search for the quote text.
    pub fn action_url(&self) -> String {
        match &self.target_url {
            Some(url) => url.clone(),
            None => format!(
                "https://www.bing.com/search?q={}&qs=PN&form=TSFLBL",
                urlencoding::encode(&self.primary_text)
            ),
        }
    }
}

/// Strip the scheme and leading www. from a URL to get a short display domain.
pub fn domain_from_url(url: &str) -> String {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    let rest = rest.strip_prefix("www.").unwrap_or(rest);
    rest.split('/').next().unwrap_or("").to_string()
}

/// The active content category. Exactly one mode is active at a time; each
/// mode has its own cache partition and visited set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Random,
    DailyPick,
    ListAll,
    ArticleFeed,
}

impl Mode {
    /// Display order of the tab row.
    pub const ALL: [Mode; 4] = [Mode::ListAll, Mode::DailyPick, Mode::Random, Mode::ArticleFeed];

    /// Wire string, also used to namespace cache and visited-set keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Random => "random",
            Mode::DailyPick => "today",
            Mode::ListAll => "quotes",
            Mode::ArticleFeed => "articles",
        }
    }

    /// Unknown strings fall back to the default mode rather than failing.
    pub fn from_str_or_default(s: &str) -> Self {
        match s {
            "random" => Mode::Random,
            "today" => Mode::DailyPick,
            "quotes" => Mode::ListAll,
            "articles" => Mode::ArticleFeed,
            _ => Mode::default(),
        }
    }

    pub fn tab_label(&self) -> &'static str {
        match self {
            Mode::Random => "Random",
            Mode::DailyPick => "Today",
            Mode::ListAll => "List",
            Mode::ArticleFeed => "Articles",
        }
    }

    pub fn heading(&self) -> &'static str {
        match self {
            Mode::Random => "Random Quote",
            Mode::DailyPick => "Quote of the Day",
            Mode::ListAll => "Inspiring Quotes",
            Mode::ArticleFeed => "Article Feed",
        }
    }
}

impl Default for Mode {
    fn default() -> Self {
        Mode::ListAll
    }
}

/// In-memory per-mode cache of the last fetched item lists. A normal load
/// serves from here; a forced refresh bypasses and overwrites the partition.
pub struct ItemsCache {
    lists: HashMap<Mode, Vec<DisplayItem>>,
}

impl ItemsCache {
    pub fn new() -> Self {
        Self {
            lists: HashMap::new(),
        }
    }

    pub fn get(&self, mode: Mode) -> Option<&Vec<DisplayItem>> {
        self.lists.get(&mode)
    }

    pub fn update(&mut self, mode: Mode, items: Vec<DisplayItem>) {
        self.lists.insert(mode, items);
    }

    pub fn invalidate(&mut self, mode: Mode) {
        self.lists.remove(&mode);
    }
}
