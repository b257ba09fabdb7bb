//! Script prompt templates, one system prompt per show type

use handlebars::Handlebars;
use serde::Serialize;

use crate::error::Result;
use crate::models::{Content, MusicTrack, ShowType};

const CONTEXT_TEMPLATE: &str = include_str!("../../templates/shows/context.hbs");
const MUSIC_PARTIAL: &str = include_str!("../../templates/shows/_music.hbs");

fn system_template(show_type: ShowType) -> &'static str {
    match show_type {
        ShowType::News => include_str!("../../templates/shows/news.hbs"),
        ShowType::Talk => include_str!("../../templates/shows/talk.hbs"),
        ShowType::Music => include_str!("../../templates/shows/music.hbs"),
        ShowType::Knowledge => include_str!("../../templates/shows/knowledge.hbs"),
        ShowType::Mixed => include_str!("../../templates/shows/mixed.hbs"),
        ShowType::QuickHits => include_str!("../../templates/shows/quick_hits.hbs"),
        ShowType::DeepDive => include_str!("../../templates/shows/deep_dive.hbs"),
    }
}

/// Spoken words the script should aim for
pub fn target_words(show_type: ShowType) -> usize {
    match show_type {
        ShowType::QuickHits => 150,
        ShowType::Music => 300,
        ShowType::News => 600,
        ShowType::Mixed => 700,
        ShowType::Talk => 800,
        ShowType::Knowledge => 900,
        ShowType::DeepDive => 1500,
    }
}

#[derive(Serialize)]
struct SystemData<'a> {
    title: &'a str,
    item_count: usize,
    target_words: usize,
    tracks: &'a [MusicTrack],
}

#[derive(Serialize)]
struct ContextItem {
    number: usize,
    title: String,
    summary: String,
    topics: String,
}

#[derive(Serialize)]
struct ContextData {
    items: Vec<ContextItem>,
}

/// Rendered system and user messages for a script request
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptPrompt {
    pub system: String,
    pub context: String,
}

pub struct ShowPrompts {
    handlebars: Handlebars<'static>,
}

impl ShowPrompts {
    pub fn new() -> Result<Self> {
        let mut handlebars = Handlebars::new();
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars.register_partial("music_tracks", MUSIC_PARTIAL)?;
        handlebars.register_template_string("context", CONTEXT_TEMPLATE)?;
        for show_type in ShowType::all() {
            handlebars.register_template_string(show_type.as_str(), system_template(show_type))?;
        }
        Ok(Self { handlebars })
    }

    pub fn render(
        &self,
        show_type: ShowType,
        title: &str,
        contents: &[Content],
        tracks: &[MusicTrack],
    ) -> Result<ScriptPrompt> {
        let system = self.handlebars.render(
            show_type.as_str(),
            &SystemData {
                title,
                item_count: contents.len(),
                target_words: target_words(show_type),
                tracks,
            },
        )?;

        let items = contents
            .iter()
            .enumerate()
            .map(|(i, content)| ContextItem {
                number: i + 1,
                title: content.title.clone(),
                summary: content
                    .summary
                    .clone()
                    .unwrap_or_else(|| crate::utils::truncate_text(content.raw_text.as_deref().unwrap_or_default(), 600)),
                topics: content.topics.iter().cloned().collect::<Vec<_>>().join(", "),
            })
            .collect();
        let context = self.handlebars.render("context", &ContextData { items })?;

        Ok(ScriptPrompt {
            system: system.trim().to_string(),
            context: context.trim().to_string(),
        })
    }
}
