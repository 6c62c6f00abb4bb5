/// One label/value block shown on the results page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultCard {
    pub title: String,
    pub body: String,
}

impl ResultCard {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }
}

/// Splits model output into cards, one per blank-line separated paragraph.
///
/// Each paragraph is cut at its first colon. Paragraphs without a colon are
/// dropped; the model is asked for `Label: value` sections but nothing
/// enforces it, so this is a display heuristic only.
pub fn split_into_cards(text: &str) -> Vec<ResultCard> {
    let normalized = text.replace("\r\n", "\n");
    normalized
        .split("\n\n")
        .filter_map(parse_section)
        .collect()
}

fn parse_section(section: &str) -> Option<ResultCard> {
    let (title, body) = section.split_once(':')?;
    Some(ResultCard::new(title.trim(), body.trim()))
}
