//! Prompt rendering for analysis requests.

use crate::content::{AnalysisRequest, RAW_PROMPT_KEY};

const BIRTH_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const PILLAR_KEYS: [&str; 4] = ["year", "month", "day", "hour"];

/// Renders the text sent to the backend.
///
/// A non-empty `prompt` knowledge entry short-circuits rendering; it is the
/// follow-up path where the caller has already assembled the full text.
pub fn render(request: &AnalysisRequest) -> String {
    if let Some(raw) = request
        .knowledge
        .get(RAW_PROMPT_KEY)
        .filter(|raw| !raw.trim().is_empty())
    {
        return raw.clone();
    }

    let subject = &request.subject;
    let birth_time = subject
        .birth_time
        .map(|t| t.format(BIRTH_TIME_FORMAT).to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let mut out = String::from(
        "You are an experienced four-pillars analyst. Give a structured reading of the \
         subject below covering personality, career, relationships and health, then a \
         short summary.\n\n",
    );
    out.push_str(&format!("Name: {}\n", display_or_unknown(&subject.name)));
    out.push_str(&format!("Gender: {}\n", display_or_unknown(&subject.gender)));
    out.push_str(&format!("Birth time: {birth_time}\n"));

    let pillars: Vec<String> = PILLAR_KEYS
        .iter()
        .filter_map(|key| {
            request
                .knowledge
                .get(*key)
                .map(|value| format!("{key} {value}"))
        })
        .collect();
    if !pillars.is_empty() {
        out.push_str(&format!("Pillars: {}\n", pillars.join(", ")));
    }

    let extra: Vec<(&String, &String)> = request
        .knowledge
        .iter()
        .filter(|(key, _)| !PILLAR_KEYS.contains(&key.as_str()) && key.as_str() != RAW_PROMPT_KEY)
        .collect();
    if !extra.is_empty() {
        out.push_str("\nReference notes:\n");
        for (key, value) in extra {
            out.push_str(&format!("- {key}: {value}\n"));
        }
    }
    out
}

fn display_or_unknown(value: &str) -> &str {
    if value.trim().is_empty() {
        "unknown"
    } else {
        value
    }
}
