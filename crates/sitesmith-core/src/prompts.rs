//! Prompt text for each model call in the pipeline.

use serde_json::json;

const JSON_RULES: &str = "\
JSON rules:
- Reply with one JSON object and nothing else. No markdown fences, no commentary.
- Double quotes for every key and string value. No single quotes, backticks or string concatenation.
- Escape newlines inside strings as \\n.";

const STEP_PROTOCOL: &str = "\
You are a senior frontend engineer who works in explicit steps.
Every reply is exactly one step, as JSON:
{ \"step\": \"START\" | \"THINK\" | \"OBSERVE\" | \"OUTPUT\", \"content\": ... }

Steps:
- START: restate what you were asked to do.
- THINK: reason about one aspect of the code or the request.
- OBSERVE: note something concrete you see in the provided material.
- OUTPUT: the final answer. Here \"content\" is an object { \"html\": \"...\", \"css\": \"...\", \"js\": \"...\" }.

Emit a single step per reply and wait for the next turn. Take several THINK/OBSERVE steps before OUTPUT.
Emit OUTPUT exactly once; it ends the conversation.";

const ENHANCE_TASK: &str = "\
Task: you receive the user's query, the user's own site (html/css/js as JSON) and one chunk of inspiration code.
- Take from the chunk only the parts the query asks for (\"navbar like X\" means only the navbar block).
- Adapt those parts to the user's site: its content, naming and existing styles.
- Convert utility-class frameworks into plain CSS whose selectors match your HTML.
- Keep JS limited to what the chosen HTML needs.
- Keep asset paths from the user's site exactly as given.
- If the chunk holds nothing relevant, OUTPUT empty strings.";

const CLONE_TASK: &str = "\
Task: you receive one chunk of a captured page (HTML, CSS and JS sections). Reproduce it as clean static code.
- Clean up the HTML structure and keep every piece of visible content.
- Consolidate the CSS that applies to this HTML, including inline styles.
- Move inline scripts into the JS output.
- Keep relative asset paths (e.g. ./assets/logo.png) exactly as they appear.
- Do not add features or content that is not in the chunk.";

/// System instruction for the per-chunk agent loop.
pub fn agent_system(clone: bool) -> String {
    let task = if clone { CLONE_TASK } else { ENHANCE_TASK };
    format!("{}\n\n{}\n\n{}", STEP_PROTOCOL, task, JSON_RULES)
}

/// Opening user turn for one chunk.
pub fn agent_user(query: &str, user_site: &str, chunk: &str) -> String {
    json!({
        "query": query,
        "userSite": user_site,
        "chunk": chunk,
    })
    .to_string()
}

/// The part of every opening agent request that does not depend on the chunk:
/// the system instruction plus the user turn with an empty chunk.
pub fn fixed_context(clone: bool, query: &str, user_site: &str) -> String {
    format!("{}\n{}", agent_system(clone), agent_user(query, user_site, ""))
}

/// One-shot request to re-emit an OUTPUT payload as clean JSON.
pub fn correction(payload: &str) -> String {
    format!(
        "The text below is meant to be a JSON object with string fields \"html\", \"css\" and \"js\".\n\
         Return it as valid JSON with exactly those three fields. Do not change the code inside them.\n\
         {}\n\nText:\n{}",
        JSON_RULES, payload
    )
}

/// Final correction pass over the merged site.
pub fn finalize(html: &str, css: &str, js: &str, user_site: &str) -> String {
    format!(
        "You are a senior frontend engineer reviewing a generated one-page site.\n\
         Fix structural mistakes only; keep the design and every piece of content.\n\
         - Start the HTML with <!DOCTYPE html> and make it a complete document.\n\
         - Link the stylesheet as styles.css and the script as script.js.\n\
         - Keep every asset URL exactly as written.\n\
         - Make class and id names consistent between HTML, CSS and JS.\n\
         - Never shorten the code.\n\
         Reply as {{ \"html\": \"...\", \"css\": \"...\", \"js\": \"...\" }}.\n\
         {}\n\n\
         HTML:\n{}\nCSS:\n{}\nJS:\n{}\nUser site:\n{}",
        JSON_RULES, html, css, js, user_site
    )
}

/// Ask whether an inspiration chunk holds what the query is after.
pub fn relevance(chunk: &str, query: &str) -> String {
    format!(
        "You filter page source for a frontend developer.\n\
         Query: {}\n\n\
         Decide whether the HTML chunk below contains the section the query refers to.\n\
         If it does, extract that section's HTML and any CSS/JS it needs.\n\
         Reply as {{ \"found\": true | false, \"html\": \"...\", \"css\": \"...\", \"js\": \"...\" }}, \
         using empty strings when nothing is found.\n\
         {}\n\nChunk:\n{}",
        query, JSON_RULES, chunk
    )
}

/// Ask for the homepage of something named by a keyword.
pub fn resolve_url(input: &str) -> String {
    format!(
        "Give the official homepage URL for: {}\n\
         Reply as {{ \"url\": \"https://...\" }}. If you are not sure, give your best guess.\n\
         {}",
        input, JSON_RULES
    )
}
