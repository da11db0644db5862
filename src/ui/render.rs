//! HTML rendering for the chat page.
//!
//! Everything here is a pure function of its input, so the same snapshot
//! always renders to the same bytes.

use std::sync::LazyLock;

use pulldown_cmark::{CodeBlockKind, CowStr, Event, Options, Parser, Tag, TagEnd};
use syntect::highlighting::{Theme, ThemeSet};
use syntect::html::highlighted_html_for_string;
use syntect::parsing::SyntaxSet;

use crate::bootstrap::EngineStatus;
use crate::controller::TranscriptSnapshot;
use crate::transcript::{ChatTurn, Role};

/// Placeholder text of the message input.
pub const INPUT_PLACEHOLDER: &str = "Type your message...";

const CODE_THEME: &str = "base16-ocean.dark";

static SYNTAXES: LazyLock<SyntaxSet> = LazyLock::new(SyntaxSet::load_defaults_newlines);
static THEMES: LazyLock<ThemeSet> = LazyLock::new(ThemeSet::load_defaults);

/// Escape text for use in HTML element content and attribute values.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Render the whole transcript, plus a typing indicator while streaming.
pub fn render_transcript_html(snapshot: &TranscriptSnapshot) -> String {
    let mut html = format!(
        "<div class=\"transcript\" data-streaming=\"{}\">",
        snapshot.streaming
    );
    for turn in &snapshot.turns {
        html.push_str(&render_turn_html(turn));
    }
    if snapshot.streaming {
        html.push_str(
            "<div class=\"turn turn-assistant\"><div class=\"bubble typing\">\
             <span class=\"dot\"></span><span class=\"dot\"></span><span class=\"dot\"></span>\
             </div></div>",
        );
    }
    html.push_str("</div>");
    html
}

/// Render one turn. User text is shown verbatim; everything else is markdown.
pub fn render_turn_html(turn: &ChatTurn) -> String {
    let role = turn.role;
    let body = match role {
        Role::User => format!("<p>{}</p>", html_escape(&turn.content)),
        Role::Assistant | Role::System => {
            format!(
                "<div class=\"markdown\">{}</div>",
                render_markdown_html(&turn.content)
            )
        }
    };
    format!("<div class=\"turn turn-{role}\"><div class=\"bubble\">{body}</div></div>")
}

/// Render the engine status banner. Empty once the engine is ready.
pub fn render_status_html(status: &EngineStatus) -> String {
    match status {
        EngineStatus::Loading => "<div class=\"status loading\" role=\"status\">\
             <span class=\"dot\"></span><span class=\"dot\"></span><span class=\"dot\"></span>\
             </div>"
            .to_owned(),
        EngineStatus::Error(message) => format!(
            "<div class=\"status error\" role=\"alert\">{}</div>",
            html_escape(message)
        ),
        EngineStatus::Ready(_) => String::new(),
    }
}

/// Render markdown (GFM tables, strikethrough, task lists) to HTML.
///
/// Fenced code blocks are highlighted with `syntect`, inline code gets its
/// own class and raw HTML in the source is shown as text. Link and image
/// destinations with a scheme other than `http`, `https` or `mailto` are
/// emptied.
pub fn render_markdown_html(content: &str) -> String {
    let options =
        Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS;

    let mut events: Vec<Event<'_>> = Vec::new();
    let mut code_buf = String::new();
    let mut code_lang = String::new();
    let mut in_code_block = false;

    for event in Parser::new_ext(content, options) {
        match event {
            Event::Start(Tag::CodeBlock(kind)) => {
                in_code_block = true;
                code_buf.clear();
                code_lang = match kind {
                    CodeBlockKind::Fenced(lang) => {
                        lang.split_whitespace().next().unwrap_or_default().to_owned()
                    }
                    CodeBlockKind::Indented => String::new(),
                };
            }
            Event::End(TagEnd::CodeBlock) => {
                in_code_block = false;
                events.push(Event::Html(CowStr::from(highlight_code_block(
                    &code_buf, &code_lang,
                ))));
            }
            Event::Text(text) if in_code_block => code_buf.push_str(&text),
            Event::Code(code) => events.push(Event::Html(CowStr::from(format!(
                "<code class=\"inline-code\">{}</code>",
                html_escape(&code)
            )))),
            Event::Html(raw) | Event::InlineHtml(raw) => events.push(Event::Text(raw)),
            Event::Start(Tag::Link {
                link_type,
                dest_url,
                title,
                id,
            }) => events.push(Event::Start(Tag::Link {
                link_type,
                dest_url: safe_destination(dest_url),
                title,
                id,
            })),
            Event::Start(Tag::Image {
                link_type,
                dest_url,
                title,
                id,
            }) => events.push(Event::Start(Tag::Image {
                link_type,
                dest_url: safe_destination(dest_url),
                title,
                id,
            })),
            other => events.push(other),
        }
    }

    let mut html = String::new();
    pulldown_cmark::html::push_html(&mut html, events.into_iter());
    html
}

/// Keep relative and `http`/`https`/`mailto` destinations; blank the rest.
fn safe_destination(dest: CowStr<'_>) -> CowStr<'_> {
    if is_safe_destination(&dest) {
        dest
    } else {
        CowStr::Borrowed("")
    }
}

fn is_safe_destination(dest: &str) -> bool {
    // Browsers ignore surrounding whitespace and embedded tabs/newlines in schemes.
    let cleaned: String = dest
        .trim()
        .chars()
        .filter(|c| !c.is_ascii_control())
        .collect();
    match cleaned.find([':', '/', '?', '#']) {
        Some(i) if cleaned[i..].starts_with(':') => matches!(
            cleaned[..i].to_ascii_lowercase().as_str(),
            "http" | "https" | "mailto"
        ),
        _ => true,
    }
}

/// Highlight a code block with `syntect`.
///
/// Unknown languages are highlighted as plain text; if highlighting fails
/// the code is emitted escaped inside `<pre><code>`.
pub fn highlight_code_block(code: &str, lang: &str) -> String {
    let syntax = if lang.is_empty() {
        SYNTAXES.find_syntax_plain_text()
    } else {
        SYNTAXES
            .find_syntax_by_token(lang)
            .unwrap_or_else(|| SYNTAXES.find_syntax_plain_text())
    };

    let highlighted = code_theme()
        .and_then(|theme| highlighted_html_for_string(code, &SYNTAXES, syntax, theme).ok());
    match highlighted {
        Some(highlighted) => format!(
            "<div class=\"code-block\" data-lang=\"{}\">{highlighted}</div>",
            html_escape(lang)
        ),
        None => format!(
            "<div class=\"code-block\"><pre><code>{}</code></pre></div>",
            html_escape(code)
        ),
    }
}

fn code_theme() -> Option<&'static Theme> {
    THEMES.themes.get(CODE_THEME)
}

/// Render the full chat page.
///
/// `snapshot` is `None` until a session exists; the chat panel stays hidden
/// and the status banner shows progress instead.
pub fn render_page(title: &str, status: &EngineStatus, snapshot: Option<&TranscriptSnapshot>) -> String {
    let title = html_escape(title);
    let status_html = render_status_html(status);
    let (hidden, transcript_html, streaming) = match snapshot {
        Some(snapshot) => ("", render_transcript_html(snapshot), snapshot.streaming),
        None => (" hidden", String::new(), false),
    };
    let disabled = if streaming { " disabled" } else { "" };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
<style>{PAGE_CSS}</style>
</head>
<body>
<main>
<h1>{title}</h1>
<div id="status">{status_html}</div>
<section id="chat"{hidden}>
<div id="transcript">{transcript_html}</div>
<form id="composer" method="post" action="/submit">
<input id="message" name="message" type="text" autocomplete="off" placeholder="{INPUT_PLACEHOLDER}">
<button id="send" type="submit"{disabled}>Send</button>
</form>
</section>
</main>
<script>{PAGE_SCRIPT}</script>
</body>
</html>
"#
    )
}

const PAGE_CSS: &str = r#"
body { margin: 0; min-height: 100vh; font-family: ui-monospace, monospace; font-size: 14px;
  background: linear-gradient(160deg, #1e293b, #0f172a); color: #1f2937; }
main { max-width: 64rem; margin: 0 auto; padding: 2rem 1rem; }
h1 { color: #fff; text-align: center; font-size: 2.25rem; margin-bottom: 2rem; }
#status .error { color: #ef4444; text-align: center; }
#status .loading { display: flex; justify-content: center; gap: .75rem; }
#status .loading .dot { background: #fff; }
#chat { max-width: 56rem; margin: 0 auto; border-radius: .5rem; overflow: hidden;
  background: rgba(255,255,255,.15); backdrop-filter: blur(8px); box-shadow: 0 10px 25px rgba(0,0,0,.3); }
#transcript { height: 500px; overflow-y: auto; padding: 1rem; }
.turn { display: flex; margin-bottom: 1rem; animation: rise .3s ease-out; }
.turn-user { justify-content: flex-end; }
.turn-assistant, .turn-system { justify-content: flex-start; }
.bubble { max-width: 36rem; border-radius: .5rem; padding: .75rem; overflow-wrap: anywhere; }
.turn-user .bubble { background: #3b82f6; color: #fff; }
.turn-assistant .bubble, .turn-system .bubble { background: #e5e7eb; color: #1f2937; }
.bubble p { margin: 0; }
.markdown > :first-child { margin-top: 0; }
.markdown > :last-child { margin-bottom: 0; }
.code-block pre { padding: .5rem; border-radius: .25rem; overflow-x: auto; }
.inline-code { background: #e5e7eb; color: #ef4444; padding: .125rem .25rem; border-radius: .25rem; }
.dot { display: inline-block; width: .5rem; height: .5rem; border-radius: 9999px; background: #9ca3af;
  animation: pulse 1s infinite; }
.dot:nth-child(2) { animation-delay: .15s; }
.dot:nth-child(3) { animation-delay: .3s; }
.typing { display: flex; gap: .5rem; }
#composer { display: flex; gap: .5rem; padding: 1rem; background: #f3f4f6; }
#message { flex-grow: 1; padding: .5rem 1rem; border-radius: 9999px; border: 1px solid #d1d5db; }
#send { background: #3b82f6; color: #fff; border: 0; border-radius: 9999px; padding: .5rem 1rem; cursor: pointer; }
#send:disabled { opacity: .5; cursor: default; }
@keyframes rise { from { opacity: 0; transform: translateY(20px); } to { opacity: 1; transform: none; } }
@keyframes pulse { 50% { opacity: .3; } }
"#;

const PAGE_SCRIPT: &str = r#"
(() => {
  const status = document.getElementById('status');
  const chat = document.getElementById('chat');
  const transcript = document.getElementById('transcript');
  const form = document.getElementById('composer');
  const input = document.getElementById('message');
  const send = document.getElementById('send');
  const scrollToLatest = () => { transcript.scrollTop = transcript.scrollHeight; };

  const events = new EventSource('/events');
  events.addEventListener('status', (e) => { status.innerHTML = e.data; });
  events.addEventListener('transcript', (e) => {
    chat.hidden = false;
    transcript.innerHTML = e.data;
    send.disabled = transcript.querySelector('[data-streaming="true"]') !== null;
    scrollToLatest();
  });

  form.addEventListener('submit', (e) => {
    e.preventDefault();
    if (!input.value.trim() || send.disabled) return;
    const body = new URLSearchParams({ message: input.value });
    input.value = '';
    fetch('/submit', { method: 'POST', body });
  });
  scrollToLatest();
})();
"#;
