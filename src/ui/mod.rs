//! Browser front end: HTML rendering and the HTTP server that serves it.

pub mod render;
pub mod server;

pub use render::{render_page, render_status_html, render_transcript_html};
pub use server::ChatServer;
