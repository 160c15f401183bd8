//! Content types for drive paths.

use crate::http::response::MIME_TEXT_PLAIN;

/// Guesses the content type of `path` from its extension.
///
/// Unknown extensions are served as plain text. Every `text/*` type gets an
/// explicit UTF-8 charset.
pub fn get_mime_type(path: &str) -> String {
    match mime_guess::from_path(path).first() {
        Some(mime) if mime.type_() == mime_guess::mime::TEXT => {
            format!("{}; charset=utf-8", mime.essence_str())
        }
        Some(mime) => mime.essence_str().to_string(),
        None => MIME_TEXT_PLAIN.to_string(),
    }
}
