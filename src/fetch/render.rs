use async_trait::async_trait;
use url::Url;

use crate::fetch::HyperFetch;

/// Produces the HTML page for a directory listing.
///
/// `files` are the entry names as listed, with a trailing `/` on
/// subdirectories. `fetch` is the adapter serving the request, for renderers
/// that want to pull more content out of the drive.
#[async_trait]
pub trait IndexRenderer: Send + Sync {
    async fn render(&self, url: &Url, files: &[String], fetch: &HyperFetch) -> String;
}

/// A plain `Index of /path` page with one link per entry.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultIndexRenderer;

#[async_trait]
impl IndexRenderer for DefaultIndexRenderer {
    async fn render(&self, url: &Url, files: &[String], _fetch: &HyperFetch) -> String {
        render_index(url.path(), files)
    }
}

pub fn render_index(pathname: &str, files: &[String]) -> String {
    let title = escape_html(pathname);
    let items: Vec<String> = files
        .iter()
        .map(|file| {
            let file = escape_html(file);
            format!("  <li><a href=\"{file}\">./{file}</a></li>")
        })
        .collect();

    format!(
        "<!DOCTYPE html>\n\
         <title>Index of {title}</title>\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\" />\n\
         <h1>Index of {title}</h1>\n\
         <ul>\n  \
         <li><a href=\"../\">../</a></li>\n\
         {}\n\
         </ul>\n",
        items.join("\n")
    )
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
