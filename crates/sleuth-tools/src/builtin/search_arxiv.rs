use futures::future::BoxFuture;
use serde_json::json;

use sleuth_core::error::{Result, SleuthError};
use sleuth_core::traits::Capability;
use sleuth_core::types::ToolOutput;

const ARXIV_API_URL: &str = "https://export.arxiv.org/api/query";
const MAX_RESULTS: u32 = 10;

/// Search arXiv for papers via its Atom query API.
pub struct SearchArxivTool {
    http: reqwest::Client,
}

impl SearchArxivTool {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for SearchArxivTool {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
struct ArxivEntry {
    title: String,
    authors: Vec<String>,
    published: String,
    summary: String,
    pdf_url: Option<String>,
}

/// Pull the fields we render out of one Atom `<entry>` block.
///
/// The Atom feed is regular enough that targeted regexes beat a full XML
/// dependency for the handful of fields we need.
fn parse_entries(feed: &str) -> Vec<ArxivEntry> {
    let re_entry = regex::Regex::new(r"(?s)<entry>(.*?)</entry>").unwrap();
    let re_title = regex::Regex::new(r"(?s)<title>(.*?)</title>").unwrap();
    let re_author = regex::Regex::new(r"(?s)<author>\s*<name>(.*?)</name>").unwrap();
    let re_published = regex::Regex::new(r"<published>(.*?)</published>").unwrap();
    let re_summary = regex::Regex::new(r"(?s)<summary>(.*?)</summary>").unwrap();
    let re_pdf = regex::Regex::new(r#"<link[^>]*title="pdf"[^>]*href="([^"]+)""#).unwrap();

    re_entry
        .captures_iter(feed)
        .map(|entry| {
            let block = &entry[1];
            let field = |re: &regex::Regex| {
                re.captures(block)
                    .map(|c| normalize_text(&c[1]))
                    .unwrap_or_default()
            };
            ArxivEntry {
                title: field(&re_title),
                authors: re_author
                    .captures_iter(block)
                    .map(|c| normalize_text(&c[1]))
                    .collect(),
                published: field(&re_published),
                summary: field(&re_summary),
                pdf_url: re_pdf.captures(block).map(|c| c[1].to_string()),
            }
        })
        .collect()
}

fn normalize_text(raw: &str) -> String {
    let decoded = raw
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn format_entries(entries: &[ArxivEntry]) -> String {
    if entries.is_empty() {
        return "No papers found.".to_string();
    }
    entries
        .iter()
        .map(|e| {
            let mut block = format!(
                "## {}\n\n**By {}**, published on {} \n\n_Abstract_  \n{}\n --- \n",
                e.title,
                e.authors.join(", "),
                e.published,
                e.summary,
            );
            if let Some(pdf) = &e.pdf_url {
                block.push_str(&format!("**PDF:** {}  \n", pdf));
            }
            block
        })
        .collect::<Vec<_>>()
        .join("\n")
}

impl Capability for SearchArxivTool {
    fn name(&self) -> &str {
        "search_arxiv"
    }

    fn description(&self) -> &str {
        "Search arXiv for papers matching the query. Use a less specific or shorter \
         search term to maximize the result set. Do not include special characters. \
         Returns titles, authors, publication dates, abstracts, and PDF links."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query to use"
                }
            },
            "required": ["query"]
        })
    }

    fn invoke(&self, args: serde_json::Value) -> BoxFuture<'_, Result<ToolOutput>> {
        Box::pin(async move {
            let query = args["query"].as_str().ok_or_else(|| {
                SleuthError::capability("search_arxiv", "'query' must be a string")
            })?;

            let response = self
                .http
                .get(ARXIV_API_URL)
                .query(&[
                    ("search_query", format!("all:{}", query).as_str()),
                    ("max_results", &MAX_RESULTS.to_string()),
                    ("sortBy", "relevance"),
                ])
                .send()
                .await
                .map_err(|e| SleuthError::capability("search_arxiv", e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Ok(ToolOutput::error(format!(
                    "Error: arXiv returned {}",
                    status
                )));
            }

            let feed = response
                .text()
                .await
                .map_err(|e| SleuthError::capability("search_arxiv", e.to_string()))?;

            Ok(ToolOutput::success(format_entries(&parse_entries(&feed))))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <entry>
    <title>Filaments of the
      Galactic Center</title>
    <published>2023-06-02T17:59:59Z</published>
    <summary>We study the population of
      radio filaments.</summary>
    <author><name>F. Yusef-Zadeh</name></author>
    <author><name>R. Arendt</name></author>
    <link title="pdf" href="http://arxiv.org/pdf/2306.01071v1" rel="related" type="application/pdf"/>
  </entry>
  <entry>
    <title>Another Paper</title>
    <published>2022-01-01T00:00:00Z</published>
    <summary>Short abstract.</summary>
    <author><name>A. Author</name></author>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_entries() {
        let entries = parse_entries(SAMPLE_FEED);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].title, "Filaments of the Galactic Center");
        assert_eq!(entries[0].authors, vec!["F. Yusef-Zadeh", "R. Arendt"]);
        assert_eq!(
            entries[0].pdf_url.as_deref(),
            Some("http://arxiv.org/pdf/2306.01071v1")
        );
        assert!(entries[1].pdf_url.is_none());
    }

    #[test]
    fn test_format_entries() {
        let entries = parse_entries(SAMPLE_FEED);
        let out = format_entries(&entries);
        assert!(out.contains("## Filaments of the Galactic Center"));
        assert!(out.contains("**By F. Yusef-Zadeh, R. Arendt**"));
        assert!(out.contains("**PDF:** http://arxiv.org/pdf/2306.01071v1"));
    }

    #[test]
    fn test_format_entries_empty() {
        assert_eq!(format_entries(&[]), "No papers found.");
    }
}
