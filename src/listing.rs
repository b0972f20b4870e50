//! Extraction of entries from the archive's HTML directory listings.
//!
//! The archive serves two shapes: plain anchor lists and tables whose rows
//! hold a name cell followed by size/date cells.

use std::sync::LazyLock;

use regex::Regex;

static ANCHOR_HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\s(?:[^>]*?\s)?href\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#)
        .expect("valid anchor regex")
});
static TABLE_ROW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<tr\b[^>]*>(.*?)</tr>").expect("valid row regex"));
static TABLE_CELL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<td\b[^>]*>(.*?)</td>").expect("valid cell regex"));
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid tag regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingRow {
    /// Visible text of the first cell.
    pub name: String,
    /// First link inside the first cell.
    pub href: Option<String>,
    /// Visible text of the remaining cells (size, date).
    pub details: Vec<String>,
}

/// Every `href` of every anchor, in document order.
pub fn anchor_hrefs(html: &str) -> Vec<String> {
    ANCHOR_HREF
        .captures_iter(html)
        .filter_map(|captures| {
            captures
                .get(1)
                .or_else(|| captures.get(2))
                .or_else(|| captures.get(3))
                .map(|value| decode_entities(value.as_str()))
        })
        .collect()
}

/// Table rows with at least one data cell; header rows (`<th>` only) are
/// skipped.
pub fn table_rows(html: &str) -> Vec<ListingRow> {
    TABLE_ROW
        .captures_iter(html)
        .filter_map(|row| {
            let mut cells = TABLE_CELL
                .captures_iter(&row[1])
                .map(|cell| cell[1].to_string())
                .collect::<Vec<_>>()
                .into_iter();
            let first = cells.next()?;
            Some(ListingRow {
                name: cell_text(&first),
                href: anchor_hrefs(&first).into_iter().next(),
                details: cells.map(|cell| cell_text(&cell)).collect(),
            })
        })
        .collect()
}

/// Final path segment of an href, ignoring any query or fragment.
pub fn last_segment(href: &str) -> &str {
    let path = href.split(['?', '#']).next().unwrap_or(href);
    path.rsplit('/').next().unwrap_or(path)
}

fn cell_text(cell: &str) -> String {
    decode_entities(TAG.replace_all(cell, "").trim())
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchors_accept_all_quote_styles() {
        let html = r#"<a href="/a/one.root">one</a> <A HREF='two.root'>two</A> <a class=x href=three.root>3</a>"#;
        assert_eq!(anchor_hrefs(html), vec!["/a/one.root", "two.root", "three.root"]);
    }

    #[test]
    fn anchors_ignore_prefixed_href_attributes() {
        let html = r#"<a data-href="/other/thing" href="/dqm/x/DQM_V0001_GEM_R000355361.root">f</a>"#;
        assert_eq!(anchor_hrefs(html), vec!["/dqm/x/DQM_V0001_GEM_R000355361.root"]);
    }

    #[test]
    fn last_segment_drops_query() {
        assert_eq!(last_segment("/dqm/x/DQM_V0001.root?raw=1"), "DQM_V0001.root");
        assert_eq!(last_segment("plain.root"), "plain.root");
        assert_eq!(last_segment("/dir/"), "");
    }

    #[test]
    fn rows_skip_header_cells() {
        let html = "<table><tr><th>Name</th><th>Size</th></tr>\
                    <tr><td><a href='/f/x.root'>x.root</a></td><td>12k</td><td>2022-07-01</td></tr></table>";
        let rows = table_rows(html);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "x.root");
        assert_eq!(rows[0].href.as_deref(), Some("/f/x.root"));
        assert_eq!(rows[0].details, vec!["12k", "2022-07-01"]);
    }
}
