use std::io::{Cursor, Write};
use std::path::Path;

use anyhow::{Context, Result};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::hierarchy::html::strip_html_lossy;
use crate::hierarchy::item::{flatten, FlatRow, PageHierarchy};

const COLUMNS: [&str; 6] = ["path", "title", "imageUrl", "linkURL", "type", "text"];

pub fn rows(page: &PageHierarchy) -> Vec<FlatRow> {
    flatten(&page.items)
}

pub fn render_csv(rows: &[FlatRow]) -> Result<Vec<u8>> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    wtr.into_inner().context("Failed to finish CSV output")
}

pub fn render_html(title: &str, rows: &[FlatRow]) -> Result<String> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    writer.get_mut().write_all(b"<!DOCTYPE html>\n")?;

    writer.write_event(Event::Start(BytesStart::new("html")))?;
    writer.write_event(Event::Start(BytesStart::new("head")))?;
    writer.write_event(Event::Empty(BytesStart::new("meta").with_attributes([("charset", "utf-8")])))?;
    text_element(&mut writer, "title", title)?;
    writer.write_event(Event::End(BytesEnd::new("head")))?;

    writer.write_event(Event::Start(BytesStart::new("body")))?;
    text_element(&mut writer, "h1", title)?;
    writer.write_event(Event::Start(BytesStart::new("table")))?;

    writer.write_event(Event::Start(BytesStart::new("thead")))?;
    writer.write_event(Event::Start(BytesStart::new("tr")))?;
    for column in COLUMNS {
        text_element(&mut writer, "th", column)?;
    }
    writer.write_event(Event::End(BytesEnd::new("tr")))?;
    writer.write_event(Event::End(BytesEnd::new("thead")))?;

    writer.write_event(Event::Start(BytesStart::new("tbody")))?;
    for row in rows {
        let text = strip_html_lossy(&row.text);
        writer.write_event(Event::Start(BytesStart::new("tr")))?;
        for cell in [&row.path, &row.title, &row.image_url, &row.link_url, &row.kind, &text] {
            text_element(&mut writer, "td", cell)?;
        }
        writer.write_event(Event::End(BytesEnd::new("tr")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("tbody")))?;

    writer.write_event(Event::End(BytesEnd::new("table")))?;
    writer.write_event(Event::End(BytesEnd::new("body")))?;
    writer.write_event(Event::End(BytesEnd::new("html")))?;

    let bytes = writer.into_inner().into_inner();
    Ok(String::from_utf8(bytes)?)
}

fn text_element<W: Write>(writer: &mut Writer<W>, tag: &str, text: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(tag)))?;
    if !text.is_empty() {
        writer.write_event(Event::Text(BytesText::new(text)))?;
    }
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

/// Renders fully in memory, then writes; a failed render leaves no partial file.
pub fn write_csv(page: &PageHierarchy, path: &Path) -> Result<usize> {
    let rows = rows(page);
    let bytes = render_csv(&rows)?;
    std::fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))?;
    Ok(rows.len())
}

pub fn write_html(page: &PageHierarchy, path: &Path) -> Result<usize> {
    let rows = rows(page);
    let html = render_html(&page.title, &rows)?;
    std::fs::write(path, html).with_context(|| format!("writing {}", path.display()))?;
    Ok(rows.len())
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::item::{HierarchyItem, ItemKind, SourceTag};

    fn page() -> PageHierarchy {
        let mut tab = HierarchyItem::new("Plans & Pricing", ItemKind::Tab, "item_1", SourceTag::Primary);
        tab.path = "Plans & Pricing".into();
        let mut button = HierarchyItem::new("Compare", ItemKind::Button, "button", SourceTag::Primary);
        button.path = "Plans & Pricing > Compare".into();
        button.link_sources.storage_url = Some("/content/site/en/compare.html".into());
        let mut text = HierarchyItem::new("Text", ItemKind::Text, "text", SourceTag::Primary);
        text.path = "Plans & Pricing > Text".into();
        text.text = Some("<p>Line, with \"quotes\"</p>".into());
        tab.children = vec![text, button];
        PageHierarchy {
            title: "Support".into(),
            items: vec![tab],
            link_url: "/content/site/en/support.html".into(),
            banner_images: Vec::new(),
        }
    }

    #[test]
    fn csv_has_header_and_rows() {
        let bytes = render_csv(&rows(&page())).unwrap();
        let mut rdr = csv::Reader::from_reader(bytes.as_slice());
        let headers: Vec<String> = rdr.headers().unwrap().iter().map(str::to_string).collect();
        assert_eq!(headers, COLUMNS);
        let records: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 3);
        assert_eq!(&records[1][5], "<p>Line, with \"quotes\"</p>");
        assert_eq!(&records[2][3], "/content/site/en/compare.html");
    }

    #[test]
    fn html_escapes_text() {
        let html = render_html("Support", &rows(&page())).unwrap();
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<td>Plans &amp; Pricing</td>"));
        assert!(html.contains("<th>linkURL</th>"));
        assert!(!html.contains("<p>Line"));
    }

    #[test]
    fn files_written() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("support.csv");
        let html_path = dir.path().join("support.html");
        assert_eq!(write_csv(&page(), &csv_path).unwrap(), 3);
        assert_eq!(write_html(&page(), &html_path).unwrap(), 3);
        assert!(std::fs::read_to_string(html_path).unwrap().contains("<h1>Support</h1>"));
    }
}
