//! Table inside a Confluence storage-format body.
//!
//! The page carries one table used as a message queue: one row holds the
//! request a human typed, another the answer the bridge writes back. Rows
//! are found either by zero-based position or by the label in the row
//! above them (see [`TableLayout`]). Only the first cell of a row matters.
//!
//! Storage format is XHTML with Confluence namespaces (`ac:`, `ri:`), CDATA
//! macro bodies and self-closing void elements. The body is scanned with
//! `quick-xml` for byte offsets only; an update splices the new paragraph
//! text into the original string, so every byte outside the target `<p>`
//! is kept as Confluence stored it.

use std::ops::Range;

use quick_xml::escape::partial_escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

use crate::config::LayoutConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("page contains no <table>")]
    NoTable,
    #[error("page body is not well-formed storage XHTML: {0}")]
    Unparseable(String),
    #[error("table has no row {0}")]
    MissingRow(String),
    #[error("row {0} has no <td> cell")]
    MissingCell(usize),
    #[error("cell in row {row} must hold exactly one <p>, found {paragraphs}")]
    MalformedCell { row: usize, paragraphs: usize },
}

/// Where the request and answer cells live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableLayout {
    Positional { request_row: usize, answer_row: usize },
    Labeled { request_label: String, answer_label: String },
}

impl From<&LayoutConfig> for TableLayout {
    fn from(config: &LayoutConfig) -> Self {
        match config {
            LayoutConfig::Positional {
                request_row,
                answer_row,
            } => TableLayout::Positional {
                request_row: *request_row,
                answer_row: *answer_row,
            },
            LayoutConfig::Labeled {
                request_label,
                answer_label,
            } => TableLayout::Labeled {
                request_label: request_label.clone(),
                answer_label: answer_label.clone(),
            },
        }
    }
}

/// A `<p>` inside a data cell. `span` covers the paragraph's content, or
/// the whole tag when it is written `<p/>`.
#[derive(Debug, Clone)]
struct Paragraph {
    span: Range<usize>,
    self_closing: bool,
}

#[derive(Debug, Default)]
struct Cell {
    text: String,
    paragraphs: Vec<Paragraph>,
}

#[derive(Debug, Default)]
struct Row {
    /// Text of the first `<td>` or `<th>`, used for label lookup.
    heading: Option<String>,
    /// First `<td>`.
    cell: Option<Cell>,
}

pub struct PageTable {
    source: String,
    rows: Vec<Row>,
}

impl PageTable {
    /// Scans a storage body; fails when it holds no table.
    pub fn parse_content(html: &str) -> Result<Self, TableError> {
        Ok(Self {
            rows: scan(html)?,
            source: html.to_string(),
        })
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn first_cell(&self, row: usize) -> Result<&Cell, TableError> {
        self.rows
            .get(row)
            .ok_or_else(|| TableError::MissingRow(row.to_string()))?
            .cell
            .as_ref()
            .ok_or(TableError::MissingCell(row))
    }

    /// Text of the first cell in `row`: its text nodes, each trimmed, concatenated.
    pub fn find_data_in_cell(&self, row: usize) -> Result<String, TableError> {
        Ok(self.first_cell(row)?.text.clone())
    }

    /// Replaces the content of the single `<p>` in the first cell of `row`.
    pub fn update_cell(&mut self, row: usize, value: &str) -> Result<(), TableError> {
        let paragraph = {
            let cell = self.first_cell(row)?;
            if cell.paragraphs.len() != 1 {
                return Err(TableError::MalformedCell {
                    row,
                    paragraphs: cell.paragraphs.len(),
                });
            }
            cell.paragraphs[0].clone()
        };

        let escaped = partial_escape(value);
        let replacement = if paragraph.self_closing {
            if value.is_empty() {
                return Ok(());
            }
            let open = self.source[paragraph.span.clone()]
                .trim_end_matches('>')
                .trim_end_matches('/')
                .trim_end();
            format!("{}>{}</p>", open, escaped)
        } else {
            escaped.into_owned()
        };

        let mut content =
            String::with_capacity(self.source.len() + replacement.len());
        content.push_str(&self.source[..paragraph.span.start]);
        content.push_str(&replacement);
        content.push_str(&self.source[paragraph.span.end..]);
        *self = Self::parse_content(&content)?;
        Ok(())
    }

    /// Index of the row following the first row whose first cell reads `label`.
    pub fn row_after_label(&self, label: &str) -> Result<usize, TableError> {
        let label_row = self
            .rows
            .iter()
            .position(|r| r.heading.as_deref() == Some(label))
            .ok_or_else(|| TableError::MissingRow(format!("labelled '{}'", label)))?;
        let value_row = label_row + 1;
        if value_row >= self.rows.len() {
            return Err(TableError::MissingRow(format!("after label '{}'", label)));
        }
        Ok(value_row)
    }

    pub fn request_row(&self, layout: &TableLayout) -> Result<usize, TableError> {
        match layout {
            TableLayout::Positional { request_row, .. } => Ok(*request_row),
            TableLayout::Labeled { request_label, .. } => self.row_after_label(request_label),
        }
    }

    pub fn answer_row(&self, layout: &TableLayout) -> Result<usize, TableError> {
        match layout {
            TableLayout::Positional { answer_row, .. } => Ok(*answer_row),
            TableLayout::Labeled { answer_label, .. } => self.row_after_label(answer_label),
        }
    }

    /// The whole body, including any update.
    pub fn generate_content(&self) -> String {
        self.source.clone()
    }
}

/// Text capture for an open element: (row, element depth, text so far).
type Capture<T> = Option<(usize, usize, T)>;

fn push_text(text: &str, heading: &mut Capture<String>, cell: &mut Capture<Cell>) {
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    if let Some((_, _, h)) = heading.as_mut() {
        h.push_str(text);
    }
    if let Some((_, _, c)) = cell.as_mut() {
        c.text.push_str(text);
    }
}

/// Collects the rows of the first `<table>` with the byte spans of their
/// first cell's paragraphs.
fn scan(source: &str) -> Result<Vec<Row>, TableError> {
    let mut reader = Reader::from_str(source);
    reader.config_mut().check_end_names = false;

    let mut rows: Vec<Row> = Vec::new();
    let mut found = false;
    let mut table_depth = 0usize;
    let mut depth = 0usize;
    let mut open_rows: Vec<usize> = Vec::new();
    let mut heading: Capture<String> = None;
    let mut cell: Capture<Cell> = None;
    let mut open_paragraphs: Vec<(usize, usize)> = Vec::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| TableError::Unparseable(e.to_string()))?;
        let end = reader.buffer_position() as usize;
        match event {
            Event::Start(e) => {
                depth += 1;
                let name = e.name();
                if table_depth == 0 {
                    if name.as_ref() == b"table" {
                        found = true;
                        table_depth = 1;
                    }
                    continue;
                }
                match name.as_ref() {
                    b"table" => table_depth += 1,
                    b"tr" => {
                        rows.push(Row::default());
                        open_rows.push(rows.len() - 1);
                    }
                    tag @ (b"td" | b"th") => {
                        if let Some(&row) = open_rows.last() {
                            if heading.is_none() && rows[row].heading.is_none() {
                                heading = Some((row, depth, String::new()));
                            }
                            if tag == b"td" && cell.is_none() && rows[row].cell.is_none() {
                                cell = Some((row, depth, Cell::default()));
                            }
                        }
                    }
                    b"p" if cell.is_some() => open_paragraphs.push((end, depth)),
                    _ => {}
                }
            }
            Event::Empty(e) if table_depth > 0 => match e.name().as_ref() {
                b"tr" => rows.push(Row::default()),
                tag @ (b"td" | b"th") => {
                    if let Some(&row) = open_rows.last() {
                        if heading.is_none() && rows[row].heading.is_none() {
                            rows[row].heading = Some(String::new());
                        }
                        if tag == b"td" && cell.is_none() && rows[row].cell.is_none() {
                            rows[row].cell = Some(Cell::default());
                        }
                    }
                }
                b"p" => {
                    if let Some((_, _, c)) = cell.as_mut() {
                        let start = source[..end].rfind('<').unwrap_or(end);
                        c.paragraphs.push(Paragraph {
                            span: start..end,
                            self_closing: true,
                        });
                    }
                }
                _ => {}
            },
            Event::Text(t) if table_depth > 0 => {
                let text = match t.unescape() {
                    Ok(text) => text.into_owned(),
                    // Named HTML entities such as &nbsp; are not XML; keep them raw.
                    Err(_) => String::from_utf8_lossy(&t).into_owned(),
                };
                push_text(&text, &mut heading, &mut cell);
            }
            Event::CData(c) if table_depth > 0 => {
                push_text(&String::from_utf8_lossy(&c), &mut heading, &mut cell);
            }
            Event::End(e) => {
                if table_depth > 0 {
                    match e.name().as_ref() {
                        b"table" => table_depth -= 1,
                        b"tr" => {
                            open_rows.pop();
                        }
                        b"p" if open_paragraphs.last().map(|&(_, d)| d == depth) == Some(true) => {
                            if let (Some((start, _)), Some((_, _, c))) =
                                (open_paragraphs.pop(), cell.as_mut())
                            {
                                let close = source[..end].rfind("</").unwrap_or(end);
                                c.paragraphs.push(Paragraph {
                                    span: start..close,
                                    self_closing: false,
                                });
                            }
                        }
                        _ => {}
                    }
                    if matches!(heading, Some((_, d, _)) if d == depth) {
                        if let Some((row, _, text)) = heading.take() {
                            rows[row].heading = Some(text);
                        }
                    }
                    if matches!(cell, Some((_, d, _)) if d == depth) {
                        if let Some((row, _, c)) = cell.take() {
                            rows[row].cell = Some(c);
                        }
                    }
                    if table_depth == 0 {
                        break;
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !found {
        return Err(TableError::NoTable);
    }
    // Unclosed cells at the end of a truncated body still count.
    if let Some((row, _, text)) = heading {
        if rows[row].heading.is_none() {
            rows[row].heading = Some(text);
        }
    }
    if let Some((row, _, c)) = cell {
        if rows[row].cell.is_none() {
            rows[row].cell = Some(c);
        }
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = "<h1>Bridge</h1>\
        <table><tbody>\
        <tr><th>Request</th></tr>\
        <tr><td><p>  AC-1 <strong>requirements</strong> </p></td><td>ignored</td></tr>\
        <tr><td><p>Answer</p></td></tr>\
        <tr><td><p>old answer</p></td></tr>\
        </tbody></table>";

    #[test]
    fn missing_table_is_an_error() {
        assert_eq!(
            PageTable::parse_content("<p>no table</p>").err(),
            Some(TableError::NoTable)
        );
    }

    #[test]
    fn reads_trimmed_text_of_first_cell() {
        let table = PageTable::parse_content(PAGE).unwrap();
        assert_eq!(table.row_count(), 4);
        assert_eq!(table.find_data_in_cell(1).unwrap(), "AC-1requirements");
        assert_eq!(table.find_data_in_cell(3).unwrap(), "old answer");
    }

    #[test]
    fn header_only_row_has_no_cell() {
        let table = PageTable::parse_content(PAGE).unwrap();
        assert_eq!(table.find_data_in_cell(0), Err(TableError::MissingCell(0)));
        assert!(matches!(
            table.find_data_in_cell(9),
            Err(TableError::MissingRow(_))
        ));
    }

    #[test]
    fn update_rewrites_paragraph_and_keeps_the_rest() {
        let mut table = PageTable::parse_content(PAGE).unwrap();
        table.update_cell(3, "new <answer> & more").unwrap();
        let html = table.generate_content();
        assert!(html.starts_with("<h1>Bridge</h1>"));
        assert!(html.contains("<p>new &lt;answer&gt; &amp; more</p>"));
        assert!(!html.contains("old answer"));

        let reparsed = PageTable::parse_content(&html).unwrap();
        assert_eq!(reparsed.find_data_in_cell(3).unwrap(), "new <answer> & more");
        assert_eq!(reparsed.find_data_in_cell(1).unwrap(), "AC-1requirements");
    }

    #[test]
    fn clearing_leaves_empty_paragraph() {
        let mut table = PageTable::parse_content(PAGE).unwrap();
        table.update_cell(3, "").unwrap();
        assert!(table.generate_content().contains("<td><p></p></td>"));
        assert_eq!(table.find_data_in_cell(3).unwrap(), "");
    }

    #[test]
    fn cell_without_single_paragraph_is_malformed() {
        let mut table =
            PageTable::parse_content("<table><tr><td>bare</td></tr><tr><td><p>a</p><p>b</p></td></tr></table>")
                .unwrap();
        assert_eq!(
            table.update_cell(0, "x"),
            Err(TableError::MalformedCell { row: 0, paragraphs: 0 })
        );
        assert_eq!(
            table.update_cell(1, "x"),
            Err(TableError::MalformedCell { row: 1, paragraphs: 2 })
        );
    }

    const STORAGE: &str = "<p>Intro<br />line</p>\
        <table><tbody>\
        <tr><th><p>Request</p></th></tr>\
        <tr><td><p>AC-1<br />requirements</p></td></tr>\
        <tr><th><p>Answer</p></th></tr>\
        <tr><td><p>old</p></td></tr>\
        <tr><td><ac:structured-macro ac:name=\"code\"><ac:plain-text-body>\
        <![CDATA[if a < b { x }]]></ac:plain-text-body></ac:structured-macro>\
        <p>owner <ac:link><ri:user ri:account-id=\"42\" /></ac:link></p></td></tr>\
        </tbody></table>";

    #[test]
    fn update_keeps_storage_markup_byte_for_byte() {
        let mut table = PageTable::parse_content(STORAGE).unwrap();
        assert_eq!(table.find_data_in_cell(1).unwrap(), "AC-1requirements");

        table.update_cell(3, "new answer").unwrap();
        assert_eq!(
            table.generate_content(),
            STORAGE.replacen("<p>old</p>", "<p>new answer</p>", 1)
        );

        table.update_cell(3, "").unwrap();
        assert_eq!(
            table.generate_content(),
            STORAGE.replacen("<p>old</p>", "<p></p>", 1)
        );
    }

    #[test]
    fn cdata_counts_as_cell_text() {
        let table = PageTable::parse_content(STORAGE).unwrap();
        assert_eq!(table.find_data_in_cell(4).unwrap(), "if a < b { x }owner");
    }

    #[test]
    fn self_closing_paragraph_is_opened_on_write() {
        let body = "<table><tr><td><p class=\"a\" /></td></tr></table>";
        let mut table = PageTable::parse_content(body).unwrap();
        assert_eq!(table.find_data_in_cell(0).unwrap(), "");

        table.update_cell(0, "").unwrap();
        assert_eq!(table.generate_content(), body);

        table.update_cell(0, "x & y").unwrap();
        assert_eq!(
            table.generate_content(),
            "<table><tr><td><p class=\"a\">x &amp; y</p></td></tr></table>"
        );
    }

    #[test]
    fn html_entities_are_read_raw() {
        let table =
            PageTable::parse_content("<table><tr><td><p>AC-1&nbsp;policy</p></td></tr></table>")
                .unwrap();
        assert_eq!(table.find_data_in_cell(0).unwrap(), "AC-1&nbsp;policy");
    }

    #[test]
    fn labeled_layout_resolves_rows() {
        let table = PageTable::parse_content(PAGE).unwrap();
        let layout = TableLayout::Labeled {
            request_label: "Request".into(),
            answer_label: "Answer".into(),
        };
        assert_eq!(table.request_row(&layout).unwrap(), 1);
        assert_eq!(table.answer_row(&layout).unwrap(), 3);

        let missing = TableLayout::Labeled {
            request_label: "Nope".into(),
            answer_label: "Answer".into(),
        };
        assert!(matches!(
            table.request_row(&missing),
            Err(TableError::MissingRow(_))
        ));
    }

    #[test]
    fn positional_layout_matches_defaults() {
        let layout = TableLayout::from(&LayoutConfig::default());
        let table = PageTable::parse_content(PAGE).unwrap();
        assert_eq!(table.request_row(&layout).unwrap(), 1);
        assert_eq!(table.answer_row(&layout).unwrap(), 3);
    }
}
