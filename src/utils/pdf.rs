// PDF text and table extraction for policy documents.
// Parsing is delegated to `pdf-extract`; table detection is a layout heuristic over its output.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

use super::document_fetch::DocumentError;
use super::text::{clean_block, collapse_whitespace};

/// Gap between table cells in the raw page layout: a tab or two or more spaces.
static CELL_GAP: Lazy<Regex> = Lazy::new(|| Regex::new(r"\t+| {2,}").expect("valid cell gap regex"));

/// Minimum number of consecutive multi-cell lines treated as a table.
const MIN_TABLE_ROWS: usize = 2;

const PDF_SIGNATURE: &[u8] = b"%PDF-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Body,
    /// 1-based table index within its page
    Table(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextBlock {
    pub page: usize,
    pub kind: BlockKind,
    pub text: String,
}

impl TextBlock {
    pub fn marker(&self) -> String {
        match self.kind {
            BlockKind::Body => format!("[Page {}]", self.page),
            BlockKind::Table(n) => format!("[Page {} - Table {}]", self.page, n),
        }
    }
}

/// Ordered page/table blocks extracted from one document.
#[derive(Debug, Clone, Default)]
pub struct ExtractedText {
    blocks: Vec<TextBlock>,
}

impl ExtractedText {
    /// Builds the block list from raw per-page text, in page order.
    /// Fails with `EmptyContent` when no page yields any text.
    pub fn from_pages<I, S>(pages: I) -> Result<Self, DocumentError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut blocks = Vec::new();

        for (index, raw) in pages.into_iter().enumerate() {
            let page = index + 1;
            let raw = raw.as_ref();

            let body = clean_block(raw);
            if !body.is_empty() {
                blocks.push(TextBlock {
                    page,
                    kind: BlockKind::Body,
                    text: body,
                });
            }

            for (table_index, rows) in detect_tables(raw).into_iter().enumerate() {
                blocks.push(TextBlock {
                    page,
                    kind: BlockKind::Table(table_index + 1),
                    text: rows.join("\n"),
                });
            }
        }

        let extracted = Self { blocks };
        if extracted.render().trim().is_empty() {
            return Err(DocumentError::EmptyContent);
        }
        Ok(extracted)
    }

    pub fn page_count(&self) -> usize {
        self.blocks.iter().map(|b| b.page).max().unwrap_or(0)
    }

    pub fn table_count(&self) -> usize {
        self.blocks
            .iter()
            .filter(|b| matches!(b.kind, BlockKind::Table(_)))
            .count()
    }

    /// Renders every block behind its marker line.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ExtractedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, block) in self.blocks.iter().enumerate() {
            if i > 0 {
                f.write_str("\n\n")?;
            }
            write!(f, "{}\n{}", block.marker(), block.text)?;
        }
        Ok(())
    }
}

/// Splits a raw layout line into trimmed cells. Empty cells are kept so callers can
/// tell a fully empty row apart.
fn split_cells(line: &str) -> Vec<String> {
    CELL_GAP
        .split(line.trim())
        .map(collapse_whitespace)
        .collect()
}

/// Finds runs of consecutive multi-cell lines and renders each row as `a | b | c`.
fn detect_tables(raw: &str) -> Vec<Vec<String>> {
    let mut tables = Vec::new();
    let mut current: Vec<Vec<String>> = Vec::new();

    for line in raw.lines().filter(|l| !l.trim().is_empty()) {
        let cells = split_cells(line);
        if cells.len() >= 2 {
            current.push(cells);
        } else {
            flush_table(&mut current, &mut tables);
        }
    }
    flush_table(&mut current, &mut tables);

    tables
}

fn flush_table(current: &mut Vec<Vec<String>>, tables: &mut Vec<Vec<String>>) {
    if current.len() >= MIN_TABLE_ROWS {
        let rows = current
            .iter()
            .filter(|cells| cells.iter().any(|c| !c.is_empty()))
            .map(|cells| cells.join(" | "))
            .collect::<Vec<_>>();
        if !rows.is_empty() {
            tables.push(rows);
        }
    }
    current.clear();
}

/// Extracts raw text per page from a PDF held in memory.
/// Parser panics are caught and reported as parse errors.
pub fn extract_pages_from_mem(bytes: &[u8]) -> Result<Vec<String>, DocumentError> {
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(bytes)
    }));

    match result {
        Ok(Ok(pages)) => Ok(pages),
        Ok(Err(e)) => Err(DocumentError::Parse(e.to_string())),
        Err(_) => Err(DocumentError::Parse(
            "PDF parser aborted on malformed input".to_string(),
        )),
    }
}

/// A body counts as a PDF when the server labels it `application/pdf`
/// or its first bytes carry the `%PDF-` signature.
pub fn is_pdf(content_type: Option<&str>, head: &[u8]) -> bool {
    let labelled = content_type
        .is_some_and(|ct| ct.to_ascii_lowercase().contains("application/pdf"));
    labelled || head.starts_with(PDF_SIGNATURE)
}
