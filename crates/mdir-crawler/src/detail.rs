//! Member detail pages.
//!
//! The detail page is a table of tables: a row holding `<th>` opens a section,
//! the following rows fill it. A single-cell row makes the section plain text,
//! multi-cell rows add `sub key -> value` entries. When the first cell lists
//! several sub keys separated by line breaks, the remaining cells are expected
//! to hold as many values, otherwise the raw texts are kept as one entry.

use indexmap::IndexMap;
use lazy_static::lazy_static;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};

use crate::dom;

lazy_static! {
    static ref ROW: Selector = Selector::parse("tr").unwrap();
    static ref HEAD_CELL: Selector = Selector::parse("th").unwrap();
    static ref CELL: Selector = Selector::parse("td").unwrap();
}

pub type Details = IndexMap<String, DetailValue>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DetailValue {
    Text(String),
    Fields(IndexMap<String, String>),
}

pub fn parse_details(html: &str) -> Details {
    let document = Html::parse_document(html);
    let mut details = Details::new();
    let mut section = String::new();

    for row in document.select(&ROW) {
        let head_cells: Vec<_> = row.select(&HEAD_CELL).collect();
        if !head_cells.is_empty() {
            section = dom::joined_text(head_cells, "\n");
            details.insert(section.clone(), DetailValue::Fields(IndexMap::new()));
            continue;
        }

        let cells: Vec<_> = row.select(&CELL).collect();
        if dom::raw_text(cells.iter().copied()).is_empty() {
            continue;
        }

        if cells.len() == 1 {
            details.insert(
                section.clone(),
                DetailValue::Text(dom::text_with_breaks(cells[0], "\n")),
            );
            continue;
        }

        let sub_key = dom::text_with_breaks(cells[0], "\n");
        let cell_data = dom::joined_text(cells[1..].iter().copied(), "\n");

        let fields = match details
            .entry(section.clone())
            .or_insert_with(|| DetailValue::Fields(IndexMap::new()))
        {
            DetailValue::Fields(fields) => fields,
            DetailValue::Text(_) => {
                log::warn!("Skipping row {sub_key:?} of text section {section:?}");
                continue;
            }
        };
        split_fields(fields, sub_key, cell_data);
    }

    details
}

fn split_fields(fields: &mut IndexMap<String, String>, sub_key: String, cell_data: String) {
    let keys = lines(&sub_key);
    let values = lines(&cell_data);

    if keys.len() != values.len() {
        log::debug!("Line count mismatch for {sub_key:?}, keeping raw value");
        fields.insert(sub_key, cell_data);
        return;
    }

    for (k, v) in keys.into_iter().zip(values) {
        let k = k.trim();
        if k.is_empty() {
            continue;
        }
        fields.insert(k.to_string(), v.trim().to_string());
    }
}

/// Splits on runs of line breaks, the text is expected to be trimmed
fn lines(text: &str) -> Vec<&str> {
    text.split('\n').filter(|line| !line.is_empty()).collect()
}
