/*!
 * Prompt templates.
 *
 * Instruction templates are opaque strings with a `{text}` placeholder for
 * the source text. A `PromptLibrary` loads them from a tabular asset file
 * keyed by category ("prompt type") and source language column, the same
 * table layout translators already maintain in a spreadsheet.
 */

use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::dataset::reader::{self, DatasetFormat};
use crate::errors::DatasetError;

/// Placeholder substituted with the record's source text
pub const TEXT_PLACEHOLDER: &str = "{text}";

/// Fill the template's placeholder with the source text. A template
/// without the placeholder gets the text appended on its own line, so a
/// bare instruction still produces a usable prompt.
pub fn render(template: &str, source_text: &str) -> String {
    if template.contains(TEXT_PLACEHOLDER) {
        template.replace(TEXT_PLACEHOLDER, source_text)
    } else {
        format!("{}\n{}", template.trim_end(), source_text)
    }
}

static LEADING_ENUMERATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\d+[.)]\s*").expect("static regex"));

/// Strip the leading "1. " enumeration chat models like to echo, and trim
/// surrounding whitespace. The translation itself is left untouched.
pub fn tidy_response(text: &str) -> String {
    let trimmed = text.trim();
    LEADING_ENUMERATION.replace(trimmed, "").to_string()
}

/// Templates keyed by (category, source language)
#[derive(Debug, Clone, Default)]
pub struct PromptLibrary {
    templates: HashMap<(String, String), String>,
}

impl PromptLibrary {
    /// Load a prompt table: a `type` column plus one column per source
    /// language, each cell holding the full instruction template.
    pub fn load(path: &Path) -> Result<Self, DatasetError> {
        let table = read_table(path)?;
        let mut rows = table.into_iter();
        let header = rows
            .next()
            .ok_or_else(|| DatasetError::InputFormat("prompt file is empty".to_string()))?;

        let type_col = header
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case("type"))
            .ok_or_else(|| {
                DatasetError::InputFormat("prompt file is missing the 'type' column".to_string())
            })?;

        let mut templates = HashMap::new();
        for row in rows {
            let Some(category) = row.get(type_col).map(|c| c.trim().to_lowercase()) else {
                continue;
            };
            if category.is_empty() {
                continue;
            }
            for (col, language) in header.iter().enumerate() {
                if col == type_col {
                    continue;
                }
                let language = language.trim().to_lowercase();
                let Some(template) = row.get(col) else { continue };
                if language.is_empty() || template.trim().is_empty() {
                    continue;
                }
                templates.insert((category.clone(), language), template.trim().to_string());
            }
        }

        if templates.is_empty() {
            return Err(DatasetError::InputFormat(
                "prompt file contains no usable templates".to_string(),
            ));
        }
        Ok(Self { templates })
    }

    /// Template for a category and source language, if present
    pub fn get(&self, category: &str, language: &str) -> Option<&str> {
        self.templates
            .get(&(category.trim().to_lowercase(), language.trim().to_lowercase()))
            .map(|s| s.as_str())
    }

    /// Known categories, for operator-facing listings
    pub fn categories(&self) -> Vec<String> {
        let mut categories: Vec<String> = self
            .templates
            .keys()
            .map(|(category, _)| category.clone())
            .collect();
        categories.sort();
        categories.dedup();
        categories
    }
}

/// Read any supported tabular file into rows of strings
fn read_table(path: &Path) -> Result<Vec<Vec<String>>, DatasetError> {
    match DatasetFormat::detect(path)? {
        DatasetFormat::Csv => {
            let bytes = std::fs::read(path)?;
            let decoded = String::from_utf8_lossy(&bytes).into_owned();
            let mut csv_reader = csv::ReaderBuilder::new()
                .delimiter(DatasetFormat::delimiter(path))
                .has_headers(false)
                .flexible(true)
                .from_reader(decoded.as_bytes());
            let mut rows = Vec::new();
            for record in csv_reader.records() {
                let record = record
                    .map_err(|e| DatasetError::InputFormat(format!("prompt file: {}", e)))?;
                rows.push(record.iter().map(|s| s.to_string()).collect());
            }
            Ok(rows)
        }
        DatasetFormat::Xlsx => {
            use calamine::{open_workbook_auto, Reader};
            let mut workbook = open_workbook_auto(path)
                .map_err(|e| DatasetError::InputFormat(format!("prompt file: {}", e)))?;
            let range = workbook
                .worksheet_range_at(0)
                .ok_or_else(|| {
                    DatasetError::InputFormat("prompt file has no worksheets".to_string())
                })?
                .map_err(|e| DatasetError::InputFormat(format!("prompt file: {}", e)))?;
            Ok(range
                .rows()
                .map(|row| row.iter().map(reader::cell_to_string).collect())
                .collect())
        }
    }
}
