//! Row lookup and header remapping.
//!
//! Turns one row of the `Master` sheet into the flat field set that the
//! report template expects. Column headers are positional: header `i`
//! names the value in cell `i` of every data row.

use indexmap::IndexMap;
use lazy_static::lazy_static;
use serde_json::Value;
use std::collections::HashMap;
use std::error::Error as StdError;
use std::future::Future;
use thiserror::Error;

/// Canonical field name to cell value, in header order.
pub type FieldMap = IndexMap<String, Value>;

/// Boxed cause carried by [`LookupError::Upstream`].
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Header renames applied after normalization.
///
/// The keys are the normalized spreadsheet headers, the values are the field
/// names used inside the report template.
pub const RENAME_PAIRS: &[(&str, &str)] = &[
    ("HaseÜberaktivität", "HaseHYP"),
    ("HaseLabilität", "HaseLAB"),
    ("HaseReagibilität", "HaseREAL"),
    ("HaseDesorgnisiertheit", "HaseDesorganisiertheit"),
    ("HaseImpulsivität", "HaseIMP"),
    ("GAD7", "GAD"),
    ("MiniSPIN", "SPIN"),
    ("AQK", "AQ"),
    ("MDQA", "MDQ1"),
    ("MDQB", "MDQ2"),
    ("BSLscore", "BSLsumme"),
    ("BSLprozentrang", "BSLprozent"),
    ("PIDt1", "PIDA"),
    ("PIDt2", "PIDB"),
    ("PIDt3", "PIDC"),
    ("PIDt4", "PIDD"),
    ("PIDt5", "PIDF"),
];

lazy_static! {
    static ref STANDARD_RENAMES: RenameTable = RenameTable::from_pairs(RENAME_PAIRS);
}

#[derive(Error, Debug)]
pub enum LookupError {
    #[error("Code '{0}' not found in spreadsheet")]
    CodeNotFound(String),

    #[error("row {row} has {values} values but the header row only has {headers} columns")]
    RowShape {
        row: usize,
        values: usize,
        headers: usize,
    },

    #[error("failed to read row {row}")]
    Upstream {
        row: usize,
        #[source]
        source: BoxError,
    },
}

/// Fixed mapping from normalized header to canonical field name.
#[derive(Debug, Clone, Default)]
pub struct RenameTable {
    entries: HashMap<String, String>,
}

impl RenameTable {
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        RenameTable {
            entries: pairs
                .iter()
                .map(|(from, to)| (from.to_string(), to.to_string()))
                .collect(),
        }
    }

    /// The production table shared by every caller.
    pub fn standard() -> &'static RenameTable {
        &STANDARD_RENAMES
    }

    pub fn get(&self, normalized: &str) -> Option<&str> {
        self.entries.get(normalized).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Strip every `-` and ` ` from a header cell. Nothing else is touched.
pub fn normalize_header(raw: &str) -> String {
    raw.chars().filter(|c| *c != '-' && *c != ' ').collect()
}

/// Rename a normalized header through the standard table, falling back to
/// the input unchanged.
pub fn rename_header(normalized: &str) -> String {
    RowMapper::standard().rename(normalized)
}

/// 1-based spreadsheet row of the first cell equal to `code`.
///
/// The code column is read from row 1, so index 0 is the header cell and a
/// match at index `i` lives in sheet row `i + 1`.
pub fn find_row_index<S: AsRef<str>>(code_column: &[S], code: &str) -> Option<usize> {
    code_column
        .iter()
        .position(|value| value.as_ref() == code)
        .map(|index| index + 1)
}

/// Maps spreadsheet rows onto template fields using a [`RenameTable`].
#[derive(Debug, Clone, Copy)]
pub struct RowMapper<'t> {
    renames: &'t RenameTable,
}

impl RowMapper<'static> {
    pub fn standard() -> Self {
        RowMapper::new(RenameTable::standard())
    }
}

impl Default for RowMapper<'static> {
    fn default() -> Self {
        RowMapper::standard()
    }
}

impl<'t> RowMapper<'t> {
    pub fn new(renames: &'t RenameTable) -> Self {
        RowMapper { renames }
    }

    pub fn rename(&self, normalized: &str) -> String {
        match self.renames.get(normalized) {
            Some(canonical) => canonical.to_string(),
            None => normalized.to_string(),
        }
    }

    pub fn canonical_name(&self, raw: &str) -> String {
        self.rename(&normalize_header(raw))
    }

    /// Pair each header with the value at the same position.
    ///
    /// A row shorter than the header row yields `null` for the trailing
    /// fields, since the Sheets API drops empty cells at the end of a row.
    /// A row longer than the header row has values with no name and is
    /// rejected. When two headers end up with the same canonical name the
    /// later column wins.
    pub fn build_field_map<S: AsRef<str>>(
        &self,
        header_row: &[S],
        data_row: &[Value],
    ) -> Result<FieldMap, LookupError> {
        if data_row.len() > header_row.len() {
            return Err(LookupError::RowShape {
                row: 0,
                values: data_row.len(),
                headers: header_row.len(),
            });
        }

        let mut fields = FieldMap::with_capacity(header_row.len());
        for (index, header) in header_row.iter().enumerate() {
            let value = data_row.get(index).cloned().unwrap_or(Value::Null);
            fields.insert(self.canonical_name(header.as_ref()), value);
        }
        Ok(fields)
    }

    /// Locate `code`, fetch its row through `fetch_row` and build the field map.
    ///
    /// `fetch_row` receives the 1-based sheet row and is only called once the
    /// code has been found.
    pub async fn generate_field_map_for_code<S, F, Fut, E>(
        &self,
        code: &str,
        header_row: &[S],
        code_column: &[S],
        fetch_row: F,
    ) -> Result<FieldMap, LookupError>
    where
        S: AsRef<str>,
        F: FnOnce(usize) -> Fut,
        Fut: Future<Output = Result<Vec<Value>, E>>,
        E: Into<BoxError>,
    {
        let row = find_row_index(code_column, code)
            .ok_or_else(|| LookupError::CodeNotFound(code.to_string()))?;

        log::debug!("code '{}' found in row {}", code, row);

        let data_row = fetch_row(row).await.map_err(|e| LookupError::Upstream {
            row,
            source: e.into(),
        })?;

        self.build_field_map(header_row, &data_row)
            .map_err(|err| match err {
                LookupError::RowShape { values, headers, .. } => LookupError::RowShape {
                    row,
                    values,
                    headers,
                },
                other => other,
            })
    }
}
