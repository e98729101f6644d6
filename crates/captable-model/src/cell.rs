/// A literal cell value.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum CellValue {
    #[default]
    Empty,
    Number(f64),
    String(String),
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::String(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::String(value)
    }
}

/// What a cell holds. Formula text is stored without the leading `=` and is
/// written without a cached result.
#[derive(Debug, Clone, PartialEq)]
pub enum CellContent {
    Value(CellValue),
    Formula(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub content: CellContent,
    /// Index into the workbook style table; `0` is the default style.
    pub style_id: u32,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            content: CellContent::Value(CellValue::Empty),
            style_id: 0,
        }
    }
}

impl Cell {
    pub fn formula_text(&self) -> Option<&str> {
        match &self.content {
            CellContent::Formula(text) => Some(text),
            CellContent::Value(_) => None,
        }
    }

    /// The literal value; formula cells read as empty.
    pub fn literal(&self) -> &CellValue {
        const EMPTY: &CellValue = &CellValue::Empty;
        match &self.content {
            CellContent::Value(value) => value,
            CellContent::Formula(_) => EMPTY,
        }
    }

    /// Neither content nor a style worth writing.
    pub fn is_blank(&self) -> bool {
        self.style_id == 0 && matches!(self.content, CellContent::Value(CellValue::Empty))
    }
}

/// Formula text without its leading `=` and surrounding whitespace.
pub(crate) fn strip_equals(text: &str) -> &str {
    let text = text.trim();
    text.strip_prefix('=').unwrap_or(text).trim_start()
}
