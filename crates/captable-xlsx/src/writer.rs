use std::collections::HashMap;
use std::io::{Seek, Write};
#[cfg(not(target_arch = "wasm32"))]
use std::path::Path;

use captable_model::{Cell, CellContent, CellRef, CellValue, Workbook, Worksheet};
use thiserror::Error;
use zip::ZipWriter;

use crate::styles::StylesPart;
use crate::tables::{table_xml, TABLE_CONTENT_TYPE, TABLE_REL_TYPE};

/// `calcId` written by current Excel builds.
const CALC_ID: u32 = 191029;

#[derive(Debug, Error)]
pub enum XlsxWriteError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("invalid workbook: {0}")]
    Invalid(String),
}

/// Write `workbook` to `path`.
///
/// The package is assembled in a temporary file next to `path` and only
/// moved into place once it is complete, so a failed write never leaves a
/// truncated file behind.
#[cfg(not(target_arch = "wasm32"))]
pub fn write_workbook(workbook: &Workbook, path: impl AsRef<Path>) -> Result<(), XlsxWriteError> {
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    write_workbook_to_writer(workbook, tmp.as_file_mut())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|err| XlsxWriteError::Io(err.error))?;
    log::debug!("wrote workbook to {}", path.display());
    Ok(())
}

/// Serialize the workbook into an in-memory `.xlsx` byte buffer.
pub fn write_workbook_to_vec(workbook: &Workbook) -> Result<Vec<u8>, XlsxWriteError> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    write_workbook_to_writer(workbook, &mut cursor)?;
    Ok(cursor.into_inner())
}

pub fn write_workbook_to_writer<W: Write + Seek>(
    workbook: &Workbook,
    writer: W,
) -> Result<(), XlsxWriteError> {
    let mut zip = ZipWriter::new(writer);
    // Fixed timestamps keep identical workbooks byte-identical.
    let options = zip::write::FileOptions::<()>::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default());

    let shared_strings = build_shared_strings(workbook);
    let styles_xml = StylesPart::new(&workbook.styles).to_xml();

    // Root relationships
    zip.start_file("_rels/.rels", options)?;
    zip.write_all(root_rels_xml().as_bytes())?;

    // Content types
    zip.start_file("[Content_Types].xml", options)?;
    zip.write_all(content_types_xml(workbook, &shared_strings).as_bytes())?;

    // Workbook
    zip.start_file("xl/workbook.xml", options)?;
    zip.write_all(workbook_xml(workbook).as_bytes())?;

    // Workbook relationships
    zip.start_file("xl/_rels/workbook.xml.rels", options)?;
    zip.write_all(workbook_rels_xml(workbook, !shared_strings.values.is_empty()).as_bytes())?;

    // Styles
    zip.start_file("xl/styles.xml", options)?;
    zip.write_all(styles_xml.as_bytes())?;

    // Shared strings
    if !shared_strings.values.is_empty() {
        zip.start_file("xl/sharedStrings.xml", options)?;
        zip.write_all(shared_strings_xml(&shared_strings).as_bytes())?;
    }

    // Tables are numbered globally and then referenced from sheets.
    let mut next_table_part = 1usize;
    let mut table_parts_by_sheet: Vec<Vec<(String, String)>> = Vec::new();

    for sheet in &workbook.sheets {
        let mut parts = Vec::new();
        for (table_idx, table) in sheet.tables.iter().enumerate() {
            let file_name = format!("table{next_table_part}.xml");
            next_table_part += 1;
            let part_path = format!("xl/tables/{file_name}");
            parts.push((format!("rId{}", table_idx + 1), format!("../tables/{file_name}")));

            zip.start_file(&part_path, options)?;
            zip.write_all(table_xml(table)?.as_bytes())?;
        }
        table_parts_by_sheet.push(parts);
    }

    // Worksheets + relationships
    for (idx, sheet) in workbook.sheets.iter().enumerate() {
        let sheet_number = idx + 1;
        let sheet_path = format!("xl/worksheets/sheet{sheet_number}.xml");
        zip.start_file(&sheet_path, options)?;
        zip.write_all(sheet_xml(sheet, &shared_strings, &table_parts_by_sheet[idx])?.as_bytes())?;

        if !table_parts_by_sheet[idx].is_empty() {
            let rels_path = format!("xl/worksheets/_rels/sheet{sheet_number}.xml.rels");
            zip.start_file(&rels_path, options)?;
            zip.write_all(sheet_rels_xml(&table_parts_by_sheet[idx]).as_bytes())?;
        }
    }

    zip.finish()?;
    log::debug!(
        "serialized {} sheets, {} tables, {} defined names",
        workbook.sheets.len(),
        next_table_part - 1,
        workbook.defined_names.len()
    );
    Ok(())
}

fn root_rels_xml() -> String {
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
</Relationships>"#
        .to_string()
}

fn workbook_xml(workbook: &Workbook) -> String {
    let mut sheets_xml = String::new();
    for (idx, sheet) in workbook.sheets.iter().enumerate() {
        let sheet_id = idx + 1;
        sheets_xml.push_str(&format!(
            r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
            escape_xml(&sheet.name),
            sheet_id,
            sheet_id
        ));
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
  <bookViews><workbookView activeTab="0"/></bookViews>
  <sheets>{}</sheets>
  {}
  {}
</workbook>"#,
        sheets_xml,
        workbook_defined_names_xml(workbook),
        calc_pr_xml(workbook)
    )
}

fn calc_pr_xml(workbook: &Workbook) -> String {
    if workbook.full_calc_on_load {
        format!(r#"<calcPr calcId="{CALC_ID}" fullCalcOnLoad="1"/>"#)
    } else {
        format!(r#"<calcPr calcId="{CALC_ID}"/>"#)
    }
}

fn workbook_defined_names_xml(workbook: &Workbook) -> String {
    if workbook.defined_names.is_empty() {
        return String::new();
    }
    // Excel keeps defined names sorted; so do we, for stable output.
    let mut names: Vec<_> = workbook.defined_names.iter().collect();
    names.sort_by_key(|n| n.name.to_ascii_uppercase());
    let body: String = names
        .into_iter()
        .map(|n| {
            format!(
                r#"<definedName name="{}">{}</definedName>"#,
                escape_xml(&n.name),
                escape_xml(&n.refers_to)
            )
        })
        .collect();
    format!("<definedNames>{body}</definedNames>")
}

fn workbook_rels_xml(workbook: &Workbook, has_shared_strings: bool) -> String {
    let mut rels = String::new();
    for (idx, _sheet) in workbook.sheets.iter().enumerate() {
        let rel_id = idx + 1;
        rels.push_str(&format!(
            r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{}.xml"/>"#,
            rel_id,
            rel_id
        ));
    }
    let mut next = workbook.sheets.len() + 1;
    if has_shared_strings {
        rels.push_str(&format!(
            r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/>"#,
            next
        ));
        next += 1;
    }
    rels.push_str(&format!(
        r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>"#,
        next
    ));

    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  {}
</Relationships>"#,
        rels
    )
}

fn sheet_rels_xml(table_parts: &[(String, String)]) -> String {
    let mut rels = String::new();
    for (id, target) in table_parts {
        rels.push_str(&format!(
            r#"<Relationship Id="{}" Type="{}" Target="{}"/>"#,
            escape_xml(id),
            TABLE_REL_TYPE,
            escape_xml(target)
        ));
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  {}
</Relationships>"#,
        rels
    )
}

fn sheet_xml(
    sheet: &Worksheet,
    shared_strings: &SharedStrings,
    table_parts: &[(String, String)],
) -> Result<String, XlsxWriteError> {
    // `iter_cells` is row-major, which is the order SpreadsheetML requires.
    let mut sheet_data = String::new();
    let mut current_row: Option<u32> = None;
    for (cell_ref, cell) in sheet.iter_cells() {
        if current_row != Some(cell_ref.row) {
            if current_row.is_some() {
                sheet_data.push_str("</row>");
            }
            sheet_data.push_str(&format!(r#"<row r="{}">"#, cell_ref.row + 1));
            current_row = Some(cell_ref.row);
        }
        sheet_data.push_str(&cell_xml(cell_ref, cell, shared_strings)?);
    }
    if current_row.is_some() {
        sheet_data.push_str("</row>");
    }

    let dimension = sheet
        .used_range()
        .map(|r| r.to_string())
        .unwrap_or_else(|| "A1".to_string());

    let cols_xml = if sheet.col_widths.is_empty() {
        String::new()
    } else {
        let cols: String = sheet
            .col_widths
            .iter()
            .map(|(col, width)| {
                format!(
                    r#"<col min="{n}" max="{n}" width="{width}" customWidth="1"/>"#,
                    n = col + 1
                )
            })
            .collect();
        format!("<cols>{cols}</cols>")
    };

    let table_parts_xml = if table_parts.is_empty() {
        String::new()
    } else {
        let parts: String = table_parts
            .iter()
            .map(|(id, _target)| format!(r#"<tablePart r:id="{}"/>"#, escape_xml(id)))
            .collect();
        format!(
            r#"<tableParts count="{}">{}</tableParts>"#,
            table_parts.len(),
            parts
        )
    };

    let mut xml = String::new();
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    xml.push('\n');
    xml.push_str(r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#);
    xml.push('\n');
    xml.push_str(&format!("  <dimension ref=\"{dimension}\"/>\n"));
    if !cols_xml.is_empty() {
        xml.push_str("  ");
        xml.push_str(&cols_xml);
        xml.push('\n');
    }
    xml.push_str("  <sheetData>");
    xml.push_str(&sheet_data);
    xml.push_str("</sheetData>\n");
    if !table_parts_xml.is_empty() {
        xml.push_str("  ");
        xml.push_str(&table_parts_xml);
        xml.push('\n');
    }
    xml.push_str("</worksheet>");
    Ok(xml)
}

fn cell_xml(
    cell_ref: CellRef,
    cell: &Cell,
    shared_strings: &SharedStrings,
) -> Result<String, XlsxWriteError> {
    let at = cell_ref.to_a1();
    let style = if cell.style_id == 0 {
        String::new()
    } else {
        format!(r#" s="{}""#, cell.style_id)
    };
    let xml = match &cell.content {
        // No cached value: the consumer calculates on load.
        CellContent::Formula(text) => {
            format!(r#"<c r="{at}"{style}><f>{}</f></c>"#, escape_xml(text))
        }
        CellContent::Value(CellValue::Empty) => format!(r#"<c r="{at}"{style}/>"#),
        CellContent::Value(CellValue::Number(n)) => {
            if !n.is_finite() {
                return Err(XlsxWriteError::Invalid(format!("non-finite number in {at}")));
            }
            format!(r#"<c r="{at}"{style}><v>{n}</v></c>"#)
        }
        CellContent::Value(CellValue::String(text)) => {
            let idx = shared_strings.index.get(text).ok_or_else(|| {
                XlsxWriteError::Invalid(format!("no shared string for {at}"))
            })?;
            format!(r#"<c r="{at}"{style} t="s"><v>{idx}</v></c>"#)
        }
    };
    Ok(xml)
}

#[derive(Debug, Clone)]
struct SharedStrings {
    values: Vec<String>,
    index: HashMap<String, usize>,
}

fn build_shared_strings(workbook: &Workbook) -> SharedStrings {
    let mut values: Vec<String> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for sheet in &workbook.sheets {
        for (_cell_ref, cell) in sheet.iter_cells() {
            if let CellContent::Value(CellValue::String(s)) = &cell.content {
                if !index.contains_key(s) {
                    index.insert(s.clone(), values.len());
                    values.push(s.clone());
                }
            }
        }
    }

    SharedStrings { values, index }
}

fn shared_strings_xml(shared: &SharedStrings) -> String {
    let count = shared.values.len();
    let mut si = String::new();
    for v in &shared.values {
        let preserve = if v.starts_with(' ') || v.ends_with(' ') {
            r#" xml:space="preserve""#
        } else {
            ""
        };
        si.push_str(&format!(r#"<si><t{preserve}>{}</t></si>"#, escape_xml(v)));
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="{count}" uniqueCount="{count}">
  {si}
</sst>"#
    )
}

fn content_types_xml(workbook: &Workbook, shared_strings: &SharedStrings) -> String {
    let mut overrides = String::new();
    overrides.push_str(
        r#"<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#,
    );
    overrides.push_str(
        r#"<Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>"#,
    );
    if !shared_strings.values.is_empty() {
        overrides.push_str(
            r#"<Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/>"#,
        );
    }
    for idx in 0..workbook.sheets.len() {
        let sheet_number = idx + 1;
        overrides.push_str(&format!(
            r#"<Override PartName="/xl/worksheets/sheet{sheet_number}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#
        ));
    }

    let table_count: usize = workbook.sheets.iter().map(|s| s.tables.len()).sum();
    for n in 1..=table_count {
        overrides.push_str(&format!(
            r#"<Override PartName="/xl/tables/table{n}.xml" ContentType="{TABLE_CONTENT_TYPE}"/>"#
        ));
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="xml" ContentType="application/xml"/>
  {}
</Types>"#,
        overrides
    )
}

pub(crate) fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn no_strings() -> SharedStrings {
        SharedStrings {
            values: Vec::new(),
            index: HashMap::new(),
        }
    }

    #[test]
    fn calc_pr_requests_full_calc_on_load() {
        let mut wb = Workbook::new();
        assert_eq!(calc_pr_xml(&wb), r#"<calcPr calcId="191029"/>"#);
        wb.full_calc_on_load = true;
        assert_eq!(
            calc_pr_xml(&wb),
            r#"<calcPr calcId="191029" fullCalcOnLoad="1"/>"#
        );
    }

    #[test]
    fn formula_cells_have_no_cached_value() {
        let cell = Cell {
            content: CellContent::Formula("IFERROR(a/b,0)".to_string()),
            style_id: 4,
        };
        let xml = cell_xml(CellRef::new(0, 1), &cell, &no_strings()).unwrap();
        assert_eq!(xml, r#"<c r="B1" s="4"><f>IFERROR(a/b,0)</f></c>"#);
    }

    #[test]
    fn styled_blank_cells_keep_their_style() {
        let cell = Cell {
            style_id: 2,
            ..Cell::default()
        };
        let xml = cell_xml(CellRef::new(3, 0), &cell, &no_strings()).unwrap();
        assert_eq!(xml, r#"<c r="A4" s="2"/>"#);
    }

    #[test]
    fn rejects_non_finite_numbers() {
        let cell = Cell {
            content: CellContent::Value(CellValue::Number(f64::NAN)),
            style_id: 0,
        };
        assert!(matches!(
            cell_xml(CellRef::new(0, 0), &cell, &no_strings()),
            Err(XlsxWriteError::Invalid(_))
        ));
    }
}
