//! Table parts (`xl/tables/tableN.xml`).

use std::io::Cursor;

use captable_model::Table;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

pub(crate) const TABLE_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/table";
pub(crate) const TABLE_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.table+xml";

const NS_MAIN: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";

/// One table part: header-row table with an autofilter, its columns (with
/// any calculated column formula) and banded-row styling.
pub(crate) fn table_xml(table: &Table) -> Result<String, quick_xml::Error> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;

    let reference = table.range.to_string();
    let id = table.id.to_string();
    let mut root = BytesStart::new("table");
    root.push_attribute(("xmlns", NS_MAIN));
    root.push_attribute(("id", id.as_str()));
    root.push_attribute(("name", table.name.as_str()));
    root.push_attribute(("displayName", table.name.as_str()));
    root.push_attribute(("ref", reference.as_str()));
    root.push_attribute(("totalsRowShown", "0"));
    writer.write_event(Event::Start(root))?;

    let mut auto_filter = BytesStart::new("autoFilter");
    auto_filter.push_attribute(("ref", reference.as_str()));
    writer.write_event(Event::Empty(auto_filter))?;

    let count = table.columns.len().to_string();
    let mut columns = BytesStart::new("tableColumns");
    columns.push_attribute(("count", count.as_str()));
    writer.write_event(Event::Start(columns))?;
    for (idx, column) in table.columns.iter().enumerate() {
        let column_id = (idx + 1).to_string();
        let mut element = BytesStart::new("tableColumn");
        element.push_attribute(("id", column_id.as_str()));
        element.push_attribute(("name", column.name.as_str()));
        match &column.calculated_formula {
            None => writer.write_event(Event::Empty(element))?,
            Some(formula) => {
                writer.write_event(Event::Start(element))?;
                writer.write_event(Event::Start(BytesStart::new("calculatedColumnFormula")))?;
                writer.write_event(Event::Text(BytesText::new(formula)))?;
                writer.write_event(Event::End(BytesEnd::new("calculatedColumnFormula")))?;
                writer.write_event(Event::End(BytesEnd::new("tableColumn")))?;
            }
        }
    }
    writer.write_event(Event::End(BytesEnd::new("tableColumns")))?;

    let mut style = BytesStart::new("tableStyleInfo");
    style.push_attribute(("name", table.style_name.as_str()));
    style.push_attribute(("showFirstColumn", "0"));
    style.push_attribute(("showLastColumn", "0"));
    style.push_attribute(("showRowStripes", "1"));
    style.push_attribute(("showColumnStripes", "0"));
    writer.write_event(Event::Empty(style))?;

    writer.write_event(Event::End(BytesEnd::new("table")))?;
    let bytes = writer.into_inner().into_inner();
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use captable_model::CellRef;
    use pretty_assertions::assert_eq;

    #[test]
    fn writes_columns_and_calculated_formulas() {
        let headers = vec!["Holder".to_string(), "Shares".to_string(), "Ownership %".to_string()];
        let mut table = Table::new(
            "tblRound_Series_A",
            CellRef::new(14, 0),
            &headers,
            2,
            "TableStyleMedium2",
        )
        .unwrap();
        table.id = 3;
        table.columns[2].calculated_formula =
            Some("IFERROR(tblRound_Series_A[[#This Row],[Shares]]/Series_A_SharesIssued,0)".to_string());

        let xml = table_xml(&table).unwrap();
        let doc = roxmltree::Document::parse(&xml).unwrap();
        let root = doc.root_element();
        assert_eq!(root.tag_name().namespace(), Some(NS_MAIN));
        assert_eq!(root.attribute("id"), Some("3"));
        assert_eq!(root.attribute("ref"), Some("A15:C17"));
        assert_eq!(root.attribute("displayName"), Some("tblRound_Series_A"));

        let columns: Vec<(&str, Option<&str>)> = root
            .descendants()
            .filter(|n| n.has_tag_name((NS_MAIN, "tableColumn")))
            .map(|n| {
                let formula = n
                    .children()
                    .find(|c| c.has_tag_name((NS_MAIN, "calculatedColumnFormula")))
                    .and_then(|c| c.text());
                (n.attribute("name").unwrap_or_default(), formula)
            })
            .collect();
        assert_eq!(
            columns,
            vec![
                ("Holder", None),
                ("Shares", None),
                (
                    "Ownership %",
                    Some("IFERROR(tblRound_Series_A[[#This Row],[Shares]]/Series_A_SharesIssued,0)")
                ),
            ]
        );

        let style = root
            .descendants()
            .find(|n| n.has_tag_name((NS_MAIN, "tableStyleInfo")))
            .unwrap();
        assert_eq!(style.attribute("name"), Some("TableStyleMedium2"));
        assert_eq!(style.attribute("showRowStripes"), Some("1"));
    }
}
