//! `styles.xml`: one `cellXfs` record per style table entry, so a cell's
//! style id is its `s` attribute.

use std::fmt::Write as _;

use captable_model::StyleTable;

use crate::writer::escape_xml;

/// Custom number formats are numbered from here.
const FIRST_CUSTOM_NUM_FMT: u32 = 164;

fn builtin_num_fmt(code: &str) -> Option<u32> {
    Some(match code {
        "General" => 0,
        "0" => 1,
        "0.00" => 2,
        "#,##0" => 3,
        "#,##0.00" => 4,
        "0%" => 9,
        "0.00%" => 10,
        "mm-dd-yy" => 14,
        _ => return None,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Xf {
    num_fmt: u32,
    /// `0` regular, `1` bold.
    font: u32,
    fill: u32,
}

#[derive(Debug, Clone)]
pub(crate) struct StylesPart {
    custom_formats: Vec<String>,
    /// Solid fills after the two reserved slots.
    fills: Vec<u32>,
    xfs: Vec<Xf>,
}

impl StylesPart {
    pub(crate) fn new(styles: &StyleTable) -> Self {
        let mut custom_formats: Vec<String> = Vec::new();
        let mut fills: Vec<u32> = Vec::new();
        let mut xfs = Vec::with_capacity(styles.len());
        for style in styles.iter() {
            let num_fmt = match style.number_format.as_deref() {
                None => 0,
                Some(code) => builtin_num_fmt(code).unwrap_or_else(|| {
                    let slot = match custom_formats.iter().position(|c| c == code) {
                        Some(slot) => slot,
                        None => {
                            custom_formats.push(code.to_string());
                            custom_formats.len() - 1
                        }
                    };
                    FIRST_CUSTOM_NUM_FMT + slot as u32
                }),
            };
            let fill = match style.fill {
                None => 0,
                Some(argb) => {
                    let slot = match fills.iter().position(|f| *f == argb) {
                        Some(slot) => slot,
                        None => {
                            fills.push(argb);
                            fills.len() - 1
                        }
                    };
                    // `none` and `gray125` come first.
                    slot as u32 + 2
                }
            };
            xfs.push(Xf {
                num_fmt,
                font: u32::from(style.bold),
                fill,
            });
        }
        Self {
            custom_formats,
            fills,
            xfs,
        }
    }

    pub(crate) fn to_xml(&self) -> String {
        let mut out = String::from(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
             <styleSheet xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\">",
        );
        if !self.custom_formats.is_empty() {
            let _ = write!(out, r#"<numFmts count="{}">"#, self.custom_formats.len());
            for (slot, code) in self.custom_formats.iter().enumerate() {
                let _ = write!(
                    out,
                    r#"<numFmt numFmtId="{}" formatCode="{}"/>"#,
                    FIRST_CUSTOM_NUM_FMT + slot as u32,
                    escape_xml(code)
                );
            }
            out.push_str("</numFmts>");
        }

        let font = |bold: &str| {
            format!(
                r#"<font>{bold}<sz val="11"/><color theme="1"/><name val="Calibri"/><family val="2"/><scheme val="minor"/></font>"#
            )
        };
        let _ = write!(out, r#"<fonts count="2">{}{}</fonts>"#, font(""), font("<b/>"));

        let _ = write!(out, r#"<fills count="{}">"#, self.fills.len() + 2);
        out.push_str(r#"<fill><patternFill patternType="none"/></fill>"#);
        out.push_str(r#"<fill><patternFill patternType="gray125"/></fill>"#);
        for argb in &self.fills {
            let _ = write!(
                out,
                r#"<fill><patternFill patternType="solid"><fgColor rgb="{argb:08X}"/><bgColor indexed="64"/></patternFill></fill>"#
            );
        }
        out.push_str("</fills>");

        out.push_str(r#"<borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders>"#);
        out.push_str(r#"<cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>"#);

        let _ = write!(out, r#"<cellXfs count="{}">"#, self.xfs.len());
        for xf in &self.xfs {
            let _ = write!(
                out,
                r#"<xf numFmtId="{}" fontId="{}" fillId="{}" borderId="0" xfId="0""#,
                xf.num_fmt, xf.font, xf.fill
            );
            for (applies, attr) in [
                (xf.num_fmt != 0, "applyNumberFormat"),
                (xf.font != 0, "applyFont"),
                (xf.fill != 0, "applyFill"),
            ] {
                if applies {
                    let _ = write!(out, r#" {attr}="1""#);
                }
            }
            out.push_str("/>");
        }
        out.push_str("</cellXfs>");

        out.push_str(r#"<cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles>"#);
        out.push_str(r#"<dxfs count="0"/>"#);
        out.push_str(r#"<tableStyles count="0" defaultTableStyle="TableStyleMedium2" defaultPivotStyle="PivotStyleLight16"/>"#);
        out.push_str("</styleSheet>");
        out
    }
}
