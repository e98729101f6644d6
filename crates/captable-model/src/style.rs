/// Cell formatting the generator uses: a number format, bold text and a
/// solid background fill.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Style {
    /// Excel format code, e.g. `#,##0` or `0.00%`.
    pub number_format: Option<String>,
    pub bold: bool,
    /// Background color as `0xAARRGGBB`.
    pub fill: Option<u32>,
}

impl Style {
    pub fn number_format(code: &str) -> Self {
        Self {
            number_format: Some(code.to_string()),
            ..Self::default()
        }
    }

    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    pub fn filled(mut self, argb: u32) -> Self {
        self.fill = Some(argb);
        self
    }
}

/// Deduplicated styles. Id `0` is always the default style, so it doubles as
/// the `s` attribute of a written cell.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleTable {
    styles: Vec<Style>,
}

impl Default for StyleTable {
    fn default() -> Self {
        Self {
            styles: vec![Style::default()],
        }
    }
}

impl StyleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of `style`, adding it on first use.
    pub fn intern(&mut self, style: Style) -> u32 {
        if let Some(id) = self.styles.iter().position(|s| *s == style) {
            return id as u32;
        }
        self.styles.push(style);
        (self.styles.len() - 1) as u32
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }

    /// Styles in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Style> {
        self.styles.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_stable() {
        let mut table = StyleTable::new();
        assert_eq!(table.intern(Style::default()), 0);
        let shares = table.intern(Style::number_format("#,##0"));
        let header = table.intern(Style::default().bold().filled(0xFFDD_EBF7));
        assert_eq!((shares, header), (1, 2));
        assert_eq!(table.intern(Style::number_format("#,##0")), shares);
        assert_eq!(table.intern(Style::default().bold()), 3);
        assert_eq!(table.len(), 4);
    }
}
