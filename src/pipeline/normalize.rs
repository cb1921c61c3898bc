//! Text normalisation ahead of pattern matching.
//!
//! Text layers come out of PDFs with every whitespace quirk imaginable:
//! non-breaking spaces between share-code triplets, tabs between a label
//! and its value, CRLF line endings, zero-width joiners from copy-paste.
//! The matchers want one shape: uppercase, single spaces, `\n` between
//! non-empty lines.
//!
//! Line boundaries are kept because a value printed on the line under its
//! label ("DATE OF BIRTH" / "13 AUG 92") is as strong a signal as one printed
//! right next to it.

/// Uppercased, whitespace-collapsed text plus the byte offset of each line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedText {
    text: String,
    line_starts: Vec<usize>,
}

impl NormalizedText {
    /// Normalise raw extracted text.
    ///
    /// 1. Drop invisible characters (zero-width spaces/joiners, BOM, soft hyphen)
    /// 2. Treat CR, CRLF and LF alike as line breaks
    /// 3. Map every other whitespace (NBSP, narrow NBSP, figure space, tab)
    ///    to a plain space and collapse runs within a line
    /// 4. Trim each line, drop empty ones, uppercase the rest
    pub fn new(raw: &str) -> Self {
        let mut text = String::with_capacity(raw.len());
        let mut line_starts = Vec::new();

        for line in raw.split(['\n', '\r']) {
            let cleaned = collapse_line(line);
            if cleaned.is_empty() {
                continue;
            }
            if !text.is_empty() {
                text.push('\n');
            }
            line_starts.push(text.len());
            text.push_str(&cleaned.to_uppercase());
        }

        Self { text, line_starts }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Zero-based line index containing byte `offset`.
    pub fn line_of(&self, offset: usize) -> usize {
        self.line_starts
            .partition_point(|&start| start <= offset)
            .saturating_sub(1)
    }

    /// Character (not byte) position of byte `offset`.
    ///
    /// Proximity thresholds are expressed in characters so that accented
    /// labels do not count double.
    pub fn char_offset(&self, offset: usize) -> usize {
        let end = offset.min(self.text.len());
        self.text
            .get(..end)
            .map(|prefix| prefix.chars().count())
            .unwrap_or(end)
    }
}

fn is_invisible(c: char) -> bool {
    matches!(
        c,
        '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}' | '\u{00AD}'
    )
}

fn collapse_line(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut pending_space = false;
    for c in line.chars() {
        if is_invisible(c) {
            continue;
        }
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.push(c);
    }
    out
}

/// Strip Latin diacritics from uppercase letters (`AOÛT` → `AOUT`).
///
/// Only the letters that occur in French and English month names and their
/// common accented variants are mapped; everything else passes through.
pub fn fold_diacritics(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' => 'A',
            'Ç' => 'C',
            'È' | 'É' | 'Ê' | 'Ë' => 'E',
            'Ì' | 'Í' | 'Î' | 'Ï' => 'I',
            'Ñ' => 'N',
            'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' => 'O',
            'Ù' | 'Ú' | 'Û' | 'Ü' => 'U',
            'Ý' | 'Ÿ' => 'Y',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_and_uppercases() {
        let n = NormalizedText::new("  Share\u{00A0}code:\t w7x\u{202F}4pk  9qr \r\n\r\n Date of birth ");
        assert_eq!(n.as_str(), "SHARE CODE: W7X 4PK 9QR\nDATE OF BIRTH");
        assert_eq!(n.line_count(), 2);
    }

    #[test]
    fn removes_invisible_characters() {
        let n = NormalizedText::new("\u{FEFF}W7X\u{200B}4PK\u{00AD}9QR");
        assert_eq!(n.as_str(), "W7X4PK9QR");
    }

    #[test]
    fn keeps_accented_letters() {
        let n = NormalizedText::new("13 août 1992");
        assert_eq!(n.as_str(), "13 AOÛT 1992");
    }

    #[test]
    fn line_lookup() {
        let n = NormalizedText::new("first\n\nsecond line\nthird");
        let text = n.as_str();
        assert_eq!(n.line_of(0), 0);
        assert_eq!(n.line_of(text.find("SECOND").unwrap()), 1);
        assert_eq!(n.line_of(text.find("LINE").unwrap()), 1);
        assert_eq!(n.line_of(text.find("THIRD").unwrap()), 2);
    }

    #[test]
    fn char_offset_counts_characters() {
        let n = NormalizedText::new("ÉÉ X");
        let byte = n.as_str().find('X').unwrap();
        assert_eq!(byte, 5);
        assert_eq!(n.char_offset(byte), 3);
    }

    #[test]
    fn empty_input() {
        let n = NormalizedText::new(" \n\t\r\n");
        assert!(n.is_empty());
        assert_eq!(n.line_count(), 0);
        assert_eq!(n.line_of(0), 0);
    }

    #[test]
    fn folds_french_month_accents() {
        assert_eq!(fold_diacritics("AOÛT"), "AOUT");
        assert_eq!(fold_diacritics("FÉVRIER"), "FEVRIER");
        assert_eq!(fold_diacritics("DÉC"), "DEC");
        assert_eq!(fold_diacritics("MAY"), "MAY");
    }
}
