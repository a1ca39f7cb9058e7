//! Width metrics for the two standard fonts the report uses.
//!
//! The PDF embeds Helvetica and Helvetica-Bold as standard Type1 fonts, so no
//! font program ships with the document, but wrapping text still needs real
//! advance widths. These tables are the AFM widths for ASCII 32..=126 in
//! units per mille of the font size.

/// Fonts available to the report renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Font {
    Helvetica,
    HelveticaBold,
}

impl Font {
    /// PostScript base font name for the PDF font dictionary.
    pub(crate) fn base_name(&self) -> &'static str {
        match self {
            Font::Helvetica => "Helvetica",
            Font::HelveticaBold => "Helvetica-Bold",
        }
    }

    /// Resource tag used in content streams.
    pub(crate) fn resource_tag(&self) -> &'static str {
        match self {
            Font::Helvetica => "F1",
            Font::HelveticaBold => "F2",
        }
    }
}

#[rustfmt::skip]
const HELVETICA_WIDTHS: [u16; 95] = [
    // space ! " # $ % & ' ( ) * + , - . /
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    // 0-9
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556,
    // : ; < = > ? @
    278, 278, 584, 584, 584, 556, 1015,
    // A-Z
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611,
    // [ \ ] ^ _ `
    278, 278, 278, 469, 556, 333,
    // a-z
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500,
    // { | } ~
    334, 260, 334, 584,
];

#[rustfmt::skip]
const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    // space ! " # $ % & ' ( ) * + , - . /
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    // 0-9
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556,
    // : ; < = > ? @
    333, 333, 584, 584, 584, 611, 975,
    // A-Z
    722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611,
    // [ \ ] ^ _ `
    333, 278, 333, 584, 556, 333,
    // a-z
    556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611,
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500,
    // { | } ~
    389, 280, 389, 584,
];

/// Advance width of one character in per-mille units. Characters outside the
/// table fall back to a typical lowercase width.
pub(crate) fn char_width(font: Font, c: char) -> u16 {
    let table = match font {
        Font::Helvetica => &HELVETICA_WIDTHS,
        Font::HelveticaBold => &HELVETICA_BOLD_WIDTHS,
    };
    let code = c as u32;
    if (32..=126).contains(&code) {
        table[(code - 32) as usize]
    } else {
        match font {
            Font::Helvetica => 556,
            Font::HelveticaBold => 611,
        }
    }
}

/// Width of a string at the given size, in PDF points.
pub(crate) fn text_width(font: Font, text: &str, size: f32) -> f32 {
    let milli: u32 = text.chars().map(|c| char_width(font, c) as u32).sum();
    milli as f32 / 1000.0 * size
}
