//! Glyph width estimation by character class.
//!
//! No font programs are loaded, so widths are approximated from a small
//! lookup table expressed in em units. Boxes built from these widths can be
//! off by a few points for strongly proportional fonts.

/// Estimated advance of `c` in em units.
pub fn char_width(c: char) -> f64 {
    match c {
        'i' | 'j' | 'l' | 'I' | '1' | '.' | ',' | ';' | ':' | '!' | '\'' | '|' => 0.25,
        'f' | 't' | 'r' | '-' | ' ' | '(' | ')' => 0.35,
        'm' | 'w' | 'M' | 'W' | 'O' | 'Q' | '@' | '%' => 0.8,
        'A'..='Z' => 0.65,
        '0'..='9' => 0.55,
        _ => 0.52,
    }
}

/// Estimated width of `text` drawn at `font_size`.
pub fn estimate_width(text: &str, font_size: f64) -> f64 {
    estimate_chars(text.chars(), font_size)
}

pub fn estimate_chars(chars: impl IntoIterator<Item = char>, font_size: f64) -> f64 {
    chars.into_iter().map(char_width).sum::<f64>() * font_size
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_character_classes() {
        assert_eq!(char_width('i'), 0.25);
        assert_eq!(char_width(' '), 0.35);
        assert_eq!(char_width('W'), 0.8);
        assert_eq!(char_width('K'), 0.65);
        assert_eq!(char_width('7'), 0.55);
        assert_eq!(char_width('e'), 0.52);
        assert_eq!(char_width('é'), 0.52);
    }

    #[test]
    fn test_estimate_width() {
        let width = estimate_width("Hello Secret World", 12.0);
        assert!((width - 98.88).abs() < 1e-9);
        assert_eq!(estimate_width("", 12.0), 0.0);
    }
}
