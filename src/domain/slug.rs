//! Deterministic URL segments derived from content names.
//!
//! ASCII text goes straight through the `slug` crate; Chinese characters are
//! transliterated with `pinyin` first so “关于我们” becomes `guan-yu-wo-men`
//! instead of vanishing.

use pinyin::{Pinyin, ToPinyin};
use slug::slugify;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlugError {
    #[error("segment source text is empty")]
    EmptyInput,
    #[error("`{input}` has no characters usable in a URL segment")]
    Unrepresentable { input: String },
}

/// Derive a URL segment from a human-readable name.
pub fn derive_segment(input: &str) -> Result<String, SlugError> {
    if input.trim().is_empty() {
        return Err(SlugError::EmptyInput);
    }

    let candidate = slugify(transliterate(input));
    if candidate.is_empty() {
        return Err(SlugError::Unrepresentable {
            input: input.to_string(),
        });
    }

    Ok(candidate)
}

/// Whether `segment` can be used verbatim as one path component.
pub fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.contains(['/', '\\'])
        && !segment.chars().any(char::is_control)
}

fn transliterate(input: &str) -> String {
    let mut output = String::with_capacity(input.len());

    for ch in input.chars() {
        if ch.is_ascii() {
            output.push(ch);
            continue;
        }

        match ch.to_pinyin() {
            Some(syllable) => push_syllable(&mut output, syllable),
            None if ch.is_whitespace() => output.push(' '),
            // slugify decides what survives.
            None => output.push(ch),
        }
    }

    output
}

fn push_syllable(buffer: &mut String, syllable: Pinyin) {
    if !buffer.is_empty() && !buffer.ends_with(' ') {
        buffer.push(' ');
    }
    buffer.push_str(syllable.plain());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_names_are_slugified() {
        assert_eq!(derive_segment("About Us!").unwrap(), "about-us");
    }

    #[test]
    fn chinese_names_are_transliterated() {
        assert_eq!(derive_segment("关于我们").unwrap(), "guan-yu-wo-men");
    }

    #[test]
    fn blank_names_are_rejected() {
        assert_eq!(derive_segment("   "), Err(SlugError::EmptyInput));
        assert!(matches!(
            derive_segment("!!!"),
            Err(SlugError::Unrepresentable { .. })
        ));
    }

    #[test]
    fn path_traversal_segments_are_unsafe() {
        assert!(is_safe_segment("news"));
        assert!(!is_safe_segment(".."));
        assert!(!is_safe_segment("a/b"));
        assert!(!is_safe_segment(""));
    }
}
