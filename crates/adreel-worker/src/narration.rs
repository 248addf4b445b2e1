//! Narration extraction from free-text segment annotations.
//!
//! Annotations mix spoken lines with production notes ("slow zoom on
//! product", "cut to logo"). The parser is deliberately conservative:
//! it only extracts text carrying an explicit narration signal, and
//! returns `None` otherwise so no voice track is synthesized for
//! note-only segments.

/// Labels that mark the rest of a line as spoken narration.
const NARRATION_PREFIXES: &[&str] = &["narration:", "voiceover:", "voice-over:", "vo:", "dialogue:"];

/// Extract the spoken narration from an annotation, if any.
///
/// Recognized signals, in priority order:
/// 1. Lines prefixed with a narration label (`Narration:`, `VO:`, ...)
/// 2. Double-quoted spans (straight or curly quotes)
///
/// Bracketed production notes (`[beat]`, `[pause]`) inside extracted
/// text are dropped. Everything else returns `None`.
pub fn extract_narration(annotation: &str) -> Option<String> {
    let annotation = annotation.trim();
    if annotation.is_empty() {
        return None;
    }

    let mut lines = Vec::new();
    for line in annotation.lines() {
        let line = line.trim();
        let lowered = line.to_lowercase();
        for prefix in NARRATION_PREFIXES {
            if lowered.starts_with(prefix) {
                let rest = line[prefix.len()..].trim();
                let rest = strip_quotes(rest);
                if !rest.is_empty() {
                    lines.push(rest.to_string());
                }
                break;
            }
        }
    }
    if !lines.is_empty() {
        return clean(&lines.join(" "));
    }

    let quoted = quoted_spans(annotation);
    if !quoted.is_empty() {
        return clean(&quoted.join(" "));
    }

    None
}

/// Collect the contents of all double-quoted spans, straight or curly.
fn quoted_spans(text: &str) -> Vec<String> {
    let mut spans = Vec::new();
    let mut current: Option<String> = None;
    for ch in text.chars() {
        match ch {
            '"' | '\u{201c}' | '\u{201d}' => match current.take() {
                Some(span) => {
                    let span = span.trim().to_string();
                    if !span.is_empty() {
                        spans.push(span);
                    }
                }
                None => current = Some(String::new()),
            },
            _ => {
                if let Some(span) = current.as_mut() {
                    span.push(ch);
                }
            }
        }
    }
    spans
}

fn strip_quotes(text: &str) -> &str {
    text.trim_matches(|c| c == '"' || c == '\u{201c}' || c == '\u{201d}')
        .trim()
}

/// Drop bracketed production notes and collapse the whitespace they leave.
fn clean(text: &str) -> Option<String> {
    let mut out = String::with_capacity(text.len());
    let mut depth = 0u32;
    for ch in text.chars() {
        match ch {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(ch),
            _ => {}
        }
    }
    let cleaned = out.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_annotation_yields_nothing() {
        assert_eq!(extract_narration(""), None);
        assert_eq!(extract_narration("   \n  "), None);
    }

    #[test]
    fn note_only_annotation_yields_nothing() {
        assert_eq!(
            extract_narration("Slow zoom on product. Cut to logo at the end."),
            None
        );
    }

    #[test]
    fn narration_prefix_is_extracted() {
        assert_eq!(
            extract_narration("Narration: Meet the only bottle you'll ever need."),
            Some("Meet the only bottle you'll ever need.".to_string())
        );
    }

    #[test]
    fn prefix_match_is_case_insensitive() {
        assert_eq!(
            extract_narration("VO: Fifty percent off today."),
            Some("Fifty percent off today.".to_string())
        );
        assert_eq!(
            extract_narration("voiceover: Order now."),
            Some("Order now.".to_string())
        );
    }

    #[test]
    fn multiple_prefixed_lines_are_joined() {
        let annotation = "Narration: First line.\nQuick cut to product.\nNarration: Second line.";
        assert_eq!(
            extract_narration(annotation),
            Some("First line. Second line.".to_string())
        );
    }

    #[test]
    fn quoted_span_is_extracted_when_no_prefix() {
        assert_eq!(
            extract_narration(r#"Host smiles and says "This changed my mornings" to camera."#),
            Some("This changed my mornings".to_string())
        );
    }

    #[test]
    fn curly_quotes_are_recognized() {
        assert_eq!(
            extract_narration("Host: \u{201c}Try it free\u{201d} over b-roll."),
            Some("Try it free".to_string())
        );
    }

    #[test]
    fn prefixed_line_beats_quoted_note() {
        let annotation = "Display the slogan \"Just Go\" on screen.\nVO: Adventure starts here.";
        assert_eq!(
            extract_narration(annotation),
            Some("Adventure starts here.".to_string())
        );
    }

    #[test]
    fn bracketed_notes_are_dropped() {
        assert_eq!(
            extract_narration("Narration: Welcome back. [beat] Let's dive in."),
            Some("Welcome back. Let's dive in.".to_string())
        );
    }

    #[test]
    fn quotes_around_prefixed_text_are_stripped() {
        assert_eq!(
            extract_narration(r#"Dialogue: "Where did you get that?""#),
            Some("Where did you get that?".to_string())
        );
    }

    #[test]
    fn prefix_with_empty_remainder_yields_nothing() {
        assert_eq!(extract_narration("Narration:"), None);
    }
}
