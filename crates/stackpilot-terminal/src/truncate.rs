//! Output truncation helpers.
//!
//! Job output can be arbitrarily large (a backup script listing every file it
//! copied). Middle-omission keeps both the start of the run and its final
//! result or error.

/// Default maximum characters before truncation kicks in (30 000).
pub const DEFAULT_MAX_CHARS: usize = 30_000;

/// Truncate `output` to at most `max_chars` characters using middle-omission.
///
/// ```text
/// <first max_chars/2 chars>
///
/// ... [OUTPUT TRUNCATED: N chars omitted] ...
///
/// <last max_chars/2 chars>
/// ```
///
/// The split is done on character boundaries, never inside a multi-byte
/// sequence.
pub fn truncate_output(output: &str, max_chars: usize) -> String {
    if output.len() <= max_chars {
        return output.to_owned();
    }

    let total = output.chars().count();
    if total <= max_chars {
        return output.to_owned();
    }

    let half = max_chars / 2;
    let head: String = output.chars().take(half).collect();
    let tail: String = output.chars().skip(total - half).collect();
    let omitted = total - 2 * half;

    format!("{head}\n\n... [OUTPUT TRUNCATED: {omitted} chars omitted] ...\n\n{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_input_returned_as_is() {
        assert_eq!(truncate_output("backup ok", DEFAULT_MAX_CHARS), "backup ok");
    }

    #[test]
    fn exact_boundary_is_not_truncated() {
        let s = "x".repeat(100);
        let result = truncate_output(&s, 100);
        assert_eq!(result, s);
    }

    #[test]
    fn keeps_head_and_tail() {
        let input = format!("{}{}{}", "A".repeat(50), "B".repeat(100), "C".repeat(50));
        let result = truncate_output(&input, 100);

        assert!(result.starts_with(&"A".repeat(50)));
        assert!(result.ends_with(&"C".repeat(50)));
        assert!(result.contains("100 chars omitted"));
        assert!(!result.contains('B'));
    }

    #[test]
    fn multibyte_chars_counted_not_bytes() {
        // 40 chars, 120 bytes: within a 50-char budget.
        let s = "€".repeat(40);
        assert_eq!(truncate_output(&s, 50), s);

        let long = "€".repeat(60);
        let result = truncate_output(&long, 50);
        assert!(result.contains("10 chars omitted"));
    }
}
