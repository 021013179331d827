/// Title given to conversations created from the "new conversation" action.
pub const DEFAULT_TITLE: &str = "新对话";
/// Title used when a send creates the conversation, and when no title can be derived.
pub const FALLBACK_TITLE: &str = "对话";

const DEFAULT_TITLES: [&str; 2] = [DEFAULT_TITLE, FALLBACK_TITLE];
const MAX_TITLE_CHARS: usize = 40;

/// Whether a title is still one of the untouched defaults.
pub fn is_default_title(title: &str) -> bool {
    DEFAULT_TITLES.contains(&title.trim())
}

/// Title derived from the first line of a user's message.
pub fn derive_title(text: &str) -> String {
    let first_line = text.split('\n').next().unwrap_or("").trim();

    if first_line.chars().count() > MAX_TITLE_CHARS {
        let head: String = first_line.chars().take(MAX_TITLE_CHARS).collect();
        format!("{}...", head.trim())
    } else if first_line.is_empty() {
        FALLBACK_TITLE.to_string()
    } else {
        first_line.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_first_line_is_truncated() {
        let text = "Hello world, how are you today please help me";
        assert_eq!(text.chars().count(), 46);
        assert_eq!(derive_title(text), "Hello world, how are you today please he...");
    }

    #[test]
    fn only_the_first_line_counts() {
        assert_eq!(derive_title("  Short question  \nmore detail"), "Short question");
    }

    #[test]
    fn exactly_forty_chars_is_kept() {
        let text = "a".repeat(40);
        assert_eq!(derive_title(&text), text);
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        let text = "长".repeat(45);
        assert_eq!(derive_title(&text), format!("{}...", "长".repeat(40)));
    }

    #[test]
    fn blank_first_line_falls_back() {
        assert_eq!(derive_title("\nsecond line"), FALLBACK_TITLE);
    }

    #[test]
    fn defaults_are_recognised_after_trimming() {
        assert!(is_default_title("新对话"));
        assert!(is_default_title(" 对话 "));
        assert!(!is_default_title("Trip Plan"));
    }
}
