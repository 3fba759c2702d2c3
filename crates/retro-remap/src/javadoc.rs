//! Javadoc comments built from mapping documentation.

/// Maximum width of a javadoc line, indentation and ` * ` included.
pub const JAVADOC_WIDTH: usize = 120;

/// Format `text` as a javadoc comment at `indent`, one entry per output line.
///
/// Literal `\n` sequences in `text` start new lines. Methods always get a block
/// comment; anything else stays on a single `/** ... */` line when it fits.
pub fn build_javadoc(indent: &str, text: &str, is_method: bool) -> Vec<String> {
    let width = JAVADOC_WIDTH.saturating_sub(indent.len() + 3);
    let lines: Vec<String> = text
        .split("\\n")
        .flat_map(|line| wrap_text(line, width))
        .collect();

    if lines.len() > 1 || is_method {
        let mut out = Vec::with_capacity(lines.len() + 2);
        out.push(format!("{indent}/**"));
        for line in lines {
            if line.is_empty() {
                out.push(format!("{indent} *"));
            } else {
                out.push(format!("{indent} * {line}"));
            }
        }
        out.push(format!("{indent} */"));
        out
    } else {
        vec![format!("{indent}/** {text} */")]
    }
}

/// Greedy word wrap that may break after a space, comma or hyphen.
///
/// A trailing space does not count against the width.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    if width == 0 || text.chars().count() <= width {
        return vec![text.to_owned()];
    }

    let mut lines = Vec::new();
    let mut line = String::new();
    let mut word = String::new();
    let flush = |line: &mut String, lines: &mut Vec<String>| {
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            lines.push(trimmed.to_owned());
        }
        line.clear();
    };

    for c in text.chars() {
        word.push(c);
        if !matches!(c, ' ' | ',' | '-') {
            continue;
        }
        let slack = usize::from(c == ' ');
        if line.chars().count() + word.chars().count() - slack > width {
            flush(&mut line, &mut lines);
        }
        line.push_str(&word);
        word.clear();
    }
    if !word.is_empty() {
        if line.chars().count() + word.chars().count() > width {
            flush(&mut line, &mut lines);
        }
        line.push_str(&word);
    }
    flush(&mut line, &mut lines);
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn methods_get_blocks() {
        assert_eq!(
            build_javadoc("    ", "Does the foo.", true),
            ["    /**", "     * Does the foo.", "     */"]
        );
    }

    #[test]
    fn short_field_docs_stay_on_one_line() {
        assert_eq!(
            build_javadoc("\t", "Current health.", false),
            ["\t/** Current health. */"]
        );
        assert_eq!(
            build_javadoc("", "First.\\nSecond.", false),
            ["/**", " * First.", " * Second.", " */"]
        );
    }

    #[test]
    fn wraps_on_break_characters() {
        assert_eq!(
            wrap_text("alpha beta gamma-delta,epsilon", 12),
            ["alpha beta", "gamma-delta,", "epsilon"]
        );
        assert_eq!(wrap_text("short", 12), ["short"]);
    }

    #[test]
    fn long_docs_respect_indented_width() {
        let text = "word ".repeat(60);
        let lines = build_javadoc("        ", text.trim_end(), false);
        assert!(lines.len() > 3);
        assert!(lines.iter().all(|l| l.chars().count() <= JAVADOC_WIDTH), "{lines:#?}");
    }
}
