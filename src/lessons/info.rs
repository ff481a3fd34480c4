//! `LESSON_INFO.md`: the human-readable record kept inside every lesson folder

use std::sync::LazyLock;

use regex::Regex;

static SOURCE_REPOSITORY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^.*Source Repository.*?:[ \t]*(?:\*\*[ \t]*)?(\S.*?)[ \t]*\r?$")
        .expect("Failed to compile source repository regex")
});

static LAST_SYNCED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(.*Last Synced\*{0,2}:)[^\r\n]*")
        .expect("Failed to compile last synced regex")
});

/// Details written into a new info file
pub struct InfoFields<'a> {
    pub folder: &'a str,
    pub number: &'a str,
    pub source_repo: &'a str,
    pub date: &'a str,
    pub description: &'a str,
}

pub fn render<'a>(fields: &InfoFields<'_>, patterns: impl IntoIterator<Item = &'a str>) -> String {
    let mut out = format!("# {}\n\n", fields.folder);
    if !fields.description.is_empty() {
        out.push_str(fields.description);
        out.push_str("\n\n");
    }
    out.push_str("## Lesson Information\n");
    out.push_str(&format!("- **Lesson Number**: {}\n", fields.number));
    out.push_str(&format!("- **Source Repository**: {}\n", fields.source_repo));
    out.push_str(&format!("- **Added Date**: {}\n", fields.date));
    out.push_str(&format!("- **Last Synced**: {}\n", fields.date));
    out.push_str("\n## Preserved Files\n");
    out.push_str("Files matching these patterns are preserved during syncs:\n");
    for pattern in patterns {
        out.push_str(&format!("- `{pattern}`\n"));
    }
    out.push_str("\n## Usage\n");
    out.push_str("```bash\n");
    out.push_str("# Create your version\n");
    out.push_str("cp notebook.ipynb notebook.local.ipynb\n\n");
    out.push_str("# Sync updates\n");
    out.push_str(&format!("lessonsync sync {}\n", fields.folder));
    out.push_str("```\n");
    out
}

/// The upstream reference recorded on the `Source Repository` line
pub fn source_repository(text: &str) -> Option<String> {
    SOURCE_REPOSITORY
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim_matches('*').trim().to_string())
        .filter(|reference| !reference.is_empty())
}

/// Rewrite the first `Last Synced` line; `None` when the file has no such line
pub fn update_last_synced(text: &str, date: &str) -> Option<String> {
    if !LAST_SYNCED.is_match(text) {
        return None;
    }
    let replacement = format!("${{1}} {date}");
    Some(LAST_SYNCED.replacen(text, 1, replacement.as_str()).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> String {
        render(
            &InfoFields {
                folder: "lesson1_1_intro",
                number: "1_1",
                source_repo: "https://github.com/org/intro.git",
                date: "2025-03-01",
                description: "",
            },
            ["*.local.*", "custom-*/"],
        )
    }

    #[test]
    fn test_rendered_file_records_upstream_and_dates() {
        let text = sample();
        assert!(text.starts_with("# lesson1_1_intro\n"));
        assert!(text.contains("- **Source Repository**: https://github.com/org/intro.git\n"));
        assert!(text.contains("- **Last Synced**: 2025-03-01\n"));
        assert!(text.contains("- `custom-*/`\n"));
    }

    #[test]
    fn test_source_repository_is_read_back() {
        assert_eq!(
            source_repository(&sample()).as_deref(),
            Some("https://github.com/org/intro.git")
        );
        assert_eq!(
            source_repository("- Source Repository: git@host:org/x.git#v2\n").as_deref(),
            Some("git@host:org/x.git#v2")
        );
        assert_eq!(source_repository("# nothing here\n"), None);
    }

    #[test]
    fn test_only_the_last_synced_line_changes() {
        let before = sample();
        let after = update_last_synced(&before, "2025-04-02").unwrap();

        let changed: Vec<_> = before
            .lines()
            .zip(after.lines())
            .filter(|(old, new)| old != new)
            .collect();
        assert_eq!(changed, vec![("- **Last Synced**: 2025-03-01", "- **Last Synced**: 2025-04-02")]);
        assert_eq!(before.lines().count(), after.lines().count());
    }

    #[test]
    fn test_missing_last_synced_line() {
        assert_eq!(update_last_synced("# lesson\n", "2025-04-02"), None);
    }
}
