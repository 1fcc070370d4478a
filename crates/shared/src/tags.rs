//! `#tag` syntax helpers. Blinko parses tags out of the note body, so tags
//! must stay inside the content and sit on their own paragraph.

use std::{collections::BTreeSet, sync::LazyLock};

use regex::Regex;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#([^\s#]+)").expect("tag regex"));
static DEADLINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"~\S+").expect("deadline regex"));

/// Tags in order of first appearance, without the leading `#`.
pub fn extract_tags(text: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    TAG_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|tag| seen.insert(tag.clone()))
        .collect()
}

/// Removes tag tokens and collapses the remaining whitespace.
pub fn strip_tags(text: &str) -> String {
    collapse_whitespace(&TAG_RE.replace_all(text, ""))
}

/// Removes `~deadline` markers. Deadlines are accepted but not stored.
pub fn strip_deadlines(text: &str) -> String {
    collapse_whitespace(&DEADLINE_RE.replace_all(text, ""))
}

pub fn format_tags<S: AsRef<str>>(tags: &[S]) -> String {
    tags.iter()
        .map(|tag| format!("#{}", tag.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Appends every tag missing from `content` as a trailing paragraph.
pub fn ensure_tags_present<S: AsRef<str>>(content: &str, tags: &[S]) -> String {
    let present: BTreeSet<String> = extract_tags(content).into_iter().collect();
    let missing: BTreeSet<&str> = tags
        .iter()
        .map(AsRef::as_ref)
        .filter(|tag| !tag.is_empty() && !present.contains(*tag))
        .collect();

    if missing.is_empty() {
        return content.trim().to_string();
    }

    let missing: Vec<&str> = missing.into_iter().collect();
    format!("{}\n\n{}", content.trim(), format_tags(&missing))
        .trim()
        .to_string()
}

/// Splits the first line that mixes text and tags into `text`, a blank
/// line, and the tag run, which is the layout Blinko recognizes.
pub fn separate_trailing_tags(content: &str) -> String {
    let lines: Vec<&str> = content.split('\n').collect();

    for (index, line) in lines.iter().enumerate() {
        let Some(first_tag) = TAG_RE.find(line) else {
            continue;
        };
        let before = &line[..first_tag.start()];
        if before.trim().is_empty() {
            continue;
        }

        let mut rebuilt: Vec<&str> = Vec::with_capacity(lines.len() + 2);
        rebuilt.extend_from_slice(&lines[..index]);
        rebuilt.push(before.trim_end());
        rebuilt.push("");
        rebuilt.push(&line[first_tag.start()..]);
        rebuilt.extend_from_slice(&lines[index + 1..]);
        return rebuilt.join("\n");
    }

    content.to_string()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_unicode_tags_once_in_order() {
        assert_eq!(
            extract_tags("read #书 then #work, again #书 and #a#b"),
            vec!["书", "work,", "a", "b"]
        );
        assert!(extract_tags("no tags # here").is_empty());
    }

    #[test]
    fn strips_tags_and_deadlines() {
        assert_eq!(strip_tags("buy #home milk  #errand"), "buy milk");
        assert_eq!(strip_deadlines("file taxes ~2024-04-15 now"), "file taxes now");
    }

    #[test]
    fn appends_only_missing_tags_sorted() {
        let tags = ["work", "idea", "alpha"];
        assert_eq!(
            ensure_tags_present("plan #work", &tags),
            "plan #work\n\n#alpha #idea"
        );
        assert_eq!(ensure_tags_present("plan #work", &["work"]), "plan #work");
    }

    #[test]
    fn separates_first_inline_tag_run() {
        assert_eq!(
            separate_trailing_tags("first line\nsecond #a #b\nthird #c"),
            "first line\nsecond\n\n#a #b\nthird #c"
        );
        assert_eq!(separate_trailing_tags("#a leading\nplain"), "#a leading\nplain");
    }
}
