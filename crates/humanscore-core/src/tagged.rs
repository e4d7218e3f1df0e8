use regex::Regex;

/// Opening and closing delimiter for the `index`-th answer block.
pub fn section_tags(index: usize) -> (String, String) {
    (format!("<answer_{index}>"), format!("</answer_{index}>"))
}

/// Trimmed body of the first `<answer_{index}>…</answer_{index}>` block.
/// Tag matching ignores case; the body match is non-greedy.
pub fn extract_section(raw: &str, index: usize) -> Option<String> {
    let pattern = format!(r"(?is)<answer_{index}>(.*?)</answer_{index}>");
    let re = Regex::new(&pattern).ok()?;
    re.captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Sure, here you go.
<answer_1>
I would take the train, mostly for the view.
</answer_1>
<ANSWER_2>Blue.</Answer_2>
<answer_3></answer_3>
<answer_12>twelve</answer_12>";

    #[test]
    fn extracts_exact_inner_text() {
        assert_eq!(
            extract_section(SAMPLE, 1).as_deref(),
            Some("I would take the train, mostly for the view.")
        );
    }

    #[test]
    fn tag_match_is_case_insensitive() {
        assert_eq!(extract_section(SAMPLE, 2).as_deref(), Some("Blue."));
    }

    #[test]
    fn missing_tag_is_none() {
        assert_eq!(extract_section(SAMPLE, 4), None);
        assert_eq!(extract_section("<answer_5>unterminated", 5), None);
    }

    #[test]
    fn index_does_not_match_prefix_of_longer_index() {
        assert_eq!(extract_section(SAMPLE, 12).as_deref(), Some("twelve"));
        assert_eq!(extract_section("<answer_12>x</answer_12>", 1), None);
    }

    #[test]
    fn empty_block_is_present_but_empty() {
        assert_eq!(extract_section(SAMPLE, 3).as_deref(), Some(""));
    }

    #[test]
    fn non_greedy_takes_first_block() {
        let raw = "<answer_1>a</answer_1> junk <answer_1>b</answer_1>";
        assert_eq!(extract_section(raw, 1).as_deref(), Some("a"));
    }
}
