/// Character offset of the first case-insensitive occurrence of `needle`.
fn find_case_insensitive(haystack: &[char], needle: &str) -> Option<usize> {
    let fold = |c: char| c.to_lowercase().next().unwrap_or(c);
    let needle: Vec<char> = needle.chars().map(fold).collect();
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    (0..=haystack.len() - needle.len())
        .find(|&i| haystack[i..i + needle.len()].iter().zip(&needle).all(|(h, n)| fold(*h) == *n))
}

/// A window of at most `max_chars` characters of `content`, positioned around
/// the first occurrence of any of `raw_terms` (or the start of the text).
pub fn make_snippet(content: &str, raw_terms: &[String], max_chars: usize) -> String {
    let chars: Vec<char> = content.chars().collect();
    if chars.is_empty() || max_chars == 0 {
        return String::new();
    }
    if chars.len() <= max_chars {
        return content.to_string();
    }

    let hit = raw_terms
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .find_map(|t| find_case_insensitive(&chars, t));
    let start = match hit {
        Some(idx) => idx.saturating_sub(max_chars / 3).min(chars.len() - max_chars),
        None => 0,
    };
    let end = start + max_chars;

    let mut out = String::with_capacity(max_chars + 6);
    if start > 0 {
        out.push_str("...");
    }
    out.extend(&chars[start..end]);
    if end < chars.len() {
        out.push_str("...");
    }
    out
}

/// Wrap every case-insensitive occurrence of `terms` in `<em>` tags.
pub fn highlight(snippet: &str, terms: &[String]) -> String {
    let mut s = snippet.to_string();
    for t in terms {
        if t.trim().is_empty() { continue; }
        let Ok(pat) = regex::RegexBuilder::new(&regex::escape(t.trim()))
            .case_insensitive(true)
            .build()
        else {
            continue;
        };
        s = pat.replace_all(&s, |caps: &regex::Captures| format!("<em>{}</em>", &caps[0])).to_string();
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn short_content_is_returned_whole() {
        assert_eq!(make_snippet("fracture of left rib", &terms(&["rib"]), 100), "fracture of left rib");
        assert_eq!(make_snippet("", &terms(&["rib"]), 100), "");
    }

    #[test]
    fn window_moves_to_the_first_hit() {
        let content = format!("{}Fracture noted{}", "a".repeat(50), "b".repeat(50));
        let s = make_snippet(&content, &terms(&["fracture"]), 30);
        assert!(s.starts_with("..."));
        assert!(s.ends_with("..."));
        assert!(s.contains("Fracture noted"));
    }

    #[test]
    fn no_hit_falls_back_to_the_head() {
        let s = make_snippet(&"x".repeat(40), &terms(&["rib"]), 10);
        assert_eq!(s, format!("{}...", "x".repeat(10)));
    }

    #[test]
    fn multibyte_text_never_splits_a_char() {
        let content = "é".repeat(30) + "rib" + &"ü".repeat(30);
        let s = make_snippet(&content, &terms(&["RIB"]), 9);
        assert!(s.contains("rib"));
    }

    #[test]
    fn highlight_wraps_matches() {
        assert_eq!(highlight("Rib fracture, rib", &terms(&["rib"])), "<em>Rib</em> fracture, <em>rib</em>");
    }
}
