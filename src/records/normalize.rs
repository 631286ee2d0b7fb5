/// Longest username accepted as a record key.
pub const MAX_KEY_LEN: usize = 30;

/// Path segments that look like usernames but are site sections.
pub const RESERVED_KEYS: &[&str] = &[
    "explore", "accounts", "reels", "stories", "tv", "direct", "reel",
];

const TRAILING_PUNCTUATION: &[char] = &[
    '.', ',', ';', ':', '!', '?', '\'', '"', '(', ')', '[', ']', '{', '}',
];

/// Cleans a raw username into a record key, or rejects it.
///
/// Case is preserved. Surrounding whitespace, leading `@` and trailing
/// punctuation are stripped before validation.
pub fn normalize(raw: &str) -> Option<String> {
    let mut candidate = raw.trim().trim_start_matches('@');
    loop {
        let stripped = candidate
            .trim_end_matches(TRAILING_PUNCTUATION)
            .trim_end();
        if stripped.len() == candidate.len() {
            break;
        }
        candidate = stripped;
    }
    let candidate = candidate.trim_start();

    if candidate.is_empty() || candidate.len() > MAX_KEY_LEN {
        return None;
    }
    if !candidate
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_')
    {
        return None;
    }
    if candidate.chars().all(|c| c == '.') {
        return None;
    }
    if candidate.starts_with(['.', '_']) || candidate.ends_with(['.', '_']) {
        return None;
    }
    let lowered = candidate.to_ascii_lowercase();
    if RESERVED_KEYS.contains(&lowered.as_str()) {
        return None;
    }
    Some(candidate.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_trailing_punctuation_and_whitespace() {
        assert_eq!(normalize("  alice.smith!) ").as_deref(), Some("alice.smith"));
        assert_eq!(normalize("bob,").as_deref(), Some("bob"));
        assert_eq!(normalize("carol\"'").as_deref(), Some("carol"));
        assert_eq!(normalize("@dave_99").as_deref(), Some("dave_99"));
    }

    #[test]
    fn preserves_case() {
        assert_eq!(normalize("MixedCase").as_deref(), Some("MixedCase"));
    }

    #[test]
    fn rejects_invalid_keys() {
        assert_eq!(normalize(""), None);
        assert_eq!(normalize("   "), None);
        assert_eq!(normalize("..."), None);
        assert_eq!(normalize("_hidden"), None);
        assert_eq!(normalize("trailing_"), None);
        assert_eq!(normalize(".dot"), None);
        assert_eq!(normalize("has space"), None);
        assert_eq!(normalize("emoji🙂"), None);
        assert_eq!(normalize("hyphen-ated"), None);
        assert_eq!(normalize(&"a".repeat(31)), None);
        assert!(normalize(&"a".repeat(30)).is_some());
    }

    #[test]
    fn rejects_reserved_words_case_insensitively() {
        for word in RESERVED_KEYS {
            assert_eq!(normalize(word), None, "{word} should be reserved");
        }
        assert_eq!(normalize("Explore"), None);
        assert_eq!(normalize("REELS."), None);
        assert!(normalize("explorer").is_some());
    }

    #[test]
    fn normalization_is_idempotent() {
        let samples = [
            "alice", " alice. ", "@bob!!", "carol_x.", "a.b.c", "Zed?)", "x", "__",
            "name)]}", "tv", "ok.",
        ];
        for sample in samples {
            let once = normalize(sample);
            let twice = once.as_deref().and_then(normalize);
            assert_eq!(once, twice, "normalize not idempotent for {sample:?}");
        }
    }
}
