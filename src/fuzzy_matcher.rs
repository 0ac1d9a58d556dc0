use fuzzy_matcher::FuzzyMatcher;

/// Represents a match result with score and matched char positions
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub score: i64,
    pub indices: Vec<usize>,
}

/// FZF-style fuzzy matcher used for history search
pub struct FzfMatcher {
    matcher: fuzzy_matcher::skim::SkimMatcherV2,
}

impl FzfMatcher {
    pub fn new() -> Self {
        Self {
            matcher: fuzzy_matcher::skim::SkimMatcherV2::default().smart_case(),
        }
    }

    pub fn fuzzy_match(&self, pattern: &str, text: &str) -> Option<MatchResult> {
        self.matcher
            .fuzzy_indices(text, pattern)
            .map(|(score, indices)| MatchResult { score, indices })
    }

    /// Case-insensitive substring match, ranked above anything fuzzy.
    pub fn exact_match(&self, pattern: &str, text: &str) -> Option<MatchResult> {
        let lower_text = text.to_lowercase();
        let lower_pattern = pattern.to_lowercase();
        let byte_pos = lower_text.find(&lower_pattern)?;
        let start = lower_text[..byte_pos].chars().count();
        let len = lower_pattern.chars().count();
        let bonus = if byte_pos == 0 { 200 } else { 0 };
        Some(MatchResult {
            score: 1000 + bonus + (len * 10) as i64,
            indices: (start..start + len).collect(),
        })
    }

    /// Substring first, fuzzy as a fallback. An empty pattern matches everything.
    pub fn comprehensive_match(&self, pattern: &str, text: &str) -> Option<MatchResult> {
        if pattern.is_empty() {
            return Some(MatchResult {
                score: 0,
                indices: Vec::new(),
            });
        }
        self.exact_match(pattern, text)
            .or_else(|| self.fuzzy_match(pattern, text))
    }

    /// Match and sort multiple items, best first; ties prefer shorter text.
    pub fn match_and_sort<T>(&self, pattern: &str, items: Vec<(T, String)>) -> Vec<(T, String, MatchResult)> {
        let mut results: Vec<(T, String, MatchResult)> = items
            .into_iter()
            .filter_map(|(item, text)| {
                self.comprehensive_match(pattern, &text)
                    .map(|m| (item, text, m))
            })
            .collect();

        results.sort_by(|a, b| {
            b.2.score
                .cmp(&a.2.score)
                .then_with(|| a.1.len().cmp(&b.1.len()))
        });

        results
    }

    /// Wrap matched characters with `mark`.
    pub fn highlight_matches(&self, text: &str, indices: &[usize], mark: impl Fn(char) -> String) -> String {
        text.chars()
            .enumerate()
            .map(|(i, c)| {
                if indices.contains(&i) {
                    mark(c)
                } else {
                    c.to_string()
                }
            })
            .collect()
    }
}

impl Default for FzfMatcher {
    fn default() -> Self {
        Self::new()
    }
}
