/// Checks if a subject matches a wildcard expression
///
/// The expression must match the whole subject:
/// - `*` matches any run of characters, including none
/// - `?` matches exactly one character
/// - every other character matches itself
///
/// A blank expression is a universal match.
///
/// # Arguments
///
/// * `expression` - The wildcard expression
/// * `subject` - The text to test
/// * `ignore_case` - Compare characters case-insensitively
///
/// # Examples
///
/// ```
/// use tidemark::filter::matches_wildcard;
///
/// assert!(matches_wildcard("http://example.com/*", "http://example.com/docs/a.html", false));
/// assert!(matches_wildcard("*.PDF", "report.pdf", true));
/// assert!(!matches_wildcard("*.pdf", "report.pdf.html", false));
/// assert!(matches_wildcard("", "anything", false));
/// ```
pub fn matches_wildcard(expression: &str, subject: &str, ignore_case: bool) -> bool {
    if expression.trim().is_empty() {
        return true;
    }

    let pattern: Vec<char> = expression.chars().collect();
    let text: Vec<char> = subject.chars().collect();
    let same = |a: char, b: char| {
        if ignore_case {
            a.to_lowercase().eq(b.to_lowercase())
        } else {
            a == b
        }
    };

    // Greedy matching with backtracking to the last star
    let (mut p, mut t) = (0, 0);
    let mut star: Option<usize> = None;
    let mut star_text = 0;

    while t < text.len() {
        let single = p < pattern.len()
            && (pattern[p] == '?' || (pattern[p] != '*' && same(pattern[p], text[t])));

        if single {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some(p);
            star_text = t;
            p += 1;
        } else if let Some(star_pos) = star {
            p = star_pos + 1;
            star_text += 1;
            t = star_text;
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }

    p == pattern.len()
}
