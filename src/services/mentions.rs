use crate::models::member::Member;

/// Find `@Name` mentions of known members in free text.
///
/// Matching is case-insensitive and greedy: candidate names are tried longest
/// first so that "@Annabelle" never resolves to a member named "Ann". A match
/// only counts when the character after the name is absent or
/// non-alphanumeric. Returned ids are deduplicated, in order of first mention;
/// an `@` that matches nobody is ignored.
pub fn extract_mentions(text: &str, members: &[Member]) -> Vec<String> {
    if text.is_empty() || members.is_empty() {
        return Vec::new();
    }

    let mut sorted: Vec<&Member> = members.iter().collect();
    sorted.sort_by(|a, b| b.name.len().cmp(&a.name.len()));

    let mut mentioned: Vec<String> = Vec::new();

    for (at_pos, _) in text.match_indices('@') {
        let after_at = &text[at_pos + 1..];

        for member in &sorted {
            if !starts_with_ignore_case(after_at, &member.name) {
                continue;
            }
            let boundary = after_at[member.name.len()..].chars().next();
            if boundary.is_none_or(|c| !c.is_ascii_alphanumeric()) {
                if !mentioned.iter().any(|id| id == &member.id) {
                    mentioned.push(member.id.clone());
                }
                break;
            }
        }
    }

    mentioned
}

fn starts_with_ignore_case(haystack: &str, prefix: &str) -> bool {
    haystack.len() >= prefix.len()
        && haystack.is_char_boundary(prefix.len())
        && haystack[..prefix.len()].eq_ignore_ascii_case(prefix)
}
