//! Reads the `IDEA:` / `EXPLANATION:` lines out of a free-text model reply.

use serde::{Deserialize, Serialize};

const IDEA_TAG: &str = "IDEA:";
const EXPLANATION_TAG: &str = "EXPLANATION:";
/// Fallback idea length when the reply carries no `IDEA:` line.
pub const FALLBACK_IDEA_LENGTH: usize = 200;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedIdea {
    pub idea: String,
    pub explanation: String,
}

/// Parse a reply line by line.
///
/// Tags are matched at the start of a trimmed line; a later line with the
/// same tag replaces an earlier one. Without a usable `IDEA:` line the idea
/// is the first [`FALLBACK_IDEA_LENGTH`] characters of the trimmed reply.
pub fn parse_idea_reply(reply: &str) -> ParsedIdea {
    let mut parsed = ParsedIdea::default();

    for line in reply.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix(IDEA_TAG) {
            parsed.idea = rest.trim().to_string();
        } else if let Some(rest) = line.strip_prefix(EXPLANATION_TAG) {
            parsed.explanation = rest.trim().to_string();
        }
    }

    if parsed.idea.is_empty() {
        parsed.idea = reply.trim().chars().take(FALLBACK_IDEA_LENGTH).collect();
    }

    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_both_tags() {
        let reply = "IDEA: Build a Django admin for scraped data\n\
                     EXPLANATION: Combines two tools you already use.";
        let parsed = parse_idea_reply(reply);

        assert_eq!(parsed.idea, "Build a Django admin for scraped data");
        assert_eq!(parsed.explanation, "Combines two tools you already use.");
    }

    #[test]
    fn tolerates_surrounding_text_and_indentation() {
        let reply = "Sure, here's one.\n\n   IDEA:   Graph-backed notes  \n\n\
                     EXPLANATION: Links things.\nThanks!";
        let parsed = parse_idea_reply(reply);

        assert_eq!(parsed.idea, "Graph-backed notes");
        assert_eq!(parsed.explanation, "Links things.");
    }

    #[test]
    fn later_tags_replace_earlier_ones() {
        let reply = "IDEA: first\nIDEA: second\nEXPLANATION: one\nEXPLANATION: two";
        let parsed = parse_idea_reply(reply);

        assert_eq!(parsed.idea, "second");
        assert_eq!(parsed.explanation, "two");
    }

    #[test]
    fn falls_back_to_reply_prefix() {
        let reply = format!("  {}  ", "x".repeat(300));
        let parsed = parse_idea_reply(&reply);

        assert_eq!(parsed.idea.chars().count(), FALLBACK_IDEA_LENGTH);
        assert!(parsed.explanation.is_empty());
    }

    #[test]
    fn empty_idea_tag_also_falls_back() {
        let parsed = parse_idea_reply("IDEA:\nEXPLANATION: something");
        assert_eq!(parsed.idea, "IDEA:\nEXPLANATION: something");
        assert_eq!(parsed.explanation, "something");
    }

    #[test]
    fn tags_are_case_sensitive_and_anchored() {
        let parsed = parse_idea_reply("My IDEA: not a tag\nidea: lowercase");
        assert_eq!(parsed.idea, "My IDEA: not a tag\nidea: lowercase");
    }

    #[test]
    fn empty_reply_gives_empty_idea() {
        assert_eq!(parse_idea_reply("   "), ParsedIdea::default());
    }

    #[test]
    fn fallback_counts_characters_not_bytes() {
        let reply = "é".repeat(250);
        assert_eq!(parse_idea_reply(&reply).idea.chars().count(), 200);
    }
}
