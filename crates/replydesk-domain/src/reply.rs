//! Prompt assembly and draft post-processing.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

static EMAIL_ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\w.-]+@[\w.-]+\.\w+").expect("valid email address regex"));

/// Characters kept in a follow-up summary.
pub const SUMMARY_CHARS: usize = 200;

/// Build the single-turn drafting prompt.
///
/// `context` is the rendered retrieval block; when it is empty the whole
/// context section is left out.
pub fn build_prompt(context: &str, email: &str) -> String {
    let mut prompt = String::from(
        "You are an MFT/EDI support assistant. Use the following retrieved knowledge base context to draft a professional reply.\n\n",
    );
    if !context.trim().is_empty() {
        prompt.push_str("RETRIEVED CONTEXT (semantically matched to this query):\n");
        prompt.push_str(context);
        prompt.push_str("\n\n");
    }
    prompt.push_str("Now draft a professional reply to this new email:\n");
    prompt.push_str(email);
    prompt.push_str(
        "\n\nImportant: Follow approval rules strictly. If password reset is requested, mention JO approval is needed and CC the Job Owner.\n\n",
    );
    prompt.push_str(
        "Format the reply as a proper email with clear paragraph breaks. Do not merge everything into one paragraph.\n",
    );
    prompt.push_str("Do NOT include a Subject line in your reply. Start directly with the greeting.");
    prompt
}

/// Drop lines starting with `Subject:` (after trimming) and trim the result.
pub fn strip_subject_lines(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim().starts_with("Subject:"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Addresses found on `cc:` lines (any case).
///
/// Best-effort: only lines that begin with `cc:` are scanned, and anything
/// shaped like `local@domain.tld` on them is taken.
pub fn extract_cc(text: &str) -> BTreeSet<String> {
    text.lines()
        .filter(|line| line.trim().to_lowercase().starts_with("cc:"))
        .flat_map(|line| EMAIL_ADDRESS.find_iter(line).map(|m| m.as_str().to_string()))
        .collect()
}

/// Whitespace-collapsed prefix of a reply, for the follow-up record.
pub fn summarize(body: &str) -> String {
    let collapsed = body.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= SUMMARY_CHARS {
        return collapsed;
    }
    let mut summary: String = collapsed.chars().take(SUMMARY_CHARS).collect();
    summary.push_str("...");
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_with_context() {
        let prompt = build_prompt("[EMAIL | Source: past_emails | Confidence: 80.0%]\nQuery: a", "From: x\n\nhelp");
        assert!(prompt.starts_with("You are an MFT/EDI support assistant."));
        assert!(prompt.contains("RETRIEVED CONTEXT (semantically matched to this query):\n[EMAIL"));
        assert!(prompt.contains("Now draft a professional reply to this new email:\nFrom: x\n\nhelp"));
        assert!(prompt.contains("JO approval"));
        assert!(prompt.ends_with("Start directly with the greeting."));
    }

    #[test]
    fn test_prompt_without_context_omits_block() {
        let prompt = build_prompt("", "transfer failing partner XYZ");
        assert!(!prompt.contains("RETRIEVED CONTEXT"));
        assert!(prompt.contains("transfer failing partner XYZ"));
    }

    #[test]
    fn test_strip_subject_lines() {
        let draft = "Subject: Re: Transfer\n\nHi team,\n  Subject: again\nAll good.\n";
        assert_eq!(strip_subject_lines(draft), "Hi team,\nAll good.");
    }

    #[test]
    fn test_subject_match_is_case_sensitive() {
        assert_eq!(strip_subject_lines("subject: kept\nHi"), "subject: kept\nHi");
    }

    #[test]
    fn test_extract_cc_fixtures() {
        assert_eq!(
            extract_cc("Hi,\nCC: jo@example.com\nThanks"),
            BTreeSet::from(["jo@example.com".to_string()])
        );
        assert_eq!(
            extract_cc("  cc: a.b@corp.example, ops-team@corp.example.co\n"),
            BTreeSet::from([
                "a.b@corp.example".to_string(),
                "ops-team@corp.example.co".to_string()
            ])
        );
    }

    #[test]
    fn test_extract_cc_ignores_other_lines() {
        assert!(extract_cc("Contact jo@example.com for approval").is_empty());
        assert!(extract_cc("Please cc the job owner: jo@example.com").is_empty());
        assert!(extract_cc("CC: the Job Owner").is_empty());
    }

    #[test]
    fn test_summarize() {
        assert_eq!(summarize("Hi team,\n\n  done."), "Hi team, done.");
        let long = "word ".repeat(100);
        let summary = summarize(&long);
        assert!(summary.ends_with("..."));
        assert_eq!(summary.chars().count(), SUMMARY_CHARS + 3);
    }
}
