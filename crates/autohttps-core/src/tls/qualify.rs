// Certificate subject eligibility checks

use std::net::IpAddr;

const SPECIAL_CHARS: &[char] = &[
    '(', ')', '[', ']', '{', '}', '<', '>', '\\', '"', '\'', '!', '@', '#', '$', '%', '^', '&',
    '|', ';', '+', '=', ',', '`', '~', '?',
];

const INTERNAL_SUFFIXES: &[&str] = &[
    ".localhost",
    ".local",
    ".internal",
    ".home.arpa",
    ".test",
    ".example",
    ".invalid",
];

/// Returns true if `subject` is syntactically usable as a certificate subject, regardless of
/// who could issue it. At most one wildcard is allowed, and only as the full left-most label.
pub fn subject_qualifies_for_cert(subject: &str) -> bool {
    let subject = subject.to_lowercase();

    if subject.trim().is_empty() {
        return false;
    }

    if subject.starts_with('.') || subject.ends_with('.') {
        return false;
    }

    if subject.contains(char::is_whitespace) || subject.contains(SPECIAL_CHARS) {
        return false;
    }

    if subject.contains('*') && (subject.matches('*').count() > 1 || !subject.starts_with("*.")) {
        return false;
    }

    // empty labels, e.g. `a..b`
    !subject.split('.').any(str::is_empty)
}

/// Returns true if `subject` could be issued a certificate by a public CA
pub fn subject_qualifies_for_public_cert(subject: &str) -> bool {
    if !subject_qualifies_for_cert(subject) {
        return false;
    }

    if subject_is_ip(subject) || subject_is_internal(subject) {
        return false;
    }

    // a wildcard must cover a registrable name, e.g. `*.example.com` but not `*.*.com`
    subject.matches("*.").count() < 2
}

/// Returns true if `subject` is an IP address literal
pub fn subject_is_ip(subject: &str) -> bool {
    let trimmed = subject.trim_start_matches('[').trim_end_matches(']');
    // strip an IPv6 zone, e.g. `fe80::1%eth0`
    let without_zone = trimmed.split('%').next().unwrap_or(trimmed);
    without_zone.parse::<IpAddr>().is_ok()
}

/// Returns true if `subject` names a host that can never be publicly resolvable
pub fn subject_is_internal(subject: &str) -> bool {
    let subject = subject.to_lowercase();
    subject == "localhost"
        || INTERNAL_SUFFIXES
            .iter()
            .any(|suffix| subject.ends_with(suffix))
}

/// Returns true for wildcards directly below a top-level domain, e.g. `*.com`, which most
/// clients refuse to trust
pub fn is_second_level_wildcard(subject: &str) -> bool {
    subject.contains('*') && subject.trim_matches('.').matches('.').count() == 1
}

/// Returns true if `subject` is matched by `pattern`, where a `*` label in the pattern
/// matches exactly one label of the subject
pub fn match_wildcard(subject: &str, pattern: &str) -> bool {
    let subject = subject.to_lowercase();
    let pattern = pattern.to_lowercase();

    if subject == pattern {
        return true;
    }

    if !pattern.contains('*') {
        return false;
    }

    let subject_labels: Vec<&str> = subject.split('.').collect();
    let pattern_labels: Vec<&str> = pattern.split('.').collect();
    if subject_labels.len() != pattern_labels.len() {
        return false;
    }

    subject_labels
        .iter()
        .zip(pattern_labels.iter())
        .all(|(s, p)| *p == "*" || s == p)
}
