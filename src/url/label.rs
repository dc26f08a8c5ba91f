//! Human-readable labels and file-system-safe names derived from URLs

use percent_encoding::percent_decode_str;
use url::Url;

/// Label used when a URL has no usable path segment
pub const UNTITLED_LABEL: &str = "Untitled Link";

/// Characters that are never allowed in a stored file or folder name
const FORBIDDEN_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Derives a placeholder label from the URL path
///
/// Takes the last non-empty path segment, drops its extension, turns `_` and
/// `-` into spaces and title-cases the words. Falls back to
/// [`UNTITLED_LABEL`].
///
/// # Examples
///
/// ```
/// use sumi_gather::url::placeholder_label;
/// use url::Url;
///
/// let url = Url::parse("https://example.com/files/annual_report-2023.pdf").unwrap();
/// assert_eq!(placeholder_label(&url), "Annual Report 2023");
/// ```
pub fn placeholder_label(url: &Url) -> String {
    let segment = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(|s| percent_decode_str(s).decode_utf8_lossy().into_owned());

    let Some(segment) = segment else {
        return UNTITLED_LABEL.to_string();
    };

    let stem = match segment.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => segment.as_str(),
    };

    let words: Vec<String> = stem
        .split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(title_case)
        .collect();

    if words.is_empty() {
        UNTITLED_LABEL.to_string()
    } else {
        words.join(" ")
    }
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// Collapses runs of whitespace and trims the result
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Makes a single path component safe to create on disk
///
/// Forbidden and control characters become `_`, surrounding whitespace and
/// dots are trimmed, and the result is capped at `max_chars` characters.
/// Returns `None` when nothing usable is left.
pub fn sanitize_component(name: &str, max_chars: usize) -> Option<String> {
    let replaced: String = name
        .chars()
        .map(|c| {
            if FORBIDDEN_CHARS.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    let trimmed = collapse_whitespace(&replaced);
    let trimmed = trimmed.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if trimmed.is_empty() {
        return None;
    }

    let capped: String = trimmed.chars().take(max_chars).collect();
    let capped = capped.trim_end_matches(|c: char| c == '.' || c.is_whitespace());
    if capped.is_empty() {
        None
    } else {
        Some(capped.to_string())
    }
}

/// Builds the stored file name for an artifact
///
/// The URL's extension is appended when the sanitized name does not already
/// end in it. The stem is shortened so the whole name fits in `max_chars`.
pub fn artifact_file_name(suggested: &str, extension: Option<&str>, max_chars: usize) -> String {
    let ext = extension.map(|e| e.trim_start_matches('.').to_lowercase());

    let mut stem = sanitize_component(suggested, usize::MAX)
        .unwrap_or_else(|| UNTITLED_LABEL.to_string());

    if let Some(ext) = &ext {
        let suffix = format!(".{}", ext);
        let cut = stem.len().saturating_sub(suffix.len());
        if stem.len() > suffix.len()
            && stem.is_char_boundary(cut)
            && stem[cut..].eq_ignore_ascii_case(&suffix)
        {
            stem.truncate(cut);
        }
    }

    let reserved = ext.as_ref().map_or(0, |e| e.chars().count() + 1);
    let stem_budget = max_chars.saturating_sub(reserved).max(1);
    let stem = sanitize_component(&stem, stem_budget).unwrap_or_else(|| "file".to_string());

    match ext {
        Some(ext) => format!("{}.{}", stem, ext),
        None => stem,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_placeholder_from_last_segment() {
        assert_eq!(
            placeholder_label(&url("https://x.org/notice/exam-schedule_spring")),
            "Exam Schedule Spring"
        );
    }

    #[test]
    fn test_placeholder_ignores_trailing_slash() {
        assert_eq!(placeholder_label(&url("https://x.org/news/list/")), "List");
    }

    #[test]
    fn test_placeholder_untitled() {
        assert_eq!(placeholder_label(&url("https://x.org/")), UNTITLED_LABEL);
        assert_eq!(placeholder_label(&url("https://x.org/___")), UNTITLED_LABEL);
    }

    #[test]
    fn test_placeholder_percent_decoded() {
        assert_eq!(
            placeholder_label(&url("https://x.org/files/%E9%80%9A%E7%9F%A5.pdf")),
            "通知"
        );
    }

    #[test]
    fn test_sanitize_component() {
        assert_eq!(
            sanitize_component("a<b>c:d\"e/f\\g|h?i*j", 100).unwrap(),
            "a_b_c_d_e_f_g_h_i_j"
        );
        assert_eq!(sanitize_component("  ..Report..  ", 100).unwrap(), "Report");
        assert_eq!(sanitize_component("tab\there", 100).unwrap(), "tab_here");
        assert!(sanitize_component(" . ", 100).is_none());
    }

    #[test]
    fn test_sanitize_component_caps_length() {
        let long = "x".repeat(300);
        assert_eq!(sanitize_component(&long, 100).unwrap().chars().count(), 100);
    }

    #[test]
    fn test_artifact_file_name_appends_extension() {
        assert_eq!(
            artifact_file_name("Annual Report", Some("pdf"), 100),
            "Annual Report.pdf"
        );
        assert_eq!(
            artifact_file_name("Annual Report.PDF", Some("pdf"), 100),
            "Annual Report.pdf"
        );
        assert_eq!(artifact_file_name("notes", None, 100), "notes");
    }

    #[test]
    fn test_artifact_file_name_keeps_extension_when_capped() {
        let name = artifact_file_name(&"y".repeat(200), Some("docx"), 100);
        assert_eq!(name.chars().count(), 100);
        assert!(name.ends_with(".docx"));
    }

    #[test]
    fn test_artifact_file_name_fallback() {
        assert_eq!(artifact_file_name("???", Some("zip"), 100), "___.zip");
        assert_eq!(artifact_file_name("  ", Some("zip"), 100), "Untitled Link.zip");
    }
}
