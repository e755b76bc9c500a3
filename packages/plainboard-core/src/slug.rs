/// Slugs and entity file names.
///
/// Task and agenda files are named `{id-lowercased}-{title-slug}.md`. The id
/// prefix is what lets the resolver find a file again after its title (and so
/// its slug) changed.
use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::layout::MARKDOWN_EXTENSION;

const MAX_SLUG_LEN: usize = 60;

static NON_SLUG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// ASCII, lower-case, dash-separated slug. Diacritics are folded away.
pub fn slugify(text: &str) -> String {
    let folded: String = text
        .nfkd()
        .filter(|c| c.is_ascii())
        .collect::<String>()
        .to_lowercase();
    let slug = NON_SLUG_RE.replace_all(&folded, "-");
    let slug = slug.trim_matches('-');
    if slug.len() <= MAX_SLUG_LEN {
        return slug.to_string();
    }
    slug[..MAX_SLUG_LEN].trim_end_matches('-').to_string()
}

/// Lower-cased id with path separators and leading dots neutralized, so the
/// result is always a plain name inside its parent directory.
pub fn sanitize_id(id: &str) -> String {
    let trimmed = id.trim();
    let dots = trimmed.len() - trimmed.trim_start_matches('.').len();
    let sanitized: String = "_".repeat(dots)
        + &trimmed[dots..]
            .to_lowercase()
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' => '_',
                c => c,
            })
            .collect::<String>();
    if sanitized.is_empty() {
        "_".to_string()
    } else {
        sanitized
    }
}

pub fn entity_file_name(id: &str, title: &str) -> String {
    let id = sanitize_id(id);
    let slug = slugify(title);
    if slug.is_empty() {
        format!("{}.{}", id, MARKDOWN_EXTENSION)
    } else {
        format!("{}-{}.{}", id, slug, MARKDOWN_EXTENSION)
    }
}

/// Best-effort title from a file stem when the front-matter has none.
pub fn title_from_stem(stem: &str, id: &str) -> String {
    let lower_id = sanitize_id(id);
    let rest = stem
        .to_lowercase()
        .strip_prefix(&lower_id)
        .map(|r| r.trim_start_matches('-').to_string())
        .unwrap_or_else(|| stem.to_string());
    rest.replace(['-', '_'], " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Buy groceries!"), "buy-groceries");
        assert_eq!(slugify("  Café au lait  "), "cafe-au-lait");
        assert_eq!(slugify("---"), "");
        assert_eq!(slugify("To Do"), "to-do");
    }

    #[test]
    fn test_slugify_truncates() {
        let long = "word ".repeat(40);
        let slug = slugify(&long);
        assert!(slug.len() <= MAX_SLUG_LEN);
        assert!(!slug.ends_with('-'));
    }

    #[test]
    fn test_entity_file_name() {
        assert_eq!(entity_file_name("MKA-1", "Fix login"), "mka-1-fix-login.md");
        assert_eq!(entity_file_name("MKA-2", "!!!"), "mka-2.md");
        assert_eq!(entity_file_name("a/b", "x"), "a_b-x.md");
    }

    #[test]
    fn test_sanitize_id_stays_inside_parent() {
        assert_eq!(sanitize_id("."), "_");
        assert_eq!(sanitize_id(".."), "__");
        assert_eq!(sanitize_id(".hidden"), "_hidden");
        assert_eq!(sanitize_id("  "), "_");
        assert_eq!(sanitize_id("../up"), "___up");
        assert_eq!(sanitize_id("MKA-1"), "mka-1");
        assert_eq!(entity_file_name(".x", "Title"), "_x-title.md");
    }

    #[test]
    fn test_title_from_stem() {
        assert_eq!(title_from_stem("mka-1-fix-login", "MKA-1"), "fix login");
        assert_eq!(title_from_stem("notes", "MKA-1"), "notes");
    }
}
