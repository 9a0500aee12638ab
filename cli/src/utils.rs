use chrono::{DateTime, Utc};
use std::sync::OnceLock;

/// Normalize a user-supplied name into a resource-safe slug
///
/// Lowercase, every run of non-alphanumeric characters collapsed into
/// a single underscore. The same slug names every cloud resource of
/// the project, so it has to be stable across invocations.
pub fn slugify(text: &str) -> String {
    static NON_ALNUM: OnceLock<regex::Regex> = OnceLock::new();

    let re = NON_ALNUM.get_or_init(|| regex::Regex::new(r"[^a-z0-9]+").unwrap());

    re.replace_all(&text.to_lowercase(), "_")
        .trim_matches('_')
        .to_string()
}

/// Render a CloudWatch millisecond timestamp as a readable UTC date
pub fn millis_to_date(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| millis.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_special_characters() {
        assert_eq!(slugify("My Cool Project!"), "my_cool_project");
        assert_eq!(slugify("--already--slugged--"), "already_slugged");
        assert_eq!(slugify("CamelCase123"), "camelcase123");
    }

    #[test]
    fn slugify_is_stable() {
        let once = slugify("Data Cruncher #2");
        assert_eq!(slugify(&once), once);
    }

    #[test]
    fn millis_render_utc() {
        assert_eq!(millis_to_date(0), "1970-01-01 00:00:00 UTC");
    }
}
