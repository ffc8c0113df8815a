use std::collections::HashSet;

/// Reduce scraped HTML to its text.
///
/// Uses ammonia's default builder with an empty tag allow-list, so every tag
/// is dropped, the text between tags is kept, and `<script>`/`<style>` bodies
/// are removed entirely. The output is entity-escaped, which is fine for comparison keys
/// but not meant for display.
pub fn strip_markup(input: &str) -> String {
    if !input.contains('<') {
        return input.to_string();
    }
    ammonia::Builder::default()
        .tags(HashSet::new())
        .clean(input)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_tags_keeps_text() {
        assert_eq!(strip_markup("<p>Hello <b>there</b></p>"), "Hello there");
    }

    #[test]
    fn plain_text_is_untouched() {
        assert_eq!(strip_markup("Congrats & well done"), "Congrats & well done");
    }
}
