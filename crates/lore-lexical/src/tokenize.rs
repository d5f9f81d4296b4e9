/// Case-fold and split on whitespace.
///
/// Punctuation stays attached to its word, so `law.` and `law` are distinct
/// terms. Queries and documents go through the same function.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(String::from)
        .collect()
}
