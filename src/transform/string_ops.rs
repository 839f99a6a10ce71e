use std::borrow::Cow;

/// Returns a lowercase representation, reusing the original string if already lowercase.
pub fn lowercase(input: &str) -> Cow<'_, str> {
    if input.chars().all(|ch| !ch.is_uppercase()) {
        Cow::Borrowed(input)
    } else {
        Cow::Owned(input.to_lowercase())
    }
}

/// Title-cases each word: the first letter after a non-alphabetic character is
/// uppercased, every other letter lowercased. Digits and punctuation pass
/// through untouched, so `"1200 N MAIN ST."` becomes `"1200 N Main St."`.
pub fn title_case(input: &str) -> Cow<'_, str> {
    let mut out = String::with_capacity(input.len());
    let mut at_word_start = true;
    let mut changed = false;
    for ch in input.chars() {
        if ch.is_alphabetic() {
            let converted: Vec<char> = if at_word_start {
                ch.to_uppercase().collect()
            } else {
                ch.to_lowercase().collect()
            };
            if converted.len() != 1 || converted[0] != ch {
                changed = true;
            }
            out.extend(converted);
            at_word_start = false;
        } else {
            out.push(ch);
            at_word_start = true;
        }
    }
    if changed {
        Cow::Owned(out)
    } else {
        Cow::Borrowed(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_case_matches_word_boundaries() {
        assert_eq!(title_case("coast live oak"), "Coast Live Oak");
        assert_eq!(title_case("1200 N MAIN ST."), "1200 N Main St.");
        assert_eq!(title_case("o'neill way"), "O'Neill Way");
    }

    #[test]
    fn title_case_borrows_when_unchanged() {
        assert!(matches!(title_case("Main St"), Cow::Borrowed(_)));
    }

    #[test]
    fn lowercase_borrows_when_already_lower() {
        assert!(matches!(lowercase("quercus"), Cow::Borrowed(_)));
        assert_eq!(lowercase("Quercus Agrifolia"), "quercus agrifolia");
    }
}
