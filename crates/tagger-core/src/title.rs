//! # Titles
//!
//! Word-wise truncation of merchant item titles into ledger descriptions.
//!
//! ```text
//! "Duracell AA Batteries, 24 Count (Pack of 2) - Long Lasting..."
//!        │  quantity 2, budget 30
//!        ▼
//! "2x Duracell AA Batteries, 24"      (whole words, no trailing symbols)
//! ```

/// Target length for itemized entry descriptions.
pub const ITEM_TITLE_LENGTH: usize = 88;

/// Total length available to a summary description.
pub const SUMMARY_TITLE_LENGTH: usize = 100;

const TRAILING_SYMBOLS: &str = ",.-([]{}\\/|~!@#$%^&*_+=`'\" ";

/// Truncates `title` to roughly `target_length` characters on word bounds.
///
/// A word is kept while half its length is below the remaining budget, so
/// a long final word may overshoot slightly. `prefix` (such as `"2x"`) is
/// prepended and counts against the budget.
///
/// ```rust
/// use tagger_core::title::truncate_title;
///
/// assert_eq!(truncate_title("Some great title [", 20, None), "Some great title");
/// assert_eq!(truncate_title("Some great title [", 20, Some("Amazon: ")), "Amazon: Some great");
/// ```
pub fn truncate_title(title: &str, target_length: usize, prefix: Option<&str>) -> String {
    truncate_to_budget(title, target_length as f64, prefix)
}

fn truncate_to_budget(title: &str, mut budget: f64, prefix: Option<&str>) -> String {
    let mut words: Vec<&str> = Vec::new();
    if let Some(prefix) = prefix {
        words.extend(prefix.split(' ').filter(|w| !w.is_empty()));
        budget -= prefix.chars().count() as f64;
    }

    for word in title.trim().split(' ') {
        let len = word.chars().count() as f64;
        if len / 2.0 < budget {
            words.push(word);
            budget -= len + 1.0;
        } else {
            break;
        }
    }

    let joined = words.join(" ");
    joined.trim_end_matches(|c| TRAILING_SYMBOLS.contains(c)).to_string()
}

/// Builds an item description: printable ASCII only, with an `Nx` quantity
/// prefix when more than one unit was bought.
pub fn item_title(title: &str, quantity: u32, target_length: usize) -> String {
    let clean: String = title
        .chars()
        .filter(|c| c.is_ascii_graphic() || c.is_ascii_whitespace())
        .collect();
    let prefix = (quantity > 1).then(|| format!("{}x", quantity));
    truncate_title(&clean, target_length, prefix.as_deref())
}

/// Joins several titles into one summary description after `prefix`.
///
/// Every title gets an equal share of the remaining length, less two
/// characters each for the `", "` separators.
pub fn summarize_titles(titles: &[&str], prefix: &str) -> String {
    if titles.is_empty() {
        return prefix.to_string();
    }
    let count = titles.len() as f64;
    let share =
        (SUMMARY_TITLE_LENGTH as f64 - prefix.chars().count() as f64 - 2.0 * count) / count;
    let parts: Vec<String> = titles
        .iter()
        .map(|t| truncate_to_budget(t, share, None))
        .collect();
    format!("{}{}", prefix, parts.join(", "))
}

/// Removes a leading `"3x "` quantity marker.
pub fn strip_quantity_prefix(title: &str) -> &str {
    let digits = title.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return title;
    }
    title[digits..].strip_prefix("x ").unwrap_or(title)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_title() {
        assert_eq!(truncate_title("Some great title [", 20, None), "Some great title");
        assert_eq!(truncate_title(" Some great title abc", 5, None), "Some");
        assert_eq!(truncate_title("S", 1, None), "S");
        assert_eq!(
            truncate_title("Some great title [", 20, Some("Amazon: ")),
            "Amazon: Some great"
        );
        assert_eq!(
            truncate_title("Some great title [", 20, Some("2x: ")),
            "2x: Some great title"
        );
    }

    #[test]
    fn test_item_title() {
        assert_eq!(item_title("The best item ever!", 2, 100), "2x The best item ever");
        assert_eq!(item_title("The best item ever!", 2, 10), "2x The best");
        assert_eq!(item_title("Something alright (]][", 1, 100), "Something alright");
        assert_eq!(item_title("Caf\u{e9} Mug\u{2122}", 1, 100), "Caf Mug");
    }

    #[test]
    fn test_summarize_titles() {
        let summary = summarize_titles(&["Duracell AAs", "USB Cable"], "Amazon.com: ");
        assert_eq!(summary, "Amazon.com: Duracell AAs, USB Cable");

        let long = "word ".repeat(40);
        let summary = summarize_titles(&[long.as_str(), long.as_str()], "P: ");
        assert!(summary.chars().count() <= SUMMARY_TITLE_LENGTH);
        assert!(summary.starts_with("P: word"));
    }

    #[test]
    fn test_strip_quantity_prefix() {
        assert_eq!(strip_quantity_prefix("3x duracell aas"), "duracell aas");
        assert_eq!(strip_quantity_prefix("12x cable"), "cable");
        assert_eq!(strip_quantity_prefix("duracell aas"), "duracell aas");
        assert_eq!(strip_quantity_prefix("3d printer"), "3d printer");
        assert_eq!(strip_quantity_prefix("3xl shirt"), "3xl shirt");
    }
}
