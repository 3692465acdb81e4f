use std::collections::HashSet;

/// Identifiers in `extracted` that are not in `existing`, in order of first
/// appearance. Repeats within `extracted` are reported once.
pub fn new_items(extracted: &[String], existing: &HashSet<String>) -> Vec<String> {
    let mut reported: HashSet<&str> = HashSet::new();
    extracted
        .iter()
        .filter(|item| !existing.contains(item.as_str()))
        .filter(|item| reported.insert(item.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn set(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn only_unseen_items_are_new() {
        let fresh = new_items(&strings(&["a", "b", "c"]), &set(&["a", "b"]));
        assert_eq!(fresh, strings(&["c"]));
    }

    #[test]
    fn nothing_new_when_all_seen() {
        assert!(new_items(&strings(&["a", "b"]), &set(&["a", "b", "z"])).is_empty());
    }

    #[test]
    fn order_of_extraction_is_kept() {
        let fresh = new_items(&strings(&["z", "b", "y", "a", "x"]), &set(&["b", "a"]));
        assert_eq!(fresh, strings(&["z", "y", "x"]));
    }

    #[test]
    fn empty_ledger_reports_everything() {
        let fresh = new_items(&strings(&["q", "p"]), &HashSet::new());
        assert_eq!(fresh, strings(&["q", "p"]));
    }

    #[test]
    fn repeated_items_are_reported_once_at_first_position() {
        let fresh = new_items(&strings(&["x", "a", "x", "y", "a"]), &set(&["a"]));
        assert_eq!(fresh, strings(&["x", "y"]));
    }

    #[test]
    fn comparison_is_exact() {
        let fresh = new_items(&strings(&["Item", "item ", "item"]), &set(&["item"]));
        assert_eq!(fresh, strings(&["Item", "item "]));
    }

    #[test]
    fn no_existing_item_ever_reported() {
        let extracted = strings(&["1", "2", "3", "4", "5", "6", "2", "4"]);
        let existing = set(&["2", "4", "6", "8"]);

        let fresh = new_items(&extracted, &existing);

        assert!(fresh.iter().all(|item| !existing.contains(item)));
        assert!(fresh.iter().all(|item| extracted.contains(item)));
        assert_eq!(fresh, strings(&["1", "3", "5"]));
    }
}
