/// First character of every word of a name, or `UNKNOWN` for a blank name.
pub fn initials(name: &str) -> String {
    let initials: String = name
        .split_whitespace()
        .filter_map(|word| word.chars().next())
        .collect();
    if initials.is_empty() {
        "UNKNOWN".to_string()
    } else {
        initials
    }
}

/// Title of the `index`-th (1-based) group created in one request.
pub fn group_title(index: usize, name: &str, org_position: &str) -> String {
    format!("[{index}]_{}_{org_position}_{name}", initials(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initials_per_word() {
        assert_eq!(initials("Budi Santoso"), "BS");
        assert_eq!(initials("  ada   king lovelace "), "akl");
        assert_eq!(initials("Ömer Çelik"), "ÖÇ");
    }

    #[test]
    fn test_blank_name_is_unknown() {
        assert_eq!(initials(""), "UNKNOWN");
        assert_eq!(initials("   "), "UNKNOWN");
    }

    #[test]
    fn test_group_title_layout() {
        assert_eq!(
            group_title(2, "Budi Santoso", "Backend Engineer"),
            "[2]_BS_Backend Engineer_Budi Santoso"
        );
    }
}
