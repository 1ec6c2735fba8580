/// Appended to a bullet that had to be cut mid-text.
pub const TRUNCATION_MARKER: &str = "...";

/// Limits the combined character count of `bullets` to `cap`.
///
/// Whole bullets are kept in order while they fit; the first bullet that
/// does not fit and everything after it are dropped. Only when not even the
/// first bullet fits is it cut, ending in [`TRUNCATION_MARKER`]. The result
/// is always a prefix of the input and its total never exceeds `cap`.
pub fn cap_bullets(bullets: Vec<String>, cap: usize) -> Vec<String> {
    let mut kept = Vec::with_capacity(bullets.len());
    let mut total = 0usize;

    for bullet in bullets {
        let len = bullet.chars().count();
        if total + len <= cap {
            total += len;
            kept.push(bullet);
            continue;
        }

        if kept.is_empty() {
            let marker_len = TRUNCATION_MARKER.chars().count();
            if cap > marker_len {
                let head: String = bullet.chars().take(cap - marker_len).collect();
                kept.push(format!("{}{}", head.trim_end(), TRUNCATION_MARKER));
            }
        }
        break;
    }

    kept
}

pub fn total_chars(bullets: &[String]) -> usize {
    bullets.iter().map(|b| b.chars().count()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bullets(count: usize, len: usize) -> Vec<String> {
        (0..count)
            .map(|i| {
                let c = char::from(b'a' + i as u8);
                std::iter::repeat(c).take(len).collect()
            })
            .collect()
    }

    #[test]
    fn test_under_cap_is_untouched() {
        let input = bullets(3, 100);
        assert_eq!(cap_bullets(input.clone(), 1000), input);
    }

    #[test]
    fn test_five_bullets_of_300_keep_three_whole() {
        let input = bullets(5, 300);
        let capped = cap_bullets(input.clone(), 1000);

        assert_eq!(capped.len(), 3);
        assert_eq!(capped[..], input[..3]);
        assert!(total_chars(&capped) <= 1000);
        assert!(capped.iter().all(|b| !b.ends_with(TRUNCATION_MARKER)));
    }

    #[test]
    fn test_single_oversized_bullet_is_split_with_marker() {
        let input = vec!["x".repeat(1500), "short".to_string()];
        let capped = cap_bullets(input, 1000);

        assert_eq!(capped.len(), 1);
        assert!(capped[0].ends_with(TRUNCATION_MARKER));
        assert_eq!(total_chars(&capped), 1000);
    }

    #[test]
    fn test_exact_fit() {
        let input = bullets(2, 500);
        assert_eq!(cap_bullets(input.clone(), 1000), input);
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        let input = vec!["é".repeat(600), "ü".repeat(400)];
        let capped = cap_bullets(input.clone(), 1000);
        assert_eq!(capped, input);
    }

    #[test]
    fn test_empty_input() {
        assert!(cap_bullets(Vec::new(), 1000).is_empty());
    }
}
