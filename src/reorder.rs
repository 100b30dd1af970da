//! Re-ranking of sibling records.
//!
//! A sibling set is rendered as `"<index> <label>"` lines, the user moves the
//! lines around, and [`parse_permutation`] turns the edited text back into a
//! rank for every original sibling.

use crate::error::{HearthError, Result};

/// One line per sibling, indices in current order.
pub fn render<I, S>(labels: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    labels
        .into_iter()
        .enumerate()
        .map(|(i, label)| format!("{i} {}\n", label.as_ref()))
        .collect()
}

/// Read the rearranged lines and return `ranks` where `ranks[original] = new position`.
///
/// Blank lines and lines starting with `#` are ignored. Only the leading token
/// of a line is read.
pub fn parse_permutation(text: &str, n: usize) -> Result<Vec<usize>> {
    let mut order = Vec::with_capacity(n);

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let token = line.split_whitespace().next().unwrap_or_default();
        let index: usize = token.parse().map_err(|_| {
            HearthError::validation("order", format!("'{token}' is not an index"))
        })?;
        if index >= n {
            return Err(HearthError::validation(
                "order",
                format!("index {index} is out of range 0..{n}"),
            ));
        }
        order.push(index);
    }

    if order.len() != n {
        return Err(HearthError::validation(
            "order",
            format!("expected {n} lines, got {}", order.len()),
        ));
    }

    let mut sorted = order.clone();
    sorted.sort_unstable();
    if sorted.iter().enumerate().any(|(i, &v)| i != v) {
        return Err(HearthError::validation("order", "duplicate index"));
    }

    let mut ranks = vec![0; n];
    for (position, &original) in order.iter().enumerate() {
        ranks[original] = position;
    }
    Ok(ranks)
}

/// Pairs of `(sibling index, new order_no)` for the siblings whose stored rank
/// differs from `start + ranks[i]`.
pub fn changed_ranks(current: &[i64], ranks: &[usize], start: i64) -> Vec<(usize, i64)> {
    current
        .iter()
        .zip(ranks)
        .enumerate()
        .filter_map(|(i, (&old, &rank))| {
            let new = start + rank as i64;
            (old != new).then_some((i, new))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_permutation_accepts_valid_orders() {
        assert_eq!(parse_permutation("", 0).unwrap(), Vec::<usize>::new());
        assert_eq!(parse_permutation("1 item1\n0 item0\n", 2).unwrap(), vec![1, 0]);
        assert_eq!(parse_permutation("1\n2\n0", 3).unwrap(), vec![2, 0, 1]);
        assert_eq!(parse_permutation("1\n0\n2", 3).unwrap(), vec![1, 0, 2]);
        assert_eq!(parse_permutation("0\n2\n1", 3).unwrap(), vec![0, 2, 1]);
    }

    #[test]
    fn test_parse_permutation_skips_blank_and_comment_lines() {
        let text = "# reorder\n\n2 c\n  0 a\n1 b\n";
        assert_eq!(parse_permutation(text, 3).unwrap(), vec![1, 2, 0]);
    }

    #[test]
    fn test_parse_permutation_rejects_bad_input() {
        assert!(parse_permutation("", 1).is_err());
        assert!(parse_permutation("0 item1", 0).is_err());
        assert!(parse_permutation("0 item1", 2).is_err());
        assert!(parse_permutation("0 item0\n2 item2", 2).is_err());
        assert!(parse_permutation("0 item0\n0 item0", 2).is_err());
        assert!(parse_permutation("0 a\n1 b\n2 c", 2).is_err());
    }

    #[test]
    fn test_non_numeric_token_has_own_message() {
        let err = parse_permutation("a item0\n1 item1", 2).unwrap_err();
        assert_eq!(err.to_string(), "order: 'a' is not an index");
        let err = parse_permutation("0 a\n0 b", 2).unwrap_err();
        assert_eq!(err.to_string(), "order: duplicate index");
    }

    #[test]
    fn test_result_inverts_every_permutation_of_four() {
        let items = [0usize, 1, 2, 3];
        for a in items {
            for b in items {
                for c in items {
                    for d in items {
                        let order = [a, b, c, d];
                        let mut seen = order.to_vec();
                        seen.sort_unstable();
                        if seen != items {
                            continue;
                        }
                        let text: String = order.iter().map(|i| format!("{i} x\n")).collect();
                        let ranks = parse_permutation(&text, 4).unwrap();
                        for (pos, &orig) in order.iter().enumerate() {
                            assert_eq!(ranks[orig], pos);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_changed_ranks_is_minimal() {
        // Already 5,6,7; swapping the last two only touches them.
        let changed = changed_ranks(&[5, 6, 7], &[0, 2, 1], 5);
        assert_eq!(changed, vec![(1, 7), (2, 6)]);
        assert!(changed_ranks(&[0, 1], &[0, 1], 0).is_empty());
    }

    #[test]
    fn test_render_numbers_from_zero() {
        assert_eq!(render(["Cash", "Bank"]), "0 Cash\n1 Bank\n");
    }
}
