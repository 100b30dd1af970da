use textwrap::core::display_width;

/// Format an integer amount with thousands separators: 1,234,567
pub fn amount(val: i64) -> String {
    let digits = val.unsigned_abs().to_string();

    let mut with_commas = String::new();
    for (i, c) in digits.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            with_commas.push(',');
        }
        with_commas.push(c);
    }
    let with_commas: String = with_commas.chars().rev().collect();

    if val < 0 {
        format!("-{with_commas}")
    } else {
        with_commas
    }
}

/// Left-align `text` in `width` terminal columns; wide characters count as two.
pub fn pad(text: &str, width: usize) -> String {
    let w = display_width(text);
    format!("{text}{}", " ".repeat(width.saturating_sub(w)))
}

/// Width of the largest index in a list of `len` rows.
pub fn index_width(len: usize) -> usize {
    len.saturating_sub(1).to_string().len()
}

/// Prefix every line with its right-aligned index, the form the selector consumes.
pub fn numbered<I, S>(lines: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    I::IntoIter: ExactSizeIterator,
    S: AsRef<str>,
{
    let iter = lines.into_iter();
    let width = index_width(iter.len());
    iter.enumerate()
        .map(|(i, line)| format!("{i:>width$} {}", line.as_ref()))
        .collect()
}
