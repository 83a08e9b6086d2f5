//! A1 notation helpers.
//!
//! The backing service addresses cells as `'Sheet title'!A2:C5`. These
//! helpers render [CellRange]s into that form and pull the reserved row
//! index back out of an append reply's range marker.

use crate::backend::CellRange;

/// Converts a 1-based column index into its letter form, `1 -> "A"`,
/// `27 -> "AA"`.
pub fn column_letters(column: u32) -> String {
    debug_assert!(column >= 1, "Column indices are 1-based");

    let mut column = column;
    let mut letters = Vec::new();
    while column > 0 {
        let rem = (column - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        column = (column - 1) / 26;
    }
    letters.into_iter().rev().collect()
}

/// Renders a range in A1 notation.
///
/// Sheet titles that are not plain identifiers are wrapped in single
/// quotes, with embedded quotes doubled.
pub fn format_range(range: &CellRange) -> String {
    let start = format!(
        "{}{}",
        column_letters(range.start_column),
        range.start_row
    );

    let cells = if range.start_row == range.end_row
        && range.start_column == range.end_column
    {
        start
    } else {
        format!(
            "{start}:{}{}",
            column_letters(range.end_column),
            range.end_row
        )
    };

    format!("{}!{cells}", quote_title(&range.sheet))
}

/// Extracts the starting row index from an append reply's range marker,
/// e.g. `"blocks!A5:B5" -> Some(5)`.
///
/// Returns `None` when the marker does not carry a parsable row, the
/// caller treats that as a fatal integrity error.
pub fn append_row_index(updated_range: &str) -> Option<u32> {
    // The range portion never contains `!`, quoted titles may.
    let (_, cells) = updated_range.rsplit_once('!')?;
    let first_cell = cells.split(':').next()?;

    let digits: String = first_cell
        .chars()
        .skip_while(|c| c.is_ascii_alphabetic() || *c == '$')
        .collect();
    digits.parse().ok()
}

fn quote_title(title: &str) -> String {
    let plain = !title.is_empty()
        && title
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if plain {
        title.to_string()
    } else {
        format!("'{}'", title.replace('\'', "''"))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(1, "A")]
    #[case(26, "Z")]
    #[case(27, "AA")]
    #[case(52, "AZ")]
    #[case(703, "AAA")]
    fn test_column_letters(#[case] column: u32, #[case] expected: &str) {
        assert_eq!(column_letters(column), expected);
    }

    #[test]
    fn test_format_range_multi_cell() {
        let range = CellRange {
            sheet: "blocks".to_string(),
            start_row: 2,
            start_column: 1,
            end_row: 5,
            end_column: 3,
        };
        assert_eq!(format_range(&range), "blocks!A2:C5");
    }

    #[test]
    fn test_format_range_single_cell() {
        let range = CellRange::cell("_checkpoint", 1, 1);
        assert_eq!(format_range(&range), "_checkpoint!A1");
    }

    #[test]
    fn test_format_range_quotes_titles_with_spaces() {
        let range = CellRange::cell("my table", 3, 2);
        assert_eq!(format_range(&range), "'my table'!B3");

        let range = CellRange::cell("bob's table", 1, 1);
        assert_eq!(format_range(&range), "'bob''s table'!A1");
    }

    #[rstest]
    #[case("blocks!A5:B5", Some(5))]
    #[case("blocks!A12", Some(12))]
    #[case("'my table'!C7:D7", Some(7))]
    #[case("'odd!title'!A3:B3", Some(3))]
    #[case("blocks!$A$4:$B$4", Some(4))]
    #[case("no-separator", None)]
    #[case("blocks!", None)]
    #[case("blocks!ABC", None)]
    fn test_append_row_index(
        #[case] marker: &str,
        #[case] expected: Option<u32>,
    ) {
        assert_eq!(append_row_index(marker), expected);
    }
}
