//! A1-style cell addressing

use crate::error::{SheetfillError, SheetfillResult};

/// Convert a 1-based column number to its letters
///
/// Examples:
/// - 1 → A
/// - 26 → Z
/// - 27 → AA
pub fn column_to_letters(col: u32) -> String {
    let mut result = String::new();
    let mut idx = col.saturating_sub(1);

    loop {
        let remainder = idx % 26;
        result.insert(0, (b'A' + remainder as u8) as char);
        if idx < 26 {
            break;
        }
        idx = idx / 26 - 1;
    }

    result
}

/// Convert column letters ("A", "AB") to a 1-based column number
pub fn letters_to_column(letters: &str) -> Option<u32> {
    if letters.is_empty() {
        return None;
    }
    let mut col: u32 = 0;
    for ch in letters.chars() {
        if !ch.is_ascii_alphabetic() {
            return None;
        }
        let digit = (ch.to_ascii_uppercase() as u8 - b'A') as u32 + 1;
        col = col.checked_mul(26)?.checked_add(digit)?;
    }
    Some(col)
}

/// Parse a cell reference ("C3") into a 1-based (row, col) pair
pub fn parse_cell(reference: &str) -> SheetfillResult<(u32, u32)> {
    let invalid = || SheetfillError::Read(format!("Invalid cell reference: {}", reference));

    let split = reference
        .find(|c: char| c.is_ascii_digit())
        .ok_or_else(invalid)?;
    let (letters, digits) = reference.split_at(split);
    let col = letters_to_column(letters).ok_or_else(invalid)?;
    let row: u32 = digits.parse().map_err(|_| invalid())?;
    if row == 0 {
        return Err(invalid());
    }
    Ok((row, col))
}
