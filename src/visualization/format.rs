/// Format a number the Czech way: space as thousands separator, decimal
/// comma, fixed number of decimals.
pub fn format_number(value: f64, decimals: usize) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let digits = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((int_part, frac_part)) => (int_part, Some(frac_part)),
        None => (digits.as_str(), None),
    };

    let mut out = String::with_capacity(digits.len() + int_part.len() / 3 + 1);
    if value < 0.0 {
        out.push('-');
    }
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            out.push(' ');
        }
        out.push(ch);
    }
    if let Some(frac) = frac_part {
        out.push(',');
        out.push_str(frac);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thousands_and_decimal_comma() {
        insta::assert_snapshot!(format_number(1_234_567.891, 2), @"1 234 567,89");
    }

    #[test]
    fn test_small_numbers() {
        insta::assert_snapshot!(format_number(999.5, 1), @"999,5");
        insta::assert_snapshot!(format_number(0.04, 3), @"0,040");
    }

    #[test]
    fn test_no_decimals() {
        insta::assert_snapshot!(format_number(1000.0, 0), @"1 000");
        insta::assert_snapshot!(format_number(12_345.6, 0), @"12 346");
    }

    #[test]
    fn test_negative() {
        insta::assert_snapshot!(format_number(-4_321.26, 1), @"-4 321,3");
    }

    #[test]
    fn test_rounding_carries_into_new_group() {
        insta::assert_snapshot!(format_number(999_999.996, 2), @"1 000 000,00");
    }

    #[test]
    fn test_non_finite() {
        assert_eq!(format_number(f64::NAN, 2), "NaN");
    }
}
