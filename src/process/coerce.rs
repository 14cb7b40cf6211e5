/// One cell of a normalized row, after type coercion.
///
/// Downstream consumers match on the tag instead of re-parsing strings.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Numeric(f64),
    Text(String),
    Null,
}

/// The source files emit this exact literal for absent values.
const NULL_SENTINEL: &str = "null";

/// Convert one raw text field into a typed value.
///
/// Numeric fields may use either `.` or `,` as the decimal separator
/// depending on the year. Anything that is neither the null sentinel nor a
/// parseable number passes through unchanged as text; this never fails.
pub fn coerce(raw: &str) -> CellValue {
    if raw == NULL_SENTINEL {
        return CellValue::Null;
    }
    match raw.replace(',', ".").parse::<f64>() {
        Ok(value) => CellValue::Numeric(value),
        Err(_) => CellValue::Text(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comma_and_period_decimals_parse_equal() {
        assert_eq!(coerce("85,5"), CellValue::Numeric(85.5));
        assert_eq!(coerce("85.5"), CellValue::Numeric(85.5));
        assert_eq!(coerce("170"), CellValue::Numeric(170.0));
    }

    #[test]
    fn null_sentinel_is_case_sensitive() {
        assert_eq!(coerce("null"), CellValue::Null);
        assert_eq!(coerce("NULL"), CellValue::Text("NULL".to_string()));
        assert_eq!(coerce("Null"), CellValue::Text("Null".to_string()));
    }

    #[test]
    fn unparseable_text_passes_through_unchanged() {
        assert_eq!(
            coerce("Зараховано"),
            CellValue::Text("Зараховано".to_string())
        );
        assert_eq!(coerce(""), CellValue::Text(String::new()));
        // more than one comma stops being a decimal separator
        assert_eq!(coerce("1,234,5"), CellValue::Text("1,234,5".to_string()));
    }
}
