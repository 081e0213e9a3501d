use chrono::NaiveDate;

/// Calendar-date format of the raw input contract.
pub const RAW_DATE_FMT: &str = "%m/%d/%Y";

/// Strict `MM/DD/YYYY` parse. Anything else, including impossible calendar
/// dates, is `None`.
pub fn parse_raw_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), RAW_DATE_FMT).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_contract_format_only() {
        let date = parse_raw_date("01/05/2024").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        assert_eq!(parse_raw_date(" 12/31/2023 "), Some(NaiveDate::from_ymd_opt(2023, 12, 31).unwrap()));

        assert!(parse_raw_date("2024-01-05").is_none());
        assert!(parse_raw_date("13/01/2024").is_none());
        assert!(parse_raw_date("02/30/2024").is_none());
        assert!(parse_raw_date("").is_none());
    }
}
