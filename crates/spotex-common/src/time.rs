use chrono::{DateTime, Utc};

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// `YYYYMMDDTHHMMSSZ`, the `x-amz-date` header format.
pub fn format_amz_date(dt: &DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}

/// `YYYYMMDD`, the date component of a SigV4 credential scope.
pub fn format_scope_date(dt: &DateTime<Utc>) -> String {
    dt.format("%Y%m%d").to_string()
}

/// ISO 8601 timestamp accepted by EC2 query parameters.
pub fn format_iso8601(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn formats_match_aws_conventions() {
        let dt = Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap();
        assert_eq!(format_amz_date(&dt), "20150830T123600Z");
        assert_eq!(format_scope_date(&dt), "20150830");
        assert_eq!(format_iso8601(&dt), "2015-08-30T12:36:00Z");
    }
}
