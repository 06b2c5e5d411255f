//! 分页游标编解码
//!
//! 游标是对排序字段（RFC3339 时间戳，秒精度）的不透明 base64 编码。
//! 返回行数不足一页时视为最后一页，不再下发游标。

use chrono::{DateTime, SecondsFormat, Utc};
use data_encoding::BASE64;
use domain::{DomainError, Timestamp};

pub fn encode_page_token(last: Timestamp) -> String {
    BASE64.encode(last.to_rfc3339_opts(SecondsFormat::Secs, true).as_bytes())
}

pub fn decode_page_token(token: &str) -> Result<Timestamp, DomainError> {
    let bytes = BASE64
        .decode(token.as_bytes())
        .map_err(|_| DomainError::invalid_argument("page_token", "cannot parse next token"))?;
    let text = String::from_utf8(bytes)
        .map_err(|_| DomainError::invalid_argument("page_token", "cannot parse next token"))?;
    DateTime::parse_from_rfc3339(&text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| DomainError::invalid_argument("page_token", "cannot parse next token"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn round_trip_preserves_timestamp_to_the_second() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 17, 8, 30, 41).unwrap();
        let token = encode_page_token(ts);
        assert_eq!(decode_page_token(&token).unwrap(), ts);
    }

    #[test]
    fn subsecond_precision_is_truncated() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 17, 8, 30, 41).unwrap()
            + chrono::Duration::milliseconds(937);
        let decoded = decode_page_token(&encode_page_token(ts)).unwrap();
        assert_eq!(decoded, Utc.with_ymd_and_hms(2024, 5, 17, 8, 30, 41).unwrap());
    }

    #[test]
    fn garbage_tokens_are_rejected() {
        assert!(decode_page_token("some_invalid_token").is_err());
        // 合法 base64 但不是时间戳
        assert!(decode_page_token(&BASE64.encode(b"not a timestamp")).is_err());
    }
}
