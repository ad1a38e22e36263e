//! Flat range feed parsing
//!
//! One record per line: `start, end, ..., CC`. Bounds are decimal integers or
//! IP literals; a CIDR block in the first field stands in for both bounds.
//! `#` comments and blank lines are ignored and quote characters are
//! stripped from every field.

use ipnet::IpNet;
use std::net::IpAddr;

use super::ingest::IngestError;
use super::table::RangeRecord;
use crate::geo::{AddressFamily, CountryCode};

/// Result of parsing a whole feed.
#[derive(Debug, Default)]
pub struct ParsedFeed {
    pub records: Vec<RangeRecord>,
    /// Data lines dropped because they map to the unknown country.
    pub skipped: usize,
}

enum Line {
    Record(RangeRecord),
    Unassigned,
}

pub fn parse_feed(body: &str, family: AddressFamily) -> Result<ParsedFeed, IngestError> {
    let mut parsed = ParsedFeed::default();

    for (idx, raw) in body.lines().enumerate() {
        let line = raw.trim().trim_start_matches('\u{feff}');
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        match parse_line(line, family) {
            Ok(Line::Record(record)) => parsed.records.push(record),
            Ok(Line::Unassigned) => parsed.skipped += 1,
            Err(reason) => {
                return Err(IngestError::ParseError {
                    line: idx + 1,
                    reason,
                })
            }
        }
    }

    if parsed.records.is_empty() {
        return Err(IngestError::ParseError {
            line: 0,
            reason: "feed contained no ranges".to_string(),
        });
    }

    Ok(parsed)
}

fn parse_line(line: &str, family: AddressFamily) -> Result<Line, String> {
    let fields: Vec<&str> = line
        .split(',')
        .map(|f| f.trim().trim_matches(|c| c == '"' || c == '\'').trim())
        .collect();

    let (low, high, rest) = if fields[0].contains('/') {
        let (low, high) = parse_cidr(fields[0], family)?;
        (low, high, &fields[1..])
    } else {
        if fields.len() < 3 {
            return Err(format!("expected 'start,end,...,country', got {} field(s)", fields.len()));
        }
        let low = parse_bound(fields[0], family)?;
        let high = parse_bound(fields[1], family)?;
        (low, high, &fields[2..])
    };

    if low > high {
        return Err(format!("range start {low} is above range end {high}"));
    }

    match rest.iter().rev().find_map(|f| CountryCode::parse(f)) {
        Some(code) if code.is_unknown() => Ok(Line::Unassigned),
        Some(code) => Ok(Line::Record(RangeRecord::new(low, high, code))),
        None if rest.iter().any(|f| *f == "-" || *f == "00") => Ok(Line::Unassigned),
        None => Err("missing two-letter country code".to_string()),
    }
}

fn parse_bound(field: &str, family: AddressFamily) -> Result<u128, String> {
    let value = if let Ok(value) = field.parse::<u128>() {
        value
    } else {
        match field.parse::<IpAddr>() {
            Ok(IpAddr::V4(v4)) if family == AddressFamily::V4 => u128::from(u32::from(v4)),
            Ok(IpAddr::V6(v6)) if family == AddressFamily::V6 => u128::from(v6),
            Ok(_) => return Err(format!("address '{field}' is not {family}")),
            Err(_) => return Err(format!("invalid range bound '{field}'")),
        }
    };

    if value > family.max_value() {
        return Err(format!("bound {value} exceeds the {family} address space"));
    }
    Ok(value)
}

fn parse_cidr(field: &str, family: AddressFamily) -> Result<(u128, u128), String> {
    let net: IpNet = field
        .parse()
        .map_err(|_| format!("invalid CIDR block '{field}'"))?;

    match (net, family) {
        (IpNet::V4(v4), AddressFamily::V4) => Ok((
            u128::from(u32::from(v4.network())),
            u128::from(u32::from(v4.broadcast())),
        )),
        (IpNet::V6(v6), AddressFamily::V6) => Ok((
            u128::from(v6.network()),
            u128::from(v6.broadcast()),
        )),
        _ => Err(format!("CIDR block '{field}' is not {family}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cc(s: &str) -> CountryCode {
        CountryCode::parse(s).unwrap()
    }

    #[test]
    fn test_parse_numeric_quoted_feed() {
        let body = "# generated 2024-01-01\n\
                    \n\
                    \"0\",\"16777215\",\"US\"\n\
                    '16777216','16777471','AU'\n";
        let parsed = parse_feed(body, AddressFamily::V4).unwrap();
        assert_eq!(
            parsed.records,
            vec![
                RangeRecord::new(0, 16777215, cc("US")),
                RangeRecord::new(16777216, 16777471, cc("AU")),
            ]
        );
    }

    #[test]
    fn test_country_is_trailing_two_letter_token() {
        let body = "1,10,extra,columns,de\n11,20,JP,Japan\n";
        let parsed = parse_feed(body, AddressFamily::V4).unwrap();
        assert_eq!(parsed.records[0].country, cc("DE"));
        // Trailing name is not a code, so the last code-shaped field wins
        assert_eq!(parsed.records[1].country, cc("JP"));
    }

    #[test]
    fn test_ip_literal_and_cidr_bounds() {
        let parsed = parse_feed(
            "1.0.0.0,1.0.0.255,AU\n10.0.0.0/8,,JP\n",
            AddressFamily::V4,
        )
        .unwrap();
        assert_eq!(parsed.records[0], RangeRecord::new(0x0100_0000, 0x0100_00FF, cc("AU")));
        assert_eq!(parsed.records[1], RangeRecord::new(0x0A00_0000, 0x0AFF_FFFF, cc("JP")));

        let parsed = parse_feed("2001:db8::/32,NL\n", AddressFamily::V6).unwrap();
        let low = u128::from("2001:db8::".parse::<std::net::Ipv6Addr>().unwrap());
        assert_eq!(parsed.records[0].low, low);
        assert_eq!(parsed.records[0].high, low | ((1u128 << 96) - 1));
    }

    #[test]
    fn test_unassigned_lines_are_skipped() {
        let parsed =
            parse_feed("0,9,-\n10,19,ZZ\n20,29,FR\n30,39,00\n", AddressFamily::V4).unwrap();
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.skipped, 3);
    }

    #[test]
    fn test_v4_bound_overflow_is_rejected() {
        let err = parse_feed("0,4294967296,US\n", AddressFamily::V4).unwrap_err();
        assert!(matches!(err, IngestError::ParseError { line: 1, .. }));
        assert!(parse_feed("0,4294967296,US\n", AddressFamily::V6).is_ok());
    }

    #[test]
    fn test_family_mismatch_is_rejected() {
        assert!(parse_feed("::1,::2,US\n", AddressFamily::V4).is_err());
        assert!(parse_feed("10.0.0.0/8,JP\n", AddressFamily::V6).is_err());
    }

    #[test]
    fn test_malformed_lines_report_line_number() {
        let err = parse_feed("# header\n0,10,US\nbogus line\n", AddressFamily::V4).unwrap_err();
        match err {
            IngestError::ParseError { line, .. } => assert_eq!(line, 3),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(parse_feed("20,10,US\n", AddressFamily::V4).is_err());
        assert!(parse_feed("0,10,USA\n", AddressFamily::V4).is_err());
    }

    #[test]
    fn test_empty_feed_is_an_error() {
        assert!(matches!(
            parse_feed("# nothing here\n\n", AddressFamily::V4),
            Err(IngestError::ParseError { line: 0, .. })
        ));
    }
}
