//! RFC 1876 LOC record presentation-format parsing.
//!
//! Recursive resolvers hand back LOC records in the textual form
//! `"52 22 23.000 N 4 53 32.000 E -2.00m 1m 10000m 10m"`. This module
//! converts that into decimal degrees and meters. Two entry points:
//! [`parse_loc`] accepts only the full grammar, [`parse_loc_lenient`]
//! additionally salvages records with unusual trailing fields by
//! extracting the DMS pair and whatever meter quantities follow.

use crate::api::LocRecord;
use crate::error::Error;
use regex::Regex;
use std::sync::LazyLock;

/// Full grammar: DMS latitude, DMS longitude, altitude with mandatory
/// `m`, then size / horizontal precision / vertical precision with
/// optional `m` suffixes.
static LOC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        ^(\d+)\s+(\d+)\s+([\d.]+)\s+([NS])\s+   # latitude
        (\d+)\s+(\d+)\s+([\d.]+)\s+([EW])\s+    # longitude
        (-?[\d.]+)m\s*                          # altitude
        ([\d.]+)m?\s*                           # size
        ([\d.]+)m?\s*                           # horizontal precision
        ([\d.]+)m?$                             # vertical precision
        ",
    )
    .expect("LOC grammar regex")
});

/// Just the coordinate pair, for lenient extraction.
static COORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+)\s+(\d+)\s+([\d.]+)\s+([NS])\s+(\d+)\s+(\d+)\s+([\d.]+)\s+([EW])")
        .expect("coordinate regex")
});

/// A meter-quantified number, possibly negative.
static METERS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(-?[\d.]+)m").expect("meters regex"));

fn dms_to_decimal(deg: f64, min: f64, sec: f64, negative: bool) -> f64 {
    let decimal = deg + min / 60.0 + sec / 3600.0;
    if negative { -decimal } else { decimal }
}

// The regexes only admit digits and dots, so f64 parsing cannot fail on
// a captured group; `unwrap_or(0.0)` guards pathological inputs like "1.2.3".
fn num(caps: &regex::Captures<'_>, idx: usize) -> f64 {
    caps.get(idx)
        .map(|m| m.as_str().parse().unwrap_or(0.0))
        .unwrap_or(0.0)
}

/// Parse a LOC record, accepting only the full presentation grammar.
pub fn parse_loc(fqdn: &str, raw: &str) -> Result<LocRecord, Error> {
    let raw = raw.trim();
    let caps = LOC_RE
        .captures(raw)
        .ok_or_else(|| Error::InvalidLoc(raw.to_string()))?;

    let latitude = dms_to_decimal(num(&caps, 1), num(&caps, 2), num(&caps, 3), &caps[4] == "S");
    let longitude = dms_to_decimal(num(&caps, 5), num(&caps, 6), num(&caps, 7), &caps[8] == "W");

    Ok(LocRecord {
        fqdn: fqdn.to_string(),
        raw_record: raw.to_string(),
        latitude,
        longitude,
        altitude_m: num(&caps, 9),
        size_m: num(&caps, 10),
        horiz_prec_m: num(&caps, 11),
        vert_prec_m: num(&caps, 12),
    })
}

/// Parse a LOC record, falling back to best-effort extraction.
///
/// When the strict grammar fails, the DMS coordinate pair is located
/// anywhere in the input and up to four meter-quantified numbers are
/// taken from whatever follows it; missing precision fields get the
/// RFC 1876 defaults (size 1 m, horizontal 10 000 m, vertical 10 m).
/// Trailing text beyond those fields is ignored.
pub fn parse_loc_lenient(fqdn: &str, raw: &str) -> Result<LocRecord, Error> {
    if let Ok(record) = parse_loc(fqdn, raw) {
        return Ok(record);
    }

    let raw = raw.trim();
    let caps = COORD_RE
        .captures(raw)
        .ok_or_else(|| Error::InvalidLoc(raw.to_string()))?;

    let latitude = dms_to_decimal(num(&caps, 1), num(&caps, 2), num(&caps, 3), &caps[4] == "S");
    let longitude = dms_to_decimal(num(&caps, 5), num(&caps, 6), num(&caps, 7), &caps[8] == "W");

    // RFC 1876 defaults apply to whatever the record does not spell out.
    let rest = &raw[caps.get(0).map(|m| m.end()).unwrap_or(raw.len())..];
    let mut fields = [0.0, 1.0, 10_000.0, 10.0];
    for (i, m) in METERS_RE.captures_iter(rest).take(4).enumerate() {
        fields[i] = m
            .get(1)
            .map(|v| v.as_str().parse().unwrap_or(fields[i]))
            .unwrap_or(fields[i]);
    }

    Ok(LocRecord {
        fqdn: fqdn.to_string(),
        raw_record: raw.to_string(),
        latitude,
        longitude,
        altitude_m: fields[0],
        size_m: fields[1],
        horiz_prec_m: fields[2],
        vert_prec_m: fields[3],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-4;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < TOLERANCE
    }

    #[test]
    fn parses_amsterdam_record() {
        let rec = parse_loc("ripe.net", "52 22 23.000 N 4 53 32.000 E -2.00m 1m 10000m 10m")
            .unwrap();
        assert!(close(rec.latitude, 52.37306));
        assert!(close(rec.longitude, 4.89222));
        assert_eq!(rec.altitude_m, -2.0);
        assert_eq!(rec.size_m, 1.0);
        assert_eq!(rec.horiz_prec_m, 10000.0);
        assert_eq!(rec.vert_prec_m, 10.0);
    }

    #[test]
    fn parses_caida_record() {
        let rec = parse_loc("caida.org", "32 53 1.000 N 117 14 25.000 W 107.00m 30m 10m 10m")
            .unwrap();
        assert!(close(rec.latitude, 32.883611111));
        assert!(close(rec.longitude, -117.240277778));
        assert_eq!(rec.altitude_m, 107.0);
        assert_eq!(rec.size_m, 30.0);
    }

    #[test]
    fn southern_hemisphere_is_negative_latitude() {
        let rec = parse_loc(
            "example.au",
            "33 51 54.000 S 151 12 36.000 E 10.00m 1m 1000m 10m",
        )
        .unwrap();
        assert!(close(rec.latitude, -33.865));
        assert!(close(rec.longitude, 151.21));
    }

    #[test]
    fn negative_altitude_below_sea_level() {
        let rec = parse_loc(
            "ckdhr.com",
            "42 21 43.528 N 71 5 6.284 W -25.00m 1m 3000m 10m",
        )
        .unwrap();
        assert!(close(rec.latitude, 42.362091111));
        assert!(close(rec.longitude, -71.085078889));
        assert_eq!(rec.altitude_m, -25.0);
        assert_eq!(rec.horiz_prec_m, 3000.0);
    }

    #[test]
    fn pole_boundaries() {
        let north = parse_loc("n.example", "90 0 0.000 N 0 0 0.000 E 0.00m 1m 100m 10m").unwrap();
        assert_eq!(north.latitude, 90.0);
        let south = parse_loc("s.example", "90 0 0.000 S 0 0 0.000 E 0.00m 1m 100m 10m").unwrap();
        assert_eq!(south.latitude, -90.0);
    }

    #[test]
    fn null_island() {
        let rec = parse_loc(
            "null-island.example",
            "0 0 0.000 N 0 0 0.000 E 0.00m 1m 100m 10m",
        )
        .unwrap();
        assert_eq!(rec.latitude, 0.0);
        assert_eq!(rec.longitude, 0.0);
    }

    #[test]
    fn dms_conversion_is_within_a_microdegree() {
        // deg + min/60 + sec/3600 over a grid of legal components.
        for deg in [0u32, 12, 45, 89] {
            for min in [0u32, 7, 59] {
                for sec in ["0.000", "30.500", "59.999"] {
                    let raw = format!("{deg} {min} {sec} N 0 0 0.000 E 0.00m 1m 100m 10m");
                    let rec = parse_loc("grid.example", &raw).unwrap();
                    let want = deg as f64
                        + min as f64 / 60.0
                        + sec.parse::<f64>().unwrap() / 3600.0;
                    assert!(
                        (rec.latitude - want).abs() < 1e-6,
                        "{raw}: got {}, want {want}",
                        rec.latitude
                    );
                }
            }
        }
    }

    #[test]
    fn strict_rejects_garbage() {
        assert!(parse_loc("bad.example", "not a loc record").is_err());
        assert!(parse_loc("bad.example", "52 22 N 4 53 E").is_err());
        assert!(parse_loc("empty.example", "").is_err());
    }

    #[test]
    fn lenient_agrees_with_strict_on_valid_input() {
        let raw = "32 53 1.000 N 117 14 25.000 W 107.00m 30m 10m 10m";
        let strict = parse_loc("caida.org", raw).unwrap();
        let lenient = parse_loc_lenient("caida.org", raw).unwrap();
        assert_eq!(strict, lenient);
    }

    #[test]
    fn lenient_applies_rfc_defaults_for_missing_fields() {
        // Coordinates plus altitude only; size/precision default per RFC 1876.
        let rec = parse_loc_lenient("partial.example", "52 22 23.000 N 4 53 32.000 E 5.00m")
            .unwrap();
        assert!(close(rec.latitude, 52.37306));
        assert_eq!(rec.altitude_m, 5.0);
        assert_eq!(rec.size_m, 1.0);
        assert_eq!(rec.horiz_prec_m, 10000.0);
        assert_eq!(rec.vert_prec_m, 10.0);
    }

    #[test]
    fn lenient_ignores_trailing_text() {
        let rec = parse_loc_lenient(
            "noisy.example",
            "52 22 23.000 N 4 53 32.000 E 0.00m 1m 100m 10m extra trailing words",
        )
        .unwrap();
        assert!(close(rec.latitude, 52.37306));
        assert_eq!(rec.horiz_prec_m, 100.0);
    }

    #[test]
    fn lenient_rejects_records_without_coordinates() {
        assert!(parse_loc_lenient("bad.example", "100m 200m 300m").is_err());
    }
}
