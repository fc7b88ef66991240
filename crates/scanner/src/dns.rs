//! DNS LOC lookups through a bounded resolver pool.
//!
//! The pool holds `size` pre-built recursive resolvers, all pointed at
//! the same upstream list. A lookup draws a resolver from the pool and
//! returns it when done; when every resolver is out, the next caller
//! waits. Dropping the pool closes the channel and with it the
//! resolvers still in flight back to it.

use anyhow::{Context, Result};
use hickory_proto::ProtoErrorKind;
use hickory_proto::rr::RData;
use hickory_proto::rr::RecordType;
use hickory_proto::rr::rdata::LOC;
use hickory_resolver::ResolveErrorKind;
use hickory_resolver::TokioResolver;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig};
use hickory_resolver::name_server::TokioConnectionProvider;
use locmap_core::config::DnsConfig;
use std::net::IpAddr;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

/// Outcome of a single LOC lookup.
#[derive(Debug, Clone)]
pub enum LocLookup {
    /// The name has a LOC record; payload is its presentation form.
    Found(String),
    /// The name resolves (or not) without any LOC record.
    NotFound,
    /// Transport trouble: timeout, refused, cancellation.
    Failed(String),
}

/// Bounded pool of recursive resolvers.
pub struct ResolverPool {
    tx: mpsc::Sender<TokioResolver>,
    rx: Mutex<mpsc::Receiver<TokioResolver>>,
}

impl ResolverPool {
    /// Pre-build `size` resolvers against the configured upstreams.
    pub fn new(config: &DnsConfig, size: usize) -> Result<Self> {
        let ips: Vec<IpAddr> = config
            .nameservers
            .iter()
            .map(|ns| ns.parse().with_context(|| format!("bad nameserver {ns}")))
            .collect::<Result<_>>()?;

        let (tx, rx) = mpsc::channel(size.max(1));
        for _ in 0..size.max(1) {
            let group = NameServerConfigGroup::from_ips_clear(&ips, 53, true);
            let resolver_config = ResolverConfig::from_parts(None, Vec::new(), group);
            let mut builder = TokioResolver::builder_with_config(
                resolver_config,
                TokioConnectionProvider::default(),
            );
            builder.options_mut().timeout = config.timeout();
            builder.options_mut().attempts = 1;
            tx.try_send(builder.build()).expect("pool capacity");
        }

        Ok(Self {
            tx,
            rx: Mutex::new(rx),
        })
    }

    /// Take a resolver, waiting if the pool is drained.
    async fn acquire(&self) -> Option<TokioResolver> {
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }

    fn release(&self, resolver: TokioResolver) {
        // Fails only when the pool is being torn down; the resolver is
        // then dropped here.
        let _ = self.tx.try_send(resolver);
    }

    /// Look up the LOC record for one FQDN.
    ///
    /// A single trailing dot is stripped first; some public upstreams
    /// reject already-qualified names. Cancellation surfaces as
    /// [`LocLookup::Failed`], which callers treat as "drop this FQDN".
    pub async fn lookup_loc(&self, fqdn: &str, cancel: &CancellationToken) -> LocLookup {
        let name = fqdn.strip_suffix('.').unwrap_or(fqdn);

        let Some(resolver) = self.acquire().await else {
            return LocLookup::Failed("resolver pool closed".to_string());
        };

        let result = tokio::select! {
            _ = cancel.cancelled() => {
                self.release(resolver);
                return LocLookup::Failed("cancelled".to_string());
            }
            result = resolver.lookup(name, RecordType::LOC) => result,
        };
        self.release(resolver);

        match result {
            Ok(lookup) => {
                for record in lookup.record_iter() {
                    if let RData::LOC(loc) = record.data() {
                        return LocLookup::Found(format_loc(loc));
                    }
                }
                LocLookup::NotFound
            }
            Err(e) if is_no_records(&e) => LocLookup::NotFound,
            Err(e) => LocLookup::Failed(e.to_string()),
        }
    }
}

/// NXDOMAIN and empty answers both mean "no LOC here", not trouble.
fn is_no_records(err: &hickory_resolver::ResolveError) -> bool {
    match err.kind() {
        ResolveErrorKind::Proto(proto) => {
            matches!(proto.kind(), ProtoErrorKind::NoRecordsFound { .. })
        }
        _ => false,
    }
}

/// Render a wire-format LOC record in its RFC 1876 presentation form,
/// the same text a diagnostic resolver would print.
fn format_loc(loc: &LOC) -> String {
    let (lat_deg, lat_min, lat_sec, lat_dir) = decode_angle(loc.latitude(), 'N', 'S');
    let (lon_deg, lon_min, lon_sec, lon_dir) = decode_angle(loc.longitude(), 'E', 'W');

    // Altitude is centimeters above a point 100 km below the ellipsoid.
    let alt = loc.altitude() as f64 / 100.0 - 100_000.0;

    let size = prec_to_meters(loc.size());
    let horiz = prec_to_meters(loc.horiz_pre());
    let vert = prec_to_meters(loc.vert_pre());

    format!(
        "{lat_deg} {lat_min} {lat_sec:.3} {lat_dir} {lon_deg} {lon_min} {lon_sec:.3} {lon_dir} {alt:.2}m {size:.0}m {horiz:.0}m {vert:.0}m"
    )
}

/// Split a wire angle (thousandths of an arc second, offset by 2^31)
/// into degrees / minutes / seconds and a hemisphere letter.
fn decode_angle(wire: u32, positive: char, negative: char) -> (u32, u32, f64, char) {
    let mut value = (wire as i64 - (1i64 << 31)) as f64 / 3_600_000.0;
    let dir = if value < 0.0 {
        value = -value;
        negative
    } else {
        positive
    };

    let deg = value as u32;
    let min = ((value - deg as f64) * 60.0) as u32;
    let sec = (value - deg as f64 - min as f64 / 60.0) * 3600.0;
    (deg, min, sec, dir)
}

/// Decode the RFC 1876 4-bit mantissa / 4-bit exponent size encoding
/// (centimeters) into meters.
fn prec_to_meters(value: u8) -> f64 {
    let mantissa = (value >> 4) as f64;
    let exponent = (value & 0x0f) as i32;
    mantissa * 10f64.powi(exponent) / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prec_encoding_decodes_to_meters() {
        assert_eq!(prec_to_meters(0x12), 1.0); // 1e2 cm
        assert_eq!(prec_to_meters(0x33), 30.0); // 3e3 cm
        assert_eq!(prec_to_meters(0x16), 10_000.0); // 1e6 cm
        assert_eq!(prec_to_meters(0x13), 10.0); // 1e3 cm
        assert_eq!(prec_to_meters(0x00), 0.0);
    }

    #[test]
    fn formats_a_known_wire_record() {
        // 52 22 23.000 N 4 53 32.000 E -2.00m 1m 10000m 10m
        let lat = (1u32 << 31) + 188_543_000; // 52d 22m 23s north
        let lon = (1u32 << 31) + 17_612_000; // 4d 53m 32s east
        let alt = (100_000 - 2) * 100; // -2 m
        let loc = LOC::new(0, 0x12, 0x16, 0x13, lat, lon, alt);

        assert_eq!(
            format_loc(&loc),
            "52 22 23.000 N 4 53 32.000 E -2.00m 1m 10000m 10m"
        );
    }

    #[test]
    fn formats_southern_and_western_hemispheres() {
        // 33 51 54.000 S 151 12 36.000 E (Sydney-ish)
        let lat = ((1i64 << 31) - 121_914_000) as u32;
        let lon = (1u32 << 31) + 544_356_000;
        let alt = 100_000 * 100 + 1000; // 10 m
        let loc = LOC::new(0, 0x12, 0x13, 0x13, lat, lon, alt);

        assert_eq!(
            format_loc(&loc),
            "33 51 54.000 S 151 12 36.000 E 10.00m 1m 10m 10m"
        );
    }

    #[test]
    fn formatted_output_round_trips_through_the_parser() {
        let lat = (1u32 << 31) + 188_543_000;
        let lon = (1u32 << 31) + 17_612_000;
        let loc = LOC::new(0, 0x12, 0x16, 0x13, lat, lon, (100_000 - 2) * 100);

        let parsed = locmap_core::parse_loc("x.example", &format_loc(&loc)).unwrap();
        assert!((parsed.latitude - 52.373055).abs() < 1e-4);
        assert!((parsed.longitude - 4.892222).abs() < 1e-4);
        assert_eq!(parsed.altitude_m, -2.0);
        assert_eq!(parsed.size_m, 1.0);
    }
}
