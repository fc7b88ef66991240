//! Root-domain (effective TLD + 1) extraction.
//!
//! Backed by the bundled public-suffix list. The store keys LOC records
//! by FQDN; the root domain is derived at submission time purely for
//! grouping, so any `fqdn -> root` function with the same signature can
//! stand in (see [`RootDomainFn`]).

/// Signature of a root-domain extractor, for callers that want to swap
/// in their own suffix policy.
pub type RootDomainFn = fn(&str) -> String;

/// Extract the registrable domain from an FQDN.
///
/// `www.example.co.uk` becomes `example.co.uk`. When the name cannot be
/// split against the suffix list (bare TLDs, private labels, junk), the
/// input itself is returned so the record is never dropped on this path.
pub fn root_domain(fqdn: &str) -> String {
    let host = fqdn.trim_end_matches('.');
    match psl::domain_str(host) {
        Some(domain) => domain.to_string(),
        None => host.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_subdomains() {
        assert_eq!(root_domain("www.example.com"), "example.com");
        assert_eq!(root_domain("a.b.c.example.com"), "example.com");
    }

    #[test]
    fn respects_multi_label_suffixes() {
        assert_eq!(root_domain("www.example.co.uk"), "example.co.uk");
    }

    #[test]
    fn trailing_dot_is_ignored() {
        assert_eq!(root_domain("www.example.com."), "example.com");
    }

    #[test]
    fn unsplittable_names_fall_back_to_input() {
        assert_eq!(root_domain("localhost"), "localhost");
        assert_eq!(root_domain("com"), "com");
    }
}
