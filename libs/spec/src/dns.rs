//! DNS record naming for instance networks.

/// Default root domain for instance records.
pub const DEFAULT_ROOT_DOMAIN: &str = "fleet";

/// Lowercase, map `_` to `-`, and drop anything outside `[a-z0-9-]`.
pub fn canonicalize(label: &str) -> String {
    label
        .chars()
        .map(|c| c.to_ascii_lowercase())
        .map(|c| if c == '_' { '-' } else { c })
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')
        .collect()
}

/// `<index>.<job>.<network>.<deployment>.<domain>`
pub fn dns_record_name(
    index: &str,
    job_name: &str,
    network_name: &str,
    deployment_name: &str,
    root_domain: &str,
) -> String {
    format!(
        "{}.{}.{}.{}.{}",
        index,
        canonicalize(job_name),
        canonicalize(network_name),
        canonicalize(deployment_name),
        root_domain
    )
}
