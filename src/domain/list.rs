use serde::Deserialize;

/// Filters and paging for repository listings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ListOptions {
    pub limit: usize,
    pub offset: usize,
    pub p: Option<String>,
    pub tick: Option<String>,
    /// Comma-separated fields, `-field` for descending.
    pub order: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: &'static str,
    pub descending: bool,
}

/// Parse an order string like `"id,-tick"` against a whitelist.
///
/// Unknown fields are dropped rather than rejected.
pub fn parse_order(order: &str, whitelist: &[&'static str]) -> Vec<OrderBy> {
    order
        .split(',')
        .filter_map(|part| {
            let part = part.trim().to_lowercase();
            let (name, descending) = match part.strip_prefix('-') {
                Some(rest) => (rest.trim().to_string(), true),
                None => (part, false),
            };
            whitelist
                .iter()
                .find(|f| **f == name)
                .map(|field| OrderBy {
                    field: *field,
                    descending,
                })
        })
        .collect()
}
