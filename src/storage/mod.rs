//! Repository implementations for collections and tokens.

pub mod in_memory;
pub mod sqlite;

pub use in_memory::InMemoryStore;
pub use sqlite::SqliteStore;

use std::cmp::Ordering;

use crate::domain::{parse_order, Collection, ListOptions, OrderBy, Token};

/// Field-wise comparison used to apply a parsed ORDER BY in memory.
pub(crate) trait Sortable {
    fn compare_field(&self, other: &Self, field: &str) -> Ordering;
}

impl Sortable for Collection {
    fn compare_field(&self, other: &Self, field: &str) -> Ordering {
        match field {
            "id" => self.id.cmp(&other.id),
            "created_at" => self.created_at.cmp(&other.created_at),
            "p" => self.p.cmp(&other.p),
            "tick" => self.tick.cmp(&other.tick),
            "block_height" => self.block_height.cmp(&other.block_height),
            "block_time" => self.block_time.cmp(&other.block_time),
            "inscription_id" => self.inscription_id.cmp(&other.inscription_id),
            _ => Ordering::Equal,
        }
    }
}

impl Sortable for Token {
    fn compare_field(&self, other: &Self, field: &str) -> Ordering {
        match field {
            "id" => self.id.cmp(&other.id),
            "created_at" => self.created_at.cmp(&other.created_at),
            "p" => self.p.cmp(&other.p),
            "tick" => self.tick.cmp(&other.tick),
            "token_id" => self.token_id.cmp(&other.token_id),
            "block_height" => self.block_height.cmp(&other.block_height),
            "block_time" => self.block_time.cmp(&other.block_time),
            "inscription_id" => self.inscription_id.cmp(&other.inscription_id),
            _ => Ordering::Equal,
        }
    }
}

/// Whitelisted ORDER BY for a listing; unknown fields are dropped.
pub(crate) fn order_for(opts: &ListOptions, whitelist: &[&'static str]) -> Vec<OrderBy> {
    opts.order
        .as_deref()
        .map(|order| parse_order(order, whitelist))
        .unwrap_or_default()
}

pub(crate) fn sort_by_order<T: Sortable>(items: &mut [T], order: &[OrderBy]) {
    items.sort_by(|a, b| {
        order
            .iter()
            .map(|o| {
                let ord = a.compare_field(b, o.field);
                if o.descending {
                    ord.reverse()
                } else {
                    ord
                }
            })
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
}

fn matches_filter(p: &str, tick: &str, opts: &ListOptions) -> bool {
    opts.p.as_deref().map_or(true, |want| want == p)
        && opts.tick.as_deref().map_or(true, |want| want == tick)
}

pub(crate) fn page<T>(items: Vec<T>, opts: &ListOptions) -> Vec<T> {
    let iter = items.into_iter().skip(opts.offset);
    if opts.limit == 0 {
        iter.collect()
    } else {
        iter.take(opts.limit).collect()
    }
}

impl Collection {
    pub(crate) fn matches(&self, opts: &ListOptions) -> bool {
        matches_filter(&self.p, &self.tick, opts)
    }
}

impl Token {
    pub(crate) fn matches(&self, opts: &ListOptions) -> bool {
        matches_filter(&self.p, &self.tick, opts)
    }
}
