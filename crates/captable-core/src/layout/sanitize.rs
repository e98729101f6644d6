//! Turning free-form domain names into defined-name-safe slugs.

use std::collections::BTreeMap;

use captable_model::looks_like_cell_reference;

/// Map an arbitrary string onto `[A-Za-z0-9_]+` so it can be embedded in a
/// defined or table name.
///
/// The result never starts with a digit and never reads as a cell
/// reference (`A1`, `R1C1`, `R`, `C`); both get a leading `_`.
pub fn sanitize_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        let mapped = if ch.is_ascii_alphanumeric() { ch } else { '_' };
        if mapped == '_' && out.ends_with('_') {
            continue;
        }
        out.push(mapped);
    }

    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        return "_".to_string();
    }
    if trimmed.starts_with(|c: char| c.is_ascii_digit()) || looks_like_cell_reference(trimmed) {
        return format!("_{trimmed}");
    }
    trimmed.to_string()
}

/// First-seen disambiguation of slugs within one domain kind.
///
/// Distinct raw names that sanitize to the same slug get `_2`, `_3`, ...
/// suffixes in the order they are first seen. Asking again for a raw name
/// returns the slug it was given the first time.
#[derive(Debug, Default)]
pub struct SlugRegistry {
    by_raw: BTreeMap<String, String>,
    /// Upper-cased slugs already handed out; names are case-insensitive.
    taken: BTreeMap<String, String>,
}

impl SlugRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slug(&mut self, raw: &str) -> String {
        if let Some(existing) = self.by_raw.get(raw) {
            return existing.clone();
        }

        let base = sanitize_name(raw);
        let mut candidate = base.clone();
        let mut n = 2;
        while self.taken.contains_key(&candidate.to_ascii_uppercase()) {
            candidate = format!("{base}_{n}");
            n += 1;
        }

        self.taken
            .insert(candidate.to_ascii_uppercase(), raw.to_string());
        self.by_raw.insert(raw.to_string(), candidate.clone());
        candidate
    }
}
