//! Tag sets and the delimited tag text format
//!
//! Tags travel as `key:value` pairs joined by `|` (`env:prod|team:core`).
//! Upstream exports are looser: pairs may be comma separated and use `=`
//! instead of `:`. [`decode_tags`] accepts all of these; [`encode_tags`] always
//! writes the canonical pipe/colon form and backslash-escapes the delimiter
//! characters `\ | , : =` so any key or value survives a round trip.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

const PAIR_SEPARATOR: char = '|';
const ALT_PAIR_SEPARATOR: char = ',';
const KV_SEPARATOR: char = ':';
const ALT_KV_SEPARATOR: char = '=';
const ESCAPE: char = '\\';

/// Ordered `key -> value` tag mapping.
///
/// Keeps insertion order for output; equality ignores order.
#[derive(Debug, Clone, Default)]
pub struct TagSet {
    entries: Vec<(String, String)>,
}

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a tag; an existing key keeps its position and takes the new value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Merge another set into this one, later values winning
    pub fn extend_from(&mut self, other: &TagSet) {
        for (k, v) in other.iter() {
            self.insert(k, v);
        }
    }
}

impl PartialEq for TagSet {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl Eq for TagSet {}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TagSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut tags = TagSet::new();
        for (k, v) in iter {
            tags.insert(k, v);
        }
        tags
    }
}

impl fmt::Display for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode_tags(self))
    }
}

impl Serialize for TagSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for TagSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TagSetVisitor;

        impl<'de> Visitor<'de> for TagSetVisitor {
            type Value = TagSet;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of string tags")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<TagSet, A::Error> {
                let mut tags = TagSet::new();
                while let Some((k, v)) = access.next_entry::<String, String>()? {
                    tags.insert(k, v);
                }
                Ok(tags)
            }
        }

        deserializer.deserialize_map(TagSetVisitor)
    }
}

/// Result of decoding a free-form tag string
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedTags {
    pub tags: TagSet,
    /// Pairs discarded because they had no separator or an empty key
    pub malformed: usize,
}

/// Encode tags as `k:v|k2:v2`, escaping delimiter characters
pub fn encode_tags(tags: &TagSet) -> String {
    tags.iter()
        .map(|(k, v)| format!("{}{}{}", escape(k), KV_SEPARATOR, escape(v)))
        .collect::<Vec<_>>()
        .join(&PAIR_SEPARATOR.to_string())
}

/// Decode a delimited tag string.
///
/// Pairs are separated by `|`, or by `,` when the text contains no unescaped
/// `|`. Each pair splits on its first unescaped `:` (or `=` when there is no
/// `:`). Malformed pairs are dropped and counted.
pub fn decode_tags(text: &str) -> DecodedTags {
    let mut decoded = DecodedTags::default();

    let separator = if find_unescaped(text, PAIR_SEPARATOR).is_some() {
        PAIR_SEPARATOR
    } else {
        ALT_PAIR_SEPARATOR
    };

    for pair in split_unescaped(text, separator) {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }

        let split_at = find_unescaped(pair, KV_SEPARATOR)
            .or_else(|| find_unescaped(pair, ALT_KV_SEPARATOR));
        let Some(idx) = split_at else {
            decoded.malformed += 1;
            continue;
        };

        let key = unescape(pair[..idx].trim());
        let value = unescape(pair[idx + 1..].trim());
        if key.is_empty() {
            decoded.malformed += 1;
            continue;
        }
        decoded.tags.insert(key, value);
    }

    decoded
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(
            c,
            ESCAPE | PAIR_SEPARATOR | ALT_PAIR_SEPARATOR | KV_SEPARATOR | ALT_KV_SEPARATOR
        ) {
            out.push(ESCAPE);
        }
        out.push(c);
    }
    out
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == ESCAPE {
            // a trailing lone backslash is kept as-is
            out.push(chars.next().unwrap_or(ESCAPE));
        } else {
            out.push(c);
        }
    }
    out
}

/// Byte offset of the first unescaped `needle`
fn find_unescaped(text: &str, needle: char) -> Option<usize> {
    let mut escaped = false;
    for (idx, c) in text.char_indices() {
        if escaped {
            escaped = false;
        } else if c == ESCAPE {
            escaped = true;
        } else if c == needle {
            return Some(idx);
        }
    }
    None
}

fn split_unescaped(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut rest = text;
    while let Some(idx) = find_unescaped(rest, separator) {
        parts.push(&rest[..idx]);
        rest = &rest[idx + separator.len_utf8()..];
    }
    parts.push(rest);
    parts
}
