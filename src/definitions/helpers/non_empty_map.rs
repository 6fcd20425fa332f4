use std::{fmt, marker::PhantomData};

use serde::{
    de::{MapAccess, Visitor},
    ser::SerializeMap,
    Deserialize, Deserializer, Serialize, Serializer,
};

/// A map with at least one entry which keeps its entries in insertion order.
///
/// The encoding of a CBOR map follows the order of its entries, so requests built from the
/// same input encode to identical bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonEmptyMap<K, V>(Vec<(K, V)>);

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot construct a non-empty map from an empty map")]
    Empty,
    #[error("duplicate map key")]
    DuplicateKey,
}

impl<K: PartialEq, V> NonEmptyMap<K, V> {
    pub fn new(k: K, v: V) -> Self {
        Self(vec![(k, v)])
    }

    /// Insert an entry, replacing the value in place if the key is already present.
    pub fn insert(&mut self, k: K, v: V) -> Option<V> {
        match self.0.iter_mut().find(|(key, _)| *key == k) {
            Some((_, existing)) => Some(std::mem::replace(existing, v)),
            None => {
                self.0.push((k, v));
                None
            }
        }
    }

    pub fn get<Q>(&self, k: &Q) -> Option<&V>
    where
        K: PartialEq<Q>,
        Q: ?Sized,
    {
        self.0.iter().find(|(key, _)| key == k).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.0.iter().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.0.iter().map(|(k, _)| k)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn into_inner(self) -> Vec<(K, V)> {
        self.0
    }
}

impl<K: PartialEq, V> TryFrom<Vec<(K, V)>> for NonEmptyMap<K, V> {
    type Error = Error;

    fn try_from(entries: Vec<(K, V)>) -> Result<NonEmptyMap<K, V>, Error> {
        if entries.is_empty() {
            return Err(Error::Empty);
        }
        for (i, (k, _)) in entries.iter().enumerate() {
            if entries[..i].iter().any(|(other, _)| other == k) {
                return Err(Error::DuplicateKey);
            }
        }
        Ok(NonEmptyMap(entries))
    }
}

impl<K: Serialize, V: Serialize> Serialize for NonEmptyMap<K, V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

struct NonEmptyMapVisitor<K, V>(PhantomData<(K, V)>);

impl<'de, K, V> Visitor<'de> for NonEmptyMapVisitor<K, V>
where
    K: Deserialize<'de> + PartialEq,
    V: Deserialize<'de>,
{
    type Value = NonEmptyMap<K, V>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a non-empty map")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some(entry) = access.next_entry()? {
            entries.push(entry);
        }
        NonEmptyMap::try_from(entries).map_err(serde::de::Error::custom)
    }
}

impl<'de, K, V> Deserialize<'de> for NonEmptyMap<K, V>
where
    K: Deserialize<'de> + PartialEq,
    V: Deserialize<'de>,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(NonEmptyMapVisitor(PhantomData))
    }
}
