use std::fmt;

use ciborium::Value;
use serde::{Deserialize, Serialize};

use crate::cose::CoseSign1;
use crate::definitions::helpers::{NonEmptyMap, NonEmptyVec, Tag24};

pub type ItemsRequestBytes = Tag24<ItemsRequest>;
pub type DocType = String;
pub type IntentToRetain = bool;
pub type DataElements = NonEmptyMap<DataElementIdentifier, IntentToRetain>;
pub type Namespaces = NonEmptyMap<NameSpace, DataElements>;
pub type RequestInfo = NonEmptyMap<String, Value>;
pub type ReaderAuth = CoseSign1;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("a namespace identifier must not be empty")]
    EmptyNameSpace,
    #[error("a data element identifier must not be empty")]
    EmptyDataElementIdentifier,
    #[error("document request for '{0}' names no data elements")]
    NoDataElements(String),
    #[error("document request names the same entry twice: {0}")]
    DuplicateEntry(String),
}

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident, $empty:expr) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Result<Self, Error> {
                let s = s.into();
                if s.is_empty() {
                    return Err($empty);
                }
                Ok(Self(s))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = Error;

            fn try_from(s: String) -> Result<Self, Error> {
                Self::new(s)
            }
        }

        impl TryFrom<&str> for $name {
            type Error = Error;

            fn try_from(s: &str) -> Result<Self, Error> {
                Self::new(s)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

identifier!(
    /// A namespace such as `org.iso.18013.5.1`.
    NameSpace,
    Error::EmptyNameSpace
);
identifier!(
    /// The identifier of a data element within a namespace, such as `family_name`.
    DataElementIdentifier,
    Error::EmptyDataElementIdentifier
);

/// The data elements requested from a single document type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRequestSpec {
    pub doc_type: DocType,
    #[serde(rename = "nameSpaces")]
    pub namespaces: Namespaces,
}

impl DocumentRequestSpec {
    /// Build a request from `(namespace, element, intent_to_retain)` triples, keeping the
    /// order in which namespaces and elements first appear.
    pub fn from_entries<'a, I>(doc_type: impl Into<String>, entries: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (&'a str, &'a str, bool)>,
    {
        let doc_type = doc_type.into();
        let mut grouped: Vec<(NameSpace, Vec<(DataElementIdentifier, bool)>)> = Vec::new();
        for (namespace, element, intent_to_retain) in entries {
            let namespace = NameSpace::new(namespace)?;
            let element = DataElementIdentifier::new(element)?;
            let position = match grouped.iter().position(|(ns, _)| *ns == namespace) {
                Some(position) => position,
                None => {
                    grouped.push((namespace.clone(), Vec::new()));
                    grouped.len() - 1
                }
            };
            let elements = &mut grouped[position].1;
            if elements.iter().any(|(el, _)| *el == element) {
                return Err(Error::DuplicateEntry(format!("{namespace}/{element}")));
            }
            elements.push((element, intent_to_retain));
        }

        let namespaces = grouped
            .into_iter()
            .map(|(ns, elements)| {
                NonEmptyMap::try_from(elements)
                    .map(|elements| (ns, elements))
                    .map_err(|_| Error::NoDataElements(doc_type.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let namespaces =
            NonEmptyMap::try_from(namespaces).map_err(|_| Error::NoDataElements(doc_type.clone()))?;

        Ok(Self {
            doc_type,
            namespaces,
        })
    }

    /// Iterate over `(namespace, element, intent_to_retain)` in request order.
    pub fn entries(&self) -> impl Iterator<Item = (&NameSpace, &DataElementIdentifier, bool)> {
        self.namespaces.iter().flat_map(|(ns, elements)| {
            elements
                .iter()
                .map(move |(element, intent)| (ns, element, *intent))
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRequest {
    pub version: String,
    pub doc_requests: NonEmptyVec<DocRequest>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocRequest {
    pub items_request: ItemsRequestBytes,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reader_auth: Option<ReaderAuth>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ItemsRequest {
    pub doc_type: DocType,
    #[serde(rename = "nameSpaces")]
    pub namespaces: Namespaces,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_info: Option<RequestInfo>,
}

impl DeviceRequest {
    pub const VERSION: &'static str = "1.0";
}
