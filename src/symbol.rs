//! Fully-qualified symbols (FQS): the primary key used throughout the engine.

use std::fmt;
use std::str::FromStr;

use schemars::gen::SchemaGenerator;
use schemars::schema::Schema;
use schemars::JsonSchema;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// An opaque `(namespace, name)` pair identifying a definition or a
/// synthesized test. Namespace nodes use an empty `name` (see `Fqs::namespace`).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Fqs {
    namespace: String,
    name: String,
}

impl Fqs {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// A node representing a namespace itself, keyed on the namespace alone.
    pub fn namespace(ns: impl Into<String>) -> Self {
        Self::new(ns, "")
    }

    pub fn ns(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True for the synthetic key used by `Fqs::namespace`.
    pub fn is_namespace_key(&self) -> bool {
        self.name.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid symbol string {0:?}: expected \"namespace/name\"")]
pub struct FqsParseError(String);

impl FromStr for Fqs {
    type Err = FqsParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((ns, name)) if !ns.is_empty() => Ok(Fqs::new(ns, name)),
            _ => Err(FqsParseError(s.to_owned())),
        }
    }
}

impl fmt::Display for Fqs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_namespace_key() {
            write!(f, "{}", self.namespace)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

// Custom (de)serialization so that `Fqs` round-trips as a plain JSON string,
// which lets it be used directly as a map key (serde_json requires string
// keys for objects) in both persistent caches.
impl Serialize for Fqs {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

struct FqsVisitor;

impl Visitor<'_> for FqsVisitor {
    type Value = Fqs;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a symbol string of the form \"namespace/name\"")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Fqs, E> {
        v.parse().map_err(de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for Fqs {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_str(FqsVisitor)
    }
}

// Schema is delegated to `String`'s, since that's the wire representation
// (`Serialize`/`Deserialize` above) — config-schema consumers see a plain
// "namespace/name" string field, not a `{namespace, name}` object.
impl JsonSchema for Fqs {
    fn schema_name() -> String {
        "Fqs".to_string()
    }

    fn json_schema(gen: &mut SchemaGenerator) -> Schema {
        String::json_schema(gen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn round_trips_through_display_and_parse() {
        let sym = Fqs::new("a.b", "f");
        let parsed: Fqs = sym.to_string().parse().unwrap();
        assert_eq!(sym, parsed);
    }

    #[test]
    fn namespace_key_displays_bare() {
        let ns = Fqs::namespace("a.b.c");
        assert_eq!(ns.to_string(), "a.b.c");
        assert!(ns.is_namespace_key());
    }

    #[test]
    fn rejects_strings_without_a_slash() {
        assert!("no-slash-here".parse::<Fqs>().is_err());
    }

    #[test]
    fn name_may_contain_mangled_characters() {
        let sym = Fqs::new("app.core-test", "__some-test-name__");
        let json = serde_json::to_string(&sym).unwrap();
        assert_eq!(json, "\"app.core-test/__some-test-name__\"");
        let back: Fqs = serde_json::from_str(&json).unwrap();
        assert_eq!(sym, back);
    }

    #[test]
    fn serializes_as_map_key() {
        use std::collections::HashMap;
        let mut m = HashMap::new();
        m.insert(Fqs::new("a", "b"), 1u32);
        let json = serde_json::to_string(&m).unwrap();
        assert_eq!(json, "{\"a/b\":1}");
        let back: HashMap<Fqs, u32> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get(&Fqs::new("a", "b")), Some(&1));
    }
}
