/// Custom serialization/deserialization for u64 as a string.
///
/// Google APIs encode 64-bit integers as JSON strings; Drive's `size` is one
/// of them and is absent for folders and Google-native documents, hence the
/// `Option`.
pub(crate) mod u64_as_string {
    /// Optional `u64` as string.
    pub(crate) mod optional {
        use serde::{self, de, Deserialize, Deserializer, Serializer};

        /// Serializes an `Option<u64>` as a string or `None`.
        pub fn serialize<S>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match value {
                Some(v) => serializer.serialize_str(&v.to_string()),
                None => serializer.serialize_none(),
            }
        }

        /// Deserializes a string into an `Option<u64>`.
        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
        where
            D: Deserializer<'de>,
        {
            Option::<String>::deserialize(deserializer)?
                .map(|s| s.parse::<u64>().map_err(de::Error::custom))
                .transpose()
        }
    }
}
