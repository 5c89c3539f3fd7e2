//! JSON deserialization that reports where in the document it failed.
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

fn located(err: serde_path_to_error::Error<serde_json::Error>) -> Error {
    let path = err.path().to_string();
    Error::JsonPath { path, message: err.into_inner().to_string() }
}

pub fn from_str_with_path<T: DeserializeOwned>(src: &str) -> Result<T> {
    let de = &mut serde_json::Deserializer::from_str(src);
    serde_path_to_error::deserialize::<_, T>(de).map_err(located)
}

pub fn from_slice_with_path<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let de = &mut serde_json::Deserializer::from_slice(bytes);
    serde_path_to_error::deserialize::<_, T>(de).map_err(located)
}

/// Reads and deserializes a JSON file, keeping the path context on failure.
pub fn from_file_with_path<T: DeserializeOwned>(path: impl AsRef<std::path::Path>) -> Result<T> {
    let bytes = std::fs::read(path.as_ref())?;
    from_slice_with_path(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn errors_name_the_failing_path() {
        let err = from_str_with_path::<BTreeMap<String, Vec<u32>>>(r#"{"a": [1, "x"]}"#)
            .unwrap_err();
        match err {
            Error::JsonPath { path, .. } => assert_eq!(path, "a[1]"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
