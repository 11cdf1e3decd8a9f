use serde::de::DeserializeOwned;

/// Deserialization failure with the JSON path where it happened.
#[derive(Debug, thiserror::Error)]
#[error("at JSON path {path} → {source}")]
pub struct PathError {
    pub path: String,
    #[source]
    pub source: serde_json::Error,
}

/// Deserialize with JSON-path context in error messages.
pub fn from_str_with_path<T: DeserializeOwned>(src: &str) -> Result<T, PathError> {
    let de = &mut serde_json::Deserializer::from_str(src);
    serde_path_to_error::deserialize::<_, T>(de).map_err(|err| PathError {
        path: err.path().to_string(),
        source: err.into_inner(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::EntitySchema;

    #[test]
    fn schema_file_errors_point_at_the_field() {
        let src = r#"{"name": "Step", "fields": {"n": {"type": "decimal"}}}"#;
        let err = from_str_with_path::<EntitySchema>(src).unwrap_err();
        assert!(err.path.starts_with("fields.n"), "{}", err.path);
        assert!(err.to_string().starts_with("at JSON path fields.n"));
    }

    #[test]
    fn valid_schema_file_loads() {
        let src = r#"{"name": "Step", "fields": {"n": {"type": "integer", "description": "count"}}}"#;
        let schema = from_str_with_path::<EntitySchema>(src).unwrap();
        assert_eq!(schema.fields["n"].description.as_deref(), Some("count"));
    }
}
