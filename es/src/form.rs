//! Multipart form bodies for API endpoint calls
//!
//! Every parameter becomes a text part holding the JSON encoding of its
//! value, so the server can decode strings, numbers and objects uniformly.
//! Files are sent as raw parts.

use reqwest::multipart::{Form, Part};
use serde_json::{Map, Value};
use tracing::debug;

/// One part of a form body
#[derive(Debug, Clone, PartialEq)]
pub enum FormPart {
    Text(String),
    File { file_name: String, bytes: Vec<u8> },
}

/// Ordered list of named form parts
#[derive(Debug, Clone, Default)]
pub struct FormBody {
    parts: Vec<(String, FormPart)>,
}

impl FormBody {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode every non-null value of `params`
    pub fn from_json(params: &Map<String, Value>) -> Self {
        debug!(param_count = params.len(), "FormBody::from_json: called");
        params
            .iter()
            .fold(Self::new(), |body, (name, value)| body.field(name, value))
    }

    /// Add a JSON-encoded field; null values are skipped
    pub fn field(mut self, name: impl Into<String>, value: &Value) -> Self {
        if value.is_null() {
            return self;
        }
        self.parts.push((name.into(), FormPart::Text(value.to_string())));
        self
    }

    /// Add a file part
    pub fn file(mut self, name: impl Into<String>, file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.parts.push((
            name.into(),
            FormPart::File {
                file_name: file_name.into(),
                bytes,
            },
        ));
        self
    }

    pub fn parts(&self) -> &[(String, FormPart)] {
        &self.parts
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Convert into a reqwest multipart form
    pub fn into_form(self) -> Form {
        self.parts.into_iter().fold(Form::new(), |form, (name, part)| match part {
            FormPart::Text(text) => form.text(name, text),
            FormPart::File { file_name, bytes } => form.part(name, Part::bytes(bytes).file_name(file_name)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text(s: &str) -> FormPart {
        FormPart::Text(s.to_string())
    }

    #[test]
    fn test_values_are_json_encoded() {
        let params = json!({"name": "bob", "count": 3, "tags": ["a", "b"], "nested": {"ok": true}});
        let body = FormBody::from_json(params.as_object().unwrap());

        let parts: Vec<_> = body.parts().to_vec();
        assert!(parts.contains(&("name".to_string(), text("\"bob\""))));
        assert!(parts.contains(&("count".to_string(), text("3"))));
        assert!(parts.contains(&("tags".to_string(), text("[\"a\",\"b\"]"))));
        assert!(parts.contains(&("nested".to_string(), text("{\"ok\":true}"))));
    }

    #[test]
    fn test_null_values_are_skipped() {
        let params = json!({"name": "bob", "nickname": null});
        let body = FormBody::from_json(params.as_object().unwrap());

        assert_eq!(body.parts().len(), 1);
        assert_eq!(body.parts()[0].0, "name");
    }

    #[test]
    fn test_file_parts_are_kept_raw() {
        let body = FormBody::new()
            .field("title", &json!("report"))
            .file("upload", "report.csv", b"a,b\n1,2\n".to_vec());

        assert_eq!(
            body.parts()[1],
            (
                "upload".to_string(),
                FormPart::File {
                    file_name: "report.csv".to_string(),
                    bytes: b"a,b\n1,2\n".to_vec(),
                }
            )
        );
        // Conversion should not panic for mixed parts
        let _form = body.into_form();
    }

    #[test]
    fn test_empty_body() {
        let body = FormBody::from_json(&Map::new());
        assert!(body.is_empty());
    }
}
