//! Request type definitions

use serde::{Deserialize, Serialize};

/// Query string of the resolve endpoint (`GET /?id=<contentId>`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolveQuery {
    /// Content identifier substituted into source templates
    pub id: Option<String>,
}

impl ResolveQuery {
    /// The content id, if present and not blank
    pub fn content_id(&self) -> Option<&str> {
        self.id.as_deref().map(str::trim).filter(|id| !id.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_id_is_absent() {
        let query = ResolveQuery {
            id: Some("  ".to_string()),
        };
        assert_eq!(query.content_id(), None);
        assert_eq!(ResolveQuery::default().content_id(), None);
    }

    #[test]
    fn test_id_is_trimmed() {
        let query: ResolveQuery = serde_json::from_str(r#"{"id":" 550 "}"#).unwrap();
        assert_eq!(query.content_id(), Some("550"));
    }
}
