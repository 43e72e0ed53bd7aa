//! REST path construction.
//!
//! Paths come out as `/v1/[<namespace>/]<resource path>[/<segments>][/<id>]`,
//! with a trailing `/` on list operations. Every failure happens here, before
//! a request exists.

use serde_json::Value;

use crate::error::ClientError;
use crate::record::Attributes;
use crate::resource::ResourceKind;

/// What the path is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Find,
    List,
    Create,
    Update,
    Delete,
}

/// Builder for one resource path.
///
/// ```
/// use zvault_console::path::{Operation, PathBuilder};
/// use zvault_console::resource;
///
/// let mut attrs = serde_json::Map::new();
/// attrs.insert("backend".into(), "pki".into());
/// let path = PathBuilder::new(&resource::pki_issue(), Operation::Create)
///     .segment("issue")
///     .id("web")
///     .attributes(&attrs)
///     .build()
///     .unwrap();
/// assert_eq!(path, "/v1/pki/issue/web");
/// ```
#[derive(Debug)]
pub struct PathBuilder<'a> {
    kind: &'a ResourceKind,
    op: Operation,
    id: Option<&'a str>,
    segments: Vec<&'a str>,
    attributes: Option<&'a Attributes>,
    namespace: &'a str,
}

impl<'a> PathBuilder<'a> {
    #[must_use]
    pub fn new(kind: &'a ResourceKind, op: Operation) -> Self {
        Self {
            kind,
            op,
            id: None,
            segments: Vec::new(),
            attributes: None,
            namespace: "",
        }
    }

    /// Explicit record id. Empty ids count as absent.
    #[must_use]
    pub fn id(mut self, id: &'a str) -> Self {
        self.id = (!id.is_empty()).then_some(id);
        self
    }

    /// Sub-resource segment placed between the resource path and the id.
    #[must_use]
    pub fn segment(mut self, segment: &'a str) -> Self {
        self.segments.push(segment);
        self
    }

    /// Attributes used for template placeholders and create-time ids.
    #[must_use]
    pub fn attributes(mut self, attributes: &'a Attributes) -> Self {
        self.attributes = Some(attributes);
        self
    }

    /// Current namespace; ignored for root-only kinds.
    #[must_use]
    pub fn namespace(mut self, namespace: &'a str) -> Self {
        self.namespace = namespace;
        self
    }

    /// Assemble the path.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::MissingAttribute`] when a template placeholder
    /// or the record id cannot be resolved.
    pub fn build(self) -> Result<String, ClientError> {
        let mut parts: Vec<String> = Vec::new();

        if self.kind.namespaced {
            parts.extend(encode_nested(self.namespace));
        }

        for segment in self.kind.path.split('/').filter(|s| !s.is_empty()) {
            match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                Some(param) => {
                    let value = self
                        .attribute_str(param)
                        .ok_or_else(|| ClientError::missing(&self.kind.name, param))?;
                    parts.extend(encode_nested(value));
                }
                None => parts.push(segment.to_owned()),
            }
        }

        for segment in &self.segments {
            parts.extend(encode_nested(segment));
        }

        if let Some(id) = self.resolve_id()? {
            parts.extend(encode_nested(id));
        }

        let mut path = format!("/v1/{}", parts.join("/"));
        if self.op == Operation::List {
            path.push('/');
        }
        Ok(path)
    }

    fn resolve_id(&self) -> Result<Option<&'a str>, ClientError> {
        if self.op == Operation::List || (self.kind.singleton && self.op == Operation::Find) {
            return Ok(None);
        }
        if let Some(id) = self.id {
            return Ok(Some(id));
        }
        if self.kind.singleton {
            return Ok(None);
        }
        self.attribute_str(&self.kind.id_attribute)
            .map(Some)
            .ok_or_else(|| ClientError::missing(&self.kind.name, &self.kind.id_attribute))
    }

    fn attribute_str(&self, name: &str) -> Option<&'a str> {
        match self.attributes?.get(name)? {
            Value::String(s) if !trim_slashes(s).is_empty() => Some(s.as_str()),
            _ => None,
        }
    }
}

fn trim_slashes(value: &str) -> &str {
    value.trim_matches('/')
}

/// Encode a possibly nested value (`team/kv/`) as separate path segments.
fn encode_nested(value: &str) -> impl Iterator<Item = String> + '_ {
    trim_slashes(value)
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| urlencoding::encode(s).into_owned())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::resource;
    use serde_json::json;

    fn attrs(value: serde_json::Value) -> Attributes {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn find_uses_explicit_id() {
        let kind = resource::policy();
        let path = PathBuilder::new(&kind, Operation::Find).id("ops").build().unwrap();
        assert_eq!(path, "/v1/sys/policies/acl/ops");
    }

    #[test]
    fn create_takes_id_from_identifying_attribute() {
        let kind = resource::secret_engine();
        let a = attrs(json!({ "path": "team/kv/", "type": "kv" }));
        let path = PathBuilder::new(&kind, Operation::Create).attributes(&a).build().unwrap();
        assert_eq!(path, "/v1/sys/mounts/team/kv");
    }

    #[test]
    fn create_without_identifying_attribute_fails() {
        let kind = resource::secret_engine();
        let a = attrs(json!({ "type": "kv" }));
        let err = PathBuilder::new(&kind, Operation::Create).attributes(&a).build().unwrap_err();
        assert!(matches!(
            err,
            ClientError::MissingAttribute { ref attribute, .. } if attribute == "path"
        ));
    }

    #[test]
    fn blank_identifying_attribute_counts_as_missing() {
        let kind = resource::secret_engine();
        let a = attrs(json!({ "path": "/" }));
        assert!(PathBuilder::new(&kind, Operation::Create).attributes(&a).build().is_err());
    }

    #[test]
    fn template_placeholder_is_filled_from_attributes() {
        let kind = resource::pki_role();
        let a = attrs(json!({ "backend": "pki-int" }));
        let path = PathBuilder::new(&kind, Operation::Find)
            .id("web")
            .attributes(&a)
            .build()
            .unwrap();
        assert_eq!(path, "/v1/pki-int/roles/web");
    }

    #[test]
    fn missing_template_placeholder_fails() {
        let kind = resource::pki_role();
        let err = PathBuilder::new(&kind, Operation::Find).id("web").build().unwrap_err();
        assert!(matches!(
            err,
            ClientError::MissingAttribute { ref attribute, .. } if attribute == "backend"
        ));
    }

    #[test]
    fn sub_resource_segment_goes_before_id() {
        let kind = resource::pki_issue();
        let a = attrs(json!({ "backend": "pki" }));
        let path = PathBuilder::new(&kind, Operation::Create)
            .segment("sign")
            .id("web")
            .attributes(&a)
            .build()
            .unwrap();
        assert_eq!(path, "/v1/pki/sign/web");
    }

    #[test]
    fn list_has_trailing_marker_and_no_id() {
        let kind = resource::policy();
        let path = PathBuilder::new(&kind, Operation::List).id("ignored").build().unwrap();
        assert_eq!(path, "/v1/sys/policies/acl/");
    }

    #[test]
    fn namespace_prefixes_namespaced_kinds() {
        let kind = resource::secret_engine();
        let path = PathBuilder::new(&kind, Operation::Find)
            .id("kv")
            .namespace("/team-a/dev/")
            .build()
            .unwrap();
        assert_eq!(path, "/v1/team-a/dev/sys/mounts/kv");
    }

    #[test]
    fn root_only_kinds_ignore_namespace() {
        let kind = resource::replication_status();
        let path = PathBuilder::new(&kind, Operation::Find)
            .namespace("team-a")
            .build()
            .unwrap();
        assert_eq!(path, "/v1/sys/replication/status");
    }

    #[test]
    fn segments_are_percent_encoded() {
        let kind = resource::policy();
        let path = PathBuilder::new(&kind, Operation::Find).id("my policy").build().unwrap();
        assert_eq!(path, "/v1/sys/policies/acl/my%20policy");
    }
}
