//! Resource kinds: how each type of record maps onto the REST API.
//!
//! A [`ResourceKind`] is pure description. Path templates use `{name}`
//! placeholders that are filled from record attributes at build time, so
//! one kind serves every mount of an engine (`{backend}/roles` is the same
//! kind whether the PKI engine is mounted at `pki` or `pki-int`).

use std::fmt;

use crate::normalize::FieldCase;

/// HTTP methods used against the API. `LIST` is expressed as `GET` with
/// `list=true`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Description of one resource type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceKind {
    /// Type name, e.g. `secret-engine`.
    pub name: String,
    /// Path template relative to `/v1/`, e.g. `{backend}/roles`.
    pub path: String,
    /// Attribute that names a record when no explicit id is given.
    pub id_attribute: String,
    /// Field-name translation between wire and attributes.
    pub field_case: FieldCase,
    /// Whether paths are prefixed with the current namespace.
    pub namespaced: bool,
    /// Singleton resources have no id segment.
    pub singleton: bool,
    /// Method used to update an existing record.
    pub update_method: Method,
}

impl ResourceKind {
    /// A namespaced, snake-case kind identified by `id`.
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            id_attribute: "id".to_owned(),
            field_case: FieldCase::Preserve,
            namespaced: true,
            singleton: false,
            update_method: Method::Post,
        }
    }

    #[must_use]
    pub fn id_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.id_attribute = attribute.into();
        self
    }

    #[must_use]
    pub fn camel_case(mut self) -> Self {
        self.field_case = FieldCase::Camel;
        self
    }

    #[must_use]
    pub fn root_only(mut self) -> Self {
        self.namespaced = false;
        self
    }

    #[must_use]
    pub fn singleton(mut self) -> Self {
        self.singleton = true;
        self
    }

    #[must_use]
    pub fn update_with(mut self, method: Method) -> Self {
        self.update_method = method;
        self
    }

    /// Placeholder names in the path template, in order.
    #[must_use]
    pub fn template_params(&self) -> Vec<&str> {
        self.path
            .split('/')
            .filter_map(|segment| segment.strip_prefix('{')?.strip_suffix('}'))
            .collect()
    }
}

/// Secrets engine mounts.
#[must_use]
pub fn secret_engine() -> ResourceKind {
    ResourceKind::new("secret-engine", "sys/mounts").id_attribute("path")
}

/// Auth method mounts.
#[must_use]
pub fn auth_method() -> ResourceKind {
    ResourceKind::new("auth-method", "sys/auth").id_attribute("path")
}

/// ACL policies.
#[must_use]
pub fn policy() -> ResourceKind {
    ResourceKind::new("policy", "sys/policies/acl")
        .id_attribute("name")
        .update_with(Method::Put)
}

/// Child namespaces of the current namespace.
#[must_use]
pub fn namespace() -> ResourceKind {
    ResourceKind::new("namespace", "sys/namespaces").id_attribute("path")
}

/// The namespaces the current token can reach.
#[must_use]
pub fn ui_namespace() -> ResourceKind {
    ResourceKind::new("ui-namespace", "sys/internal/ui/namespaces").id_attribute("path")
}

/// PKI roles under a PKI mount.
#[must_use]
pub fn pki_role() -> ResourceKind {
    ResourceKind::new("pki-role", "{backend}/roles")
        .id_attribute("name")
        .camel_case()
}

/// Certificates stored by a PKI mount.
#[must_use]
pub fn pki_certificate() -> ResourceKind {
    ResourceKind::new("pki-certificate", "{backend}/cert")
        .id_attribute("serial_number")
        .camel_case()
}

/// Issue/sign endpoints of a PKI mount; the sub-resource segment picks one.
#[must_use]
pub fn pki_issue() -> ResourceKind {
    ResourceKind::new("pki-issue", "{backend}").id_attribute("role")
}

/// Status of the last PKI tidy operation.
#[must_use]
pub fn pki_tidy_status() -> ResourceKind {
    ResourceKind::new("pki-tidy-status", "{backend}/tidy-status")
        .camel_case()
        .singleton()
}

/// Replication status. Only served from the root namespace.
#[must_use]
pub fn replication_status() -> ResourceKind {
    ResourceKind::new("replication-status", "sys/replication/status")
        .camel_case()
        .root_only()
        .singleton()
}

/// Transit encryption keys under a transit mount.
#[must_use]
pub fn transit_key() -> ResourceKind {
    ResourceKind::new("transit-key", "{backend}/keys").id_attribute("name")
}

/// Every built-in kind.
#[must_use]
pub fn builtin() -> Vec<ResourceKind> {
    vec![
        secret_engine(),
        auth_method(),
        policy(),
        namespace(),
        ui_namespace(),
        pki_role(),
        pki_certificate(),
        pki_issue(),
        pki_tidy_status(),
        replication_status(),
        transit_key(),
    ]
}

/// Find a built-in kind by name.
#[must_use]
pub fn lookup(name: &str) -> Option<ResourceKind> {
    builtin().into_iter().find(|kind| kind.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_params_lists_placeholders() {
        assert_eq!(pki_role().template_params(), vec!["backend"]);
        assert!(secret_engine().template_params().is_empty());
        let nested = ResourceKind::new("x", "{backend}/roles/{role}/creds");
        assert_eq!(nested.template_params(), vec!["backend", "role"]);
    }

    #[test]
    fn lookup_finds_builtins_by_name() {
        let kind = lookup("pki-role").map(|k| k.id_attribute);
        assert_eq!(kind.as_deref(), Some("name"));
        assert!(lookup("nope").is_none());
    }

    #[test]
    fn builtin_names_are_unique() {
        let mut names: Vec<String> = builtin().into_iter().map(|k| k.name).collect();
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total);
    }
}
