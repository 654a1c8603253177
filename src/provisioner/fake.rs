//! In-memory engine for tests.

use super::{Action, ProvisionError, ProvisionRequest, ProvisionResponse, Provisioner};
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Deterministic in-memory engine.
///
/// Physical ids are `phys-<logical id>`; distributions get a
/// `<lowercase id>.cloudfront.net` domain (or `d<n>.cloudfront.net`, new on
/// every apply, with [`FakeProvisioner::rotating_domains`]) and origin access
/// identities a `canonical-<logical id>` canonical user.
#[derive(Debug, Default)]
pub struct FakeProvisioner {
    /// Every call, as `(action, logical id)`
    pub calls: Vec<(Action, String)>,
    /// Last properties applied per logical id
    pub live: HashMap<String, Value>,
    reject: HashSet<String>,
    rotate_domains: bool,
    domains_issued: u32,
}

impl FakeProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every apply of `logical_id`.
    pub fn reject(mut self, logical_id: &str) -> Self {
        self.reject.insert(logical_id.to_string());
        self
    }

    /// Assign a fresh distribution domain on every apply.
    pub fn rotating_domains(mut self) -> Self {
        self.rotate_domains = true;
        self
    }

    /// Logical ids applied, in call order.
    pub fn applied(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter(|(a, _)| *a == Action::Apply)
            .map(|(_, id)| id.as_str())
            .collect()
    }

    fn attributes(&mut self, request: &ProvisionRequest) -> IndexMap<String, String> {
        let mut attrs = IndexMap::new();
        if request.resource_type.ends_with("::Distribution") {
            let host = if self.rotate_domains {
                self.domains_issued += 1;
                format!("d{}", self.domains_issued)
            } else {
                request.logical_id.to_lowercase()
            };
            attrs.insert("DomainName".to_string(), format!("{}.cloudfront.net", host));
        }
        if request.resource_type.ends_with("OriginAccessIdentity") {
            attrs.insert(
                "S3CanonicalUserId".to_string(),
                format!("canonical-{}", request.logical_id),
            );
        }
        attrs
    }
}

impl Provisioner for FakeProvisioner {
    fn apply(&mut self, request: &ProvisionRequest) -> Result<ProvisionResponse, ProvisionError> {
        self.calls.push((Action::Apply, request.logical_id.clone()));
        if self.reject.contains(&request.logical_id) {
            return Err(ProvisionError(format!(
                "engine rejected {}",
                request.logical_id
            )));
        }
        self.live
            .insert(request.logical_id.clone(), request.properties.clone());
        Ok(ProvisionResponse {
            physical_id: request
                .physical_id
                .clone()
                .unwrap_or_else(|| format!("phys-{}", request.logical_id)),
            attributes: self.attributes(request),
        })
    }

    fn destroy(&mut self, request: &ProvisionRequest) -> Result<(), ProvisionError> {
        self.calls.push((Action::Destroy, request.logical_id.clone()));
        self.live.remove(&request.logical_id);
        Ok(())
    }

    fn describe(&mut self, request: &ProvisionRequest) -> Result<Option<Value>, ProvisionError> {
        self.calls.push((Action::Describe, request.logical_id.clone()));
        Ok(self.live.get(&request.logical_id).cloned())
    }
}
