//! Required stack inputs, validated once at the boundary.
//!
//! The three external identifiers arrive as template expressions in the stack
//! file (normally `{{env.NAME}}`). They are resolved against an environment
//! snapshot and parsed into typed values here; nothing downstream reads the
//! environment or re-validates them. The typed values can only be obtained
//! through their `parse` constructors, so composition cannot start with a
//! missing or malformed identifier.

use super::error::{Result, StackError};
use super::resolver::{self, Environment};
use super::types::StackConfig;
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

pub const HOSTED_ZONE_ID: &str = "hosted_zone_id";
pub const HOSTED_ZONE_NAME: &str = "hosted_zone_name";
pub const CERTIFICATE_ARN: &str = "certificate_arn";

/// Identifier of an existing hosted zone, e.g. `Z0123456789ABCDEFGHIJ`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedZoneId(String);

/// A DNS domain name, lower-cased and without the trailing dot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainName(String);

/// Reference to a previously issued certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateArn(String);

fn zone_id_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Z0-9]{1,32}$").expect("static regex"))
}

fn label_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?$").expect("static regex")
    })
}

fn malformed(input: &'static str, value: &str, reason: impl Into<String>) -> StackError {
    StackError::MalformedInput {
        input,
        value: value.to_string(),
        reason: reason.into(),
    }
}

impl HostedZoneId {
    /// Accepts a bare id or the `/hostedzone/<id>` form.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let id = trimmed.strip_prefix("/hostedzone/").unwrap_or(trimmed);
        if !zone_id_pattern().is_match(id) {
            return Err(malformed(
                HOSTED_ZONE_ID,
                raw,
                "expected 1-32 upper-case letters or digits",
            ));
        }
        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl DomainName {
    pub fn parse(raw: &str) -> Result<Self> {
        let lowered = raw.trim().to_ascii_lowercase();
        let name = lowered.strip_suffix('.').unwrap_or(&lowered);
        if name.len() > 253 {
            return Err(malformed(HOSTED_ZONE_NAME, raw, "longer than 253 characters"));
        }
        let labels: Vec<&str> = name.split('.').collect();
        if labels.len() < 2 {
            return Err(malformed(
                HOSTED_ZONE_NAME,
                raw,
                "expected at least two labels, e.g. example.com",
            ));
        }
        if let Some(bad) = labels.iter().find(|l| !label_pattern().is_match(l)) {
            return Err(malformed(
                HOSTED_ZONE_NAME,
                raw,
                format!("invalid label '{}'", bad),
            ));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `<label>.<self>`
    pub fn subdomain(&self, label: &str) -> String {
        format!("{}.{}", label, self.0)
    }
}

impl CertificateArn {
    /// Only the shape is checked; whether the certificate covers the bound
    /// domain is decided by the provisioning engine at apply time.
    pub fn parse(raw: &str) -> Result<Self> {
        let arn = raw.trim();
        if !arn.starts_with("arn:") {
            return Err(malformed(CERTIFICATE_ARN, raw, "must start with 'arn:'"));
        }
        if arn.chars().any(char::is_whitespace) {
            return Err(malformed(CERTIFICATE_ARN, raw, "must not contain whitespace"));
        }
        let segments: Vec<&str> = arn.split(':').collect();
        if segments.len() < 3 || segments.last().is_some_and(|s| s.is_empty()) {
            return Err(malformed(
                CERTIFICATE_ARN,
                raw,
                "expected arn:<service>:...:<resource>",
            ));
        }
        Ok(Self(arn.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HostedZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for CertificateArn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The validated identifiers a composition needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackInputs {
    pub hosted_zone_id: HostedZoneId,
    pub hosted_zone_name: DomainName,
    pub certificate_arn: CertificateArn,
}

impl StackInputs {
    /// Resolve and parse all three inputs. Every missing or malformed input is
    /// reported, not just the first.
    pub fn resolve(config: &StackConfig, env: &Environment) -> Result<Self> {
        let mut errors = Vec::new();

        let zone_id = resolve_one(config, env, HOSTED_ZONE_ID, config.inputs.hosted_zone_id.as_deref())
            .and_then(|raw| HostedZoneId::parse(&raw))
            .map_err(|e| errors.push(e))
            .ok();
        let zone_name = resolve_one(config, env, HOSTED_ZONE_NAME, config.inputs.hosted_zone_name.as_deref())
            .and_then(|raw| DomainName::parse(&raw))
            .map_err(|e| errors.push(e))
            .ok();
        let cert = resolve_one(config, env, CERTIFICATE_ARN, config.inputs.certificate_arn.as_deref())
            .and_then(|raw| CertificateArn::parse(&raw))
            .map_err(|e| errors.push(e))
            .ok();

        match (zone_id, zone_name, cert) {
            (Some(hosted_zone_id), Some(hosted_zone_name), Some(certificate_arn)) => Ok(Self {
                hosted_zone_id,
                hosted_zone_name,
                certificate_arn,
            }),
            _ if errors.len() == 1 => Err(errors.remove(0)),
            _ => Err(StackError::InvalidInputs(errors)),
        }
    }
}

fn resolve_one(
    config: &StackConfig,
    env: &Environment,
    input: &'static str,
    expr: Option<&str>,
) -> Result<String> {
    let expr = expr.ok_or_else(|| StackError::MalformedInput {
        input,
        value: String::new(),
        reason: format!("not declared under 'inputs' in stack '{}'", config.name),
    })?;
    for var in resolver::referenced_env_vars(expr) {
        if env.get(&var).map_or(true, |v| v.trim().is_empty()) {
            return Err(StackError::MissingInput {
                input,
                variable: var,
            });
        }
    }
    let value = resolver::resolve_template(expr, &config.params, env)?;
    if value.trim().is_empty() {
        return Err(malformed(input, &value, "resolved to an empty value"));
    }
    Ok(value)
}
