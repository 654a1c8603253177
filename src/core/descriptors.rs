//! Resource descriptors: immutable, declarative descriptions of the desired
//! edge resources, handed whole to a provisioning engine.
//!
//! Descriptors reference one another through [`Token`]s rather than copied
//! strings, so a value the engine assigns late (a distribution's domain name)
//! flows to every consumer without re-running the step that built it.

use super::error::{Result, StackError};
use std::fmt;
use std::time::Duration;

// ============================================================================
// Identity and references
// ============================================================================

/// Stable identifier of a descriptor within one stack.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogicalId(String);

impl LogicalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LogicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A value that may only be known once the engine has created a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Known at composition time.
    Literal(String),
    /// The physical id the engine assigns to a resource.
    Ref(LogicalId),
    /// An attribute the engine reports for a resource.
    GetAtt { target: LogicalId, attribute: String },
    /// Concatenation of parts.
    Join(Vec<Token>),
}

impl Token {
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal(value.into())
    }

    pub fn get_att(target: &LogicalId, attribute: &str) -> Self {
        Self::GetAtt {
            target: target.clone(),
            attribute: attribute.to_string(),
        }
    }

    /// Logical ids this token depends on.
    pub fn references(&self) -> Vec<&LogicalId> {
        match self {
            Self::Literal(_) => Vec::new(),
            Self::Ref(id) => vec![id],
            Self::GetAtt { target, .. } => vec![target],
            Self::Join(parts) => parts.iter().flat_map(Token::references).collect(),
        }
    }
}

// ============================================================================
// Lookups (resolved, never created)
// ============================================================================

/// A pre-existing hosted zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneDescriptor {
    pub logical_id: LogicalId,
    pub hosted_zone_id: String,
    pub zone_name: String,
}

/// A previously issued TLS certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateDescriptor {
    pub logical_id: LogicalId,
    pub arn: String,
}

/// A storage bucket created outside this stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketRef {
    pub name: String,
    pub regional_domain_name: String,
}

impl BucketRef {
    /// Reference a bucket by name, optionally pinning its origin domain.
    pub fn new(name: &str, regional_domain_name: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            regional_domain_name: regional_domain_name
                .map(str::to_string)
                .unwrap_or_else(|| format!("{}.s3.amazonaws.com", name)),
        }
    }

    pub fn arn(&self) -> String {
        format!("arn:aws:s3:::{}", self.name)
    }

    /// ARN pattern matching every object in the bucket.
    pub fn objects_arn(&self) -> String {
        format!("{}/*", self.arn())
    }
}

// ============================================================================
// Access grant
// ============================================================================

/// Identity the distribution uses when reading from the bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginAccessIdentityDescriptor {
    pub logical_id: LogicalId,
    pub comment: String,
}

impl OriginAccessIdentityDescriptor {
    /// Canonical user the bucket policy grants to.
    pub fn canonical_user(&self) -> Token {
        Token::get_att(&self.logical_id, "S3CanonicalUserId")
    }

    /// Origin path form: `origin-access-identity/cloudfront/<id>`.
    pub fn origin_path(&self) -> Token {
        Token::Join(vec![
            Token::literal("origin-access-identity/cloudfront/"),
            Token::Ref(self.logical_id.clone()),
        ])
    }
}

/// Read access on a bucket for an identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGrantDescriptor {
    pub logical_id: LogicalId,
    pub bucket: BucketRef,
    pub grantee: Token,
    pub actions: Vec<String>,
}

// ============================================================================
// Policies
// ============================================================================

/// Whether a request component participates in the cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKeyBehavior {
    None,
}

impl CacheKeyBehavior {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
        }
    }
}

/// CDN cache policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicyDescriptor {
    pub logical_id: LogicalId,
    pub name: String,
    pub default_ttl: Duration,
    pub min_ttl: Duration,
    pub max_ttl: Duration,
    pub enable_accept_encoding_gzip: bool,
    pub enable_accept_encoding_brotli: bool,
    pub cookie_behavior: CacheKeyBehavior,
    pub header_behavior: CacheKeyBehavior,
    pub query_string_behavior: CacheKeyBehavior,
}

/// TTL triple for a cache policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    pub default: Duration,
    pub min: Duration,
    pub max: Duration,
}

impl CachePolicyDescriptor {
    /// Build a policy that keys on nothing but the path.
    ///
    /// Fails unless `min <= default <= max`.
    pub fn path_only(logical_id: LogicalId, name: String, ttls: CacheTtls) -> Result<Self> {
        if ttls.min > ttls.default || ttls.default > ttls.max {
            return Err(StackError::Validation(vec![format!(
                "cache policy '{}' requires min <= default <= max TTL (got {}s/{}s/{}s)",
                name,
                ttls.min.as_secs(),
                ttls.default.as_secs(),
                ttls.max.as_secs()
            )]));
        }
        Ok(Self {
            logical_id,
            name,
            default_ttl: ttls.default,
            min_ttl: ttls.min,
            max_ttl: ttls.max,
            enable_accept_encoding_gzip: true,
            enable_accept_encoding_brotli: true,
            cookie_behavior: CacheKeyBehavior::None,
            header_behavior: CacheKeyBehavior::None,
            query_string_behavior: CacheKeyBehavior::None,
        })
    }
}

/// A header the CDN adds to every response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomHeader {
    pub header: String,
    pub value: String,
    /// Replace a header of the same name sent by the origin
    pub override_origin: bool,
}

/// Response header policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHeadersPolicyDescriptor {
    pub logical_id: LogicalId,
    pub name: String,
    pub custom_headers: Vec<CustomHeader>,
}

impl ResponseHeadersPolicyDescriptor {
    /// Fails if two headers share a name (HTTP header names are case-insensitive).
    pub fn new(logical_id: LogicalId, name: String, custom_headers: Vec<CustomHeader>) -> Result<Self> {
        let mut seen: Vec<String> = Vec::new();
        for h in &custom_headers {
            let key = h.header.to_ascii_lowercase();
            if seen.contains(&key) {
                return Err(StackError::Validation(vec![format!(
                    "response headers policy '{}' sets header '{}' more than once",
                    name, h.header
                )]));
            }
            seen.push(key);
        }
        Ok(Self {
            logical_id,
            name,
            custom_headers,
        })
    }
}

// ============================================================================
// Distribution
// ============================================================================

/// Named minimum TLS security policy for viewer connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityPolicyProtocol {
    TlsV1_2_2021,
}

impl SecurityPolicyProtocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TlsV1_2_2021 => "TLSv1.2_2021",
        }
    }
}

/// How viewers reaching the distribution over HTTP are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerProtocolPolicy {
    RedirectToHttps,
}

impl ViewerProtocolPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RedirectToHttps => "redirect-to-https",
        }
    }
}

/// Bucket origin reached through an origin access identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginDescriptor {
    pub id: String,
    pub domain_name: String,
    pub access_identity: Token,
}

/// The distribution's default cache behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BehaviorDescriptor {
    pub origin: OriginDescriptor,
    pub viewer_protocol_policy: ViewerProtocolPolicy,
    pub cache_policy: Token,
    pub response_headers_policy: Token,
}

/// Substitution applied when the origin answers with an error status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorResponse {
    pub http_status: u16,
    pub response_http_status: u16,
    pub response_page_path: String,
    pub ttl: Duration,
}

/// CDN distribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionDescriptor {
    pub logical_id: LogicalId,
    pub default_root_object: String,
    pub domain_names: Vec<String>,
    pub certificate: Token,
    pub minimum_protocol_version: SecurityPolicyProtocol,
    pub default_behavior: BehaviorDescriptor,
    pub error_responses: Vec<ErrorResponse>,
    /// Resources that must exist before the distribution is created
    pub depends_on: Vec<LogicalId>,
}

impl DistributionDescriptor {
    /// The domain name the provider assigns, e.g. `d111.cloudfront.net`.
    pub fn domain_name(&self) -> Token {
        Token::get_att(&self.logical_id, "DomainName")
    }
}

// ============================================================================
// DNS
// ============================================================================

/// DNS record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    Cname,
}

impl RecordType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cname => "CNAME",
        }
    }
}

/// A record in a resolved zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRecordDescriptor {
    pub logical_id: LogicalId,
    pub record_type: RecordType,
    /// Label relative to the zone, e.g. `signal`
    pub record_name: String,
    pub zone: ZoneDescriptor,
    /// Target of the alias
    pub domain_name: Token,
    pub ttl: Duration,
}

impl DnsRecordDescriptor {
    /// Fully-qualified record name with trailing dot.
    pub fn fqdn(&self) -> String {
        format!("{}.{}.", self.record_name, self.zone.zone_name)
    }
}
