//! Resource composition graph for a static frontend.
//!
//! ```text
//! resolve_zone ──────────────────────────────┐
//!                                            ├─> bind_dns
//! resolve_certificate ─> build_distribution ─┘
//!              bucket ─┘
//! ```
//!
//! Every step takes its upstream descriptors as typed parameters, so a step
//! cannot run before the step that produces its input. The DNS record points
//! at the distribution through a token, never through a re-derived name.

use super::descriptors::*;
use super::error::Result;
use super::inputs::{CertificateArn, DomainName, HostedZoneId, StackInputs};
use std::time::Duration;
use tracing::debug;

/// Label of the public hostname inside the zone.
pub const SUBDOMAIN_LABEL: &str = "signal";

pub const DEFAULT_ROOT_OBJECT: &str = "index.html";

/// One year; used as default, minimum and maximum TTL.
pub const LONG_TERM_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

pub const CACHE_CONTROL_HEADER: &str = "Cache-Control";
pub const CACHE_CONTROL_VALUE: &str = "public, max-age=31536000, immutable";

/// Where not-found requests are routed for client-side routing.
pub const SPA_FALLBACK_PATH: &str = "/index.html";

pub const MINIMUM_PROTOCOL_VERSION: SecurityPolicyProtocol = SecurityPolicyProtocol::TlsV1_2_2021;

pub const CNAME_TTL: Duration = Duration::from_secs(30 * 60);

/// Actions granted to the distribution's identity on the bucket.
pub const BUCKET_READ_ACTIONS: [&str; 3] = ["s3:GetObject*", "s3:GetBucket*", "s3:List*"];

/// Naming scope for the descriptors of one stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stack {
    name: String,
}

impl Stack {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `<stack name><suffix>`, e.g. `SignalDistribution`.
    pub fn logical_id(&self, suffix: &str) -> LogicalId {
        LogicalId::new(format!("{}{}", self.name, suffix))
    }
}

/// Look up the existing hosted zone.
pub fn resolve_zone(stack: &Stack, zone_id: &HostedZoneId, zone_name: &DomainName) -> ZoneDescriptor {
    let zone = ZoneDescriptor {
        logical_id: stack.logical_id("HostedZone"),
        hosted_zone_id: zone_id.as_str().to_string(),
        zone_name: zone_name.as_str().to_string(),
    };
    debug!(zone = %zone.hosted_zone_id, name = %zone.zone_name, "resolved hosted zone");
    zone
}

/// Reference the previously issued certificate.
pub fn resolve_certificate(stack: &Stack, arn: &CertificateArn) -> CertificateDescriptor {
    let certificate = CertificateDescriptor {
        logical_id: stack.logical_id("Certificate"),
        arn: arn.as_str().to_string(),
    };
    debug!(arn = %certificate.arn, "resolved certificate");
    certificate
}

/// Everything [`build_distribution`] issues together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionBundle {
    pub access_identity: OriginAccessIdentityDescriptor,
    pub access_grant: AccessGrantDescriptor,
    pub cache_policy: CachePolicyDescriptor,
    pub response_headers_policy: ResponseHeadersPolicyDescriptor,
    pub distribution: DistributionDescriptor,
}

/// Build the distribution in front of `bucket`, with its policies and the
/// read grant for its origin identity. The distribution depends on the grant
/// so the engine issues the grant first.
pub fn build_distribution(
    stack: &Stack,
    bucket: &BucketRef,
    certificate: &CertificateDescriptor,
    zone_name: &DomainName,
) -> Result<DistributionBundle> {
    let access_identity = OriginAccessIdentityDescriptor {
        logical_id: stack.logical_id("DistributionOAI"),
        comment: format!("Identity for {}Distribution", stack.name()),
    };

    let access_grant = AccessGrantDescriptor {
        logical_id: stack.logical_id("DistributionOAIGrant"),
        bucket: bucket.clone(),
        grantee: access_identity.canonical_user(),
        actions: BUCKET_READ_ACTIONS.iter().map(|a| a.to_string()).collect(),
    };

    let cache_policy_id = stack.logical_id("LongTermCachePolicy");
    let cache_policy = CachePolicyDescriptor::path_only(
        cache_policy_id.clone(),
        cache_policy_id.to_string(),
        CacheTtls {
            default: LONG_TERM_TTL,
            min: LONG_TERM_TTL,
            max: LONG_TERM_TTL,
        },
    )?;

    let headers_policy_id = stack.logical_id("ResponseHeadersPolicy");
    let response_headers_policy = ResponseHeadersPolicyDescriptor::new(
        headers_policy_id.clone(),
        headers_policy_id.to_string(),
        vec![CustomHeader {
            header: CACHE_CONTROL_HEADER.to_string(),
            value: CACHE_CONTROL_VALUE.to_string(),
            override_origin: true,
        }],
    )?;

    let distribution = DistributionDescriptor {
        logical_id: stack.logical_id("Distribution"),
        default_root_object: DEFAULT_ROOT_OBJECT.to_string(),
        domain_names: vec![zone_name.subdomain(SUBDOMAIN_LABEL)],
        certificate: Token::literal(&certificate.arn),
        minimum_protocol_version: MINIMUM_PROTOCOL_VERSION,
        default_behavior: BehaviorDescriptor {
            origin: OriginDescriptor {
                id: format!("{}Origin", stack.name()),
                domain_name: bucket.regional_domain_name.clone(),
                access_identity: access_identity.origin_path(),
            },
            viewer_protocol_policy: ViewerProtocolPolicy::RedirectToHttps,
            cache_policy: Token::Ref(cache_policy.logical_id.clone()),
            response_headers_policy: Token::Ref(response_headers_policy.logical_id.clone()),
        },
        error_responses: vec![ErrorResponse {
            http_status: 404,
            response_http_status: 200,
            response_page_path: SPA_FALLBACK_PATH.to_string(),
            ttl: Duration::ZERO,
        }],
        depends_on: vec![access_grant.logical_id.clone()],
    };
    debug!(
        distribution = %distribution.logical_id,
        aliases = ?distribution.domain_names,
        bucket = %bucket.name,
        "built distribution"
    );

    Ok(DistributionBundle {
        access_identity,
        access_grant,
        cache_policy,
        response_headers_policy,
        distribution,
    })
}

/// Alias the public hostname to the distribution's assigned domain.
pub fn bind_dns(
    stack: &Stack,
    zone: &ZoneDescriptor,
    distribution: &DistributionDescriptor,
) -> DnsRecordDescriptor {
    let record = DnsRecordDescriptor {
        logical_id: stack.logical_id("FrontendCNAME"),
        record_type: RecordType::Cname,
        record_name: SUBDOMAIN_LABEL.to_string(),
        zone: zone.clone(),
        domain_name: distribution.domain_name(),
        ttl: CNAME_TTL,
    };
    debug!(record = %record.fqdn(), target = %distribution.logical_id, "bound DNS record");
    record
}

/// All descriptors of one stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Composition {
    pub stack: Stack,
    pub zone: ZoneDescriptor,
    pub certificate: CertificateDescriptor,
    pub bucket: BucketRef,
    pub access_identity: OriginAccessIdentityDescriptor,
    pub access_grant: AccessGrantDescriptor,
    pub cache_policy: CachePolicyDescriptor,
    pub response_headers_policy: ResponseHeadersPolicyDescriptor,
    pub distribution: DistributionDescriptor,
    pub record: DnsRecordDescriptor,
}

/// Wire the four steps in dependency order.
pub fn compose(stack: &Stack, inputs: &StackInputs, bucket: &BucketRef) -> Result<Composition> {
    let zone = resolve_zone(stack, &inputs.hosted_zone_id, &inputs.hosted_zone_name);
    let certificate = resolve_certificate(stack, &inputs.certificate_arn);
    let bundle = build_distribution(stack, bucket, &certificate, &inputs.hosted_zone_name)?;
    let record = bind_dns(stack, &zone, &bundle.distribution);

    Ok(Composition {
        stack: stack.clone(),
        zone,
        certificate,
        bucket: bucket.clone(),
        access_identity: bundle.access_identity,
        access_grant: bundle.access_grant,
        cache_policy: bundle.cache_policy,
        response_headers_policy: bundle.response_headers_policy,
        distribution: bundle.distribution,
        record,
    })
}
