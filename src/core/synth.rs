//! Synthesis of descriptors into a provisioning template.
//!
//! The template is CloudFormation-shaped JSON: each created resource becomes a
//! `Resources` entry with `Type`, `Properties` and `DependsOn`, and every
//! token becomes `Ref` / `Fn::GetAtt` / `Fn::Join`. Lookups (zone,
//! certificate, bucket) create nothing; their identifiers appear as literals.

use super::compose::Composition;
use super::descriptors::*;
use super::error::Result;
use super::resolver::collect_references;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;

pub const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";

pub const TYPE_ORIGIN_ACCESS_IDENTITY: &str = "AWS::CloudFront::CloudFrontOriginAccessIdentity";
pub const TYPE_BUCKET_POLICY: &str = "AWS::S3::BucketPolicy";
pub const TYPE_CACHE_POLICY: &str = "AWS::CloudFront::CachePolicy";
pub const TYPE_RESPONSE_HEADERS_POLICY: &str = "AWS::CloudFront::ResponseHeadersPolicy";
pub const TYPE_DISTRIBUTION: &str = "AWS::CloudFront::Distribution";
pub const TYPE_RECORD_SET: &str = "AWS::Route53::RecordSet";

/// Full provisioning template for one stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub format_version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub resources: IndexMap<String, TemplateResource>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub outputs: IndexMap<String, TemplateOutput>,
}

/// One created resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemplateResource {
    #[serde(rename = "Type")]
    pub resource_type: String,

    pub properties: Value,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

/// A value exported to the operator after apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemplateOutput {
    pub value: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Template {
    pub fn new(description: Option<String>) -> Self {
        Self {
            format_version: TEMPLATE_FORMAT_VERSION.to_string(),
            description,
            resources: IndexMap::new(),
            outputs: IndexMap::new(),
        }
    }

    /// Logical ids `id` depends on, through properties and `DependsOn`.
    pub fn references(&self, id: &str) -> Vec<String> {
        let Some(resource) = self.resources.get(id) else {
            return Vec::new();
        };
        let mut refs = collect_references(&resource.properties);
        refs.extend(resource.depends_on.iter().cloned());
        refs
    }

    /// Logical ids no other resource or output refers to.
    pub fn unreferenced(&self) -> Vec<&str> {
        let mut referenced: Vec<String> = self
            .resources
            .keys()
            .flat_map(|id| self.references(id))
            .collect();
        for output in self.outputs.values() {
            referenced.extend(collect_references(&output.value));
        }
        self.resources
            .keys()
            .filter(|id| !referenced.contains(id))
            .map(String::as_str)
            .collect()
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the template where an external engine can pick it up.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let json = self.to_json_pretty()?;
        std::fs::write(path, json + "\n").map_err(|e| super::error::StackError::io(path, e))
    }
}

/// Render a token in template syntax.
pub fn render_token(token: &Token) -> Value {
    match token {
        Token::Literal(s) => Value::String(s.clone()),
        Token::Ref(id) => json!({ "Ref": id.as_str() }),
        Token::GetAtt { target, attribute } => json!({ "Fn::GetAtt": [target.as_str(), attribute] }),
        Token::Join(parts) => {
            let parts: Vec<Value> = parts.iter().map(render_token).collect();
            json!({ "Fn::Join": ["", parts] })
        }
    }
}

fn resource(resource_type: &str, properties: Value, depends_on: &[LogicalId]) -> TemplateResource {
    TemplateResource {
        resource_type: resource_type.to_string(),
        properties,
        depends_on: depends_on.iter().map(|id| id.to_string()).collect(),
    }
}

fn origin_access_identity(oai: &OriginAccessIdentityDescriptor) -> TemplateResource {
    resource(
        TYPE_ORIGIN_ACCESS_IDENTITY,
        json!({
            "CloudFrontOriginAccessIdentityConfig": { "Comment": oai.comment }
        }),
        &[],
    )
}

fn access_grant(grant: &AccessGrantDescriptor) -> TemplateResource {
    resource(
        TYPE_BUCKET_POLICY,
        json!({
            "Bucket": grant.bucket.name,
            "PolicyDocument": {
                "Version": "2012-10-17",
                "Statement": [{
                    "Action": grant.actions,
                    "Effect": "Allow",
                    "Principal": { "CanonicalUser": render_token(&grant.grantee) },
                    "Resource": [grant.bucket.arn(), grant.bucket.objects_arn()],
                }]
            }
        }),
        &[],
    )
}

fn cache_policy(policy: &CachePolicyDescriptor) -> TemplateResource {
    resource(
        TYPE_CACHE_POLICY,
        json!({
            "CachePolicyConfig": {
                "Name": policy.name,
                "DefaultTTL": policy.default_ttl.as_secs(),
                "MinTTL": policy.min_ttl.as_secs(),
                "MaxTTL": policy.max_ttl.as_secs(),
                "ParametersInCacheKeyAndForwardedToOrigin": {
                    "EnableAcceptEncodingGzip": policy.enable_accept_encoding_gzip,
                    "EnableAcceptEncodingBrotli": policy.enable_accept_encoding_brotli,
                    "CookiesConfig": { "CookieBehavior": policy.cookie_behavior.as_str() },
                    "HeadersConfig": { "HeaderBehavior": policy.header_behavior.as_str() },
                    "QueryStringsConfig": { "QueryStringBehavior": policy.query_string_behavior.as_str() },
                }
            }
        }),
        &[],
    )
}

fn response_headers_policy(policy: &ResponseHeadersPolicyDescriptor) -> TemplateResource {
    let items: Vec<Value> = policy
        .custom_headers
        .iter()
        .map(|h| json!({ "Header": h.header, "Value": h.value, "Override": h.override_origin }))
        .collect();
    resource(
        TYPE_RESPONSE_HEADERS_POLICY,
        json!({
            "ResponseHeadersPolicyConfig": {
                "Name": policy.name,
                "CustomHeadersConfig": { "Items": items }
            }
        }),
        &[],
    )
}

fn distribution(d: &DistributionDescriptor) -> TemplateResource {
    let behavior = &d.default_behavior;
    let error_responses: Vec<Value> = d
        .error_responses
        .iter()
        .map(|e| {
            json!({
                "ErrorCode": e.http_status,
                "ResponseCode": e.response_http_status,
                "ResponsePagePath": e.response_page_path,
                "ErrorCachingMinTTL": e.ttl.as_secs(),
            })
        })
        .collect();
    resource(
        TYPE_DISTRIBUTION,
        json!({
            "DistributionConfig": {
                "Aliases": d.domain_names,
                "DefaultRootObject": d.default_root_object,
                "Enabled": true,
                "HttpVersion": "http2",
                "IPV6Enabled": true,
                "ViewerCertificate": {
                    "AcmCertificateArn": render_token(&d.certificate),
                    "MinimumProtocolVersion": d.minimum_protocol_version.as_str(),
                    "SslSupportMethod": "sni-only",
                },
                "Origins": [{
                    "Id": behavior.origin.id,
                    "DomainName": behavior.origin.domain_name,
                    "S3OriginConfig": {
                        "OriginAccessIdentity": render_token(&behavior.origin.access_identity)
                    }
                }],
                "DefaultCacheBehavior": {
                    "TargetOriginId": behavior.origin.id,
                    "ViewerProtocolPolicy": behavior.viewer_protocol_policy.as_str(),
                    "CachePolicyId": render_token(&behavior.cache_policy),
                    "ResponseHeadersPolicyId": render_token(&behavior.response_headers_policy),
                    "Compress": true,
                },
                "CustomErrorResponses": error_responses,
            }
        }),
        &d.depends_on,
    )
}

fn record_set(r: &DnsRecordDescriptor) -> TemplateResource {
    resource(
        TYPE_RECORD_SET,
        json!({
            "HostedZoneId": r.zone.hosted_zone_id,
            "Name": r.fqdn(),
            "Type": r.record_type.as_str(),
            "TTL": r.ttl.as_secs().to_string(),
            "ResourceRecords": [render_token(&r.domain_name)],
        }),
        &[],
    )
}

/// Build the template for a composition.
pub fn synthesize(c: &Composition) -> Template {
    let mut t = Template::new(Some(format!(
        "{}: static frontend at {}",
        c.stack.name(),
        c.distribution.domain_names.join(", ")
    )));

    let entries = [
        (&c.access_identity.logical_id, origin_access_identity(&c.access_identity)),
        (&c.access_grant.logical_id, access_grant(&c.access_grant)),
        (&c.cache_policy.logical_id, cache_policy(&c.cache_policy)),
        (
            &c.response_headers_policy.logical_id,
            response_headers_policy(&c.response_headers_policy),
        ),
        (&c.distribution.logical_id, distribution(&c.distribution)),
        (&c.record.logical_id, record_set(&c.record)),
    ];
    for (id, r) in entries {
        t.resources.insert(id.to_string(), r);
    }

    t.outputs.insert(
        "DistributionDomainName".to_string(),
        TemplateOutput {
            value: render_token(&c.distribution.domain_name()),
            description: Some("Domain name assigned to the distribution".to_string()),
        },
    );
    t.outputs.insert(
        "DistributionId".to_string(),
        TemplateOutput {
            value: render_token(&Token::Ref(c.distribution.logical_id.clone())),
            description: None,
        },
    );
    t.outputs.insert(
        "FrontendHostname".to_string(),
        TemplateOutput {
            value: render_token(&Token::Ref(c.record.logical_id.clone())),
            description: Some("Public hostname of the frontend".to_string()),
        },
    );

    t
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::compose::{compose, Stack};
    use crate::core::inputs::{CertificateArn, DomainName, HostedZoneId, StackInputs};

    fn template() -> Template {
        let inputs = StackInputs {
            hosted_zone_id: HostedZoneId::parse("Z123").unwrap(),
            hosted_zone_name: DomainName::parse("example.com").unwrap(),
            certificate_arn: CertificateArn::parse("arn:cert:abc").unwrap(),
        };
        let c = compose(&Stack::new("Signal"), &inputs, &BucketRef::new("b", None)).unwrap();
        synthesize(&c)
    }

    #[test]
    fn test_resource_set() {
        let t = template();
        let types: Vec<(&str, &str)> = t
            .resources
            .iter()
            .map(|(id, r)| (id.as_str(), r.resource_type.as_str()))
            .collect();
        assert_eq!(
            types,
            vec![
                ("SignalDistributionOAI", TYPE_ORIGIN_ACCESS_IDENTITY),
                ("SignalDistributionOAIGrant", TYPE_BUCKET_POLICY),
                ("SignalLongTermCachePolicy", TYPE_CACHE_POLICY),
                ("SignalResponseHeadersPolicy", TYPE_RESPONSE_HEADERS_POLICY),
                ("SignalDistribution", TYPE_DISTRIBUTION),
                ("SignalFrontendCNAME", TYPE_RECORD_SET),
            ]
        );
    }

    #[test]
    fn test_no_resource_left_unreferenced() {
        assert!(template().unreferenced().is_empty());
    }

    #[test]
    fn test_record_targets_distribution_attribute() {
        let t = template();
        let r = &t.resources["SignalFrontendCNAME"].properties;
        assert_eq!(r["HostedZoneId"], "Z123");
        assert_eq!(r["Name"], "signal.example.com.");
        assert_eq!(r["Type"], "CNAME");
        assert_eq!(
            r["ResourceRecords"][0],
            json!({"Fn::GetAtt": ["SignalDistribution", "DomainName"]})
        );
    }

    #[test]
    fn test_distribution_properties() {
        let t = template();
        let d = &t.resources["SignalDistribution"];
        let cfg = &d.properties["DistributionConfig"];
        assert_eq!(cfg["Aliases"], json!(["signal.example.com"]));
        assert_eq!(cfg["DefaultRootObject"], "index.html");
        assert_eq!(cfg["ViewerCertificate"]["AcmCertificateArn"], "arn:cert:abc");
        assert_eq!(cfg["ViewerCertificate"]["MinimumProtocolVersion"], "TLSv1.2_2021");
        assert_eq!(
            cfg["DefaultCacheBehavior"]["ViewerProtocolPolicy"],
            "redirect-to-https"
        );
        assert_eq!(
            cfg["DefaultCacheBehavior"]["CachePolicyId"],
            json!({"Ref": "SignalLongTermCachePolicy"})
        );
        assert_eq!(
            cfg["CustomErrorResponses"],
            json!([{
                "ErrorCode": 404,
                "ResponseCode": 200,
                "ResponsePagePath": "/index.html",
                "ErrorCachingMinTTL": 0
            }])
        );
        assert_eq!(d.depends_on, vec!["SignalDistributionOAIGrant"]);
    }

    #[test]
    fn test_cache_policy_properties() {
        let t = template();
        let cfg = &t.resources["SignalLongTermCachePolicy"].properties["CachePolicyConfig"];
        assert_eq!(cfg["DefaultTTL"], 31_536_000);
        assert_eq!(cfg["MinTTL"], 31_536_000);
        assert_eq!(cfg["MaxTTL"], 31_536_000);
        let key = &cfg["ParametersInCacheKeyAndForwardedToOrigin"];
        assert_eq!(key["CookiesConfig"]["CookieBehavior"], "none");
        assert_eq!(key["HeadersConfig"]["HeaderBehavior"], "none");
        assert_eq!(key["QueryStringsConfig"]["QueryStringBehavior"], "none");
    }

    #[test]
    fn test_response_headers_properties() {
        let t = template();
        let items = &t.resources["SignalResponseHeadersPolicy"].properties
            ["ResponseHeadersPolicyConfig"]["CustomHeadersConfig"]["Items"];
        assert_eq!(
            *items,
            json!([{
                "Header": "Cache-Control",
                "Value": "public, max-age=31536000, immutable",
                "Override": true
            }])
        );
    }

    #[test]
    fn test_grant_principal_is_identity() {
        let t = template();
        let stmt = &t.resources["SignalDistributionOAIGrant"].properties["PolicyDocument"]
            ["Statement"][0];
        assert_eq!(
            stmt["Principal"]["CanonicalUser"],
            json!({"Fn::GetAtt": ["SignalDistributionOAI", "S3CanonicalUserId"]})
        );
        assert_eq!(
            stmt["Resource"],
            json!(["arn:aws:s3:::b", "arn:aws:s3:::b/*"])
        );
    }

    #[test]
    fn test_json_shape_and_roundtrip() {
        let t = template();
        let json = t.to_json_pretty().unwrap();
        assert!(json.contains("\"AWSTemplateFormatVersion\": \"2010-09-09\""));
        assert!(json.contains("\"DependsOn\""));
        let back: Template = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn test_write_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("template.json");
        template().write_to(&path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.ends_with("}\n"));
    }
}
