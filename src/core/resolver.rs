//! Template resolution, token resolution and dependency DAG construction.
//!
//! Resolves `{{params.key}}` and `{{env.NAME}}` expressions in stack inputs.
//! Builds a DAG from the references in a synthesized template and computes a
//! topological order using Kahn's algorithm with deterministic (alphabetical)
//! tie-breaking.

use super::descriptors::Token;
use super::error::{Result, StackError};
use super::synth::Template;
use super::types::yaml_value_to_string;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};

/// Snapshot of the process environment, taken once at the boundary.
pub type Environment = HashMap<String, String>;

/// What the engine reported for an applied resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedResource {
    pub physical_id: String,
    pub attributes: IndexMap<String, String>,
}

/// Outputs of applied resources, keyed by logical id.
pub type Outputs = HashMap<String, ResolvedResource>;

/// Resolve all template variables in a string.
pub fn resolve_template(
    template: &str,
    params: &HashMap<String, serde_yaml_ng::Value>,
    env: &Environment,
) -> Result<String> {
    let mut result = template.to_string();
    let mut start = 0;

    while let Some(open) = result[start..].find("{{") {
        let open = start + open;
        let close = result[open..].find("}}").ok_or_else(|| {
            StackError::Template(format!("unclosed template at position {}", open))
        })?;
        let close = open + close + 2;
        let key = result[open + 2..close - 2].trim();

        let value = if let Some(param_key) = key.strip_prefix("params.") {
            params
                .get(param_key)
                .map(yaml_value_to_string)
                .ok_or_else(|| StackError::Template(format!("unknown param: {}", param_key)))?
        } else if let Some(var) = key.strip_prefix("env.") {
            env.get(var)
                .cloned()
                .ok_or_else(|| StackError::Template(format!("environment variable {} is not set", var)))?
        } else {
            return Err(StackError::Template(format!(
                "unknown template variable: {}",
                key
            )));
        };

        result.replace_range(open..close, &value);
        start = open + value.len();
    }

    Ok(result)
}

/// Environment variables a template reads, in order of appearance.
pub fn referenced_env_vars(template: &str) -> Vec<String> {
    let mut vars = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            break;
        };
        if let Some(var) = after[..close].trim().strip_prefix("env.") {
            vars.push(var.to_string());
        }
        rest = &after[close + 2..];
    }
    vars
}

/// Resolve a descriptor token against applied outputs.
pub fn resolve_token(token: &Token, outputs: &Outputs) -> Result<String> {
    match token {
        Token::Literal(s) => Ok(s.clone()),
        Token::Ref(id) => outputs
            .get(id.as_str())
            .map(|r| r.physical_id.clone())
            .ok_or_else(|| StackError::Dependency(format!("'{}' has not been applied", id))),
        Token::GetAtt { target, attribute } => lookup_attribute(outputs, target.as_str(), attribute),
        Token::Join(parts) => parts
            .iter()
            .map(|p| resolve_token(p, outputs))
            .collect::<Result<Vec<_>>>()
            .map(|v| v.concat()),
    }
}

fn lookup_attribute(outputs: &Outputs, target: &str, attribute: &str) -> Result<String> {
    let resource = outputs
        .get(target)
        .ok_or_else(|| StackError::Dependency(format!("'{}' has not been applied", target)))?;
    resource.attributes.get(attribute).cloned().ok_or_else(|| {
        StackError::Dependency(format!(
            "'{}' did not report attribute '{}'",
            target, attribute
        ))
    })
}

/// Replace every `Ref`, `Fn::GetAtt` and `Fn::Join` in a property tree with
/// concrete values from applied resources.
pub fn resolve_properties(value: &Value, outputs: &Outputs) -> Result<Value> {
    match value {
        Value::Object(map) if map.len() == 1 => {
            if let Some(Value::String(id)) = map.get("Ref") {
                return outputs
                    .get(id)
                    .map(|r| Value::String(r.physical_id.clone()))
                    .ok_or_else(|| StackError::Dependency(format!("'{}' has not been applied", id)));
            }
            if let Some(args) = map.get("Fn::GetAtt") {
                let (target, attribute) = get_att_args(args)?;
                return lookup_attribute(outputs, target, attribute).map(Value::String);
            }
            if let Some(args) = map.get("Fn::Join") {
                return resolve_join(args, outputs).map(Value::String);
            }
            resolve_object(map, outputs)
        }
        Value::Object(map) => resolve_object(map, outputs),
        Value::Array(items) => items
            .iter()
            .map(|v| resolve_properties(v, outputs))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        other => Ok(other.clone()),
    }
}

fn resolve_object(map: &serde_json::Map<String, Value>, outputs: &Outputs) -> Result<Value> {
    let mut resolved = serde_json::Map::new();
    for (k, v) in map {
        resolved.insert(k.clone(), resolve_properties(v, outputs)?);
    }
    Ok(Value::Object(resolved))
}

fn get_att_args(args: &Value) -> Result<(&str, &str)> {
    match args.as_array().map(Vec::as_slice) {
        Some([Value::String(target), Value::String(attribute)]) => {
            Ok((target.as_str(), attribute.as_str()))
        }
        _ => Err(StackError::Dependency(format!(
            "malformed Fn::GetAtt: {}",
            args
        ))),
    }
}

fn resolve_join(args: &Value, outputs: &Outputs) -> Result<String> {
    let (sep, parts) = match args.as_array().map(Vec::as_slice) {
        Some([Value::String(sep), Value::Array(parts)]) => (sep, parts),
        _ => {
            return Err(StackError::Dependency(format!(
                "malformed Fn::Join: {}",
                args
            )))
        }
    };
    let mut pieces = Vec::with_capacity(parts.len());
    for part in parts {
        match resolve_properties(part, outputs)? {
            Value::String(s) => pieces.push(s),
            other => pieces.push(other.to_string()),
        }
    }
    Ok(pieces.join(sep.as_str()))
}

/// Logical ids referenced anywhere in a property tree.
pub fn collect_references(value: &Value) -> Vec<String> {
    let mut refs = Vec::new();
    walk_references(value, &mut refs);
    refs
}

fn walk_references(value: &Value, refs: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            if map.len() == 1 {
                if let Some(Value::String(id)) = map.get("Ref") {
                    refs.push(id.clone());
                    return;
                }
                if let Some(Ok((target, _))) = map.get("Fn::GetAtt").map(get_att_args) {
                    refs.push(target.to_string());
                    return;
                }
            }
            for v in map.values() {
                walk_references(v, refs);
            }
        }
        Value::Array(items) => {
            for v in items {
                walk_references(v, refs);
            }
        }
        _ => {}
    }
}

/// Build a topological execution order from template references.
/// Uses Kahn's algorithm with alphabetical tie-breaking for determinism.
pub fn build_execution_order(template: &Template) -> Result<Vec<String>> {
    let resource_ids: Vec<String> = template.resources.keys().cloned().collect();
    let mut in_degree: HashMap<String, usize> = HashMap::new();
    let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();

    for id in &resource_ids {
        in_degree.insert(id.clone(), 0);
        adjacency.insert(id.clone(), Vec::new());
    }

    for id in &resource_ids {
        let mut deps = template.references(id);
        deps.sort();
        deps.dedup();
        for dep in deps {
            if dep == *id {
                return Err(StackError::Dependency(format!(
                    "resource '{}' references itself",
                    id
                )));
            }
            let Some(dependents) = adjacency.get_mut(&dep) else {
                return Err(StackError::Dependency(format!(
                    "resource '{}' references unknown '{}'",
                    id, dep
                )));
            };
            dependents.push(id.clone());
            if let Some(degree) = in_degree.get_mut(id) {
                *degree += 1;
            }
        }
    }

    let mut queue: VecDeque<String> = VecDeque::new();
    let mut zero_degree: Vec<String> = in_degree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(id, _)| id.clone())
        .collect();
    zero_degree.sort();
    queue.extend(zero_degree);

    let mut order = Vec::new();
    while let Some(current) = queue.pop_front() {
        order.push(current.clone());

        let mut next_ready: Vec<String> = Vec::new();
        if let Some(neighbors) = adjacency.get(&current) {
            for neighbor in neighbors {
                if let Some(degree) = in_degree.get_mut(neighbor) {
                    *degree -= 1;
                    if *degree == 0 {
                        next_ready.push(neighbor.clone());
                    }
                }
            }
        }
        next_ready.sort();
        queue.extend(next_ready);
    }

    if order.len() != resource_ids.len() {
        let ordered: HashSet<_> = order.iter().collect();
        let mut cycle_members: Vec<&str> = resource_ids
            .iter()
            .filter(|id| !ordered.contains(id))
            .map(String::as_str)
            .collect();
        cycle_members.sort_unstable();
        return Err(StackError::Dependency(format!(
            "dependency cycle detected involving: {}",
            cycle_members.join(", ")
        )));
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::descriptors::LogicalId;
    use crate::core::synth::TemplateResource;
    use serde_json::json;

    fn env(pairs: &[(&str, &str)]) -> Environment {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn template(resources: Vec<(&str, Value, Vec<&str>)>) -> Template {
        let mut t = Template::new(None);
        for (id, properties, depends_on) in resources {
            t.resources.insert(
                id.to_string(),
                TemplateResource {
                    resource_type: "Test::Thing".to_string(),
                    properties,
                    depends_on: depends_on.into_iter().map(str::to_string).collect(),
                },
            );
        }
        t
    }

    #[test]
    fn test_resolve_params_and_env() {
        let mut params = HashMap::new();
        params.insert(
            "zone".to_string(),
            serde_yaml_ng::Value::String("example.com".to_string()),
        );
        let env = env(&[("HOSTED_ZONE_ID", "Z123")]);
        let out = resolve_template("{{env.HOSTED_ZONE_ID}}/{{ params.zone }}", &params, &env).unwrap();
        assert_eq!(out, "Z123/example.com");
    }

    #[test]
    fn test_resolve_unknown_param() {
        let result = resolve_template("{{params.missing}}", &HashMap::new(), &Environment::new());
        assert!(result.unwrap_err().to_string().contains("unknown param"));
    }

    #[test]
    fn test_resolve_unset_env() {
        let result = resolve_template("{{env.NOPE}}", &HashMap::new(), &Environment::new());
        assert!(result.unwrap_err().to_string().contains("NOPE"));
    }

    #[test]
    fn test_resolve_unclosed() {
        let result = resolve_template("{{env.X", &HashMap::new(), &Environment::new());
        assert!(result.unwrap_err().to_string().contains("unclosed"));
    }

    #[test]
    fn test_referenced_env_vars() {
        assert_eq!(
            referenced_env_vars("{{env.A}}-{{params.b}}-{{ env.C }}"),
            vec!["A", "C"]
        );
        assert!(referenced_env_vars("literal").is_empty());
    }

    #[test]
    fn test_resolve_token_variants() {
        let mut outputs = Outputs::new();
        outputs.insert(
            "Dist".to_string(),
            ResolvedResource {
                physical_id: "E1".to_string(),
                attributes: IndexMap::from([("DomainName".to_string(), "d1.cloudfront.net".to_string())]),
            },
        );
        let id = LogicalId::new("Dist");
        assert_eq!(resolve_token(&Token::Ref(id.clone()), &outputs).unwrap(), "E1");
        assert_eq!(
            resolve_token(&Token::get_att(&id, "DomainName"), &outputs).unwrap(),
            "d1.cloudfront.net"
        );
        let join = Token::Join(vec![Token::literal("id/"), Token::Ref(id.clone())]);
        assert_eq!(resolve_token(&join, &outputs).unwrap(), "id/E1");

        let missing = resolve_token(&Token::get_att(&id, "Arn"), &outputs);
        assert!(missing.unwrap_err().to_string().contains("Arn"));
        let unapplied = resolve_token(&Token::Ref(LogicalId::new("Other")), &outputs);
        assert!(unapplied.unwrap_err().to_string().contains("has not been applied"));
    }

    #[test]
    fn test_resolve_properties_nested() {
        let mut outputs = Outputs::new();
        outputs.insert(
            "OAI".to_string(),
            ResolvedResource {
                physical_id: "E2OAI".to_string(),
                attributes: IndexMap::from([("S3CanonicalUserId".to_string(), "abc".to_string())]),
            },
        );
        let props = json!({
            "Origins": [{
                "S3OriginConfig": {
                    "OriginAccessIdentity": {"Fn::Join": ["", ["origin-access-identity/cloudfront/", {"Ref": "OAI"}]]}
                }
            }],
            "Principal": {"CanonicalUser": {"Fn::GetAtt": ["OAI", "S3CanonicalUserId"]}},
            "Enabled": true
        });
        let resolved = resolve_properties(&props, &outputs).unwrap();
        assert_eq!(
            resolved["Origins"][0]["S3OriginConfig"]["OriginAccessIdentity"],
            "origin-access-identity/cloudfront/E2OAI"
        );
        assert_eq!(resolved["Principal"]["CanonicalUser"], "abc");
        assert_eq!(resolved["Enabled"], true);
    }

    #[test]
    fn test_collect_references() {
        let props = json!({
            "a": {"Ref": "X"},
            "b": [{"Fn::GetAtt": ["Y", "DomainName"]}],
            "c": {"Fn::Join": ["", [{"Ref": "Z"}, "lit"]]}
        });
        let mut refs = collect_references(&props);
        refs.sort();
        assert_eq!(refs, vec!["X", "Y", "Z"]);
    }

    #[test]
    fn test_topo_linear() {
        let t = template(vec![
            ("c", json!({"x": {"Ref": "b"}}), vec![]),
            ("b", json!({"x": {"Fn::GetAtt": ["a", "Arn"]}}), vec![]),
            ("a", json!({}), vec![]),
        ]);
        assert_eq!(build_execution_order(&t).unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_topo_depends_on_and_tie_breaking() {
        let t = template(vec![
            ("zeta", json!({}), vec![]),
            ("alpha", json!({}), vec![]),
            ("omega", json!({}), vec!["zeta", "alpha"]),
        ]);
        assert_eq!(
            build_execution_order(&t).unwrap(),
            vec!["alpha", "zeta", "omega"]
        );
    }

    #[test]
    fn test_topo_unknown_reference() {
        let t = template(vec![("a", json!({"x": {"Ref": "ghost"}}), vec![])]);
        let err = build_execution_order(&t).unwrap_err();
        assert!(err.to_string().contains("unknown 'ghost'"));
    }

    #[test]
    fn test_topo_cycle() {
        let t = template(vec![
            ("a", json!({"x": {"Ref": "b"}}), vec![]),
            ("b", json!({"x": {"Ref": "a"}}), vec![]),
        ]);
        let err = build_execution_order(&t).unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_topo_self_reference() {
        let t = template(vec![("a", json!({"x": {"Ref": "a"}}), vec![])]);
        let err = build_execution_order(&t).unwrap_err();
        assert!(err.to_string().contains("itself"));
    }
}
