//! Structural checks on the manifest a generator writes.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Scripts every generated project must define, in report order.
pub const SCRIPT_NAMES: [&str; 4] = ["start", "test", "build", "take-off-training-wheels"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManifestViolation {
    #[error("cannot read manifest: {0}")]
    Unreadable(String),

    #[error("manifest is not valid JSON: {0}")]
    Malformed(String),

    #[error("missing field `{0}`")]
    Missing(String),

    #[error("field `{field}` is {actual}, expected {expected}")]
    Mismatch {
        field: String,
        expected: String,
        actual: String,
    },
}

/// What a correctly generated manifest must contain.
#[derive(Debug, Clone)]
pub struct ManifestExpectations {
    pub name: String,
    pub version: String,
    pub template_id: String,
    /// Command the four scripts delegate to, e.g. `cycle-scripts`.
    pub delegate: String,
}

impl ManifestExpectations {
    pub fn script(&self, name: &str) -> String {
        format!("{} {}", self.delegate, name)
    }
}

/// The validated subset of the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageManifest {
    pub name: String,
    pub version: String,
    /// Version range of the template dependency.
    pub template_dependency: String,
    pub scripts: BTreeMap<String, String>,
}

pub fn load(path: &Path, expect: &ManifestExpectations) -> Result<PackageManifest, ManifestViolation> {
    let data =
        std::fs::read_to_string(path).map_err(|e| ManifestViolation::Unreadable(e.to_string()))?;
    parse(&data, expect)
}

pub fn parse(data: &str, expect: &ManifestExpectations) -> Result<PackageManifest, ManifestViolation> {
    let value: Value =
        serde_json::from_str(data).map_err(|e| ManifestViolation::Malformed(e.to_string()))?;
    validate(&value, expect)
}

/// Check every invariant; the first violation is returned.
pub fn validate(
    value: &Value,
    expect: &ManifestExpectations,
) -> Result<PackageManifest, ManifestViolation> {
    let name = required_str(value, &["name"])?;
    equal("name", &expect.name, name)?;

    let version = required_str(value, &["version"])?;
    equal("version", &expect.version, version)?;

    let private = lookup(value, &["private"])
        .ok_or_else(|| ManifestViolation::Missing("private".into()))?;
    if !is_truthy(private) {
        return Err(ManifestViolation::Mismatch {
            field: "private".into(),
            expected: "truthy".into(),
            actual: private.to_string(),
        });
    }

    let dep_field = format!("devDependencies.{}", expect.template_id);
    let dep = lookup(value, &["devDependencies", expect.template_id.as_str()])
        .filter(|v| is_truthy(v))
        .ok_or_else(|| ManifestViolation::Missing(dep_field))?;
    let template_dependency = match dep {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    let mut scripts = BTreeMap::new();
    for script in SCRIPT_NAMES {
        let actual = required_str(value, &["scripts", script])?;
        equal(&format!("scripts.{script}"), &expect.script(script), actual)?;
        scripts.insert(script.to_string(), actual.to_string());
    }

    Ok(PackageManifest {
        name: name.to_string(),
        version: version.to_string(),
        template_dependency,
        scripts,
    })
}

fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter()
        .try_fold(value, |v, key| v.as_object().and_then(|o| o.get(*key)))
}

fn required_str<'a>(value: &'a Value, path: &[&str]) -> Result<&'a str, ManifestViolation> {
    let field = path.join(".");
    match lookup(value, path) {
        None | Some(Value::Null) => Err(ManifestViolation::Missing(field)),
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(ManifestViolation::Mismatch {
            field,
            expected: "a string".into(),
            actual: other.to_string(),
        }),
    }
}

fn equal(field: &str, expected: &str, actual: &str) -> Result<(), ManifestViolation> {
    if expected == actual {
        return Ok(());
    }
    Err(ManifestViolation::Mismatch {
        field: field.to_string(),
        expected: format!("{expected:?}"),
        actual: format!("{actual:?}"),
    })
}

/// JavaScript truthiness, as the generator's own tooling would judge it.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn expect() -> ManifestExpectations {
        ManifestExpectations {
            name: "proj1".into(),
            version: "0.1.0".into(),
            template_id: "tmplX".into(),
            delegate: "cycle-scripts".into(),
        }
    }

    fn good() -> Value {
        json!({
            "name": "proj1",
            "version": "0.1.0",
            "private": true,
            "devDependencies": { "tmplX": "^1.0" },
            "scripts": {
                "start": "cycle-scripts start",
                "test": "cycle-scripts test",
                "build": "cycle-scripts build",
                "take-off-training-wheels": "cycle-scripts take-off-training-wheels"
            }
        })
    }

    fn without(path: &[&str]) -> Value {
        let mut v = good();
        let (last, parents) = path.split_last().unwrap();
        let mut cursor = &mut v;
        for key in parents {
            cursor = cursor.get_mut(*key).unwrap();
        }
        cursor.as_object_mut().unwrap().remove(*last);
        v
    }

    #[test]
    fn valid_manifest_is_accepted() {
        let m = validate(&good(), &expect()).unwrap();
        assert_eq!(m.name, "proj1");
        assert_eq!(m.version, "0.1.0");
        assert_eq!(m.template_dependency, "^1.0");
        assert_eq!(m.scripts["take-off-training-wheels"], "cycle-scripts take-off-training-wheels");
    }

    #[test]
    fn every_missing_field_is_cited() {
        let cases: &[(&[&str], &str)] = &[
            (&["name"], "name"),
            (&["version"], "version"),
            (&["private"], "private"),
            (&["devDependencies", "tmplX"], "devDependencies.tmplX"),
            (&["scripts", "start"], "scripts.start"),
            (&["scripts", "test"], "scripts.test"),
            (&["scripts", "build"], "scripts.build"),
            (
                &["scripts", "take-off-training-wheels"],
                "scripts.take-off-training-wheels",
            ),
        ];
        for (path, field) in cases {
            let err = validate(&without(path), &expect()).unwrap_err();
            assert_eq!(err, ManifestViolation::Missing(field.to_string()), "{path:?}");
        }
    }

    #[test]
    fn wrong_values_are_mismatches() {
        let mut v = good();
        v["version"] = json!("1.0.0");
        let err = validate(&v, &expect()).unwrap_err();
        assert!(matches!(err, ManifestViolation::Mismatch { ref field, .. } if field == "version"));

        let mut v = good();
        v["private"] = json!(false);
        assert!(validate(&v, &expect()).is_err());

        let mut v = good();
        v["scripts"]["build"] = json!("webpack");
        let err = validate(&v, &expect()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "field `scripts.build` is \"webpack\", expected \"cycle-scripts build\""
        );
    }

    #[test]
    fn truthy_private_marker_is_enough() {
        let mut v = good();
        v["private"] = json!("yes");
        assert!(validate(&v, &expect()).is_ok());
        v["private"] = json!(0);
        assert!(validate(&v, &expect()).is_err());
    }

    #[test]
    fn empty_dependency_version_counts_as_missing() {
        let mut v = good();
        v["devDependencies"]["tmplX"] = json!("");
        assert_eq!(
            validate(&v, &expect()).unwrap_err(),
            ManifestViolation::Missing("devDependencies.tmplX".into())
        );
    }

    #[test]
    fn malformed_and_unreadable() {
        assert!(matches!(
            parse("{not json", &expect()),
            Err(ManifestViolation::Malformed(_))
        ));
        assert!(matches!(
            load(Path::new("/nonexistent/package.json"), &expect()),
            Err(ManifestViolation::Unreadable(_))
        ));
    }
}
