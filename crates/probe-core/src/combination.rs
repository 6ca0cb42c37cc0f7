use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ProbeError;

// ---------------------------------------------------------------------------
// StreamLib
// ---------------------------------------------------------------------------

/// Reactive-stream library substituted into the generated project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamLib {
    Xstream,
    Most,
    Rxjs,
    Rx,
}

impl StreamLib {
    pub fn all() -> &'static [StreamLib] {
        &[
            StreamLib::Xstream,
            StreamLib::Most,
            StreamLib::Rxjs,
            StreamLib::Rx,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamLib::Xstream => "xstream",
            StreamLib::Most => "most",
            StreamLib::Rxjs => "rxjs",
            StreamLib::Rx => "rx",
        }
    }
}

impl fmt::Display for StreamLib {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamLib {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StreamLib::all()
            .iter()
            .copied()
            .find(|lib| lib.as_str() == s)
            .ok_or_else(|| ProbeError::UnknownStreamLib(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Flavor
// ---------------------------------------------------------------------------

/// A scaffold template, resolved against the templates root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Flavor {
    /// Human-readable name, e.g. "ES6 (babel) + Browserify".
    pub name: String,
    /// Package identifier; the generated project lists it in devDependencies.
    pub template_id: String,
    /// What the generator receives as `--flavor`.
    pub template_ref: PathBuf,
}

// ---------------------------------------------------------------------------
// Combination
// ---------------------------------------------------------------------------

/// One (flavor, stream library) pair driven through every phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Combination {
    pub flavor_name: String,
    pub template_id: String,
    pub template_ref: PathBuf,
    pub stream_lib: StreamLib,
}

impl Combination {
    pub fn new(flavor: &Flavor, stream_lib: StreamLib) -> Self {
        Self {
            flavor_name: flavor.name.clone(),
            template_id: flavor.template_id.clone(),
            template_ref: flavor.template_ref.clone(),
            stream_lib,
        }
    }

    pub fn label(&self) -> String {
        format!("{} / {}", self.flavor_name, self.stream_lib)
    }
}

/// Cartesian product, flavor-major: every stream library of the first
/// flavor, then the next flavor.
pub fn combinations(flavors: &[Flavor], stream_libs: &[StreamLib]) -> Vec<Combination> {
    flavors
        .iter()
        .flat_map(|flavor| {
            stream_libs
                .iter()
                .map(move |&lib| Combination::new(flavor, lib))
        })
        .collect()
}

/// Keep only the combinations matching the given template ids and stream
/// libraries. An empty filter keeps everything.
pub fn filter(
    combos: Vec<Combination>,
    templates: &[String],
    stream_libs: &[StreamLib],
) -> Vec<Combination> {
    combos
        .into_iter()
        .filter(|c| templates.is_empty() || templates.contains(&c.template_id))
        .filter(|c| stream_libs.is_empty() || stream_libs.contains(&c.stream_lib))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flavor(id: &str) -> Flavor {
        Flavor {
            name: format!("Flavor {id}"),
            template_id: id.to_string(),
            template_ref: PathBuf::from("/templates").join(id),
        }
    }

    #[test]
    fn product_is_flavor_major() {
        let combos = combinations(
            &[flavor("a"), flavor("b")],
            &[StreamLib::Xstream, StreamLib::Rx],
        );
        let labels: Vec<_> = combos
            .iter()
            .map(|c| format!("{}:{}", c.template_id, c.stream_lib))
            .collect();
        assert_eq!(labels, ["a:xstream", "a:rx", "b:xstream", "b:rx"]);
    }

    #[test]
    fn empty_side_yields_nothing() {
        assert!(combinations(&[flavor("a")], &[]).is_empty());
        assert!(combinations(&[], StreamLib::all()).is_empty());
    }

    #[test]
    fn stream_lib_parses_only_known_names() {
        assert_eq!("rxjs".parse::<StreamLib>().unwrap(), StreamLib::Rxjs);
        let err = "bacon".parse::<StreamLib>().unwrap_err();
        assert!(err.to_string().contains("bacon"));
    }

    #[test]
    fn filter_by_template_and_lib() {
        let combos = combinations(&[flavor("a"), flavor("b")], StreamLib::all());
        let kept = filter(combos.clone(), &["b".to_string()], &[StreamLib::Most]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].template_id, "b");
        assert_eq!(kept[0].stream_lib, StreamLib::Most);

        assert_eq!(filter(combos, &[], &[]).len(), 8);
    }

    #[test]
    fn label_names_flavor_and_lib() {
        let c = Combination::new(&flavor("a"), StreamLib::Most);
        assert_eq!(c.label(), "Flavor a / most");
    }
}
