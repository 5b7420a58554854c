//! Render suites: which libraries a base engine loads once, and which
//! scenarios are rendered on clones of it.
//!
//! ```yaml
//! name: react-0.13
//! libraries: [vendor/react-0.13.3.min.js]
//! scenarios:
//!   - name: render div
//!     script: React.renderToString(React.createElement("div", null, "Hello world"))
//!     expect:
//!       matches: "^<div.*>Hello world</div>$"
//! ```

use std::{fs, path::Path, path::PathBuf};

use eyre::WrapErr;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::fixtures;

#[derive(Debug, Clone, Deserialize)]
pub struct Suite {
    pub name: String,
    /// Loaded once into the base engine, relative to the assets directory.
    #[serde(default)]
    pub libraries: Vec<PathBuf>,
    pub scenarios: Vec<Scenario>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub name: String,
    /// Loaded into the scenario's clone before rendering.
    #[serde(default)]
    pub load: Vec<PathBuf>,
    pub script: String,
    pub expect: Expectation,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expectation {
    Matches(#[serde(deserialize_with = "pattern")] Regex),
    Contains(Vec<String>),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Mismatch {
    #[error("expected output to match {pattern} but received: {output}")]
    Pattern { pattern: String, output: String },
    #[error("expected output to contain {} but it did not", .missing.join(", "))]
    Missing { missing: Vec<String> },
}

impl Expectation {
    pub fn check(&self, output: &str) -> Result<(), Mismatch> {
        match self {
            Expectation::Matches(re) if re.is_match(output) => Ok(()),
            Expectation::Matches(re) => Err(Mismatch::Pattern {
                pattern: re.as_str().to_owned(),
                output: output.to_owned(),
            }),
            Expectation::Contains(fragments) => {
                let missing: Vec<String> = fragments
                    .iter()
                    .filter(|fragment| !output.contains(fragment.as_str()))
                    .cloned()
                    .collect();
                if missing.is_empty() {
                    Ok(())
                } else {
                    Err(Mismatch::Missing { missing })
                }
            }
        }
    }
}

impl Suite {
    pub fn from_file(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .wrap_err_with(|| format!("reading suite {}", path.display()))?;
        Self::from_yaml(&raw).wrap_err_with(|| format!("parsing suite {}", path.display()))
    }

    pub fn from_yaml(raw: &str) -> eyre::Result<Self> {
        let de = serde_yaml::Deserializer::from_str(raw);
        Ok(serde_path_to_error::deserialize(de)?)
    }

    /// The two React 0.13 scenarios: a bare div and a parent with three
    /// child components.
    pub fn react_013() -> Self {
        Self {
            name: "react-0.13".into(),
            libraries: vec![fixtures::REACT_0133.into()],
            scenarios: vec![
                Scenario {
                    name: "render div".into(),
                    load: vec![],
                    script: fixtures::RENDER_DIV.into(),
                    expect: Expectation::Matches(fixtures::render_div_regex().clone()),
                },
                Scenario {
                    name: "render components".into(),
                    load: vec![fixtures::COMPONENTS.into()],
                    script: fixtures::RENDER_COMPONENTS.into(),
                    expect: Expectation::Contains(
                        fixtures::COMPONENT_TEXT.map(String::from).to_vec(),
                    ),
                },
            ],
        }
    }
}

fn pattern<'de, D: Deserializer<'de>>(de: D) -> Result<Regex, D::Error> {
    let pattern = String::deserialize(de)?;
    Regex::new(&pattern).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUITE: &str = r#"
name: sample
libraries: [lib.js]
scenarios:
  - name: div
    script: render()
    expect:
      matches: "^<div>.*</div>$"
  - name: parts
    load: [extra.js]
    script: parts()
    expect:
      contains: [alpha, beta]
"#;

    #[test]
    fn parses_yaml() {
        let suite = Suite::from_yaml(SUITE).unwrap();
        assert_eq!(suite.name, "sample");
        assert_eq!(suite.libraries, [PathBuf::from("lib.js")]);
        assert_eq!(suite.scenarios.len(), 2);
        assert!(suite.scenarios[0].load.is_empty());
        assert_eq!(suite.scenarios[1].load, [PathBuf::from("extra.js")]);
        assert!(matches!(suite.scenarios[1].expect, Expectation::Contains(ref c) if c.len() == 2));
    }

    #[test]
    fn bad_regex_is_rejected_with_its_path() {
        let raw = SUITE.replace("^<div>.*</div>$", "(unclosed");
        let err = format!("{:#}", Suite::from_yaml(&raw).unwrap_err());
        assert!(err.contains("scenarios[0]"), "{err}");
    }

    #[test]
    fn missing_field_is_reported() {
        let err = Suite::from_yaml("name: x\n").unwrap_err();
        assert!(err.to_string().contains("scenarios"), "{err}");
    }

    #[test]
    fn pattern_expectation() {
        let expect = Expectation::Matches(Regex::new("^<b>.*</b>$").unwrap());
        assert_eq!(expect.check("<b>ok</b>"), Ok(()));
        assert_eq!(
            expect.check("<i>no</i>"),
            Err(Mismatch::Pattern {
                pattern: "^<b>.*</b>$".into(),
                output: "<i>no</i>".into(),
            })
        );
    }

    #[test]
    fn contains_expectation_lists_what_is_missing() {
        let expect = Expectation::Contains(vec!["a".into(), "b".into(), "c".into()]);
        assert_eq!(expect.check("cab"), Ok(()));
        let err = expect.check("a").unwrap_err();
        assert_eq!(
            err,
            Mismatch::Missing {
                missing: vec!["b".into(), "c".into()]
            }
        );
        assert_eq!(err.to_string(), "expected output to contain b, c but it did not");
    }

    #[test]
    fn builtin_suite_uses_react_fixtures() {
        let suite = Suite::react_013();
        assert_eq!(suite.libraries, [PathBuf::from(fixtures::REACT_0133)]);
        assert_eq!(suite.scenarios[0].script, fixtures::RENDER_DIV);
        assert_eq!(suite.scenarios[1].load, [PathBuf::from(fixtures::COMPONENTS)]);
        assert!(suite.scenarios[1]
            .expect
            .check(r#"<div class="the-parent"><span class="child-1">First child</span><span class="child-2">Second child</span><span class="child-3">Third child</span></div>"#)
            .is_ok());
    }
}
