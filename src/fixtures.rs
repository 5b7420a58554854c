//! JavaScript assets and the React 0.13 render expressions shared by the
//! benches, the tests and the CLI.
//!
//! Assets are fixture setup: a missing file means a broken checkout, so the
//! loaders panic instead of returning errors.

use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use regex::Regex;

pub const REACT_0133: &str = "vendor/react-0.13.3.min.js";
pub const COMPONENTS: &str = "components.js";

pub const RENDER_DIV: &str =
    r#"React.renderToString(React.createElement("div", null, "Hello world"))"#;
pub const RENDER_COMPONENTS: &str = "React.renderToString(React.createElement(ParentComponent))";

pub const RENDER_DIV_PATTERN: &str = "^<div.*>Hello world</div>$";

/// Fragments a rendered `ParentComponent` has to contain.
pub const COMPONENT_TEXT: [&str; 7] = [
    "the-parent",
    "child-1",
    "child-2",
    "child-3",
    "First child",
    "Second child",
    "Third child",
];

/// `REACT_BENCH_ASSETS` if set, `assets/` in the crate otherwise.
pub fn assets_dir() -> PathBuf {
    env::var_os("REACT_BENCH_ASSETS")
        .map(PathBuf::from)
        .unwrap_or_else(|| Path::new(env!("CARGO_MANIFEST_DIR")).join("assets"))
}

pub fn asset(name: impl AsRef<Path>) -> PathBuf {
    assets_dir().join(name)
}

pub fn must_load_source(path: impl AsRef<Path>) -> Vec<u8> {
    let path = path.as_ref();
    fs::read(path).unwrap_or_else(|e| panic!("source file not found in {path:?}: {e}"))
}

pub fn react_0133_source() -> Vec<u8> {
    must_load_source(asset(REACT_0133))
}

pub fn component_source() -> Vec<u8> {
    must_load_source(asset(COMPONENTS))
}

pub fn render_div_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(RENDER_DIV_PATTERN).expect("pattern is a valid regex"))
}

/// Component fragments missing from `rendered`.
pub fn missing_component_text(rendered: &str) -> Vec<&'static str> {
    COMPONENT_TEXT
        .into_iter()
        .filter(|text| !rendered.contains(text))
        .collect()
}
