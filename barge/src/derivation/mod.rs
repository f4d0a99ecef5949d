//! Derivations.
//!
//! A derivation is a build recipe, itself stored in the store as a
//! `.drv` file in the textual `Derive(...)` format. The uploader only
//! ever reads these files; writing them back is the store's job.

mod parser;

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

use crate::error::BargeResult;
use crate::hash::FileHash;
use crate::nix_store::StorePath;

pub use parser::ParseError;

/// A parsed derivation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Derivation {
    /// What the build produces, keyed by output name.
    ///
    /// Never empty; output names are unique.
    pub outputs: BTreeMap<String, DerivationOutput>,

    /// Derivations whose outputs feed this build, with the names of the
    /// outputs drawn from each.
    pub input_derivations: BTreeMap<StorePath, Vec<String>>,

    /// Non-derivation inputs.
    pub input_sources: Vec<StorePath>,

    /// The platform this derivation builds on, e.g. `x86_64-linux`.
    pub system: String,

    /// Absolute path of the build executable.
    pub builder: PathBuf,

    /// Arguments passed to the builder.
    pub args: Vec<String>,

    /// The builder environment.
    pub env: BTreeMap<String, String>,
}

/// One output of a derivation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DerivationOutput {
    /// The store path the output is (or will be) materialized at.
    pub path: StorePath,

    /// For fixed-output derivations, the expected content hash.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<FileHash>,
}

impl Derivation {
    /// Parses the textual `Derive(...)` form.
    pub fn parse(input: &str) -> BargeResult<Self> {
        Ok(parser::parse(input)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_form() {
        let drv = Derivation::parse(concat!(
            r#"Derive([("out","/nix/store/aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa-foo","","")]"#,
            r#",[("/nix/store/bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb-bar.drv",["out"])]"#,
            r#",[],"x86_64-linux","/bin/sh",[],[("name","foo")])"#,
        ))
        .unwrap();

        let json = serde_json::to_value(&drv).unwrap();

        assert_eq!(
            "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa-foo",
            json["outputs"]["out"]["path"]
        );
        assert_eq!(
            serde_json::json!(["out"]),
            json["input_derivations"]["bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb-bar.drv"]
        );
        assert_eq!("x86_64-linux", json["system"]);
        assert_eq!("foo", json["env"]["name"]);
    }
}
