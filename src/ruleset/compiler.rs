//! Rule file loading and compilation.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::RuleSet;
use crate::error::{Error, Result};
use crate::rule::{Rule, RuleSpec};
use crate::Target;

/// Compiles a list of JSON rule files into a [`RuleSet`].
///
/// Files are read in order; rules from earlier files take priority. Nothing
/// is committed unless every pattern of every rule compiles.
#[derive(Debug, Clone)]
pub struct RuleCompiler {
    paths: Vec<PathBuf>,
    default_target: Target,
}

impl RuleCompiler {
    pub fn new(paths: Vec<PathBuf>, default_target: Target) -> Self {
        Self {
            paths,
            default_target,
        }
    }

    /// Watched rule files in priority order.
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn default_target(&self) -> &Target {
        &self.default_target
    }

    /// Load and compile every rule file.
    ///
    /// A missing file contributes no rules. A file that is not valid JSON is
    /// logged and skipped. Any other read error, or any pattern that fails to
    /// compile, aborts the whole load.
    pub fn compile(&self) -> Result<RuleSet> {
        let mut rules = Vec::new();
        for path in &self.paths {
            let specs = match read_specs(path) {
                Ok(Some(specs)) => specs,
                Ok(None) => continue,
                Err(e) => {
                    return Err(Error::RuleFile {
                        path: path.clone(),
                        source: Box::new(e),
                    })
                }
            };
            let compiled = compile_specs(&specs).map_err(|e| Error::RuleFile {
                path: path.clone(),
                source: Box::new(e),
            })?;
            log::debug!("Compiled {} rules from {:?}", compiled.len(), path);
            rules.extend(compiled);
        }
        Ok(RuleSet::new(rules, self.default_target.clone()))
    }
}

/// Compile rule declarations, failing on the first bad pattern.
pub fn compile_specs(specs: &[RuleSpec]) -> Result<Vec<Rule>> {
    specs
        .iter()
        .enumerate()
        .map(|(index, spec)| Rule::compile(spec, index).map_err(Error::from))
        .collect()
}

fn read_specs(path: &Path) -> Result<Option<Vec<RuleSpec>>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::debug!("Rule file {:?} does not exist, skipping", path);
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };
    match serde_json::from_str(&content) {
        Ok(specs) => Ok(Some(specs)),
        Err(e) => {
            log::error!("Failed to parse rule file {:?}: {}", path, e);
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_priority_order() {
        let dir = tempfile::tempdir().unwrap();
        let user = dir.path().join("user_spac.json");
        let cloud = dir.path().join("cloud_spac.json");
        fs::write(&user, r#"[{"Host": ["a.com"], "Proxy": ["SSH"]}]"#).unwrap();
        fs::write(
            &cloud,
            r#"[{"Host": ["a.com"], "Proxy": ["C4"]}, {"Host": ["b.com"], "Proxy": ["Direct"]}]"#,
        )
        .unwrap();

        let compiler = RuleCompiler::new(vec![user, cloud], Target::Gae);
        let ruleset = compiler.compile().unwrap();
        assert_eq!(ruleset.len(), 3);
        assert_eq!(ruleset.rules()[0].targets(), &[Target::Ssh]);
        assert_eq!(ruleset.default_target(), &Target::Gae);
    }

    #[test]
    fn test_missing_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let user = dir.path().join("user_spac.json");
        fs::write(&user, r#"[{"Proxy": ["Direct"]}]"#).unwrap();

        let compiler = RuleCompiler::new(
            vec![user, dir.path().join("cloud_spac.json")],
            Target::Gae,
        );
        assert_eq!(compiler.compile().unwrap().len(), 1);
    }

    #[test]
    fn test_malformed_json_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.json");
        let good = dir.path().join("good.json");
        fs::write(&bad, "{not json").unwrap();
        fs::write(&good, r#"[{"Proxy": ["Direct"]}]"#).unwrap();

        let compiler = RuleCompiler::new(vec![bad, good], Target::Gae);
        assert_eq!(compiler.compile().unwrap().len(), 1);
    }

    #[test]
    fn test_bad_pattern_aborts_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        fs::write(
            &path,
            r#"[{"Host": ["ok.com"], "Proxy": ["SSH"]}, {"URL": ["bad["], "Proxy": ["C4"]}]"#,
        )
        .unwrap();

        let compiler = RuleCompiler::new(vec![path.clone()], Target::Gae);
        let err = compiler.compile().unwrap_err();
        match err {
            Error::RuleFile { path: p, source } => {
                assert_eq!(p, path);
                match *source {
                    Error::Pattern(pe) => {
                        assert_eq!(pe.rule_index, 1);
                        assert_eq!(pe.pattern, "bad[");
                    }
                    other => panic!("unexpected error: {}", other),
                }
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}
