//! Conditional-compilation predicate evaluation.
//!
//! The flag set and value maps are filled once (from the target
//! descriptor plus `--cfg` options) before expansion begins and are read
//! only afterwards, so evaluation is pure and order-independent.

use crate::ExpandError;
use ferric_ast::MetaItem;
use ferric_diagnostics::{error_codes, DiagnosticEngine, Span};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Default)]
pub struct CfgState {
    flags: HashSet<String>,
    values: HashMap<String, String>,
    /// Set-valued keys (`target_has_atomic`, `target_feature`): a
    /// key-value test passes when the tested value is in the set
    multi_values: HashMap<String, Vec<String>>,
}

impl CfgState {
    pub fn new() -> Self {
        CfgState::default()
    }

    pub fn set_flag(&mut self, name: &str) {
        self.flags.insert(name.to_string());
    }

    pub fn set_value(&mut self, name: &str, value: &str) {
        self.values.insert(name.to_string(), value.to_string());
    }

    pub fn set_multi_value(&mut self, name: &str, values: Vec<String>) {
        self.multi_values.insert(name.to_string(), values);
    }

    pub fn has_flag(&self, name: &str) -> bool {
        self.flags.contains(name)
    }

    /// Evaluate a cfg predicate tree.
    ///
    /// `all`/`any`/`not` combine recursively; a bare name tests the flag
    /// set; `key = "value"` tests the value maps. An unknown combinator
    /// is fatal, an unknown key is a warning that evaluates false.
    pub fn check(
        &self,
        span: &Span,
        mi: &MetaItem,
        diag: &mut DiagnosticEngine,
    ) -> Result<bool, ExpandError> {
        if mi.has_sub_items() {
            match mi.name.as_str() {
                "any" | "cfg" => {
                    for sub in mi.items() {
                        if self.check(span, sub, diag)? {
                            return Ok(true);
                        }
                    }
                    Ok(false)
                }
                "all" => {
                    for sub in mi.items() {
                        if !self.check(span, sub, diag)? {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                }
                "not" => {
                    if mi.items().len() != 1 {
                        return Err(ExpandError::CfgArity { span: span.clone() });
                    }
                    Ok(!self.check(span, &mi.items()[0], diag)?)
                }
                name => Err(ExpandError::UnknownCfgFunction {
                    span: span.clone(),
                    name: name.to_string(),
                }),
            }
        } else if let Some(tested) = mi.string() {
            if let Some(actual) = self.values.get(&mi.name) {
                log::debug!("cfg: {} = {:?} == {:?}", mi.name, actual, tested);
                return Ok(actual == tested);
            }
            if let Some(set) = self.multi_values.get(&mi.name) {
                return Ok(set.iter().any(|v| v == tested));
            }
            diag.emit_warning(
                error_codes::UNKNOWN_CFG_KEY,
                format!("unknown cfg() param `{}`", mi.name),
                span.clone(),
            );
            Ok(false)
        } else {
            Ok(self.flags.contains(&mi.name))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> CfgState {
        let mut cfg = CfgState::new();
        cfg.set_flag("unix");
        cfg.set_value("target_os", "linux");
        cfg.set_multi_value(
            "target_has_atomic",
            vec!["8".to_string(), "ptr".to_string()],
        );
        cfg
    }

    fn check(cfg: &CfgState, mi: &MetaItem) -> Result<bool, ExpandError> {
        let mut diag = DiagnosticEngine::new();
        cfg.check(&Span::unknown(), mi, &mut diag)
    }

    #[test]
    fn test_flags_and_values() {
        let cfg = state();
        assert!(check(&cfg, &MetaItem::flag("unix")).unwrap());
        assert!(!check(&cfg, &MetaItem::flag("windows")).unwrap());
        assert!(check(&cfg, &MetaItem::value("target_os", "linux")).unwrap());
        assert!(!check(&cfg, &MetaItem::value("target_os", "macos")).unwrap());
    }

    #[test]
    fn test_multi_valued_keys() {
        let cfg = state();
        assert!(check(&cfg, &MetaItem::value("target_has_atomic", "ptr")).unwrap());
        assert!(!check(&cfg, &MetaItem::value("target_has_atomic", "64")).unwrap());
    }

    #[test]
    fn test_identity_and_zero_laws() {
        let cfg = state();
        // all() with no arguments is true; any() with none is false
        assert!(check(&cfg, &MetaItem::list("all", vec![])).unwrap());
        assert!(!check(&cfg, &MetaItem::list("any", vec![])).unwrap());
    }

    #[test]
    fn test_combinators() {
        let cfg = state();
        let mi = MetaItem::list(
            "all",
            vec![
                MetaItem::flag("unix"),
                MetaItem::list("not", vec![MetaItem::flag("windows")]),
            ],
        );
        assert!(check(&cfg, &mi).unwrap());
    }

    #[test]
    fn test_not_arity_is_checked() {
        let cfg = state();
        let zero = MetaItem::list("not", vec![]);
        assert!(matches!(
            check(&cfg, &zero),
            Err(ExpandError::CfgArity { .. })
        ));
        let two = MetaItem::list(
            "not",
            vec![MetaItem::flag("a"), MetaItem::flag("b")],
        );
        assert!(matches!(
            check(&cfg, &two),
            Err(ExpandError::CfgArity { .. })
        ));
    }

    #[test]
    fn test_unknown_function_is_fatal() {
        let cfg = state();
        let mi = MetaItem::list("exactly_one", vec![MetaItem::flag("unix")]);
        assert!(matches!(
            check(&cfg, &mi),
            Err(ExpandError::UnknownCfgFunction { .. })
        ));
    }

    #[test]
    fn test_unknown_key_warns_and_is_false() {
        let cfg = state();
        let mut diag = DiagnosticEngine::new();
        let mi = MetaItem::value("target_bits", "64");
        let result = cfg.check(&Span::unknown(), &mi, &mut diag).unwrap();
        assert!(!result);
        assert_eq!(diag.warning_count(), 1);
    }
}
