use crate::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;

/// Runtime parameters substituted into a config.
#[derive(Debug, Clone, Default)]
pub struct Params {
    values: HashMap<String, String>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Parse `-P key=value` arguments; the value may itself contain `=`.
    pub fn from_args(args: &[String]) -> Result<Self> {
        args.iter()
            .map(|arg| match arg.split_once('=') {
                Some((key, value)) if !key.trim().is_empty() => {
                    Ok((key.trim().to_string(), value.to_string()))
                }
                _ => Err(Error::Config(format!(
                    "invalid param '{}', expected key=value",
                    arg
                ))),
            })
            .collect::<Result<HashMap<_, _>>>()
            .map(|values| Self { values })
    }
}

/// Parameter definition in config.
#[derive(Debug, Clone, Deserialize)]
pub struct ParamDef {
    /// Whether this parameter is required.
    #[serde(default)]
    pub required: bool,

    /// Default value if not provided.
    pub default: Option<String>,

    /// Description for documentation.
    pub description: Option<String>,
}

static VAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex"));

/// Value for `${name}`: explicit param, then environment, then the definition.
///
/// `Ok(None)` means the variable is unknown and stays in the text.
fn lookup(name: &str, params: &Params, defs: &HashMap<String, ParamDef>) -> Result<Option<String>> {
    if let Some(v) = params.get(name) {
        return Ok(Some(v.to_string()));
    }
    if let Ok(v) = std::env::var(name) {
        return Ok(Some(v));
    }
    match defs.get(name) {
        Some(ParamDef {
            default: Some(default),
            ..
        }) => Ok(Some(default.clone())),
        Some(def) if def.required => Err(Error::Config(format!(
            "missing required parameter: {}",
            name
        ))),
        Some(_) => Ok(Some(String::new())),
        None => Ok(None),
    }
}

/// Expand `${var}` references in `template`.
pub fn substitute(
    template: &str,
    params: &Params,
    defs: &HashMap<String, ParamDef>,
) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for caps in VAR.captures_iter(template) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        out.push_str(&template[last..whole.start()]);
        match lookup(name.as_str(), params, defs)? {
            Some(value) => out.push_str(&value),
            None => out.push_str(whole.as_str()),
        }
        last = whole.end();
    }
    out.push_str(&template[last..]);
    Ok(out)
}

/// Expand references in every string of a YAML tree; keys are left alone.
pub fn substitute_value(
    value: &mut serde_yaml::Value,
    params: &Params,
    defs: &HashMap<String, ParamDef>,
) -> Result<()> {
    use serde_yaml::Value;

    match value {
        Value::String(s) if s.contains("${") => *s = substitute(s, params, defs)?,
        Value::Mapping(map) => map
            .iter_mut()
            .try_for_each(|(_, v)| substitute_value(v, params, defs))?,
        Value::Sequence(seq) => seq
            .iter_mut()
            .try_for_each(|v| substitute_value(v, params, defs))?,
        Value::Tagged(tagged) => substitute_value(&mut tagged.value, params, defs)?,
        _ => {}
    }
    Ok(())
}
