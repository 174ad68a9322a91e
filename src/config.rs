use super::scaling_list::*;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, PartialEq)]
pub enum ConfigError {
    MalformedParam(String),
    UnknownKey(String),
    InvalidValue { key: String, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MalformedParam(param) => {
                write!(f, "malformed parameter '{}', expected KEY=VAL", param)
            }
            ConfigError::UnknownKey(key) => write!(f, "unknown parameter '{}'", key),
            ConfigError::InvalidValue { key, value } => {
                write!(f, "invalid value '{}' for parameter '{}'", value, key)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ScalingListMode {
    Flat,
    Default,
}

impl ScalingListMode {
    pub fn build(&self) -> ScalingList {
        match self {
            ScalingListMode::Flat => ScalingList::flat(),
            ScalingListMode::Default => ScalingList::default_lists(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct QuantConfig {
    pub bit_depth: usize,
    pub use_rdoq: bool,
    /// Psy-rdoq strength, 0 disables it.
    pub psy_rdoq: f64,
    pub sign_hide: bool,
    pub scaling_list: ScalingListMode,
    /// Noise reduction strength, 0 disables it.
    pub noise_reduction: u32,
}

impl Default for QuantConfig {
    fn default() -> Self {
        QuantConfig {
            bit_depth: 8,
            use_rdoq: true,
            psy_rdoq: 0.0,
            sign_hide: true,
            scaling_list: ScalingListMode::Flat,
            noise_reduction: 0,
        }
    }
}

/// Splits `KEY=VAL[,KEY=VAL...]` into a map. Later keys override earlier ones.
pub fn parse_extra_params(params: &str) -> Result<HashMap<String, String>, ConfigError> {
    let mut map = HashMap::new();
    for param in params.split(',').filter(|p| !p.trim().is_empty()) {
        let kv = param.split('=').collect::<Vec<&str>>();
        if kv.len() != 2 || kv[0].trim().is_empty() {
            return Err(ConfigError::MalformedParam(param.to_string()));
        }
        map.insert(kv[0].trim().to_string(), kv[1].trim().to_string());
    }
    Ok(map)
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value {
        "1" | "true" | "on" => Ok(true),
        "0" | "false" | "off" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}

impl QuantConfig {
    pub fn apply_extra_params(&mut self, params: &str) -> Result<(), ConfigError> {
        for (key, val) in parse_extra_params(params)?.iter() {
            let (key, val) = (key.as_str(), val.as_str());
            match key {
                "bitdepth" => {
                    let bd = val.parse::<usize>().map_err(|_| invalid(key, val))?;
                    if !(8..=10).contains(&bd) {
                        return Err(invalid(key, val));
                    }
                    self.bit_depth = bd;
                }
                "rdoq" => self.use_rdoq = parse_bool(key, val)?,
                "psy-rdoq" => {
                    let psy = val.parse::<f64>().map_err(|_| invalid(key, val))?;
                    if !(0.0..=50.0).contains(&psy) {
                        return Err(invalid(key, val));
                    }
                    self.psy_rdoq = psy;
                }
                "sbh" => self.sign_hide = parse_bool(key, val)?,
                "scaling-list" => {
                    self.scaling_list = match val {
                        "flat" | "off" => ScalingListMode::Flat,
                        "default" => ScalingListMode::Default,
                        _ => return Err(invalid(key, val)),
                    }
                }
                "nr" => self.noise_reduction = val.parse::<u32>().map_err(|_| invalid(key, val))?,
                _ => return Err(ConfigError::UnknownKey(key.to_string())),
            }
        }
        Ok(())
    }

    /// Psy strength in the fixed point form used by the RDO search.
    #[inline(always)]
    pub fn psy_rdoq_scale(&self) -> u64 {
        (self.psy_rdoq * 256.0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = QuantConfig::default();
        assert_eq!(cfg.bit_depth, 8);
        assert!(cfg.use_rdoq);
        assert!(cfg.sign_hide);
        assert_eq!(cfg.psy_rdoq_scale(), 0);
        assert_eq!(cfg.scaling_list, ScalingListMode::Flat);
        assert!(!cfg.scaling_list.build().enabled);
    }

    #[test]
    fn extra_params_override_fields() {
        let mut cfg = QuantConfig::default();
        cfg.apply_extra_params("bitdepth=10,rdoq=0,psy-rdoq=1.5,sbh=off,scaling-list=default,nr=200")
            .unwrap();
        assert_eq!(cfg.bit_depth, 10);
        assert!(!cfg.use_rdoq);
        assert_eq!(cfg.psy_rdoq_scale(), 384);
        assert!(!cfg.sign_hide);
        assert_eq!(cfg.scaling_list, ScalingListMode::Default);
        assert!(cfg.scaling_list.build().enabled);
        assert_eq!(cfg.noise_reduction, 200);
    }

    #[test]
    fn bad_params_are_rejected() {
        let mut cfg = QuantConfig::default();
        assert_eq!(
            cfg.apply_extra_params("rdoq"),
            Err(ConfigError::MalformedParam("rdoq".to_string()))
        );
        assert_eq!(
            cfg.apply_extra_params("a=b=c"),
            Err(ConfigError::MalformedParam("a=b=c".to_string()))
        );
        assert_eq!(
            cfg.apply_extra_params("q0=1"),
            Err(ConfigError::UnknownKey("q0".to_string()))
        );
        assert!(matches!(
            cfg.apply_extra_params("bitdepth=12"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            cfg.apply_extra_params("sbh=maybe"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert_eq!(cfg, QuantConfig::default());
        assert_eq!(
            ConfigError::UnknownKey("q0".to_string()).to_string(),
            "unknown parameter 'q0'"
        );
    }

    #[test]
    fn empty_params_are_ignored() {
        let mut cfg = QuantConfig::default();
        cfg.apply_extra_params("").unwrap();
        cfg.apply_extra_params("nr=5,").unwrap();
        assert_eq!(cfg.noise_reduction, 5);
    }
}
