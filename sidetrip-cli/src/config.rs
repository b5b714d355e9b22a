use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub amap: AmapSection,
    pub llm: LlmSection,
    pub defaults: DefaultsSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmapSection {
    /// AMap web-service key; may also come from AMAP_KEY.
    pub key: String,
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSection {
    /// Empty means no narrative provider: deterministic fallback text only.
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    /// Let the model refine intent classification (rule pass stays the
    /// safety net).
    pub model_intent: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsSection {
    /// Search city scope; empty disables scoping.
    pub city: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            amap: AmapSection {
                key: String::new(),
                base_url: "https://restapi.amap.com".to_string(),
            },
            llm: LlmSection {
                api_key: String::new(),
                model: "gpt-4o-mini".to_string(),
                base_url: "https://api.openai.com".to_string(),
                model_intent: false,
            },
            defaults: DefaultsSection {
                city: sidetrip_engine::DEFAULT_CITY.to_string(),
            },
        }
    }
}

pub fn sidetrip_home() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".sidetrip"))
}

pub fn config_path() -> Result<PathBuf> {
    Ok(sidetrip_home()?.join("config.toml"))
}

pub fn load_config() -> Result<Config> {
    let p = config_path()?;
    let mut cfg = if p.exists() {
        let s = fs::read_to_string(&p).with_context(|| format!("read {}", p.display()))?;
        toml::from_str(&s).context("parse config.toml")?
    } else {
        Config::default()
    };

    // Env vars win over the file.
    if let Ok(k) = std::env::var("AMAP_KEY") {
        if !k.is_empty() {
            cfg.amap.key = k;
        }
    }
    if let Ok(k) = std::env::var("OPENAI_API_KEY") {
        if !k.is_empty() {
            cfg.llm.api_key = k;
        }
    }
    Ok(cfg)
}

pub fn init_config() -> Result<()> {
    let p = config_path()?;
    if p.exists() {
        println!("Config already exists: {}", p.display());
        return Ok(());
    }
    fs::create_dir_all(sidetrip_home()?).context("create ~/.sidetrip")?;
    let s = toml::to_string_pretty(&Config::default()).context("serialize config")?;
    fs::write(&p, s).with_context(|| format!("write {}", p.display()))?;
    println!("Wrote {}", p.display());
    Ok(())
}
