use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Script file to decompose, relative to the working directory.
    #[serde(default = "default_script")]
    pub script_file: String,

    /// Folder of reference images fed to keyframe generation.
    #[serde(default = "default_references")]
    pub reference_folder: String,

    /// Approved shots are exported here.
    #[serde(default = "default_output")]
    pub output_folder: String,

    pub gemini: GeminiConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GeminiConfig {
    /// May be empty; GEMINI_API_KEY takes precedence when set.
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_text_model")]
    pub text_model: String,

    #[serde(default = "default_image_model")]
    pub image_model: String,
}

fn default_script() -> String {
    "script.txt".to_string()
}
fn default_references() -> String {
    "references".to_string()
}
fn default_output() -> String {
    "output".to_string()
}
fn default_text_model() -> String {
    "gemini-2.5-pro".to_string()
}
fn default_image_model() -> String {
    "gemini-2.5-flash-image".to_string()
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Path::new("config.yml");
        if !path.exists() {
            anyhow::bail!("config.yml not found. Please create one.");
        }

        let content = fs::read_to_string(path).context("Failed to read config.yml")?;
        let config: Config =
            serde_yaml_ng::from_str(&content).context("Failed to parse config.yml")?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let content = serde_yaml_ng::to_string(self)?;
        fs::write("config.yml", content).context("Failed to write config.yml")?;
        Ok(())
    }

    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.reference_folder)?;
        fs::create_dir_all(&self.output_folder)?;
        Ok(())
    }

    /// Effective API key: environment overrides the config file.
    pub fn api_key(&self) -> String {
        std::env::var("GEMINI_API_KEY").unwrap_or_else(|_| self.gemini.api_key.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_round_trip_preserves_api_key() {
        let config = Config {
            script_file: default_script(),
            reference_folder: default_references(),
            output_folder: default_output(),
            gemini: GeminiConfig {
                api_key: "new-key".to_string(),
                text_model: default_text_model(),
                image_model: default_image_model(),
            },
        };

        let yaml = serde_yaml_ng::to_string(&config).unwrap();
        let reloaded: Config = serde_yaml_ng::from_str(&yaml).unwrap();
        assert_eq!(reloaded.gemini.api_key, "new-key");
        assert_eq!(reloaded.script_file, "script.txt");
    }

    #[test]
    fn test_minimal_config_gets_defaults() {
        let yaml = "gemini:\n  api_key: \"abc\"\n";
        let config: Config = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(config.script_file, "script.txt");
        assert_eq!(config.output_folder, "output");
        assert_eq!(config.gemini.text_model, "gemini-2.5-pro");
        assert_eq!(config.gemini.image_model, "gemini-2.5-flash-image");
    }
}
