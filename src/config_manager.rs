use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use configparser::ini::Ini;
use log::*;
use serde::{Deserialize, Serialize};
use tauri::{AppHandle, Manager, State};

use crate::ctr_analyzer::{MIN_IMPRESSIONS_CEILING, MIN_IMPRESSIONS_FLOOR};

const DEFAULT_MIN_IMPRESSIONS: u64 = 1000;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub analysis: AnalysisConfig,
    pub ui: UiConfig,
}

/// Last-used analysis parameters, restored on the next launch.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AnalysisConfig {
    pub brand_keywords: String,
    pub min_impressions: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UiConfig {
    pub last_csv_path: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            analysis: AnalysisConfig {
                brand_keywords: String::new(),
                min_impressions: DEFAULT_MIN_IMPRESSIONS,
            },
            ui: UiConfig {
                last_csv_path: String::new(),
            },
        }
    }
}

pub struct ConfigManager {
    config_path: PathBuf,
    pub config: AppConfig,
}

impl ConfigManager {
    pub fn new(app_handle: &AppHandle) -> Result<Self> {
        let app_data_dir = app_handle
            .path()
            .app_data_dir()
            .map_err(|_| anyhow!("Failed to get app data directory"))?;

        if !app_data_dir.exists() {
            fs::create_dir_all(&app_data_dir)
                .map_err(|e| anyhow!("Failed to create app data directory: {}", e))?;
        }

        let config_path = app_data_dir.join("config.ini");

        let mut manager = ConfigManager {
            config_path,
            config: AppConfig::default(),
        };

        if manager.config_path.exists() {
            manager.load()?;
        } else {
            info!("No config found, creating {}", manager.config_path.display());
            manager.save()?;
        }

        Ok(manager)
    }

    pub fn load(&mut self) -> Result<()> {
        let config_str = fs::read_to_string(&self.config_path)?;
        let mut config_ini = Ini::new();
        config_ini
            .read(config_str)
            .map_err(|e| anyhow!("Failed to read config string: {}", e))?;

        let mut app_config = AppConfig::default();

        if let Some(brand_keywords) = config_ini.get("analysis", "brand_keywords") {
            app_config.analysis.brand_keywords = brand_keywords;
        }
        if let Some(min_impressions_str) = config_ini.get("analysis", "min_impressions") {
            match min_impressions_str.parse::<u64>() {
                Ok(min_impressions) => {
                    app_config.analysis.min_impressions =
                        min_impressions.clamp(MIN_IMPRESSIONS_FLOOR, MIN_IMPRESSIONS_CEILING);
                }
                Err(_) => warn!(
                    "Ignoring unparseable min_impressions '{}' in config",
                    min_impressions_str
                ),
            }
        }
        if let Some(last_csv_path) = config_ini.get("ui", "last_csv_path") {
            app_config.ui.last_csv_path = last_csv_path;
        }

        self.config = app_config;
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        let mut config_ini = Ini::new();

        config_ini.set(
            "analysis",
            "brand_keywords",
            Some(self.config.analysis.brand_keywords.clone()),
        );
        config_ini.set(
            "analysis",
            "min_impressions",
            Some(self.config.analysis.min_impressions.to_string()),
        );
        config_ini.set(
            "ui",
            "last_csv_path",
            Some(self.config.ui.last_csv_path.clone()),
        );

        config_ini
            .write(&self.config_path)
            .map_err(|e| anyhow!("Failed to write config to file: {}", e))?;
        Ok(())
    }

    pub fn set_analysis_params(&mut self, brand_keywords: String, min_impressions: u64) -> Result<()> {
        self.config.analysis.brand_keywords = brand_keywords;
        self.config.analysis.min_impressions =
            min_impressions.clamp(MIN_IMPRESSIONS_FLOOR, MIN_IMPRESSIONS_CEILING);
        self.save()
    }

    pub fn set_last_csv_path(&mut self, path: String) -> Result<()> {
        self.config.ui.last_csv_path = path;
        self.save()
    }
}

#[tauri::command]
pub async fn get_config(
    state: State<'_, Arc<tokio::sync::Mutex<ConfigManager>>>,
) -> Result<AppConfig, String> {
    Ok(state.inner().lock().await.config.clone())
}

#[tauri::command]
pub async fn set_brand_keywords(
    state: State<'_, Arc<tokio::sync::Mutex<ConfigManager>>>,
    keywords: String,
) -> Result<(), String> {
    let mut config_manager = state.inner().lock().await;
    config_manager.config.analysis.brand_keywords = keywords;
    config_manager.save().map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn set_min_impressions(
    state: State<'_, Arc<tokio::sync::Mutex<ConfigManager>>>,
    min_impressions: u64,
) -> Result<(), String> {
    let mut config_manager = state.inner().lock().await;
    config_manager.config.analysis.min_impressions =
        min_impressions.clamp(MIN_IMPRESSIONS_FLOOR, MIN_IMPRESSIONS_CEILING);
    config_manager.save().map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn set_last_csv_path(
    state: State<'_, Arc<tokio::sync::Mutex<ConfigManager>>>,
    path: String,
) -> Result<(), String> {
    let mut config_manager = state.inner().lock().await;
    config_manager
        .set_last_csv_path(path)
        .map_err(|e| e.to_string())
}
