use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use log::*;
use tauri::{AppHandle, Emitter, Manager};
use tokio::sync::Mutex;

mod config_manager;
use config_manager::ConfigManager;
mod search_data_manager;
use search_data_manager::{DatasetInfo, SearchDataManager};
mod brand_classifier;
mod ctr_analyzer;
use ctr_analyzer::{AnalysisInput, AnalysisResult};

#[tauri::command]
async fn load_search_csv_command(
    app_handle: AppHandle,
    file_path: String,
) -> Result<DatasetInfo, String> {
    let data_manager = app_handle.state::<Arc<Mutex<SearchDataManager>>>();
    let mut manager = data_manager.lock().await;
    manager
        .load_csv(&PathBuf::from(&file_path))
        .map_err(|e| e.to_string())?;
    let info = manager
        .info()
        .ok_or_else(|| "Dataset missing after load".to_string())?;
    drop(manager);

    // Remember the file so the frontend can offer a quick reload next launch
    let config_manager = app_handle.state::<Arc<Mutex<ConfigManager>>>();
    if let Err(e) = config_manager.lock().await.set_last_csv_path(file_path) {
        warn!("Failed to persist last CSV path: {}", e);
    }

    let _ = app_handle.emit(
        "dataset_status",
        serde_json::json!({ "status": "loaded", "rows": info.row_count }),
    );

    Ok(info)
}

#[tauri::command]
async fn dataset_info_command(app_handle: AppHandle) -> Result<Option<DatasetInfo>, String> {
    let data_manager = app_handle.state::<Arc<Mutex<SearchDataManager>>>();
    let info = data_manager.lock().await.info();
    Ok(info)
}

#[tauri::command]
async fn clear_dataset_command(app_handle: AppHandle) -> Result<(), String> {
    let data_manager = app_handle.state::<Arc<Mutex<SearchDataManager>>>();
    data_manager.lock().await.clear();
    let _ = app_handle.emit("dataset_status", serde_json::json!({ "status": "cleared" }));
    Ok(())
}

#[tauri::command]
async fn analyze_ctr_command(
    app_handle: AppHandle,
    brand_keywords: String,
    min_impressions: u64,
) -> Result<AnalysisResult, String> {
    let start = Instant::now();
    let input = AnalysisInput::new(brand_keywords, min_impressions);

    let data_manager = app_handle.state::<Arc<Mutex<SearchDataManager>>>();
    let manager = data_manager.lock().await;
    let rows = manager
        .rows()
        .ok_or_else(|| "No CSV loaded".to_string())?;
    let result = ctr_analyzer::analyze(rows, &input);
    drop(manager);

    info!(
        "Analysis complete: {} branded / {} non-branded rows in {:.2}s",
        result.branded.rows.len(),
        result.non_branded.rows.len(),
        start.elapsed().as_secs_f64()
    );

    // Persist the parameters as the new defaults
    let config_manager = app_handle.state::<Arc<Mutex<ConfigManager>>>();
    if let Err(e) = config_manager
        .lock()
        .await
        .set_analysis_params(input.brand_keywords.clone(), input.min_impressions)
    {
        warn!("Failed to persist analysis parameters: {}", e);
    }

    Ok(result)
}

#[tauri::command]
async fn export_ctr_report_command(
    app_handle: AppHandle,
    dir_path: String,
    brand_keywords: String,
    min_impressions: u64,
) -> Result<String, String> {
    let input = AnalysisInput::new(brand_keywords, min_impressions);

    let data_manager = app_handle.state::<Arc<Mutex<SearchDataManager>>>();
    let manager = data_manager.lock().await;
    let rows = manager
        .rows()
        .ok_or_else(|| "No CSV loaded".to_string())?;
    let result = ctr_analyzer::analyze(rows, &input);
    let report_path = manager
        .export_report(Path::new(&dir_path), &result)
        .map_err(|e| e.to_string())?;

    Ok(report_path.to_string_lossy().into_owned())
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    tauri::Builder::default()
        .plugin(
            tauri_plugin_log::Builder::new()
                .level(log::LevelFilter::Info)
                .build(),
        )
        .plugin(tauri_plugin_opener::init())
        .plugin(tauri_plugin_dialog::init())
        .setup(|app| {
            let app_handle = app.handle().clone();

            let config_manager = Arc::new(Mutex::new(
                ConfigManager::new(&app_handle).expect("Failed to initialize ConfigManager"),
            ));
            app_handle.manage(config_manager);

            let data_manager = Arc::new(Mutex::new(SearchDataManager::new()));
            app_handle.manage(data_manager);

            info!("Branded CTR analyzer initialized");
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            load_search_csv_command,
            dataset_info_command,
            clear_dataset_command,
            analyze_ctr_command,
            export_ctr_report_command,
            config_manager::get_config,
            config_manager::set_brand_keywords,
            config_manager::set_min_impressions,
            config_manager::set_last_csv_path,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
