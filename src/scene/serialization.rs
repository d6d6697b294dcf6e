use crate::scene::GlobalSettings;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SerializationError>;

/// Editor export document: `{ "global": { ... } }`.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EditorExport {
    #[serde(default)]
    pub global: GlobalSettings,
}

pub fn export_settings_json(settings: &GlobalSettings) -> Result<String> {
    let export = EditorExport { global: *settings };
    Ok(serde_json::to_string_pretty(&export)?)
}

pub fn parse_settings_json(json: &str) -> Result<GlobalSettings> {
    let export: EditorExport = serde_json::from_str(json)?;
    Ok(export.global)
}

pub fn save_settings_to_file(settings: &GlobalSettings, path: &Path) -> Result<()> {
    let json = export_settings_json(settings)?;
    std::fs::write(path, json)?;
    Ok(())
}

pub fn load_settings_from_file(path: &Path) -> Result<GlobalSettings> {
    let json = std::fs::read_to_string(path)?;
    parse_settings_json(&json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_uses_camel_case_keys_under_global() {
        let json = export_settings_json(&GlobalSettings::default()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let global = &value["global"];
        assert_eq!(global["bloomStrength"].as_f64().map(|v| v as f32), Some(0.48));
        assert_eq!(global["bloomThreshold"].as_f64().map(|v| v as f32), Some(0.975));
        assert_eq!(global["debugHelpers"], serde_json::Value::Bool(true));
    }

    #[test]
    fn partial_settings_fill_defaults() {
        let settings = parse_settings_json(r#"{ "global": { "exposure": 1.5 } }"#).unwrap();
        assert_eq!(settings.exposure, 1.5);
        assert_eq!(settings.rim_light_intensity, GlobalSettings::default().rim_light_intensity);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(
            parse_settings_json("{ global: "),
            Err(SerializationError::Json(_))
        ));
    }

    #[test]
    fn save_load_via_file() {
        let mut settings = GlobalSettings::default();
        settings.bloom_radius = 0.25;
        settings.main_light_intensity = 3.0;

        let mut path = std::env::temp_dir();
        let nonce = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        path.push(format!("lampviz_settings_{}_{}.json", std::process::id(), nonce));

        save_settings_to_file(&settings, &path).unwrap();
        let loaded = load_settings_from_file(&path).unwrap();
        assert_eq!(loaded, settings);

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn missing_file_is_io_error() {
        let path = std::env::temp_dir().join("lampviz_settings_does_not_exist.json");
        assert!(matches!(
            load_settings_from_file(&path),
            Err(SerializationError::Io(_))
        ));
    }
}
