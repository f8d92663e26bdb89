use std::{collections::HashMap, fs};

use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct Settings {
    pub server_bind: String,
    pub layout_path: String,
    pub osc_bind: String,
    /// Static OSC peers: name to "host:port".
    pub osc_peers: HashMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8080".into(),
            layout_path: "demos/synth.json".into(),
            osc_bind: "0.0.0.0:57121".into(),
            osc_peers: HashMap::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    server_bind: Option<String>,
    layout_path: Option<String>,
    osc_bind: Option<String>,
    osc_peers: Option<HashMap<String, String>>,
}

/// Defaults, overlaid by `surface.toml`, overlaid by environment.
pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("surface.toml") {
        overlay_file(&mut settings, &raw);
    }

    if let Ok(v) = std::env::var("SURFACE_BIND") {
        settings.server_bind = v;
    }
    if let Ok(v) = std::env::var("SURFACE_LAYOUT") {
        settings.layout_path = v;
    }
    if let Ok(v) = std::env::var("SURFACE_OSC_BIND") {
        settings.osc_bind = v;
    }

    settings
}

fn overlay_file(settings: &mut Settings, raw: &str) {
    let Ok(file) = toml::from_str::<FileSettings>(raw) else {
        return;
    };
    if let Some(v) = file.server_bind {
        settings.server_bind = v;
    }
    if let Some(v) = file.layout_path {
        settings.layout_path = v;
    }
    if let Some(v) = file.osc_bind {
        settings.osc_bind = v;
    }
    if let Some(v) = file.osc_peers {
        settings.osc_peers = v;
    }
}
