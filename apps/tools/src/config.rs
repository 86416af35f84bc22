use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Settings {
    pub tag_file: PathBuf,
    pub capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tag_file: PathBuf::from("./tag.ndef"),
            // NTAG215-class capacity.
            capacity: 504,
        }
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("taglog.toml") {
        apply_file_settings(&mut settings, &raw);
    }

    apply_env_settings(
        &mut settings,
        std::env::var("TAG_FILE").ok(),
        std::env::var("TAG_CAPACITY").ok(),
    );

    settings
}

fn apply_env_settings(
    settings: &mut Settings,
    tag_file: Option<String>,
    capacity: Option<String>,
) {
    if let Some(v) = tag_file {
        settings.tag_file = PathBuf::from(v);
    }
    if let Some(v) = capacity {
        if let Ok(parsed) = v.parse::<usize>() {
            settings.capacity = parsed;
        }
    }
}

fn apply_file_settings(settings: &mut Settings, raw: &str) {
    let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(raw) else {
        return;
    };
    if let Some(v) = file_cfg.get("tag_file") {
        settings.tag_file = PathBuf::from(v);
    }
    if let Some(v) = file_cfg.get("capacity") {
        if let Ok(parsed) = v.parse::<usize>() {
            settings.capacity = parsed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_a_common_tag_class() {
        let settings = Settings::default();
        assert_eq!(settings.capacity, 504);
        assert_eq!(settings.tag_file, PathBuf::from("./tag.ndef"));
    }

    #[test]
    fn file_settings_override_defaults() {
        let mut settings = Settings::default();
        apply_file_settings(
            &mut settings,
            "tag_file = \"/tmp/cafe.ndef\"\ncapacity = \"128\"\n",
        );
        assert_eq!(settings.tag_file, PathBuf::from("/tmp/cafe.ndef"));
        assert_eq!(settings.capacity, 128);
    }

    #[test]
    fn unparseable_capacity_keeps_the_default() {
        let mut settings = Settings::default();
        apply_file_settings(&mut settings, "capacity = \"lots\"\n");
        assert_eq!(settings.capacity, 504);
    }

    #[test]
    fn env_overrides_beat_file_settings_and_defaults() {
        let mut settings = Settings::default();
        apply_file_settings(
            &mut settings,
            "tag_file = \"/tmp/from-file.ndef\"\ncapacity = \"128\"\n",
        );
        apply_env_settings(
            &mut settings,
            Some("/tmp/from-env.ndef".to_string()),
            Some("256".to_string()),
        );
        assert_eq!(settings.tag_file, PathBuf::from("/tmp/from-env.ndef"));
        assert_eq!(settings.capacity, 256);
    }

    #[test]
    fn unparseable_env_capacity_keeps_the_earlier_value() {
        let mut settings = Settings::default();
        apply_file_settings(&mut settings, "capacity = \"128\"\n");
        apply_env_settings(&mut settings, None, Some("lots".to_string()));
        assert_eq!(settings.capacity, 128);
        assert_eq!(settings.tag_file, PathBuf::from("./tag.ndef"));
    }
}
