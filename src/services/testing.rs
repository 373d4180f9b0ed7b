use std::path::{Path, PathBuf};

use serde_json::{Value, json};
use tempfile::TempDir;

use crate::models::AiSettings;
use crate::services::library::Library;
use crate::services::settings::SettingsStore;

/// A throwaway `<root>/<site>/<novel>/json/<volume>/<n>.json` tree.
pub struct LibraryFixture {
    dir: TempDir,
}

impl LibraryFixture {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("temp library root"),
        }
    }

    pub fn root(&self) -> PathBuf {
        self.dir.path().join("Lightnovels")
    }

    pub fn library(&self) -> Library {
        Library::new(self.root(), true)
    }

    pub fn novel(&self, site: &str, novel_id: &str, title: &str) -> PathBuf {
        let path = self.root().join(site).join(novel_id);
        std::fs::create_dir_all(path.join("json")).unwrap();
        write(
            &path.join("meta.json"),
            &json!({ "novel": { "title": title, "author": "Anonymous" } }),
        );
        path
    }

    pub fn chapter(&self, site: &str, novel_id: &str, volume: &str, chapter: &str, body: &str) -> PathBuf {
        let dir = self.root().join(site).join(novel_id).join("json").join(volume);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(format!("{}.json", chapter));
        write(
            &path,
            &json!({
                "title": format!("Chapter {}", chapter),
                "body": body,
                "url": format!("https://example.org/{}/{}", novel_id, chapter),
            }),
        );
        path
    }

    pub fn ai_file(&self, site: &str, novel_id: &str, volume: &str, chapter: &str) -> PathBuf {
        self.root()
            .join(site)
            .join(novel_id)
            .join("json")
            .join(volume)
            .join(format!("{}-ai.json", chapter))
    }

    pub fn write_ai_file(&self, site: &str, novel_id: &str, volume: &str, chapter: &str, value: &Value) -> PathBuf {
        let path = self.ai_file(site, novel_id, volume, chapter);
        write(&path, value);
        path
    }

    pub fn settings(&self, enabled: bool) -> SettingsStore {
        let store = SettingsStore::new(self.dir.path().join(".settings").join("ai-rewrite.json"));
        let settings = AiSettings {
            enabled,
            prompt: String::new(),
        };
        std::fs::create_dir_all(self.dir.path().join(".settings")).unwrap();
        write(
            &self.dir.path().join(".settings").join("ai-rewrite.json"),
            &serde_json::to_value(settings).unwrap(),
        );
        store
    }
}

fn write(path: &Path, value: &Value) {
    std::fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
}
