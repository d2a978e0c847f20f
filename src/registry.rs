//! File-backed template and preset store.
//!
//! Templates persist the full reusable bundle (source text, fields, loops,
//! relations) as one pretty-printed JSON file per template under
//! `<root>/templates/`; presets persist a reusable settings overlay under
//! `<root>/presets/`. Saving with an existing id overwrites the stored
//! document wholesale; there is no merge on save. Unreadable entries are
//! skipped (and logged) during listing so one corrupt file cannot take the
//! whole store down.

use crate::error::{RegistryError, RegistryResult};
use crate::model::{DataFormat, FieldSetting, LoopSetting, Relation, TemplatePayload};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Listing row for a stored template; everything needed to render a
/// picker without loading source texts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub category: String,
    pub format: DataFormat,
    pub file_name: String,
}

/// A saved settings overlay: field/loop/relation configurations that can
/// be re-applied to a template after it is reloaded or reparsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preset {
    pub id: String,
    pub name: String,
    pub template_id: String,
    pub fields: Vec<FieldSetting>,
    pub loops: Vec<LoopSetting>,
    pub relations: Vec<Relation>,
}

/// Template/preset store rooted at a directory.
#[derive(Debug, Clone)]
pub struct Registry {
    root: PathBuf,
}

impl Registry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Registry { root: root.into() }
    }

    fn templates_dir(&self) -> PathBuf {
        self.root.join("templates")
    }

    fn presets_dir(&self) -> PathBuf {
        self.root.join("presets")
    }

    fn template_path(&self, id: &str) -> PathBuf {
        self.templates_dir().join(format!("{}.json", id))
    }

    fn preset_path(&self, id: &str) -> PathBuf {
        self.presets_dir().join(format!("{}.json", id))
    }

    // -------------------------------------------------------------------------
    // Templates
    // -------------------------------------------------------------------------

    /// Persist a template, assigning a fresh id when none is set. Returns
    /// the stored payload with its final id.
    pub fn save_template(&self, mut payload: TemplatePayload) -> RegistryResult<TemplatePayload> {
        if payload.id.is_empty() {
            payload.id = Uuid::new_v4().to_string();
        }
        payload.saved_at = chrono::Utc::now().to_rfc3339();
        fs::create_dir_all(self.templates_dir())?;
        let path = self.template_path(&payload.id);
        write_json(&path, &payload)?;
        debug!(id = %payload.id, name = %payload.name, "template saved");
        Ok(payload)
    }

    pub fn load_template(&self, id: &str) -> RegistryResult<TemplatePayload> {
        let path = self.template_path(id);
        if !path.is_file() {
            return Err(RegistryError::NotFound(id.to_string()));
        }
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Summaries of every stored template, sorted by name. Entries that
    /// fail to deserialize are skipped.
    pub fn list_templates(&self) -> RegistryResult<Vec<TemplateSummary>> {
        let dir = self.templates_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut summaries = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let text = fs::read_to_string(&path)?;
            match serde_json::from_str::<TemplateSummary>(&text) {
                Ok(summary) => summaries.push(summary),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping unreadable template");
                }
            }
        }
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(summaries)
    }

    /// Delete a template and any presets that target it.
    pub fn delete_template(&self, id: &str) -> RegistryResult<()> {
        let path = self.template_path(id);
        if !path.is_file() {
            return Err(RegistryError::NotFound(id.to_string()));
        }
        fs::remove_file(path)?;
        for preset in self.list_presets(Some(id))? {
            fs::remove_file(self.preset_path(&preset.id))?;
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Presets
    // -------------------------------------------------------------------------

    pub fn save_preset(&self, mut preset: Preset) -> RegistryResult<Preset> {
        if preset.id.is_empty() {
            preset.id = Uuid::new_v4().to_string();
        }
        fs::create_dir_all(self.presets_dir())?;
        write_json(&self.preset_path(&preset.id), &preset)?;
        Ok(preset)
    }

    pub fn load_preset(&self, id: &str) -> RegistryResult<Preset> {
        let path = self.preset_path(id);
        if !path.is_file() {
            return Err(RegistryError::PresetNotFound(id.to_string()));
        }
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Presets, optionally filtered to one template.
    pub fn list_presets(&self, template_id: Option<&str>) -> RegistryResult<Vec<Preset>> {
        let dir = self.presets_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut presets = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let text = fs::read_to_string(&path)?;
            match serde_json::from_str::<Preset>(&text) {
                Ok(preset) => {
                    if template_id.map_or(true, |id| preset.template_id == id) {
                        presets.push(preset);
                    }
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping unreadable preset");
                }
            }
        }
        presets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(presets)
    }

    pub fn delete_preset(&self, id: &str) -> RegistryResult<()> {
        let path = self.preset_path(id);
        if !path.is_file() {
            return Err(RegistryError::PresetNotFound(id.to_string()));
        }
        fs::remove_file(path)?;
        Ok(())
    }
}

/// Overlay a preset onto live settings, matching entries by id. Preset
/// entries whose id no longer exists are ignored, so presets stay usable
/// after the template's structure drifts.
pub fn apply_preset(
    preset: &Preset,
    fields: &mut [FieldSetting],
    loops: &mut [LoopSetting],
    relations: &mut [Relation],
) {
    for field in fields.iter_mut() {
        if let Some(saved) = preset.fields.iter().find(|f| f.id == field.id) {
            *field = saved.clone().normalize();
        }
    }
    for loop_setting in loops.iter_mut() {
        if let Some(saved) = preset.loops.iter().find(|l| l.id == loop_setting.id) {
            loop_setting.count = saved.count.max(1);
        }
    }
    for relation in relations.iter_mut() {
        if let Some(saved) = preset.relations.iter().find(|r| r.id == relation.id) {
            relation.enabled = saved.enabled;
            relation.prefix = saved.prefix.clone();
            relation.suffix = saved.suffix.clone();
        }
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> RegistryResult<()> {
    let mut text = serde_json::to_string_pretty(value)?;
    text.push('\n');
    fs::write(path, text)?;
    Ok(())
}
