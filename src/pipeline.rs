//! Document session orchestration.
//!
//! A [`DocumentSession`] owns the state produced by one upload: the parsed
//! tree, field settings, loop settings and detected relations. Edits go
//! through its methods so ids stay consistent; re-parsing is transactional
//! (a failed parse leaves the previous state untouched); generation hands
//! off to the engine with options derived from the session.

use crate::error::{DocforgeError, DocforgeResult};
use crate::generate::{self, GenerateOptions, GeneratedFile};
use crate::model::{
    base_name, DataFormat, FieldSetting, LoopSetting, Node, Relation, TemplatePayload,
};
use crate::parser;
use crate::path::strip_loop_markers;
use crate::registry::Preset;
use crate::relations::detect_relations;
use crate::tree::{apply_loop_marker, clear_loop_marker, flatten_fields};
use tracing::info;

/// Live editing state for one uploaded or loaded document.
#[derive(Debug, Clone)]
pub struct DocumentSession {
    file_name: String,
    format: DataFormat,
    source_text: String,
    csv_delimiter: char,
    root: Node,
    fields: Vec<FieldSetting>,
    loops: Vec<LoopSetting>,
    relations: Vec<Relation>,
}

impl DocumentSession {
    /// Start a session from raw uploaded bytes: decode, detect the format,
    /// parse and infer the template.
    pub fn from_bytes(file_name: &str, bytes: &[u8]) -> DocforgeResult<Self> {
        let text = parser::decode_bytes(bytes)?;
        Self::from_text(file_name, &text)
    }

    pub fn from_text(file_name: &str, text: &str) -> DocforgeResult<Self> {
        let format = parser::detect_format(file_name, text);
        let parsed = parser::parse_document(text, format, None)?;
        info!(
            file = file_name,
            format = %format,
            fields = parsed.fields.len(),
            loops = parsed.loops.len(),
            relations = parsed.relations.len(),
            "document parsed"
        );
        Ok(DocumentSession {
            file_name: file_name.to_string(),
            format,
            source_text: text.to_string(),
            csv_delimiter: parsed.delimiter.unwrap_or(';'),
            root: parsed.root,
            fields: parsed.fields,
            loops: parsed.loops,
            relations: parsed.relations,
        })
    }

    /// Restore a session from a stored template. The source text reparses
    /// to rebuild the tree; the saved settings are authoritative.
    pub fn from_template(payload: &TemplatePayload) -> DocforgeResult<Self> {
        let parsed = parser::parse_document(
            &payload.source_text,
            payload.format,
            Some(payload.csv_delimiter).filter(|_| payload.format == DataFormat::Csv),
        )?;
        info!(template = %payload.id, name = %payload.name, "template loaded");
        Ok(DocumentSession {
            file_name: payload.file_name.clone(),
            format: payload.format,
            source_text: payload.source_text.clone(),
            csv_delimiter: payload.csv_delimiter,
            root: parsed.root,
            fields: payload
                .fields
                .iter()
                .map(|f| f.clone().normalize())
                .collect(),
            loops: payload.loops.clone(),
            relations: payload.relations.clone(),
        })
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn format(&self) -> DataFormat {
        self.format
    }

    pub fn csv_delimiter(&self) -> char {
        self.csv_delimiter
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn fields(&self) -> &[FieldSetting] {
        &self.fields
    }

    pub fn loops(&self) -> &[LoopSetting] {
        &self.loops
    }

    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    // -------------------------------------------------------------------------
    // Edits
    // -------------------------------------------------------------------------

    /// Replace the source text with an edited version.
    ///
    /// The new text must still parse; on failure the session keeps its
    /// previous tree and settings. Settings whose ids survive the reparse
    /// are carried over, everything else resets to inferred defaults.
    pub fn set_source(&mut self, text: &str) -> DocforgeResult<()> {
        let parsed = parser::parse_document(text, self.format, Some(self.csv_delimiter))?;

        let old_fields = std::mem::replace(&mut self.fields, parsed.fields);
        for field in self.fields.iter_mut() {
            if let Some(prev) = old_fields.iter().find(|f| f.id == field.id) {
                let sample = field.value.clone();
                let kind = field.kind;
                *field = prev.clone();
                field.value = sample;
                field.kind = kind;
                *field = field.clone().normalize();
            }
        }

        let old_loops = std::mem::replace(&mut self.loops, parsed.loops);
        for loop_setting in self.loops.iter_mut() {
            if let Some(prev) = old_loops.iter().find(|l| l.id == loop_setting.id) {
                loop_setting.count = prev.count;
            }
        }

        let old_relations = std::mem::replace(&mut self.relations, parsed.relations);
        for relation in self.relations.iter_mut() {
            if let Some(prev) = old_relations.iter().find(|r| r.id == relation.id) {
                relation.enabled = prev.enabled;
                relation.prefix = prev.prefix.clone();
                relation.suffix = prev.suffix.clone();
            }
        }

        self.root = parsed.root;
        self.source_text = text.to_string();
        if let Some(delimiter) = parsed.delimiter {
            self.csv_delimiter = delimiter;
        }
        info!(fields = self.fields.len(), "source re-parsed");
        Ok(())
    }

    /// Replace a field setting wholesale, matched by id.
    pub fn update_field(&mut self, setting: FieldSetting) -> DocforgeResult<()> {
        let Some(slot) = self.fields.iter_mut().find(|f| f.id == setting.id) else {
            return Err(DocforgeError::InvalidInput(format!(
                "Unknown field: {}",
                setting.id
            )));
        };
        *slot = setting.normalize();
        Ok(())
    }

    /// Set a loop's output count, clamped to >= 1.
    pub fn set_loop_count(&mut self, loop_id: &str, count: usize) -> DocforgeResult<()> {
        let Some(slot) = self.loops.iter_mut().find(|l| l.id == loop_id) else {
            return Err(DocforgeError::InvalidInput(format!(
                "Unknown loop: {}",
                loop_id
            )));
        };
        slot.count = count.max(1);
        Ok(())
    }

    pub fn set_relation_enabled(&mut self, relation_id: &str, enabled: bool) -> DocforgeResult<()> {
        let Some(slot) = self.relations.iter_mut().find(|r| r.id == relation_id) else {
            return Err(DocforgeError::InvalidInput(format!(
                "Unknown relation: {}",
                relation_id
            )));
        };
        slot.enabled = enabled;
        Ok(())
    }

    pub fn set_relation_affixes(
        &mut self,
        relation_id: &str,
        prefix: &str,
        suffix: &str,
    ) -> DocforgeResult<()> {
        let Some(slot) = self.relations.iter_mut().find(|r| r.id == relation_id) else {
            return Err(DocforgeError::InvalidInput(format!(
                "Unknown relation: {}",
                relation_id
            )));
        };
        slot.prefix = prefix.to_string();
        slot.suffix = suffix.to_string();
        Ok(())
    }

    /// Manually mark an XML node as a repeating group. Field ids under the
    /// node gain a `[]` segment; existing settings follow their field. A
    /// loop that already exists keeps its count, a new one starts at 2.
    pub fn add_loop_at(&mut self, template_path: &str) -> DocforgeResult<()> {
        self.require_xml("manual loops")?;
        let loop_id = format!("/{}", strip_loop_markers(template_path));
        let root_path = format!("/{}", self.root.tag);
        self.root = apply_loop_marker(&self.root, &root_path, template_path, &loop_id);
        if !self.loops.iter().any(|l| l.id == loop_id) {
            self.loops.push(LoopSetting::new(loop_id, 2));
        }
        self.refresh_fields();
        Ok(())
    }

    /// Remove a manually added loop marker; the loop setting goes with it.
    pub fn remove_loop_at(&mut self, template_path: &str) -> DocforgeResult<()> {
        self.require_xml("manual loops")?;
        let loop_id = format!("/{}", strip_loop_markers(template_path));
        let root_path = format!("/{}", self.root.tag);
        self.root = clear_loop_marker(&self.root, &root_path, template_path);
        self.loops.retain(|l| l.id != loop_id);
        self.refresh_fields();
        Ok(())
    }

    fn require_xml(&self, operation: &str) -> DocforgeResult<()> {
        if self.format != DataFormat::Xml {
            return Err(DocforgeError::InvalidInput(format!(
                "{} only apply to XML documents",
                operation
            )));
        }
        Ok(())
    }

    /// Re-flatten after a loop toggle. Field ids shift by a `[]` segment,
    /// so settings carry over matched on the marker-stripped id; relations
    /// are re-detected with their toggles preserved the same way.
    fn refresh_fields(&mut self) {
        let root_path = format!("/{}", self.root.tag);
        let mut fresh = Vec::new();
        flatten_fields(&self.root, &root_path, &mut fresh);

        let old_fields = std::mem::replace(&mut self.fields, fresh);
        for field in self.fields.iter_mut() {
            let key = strip_loop_markers(&field.id);
            if let Some(prev) = old_fields
                .iter()
                .find(|f| strip_loop_markers(&f.id) == key)
            {
                let id = field.id.clone();
                *field = prev.clone();
                field.id = id.clone();
                field.label = id;
            }
        }

        let old_relations = std::mem::take(&mut self.relations);
        self.relations = detect_relations(&self.fields);
        for relation in self.relations.iter_mut() {
            let key = strip_loop_markers(&relation.id);
            if let Some(prev) = old_relations
                .iter()
                .find(|r| strip_loop_markers(&r.id) == key)
            {
                relation.enabled = prev.enabled;
                relation.prefix = prev.prefix.clone();
                relation.suffix = prev.suffix.clone();
            }
        }
    }

    /// Apply a stored preset overlay to the live settings.
    pub fn apply_preset(&mut self, preset: &Preset) {
        crate::registry::apply_preset(
            preset,
            &mut self.fields,
            &mut self.loops,
            &mut self.relations,
        );
    }

    // -------------------------------------------------------------------------
    // Generation
    // -------------------------------------------------------------------------

    /// Generate `file_count` documents from the current state.
    ///
    /// Global-scope list fields may grow their loop counts first so the
    /// run covers every list line.
    pub fn generate(&mut self, file_count: usize) -> DocforgeResult<Vec<GeneratedFile>> {
        if generate::autosize_list_loops(&self.fields, &mut self.loops, file_count) {
            info!("loop counts grown for global lists");
        }
        let mut options = GenerateOptions::new(file_count, self.format);
        options.csv_delimiter = self.csv_delimiter;
        options.base_name = base_name(&self.file_name).to_string();
        let files = generate::generate(
            &self.root,
            &self.fields,
            &self.loops,
            &self.relations,
            &options,
        )?;
        info!(files = files.len(), "generation complete");
        Ok(files)
    }

    /// Generate and pack the run into one zip archive.
    pub fn generate_archive(&mut self, file_count: usize) -> DocforgeResult<Vec<u8>> {
        let files = self.generate(file_count)?;
        Ok(generate::archive::write_zip(&files)?)
    }

    // -------------------------------------------------------------------------
    // Persistence
    // -------------------------------------------------------------------------

    /// Snapshot the session into a storable template bundle. An empty `id`
    /// lets the registry assign one on save.
    pub fn to_payload(&self, id: &str, name: &str) -> TemplatePayload {
        TemplatePayload {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            project: String::new(),
            category: String::new(),
            source_text: self.source_text.clone(),
            format: self.format,
            csv_delimiter: self.csv_delimiter,
            fields: self.fields.clone(),
            loops: self.loops.clone(),
            relations: self.relations.clone(),
            file_name: self.file_name.clone(),
            saved_at: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldKind, FieldMode};

    const ORDERS: &str = r#"<orders>
  <order><id>1001</id><ref>1001</ref></order>
  <order><id>1002</id><ref>1002</ref></order>
</orders>"#;

    #[test]
    fn test_upload_infers_template() {
        let session = DocumentSession::from_text("orders.xml", ORDERS).unwrap();
        assert_eq!(session.format(), DataFormat::Xml);
        assert_eq!(session.loops().len(), 1);
        assert_eq!(session.loops()[0].count, 2);
        assert_eq!(session.fields().len(), 2);
        assert_eq!(session.relations().len(), 1);
    }

    #[test]
    fn test_upload_from_bytes_decodes() {
        let session =
            DocumentSession::from_bytes("orders.xml", "\u{FEFF}<r><v>1</v></r>".as_bytes())
                .unwrap();
        assert_eq!(session.fields()[0].id, "r/v");
    }

    #[test]
    fn test_update_field_rejects_unknown_id() {
        let mut session = DocumentSession::from_text("orders.xml", ORDERS).unwrap();
        let bogus = FieldSetting::new("nope/nothing", "x", None);
        assert!(matches!(
            session.update_field(bogus),
            Err(DocforgeError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_set_loop_count_clamps_to_one() {
        let mut session = DocumentSession::from_text("orders.xml", ORDERS).unwrap();
        session.set_loop_count("/orders/order", 0).unwrap();
        assert_eq!(session.loops()[0].count, 1);
    }

    #[test]
    fn test_failed_reparse_keeps_previous_state() {
        let mut session = DocumentSession::from_text("orders.xml", ORDERS).unwrap();
        let mut field = session.fields()[0].clone();
        field.mode = FieldMode::Fixed;
        field.fixed_value = "X".to_string();
        session.update_field(field).unwrap();

        let err = session.set_source("<broken>");
        assert!(err.is_err());
        assert_eq!(session.fields().len(), 2);
        assert_eq!(session.fields()[0].mode, FieldMode::Fixed);
        assert_eq!(session.loops()[0].count, 2);
    }

    #[test]
    fn test_reparse_carries_settings_for_surviving_ids() {
        let mut session = DocumentSession::from_text("orders.xml", ORDERS).unwrap();
        let mut field = session.fields()[0].clone();
        field.mode = FieldMode::Increment;
        field.step = 3;
        session.update_field(field).unwrap();
        session.set_loop_count("/orders/order", 9).unwrap();

        let edited = ORDERS.replace("1002", "1005");
        session.set_source(&edited).unwrap();

        assert_eq!(session.fields()[0].mode, FieldMode::Increment);
        assert_eq!(session.fields()[0].step, 3);
        assert_eq!(session.loops()[0].count, 9);
    }

    #[test]
    fn test_manual_loop_add_and_remove_moves_settings() {
        let mut session =
            DocumentSession::from_text("doc.xml", "<doc><line><v>7</v></line></doc>").unwrap();
        assert!(session.loops().is_empty());
        assert_eq!(session.fields()[0].id, "doc/line/v");

        let mut field = session.fields()[0].clone();
        field.mode = FieldMode::Increment;
        session.update_field(field).unwrap();

        session.add_loop_at("doc/line").unwrap();
        assert_eq!(session.loops().len(), 1);
        assert_eq!(session.loops()[0].id, "/doc/line");
        assert_eq!(session.loops()[0].count, 2);
        assert_eq!(session.fields()[0].id, "doc/line[]/v");
        assert_eq!(session.fields()[0].mode, FieldMode::Increment);

        session.remove_loop_at("doc/line[]").unwrap();
        assert!(session.loops().is_empty());
        assert_eq!(session.fields()[0].id, "doc/line/v");
        assert_eq!(session.fields()[0].mode, FieldMode::Increment);
    }

    #[test]
    fn test_manual_loops_rejected_for_json() {
        let mut session = DocumentSession::from_text("d.json", r#"{"a": 1}"#).unwrap();
        assert!(matches!(
            session.add_loop_at("root/a"),
            Err(DocforgeError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_template_round_trip_preserves_edits() {
        let mut session = DocumentSession::from_text("orders.xml", ORDERS).unwrap();
        let mut field = session.fields()[1].clone();
        field.mode = FieldMode::Random;
        field.length = 0;
        session.update_field(field).unwrap();
        session.set_relation_enabled(&session.relations()[0].id.clone(), false)
            .unwrap();

        let payload = session.to_payload("", "My Orders");
        let restored = DocumentSession::from_template(&payload).unwrap();

        assert_eq!(restored.fields()[1].mode, FieldMode::Random);
        assert!(!restored.relations()[0].enabled);
        assert_eq!(restored.format(), DataFormat::Xml);
    }

    #[test]
    fn test_generate_via_session() {
        let mut session = DocumentSession::from_text("orders.xml", ORDERS).unwrap();
        let files = session.generate(3).unwrap();
        assert_eq!(files.len(), 3);
        assert_eq!(files[0].name, "orders_1.xml");
        assert!(String::from_utf8(files[0].bytes.clone())
            .unwrap()
            .contains("<id>1001</id>"));
    }

    #[test]
    fn test_generate_archive_packs_all_files() {
        let mut session = DocumentSession::from_text("orders.xml", ORDERS).unwrap();
        let bytes = session.generate_archive(2).unwrap();
        let archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 2);
    }

    #[test]
    fn test_csv_session_keeps_delimiter() {
        let session = DocumentSession::from_text("data.csv", "a;b\n1;2\n").unwrap();
        assert_eq!(session.csv_delimiter(), ';');
        assert_eq!(session.fields()[0].kind, FieldKind::Number);
    }
}
