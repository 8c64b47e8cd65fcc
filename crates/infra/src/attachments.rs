//! Attachments: file metadata rows plus a content-addressed blob store.
//!
//! Binary content is keyed by its SHA-256 checksum, so identical files are
//! stored once however many attachments point at them. Clients exchange the
//! content base64-encoded in the `datas` field.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};

use basis_auth::AccessKind;
use basis_core::{DomainError, DomainResult, Model, RecordId};

use crate::methods::{MethodRegistry, Params};
use crate::table::Table;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentType {
    #[default]
    Binary,
    Url,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default)]
    pub id: RecordId,
    pub name: String,
    /// Model of the record the file belongs to.
    #[serde(default)]
    pub res_model: Option<String>,
    #[serde(default)]
    pub res_id: Option<RecordId>,
    /// Field of the owning record the content fills (images).
    #[serde(default)]
    pub res_field: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: AttachmentType,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub mimetype: Option<String>,
    #[serde(default)]
    pub file_size: usize,
    #[serde(default)]
    pub checksum: Option<String>,
    #[serde(default)]
    pub store_fname: Option<String>,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub company_id: Option<RecordId>,
}

impl Attachment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: RecordId::default(),
            name: name.into(),
            res_model: None,
            res_id: None,
            res_field: None,
            kind: AttachmentType::Binary,
            url: None,
            mimetype: None,
            file_size: 0,
            checksum: None,
            store_fname: None,
            public: false,
            company_id: None,
        }
    }

    pub fn link(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            kind: AttachmentType::Url,
            url: Some(url.into()),
            ..Self::new(name)
        }
    }

    pub fn attached_to(mut self, model: impl Into<String>, id: RecordId) -> Self {
        self.res_model = Some(model.into());
        self.res_id = Some(id);
        self
    }
}

impl Model for Attachment {
    const NAME: &'static str = "Attachment";

    fn id(&self) -> RecordId {
        self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = id;
    }

    fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("attachment name is required"));
        }
        match self.kind {
            AttachmentType::Url if self.url.as_deref().is_none_or(str::is_empty) => {
                Err(DomainError::validation("url attachments need a url"))
            }
            AttachmentType::Binary if self.url.is_some() => {
                Err(DomainError::validation("binary attachments cannot have a url"))
            }
            _ => Ok(()),
        }
    }

    fn display_name(&self) -> String {
        self.name.clone()
    }
}

/// SHA-256 of `content`, hex encoded.
pub fn checksum(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// Mimetype from the content's magic bytes, else from the file name.
pub fn guess_mimetype(name: &str, content: &[u8]) -> &'static str {
    const MAGIC: &[(&[u8], &str)] = &[
        (b"\x89PNG\r\n\x1a\n", "image/png"),
        (b"\xff\xd8\xff", "image/jpeg"),
        (b"GIF87a", "image/gif"),
        (b"GIF89a", "image/gif"),
        (b"%PDF-", "application/pdf"),
        (b"PK\x03\x04", "application/zip"),
    ];
    if let Some((_, mime)) = MAGIC.iter().find(|(magic, _)| content.starts_with(magic)) {
        return mime;
    }
    let extension = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "xml" => "application/xml",
        "json" => "application/json",
        _ if !content.is_empty() && std::str::from_utf8(content).is_ok() => "text/plain",
        _ => "application/octet-stream",
    }
}

/// Attachment rows and their content.
#[derive(Debug, Default)]
pub struct AttachmentStore {
    table: Arc<Table<Attachment>>,
    blobs: RwLock<HashMap<String, Arc<Vec<u8>>>>,
}

impl AttachmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self) -> &Arc<Table<Attachment>> {
        &self.table
    }

    pub fn get(&self, id: RecordId) -> DomainResult<Attachment> {
        self.table.get(id)
    }

    /// Store `content` and create the row describing it.
    pub fn create_binary(&self, mut attachment: Attachment, content: &[u8]) -> DomainResult<Attachment> {
        attachment.kind = AttachmentType::Binary;
        attachment.url = None;
        self.fill_content(&mut attachment, content);
        let created = self.table.create(attachment);
        if created.is_err() {
            self.collect_garbage();
        }
        created
    }

    pub fn create_url(&self, attachment: Attachment) -> DomainResult<Attachment> {
        self.table.create(Attachment {
            kind: AttachmentType::Url,
            file_size: 0,
            checksum: None,
            store_fname: None,
            ..attachment
        })
    }

    /// Create from client values; `datas` carries the base64 content.
    pub fn create_values(&self, mut values: Map<String, Value>) -> DomainResult<Attachment> {
        let content = take_datas(&mut values)?;
        values.remove("id");
        let attachment: Attachment = serde_json::from_value(Value::Object(values))
            .map_err(|e| DomainError::validation(format!("Attachment: {e}")))?;
        match (attachment.kind, content) {
            (AttachmentType::Url, _) => self.create_url(attachment),
            (AttachmentType::Binary, content) => {
                self.create_binary(attachment, &content.unwrap_or_default())
            }
        }
    }

    /// Merge client values; a `datas` key replaces the content.
    pub fn write_values(&self, id: RecordId, values: &Map<String, Value>) -> DomainResult<Attachment> {
        let mut values = values.clone();
        let content = take_datas(&mut values)?;
        for derived in ["file_size", "checksum", "store_fname"] {
            values.remove(derived);
        }
        let mut updated = self.table.write_values(id, &values)?;
        if let Some(content) = content {
            let mut refreshed = updated.clone();
            self.fill_content(&mut refreshed, &content);
            updated = self.table.update(id, |row| *row = refreshed)?;
        }
        self.collect_garbage();
        Ok(updated)
    }

    pub fn unlink(&self, id: RecordId) -> DomainResult<()> {
        self.table.unlink(id)?;
        self.collect_garbage();
        Ok(())
    }

    /// Raw content of a binary attachment.
    pub fn content(&self, id: RecordId) -> DomainResult<Arc<Vec<u8>>> {
        let attachment = self.table.get(id)?;
        let Some(sum) = attachment.checksum else {
            return Ok(Arc::new(Vec::new()));
        };
        self.blobs
            .read()
            .ok()
            .and_then(|blobs| blobs.get(&sum).cloned())
            .ok_or_else(|| DomainError::not_found(format!("content of attachment {id}")))
    }

    pub fn datas(&self, id: RecordId) -> DomainResult<String> {
        Ok(STANDARD.encode(self.content(id)?.as_slice()))
    }

    /// First attachment holding `field` of `model` record `id`.
    pub fn find_field(&self, model: &str, id: RecordId, field: &str) -> Option<Attachment> {
        self.table.find(|a| {
            a.res_model.as_deref() == Some(model)
                && a.res_id == Some(id)
                && a.res_field.as_deref() == Some(field)
        })
    }

    /// Number of distinct blobs held.
    pub fn blob_count(&self) -> usize {
        self.blobs.read().map(|b| b.len()).unwrap_or(0)
    }

    fn fill_content(&self, attachment: &mut Attachment, content: &[u8]) {
        let sum = checksum(content);
        if let Ok(mut blobs) = self.blobs.write() {
            blobs
                .entry(sum.clone())
                .or_insert_with(|| Arc::new(content.to_vec()));
        }
        attachment.file_size = content.len();
        attachment.store_fname = Some(format!("{}/{sum}", &sum[..2]));
        if attachment.mimetype.is_none() {
            attachment.mimetype = Some(guess_mimetype(&attachment.name, content).to_string());
        }
        attachment.checksum = Some(sum);
    }

    /// Drop blobs no row refers to anymore.
    fn collect_garbage(&self) {
        let referenced: Vec<String> = self
            .table
            .all()
            .into_iter()
            .filter_map(|a| a.checksum)
            .collect();
        if let Ok(mut blobs) = self.blobs.write() {
            blobs.retain(|sum, _| referenced.contains(sum));
        }
    }

    /// Register the attachment methods; content travels as base64 `datas`.
    pub fn register(self: &Arc<Self>, registry: &mut MethodRegistry) {
        registry.register_table(self.table.clone());

        let store = self.clone();
        registry.register(Attachment::NAME, "create", AccessKind::Create, move |_ctx, params| {
            let values: Map<String, Value> = Params::from_value(params).required(0, "vals")?;
            Ok(json!(store.create_values(values)?.id))
        });

        let store = self.clone();
        registry.register(Attachment::NAME, "write", AccessKind::Write, move |_ctx, params| {
            let params = Params::from_value(params);
            let values: Map<String, Value> = params.required(1, "vals")?;
            for id in params.ids(0, "ids")? {
                store.write_values(id, &values)?;
            }
            Ok(json!(true))
        });

        let store = self.clone();
        registry.register(Attachment::NAME, "unlink", AccessKind::Unlink, move |_ctx, params| {
            for id in Params::from_value(params).ids(0, "ids")? {
                store.unlink(id)?;
            }
            Ok(json!(true))
        });

        let store = self.clone();
        registry.register(Attachment::NAME, "read", AccessKind::Read, move |_ctx, params| {
            let params = Params::from_value(params);
            let ids = params.ids(0, "ids")?;
            let fields: Vec<String> = params.optional(1, "fields")?.unwrap_or_default();
            let mut rows = store.table.read(&ids, &fields)?;
            if fields.iter().any(|f| f == "datas") {
                for row in &mut rows {
                    let id = row.get("id").and_then(Value::as_i64).map(RecordId::new);
                    if let Some(id) = id {
                        row.insert("datas".to_string(), json!(store.datas(id)?));
                    }
                }
            }
            Ok(json!(rows))
        });
    }
}

fn take_datas(values: &mut Map<String, Value>) -> DomainResult<Option<Vec<u8>>> {
    match values.remove("datas") {
        None | Some(Value::Null) | Some(Value::Bool(false)) => Ok(None),
        Some(Value::String(encoded)) => STANDARD
            .decode(encoded.trim())
            .map(Some)
            .map_err(|e| DomainError::validation(format!("datas is not valid base64: {e}"))),
        Some(other) => Err(DomainError::validation(format!(
            "datas must be a base64 string, got {other}"
        ))),
    }
}
