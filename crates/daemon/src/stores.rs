//! File-backed persistence: fixtures, evidence, proof packs and escalation
//! tickets. Layout under the data root:
//!
//!   proofpacks/<change_id>.json     latest proof pack snapshot
//!   steplog/<change_id>.jsonl       append-only step transition log
//!   evidence/<evidence_id>.bin      raw uploaded bytes
//!   evidence/<evidence_id>.json     upload metadata
//!   escalations/<change>-<step>.json  one approval ticket per blocked step

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use ulid::Ulid;

use patchproof_core::{now_ms, ChangeRequest, EpochMs, ExpectedMapping, ProofPack, StepResult};
use patchproof_vision::MockOcrBackend;

/// Read-only fixture tree: changes/, mappings/ and ocr/cv_outputs.json.
#[derive(Debug, Clone)]
pub struct FixtureLibrary {
    root: PathBuf,
}

impl FixtureLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub async fn load_change(&self, change_id: &str) -> Result<Option<ChangeRequest>> {
        let path = self.root.join("changes").join(format!("{change_id}.json"));
        read_json_opt(&path).await
    }

    /// Missing mapping file means no record of truth; validation then fails
    /// with its own explicit reason rather than an error here.
    pub async fn load_mapping(&self, change_id: &str) -> Result<ExpectedMapping> {
        let path = self.root.join("mappings").join(format!("{change_id}.json"));
        Ok(read_json_opt(&path).await?.unwrap_or_default())
    }

    pub async fn load_ocr_backend(&self) -> Result<MockOcrBackend> {
        let path = self.root.join("ocr").join("cv_outputs.json");
        match tokio::fs::read_to_string(&path).await {
            Ok(json) => MockOcrBackend::from_json(&json)
                .with_context(|| format!("parse {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(MockOcrBackend::new(Default::default()))
            }
            Err(e) => Err(e).with_context(|| format!("read {}", path.display())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceMeta {
    pub evidence_id: String,
    pub change_id: String,
    pub step_id: String,
    pub content_type: Option<String>,
    pub sha256: String,
    pub size_bytes: u64,
    pub captured_at_ms: EpochMs,
}

/// Content-addressed-ish evidence store: opaque ULID names, sha256 recorded
/// in a sidecar metadata file.
#[derive(Debug, Clone)]
pub struct EvidenceStore {
    root: PathBuf,
}

impl EvidenceStore {
    pub fn new(data_root: &Path) -> Self {
        Self { root: data_root.join("evidence") }
    }

    pub fn locator(&self, evidence_id: &str) -> String {
        self.root.join(format!("{evidence_id}.bin")).to_string_lossy().into_owned()
    }

    pub async fn put(
        &self,
        change_id: &str,
        step_id: &str,
        content_type: Option<&str>,
        bytes: &[u8],
    ) -> Result<EvidenceMeta> {
        tokio::fs::create_dir_all(&self.root).await?;
        let evidence_id = Ulid::new().to_string();
        let meta = EvidenceMeta {
            evidence_id: evidence_id.clone(),
            change_id: change_id.to_string(),
            step_id: step_id.to_string(),
            content_type: content_type.map(str::to_string),
            sha256: hex::encode(Sha256::digest(bytes)),
            size_bytes: bytes.len() as u64,
            captured_at_ms: now_ms(),
        };
        tokio::fs::write(self.root.join(format!("{evidence_id}.bin")), bytes).await?;
        write_json(&self.root.join(format!("{evidence_id}.json")), &meta).await?;
        Ok(meta)
    }

    pub async fn read_bytes(&self, evidence_id: &str) -> Result<Vec<u8>> {
        let path = self.root.join(format!("{evidence_id}.bin"));
        tokio::fs::read(&path).await.with_context(|| format!("read {}", path.display()))
    }

    pub async fn read_meta(&self, evidence_id: &str) -> Result<EvidenceMeta> {
        let path = self.root.join(format!("{evidence_id}.json"));
        read_json_opt(&path)
            .await?
            .with_context(|| format!("no metadata for evidence {evidence_id}"))
    }
}

/// Proof packs plus the append-only step transition log.
#[derive(Debug, Clone)]
pub struct ProofStore {
    packs: PathBuf,
    logs: PathBuf,
}

impl ProofStore {
    pub fn new(data_root: &Path) -> Self {
        Self { packs: data_root.join("proofpacks"), logs: data_root.join("steplog") }
    }

    pub async fn load(&self, change_id: &str) -> Result<Option<ProofPack>> {
        read_json_opt(&self.packs.join(format!("{change_id}.json"))).await
    }

    pub async fn save(&self, pack: &ProofPack) -> Result<()> {
        tokio::fs::create_dir_all(&self.packs).await?;
        write_json(&self.packs.join(format!("{}.json", pack.change_id)), pack).await
    }

    /// Append one step snapshot as a JSON line. The log is never rewritten.
    pub async fn append_step_log(&self, change_id: &str, step: &StepResult) -> Result<()> {
        tokio::fs::create_dir_all(&self.logs).await?;
        let mut line = serde_json::to_vec(step)?;
        line.push(b'\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.logs.join(format!("{change_id}.jsonl")))
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalTicket {
    pub request_id: String,
    pub change_id: String,
    pub step_id: String,
    pub reason: String,
    pub opened_at_ms: EpochMs,
}

/// One ticket file per blocked change step. Reopening returns the existing
/// ticket id, so escalation is idempotent across retries and restarts.
#[derive(Debug, Clone)]
pub struct EscalationLog {
    root: PathBuf,
}

impl EscalationLog {
    pub fn new(data_root: &Path) -> Self {
        Self { root: data_root.join("escalations") }
    }

    pub async fn open_request(
        &self,
        change_id: &str,
        step_id: &str,
        reason: &str,
    ) -> Result<String> {
        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.root.join(format!("{change_id}-{step_id}.json"));
        if let Some(existing) = read_json_opt::<ApprovalTicket>(&path).await? {
            return Ok(existing.request_id);
        }
        let ticket = ApprovalTicket {
            request_id: Ulid::new().to_string(),
            change_id: change_id.to_string(),
            step_id: step_id.to_string(),
            reason: reason.to_string(),
            opened_at_ms: now_ms(),
        };
        write_json(&path, &ticket).await?;
        Ok(ticket.request_id)
    }
}

async fn read_json_opt<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match tokio::fs::read_to_string(path).await {
        Ok(json) => Ok(Some(
            serde_json::from_str(&json).with_context(|| format!("parse {}", path.display()))?,
        )),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("read {}", path.display())),
    }
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    tokio::fs::write(path, bytes).await.with_context(|| format!("write {}", path.display()))
}
