//! Binding generation — synthesizes one typed call stub per cataloged
//! tool, plus the aggregate manifest and the generation-metadata record.
//!
//! A host's batch is written into a staging directory and swapped over the
//! host directory only when complete, so a failure or timeout mid-write
//! can never leave metadata describing bindings that are not on disk.

use crate::schema::{field_ident, type_stem, RustSchemaCompiler, SchemaCompiler};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::fs;
use toolbind_core::Result;
use toolbind_mcp::ToolDef;
use tracing::{debug, info, warn};

/// Generation-metadata record, one per host. The sole source of truth for
/// freshness decisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationMetadata {
    /// When this binding set was generated.
    pub generated_at: DateTime<Utc>,
    /// The host the bindings belong to.
    pub host: String,
    /// Number of cataloged tools at generation time.
    pub tool_count: usize,
    /// How long generation took, in milliseconds.
    pub duration_ms: u64,
    /// Whether host-supplied instructions were captured alongside.
    pub has_instructions: bool,
}

/// Outcome of one host's generation.
#[derive(Debug)]
pub struct GenerationResult {
    /// Every file written, under the final host directory.
    pub written: Vec<PathBuf>,
    /// The metadata record that now describes the binding set.
    pub metadata: GenerationMetadata,
}

/// Synthesizes call stubs from a host's tool catalog.
pub struct BindingGenerator {
    out_dir: PathBuf,
    compiler: Arc<dyn SchemaCompiler>,
}

impl BindingGenerator {
    /// Generator writing under `out_dir`, one subdirectory per host, with
    /// the default Rust schema compiler.
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self::with_compiler(out_dir, Arc::new(RustSchemaCompiler))
    }

    /// Generator with a custom schema compiler.
    pub fn with_compiler(out_dir: impl Into<PathBuf>, compiler: Arc<dyn SchemaCompiler>) -> Self {
        Self {
            out_dir: out_dir.into(),
            compiler,
        }
    }

    /// The directory holding one host's generated bindings.
    pub fn host_dir(&self, host: &str) -> PathBuf {
        self.out_dir.join(host)
    }

    /// Reads a host's metadata record. A missing or unreadable record is
    /// `None` — the freshness orchestrator treats both as regenerate-worthy.
    pub async fn read_metadata(&self, host: &str) -> Option<GenerationMetadata> {
        let path = self.host_dir(host).join("metadata.json");
        let raw = fs::read_to_string(&path).await.ok()?;
        match serde_json::from_str(&raw) {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                debug!(host, error = %e, "unreadable metadata record");
                None
            }
        }
    }

    /// Generates the full binding set for one host: one stub per tool, the
    /// aggregate manifest, the metadata record, and captured instructions.
    pub async fn generate(
        &self,
        host: &str,
        tools: &[ToolDef],
        instructions: Option<&str>,
    ) -> Result<GenerationResult> {
        let start = Instant::now();
        let host_dir = self.host_dir(host);
        let staging = self.out_dir.join(format!(".staging-{host}"));

        // A leftover staging dir means a previous attempt died mid-write.
        if staging.exists() {
            fs::remove_dir_all(&staging).await?;
        }
        fs::create_dir_all(&staging).await?;

        // Keyed by short name so a duplicate collapses to the later tool.
        let mut stubs: BTreeMap<String, String> = BTreeMap::new();
        let mut seen: BTreeMap<String, String> = BTreeMap::new();

        for tool in tools {
            let short = short_name(host, &tool.name);
            if let Some(previous) = seen.insert(short.clone(), tool.name.clone()) {
                warn!(
                    host,
                    short = %short,
                    previous = %previous,
                    replacement = %tool.name,
                    "duplicate short name after prefix stripping; last write wins"
                );
            }
            let stub = self.render_stub(host, tool, &short)?;
            stubs.insert(short, stub);
        }

        let mut written = Vec::new();
        for (short, source) in &stubs {
            let file = format!("{short}.rs");
            fs::write(staging.join(&file), source).await?;
            written.push(host_dir.join(file));
        }

        let manifest = render_manifest(host, stubs.keys());
        fs::write(staging.join("mod.rs"), manifest).await?;
        written.push(host_dir.join("mod.rs"));

        if let Some(text) = instructions {
            fs::write(staging.join("INSTRUCTIONS.md"), text).await?;
            written.push(host_dir.join("INSTRUCTIONS.md"));
        }

        let metadata = GenerationMetadata {
            generated_at: Utc::now(),
            host: host.to_string(),
            tool_count: tools.len(),
            duration_ms: start.elapsed().as_millis() as u64,
            has_instructions: instructions.is_some(),
        };
        fs::write(
            staging.join("metadata.json"),
            serde_json::to_string_pretty(&metadata)?,
        )
        .await?;
        written.push(host_dir.join("metadata.json"));

        // Swap the completed batch into place.
        if host_dir.exists() {
            fs::remove_dir_all(&host_dir).await?;
        }
        fs::rename(&staging, &host_dir).await?;

        info!(
            host,
            tools = metadata.tool_count,
            files = written.len(),
            duration_ms = metadata.duration_ms,
            "bindings generated"
        );

        Ok(GenerationResult { written, metadata })
    }

    fn render_stub(&self, host: &str, tool: &ToolDef, short: &str) -> Result<String> {
        let stem = type_stem(short);
        let input_type = format!("{stem}Input");
        let output_type = format!("{stem}Output");

        let input_source = self.compiler.compile(&tool.input_schema, &input_type)?;
        let output_source = match &tool.output_schema {
            Some(schema) => self.compiler.compile(schema, &output_type)?,
            None => format!("pub type {output_type} = serde_json::Value;\n"),
        };

        let mut out = String::new();
        out.push_str(&format!(
            "// @generated by toolbind from the '{host}' tool catalog. Do not edit by hand.\n\n"
        ));
        out.push_str("use toolbind_core::Result;\nuse toolbind_mcp::ToolBridge;\n\n");
        out.push_str(&input_source);
        out.push('\n');
        out.push_str(&output_source);
        out.push('\n');

        if tool.description.is_empty() {
            out.push_str(&format!(
                "/// Calls the `{}` tool on the `{host}` host.\n",
                tool.name
            ));
        } else {
            for line in tool.description.lines() {
                out.push_str(&format!("/// {}\n", line.trim_end()));
            }
        }
        out.push_str(&format!(
            "pub async fn {short}(bridge: &ToolBridge, input: {input_type}) -> Result<{output_type}> {{\n"
        ));
        out.push_str(&format!("    const HOST: &str = \"{host}\";\n"));
        out.push_str(&format!("    const TOOL: &str = \"{}\";\n", tool.name));
        out.push_str(
            "    let output = bridge.invoke(HOST, TOOL, serde_json::to_value(input)?).await?;\n",
        );
        out.push_str("    Ok(serde_json::from_value(output)?)\n");
        out.push_str("}\n");

        Ok(out)
    }
}

/// Derives a tool's short name by stripping the host-qualifying prefix and
/// folding the remainder into a module-safe identifier.
pub fn short_name(host: &str, qualified: &str) -> String {
    let stripped = qualified
        .strip_prefix(&format!("mcp__{host}__"))
        .or_else(|| qualified.strip_prefix(&format!("{host}__")))
        .or_else(|| qualified.strip_prefix(&format!("{host}_")))
        .unwrap_or(qualified);
    let stripped = if stripped.is_empty() { qualified } else { stripped };
    field_ident(stripped)
}

fn render_manifest<'a>(host: &str, shorts: impl Iterator<Item = &'a String>) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "// @generated by toolbind — aggregate manifest for the '{host}' host bindings.\n\n"
    ));
    for short in shorts {
        out.push_str(&format!("pub mod {short};\npub use {short}::*;\n"));
    }
    out
}

/// The manifest file that marks a binding set as present.
pub fn manifest_path(host_dir: &Path) -> PathBuf {
    host_dir.join("mod.rs")
}
