//! MCP (Model Context Protocol) server for metaflux.
//!
//! Exposes every modeling operation in `ops` as an MCP tool so that AI
//! assistants can drive metabolic modeling workflows over stdio JSON-RPC.
//! The wrappers here are a thin façade: they resolve shared services through
//! the `state` locator, call the corresponding `op_*` function, and wrap the
//! result in a success or error envelope. A tool never raises a domain error
//! across the RPC boundary.
//!
//! Start with: `metaflux` (the binary serves stdio by default).

use rmcp::{
    handler::server::tool::{ToolCallContext, ToolRouter},
    handler::server::wrapper::Parameters,
    model::*,
    service::RequestContext,
    tool, tool_router, ErrorData as McpError, RoleServer, ServerHandler, ServiceExt,
};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::error::ToolError;
use crate::ops;
use crate::response::{error_envelope, success_envelope};
use crate::state;

// ── Parameter structs ───────────────────────────────────────────────────────
// `JsonSchema` is required by rmcp so that each tool's input schema is
// auto-generated for the AI client; parameters stay JSON-serializable and
// shared services are resolved through the locator instead.

#[derive(Debug, Deserialize, JsonSchema)]
pub struct BuildMediaParams {
    /// Compound ids to include (e.g. ["cpd00027", "cpd00001"]).
    pub compounds: Vec<String>,
    /// Optional media name; auto-generated when omitted.
    pub name: Option<String>,
    /// Optional per-compound (lower_bound, upper_bound) overrides; compounds
    /// without an entry get the default uptake of 100.
    pub compound_bounds: Option<std::collections::BTreeMap<String, (f64, f64)>>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct BuildModelParams {
    /// Path to a protein FASTA file. Pass exactly one of fasta_path or
    /// protein_sequences.
    pub fasta_path: Option<String>,
    /// Mapping of protein id to amino-acid sequence.
    pub protein_sequences: Option<std::collections::BTreeMap<String, String>>,
    /// Reconstruction template name (default: "GramNegative").
    #[serde(default = "default_template")]
    pub template: String,
    /// Optional model basename; the stored id gets a ".draft" suffix.
    pub model_name: Option<String>,
    /// Request external functional annotation before reconstruction.
    #[serde(default)]
    pub annotate: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GapfillModelParams {
    /// Id of the model to gapfill (the original is left untouched).
    pub model_id: String,
    /// Target growth medium id.
    pub media_id: String,
    /// Growth rate the gapfilled model must reach (1/h, default 0.01).
    #[serde(default = "default_target_growth")]
    pub target_growth_rate: f64,
    /// Pipeline mode: "full", "atp_only", or "genomescale_only".
    #[serde(default = "default_mode")]
    pub mode: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RunFbaParams {
    /// Id of the model to analyze (never mutated).
    pub model_id: String,
    /// Growth medium id.
    pub media_id: String,
    /// Objective reaction id; defaults to the biomass reaction.
    pub objective: Option<String>,
    /// Maximize (true, default) or minimize the objective.
    #[serde(default = "default_true")]
    pub maximize: bool,
    /// Fluxes below this magnitude are reported as zero (default 1e-6).
    pub flux_threshold: Option<f64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetCompoundParams {
    /// ModelSEED compound id (pattern cpd#####).
    pub compound_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetReactionParams {
    /// ModelSEED reaction id (pattern rxn#####).
    pub reaction_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchParams {
    /// Free-text query: name fragment, exact id, formula, EC number, alias.
    pub query: String,
    /// Maximum number of results (default 10).
    #[serde(default = "default_limit")]
    pub limit: usize,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DeleteModelParams {
    /// Id of the model to delete.
    pub model_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DeleteMediaParams {
    /// Id of the media to delete. Predefined media cannot be deleted.
    pub media_id: String,
}

// ── Default helpers ─────────────────────────────────────────────────────────

fn default_template() -> String {
    "GramNegative".into()
}
fn default_target_growth() -> f64 {
    ops::DEFAULT_TARGET_GROWTH
}
fn default_mode() -> String {
    "full".into()
}
fn default_true() -> bool {
    true
}
fn default_limit() -> usize {
    10
}

// ── Shared helpers ──────────────────────────────────────────────────────────

fn json_text(v: &Value) -> String {
    serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string())
}

fn text_result(v: &Value) -> CallToolResult {
    CallToolResult::success(vec![Content::text(json_text(v))])
}

fn join_error(e: tokio::task::JoinError) -> McpError {
    McpError::internal_error(format!("task join error: {e}"), None)
}

/// Run a core operation and fold both outcomes into an envelope; domain
/// errors become `success: false` payloads, never protocol errors.
fn envelope<T: serde::Serialize>(result: Result<T, ToolError>) -> Value {
    match result {
        Ok(payload) => success_envelope(&payload),
        Err(e) => error_envelope(&e),
    }
}

// ── MCP Server ──────────────────────────────────────────────────────────────

/// The MCP server struct. Holds only the auto-generated tool router; all
/// state lives behind the `state` locator.
#[derive(Clone)]
pub struct MetafluxMcp {
    tool_router: ToolRouter<Self>,
}

impl Default for MetafluxMcp {
    fn default() -> Self {
        Self::new()
    }
}

#[tool_router]
impl MetafluxMcp {
    pub fn new() -> Self {
        Self {
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        name = "build_media",
        description = "Create a growth medium from ModelSEED compound ids. Every id is validated against the biochemistry database before anything is stored; invalid ids are all reported at once. Use compound_bounds to set per-compound (lower, upper) flux bounds, e.g. {\"cpd00027\": [-10, 100]} for glucose uptake at 10. Predefined media (glucose_minimal_aerobic, glucose_minimal_anaerobic, acetate_minimal_aerobic, rich_aerobic) already exist."
    )]
    async fn build_media(
        &self,
        params: Parameters<BuildMediaParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let value = envelope((|| {
            let biochem = state::biochem()?;
            let mut store = state::sessions()?;
            ops::op_build_media(
                biochem,
                &mut store,
                &p.compounds,
                p.name.as_deref(),
                p.compound_bounds.as_ref(),
            )
        })());
        Ok(text_result(&value))
    }

    #[tool(
        name = "build_model",
        description = "Build a draft metabolic model from protein sequences (a FASTA path or an id->sequence mapping, exactly one of the two) and a reconstruction template. The draft gets a biomass reaction, an ATP-maintenance reaction, and exchange reactions, and is stored under '<name>.draft'. Draft models usually cannot grow yet; gapfill them next."
    )]
    async fn build_model(
        &self,
        params: Parameters<BuildModelParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let value = tokio::task::spawn_blocking(move || {
            envelope((|| {
                let templates = state::templates()?;
                let mut store = state::sessions()?;
                ops::op_build_model(
                    templates,
                    &mut store,
                    state::annotator(),
                    ops::BuildModelInput {
                        fasta_path: p.fasta_path.as_deref(),
                        protein_sequences: p.protein_sequences.as_ref(),
                        template: &p.template,
                        model_name: p.model_name.as_deref(),
                        annotate: p.annotate,
                    },
                )
            })())
        })
        .await
        .map_err(join_error)?;
        Ok(text_result(&value))
    }

    #[tool(
        name = "gapfill_model",
        description = "Make a model grow on a medium by adding the minimal set of template reactions. Runs ATP correction across the test-media bundle, then genome-scale gapfilling against the target medium. Stores the result under a new id with '.gf' appended (the original model is preserved) and reports every added reaction with its human-readable equation. Returns an infeasibility error with suggestions when no solution reaches the target."
    )]
    async fn gapfill_model(
        &self,
        params: Parameters<GapfillModelParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let value = tokio::task::spawn_blocking(move || {
            envelope((|| {
                let biochem = state::biochem()?;
                let templates = state::templates()?;
                let mut store = state::sessions()?;
                ops::op_gapfill_model(
                    biochem,
                    templates,
                    &mut store,
                    &p.model_id,
                    &p.media_id,
                    p.target_growth_rate,
                    &p.mode,
                )
            })())
        })
        .await
        .map_err(join_error)?;
        Ok(text_result(&value))
    }

    #[tool(
        name = "run_fba",
        description = "Run flux balance analysis: apply a medium to a model, optimize an objective (biomass by default), and return the growth rate plus classified uptake/secretion fluxes with compound names. The stored model is never modified. Interpretation includes growth category, aerobic/anaerobic call, and the identified carbon source."
    )]
    async fn run_fba(&self, params: Parameters<RunFbaParams>) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let value = tokio::task::spawn_blocking(move || {
            envelope((|| {
                let biochem = state::biochem()?;
                let store = state::sessions()?;
                ops::op_run_fba(
                    biochem,
                    &store,
                    &p.model_id,
                    &p.media_id,
                    p.objective.as_deref(),
                    p.maximize,
                    p.flux_threshold,
                )
            })())
        })
        .await
        .map_err(join_error)?;
        Ok(text_result(&value))
    }

    #[tool(
        name = "get_compound_name",
        description = "Look up one compound by exact ModelSEED id (cpd#####). Returns name, formula, mass, charge, InChIKey, SMILES, and foreign-database aliases. Use search_compounds when you only know a name."
    )]
    async fn get_compound_name(
        &self,
        params: Parameters<GetCompoundParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let value = envelope((|| ops::op_get_compound(state::biochem()?, &p.compound_id))());
        Ok(text_result(&value))
    }

    #[tool(
        name = "get_reaction_name",
        description = "Look up one reaction by exact ModelSEED id (rxn#####). Returns name, a human-readable equation, reversibility, EC numbers, and pathways. Use search_reactions when you only know a name or EC number."
    )]
    async fn get_reaction_name(
        &self,
        params: Parameters<GetReactionParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let value = envelope((|| ops::op_get_reaction(state::biochem()?, &p.reaction_id))());
        Ok(text_result(&value))
    }

    #[tool(
        name = "search_compounds",
        description = "Search ~34k compounds by name fragment, exact id, abbreviation, formula, or foreign-database alias. Results are ranked (exact matches first), deduplicated, and carry match_field/match_type metadata plus a truncated flag. Example: query \"glucose\" returns cpd00027 (D-Glucose) first."
    )]
    async fn search_compounds(
        &self,
        params: Parameters<SearchParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let value = envelope((|| ops::op_search_compounds(state::biochem()?, &p.query, p.limit))());
        Ok(text_result(&value))
    }

    #[tool(
        name = "search_reactions",
        description = "Search ~44k reactions by name fragment, exact id, abbreviation, EC number, alias, or pathway. Results are ranked (exact matches first), deduplicated, and carry match_field/match_type metadata plus a truncated flag."
    )]
    async fn search_reactions(
        &self,
        params: Parameters<SearchParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let value = envelope((|| ops::op_search_reactions(state::biochem()?, &p.query, p.limit))());
        Ok(text_result(&value))
    }

    #[tool(
        name = "list_models",
        description = "List every model in the session with its id, state (draft or gapfilled), reaction/metabolite/gene counts, template, and gapfill history."
    )]
    async fn list_models(&self) -> Result<CallToolResult, McpError> {
        let value = envelope((|| {
            let store = state::sessions()?;
            Ok::<_, ToolError>(ops::op_list_models(&store))
        })());
        Ok(text_result(&value))
    }

    #[tool(
        name = "list_media",
        description = "List every growth medium in the session, predefined and custom, with compound counts."
    )]
    async fn list_media(&self) -> Result<CallToolResult, McpError> {
        let value = envelope((|| {
            let store = state::sessions()?;
            Ok::<_, ToolError>(ops::op_list_media(&store))
        })());
        Ok(text_result(&value))
    }

    #[tool(
        name = "delete_model",
        description = "Delete a model from the session. Gapfilled descendants of a deleted model are unaffected."
    )]
    async fn delete_model(
        &self,
        params: Parameters<DeleteModelParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let value = envelope((|| {
            let mut store = state::sessions()?;
            ops::op_delete_model(&mut store, &p.model_id)
        })());
        Ok(text_result(&value))
    }

    #[tool(
        name = "delete_media",
        description = "Delete a custom growth medium from the session. Predefined media are protected and cannot be deleted."
    )]
    async fn delete_media(
        &self,
        params: Parameters<DeleteMediaParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let value = envelope((|| {
            let mut store = state::sessions()?;
            ops::op_delete_media(&mut store, &p.media_id)
        })());
        Ok(text_result(&value))
    }
}

// ── ServerHandler glue ──────────────────────────────────────────────────────

impl ServerHandler for MetafluxMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Genome-scale metabolic modeling server. Typical workflow: \
                 build_model (FASTA or protein sequences -> draft), \
                 gapfill_model (make it grow on a medium), run_fba (analyze \
                 fluxes). Media: use the predefined glucose_minimal_aerobic / \
                 glucose_minimal_anaerobic / acetate_minimal_aerobic / \
                 rich_aerobic, or create one with build_media. Look up \
                 biochemistry with search_compounds, search_reactions, \
                 get_compound_name, get_reaction_name. Every response carries \
                 success plus either a payload or a structured error with \
                 recovery_suggestions."
                    .into(),
            ),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability { list_changed: None }),
                ..Default::default()
            },
            server_info: Implementation {
                name: "metaflux".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: Some("Metaflux Modeling Server".into()),
                description: Some(
                    "Draft reconstruction, gapfilling, and FBA for genome-scale metabolic models"
                        .into(),
                ),
                icons: None,
                website_url: None,
            },
            ..Default::default()
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        std::future::ready(Ok(ListToolsResult {
            tools: self.tool_router.list_all(),
            next_cursor: None,
            meta: Default::default(),
        }))
    }

    fn call_tool(
        &self,
        request: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<CallToolResult, McpError>> + Send + '_ {
        let tool_context = ToolCallContext::new(self, request, context);
        async move { self.tool_router.call(tool_context).await }
    }

    fn get_tool(&self, name: &str) -> Option<Tool> {
        self.tool_router.get(name).cloned()
    }
}

// ── Entry point ─────────────────────────────────────────────────────────────

/// Serve MCP on stdio until the client disconnects. Called from `main` after
/// the service locator is populated.
pub async fn serve_stdio() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let server = MetafluxMcp::new();
    let transport = rmcp::transport::io::stdio();
    let service = server.serve(transport).await.inspect_err(|e| {
        eprintln!("MCP serve error: {e}");
    })?;
    service.waiting().await?;
    Ok(())
}
