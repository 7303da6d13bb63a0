//! The tool surface: four idempotent, stateless operations over the
//! pipeline, plus resource retrieval by `webfetch://` URI.
//!
//! No wire format is prescribed here; callers serialize the typed outputs
//! (or [`quarry_types::FetchError::to_json`] for failures) however their
//! transport likes.

use std::sync::{Arc, RwLock};

use base64::Engine;
use quarry_chunk::{ChunkOptions, ChunkStrategy};
use quarry_compact::{CompactMode, CompactOptions};
use quarry_config::{QuarryConfig, ResolvedConfig};
use quarry_fetch::{FetchMode, FetchOptions, FetchResponse, Fetcher, RenderBackend, RenderedPage};
use quarry_normalize::NormalizeOptions;
use quarry_store::{ListObserver, ResourceStore, ResourceUri, render_resource};
use quarry_types::{
    ChunkSet, CompactedPacket, ErrorCode, FetchError, Packet, Warning, WarningKind,
};
use serde::Deserialize;

/// Bodies under this size from an HTML endpoint look like a JS shell and
/// justify the rendering fallback under `mode=auto`.
const THIN_BODY_BYTES: usize = 512;

/// Arguments for the `fetch` operation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FetchArgs {
    pub url: String,

    #[serde(default)]
    pub headers: Vec<(String, String)>,

    pub max_bytes: Option<u64>,

    pub max_redirects: Option<u32>,

    #[serde(default)]
    pub no_cache: bool,

    #[serde(default)]
    pub include_raw_excerpt: bool,

    /// `http` (default), `render`, or `auto`.
    pub mode: Option<String>,
}

/// Arguments for the `extract` operation: a URL or raw bytes, never both.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtractArgs {
    pub url: Option<String>,

    /// Raw input bytes, base64-encoded.
    pub raw_base64: Option<String>,

    pub content_type: Option<String>,

    /// Canonical URL to seed the source id for raw input.
    pub canonical_url: Option<String>,

    #[serde(default)]
    pub include_raw_excerpt: bool,
}

/// Arguments for the `chunk` operation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkArgs {
    pub max_tokens: Option<usize>,

    pub margin_ratio: Option<f64>,

    /// `headings_first` (default) or `balanced`.
    pub strategy: Option<String>,
}

/// Arguments for the `compact` operation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompactArgs {
    pub max_tokens: Option<usize>,

    /// `structural`, `salience`, `map_reduce`, or `question_focused`.
    pub mode: Option<String>,

    pub question: Option<String>,

    #[serde(default)]
    pub preserve: Vec<String>,
}

/// Input to the `compact` operation.
#[derive(Debug, Clone)]
pub enum CompactInput {
    Packet(Packet),
    /// A chunk set, optionally with the packet it came from (for key-block
    /// citations).
    Chunks(ChunkSet, Option<Packet>),
}

/// A served resource: fixed mime type and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceContent {
    pub mime: &'static str,
    pub body: String,
}

/// One row of the resource listing.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ResourceListing {
    pub uri: String,
    pub title: Option<String>,
    pub canonical_url: String,
    pub retrieved_at: String,
}

/// The tool surface. One instance owns the fetcher and the resource store;
/// operations are safe to call concurrently.
pub struct Tools {
    fetcher: Fetcher,
    store: ResourceStore,
    config: ResolvedConfig,
    render: RwLock<Option<Arc<dyn RenderBackend>>>,
}

impl Tools {
    pub fn new(config: &QuarryConfig) -> Result<Self, FetchError> {
        let resolved = ResolvedConfig::from_config(config);
        Ok(Self {
            fetcher: Fetcher::new(resolved.clone())?,
            store: ResourceStore::with_defaults(resolved.cache_ttl),
            config: resolved,
            render: RwLock::new(None),
        })
    }

    /// Plug in a rendering backend for `mode=render` / `mode=auto`.
    pub fn set_render_backend(&self, backend: Arc<dyn RenderBackend>) {
        let mut slot = self
            .render
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *slot = Some(backend);
    }

    fn render_backend(&self) -> Option<Arc<dyn RenderBackend>> {
        self.render
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Render through the backend with the policy gates applied first.
    async fn render_checked(
        &self,
        backend: &dyn RenderBackend,
        url: &str,
    ) -> Result<RenderedPage, FetchError> {
        self.fetcher.preflight(url).await?;
        backend.render(url).await
    }

    #[must_use]
    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &ResourceStore {
        &self.store
    }

    /// Register the resource list-changed observer.
    pub fn set_list_observer(&self, observer: Arc<dyn ListObserver>) {
        self.store.set_observer(observer);
    }

    /// `fetch(url, opts)`: run the full pipeline and store the packet.
    pub async fn fetch(&self, args: &FetchArgs) -> Result<Packet, FetchError> {
        if args.url.trim().is_empty() {
            return Err(FetchError::new(
                ErrorCode::InvalidInput,
                "url must not be empty",
            ));
        }

        let opts = FetchOptions {
            headers: args.headers.clone(),
            max_bytes: args.max_bytes,
            max_redirects: args.max_redirects,
            no_cache: args.no_cache,
            ..Default::default()
        };

        let mut warnings: Vec<Warning> = Vec::new();
        let mut screenshot: Option<String> = None;

        let response = match FetchMode::from_name(args.mode.as_deref()) {
            FetchMode::Http => self.fetcher.fetch_with_retry(&args.url, &opts).await?,
            FetchMode::Render => {
                let backend = self.render_backend().ok_or_else(|| {
                    FetchError::new(
                        ErrorCode::InvalidInput,
                        "mode=render requires a rendering backend",
                    )
                })?;
                let page = self.render_checked(backend.as_ref(), &args.url).await?;
                screenshot = page.screenshot_base64;
                page.response
            }
            FetchMode::Auto => {
                self.fetch_auto(&args.url, &opts, &mut warnings, &mut screenshot)
                    .await?
            }
        };

        tracing::debug!(
            url = %args.url,
            status = response.status,
            bytes = response.body.len(),
            "fetched, normalizing"
        );

        let normalize_opts = NormalizeOptions {
            include_raw_excerpt: args.include_raw_excerpt,
            screenshot_base64: screenshot,
            warnings,
        };
        let packet =
            quarry_normalize::normalize(&response, &args.url, &self.config, &normalize_opts)?;

        self.store.set(&packet);
        Ok(packet)
    }

    /// `mode=auto`: HTTP first; a thin or transiently-failed response falls
    /// back to the rendering backend when one is available. The switch is
    /// invisible to the caller except through warnings.
    async fn fetch_auto(
        &self,
        url: &str,
        opts: &FetchOptions,
        warnings: &mut Vec<Warning>,
        screenshot: &mut Option<String>,
    ) -> Result<FetchResponse, FetchError> {
        let http_result = self.fetcher.fetch_with_retry(url, opts).await;
        let Some(backend) = self.render_backend() else {
            return http_result;
        };

        match http_result {
            Ok(response) if !looks_thin(&response) => Ok(response),
            Ok(response) => match self.render_checked(backend.as_ref(), url).await {
                Ok(page) => {
                    warnings.push(Warning::new(
                        WarningKind::ExtractionFallback,
                        "thin HTTP response, used rendered DOM instead",
                    ));
                    *screenshot = page.screenshot_base64;
                    Ok(page.response)
                }
                Err(render_err) => {
                    warnings.push(Warning::new(
                        WarningKind::RenderTimeout,
                        format!("rendering failed, kept HTTP response: {}", render_err.message),
                    ));
                    Ok(response)
                }
            },
            Err(http_err) if http_err.retryable => {
                match self.render_checked(backend.as_ref(), url).await {
                    Ok(page) => {
                        warnings.push(Warning::new(
                            WarningKind::ExtractionFallback,
                            "HTTP fetch failed, used rendered DOM instead",
                        ));
                        *screenshot = page.screenshot_base64;
                        Ok(page.response)
                    }
                    Err(_) => Err(http_err),
                }
            }
            Err(http_err) => Err(http_err),
        }
    }

    /// `extract({url | raw_bytes}, opts)`: normalize without the safety
    /// pipeline, or delegate to `fetch` when a URL is given.
    pub async fn extract(&self, args: &ExtractArgs) -> Result<Packet, FetchError> {
        match (&args.url, &args.raw_base64) {
            (Some(_), Some(_)) => Err(FetchError::new(
                ErrorCode::InvalidInput,
                "provide either url or raw_base64, not both",
            )),
            (None, None) => Err(FetchError::new(
                ErrorCode::InvalidInput,
                "provide url or raw_base64",
            )),
            (Some(url), None) => {
                self.fetch(&FetchArgs {
                    url: url.clone(),
                    include_raw_excerpt: args.include_raw_excerpt,
                    ..Default::default()
                })
                .await
            }
            (None, Some(raw)) => {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(raw)
                    .map_err(|e| {
                        FetchError::new(
                            ErrorCode::InvalidInput,
                            format!("raw_base64 is not valid base64: {e}"),
                        )
                    })?;
                let normalize_opts = NormalizeOptions {
                    include_raw_excerpt: args.include_raw_excerpt,
                    ..Default::default()
                };
                let packet = quarry_normalize::normalize_raw(
                    &bytes,
                    args.content_type.as_deref(),
                    args.canonical_url.as_deref(),
                    &self.config,
                    &normalize_opts,
                )?;
                self.store.set(&packet);
                Ok(packet)
            }
        }
    }

    /// `chunk(packet, opts)`: pure transform, nothing stored.
    pub fn chunk(&self, packet: &Packet, args: &ChunkArgs) -> Result<ChunkSet, FetchError> {
        let max_tokens = args.max_tokens.unwrap_or(self.config.default_max_tokens);
        if max_tokens == 0 {
            return Err(FetchError::new(
                ErrorCode::InvalidInput,
                "max_tokens must be positive",
            ));
        }
        let margin_ratio = args
            .margin_ratio
            .unwrap_or(self.config.chunk_margin_ratio);
        if !(0.0..=0.5).contains(&margin_ratio) {
            return Err(FetchError::new(
                ErrorCode::InvalidInput,
                "margin_ratio must be within [0, 0.5]",
            ));
        }

        let opts = ChunkOptions {
            max_tokens,
            margin_ratio,
            strategy: ChunkStrategy::from_name(args.strategy.as_deref()),
        };
        Ok(quarry_chunk::chunk(packet, &opts))
    }

    /// `compact(input, opts)`: pure transform, nothing stored.
    pub fn compact(
        &self,
        input: &CompactInput,
        args: &CompactArgs,
    ) -> Result<CompactedPacket, FetchError> {
        let max_tokens = args.max_tokens.unwrap_or(self.config.default_max_tokens);
        if max_tokens == 0 {
            return Err(FetchError::new(
                ErrorCode::InvalidInput,
                "max_tokens must be positive",
            ));
        }

        let opts = CompactOptions {
            max_tokens,
            mode: args.mode.as_deref().map(|m| CompactMode::from_name(Some(m))),
            question: args.question.clone(),
            preserve: args.preserve.clone(),
        };

        Ok(match input {
            CompactInput::Packet(packet) => quarry_compact::compact_packet(packet, &opts),
            CompactInput::Chunks(chunks, packet) => {
                quarry_compact::compact_chunks(chunks, packet.as_ref(), &opts)
            }
        })
    }

    /// Enumerate stored packets as resource listings, newest first.
    #[must_use]
    pub fn list_resources(&self) -> Vec<ResourceListing> {
        self.store
            .list()
            .into_iter()
            .map(|packet| ResourceListing {
                uri: ResourceUri::new(quarry_store::ResourceKind::Packet, &packet.source_id)
                    .to_string(),
                title: packet.metadata.title.clone(),
                canonical_url: packet.canonical_url.clone(),
                retrieved_at: packet.retrieved_at.clone(),
            })
            .collect()
    }

    /// Resolve a `webfetch://` URI against the store.
    pub fn resource(&self, raw_uri: &str) -> Result<ResourceContent, FetchError> {
        let uri = ResourceUri::parse(raw_uri)?;
        let packet = self.store.get(&uri.source_id).ok_or_else(|| {
            FetchError::new(
                ErrorCode::ResourceNotFound,
                format!("no packet stored under source id {}", uri.source_id),
            )
        })?;
        let (mime, body) = render_resource(&uri, &packet)?;
        Ok(ResourceContent { mime, body })
    }
}

/// Whether a successful HTML response is too small to have carried real
/// content (a JS shell page).
fn looks_thin(response: &FetchResponse) -> bool {
    if response.body.len() >= THIN_BODY_BYTES {
        return false;
    }
    response
        .content_type
        .as_deref()
        .is_none_or(|ct| ct.contains("html"))
}
