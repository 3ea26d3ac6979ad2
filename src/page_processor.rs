use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use html5ever::serialize::{serialize, SerializeOpts};
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::{parse_document, Attribute, ParseOpts};
use markup5ever_rcdom::{Handle, NodeData, RcDom, SerializableHandle};
use tracing::debug;
use url::Url;

use crate::error::{MirrorError, Result};
use crate::fetcher::{self, Fetcher, ResourceOutcome};
use crate::path_mapper;

/// One asset reference found in a page: the attribute value as written and
/// the absolute URL it resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRef {
    pub raw: String,
    pub url: Url,
}

/// Everything a page points at that the crawl cares about.
#[derive(Debug, Default)]
pub struct ExtractedRefs {
    /// `link[href]`, `script[src]`, `img[src]`, deduplicated by raw value.
    pub assets: Vec<AssetRef>,
    /// `a[href]` targets that look like pages: no query, no fragment, and a
    /// path ending in `.html`. Host filtering happens at enqueue time.
    pub anchors: Vec<Url>,
}

/// Parse `html` and collect asset and anchor references, resolved against
/// `base`. References that do not parse as URLs are skipped.
pub fn extract_refs(html: &str, base: &Url) -> ExtractedRefs {
    let dom = parse_document(RcDom::default(), ParseOpts::default()).one(StrTendril::from(html));
    let mut refs = ExtractedRefs::default();
    let mut seen = HashSet::new();
    collect(&dom.document, base, &mut refs, &mut seen);
    refs
}

fn collect(handle: &Handle, base: &Url, refs: &mut ExtractedRefs, seen: &mut HashSet<String>) {
    if let NodeData::Element { ref name, ref attrs, .. } = handle.data {
        let tag = name.local.as_ref();
        if let Some(attr_name) = asset_attr(tag) {
            if let Some(raw) = attr_value(&attrs.borrow(), attr_name) {
                if let Some(url) = resolve(base, &raw) {
                    if seen.insert(raw.clone()) {
                        refs.assets.push(AssetRef { raw, url });
                    }
                }
            }
        }
        if tag == "a" {
            if let Some(raw) = attr_value(&attrs.borrow(), "href") {
                if let Some(url) = resolve(base, &raw) {
                    if url.query().is_none()
                        && url.fragment().is_none()
                        && url.path().ends_with(".html")
                    {
                        refs.anchors.push(url);
                    }
                }
            }
        }
    }
    for child in handle.children.borrow().iter() {
        collect(child, base, refs, seen);
    }
}

/// Attribute that carries the asset URL for `tag`, if the tag is on the
/// surface we mirror. Inline styles and CSS-internal references are not.
fn asset_attr(tag: &str) -> Option<&'static str> {
    match tag {
        "link" => Some("href"),
        "script" | "img" => Some("src"),
        _ => None,
    }
}

fn attr_value(attrs: &[Attribute], name: &str) -> Option<String> {
    attrs
        .iter()
        .find(|a| a.name.local.as_ref() == name)
        .map(|a| a.value.to_string())
        .filter(|v| !v.trim().is_empty())
}

fn resolve(base: &Url, raw: &str) -> Option<Url> {
    let url = base.join(raw.trim()).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}

/// Re-serialize `html` with asset attribute values swapped per
/// `replacements` (keyed by the value as originally written). Unmatched
/// attributes are left exactly as they were.
pub fn rewrite_html(html: &str, replacements: &HashMap<String, String>) -> String {
    if replacements.is_empty() {
        return html.to_string();
    }
    let dom = parse_document(RcDom::default(), ParseOpts::default()).one(StrTendril::from(html));
    rewrite_node(&dom.document, replacements);
    let document: SerializableHandle = dom.document.clone().into();
    let mut out = Vec::new();
    match serialize(&mut out, &document, SerializeOpts::default()) {
        Ok(()) => String::from_utf8_lossy(&out).into_owned(),
        Err(_) => html.to_string(),
    }
}

fn rewrite_node(handle: &Handle, replacements: &HashMap<String, String>) {
    if let NodeData::Element { ref name, ref attrs, .. } = handle.data {
        if let Some(attr_name) = asset_attr(name.local.as_ref()) {
            for attr in attrs.borrow_mut().iter_mut() {
                if attr.name.local.as_ref() == attr_name {
                    if let Some(new_value) = replacements.get(&*attr.value) {
                        attr.value = StrTendril::from(new_value.as_str());
                    }
                }
            }
        }
    }
    for child in handle.children.borrow().iter() {
        rewrite_node(child, replacements);
    }
}

/// Reference string that reaches `asset_rel` from the directory holding
/// `page_rel`, with forward slashes regardless of platform.
pub fn relative_reference(page_rel: &Path, asset_rel: &Path) -> String {
    let page_dir = page_rel.parent().unwrap_or_else(|| Path::new(""));
    let relative = pathdiff::diff_paths(asset_rel, page_dir)
        .unwrap_or_else(|| asset_rel.to_path_buf());
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    parts.join("/")
}

/// What a processed page contributes back to the crawl.
#[derive(Debug)]
pub struct ProcessedPage {
    pub anchors: Vec<Url>,
}

/// Fetches one page, localizes its assets, and writes the rewritten
/// document into the output tree.
pub struct PageProcessor {
    fetcher: Arc<Fetcher>,
    root: PathBuf,
}

impl PageProcessor {
    pub fn new(fetcher: Arc<Fetcher>, root: PathBuf) -> Self {
        Self { fetcher, root }
    }

    /// Mirror a single page. A page fetch failure is returned to the caller;
    /// asset failures are absorbed and those references stay remote.
    pub async fn process(&self, url: &Url) -> Result<ProcessedPage> {
        let html = self.fetcher.fetch_page(url).await?;
        let page_rel = path_mapper::to_local_path(url);
        let refs = extract_refs(&html, url);
        debug!(
            url = %url,
            assets = refs.assets.len(),
            anchors = refs.anchors.len(),
            "page parsed"
        );

        let fetches = refs.assets.iter().map(|asset| {
            let fetcher = Arc::clone(&self.fetcher);
            async move { fetcher.fetch_resource(&asset.url).await }
        });
        let outcomes = futures::future::join_all(fetches).await;

        let mut replacements = HashMap::new();
        for (asset, outcome) in refs.assets.iter().zip(outcomes) {
            if let ResourceOutcome::Stored(rel) = outcome {
                replacements.insert(asset.raw.clone(), relative_reference(&page_rel, &rel));
            }
        }

        let output = rewrite_html(&html, &replacements);
        self.write_page(&page_rel, output.as_bytes()).await?;
        Ok(ProcessedPage { anchors: refs.anchors })
    }

    async fn write_page(&self, rel: &Path, bytes: &[u8]) -> Result<()> {
        let dest = self.root.join(rel);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| MirrorError::fs(parent.to_path_buf(), e))?;
        }
        let part = fetcher::partial_path(&dest);
        if let Err(err) = tokio::fs::write(&part, bytes).await {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(MirrorError::fs(part, err));
        }
        if let Err(err) = tokio::fs::rename(&part, &dest).await {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(MirrorError::fs(dest, err));
        }
        Ok(())
    }
}
