use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, Method, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::{RemoteClient, RemoteItem, TargetInfo};
use crate::core::connection::ConnectionConfig;
use crate::error::RemoteError;

pub const NOTION_API_URL: &str = "https://api.notion.com/v1";
const NOTION_VERSION: &str = "2022-06-28";
const PAGE_SIZE: u32 = 100;
const UNTITLED: &str = "Untitled";

static PAGE_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"([0-9a-fA-F]{8})-?([0-9a-fA-F]{4})-?([0-9a-fA-F]{4})-?([0-9a-fA-F]{4})-?([0-9a-fA-F]{12})",
    )
    .expect("page id pattern is valid")
});

/// Accepts a bare id, a dashed id, or a notion.so URL and returns the dashed,
/// lowercase page id. The last id-shaped run wins, since page URLs put the
/// id after the slugified title.
pub fn normalize_page_id(input: &str) -> Option<String> {
    let path = input.split(['?', '#']).next().unwrap_or(input);
    let caps = PAGE_ID_RE.captures_iter(path).last()?;
    let parts: Vec<&str> = (1..=5).filter_map(|i| caps.get(i).map(|m| m.as_str())).collect();
    Some(parts.join("-").to_ascii_lowercase())
}

// --- Wire types ---

#[derive(Debug, Clone, Default, Deserialize)]
struct RichText {
    #[serde(default)]
    plain_text: String,
}

fn plain_text(spans: &[RichText]) -> String {
    spans.iter().map(|s| s.plain_text.as_str()).collect()
}

#[derive(Debug, Clone, Deserialize)]
struct Property {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    title: Vec<RichText>,
}

#[derive(Debug, Clone, Deserialize)]
struct Page {
    id: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    properties: BTreeMap<String, Property>,
}

impl Page {
    fn title(&self) -> String {
        self.properties
            .values()
            .find(|p| p.kind == "title")
            .map(|p| plain_text(&p.title))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| UNTITLED.to_string())
    }

    fn context(&self) -> PageContext {
        PageContext {
            title: self.title(),
            url: self.url.clone().unwrap_or_else(|| page_url(&self.id)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ToDo {
    #[serde(default)]
    rich_text: Vec<RichText>,
    #[serde(default)]
    checked: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct ChildPage {
    #[serde(default)]
    title: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Block {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    has_children: bool,
    #[serde(default)]
    archived: bool,
    #[serde(default)]
    in_trash: bool,
    #[serde(default)]
    to_do: Option<ToDo>,
    #[serde(default)]
    child_page: Option<ChildPage>,
}

/// One page of a block's children.
#[derive(Debug, Deserialize)]
pub(crate) struct BlockList {
    results: Vec<Block>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// The page an item lives on; becomes the item's description and link base.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PageContext {
    title: String,
    url: String,
}

fn page_url(page_id: &str) -> String {
    format!("https://www.notion.so/{}", page_id.replace('-', ""))
}

fn block_url(ctx: &PageContext, block_id: &str) -> String {
    format!("{}#{}", ctx.url, block_id.replace('-', ""))
}

// --- Outline traversal ---

/// Anything that can serve the direct children of a block, one page at a time.
#[allow(async_fn_in_trait)]
pub(crate) trait BlockSource {
    async fn children_page(
        &self,
        block_id: &str,
        cursor: Option<&str>,
    ) -> Result<BlockList, RemoteError>;
}

/// Follow `next_cursor` until the listing is exhausted. A page that claims
/// more but carries no cursor ends the listing.
async fn list_children<S: BlockSource>(
    source: &S,
    block_id: &str,
) -> Result<Vec<Block>, RemoteError> {
    let mut blocks = Vec::new();
    let mut cursor: Option<String> = None;

    loop {
        let page = source.children_page(block_id, cursor.as_deref()).await?;
        log::debug!("Block {}: {} children", block_id, page.results.len());
        blocks.extend(page.results);

        match page.next_cursor {
            Some(next) if page.has_more => cursor = Some(next),
            _ => break,
        }
    }

    Ok(blocks)
}

/// Walk the block tree under `root` breadth-first with an explicit queue and
/// return every to-do, in API order per container.
async fn walk_outline<S: BlockSource>(
    source: &S,
    root_id: &str,
    root: PageContext,
) -> Result<Vec<RemoteItem>, RemoteError> {
    let mut items = Vec::new();
    let mut queue: VecDeque<(String, PageContext)> = VecDeque::new();
    queue.push_back((root_id.to_string(), root));

    while let Some((parent_id, ctx)) = queue.pop_front() {
        for block in list_children(source, &parent_id).await? {
            if block.archived || block.in_trash {
                continue;
            }

            if let Some(todo) = &block.to_do {
                items.push(RemoteItem {
                    source_id: block.id.clone(),
                    title: plain_text(&todo.rich_text),
                    completed: todo.checked,
                    description: ctx.title.clone(),
                    source_url: Some(block_url(&ctx, &block.id)),
                });
            }

            if !block.has_children {
                continue;
            }
            let child_ctx = match (&block.kind[..], &block.child_page) {
                ("child_page", Some(page)) => PageContext {
                    title: if page.title.is_empty() {
                        UNTITLED.to_string()
                    } else {
                        page.title.clone()
                    },
                    url: page_url(&block.id),
                },
                _ => ctx.clone(),
            };
            queue.push_back((block.id, child_ctx));
        }
    }

    Ok(items)
}

// --- HTTP client ---

#[derive(Clone)]
pub struct NotionClient {
    base_url: String,
    http: Client,
}

impl NotionClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RemoteError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn request(&self, method: Method, path: &str, token: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .header("Notion-Version", NOTION_VERSION)
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, RemoteError> {
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(api_error(status.as_u16(), &text));
        }
        let text = resp.text().await?;
        serde_json::from_str(&text).map_err(|e| RemoteError::Decode(e.to_string()))
    }

    async fn get_page(&self, token: &str, page_id: &str) -> Result<Page, RemoteError> {
        log::debug!("GET page {}", page_id);
        self.send(self.request(Method::GET, &format!("/pages/{}", page_id), token))
            .await
    }

    async fn get_children(
        &self,
        token: &str,
        block_id: &str,
        cursor: Option<&str>,
    ) -> Result<BlockList, RemoteError> {
        let mut req = self
            .request(Method::GET, &format!("/blocks/{}/children", block_id), token)
            .query(&[("page_size", PAGE_SIZE.to_string())]);
        if let Some(c) = cursor {
            req = req.query(&[("start_cursor", c)]);
        }
        self.send(req).await
    }

    async fn patch_todo(
        &self,
        token: &str,
        block_id: &str,
        to_do: serde_json::Value,
    ) -> Result<(), RemoteError> {
        let req = self
            .request(Method::PATCH, &format!("/blocks/{}", block_id), token)
            .json(&serde_json::json!({ "to_do": to_do }));
        let _: serde_json::Value = self.send(req).await?;
        Ok(())
    }
}

fn api_error(status: u16, body: &str) -> RemoteError {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(err) if !err.message.is_empty() => RemoteError::Api {
            status,
            code: err.code,
            message: err.message,
        },
        _ => RemoteError::Api {
            status,
            code: "http_error".to_string(),
            message: if body.is_empty() {
                format!("HTTP {}", status)
            } else {
                body.chars().take(500).collect()
            },
        },
    }
}

fn target_page_id(config: &ConnectionConfig) -> Result<String, RemoteError> {
    normalize_page_id(&config.page_id).ok_or_else(|| {
        RemoteError::InvalidTarget(format!("'{}' is not a page id", config.page_id))
    })
}

/// A client bound to one token, so the traversal only deals in block ids.
struct TokenScoped<'a> {
    client: &'a NotionClient,
    token: &'a str,
}

impl BlockSource for TokenScoped<'_> {
    async fn children_page(
        &self,
        block_id: &str,
        cursor: Option<&str>,
    ) -> Result<BlockList, RemoteError> {
        self.client.get_children(self.token, block_id, cursor).await
    }
}

impl RemoteClient for NotionClient {
    async fn test_connection(&self, config: &ConnectionConfig) -> Result<TargetInfo, RemoteError> {
        let page_id = target_page_id(config)?;
        let page = self.get_page(&config.token, &page_id).await?;
        Ok(TargetInfo {
            title: page.title(),
            property_names: page.properties.keys().cloned().collect(),
        })
    }

    async fn fetch_items(&self, config: &ConnectionConfig) -> Result<Vec<RemoteItem>, RemoteError> {
        let page_id = target_page_id(config)?;
        let page = self.get_page(&config.token, &page_id).await?;
        let scoped = TokenScoped {
            client: self,
            token: &config.token,
        };
        let items = walk_outline(&scoped, &page_id, page.context()).await?;
        log::info!("Fetched {} to-dos under '{}'", items.len(), page.title());
        Ok(items)
    }

    async fn push_completion(
        &self,
        config: &ConnectionConfig,
        item_id: &str,
        completed: bool,
    ) -> Result<(), RemoteError> {
        self.patch_todo(&config.token, item_id, serde_json::json!({ "checked": completed }))
            .await
    }

    async fn push_text(
        &self,
        config: &ConnectionConfig,
        item_id: &str,
        text: &str,
    ) -> Result<(), RemoteError> {
        let rich_text = serde_json::json!([{ "type": "text", "text": { "content": text } }]);
        self.patch_todo(&config.token, item_id, serde_json::json!({ "rich_text": rich_text }))
            .await
    }
}
